//! A stand-in for a rendered page: named text spans that can be scrolled to
//! and tapped, producing the intent a content detector fires.

use rquest_engine::{ContentDetector, EmailAddressDetector};

pub struct Page {
    spans: Vec<(&'static str, &'static str)>,
    detector: Box<dyn ContentDetector>,
}

impl Page {
    #[allow(unused)]
    pub fn email(spans: &[(&'static str, &'static str)]) -> Page {
        Page {
            spans: spans.to_vec(),
            detector: Box::new(EmailAddressDetector),
        }
    }

    /// Taps the middle of the element `id` and returns the intent URL fired,
    /// if any.
    #[allow(unused)]
    pub fn scroll_and_tap_expecting_intent(&self, id: &str) -> Option<String> {
        let (_, text) = self.spans.iter().find(|(span, _)| *span == id)?;
        let tap = text.len() / 2;
        let content = self.detector.find_content(text, tap)?;
        Some(self.detector.intent_url(content.as_str()))
    }
}

//! Content detection: finding actionable text such as email addresses and
//! turning it into intent URLs.

use std::ops::Range;

use url::form_urlencoded;

/// A piece of detected content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Detected<'a> {
    text: &'a str,
    range: Range<usize>,
}

impl<'a> Detected<'a> {
    /// The detected text.
    pub fn as_str(&self) -> &'a str {
        &self.text[self.range.clone()]
    }

    /// Byte range of the content within the scanned text.
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }
}

/// Detects one kind of content in text.
pub trait ContentDetector {
    /// The prefix of the intent URLs this detector produces, e.g. `mailto:`.
    fn intent_prefix(&self) -> &'static str;

    /// Every match in `text`, in order.
    fn find_all<'a>(&self, text: &'a str) -> Vec<Detected<'a>>;

    /// The match spanning byte `offset`, as a tap at that position would
    /// select it.
    fn find_content<'a>(&self, text: &'a str, offset: usize) -> Option<Detected<'a>> {
        self.find_all(text)
            .into_iter()
            .find(|d| d.range.start <= offset && offset < d.range.end)
    }

    /// The intent URL for `content`: the prefix followed by the content,
    /// form-url-encoded with spaces written as `%20`.
    fn intent_url(&self, content: &str) -> String {
        let encoded: String = form_urlencoded::byte_serialize(content.as_bytes()).collect();
        format!("{}{}", self.intent_prefix(), encoded.replace('+', "%20"))
    }
}

/// Detects email addresses.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmailAddressDetector;

fn is_local_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'%' | b'+' | b'-')
}

fn is_domain_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-')
}

fn valid_domain(domain: &str) -> bool {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    let labels_ok = labels.iter().all(|label| {
        !label.is_empty() && !label.starts_with('-') && !label.ends_with('-') && label.len() <= 63
    });
    let tld = labels[labels.len() - 1];
    labels_ok && tld.len() >= 2 && tld.bytes().all(|b| b.is_ascii_alphabetic())
}

impl ContentDetector for EmailAddressDetector {
    fn intent_prefix(&self) -> &'static str {
        "mailto:"
    }

    fn find_all<'a>(&self, text: &'a str) -> Vec<Detected<'a>> {
        let bytes = text.as_bytes();
        let mut found = Vec::new();
        // matches never overlap; `floor` is where the previous one ended
        let mut floor = 0;

        for (at, _) in text.match_indices('@') {
            if at < floor {
                continue;
            }

            let mut start = at;
            while start > floor && is_local_char(bytes[start - 1]) {
                start -= 1;
            }
            // a local part never starts with a dot
            while start < at && bytes[start] == b'.' {
                start += 1;
            }

            let mut end = at + 1;
            while end < bytes.len() && is_domain_char(bytes[end]) {
                end += 1;
            }
            // sentence punctuation after the address
            while end > at + 1 && matches!(bytes[end - 1], b'.' | b'-') {
                end -= 1;
            }

            if start == at || !valid_domain(&text[at + 1..end]) {
                continue;
            }

            found.push(Detected {
                text,
                range: start..end,
            });
            floor = end;
        }

        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(text: &str) -> Vec<&str> {
        EmailAddressDetector
            .find_all(text)
            .iter()
            .map(|d| d.as_str())
            .collect()
    }

    #[test]
    fn finds_addresses_in_prose() {
        assert_eq!(
            find("Mail i.want.a.pony@chromium.org. Or nyan_cat@chromium.org, or 123@456.com!"),
            vec!["i.want.a.pony@chromium.org", "nyan_cat@chromium.org", "123@456.com"]
        );
    }

    #[test]
    fn rejects_incomplete_addresses() {
        assert!(find("@chromium.org").is_empty());
        assert!(find("user@localhost").is_empty());
        assert!(find("user@example.c0m").is_empty());
        assert!(find("user@-example.com").is_empty());
        assert!(find("user@example..com").is_empty());
    }

    #[test]
    fn find_content_at_offset() {
        let text = "write to a@b.org or c@d.org";
        let detected = EmailAddressDetector.find_content(text, 22).unwrap();
        assert_eq!(detected.as_str(), "c@d.org");
        assert_eq!(detected.range(), 20..27);
        assert!(EmailAddressDetector.find_content(text, 2).is_none());
    }

    #[test]
    fn intent_urls() {
        let d = EmailAddressDetector;
        assert_eq!(
            d.intent_url("i.want.a.pony@chromium.org"),
            "mailto:i.want.a.pony%40chromium.org"
        );
        assert_eq!(d.intent_url("nyan_cat@chromium.org"), "mailto:nyan_cat%40chromium.org");
        assert_eq!(d.intent_url("a b+c@d.org"), "mailto:a%20b%2Bc%40d.org");
    }
}

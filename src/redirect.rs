//! Redirect policies.
//!
//! Connections opened through a [`ConnectionBuilder`](crate::ConnectionBuilder)
//! follow up to 10 redirects unless another [`Policy`] is set. A
//! [`UrlRequest`](crate::UrlRequest) asks its callback about every redirect
//! and fails after 20.

use std::{error::Error as StdError, fmt};

use http::{
    header::{AUTHORIZATION, COOKIE, LOCATION, PROXY_AUTHORIZATION, WWW_AUTHENTICATE},
    HeaderMap, Method, StatusCode,
};

use crate::Url;

/// Decides whether a connection follows a redirect.
///
/// Both limits and loops are errors: a redirect back to a URL already in the
/// chain fails the connection, as does the hop after the limit.
#[derive(Clone, Copy, Debug)]
pub struct Policy {
    inner: PolicyKind,
}

#[derive(Clone, Copy, Debug)]
enum PolicyKind {
    Limit(usize),
    None,
}

#[derive(Debug)]
pub(crate) enum Action {
    Follow,
    Stop,
    Error(Box<dyn StdError + Send + Sync>),
}

impl Policy {
    /// Follows at most `max` redirects.
    pub fn limited(max: usize) -> Self {
        Self {
            inner: PolicyKind::Limit(max),
        }
    }

    /// Hands redirect responses back unfollowed.
    pub fn none() -> Self {
        Self {
            inner: PolicyKind::None,
        }
    }

    /// `previous` holds every URL already visited, starting with the initial one.
    pub(crate) fn check(&self, next: &Url, previous: &[Url]) -> Action {
        match self.inner {
            PolicyKind::Limit(max) => {
                // previous[0] is the initial URL, not a redirect
                if previous.len() > max {
                    Action::Error(Box::new(TooManyRedirects))
                } else if previous.contains(next) {
                    Action::Error(Box::new(RedirectLoop))
                } else {
                    Action::Follow
                }
            }
            PolicyKind::None => Action::Stop,
        }
    }
}

impl Default for Policy {
    fn default() -> Policy {
        Policy::limited(10)
    }
}

/// Resolves the `Location` of a redirect response against `base`.
pub(crate) fn location(status: StatusCode, headers: &HeaderMap, base: &Url) -> Option<Url> {
    if !matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    ) {
        return None;
    }
    let value = headers.get(LOCATION)?.to_str().ok()?;
    base.join(value).ok()
}

/// The method to use for the next hop. `None` keeps the method and body.
pub(crate) fn method_after(status: StatusCode, method: &Method) -> Option<Method> {
    match status {
        StatusCode::SEE_OTHER if *method != Method::HEAD => Some(Method::GET),
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND if *method == Method::POST => {
            Some(Method::GET)
        }
        _ => None,
    }
}

/// Strips credentials when the next hop leaves the host and port of the
/// previous one.
pub(crate) fn remove_sensitive_headers(headers: &mut HeaderMap, next: &Url, previous: &[Url]) {
    if let Some(previous) = previous.last() {
        let cross_host = next.host_str() != previous.host_str()
            || next.port_or_known_default() != previous.port_or_known_default();
        if cross_host {
            headers.remove(AUTHORIZATION);
            headers.remove(COOKIE);
            headers.remove("cookie2");
            headers.remove(PROXY_AUTHORIZATION);
            headers.remove(WWW_AUTHENTICATE);
        }
    }
}

#[derive(Debug)]
struct TooManyRedirects;

impl fmt::Display for TooManyRedirects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("too many redirects")
    }
}

impl StdError for TooManyRedirects {}

#[derive(Debug)]
struct RedirectLoop;

impl fmt::Display for RedirectLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("infinite redirect loop")
    }
}

impl StdError for RedirectLoop {}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    fn urls(paths: std::ops::Range<usize>) -> Vec<Url> {
        paths
            .map(|i| Url::parse(&format!("http://origin.test/{i}")).unwrap())
            .collect()
    }

    #[test]
    fn limit_counts_redirects_not_urls() {
        let policy = Policy::limited(3);
        let next = Url::parse("http://elsewhere.test/").unwrap();

        // initial URL plus two redirects: the third may follow
        assert!(matches!(policy.check(&next, &urls(0..3)), Action::Follow));
        // three redirects taken: a fourth is one too many
        match policy.check(&next, &urls(0..4)) {
            Action::Error(err) => assert!(err.is::<TooManyRedirects>()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn revisiting_a_url_is_a_loop() {
        let chain = urls(0..3);
        match Policy::default().check(&chain[1], &chain) {
            Action::Error(err) => assert!(err.is::<RedirectLoop>()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn none_stops() {
        let next = Url::parse("http://x.test/").unwrap();
        assert!(matches!(Policy::none().check(&next, &urls(0..1)), Action::Stop));
    }

    #[test]
    fn location_is_relative_to_base() {
        let base = Url::parse("http://a.test/c/d").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(LOCATION, HeaderValue::from_static("../e"));

        assert_eq!(
            location(StatusCode::FOUND, &headers, &base).unwrap().as_str(),
            "http://a.test/e"
        );
        assert!(location(StatusCode::OK, &headers, &base).is_none());
        assert!(location(StatusCode::SEE_OTHER, &HeaderMap::new(), &base).is_none());
    }

    #[test]
    fn method_rewrites() {
        assert_eq!(method_after(StatusCode::SEE_OTHER, &Method::PUT), Some(Method::GET));
        assert_eq!(method_after(StatusCode::SEE_OTHER, &Method::HEAD), None);
        assert_eq!(method_after(StatusCode::FOUND, &Method::POST), Some(Method::GET));
        assert_eq!(method_after(StatusCode::FOUND, &Method::PUT), None);
        assert_eq!(method_after(StatusCode::TEMPORARY_REDIRECT, &Method::POST), None);
    }

    #[test]
    fn credentials_dropped_across_origins() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        headers.insert(COOKIE, HeaderValue::from_static("id=1"));

        let same = Url::parse("http://origin.test/next").unwrap();
        remove_sensitive_headers(&mut headers, &same, &urls(0..1));
        assert_eq!(headers.len(), 3);

        let other_port = Url::parse("http://origin.test:8080/next").unwrap();
        remove_sensitive_headers(&mut headers, &other_port, &urls(0..1));
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key(http::header::ACCEPT));
    }
}

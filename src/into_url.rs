use url::Url;

use crate::Error;

/// A trait to try to convert some type into a `Url`.
///
/// This trait is "sealed", such that only types within rquest-engine can
/// implement it.
pub trait IntoUrl: IntoUrlSealed {}

impl IntoUrl for Url {}
impl IntoUrl for String {}
impl IntoUrl for &Url {}
impl IntoUrl for &str {}
impl IntoUrl for &String {}

pub trait IntoUrlSealed {
    // Besides parsing as a valid `Url`, the `Url` must use a scheme the
    // engine can fetch, which is `http` or `https`.
    fn into_url(self) -> crate::Result<Url>;

    fn as_str(&self) -> &str;
}

impl IntoUrlSealed for Url {
    fn into_url(self) -> crate::Result<Url> {
        if is_fetchable(&self) {
            Ok(self)
        } else {
            Err(Error::url_bad_scheme(self))
        }
    }

    fn as_str(&self) -> &str {
        self.as_ref()
    }
}

impl IntoUrlSealed for &Url {
    fn into_url(self) -> crate::Result<Url> {
        self.clone().into_url()
    }

    fn as_str(&self) -> &str {
        self.as_ref()
    }
}

impl<T> IntoUrlSealed for T
where
    T: AsRef<str> + sealed::Sealed,
{
    fn into_url(self) -> crate::Result<Url> {
        if self.as_ref().is_empty() {
            return Err(Error::missing_argument("url"));
        }
        Url::parse(self.as_ref())
            .map_err(Error::invalid_argument)?
            .into_url()
    }

    fn as_str(&self) -> &str {
        self.as_ref()
    }
}

fn is_fetchable(url: &Url) -> bool {
    supports_scheme(url.scheme()) && url.has_host()
}

/// `https` needs a TLS connector, compiled in with `default-tls`.
pub(crate) fn supports_scheme(scheme: &str) -> bool {
    match scheme {
        "http" => true,
        "https" => cfg!(feature = "default-tls"),
        _ => false,
    }
}

pub(crate) fn to_uri(url: &Url) -> crate::Result<http::Uri> {
    url.as_str()
        .parse::<http::Uri>()
        .map_err(|e| Error::invalid_argument(e).with_url(url.clone()))
}

mod sealed {
    pub trait Sealed {}

    impl Sealed for &str {}
    impl Sealed for String {}
    impl Sealed for &String {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_url_file_scheme() {
        let err = "file:///etc/hosts".into_url().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid argument for url (file:///etc/hosts): URL scheme is not allowed"
        );
    }

    #[test]
    fn into_url_ftp_scheme() {
        let err = "ftp://example.com/pub".into_url().unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn into_url_empty_is_missing() {
        let err = "".into_url().unwrap_err();
        assert!(err.is_missing_argument());
    }

    #[cfg(feature = "default-tls")]
    #[test]
    fn into_url_https() {
        let url = "https://example.com/a?b=c".into_url().unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
        assert_eq!(to_uri(&url).unwrap().path(), "/a");
    }

    #[cfg(not(feature = "default-tls"))]
    #[test]
    fn into_url_https_without_tls() {
        let err = "https://example.com/".into_url().unwrap_err();
        assert!(err.is_invalid_argument());
    }
}

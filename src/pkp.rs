//! Public key pinning configuration.
//!
//! A pin is the SHA-256 digest of the DER-encoded SubjectPublicKeyInfo of a
//! certificate in the host's chain. Pin sets are keyed by the normalized
//! (IDNA, lowercase) hostname.

use std::{
    collections::BTreeSet,
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};

use base64::Engine as _;
use serde::{Serialize, Serializer};
use url::Host;

use crate::{Error, Result};

/// Length in bytes of a SHA-256 digest.
pub const SHA256_LEN: usize = 32;

const MAX_HOSTNAME_LEN: usize = 255;

/// A SHA-256 public key pin.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sha256Pin([u8; SHA256_LEN]);

impl Sha256Pin {
    /// Creates a pin from a digest, failing unless it is exactly 32 bytes long.
    pub fn from_slice(digest: &[u8]) -> Result<Sha256Pin> {
        <[u8; SHA256_LEN]>::try_from(digest)
            .map(Sha256Pin)
            .map_err(|_| {
                Error::invalid_argument(format!(
                    "public key pin is invalid: expected {SHA256_LEN} bytes, got {}",
                    digest.len()
                ))
            })
    }

    /// The raw digest.
    pub fn as_bytes(&self) -> &[u8; SHA256_LEN] {
        &self.0
    }
}

impl fmt::Display for Sha256Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sha256/{}",
            base64::engine::general_purpose::STANDARD.encode(self.0)
        )
    }
}

impl fmt::Debug for Sha256Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for Sha256Pin {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The pins registered for one host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PublicKeyPins {
    host: String,
    pins: BTreeSet<Sha256Pin>,
    include_subdomains: bool,
    #[serde(serialize_with = "serialize_unix_secs")]
    expiration: SystemTime,
}

impl PublicKeyPins {
    /// Validates `host` and every pin, producing a pin set keyed by the
    /// normalized hostname.
    pub(crate) fn new<I>(
        host: &str,
        pins: I,
        include_subdomains: bool,
        expiration: SystemTime,
    ) -> Result<PublicKeyPins>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let host = normalize_host(host)?;
        let pins = pins
            .into_iter()
            .map(|pin| Sha256Pin::from_slice(pin.as_ref()))
            .collect::<Result<BTreeSet<_>>>()?;

        Ok(PublicKeyPins {
            host,
            pins,
            include_subdomains,
            expiration,
        })
    }

    /// The normalized hostname the pins apply to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The pinned digests.
    pub fn pins(&self) -> impl Iterator<Item = &Sha256Pin> {
        self.pins.iter()
    }

    /// Whether the pins also govern subdomains of [`host`](PublicKeyPins::host).
    pub fn include_subdomains(&self) -> bool {
        self.include_subdomains
    }

    /// The point in time after which the pins are ignored.
    pub fn expiration(&self) -> SystemTime {
        self.expiration
    }

    /// Returns true if `now` is past the expiration time.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        now >= self.expiration
    }

    /// Returns true if these pins govern `host`, ignoring expiration.
    ///
    /// `host` is expected in normalized form.
    pub fn matches_host(&self, host: &str) -> bool {
        if host == self.host {
            return true;
        }
        self.include_subdomains
            && host.len() > self.host.len()
            && host.ends_with(self.host.as_str())
            && host.as_bytes()[host.len() - self.host.len() - 1] == b'.'
    }

    /// Returns true if `pin` is one of the pinned digests.
    pub fn contains(&self, pin: &Sha256Pin) -> bool {
        self.pins.contains(pin)
    }
}

/// Validates a hostname for pinning and converts it to its ASCII form.
///
/// A hostname made up only of digits and dots is rejected, as is anything
/// longer than 255 bytes or anything that is not a DNS name.
pub(crate) fn normalize_host(host: &str) -> Result<String> {
    if host.is_empty() {
        return Err(Error::invalid_argument("hostname must not be empty"));
    }

    if host.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return Err(Error::invalid_argument(format!(
            "hostname {host} is illegal: a hostname should not consist of digits and/or dots only"
        )));
    }

    if host.len() > MAX_HOSTNAME_LEN {
        return Err(Error::invalid_argument(format!(
            "hostname {host} is too long"
        )));
    }

    match Host::parse(host) {
        // "example.com." and "example.com" are the same host
        Ok(Host::Domain(domain)) => Ok(match domain.strip_suffix('.') {
            Some(stripped) => stripped.to_owned(),
            None => domain,
        }),
        Ok(_) => Err(Error::invalid_argument(format!(
            "hostname {host} is an IP literal"
        ))),
        Err(e) => Err(Error::invalid_argument(format!(
            "hostname {host} is illegal: {e}"
        ))),
    }
}

fn serialize_unix_secs<S: Serializer>(
    time: &SystemTime,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    let secs = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    serializer.serialize_u64(secs)
}

//! Engine configuration.
//!
//! [`EngineConfig`] is the value accumulated by an `EngineBuilder`. `build()`
//! snapshots it into the engine, so later builder mutations never reach an
//! engine that was already built.

use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use serde::Serialize;

use crate::{builder::LibraryLoader, pkp::PublicKeyPins, Error, Result};

/// Where and what the engine caches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpCacheMode {
    /// No HTTP cache. Some data may still be held in memory temporarily.
    #[default]
    Disabled,
    /// In-memory cache, including HTTP data.
    InMemory,
    /// On-disk cache, excluding HTTP data. Requires a storage path.
    DiskNoHttp,
    /// On-disk cache, including HTTP data. Requires a storage path.
    Disk,
}

impl HttpCacheMode {
    /// Integer constant for [`HttpCacheMode::Disabled`].
    pub const HTTP_CACHE_DISABLED: i32 = 0;
    /// Integer constant for [`HttpCacheMode::InMemory`].
    pub const HTTP_CACHE_IN_MEMORY: i32 = 1;
    /// Integer constant for [`HttpCacheMode::DiskNoHttp`].
    pub const HTTP_CACHE_DISK_NO_HTTP: i32 = 2;
    /// Integer constant for [`HttpCacheMode::Disk`].
    pub const HTTP_CACHE_DISK: i32 = 3;

    /// Returns true for the modes that store data under the storage path.
    pub fn requires_storage(self) -> bool {
        matches!(self, HttpCacheMode::DiskNoHttp | HttpCacheMode::Disk)
    }
}

impl TryFrom<i32> for HttpCacheMode {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            HttpCacheMode::HTTP_CACHE_DISABLED => Ok(HttpCacheMode::Disabled),
            HttpCacheMode::HTTP_CACHE_IN_MEMORY => Ok(HttpCacheMode::InMemory),
            HttpCacheMode::HTTP_CACHE_DISK_NO_HTTP => Ok(HttpCacheMode::DiskNoHttp),
            HttpCacheMode::HTTP_CACHE_DISK => Ok(HttpCacheMode::Disk),
            other => Err(Error::invalid_argument(format!(
                "unknown HTTP cache mode {other}"
            ))),
        }
    }
}

/// A hint that `host:port` speaks QUIC on `alternate_port`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct QuicHint {
    /// Hostname of the server.
    pub host: String,
    /// Port of the server.
    pub port: u16,
    /// Alternate port to use for QUIC.
    pub alternate_port: u16,
}

/// The configuration an engine was built with.
#[derive(Clone, Serialize)]
pub struct EngineConfig {
    pub(crate) user_agent: Option<String>,
    pub(crate) storage_path: Option<PathBuf>,
    #[serde(skip)]
    pub(crate) library_loader: Option<Arc<dyn LibraryLoader>>,
    pub(crate) quic_enabled: bool,
    pub(crate) http2_enabled: bool,
    pub(crate) sdch_enabled: bool,
    pub(crate) http_cache_mode: HttpCacheMode,
    pub(crate) http_cache_max_size: u64,
    pub(crate) quic_hints: Vec<QuicHint>,
    #[serde(serialize_with = "serialize_pins")]
    pub(crate) public_key_pins: HashMap<String, PublicKeyPins>,
    pub(crate) public_key_pinning_bypass_for_local_trust_anchors: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            user_agent: None,
            storage_path: None,
            library_loader: None,
            quic_enabled: false,
            http2_enabled: true,
            sdch_enabled: false,
            http_cache_mode: HttpCacheMode::Disabled,
            http_cache_max_size: 0,
            quic_hints: Vec::new(),
            public_key_pins: HashMap::new(),
            public_key_pinning_bypass_for_local_trust_anchors: true,
        }
    }
}

impl EngineConfig {
    /// The user agent override, if one was set.
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    /// The storage directory, if one was set.
    pub fn storage_path(&self) -> Option<&Path> {
        self.storage_path.as_deref()
    }

    /// Whether QUIC is enabled.
    pub fn quic_enabled(&self) -> bool {
        self.quic_enabled
    }

    /// Whether HTTP/2 is enabled.
    pub fn http2_enabled(&self) -> bool {
        self.http2_enabled
    }

    /// Whether SDCH is enabled.
    pub fn sdch_enabled(&self) -> bool {
        self.sdch_enabled
    }

    /// The HTTP cache mode.
    pub fn http_cache_mode(&self) -> HttpCacheMode {
        self.http_cache_mode
    }

    /// The advisory maximum cache size in bytes.
    pub fn http_cache_max_size(&self) -> u64 {
        self.http_cache_max_size
    }

    /// QUIC hints, in the order they were added.
    pub fn quic_hints(&self) -> &[QuicHint] {
        &self.quic_hints
    }

    /// The pin set registered for `host`, looked up by exact normalized name.
    pub fn public_key_pins(&self, host: &str) -> Option<&PublicKeyPins> {
        self.public_key_pins.get(host)
    }

    /// Number of hosts with registered pins.
    pub fn public_key_pins_len(&self) -> usize {
        self.public_key_pins.len()
    }

    /// Whether locally installed trust anchors bypass pin checks.
    pub fn public_key_pinning_bypass_for_local_trust_anchors(&self) -> bool {
        self.public_key_pinning_bypass_for_local_trust_anchors
    }

    /// Whether a custom library loader was installed.
    pub fn has_library_loader(&self) -> bool {
        self.library_loader.is_some()
    }

    /// Finds the unexpired pin set governing `host`.
    ///
    /// An exact match wins; otherwise the closest parent domain whose pins
    /// include subdomains applies.
    pub(crate) fn pins_for(&self, host: &str, now: SystemTime) -> Option<&PublicKeyPins> {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        let mut candidate = host.as_str();
        loop {
            if let Some(pins) = self.public_key_pins.get(candidate) {
                if pins.matches_host(&host) && !pins.is_expired(now) {
                    return Some(pins);
                }
            }
            match candidate.find('.') {
                Some(idx) => candidate = &candidate[idx + 1..],
                None => return None,
            }
        }
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("user_agent", &self.user_agent)
            .field("storage_path", &self.storage_path)
            .field("library_loader", &self.library_loader.is_some())
            .field("quic_enabled", &self.quic_enabled)
            .field("http2_enabled", &self.http2_enabled)
            .field("sdch_enabled", &self.sdch_enabled)
            .field("http_cache_mode", &self.http_cache_mode)
            .field("http_cache_max_size", &self.http_cache_max_size)
            .field("quic_hints", &self.quic_hints)
            .field("public_key_pins", &self.public_key_pins)
            .field(
                "public_key_pinning_bypass_for_local_trust_anchors",
                &self.public_key_pinning_bypass_for_local_trust_anchors,
            )
            .finish()
    }
}

fn serialize_pins<S: serde::Serializer>(
    pins: &HashMap<String, PublicKeyPins>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    let mut sorted: Vec<&PublicKeyPins> = pins.values().collect();
    sorted.sort_by(|a, b| a.host().cmp(b.host()));
    serializer.collect_seq(sorted)
}

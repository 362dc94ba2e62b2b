use std::{fmt, path::PathBuf, sync::Arc, time::SystemTime};

use log::debug;

use super::{BuilderDelegate, LibraryLoader, SystemLibraryLoader};
use crate::{
    config::{EngineConfig, HttpCacheMode, QuicHint},
    engine::{Engine, USER_AGENT_PRODUCT},
    pkp::PublicKeyPins,
    Context, Error, Result,
};

/// Name passed to the [`LibraryLoader`] when an engine is built.
pub const LIBRARY_NAME: &str = concat!("rquest_engine.", env!("CARGO_PKG_VERSION"));

/// The default [`BuilderDelegate`]: validates options and builds engines
/// running on a dedicated network thread.
pub struct NativeBuilder {
    context: Context,
    config: EngineConfig,
    deferred: Option<Deferred>,
}

impl fmt::Debug for NativeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeBuilder")
            .field("config", &self.config)
            .field("deferred", &self.deferred)
            .finish_non_exhaustive()
    }
}

/// A configuration error that is only reported by `build()`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Deferred {
    DiskCacheWithoutStoragePath,
}

impl NativeBuilder {
    /// Creates a delegate with the default configuration.
    pub fn new(context: &Context) -> NativeBuilder {
        NativeBuilder {
            context: context.clone(),
            config: EngineConfig::default(),
            deferred: None,
        }
    }

    /// The configuration collected so far.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn check(&self) -> Result<()> {
        if let Some(Deferred::DiskCacheWithoutStoragePath) = self.deferred {
            return Err(Error::builder(
                "storage path must be set before enabling a disk cache",
            ));
        }

        if let Some(ref path) = self.config.storage_path {
            if !path.is_dir() {
                return Err(Error::builder(format!(
                    "storage path {} must be an existing directory",
                    path.display()
                )));
            }
        }

        Ok(())
    }
}

impl BuilderDelegate for NativeBuilder {
    fn default_user_agent(&self) -> String {
        let name = self.context.application_name();
        if name.is_empty() {
            return USER_AGENT_PRODUCT.to_owned();
        }
        format!(
            "{}/{} {}",
            name,
            self.context.application_version(),
            USER_AGENT_PRODUCT
        )
    }

    fn set_user_agent(&mut self, user_agent: String) {
        self.config.user_agent = Some(user_agent);
    }

    fn set_storage_path(&mut self, path: PathBuf) {
        self.config.storage_path = Some(path);
    }

    fn set_library_loader(&mut self, loader: Arc<dyn LibraryLoader>) {
        self.config.library_loader = Some(loader);
    }

    fn enable_quic(&mut self, value: bool) {
        self.config.quic_enabled = value;
    }

    fn enable_http2(&mut self, value: bool) {
        self.config.http2_enabled = value;
    }

    fn enable_sdch(&mut self, value: bool) {
        self.config.sdch_enabled = value;
    }

    fn enable_http_cache(&mut self, mode: HttpCacheMode, max_size: u64) {
        // Only the latest cache setting counts: a disk mode enabled after the
        // storage path was set clears an earlier violation.
        self.deferred = if mode.requires_storage() && self.config.storage_path.is_none() {
            debug!("disk cache {mode:?} enabled without a storage path");
            Some(Deferred::DiskCacheWithoutStoragePath)
        } else {
            None
        };
        self.config.http_cache_mode = mode;
        self.config.http_cache_max_size = max_size;
    }

    fn add_quic_hint(&mut self, host: &str, port: u16, alternate_port: u16) -> Result<()> {
        if host.is_empty() {
            return Err(Error::missing_argument("host"));
        }
        if host.contains('/') {
            return Err(Error::invalid_argument(format!(
                "illegal QUIC hint host: {host}"
            )));
        }
        self.config.quic_hints.push(QuicHint {
            host: host.to_owned(),
            port,
            alternate_port,
        });
        Ok(())
    }

    fn add_public_key_pins(
        &mut self,
        host: &str,
        pins: Vec<Vec<u8>>,
        include_subdomains: bool,
        expiration: SystemTime,
    ) -> Result<()> {
        let pins = PublicKeyPins::new(host, pins, include_subdomains, expiration)?;
        if let Some(previous) = self
            .config
            .public_key_pins
            .insert(pins.host().to_owned(), pins)
        {
            debug!("replaced public key pins for {}", previous.host());
        }
        Ok(())
    }

    fn enable_public_key_pinning_bypass_for_local_trust_anchors(&mut self, value: bool) {
        self.config.public_key_pinning_bypass_for_local_trust_anchors = value;
    }

    fn build(&self) -> Result<Engine> {
        self.check()?;

        let loaded = match self.config.library_loader {
            Some(ref loader) => loader.load_library(LIBRARY_NAME),
            None => SystemLibraryLoader.load_library(LIBRARY_NAME),
        };
        loaded.map_err(Error::builder)?;

        if self.config.quic_enabled {
            debug!(
                "QUIC enabled with {} hint(s); connections use TCP until a QUIC transport is available",
                self.config.quic_hints.len()
            );
        }

        let mut config = self.config.clone();
        if config.user_agent.is_none() {
            config.user_agent = Some(self.default_user_agent());
        }

        Engine::start(&self.context, config)
    }
}

use std::{path::PathBuf, sync::Arc, time::SystemTime};

use super::LibraryLoader;
use crate::{config::HttpCacheMode, Engine, Result};

/// The implementation an `EngineBuilder` forwards to.
///
/// A delegate owns the configuration and performs all validation; the
/// builder only passes calls through. Custom delegates are installed with
/// [`Context::with_builder_delegate`](crate::Context::with_builder_delegate)
/// and typically wrap a [`NativeBuilder`](super::NativeBuilder).
pub trait BuilderDelegate: Send {
    /// See [`EngineBuilder::default_user_agent`](super::EngineBuilder::default_user_agent).
    fn default_user_agent(&self) -> String;

    /// See [`EngineBuilder::set_user_agent`](super::EngineBuilder::set_user_agent).
    fn set_user_agent(&mut self, user_agent: String);

    /// See [`EngineBuilder::set_storage_path`](super::EngineBuilder::set_storage_path).
    fn set_storage_path(&mut self, path: PathBuf);

    /// See [`EngineBuilder::set_library_loader`](super::EngineBuilder::set_library_loader).
    fn set_library_loader(&mut self, loader: Arc<dyn LibraryLoader>);

    /// See [`EngineBuilder::enable_quic`](super::EngineBuilder::enable_quic).
    fn enable_quic(&mut self, value: bool);

    /// See [`EngineBuilder::enable_http2`](super::EngineBuilder::enable_http2).
    fn enable_http2(&mut self, value: bool);

    /// See [`EngineBuilder::enable_sdch`](super::EngineBuilder::enable_sdch).
    fn enable_sdch(&mut self, value: bool);

    /// See [`EngineBuilder::enable_http_cache`](super::EngineBuilder::enable_http_cache).
    fn enable_http_cache(&mut self, mode: HttpCacheMode, max_size: u64);

    /// See [`EngineBuilder::add_quic_hint`](super::EngineBuilder::add_quic_hint).
    fn add_quic_hint(&mut self, host: &str, port: u16, alternate_port: u16) -> Result<()>;

    /// See [`EngineBuilder::add_public_key_pins`](super::EngineBuilder::add_public_key_pins).
    fn add_public_key_pins(
        &mut self,
        host: &str,
        pins: Vec<Vec<u8>>,
        include_subdomains: bool,
        expiration: SystemTime,
    ) -> Result<()>;

    /// See [`EngineBuilder::enable_public_key_pinning_bypass_for_local_trust_anchors`](super::EngineBuilder::enable_public_key_pinning_bypass_for_local_trust_anchors).
    fn enable_public_key_pinning_bypass_for_local_trust_anchors(&mut self, value: bool);

    /// See [`EngineBuilder::build`](super::EngineBuilder::build).
    fn build(&self) -> Result<Engine>;
}

//! Engine configuration.
//!
//! An [`EngineBuilder`] collects options and then creates an [`Engine`] with
//! [`build`](EngineBuilder::build). Every option is forwarded to a
//! [`BuilderDelegate`] chosen by the [`Context`] the builder was created from;
//! the builder itself holds no configuration.
//!
//! The default configuration enables HTTP/2 and disables QUIC, SDCH and the
//! HTTP cache.

mod delegate;
mod native;

use std::{fmt, path::PathBuf, sync::Arc, time::SystemTime};

pub use self::{
    delegate::BuilderDelegate,
    native::{NativeBuilder, LIBRARY_NAME},
};
use crate::{config::HttpCacheMode, error::BoxError, Context, Engine};

/// Loads the engine's native library.
///
/// Applications needing custom loading logic implement this and pass it to
/// [`EngineBuilder::set_library_loader`]. The loader is invoked by every
/// `build()`, so it must tolerate being called more than once.
pub trait LibraryLoader: Send + Sync + 'static {
    /// Loads the library called `name`.
    fn load_library(&self, name: &str) -> Result<(), BoxError>;
}

/// The loader used when none is installed.
///
/// The engine is linked into the application, so there is nothing to load;
/// the request is only traced.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemLibraryLoader;

impl LibraryLoader for SystemLibraryLoader {
    fn load_library(&self, name: &str) -> Result<(), BoxError> {
        log::trace!("library {name} is statically linked");
        Ok(())
    }
}

/// A builder for [`Engine`]s.
///
/// # Example
///
/// ```no_run
/// use rquest_engine::{Context, EngineBuilder, HttpCacheMode};
///
/// # fn run() -> rquest_engine::Result<()> {
/// let context = Context::new("my-app", "1.0");
/// let engine = EngineBuilder::new(&context)
///     .set_user_agent("my-app/1.0")
///     .enable_quic(true)
///     .enable_http_cache(HttpCacheMode::InMemory, 1024 * 1024)
///     .build()?;
/// println!("{}", engine.version_string());
/// engine.shutdown()?;
/// # Ok(())
/// # }
/// ```
#[must_use]
pub struct EngineBuilder {
    delegate: Box<dyn BuilderDelegate>,
}

impl EngineBuilder {
    /// Constructs a builder whose delegate is resolved from `context`.
    pub fn new(context: &Context) -> EngineBuilder {
        EngineBuilder {
            delegate: context.load_delegate(),
        }
    }

    /// A User-Agent string made of the application name and version and the
    /// engine version.
    pub fn default_user_agent(&self) -> String {
        self.delegate.default_user_agent()
    }

    /// Overrides the User-Agent header for all requests. A User-Agent header
    /// set on an individual request overrides this value.
    pub fn set_user_agent(&mut self, user_agent: impl Into<String>) -> &mut Self {
        self.delegate.set_user_agent(user_agent.into());
        self
    }

    /// Sets the directory for the HTTP cache and cookie storage. The directory
    /// must exist when [`build`](EngineBuilder::build) runs.
    ///
    /// Do not use the same directory with more than one live engine at a time.
    pub fn set_storage_path(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.delegate.set_storage_path(path.into());
        self
    }

    /// Sets the [`LibraryLoader`] used to load the engine library.
    ///
    /// If not set, [`SystemLibraryLoader`] is used.
    pub fn set_library_loader<L: LibraryLoader>(&mut self, loader: L) -> &mut Self {
        self.delegate.set_library_loader(Arc::new(loader));
        self
    }

    /// Sets whether QUIC is enabled. Defaults to disabled.
    pub fn enable_quic(&mut self, value: bool) -> &mut Self {
        self.delegate.enable_quic(value);
        self
    }

    /// Sets whether HTTP/2 is enabled. Defaults to enabled.
    pub fn enable_http2(&mut self, value: bool) -> &mut Self {
        self.delegate.enable_http2(value);
        self
    }

    /// Sets whether SDCH compression is enabled. Defaults to disabled.
    pub fn enable_sdch(&mut self, value: bool) -> &mut Self {
        self.delegate.enable_sdch(value);
        self
    }

    /// Enables or disables caching of HTTP data and other information like
    /// QUIC server information.
    ///
    /// [`set_storage_path`](EngineBuilder::set_storage_path) must be called
    /// before passing a disk mode; otherwise `build()` fails. `max_size` is
    /// advisory and may be exceeded at times.
    pub fn enable_http_cache(&mut self, mode: HttpCacheMode, max_size: u64) -> &mut Self {
        self.delegate.enable_http_cache(mode, max_size);
        self
    }

    /// Adds a hint that `host` supports QUIC on `alternate_port`.
    ///
    /// Hints are kept in order; duplicates are kept too.
    pub fn add_quic_hint(
        &mut self,
        host: &str,
        port: u16,
        alternate_port: u16,
    ) -> crate::Result<&mut Self> {
        self.delegate.add_quic_hint(host, port, alternate_port)?;
        Ok(self)
    }

    /// Pins a set of public keys for `host`.
    ///
    /// Each pin is the SHA-256 digest of the DER-encoded SubjectPublicKeyInfo
    /// of a certificate in the host's chain. Calling this again for the same
    /// host replaces the previous pins.
    ///
    /// # Errors
    ///
    /// Fails with an invalid-argument error if `host` is empty, consists only
    /// of digits and dots, or is otherwise not a DNS name, or if any pin is not
    /// 32 bytes long.
    pub fn add_public_key_pins<I>(
        &mut self,
        host: &str,
        pins: I,
        include_subdomains: bool,
        expiration: SystemTime,
    ) -> crate::Result<&mut Self>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let pins = pins.into_iter().map(|pin| pin.as_ref().to_vec()).collect();
        self.delegate
            .add_public_key_pins(host, pins, include_subdomains, expiration)?;
        Ok(self)
    }

    /// Enables or disables the public key pinning bypass for local trust
    /// anchors. Defaults to enabled.
    ///
    /// Disabling the bypass is highly discouraged: a user routing traffic
    /// through a TLS-intercepting proxy they trust would no longer reach the
    /// pinned hosts.
    pub fn enable_public_key_pinning_bypass_for_local_trust_anchors(
        &mut self,
        value: bool,
    ) -> &mut Self {
        self.delegate
            .enable_public_key_pinning_bypass_for_local_trust_anchors(value);
        self
    }

    /// Builds an [`Engine`] from a snapshot of the current configuration.
    ///
    /// The builder can be reused; changes made afterwards only affect engines
    /// built later.
    ///
    /// # Errors
    ///
    /// Fails with a builder error if a disk cache was enabled before a storage
    /// path was set, if the storage path is not an existing directory or is in
    /// use by another live engine, or if the library loader fails.
    pub fn build(&self) -> crate::Result<Engine> {
        self.delegate.build()
    }
}

impl fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuilder").finish_non_exhaustive()
    }
}

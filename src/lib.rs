#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # rquest-engine
//!
//! The `rquest-engine` crate provides a configurable HTTP engine behind a
//! builder facade.
//!
//! - An [`EngineBuilder`] collecting protocol toggles, cache mode, QUIC hints
//!   and public key pins, forwarding every option to a pluggable
//!   [`BuilderDelegate`]
//! - An [`Engine`] owning a dedicated network thread, with an explicit
//!   [`shutdown`](Engine::shutdown)
//! - Callback-driven [`UrlRequest`]s and blocking [`HttpConnection`]s
//! - A JSON [NetLog](Engine::start_net_log_to_file)
//! - Process-wide, take-and-reset [metrics](Engine::global_metrics_deltas)
//!
//! ## Building an engine
//!
//! Builders are created from a [`Context`] naming the application. The
//! default configuration enables HTTP/2 and disables QUIC, SDCH and the HTTP
//! cache.
//!
//! ```rust
//! use rquest_engine::{Context, EngineBuilder};
//!
//! # fn run() -> rquest_engine::Result<()> {
//! let context = Context::new("my-app", "1.0");
//! let engine = EngineBuilder::new(&context).enable_quic(true).build()?;
//!
//! assert!(engine.version_string().starts_with("rquest-engine/"));
//! engine.shutdown()?;
//! # Ok(())
//! # }
//! # run().unwrap();
//! ```
//!
//! ## Reading a response
//!
//! [`Engine::open_connection`] blocks until the response head arrives and
//! returns a connection implementing [`std::io::Read`].
//!
//! ```rust,no_run
//! use std::io::Read;
//!
//! # fn run(engine: rquest_engine::Engine) -> Result<(), Box<dyn std::error::Error>> {
//! let mut conn = engine.open_connection("http://example.com/")?;
//! let mut body = String::new();
//! conn.read_to_string(&mut body)?;
//! println!("{} {}", conn.status(), body);
//! # Ok(())
//! # }
//! ```
//!
//! ## Public key pins
//!
//! Pins are SHA-256 digests of a certificate's SubjectPublicKeyInfo. Adding
//! pins for a host that already has some replaces them.
//!
//! ```rust
//! use std::time::{Duration, SystemTime};
//!
//! # fn run() -> rquest_engine::Result<()> {
//! let context = rquest_engine::Context::new("my-app", "1.0");
//! let mut builder = rquest_engine::EngineBuilder::new(&context);
//! let expiration = SystemTime::now() + Duration::from_secs(86400);
//! builder.add_public_key_pins("example.com", [[0u8; 32]], true, expiration)?;
//!
//! // not a DNS name
//! assert!(builder
//!     .add_public_key_pins("127.0.0.1", [[0u8; 32]], true, expiration)
//!     .is_err());
//! # Ok(())
//! # }
//! # run().unwrap();
//! ```

pub use http::header;
pub use http::Method;
pub use http::{StatusCode, Version};
pub use url::Url;

pub use self::builder::{
    BuilderDelegate, EngineBuilder, LibraryLoader, NativeBuilder, SystemLibraryLoader,
    LIBRARY_NAME,
};
pub use self::config::{EngineConfig, HttpCacheMode, QuicHint};
pub use self::connection::{
    ConnectionBuilder, ConnectionFactory, ConnectionHandler, HttpConnection, StreamHandler,
    StreamHandlerFactory,
};
pub use self::context::{Context, DelegateFactory};
pub use self::detect::{ContentDetector, Detected, EmailAddressDetector};
pub use self::engine::{Engine, USER_AGENT_PRODUCT};
pub use self::error::{BoxError, Error, Result};
pub use self::into_url::IntoUrl;
pub use self::metrics::{Metrics, MetricsDelta};
pub use self::netlog::CaptureMode;
pub use self::pkp::{PublicKeyPins, Sha256Pin, SHA256_LEN};
pub use self::request::{
    Callback, Executor, RedirectAction, UrlRequest, UrlRequestBuilder, UrlResponseInfo,
};

mod builder;
mod config;
mod connection;
mod context;
pub mod detect;
mod engine;
mod error;
mod into_url;
mod metrics;
mod netlog;
mod pkp;
pub mod redirect;
mod request;
mod storage;
mod sync;

fn _assert_impls() {
    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}
    fn assert_clone<T: Clone>() {}

    assert_send::<Engine>();
    assert_sync::<Engine>();
    assert_clone::<Engine>();

    assert_send::<EngineBuilder>();
    assert_send::<UrlRequest>();
    assert_sync::<UrlRequest>();
    assert_send::<HttpConnection>();

    assert_send::<Error>();
    assert_sync::<Error>();

    assert_send::<Context>();
    assert_sync::<Context>();
    assert_clone::<Context>();
}

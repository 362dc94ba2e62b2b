//! The engine handle.
//!
//! An [`Engine`] is created by [`EngineBuilder::build`](crate::EngineBuilder::build)
//! and owns a dedicated network thread. It stays usable until
//! [`shutdown`](Engine::shutdown) succeeds; afterwards every operation fails
//! with an illegal-state error.

mod fetch;
mod handle;

use std::{
    fmt,
    future::Future,
    ops::Deref,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread::{self, ThreadId},
    time::SystemTime,
};

use log::{debug, warn};
use serde_json::json;

pub(crate) use self::{
    fetch::{read_chunk, send, Hop},
    handle::HttpClient,
};
use self::handle::NetworkThread;
use crate::{
    config::EngineConfig,
    connection::{ConnectionBuilder, ConnectionFactory, HttpConnection},
    metrics::Metrics,
    netlog::NetLog,
    pkp::PublicKeyPins,
    request::{Callback, Executor, UrlRequestBuilder},
    storage::StorageLock,
    sync::Mutex,
    Context, Error, IntoUrl, Result,
};

/// The product token engines put in their default User-Agent.
pub const USER_AGENT_PRODUCT: &str = concat!("rquest-engine/", env!("CARGO_PKG_VERSION"));

/// A running engine.
///
/// Cloning an `Engine` yields another handle to the same engine.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineRef>,
}

struct EngineRef {
    shared: Arc<Shared>,
    thread: Mutex<Option<NetworkThread>>,
    storage: Mutex<Option<StorageLock>>,
}

/// State reachable from jobs running on the network thread. Jobs never hold
/// the `EngineRef`, so the thread is never asked to join itself.
pub(crate) struct Shared {
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) netlog: NetLog,
    pub(crate) metrics: Metrics,
    pub(crate) network_thread: ThreadId,
    active: AtomicUsize,
}

impl Shared {
    pub(crate) fn on_network_thread(&self) -> bool {
        thread::current().id() == self.network_thread
    }
}

/// Counts one active request until dropped.
pub(crate) struct Active {
    shared: Arc<Shared>,
}

impl Active {
    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }
}

impl Deref for Active {
    type Target = Shared;

    fn deref(&self) -> &Shared {
        &self.shared
    }
}

impl Drop for Active {
    fn drop(&mut self) {
        self.shared.active.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Engine {
    pub(crate) fn start(context: &Context, config: EngineConfig) -> Result<Engine> {
        let storage = match config.storage_path() {
            Some(path) => Some(StorageLock::acquire(path)?),
            None => None,
        };

        let thread = NetworkThread::start(&config)?;
        debug!(
            "engine started on {:?} (http2: {}, quic: {}, cache: {:?})",
            thread.id(),
            config.http2_enabled(),
            config.quic_enabled(),
            config.http_cache_mode()
        );

        let shared = Arc::new(Shared {
            config: Arc::new(config),
            netlog: NetLog::new(),
            metrics: context.metrics().clone(),
            network_thread: thread.id(),
            active: AtomicUsize::new(0),
        });

        Ok(Engine {
            inner: Arc::new(EngineRef {
                shared,
                thread: Mutex::new(Some(thread)),
                storage: Mutex::new(storage),
            }),
        })
    }

    /// A human-readable engine version, `rquest-engine/<version>`.
    pub fn version_string(&self) -> String {
        USER_AGENT_PRODUCT.to_owned()
    }

    /// Shuts the engine down, releasing the network thread, its connections
    /// and the storage directory.
    ///
    /// # Errors
    ///
    /// Fails with an illegal-state error if requests are still active, if the
    /// engine is already shut down, or if called from the engine's network
    /// thread.
    pub fn shutdown(&self) -> Result<()> {
        let thread = {
            let mut guard = self.inner.thread.lock();
            let Some(ref thread) = *guard else {
                return Err(Error::shut_down());
            };
            if thread::current().id() == thread.id() {
                return Err(Error::illegal_state(
                    "cannot shut down the engine from its network thread",
                ));
            }
            let active = self.inner.shared.active.load(Ordering::Acquire);
            if active > 0 {
                return Err(Error::illegal_state(format!(
                    "cannot shut down with {active} active request(s)"
                )));
            }
            guard.take()
        };

        if let Err(e) = self.inner.shared.netlog.stop() {
            warn!("failed to finish NetLog during shutdown: {e}");
        }
        // joins the network thread
        drop(thread);
        self.inner.storage.lock().take();
        debug!("engine shut down");
        Ok(())
    }

    /// Starts writing NetLog events to `path`, truncating it.
    ///
    /// With `log_all` the log includes cookies, credentials and transferred
    /// bytes. Calling this while a log is active does nothing.
    pub fn start_net_log_to_file<P: AsRef<Path>>(&self, path: P, log_all: bool) -> Result<()> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::missing_argument("path"));
        }
        self.ensure_running()?;

        let constants = json!({
            "engine_version": self.version_string(),
            "config": &*self.inner.shared.config,
        });
        self.inner.shared.netlog.start(path, log_all, constants)
    }

    /// Stops NetLog and flushes the file. Does nothing if no log is active.
    pub fn stop_net_log(&self) -> Result<()> {
        self.inner.shared.netlog.stop()
    }

    /// Metrics recorded by every engine sharing this engine's [`Metrics`]
    /// since the previous call, encoded as a blob readable with
    /// [`MetricsDelta::decode`](crate::MetricsDelta::decode).
    ///
    /// The first call starts collection and returns an empty blob, as does
    /// any call with nothing to report.
    pub fn global_metrics_deltas(&self) -> Vec<u8> {
        self.inner.shared.metrics.take_encoded()
    }

    /// Opens a `GET` connection to `url`, following redirects.
    ///
    /// This blocks until the response head arrives.
    pub fn open_connection<U: IntoUrl>(&self, url: U) -> Result<HttpConnection> {
        self.connection(url).open()
    }

    /// Starts configuring a connection to `url`.
    pub fn connection<U: IntoUrl>(&self, url: U) -> ConnectionBuilder {
        ConnectionBuilder::new(self.clone(), url.into_url())
    }

    /// A factory handing out connection handlers for `http` and `https`.
    pub fn create_connection_factory(&self) -> ConnectionFactory {
        ConnectionFactory::new(self.clone())
    }

    /// Starts building a request whose callbacks run on `executor`.
    pub fn new_request_builder<U, C, E>(&self, url: U, callback: C, executor: E) -> UrlRequestBuilder
    where
        U: IntoUrl,
        C: Callback,
        E: Executor,
    {
        UrlRequestBuilder::new(self.clone(), url.into_url(), Arc::new(callback), Arc::new(executor))
    }

    /// The configuration this engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.shared.config
    }

    /// The unexpired pin set governing `host`, honouring pins that include
    /// subdomains.
    pub fn public_key_pins_for(&self, host: &str) -> Option<&PublicKeyPins> {
        self.inner.shared.config.pins_for(host, SystemTime::now())
    }

    /// Number of requests and connections in flight.
    pub fn active_requests(&self) -> usize {
        self.inner.shared.active.load(Ordering::Acquire)
    }

    /// Returns true once [`shutdown`](Engine::shutdown) succeeded.
    pub fn is_shut_down(&self) -> bool {
        self.inner.thread.lock().is_none()
    }

    pub(crate) fn on_network_thread(&self) -> bool {
        self.inner.shared.on_network_thread()
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(Error::shut_down());
        }
        Ok(())
    }

    /// Runs a request on the network thread. The request counts as active
    /// until the [`Active`] handed to `f` is dropped.
    pub(crate) fn execute<F, Fut>(&self, f: F) -> Result<()>
    where
        F: FnOnce(Active, HttpClient) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        // Held across the send so shutdown cannot slip in between.
        let guard = self.inner.thread.lock();
        let thread = guard.as_ref().ok_or_else(Error::shut_down)?;

        self.inner.shared.active.fetch_add(1, Ordering::AcqRel);
        let active = Active {
            shared: self.inner.shared.clone(),
        };
        thread.spawn(move |client| f(active, client))
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("version", &USER_AGENT_PRODUCT)
            .field("active_requests", &self.active_requests())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl Drop for EngineRef {
    fn drop(&mut self) {
        if self.thread.lock().is_some() {
            if let Err(e) = self.shared.netlog.stop() {
                warn!("failed to finish NetLog: {e}");
            }
            debug!("engine dropped without shutdown");
        }
    }
}

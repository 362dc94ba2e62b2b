use std::{
    future::Future,
    pin::Pin,
    sync::mpsc as std_mpsc,
    thread::{self, ThreadId},
};

use hyper::{client::HttpConnector, Body};
use log::{error, trace, warn};
use tokio::sync::mpsc;

use crate::{config::EngineConfig, Error, Result};

#[cfg(feature = "default-tls")]
type Connector = hyper_tls::HttpsConnector<HttpConnector>;
#[cfg(not(feature = "default-tls"))]
type Connector = HttpConnector;

/// The HTTP client owned by the network thread.
pub(crate) type HttpClient = hyper::Client<Connector, Body>;

type Task = Pin<Box<dyn Future<Output = ()> + Send>>;
type Job = Box<dyn FnOnce(HttpClient) -> Task + Send>;

/// The engine's network thread: a current-thread tokio runtime driving one
/// hyper client. Jobs are spawned onto the runtime; dropping the handle closes
/// the job channel and joins the thread.
pub(crate) struct NetworkThread {
    tx: Option<mpsc::UnboundedSender<Job>>,
    thread: Option<thread::JoinHandle<()>>,
    id: ThreadId,
}

impl NetworkThread {
    pub(crate) fn start(config: &EngineConfig) -> Result<NetworkThread> {
        let http2 = config.http2_enabled();
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let (spawn_tx, spawn_rx) = std_mpsc::sync_channel::<Result<()>>(1);
        let handle = thread::Builder::new()
            .name("rquest-engine-network".into())
            .spawn(move || {
                use tokio::runtime;
                let rt = match runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(Error::builder)
                {
                    Err(e) => {
                        if let Err(e) = spawn_tx.send(Err(e)) {
                            error!("Failed to communicate runtime creation failure: {:?}", e);
                        }
                        return;
                    }
                    Ok(v) => v,
                };

                let f = async move {
                    let client = match build_client(http2) {
                        Err(e) => {
                            if let Err(e) = spawn_tx.send(Err(e)) {
                                error!("Failed to communicate client creation failure: {:?}", e);
                            }
                            return;
                        }
                        Ok(v) => v,
                    };
                    if let Err(e) = spawn_tx.send(Ok(())) {
                        error!("Failed to communicate successful startup: {:?}", e);
                        return;
                    }

                    let mut rx = rx;

                    while let Some(job) = rx.recv().await {
                        tokio::spawn(job(client.clone()));
                    }

                    trace!("({:?}) Receiver is shutdown", thread::current().id());
                };

                trace!("({:?}) start runtime::block_on", thread::current().id());
                rt.block_on(f);
                trace!("({:?}) end runtime::block_on", thread::current().id());
                drop(rt);
                trace!("({:?}) finished", thread::current().id());
            })
            .map_err(Error::builder)?;

        // Wait for the runtime thread to start up...
        match spawn_rx.recv() {
            Ok(Ok(())) => (),
            Ok(Err(err)) => {
                let _ = handle.join();
                return Err(err);
            }
            Err(_canceled) => {
                let _ = handle.join();
                return Err(Error::builder("network thread exited during startup"));
            }
        }

        Ok(NetworkThread {
            tx: Some(tx),
            id: handle.thread().id(),
            thread: Some(handle),
        })
    }

    pub(crate) fn id(&self) -> ThreadId {
        self.id
    }

    /// Spawns the future returned by `f` onto the network thread.
    pub(crate) fn spawn<F, Fut>(&self, f: F) -> Result<()>
    where
        F: FnOnce(HttpClient) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let job: Job = Box::new(move |client| Box::pin(f(client)));
        self.tx
            .as_ref()
            .ok_or_else(Error::shut_down)?
            .send(job)
            .map_err(|_| Error::illegal_state("network thread exited"))
    }
}

impl Drop for NetworkThread {
    fn drop(&mut self) {
        let id = self.id;

        trace!("closing runtime thread ({:?})", id);
        self.tx.take();
        trace!("signaled close for runtime thread ({:?})", id);

        if thread::current().id() == id {
            // The last engine handle went away inside a job; the runtime winds
            // down on its own once this job returns.
            warn!("engine dropped on its own network thread; detaching");
            self.thread.take();
            return;
        }

        self.thread.take().map(|h| h.join());
        trace!("closed runtime thread ({:?})", id);
    }
}

#[cfg(not(feature = "default-tls"))]
fn build_client(_http2: bool) -> Result<HttpClient> {
    // Without TLS there is no ALPN; cleartext connections stay on HTTP/1.1.
    let mut http = HttpConnector::new();
    http.set_nodelay(true);
    Ok(hyper::Client::builder().build(http))
}

#[cfg(feature = "default-tls")]
fn build_client(http2: bool) -> Result<HttpClient> {
    let mut http = HttpConnector::new();
    http.set_nodelay(true);
    http.enforce_http(false);

    let alpn: &[&str] = if http2 {
        &["h2", "http/1.1"]
    } else {
        &["http/1.1"]
    };
    let tls = native_tls_crate::TlsConnector::builder()
        .request_alpns(alpn)
        .build()
        .map_err(Error::builder)?;
    let https = hyper_tls::HttpsConnector::from((http, tokio_native_tls::TlsConnector::from(tls)));

    Ok(hyper::Client::builder().build(https))
}

impl std::fmt::Debug for NetworkThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkThread")
            .field("id", &self.id)
            .field("running", &self.tx.is_some())
            .finish()
    }
}

//! Callback-driven requests.
//!
//! A [`UrlRequest`] runs on the engine's network thread and reports progress
//! to a [`Callback`]. Every callback is posted to the request's [`Executor`];
//! the request waits for a callback to return before taking the next network
//! step, so a callback never races with its own request.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use bytes::Bytes;
use http::{
    header::{HeaderName, HeaderValue},
    HeaderMap, Method, StatusCode, Version,
};
use log::{debug, error, trace};
use serde_json::json;
use tokio::sync::{oneshot, Notify};

use crate::{
    engine::{self, Active, Engine, HttpClient, Hop, Shared},
    netlog::{EventType, Phase, Source, SourceType},
    redirect::{self, Policy},
    Error, Result, Url,
};

// Redirect hops a request may take before failing.
const MAX_REDIRECTS: usize = 20;

/// Runs callback tasks.
///
/// Executors must not run tasks inline on the calling thread: tasks are
/// submitted from the engine's network thread, and a task found running
/// there is refused.
pub trait Executor: Send + Sync + 'static {
    /// Runs `task`, typically on another thread.
    fn execute(&self, task: Box<dyn FnOnce() + Send>);
}

impl<F> Executor for F
where
    F: Fn(Box<dyn FnOnce() + Send>) + Send + Sync + 'static,
{
    fn execute(&self, task: Box<dyn FnOnce() + Send>) {
        self(task)
    }
}

/// What to do with a redirect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RedirectAction {
    /// Follow it.
    Follow,
    /// Cancel the request; `on_canceled` follows.
    Cancel,
}

/// Receives the events of a [`UrlRequest`].
///
/// Exactly one of `on_succeeded`, `on_failed` and `on_canceled` is called,
/// last.
pub trait Callback: Send + Sync + 'static {
    /// A redirect to `new_location` was received.
    fn on_redirect_received(&self, info: &UrlResponseInfo, new_location: &str) -> RedirectAction {
        let _ = (info, new_location);
        RedirectAction::Follow
    }

    /// The final response head arrived.
    fn on_response_started(&self, info: &UrlResponseInfo);

    /// A chunk of the response body was read.
    fn on_read_completed(&self, info: &UrlResponseInfo, chunk: Bytes);

    /// The whole body was read.
    fn on_succeeded(&self, info: &UrlResponseInfo);

    /// The request failed. `info` is the last response received, if any.
    fn on_failed(&self, info: Option<&UrlResponseInfo>, error: &Error);

    /// The request was canceled.
    fn on_canceled(&self, info: Option<&UrlResponseInfo>) {
        let _ = info;
    }
}

/// A response as seen by a [`Callback`].
#[derive(Clone, Debug)]
pub struct UrlResponseInfo {
    url: Url,
    url_chain: Vec<Url>,
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    received_byte_count: u64,
}

impl UrlResponseInfo {
    fn new(url_chain: &[Url], status: StatusCode, version: Version, headers: &HeaderMap) -> Self {
        UrlResponseInfo {
            url: url_chain[url_chain.len() - 1].clone(),
            url_chain: url_chain.to_vec(),
            status,
            version,
            headers: headers.clone(),
            received_byte_count: 0,
        }
    }

    /// The URL this response came from.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Every URL of the request, the initial one first.
    pub fn url_chain(&self) -> &[Url] {
        &self.url_chain
    }

    /// The HTTP status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The status text, e.g. `"OK"`.
    pub fn status_text(&self) -> &str {
        self.status.canonical_reason().unwrap_or("")
    }

    /// The response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The negotiated protocol, `"h2"` or `"http/1.1"`.
    pub fn negotiated_protocol(&self) -> &'static str {
        match self.version {
            Version::HTTP_2 => "h2",
            Version::HTTP_10 => "http/1.0",
            _ => "http/1.1",
        }
    }

    /// Body bytes received so far.
    pub fn received_byte_count(&self) -> u64 {
        self.received_byte_count
    }
}

/// Builds a [`UrlRequest`]. Created by [`Engine::new_request_builder`].
#[must_use]
pub struct UrlRequestBuilder {
    engine: Engine,
    request: Result<Hop>,
    method_set: bool,
    callback: Arc<dyn Callback>,
    executor: Arc<dyn Executor>,
}

impl UrlRequestBuilder {
    pub(crate) fn new(
        engine: Engine,
        url: Result<Url>,
        callback: Arc<dyn Callback>,
        executor: Arc<dyn Executor>,
    ) -> UrlRequestBuilder {
        let request = url.map(|url| Hop {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: None,
        });
        UrlRequestBuilder {
            engine,
            request,
            method_set: false,
            callback,
            executor,
        }
    }

    /// Sets the method. Defaults to `GET`.
    pub fn set_http_method(mut self, method: &str) -> UrlRequestBuilder {
        let mut error = None;
        if let Ok(ref mut req) = self.request {
            match Method::from_bytes(method.as_bytes()) {
                Ok(method) => req.method = method,
                Err(e) => error = Some(Error::invalid_argument(e)),
            }
        }
        self.method_set = true;
        if let Some(err) = error {
            self.request = Err(err);
        }
        self
    }

    /// Adds a request header.
    pub fn add_header<K, V>(mut self, key: K, value: V) -> UrlRequestBuilder
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        let mut error = None;
        if let Ok(ref mut req) = self.request {
            match <HeaderName as TryFrom<K>>::try_from(key) {
                Ok(key) => match <HeaderValue as TryFrom<V>>::try_from(value) {
                    Ok(value) => {
                        req.headers.append(key, value);
                    }
                    Err(e) => error = Some(Error::invalid_argument(e.into())),
                },
                Err(e) => error = Some(Error::invalid_argument(e.into())),
            };
        }
        if let Some(err) = error {
            self.request = Err(err);
        }
        self
    }

    /// Sets the request body. Unless a method was set, the request is sent
    /// with `POST`.
    pub fn set_upload<B: Into<Bytes>>(mut self, body: B) -> UrlRequestBuilder {
        if let Ok(ref mut req) = self.request {
            req.body = Some(body.into());
        }
        self
    }

    /// Builds the request without starting it.
    pub fn build(self) -> Result<UrlRequest> {
        let mut request = self.request?;
        if request.body.is_some() && !self.method_set {
            request.method = Method::POST;
        }
        Ok(UrlRequest {
            engine: self.engine,
            inner: Arc::new(RequestInner {
                callback: self.callback,
                executor: self.executor,
                request: crate::sync::Mutex::new(Some(request)),
                started: AtomicBool::new(false),
                done: AtomicBool::new(false),
                cancel: Notify::new(),
            }),
        })
    }
}

impl fmt::Debug for UrlRequestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlRequestBuilder")
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

/// A request whose progress is reported to a [`Callback`].
pub struct UrlRequest {
    engine: Engine,
    inner: Arc<RequestInner>,
}

struct RequestInner {
    callback: Arc<dyn Callback>,
    executor: Arc<dyn Executor>,
    request: crate::sync::Mutex<Option<Hop>>,
    started: AtomicBool,
    done: AtomicBool,
    cancel: Notify,
}

impl UrlRequest {
    /// Starts the request.
    ///
    /// # Errors
    ///
    /// Fails with an illegal-state error if the request was already started
    /// or the engine is shut down.
    pub fn start(&self) -> Result<()> {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return Err(Error::illegal_state("request already started"));
        }
        let hop = self
            .inner
            .request
            .lock()
            .take()
            .ok_or_else(|| Error::illegal_state("request already started"))?;

        let inner = self.inner.clone();
        let result = self
            .engine
            .execute(move |active, client| run(active, client, inner, hop));
        if result.is_err() {
            self.inner.done.store(true, Ordering::Release);
        }
        result
    }

    /// Cancels the request. `on_canceled` is called unless the request
    /// already finished. Does nothing on a request that was never started.
    pub fn cancel(&self) {
        if self.inner.started.load(Ordering::Acquire) && !self.is_done() {
            trace!("canceling request");
            self.inner.cancel.notify_one();
        }
    }

    /// Returns true once the request succeeded, failed or was canceled.
    pub fn is_done(&self) -> bool {
        self.inner.done.load(Ordering::Acquire)
    }
}

impl fmt::Debug for UrlRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlRequest")
            .field("started", &self.inner.started.load(Ordering::Acquire))
            .field("done", &self.is_done())
            .finish()
    }
}

enum Outcome {
    Succeeded(UrlResponseInfo),
    Canceled,
    Failed(Error),
}

impl RequestInner {
    /// Runs `f` on the executor and waits for its result.
    async fn post<T, F>(&self, active: &Active, f: F) -> Result<T>
    where
        F: FnOnce(&dyn Callback) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.dispatch(active.shared(), move |callback| {
            let _ = tx.send(f(callback));
        });
        rx.await
            .map_err(|_| Error::illegal_state("executor dropped or refused a callback task"))
    }

    /// Runs `f` on the executor without waiting.
    fn dispatch<F>(&self, shared: &Arc<Shared>, f: F)
    where
        F: FnOnce(&dyn Callback) + Send + 'static,
    {
        let callback = self.callback.clone();
        let shared = shared.clone();
        self.executor.execute(Box::new(move || {
            if shared.on_network_thread() {
                error!("executor ran a callback on the network thread; refusing it");
                return;
            }
            f(&*callback);
        }));
    }
}

async fn run(active: Active, client: HttpClient, req: Arc<RequestInner>, hop: Hop) {
    let source = active.netlog.new_source(SourceType::UrlRequest);
    active
        .netlog
        .add_event(source, EventType::RequestAlive, Phase::Begin, |_| None);
    active.metrics.record(|m| m.requests_started += 1);

    let mut info = None;
    let outcome = tokio::select! {
        biased;
        _ = req.cancel.notified() => Outcome::Canceled,
        res = drive(&active, &client, &req, source, hop, &mut info) => match res {
            Ok(outcome) => outcome,
            Err(e) => Outcome::Failed(e),
        },
    };

    // A terminal callback may shut the engine down, so the request stops
    // counting as active before it is posted.
    let shared = active.shared().clone();
    drop(active);
    req.done.store(true, Ordering::Release);

    match outcome {
        Outcome::Succeeded(info) => {
            shared.metrics.record(|m| m.requests_succeeded += 1);
            req.dispatch(&shared, move |cb| cb.on_succeeded(&info));
        }
        Outcome::Canceled => {
            shared.metrics.record(|m| m.requests_canceled += 1);
            shared
                .netlog
                .add_event(source, EventType::Cancelled, Phase::None, |_| None);
            debug!("request canceled");
            req.dispatch(&shared, move |cb| cb.on_canceled(info.as_ref()));
        }
        Outcome::Failed(err) => {
            shared.metrics.record(|m| m.requests_failed += 1);
            shared
                .netlog
                .add_event(source, EventType::UrlRequestFailed, Phase::None, |_| {
                    Some(json!({ "error": err.to_string() }))
                });
            debug!("request failed: {err}");
            req.dispatch(&shared, move |cb| cb.on_failed(info.as_ref(), &err));
        }
    }

    shared
        .netlog
        .add_event(source, EventType::RequestAlive, Phase::End, |_| None);
}

async fn drive(
    active: &Active,
    client: &HttpClient,
    req: &RequestInner,
    source: Source,
    mut hop: Hop,
    info: &mut Option<UrlResponseInfo>,
) -> Result<Outcome> {
    let policy = Policy::limited(MAX_REDIRECTS);
    let mut chain = vec![hop.url.clone()];

    active
        .netlog
        .add_event(source, EventType::UrlRequestStartJob, Phase::Begin, |_| {
            Some(json!({ "url": hop.url.as_str(), "method": hop.method.as_str() }))
        });

    loop {
        let res = engine::send(client, active, source, &hop, None).await?;
        let (parts, mut body) = res.into_parts();
        let response = UrlResponseInfo::new(&chain, parts.status, parts.version, &parts.headers);
        *info = Some(response.clone());

        if let Some(next) = hop.follow(parts.status, &parts.headers) {
            if let redirect::Action::Error(e) = policy.check(&next.url, &chain) {
                return Err(Error::redirect(e, next.url));
            }

            active
                .netlog
                .add_event(source, EventType::UrlRequestRedirected, Phase::None, |_| {
                    Some(json!({ "location": next.url.as_str() }))
                });
            let location = next.url.to_string();
            let action = req
                .post(active, move |cb| cb.on_redirect_received(&response, &location))
                .await?;
            match action {
                RedirectAction::Follow => {
                    trace!("following redirect to {}", next.url);
                    active.metrics.record(|m| m.redirects += 1);
                    chain.push(next.url.clone());
                    hop = next;
                    continue;
                }
                RedirectAction::Cancel => return Ok(Outcome::Canceled),
            }
        }

        let started = response.clone();
        req.post(active, move |cb| cb.on_response_started(&started))
            .await?;

        let mut progress = response;
        while let Some(chunk) = engine::read_chunk(&mut body, active, source, None).await? {
            progress.received_byte_count += chunk.len() as u64;
            *info = Some(progress.clone());
            let snapshot = progress.clone();
            req.post(active, move |cb| cb.on_read_completed(&snapshot, chunk))
                .await?;
        }

        active
            .netlog
            .add_event(source, EventType::UrlRequestStartJob, Phase::End, |_| None);
        return Ok(Outcome::Succeeded(progress));
    }
}

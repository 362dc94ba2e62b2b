//! Blocking, stream-oriented connections.
//!
//! An [`HttpConnection`] is opened on the engine's network thread; the
//! calling thread blocks until the response head arrives and then reads the
//! body through [`std::io::Read`]. Connections must not be opened from
//! inside an async runtime.

use std::{
    fmt,
    future::Future,
    io::{self, Read},
    task::Poll,
    time::Duration,
};

use bytes::{Buf, Bytes};
use http::{
    header::{HeaderName, HeaderValue},
    HeaderMap, Method, StatusCode, Version,
};
use log::trace;
use tokio::sync::{mpsc, oneshot};

use crate::{
    engine::{self, Active, Engine, HttpClient, Hop},
    netlog::{EventType, Phase, SourceType},
    redirect::{self, Policy},
    into_url, Error, IntoUrl, Result, Url,
};

// Body chunks buffered ahead of the reader.
const BODY_BUFFER: usize = 16;

/// Configures a connection before opening it. Created by
/// [`Engine::connection`].
#[must_use = "ConnectionBuilder does nothing until you 'open' it"]
pub struct ConnectionBuilder {
    engine: Engine,
    request: Result<Hop>,
    timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    redirect: Policy,
}

impl ConnectionBuilder {
    pub(crate) fn new(engine: Engine, url: Result<Url>) -> ConnectionBuilder {
        let request = url.map(|url| Hop {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: None,
        });
        ConnectionBuilder {
            engine,
            request,
            timeout: None,
            read_timeout: None,
            redirect: Policy::default(),
        }
    }

    /// Sets the method. Defaults to `GET`.
    pub fn method(mut self, method: Method) -> ConnectionBuilder {
        if let Ok(ref mut req) = self.request {
            req.method = method;
        }
        self
    }

    /// Adds a request header.
    pub fn header<K, V>(mut self, key: K, value: V) -> ConnectionBuilder
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

    /// Sets the request body.
    pub fn body<B: Into<Bytes>>(mut self, body: B) -> ConnectionBuilder {
        if let Ok(ref mut req) = self.request {
            req.body = Some(body.into());
        }
        self
    }

    /// Bounds the wait for each response head, connecting included.
    pub fn timeout(mut self, timeout: Duration) -> ConnectionBuilder {
        self.timeout = Some(timeout);
        self
    }

    /// Bounds the wait for each chunk of the response body.
    pub fn read_timeout(mut self, timeout: Duration) -> ConnectionBuilder {
        self.read_timeout = Some(timeout);
        self
    }

    /// Sets the redirect policy. Defaults to following up to 10 redirects.
    pub fn redirect(mut self, policy: Policy) -> ConnectionBuilder {
        self.redirect = policy;
        self
    }

    /// Whether to follow redirects at all.
    pub fn follow_redirects(self, follow: bool) -> ConnectionBuilder {
        if follow {
            self.redirect(Policy::default())
        } else {
            self.redirect(Policy::none())
        }
    }

    /// Sends the request and blocks until the response head arrives.
    ///
    /// # Errors
    ///
    /// Fails with an I/O error if the connection cannot be established, with
    /// a redirect error if the policy rejects a redirect, and with an
    /// illegal-state error once the engine is shut down.
    pub fn open(self) -> Result<HttpConnection> {
        let hop = self.request?;
        if self.engine.on_network_thread() {
            return Err(Error::illegal_state(
                "connections cannot be opened on the network thread",
            ));
        }

        let url = hop.url.clone();
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::channel(BODY_BUFFER);
        let engine = self.engine.clone();
        let options = Options {
            timeout: self.timeout,
            read_timeout: self.read_timeout,
            redirect: self.redirect,
        };
        self.engine.execute(move |active, client| {
            run(active, client, hop, options, head_tx, body_tx)
        })?;

        let head = head_rx
            .blocking_recv()
            .map_err(|_| Error::illegal_state("network thread exited").with_url(url))??;

        Ok(HttpConnection {
            head,
            body: body_rx,
            chunk: Bytes::new(),
            finished: false,
            _engine: engine,
        })
    }
}

impl fmt::Debug for ConnectionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionBuilder")
            .field("request", &self.request)
            .field("timeout", &self.timeout)
            .field("read_timeout", &self.read_timeout)
            .field("redirect", &self.redirect)
            .finish()
    }
}

struct Options {
    timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    redirect: Policy,
}

#[derive(Debug)]
struct Head {
    url: Url,
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
}

/// A piece of a response body sent to the reader.
enum Frame {
    Data(Bytes),
    End,
}

/// An open connection. The body is read through [`Read`].
///
/// The connection keeps its engine alive until it is dropped. A body that
/// stops before its end is reported as an [`io::ErrorKind::UnexpectedEof`]
/// error, never as a clean end of file.
pub struct HttpConnection {
    head: Head,
    body: mpsc::Receiver<Result<Frame>>,
    chunk: Bytes,
    finished: bool,
    _engine: Engine,
}

impl HttpConnection {
    /// The final URL, after redirects.
    pub fn url(&self) -> &Url {
        &self.head.url
    }

    /// The response status.
    pub fn status(&self) -> StatusCode {
        self.head.status
    }

    /// The HTTP version of the response.
    pub fn version(&self) -> Version {
        self.head.version
    }

    /// The response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    /// Reads the rest of the body as UTF-8 text.
    pub fn text(mut self) -> Result<String> {
        let mut text = String::new();
        self.read_to_string(&mut text).map_err(Error::request)?;
        Ok(text)
    }
}

impl Read for HttpConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.chunk.has_remaining() {
                let n = buf.len().min(self.chunk.remaining());
                self.chunk.copy_to_slice(&mut buf[..n]);
                return Ok(n);
            }
            if self.finished {
                return Ok(0);
            }
            match self.body.blocking_recv() {
                Some(Ok(Frame::Data(chunk))) => self.chunk = chunk,
                Some(Ok(Frame::End)) => self.finished = true,
                Some(Err(err)) => return Err(err.into()),
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        Error::request(BodyIncomplete).with_url(self.head.url.clone()),
                    ))
                }
            }
        }
    }
}

impl fmt::Debug for HttpConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConnection")
            .field("url", &self.head.url.as_str())
            .field("status", &self.head.status)
            .field("version", &self.head.version)
            .field("headers", &self.head.headers)
            .finish()
    }
}

async fn run(
    active: Active,
    client: HttpClient,
    hop: Hop,
    options: Options,
    head_tx: oneshot::Sender<Result<Head>>,
    body_tx: mpsc::Sender<Result<Frame>>,
) {
    let source = active.netlog.new_source(SourceType::Connection);
    active
        .netlog
        .add_event(source, EventType::RequestAlive, Phase::Begin, |_| None);
    active.metrics.record(|m| m.requests_started += 1);

    let head = forward(head_tx, async {
        let mut hop = hop;
        let mut chain = vec![hop.url.clone()];
        loop {
            let res = engine::send(&client, &active, source, &hop, options.timeout).await?;
            let next = match hop.follow(res.status(), res.headers()) {
                Some(next) => next,
                None => return Ok((hop.url, res)),
            };
            match options.redirect.check(&next.url, &chain) {
                redirect::Action::Follow => {
                    trace!("redirecting '{}' to '{}'", hop.url, next.url);
                    active.metrics.record(|m| m.redirects += 1);
                    active
                        .netlog
                        .add_event(source, EventType::UrlRequestRedirected, Phase::None, |_| {
                            Some(serde_json::json!({ "location": next.url.as_str() }))
                        });
                    chain.push(next.url.clone());
                    hop = next;
                }
                redirect::Action::Stop => return Ok((hop.url, res)),
                redirect::Action::Error(e) => return Err(Error::redirect(e, next.url)),
            }
        }
    })
    .await;

    let mut body = match head {
        Some(Ok(body)) => body,
        Some(Err(())) | None => {
            active.metrics.record(|m| m.requests_failed += 1);
            active
                .netlog
                .add_event(source, EventType::RequestAlive, Phase::End, |_| None);
            return;
        }
    };

    loop {
        let next = tokio::select! {
            chunk = engine::read_chunk(&mut body, &active, source, options.read_timeout) => chunk,
            _ = body_tx.closed() => {
                trace!("connection dropped before the body was read");
                break;
            }
        };
        match next {
            Ok(Some(chunk)) => {
                if body_tx.send(Ok(Frame::Data(chunk))).await.is_err() {
                    break;
                }
            }
            Ok(None) => {
                active.metrics.record(|m| m.requests_succeeded += 1);
                let _ = body_tx.send(Ok(Frame::End)).await;
                break;
            }
            Err(e) => {
                active.metrics.record(|m| m.requests_failed += 1);
                let _ = body_tx.send(Err(e)).await;
                break;
            }
        }
    }

    active
        .netlog
        .add_event(source, EventType::RequestAlive, Phase::End, |_| None);
}

/// Sends the response head to the waiting caller and hands back the body.
///
/// Gives up as soon as the caller stops waiting. `Some(Err(()))` means the
/// error was delivered to the caller.
async fn forward<F>(
    mut tx: oneshot::Sender<Result<Head>>,
    fut: F,
) -> Option<std::result::Result<hyper::Body, ()>>
where
    F: Future<Output = Result<(Url, http::Response<hyper::Body>)>>,
{
    futures_util::pin_mut!(fut);

    // "select" on the sender being canceled, and the future completing
    let res = futures_util::future::poll_fn(|cx| match fut.as_mut().poll(cx) {
        Poll::Ready(val) => Poll::Ready(Some(val)),
        Poll::Pending => {
            // check if the caller gave up
            std::task::ready!(tx.poll_closed(cx));
            Poll::Ready(None)
        }
    })
    .await;

    match res? {
        Ok((url, res)) => {
            let (parts, body) = res.into_parts();
            let head = Head {
                url,
                status: parts.status,
                version: parts.version,
                headers: parts.headers,
            };
            tx.send(Ok(head)).ok().map(|_| Ok(body))
        }
        Err(e) => {
            let _ = tx.send(Err(e));
            Some(Err(()))
        }
    }
}

#[derive(Debug)]
struct BodyIncomplete;

impl fmt::Display for BodyIncomplete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("connection closed before the body was complete")
    }
}

impl std::error::Error for BodyIncomplete {}

/// Opens connections for one URL scheme.
pub trait StreamHandler: Send + Sync {
    /// Opens a `GET` connection to `url`.
    fn open_connection(&self, url: &Url) -> Result<HttpConnection>;
}

/// Creates a [`StreamHandler`] per URL scheme.
pub trait StreamHandlerFactory {
    /// A handler for `scheme`, or `None` if the scheme is not supported.
    fn create_stream_handler(&self, scheme: &str) -> Option<Box<dyn StreamHandler>>;
}

/// Hands out [`ConnectionHandler`]s for `http` and `https`. Created by
/// [`Engine::create_connection_factory`].
#[derive(Clone, Debug)]
pub struct ConnectionFactory {
    engine: Engine,
}

impl ConnectionFactory {
    pub(crate) fn new(engine: Engine) -> ConnectionFactory {
        ConnectionFactory { engine }
    }

    /// A handler for `scheme`, compared case-insensitively. `https` is only
    /// served when TLS support is compiled in.
    pub fn handler(&self, scheme: &str) -> Option<ConnectionHandler> {
        let scheme = if scheme.eq_ignore_ascii_case("http") {
            "http"
        } else if scheme.eq_ignore_ascii_case("https") {
            "https"
        } else {
            return None;
        };
        if !into_url::supports_scheme(scheme) {
            return None;
        }
        Some(ConnectionHandler {
            engine: self.engine.clone(),
            scheme,
        })
    }
}

impl StreamHandlerFactory for ConnectionFactory {
    fn create_stream_handler(&self, scheme: &str) -> Option<Box<dyn StreamHandler>> {
        self.handler(scheme)
            .map(|handler| Box::new(handler) as Box<dyn StreamHandler>)
    }
}

/// Opens connections for a single scheme through an engine.
#[derive(Clone, Debug)]
pub struct ConnectionHandler {
    engine: Engine,
    scheme: &'static str,
}

impl ConnectionHandler {
    /// The scheme this handler serves.
    pub fn scheme(&self) -> &str {
        self.scheme
    }

    /// Opens a connection to `url`, which must use this handler's scheme.
    pub fn open<U: IntoUrl>(&self, url: U) -> Result<HttpConnection> {
        let url = url.into_url()?;
        if url.scheme() != self.scheme {
            return Err(Error::url_bad_scheme(url));
        }
        self.engine.open_connection(url)
    }
}

impl StreamHandler for ConnectionHandler {
    fn open_connection(&self, url: &Url) -> Result<HttpConnection> {
        self.open(url)
    }
}

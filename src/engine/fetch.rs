//! A single HTTP transaction: one request, one response head, then body
//! chunks. Redirects are resolved here but followed by the caller.

use std::{future::Future, time::Duration};

use bytes::Bytes;
use http::{header::USER_AGENT, HeaderMap, HeaderValue, Method, Response, StatusCode, Version};
use hyper::{body::HttpBody, Body};
use log::{trace, warn};
use serde_json::json;

use super::{handle::HttpClient, Shared};
use crate::{
    error::TimedOut,
    into_url::to_uri,
    netlog::{bytes_param, headers_param, EventType, Phase, Source},
    redirect, Error, Result, Url,
};

/// What is sent on one hop of a request.
#[derive(Clone, Debug)]
pub(crate) struct Hop {
    pub(crate) method: Method,
    pub(crate) url: Url,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Option<Bytes>,
}

impl Hop {
    /// The hop a redirect response points to, if it is one.
    ///
    /// 303 switches to `GET`, as do 301 and 302 for `POST`; the body is
    /// dropped whenever the method changes. Credentials are not forwarded to
    /// another host.
    pub(crate) fn follow(&self, status: StatusCode, headers: &HeaderMap) -> Option<Hop> {
        let url = redirect::location(status, headers, &self.url)?;
        let mut next = self.clone();
        if let Some(method) = redirect::method_after(status, &self.method) {
            next.method = method;
            next.body = None;
            next.headers.remove(http::header::CONTENT_TYPE);
            next.headers.remove(http::header::CONTENT_LENGTH);
        }
        redirect::remove_sensitive_headers(&mut next.headers, &url, std::slice::from_ref(&self.url));
        next.url = url;
        Some(next)
    }
}

/// Sends `hop` and waits for the response head.
pub(crate) async fn send(
    client: &HttpClient,
    shared: &Shared,
    source: Source,
    hop: &Hop,
    timeout: Option<Duration>,
) -> Result<Response<Body>> {
    let body = match hop.body {
        Some(ref bytes) => Body::from(bytes.clone()),
        None => Body::empty(),
    };
    let mut req = http::Request::builder()
        .method(hop.method.clone())
        .uri(to_uri(&hop.url)?)
        .body(body)
        .map_err(|e| Error::request(e).with_url(hop.url.clone()))?;
    *req.headers_mut() = hop.headers.clone();

    if !req.headers().contains_key(USER_AGENT) {
        if let Some(ua) = shared.config.user_agent() {
            match HeaderValue::from_str(ua) {
                Ok(value) => {
                    req.headers_mut().insert(USER_AGENT, value);
                }
                Err(_) => warn!("configured user agent is not a valid header value"),
            }
        }
    }

    shared.netlog.add_event(
        source,
        EventType::HttpTransactionSendRequestHeaders,
        Phase::None,
        |capture| {
            Some(json!({
                "line": format!("{} {} HTTP/1.1", hop.method, hop.url),
                "headers": headers_param(req.headers(), capture),
            }))
        },
    );

    let sent = hop.body.as_ref().map_or(0, |b| b.len() as u64);
    let res = with_timeout(timeout, client.request(req))
        .await
        .map_err(|e| e.with_url(hop.url.clone()))?
        .map_err(|e| {
            let err = if e.is_connect() {
                Error::io(e)
            } else {
                Error::request(e)
            };
            err.with_url(hop.url.clone())
        })?;

    trace!("{} {} -> {:?} {}", hop.method, hop.url, res.version(), res.status());
    shared.metrics.record(|m| {
        m.bytes_sent += sent;
        match res.version() {
            Version::HTTP_2 => m.http2_responses += 1,
            _ => m.http1_responses += 1,
        }
    });
    shared.netlog.add_event(
        source,
        EventType::HttpTransactionReadResponseHeaders,
        Phase::None,
        |capture| {
            Some(json!({
                "status": res.status().as_u16(),
                "version": format!("{:?}", res.version()),
                "headers": headers_param(res.headers(), capture),
            }))
        },
    );

    Ok(res)
}

/// Reads the next body chunk. `None` marks the end of the body.
pub(crate) async fn read_chunk(
    body: &mut Body,
    shared: &Shared,
    source: Source,
    timeout: Option<Duration>,
) -> Result<Option<Bytes>> {
    loop {
        let chunk = match with_timeout(timeout, body.data()).await? {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => return Err(Error::request(e)),
            None => return Ok(None),
        };
        // hyper may yield empty data frames
        if chunk.is_empty() {
            continue;
        }

        shared
            .metrics
            .record(|m| m.bytes_received += chunk.len() as u64);
        shared.netlog.add_event(
            source,
            EventType::UrlRequestJobBytesRead,
            Phase::None,
            |capture| Some(bytes_param(&chunk, capture)),
        );
        return Ok(Some(chunk));
    }
}

async fn with_timeout<F: Future>(timeout: Option<Duration>, f: F) -> Result<F::Output> {
    match timeout {
        Some(duration) => tokio::time::timeout(duration, f)
            .await
            .map_err(|_elapsed| Error::request(TimedOut)),
        None => Ok(f.await),
    }
}

#[cfg(test)]
mod tests {
    use http::header::{AUTHORIZATION, CONTENT_TYPE, LOCATION};

    use super::*;

    fn hop(method: Method, url: &str) -> Hop {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("secret"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        Hop {
            method,
            url: Url::parse(url).unwrap(),
            headers,
            body: Some(Bytes::from_static(b"payload")),
        }
    }

    fn location(to: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(LOCATION, HeaderValue::from_static(to));
        headers
    }

    #[test]
    fn see_other_drops_body() {
        let next = hop(Method::POST, "http://a.test/form")
            .follow(StatusCode::SEE_OTHER, &location("/done"))
            .unwrap();
        assert_eq!(next.method, Method::GET);
        assert_eq!(next.url.as_str(), "http://a.test/done");
        assert!(next.body.is_none());
        assert!(!next.headers.contains_key(CONTENT_TYPE));
        assert!(next.headers.contains_key(AUTHORIZATION));
    }

    #[test]
    fn temporary_redirect_keeps_body() {
        let next = hop(Method::POST, "http://a.test/form")
            .follow(StatusCode::TEMPORARY_REDIRECT, &location("http://b.test/form"))
            .unwrap();
        assert_eq!(next.method, Method::POST);
        assert_eq!(next.body.as_deref(), Some(&b"payload"[..]));
        // another host
        assert!(!next.headers.contains_key(AUTHORIZATION));
    }

    #[test]
    fn not_a_redirect() {
        let h = hop(Method::GET, "http://a.test/");
        assert!(h.follow(StatusCode::OK, &location("/x")).is_none());
        assert!(h.follow(StatusCode::FOUND, &HeaderMap::new()).is_none());
    }
}

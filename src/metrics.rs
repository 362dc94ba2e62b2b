//! Process-wide delta metrics.
//!
//! Metrics are shared by every engine reporting into the same [`Metrics`]
//! handle, which by default is [`Metrics::global`]. Reading them is a
//! take-and-reset: a read returns what was recorded since the previous read
//! by any engine. Collection only starts on the first read, so that read is
//! always empty.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use log::error;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::{sync::Mutex, Error, Result};

static GLOBAL: Lazy<Metrics> = Lazy::new(Metrics::new);

/// A shared handle on a set of metric counters.
#[derive(Clone, Debug)]
pub struct Metrics {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    collecting: AtomicBool,
    counters: Mutex<MetricsDelta>,
}

/// Counters accumulated between two reads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsDelta {
    /// Requests started.
    pub requests_started: u64,
    /// Requests that completed successfully.
    pub requests_succeeded: u64,
    /// Requests that failed.
    pub requests_failed: u64,
    /// Requests canceled by the caller.
    pub requests_canceled: u64,
    /// Redirects followed.
    pub redirects: u64,
    /// Responses received over HTTP/1.x.
    pub http1_responses: u64,
    /// Responses received over HTTP/2.
    pub http2_responses: u64,
    /// Request body bytes sent.
    pub bytes_sent: u64,
    /// Response body bytes received.
    pub bytes_received: u64,
}

impl MetricsDelta {
    /// Returns true if nothing was recorded.
    pub fn is_zero(&self) -> bool {
        *self == MetricsDelta::default()
    }

    /// Decodes a blob returned by `Engine::global_metrics_deltas`.
    ///
    /// An empty blob is a zero delta.
    pub fn decode(bytes: &[u8]) -> Result<MetricsDelta> {
        if bytes.is_empty() {
            return Ok(MetricsDelta::default());
        }
        bincode::deserialize(bytes).map_err(Error::invalid_argument)
    }
}

impl Metrics {
    /// Creates an isolated set of counters.
    pub fn new() -> Metrics {
        Metrics {
            inner: Arc::new(Inner::default()),
        }
    }

    /// The process-wide counters.
    pub fn global() -> Metrics {
        GLOBAL.clone()
    }

    /// Returns true once the first read has started collection.
    pub fn is_collecting(&self) -> bool {
        self.inner.collecting.load(Ordering::Acquire)
    }

    /// Returns the counters recorded since the previous read and resets them.
    pub fn take(&self) -> MetricsDelta {
        let mut counters = self.inner.counters.lock();
        if !self.inner.collecting.swap(true, Ordering::AcqRel) {
            *counters = MetricsDelta::default();
            return MetricsDelta::default();
        }
        std::mem::take(&mut *counters)
    }

    /// Like [`take`](Metrics::take), encoded as an opaque blob. A zero delta
    /// encodes as an empty blob.
    pub fn take_encoded(&self) -> Vec<u8> {
        let delta = self.take();
        if delta.is_zero() {
            return Vec::new();
        }
        match bincode::serialize(&delta) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("failed to encode metrics delta: {e}");
                Vec::new()
            }
        }
    }

    pub(crate) fn record<F>(&self, f: F)
    where
        F: FnOnce(&mut MetricsDelta),
    {
        if !self.is_collecting() {
            return;
        }
        f(&mut self.inner.counters.lock());
    }

    /// Returns true if both handles share the same counters.
    pub fn ptr_eq(&self, other: &Metrics) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics::new()
    }
}

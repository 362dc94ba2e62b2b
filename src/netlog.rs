//! NetLog: a structured event log of engine activity.
//!
//! The log file is a single JSON object:
//!
//! ```text
//! {"constants": {...},
//! "events": [
//! {"time": 12, "type": "URL_REQUEST_START_JOB", "source": {"id": 1, "type": "URL_REQUEST"}, "phase": "begin", "params": {...}},
//! ...
//! ]}
//! ```
//!
//! Unless logging was started with `log_all`, cookie and credential header
//! values are replaced by a byte count and transferred bytes are omitted.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::atomic::{AtomicU32, Ordering},
    time::{Instant, SystemTime, UNIX_EPOCH},
};

use base64::Engine as _;
use http::{header, HeaderMap};
use log::{debug, warn};
use serde::Serialize;
use serde_json::{json, Value};

use crate::{sync::Mutex, Error, Result};

/// How much detail events carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Basic events; cookies, credentials and bytes are stripped.
    Default,
    /// Everything, including cookies, credentials and transferred bytes.
    Everything,
}

impl CaptureMode {
    fn include_sensitive(self) -> bool {
        matches!(self, CaptureMode::Everything)
    }
}

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum EventType {
    RequestAlive,
    UrlRequestStartJob,
    HttpTransactionSendRequestHeaders,
    HttpTransactionReadResponseHeaders,
    UrlRequestRedirected,
    UrlRequestJobBytesRead,
    UrlRequestFailed,
    Cancelled,
}

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Phase {
    Begin,
    End,
    None,
}

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum SourceType {
    UrlRequest,
    Connection,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub(crate) struct Source {
    id: u32,
    #[serde(rename = "type")]
    kind: SourceType,
}

#[derive(Serialize)]
struct Event {
    time: u64,
    #[serde(rename = "type")]
    kind: EventType,
    source: Source,
    phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

struct Writer {
    file: BufWriter<File>,
    path: PathBuf,
    capture: CaptureMode,
    events: u64,
}

pub(crate) struct NetLog {
    writer: Mutex<Option<Writer>>,
    next_source: AtomicU32,
    origin: Instant,
}

impl NetLog {
    pub(crate) fn new() -> NetLog {
        NetLog {
            writer: Mutex::new(None),
            next_source: AtomicU32::new(1),
            origin: Instant::now(),
        }
    }

    pub(crate) fn new_source(&self, kind: SourceType) -> Source {
        Source {
            id: self.next_source.fetch_add(1, Ordering::Relaxed),
            kind,
        }
    }

    #[cfg(test)]
    fn is_active(&self) -> bool {
        self.writer.lock().is_some()
    }

    /// Starts logging to `path`, truncating it. Ignored if already logging.
    pub(crate) fn start(&self, path: &Path, log_all: bool, constants: Value) -> Result<()> {
        let mut writer = self.writer.lock();
        if let Some(ref active) = *writer {
            debug!(
                "NetLog already active ({}); ignoring start for {}",
                active.path.display(),
                path.display()
            );
            return Ok(());
        }

        let capture = if log_all {
            CaptureMode::Everything
        } else {
            CaptureMode::Default
        };
        let origin_unix_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
            .saturating_sub(self.origin.elapsed().as_millis() as u64);

        let mut constants = constants;
        if let Value::Object(ref mut map) = constants {
            map.insert("capture_mode".into(), json!(capture));
            map.insert("time_origin_unix_ms".into(), json!(origin_unix_ms));
        }

        let file = File::create(path).map_err(Error::io)?;
        let mut file = BufWriter::new(file);
        file.write_all(b"{\"constants\": ")
            .and_then(|_| serde_json::to_writer(&mut file, &constants).map_err(Into::into))
            .and_then(|_| file.write_all(b",\n\"events\": [\n"))
            .map_err(Error::io)?;

        debug!("NetLog started: {} ({capture:?})", path.display());
        *writer = Some(Writer {
            file,
            path: path.to_owned(),
            capture,
            events: 0,
        });
        Ok(())
    }

    /// Stops logging and flushes the file to disk. Ignored if not logging.
    pub(crate) fn stop(&self) -> Result<()> {
        let Some(writer) = self.writer.lock().take() else {
            return Ok(());
        };

        let Writer {
            mut file,
            path,
            events,
            ..
        } = writer;
        file.write_all(b"\n]}\n").map_err(Error::io)?;
        let file = file.into_inner().map_err(|e| Error::io(e.into_error()))?;
        file.sync_all().map_err(Error::io)?;

        debug!("NetLog stopped: {} ({events} events)", path.display());
        Ok(())
    }

    /// Appends an event. `params` is only evaluated while logging.
    pub(crate) fn add_event<F>(&self, source: Source, kind: EventType, phase: Phase, params: F)
    where
        F: FnOnce(CaptureMode) -> Option<Value>,
    {
        let mut guard = self.writer.lock();
        let Some(writer) = guard.as_mut() else {
            return;
        };

        let event = Event {
            time: self.origin.elapsed().as_millis() as u64,
            kind,
            source,
            phase,
            params: params(writer.capture),
        };

        let separator: &[u8] = if writer.events == 0 { b"" } else { b",\n" };
        let result = writer
            .file
            .write_all(separator)
            .and_then(|_| serde_json::to_writer(&mut writer.file, &event).map_err(Into::into));
        match result {
            Ok(()) => writer.events += 1,
            Err(e) => warn!("failed to write NetLog event to {}: {e}", writer.path.display()),
        }
    }
}

const SENSITIVE_HEADERS: &[header::HeaderName] = &[
    header::AUTHORIZATION,
    header::COOKIE,
    header::PROXY_AUTHORIZATION,
    header::SET_COOKIE,
];

/// Renders headers as `name: value` lines, stripping sensitive values.
pub(crate) fn headers_param(headers: &HeaderMap, capture: CaptureMode) -> Value {
    let lines: Vec<String> = headers
        .iter()
        .map(|(name, value)| {
            if !capture.include_sensitive() && SENSITIVE_HEADERS.contains(name) {
                format!("{name}: [{} bytes were stripped]", value.len())
            } else {
                format!("{name}: {}", String::from_utf8_lossy(value.as_bytes()))
            }
        })
        .collect();
    Value::from(lines)
}

/// Parameters of a body read. Bytes are only included in `Everything` mode.
pub(crate) fn bytes_param(bytes: &[u8], capture: CaptureMode) -> Value {
    if capture.include_sensitive() {
        json!({
            "byte_count": bytes.len(),
            "bytes": base64::engine::general_purpose::STANDARD.encode(bytes),
        })
    } else {
        json!({ "byte_count": bytes.len() })
    }
}

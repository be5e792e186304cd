//! The response surface of one exchange, and the payloads it can send.
//!
//! A [`Response`] buffers status, reason phrase and headers until the first
//! byte of body is about to go out, then flushes them exactly once:
//!
//! ```text
//! Pending ──send/end──▶ HeadersSent ──finalize──▶ Finalized
//!    └────────────────────end─────────────────────────┘
//! ```
//!
//! Setters keep working after the flush, they just no longer reach the wire.

use std::fmt;

use bytes::Bytes;
use futures_util::stream::{BoxStream, Stream, StreamExt, TryStreamExt};
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{BoxError, Error};
use crate::transport::{Head, ResponseHandle};

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`Response::set_content_type`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    Csv,          // text/csv
    EventStream,  // text/event-stream  (SSE)
    Html,         // text/html; charset=utf-8
    Json,         // application/json; charset=utf-8
    OctetStream,  // application/octet-stream  (binary / file download)
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv         => "text/csv",
            Self::EventStream => "text/event-stream",
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json; charset=utf-8",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
        }
    }
}

impl AsRef<str> for ContentType {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

// ── Payload ───────────────────────────────────────────────────────────────────

/// What [`Response::send`] writes.
///
/// Text and binary go out verbatim. JSON carries its canonical text and adds a
/// default content type. Streams are piped chunk by chunk.
pub enum Payload {
    Raw(Bytes),
    Json(Bytes),
    Stream(BoxStream<'static, Result<Bytes, BoxError>>),
}

impl Payload {
    /// Serializes `value` to JSON text.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, Error> {
        Ok(Self::Json(Bytes::from(serde_json::to_vec(value)?)))
    }

    /// Wraps a stream of chunks.
    pub fn stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Self::Stream(stream.map_err(Into::into).boxed())
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw(b)    => f.debug_tuple("Raw").field(&b.len()).finish(),
            Self::Json(b)   => f.debug_tuple("Json").field(&b.len()).finish(),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl From<Bytes> for Payload {
    fn from(b: Bytes) -> Self { Self::Raw(b) }
}

impl From<Vec<u8>> for Payload {
    fn from(b: Vec<u8>) -> Self { Self::Raw(b.into()) }
}

impl From<&'static [u8]> for Payload {
    fn from(b: &'static [u8]) -> Self { Self::Raw(Bytes::from_static(b)) }
}

impl From<&'static str> for Payload {
    fn from(s: &'static str) -> Self { Self::Raw(Bytes::from_static(s.as_bytes())) }
}

impl From<String> for Payload {
    fn from(s: String) -> Self { Self::Raw(s.into()) }
}

impl From<serde_json::Value> for Payload {
    fn from(v: serde_json::Value) -> Self { Self::Json(v.to_string().into()) }
}

// ── Response ─────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    Pending,
    HeadersSent,
    Finalized,
}

/// Fluent, stateful writer for one exchange.
///
/// ```rust,ignore
/// ctx.response_mut()
///     .set_status(StatusCode::CREATED)
///     .set_header("location", "/users/42")
///     .send(serde_json::json!({ "id": 42 }), true)
///     .await;
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    reason: Option<String>,
    headers: HeaderMap,
    state: State,
    handle: ResponseHandle,
}

impl Response {
    pub fn new(handle: ResponseHandle) -> Self {
        Self {
            status: StatusCode::OK,
            reason: None,
            headers: HeaderMap::new(),
            state: State::Pending,
            handle,
        }
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn status_message(&self) -> Option<&str> { self.reason.as_deref() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }

    pub fn is_headers_sent(&self) -> bool {
        self.state != State::Pending
    }

    pub fn is_finalized(&self) -> bool {
        self.state == State::Finalized
    }

    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    /// Sets a custom reason phrase. HTTP/2 has no reason phrase and ignores it.
    pub fn set_status_message(&mut self, message: impl Into<String>) -> &mut Self {
        self.reason = Some(message.into());
        self
    }

    /// Merges headers into the pending set. Later values replace earlier ones
    /// for the same name. Invalid names or values are skipped.
    pub fn set_headers<I, K, V>(&mut self, headers: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in headers {
            self.set_header(name.as_ref(), value.as_ref());
        }
        self
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> &mut Self {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => warn!(header = name, "invalid response header skipped"),
        }
        self
    }

    pub fn set_content_type(&mut self, value: impl AsRef<str>) -> &mut Self {
        self.set_header(CONTENT_TYPE.as_str(), value.as_ref())
    }

    /// Writes `payload`, flushing the head first if it has not gone out yet.
    /// With `finalize` the exchange is closed afterwards.
    pub async fn send(&mut self, payload: impl Into<Payload>, finalize: bool) -> &mut Self {
        if self.is_finalized() {
            debug!("send after finalize ignored");
            return self;
        }

        match payload.into() {
            Payload::Raw(bytes) => {
                self.flush_head();
                self.handle.write(bytes).await;
            }
            Payload::Json(bytes) => {
                if !self.headers.contains_key(CONTENT_TYPE) {
                    self.set_content_type(ContentType::Json);
                }
                self.flush_head();
                self.handle.write(bytes).await;
            }
            Payload::Stream(mut chunks) => {
                while let Some(chunk) = chunks.next().await {
                    match chunk {
                        Ok(bytes) => {
                            self.flush_head();
                            self.handle.write(bytes).await;
                        }
                        Err(e) => {
                            warn!(error = %e, "response stream failed");
                            break;
                        }
                    }
                }
            }
        }

        if finalize {
            self.finalize();
        }
        self
    }

    /// Serializes `value` as JSON, sends it and finalizes the exchange.
    pub async fn json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<&mut Self, Error> {
        let payload = Payload::json(value)?;
        Ok(self.send(payload, true).await)
    }

    /// Flushes the head if needed and closes the exchange with no further body.
    pub fn end(&mut self) {
        self.finalize();
    }

    /// Like [`end`](Self::end), writing `body` as the final chunk.
    pub async fn end_with(&mut self, body: impl Into<Bytes>) {
        if self.is_finalized() {
            debug!("end after finalize ignored");
            return;
        }
        self.flush_head();
        self.handle.write(body.into()).await;
        self.finalize();
    }

    fn flush_head(&mut self) {
        if self.state != State::Pending {
            return;
        }
        self.state = State::HeadersSent;
        self.handle.write_head(Head {
            status: self.status,
            reason: self.reason.clone(),
            headers: self.headers.clone(),
        });
    }

    fn finalize(&mut self) {
        if self.is_finalized() {
            return;
        }
        self.flush_head();
        self.handle.close();
        self.state = State::Finalized;
    }
}

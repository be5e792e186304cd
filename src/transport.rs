//! The raw response handle shared between the pipeline and the transport.
//!
//! A response travels in two parts. The head (status, reason phrase, headers)
//! goes through a one-shot channel, so it can physically be written only once.
//! Body chunks follow through a bounded channel; the transport forwards them
//! to the socket as they arrive, which gives streamed payloads the
//! connection's own flow control. Dropping the body sender ends the exchange.
//!
//! ```text
//! Response ──head──▶ oneshot ──▶ PendingResponse::into_http ──▶ hyper
//!          ──body──▶ mpsc    ──▶ ResponseBody (StreamBody)  ──▶ hyper
//! ```

use std::convert::Infallible;

use bytes::Bytes;
use futures_util::stream;
use http::{HeaderMap, StatusCode};
use http_body_util::{BodyExt, Empty, StreamBody};
use hyper::body::Frame;
use hyper::ext::ReasonPhrase;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::body::ResponseBody;

/// Body chunks buffered between the handler and the socket.
const BODY_BUFFER: usize = 16;

/// Status line and headers, written once per exchange.
#[derive(Debug)]
pub(crate) struct Head {
    pub(crate) status: StatusCode,
    pub(crate) reason: Option<String>,
    pub(crate) headers: HeaderMap,
}

/// Write side of one exchange. Owned by the exchange's [`Response`](crate::Response).
#[derive(Debug)]
pub struct ResponseHandle {
    head: Option<oneshot::Sender<Head>>,
    body: Option<mpsc::Sender<Bytes>>,
}

/// Read side of one exchange, consumed by the transport.
#[derive(Debug)]
pub struct PendingResponse {
    head: oneshot::Receiver<Head>,
    body: mpsc::Receiver<Bytes>,
}

/// Creates the two ends of a fresh exchange.
pub fn channel() -> (ResponseHandle, PendingResponse) {
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::channel(BODY_BUFFER);
    (
        ResponseHandle { head: Some(head_tx), body: Some(body_tx) },
        PendingResponse { head: head_rx, body: body_rx },
    )
}

impl ResponseHandle {
    /// Sends the head. Returns `false` when it was already sent.
    pub(crate) fn write_head(&mut self, head: Head) -> bool {
        let Some(tx) = self.head.take() else {
            return false;
        };
        if tx.send(head).is_err() {
            debug!("client gone before response head was written");
        }
        true
    }

    /// Queues one body chunk. Chunks written after [`close`](Self::close) or
    /// after the client went away are dropped.
    pub(crate) async fn write(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        let Some(tx) = &self.body else {
            debug!(len = chunk.len(), "write after finalize dropped");
            return;
        };
        if tx.send(chunk).await.is_err() {
            debug!("client gone, body chunk dropped");
        }
    }

    /// Ends the body stream.
    pub(crate) fn close(&mut self) {
        self.body = None;
    }
}

impl PendingResponse {
    /// Waits for the head and assembles the response handed to hyper.
    ///
    /// The body keeps streaming after this returns. If the writing side is
    /// dropped before a head was sent, the exchange is answered with a bare
    /// `500`.
    pub async fn into_http(self) -> http::Response<ResponseBody> {
        let head = match self.head.await {
            Ok(head) => head,
            Err(_) => {
                warn!("response dropped before its head was written");
                let mut res = http::Response::new(Empty::<Bytes>::new().boxed_unsync());
                *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                return res;
            }
        };

        let chunks = stream::unfold(self.body, |mut rx| async move {
            rx.recv()
                .await
                .map(|chunk| (Ok::<_, Infallible>(Frame::data(chunk)), rx))
        });

        let mut res = http::Response::new(StreamBody::new(chunks).boxed_unsync());
        *res.status_mut() = head.status;
        *res.headers_mut() = head.headers;
        if let Some(reason) = head.reason {
            match ReasonPhrase::try_from(reason) {
                Ok(phrase) => {
                    res.extensions_mut().insert(phrase);
                }
                Err(e) => warn!(error = ?e, "invalid status message ignored"),
            }
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head(status: StatusCode) -> Head {
        Head { status, reason: None, headers: HeaderMap::new() }
    }

    #[tokio::test]
    async fn head_is_written_once() {
        let (mut handle, pending) = channel();
        assert!(handle.write_head(head(StatusCode::CREATED)));
        assert!(!handle.write_head(head(StatusCode::OK)));
        handle.close();

        let res = pending.into_http().await;
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn body_streams_until_closed() {
        let (mut handle, pending) = channel();
        handle.write_head(head(StatusCode::OK));
        handle.write(Bytes::from_static(b"hello ")).await;
        handle.write(Bytes::from_static(b"world")).await;
        handle.close();
        handle.write(Bytes::from_static(b"dropped")).await;

        let body = pending.into_http().await.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"hello world");
    }

    #[tokio::test]
    async fn dropped_handle_yields_500() {
        let (handle, pending) = channel();
        drop(handle);
        assert_eq!(pending.into_http().await.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn status_message_becomes_reason_phrase() {
        let (mut handle, pending) = channel();
        handle.write_head(Head {
            status: StatusCode::OK,
            reason: Some("Totally Fine".into()),
            headers: HeaderMap::new(),
        });
        handle.close();

        let res = pending.into_http().await;
        let phrase = res.extensions().get::<ReasonPhrase>().unwrap();
        assert_eq!(phrase.as_bytes(), b"Totally Fine");
    }
}

//! Request and response body types.

use std::convert::Infallible;

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};

use crate::error::BoxError;

/// Body of an incoming request, boxed so tests and the server can feed the
/// pipeline from any source.
pub type RequestBody = UnsyncBoxBody<Bytes, BoxError>;

/// Body of an outgoing response. Frames arrive as the handler writes them.
pub type ResponseBody = UnsyncBoxBody<Bytes, Infallible>;

/// A request body with no content.
pub fn empty() -> RequestBody {
    Empty::new().map_err(|never| match never {}).boxed_unsync()
}

/// A request body holding `bytes` in a single frame.
pub fn full(bytes: impl Into<Bytes>) -> RequestBody {
    Full::new(bytes.into()).map_err(|never| match never {}).boxed_unsync()
}

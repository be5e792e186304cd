//! Unified error type.

use http::Method;
use thiserror::Error;

/// A boxed, thread-safe error. Handlers may convert any error into this.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by waypost's fallible operations.
///
/// A route miss is not an error: it is answered with `404` directly by the
/// pipeline. Everything raised by a hook, a middleware or a handler ends up
/// here and is handed to the registered error hooks.
#[derive(Debug, Error)]
pub enum Error {
    /// Binding to a port or accepting a connection failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// A route could not be registered (conflict or malformed pattern).
    #[error("invalid route `{method} {path}`: {source}")]
    Route {
        method: Method,
        path: String,
        #[source]
        source: matchit::InsertError,
    },

    /// A route references a middleware name that was never registered.
    #[error("middleware `{0}` not found")]
    MiddlewareNotFound(String),

    /// A structured payload could not be serialized.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// Failure raised by application code.
    #[error("handler failed: {0}")]
    Handler(#[source] BoxError),

    /// A hook, middleware or handler panicked.
    #[error("handler panicked: {0}")]
    Panic(String),
}

impl Error {
    /// Wraps any application error.
    pub fn handler(err: impl Into<BoxError>) -> Self {
        Self::Handler(err.into())
    }

    /// `true` for errors caused by the pipeline's own configuration rather
    /// than by application code.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::MiddlewareNotFound(_) | Self::Route { .. })
    }
}

impl From<BoxError> for Error {
    fn from(e: BoxError) -> Self {
        Self::Handler(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_middleware_is_a_configuration_error() {
        let err = Error::MiddlewareNotFound("auth".into());
        assert!(err.is_configuration());
        assert_eq!(err.to_string(), "middleware `auth` not found");
    }

    #[test]
    fn handler_errors_keep_their_source() {
        let err = Error::handler("database unavailable");
        assert!(!err.is_configuration());
        assert_eq!(err.to_string(), "handler failed: database unavailable");
        assert!(std::error::Error::source(&err).is_some());
    }
}

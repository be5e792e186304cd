//! Per-request state shared by hooks, middleware and the handler.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::request::Parts;
use http::{HeaderMap, Method, Uri};
use http_body_util::BodyExt;
use sync_wrapper::SyncWrapper;

use crate::body::RequestBody;
use crate::error::Error;
use crate::response::Response;
use crate::router::Extra;

/// Everything one exchange knows about itself.
///
/// One context is built per matched request and lent mutably to each step of
/// the pipeline in turn. It is never reused.
pub struct RequestContext {
    parts: Parts,
    body: SyncWrapper<Option<RequestBody>>,
    host: Option<String>,
    path: String,
    query: Vec<(String, String)>,
    params: HashMap<String, String>,
    session: Option<Arc<dyn Any + Send + Sync>>,
    store: Option<Extra>,
    response: Response,
}

impl RequestContext {
    pub(crate) fn new(
        request: http::Request<RequestBody>,
        target: Target,
        params: HashMap<String, String>,
        store: Option<Extra>,
        response: Response,
    ) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            parts,
            body: SyncWrapper::new(Some(body)),
            host: target.host,
            path: target.path,
            query: target.query,
            params,
            session: None,
            store,
            response,
        }
    }

    pub fn method(&self) -> &Method { &self.parts.method }
    pub fn uri(&self) -> &Uri { &self.parts.uri }
    pub fn headers(&self) -> &HeaderMap { &self.parts.headers }
    pub fn path(&self) -> &str { &self.path }
    pub fn host(&self) -> Option<&str> { self.host.as_deref() }
    pub fn params(&self) -> &HashMap<String, String> { &self.params }
    pub fn query_pairs(&self) -> &[(String, String)] { &self.query }

    /// Header value as text, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name)?.to_str().ok()
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/:id`, `ctx.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// First query value for `key`.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// The `extra` value the route was registered with.
    pub fn store<T: Any>(&self) -> Option<&T> {
        self.store.as_deref()?.downcast_ref()
    }

    /// The session set by upstream middleware, if any.
    pub fn session<T: Any>(&self) -> Option<&T> {
        self.session.as_deref()?.downcast_ref()
    }

    pub fn set_session<T: Any + Send + Sync>(&mut self, session: T) -> &mut Self {
        self.session = Some(Arc::new(session));
        self
    }

    /// Reads the whole request body. The body can be taken once; later calls
    /// return an empty buffer.
    pub async fn body_bytes(&mut self) -> Result<Bytes, Error> {
        let taken = self.body.get_mut().take();
        let Some(body) = taken else {
            return Ok(Bytes::new());
        };
        let collected = body.collect().await.map_err(Error::Handler)?;
        Ok(collected.to_bytes())
    }

    /// Request line, headers and extensions.
    pub fn parts(&self) -> &Parts { &self.parts }
    pub fn response(&self) -> &Response { &self.response }
    pub fn response_mut(&mut self) -> &mut Response { &mut self.response }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", self.method())
            .field("path", &self.path)
            .field("params", &self.params)
            .field("response", &self.response)
            .finish_non_exhaustive()
    }
}

/// Host, path and query, parsed once from the request target.
#[derive(Debug, Default)]
pub(crate) struct Target {
    pub(crate) host: Option<String>,
    pub(crate) path: String,
    pub(crate) query: Vec<(String, String)>,
}

impl Target {
    /// The authority (HTTP/2 `:authority`, absolute-form URIs) takes
    /// precedence over the `Host` header.
    pub(crate) fn parse<B>(request: &http::Request<B>) -> Self {
        let uri = request.uri();
        let host = uri
            .authority()
            .map(|a| a.as_str().to_owned())
            .or_else(|| {
                request
                    .headers()
                    .get(http::header::HOST)
                    .and_then(|h| h.to_str().ok())
                    .map(str::to_owned)
            });
        let query = uri
            .query()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        Self { host, path: uri.path().to_owned(), query }
    }
}

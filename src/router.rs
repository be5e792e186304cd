//! Radix-tree request router.
//!
//! One tree per HTTP method and host constraint. O(path-length) lookup via
//! [`matchit`]. The router only matches; what runs around the handler is the
//! pipeline's business.
//!
//! Patterns accept `:name` parameters and a trailing `*` wildcard (exposed as
//! the `"*"` param), as well as matchit's own `{name}` / `{*name}` syntax.
//! A wildcard also matches its bare prefix, so `/static/*` answers
//! `/static/` with `"*" = ""`. Param values are percent-decoded.

use std::any::Any;
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use http::Method;
use http::uri::Authority;
use matchit::Router as MatchitRouter;
use percent_encoding::percent_decode_str;

use crate::error::Error;
use crate::handler::BoxedHandler;
use crate::middleware::MiddlewareRef;

/// Internal name of the trailing wildcard; reported to handlers as `"*"`.
const WILDCARD: &str = "__wildcard";

/// Opaque metadata attached to a route at registration.
pub type Extra = Arc<dyn Any + Send + Sync>;

/// Path normalization applied both when registering and when matching.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RouterConfig {
    /// `/users/` matches `/users`.
    pub ignore_trailing_slash: bool,
    /// `//users` and `users` match `/users`.
    pub ignore_leading_slash: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self { ignore_trailing_slash: true, ignore_leading_slash: true }
    }
}

/// Matching constraints beyond method and path.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RouteConstraints {
    /// Only match requests whose host (port ignored) equals this value.
    pub host: Option<String>,
}

/// What a route stores besides its handler.
#[derive(Clone, Default)]
pub struct RouteStore {
    pub middleware: Vec<MiddlewareRef>,
    pub extra: Option<Extra>,
}

/// A registered route.
#[derive(Clone)]
pub struct Route {
    pub handler: BoxedHandler,
    pub store: RouteStore,
}

/// Result of a successful lookup.
pub struct Matched {
    pub route: Arc<Route>,
    pub params: HashMap<String, String>,
}

struct Table {
    host: Option<String>,
    tree: MatchitRouter<Arc<Route>>,
    // Wildcard routes again, keyed by the prefix in front of `*`.
    bare: MatchitRouter<Arc<Route>>,
    patterns: HashSet<String>,
}

impl Table {
    fn new(host: Option<String>) -> Self {
        Self { host, tree: MatchitRouter::new(), bare: MatchitRouter::new(), patterns: HashSet::new() }
    }

    fn remove(&mut self, pattern: &str, bare: Option<&str>) -> bool {
        if let Some(bare) = bare {
            self.bare.remove(bare);
        }
        self.patterns.remove(pattern);
        self.tree.remove(pattern).is_some()
    }

    fn at(&self, path: &str) -> Option<(Arc<Route>, HashMap<String, String>)> {
        if let Ok(matched) = self.tree.at(path) {
            return Some((Arc::clone(matched.value), params(&matched.params)));
        }
        let matched = self.bare.at(path).ok()?;
        let mut params = params(&matched.params);
        params.insert("*".to_owned(), String::new());
        Some((Arc::clone(matched.value), params))
    }
}

fn params(raw: &matchit::Params<'_, '_>) -> HashMap<String, String> {
    raw.iter()
        .map(|(k, v)| {
            let k = if k == WILDCARD { "*" } else { k };
            (k.to_owned(), decode(v))
        })
        .collect()
}

/// Percent-decodes a param value. Values that do not decode to UTF-8 are
/// kept as they came.
fn decode(value: &str) -> String {
    percent_decode_str(value).decode_utf8().map_or_else(|_| value.to_owned(), Cow::into_owned)
}

/// The route table.
///
/// Build it once at startup. Lookups take `&self` and can run from any
/// number of requests at once.
#[derive(Default)]
pub struct Router {
    config: RouterConfig,
    routes: HashMap<Method, Vec<Table>>,
}

impl Router {
    pub fn new(config: RouterConfig) -> Self {
        Self { config, routes: HashMap::new() }
    }

    pub fn config(&self) -> RouterConfig {
        self.config
    }

    /// Registers `route`. Fails if the same method, pattern and host are
    /// already taken, or if the pattern is malformed.
    pub fn insert(
        &mut self,
        method: Method,
        path: &str,
        constraints: &RouteConstraints,
        route: Route,
    ) -> Result<(), Error> {
        let pattern = self.pattern(path);
        let bare = self.bare_prefix(&pattern);
        let host = constraints.host.as_deref().map(normalize_host);

        let tables = self.routes.entry(method.clone()).or_default();
        let index = match tables.iter().position(|t| t.host == host) {
            Some(index) => index,
            None => {
                tables.push(Table::new(host));
                tables.len() - 1
            }
        };
        let table = &mut tables[index];
        let route = Arc::new(route);

        let conflict = |source| Error::Route { method: method.clone(), path: path.to_owned(), source };
        table.tree.insert(pattern.clone(), Arc::clone(&route)).map_err(conflict)?;
        if let Some(bare) = bare {
            if let Err(source) = table.bare.insert(bare, route) {
                table.tree.remove(pattern.as_str());
                return Err(conflict(source));
            }
        }
        table.patterns.insert(pattern);
        Ok(())
    }

    /// Removes `path` under every host constraint of `method`. Returns how
    /// many routes were removed.
    pub fn remove(&mut self, method: &Method, path: &str) -> usize {
        let pattern = self.pattern(path);
        let bare = self.bare_prefix(&pattern);
        let Some(tables) = self.routes.get_mut(method) else {
            return 0;
        };
        tables
            .iter_mut()
            .map(|t| t.remove(&pattern, bare.as_deref()))
            .filter(|removed| *removed)
            .count()
    }

    /// Removes `path` for exactly one host constraint.
    pub fn remove_constrained(
        &mut self,
        method: &Method,
        path: &str,
        constraints: &RouteConstraints,
    ) -> bool {
        let pattern = self.pattern(path);
        let bare = self.bare_prefix(&pattern);
        let host = constraints.host.as_deref().map(normalize_host);
        self.routes
            .get_mut(method)
            .and_then(|tables| tables.iter_mut().find(|t| t.host == host))
            .is_some_and(|table| table.remove(&pattern, bare.as_deref()))
    }

    /// Looks up a route. Host-constrained routes win over unconstrained ones.
    pub fn find(&self, method: &Method, path: &str, host: Option<&str>) -> Option<Matched> {
        let tables = self.routes.get(method)?;
        let path = self.normalize(path);
        let host = host.map(normalize_host);

        let constrained = tables.iter().filter(|t| t.host.is_some() && t.host == host);
        let open = tables.iter().filter(|t| t.host.is_none());
        let (route, params) = constrained.chain(open).find_map(|t| t.at(&path))?;
        Some(Matched { route, params })
    }

    /// Number of registered routes across all methods and hosts.
    pub fn len(&self) -> usize {
        self.routes.values().flatten().map(|t| t.patterns.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn normalize(&self, path: &str) -> String {
        let mut path = path;
        if self.config.ignore_leading_slash {
            path = path.trim_start_matches('/');
        }
        if self.config.ignore_trailing_slash {
            path = path.trim_end_matches('/');
        }
        if path.starts_with('/') {
            path.to_owned()
        } else {
            format!("/{path}")
        }
    }

    /// Translates a registration path into matchit syntax.
    fn pattern(&self, path: &str) -> String {
        self.normalize(path)
            .split('/')
            .map(|segment| {
                if let Some(name) = segment.strip_prefix(':') {
                    format!("{{{name}}}")
                } else if segment == "*" {
                    format!("{{*{WILDCARD}}}")
                } else if segment.starts_with('{') && segment.ends_with('}') {
                    segment.to_owned()
                } else {
                    segment.replace('{', "{{").replace('}', "}}")
                }
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// The path a trailing-wildcard pattern answers with an empty `"*"`.
    fn bare_prefix(&self, pattern: &str) -> Option<String> {
        let prefix = pattern.strip_suffix(&format!("/{{*{WILDCARD}}}"))?;
        if self.config.ignore_trailing_slash && !prefix.is_empty() {
            Some(prefix.to_owned())
        } else {
            Some(format!("{prefix}/"))
        }
    }
}

/// Lowercases `host` and drops a trailing port.
pub(crate) fn normalize_host(host: &str) -> String {
    match host.parse::<Authority>() {
        Ok(authority) => authority.host().to_ascii_lowercase(),
        Err(_) => host.to_ascii_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::handler::BoxFuture;

    fn route() -> Route {
        fn boxed<H>(h: H) -> BoxedHandler
        where
            H: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, Result<(), Error>>
                + Send
                + Sync
                + 'static,
        {
            Arc::new(h)
        }
        Route { handler: boxed(|_| Box::pin(async { Ok(()) })), store: RouteStore::default() }
    }

    fn tagged(tag: &'static str) -> Route {
        Route {
            store: RouteStore { extra: Some(Arc::new(tag) as Extra), ..RouteStore::default() },
            ..route()
        }
    }

    fn tag(matched: &Matched) -> &'static str {
        *matched.route.store.extra.as_ref().unwrap().downcast_ref::<&'static str>().unwrap()
    }

    #[test]
    fn colon_params_are_extracted() {
        let mut router = Router::default();
        router.insert(Method::GET, "/users/:id", &RouteConstraints::default(), route()).unwrap();

        let matched = router.find(&Method::GET, "/users/42", None).unwrap();
        assert_eq!(matched.params.len(), 1);
        assert_eq!(matched.params["id"], "42");
        assert!(router.find(&Method::POST, "/users/42", None).is_none());
        assert!(router.find(&Method::GET, "/users", None).is_none());
    }

    #[test]
    fn trailing_wildcard_is_exposed_as_star() {
        let mut router = Router::default();
        router.insert(Method::GET, "/static/*", &RouteConstraints::default(), route()).unwrap();

        let matched = router.find(&Method::GET, "/static/css/site.css", None).unwrap();
        assert_eq!(matched.params["*"], "css/site.css");
    }

    #[test]
    fn wildcard_matches_bare_prefix() {
        let mut router = Router::default();
        router.insert(Method::GET, "/static/*", &RouteConstraints::default(), route()).unwrap();
        router.insert(Method::GET, "/files/:id/*", &RouteConstraints::default(), route()).unwrap();

        for path in ["/static/", "/static"] {
            let matched = router.find(&Method::GET, path, None).unwrap();
            assert_eq!(matched.params["*"], "");
        }
        let matched = router.find(&Method::GET, "/files/7/", None).unwrap();
        assert_eq!(matched.params["id"], "7");
        assert_eq!(matched.params["*"], "");
        assert!(router.find(&Method::GET, "/stat", None).is_none());
    }

    #[test]
    fn bare_prefix_keeps_its_slash_when_strict() {
        let mut router = Router::new(RouterConfig {
            ignore_trailing_slash: false,
            ignore_leading_slash: false,
        });
        router.insert(Method::GET, "/static/*", &RouteConstraints::default(), route()).unwrap();

        assert_eq!(router.find(&Method::GET, "/static/", None).unwrap().params["*"], "");
        assert!(router.find(&Method::GET, "/static", None).is_none());
    }

    #[test]
    fn explicit_prefix_route_beats_wildcard() {
        let mut router = Router::default();
        router.insert(Method::GET, "/static/*", &RouteConstraints::default(), tagged("wild")).unwrap();
        router.insert(Method::GET, "/static", &RouteConstraints::default(), tagged("index")).unwrap();

        assert_eq!(tag(&router.find(&Method::GET, "/static", None).unwrap()), "index");
        assert_eq!(router.remove(&Method::GET, "/static/*"), 1);
        assert_eq!(tag(&router.find(&Method::GET, "/static/", None).unwrap()), "index");
        assert!(router.find(&Method::GET, "/static/app.js", None).is_none());
    }

    #[test]
    fn params_are_percent_decoded() {
        let mut router = Router::default();
        router.insert(Method::GET, "/users/:name", &RouteConstraints::default(), route()).unwrap();
        router.insert(Method::GET, "/raw/*", &RouteConstraints::default(), route()).unwrap();

        let matched = router.find(&Method::GET, "/users/J%C3%BCrgen%20X", None).unwrap();
        assert_eq!(matched.params["name"], "Jürgen X");
        let matched = router.find(&Method::GET, "/raw/a%2Fb/c", None).unwrap();
        assert_eq!(matched.params["*"], "a/b/c");
        // Not UTF-8 once decoded: kept verbatim.
        let matched = router.find(&Method::GET, "/users/%FF", None).unwrap();
        assert_eq!(matched.params["name"], "%FF");
    }

    #[test]
    fn slashes_are_normalized() {
        let mut router = Router::default();
        router.insert(Method::GET, "users/", &RouteConstraints::default(), route()).unwrap();

        assert!(router.find(&Method::GET, "/users", None).is_some());
        assert!(router.find(&Method::GET, "/users/", None).is_some());
        assert!(router.find(&Method::GET, "//users", None).is_some());
    }

    #[test]
    fn strict_slashes_when_configured() {
        let mut router = Router::new(RouterConfig {
            ignore_trailing_slash: false,
            ignore_leading_slash: false,
        });
        router.insert(Method::GET, "/users", &RouteConstraints::default(), route()).unwrap();

        assert!(router.find(&Method::GET, "/users", None).is_some());
        assert!(router.find(&Method::GET, "/users/", None).is_none());
    }

    #[test]
    fn duplicate_registration_conflicts() {
        let mut router = Router::default();
        let open = RouteConstraints::default();
        router.insert(Method::GET, "/x", &open, route()).unwrap();

        let err = router.insert(Method::GET, "/x", &open, route()).unwrap_err();
        assert!(matches!(err, Error::Route { .. }));
        assert_eq!(router.len(), 1);
    }

    #[test]
    fn host_constrained_routes_win() {
        let mut router = Router::default();
        let api = RouteConstraints { host: Some("API.example.com".into()) };
        router.insert(Method::GET, "/", &RouteConstraints::default(), tagged("open")).unwrap();
        router.insert(Method::GET, "/", &api, tagged("api")).unwrap();

        let hit = router.find(&Method::GET, "/", Some("api.example.com:8080")).unwrap();
        assert_eq!(tag(&hit), "api");
        let miss = router.find(&Method::GET, "/", Some("www.example.com")).unwrap();
        assert_eq!(tag(&miss), "open");
        let none = router.find(&Method::GET, "/", None).unwrap();
        assert_eq!(tag(&none), "open");
    }

    #[test]
    fn remove_drops_every_host_variant() {
        let mut router = Router::default();
        let api = RouteConstraints { host: Some("api.example.com".into()) };
        router.insert(Method::GET, "/x/:id", &RouteConstraints::default(), route()).unwrap();
        router.insert(Method::GET, "/x/:id", &api, route()).unwrap();
        assert_eq!(router.len(), 2);

        assert_eq!(router.remove(&Method::GET, "/x/:id"), 2);
        assert!(router.is_empty());
        assert!(router.find(&Method::GET, "/x/1", Some("api.example.com")).is_none());
        assert_eq!(router.remove(&Method::GET, "/x/:id"), 0);
    }

    #[test]
    fn remove_constrained_keeps_other_hosts() {
        let mut router = Router::default();
        let api = RouteConstraints { host: Some("api.example.com".into()) };
        router.insert(Method::GET, "/x", &RouteConstraints::default(), tagged("open")).unwrap();
        router.insert(Method::GET, "/x", &api, tagged("api")).unwrap();

        assert!(router.remove_constrained(&Method::GET, "/x", &api));
        assert_eq!(router.len(), 1);
        let matched = router.find(&Method::GET, "/x", Some("api.example.com")).unwrap();
        assert_eq!(tag(&matched), "open");
    }

    #[test]
    fn host_normalization() {
        assert_eq!(normalize_host("Example.COM:443"), "example.com");
        assert_eq!(normalize_host("[::1]:8080"), "[::1]");
        assert_eq!(normalize_host("localhost"), "localhost");
        assert_eq!(normalize_host("[::1]"), "[::1]");
        assert_eq!(normalize_host("not a host"), "not a host");
    }
}

//! Request routing — map URL patterns and HTTP methods to handler functions.
//!
//! This module provides [`Router`], which resolves an incoming method and path
//! to a handler plus the path parameters captured from the URL. Three pattern
//! styles are supported:
//!
//! | Pattern              | Example match              | Captured params                 |
//! |----------------------|----------------------------|---------------------------------|
//! | `/users`             | `/users`                   | *(none)*                        |
//! | `/users/:id`         | `/users/42`                | `id → "42"`                     |
//! | `/files/*`           | `/files/docs/readme.txt`   | `wildcard → "docs/readme.txt"`  |
//!
//! Patterns are compiled into anchored regular expressions once, when the
//! route is registered. Every character outside a parameter is matched
//! literally, so `/v1.0/ping` does not match `/v1x0/ping`.
//!
//! Routes are matched in registration order; the first route whose method and
//! pattern both match wins. There is no specificity scoring: register
//! `/users/active` before `/users/:id` if the literal route must win.

use std::pin::Pin;
use std::sync::Arc;

use regex::Regex;
use thiserror::Error;

use crate::context::{Context, Parameters};
use crate::Method;

/// Boxed future returned by handlers and middleware.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Type-erased, heap-allocated async handler that receives a [`Context`],
/// writes its response, and hands the context back.
///
/// Handlers are stored behind `Arc<dyn Fn(…)>` so they can be cloned and shared across
/// tasks without copying the underlying closure. In practice you never construct this
/// type directly — use [`Router::get`], [`Router::post`], and the other method-specific
/// helpers instead.
pub type Handler = Arc<dyn Fn(Context) -> BoxFuture<Context> + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Context> + Send` that is also
/// `Send + Sync + 'static` implements this trait automatically via the blanket impl
/// below. Router methods accept `impl IntoHandler` so the two-type-parameter where-bound
/// does not need to be repeated at every call site.
pub trait IntoHandler: Send + Sync + 'static {
    /// Call the handler with the given context, boxing the returned future.
    fn call(&self, ctx: Context) -> BoxFuture<Context>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Context> + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture<Context> {
        Box::pin((self)(ctx))
    }
}

/// Errors reported when a route pattern cannot be registered.
///
/// A failed registration leaves the router exactly as it was.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("route pattern {pattern:?} must start with '/'")]
    MissingLeadingSlash { pattern: String },

    #[error("route pattern {pattern:?} has a ':' marker without a parameter name")]
    EmptyParameter { pattern: String },

    #[error("route pattern {pattern:?} has an invalid parameter name {name:?}")]
    InvalidParameter { pattern: String, name: String },

    #[error("route pattern {pattern:?} binds parameter {name:?} more than once")]
    DuplicateParameter { pattern: String, name: String },

    #[error("route pattern {pattern:?} could not be compiled: {source}")]
    Compile {
        pattern: String,
        #[source]
        source: Box<regex::Error>,
    },
}

/// Marker that starts a named path parameter.
const PARAM_MARKER: char = ':';

/// Parameter name bound to the text matched by a trailing `*`.
pub const WILDCARD_PARAM: &str = "wildcard";

// Compiled representation of a route pattern string.
#[derive(Debug, Clone)]
struct Pattern {
    matcher: Regex,
    // One name per capture group, in pattern order.
    names: Vec<String>,
}

impl Pattern {
    /// Compile a route pattern string into an anchored matcher.
    ///
    /// The pattern is walked left to right:
    ///
    /// 1. `:name` up to the next `/` (or the end) becomes `([^/]+)` and `name`
    ///    is recorded.
    /// 2. A `*` as the very last character becomes the catch-all `(.*)`, recorded
    ///    as [`WILDCARD_PARAM`].
    /// 3. Everything else is escaped and matched literally.
    fn compile(pattern: &str) -> Result<Self, RouteError> {
        if !pattern.starts_with('/') {
            return Err(RouteError::MissingLeadingSlash {
                pattern: pattern.to_owned(),
            });
        }

        let mut expr = String::with_capacity(pattern.len() * 2 + 2);
        let mut names: Vec<String> = Vec::new();
        let mut literal = String::new();
        expr.push('^');

        let mut rest = pattern;
        while let Some(c) = rest.chars().next() {
            if c == PARAM_MARKER {
                let end = rest.find('/').unwrap_or(rest.len());
                let name = &rest[1..end];
                validate_name(pattern, name, &names)?;

                expr.push_str(&regex::escape(&literal));
                literal.clear();
                expr.push_str("([^/]+)");
                names.push(name.to_owned());
                rest = &rest[end..];
            } else if c == '*' && rest.len() == 1 {
                if names.iter().any(|n| n == WILDCARD_PARAM) {
                    return Err(RouteError::DuplicateParameter {
                        pattern: pattern.to_owned(),
                        name: WILDCARD_PARAM.to_owned(),
                    });
                }
                expr.push_str(&regex::escape(&literal));
                literal.clear();
                expr.push_str("(.*)");
                names.push(WILDCARD_PARAM.to_owned());
                rest = "";
            } else {
                literal.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
        expr.push_str(&regex::escape(&literal));
        expr.push('$');

        let matcher = Regex::new(&expr).map_err(|e| RouteError::Compile {
            pattern: pattern.to_owned(),
            source: Box::new(e),
        })?;

        Ok(Self { matcher, names })
    }

    // Try to match `path` against this pattern, returning extracted [`Parameters`] on success.
    fn matches(&self, path: &str) -> Option<Parameters> {
        let captures = self.matcher.captures(path)?;
        let mut params = Parameters::new();
        for (name, value) in self.names.iter().zip(captures.iter().skip(1)) {
            params.insert(name.as_str(), value.map_or("", |m| m.as_str()));
        }
        Some(params)
    }
}

fn validate_name(pattern: &str, name: &str, seen: &[String]) -> Result<(), RouteError> {
    if name.is_empty() {
        return Err(RouteError::EmptyParameter {
            pattern: pattern.to_owned(),
        });
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(RouteError::InvalidParameter {
            pattern: pattern.to_owned(),
            name: name.to_owned(),
        });
    }
    if seen.iter().any(|n| n == name) {
        return Err(RouteError::DuplicateParameter {
            pattern: pattern.to_owned(),
            name: name.to_owned(),
        });
    }
    Ok(())
}

// A single registered route binding a method + pattern to a handler.
struct Route {
    method: Method,
    path: String,
    pattern: Pattern,
    handler: Handler,
}

impl Route {
    // Returns `Some(params)` when both the HTTP method and path pattern match, `None` otherwise.
    fn matches(&self, method: &Method, path: &str) -> Option<Parameters> {
        if &self.method == method {
            self.pattern.matches(path)
        } else {
            None
        }
    }
}

/// The route selected for a request.
pub struct RouteMatch<'a> {
    /// The pattern as registered (including any group prefix).
    pub pattern: &'a str,
    /// Captured parameters, in pattern order.
    pub params: Parameters,
    handler: &'a Handler,
}

impl RouteMatch<'_> {
    pub fn handler(&self) -> Handler {
        Arc::clone(self.handler)
    }
}

/// Outcome of [`Router::dispatch`].
pub enum Routed {
    /// A handler ran; its context is returned.
    Handled(Context),
    /// No route matched. The context is returned untouched.
    NotFound(Context),
}

/// HTTP request router that dispatches requests to registered handler functions.
///
/// Routes are evaluated in registration order; the first route whose HTTP method and path
/// pattern both match the incoming request is used.
///
/// # Examples
///
/// ```rust
/// use switchyard::{Context, Router, StatusCode};
///
/// # fn main() -> Result<(), switchyard::router::RouteError> {
/// let mut router = Router::new();
///
/// router.get("/ping", |mut ctx: Context| async move {
///     ctx.text("pong");
///     ctx
/// })?;
///
/// router.get("/users/:id", |mut ctx: Context| async move {
///     let id = ctx.param("id").unwrap_or("unknown").to_owned();
///     ctx.status(StatusCode::Ok).text(id);
///     ctx
/// })?;
///
/// let api = router.group("/api");
/// assert_eq!(api.prefix(), "/api");
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
    prefix: String,
}

impl Router {
    /// Create a new, empty `Router` with no registered routes.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use switchyard::Router;
    ///
    /// let router = Router::new();
    /// assert!(router.is_empty());
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new, empty router whose registrations are prefixed with this
    /// router's prefix followed by `prefix`.
    ///
    /// The child has its own route list; hand it back with [`merge`](Self::merge)
    /// once its routes are registered.
    ///
    /// ```rust
    /// use switchyard::{Context, Router};
    ///
    /// # fn main() -> Result<(), switchyard::router::RouteError> {
    /// let mut router = Router::new();
    /// let mut v1 = router.group("/api").group("/v1");
    /// v1.get("/status", |ctx: Context| async move { ctx })?;
    /// router.merge(v1);
    /// assert!(router.find(&switchyard::Method::Get, "/api/v1/status").is_some());
    /// # Ok(())
    /// # }
    /// ```
    pub fn group(&self, prefix: &str) -> Router {
        Router {
            routes: Vec::new(),
            prefix: format!("{}{}", self.prefix, prefix),
        }
    }

    /// The prefix applied to every pattern registered on this router.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Appends all of `other`'s routes, keeping their order. Patterns are not
    /// re-prefixed.
    pub fn merge(&mut self, other: Router) {
        self.routes.extend(other.routes);
    }

    /// Register a handler for `GET` requests matching `path`.
    ///
    /// # Errors
    ///
    /// Returns a [`RouteError`] when `path` is not a valid pattern.
    pub fn get(&mut self, path: &str, handler: impl IntoHandler) -> Result<(), RouteError> {
        self.route(Method::Get, path, handler)
    }

    /// Register a handler for `POST` requests matching `path`.
    pub fn post(&mut self, path: &str, handler: impl IntoHandler) -> Result<(), RouteError> {
        self.route(Method::Post, path, handler)
    }

    /// Register a handler for `PUT` requests matching `path`.
    pub fn put(&mut self, path: &str, handler: impl IntoHandler) -> Result<(), RouteError> {
        self.route(Method::Put, path, handler)
    }

    /// Register a handler for `DELETE` requests matching `path`.
    pub fn delete(&mut self, path: &str, handler: impl IntoHandler) -> Result<(), RouteError> {
        self.route(Method::Delete, path, handler)
    }

    /// Register a handler for `PATCH` requests matching `path`.
    pub fn patch(&mut self, path: &str, handler: impl IntoHandler) -> Result<(), RouteError> {
        self.route(Method::Patch, path, handler)
    }

    /// Register a handler for `OPTIONS` requests matching `path`.
    pub fn options(&mut self, path: &str, handler: impl IntoHandler) -> Result<(), RouteError> {
        self.route(Method::Options, path, handler)
    }

    /// Register a handler for `HEAD` requests matching `path`.
    pub fn head(&mut self, path: &str, handler: impl IntoHandler) -> Result<(), RouteError> {
        self.route(Method::Head, path, handler)
    }

    /// Register a handler for an arbitrary method.
    ///
    /// The group prefix is prepended and the pattern compiled here, once.
    ///
    /// # Errors
    ///
    /// Returns a [`RouteError`] for a pattern that does not start with `/`, a
    /// `:` marker with no name, an invalid or repeated parameter name, or an
    /// expression the matcher rejects. Nothing is registered in that case.
    pub fn route(
        &mut self,
        method: Method,
        path: &str,
        handler: impl IntoHandler,
    ) -> Result<(), RouteError> {
        let full_path = format!("{}{}", self.prefix, path);
        let pattern = Pattern::compile(&full_path)?;
        let handler: Handler = Arc::new(move |ctx: Context| handler.call(ctx));

        tracing::debug!(method = %method, pattern = %full_path, "route registered");
        self.routes.push(Route {
            method,
            path: full_path,
            pattern,
            handler,
        });
        Ok(())
    }

    /// Return the number of routes registered in this router.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Return `true` if no routes have been registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Registered `(method, pattern)` pairs in match order.
    pub fn routes(&self) -> impl Iterator<Item = (&Method, &str)> {
        self.routes.iter().map(|r| (&r.method, r.path.as_str()))
    }

    /// Resolve `method` and `path` to the first matching route.
    ///
    /// Returns `None` when nothing matches; that is an ordinary outcome, not an error.
    pub fn find(&self, method: &Method, path: &str) -> Option<RouteMatch<'_>> {
        self.routes.iter().find_map(|route| {
            route.matches(method, path).map(|params| RouteMatch {
                pattern: &route.path,
                params,
                handler: &route.handler,
            })
        })
    }

    /// Match the context's request, bind its path parameters and run the handler.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use switchyard::{Context, Request, Router};
    /// use switchyard::router::Routed;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> Result<(), switchyard::router::RouteError> {
    /// let mut router = Router::new();
    /// router.get("/users/:id", |mut ctx: Context| async move {
    ///     let id = ctx.param("id").unwrap_or_default().to_owned();
    ///     ctx.text(id);
    ///     ctx
    /// })?;
    ///
    /// let raw = b"GET /users/42 HTTP/1.1\r\n\r\n";
    /// let ctx = Context::new(Request::parse(raw).unwrap());
    /// match router.dispatch(ctx).await {
    ///     Routed::Handled(ctx) => assert_eq!(ctx.response().body_ref(), b"42"),
    ///     Routed::NotFound(_) => unreachable!(),
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn dispatch(&self, mut ctx: Context) -> Routed {
        let handler = match self.find(ctx.method(), ctx.path()) {
            Some(found) => {
                let handler = found.handler();
                ctx.set_params(found.params);
                handler
            }
            None => return Routed::NotFound(ctx),
        };
        Routed::Handled(handler(ctx).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Request, StatusCode};

    fn make_context(method: &str, path: &str) -> Context {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        Context::new(Request::parse(raw.as_bytes()).unwrap())
    }

    fn status(code: StatusCode) -> impl IntoHandler {
        move |mut ctx: Context| async move {
            ctx.status(code);
            ctx
        }
    }

    fn echo_params() -> impl IntoHandler {
        |mut ctx: Context| async move {
            let joined = ctx
                .params()
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(",");
            ctx.text(joined);
            ctx
        }
    }

    async fn run(router: &Router, method: &str, path: &str) -> (StatusCode, String) {
        match router.dispatch(make_context(method, path)).await {
            Routed::Handled(ctx) => {
                let res = ctx.into_response();
                (
                    res.status(),
                    String::from_utf8(res.body_ref().to_vec()).unwrap(),
                )
            }
            Routed::NotFound(_) => (StatusCode::NotFound, String::new()),
        }
    }

    // ── Pattern::compile ──────────────────────────────────────────────────────

    #[test]
    fn pattern_root() {
        let pat = Pattern::compile("/").unwrap();
        assert!(pat.matches("/").is_some());
        assert!(pat.matches("/other").is_none());
        assert!(pat.names.is_empty());
    }

    #[test]
    fn pattern_exact_is_anchored() {
        let pat = Pattern::compile("/users").unwrap();
        assert!(pat.matches("/users").is_some());
        assert!(pat.matches("/users/").is_none());
        assert!(pat.matches("/api/users").is_none());
        assert!(pat.matches("/usersx").is_none());
    }

    #[test]
    fn pattern_names_match_capture_groups() {
        for raw in [
            "/",
            "/users/:id",
            "/users/:id/posts/:post_id",
            "/files/*",
            "/a/:x/b/:y/c/:z",
        ] {
            let pat = Pattern::compile(raw).unwrap();
            assert_eq!(
                pat.names.len(),
                pat.matcher.captures_len() - 1,
                "pattern {raw}"
            );
        }
    }

    #[test]
    fn pattern_params_bound_left_to_right() {
        let pat = Pattern::compile("/a/:x/b/:y/c/:z").unwrap();
        let params = pat.matches("/a/1/b/2/c/3").unwrap();
        let pairs: Vec<_> = params.iter().collect();
        assert_eq!(pairs, vec![("x", "1"), ("y", "2"), ("z", "3")]);
    }

    #[test]
    fn pattern_param_is_single_segment() {
        let pat = Pattern::compile("/users/:id").unwrap();
        assert!(pat.matches("/users").is_none());
        assert!(pat.matches("/users/").is_none());
        assert!(pat.matches("/users/42/extra").is_none());
        assert_eq!(pat.matches("/users/42").unwrap().get("id"), Some("42"));
    }

    #[test]
    fn pattern_param_inside_segment_text() {
        let pat = Pattern::compile("/v:version/info").unwrap();
        assert_eq!(
            pat.matches("/v2/info").unwrap().get("version"),
            Some("2")
        );
    }

    #[test]
    fn pattern_metacharacters_are_literal() {
        let pat = Pattern::compile("/v1.0/ping").unwrap();
        assert!(pat.matches("/v1.0/ping").is_some());
        assert!(pat.matches("/v1x0/ping").is_none());

        let pat = Pattern::compile("/a+b/(c)/[d]/e?/{f}/g|h/^$").unwrap();
        assert!(pat.matches("/a+b/(c)/[d]/e?/{f}/g|h/^$").is_some());
        assert!(pat.matches("/aab/c/d/e/f/g").is_none());
    }

    #[test]
    fn pattern_inner_star_is_literal() {
        let pat = Pattern::compile("/a*b").unwrap();
        assert!(pat.matches("/a*b").is_some());
        assert!(pat.matches("/axxb").is_none());
        assert!(pat.names.is_empty());
    }

    #[test]
    fn pattern_wildcard_captures_rest() {
        let pat = Pattern::compile("/files/*").unwrap();
        let params = pat.matches("/files/docs/readme.txt").unwrap();
        assert_eq!(params.get(WILDCARD_PARAM), Some("docs/readme.txt"));
        assert_eq!(pat.matches("/files/").unwrap().get(WILDCARD_PARAM), Some(""));
        assert!(pat.matches("/other/readme.txt").is_none());
    }

    #[test]
    fn malformed_patterns_are_rejected() {
        assert!(matches!(
            Pattern::compile("/users/:"),
            Err(RouteError::EmptyParameter { .. })
        ));
        assert!(matches!(
            Pattern::compile("/a/:/b"),
            Err(RouteError::EmptyParameter { .. })
        ));
        assert!(matches!(
            Pattern::compile("users"),
            Err(RouteError::MissingLeadingSlash { .. })
        ));
        assert!(matches!(
            Pattern::compile("/x/:na(me"),
            Err(RouteError::InvalidParameter { .. })
        ));
        assert!(matches!(
            Pattern::compile("/x/:id/y/:id"),
            Err(RouteError::DuplicateParameter { .. })
        ));
        assert!(matches!(
            Pattern::compile("/x/:wildcard/*"),
            Err(RouteError::DuplicateParameter { .. })
        ));
    }

    // ── Router ────────────────────────────────────────────────────────────────

    #[test]
    fn router_starts_empty() {
        let router = Router::new();
        assert!(router.is_empty());
        assert_eq!(router.len(), 0);
        assert_eq!(router.prefix(), "");
    }

    #[test]
    fn failed_registration_leaves_router_unchanged() {
        let mut router = Router::new();
        router.get("/ok", status(StatusCode::Ok)).unwrap();
        assert!(router.get("/bad/:", status(StatusCode::Ok)).is_err());
        assert_eq!(router.len(), 1);
        let registered: Vec<_> = router.routes().map(|(_, p)| p.to_owned()).collect();
        assert_eq!(registered, vec!["/ok"]);
    }

    #[tokio::test]
    async fn router_empty_is_not_found() {
        let router = Router::new();
        assert!(matches!(
            router.dispatch(make_context("GET", "/")).await,
            Routed::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn router_method_must_match() {
        let mut router = Router::new();
        router.get("/hello", status(StatusCode::Ok)).unwrap();
        assert_eq!(run(&router, "GET", "/hello").await.0, StatusCode::Ok);
        assert_eq!(run(&router, "POST", "/hello").await.0, StatusCode::NotFound);
    }

    #[tokio::test]
    async fn router_method_variants_registered() {
        let mut router = Router::new();
        router.post("/r", status(StatusCode::Created)).unwrap();
        router.put("/r", status(StatusCode::Accepted)).unwrap();
        router.delete("/r", status(StatusCode::NoContent)).unwrap();
        router.patch("/r", status(StatusCode::Ok)).unwrap();
        router.options("/r", status(StatusCode::NoContent)).unwrap();
        router.head("/r", status(StatusCode::Ok)).unwrap();
        router
            .route(Method::Custom("PURGE".into()), "/r", status(StatusCode::Gone))
            .unwrap();
        assert_eq!(router.len(), 7);
        assert_eq!(run(&router, "POST", "/r").await.0, StatusCode::Created);
        assert_eq!(run(&router, "PUT", "/r").await.0, StatusCode::Accepted);
        assert_eq!(run(&router, "DELETE", "/r").await.0, StatusCode::NoContent);
        assert_eq!(run(&router, "PURGE", "/r").await.0, StatusCode::Gone);
    }

    #[tokio::test]
    async fn router_first_matching_route_wins() {
        let mut router = Router::new();
        router.get("/path", status(StatusCode::Ok)).unwrap();
        router.get("/path", status(StatusCode::Accepted)).unwrap();
        assert_eq!(run(&router, "GET", "/path").await.0, StatusCode::Ok);
    }

    // Registration order decides overlaps, not specificity.
    #[tokio::test]
    async fn earlier_parameter_route_shadows_later_literal_route() {
        let mut router = Router::new();
        router.get("/users/:id", echo_params()).unwrap();
        router.get("/users/active", status(StatusCode::Accepted)).unwrap();

        let (code, body) = run(&router, "GET", "/users/active").await;
        assert_eq!(code, StatusCode::Ok);
        assert_eq!(body, "id=active");

        let found = router.find(&Method::Get, "/users/active").unwrap();
        assert_eq!(found.pattern, "/users/:id");
    }

    #[tokio::test]
    async fn literal_route_registered_first_wins() {
        let mut router = Router::new();
        router.get("/users/active", status(StatusCode::Accepted)).unwrap();
        router.get("/users/:id", echo_params()).unwrap();
        assert_eq!(
            run(&router, "GET", "/users/active").await.0,
            StatusCode::Accepted
        );
        assert_eq!(run(&router, "GET", "/users/7").await.1, "id=7");
    }

    #[tokio::test]
    async fn handler_receives_all_params_in_order() {
        let mut router = Router::new();
        router
            .get("/users/:id/posts/:post_id", echo_params())
            .unwrap();
        let (_, body) = run(&router, "GET", "/users/7/posts/99").await;
        assert_eq!(body, "id=7,post_id=99");
    }

    #[tokio::test]
    async fn group_prefixes_registrations() {
        let mut router = Router::new();
        let api = router.group("/api");
        let mut v1 = api.group("/v1");
        assert_eq!(v1.prefix(), "/api/v1");
        v1.get("/users/:id", echo_params()).unwrap();

        // The child's routes are its own until merged.
        assert!(router.is_empty());
        assert_eq!(v1.len(), 1);

        router.merge(v1);
        assert_eq!(run(&router, "GET", "/api/v1/users/3").await.1, "id=3");
        assert_eq!(
            run(&router, "GET", "/users/3").await.0,
            StatusCode::NotFound
        );
    }

    #[tokio::test]
    async fn merge_preserves_order_after_existing_routes() {
        let mut router = Router::new();
        router.get("/api/:thing", echo_params()).unwrap();
        let mut api = router.group("/api");
        api.get("/status", status(StatusCode::Accepted)).unwrap();
        router.merge(api);

        // The earlier parameter route still wins.
        assert_eq!(run(&router, "GET", "/api/status").await.1, "thing=status");
    }

    #[tokio::test]
    async fn wildcard_route_matches() {
        let mut router = Router::new();
        router.get("/files/*", echo_params()).unwrap();
        let (code, body) = run(&router, "GET", "/files/docs/readme.txt").await;
        assert_eq!(code, StatusCode::Ok);
        assert_eq!(body, "wildcard=docs/readme.txt");
    }
}

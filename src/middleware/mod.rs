//! Middleware pipeline — composable before/after request handler logic.
//!
//! This module defines the core types for building an ordered middleware stack.
//! Each middleware wraps the next layer, enabling request inspection, short-circuit
//! responses, and response decoration without coupling handlers to infrastructure
//! concerns.
//!
//! ## Core types
//!
//! - [`Middleware`] — trait implemented by all middleware.
//! - [`Next`] — cursor into the remaining middleware chain; call [`Next::run`] to
//!   advance to the next layer.
//! - [`MiddlewareHandler`] — type-erased, cheaply-cloneable middleware function.
//! - [`from_middleware`] / [`from_fn`] — build a [`MiddlewareHandler`] from a
//!   trait implementation or an async closure.
//! - [`MiddlewareStack`] — the ordered list collected before the server starts.
//! - [`Pipeline`] — the frozen stack plus the [`Router`] it ends in.
//! - [`LoggerMiddleware`] — built-in request/response logger.
//!
//! ## Ordering
//!
//! Middleware run in registration order on the way in. Whatever a middleware
//! does after `next.run(ctx).await` happens on the way out, so those sections
//! run in reverse order. Past the last middleware the [`Router`] is invoked;
//! an unmatched request gets a `404 Not Found`.

use std::{future::Future, sync::Arc};
use tokio::time::Instant;

use crate::{
    Response, StatusCode,
    context::Context,
    router::{Router, Routed},
};

pub use crate::router::BoxFuture;

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is passed to each middleware's [`Middleware::handle`] implementation.
/// Calling [`Next::run`] invokes the next middleware, or the router once the
/// chain is exhausted.
///
/// `Next` is consumed on each call to [`run`](Self::run), so it cannot be called
/// more than once per middleware invocation.
///
/// # Examples
///
/// ```rust
/// use switchyard::{Context, middleware::{BoxFuture, Middleware, Next}};
///
/// struct PassThrough;
///
/// impl Middleware for PassThrough {
///     fn handle(&self, ctx: Context, next: Next) -> BoxFuture<Context> {
///         Box::pin(async move { next.run(ctx).await })
///     }
/// }
/// ```
pub struct Next {
    pipeline: Arc<Pipeline>,
    // Position of the middleware invoked by the next `run` call.
    index: usize,
}

/// A type-erased, reference-counted middleware function.
///
/// Every entry in the middleware stack is stored as a `MiddlewareHandler`.
/// The [`Arc`] wrapper makes handlers cheap to clone so that [`Next`] can
/// advance through the chain without copying closures.
///
/// Construct one with [`from_middleware`], [`from_fn`], or by wrapping a closure directly:
///
/// ```rust
/// use std::sync::Arc;
/// use switchyard::{Context, middleware::{MiddlewareHandler, Next}};
///
/// let handler: MiddlewareHandler = Arc::new(|ctx: Context, next: Next| {
///     Box::pin(async move { next.run(ctx).await })
/// });
/// ```
pub type MiddlewareHandler =
    Arc<dyn Fn(Context, Next) -> BoxFuture<Context> + Send + Sync + 'static>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use switchyard::middleware::{LoggerMiddleware, from_middleware};
///
/// let handler = from_middleware(Arc::new(LoggerMiddleware));
/// ```
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// Converts an async closure into a [`MiddlewareHandler`].
///
/// ```rust
/// use switchyard::{Context, StatusCode, middleware::{Next, from_fn}};
///
/// let require_auth = from_fn(|mut ctx: Context, next: Next| async move {
///     if ctx.header_value("authorization").is_none() {
///         ctx.status(StatusCode::Unauthorized).text("Unauthorized");
///         return ctx;
///     }
///     next.run(ctx).await
/// });
/// ```
pub fn from_fn<F, Fut>(f: F) -> MiddlewareHandler
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Context> + Send + 'static,
{
    Arc::new(move |ctx: Context, next: Next| Box::pin(f(ctx, next)))
}

impl Next {
    /// Invokes the next middleware in the chain and returns the context it hands back.
    ///
    /// When no middleware remains the router dispatches the request. A request
    /// that matches no route comes back with a `404 Not Found` response.
    pub async fn run(self, ctx: Context) -> Context {
        match self.pipeline.middlewares.get(self.index) {
            Some(handler) => {
                let handler = Arc::clone(handler);
                let next = Next {
                    pipeline: Arc::clone(&self.pipeline),
                    index: self.index + 1,
                };
                handler(ctx, next).await
            }
            None => match self.pipeline.router.dispatch(ctx).await {
                Routed::Handled(ctx) => ctx,
                Routed::NotFound(mut ctx) => {
                    ctx.respond(Response::plain(StatusCode::NotFound));
                    ctx
                }
            },
        }
    }

    /// Number of middleware still ahead of this cursor.
    pub fn remaining(&self) -> usize {
        self.pipeline.middlewares.len().saturating_sub(self.index)
    }
}

/// The core trait for all switchyard middleware.
///
/// Implementors receive a [`Context`] and a [`Next`] cursor. They may:
///
/// - **Pass through** — call `next.run(ctx).await` without modification.
/// - **Short-circuit** — write a response into the context and return it
///   without calling `next`.
/// - **Decorate** — call `next.run(ctx).await`, then adjust the response on
///   the returned context.
///
/// # Contract
///
/// - Implementations **must** be `Send + Sync` because middleware is shared across
///   Tokio tasks.
/// - `handle` **must** return a pinned, `Send` future so it can be awaited across
///   `.await` points in multi-threaded runtimes.
pub trait Middleware: Send + Sync {
    /// Handle the request and optionally delegate to the next middleware.
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<Context>;
}

/// Ordered middleware collected while the server is being configured.
#[derive(Default, Clone)]
pub struct MiddlewareStack {
    handlers: Vec<MiddlewareHandler>,
}

impl MiddlewareStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware; it runs after everything already in the stack.
    pub fn push(&mut self, handler: MiddlewareHandler) {
        self.handlers.push(handler);
    }

    /// Appends every middleware from `other`, keeping their order.
    pub fn extend(&mut self, other: MiddlewareStack) {
        self.handlers.extend(other.handlers);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// A frozen middleware chain ending in a router.
///
/// Built once when the server starts and shared by every worker through an
/// [`Arc`]; nothing in it changes afterwards.
///
/// ```rust
/// use std::sync::Arc;
/// use switchyard::{Context, Request, Router, StatusCode};
/// use switchyard::middleware::{MiddlewareStack, Pipeline};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let pipeline = Arc::new(Pipeline::new(MiddlewareStack::new(), Router::new()));
/// let ctx = Context::new(Request::parse(b"GET /nope HTTP/1.1\r\n\r\n").unwrap());
/// let ctx = pipeline.execute(ctx).await;
/// assert_eq!(ctx.response().status(), StatusCode::NotFound);
/// # }
/// ```
pub struct Pipeline {
    middlewares: Arc<[MiddlewareHandler]>,
    router: Router,
}

impl Pipeline {
    pub fn new(stack: MiddlewareStack, router: Router) -> Self {
        Self {
            middlewares: stack.handlers.into(),
            router,
        }
    }

    /// Runs `ctx` through every middleware and the router.
    pub async fn execute(self: &Arc<Self>, ctx: Context) -> Context {
        Next {
            pipeline: Arc::clone(self),
            index: 0,
        }
        .run(ctx)
        .await
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn middleware_count(&self) -> usize {
        self.middlewares.len()
    }
}

/// Built-in middleware that logs each request's method, path, status, and duration.
///
/// Emits a single `tracing::info!` line after the downstream handler completes,
/// in the format:
///
/// ```text
/// METHOD /path - STATUS (duration)
/// ```
///
/// `LoggerMiddleware` does not short-circuit; it always delegates to the next
/// middleware and records the timing after the fact.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<Context> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.method().as_str().to_string();
            let path = ctx.path().to_string();

            let ctx = next.run(ctx).await;

            let duration = start.elapsed();
            let status = ctx.response().status();

            if status.is_server_error() {
                tracing::error!("{} {} - {} ({:?})", method, path, status.as_u16(), duration);
            } else if status.is_client_error() {
                tracing::warn!("{} {} - {} ({:?})", method, path, status.as_u16(), duration);
            } else {
                tracing::info!("{} {} - {} ({:?})", method, path, status.as_u16(), duration);
            }

            ctx
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::Request;

    type Trace = Arc<Mutex<Vec<String>>>;

    fn make_context(path: &str) -> Context {
        let raw = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        Context::new(Request::parse(raw.as_bytes()).unwrap())
    }

    fn recording(name: &'static str, trace: Trace) -> MiddlewareHandler {
        from_fn(move |ctx: Context, next: Next| {
            let trace = Arc::clone(&trace);
            async move {
                trace.lock().unwrap().push(format!("{name}:in"));
                let ctx = next.run(ctx).await;
                trace.lock().unwrap().push(format!("{name}:out"));
                ctx
            }
        })
    }

    fn short_circuit(name: &'static str, trace: Trace) -> MiddlewareHandler {
        from_fn(move |mut ctx: Context, _next: Next| {
            let trace = Arc::clone(&trace);
            async move {
                trace.lock().unwrap().push(format!("{name}:stop"));
                ctx.status(StatusCode::Forbidden).text("blocked");
                ctx
            }
        })
    }

    fn router_with_hello(trace: Trace) -> Router {
        let mut router = Router::new();
        router
            .get("/hello", move |mut ctx: Context| {
                let trace = Arc::clone(&trace);
                async move {
                    trace.lock().unwrap().push("handler".to_owned());
                    ctx.text("hi");
                    ctx
                }
            })
            .unwrap();
        router
    }

    fn entries(trace: &Trace) -> Vec<String> {
        trace.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn runs_in_order_then_unwinds_in_reverse() {
        let trace: Trace = Arc::default();
        let mut stack = MiddlewareStack::new();
        for name in ["a", "b", "c"] {
            stack.push(recording(name, Arc::clone(&trace)));
        }
        let pipeline = Arc::new(Pipeline::new(stack, router_with_hello(Arc::clone(&trace))));

        let ctx = pipeline.execute(make_context("/hello")).await;
        assert_eq!(ctx.response().body_ref(), b"hi");
        assert_eq!(
            entries(&trace),
            vec!["a:in", "b:in", "c:in", "handler", "c:out", "b:out", "a:out"]
        );
    }

    #[tokio::test]
    async fn short_circuit_skips_later_stages_and_router() {
        let trace: Trace = Arc::default();
        let mut stack = MiddlewareStack::new();
        stack.push(recording("a", Arc::clone(&trace)));
        stack.push(short_circuit("b", Arc::clone(&trace)));
        stack.push(recording("c", Arc::clone(&trace)));
        let pipeline = Arc::new(Pipeline::new(stack, router_with_hello(Arc::clone(&trace))));

        let ctx = pipeline.execute(make_context("/hello")).await;
        assert_eq!(ctx.response().status(), StatusCode::Forbidden);
        assert_eq!(ctx.response().body_ref(), b"blocked");
        assert_eq!(entries(&trace), vec!["a:in", "b:stop", "a:out"]);
    }

    #[tokio::test]
    async fn unmatched_request_gets_404() {
        let trace: Trace = Arc::default();
        let pipeline = Arc::new(Pipeline::new(
            MiddlewareStack::new(),
            router_with_hello(Arc::clone(&trace)),
        ));
        let ctx = pipeline.execute(make_context("/missing")).await;
        assert_eq!(ctx.response().status(), StatusCode::NotFound);
        assert_eq!(ctx.response().body_ref(), b"Not Found");
        assert!(entries(&trace).is_empty());
    }

    #[tokio::test]
    async fn outer_middleware_sees_inner_response() {
        let mut stack = MiddlewareStack::new();
        stack.push(from_fn(|ctx: Context, next: Next| async move {
            let mut ctx = next.run(ctx).await;
            let status = ctx.response().status().as_u16().to_string();
            ctx.header("X-Seen-Status", status);
            ctx
        }));
        let pipeline = Arc::new(Pipeline::new(stack, Router::new()));
        let ctx = pipeline.execute(make_context("/")).await;
        assert_eq!(ctx.response().headers().get("x-seen-status"), Some("404"));
    }

    #[tokio::test]
    async fn state_set_in_middleware_reaches_handler() {
        let mut stack = MiddlewareStack::new();
        stack.push(from_fn(|mut ctx: Context, next: Next| async move {
            ctx.set("user", String::from("ada"));
            next.run(ctx).await
        }));
        let mut router = Router::new();
        router
            .get("/me", |mut ctx: Context| async move {
                let user = ctx.get::<String>("user").cloned().unwrap_or_default();
                ctx.text(user);
                ctx
            })
            .unwrap();
        let pipeline = Arc::new(Pipeline::new(stack, router));
        let ctx = pipeline.execute(make_context("/me")).await;
        assert_eq!(ctx.response().body_ref(), b"ada");
    }

    #[tokio::test]
    async fn next_reports_remaining_stages() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut stack = MiddlewareStack::new();
        for _ in 0..3 {
            let seen = Arc::clone(&seen);
            stack.push(from_fn(move |ctx: Context, next: Next| {
                seen.lock().unwrap().push(next.remaining());
                next.run(ctx)
            }));
        }
        let pipeline = Arc::new(Pipeline::new(stack, Router::new()));
        assert_eq!(pipeline.middleware_count(), 3);
        pipeline.execute(make_context("/")).await;
        assert_eq!(*seen.lock().unwrap(), vec![2, 1, 0]);
    }

    #[tokio::test]
    async fn logger_passes_response_through() {
        let mut stack = MiddlewareStack::new();
        stack.push(from_middleware(Arc::new(LoggerMiddleware)));
        let trace: Trace = Arc::default();
        let pipeline = Arc::new(Pipeline::new(stack, router_with_hello(trace)));
        let ctx = pipeline.execute(make_context("/hello")).await;
        assert_eq!(ctx.response().status(), StatusCode::Ok);
        assert_eq!(ctx.response().body_ref(), b"hi");
    }
}

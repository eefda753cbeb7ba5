use crate::{
    Method, Response, StatusCode,
    context::Context,
    middleware::{BoxFuture, Middleware, Next},
};

/// CORS middleware — validates the `Origin` header, handles preflight requests,
/// and injects `Access-Control-*` headers on actual responses.
///
/// Constructed via [`CorsMiddleware::new`] (allow everything) or
/// [`CorsMiddleware::restricted`] (allow nothing), and further configured through
/// [`allow_origin`](Self::allow_origin), [`allow_method`](Self::allow_method), and
/// [`allow_header`](Self::allow_header).
///
/// # Behavior
///
/// - If no `Origin` header is present the request passes through unmodified.
/// - If the origin is not in the allow-list the request passes through unmodified.
/// - `OPTIONS` preflight requests are short-circuited with `204 No Content` and the
///   appropriate `Access-Control-*` headers; the downstream handler is **not** called.
/// - For all other requests the handler runs normally and the CORS headers are set
///   on its response.
/// - For specific (non-wildcard) origins a `Vary: Origin` header is added.
///
/// # Examples
///
/// ```rust
/// use switchyard::security::CorsMiddleware;
///
/// let cors = CorsMiddleware::restricted()
///     .allow_origin("https://example.com")
///     .allow_method("PATCH")
///     .allow_header("X-Custom-Header");
/// ```
#[derive(Debug, Clone)]
pub struct CorsMiddleware {
    allowed_origins: Vec<String>,
    allowed_methods: Vec<String>,
    allowed_headers: Vec<String>,
    max_age: u32,
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl CorsMiddleware {
    /// Creates a new `CorsMiddleware` with permissive defaults.
    ///
    /// | Setting          | Default value                          |
    /// |------------------|----------------------------------------|
    /// | Allowed origins  | `*` (all origins)                      |
    /// | Allowed methods  | `GET`, `POST`, `PUT`, `DELETE`         |
    /// | Allowed headers  | `Content-Type`, `Authorization`        |
    /// | Preflight max age| 3600 seconds                           |
    pub fn new() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            ..Self::restricted()
        }
    }

    /// Like [`new`](Self::new) but with an empty origin allow-list.
    pub fn restricted() -> Self {
        Self {
            allowed_origins: Vec::new(),
            allowed_methods: vec![
                "GET".to_string(),
                "POST".to_string(),
                "PUT".to_string(),
                "DELETE".to_string(),
            ],
            allowed_headers: vec!["Content-Type".to_string(), "Authorization".to_string()],
            max_age: 3600,
        }
    }

    /// Adds an allowed origin. `"*"` permits every origin.
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.allowed_origins.push(origin.into());
        self
    }

    /// Adds an allowed HTTP method, sent verbatim in `Access-Control-Allow-Methods`.
    #[must_use]
    pub fn allow_method(mut self, method: impl Into<String>) -> Self {
        self.allowed_methods.push(method.into());
        self
    }

    /// Adds an allowed request header, sent verbatim in `Access-Control-Allow-Headers`.
    #[must_use]
    pub fn allow_header(mut self, header: impl Into<String>) -> Self {
        self.allowed_headers.push(header.into());
        self
    }

    /// Sets the `Access-Control-Max-Age` sent with preflight responses.
    #[must_use]
    pub fn max_age(mut self, seconds: u32) -> Self {
        self.max_age = seconds;
        self
    }

    // Returns the value for `Access-Control-Allow-Origin`, or `None` when the
    // origin is not allowed.
    fn resolve_origin(&self, origin: &str) -> Option<String> {
        if self.allowed_origins.iter().any(|o| o == "*") {
            Some("*".to_owned())
        } else if self.allowed_origins.iter().any(|o| o == origin) {
            Some(origin.to_owned())
        } else {
            None
        }
    }
}

fn apply(response: &mut Response, allow_origin: &str, methods: &str, headers: &str) {
    response.set_header("Access-Control-Allow-Origin", allow_origin);
    response.set_header("Access-Control-Allow-Methods", methods);
    response.set_header("Access-Control-Allow-Headers", headers);
    if allow_origin != "*" {
        response.add_header("Vary", "Origin");
    }
}

impl Middleware for CorsMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<Context> {
        let allow_origin = ctx
            .header_value("origin")
            .and_then(|origin| self.resolve_origin(origin));
        let methods = self.allowed_methods.join(", ");
        let headers = self.allowed_headers.join(", ");
        let max_age = self.max_age;

        Box::pin(async move {
            let Some(allow_origin) = allow_origin else {
                return next.run(ctx).await;
            };

            if ctx.method() == &Method::Options {
                let mut ctx = ctx;
                let mut preflight = Response::new(StatusCode::NoContent);
                apply(&mut preflight, &allow_origin, &methods, &headers);
                preflight.set_header("Access-Control-Max-Age", max_age.to_string());
                ctx.respond(preflight);
                return ctx;
            }

            let mut ctx = next.run(ctx).await;
            apply(ctx.response_mut(), &allow_origin, &methods, &headers);
            ctx
        })
    }
}

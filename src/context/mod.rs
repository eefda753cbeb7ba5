//! Per-request context — request view, response builder, path parameters and
//! typed scratch state.
//!
//! A [`Context`] is created by the dispatcher for every request and moved
//! through the middleware pipeline and into the matched handler. Each stage
//! takes it by value and hands it back, so it is never shared between tasks.

use std::{any::Any, collections::HashMap};

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::http::multipart::{Multipart, MultipartError};
use crate::{Method, Request, Response, StatusCode};

/// Errors returned when reading typed scratch state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("no state stored under key {key:?}")]
    Missing { key: String },

    #[error("state under key {key:?} is a {actual}, not a {expected}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },
}

// A stored value together with the name of its concrete type, for mismatch reports.
struct Slot {
    value: Box<dyn Any + Send + Sync>,
    type_name: &'static str,
}

/// String-keyed, type-erased storage that middleware use to hand values to
/// later stages and handlers.
///
/// Reads are checked at run time: asking for the wrong type is reported as
/// [`StateError::TypeMismatch`], never as absence and never as a bad read.
#[derive(Default)]
pub struct State {
    map: HashMap<String, Slot>,
}

impl State {
    /// Create a new empty state map
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing whatever was there.
    pub fn insert<T>(&mut self, key: impl Into<String>, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.map.insert(
            key.into(),
            Slot {
                value: Box::new(value),
                type_name: std::any::type_name::<T>(),
            },
        );
    }

    /// Borrow the value under `key` as a `T`.
    pub fn get<T>(&self, key: &str) -> Result<&T, StateError>
    where
        T: Send + Sync + 'static,
    {
        let slot = self.map.get(key).ok_or_else(|| StateError::Missing {
            key: key.to_owned(),
        })?;
        slot.value
            .downcast_ref::<T>()
            .ok_or_else(|| StateError::TypeMismatch {
                key: key.to_owned(),
                expected: std::any::type_name::<T>(),
                actual: slot.type_name,
            })
    }

    /// Mutably borrow the value under `key` as a `T`.
    pub fn get_mut<T>(&mut self, key: &str) -> Result<&mut T, StateError>
    where
        T: Send + Sync + 'static,
    {
        let slot = self.map.get_mut(key).ok_or_else(|| StateError::Missing {
            key: key.to_owned(),
        })?;
        let actual = slot.type_name;
        slot.value
            .downcast_mut::<T>()
            .ok_or_else(|| StateError::TypeMismatch {
                key: key.to_owned(),
                expected: std::any::type_name::<T>(),
                actual,
            })
    }

    /// Remove the value under `key`, returning it if it is a `T`.
    ///
    /// On a type mismatch the value stays in place.
    pub fn remove<T>(&mut self, key: &str) -> Result<T, StateError>
    where
        T: Send + Sync + 'static,
    {
        self.get::<T>(key)?;
        let slot = self.map.remove(key).ok_or_else(|| StateError::Missing {
            key: key.to_owned(),
        })?;
        slot.value
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| StateError::TypeMismatch {
                key: key.to_owned(),
                expected: std::any::type_name::<T>(),
                actual: slot.type_name,
            })
    }

    /// Returns `true` if anything is stored under `key`, whatever its type.
    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Path parameters extracted from the matched route.
///
/// Kept in pattern order, so iterating yields values left to right as the
/// markers appear in the route. Inserting an existing name overwrites it.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Parameters {
    entries: Vec<(String, String)>,
}

impl Parameters {
    /// Create a new empty parameters map
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value into the parameters map
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Get a value from the parameters map
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Remove a value from the parameters map
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    /// Iterate `(name, value)` pairs in pattern order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-request context.
///
/// Handlers and middleware receive it by value and return it; the response
/// it holds when the pipeline finishes is what the dispatcher sends.
///
/// # Examples
///
/// ```rust
/// use switchyard::{Context, Request, StatusCode};
///
/// let raw = b"GET /greet?name=ada HTTP/1.1\r\nHost: localhost\r\n\r\n";
/// let mut ctx = Context::new(Request::parse(raw).unwrap());
///
/// let name = ctx.query("name").unwrap_or("world").to_owned();
/// ctx.status(StatusCode::Ok).text(format!("hello, {name}"));
///
/// assert_eq!(ctx.response().body_ref(), b"hello, ada");
/// ```
pub struct Context {
    request: Request,
    response: Response,
    params: Parameters,
    state: State,
}

impl Context {
    /// Create a new context from a request, with an empty `200 OK` response.
    pub fn new(request: Request) -> Self {
        Self {
            request,
            response: Response::new(StatusCode::Ok),
            params: Parameters::new(),
            state: State::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    pub fn path(&self) -> &str {
        self.request.path()
    }

    /// A request header (case-insensitive).
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    // ── Path and query parameters ────────────────────────────────────────────

    /// A path parameter bound by the router, e.g. `id` for `/users/:id`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Binds a path parameter. The router calls this for every capture.
    pub fn set_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.params.insert(name, value);
    }

    pub(crate) fn set_params(&mut self, params: Parameters) {
        for (name, value) in params.entries {
            self.params.insert(name, value);
        }
    }

    /// A query-string parameter.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.request.query_param(name)
    }

    // ── Response ─────────────────────────────────────────────────────────────

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Replaces the whole response.
    pub fn respond(&mut self, response: Response) -> &mut Self {
        self.response = response;
        self
    }

    pub fn into_response(self) -> Response {
        self.response
    }

    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        self.response.set_status(status);
        self
    }

    /// Sets a response header, replacing previous values of that name.
    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.response.set_header(name, value);
        self
    }

    pub fn body(&mut self, body: impl Into<Vec<u8>>) -> &mut Self {
        self.response.set_body(body);
        self
    }

    /// Sends `content` as `text/plain`, keeping the current status.
    pub fn text(&mut self, content: impl Into<String>) -> &mut Self {
        self.header("Content-Type", "text/plain; charset=utf-8")
            .body(content.into())
    }

    /// Sends `content` as `text/html`, keeping the current status.
    pub fn html(&mut self, content: impl Into<String>) -> &mut Self {
        self.header("Content-Type", "text/html; charset=utf-8")
            .body(content.into())
    }

    /// Serializes `value` as the JSON body.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; the response is left untouched.
    pub fn json<T>(&mut self, value: &T) -> Result<&mut Self, serde_json::Error>
    where
        T: Serialize + ?Sized,
    {
        let body = serde_json::to_vec(value)?;
        Ok(self.header("Content-Type", "application/json").body(body))
    }

    /// Redirects to `location` with the given 3xx status.
    pub fn redirect(&mut self, location: impl Into<String>, status: StatusCode) -> &mut Self {
        self.status(status).header("Location", location)
    }

    // ── Request body ─────────────────────────────────────────────────────────

    /// Deserializes the request body as JSON.
    pub fn json_body<T>(&self) -> Result<T, serde_json::Error>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(self.request.body())
    }

    /// Decodes a `multipart/form-data` request body.
    pub fn multipart(&self) -> Result<Multipart, MultipartError> {
        let content_type = self
            .request
            .headers()
            .content_type()
            .ok_or(MultipartError::MissingContentType)?;
        Multipart::from_content_type(self.request.body(), content_type)
    }

    // ── Scratch state ────────────────────────────────────────────────────────

    /// Stores a value for later stages; last write wins.
    pub fn set<T>(&mut self, key: impl Into<String>, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.state.insert(key, value);
    }

    pub fn get<T>(&self, key: &str) -> Result<&T, StateError>
    where
        T: Send + Sync + 'static,
    {
        self.state.get(key)
    }

    pub fn get_mut<T>(&mut self, key: &str) -> Result<&mut T, StateError>
    where
        T: Send + Sync + 'static,
    {
        self.state.get_mut(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.state.contains(key)
    }

    /// Removes and returns the value under `key`; a mismatched value stays in place.
    pub fn remove<T>(&mut self, key: &str) -> Result<T, StateError>
    where
        T: Send + Sync + 'static,
    {
        self.state.remove(key)
    }

    pub fn state(&self) -> &State {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(raw: &[u8]) -> Context {
        Context::new(Request::parse(raw).unwrap())
    }

    fn get(path: &str) -> Context {
        context(format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n").as_bytes())
    }

    #[test]
    fn state_round_trip_and_overwrite() {
        let mut ctx = get("/");
        ctx.set("user_id", 7_u64);
        assert!(ctx.has("user_id"));
        assert_eq!(ctx.get::<u64>("user_id"), Ok(&7));

        ctx.set("user_id", 9_u64);
        assert_eq!(ctx.get::<u64>("user_id"), Ok(&9));
    }

    #[test]
    fn state_missing_and_mismatch_are_distinct() {
        let mut ctx = get("/");
        ctx.set("role", String::from("admin"));

        assert!(matches!(
            ctx.get::<u64>("absent"),
            Err(StateError::Missing { .. })
        ));
        match ctx.get::<u64>("role") {
            Err(StateError::TypeMismatch {
                expected, actual, ..
            }) => {
                assert_eq!(expected, "u64");
                assert!(actual.ends_with("String"));
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn state_remove_keeps_value_on_mismatch() {
        let mut ctx = get("/");
        ctx.set("n", 1_i32);
        assert!(ctx.remove::<String>("n").is_err());
        assert!(ctx.has("n"));
        assert_eq!(ctx.remove::<i32>("n"), Ok(1));
        assert!(!ctx.has("n"));
    }

    #[test]
    fn state_get_mut_updates_in_place() {
        let mut ctx = get("/");
        ctx.set("hits", vec![1_u8]);
        ctx.get_mut::<Vec<u8>>("hits").unwrap().push(2);
        assert_eq!(ctx.get::<Vec<u8>>("hits").unwrap(), &vec![1, 2]);
    }

    #[test]
    fn params_keep_insertion_order_and_last_write_wins() {
        let mut params = Parameters::new();
        params.insert("a", "1");
        params.insert("b", "2");
        params.insert("a", "3");
        let pairs: Vec<_> = params.iter().collect();
        assert_eq!(pairs, vec![("a", "3"), ("b", "2")]);
        assert_eq!(params.remove("a"), Some("3".to_owned()));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn response_helpers_mutate_in_place() {
        let mut ctx = get("/");
        ctx.status(StatusCode::Created)
            .header("X-Trace", "1")
            .text("made");
        let res = ctx.response();
        assert_eq!(res.status(), StatusCode::Created);
        assert_eq!(res.headers().get("x-trace"), Some("1"));
        assert_eq!(res.body_ref(), b"made");
    }

    #[test]
    fn json_round_trip() {
        let mut ctx = context(
            b"POST /j HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: 9\r\n\r\n{\"n\": 41}",
        );
        #[derive(serde::Deserialize)]
        struct In {
            n: u32,
        }
        let input: In = ctx.json_body().unwrap();
        ctx.json(&serde_json::json!({ "n": input.n + 1 })).unwrap();
        assert_eq!(ctx.response().body_ref(), br#"{"n":42}"#);
        assert_eq!(
            ctx.response().headers().get("content-type"),
            Some("application/json")
        );
    }

    #[test]
    fn redirect_sets_location() {
        let mut ctx = get("/old");
        ctx.redirect("/new", StatusCode::Found);
        assert_eq!(ctx.response().status(), StatusCode::Found);
        assert_eq!(ctx.response().headers().get("location"), Some("/new"));
    }

    #[test]
    fn multipart_requires_content_type() {
        let ctx = get("/upload");
        assert_eq!(
            ctx.multipart().unwrap_err(),
            MultipartError::MissingContentType
        );
    }

    #[test]
    fn multipart_from_request() {
        let body = "--b1\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nhello\r\n--b1--\r\n";
        let raw = format!(
            "POST /upload HTTP/1.1\r\nContent-Type: multipart/form-data; boundary=b1\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        let ctx = context(raw.as_bytes());
        let form = ctx.multipart().unwrap();
        assert_eq!(form.get("title").and_then(|p| p.text()), Some("hello"));
    }
}

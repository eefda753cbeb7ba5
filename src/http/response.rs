//! HTTP/1.1 response builder.
//!
//! Provides both a fluent builder API (for responses assembled in one
//! expression) and in-place setters (for the response a [`Context`] carries
//! through the middleware pipeline), and serializes to a byte buffer for
//! transmission over TCP.
//!
//! [`Context`]: crate::context::Context

use bytes::{BufMut, BytesMut};

use super::{Headers, StatusCode};

/// An HTTP/1.1 response, ready to be serialized and sent.
///
/// Connections are never reused, so every serialized response carries
/// `Connection: close`.
///
/// # Examples
///
/// ```
/// use switchyard::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::Ok)
///     .header("Content-Type", "application/json")
///     .body(r#"{"status":"ok"}"#);
///
/// let bytes = response.into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Content-Length: 15\r\n"));
/// assert!(text.contains("Connection: close\r\n"));
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// A response whose body is the status's canonical reason phrase.
    ///
    /// Used for every engine-generated error so that no internal detail ever
    /// reaches the client.
    pub fn plain(status: StatusCode) -> Self {
        Self::new(status).body(status.canonical_reason())
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the response body from a string.
    ///
    /// The `Content-Length` header is written automatically by [`into_bytes`](Self::into_bytes).
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into().into_bytes();
        self
    }

    /// Sets the response body from raw bytes.
    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Replaces the status code in-place.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Sets a header in-place, replacing any existing values of that name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    /// Appends a header in-place. Intended for middleware pipelines that receive
    /// a `Response` from downstream and need to decorate it without consuming it.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// Replaces the body in-place.
    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.body = body.into();
    }

    /// Returns the status code of this response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the headers set so far.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the body bytes set so far.
    pub fn body_ref(&self) -> &[u8] {
        &self.body
    }

    /// Serializes the response without consuming it.
    pub fn serialize(&self) -> BytesMut {
        self.clone().into_bytes()
    }

    /// Serializes the response into a `BytesMut` buffer using HTTP/1.1 wire format.
    ///
    /// Automatically adds:
    /// - `Content-Type: text/plain; charset=utf-8` if the body is non-empty and no
    ///   `Content-Type` header was set.
    /// - `Content-Length: <n>` (always written, replacing any value set by hand).
    /// - `Connection: close`.
    pub fn into_bytes(mut self) -> BytesMut {
        let content_length = self.body.len();

        if !self.body.is_empty() && self.headers.content_type().is_none() {
            self.headers
                .insert("Content-Type", "text/plain; charset=utf-8");
        }
        self.headers.remove("content-length");
        self.headers.set("Connection", "close");

        let estimated_size = 128 + self.headers.len() * 64 + content_length;
        let mut buf = BytesMut::with_capacity(estimated_size);

        // Status line
        buf.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason()
            )
            .as_bytes(),
        );

        // Headers
        for (name, value) in self.headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }

        // Content-Length is always the last header before the blank line
        buf.put(format!("Content-Length: {content_length}\r\n").as_bytes());

        // Header/body separator
        buf.put(&b"\r\n"[..]);

        // Body
        if !self.body.is_empty() {
            buf.put(self.body.as_slice());
        }

        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_string(bytes: BytesMut) -> String {
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn simple_ok_response() {
        let r = Response::new(StatusCode::Ok).body("Hello");
        let s = to_string(r.into_bytes());
        assert!(s.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.ends_with("\r\n\r\nHello"));
    }

    #[test]
    fn custom_header() {
        let r = Response::new(StatusCode::Ok)
            .header("X-Request-Id", "abc-123")
            .body("ok");
        let s = to_string(r.into_bytes());
        assert!(s.contains("X-Request-Id: abc-123\r\n"));
    }

    #[test]
    fn no_body_no_content_type() {
        let r = Response::new(StatusCode::NoContent);
        let s = to_string(r.into_bytes());
        assert!(!s.contains("Content-Type"));
        assert!(s.contains("Content-Length: 0\r\n"));
    }

    #[test]
    fn always_connection_close() {
        let r = Response::new(StatusCode::Ok).header("Connection", "keep-alive");
        let s = to_string(r.into_bytes());
        assert!(s.contains("Connection: close\r\n"));
        assert!(!s.contains("keep-alive"));
    }

    #[test]
    fn in_place_setters() {
        let mut r = Response::default();
        r.set_status(StatusCode::Created);
        r.set_header("Content-Type", "text/html");
        r.set_header("content-type", "application/json");
        r.set_body(b"{}".to_vec());
        let s = to_string(r.serialize());
        assert!(s.starts_with("HTTP/1.1 201 Created\r\n"));
        assert!(s.contains("content-type: application/json\r\n"));
        assert!(!s.contains("text/html"));
        assert!(s.ends_with("\r\n\r\n{}"));
    }

    #[test]
    fn hand_written_content_length_is_replaced() {
        let mut r = Response::new(StatusCode::Ok).body("abc");
        r.set_header("Content-Length", "999");
        let s = to_string(r.into_bytes());
        assert!(s.contains("Content-Length: 3\r\n"));
        assert!(!s.contains("999"));
    }

    #[test]
    fn plain_uses_reason_phrase() {
        let s = to_string(Response::plain(StatusCode::NotFound).into_bytes());
        assert!(s.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(s.ends_with("\r\n\r\nNot Found"));
    }
}

//! HTTP/1.1 request parsing using the [`httparse`] crate.
//!
//! The engine reads one request per connection, so [`Request::parse`] only has
//! to answer two questions: is the head complete, and how many body bytes does
//! it announce.

use std::collections::HashMap;

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method};

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid Content-Length header: {value:?}")]
    InvalidContentLength { value: String },
}

/// The outcome of parsing a buffer that holds a complete request head.
#[derive(Debug)]
pub struct Head {
    /// Offset of the first body byte in the parsed buffer.
    pub body_offset: usize,
    /// Body length announced by `Content-Length` (0 when absent).
    pub content_length: usize,
}

impl Head {
    /// Total number of bytes the request occupies once its body has arrived.
    ///
    /// Saturates at `usize::MAX`, so an absurd `Content-Length` reads as
    /// "too large" instead of wrapping.
    pub fn total_len(&self) -> usize {
        self.body_offset.saturating_add(self.content_length)
    }
}

/// A fully parsed HTTP/1.1 request.
///
/// Created by [`Request::parse`] from a raw byte buffer. The body is stored
/// as a [`Bytes`] buffer and is never interpreted as text by the parser.
///
/// # Examples
///
/// ```
/// use switchyard::http::request::Request;
///
/// let raw = b"GET /hello?name=world HTTP/1.1\r\nHost: localhost\r\n\r\n";
/// let request = Request::parse(raw).unwrap();
///
/// assert_eq!(request.method().as_str(), "GET");
/// assert_eq!(request.path(), "/hello");
/// assert_eq!(request.query_param("name"), Some("world"));
/// assert_eq!(request.header("host"), Some("localhost"));
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    query: Option<String>,
    body: Bytes,
    params: HashMap<String, String>,
}

impl Request {
    /// Maximum number of headers we support per request.
    const MAX_HEADERS: usize = 64;

    /// Parses only the request head, reporting where the body starts and how
    /// long it is.
    ///
    /// The dispatcher calls this while bytes are still arriving, to decide
    /// whether it has to keep reading.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] — the header block has not been fully received.
    /// - [`RequestError::Parse`] — the head is malformed.
    /// - [`RequestError::InvalidContentLength`] — `Content-Length` is not a number.
    pub fn parse_head(buf: &[u8]) -> Result<Head, RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let content_length = match raw_req
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case("content-length"))
        {
            Some(h) => {
                let value = String::from_utf8_lossy(h.value).trim().to_owned();
                value
                    .parse()
                    .map_err(|_| RequestError::InvalidContentLength { value })?
            }
            None => 0,
        };

        Ok(Head {
            body_offset,
            content_length,
        })
    }

    /// Parse a raw HTTP/1.1 request from a byte slice.
    ///
    /// The body is everything after the header terminator, capped at the
    /// announced `Content-Length`. Bytes beyond that are ignored since
    /// connections are never reused.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] — more data is needed to complete the request headers.
    /// - [`RequestError::Parse`] — the data is malformed and cannot be parsed.
    /// - [`RequestError::MissingField`] — a required field (method, path, version) is absent.
    pub fn parse(buf: &[u8]) -> Result<Self, RequestError> {
        let head = Self::parse_head(buf)?;

        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);
        raw_req.parse(buf)?;

        let method: Method = match raw_req
            .method
            .ok_or(RequestError::MissingField { field: "method" })?
            .parse()
        {
            Ok(method) => method,
            Err(never) => match never {},
        };

        let raw_path = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;

        let (path, query) = match raw_path.find('?') {
            Some(pos) => (
                raw_path[..pos].to_owned(),
                Some(raw_path[pos + 1..].to_owned()),
            ),
            None => (raw_path.to_owned(), None),
        };

        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        let params = query.as_deref().map(parse_query_string).unwrap_or_default();
        let body_end = head.total_len().min(buf.len());
        let body = Bytes::copy_from_slice(&buf[head.body_offset..body_end]);

        Ok(Self {
            method,
            path,
            version,
            headers: header_map,
            query,
            body,
            params,
        })
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the first value of a header (case-insensitive), if present.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns a parsed query parameter value by key.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Returns the request body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the value of the `Content-Length` header parsed as a `usize`, if present.
    pub fn content_length(&self) -> Option<usize> {
        self.headers.content_length()
    }
}

/// Parses a URL query string (`key=value&key2=value2`) into a `HashMap`.
///
/// Keys and values have `+` decoded as a space. Percent-decoding is left to
/// handlers that need it.
fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?.replace('+', " ");
            let value = parts.next().unwrap_or("").replace('+', " ");
            Some((key, value))
        })
        .collect()
}

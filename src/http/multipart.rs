//! `multipart/form-data` decoding over an untrusted byte buffer.
//!
//! [`decode`] splits a request body into [`Part`]s given the boundary token
//! from the `Content-Type` header. Payloads are copied verbatim; nothing is
//! assumed about their character set.
//!
//! Two outcomes are deliberately distinct:
//!
//! - `Err(MultipartError::NoBoundary)` — the boundary marker never occurs, the
//!   body is not multipart data at all.
//! - `Ok(vec![])` — the marker was found but no segment was well formed.
//!
//! # Examples
//!
//! ```
//! use switchyard::http::multipart;
//!
//! let body = b"--XyZ\r\n\
//!     Content-Disposition: form-data; name=\"title\"\r\n\r\n\
//!     hello\r\n\
//!     --XyZ--\r\n";
//!
//! let parts = multipart::decode(body, "XyZ").unwrap();
//! assert_eq!(parts.len(), 1);
//! assert_eq!(parts[0].name(), "title");
//! assert_eq!(parts[0].data(), b"hello");
//! ```

use std::collections::HashMap;

use bytes::Bytes;
use thiserror::Error;

/// Errors produced while decoding a multipart body.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MultipartError {
    #[error("boundary marker not found in body")]
    NoBoundary,

    #[error("request has no Content-Type header")]
    MissingContentType,

    #[error("Content-Type has no boundary parameter")]
    MissingBoundary,
}

/// One decoded part of a multipart body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Part {
    headers: HashMap<String, String>,
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
    data: Bytes,
}

impl Part {
    /// The form field name from `Content-Disposition`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The uploaded file name, if this part is a file.
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// The part's own `Content-Type`, if declared.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Looks up a part header by its lower-cased name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// The raw payload.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the part, returning its payload.
    pub fn into_data(self) -> Bytes {
        self.data
    }

    /// Returns `true` when the part carries a file name.
    pub fn is_file(&self) -> bool {
        self.filename.is_some()
    }

    /// The payload as UTF-8 text, if it is valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }
}

/// A decoded multipart body with lookup helpers.
#[derive(Debug, Clone, Default)]
pub struct Multipart {
    parts: Vec<Part>,
}

impl Multipart {
    /// Decodes `body` using `boundary`. See [`decode`].
    pub fn parse(body: &[u8], boundary: &str) -> Result<Self, MultipartError> {
        decode(body, boundary).map(|parts| Self { parts })
    }

    /// Decodes `body` using the boundary carried by a `Content-Type` value.
    pub fn from_content_type(body: &[u8], content_type: &str) -> Result<Self, MultipartError> {
        let boundary =
            boundary_from_content_type(content_type).ok_or(MultipartError::MissingBoundary)?;
        Self::parse(body, boundary)
    }

    /// The first part whose field name is `name`.
    pub fn get(&self, name: &str) -> Option<&Part> {
        self.parts.iter().find(|p| p.name == name)
    }

    /// All file parts, in body order.
    pub fn files(&self) -> impl Iterator<Item = &Part> {
        self.parts.iter().filter(|p| p.is_file())
    }

    /// All non-file parts, in body order.
    pub fn fields(&self) -> impl Iterator<Item = &Part> {
        self.parts.iter().filter(|p| !p.is_file())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Part> {
        self.parts.iter()
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn into_parts(self) -> Vec<Part> {
        self.parts
    }
}

impl IntoIterator for Multipart {
    type Item = Part;
    type IntoIter = std::vec::IntoIter<Part>;

    fn into_iter(self) -> Self::IntoIter {
        self.parts.into_iter()
    }
}

/// Extracts the boundary token from a `Content-Type` header value.
///
/// Handles quoted and bare tokens and ignores other parameters:
///
/// ```
/// use switchyard::http::multipart::boundary_from_content_type;
///
/// assert_eq!(
///     boundary_from_content_type("multipart/form-data; boundary=\"a b\"; charset=utf-8"),
///     Some("a b")
/// );
/// assert_eq!(boundary_from_content_type("text/plain"), None);
/// ```
pub fn boundary_from_content_type(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = unquote(value.trim());
        (!value.is_empty()).then_some(value)
    })
}

/// Splits `body` into parts delimited by `--boundary`.
///
/// # Errors
///
/// Returns [`MultipartError::NoBoundary`] when `boundary` is empty or its
/// marker does not occur in `body`. Segments without a header/payload
/// separator are skipped rather than reported.
pub fn decode(body: &[u8], boundary: &str) -> Result<Vec<Part>, MultipartError> {
    if boundary.is_empty() {
        return Err(MultipartError::NoBoundary);
    }

    let marker = format!("--{boundary}").into_bytes();
    let mut at = find(body, &marker, 0).ok_or(MultipartError::NoBoundary)?;
    let mut parts = Vec::new();

    loop {
        let mut start = at + marker.len();

        // "--boundary--" closes the body.
        if body[start..].starts_with(b"--") {
            break;
        }
        start += line_break_len(&body[start..]);

        let Some(next) = find(body, &marker, start) else {
            break;
        };

        if let Some(part) = parse_segment(&body[start..next]) {
            parts.push(part);
        }
        at = next;
    }

    Ok(parts)
}

// Splits one segment into headers and payload; `None` when there is no blank line.
fn parse_segment(segment: &[u8]) -> Option<Part> {
    let split = find(segment, b"\r\n\r\n", 0)?;
    let mut part = Part::default();

    let head = String::from_utf8_lossy(&segment[..split]);
    for line in head.split("\r\n") {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        let value = value.trim().to_owned();

        match name.as_str() {
            "content-disposition" => parse_disposition(&value, &mut part),
            "content-type" => part.content_type = Some(value.clone()),
            _ => {}
        }
        part.headers.insert(name, value);
    }

    let payload = &segment[split + 4..];
    let payload = payload
        .strip_suffix(b"\r\n")
        .or_else(|| payload.strip_suffix(b"\n"))
        .unwrap_or(payload);
    part.data = Bytes::copy_from_slice(payload);

    Some(part)
}

// `form-data; name="field"; filename="file.txt"`
fn parse_disposition(value: &str, part: &mut Part) {
    for param in value.split(';') {
        let Some((key, val)) = param.split_once('=') else {
            continue;
        };
        let val = unquote(val.trim());
        match key.trim() {
            "name" => part.name = val.to_owned(),
            "filename" => part.filename = Some(val.to_owned()),
            _ => {}
        }
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn line_break_len(buf: &[u8]) -> usize {
    if buf.starts_with(b"\r\n") {
        2
    } else if buf.starts_with(b"\n") {
        1
    } else {
        0
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_PARTS: &[u8] = b"--BOUNDARY\r\n\
Content-Disposition: form-data; name=\"title\"\r\n\
\r\n\
hello\r\n\
--BOUNDARY\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\
Content-Type: text/plain\r\n\
\r\n\
abc\r\n\
--BOUNDARY--\r\n";

    #[test]
    fn decodes_field_and_file() {
        let parts = decode(TWO_PARTS, "BOUNDARY").unwrap();
        assert_eq!(parts.len(), 2);

        assert_eq!(parts[0].name(), "title");
        assert_eq!(parts[0].filename(), None);
        assert_eq!(parts[0].data(), b"hello");

        assert_eq!(parts[1].name(), "file");
        assert_eq!(parts[1].filename(), Some("a.txt"));
        assert_eq!(parts[1].content_type(), Some("text/plain"));
        assert_eq!(parts[1].data(), b"abc");
    }

    #[test]
    fn headers_are_lower_cased() {
        let parts = decode(TWO_PARTS, "BOUNDARY").unwrap();
        assert_eq!(parts[1].header("content-type"), Some("text/plain"));
        assert_eq!(parts[1].header("Content-Type"), Some("text/plain"));
    }

    #[test]
    fn missing_boundary_is_a_failure() {
        assert_eq!(decode(TWO_PARTS, "OTHER"), Err(MultipartError::NoBoundary));
        assert_eq!(decode(b"", "BOUNDARY"), Err(MultipartError::NoBoundary));
        assert_eq!(decode(TWO_PARTS, ""), Err(MultipartError::NoBoundary));
    }

    #[test]
    fn boundary_without_parts_is_empty_success() {
        assert!(decode(b"--BOUNDARY--\r\n", "BOUNDARY").unwrap().is_empty());

        // A segment with no blank line between headers and payload is skipped.
        let body = b"--B\r\nContent-Disposition: form-data; name=\"x\"\r\nvalue\r\n--B--";
        assert!(decode(body, "B").unwrap().is_empty());
    }

    #[test]
    fn malformed_segment_does_not_hide_later_parts() {
        let body = b"--B\r\nbroken\r\n--B\r\n\
Content-Disposition: form-data; name=\"ok\"\r\n\r\nyes\r\n--B--";
        let parts = decode(body, "B").unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].name(), "ok");
        assert_eq!(parts[0].data(), b"yes");
    }

    #[test]
    fn binary_payload_is_verbatim() {
        let payload = [0u8, 0xff, b'\r', b'\n', 0x7f, b'\r'];
        let mut body = b"--B\r\nContent-Disposition: form-data; name=\"bin\"; filename=\"x.bin\"\r\n\r\n"
            .to_vec();
        body.extend_from_slice(&payload);
        body.extend_from_slice(b"\r\n--B--\r\n");

        let parts = decode(&body, "B").unwrap();
        assert_eq!(parts[0].data(), &payload);
    }

    #[test]
    fn unterminated_body_keeps_completed_parts() {
        let body = b"--B\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n--B\r\n\
Content-Disposition: form-data; name=\"b\"\r\n\r\n2";
        let parts = decode(body, "B").unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].name(), "a");
    }

    #[test]
    fn unquoted_disposition_values() {
        let body = b"--B\r\nContent-Disposition: form-data; name=field; filename=f.txt\r\n\r\nv\r\n--B--";
        let parts = decode(body, "B").unwrap();
        assert_eq!(parts[0].name(), "field");
        assert_eq!(parts[0].filename(), Some("f.txt"));
    }

    #[test]
    fn boundary_extraction() {
        assert_eq!(
            boundary_from_content_type("multipart/form-data; boundary=----abc123"),
            Some("----abc123")
        );
        assert_eq!(
            boundary_from_content_type("multipart/form-data; Boundary=\"q\""),
            Some("q")
        );
        assert_eq!(boundary_from_content_type("multipart/form-data"), None);
        assert_eq!(
            boundary_from_content_type("multipart/form-data; boundary="),
            None
        );
    }

    #[test]
    fn multipart_lookup_helpers() {
        let form = Multipart::from_content_type(
            TWO_PARTS,
            "multipart/form-data; boundary=BOUNDARY",
        )
        .unwrap();
        assert_eq!(form.len(), 2);
        assert_eq!(form.get("title").and_then(Part::text), Some("hello"));
        assert_eq!(form.files().count(), 1);
        assert_eq!(form.fields().count(), 1);
        assert!(form.get("nope").is_none());

        assert_eq!(
            Multipart::from_content_type(TWO_PARTS, "multipart/form-data").unwrap_err(),
            MultipartError::MissingBoundary
        );
    }
}

//! HTTP/1.x primitives the dispatcher reads and writes.
//!
//! [`Request`] is the parsed view handed to the pipeline, [`Response`] is what
//! handlers fill in, and [`multipart`] decodes upload bodies.

use std::fmt;
use std::str::FromStr;

pub mod headers;
pub mod multipart;
pub mod request;
pub mod response;

pub use headers::Headers;
pub use multipart::{Multipart, MultipartError, Part};
pub use request::Request;
pub use response::Response;

macro_rules! status_codes {
    ($($variant:ident = $code:literal, $reason:literal;)+) => {
        /// Status codes handlers and the dispatcher answer with.
        ///
        /// ```
        /// use switchyard::http::StatusCode;
        ///
        /// assert_eq!(StatusCode::PayloadTooLarge.as_u16(), 413);
        /// assert_eq!(StatusCode::from_u16(408), Some(StatusCode::RequestTimeout));
        /// assert_eq!(StatusCode::NotFound.to_string(), "404 Not Found");
        /// ```
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum StatusCode {
            $($variant = $code,)+
        }

        impl StatusCode {
            /// Looks up a known code.
            pub fn from_u16(code: u16) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }

            pub fn canonical_reason(self) -> &'static str {
                match self {
                    $(Self::$variant => $reason,)+
                }
            }
        }
    };
}

status_codes! {
    Ok = 200, "OK";
    Created = 201, "Created";
    Accepted = 202, "Accepted";
    NoContent = 204, "No Content";
    MovedPermanently = 301, "Moved Permanently";
    Found = 302, "Found";
    SeeOther = 303, "See Other";
    TemporaryRedirect = 307, "Temporary Redirect";
    PermanentRedirect = 308, "Permanent Redirect";
    BadRequest = 400, "Bad Request";
    Unauthorized = 401, "Unauthorized";
    Forbidden = 403, "Forbidden";
    NotFound = 404, "Not Found";
    RequestTimeout = 408, "Request Timeout";
    Gone = 410, "Gone";
    PayloadTooLarge = 413, "Payload Too Large";
    InternalServerError = 500, "Internal Server Error";
    ServiceUnavailable = 503, "Service Unavailable";
}

impl StatusCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn is_redirect(self) -> bool {
        (300..400).contains(&self.as_u16())
    }

    pub fn is_client_error(self) -> bool {
        (400..500).contains(&self.as_u16())
    }

    pub fn is_server_error(self) -> bool {
        self.as_u16() >= 500
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.canonical_reason())
    }
}

/// Request method. Anything the router has no helper for lands in `Custom`
/// and can still be routed with [`Router::route`](crate::Router::route).
///
/// ```
/// use switchyard::http::Method;
///
/// assert_eq!("PATCH".parse::<Method>().unwrap(), Method::Patch);
/// assert_eq!("PURGE".parse::<Method>().unwrap(), Method::Custom("PURGE".into()));
/// // Method names are case-sensitive.
/// assert_eq!("get".parse::<Method>().unwrap().as_str(), "get");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Head,
    Custom(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Options => "OPTIONS",
            Self::Head => "HEAD",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "PATCH" => Self::Patch,
            "OPTIONS" => Self::Options,
            "HEAD" => Self::Head,
            other => Self::Custom(other.to_owned()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classes() {
        assert!(StatusCode::Found.is_redirect());
        assert!(!StatusCode::Ok.is_redirect());
        assert!(StatusCode::PayloadTooLarge.is_client_error());
        assert!(StatusCode::InternalServerError.is_server_error());
        assert!(!StatusCode::NotFound.is_server_error());
    }

    #[test]
    fn from_u16_round_trips_known_codes_only() {
        assert_eq!(StatusCode::from_u16(413), Some(StatusCode::PayloadTooLarge));
        assert_eq!(StatusCode::from_u16(418), None);
    }
}

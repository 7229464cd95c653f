//! Request and transfer-result types as plain data.
//!
//! # Design
//! `RequestDescription` is everything the native layer needs to configure
//! one transfer, with no native types in it. `TransferResult` is what comes
//! back from a buffered transfer: status, the raw header lines exactly as
//! observed (duplicates, intermediate response heads and blank separators
//! included), the body and the effective URL.
//!
//! All fields use owned types so a description can move onto the blocking
//! worker that runs the transfer.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::abort::AbortSignal;
use crate::headers::parse_header_lines;

/// Body cap applied to buffered responses when the caller sets none.
pub const DEFAULT_MAX_RESPONSE_SIZE: u64 = 64 * 1024 * 1024;

/// HTTP method for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Other(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Other(m) => m,
        }
    }

    /// Parse a method name, upper-casing the well-known ones.
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "PATCH" => Method::Patch,
            "DELETE" => Method::Delete,
            "OPTIONS" => Method::Options,
            _ => Method::Other(name.to_string()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&http::Method> for Method {
    fn from(m: &http::Method) -> Self {
        Method::parse(m.as_str())
    }
}

/// Where request headers come from.
///
/// Preformatted `Lines` take precedence over a name/value map whenever a
/// caller supplies them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderSource {
    Map(Vec<(String, String)>),
    Lines(Vec<String>),
}

impl Default for HeaderSource {
    fn default() -> Self {
        HeaderSource::Map(Vec::new())
    }
}

/// How the response body is materialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    #[default]
    Buffered,
    Streamed,
}

/// One request, described semantically.
#[derive(Debug, Clone)]
pub struct RequestDescription {
    pub url: String,
    /// Impersonation profile name, e.g. `chrome124`.
    pub target: String,
    /// Whether the profile's bundled header set is sent.
    pub default_headers: bool,
    pub method: Method,
    pub headers: HeaderSource,
    pub body: Option<Bytes>,
    pub timeout: Option<Duration>,
    pub follow_redirects: bool,
    pub insecure: bool,
    pub abort: Option<AbortSignal>,
    pub response_mode: ResponseMode,
    /// Explicit body cap. See [`RequestDescription::response_limit`].
    pub max_response_size: Option<u64>,
}

impl RequestDescription {
    pub fn new(url: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            target: target.into(),
            default_headers: true,
            method: Method::Get,
            headers: HeaderSource::default(),
            body: None,
            timeout: None,
            follow_redirects: true,
            insecure: false,
            abort: None,
            response_mode: ResponseMode::Buffered,
            max_response_size: None,
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Append a name/value header. Ignored once preformatted lines are set.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let HeaderSource::Map(ref mut pairs) = self.headers {
            pairs.push((name.into(), value.into()));
        }
        self
    }

    pub fn header_lines(mut self, lines: Vec<String>) -> Self {
        self.headers = HeaderSource::Lines(lines);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    pub fn insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn default_headers(mut self, include: bool) -> Self {
        self.default_headers = include;
        self
    }

    pub fn abort_signal(mut self, signal: AbortSignal) -> Self {
        self.abort = Some(signal);
        self
    }

    pub fn response_mode(mut self, mode: ResponseMode) -> Self {
        self.response_mode = mode;
        self
    }

    pub fn max_response_size(mut self, limit: u64) -> Self {
        self.max_response_size = Some(limit);
        self
    }

    /// Body cap in effect: the explicit one, else the buffered default.
    /// Streamed responses are unlimited unless capped explicitly.
    pub fn response_limit(&self) -> Option<u64> {
        self.max_response_size.or(match self.response_mode {
            ResponseMode::Buffered => Some(DEFAULT_MAX_RESPONSE_SIZE),
            ResponseMode::Streamed => None,
        })
    }
}

/// Status, raw header lines and effective URL of a finished response head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub header_lines: Vec<String>,
    pub effective_url: String,
}

impl ResponseHead {
    /// Headers of the final response head.
    pub fn headers(&self) -> HeaderMap {
        parse_header_lines(&self.header_lines)
    }
}

/// Outcome of a completed buffered transfer.
#[derive(Debug, Clone)]
pub struct TransferResult {
    pub status: u16,
    pub header_lines: Vec<String>,
    pub body: Bytes,
    pub effective_url: String,
}

impl TransferResult {
    /// Headers of the final response head.
    pub fn headers(&self) -> HeaderMap {
        parse_header_lines(&self.header_lines)
    }

    pub fn into_parts(self) -> (ResponseHead, Bytes) {
        let head = ResponseHead {
            status: self.status,
            header_lines: self.header_lines,
            effective_url: self.effective_url,
        };
        (head, self.body)
    }
}

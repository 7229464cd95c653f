//! Fetch-style request and response normalization.
//!
//! # Design
//! `to_request_description` turns an `http::Request<FetchBody>` plus caller
//! options into a `RequestDescription`, resolving the redirect mode into the
//! native follow flag. `to_fetch_response` runs the other way: it applies the
//! redirect mode to what the transfer produced and reports the effective URL
//! and whether a redirect happened. The body type stays generic so buffered
//! and streamed bodies share one normalization path.

use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, LOCATION};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::abort::AbortSignal;
use crate::error::{Error, ValidationError};
use crate::http::{HeaderSource, Method, RequestDescription, ResponseHead, ResponseMode};
use crate::validate::{validate_header, validate_url};

/// What to do when the server answers with a redirect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedirectMode {
    /// Let the native layer follow redirects.
    #[default]
    Follow,
    /// Return the redirect response itself.
    Manual,
    /// Fail with `Error::RedirectBlocked`.
    Error,
}

impl RedirectMode {
    pub fn follows(self) -> bool {
        matches!(self, RedirectMode::Follow)
    }
}

fn default_true() -> bool {
    true
}

/// Impersonation, timeout and TLS extensions accepted next to a request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchOptions {
    pub target: String,
    #[serde(default = "default_true")]
    pub default_headers: bool,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub insecure_skip_verify: bool,
    /// Takes precedence over `follow_redirects`.
    #[serde(default)]
    pub redirect: Option<RedirectMode>,
    #[serde(default)]
    pub follow_redirects: Option<bool>,
    #[serde(default)]
    pub response_type: ResponseMode,
    #[serde(default)]
    pub max_response_size: Option<u64>,
    #[serde(skip)]
    pub signal: Option<AbortSignal>,
}

impl FetchOptions {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            default_headers: true,
            timeout_ms: None,
            insecure_skip_verify: false,
            redirect: None,
            follow_redirects: None,
            response_type: ResponseMode::Buffered,
            max_response_size: None,
            signal: None,
        }
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn redirect_mode(&self) -> RedirectMode {
        match (self.redirect, self.follow_redirects) {
            (Some(mode), _) => mode,
            (None, Some(false)) => RedirectMode::Manual,
            (None, _) => RedirectMode::Follow,
        }
    }
}

/// Body of a Fetch-style request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FetchBody {
    #[default]
    Empty,
    Bytes(Bytes),
    /// UTF-8 text; implies `text/plain;charset=UTF-8`.
    Text(String),
    /// Urlencoded form fields; implies
    /// `application/x-www-form-urlencoded;charset=UTF-8`.
    Form(Vec<(String, String)>),
}

impl FetchBody {
    fn into_payload(self) -> (Option<Bytes>, Option<&'static str>) {
        match self {
            FetchBody::Empty => (None, None),
            FetchBody::Bytes(b) => (Some(b), None),
            FetchBody::Text(s) => (Some(Bytes::from(s)), Some("text/plain;charset=UTF-8")),
            FetchBody::Form(fields) => {
                let encoded = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(fields)
                    .finish();
                (
                    Some(Bytes::from(encoded)),
                    Some("application/x-www-form-urlencoded;charset=UTF-8"),
                )
            }
        }
    }
}

impl From<&str> for FetchBody {
    fn from(s: &str) -> Self {
        FetchBody::Text(s.to_string())
    }
}

impl From<String> for FetchBody {
    fn from(s: String) -> Self {
        FetchBody::Text(s)
    }
}

impl From<Bytes> for FetchBody {
    fn from(b: Bytes) -> Self {
        FetchBody::Bytes(b)
    }
}

impl From<Vec<u8>> for FetchBody {
    fn from(b: Vec<u8>) -> Self {
        FetchBody::Bytes(Bytes::from(b))
    }
}

/// A Fetch-style response.
#[derive(Debug)]
pub struct FetchResponse<B> {
    pub status: u16,
    pub status_text: String,
    pub headers: HeaderMap,
    /// Effective URL after any followed redirects.
    pub url: Url,
    pub redirected: bool,
    pub body: B,
}

impl<B> FetchResponse<B> {
    /// True for 2xx statuses.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn into_body(self) -> B {
        self.body
    }
}

/// Convert a Fetch-style request into a native request description.
pub fn to_request_description(
    request: http::Request<FetchBody>,
    options: &FetchOptions,
) -> Result<(RequestDescription, RedirectMode), Error> {
    let (parts, body) = request.into_parts();
    let method = Method::from(&parts.method);
    let url = validate_url(&parts.uri.to_string())?;

    if options.target.trim().is_empty() {
        return Err(ValidationError::MissingTarget.into());
    }

    let (payload, implied_type) = body.into_payload();
    if payload.is_some() && matches!(method, Method::Get | Method::Head) {
        return Err(ValidationError::BodyNotAllowed(method.to_string()).into());
    }

    let mut pairs = Vec::with_capacity(parts.headers.len() + 1);
    for (name, value) in &parts.headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        validate_header(name.as_str(), &value)?;
        pairs.push((name.as_str().to_string(), value));
    }
    if let Some(content_type) = implied_type {
        if !parts.headers.contains_key(CONTENT_TYPE) {
            pairs.push((CONTENT_TYPE.as_str().to_string(), content_type.to_string()));
        }
    }

    let redirect = options.redirect_mode();
    let desc = RequestDescription {
        url: url.to_string(),
        target: options.target.clone(),
        default_headers: options.default_headers,
        method,
        headers: HeaderSource::Map(pairs),
        body: payload,
        timeout: options.timeout_ms.map(Duration::from_millis),
        follow_redirects: redirect.follows(),
        insecure: options.insecure_skip_verify,
        abort: options.signal.clone(),
        response_mode: options.response_type,
        max_response_size: options.max_response_size,
    };
    Ok((desc, redirect))
}

fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Reason phrase from the final status line, else the canonical one.
fn status_text(head: &ResponseHead) -> String {
    let from_line = head
        .header_lines
        .iter()
        .rev()
        .find(|l| crate::headers::is_status_line(l))
        .and_then(|l| l.splitn(3, ' ').nth(2))
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());
    from_line.unwrap_or_else(|| {
        http::StatusCode::from_u16(head.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("")
            .to_string()
    })
}

/// Build a Fetch-style response from a finished transfer head.
pub fn to_fetch_response<B>(
    head: ResponseHead,
    body: B,
    redirect: RedirectMode,
    original_url: &str,
) -> Result<FetchResponse<B>, Error> {
    let headers = head.headers();

    if redirect == RedirectMode::Error && is_redirect(head.status) {
        if let Some(location) = headers.get(LOCATION) {
            return Err(Error::RedirectBlocked {
                status: head.status,
                location: String::from_utf8_lossy(location.as_bytes()).into_owned(),
            });
        }
    }

    let original = validate_url(original_url)?;
    let url = Url::parse(&head.effective_url).unwrap_or_else(|_| original.clone());
    let redirected = redirect.follows() && url != original;

    Ok(FetchResponse {
        status: head.status,
        status_text: status_text(&head),
        headers,
        url,
        redirected,
        body,
    })
}

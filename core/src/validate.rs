//! Pre-flight checks run before any native call.
//!
//! # Design
//! The native layer takes URLs and header lines verbatim, so anything that
//! could smuggle an extra header (CR, LF, NUL) or reach a non-HTTP protocol
//! handler is rejected here. `header_lines` is the single place that turns a
//! `HeaderSource` into the `Name: Value` lines appended to the native list.

use url::Url;

use crate::error::ValidationError;
use crate::http::{HeaderSource, RequestDescription};

/// Parse `raw` and require an http or https scheme.
pub fn validate_url(raw: &str) -> Result<Url, ValidationError> {
    // Sent to the native side verbatim; the parser strips tabs and line breaks.
    if raw.bytes().any(|b| b.is_ascii_control()) {
        return Err(ValidationError::InvalidUrl {
            url: raw.escape_debug().to_string(),
            reason: "contains control characters".to_string(),
        });
    }
    let url = Url::parse(raw).map_err(|e| ValidationError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ValidationError::UnsupportedScheme {
            scheme: other.to_string(),
        }),
    }
}

fn has_control(s: &str) -> bool {
    s.bytes().any(|b| matches!(b, b'\r' | b'\n' | 0))
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

/// Reject header names that are not RFC 9110 tokens and values with
/// embedded line breaks.
pub fn validate_header(name: &str, value: &str) -> Result<(), ValidationError> {
    if has_control(name) || has_control(value) {
        return Err(ValidationError::HeaderInjection {
            name: name.to_string(),
        });
    }
    if name.is_empty() || !name.bytes().all(is_token_byte) {
        return Err(ValidationError::InvalidHeaderName(name.to_string()));
    }
    Ok(())
}

/// Flatten a header source into native header lines, in order.
pub fn header_lines(source: &HeaderSource) -> Result<Vec<String>, ValidationError> {
    match source {
        HeaderSource::Lines(lines) => {
            for line in lines {
                if has_control(line) {
                    return Err(ValidationError::InvalidHeaderLine(line.clone()));
                }
            }
            Ok(lines.clone())
        }
        HeaderSource::Map(pairs) => pairs
            .iter()
            .map(|(name, value)| {
                validate_header(name, value)?;
                Ok(format!("{name}: {value}"))
            })
            .collect(),
    }
}

/// Everything that can be checked without the library: URL, target and
/// headers.
pub fn validate_description(desc: &RequestDescription) -> Result<Url, ValidationError> {
    if desc.target.trim().is_empty() {
        return Err(ValidationError::MissingTarget);
    }
    if desc.target.contains('\0') {
        return Err(ValidationError::MissingTarget);
    }
    let url = validate_url(&desc.url)?;
    header_lines(&desc.headers)?;
    Ok(url)
}

//! Error taxonomy for impersonated transfers.
//!
//! # Design
//! Every failure a caller can observe maps to exactly one variant, so
//! "you cancelled it" (`Cancelled`) stays distinguishable from "it broke"
//! (`Transfer`). Native failures carry the numeric result code plus the
//! library's own message. `Validation` errors are raised before any native
//! call is made.

use thiserror::Error;

/// Native result code for "operation timed out".
pub const CODE_OPERATION_TIMEDOUT: i32 = 28;

/// Reasons a request description is rejected before touching the library.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported URL scheme {scheme:?}: only http and https are allowed")]
    UnsupportedScheme { scheme: String },

    #[error("invalid header name {0:?}")]
    InvalidHeaderName(String),

    /// Header name or value containing CR, LF or NUL.
    #[error("header {name:?} contains control characters")]
    HeaderInjection { name: String },

    #[error("header line {0:?} contains control characters")]
    InvalidHeaderLine(String),

    #[error("impersonation target is required")]
    MissingTarget,

    #[error("request with method {0} cannot have a body")]
    BodyNotAllowed(String),
}

/// Errors returned by the transfer layer.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// No candidate library path could be opened.
    #[error("failed to load native library:\n  {}", .failures.join("\n  "))]
    Discovery { failures: Vec<String> },

    /// Native global initialization returned nonzero.
    #[error("native global init failed with code {code}")]
    Initialization { code: i32 },

    /// A native option-set call failed outside the tolerated set.
    #[error("failed to set {option}: {message} (code {code})")]
    Configuration {
        option: &'static str,
        code: i32,
        message: String,
    },

    /// The native impersonation call rejected the profile.
    #[error("failed to impersonate {target:?}: {message} (code {code})")]
    Impersonation {
        target: String,
        code: i32,
        message: String,
    },

    /// The transfer finished with a nonzero result code.
    #[error("transfer failed: {message} (code {code})")]
    Transfer { code: i32, message: String },

    /// The abort signal fired before or during the transfer.
    #[error("request cancelled{}", reason_suffix(.reason))]
    Cancelled { reason: Option<String> },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Redirect mode `error` met a redirect response.
    #[error("redirect to {location:?} blocked (status {status})")]
    RedirectBlocked { status: u16, location: String },

    #[error("response body exceeded {limit} bytes")]
    ResponseTooLarge { limit: u64 },

    /// The library could not create a per-request handle.
    #[error("native library returned no transfer handle")]
    HandleUnavailable,

    #[error("response body error: {0}")]
    Body(String),
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default()
}

impl Error {
    /// True for transfers that ran out of their native time budget.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Transfer { code, .. } if *code == CODE_OPERATION_TIMEDOUT)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }

    /// The native result code behind this error, if any.
    pub fn native_code(&self) -> Option<i32> {
        match self {
            Error::Initialization { code }
            | Error::Configuration { code, .. }
            | Error::Impersonation { code, .. }
            | Error::Transfer { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

//! Native-free half of the impersonating HTTP client.
//!
//! # Overview
//! Describes requests and normalizes responses without touching the native
//! library. The `impersonate-ffi` crate feeds a `RequestDescription` into the
//! native transfer and hands the raw result back to this crate to become a
//! Fetch-style response.
//!
//! # Design
//! - `RequestDescription` carries owned data only, so it can move onto the
//!   blocking worker that runs the transfer.
//! - Validation (URL scheme, header injection, missing target) happens here,
//!   before any native call.
//! - Header reassembly is incremental and byte-oriented so the native header
//!   callback can feed it arbitrary slices.
//! - Every failure is one variant of [`Error`].

pub mod abort;
pub mod error;
pub mod fetch;
pub mod headers;
pub mod http;
pub mod validate;

pub use abort::{AbortController, AbortSignal};
pub use error::{Error, Result, ValidationError};
pub use fetch::{
    to_fetch_response, to_request_description, FetchBody, FetchOptions, FetchResponse,
    RedirectMode,
};
pub use headers::{parse_header_lines, HeaderLineDecoder};
pub use crate::http::{
    HeaderSource, Method, RequestDescription, ResponseHead, ResponseMode, TransferResult,
    DEFAULT_MAX_RESPONSE_SIZE,
};
pub use validate::{header_lines, validate_description, validate_header, validate_url};

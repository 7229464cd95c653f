//! Native transport for `impersonate-core`.
//!
//! # Overview
//! Loads a libcurl-impersonate shared library at runtime and runs requests
//! through it so the TLS handshake and HTTP/2 settings match a real browser
//! profile. Requests come in as `RequestDescription`s (or Fetch-style
//! `http::Request`s) and leave as buffered or streamed responses.
//!
//! # Design
//! - The library is opened once per process ([`load`] / [`unload`]) and
//!   reached only through the [`CurlApi`] trait, which turns the variadic
//!   native setters into typed calls.
//! - Each request owns one native handle. A resource ledger holds the handle
//!   and everything it points at, and releases them together on every exit
//!   path.
//! - Native callbacks are `extern "C"` trampolines wrapped in
//!   `catch_unwind`, so panics never cross the boundary.
//! - Transfers block, so async entry points hand them to tokio's blocking
//!   pool.

pub mod api;
mod callbacks;
pub mod client;
mod ledger;
pub mod library;
mod options;
mod transfer;
pub mod types;

#[cfg(test)]
mod fake;

pub use api::CurlApi;
pub use client::{BodyStream, Client, Response, ResponseBody};
pub use ledger::live_native_resources;
pub use library::{acquire, load, loaded_path, unload, Library, LoadOptions, LIBRARY_PATH_ENV};
pub use options::TransferPolicy;
pub use transfer::TransferState;

pub use impersonate_core::{
    AbortController, AbortSignal, Error, FetchBody, FetchOptions, FetchResponse, Method,
    RedirectMode, RequestDescription, ResponseMode, Result,
};

//! The narrow, typed native call surface.
//!
//! # Design
//! The native option setter and info getter are variadic. Instead of exposing
//! that, `CurlApi` offers one method per value type, so each call site passes
//! exactly one concrete argument type. The transfer layer only talks to this
//! trait, which lets tests drive it with a recording fake.

use std::os::raw::{c_char, c_long, c_void};

use crate::types::{Curl, CurlCode, CurlInfo, CurlOffT, CurlOption, CurlSlist};

/// Native calls needed to run one transfer.
///
/// # Safety
/// Methods taking a handle or list pointer require one previously returned by
/// this same implementation and not yet released. Pointer-valued options must
/// stay valid for as long as the native side may read them.
pub trait CurlApi: Send + Sync {
    /// Create a transfer handle; null on failure.
    fn easy_init(&self) -> *mut Curl;

    unsafe fn easy_cleanup(&self, handle: *mut Curl);

    unsafe fn setopt_long(&self, handle: *mut Curl, option: CurlOption, value: c_long) -> CurlCode;

    unsafe fn setopt_ptr(
        &self,
        handle: *mut Curl,
        option: CurlOption,
        value: *const c_void,
    ) -> CurlCode;

    unsafe fn setopt_off_t(&self, handle: *mut Curl, option: CurlOption, value: CurlOffT)
        -> CurlCode;

    unsafe fn getinfo_long(&self, handle: *mut Curl, info: CurlInfo, out: &mut c_long) -> CurlCode;

    /// The returned string pointer is owned by the handle.
    unsafe fn getinfo_ptr(
        &self,
        handle: *mut Curl,
        info: CurlInfo,
        out: &mut *const c_char,
    ) -> CurlCode;

    /// Run the transfer to completion, blocking the calling thread.
    unsafe fn perform(&self, handle: *mut Curl) -> CurlCode;

    fn strerror(&self, code: CurlCode) -> String;

    unsafe fn slist_append(&self, list: *mut CurlSlist, line: *const c_char) -> *mut CurlSlist;

    unsafe fn slist_free_all(&self, list: *mut CurlSlist);

    unsafe fn impersonate(
        &self,
        handle: *mut Curl,
        target: *const c_char,
        default_headers: bool,
    ) -> CurlCode;
}

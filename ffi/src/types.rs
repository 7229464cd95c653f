//! `#[repr(C)]` types and numeric codes of the native call surface.
//!
//! # Design
//! Only the handful of option, info and result codes the transfer layer
//! actually uses are declared. Codes follow the native header layout: option
//! codes are a type base (long, object pointer, function pointer, off_t)
//! plus an index, info codes are a type mask plus an index.

use std::os::raw::{c_char, c_int, c_long, c_void};

/// Opaque per-request transfer handle.
#[repr(C)]
pub struct Curl {
    _private: [u8; 0],
}

/// Node of the native singly linked list of header strings.
#[repr(C)]
pub struct CurlSlist {
    pub data: *mut c_char,
    pub next: *mut CurlSlist,
}

pub type CurlCode = c_int;
pub type CurlOption = c_int;
pub type CurlInfo = c_int;
pub type CurlOffT = i64;

/// `size_t (*)(char *ptr, size_t size, size_t nmemb, void *userdata)`
pub type WriteCallback = extern "C" fn(*mut c_char, usize, usize, *mut c_void) -> usize;

/// `int (*)(void *clientp, curl_off_t dltotal, curl_off_t dlnow,
/// curl_off_t ultotal, curl_off_t ulnow)`
pub type XferInfoCallback =
    extern "C" fn(*mut c_void, CurlOffT, CurlOffT, CurlOffT, CurlOffT) -> c_int;

// ---------------------------------------------------------------------------
// Exported symbol signatures
// ---------------------------------------------------------------------------

pub type GlobalInitFn = unsafe extern "C" fn(c_long) -> CurlCode;
pub type GlobalCleanupFn = unsafe extern "C" fn();
pub type EasyInitFn = unsafe extern "C" fn() -> *mut Curl;
pub type EasyCleanupFn = unsafe extern "C" fn(*mut Curl);
pub type EasySetoptFn = unsafe extern "C" fn(*mut Curl, CurlOption, ...) -> CurlCode;
pub type EasyGetinfoFn = unsafe extern "C" fn(*mut Curl, CurlInfo, ...) -> CurlCode;
pub type EasyPerformFn = unsafe extern "C" fn(*mut Curl) -> CurlCode;
pub type EasyStrerrorFn = unsafe extern "C" fn(CurlCode) -> *const c_char;
pub type SlistAppendFn = unsafe extern "C" fn(*mut CurlSlist, *const c_char) -> *mut CurlSlist;
pub type SlistFreeAllFn = unsafe extern "C" fn(*mut CurlSlist);
pub type EasyImpersonateFn = unsafe extern "C" fn(*mut Curl, *const c_char, c_int) -> CurlCode;

// ---------------------------------------------------------------------------
// Result codes
// ---------------------------------------------------------------------------

pub const CURLE_OK: CurlCode = 0;
pub const CURLE_UNSUPPORTED_PROTOCOL: CurlCode = 1;
pub const CURLE_NOT_BUILT_IN: CurlCode = 4;
pub const CURLE_WRITE_ERROR: CurlCode = 23;
pub const CURLE_OPERATION_TIMEDOUT: CurlCode = 28;
pub const CURLE_ABORTED_BY_CALLBACK: CurlCode = 42;
pub const CURLE_BAD_FUNCTION_ARGUMENT: CurlCode = 43;
pub const CURLE_UNKNOWN_OPTION: CurlCode = 48;

// ---------------------------------------------------------------------------
// Option codes
// ---------------------------------------------------------------------------

const LONG: CurlOption = 0;
const OBJECTPOINT: CurlOption = 10_000;
const FUNCTIONPOINT: CurlOption = 20_000;
const OFF_T: CurlOption = 30_000;

pub const CURLOPT_WRITEDATA: CurlOption = OBJECTPOINT + 1;
pub const CURLOPT_URL: CurlOption = OBJECTPOINT + 2;
pub const CURLOPT_POSTFIELDS: CurlOption = OBJECTPOINT + 15;
pub const CURLOPT_HTTPHEADER: CurlOption = OBJECTPOINT + 23;
pub const CURLOPT_HEADERDATA: CurlOption = OBJECTPOINT + 29;
pub const CURLOPT_CUSTOMREQUEST: CurlOption = OBJECTPOINT + 36;
pub const CURLOPT_XFERINFODATA: CurlOption = OBJECTPOINT + 57;
pub const CURLOPT_ACCEPT_ENCODING: CurlOption = OBJECTPOINT + 102;

pub const CURLOPT_NOPROGRESS: CurlOption = LONG + 43;
pub const CURLOPT_NOBODY: CurlOption = LONG + 44;
pub const CURLOPT_UPLOAD: CurlOption = LONG + 46;
pub const CURLOPT_POST: CurlOption = LONG + 47;
pub const CURLOPT_FOLLOWLOCATION: CurlOption = LONG + 52;
pub const CURLOPT_SSL_VERIFYPEER: CurlOption = LONG + 64;
pub const CURLOPT_HTTPGET: CurlOption = LONG + 80;
pub const CURLOPT_SSL_VERIFYHOST: CurlOption = LONG + 81;
pub const CURLOPT_HTTP_VERSION: CurlOption = LONG + 84;
pub const CURLOPT_NOSIGNAL: CurlOption = LONG + 99;
pub const CURLOPT_TIMEOUT_MS: CurlOption = LONG + 155;
pub const CURLOPT_CONNECTTIMEOUT_MS: CurlOption = LONG + 156;

pub const CURLOPT_WRITEFUNCTION: CurlOption = FUNCTIONPOINT + 11;
pub const CURLOPT_HEADERFUNCTION: CurlOption = FUNCTIONPOINT + 79;
pub const CURLOPT_XFERINFOFUNCTION: CurlOption = FUNCTIONPOINT + 219;

pub const CURLOPT_POSTFIELDSIZE_LARGE: CurlOption = OFF_T + 120;

/// `CURL_HTTP_VERSION_2TLS`: HTTP/2 over TLS, HTTP/1.1 for plain text.
pub const CURL_HTTP_VERSION_2TLS: c_long = 4;

// ---------------------------------------------------------------------------
// Info codes
// ---------------------------------------------------------------------------

const INFO_STRING: CurlInfo = 0x10_0000;
const INFO_LONG: CurlInfo = 0x20_0000;

pub const CURLINFO_EFFECTIVE_URL: CurlInfo = INFO_STRING + 1;
pub const CURLINFO_RESPONSE_CODE: CurlInfo = INFO_LONG + 2;

/// `CURL_GLOBAL_DEFAULT` (SSL | WIN32).
pub const CURL_GLOBAL_DEFAULT: c_long = 0b11;

/// Human-readable name of an option code, for error messages.
pub fn option_name(option: CurlOption) -> &'static str {
    match option {
        CURLOPT_WRITEDATA => "CURLOPT_WRITEDATA",
        CURLOPT_URL => "CURLOPT_URL",
        CURLOPT_POSTFIELDS => "CURLOPT_POSTFIELDS",
        CURLOPT_HTTPHEADER => "CURLOPT_HTTPHEADER",
        CURLOPT_HEADERDATA => "CURLOPT_HEADERDATA",
        CURLOPT_CUSTOMREQUEST => "CURLOPT_CUSTOMREQUEST",
        CURLOPT_XFERINFODATA => "CURLOPT_XFERINFODATA",
        CURLOPT_ACCEPT_ENCODING => "CURLOPT_ACCEPT_ENCODING",
        CURLOPT_NOPROGRESS => "CURLOPT_NOPROGRESS",
        CURLOPT_NOBODY => "CURLOPT_NOBODY",
        CURLOPT_UPLOAD => "CURLOPT_UPLOAD",
        CURLOPT_POST => "CURLOPT_POST",
        CURLOPT_FOLLOWLOCATION => "CURLOPT_FOLLOWLOCATION",
        CURLOPT_SSL_VERIFYPEER => "CURLOPT_SSL_VERIFYPEER",
        CURLOPT_HTTPGET => "CURLOPT_HTTPGET",
        CURLOPT_SSL_VERIFYHOST => "CURLOPT_SSL_VERIFYHOST",
        CURLOPT_HTTP_VERSION => "CURLOPT_HTTP_VERSION",
        CURLOPT_NOSIGNAL => "CURLOPT_NOSIGNAL",
        CURLOPT_TIMEOUT_MS => "CURLOPT_TIMEOUT_MS",
        CURLOPT_CONNECTTIMEOUT_MS => "CURLOPT_CONNECTTIMEOUT_MS",
        CURLOPT_WRITEFUNCTION => "CURLOPT_WRITEFUNCTION",
        CURLOPT_HEADERFUNCTION => "CURLOPT_HEADERFUNCTION",
        CURLOPT_XFERINFOFUNCTION => "CURLOPT_XFERINFOFUNCTION",
        CURLOPT_POSTFIELDSIZE_LARGE => "CURLOPT_POSTFIELDSIZE_LARGE",
        _ => "unknown option",
    }
}

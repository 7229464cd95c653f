//! Translate a `RequestDescription` into native option calls.
//!
//! # Design
//! Options are applied in a fixed order because some depend on earlier ones:
//! the URL must be set before the impersonation call, and the impersonation
//! profile may overwrite encoding and HTTP version defaults set before it.
//! Every string or body handed to the native side is parked in the
//! `ResourceLedger` so it outlives the calls that read it.

use std::ffi::CString;
use std::os::raw::{c_long, c_void};
use std::sync::Arc;

use bytes::Bytes;
use impersonate_core::{header_lines, Error, Method, RequestDescription, Result};

use crate::api::CurlApi;
use crate::callbacks::{header_callback, progress_callback, write_callback};
use crate::ledger::ResourceLedger;
use crate::types::*;

/// Native result codes tolerated from best-effort options.
///
/// Some native builds reject redirect-following or HTTP-version pinning for
/// particular schemes or configurations; those failures are ignored when the
/// code is listed here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPolicy {
    pub follow_location_tolerated: Vec<CurlCode>,
    pub http_version_tolerated: Vec<CurlCode>,
}

impl Default for TransferPolicy {
    fn default() -> Self {
        Self {
            follow_location_tolerated: vec![
                CURLE_UNSUPPORTED_PROTOCOL,
                CURLE_BAD_FUNCTION_ARGUMENT,
                CURLE_UNKNOWN_OPTION,
            ],
            http_version_tolerated: vec![
                CURLE_UNSUPPORTED_PROTOCOL,
                CURLE_NOT_BUILT_IN,
                CURLE_BAD_FUNCTION_ARGUMENT,
                CURLE_UNKNOWN_OPTION,
            ],
        }
    }
}

struct Configurer<'l, 'cb> {
    api: Arc<dyn CurlApi>,
    ledger: &'l mut ResourceLedger<'cb>,
}

impl Configurer<'_, '_> {
    fn check(&self, option: CurlOption, code: CurlCode) -> Result<()> {
        if code == CURLE_OK {
            return Ok(());
        }
        Err(Error::Configuration {
            option: option_name(option),
            code,
            message: self.api.strerror(code),
        })
    }

    fn long(&mut self, option: CurlOption, value: c_long) -> Result<()> {
        let code = unsafe { self.api.setopt_long(self.ledger.handle(), option, value) };
        self.check(option, code)
    }

    fn best_effort_long(
        &mut self,
        option: CurlOption,
        value: c_long,
        tolerated: &[CurlCode],
    ) -> Result<()> {
        let code = unsafe { self.api.setopt_long(self.ledger.handle(), option, value) };
        if code != CURLE_OK && tolerated.contains(&code) {
            tracing::debug!(
                option = option_name(option),
                code,
                "ignoring best-effort option failure"
            );
            return Ok(());
        }
        self.check(option, code)
    }

    fn off_t(&mut self, option: CurlOption, value: CurlOffT) -> Result<()> {
        let code = unsafe { self.api.setopt_off_t(self.ledger.handle(), option, value) };
        self.check(option, code)
    }

    fn ptr(&mut self, option: CurlOption, value: *const c_void) -> Result<()> {
        let code = unsafe { self.api.setopt_ptr(self.ledger.handle(), option, value) };
        self.check(option, code)
    }

    fn c_string(&mut self, option: CurlOption, value: &str) -> Result<CString> {
        CString::new(value).map_err(|_| Error::Configuration {
            option: option_name(option),
            code: CURLE_BAD_FUNCTION_ARGUMENT,
            message: "value contains a NUL byte".to_string(),
        })
    }

    fn text(&mut self, option: CurlOption, value: &str) -> Result<()> {
        let text = self.c_string(option, value)?;
        let ptr = self.ledger.keep_text(text);
        self.ptr(option, ptr as *const c_void)
    }

    fn impersonate(&mut self, target: &str, default_headers: bool) -> Result<()> {
        let invalid = |message: String| Error::Impersonation {
            target: target.to_string(),
            code: CURLE_BAD_FUNCTION_ARGUMENT,
            message,
        };
        let text = CString::new(target)
            .map_err(|_| invalid("target contains a NUL byte".to_string()))?;
        let ptr = self.ledger.keep_text(text);
        let code = unsafe { self.api.impersonate(self.ledger.handle(), ptr, default_headers) };
        if code != CURLE_OK {
            return Err(Error::Impersonation {
                target: target.to_string(),
                code,
                message: self.api.strerror(code),
            });
        }
        Ok(())
    }

    fn header_list(&mut self, lines: &[String]) -> Result<()> {
        if lines.is_empty() {
            return Ok(());
        }
        let mut list: *mut CurlSlist = std::ptr::null_mut();
        for line in lines {
            let text = match self.c_string(CURLOPT_HTTPHEADER, line) {
                Ok(text) => text,
                Err(e) => {
                    unsafe { free_partial(self.api.as_ref(), list) };
                    return Err(e);
                }
            };
            let next = unsafe { self.api.slist_append(list, text.as_ptr()) };
            self.ledger.keep_text(text);
            if next.is_null() {
                unsafe { free_partial(self.api.as_ref(), list) };
                return Err(Error::Configuration {
                    option: option_name(CURLOPT_HTTPHEADER),
                    code: CURLE_BAD_FUNCTION_ARGUMENT,
                    message: format!("failed to append header line {line:?}"),
                });
            }
            list = next;
        }
        self.ledger.track_header_list(list);
        self.ptr(CURLOPT_HTTPHEADER, list as *const c_void)
    }
}

unsafe fn free_partial(api: &dyn CurlApi, list: *mut CurlSlist) {
    if !list.is_null() {
        api.slist_free_all(list);
    }
}

fn timeout_millis(desc: &RequestDescription) -> Option<c_long> {
    desc.timeout.map(|t| {
        let ms = t.as_millis().max(1);
        c_long::try_from(ms).unwrap_or(c_long::MAX)
    })
}

/// Configure the ledger's handle for `desc`.
///
/// `userdata` is the callback bridge registered with the ledger.
pub(crate) fn apply_request(
    ledger: &mut ResourceLedger<'_>,
    desc: &RequestDescription,
    userdata: *mut c_void,
    policy: &TransferPolicy,
) -> Result<()> {
    let api = Arc::clone(ledger.api());
    let mut c = Configurer { api, ledger };

    // Timeouts must not rely on signals when transfers run on worker threads.
    c.long(CURLOPT_NOSIGNAL, 1)?;

    // Cancellation is polled from the progress callback.
    if desc.abort.is_some() {
        c.ptr(CURLOPT_XFERINFOFUNCTION, progress_callback as XferInfoCallback as *const c_void)?;
        c.ptr(CURLOPT_XFERINFODATA, userdata)?;
        c.long(CURLOPT_NOPROGRESS, 0)?;
    } else {
        c.long(CURLOPT_NOPROGRESS, 1)?;
    }

    // Empty string: advertise every supported encoding and decode transparently.
    c.text(CURLOPT_ACCEPT_ENCODING, "")?;

    c.best_effort_long(
        CURLOPT_FOLLOWLOCATION,
        c_long::from(desc.follow_redirects),
        &policy.follow_location_tolerated,
    )?;

    if let Some(ms) = timeout_millis(desc) {
        c.long(CURLOPT_TIMEOUT_MS, ms)?;
        c.long(CURLOPT_CONNECTTIMEOUT_MS, ms)?;
    }

    if desc.insecure {
        c.long(CURLOPT_SSL_VERIFYPEER, 0)?;
        c.long(CURLOPT_SSL_VERIFYHOST, 0)?;
    }

    c.text(CURLOPT_URL, &desc.url)?;

    c.impersonate(&desc.target, desc.default_headers)?;

    if !desc.insecure {
        c.best_effort_long(
            CURLOPT_HTTP_VERSION,
            CURL_HTTP_VERSION_2TLS,
            &policy.http_version_tolerated,
        )?;
    }

    apply_method(&mut c, desc)?;

    let lines = header_lines(&desc.headers)?;
    c.header_list(&lines)?;

    c.ptr(CURLOPT_WRITEFUNCTION, write_callback as WriteCallback as *const c_void)?;
    c.ptr(CURLOPT_WRITEDATA, userdata)?;
    c.ptr(CURLOPT_HEADERFUNCTION, header_callback as WriteCallback as *const c_void)?;
    c.ptr(CURLOPT_HEADERDATA, userdata)?;

    c.text(CURLOPT_URL, &desc.url)?;
    Ok(())
}

fn apply_method(c: &mut Configurer<'_, '_>, desc: &RequestDescription) -> Result<()> {
    // A bodiless POST still goes out as POST, with an empty payload.
    let body = match (&desc.method, &desc.body) {
        (_, Some(body)) => Some(body.clone()),
        (Method::Post, None) => Some(Bytes::from_static(b"")),
        _ => None,
    };

    match &desc.method {
        Method::Get => c.long(CURLOPT_HTTPGET, 1)?,
        Method::Head => c.long(CURLOPT_NOBODY, 1)?,
        Method::Post => c.long(CURLOPT_UPLOAD, 0)?,
        other => c.text(CURLOPT_CUSTOMREQUEST, other.as_str())?,
    }

    if let Some(body) = body {
        let len = CurlOffT::try_from(body.len()).unwrap_or(CurlOffT::MAX);
        c.off_t(CURLOPT_POSTFIELDSIZE_LARGE, len)?;
        let ptr = c.ledger.keep_body(body);
        c.ptr(CURLOPT_POSTFIELDS, ptr)?;
        // Attaching a payload switches the native side to POST; keep the
        // caller's method on the wire.
        if matches!(desc.method, Method::Get | Method::Head) {
            c.text(CURLOPT_CUSTOMREQUEST, desc.method.as_str())?;
        }
    }
    Ok(())
}

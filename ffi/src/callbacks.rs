//! Native-callable trampolines and the per-request state they feed.
//!
//! # Design
//! All three callbacks receive the same `userdata` pointer: the request's
//! `CallbackBridge`. The native side only calls them from inside `perform`,
//! on the thread running the transfer, so each invocation has exclusive
//! access to the bridge. Native buffers are copied into owned `Bytes`
//! before anything else sees them.
//!
//! Every trampoline wraps its body in `catch_unwind` so a panic never
//! crosses into native code; a caught panic aborts the transfer instead.

use std::os::raw::{c_char, c_int, c_long, c_void};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use impersonate_core::{
    AbortSignal, Error, HeaderLineDecoder, RequestDescription, ResponseHead, Result,
};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use crate::api::CurlApi;
use crate::types::*;

/// How long a write waits on a full body channel before re-checking the
/// abort flag.
const FULL_CHANNEL_BACKOFF: Duration = Duration::from_millis(5);

/// Where body bytes go.
pub(crate) enum BodySink {
    Buffered(Vec<Bytes>),
    Streamed(StreamSink),
}

/// Channels feeding a streamed response.
pub(crate) struct StreamSink {
    head_tx: Option<oneshot::Sender<Result<ResponseHead>>>,
    body_tx: mpsc::Sender<Result<Bytes>>,
}

impl BodySink {
    pub(crate) fn buffered() -> Self {
        BodySink::Buffered(Vec::new())
    }

    pub(crate) fn streamed(
        head_tx: oneshot::Sender<Result<ResponseHead>>,
        body_tx: mpsc::Sender<Result<Bytes>>,
    ) -> Self {
        BodySink::Streamed(StreamSink {
            head_tx: Some(head_tx),
            body_tx,
        })
    }
}

/// Per-request state behind the callback `userdata` pointer.
pub(crate) struct CallbackBridge {
    api: Arc<dyn CurlApi>,
    /// Set while the owning handle is alive; used to read the response head
    /// from inside the first body write of a streamed response.
    handle: *mut Curl,
    decoder: HeaderLineDecoder,
    header_lines: Vec<String>,
    sink: BodySink,
    abort: Option<AbortSignal>,
    limit: Option<u64>,
    received: u64,
    pub(crate) overflowed: bool,
    pub(crate) consumer_gone: bool,
    /// The abort flag was seen while a write waited on the consumer.
    pub(crate) aborted_in_write: bool,
    pub(crate) panicked: bool,
}

impl CallbackBridge {
    pub(crate) fn new(api: Arc<dyn CurlApi>, desc: &RequestDescription, sink: BodySink) -> Self {
        Self {
            api,
            handle: ptr::null_mut(),
            decoder: HeaderLineDecoder::new(),
            header_lines: Vec::new(),
            sink,
            abort: desc.abort.clone(),
            limit: desc.response_limit(),
            received: 0,
            overflowed: false,
            consumer_gone: false,
            aborted_in_write: false,
            panicked: false,
        }
    }

    pub(crate) fn attach(&mut self, handle: *mut Curl) {
        self.handle = handle;
    }

    pub(crate) fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub(crate) fn abort_requested(&self) -> bool {
        self.abort.as_ref().is_some_and(AbortSignal::is_aborted)
    }

    pub(crate) fn abort_reason(&self) -> Option<String> {
        self.abort.as_ref().and_then(AbortSignal::reason)
    }

    pub(crate) fn header_lines(&self) -> &[String] {
        &self.header_lines
    }

    fn on_header(&mut self, data: &[u8]) {
        self.decoder.feed(data, &mut self.header_lines);
    }

    /// Returns false to make the native side fail the transfer.
    fn on_body(&mut self, data: &[u8]) -> bool {
        self.received += data.len() as u64;
        if self.limit.is_some_and(|limit| self.received > limit) {
            self.overflowed = true;
            return false;
        }
        if data.is_empty() {
            return true;
        }
        let chunk = Bytes::copy_from_slice(data);
        if let BodySink::Buffered(chunks) = &mut self.sink {
            chunks.push(chunk);
            return true;
        }
        self.send_head_once();
        let BodySink::Streamed(stream) = &mut self.sink else {
            return false;
        };
        // A stalled consumer must not keep the abort flag from being seen:
        // the native side polls progress only between writes.
        let mut item = Ok(chunk);
        loop {
            match stream.body_tx.try_send(item) {
                Ok(()) => return true,
                Err(TrySendError::Closed(_)) => {
                    self.consumer_gone = true;
                    return false;
                }
                Err(TrySendError::Full(back)) => {
                    if self.abort.as_ref().is_some_and(AbortSignal::is_aborted) {
                        self.aborted_in_write = true;
                        return false;
                    }
                    item = back;
                    std::thread::sleep(FULL_CHANNEL_BACKOFF);
                }
            }
        }
    }

    fn send_head_once(&mut self) {
        let has_pending_head = matches!(&self.sink, BodySink::Streamed(s) if s.head_tx.is_some());
        if !has_pending_head || self.handle.is_null() {
            return;
        }
        let head = query_head(self.api.as_ref(), self.handle, self.header_lines.clone());
        if let BodySink::Streamed(stream) = &mut self.sink {
            if let Some(tx) = stream.head_tx.take() {
                let _ = tx.send(head);
            }
        }
    }

    /// Flush residual header bytes and detach from the native handle.
    pub(crate) fn close(&mut self) {
        self.decoder.flush(&mut self.header_lines);
        self.handle = ptr::null_mut();
    }

    /// Concatenate buffered chunks in arrival order.
    pub(crate) fn take_body(&mut self) -> Bytes {
        let BodySink::Buffered(chunks) = &mut self.sink else {
            return Bytes::new();
        };
        match chunks.len() {
            0 => Bytes::new(),
            1 => chunks.remove(0),
            _ => {
                let total = chunks.iter().map(Bytes::len).sum();
                let mut body = BytesMut::with_capacity(total);
                for chunk in chunks.drain(..) {
                    body.extend_from_slice(&chunk);
                }
                body.freeze()
            }
        }
    }

    /// Deliver the final outcome to a streamed consumer.
    ///
    /// A head not yet sent is sent now (or replaced by the error). A failure
    /// after the head went out becomes the last item of the body stream; the
    /// native handle is already released while this waits on the consumer.
    pub(crate) fn finish_stream(&mut self, outcome: &Result<ResponseHead>) {
        let BodySink::Streamed(stream) = &mut self.sink else {
            return;
        };
        match stream.head_tx.take() {
            Some(tx) => {
                let _ = tx.send(outcome.clone());
            }
            None => {
                if let Err(e) = outcome {
                    let _ = stream.body_tx.blocking_send(Err(e.clone()));
                }
            }
        }
    }
}

/// Read status and effective URL from a live handle.
pub(crate) fn query_head(
    api: &dyn CurlApi,
    handle: *mut Curl,
    header_lines: Vec<String>,
) -> Result<ResponseHead> {
    let mut status: c_long = 0;
    let code = unsafe { api.getinfo_long(handle, CURLINFO_RESPONSE_CODE, &mut status) };
    if code != CURLE_OK {
        return Err(Error::Transfer {
            code,
            message: api.strerror(code),
        });
    }

    let mut url: *const c_char = ptr::null();
    let code = unsafe { api.getinfo_ptr(handle, CURLINFO_EFFECTIVE_URL, &mut url) };
    if code != CURLE_OK {
        return Err(Error::Transfer {
            code,
            message: api.strerror(code),
        });
    }
    let effective_url = if url.is_null() {
        String::new()
    } else {
        // Copied now: the string belongs to the handle.
        unsafe { std::ffi::CStr::from_ptr(url) }
            .to_string_lossy()
            .into_owned()
    };

    Ok(ResponseHead {
        status: u16::try_from(status).unwrap_or(0),
        header_lines,
        effective_url,
    })
}

unsafe fn bridge_from<'a>(userdata: *mut c_void) -> &'a mut CallbackBridge {
    &mut *(userdata as *mut CallbackBridge)
}

unsafe fn mark_panicked(userdata: *mut c_void) {
    if !userdata.is_null() {
        bridge_from(userdata).panicked = true;
    }
}

unsafe fn native_slice<'a>(data: *const c_char, size: usize, nmemb: usize) -> &'a [u8] {
    let len = size.saturating_mul(nmemb);
    if data.is_null() || len == 0 {
        return &[];
    }
    std::slice::from_raw_parts(data as *const u8, len)
}

pub(crate) extern "C" fn write_callback(
    data: *mut c_char,
    size: usize,
    nmemb: usize,
    userdata: *mut c_void,
) -> usize {
    let len = size.saturating_mul(nmemb);
    let result = catch_unwind(AssertUnwindSafe(|| {
        let bytes = unsafe { native_slice(data, size, nmemb) };
        let bridge = unsafe { bridge_from(userdata) };
        if bridge.on_body(bytes) {
            len
        } else {
            0
        }
    }));
    result.unwrap_or_else(|_| {
        unsafe { mark_panicked(userdata) };
        0
    })
}

pub(crate) extern "C" fn header_callback(
    data: *mut c_char,
    size: usize,
    nmemb: usize,
    userdata: *mut c_void,
) -> usize {
    let len = size.saturating_mul(nmemb);
    let result = catch_unwind(AssertUnwindSafe(|| {
        let bytes = unsafe { native_slice(data, size, nmemb) };
        unsafe { bridge_from(userdata) }.on_header(bytes);
        len
    }));
    result.unwrap_or_else(|_| {
        unsafe { mark_panicked(userdata) };
        0
    })
}

/// Polled at the native progress cadence; nonzero aborts the transfer.
pub(crate) extern "C" fn progress_callback(
    userdata: *mut c_void,
    _dltotal: CurlOffT,
    _dlnow: CurlOffT,
    _ultotal: CurlOffT,
    _ulnow: CurlOffT,
) -> c_int {
    let result = catch_unwind(AssertUnwindSafe(|| {
        c_int::from(unsafe { bridge_from(userdata) }.abort_requested())
    }));
    result.unwrap_or_else(|_| {
        unsafe { mark_panicked(userdata) };
        1
    })
}

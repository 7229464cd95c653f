//! Recording stand-in for the native library, used by unit tests.
//!
//! Handles and header lists are real heap allocations so leaks and double
//! frees show up in the counters. `perform` replays a scripted response
//! through whatever callbacks were registered on the handle.

use std::collections::{HashMap, HashSet};
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_long, c_void};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::api::CurlApi;
use crate::types::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Long(CurlOption, c_long),
    Ptr(CurlOption),
    OffT(CurlOption, CurlOffT),
    Impersonate(String, bool),
    Perform,
}

type PollHook = Arc<dyn Fn(usize) + Send + Sync>;

#[derive(Default)]
struct HandleState {
    write_fn: Option<WriteCallback>,
    write_data: usize,
    header_fn: Option<WriteCallback>,
    header_data: usize,
    xfer_fn: Option<XferInfoCallback>,
    xfer_data: usize,
    progress: bool,
    no_body: bool,
    post_fields: usize,
    post_size: Option<CurlOffT>,
    effective_url: Option<CString>,
}

#[derive(Clone)]
struct Script {
    status: c_long,
    header_chunks: Vec<Vec<u8>>,
    body_chunks: Vec<Vec<u8>>,
    result: CurlCode,
    redirect_to: Option<String>,
    on_poll: Option<PollHook>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            status: 200,
            header_chunks: vec![b"HTTP/1.1 200 OK\r\n".to_vec(), b"\r\n".to_vec()],
            body_chunks: Vec::new(),
            result: CURLE_OK,
            redirect_to: None,
            on_poll: None,
        }
    }
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    longs: HashMap<CurlOption, c_long>,
    offs: HashMap<CurlOption, CurlOffT>,
    texts: HashMap<CurlOption, String>,
    header_lines: Vec<String>,
    handles: HashMap<usize, HandleState>,
    lists: HashSet<usize>,
    release_log: Vec<&'static str>,
    easy_init_calls: usize,
    fail_init: bool,
    option_failures: HashMap<CurlOption, CurlCode>,
    impersonate_failure: Option<CurlCode>,
    append_budget: Option<usize>,
    sent_body: Option<Vec<u8>>,
    script: Script,
}

pub(crate) struct FakeCurl {
    state: Mutex<State>,
}

impl FakeCurl {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    // -- scripting --

    pub(crate) fn fail_easy_init(&self) {
        self.state.lock().fail_init = true;
    }

    pub(crate) fn fail_option(&self, option: CurlOption, code: CurlCode) {
        self.state.lock().option_failures.insert(option, code);
    }

    pub(crate) fn fail_impersonate(&self, code: CurlCode) {
        self.state.lock().impersonate_failure = Some(code);
    }

    /// Let `n` appends succeed, then return null.
    pub(crate) fn fail_slist_append_after(&self, n: usize) {
        self.state.lock().append_budget = Some(n);
    }

    /// Response head replayed by `perform`, one header callback per line.
    pub(crate) fn respond(&self, status: c_long, lines: &[&str]) {
        let mut state = self.state.lock();
        state.script.status = status;
        state.script.header_chunks = lines
            .iter()
            .map(|line| format!("{line}\r\n").into_bytes())
            .collect();
    }

    pub(crate) fn body_chunks(&self, chunks: &[&[u8]]) {
        self.state.lock().script.body_chunks = chunks.iter().map(|c| c.to_vec()).collect();
    }

    /// Result code `perform` returns after replaying the script.
    pub(crate) fn finish_with(&self, code: CurlCode) {
        self.state.lock().script.result = code;
    }

    pub(crate) fn redirect_to(&self, url: &str) {
        self.state.lock().script.redirect_to = Some(url.to_string());
    }

    /// Called with the poll index before each progress poll.
    pub(crate) fn on_poll(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
        self.state.lock().script.on_poll = Some(Arc::new(hook));
    }

    // -- inspection --

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Option codes in the order they were set.
    pub(crate) fn option_order(&self) -> Vec<CurlOption> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Long(opt, _) | Call::OffT(opt, _) | Call::Ptr(opt) => Some(*opt),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn long_value(&self, option: CurlOption) -> Option<c_long> {
        self.state.lock().longs.get(&option).copied()
    }

    pub(crate) fn off_t_value(&self, option: CurlOption) -> Option<CurlOffT> {
        self.state.lock().offs.get(&option).copied()
    }

    pub(crate) fn text_value(&self, option: CurlOption) -> Option<String> {
        self.state.lock().texts.get(&option).cloned()
    }

    pub(crate) fn header_lines(&self) -> Vec<String> {
        self.state.lock().header_lines.clone()
    }

    pub(crate) fn sent_body(&self) -> Option<Vec<u8>> {
        self.state.lock().sent_body.clone()
    }

    pub(crate) fn open_handles(&self) -> usize {
        self.state.lock().handles.len()
    }

    pub(crate) fn open_lists(&self) -> usize {
        self.state.lock().lists.len()
    }

    pub(crate) fn easy_init_calls(&self) -> usize {
        self.state.lock().easy_init_calls
    }

    pub(crate) fn release_log(&self) -> Vec<&'static str> {
        self.state.lock().release_log.clone()
    }

    fn poll(hook: &Option<PollHook>, index: usize, handle: &HandleState) -> bool {
        if let Some(hook) = hook {
            hook(index);
        }
        match handle.xfer_fn {
            Some(f) if handle.progress => f(handle.xfer_data as *mut c_void, 0, 0, 0, 0) != 0,
            _ => false,
        }
    }
}

fn is_string_option(option: CurlOption) -> bool {
    matches!(option, CURLOPT_URL | CURLOPT_CUSTOMREQUEST | CURLOPT_ACCEPT_ENCODING)
}

impl CurlApi for FakeCurl {
    fn easy_init(&self) -> *mut Curl {
        let mut state = self.state.lock();
        state.easy_init_calls += 1;
        if state.fail_init {
            return std::ptr::null_mut();
        }
        let handle = Box::into_raw(Box::new(0u64)) as *mut Curl;
        state.handles.insert(handle as usize, HandleState::default());
        handle
    }

    unsafe fn easy_cleanup(&self, handle: *mut Curl) {
        let mut state = self.state.lock();
        assert!(
            state.handles.remove(&(handle as usize)).is_some(),
            "cleanup of unknown handle"
        );
        state.release_log.push("easy_cleanup");
        drop(Box::from_raw(handle as *mut u64));
    }

    unsafe fn setopt_long(&self, handle: *mut Curl, option: CurlOption, value: c_long) -> CurlCode {
        let mut state = self.state.lock();
        state.calls.push(Call::Long(option, value));
        if let Some(code) = state.option_failures.get(&option) {
            return *code;
        }
        state.longs.insert(option, value);
        if let Some(h) = state.handles.get_mut(&(handle as usize)) {
            match option {
                CURLOPT_NOPROGRESS => h.progress = value == 0,
                CURLOPT_NOBODY => h.no_body = value != 0,
                _ => {}
            }
        }
        CURLE_OK
    }

    unsafe fn setopt_ptr(
        &self,
        handle: *mut Curl,
        option: CurlOption,
        value: *const c_void,
    ) -> CurlCode {
        let mut state = self.state.lock();
        state.calls.push(Call::Ptr(option));
        if let Some(code) = state.option_failures.get(&option) {
            return *code;
        }
        if is_string_option(option) && !value.is_null() {
            let text = CStr::from_ptr(value as *const c_char).to_string_lossy().into_owned();
            state.texts.insert(option, text);
        }
        if option == CURLOPT_HTTPHEADER {
            let mut lines = Vec::new();
            let mut node = value as *const CurlSlist;
            while !node.is_null() {
                lines.push(CStr::from_ptr((*node).data).to_string_lossy().into_owned());
                node = (*node).next;
            }
            state.header_lines = lines;
        }
        let url = state.texts.get(&CURLOPT_URL).cloned();
        let Some(h) = state.handles.get_mut(&(handle as usize)) else {
            return CURLE_BAD_FUNCTION_ARGUMENT;
        };
        match option {
            CURLOPT_WRITEFUNCTION => {
                h.write_fn = Some(std::mem::transmute::<*const c_void, WriteCallback>(value))
            }
            CURLOPT_WRITEDATA => h.write_data = value as usize,
            CURLOPT_HEADERFUNCTION => {
                h.header_fn = Some(std::mem::transmute::<*const c_void, WriteCallback>(value))
            }
            CURLOPT_HEADERDATA => h.header_data = value as usize,
            CURLOPT_XFERINFOFUNCTION => {
                h.xfer_fn = Some(std::mem::transmute::<*const c_void, XferInfoCallback>(value))
            }
            CURLOPT_XFERINFODATA => h.xfer_data = value as usize,
            CURLOPT_POSTFIELDS => h.post_fields = value as usize,
            CURLOPT_URL => h.effective_url = url.and_then(|u| CString::new(u).ok()),
            _ => {}
        }
        CURLE_OK
    }

    unsafe fn setopt_off_t(
        &self,
        handle: *mut Curl,
        option: CurlOption,
        value: CurlOffT,
    ) -> CurlCode {
        let mut state = self.state.lock();
        state.calls.push(Call::OffT(option, value));
        if let Some(code) = state.option_failures.get(&option) {
            return *code;
        }
        state.offs.insert(option, value);
        if option == CURLOPT_POSTFIELDSIZE_LARGE {
            if let Some(h) = state.handles.get_mut(&(handle as usize)) {
                h.post_size = Some(value);
            }
        }
        CURLE_OK
    }

    unsafe fn getinfo_long(
        &self,
        _handle: *mut Curl,
        info: CurlInfo,
        out: &mut c_long,
    ) -> CurlCode {
        if info != CURLINFO_RESPONSE_CODE {
            return CURLE_BAD_FUNCTION_ARGUMENT;
        }
        *out = self.state.lock().script.status;
        CURLE_OK
    }

    unsafe fn getinfo_ptr(
        &self,
        handle: *mut Curl,
        info: CurlInfo,
        out: &mut *const c_char,
    ) -> CurlCode {
        if info != CURLINFO_EFFECTIVE_URL {
            return CURLE_BAD_FUNCTION_ARGUMENT;
        }
        let state = self.state.lock();
        *out = state
            .handles
            .get(&(handle as usize))
            .and_then(|h| h.effective_url.as_ref())
            .map_or(std::ptr::null(), |u| u.as_ptr());
        CURLE_OK
    }

    unsafe fn perform(&self, handle: *mut Curl) -> CurlCode {
        // Callbacks re-enter the fake, so nothing stays locked while they run.
        let (script, h) = {
            let mut state = self.state.lock();
            state.calls.push(Call::Perform);
            let script = state.script.clone();
            let Some(h) = state.handles.get_mut(&(handle as usize)) else {
                return CURLE_BAD_FUNCTION_ARGUMENT;
            };
            if let Some(url) = &script.redirect_to {
                h.effective_url = CString::new(url.as_str()).ok();
            }
            let snapshot = HandleState {
                write_fn: h.write_fn,
                write_data: h.write_data,
                header_fn: h.header_fn,
                header_data: h.header_data,
                xfer_fn: h.xfer_fn,
                xfer_data: h.xfer_data,
                progress: h.progress,
                no_body: h.no_body,
                post_fields: h.post_fields,
                post_size: h.post_size,
                effective_url: None,
            };
            if let Some(size) = snapshot.post_size {
                let len = usize::try_from(size).unwrap_or(0);
                state.sent_body = Some(if snapshot.post_fields == 0 || len == 0 {
                    Vec::new()
                } else {
                    std::slice::from_raw_parts(snapshot.post_fields as *const u8, len).to_vec()
                });
            }
            (script, snapshot)
        };

        let mut polls = 0;
        if Self::poll(&script.on_poll, polls, &h) {
            return CURLE_ABORTED_BY_CALLBACK;
        }
        polls += 1;

        if let Some(header_fn) = h.header_fn {
            for chunk in &script.header_chunks {
                let mut buf = chunk.clone();
                let userdata = h.header_data as *mut c_void;
                let n = header_fn(buf.as_mut_ptr() as *mut c_char, 1, buf.len(), userdata);
                if n != buf.len() {
                    return CURLE_WRITE_ERROR;
                }
            }
        }

        if !h.no_body {
            for chunk in &script.body_chunks {
                if Self::poll(&script.on_poll, polls, &h) {
                    return CURLE_ABORTED_BY_CALLBACK;
                }
                polls += 1;
                let Some(write_fn) = h.write_fn else { break };
                let mut buf = chunk.clone();
                let userdata = h.write_data as *mut c_void;
                let n = write_fn(buf.as_mut_ptr() as *mut c_char, 1, buf.len(), userdata);
                if n != buf.len() {
                    return CURLE_WRITE_ERROR;
                }
            }
        }

        if Self::poll(&script.on_poll, polls, &h) {
            return CURLE_ABORTED_BY_CALLBACK;
        }
        script.result
    }

    fn strerror(&self, code: CurlCode) -> String {
        match code {
            CURLE_OK => "No error",
            CURLE_UNSUPPORTED_PROTOCOL => "Unsupported protocol",
            CURLE_NOT_BUILT_IN => "A requested feature, protocol or option was not found built-in",
            CURLE_WRITE_ERROR => "Failed writing received data to disk/application",
            CURLE_OPERATION_TIMEDOUT => "Timeout was reached",
            CURLE_ABORTED_BY_CALLBACK => "Operation was aborted by an application callback",
            CURLE_BAD_FUNCTION_ARGUMENT => "A libcurl function was given a bad argument",
            CURLE_UNKNOWN_OPTION => "An unknown option was passed in to libcurl",
            _ => "Unknown error",
        }
        .to_string()
    }

    unsafe fn slist_append(&self, list: *mut CurlSlist, line: *const c_char) -> *mut CurlSlist {
        let mut state = self.state.lock();
        if let Some(budget) = state.append_budget.as_mut() {
            if *budget == 0 {
                return std::ptr::null_mut();
            }
            *budget -= 1;
        }
        let data = CStr::from_ptr(line).to_owned().into_raw();
        let node = Box::into_raw(Box::new(CurlSlist {
            data,
            next: std::ptr::null_mut(),
        }));
        if list.is_null() {
            state.lists.insert(node as usize);
            return node;
        }
        let mut tail = list;
        while !(*tail).next.is_null() {
            tail = (*tail).next;
        }
        (*tail).next = node;
        list
    }

    unsafe fn slist_free_all(&self, list: *mut CurlSlist) {
        let mut state = self.state.lock();
        assert!(state.lists.remove(&(list as usize)), "free of unknown list");
        state.release_log.push("slist_free_all");
        let mut node = list;
        while !node.is_null() {
            let boxed = Box::from_raw(node);
            drop(CString::from_raw(boxed.data));
            node = boxed.next;
        }
    }

    unsafe fn impersonate(
        &self,
        _handle: *mut Curl,
        target: *const c_char,
        default_headers: bool,
    ) -> CurlCode {
        let mut state = self.state.lock();
        let target = CStr::from_ptr(target).to_string_lossy().into_owned();
        state.calls.push(Call::Impersonate(target, default_headers));
        state.impersonate_failure.unwrap_or(CURLE_OK)
    }
}

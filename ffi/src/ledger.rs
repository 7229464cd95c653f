//! Ownership of every native-side resource tied to one transfer.
//!
//! # Design
//! The ledger owns the per-request handle and everything the handle may
//! still point at: encoded strings, the request body, the native header list
//! and the registration of the callback bridge. Release runs exactly once,
//! from `release_all` or from `Drop` on an early return or unwind. The
//! handle is cleaned up first, so no native code can reach a callback or
//! buffer after it is gone.
//!
//! The bridge is borrowed mutably for the ledger's whole lifetime, which
//! keeps it alive and untouched by Rust code until the handle is destroyed.

use std::ffi::CString;
use std::marker::PhantomData;
use std::os::raw::{c_char, c_void};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use impersonate_core::{Error, Result};

use crate::api::CurlApi;
use crate::callbacks::CallbackBridge;
use crate::types::{Curl, CurlSlist};

static LIVE_RESOURCES: AtomicUsize = AtomicUsize::new(0);

/// Transfer handles, header lists and callback registrations currently open
/// across the process.
pub fn live_native_resources() -> usize {
    LIVE_RESOURCES.load(Ordering::SeqCst)
}

enum Resource {
    /// Kept alive for option calls that read it.
    Text(CString),
    Body(Bytes),
    HeaderList(*mut CurlSlist),
    Callbacks,
}

pub(crate) struct ResourceLedger<'cb> {
    api: Arc<dyn CurlApi>,
    handle: *mut Curl,
    resources: Vec<Resource>,
    _callbacks: PhantomData<&'cb mut CallbackBridge>,
}

impl<'cb> ResourceLedger<'cb> {
    /// Create the per-request handle.
    pub(crate) fn open(api: Arc<dyn CurlApi>) -> Result<Self> {
        let handle = api.easy_init();
        if handle.is_null() {
            return Err(Error::HandleUnavailable);
        }
        LIVE_RESOURCES.fetch_add(1, Ordering::SeqCst);
        Ok(Self {
            api,
            handle,
            resources: Vec::new(),
            _callbacks: PhantomData,
        })
    }

    pub(crate) fn handle(&self) -> *mut Curl {
        self.handle
    }

    pub(crate) fn api(&self) -> &Arc<dyn CurlApi> {
        &self.api
    }

    /// Keep `text` alive until release; returns its native pointer.
    pub(crate) fn keep_text(&mut self, text: CString) -> *const c_char {
        let ptr = text.as_ptr();
        self.resources.push(Resource::Text(text));
        ptr
    }

    pub(crate) fn keep_body(&mut self, body: Bytes) -> *const c_void {
        let ptr = body.as_ptr() as *const c_void;
        self.resources.push(Resource::Body(body));
        ptr
    }

    pub(crate) fn track_header_list(&mut self, list: *mut CurlSlist) {
        if list.is_null() {
            return;
        }
        LIVE_RESOURCES.fetch_add(1, Ordering::SeqCst);
        self.resources.push(Resource::HeaderList(list));
    }

    /// Bind the bridge to this handle and return the callback `userdata`.
    pub(crate) fn install_callbacks(&mut self, bridge: &'cb mut CallbackBridge) -> *mut c_void {
        bridge.attach(self.handle);
        LIVE_RESOURCES.fetch_add(1, Ordering::SeqCst);
        self.resources.push(Resource::Callbacks);
        bridge as *mut CallbackBridge as *mut c_void
    }

    /// Destroy the handle, then everything it referenced.
    pub(crate) fn release_all(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.handle.is_null() {
            unsafe { self.api.easy_cleanup(self.handle) };
            self.handle = std::ptr::null_mut();
            LIVE_RESOURCES.fetch_sub(1, Ordering::SeqCst);
        }
        for resource in self.resources.drain(..) {
            match resource {
                Resource::HeaderList(list) => {
                    unsafe { self.api.slist_free_all(list) };
                    LIVE_RESOURCES.fetch_sub(1, Ordering::SeqCst);
                }
                Resource::Callbacks => {
                    LIVE_RESOURCES.fetch_sub(1, Ordering::SeqCst);
                }
                Resource::Text(_) | Resource::Body(_) => {}
            }
        }
    }
}

impl Drop for ResourceLedger<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

//! Discovery, loading and lifetime of the native library.
//!
//! # Design
//! At most one library is open per process. It lives in a global slot
//! guarded by a mutex, so concurrent first requests serialize on discovery
//! and global init runs once per opened library. `unload` only empties the
//! slot: transfers still holding an `Arc<Library>` finish first, and the last
//! owner runs global cleanup before the shared object is closed.
//!
//! Candidate order: explicit hints, the `LIBCURL_IMPERSONATE_PATH` override,
//! conventional install directories, bare names resolved by the dynamic
//! loader, then directories near companion executables found on `PATH`.

use std::collections::HashSet;
use std::ffi::{CStr, OsString};
use std::os::raw::{c_char, c_int, c_long, c_void};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use impersonate_core::{Error, Result};
use parking_lot::Mutex;

use crate::api::CurlApi;
use crate::types::*;

/// Environment override: a library file or a directory containing one.
pub const LIBRARY_PATH_ENV: &str = "LIBCURL_IMPERSONATE_PATH";

#[cfg(target_os = "macos")]
const LIBRARY_NAMES: &[&str] = &[
    "libcurl-impersonate.4.dylib",
    "libcurl-impersonate.dylib",
    "libcurl-impersonate-chrome.4.dylib",
    "libcurl-impersonate-chrome.dylib",
    "libcurl-impersonate-ff.4.dylib",
    "libcurl-impersonate-ff.dylib",
];

#[cfg(windows)]
const LIBRARY_NAMES: &[&str] = &["libcurl-impersonate.dll", "curl-impersonate.dll", "libcurl.dll"];

#[cfg(all(unix, not(target_os = "macos")))]
const LIBRARY_NAMES: &[&str] = &[
    "libcurl-impersonate.so.4",
    "libcurl-impersonate.so",
    "libcurl-impersonate-chrome.so.4",
    "libcurl-impersonate-chrome.so",
    "libcurl-impersonate-ff.so.4",
    "libcurl-impersonate-ff.so",
];

#[cfg(target_os = "macos")]
const INSTALL_DIRS: &[&str] = &[
    "/opt/homebrew/lib",
    "/opt/homebrew/opt/curl-impersonate/lib",
    "/usr/local/lib",
    "/usr/local/opt/curl-impersonate/lib",
];

#[cfg(windows)]
const INSTALL_DIRS: &[&str] = &[];

#[cfg(all(unix, not(target_os = "macos")))]
const INSTALL_DIRS: &[&str] = &[
    "/usr/local/lib",
    "/usr/lib",
    "/usr/lib64",
    "/usr/lib/x86_64-linux-gnu",
    "/usr/lib/aarch64-linux-gnu",
    "/opt/curl-impersonate/lib",
];

const COMPANION_EXECUTABLES: &[&str] = &[
    "curl-impersonate",
    "curl-impersonate-chrome",
    "curl-impersonate-ff",
];

/// Options for [`load`].
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Library files or directories tried before anything else.
    pub search_paths: Vec<PathBuf>,
    /// Leave native global init to someone else.
    pub skip_global_init: bool,
}

fn expand(path: &Path, out: &mut Vec<PathBuf>) {
    if path.is_dir() {
        out.extend(LIBRARY_NAMES.iter().map(|name| path.join(name)));
    } else {
        out.push(path.to_path_buf());
    }
}

fn companion_dirs(path_var: Option<OsString>) -> Vec<PathBuf> {
    let Some(path_var) = path_var else {
        return Vec::new();
    };
    let mut dirs = Vec::new();
    for dir in std::env::split_paths(&path_var) {
        let found = COMPANION_EXECUTABLES.iter().any(|exe| {
            dir.join(exe).is_file() || dir.join(format!("{exe}.exe")).is_file()
        });
        if found {
            if let Some(prefix) = dir.parent() {
                dirs.push(prefix.join("lib"));
            }
            dirs.push(dir);
        }
    }
    dirs
}

/// Ordered, de-duplicated list of library paths to try.
pub fn candidate_paths(
    hints: &[PathBuf],
    env_override: Option<PathBuf>,
    path_var: Option<OsString>,
) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for hint in hints {
        expand(hint, &mut out);
    }
    if let Some(path) = env_override {
        expand(&path, &mut out);
    }
    for dir in INSTALL_DIRS {
        let dir = Path::new(dir);
        out.extend(LIBRARY_NAMES.iter().map(|name| dir.join(name)));
    }
    out.extend(LIBRARY_NAMES.iter().map(PathBuf::from));
    for dir in companion_dirs(path_var) {
        out.extend(LIBRARY_NAMES.iter().map(|name| dir.join(name)));
    }

    let mut seen = HashSet::new();
    out.retain(|p| seen.insert(p.clone()));
    out
}

#[derive(Clone, Copy)]
struct Symbols {
    global_init: GlobalInitFn,
    global_cleanup: GlobalCleanupFn,
    easy_init: EasyInitFn,
    easy_cleanup: EasyCleanupFn,
    easy_setopt: EasySetoptFn,
    easy_getinfo: EasyGetinfoFn,
    easy_perform: EasyPerformFn,
    easy_strerror: EasyStrerrorFn,
    slist_append: SlistAppendFn,
    slist_free_all: SlistFreeAllFn,
    easy_impersonate: EasyImpersonateFn,
}

unsafe fn symbol<T: Copy>(
    lib: &libloading::Library,
    name: &[u8],
) -> std::result::Result<T, String> {
    lib.get::<T>(name).map(|s| *s).map_err(|e| {
        let printable = String::from_utf8_lossy(&name[..name.len().saturating_sub(1)]);
        format!("missing symbol {printable}: {e}")
    })
}

impl Symbols {
    unsafe fn resolve(lib: &libloading::Library) -> std::result::Result<Self, String> {
        Ok(Self {
            global_init: symbol(lib, b"curl_global_init\0")?,
            global_cleanup: symbol(lib, b"curl_global_cleanup\0")?,
            easy_init: symbol(lib, b"curl_easy_init\0")?,
            easy_cleanup: symbol(lib, b"curl_easy_cleanup\0")?,
            easy_setopt: symbol(lib, b"curl_easy_setopt\0")?,
            easy_getinfo: symbol(lib, b"curl_easy_getinfo\0")?,
            easy_perform: symbol(lib, b"curl_easy_perform\0")?,
            easy_strerror: symbol(lib, b"curl_easy_strerror\0")?,
            slist_append: symbol(lib, b"curl_slist_append\0")?,
            slist_free_all: symbol(lib, b"curl_slist_free_all\0")?,
            easy_impersonate: symbol(lib, b"curl_easy_impersonate\0")?,
        })
    }
}

/// An opened native library and its symbol table.
pub struct Library {
    path: PathBuf,
    symbols: Symbols,
    initialized: Mutex<bool>,
    // Dropped last: the symbol pointers above point into it.
    _lib: libloading::Library,
}

impl Library {
    /// Open `path` and resolve every symbol the transfer layer uses.
    pub fn open(path: &Path) -> std::result::Result<Self, String> {
        let lib = unsafe { libloading::Library::new(path) }.map_err(|e| e.to_string())?;
        let symbols = unsafe { Symbols::resolve(&lib) }?;
        Ok(Self {
            path: path.to_path_buf(),
            symbols,
            initialized: Mutex::new(false),
            _lib: lib,
        })
    }

    /// The file this library was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_initialized(&self) -> bool {
        *self.initialized.lock()
    }

    /// Run native global init once for this library.
    pub fn ensure_initialized(&self) -> Result<()> {
        let mut initialized = self.initialized.lock();
        if *initialized {
            return Ok(());
        }
        let code = unsafe { (self.symbols.global_init)(CURL_GLOBAL_DEFAULT) };
        if code != CURLE_OK {
            return Err(Error::Initialization { code });
        }
        *initialized = true;
        tracing::debug!(path = %self.path.display(), "native global init done");
        Ok(())
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        if *self.initialized.get_mut() {
            unsafe { (self.symbols.global_cleanup)() };
        }
        tracing::debug!(path = %self.path.display(), "native library released");
    }
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("path", &self.path)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl CurlApi for Library {
    fn easy_init(&self) -> *mut Curl {
        unsafe { (self.symbols.easy_init)() }
    }

    unsafe fn easy_cleanup(&self, handle: *mut Curl) {
        (self.symbols.easy_cleanup)(handle)
    }

    unsafe fn setopt_long(&self, handle: *mut Curl, option: CurlOption, value: c_long) -> CurlCode {
        (self.symbols.easy_setopt)(handle, option, value)
    }

    unsafe fn setopt_ptr(
        &self,
        handle: *mut Curl,
        option: CurlOption,
        value: *const c_void,
    ) -> CurlCode {
        (self.symbols.easy_setopt)(handle, option, value)
    }

    unsafe fn setopt_off_t(
        &self,
        handle: *mut Curl,
        option: CurlOption,
        value: CurlOffT,
    ) -> CurlCode {
        (self.symbols.easy_setopt)(handle, option, value)
    }

    unsafe fn getinfo_long(&self, handle: *mut Curl, info: CurlInfo, out: &mut c_long) -> CurlCode {
        (self.symbols.easy_getinfo)(handle, info, out as *mut c_long)
    }

    unsafe fn getinfo_ptr(
        &self,
        handle: *mut Curl,
        info: CurlInfo,
        out: &mut *const c_char,
    ) -> CurlCode {
        (self.symbols.easy_getinfo)(handle, info, out as *mut *const c_char)
    }

    unsafe fn perform(&self, handle: *mut Curl) -> CurlCode {
        (self.symbols.easy_perform)(handle)
    }

    fn strerror(&self, code: CurlCode) -> String {
        let msg = unsafe { (self.symbols.easy_strerror)(code) };
        if msg.is_null() {
            return format!("error code {code}");
        }
        unsafe { CStr::from_ptr(msg) }.to_string_lossy().into_owned()
    }

    unsafe fn slist_append(&self, list: *mut CurlSlist, line: *const c_char) -> *mut CurlSlist {
        (self.symbols.slist_append)(list, line)
    }

    unsafe fn slist_free_all(&self, list: *mut CurlSlist) {
        (self.symbols.slist_free_all)(list)
    }

    unsafe fn impersonate(
        &self,
        handle: *mut Curl,
        target: *const c_char,
        default_headers: bool,
    ) -> CurlCode {
        (self.symbols.easy_impersonate)(handle, target, default_headers as c_int)
    }
}

fn discover(hints: &[PathBuf]) -> Result<Library> {
    let env_override = std::env::var_os(LIBRARY_PATH_ENV).map(PathBuf::from);
    let candidates = candidate_paths(hints, env_override, std::env::var_os("PATH"));

    let mut failures = Vec::with_capacity(candidates.len());
    for path in candidates {
        tracing::debug!(path = %path.display(), "trying native library");
        match Library::open(&path) {
            Ok(lib) => {
                tracing::info!(path = %path.display(), "loaded native library");
                return Ok(lib);
            }
            Err(e) => failures.push(format!("{}: {e}", path.display())),
        }
    }
    tracing::warn!(attempts = failures.len(), "no native library could be loaded");
    Err(Error::Discovery { failures })
}

static LOADED: Mutex<Option<Arc<Library>>> = parking_lot::const_mutex(None);

/// Open (or reuse) the process-wide library.
///
/// When a library is already loaded the search paths are ignored; call
/// [`unload`] first to rediscover.
pub fn load(options: &LoadOptions) -> Result<Arc<Library>> {
    let mut slot = LOADED.lock();
    if let Some(lib) = slot.as_ref() {
        if !options.skip_global_init {
            lib.ensure_initialized()?;
        }
        return Ok(Arc::clone(lib));
    }

    let lib = Arc::new(discover(&options.search_paths)?);
    if !options.skip_global_init {
        lib.ensure_initialized()?;
    }
    *slot = Some(Arc::clone(&lib));
    Ok(lib)
}

/// The loaded library, discovering it with default options if needed.
pub fn acquire() -> Result<Arc<Library>> {
    load(&LoadOptions::default())
}

/// Release the process-wide library. Returns false if none was loaded.
pub fn unload() -> bool {
    let released = LOADED.lock().take();
    match released {
        Some(lib) => {
            tracing::info!(path = %lib.path().display(), "unloading native library");
            true
        }
        None => false,
    }
}

/// Path of the currently loaded library, if any.
pub fn loaded_path() -> Option<PathBuf> {
    LOADED.lock().as_ref().map(|lib| lib.path().to_path_buf())
}

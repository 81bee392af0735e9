//! Dynamic library loading and symbol resolution
//!
//! dlopen/dlsym wrapper plus a process-wide table of loaded libraries.

use crate::error::{BridgeError, Result};
use crate::logging::log_library_load;
use core::ffi::c_void;
use core::ptr::NonNull;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::ffi::{CStr, CString};
use std::sync::Arc;

/// Handle to a dynamically loaded library
pub struct Library {
    name: String,
    handle: NonNull<c_void>,
}

/// Loaded libraries by the name they were requested with
static LOADED: Lazy<DashMap<String, Arc<Library>>> = Lazy::new(DashMap::new);

impl Library {
    /// Load a library by name or path
    ///
    /// Bare names are searched on the standard library paths.
    pub fn load(name: &str) -> std::result::Result<Self, LoadError> {
        let cname = CString::new(name).map_err(|_| LoadError::InvalidName)?;

        unsafe {
            let handle = libc::dlopen(cname.as_ptr(), libc::RTLD_NOW | libc::RTLD_GLOBAL);
            NonNull::new(handle)
                .map(|handle| Self {
                    name: name.to_string(),
                    handle,
                })
                .ok_or_else(|| LoadError::LoadFailed(last_dl_error()))
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Address of an exported symbol
    pub fn symbol(&self, name: &str) -> std::result::Result<*const c_void, SymbolError> {
        let cname = CString::new(name).map_err(|_| SymbolError::InvalidName)?;

        unsafe {
            let ptr = libc::dlsym(self.handle.as_ptr(), cname.as_ptr());
            if ptr.is_null() {
                Err(SymbolError::NotFound(name.to_string()))
            } else {
                Ok(ptr as *const c_void)
            }
        }
    }

    /// Resolve a symbol as a typed function pointer
    ///
    /// # Safety
    /// `F` must be a function pointer type matching the symbol's C
    /// signature exactly.
    pub unsafe fn function<F: Copy>(&self, name: &str) -> std::result::Result<F, SymbolError> {
        debug_assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<*const c_void>());
        let ptr = self.symbol(name)?;
        Ok(std::mem::transmute_copy::<*const c_void, F>(&ptr))
    }

    /// Like `function`, but absent symbols are `None`
    ///
    /// # Safety
    /// Same contract as `function`.
    pub unsafe fn optional_function<F: Copy>(&self, name: &str) -> Option<F> {
        self.function(name).ok()
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        unsafe {
            libc::dlclose(self.handle.as_ptr());
        }
    }
}

unsafe impl Send for Library {}
unsafe impl Sync for Library {}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library").field("name", &self.name).finish()
    }
}

unsafe fn last_dl_error() -> String {
    let err = libc::dlerror();
    if err.is_null() {
        "Unknown error".into()
    } else {
        CStr::from_ptr(err).to_string_lossy().into_owned()
    }
}

/// Load a library once per process
///
/// Concurrent first use of the same name still opens it exactly once.
pub fn load_library(name: &str) -> Result<Arc<Library>> {
    if let Some(lib) = LOADED.get(name) {
        log_library_load(name, true);
        return Ok(Arc::clone(lib.value()));
    }

    let entry = LOADED.entry(name.to_string());
    let lib = match entry {
        dashmap::mapref::entry::Entry::Occupied(existing) => Arc::clone(existing.get()),
        dashmap::mapref::entry::Entry::Vacant(slot) => {
            let lib = Library::load(name).map_err(|e| BridgeError::library(name, e.to_string()))?;
            log_library_load(name, false);
            Arc::clone(slot.insert(Arc::new(lib)).value())
        }
    };
    Ok(lib)
}

/// Number of distinct libraries loaded so far
pub fn loaded_library_count() -> usize {
    LOADED.len()
}

/// Library loading errors
#[derive(Debug)]
pub enum LoadError {
    InvalidName,
    LoadFailed(String),
}

impl core::fmt::Display for LoadError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidName => write!(f, "Invalid library name"),
            Self::LoadFailed(msg) => write!(f, "Failed to load library: {}", msg),
        }
    }
}

impl std::error::Error for LoadError {}

/// Symbol lookup errors
#[derive(Debug)]
pub enum SymbolError {
    InvalidName,
    NotFound(String),
}

impl core::fmt::Display for SymbolError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidName => write!(f, "Invalid symbol name"),
            Self::NotFound(name) => write!(f, "Symbol not found: {}", name),
        }
    }
}

impl std::error::Error for SymbolError {}

//! CoreFoundation and Foundation entry points

use super::library::Library;
use crate::error::{BridgeError, Result};
use crate::runtime::UncaughtExceptionHandler;
use std::ffi::c_void;

pub(crate) struct FoundationApi {
    /// `void NSSetUncaughtExceptionHandler(NSUncaughtExceptionHandler *)`
    pub set_uncaught_exception_handler: unsafe extern "C" fn(Option<UncaughtExceptionHandler>),
    /// `CFIndex CFGetRetainCount(CFTypeRef)`
    pub get_retain_count: unsafe extern "C" fn(*const c_void) -> isize,
}

impl FoundationApi {
    /// # Safety
    /// `core_foundation` and `foundation` must be the libraries their names say.
    pub unsafe fn resolve(core_foundation: &Library, foundation: &Library) -> Result<Self> {
        let missing = |lib: &Library, e: super::library::SymbolError| {
            BridgeError::runtime(format!("{}: {}", lib.name(), e))
        };
        Ok(Self {
            set_uncaught_exception_handler: foundation
                .function("NSSetUncaughtExceptionHandler")
                .map_err(|e| missing(foundation, e))?,
            get_retain_count: core_foundation
                .function("CFGetRetainCount")
                .map_err(|e| missing(core_foundation, e))?,
        })
    }
}

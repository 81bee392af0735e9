//! Library loading tests

use super::*;
use crate::config::LibrariesConfig;
use crate::error::BridgeError;
use std::ffi::{c_char, CString};
use std::sync::Arc;

#[cfg(target_os = "linux")]
const LIBC: &str = "libc.so.6";
#[cfg(target_vendor = "apple")]
const LIBC: &str = "/usr/lib/libSystem.B.dylib";

#[cfg(any(target_os = "linux", target_vendor = "apple"))]
#[test]
fn test_load_and_call_symbol() {
    let lib = Library::load(LIBC).unwrap();
    let strlen: unsafe extern "C" fn(*const c_char) -> usize = unsafe { lib.function("strlen").unwrap() };
    let text = CString::new("selector").unwrap();
    assert_eq!(unsafe { strlen(text.as_ptr()) }, 8);
}

#[cfg(any(target_os = "linux", target_vendor = "apple"))]
#[test]
fn test_missing_symbol() {
    let lib = Library::load(LIBC).unwrap();
    match lib.symbol("typthon_objc_no_such_symbol") {
        Err(SymbolError::NotFound(name)) => assert_eq!(name, "typthon_objc_no_such_symbol"),
        other => panic!("unexpected {:?}", other.map(|_| ())),
    }
    assert!(unsafe { lib.optional_function::<*const std::ffi::c_void>("typthon_objc_no_such_symbol") }.is_none());
}

#[cfg(any(target_os = "linux", target_vendor = "apple"))]
#[test]
fn test_load_library_is_memoized() {
    let first = load_library(LIBC).unwrap();
    let second = load_library(LIBC).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(loaded_library_count() >= 1);
}

#[test]
fn test_missing_library_error() {
    let err = load_library("libtypthon-objc-missing.so").unwrap_err();
    match err {
        BridgeError::Library { name, reason } => {
            assert_eq!(name, "libtypthon-objc-missing.so");
            assert!(!reason.is_empty());
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_invalid_library_name() {
    assert!(matches!(Library::load("bad\0name"), Err(LoadError::InvalidName)));
}

#[test]
fn test_native_runtime_requires_libraries() {
    let config = LibrariesConfig {
        objc: "libtypthon-objc-missing-objc.so".into(),
        ..LibrariesConfig::default()
    };
    assert!(matches!(
        NativeRuntime::load(&config),
        Err(BridgeError::Library { .. })
    ));
}

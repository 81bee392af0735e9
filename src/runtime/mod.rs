//! Native runtime seam - the libobjc C API as a trait
//!
//! Design: every layer above talks to the object runtime through
//! `ObjcRuntime`, one method per C entry point, raw pointers in and out.
//! `bindings::NativeRuntime` forwards to the real shared libraries;
//! `sim::SimRuntime` implements the same contract in-process.
//!
//! All methods taking runtime pointers are `unsafe`: the caller guarantees
//! the pointers came from the same runtime and are still valid.

use crate::codec::MethodSignature;
use crate::dispatch::SendKind;
use crate::error::Result;
use std::ffi::{c_char, c_void, CStr};

/// Object pointer (`id`)
pub type Id = *mut c_void;
/// Class pointer; classes are objects too
pub type Class = *mut c_void;
/// Interned selector (`SEL`)
pub type Sel = *const c_void;
/// Method implementation entry point (`IMP`)
pub type Imp = *const c_void;
/// Opaque method description
pub type Method = *mut c_void;
/// Opaque instance-variable description
pub type Ivar = *mut c_void;
/// Opaque property description (`objc_property_t`)
pub type Property = *mut c_void;
/// Protocol object
pub type Protocol = *mut c_void;

/// Callback installed with `NSSetUncaughtExceptionHandler`
pub type UncaughtExceptionHandler = unsafe extern "C" fn(exception: Id);

/// Receiver/class pair passed to the super-send entry points
///
/// `super_class` is the class where method lookup starts.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ObjcSuper {
    pub receiver: Id,
    pub super_class: Class,
}

/// `objc_AssociationPolicy`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum AssociationPolicy {
    Assign = 0,
    RetainNonatomic = 1,
    CopyNonatomic = 3,
    Retain = 0o1401,
    Copy = 0o1403,
}

impl AssociationPolicy {
    /// True when the association owns a reference to the value
    #[inline]
    pub fn retains(self) -> bool {
        !matches!(self, Self::Assign)
    }
}

pub trait ObjcRuntime: Send + Sync {
    /// Short name for diagnostics
    fn name(&self) -> &'static str;

    // -- lookup by name ----------------------------------------------------

    fn get_class(&self, name: &CStr) -> Class;
    fn get_meta_class(&self, name: &CStr) -> Class;
    fn get_protocol(&self, name: &CStr) -> Protocol;
    fn register_selector(&self, name: &CStr) -> Sel;

    // -- classes -----------------------------------------------------------

    unsafe fn selector_name(&self, sel: Sel) -> *const c_char;
    unsafe fn class_name(&self, cls: Class) -> *const c_char;
    unsafe fn superclass(&self, cls: Class) -> Class;
    unsafe fn is_meta_class(&self, cls: Class) -> bool;
    unsafe fn instance_method(&self, cls: Class, sel: Sel) -> Method;
    unsafe fn class_method(&self, cls: Class, sel: Sel) -> Method;
    unsafe fn responds_to_selector(&self, cls: Class, sel: Sel) -> bool;
    unsafe fn instance_variable(&self, cls: Class, name: &CStr) -> Ivar;
    unsafe fn instance_size(&self, cls: Class) -> usize;

    /// Lists are allocated with `malloc`; the caller frees them
    unsafe fn copy_method_list(&self, cls: Class, count: &mut u32) -> *mut Method;
    unsafe fn copy_ivar_list(&self, cls: Class, count: &mut u32) -> *mut Ivar;
    unsafe fn copy_property_list(&self, cls: Class, count: &mut u32) -> *mut Property;
    unsafe fn copy_protocol_list(&self, cls: Class, count: &mut u32) -> *mut Protocol;

    // -- class construction ------------------------------------------------

    unsafe fn allocate_class_pair(&self, superclass: Class, name: &CStr, extra_bytes: usize) -> Class;
    unsafe fn register_class_pair(&self, cls: Class);
    unsafe fn add_method(&self, cls: Class, sel: Sel, imp: Imp, types: &CStr) -> bool;
    /// Returns the previous implementation, or null when the method was added
    unsafe fn replace_method(&self, cls: Class, sel: Sel, imp: Imp, types: &CStr) -> Imp;
    unsafe fn add_ivar(&self, cls: Class, name: &CStr, size: usize, align_log2: u8, types: &CStr) -> bool;
    unsafe fn add_protocol(&self, cls: Class, protocol: Protocol) -> bool;

    // -- objects -----------------------------------------------------------

    unsafe fn object_class(&self, obj: Id) -> Class;

    // -- descriptions ------------------------------------------------------

    unsafe fn method_name(&self, method: Method) -> Sel;
    unsafe fn method_type_encoding(&self, method: Method) -> *const c_char;
    unsafe fn method_implementation(&self, method: Method) -> Imp;
    unsafe fn ivar_name(&self, ivar: Ivar) -> *const c_char;
    unsafe fn ivar_type_encoding(&self, ivar: Ivar) -> *const c_char;
    unsafe fn ivar_offset(&self, ivar: Ivar) -> isize;
    unsafe fn property_name(&self, property: Property) -> *const c_char;
    unsafe fn property_attributes(&self, property: Property) -> *const c_char;
    unsafe fn protocol_name(&self, protocol: Protocol) -> *const c_char;

    // -- memory ------------------------------------------------------------

    unsafe fn set_associated_object(&self, obj: Id, key: *const c_void, value: Id, policy: AssociationPolicy);
    unsafe fn get_associated_object(&self, obj: Id, key: *const c_void) -> Id;
    fn autorelease_pool_push(&self) -> *mut c_void;
    unsafe fn autorelease_pool_pop(&self, pool: *mut c_void);
    unsafe fn retain_count(&self, obj: Id) -> usize;

    // -- exceptions and dispatch -------------------------------------------

    fn set_uncaught_exception_handler(&self, handler: Option<UncaughtExceptionHandler>);

    /// Message-send entry point for a call shape
    ///
    /// Called once per `(kind, signature)`; the result is cached by the
    /// dispatch layer. The entry must accept the argument list the
    /// dispatch layer builds for `kind` (out-pointer first for the stret
    /// kinds, `ObjcSuper *` in place of the receiver for the super kinds).
    fn send_entry(&self, kind: SendKind, signature: &MethodSignature) -> Result<Imp>;
}

/// Copy a runtime-owned C string
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
pub unsafe fn c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
    }
}

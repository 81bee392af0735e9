//! `ObjcRuntime` over the real shared libraries

use super::foundation::FoundationApi;
use super::library::{load_library, Library};
use super::objc::ObjcApi;
use crate::codec::MethodSignature;
use crate::config::LibrariesConfig;
use crate::dispatch::SendKind;
use crate::error::{BridgeError, Result};
use crate::logging::{info, perf, warn};
use crate::runtime::{
    AssociationPolicy, Class, Id, Imp, Ivar, Method, ObjcRuntime, Property, Protocol, Sel,
    UncaughtExceptionHandler,
};
use std::ffi::{c_char, c_void, CStr};
use std::sync::Arc;

pub struct NativeRuntime {
    objc: ObjcApi,
    foundation: FoundationApi,
    /// Keeps every library this runtime resolved symbols from open
    _libraries: Vec<Arc<Library>>,
}

impl NativeRuntime {
    /// Load the configured libraries and resolve every entry point
    ///
    /// Missing required libraries or symbols are fatal for the bridge.
    pub fn load(config: &LibrariesConfig) -> Result<Self> {
        let _timer = perf::track("native_runtime_load");
        let objc_lib = load_library(&config.objc)?;
        let core_foundation = load_library(&config.core_foundation)?;
        let foundation = load_library(&config.foundation)?;

        let mut libraries = vec![
            Arc::clone(&objc_lib),
            Arc::clone(&core_foundation),
            Arc::clone(&foundation),
        ];
        for extra in &config.extra {
            match load_library(extra) {
                Ok(lib) => libraries.push(lib),
                Err(e) => warn!(library = %extra, error = %e, "Optional library not loaded"),
            }
        }

        let (objc, foundation) = unsafe {
            (
                ObjcApi::resolve(&objc_lib)?,
                FoundationApi::resolve(&core_foundation, &foundation)?,
            )
        };

        info!(
            objc = %config.objc,
            libraries = libraries.len(),
            stret = objc.msg_send_stret.is_some(),
            fpret = objc.msg_send_fpret.is_some(),
            "Native runtime loaded"
        );

        Ok(Self {
            objc,
            foundation,
            _libraries: libraries,
        })
    }
}

#[inline]
fn flag(value: i8) -> bool {
    value != 0
}

impl ObjcRuntime for NativeRuntime {
    fn name(&self) -> &'static str {
        "native"
    }

    fn get_class(&self, name: &CStr) -> Class {
        unsafe { (self.objc.get_class)(name.as_ptr()) }
    }

    fn get_meta_class(&self, name: &CStr) -> Class {
        unsafe { (self.objc.get_meta_class)(name.as_ptr()) }
    }

    fn get_protocol(&self, name: &CStr) -> Protocol {
        unsafe { (self.objc.get_protocol)(name.as_ptr()) }
    }

    fn register_selector(&self, name: &CStr) -> Sel {
        unsafe { (self.objc.sel_register_name)(name.as_ptr()) }
    }

    unsafe fn selector_name(&self, sel: Sel) -> *const c_char {
        (self.objc.sel_get_name)(sel)
    }

    unsafe fn class_name(&self, cls: Class) -> *const c_char {
        (self.objc.class_get_name)(cls)
    }

    unsafe fn superclass(&self, cls: Class) -> Class {
        (self.objc.class_get_superclass)(cls)
    }

    unsafe fn is_meta_class(&self, cls: Class) -> bool {
        flag((self.objc.class_is_meta_class)(cls))
    }

    unsafe fn instance_method(&self, cls: Class, sel: Sel) -> Method {
        (self.objc.class_get_instance_method)(cls, sel)
    }

    unsafe fn class_method(&self, cls: Class, sel: Sel) -> Method {
        (self.objc.class_get_class_method)(cls, sel)
    }

    unsafe fn responds_to_selector(&self, cls: Class, sel: Sel) -> bool {
        flag((self.objc.class_responds_to_selector)(cls, sel))
    }

    unsafe fn instance_variable(&self, cls: Class, name: &CStr) -> Ivar {
        (self.objc.class_get_instance_variable)(cls, name.as_ptr())
    }

    unsafe fn instance_size(&self, cls: Class) -> usize {
        (self.objc.class_get_instance_size)(cls)
    }

    unsafe fn copy_method_list(&self, cls: Class, count: &mut u32) -> *mut Method {
        (self.objc.class_copy_method_list)(cls, count)
    }

    unsafe fn copy_ivar_list(&self, cls: Class, count: &mut u32) -> *mut Ivar {
        (self.objc.class_copy_ivar_list)(cls, count)
    }

    unsafe fn copy_property_list(&self, cls: Class, count: &mut u32) -> *mut Property {
        (self.objc.class_copy_property_list)(cls, count)
    }

    unsafe fn copy_protocol_list(&self, cls: Class, count: &mut u32) -> *mut Protocol {
        (self.objc.class_copy_protocol_list)(cls, count)
    }

    unsafe fn allocate_class_pair(&self, superclass: Class, name: &CStr, extra_bytes: usize) -> Class {
        (self.objc.allocate_class_pair)(superclass, name.as_ptr(), extra_bytes)
    }

    unsafe fn register_class_pair(&self, cls: Class) {
        (self.objc.register_class_pair)(cls)
    }

    unsafe fn add_method(&self, cls: Class, sel: Sel, imp: Imp, types: &CStr) -> bool {
        flag((self.objc.class_add_method)(cls, sel, imp, types.as_ptr()))
    }

    unsafe fn replace_method(&self, cls: Class, sel: Sel, imp: Imp, types: &CStr) -> Imp {
        (self.objc.class_replace_method)(cls, sel, imp, types.as_ptr())
    }

    unsafe fn add_ivar(&self, cls: Class, name: &CStr, size: usize, align_log2: u8, types: &CStr) -> bool {
        flag((self.objc.class_add_ivar)(cls, name.as_ptr(), size, align_log2, types.as_ptr()))
    }

    unsafe fn add_protocol(&self, cls: Class, protocol: Protocol) -> bool {
        flag((self.objc.class_add_protocol)(cls, protocol))
    }

    unsafe fn object_class(&self, obj: Id) -> Class {
        (self.objc.object_get_class)(obj)
    }

    unsafe fn method_name(&self, method: Method) -> Sel {
        (self.objc.method_get_name)(method)
    }

    unsafe fn method_type_encoding(&self, method: Method) -> *const c_char {
        (self.objc.method_get_type_encoding)(method)
    }

    unsafe fn method_implementation(&self, method: Method) -> Imp {
        (self.objc.method_get_implementation)(method)
    }

    unsafe fn ivar_name(&self, ivar: Ivar) -> *const c_char {
        (self.objc.ivar_get_name)(ivar)
    }

    unsafe fn ivar_type_encoding(&self, ivar: Ivar) -> *const c_char {
        (self.objc.ivar_get_type_encoding)(ivar)
    }

    unsafe fn ivar_offset(&self, ivar: Ivar) -> isize {
        (self.objc.ivar_get_offset)(ivar)
    }

    unsafe fn property_name(&self, property: Property) -> *const c_char {
        (self.objc.property_get_name)(property)
    }

    unsafe fn property_attributes(&self, property: Property) -> *const c_char {
        (self.objc.property_get_attributes)(property)
    }

    unsafe fn protocol_name(&self, protocol: Protocol) -> *const c_char {
        (self.objc.protocol_get_name)(protocol)
    }

    unsafe fn set_associated_object(&self, obj: Id, key: *const c_void, value: Id, policy: AssociationPolicy) {
        (self.objc.set_associated_object)(obj, key, value, policy as usize)
    }

    unsafe fn get_associated_object(&self, obj: Id, key: *const c_void) -> Id {
        (self.objc.get_associated_object)(obj, key)
    }

    fn autorelease_pool_push(&self) -> *mut c_void {
        unsafe { (self.objc.autorelease_pool_push)() }
    }

    unsafe fn autorelease_pool_pop(&self, pool: *mut c_void) {
        (self.objc.autorelease_pool_pop)(pool)
    }

    unsafe fn retain_count(&self, obj: Id) -> usize {
        (self.foundation.get_retain_count)(obj).max(0) as usize
    }

    fn set_uncaught_exception_handler(&self, handler: Option<UncaughtExceptionHandler>) {
        unsafe { (self.foundation.set_uncaught_exception_handler)(handler) }
    }

    fn send_entry(&self, kind: SendKind, _signature: &MethodSignature) -> Result<Imp> {
        let entry = match kind {
            SendKind::Send => Some(self.objc.msg_send),
            SendKind::SendSuper => Some(self.objc.msg_send_super),
            // Without a dedicated symbol the plain entry returns floats correctly
            SendKind::SendFpret => self.objc.msg_send_fpret.or(Some(self.objc.msg_send)),
            SendKind::SendStret => self.objc.msg_send_stret,
            SendKind::SendSuperStret => self.objc.msg_send_super_stret,
        };
        entry.ok_or_else(|| {
            BridgeError::runtime(format!("{} is not available on this platform", kind.symbol()))
        })
    }
}

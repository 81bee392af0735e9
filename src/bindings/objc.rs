//! libobjc entry points
//!
//! Each field's type is the C signature of the symbol it is resolved from.
//! `BOOL` is one byte on every Apple target and is declared as `i8`.

use super::library::Library;
use crate::error::{BridgeError, Result};
use crate::runtime::{Class, Id, Imp, Ivar, Method, Property, Protocol, Sel};
use std::ffi::{c_char, c_void};

pub(crate) struct ObjcApi {
    pub get_class: unsafe extern "C" fn(*const c_char) -> Class,
    pub get_meta_class: unsafe extern "C" fn(*const c_char) -> Class,
    pub get_protocol: unsafe extern "C" fn(*const c_char) -> Protocol,
    pub sel_register_name: unsafe extern "C" fn(*const c_char) -> Sel,
    pub sel_get_name: unsafe extern "C" fn(Sel) -> *const c_char,

    pub class_get_name: unsafe extern "C" fn(Class) -> *const c_char,
    pub class_get_superclass: unsafe extern "C" fn(Class) -> Class,
    pub class_is_meta_class: unsafe extern "C" fn(Class) -> i8,
    pub class_get_instance_method: unsafe extern "C" fn(Class, Sel) -> Method,
    pub class_get_class_method: unsafe extern "C" fn(Class, Sel) -> Method,
    pub class_responds_to_selector: unsafe extern "C" fn(Class, Sel) -> i8,
    pub class_get_instance_variable: unsafe extern "C" fn(Class, *const c_char) -> Ivar,
    pub class_get_instance_size: unsafe extern "C" fn(Class) -> usize,
    pub class_copy_method_list: unsafe extern "C" fn(Class, *mut u32) -> *mut Method,
    pub class_copy_ivar_list: unsafe extern "C" fn(Class, *mut u32) -> *mut Ivar,
    pub class_copy_property_list: unsafe extern "C" fn(Class, *mut u32) -> *mut Property,
    pub class_copy_protocol_list: unsafe extern "C" fn(Class, *mut u32) -> *mut Protocol,
    pub class_add_method: unsafe extern "C" fn(Class, Sel, Imp, *const c_char) -> i8,
    pub class_replace_method: unsafe extern "C" fn(Class, Sel, Imp, *const c_char) -> Imp,
    pub class_add_ivar: unsafe extern "C" fn(Class, *const c_char, usize, u8, *const c_char) -> i8,
    pub class_add_protocol: unsafe extern "C" fn(Class, Protocol) -> i8,

    pub allocate_class_pair: unsafe extern "C" fn(Class, *const c_char, usize) -> Class,
    pub register_class_pair: unsafe extern "C" fn(Class),
    pub object_get_class: unsafe extern "C" fn(Id) -> Class,

    pub method_get_name: unsafe extern "C" fn(Method) -> Sel,
    pub method_get_type_encoding: unsafe extern "C" fn(Method) -> *const c_char,
    pub method_get_implementation: unsafe extern "C" fn(Method) -> Imp,
    pub ivar_get_name: unsafe extern "C" fn(Ivar) -> *const c_char,
    pub ivar_get_type_encoding: unsafe extern "C" fn(Ivar) -> *const c_char,
    pub ivar_get_offset: unsafe extern "C" fn(Ivar) -> isize,
    pub property_get_name: unsafe extern "C" fn(Property) -> *const c_char,
    pub property_get_attributes: unsafe extern "C" fn(Property) -> *const c_char,
    pub protocol_get_name: unsafe extern "C" fn(Protocol) -> *const c_char,

    pub set_associated_object: unsafe extern "C" fn(Id, *const c_void, Id, usize),
    pub get_associated_object: unsafe extern "C" fn(Id, *const c_void) -> Id,
    pub autorelease_pool_push: unsafe extern "C" fn() -> *mut c_void,
    pub autorelease_pool_pop: unsafe extern "C" fn(*mut c_void),

    /// Entry points are called through libffi, never directly
    pub msg_send: *const c_void,
    pub msg_send_super: *const c_void,
    pub msg_send_stret: Option<*const c_void>,
    pub msg_send_fpret: Option<*const c_void>,
    pub msg_send_super_stret: Option<*const c_void>,
}

unsafe impl Send for ObjcApi {}
unsafe impl Sync for ObjcApi {}

macro_rules! required {
    ($lib:expr, $symbol:literal) => {
        $lib.function($symbol)
            .map_err(|e| BridgeError::runtime(format!("{}: {}", $lib.name(), e)))?
    };
}

impl ObjcApi {
    /// Resolve every entry point from libobjc
    ///
    /// # Safety
    /// `lib` must be the Objective-C runtime library.
    pub unsafe fn resolve(lib: &Library) -> Result<Self> {
        Ok(Self {
            get_class: required!(lib, "objc_getClass"),
            get_meta_class: required!(lib, "objc_getMetaClass"),
            get_protocol: required!(lib, "objc_getProtocol"),
            sel_register_name: required!(lib, "sel_registerName"),
            sel_get_name: required!(lib, "sel_getName"),

            class_get_name: required!(lib, "class_getName"),
            class_get_superclass: required!(lib, "class_getSuperclass"),
            class_is_meta_class: required!(lib, "class_isMetaClass"),
            class_get_instance_method: required!(lib, "class_getInstanceMethod"),
            class_get_class_method: required!(lib, "class_getClassMethod"),
            class_responds_to_selector: required!(lib, "class_respondsToSelector"),
            class_get_instance_variable: required!(lib, "class_getInstanceVariable"),
            class_get_instance_size: required!(lib, "class_getInstanceSize"),
            class_copy_method_list: required!(lib, "class_copyMethodList"),
            class_copy_ivar_list: required!(lib, "class_copyIvarList"),
            class_copy_property_list: required!(lib, "class_copyPropertyList"),
            class_copy_protocol_list: required!(lib, "class_copyProtocolList"),
            class_add_method: required!(lib, "class_addMethod"),
            class_replace_method: required!(lib, "class_replaceMethod"),
            class_add_ivar: required!(lib, "class_addIvar"),
            class_add_protocol: required!(lib, "class_addProtocol"),

            allocate_class_pair: required!(lib, "objc_allocateClassPair"),
            register_class_pair: required!(lib, "objc_registerClassPair"),
            object_get_class: required!(lib, "object_getClass"),

            method_get_name: required!(lib, "method_getName"),
            method_get_type_encoding: required!(lib, "method_getTypeEncoding"),
            method_get_implementation: required!(lib, "method_getImplementation"),
            ivar_get_name: required!(lib, "ivar_getName"),
            ivar_get_type_encoding: required!(lib, "ivar_getTypeEncoding"),
            ivar_get_offset: required!(lib, "ivar_getOffset"),
            property_get_name: required!(lib, "property_getName"),
            property_get_attributes: required!(lib, "property_getAttributes"),
            protocol_get_name: required!(lib, "protocol_getName"),

            set_associated_object: required!(lib, "objc_setAssociatedObject"),
            get_associated_object: required!(lib, "objc_getAssociatedObject"),
            autorelease_pool_push: required!(lib, "objc_autoreleasePoolPush"),
            autorelease_pool_pop: required!(lib, "objc_autoreleasePoolPop"),

            msg_send: required!(lib, "objc_msgSend"),
            msg_send_super: required!(lib, "objc_msgSendSuper"),
            // Absent on arm64, where no return shape needs them
            msg_send_stret: lib.symbol("objc_msgSend_stret").ok(),
            msg_send_fpret: lib.symbol("objc_msgSend_fpret").ok(),
            msg_send_super_stret: lib.symbol("objc_msgSendSuper_stret").ok(),
        })
    }
}

//! Iterators over runtime lists
//!
//! The runtime hands out `malloc`ed arrays. Each iterator owns one and
//! frees it on drop, so callers only ever see host values.

use super::class::ClassHandle;
use crate::bridge::Bridge;
use crate::codec::{split, to_native_type, NativeType};
use crate::logging::debug;
use crate::runtime::{c_string, Class, Ivar, Method, ObjcRuntime, Property, Protocol};
use std::ffi::c_void;

/// A runtime-allocated array, freed on drop
struct NativeList<T: Copy> {
    ptr: *mut T,
    len: usize,
    pos: usize,
}

impl<T: Copy> NativeList<T> {
    fn new(ptr: *mut T, len: u32) -> Self {
        Self {
            ptr,
            len: if ptr.is_null() { 0 } else { len as usize },
            pos: 0,
        }
    }
}

impl<T: Copy> Iterator for NativeList<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.pos >= self.len {
            return None;
        }
        let item = unsafe { *self.ptr.add(self.pos) };
        self.pos += 1;
        Some(item)
    }
}

impl<T: Copy> Drop for NativeList<T> {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { libc::free(self.ptr as *mut c_void) }
        }
    }
}

/// A method as listed by the runtime
#[derive(Debug, Clone, PartialEq)]
pub struct MethodInfo {
    pub name: String,
    pub encoding: String,
    /// Native argument types, hidden arguments included; codes without a
    /// native mapping are reported as opaque pointers
    pub arg_types: Vec<NativeType>,
}

pub struct MethodIter {
    bridge: &'static Bridge,
    list: NativeList<Method>,
    prefixes: Vec<String>,
}

impl MethodIter {
    pub(crate) fn new(bridge: &'static Bridge, class: Class, prefixes: &[&str]) -> Self {
        let mut count = 0u32;
        let ptr = unsafe { bridge.runtime().copy_method_list(class, &mut count) };
        Self {
            bridge,
            list: NativeList::new(ptr, count),
            prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn matches(&self, name: &str) -> bool {
        self.prefixes.is_empty() || self.prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }
}

impl Iterator for MethodIter {
    type Item = MethodInfo;

    fn next(&mut self) -> Option<MethodInfo> {
        let runtime = self.bridge.runtime();
        loop {
            let method = self.list.next()?;
            let (name, encoding) = unsafe {
                let sel = runtime.method_name(method);
                (
                    c_string(runtime.selector_name(sel)),
                    c_string(runtime.method_type_encoding(method)),
                )
            };
            let (Some(name), Some(encoding)) = (name, encoding) else {
                continue;
            };
            if !self.matches(&name) {
                continue;
            }
            match argument_types(&encoding) {
                Some(arg_types) => {
                    return Some(MethodInfo {
                        name,
                        encoding,
                        arg_types,
                    })
                }
                None => debug!(method = %name, encoding = %encoding, "Skipping unparseable method"),
            }
        }
    }
}

fn argument_types(encoding: &str) -> Option<Vec<NativeType>> {
    let opaque = NativeType::Pointer(Box::new(NativeType::Void));
    let codes = split(encoding).ok()?;
    codes
        .iter()
        .skip(1)
        .map(|code| to_native_type(code, Some(&opaque)).ok())
        .collect()
}

/// An instance variable
#[derive(Debug, Clone, PartialEq)]
pub struct IvarInfo {
    pub name: String,
    pub encoding: String,
    /// Byte offset from the start of the object
    pub offset: isize,
}

impl IvarInfo {
    pub(crate) unsafe fn read(runtime: &dyn ObjcRuntime, ivar: Ivar) -> Self {
        Self {
            name: c_string(runtime.ivar_name(ivar)).unwrap_or_default(),
            encoding: c_string(runtime.ivar_type_encoding(ivar)).unwrap_or_default(),
            offset: runtime.ivar_offset(ivar),
        }
    }
}

pub struct IvarIter {
    bridge: &'static Bridge,
    list: NativeList<Ivar>,
}

impl IvarIter {
    pub(crate) fn new(bridge: &'static Bridge, class: Class) -> Self {
        let mut count = 0u32;
        let ptr = unsafe { bridge.runtime().copy_ivar_list(class, &mut count) };
        Self {
            bridge,
            list: NativeList::new(ptr, count),
        }
    }
}

impl Iterator for IvarIter {
    type Item = IvarInfo;

    fn next(&mut self) -> Option<IvarInfo> {
        let ivar = self.list.next()?;
        Some(unsafe { IvarInfo::read(self.bridge.runtime(), ivar) })
    }
}

/// A declared property
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyInfo {
    pub name: String,
    /// Raw attribute string, e.g. `T@"NSString",R,C`
    pub attributes: String,
}

impl PropertyInfo {
    /// The property's type encoding (the `T` attribute)
    pub fn type_encoding(&self) -> Option<&str> {
        self.attributes
            .split(',')
            .find_map(|attr| attr.strip_prefix('T'))
    }

    pub fn is_readonly(&self) -> bool {
        self.attributes.split(',').any(|attr| attr == "R")
    }
}

pub struct PropertyIter {
    bridge: &'static Bridge,
    list: NativeList<Property>,
}

impl PropertyIter {
    pub(crate) fn new(bridge: &'static Bridge, class: Class) -> Self {
        let mut count = 0u32;
        let ptr = unsafe { bridge.runtime().copy_property_list(class, &mut count) };
        Self {
            bridge,
            list: NativeList::new(ptr, count),
        }
    }
}

impl Iterator for PropertyIter {
    type Item = PropertyInfo;

    fn next(&mut self) -> Option<PropertyInfo> {
        let property = self.list.next()?;
        let runtime = self.bridge.runtime();
        unsafe {
            Some(PropertyInfo {
                name: c_string(runtime.property_name(property)).unwrap_or_default(),
                attributes: c_string(runtime.property_attributes(property)).unwrap_or_default(),
            })
        }
    }
}

/// A runtime protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolHandle {
    ptr: usize,
    name: String,
}

impl ProtocolHandle {
    pub(crate) unsafe fn read(runtime: &dyn ObjcRuntime, protocol: Protocol) -> Self {
        Self {
            ptr: protocol as usize,
            name: c_string(runtime.protocol_name(protocol)).unwrap_or_default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn as_ptr(&self) -> Protocol {
        self.ptr as Protocol
    }
}

pub struct ProtocolIter {
    bridge: &'static Bridge,
    list: NativeList<Protocol>,
}

impl ProtocolIter {
    pub(crate) fn new(bridge: &'static Bridge, class: Class) -> Self {
        let mut count = 0u32;
        let ptr = unsafe { bridge.runtime().copy_protocol_list(class, &mut count) };
        Self {
            bridge,
            list: NativeList::new(ptr, count),
        }
    }
}

impl Iterator for ProtocolIter {
    type Item = ProtocolHandle;

    fn next(&mut self) -> Option<ProtocolHandle> {
        let protocol = self.list.next()?;
        Some(unsafe { ProtocolHandle::read(self.bridge.runtime(), protocol) })
    }
}

/// Walks a superclass chain; the runtime guarantees it terminates
pub struct InheritanceIter {
    next: Option<ClassHandle>,
}

impl InheritanceIter {
    pub(crate) fn new(start: ClassHandle) -> Self {
        Self { next: Some(start) }
    }
}

impl Iterator for InheritanceIter {
    type Item = ClassHandle;

    fn next(&mut self) -> Option<ClassHandle> {
        let current = self.next.take()?;
        self.next = current.superclass();
        Some(current)
    }
}

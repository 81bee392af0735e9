//! Simulated class structures
//!
//! Classes are objects: the first word of a `SimClass` is its isa, the
//! same position an instance keeps its class pointer in. Class memory is
//! never freed.

use super::SimState;
use crate::runtime::{Imp, Sel};
use parking_lot::RwLock;
use std::ffi::CString;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[repr(C)]
pub(crate) struct SimClass {
    /// Metaclass for classes, root metaclass for metaclasses
    pub isa: *const SimClass,
    pub superclass: *const SimClass,
    pub state: *const SimState,
    pub name: CString,
    pub meta: bool,
    pub registered: AtomicBool,
    pub instance_size: AtomicUsize,
    pub methods: RwLock<Vec<&'static SimMethod>>,
    pub ivars: RwLock<Vec<&'static SimIvar>>,
    pub properties: RwLock<Vec<&'static SimProperty>>,
    pub protocols: RwLock<Vec<&'static SimProtocol>>,
}

unsafe impl Send for SimClass {}
unsafe impl Sync for SimClass {}

pub(crate) struct SimMethod {
    pub sel: usize,
    pub types: CString,
    pub imp: AtomicUsize,
}

pub(crate) struct SimIvar {
    pub name: CString,
    pub types: CString,
    pub offset: isize,
}

pub(crate) struct SimProperty {
    pub name: CString,
    pub attributes: CString,
}

pub(crate) struct SimProtocol {
    pub name: CString,
}

#[inline]
const fn round_up(value: usize, align: usize) -> usize {
    (value + align - 1) / align * align
}

impl SimClass {
    /// Allocate a class structure with unset links
    pub fn allocate(state: *const SimState, name: CString, meta: bool, instance_size: usize) -> *mut SimClass {
        Box::into_raw(Box::new(SimClass {
            isa: std::ptr::null(),
            superclass: std::ptr::null(),
            state,
            name,
            meta,
            registered: AtomicBool::new(false),
            instance_size: AtomicUsize::new(instance_size),
            methods: RwLock::new(Vec::new()),
            ivars: RwLock::new(Vec::new()),
            properties: RwLock::new(Vec::new()),
            protocols: RwLock::new(Vec::new()),
        }))
    }

    #[inline]
    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    #[inline]
    pub fn superclass(&self) -> Option<&'static SimClass> {
        unsafe { self.superclass.as_ref() }
    }

    /// Method declared on this class only
    pub fn own_method(&self, sel: Sel) -> Option<&'static SimMethod> {
        self.methods
            .read()
            .iter()
            .copied()
            .find(|m| m.sel == sel as usize)
    }

    /// Method on this class or the nearest ancestor declaring it
    pub fn find_method(&'static self, sel: Sel) -> Option<&'static SimMethod> {
        let mut class = Some(self);
        while let Some(current) = class {
            if let Some(method) = current.own_method(sel) {
                return Some(method);
            }
            class = current.superclass();
        }
        None
    }

    pub fn lookup_imp(&'static self, sel: Sel) -> Option<Imp> {
        self.find_method(sel)
            .map(|m| m.imp.load(Ordering::Acquire) as Imp)
    }

    /// Fails when this class already declares `sel`
    pub fn add_method(&self, sel: Sel, imp: Imp, types: CString) -> bool {
        let mut methods = self.methods.write();
        if methods.iter().any(|m| m.sel == sel as usize) {
            return false;
        }
        methods.push(Box::leak(Box::new(SimMethod {
            sel: sel as usize,
            types,
            imp: AtomicUsize::new(imp as usize),
        })));
        true
    }

    /// Previous implementation, or null if the method was added
    pub fn replace_method(&self, sel: Sel, imp: Imp, types: CString) -> Imp {
        if let Some(method) = self.own_method(sel) {
            return method.imp.swap(imp as usize, Ordering::AcqRel) as Imp;
        }
        self.add_method(sel, imp, types);
        std::ptr::null()
    }

    /// Ivars can only be added before registration
    pub fn add_ivar(&self, name: CString, size: usize, align_log2: u8, types: CString) -> bool {
        if self.is_registered() || self.meta {
            return false;
        }
        let mut ivars = self.ivars.write();
        if ivars.iter().any(|ivar| ivar.name == name) {
            return false;
        }
        let align = 1usize << align_log2;
        let offset = round_up(self.instance_size.load(Ordering::Acquire), align);
        self.instance_size.store(offset + size, Ordering::Release);
        ivars.push(Box::leak(Box::new(SimIvar {
            name,
            types,
            offset: offset as isize,
        })));
        true
    }

    pub fn find_ivar(&'static self, name: &std::ffi::CStr) -> Option<&'static SimIvar> {
        let mut class = Some(self);
        while let Some(current) = class {
            if let Some(ivar) = current
                .ivars
                .read()
                .iter()
                .copied()
                .find(|ivar| ivar.name.as_c_str() == name)
            {
                return Some(ivar);
            }
            class = current.superclass();
        }
        None
    }

    pub fn add_property(&self, name: &str, attributes: &str) {
        if let (Ok(name), Ok(attributes)) = (CString::new(name), CString::new(attributes)) {
            self.properties
                .write()
                .push(Box::leak(Box::new(SimProperty { name, attributes })));
        }
    }

    pub fn add_protocol(&self, protocol: &'static SimProtocol) -> bool {
        let mut protocols = self.protocols.write();
        if protocols.iter().any(|p| std::ptr::eq(*p, protocol)) {
            return false;
        }
        protocols.push(protocol);
        true
    }

    pub fn is_subclass_of(&'static self, other: *const SimClass) -> bool {
        let mut class = Some(self);
        while let Some(current) = class {
            if std::ptr::eq(current, other) {
                return true;
            }
            class = current.superclass();
        }
        false
    }
}

/// Copy pointers into a `malloc`ed array the caller frees
pub(crate) fn malloc_list<T>(items: &[*mut T], count: &mut u32) -> *mut *mut T {
    *count = items.len() as u32;
    if items.is_empty() {
        return std::ptr::null_mut();
    }
    unsafe {
        let list = libc::malloc(std::mem::size_of::<*mut T>() * items.len()) as *mut *mut T;
        if list.is_null() {
            *count = 0;
            return list;
        }
        for (i, item) in items.iter().enumerate() {
            *list.add(i) = *item;
        }
        list
    }
}

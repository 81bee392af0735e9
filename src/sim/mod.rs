//! Simulated runtime - an in-process object runtime behind `ObjcRuntime`
//!
//! Design: implements the same C-level contract as the system runtime
//! (class pairs, method tables, retain counts, associations, per-thread
//! autorelease pools, message-send entry points) so the whole bridge can
//! run on hosts without libobjc.
//!
//! Architecture:
//! - `class`: class structures, method/ivar/property tables
//! - `object`: instance memory and the retain/association side table
//! - `send`: message-send entry points built as libffi closures
//! - `foundation`: seeded root and value classes (`NSObject`, `NSString`,
//!   collections, `NSException`, a screen-like struct vendor)
//!
//! Every `SimRuntime::new()` is an independent world; runtime state is
//! leaked so class and selector pointers stay valid for the process.

mod class;
mod foundation;
mod object;
mod send;

#[cfg(test)]
mod tests;

use crate::codec::MethodSignature;
use crate::dispatch::SendKind;
use crate::error::Result;
use crate::logging::{debug, error, trace};
use crate::runtime::{
    AssociationPolicy, Class, Id, Imp, Ivar, Method, ObjcRuntime, Property, Protocol, Sel,
    UncaughtExceptionHandler,
};
use class::{malloc_list, SimClass, SimIvar, SimMethod, SimProperty, SimProtocol};
use object::{class_of, ObjectRecord, Payload};
use parking_lot::{Mutex, RwLock};
use std::cell::Cell;
use std::collections::HashMap;
use std::ffi::{c_char, c_void, CStr, CString};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::ThreadId;

thread_local! {
    static THREAD_MESSAGES: Cell<u64> = const { Cell::new(0) };
}

/// Messages delivered through simulated send entry points on this thread
///
/// Counts across every simulated runtime.
pub fn messages_on_this_thread() -> u64 {
    THREAD_MESSAGES.with(Cell::get)
}

pub(crate) struct SimState {
    /// Every allocated class, registered or not
    classes: RwLock<HashMap<String, &'static SimClass>>,
    /// A selector is the address of its leaked name
    selectors: Mutex<HashMap<String, &'static CStr>>,
    protocols: Mutex<HashMap<String, &'static SimProtocol>>,
    objects: Mutex<HashMap<usize, ObjectRecord>>,
    pools: Mutex<HashMap<ThreadId, Vec<Vec<usize>>>>,
    entries: Mutex<HashMap<(SendKind, String), usize>>,
    handler: Mutex<Option<UncaughtExceptionHandler>>,
    singletons: Mutex<HashMap<&'static str, usize>>,
    messages: AtomicU64,
}

impl SimState {
    fn new() -> Self {
        Self {
            classes: RwLock::new(HashMap::new()),
            selectors: Mutex::new(HashMap::new()),
            protocols: Mutex::new(HashMap::new()),
            objects: Mutex::new(HashMap::new()),
            pools: Mutex::new(HashMap::new()),
            entries: Mutex::new(HashMap::new()),
            handler: Mutex::new(None),
            singletons: Mutex::new(HashMap::new()),
            messages: AtomicU64::new(0),
        }
    }

    pub(crate) fn intern(&self, name: &str) -> Sel {
        let mut selectors = self.selectors.lock();
        if let Some(existing) = selectors.get(name) {
            return existing.as_ptr() as Sel;
        }
        let leaked: &'static CStr = match CString::new(name) {
            Ok(cname) => Box::leak(cname.into_boxed_c_str()),
            Err(_) => return std::ptr::null(),
        };
        selectors.insert(name.to_string(), leaked);
        leaked.as_ptr() as Sel
    }

    pub(crate) fn protocol(&'static self, name: &str) -> &'static SimProtocol {
        let mut protocols = self.protocols.lock();
        if let Some(existing) = protocols.get(name) {
            return existing;
        }
        let protocol: &'static SimProtocol = Box::leak(Box::new(SimProtocol {
            name: CString::new(name).unwrap_or_default(),
        }));
        protocols.insert(name.to_string(), protocol);
        protocol
    }

    pub(crate) fn registered_class(&self, name: &str) -> Option<&'static SimClass> {
        self.classes
            .read()
            .get(name)
            .copied()
            .filter(|class| class.is_registered())
    }

    /// Class and metaclass, unregistered; `None` if the name is taken
    pub(crate) fn allocate_pair(
        &'static self,
        superclass: Option<&'static SimClass>,
        name: &str,
    ) -> Option<&'static SimClass> {
        let cname = CString::new(name).ok()?;
        let mut classes = self.classes.write();
        if classes.contains_key(name) {
            return None;
        }

        let base_size = superclass.map_or(0, |s| s.instance_size.load(Ordering::Acquire));
        let cls = SimClass::allocate(self, cname.clone(), false, base_size);
        let meta = SimClass::allocate(self, cname, true, 0);
        unsafe {
            match superclass {
                Some(parent) => {
                    let parent_meta = parent.isa;
                    (*meta).isa = (*parent_meta).isa;
                    (*meta).superclass = parent_meta;
                    (*cls).superclass = parent;
                }
                None => {
                    (*meta).isa = meta;
                    (*meta).superclass = cls;
                }
            }
            (*cls).isa = meta;
            let cls: &'static SimClass = &*cls;
            classes.insert(name.to_string(), cls);
            trace!(class = %name, "sim class allocated");
            Some(cls)
        }
    }

    pub(crate) fn register(&self, class: &SimClass) {
        class.registered.store(true, Ordering::Release);
        if let Some(meta) = unsafe { class.isa.as_ref() } {
            meta.registered.store(true, Ordering::Release);
        }
    }

    /// Send a no-argument, no-result message
    pub(crate) unsafe fn send_void(&self, obj: Id, name: &str) {
        if let Some(imp) = self.lookup(obj, name) {
            let f: unsafe extern "C" fn(Id, Sel) = std::mem::transmute(imp);
            f(obj, self.intern(name));
        }
    }

    /// Send a no-argument message returning an object
    pub(crate) unsafe fn send_id(&self, obj: Id, name: &str) -> Id {
        match self.lookup(obj, name) {
            Some(imp) => {
                let f: unsafe extern "C" fn(Id, Sel) -> Id = std::mem::transmute(imp);
                f(obj, self.intern(name))
            }
            None => std::ptr::null_mut(),
        }
    }

    unsafe fn lookup(&self, obj: Id, name: &str) -> Option<Imp> {
        let class: &'static SimClass = class_of(obj).as_ref()?;
        class.lookup_imp(self.intern(name))
    }

    /// Create an exception and hand it to the installed handler
    ///
    /// Unlike the system runtime, the process keeps running afterwards;
    /// the message that raised returns a zero result.
    pub(crate) fn raise(&'static self, name: &str, reason: &str) {
        let exception = self.new_exception(name, reason);
        unsafe { self.raise_object(exception) };
        self.release(exception);
    }

    pub(crate) unsafe fn raise_object(&self, exception: Id) {
        let handler = *self.handler.lock();
        match handler {
            Some(handler) => handler(exception),
            None => error!("Simulated exception raised with no handler installed"),
        }
    }

    fn new_exception(&'static self, name: &str, reason: &str) -> Id {
        let name = self.new_string(name);
        let reason = self.new_string(reason);
        let exception = match self.registered_class("NSException") {
            Some(class) => self.alloc_instance(class),
            None => return std::ptr::null_mut(),
        };
        self.set_payload(
            exception,
            Payload::Exception {
                name: name as usize,
                reason: reason as usize,
            },
        );
        exception
    }

    /// Owned string instance
    pub(crate) fn new_string(&'static self, text: &str) -> Id {
        let obj = match self.registered_class("NSString") {
            Some(class) => self.alloc_instance(class),
            None => return std::ptr::null_mut(),
        };
        let text = CString::new(text.replace('\0', "")).unwrap_or_default();
        self.set_payload(obj, Payload::Str(text));
        obj
    }

    pub(crate) fn singleton(&self, key: &'static str, make: impl FnOnce() -> Id) -> Id {
        let mut singletons = self.singletons.lock();
        if let Some(existing) = singletons.get(key) {
            return *existing as Id;
        }
        let obj = make();
        self.make_immortal(obj);
        singletons.insert(key, obj as usize);
        obj
    }
}

/// Handle to one simulated runtime
///
/// Clones share the same runtime, so a test can keep a handle after giving
/// one to a bridge.
#[derive(Clone, Copy)]
pub struct SimRuntime {
    state: &'static SimState,
}

impl SimRuntime {
    pub fn new() -> Self {
        let state: &'static SimState = Box::leak(Box::new(SimState::new()));
        foundation::seed(state);
        debug!(classes = state.classes.read().len(), "Simulated runtime seeded");
        Self { state }
    }

    /// Raise `name` as if a native method had thrown it
    pub fn raise(&self, name: &str, reason: &str) {
        self.state.raise(name, reason)
    }

    /// Allocate an instance of a registered class without sending any
    /// message; the caller owns the returned reference
    pub fn new_object(&self, class: &str) -> Option<usize> {
        let class = self.state.registered_class(class)?;
        Some(self.state.alloc_instance(class) as usize)
    }

    /// Objects allocated and not yet deallocated
    pub fn live_objects(&self) -> usize {
        self.state.live_object_count()
    }

    /// Messages delivered through send entry points, all threads
    pub fn messages_sent(&self) -> u64 {
        self.state.messages.load(Ordering::Relaxed)
    }

    /// Whether `address` is a live object
    pub fn is_live(&self, address: usize) -> bool {
        self.state.objects.lock().contains_key(&address)
    }
}

impl Default for SimRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SimRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimRuntime")
            .field("live_objects", &self.live_objects())
            .field("messages_sent", &self.messages_sent())
            .finish()
    }
}

#[inline]
unsafe fn class_ref(cls: Class) -> Option<&'static SimClass> {
    (cls as *const SimClass).as_ref()
}

#[inline]
fn name_ptr(name: &CString) -> *const c_char {
    name.as_ptr()
}

impl ObjcRuntime for SimRuntime {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn get_class(&self, name: &CStr) -> Class {
        name.to_str()
            .ok()
            .and_then(|name| self.state.registered_class(name))
            .map_or(std::ptr::null_mut(), |class| class as *const SimClass as Class)
    }

    fn get_meta_class(&self, name: &CStr) -> Class {
        name.to_str()
            .ok()
            .and_then(|name| self.state.registered_class(name))
            .map_or(std::ptr::null_mut(), |class| class.isa as Class)
    }

    fn get_protocol(&self, name: &CStr) -> Protocol {
        let protocols = self.state.protocols.lock();
        name.to_str()
            .ok()
            .and_then(|name| protocols.get(name))
            .map_or(std::ptr::null_mut(), |p| *p as *const SimProtocol as Protocol)
    }

    fn register_selector(&self, name: &CStr) -> Sel {
        match name.to_str() {
            Ok(name) => self.state.intern(name),
            Err(_) => std::ptr::null(),
        }
    }

    unsafe fn selector_name(&self, sel: Sel) -> *const c_char {
        sel as *const c_char
    }

    unsafe fn class_name(&self, cls: Class) -> *const c_char {
        class_ref(cls).map_or(std::ptr::null(), |c| name_ptr(&c.name))
    }

    unsafe fn superclass(&self, cls: Class) -> Class {
        class_ref(cls).map_or(std::ptr::null_mut(), |c| c.superclass as Class)
    }

    unsafe fn is_meta_class(&self, cls: Class) -> bool {
        class_ref(cls).map_or(false, |c| c.meta)
    }

    unsafe fn instance_method(&self, cls: Class, sel: Sel) -> Method {
        class_ref(cls)
            .and_then(|c| c.find_method(sel))
            .map_or(std::ptr::null_mut(), |m| m as *const SimMethod as Method)
    }

    unsafe fn class_method(&self, cls: Class, sel: Sel) -> Method {
        let meta = class_ref(cls).map_or(std::ptr::null_mut(), |c| c.isa as Class);
        self.instance_method(meta, sel)
    }

    unsafe fn responds_to_selector(&self, cls: Class, sel: Sel) -> bool {
        class_ref(cls).map_or(false, |c| c.find_method(sel).is_some())
    }

    unsafe fn instance_variable(&self, cls: Class, name: &CStr) -> Ivar {
        class_ref(cls)
            .and_then(|c| c.find_ivar(name))
            .map_or(std::ptr::null_mut(), |i| i as *const SimIvar as Ivar)
    }

    unsafe fn instance_size(&self, cls: Class) -> usize {
        class_ref(cls).map_or(0, |c| c.instance_size.load(Ordering::Acquire))
    }

    unsafe fn copy_method_list(&self, cls: Class, count: &mut u32) -> *mut Method {
        let items: Vec<Method> = class_ref(cls).map_or_else(Vec::new, |c| {
            c.methods
                .read()
                .iter()
                .map(|m| *m as *const SimMethod as Method)
                .collect()
        });
        malloc_list(&items, count)
    }

    unsafe fn copy_ivar_list(&self, cls: Class, count: &mut u32) -> *mut Ivar {
        let items: Vec<Ivar> = class_ref(cls).map_or_else(Vec::new, |c| {
            c.ivars.read().iter().map(|i| *i as *const SimIvar as Ivar).collect()
        });
        malloc_list(&items, count)
    }

    unsafe fn copy_property_list(&self, cls: Class, count: &mut u32) -> *mut Property {
        let items: Vec<Property> = class_ref(cls).map_or_else(Vec::new, |c| {
            c.properties
                .read()
                .iter()
                .map(|p| *p as *const SimProperty as Property)
                .collect()
        });
        malloc_list(&items, count)
    }

    unsafe fn copy_protocol_list(&self, cls: Class, count: &mut u32) -> *mut Protocol {
        let items: Vec<Protocol> = class_ref(cls).map_or_else(Vec::new, |c| {
            c.protocols
                .read()
                .iter()
                .map(|p| *p as *const SimProtocol as Protocol)
                .collect()
        });
        malloc_list(&items, count)
    }

    unsafe fn allocate_class_pair(&self, superclass: Class, name: &CStr, extra_bytes: usize) -> Class {
        let Ok(name) = name.to_str() else {
            return std::ptr::null_mut();
        };
        match self.state.allocate_pair(class_ref(superclass), name) {
            Some(class) => {
                class.instance_size.fetch_add(extra_bytes, Ordering::AcqRel);
                class as *const SimClass as Class
            }
            None => std::ptr::null_mut(),
        }
    }

    unsafe fn register_class_pair(&self, cls: Class) {
        if let Some(class) = class_ref(cls) {
            self.state.register(class);
        }
    }

    unsafe fn add_method(&self, cls: Class, sel: Sel, imp: Imp, types: &CStr) -> bool {
        class_ref(cls).map_or(false, |c| c.add_method(sel, imp, types.to_owned()))
    }

    unsafe fn replace_method(&self, cls: Class, sel: Sel, imp: Imp, types: &CStr) -> Imp {
        class_ref(cls).map_or(std::ptr::null(), |c| c.replace_method(sel, imp, types.to_owned()))
    }

    unsafe fn add_ivar(&self, cls: Class, name: &CStr, size: usize, align_log2: u8, types: &CStr) -> bool {
        class_ref(cls).map_or(false, |c| {
            c.add_ivar(name.to_owned(), size, align_log2, types.to_owned())
        })
    }

    unsafe fn add_protocol(&self, cls: Class, protocol: Protocol) -> bool {
        match (class_ref(cls), (protocol as *const SimProtocol).as_ref()) {
            (Some(class), Some(protocol)) => class.add_protocol(protocol),
            _ => false,
        }
    }

    unsafe fn object_class(&self, obj: Id) -> Class {
        class_of(obj) as Class
    }

    unsafe fn method_name(&self, method: Method) -> Sel {
        (method as *const SimMethod)
            .as_ref()
            .map_or(std::ptr::null(), |m| m.sel as Sel)
    }

    unsafe fn method_type_encoding(&self, method: Method) -> *const c_char {
        (method as *const SimMethod)
            .as_ref()
            .map_or(std::ptr::null(), |m| name_ptr(&m.types))
    }

    unsafe fn method_implementation(&self, method: Method) -> Imp {
        (method as *const SimMethod)
            .as_ref()
            .map_or(std::ptr::null(), |m| m.imp.load(Ordering::Acquire) as Imp)
    }

    unsafe fn ivar_name(&self, ivar: Ivar) -> *const c_char {
        (ivar as *const SimIvar)
            .as_ref()
            .map_or(std::ptr::null(), |i| name_ptr(&i.name))
    }

    unsafe fn ivar_type_encoding(&self, ivar: Ivar) -> *const c_char {
        (ivar as *const SimIvar)
            .as_ref()
            .map_or(std::ptr::null(), |i| name_ptr(&i.types))
    }

    unsafe fn ivar_offset(&self, ivar: Ivar) -> isize {
        (ivar as *const SimIvar).as_ref().map_or(0, |i| i.offset)
    }

    unsafe fn property_name(&self, property: Property) -> *const c_char {
        (property as *const SimProperty)
            .as_ref()
            .map_or(std::ptr::null(), |p| name_ptr(&p.name))
    }

    unsafe fn property_attributes(&self, property: Property) -> *const c_char {
        (property as *const SimProperty)
            .as_ref()
            .map_or(std::ptr::null(), |p| name_ptr(&p.attributes))
    }

    unsafe fn protocol_name(&self, protocol: Protocol) -> *const c_char {
        (protocol as *const SimProtocol)
            .as_ref()
            .map_or(std::ptr::null(), |p| name_ptr(&p.name))
    }

    unsafe fn set_associated_object(&self, obj: Id, key: *const c_void, value: Id, policy: AssociationPolicy) {
        self.state.set_association(obj, key, value, policy)
    }

    unsafe fn get_associated_object(&self, obj: Id, key: *const c_void) -> Id {
        self.state.association(obj, key)
    }

    fn autorelease_pool_push(&self) -> *mut c_void {
        self.state.push_pool()
    }

    unsafe fn autorelease_pool_pop(&self, pool: *mut c_void) {
        self.state.pop_pool(pool)
    }

    unsafe fn retain_count(&self, obj: Id) -> usize {
        self.state.retain_count_of(obj)
    }

    fn set_uncaught_exception_handler(&self, handler: Option<UncaughtExceptionHandler>) {
        *self.state.handler.lock() = handler;
    }

    fn send_entry(&self, kind: SendKind, signature: &MethodSignature) -> Result<Imp> {
        let key = (kind, signature.canonical().to_string());
        let mut entries = self.state.entries.lock();
        if let Some(entry) = entries.get(&key) {
            return Ok(*entry as Imp);
        }
        let entry = send::build_entry(self.state, kind, signature);
        entries.insert(key, entry as usize);
        Ok(entry)
    }
}

#[inline]
fn count_message(state: &SimState) {
    state.messages.fetch_add(1, Ordering::Relaxed);
    THREAD_MESSAGES.with(|count| count.set(count.get() + 1));
}

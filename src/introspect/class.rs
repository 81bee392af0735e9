//! Class handles, method handles and the class registry

use super::iter::{InheritanceIter, IvarInfo, IvarIter, MethodIter, PropertyIter, ProtocolIter};
use super::selector::Selector;
use crate::bridge::Bridge;
use crate::codec::MethodSignature;
use crate::error::{BridgeError, LookupKind, Result};
use crate::logging::{trace, warn};
use crate::runtime::{c_string, Class, Imp, Method};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::ffi::CString;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A runtime class (or metaclass)
///
/// Cheap to clone. Handles are created once per class pointer and kept by
/// the bridge for its whole lifetime.
#[derive(Clone)]
pub struct ClassHandle(Arc<ClassInner>);

struct ClassInner {
    bridge: &'static Bridge,
    ptr: usize,
    name: String,
    is_meta: bool,
    instance_methods: DashMap<String, MethodHandle>,
    class_methods: DashMap<String, MethodHandle>,
}

/// A resolved method: selector, implementation and signature
#[derive(Clone)]
pub struct MethodHandle(Arc<MethodInner>);

struct MethodInner {
    selector: Selector,
    method: usize,
    imp: usize,
    encoding: String,
    signature: Arc<MethodSignature>,
}

impl MethodHandle {
    #[inline]
    pub fn selector(&self) -> &Selector {
        &self.0.selector
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.0.selector.name()
    }

    #[inline]
    pub fn implementation(&self) -> Imp {
        self.0.imp as Imp
    }

    #[inline]
    pub(crate) fn method_ptr(&self) -> Method {
        self.0.method as Method
    }

    /// Encoding as reported by the runtime
    #[inline]
    pub fn encoding(&self) -> &str {
        &self.0.encoding
    }

    #[inline]
    pub fn signature(&self) -> &Arc<MethodSignature> {
        &self.0.signature
    }
}

impl fmt::Debug for MethodHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodHandle")
            .field("selector", &self.name())
            .field("encoding", &self.encoding())
            .finish()
    }
}

impl ClassHandle {
    fn new(bridge: &'static Bridge, ptr: Class) -> Self {
        let runtime = bridge.runtime();
        let (name, is_meta) = unsafe {
            (
                c_string(runtime.class_name(ptr)).unwrap_or_default(),
                runtime.is_meta_class(ptr),
            )
        };
        Self(Arc::new(ClassInner {
            bridge,
            ptr: ptr as usize,
            name,
            is_meta,
            instance_methods: DashMap::new(),
            class_methods: DashMap::new(),
        }))
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    #[inline]
    pub fn as_ptr(&self) -> Class {
        self.0.ptr as Class
    }

    #[inline]
    pub fn is_meta(&self) -> bool {
        self.0.is_meta
    }

    #[inline]
    pub fn bridge(&self) -> &'static Bridge {
        self.0.bridge
    }

    pub fn superclass(&self) -> Option<ClassHandle> {
        let ptr = unsafe { self.bridge().runtime().superclass(self.as_ptr()) };
        self.bridge().class_for_ptr(ptr)
    }

    /// The class of this class object
    pub fn metaclass(&self) -> Option<ClassHandle> {
        let ptr = unsafe { self.bridge().runtime().object_class(self.as_ptr()) };
        self.bridge().class_for_ptr(ptr)
    }

    /// True if `other` is this class or one of its ancestors
    pub fn is_subclass_of(&self, other: &ClassHandle) -> bool {
        self.inheritance().any(|class| class == *other)
    }

    pub fn instance_size(&self) -> usize {
        unsafe { self.bridge().runtime().instance_size(self.as_ptr()) }
    }

    /// Whether instances respond to `selector` (inherited methods included)
    pub fn responds_to(&self, selector: &str) -> bool {
        match self.bridge().selector(selector) {
            Ok(sel) => unsafe {
                self.bridge()
                    .runtime()
                    .responds_to_selector(self.as_ptr(), sel.as_ptr())
            },
            Err(_) => false,
        }
    }

    /// Instance method, searching superclasses
    pub fn instance_method(&self, selector: &str) -> Option<MethodHandle> {
        self.resolve_instance_method(selector).ok().flatten()
    }

    /// Class method, searching superclasses
    pub fn class_method(&self, selector: &str) -> Option<MethodHandle> {
        self.resolve_class_method(selector).ok().flatten()
    }

    /// Like `instance_method`, but malformed encodings are errors
    pub(crate) fn resolve_instance_method(&self, selector: &str) -> Result<Option<MethodHandle>> {
        self.resolve(selector, false)
    }

    pub(crate) fn resolve_class_method(&self, selector: &str) -> Result<Option<MethodHandle>> {
        self.resolve(selector, true)
    }

    fn resolve(&self, selector: &str, class_side: bool) -> Result<Option<MethodHandle>> {
        let cache = if class_side {
            &self.0.class_methods
        } else {
            &self.0.instance_methods
        };
        if let Some(handle) = cache.get(selector) {
            return Ok(Some(handle.clone()));
        }

        let bridge = self.bridge();
        let sel = bridge.selector(selector)?;
        let runtime = bridge.runtime();
        let method = unsafe {
            if class_side {
                runtime.class_method(self.as_ptr(), sel.as_ptr())
            } else {
                runtime.instance_method(self.as_ptr(), sel.as_ptr())
            }
        };
        if method.is_null() {
            return Ok(None);
        }

        let handle = method_handle(bridge, sel, method)?;
        trace!(
            class = %self.name(),
            selector = %selector,
            encoding = %handle.encoding(),
            "Method resolved"
        );
        // Racing resolvers agree on the value; keep whichever landed first
        Ok(Some(
            cache
                .entry(selector.to_string())
                .or_insert(handle)
                .value()
                .clone(),
        ))
    }

    /// Drop cached method handles (after methods were added or replaced)
    pub(crate) fn invalidate_methods(&self) {
        self.0.instance_methods.clear();
        self.0.class_methods.clear();
    }

    /// Instance variable of this class or an ancestor
    pub fn ivar(&self, name: &str) -> Option<IvarInfo> {
        let cname = CString::new(name).ok()?;
        let runtime = self.bridge().runtime();
        unsafe {
            let ivar = runtime.instance_variable(self.as_ptr(), &cname);
            if ivar.is_null() {
                None
            } else {
                Some(IvarInfo::read(runtime, ivar))
            }
        }
    }

    /// Methods of this class whose names start with one of `prefixes`
    ///
    /// An empty prefix list matches everything. Every call re-queries the
    /// runtime.
    pub fn methods(&self, prefixes: &[&str]) -> MethodIter {
        MethodIter::new(self.bridge(), self.as_ptr(), prefixes)
    }

    pub fn ivars(&self) -> IvarIter {
        IvarIter::new(self.bridge(), self.as_ptr())
    }

    pub fn properties(&self) -> PropertyIter {
        PropertyIter::new(self.bridge(), self.as_ptr())
    }

    pub fn protocols(&self) -> ProtocolIter {
        ProtocolIter::new(self.bridge(), self.as_ptr())
    }

    /// This class, then each superclass up to the root
    pub fn inheritance(&self) -> InheritanceIter {
        InheritanceIter::new(self.clone())
    }
}

fn method_handle(bridge: &'static Bridge, selector: Selector, method: Method) -> Result<MethodHandle> {
    let runtime = bridge.runtime();
    let (encoding, imp) = unsafe {
        (
            c_string(runtime.method_type_encoding(method)),
            runtime.method_implementation(method),
        )
    };
    let encoding = encoding.ok_or_else(|| BridgeError::lookup(LookupKind::Method, selector.name()))?;
    let signature = MethodSignature::parse_shared(&encoding).map_err(|e| {
        warn!(selector = %selector, encoding = %encoding, error = %e, "Unusable method encoding");
        e
    })?;
    Ok(MethodHandle(Arc::new(MethodInner {
        selector,
        method: method as usize,
        imp: imp as usize,
        encoding,
        signature,
    })))
}

impl PartialEq for ClassHandle {
    fn eq(&self, other: &Self) -> bool {
        self.0.ptr == other.0.ptr
    }
}

impl Eq for ClassHandle {}

impl Hash for ClassHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.ptr.hash(state)
    }
}

impl fmt::Debug for ClassHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_meta() {
            write!(f, "ClassHandle(meta {})", self.name())
        } else {
            write!(f, "ClassHandle({})", self.name())
        }
    }
}

impl fmt::Display for ClassHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Class handles by name and by pointer
pub(crate) struct ClassRegistry {
    by_name: DashMap<String, ClassHandle>,
    by_ptr: DashMap<usize, ClassHandle>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self {
            by_name: DashMap::new(),
            by_ptr: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.by_ptr.len()
    }

    pub fn invalidate_methods(&self) {
        for handle in self.by_ptr.iter() {
            handle.invalidate_methods();
        }
    }
}

impl Bridge {
    /// Look up a class by name
    pub fn get_class(&'static self, name: &str) -> Option<ClassHandle> {
        if let Some(handle) = self.classes.by_name.get(name) {
            return Some(handle.clone());
        }
        let cname = CString::new(name).ok()?;
        let ptr = self.runtime().get_class(&cname);
        self.class_for_ptr(ptr)
    }

    /// Like `get_class`, for callers that need the class to exist
    pub fn require_class(&'static self, name: &str) -> Result<ClassHandle> {
        self.get_class(name)
            .ok_or_else(|| BridgeError::lookup(LookupKind::Class, name))
    }

    /// The metaclass of the named class
    pub fn get_metaclass(&'static self, name: &str) -> Option<ClassHandle> {
        let cname = CString::new(name).ok()?;
        let ptr = self.runtime().get_meta_class(&cname);
        self.class_for_ptr(ptr)
    }

    pub fn get_superclass(&'static self, class: &ClassHandle) -> Option<ClassHandle> {
        class.superclass()
    }

    /// Handle for a class pointer; `None` for null
    pub fn class_for_ptr(&'static self, ptr: Class) -> Option<ClassHandle> {
        if ptr.is_null() {
            return None;
        }
        if let Some(handle) = self.classes.by_ptr.get(&(ptr as usize)) {
            return Some(handle.clone());
        }

        let handle = match self.classes.by_ptr.entry(ptr as usize) {
            Entry::Occupied(existing) => existing.get().clone(),
            Entry::Vacant(slot) => slot.insert(ClassHandle::new(self, ptr)).value().clone(),
        };
        if !handle.is_meta() {
            self.classes
                .by_name
                .entry(handle.name().to_string())
                .or_insert_with(|| handle.clone());
        }
        Some(handle)
    }
}

//! Dynamic subclassing - runtime classes with host-implemented methods
//!
//! Design: a `Subclass` is a builder over an allocated but unregistered
//! class pair. Instance variables and protocols can only be added before
//! `register`; methods can be added at any time, to builders and to
//! registered classes alike. Every host method is reached through a
//! libffi trampoline with the method's C signature.
//!
//! Architecture:
//! - `mod.rs` - the builder, method installation, `MethodCall`
//! - `trampoline.rs` - closures that carry native calls into host code

mod trampoline;


pub use trampoline::HostMethod;
pub(crate) use trampoline::TrampolineCache;

use crate::bridge::Bridge;
use crate::codec::{split_one, to_native_type, MethodSignature};
use crate::error::{BridgeError, LookupKind, Result};
use crate::introspect::{ClassHandle, Selector};
use crate::lifecycle::Instance;
use crate::logging::{log_class_registered, log_method_added, perf};
use crate::runtime::Class;
use crate::value::Value;
use once_cell::sync::OnceCell;
use std::ffi::CString;
use std::fmt;

/// One native call into a host method
pub struct MethodCall {
    /// `self`; a class object for class methods
    pub receiver: Instance,
    pub selector: Selector,
    /// Explicit arguments, decoded by the method's signature
    pub args: Vec<Value>,
    /// Class the method was installed on
    pub class: ClassHandle,
}

impl MethodCall {
    #[inline]
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    #[inline]
    pub fn bridge(&self) -> &'static Bridge {
        self.class.bridge()
    }

    /// Call the superclass implementation of `selector` on the receiver
    pub fn send_super(&self, selector: &str, args: &[Value]) -> Result<Value> {
        self.bridge()
            .send_super(&self.receiver, &self.class, selector, args)
    }
}

impl fmt::Debug for MethodCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodCall")
            .field("receiver", &self.receiver)
            .field("selector", &self.selector)
            .field("args", &self.args)
            .field("class", &self.class)
            .finish()
    }
}

/// A class pair under construction
pub struct Subclass {
    bridge: &'static Bridge,
    ptr: usize,
    name: String,
    parent: ClassHandle,
    registered: OnceCell<ClassHandle>,
}

impl Subclass {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn parent(&self) -> &ClassHandle {
        &self.parent
    }

    #[inline]
    pub fn is_registered(&self) -> bool {
        self.registered.get().is_some()
    }

    #[inline]
    fn as_ptr(&self) -> Class {
        self.ptr as Class
    }

    /// Add an instance variable typed by `encoding`
    pub fn add_ivar(&self, name: &str, encoding: &str) -> Result<()> {
        if self.is_registered() {
            return Err(BridgeError::AlreadyRegistered {
                class: self.name.clone(),
            });
        }
        let ty = to_native_type(&split_one(encoding)?, None)?;
        let cname = c_name(name)?;
        let ctypes = c_name(encoding)?;
        let align_log2 = ty.align().trailing_zeros() as u8;
        let added = unsafe {
            self.bridge
                .runtime()
                .add_ivar(self.as_ptr(), &cname, ty.size(), align_log2, &ctypes)
        };
        if !added {
            return Err(BridgeError::runtime(format!(
                "cannot add instance variable {} to {}",
                name, self.name
            )));
        }
        Ok(())
    }

    /// Declare conformance to a named protocol
    pub fn add_protocol(&self, name: &str) -> Result<()> {
        if self.is_registered() {
            return Err(BridgeError::AlreadyRegistered {
                class: self.name.clone(),
            });
        }
        let protocol = self
            .bridge
            .get_protocol(name)
            .ok_or_else(|| BridgeError::lookup(LookupKind::Protocol, name))?;
        unsafe {
            self.bridge
                .runtime()
                .add_protocol(self.as_ptr(), protocol.as_ptr());
        }
        Ok(())
    }

    /// Add an instance method implemented by `f`
    pub fn add_method<F>(&self, selector: &str, encoding: &str, f: F) -> Result<()>
    where
        F: Fn(&MethodCall) -> Result<Value> + Send + Sync + 'static,
    {
        self.bridge
            .install(self.as_ptr(), &self.name, selector, encoding, Box::new(f))
    }

    /// Add a class method implemented by `f`
    pub fn add_class_method<F>(&self, selector: &str, encoding: &str, f: F) -> Result<()>
    where
        F: Fn(&MethodCall) -> Result<Value> + Send + Sync + 'static,
    {
        let meta = unsafe { self.bridge.runtime().object_class(self.as_ptr()) };
        self.bridge
            .install(meta, &self.name, selector, encoding, Box::new(f))
    }

    /// Register the class pair with the runtime
    ///
    /// Registering twice returns the same handle.
    pub fn register(&self) -> Result<ClassHandle> {
        self.registered
            .get_or_try_init(|| {
                let _timer = perf::track("register_class_pair");
                unsafe { self.bridge.runtime().register_class_pair(self.as_ptr()) };
                let handle = self
                    .bridge
                    .class_for_ptr(self.as_ptr())
                    .ok_or_else(|| BridgeError::lookup(LookupKind::Class, self.name.as_str()))?;
                log_class_registered(&self.name, self.parent.name());
                Ok(handle)
            })
            .cloned()
    }
}

impl fmt::Debug for Subclass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subclass")
            .field("name", &self.name)
            .field("parent", &self.parent.name())
            .field("registered", &self.is_registered())
            .finish()
    }
}

fn c_name(text: &str) -> Result<CString> {
    CString::new(text).map_err(|_| BridgeError::runtime(format!("interior NUL in {:?}", text)))
}

impl Bridge {
    /// Allocate a new class pair inheriting from `parent`
    ///
    /// Fails when the name is taken.
    pub fn create_subclass(&'static self, parent: &ClassHandle, name: &str) -> Result<Subclass> {
        let cname = c_name(name)?;
        if self.get_class(name).is_some() {
            return Err(BridgeError::runtime(format!("class {} already exists", name)));
        }
        let ptr = unsafe { self.runtime().allocate_class_pair(parent.as_ptr(), &cname, 0) };
        if ptr.is_null() {
            return Err(BridgeError::runtime(format!("cannot allocate class pair {}", name)));
        }
        Ok(Subclass {
            bridge: self,
            ptr: ptr as usize,
            name: name.to_string(),
            parent: parent.clone(),
            registered: OnceCell::new(),
        })
    }

    /// Add or replace an instance method on an existing class
    pub fn add_method<F>(&'static self, class: &ClassHandle, selector: &str, encoding: &str, f: F) -> Result<()>
    where
        F: Fn(&MethodCall) -> Result<Value> + Send + Sync + 'static,
    {
        self.install(class.as_ptr(), class.name(), selector, encoding, Box::new(f))
    }

    /// Add or replace a class method on an existing class
    pub fn add_class_method<F>(
        &'static self,
        class: &ClassHandle,
        selector: &str,
        encoding: &str,
        f: F,
    ) -> Result<()>
    where
        F: Fn(&MethodCall) -> Result<Value> + Send + Sync + 'static,
    {
        let meta = if class.is_meta() {
            class.clone()
        } else {
            class
                .metaclass()
                .ok_or_else(|| BridgeError::lookup(LookupKind::Class, format!("metaclass of {}", class)))?
        };
        self.install(meta.as_ptr(), class.name(), selector, encoding, Box::new(f))
    }

    fn install(
        &'static self,
        class: Class,
        class_name: &str,
        selector: &str,
        encoding: &str,
        handler: Box<HostMethod>,
    ) -> Result<()> {
        let sel = self.selector(selector)?;
        let signature = MethodSignature::parse_shared(encoding)?;
        if sel.arity() != signature.explicit_arg_count() {
            return Err(BridgeError::Argument {
                selector: selector.to_string(),
                expected: sel.arity(),
                found: signature.explicit_arg_count(),
                call_shape: signature.call_shape(),
            });
        }
        let types = c_name(signature.canonical())?;

        let imp = self
            .trampolines
            .build(self, class, sel.clone(), signature, handler);
        let runtime = self.runtime();
        unsafe {
            if !runtime.add_method(class, sel.as_ptr(), imp, &types) {
                runtime.replace_method(class, sel.as_ptr(), imp, &types);
            }
        }
        self.classes.invalidate_methods();
        log_method_added(class_name, selector, encoding);
        Ok(())
    }
}

//! Object wrappers

use crate::bridge::{Bridge, BridgeStats};
use crate::codec::{split_one, to_native_type};
use crate::dispatch::marshal::{read_value, write_value, Keepalive, MarshalError};
use crate::error::{BridgeError, LookupKind, Result};
use crate::introspect::ClassHandle;
use crate::logging::{log_wrap, warn};
use crate::runtime::Id;
use crate::value::Value;
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Host handle for a native object
///
/// Wrappers do not own a reference: the native object's lifetime is
/// managed with explicit `retain`/`release` or autorelease pools. Wrappers
/// obtained through `Bridge::wrap` are unique per live object, so two
/// handles for the same object compare equal and share state.
#[derive(Clone)]
pub struct Instance(Arc<InstanceInner>);

struct InstanceInner {
    address: usize,
    class: Option<ClassHandle>,
    alive: AtomicBool,
}

static NIL: Lazy<Instance> = Lazy::new(|| Instance::new(0, None));

impl Instance {
    pub(crate) fn new(address: usize, class: Option<ClassHandle>) -> Self {
        Self(Arc::new(InstanceInner {
            address,
            class,
            alive: AtomicBool::new(true),
        }))
    }

    /// The shared nil instance
    pub fn nil() -> Instance {
        NIL.clone()
    }

    /// Uncached wrapper, used where identity does not matter
    pub(crate) fn borrowed(bridge: &'static Bridge, address: usize) -> Instance {
        if address == 0 {
            return Self::nil();
        }
        let class = unsafe { bridge.runtime().object_class(address as Id) };
        Self::new(address, bridge.class_for_ptr(class))
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        self.0.address == 0
    }

    #[inline]
    pub fn address(&self) -> usize {
        self.0.address
    }

    #[inline]
    pub fn as_ptr(&self) -> Id {
        self.0.address as Id
    }

    /// Class of the object; a metaclass for class objects
    #[inline]
    pub fn class(&self) -> Option<&ClassHandle> {
        self.0.class.as_ref()
    }

    pub fn class_name(&self) -> &str {
        self.0.class.as_ref().map_or("nil", ClassHandle::name)
    }

    pub fn bridge(&self) -> Option<&'static Bridge> {
        self.0.class.as_ref().map(ClassHandle::bridge)
    }

    /// False once the native object has been deallocated
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.0.alive.load(Ordering::Acquire)
    }

    pub(crate) fn mark_dead(&self) {
        self.0.alive.store(false, Ordering::Release);
    }

    /// Same wrapper, not merely the same address
    #[inline]
    pub fn ptr_eq(a: &Instance, b: &Instance) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// `isKindOfClass:` on the host side
    pub fn is_kind_of(&self, class: &ClassHandle) -> bool {
        self.class().map_or(false, |own| own.is_subclass_of(class))
    }

    /// Read an instance variable
    pub fn get_ivar(&self, name: &str) -> Result<Value> {
        let (offset, ty, bridge) = self.ivar_slot(name)?;
        Ok(unsafe { read_value(bridge, &ty, (self.address() as *const u8).offset(offset)) })
    }

    /// Write an instance variable
    ///
    /// Plain assignment: objects are not retained. Values converted for the
    /// write (strings, numbers) are owned by the ivar and never released.
    pub fn set_ivar(&self, name: &str, value: &Value) -> Result<()> {
        let (offset, ty, bridge) = self.ivar_slot(name)?;
        let mut keep = Keepalive::new();
        let written = unsafe {
            write_value(bridge, &ty, value, (self.address() as *mut u8).offset(offset), &mut keep)
        };
        std::mem::forget(keep);
        written.map_err(|e| match e {
            MarshalError::Mismatch { expected, found } => BridgeError::Type {
                selector: format!("ivar {}", name),
                index: 0,
                expected,
                found,
                call_shape: ty.to_string(),
            },
            MarshalError::Failed(error) => error,
        })
    }

    fn ivar_slot(&self, name: &str) -> Result<(isize, crate::codec::NativeType, &'static Bridge)> {
        if !self.is_alive() {
            return Err(BridgeError::Deallocated {
                address: self.address(),
            });
        }
        let class = self
            .class()
            .ok_or_else(|| BridgeError::lookup(LookupKind::Ivar, name))?;
        let ivar = class
            .ivar(name)
            .ok_or_else(|| BridgeError::lookup(LookupKind::Ivar, format!("{}.{}", class.name(), name)))?;
        let ty = to_native_type(&split_one(&ivar.encoding)?, None)?;
        Ok((ivar.offset, ty, class.bridge()))
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.address() == other.address() && self.is_alive() && other.is_alive())
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nil() {
            return f.write_str("Instance(nil)");
        }
        write!(
            f,
            "Instance({} {:#x}{})",
            self.class_name(),
            self.address(),
            if self.is_alive() { "" } else { ", deallocated" }
        )
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nil() {
            f.write_str("nil")
        } else {
            write!(f, "<{}: {:#x}>", self.class_name(), self.address())
        }
    }
}

impl Bridge {
    /// The unique wrapper for the object at `address`
    ///
    /// The first wrap of an object attaches a deallocation observer so the
    /// wrapper is evicted (and marked dead) when the object goes away.
    /// Class objects are cached without an observer.
    pub fn wrap(&'static self, address: usize) -> Instance {
        if address == 0 {
            return Instance::nil();
        }
        if let Some(existing) = self.identity.get(address) {
            return existing;
        }

        let class_ptr = unsafe { self.runtime().object_class(address as Id) };
        let class = self.class_for_ptr(class_ptr);
        if let (Some(observer), Some(class)) = (self.observer.get(), class.as_ref()) {
            if observer.is_observer_class(class) {
                return Instance::new(address, Some(class.clone()));
            }
        }
        let is_class_object = class.as_ref().map_or(false, ClassHandle::is_meta);

        let (instance, created) = self.identity.get_or_insert(address, || Instance::new(address, class));
        if created {
            BridgeStats::bump(&self.stats.wrappers_created);
            log_wrap(address, instance.class_name());
            if !is_class_object {
                if let Err(e) = self.attach_observer(&instance) {
                    warn!(
                        address = address as u64,
                        error = %e,
                        "No deallocation observer; wrapper will not be evicted"
                    );
                }
            }
        }
        instance
    }

    /// Wrapper for `address` if one is cached
    pub fn cached_wrapper(&self, address: usize) -> Option<Instance> {
        self.identity.get(address)
    }

    /// Number of cached wrappers
    pub fn wrapper_count(&self) -> usize {
        self.identity.len()
    }
}

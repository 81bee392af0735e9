//! Message sends
//!
//! A send resolves the method on the receiver's class, checks the argument
//! count against the signature, marshals arguments into aligned slots,
//! picks the entry point for the return shape, calls it through libffi and
//! converts the result. Nothing reaches native code unless every argument
//! converted.

use super::abi::{call_interface, Arch, SendKind};
use super::marshal::{read_return, write_value, Keepalive, MarshalError, Slot};
use crate::bridge::{self, Bridge, BridgeStats};
use crate::codec::MethodSignature;
use crate::error::{BridgeError, LookupKind, Result};
use crate::introspect::{host_selector_name, ClassHandle, MethodHandle, Selector};
use crate::lifecycle::Instance;
use crate::logging::{log_dispatch, log_dispatch_error, trace, warn};
use crate::runtime::{Id, Imp, ObjcSuper};
use crate::value::Value;
use dashmap::DashMap;
use libffi::middle::Cif;
use libffi::raw;
use smallvec::SmallVec;
use std::ffi::c_void;
use std::fmt;
use std::sync::Arc;

/// A call interface and entry point for one `(kind, signature)`
pub(crate) struct PreparedCall {
    cif: Cif,
    entry: Imp,
}

// Immutable after construction; libffi only reads the interface
unsafe impl Send for PreparedCall {}
unsafe impl Sync for PreparedCall {}

/// Prepared calls keyed by entry kind and canonical signature
pub(crate) struct CallCache {
    prepared: DashMap<(SendKind, String), Arc<PreparedCall>>,
}

impl CallCache {
    pub fn new() -> Self {
        Self {
            prepared: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.prepared.len()
    }

    fn get(&self, bridge: &'static Bridge, kind: SendKind, signature: &MethodSignature) -> Result<Arc<PreparedCall>> {
        let key = (kind, signature.canonical().to_string());
        if let Some(prepared) = self.prepared.get(&key) {
            return Ok(Arc::clone(prepared.value()));
        }
        let entry = bridge.runtime().send_entry(kind, signature)?;
        let prepared = Arc::new(PreparedCall {
            cif: call_interface(kind, signature),
            entry,
        });
        trace!(kind = ?kind, signature = %signature, "Call interface prepared");
        Ok(Arc::clone(self.prepared.entry(key).or_insert(prepared).value()))
    }
}

/// Where method lookup starts for a send
#[derive(Clone, Copy)]
enum Lookup {
    /// Normal send: the receiver's own class
    Receiver,
    /// Super send: this class (the superclass of the defining class)
    Super(usize),
}

/// A method resolved for a receiver, ready to call
///
/// Transient: holds the receiver and the method handle, nothing native.
#[derive(Clone)]
pub struct BoundMethod {
    bridge: &'static Bridge,
    receiver: usize,
    method: MethodHandle,
    lookup: Lookup,
    class_side: bool,
    class_name: String,
}

impl BoundMethod {
    #[inline]
    pub fn selector(&self) -> &Selector {
        self.method.selector()
    }

    #[inline]
    pub fn signature(&self) -> &Arc<MethodSignature> {
        self.method.signature()
    }

    #[inline]
    pub fn receiver(&self) -> usize {
        self.receiver
    }

    pub fn call(&self, args: &[Value]) -> Result<Value> {
        self.bridge.invoke(
            self.receiver,
            self.method.selector(),
            self.method.signature(),
            self.lookup,
            args,
        )
    }
}

impl fmt::Debug for BoundMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = if self.class_side { '+' } else { '-' };
        write!(
            f,
            "BoundMethod({}[{} {}] {:#x})",
            side,
            self.class_name,
            self.selector(),
            self.receiver
        )
    }
}

fn missing_method(class: &ClassHandle, selector: &str, class_side: bool) -> BridgeError {
    let side = if class_side { '+' } else { '-' };
    BridgeError::lookup(LookupKind::Method, format!("{}[{} {}]", side, class.name(), selector))
}

impl Instance {
    /// Resolve `selector` on this object's class
    pub fn method(&self, selector: &str) -> Result<BoundMethod> {
        let class = self.checked_class()?;
        let method = class
            .resolve_instance_method(selector)?
            .ok_or_else(|| missing_method(class, selector, class.is_meta()))?;
        Ok(BoundMethod {
            bridge: class.bridge(),
            receiver: self.address(),
            method,
            lookup: Lookup::Receiver,
            class_side: class.is_meta(),
            class_name: class.name().to_string(),
        })
    }

    /// Send `selector` with `args`
    ///
    /// Sends to nil return `Value::Nil` without touching the runtime.
    pub fn send(&self, selector: &str, args: &[Value]) -> Result<Value> {
        if self.is_nil() {
            return Ok(Value::Nil);
        }
        self.method(selector)?.call(args)
    }

    /// Send using a host-style name (`initWithFrame_` for `initWithFrame:`)
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        self.send(&host_selector_name(name), args)
    }

    /// Send with an explicit type encoding instead of the runtime's
    ///
    /// For methods without metadata, such as those handled by message
    /// forwarding.
    pub fn send_with_signature(&self, selector: &str, encoding: &str, args: &[Value]) -> Result<Value> {
        if self.is_nil() {
            return Ok(Value::Nil);
        }
        let class = self.checked_class()?;
        let bridge = class.bridge();
        let sel = bridge.selector(selector)?;
        let signature = MethodSignature::parse_shared(encoding)?;
        bridge.invoke(self.address(), &sel, &signature, Lookup::Receiver, args)
    }

    fn checked_class(&self) -> Result<&ClassHandle> {
        if !self.is_alive() {
            return Err(BridgeError::Deallocated {
                address: self.address(),
            });
        }
        self.class()
            .ok_or_else(|| BridgeError::lookup(LookupKind::Class, format!("class of {:#x}", self.address())))
    }
}

impl ClassHandle {
    /// Send a class message (`+selector`)
    pub fn send(&self, selector: &str, args: &[Value]) -> Result<Value> {
        let method = self
            .resolve_class_method(selector)?
            .ok_or_else(|| missing_method(self, selector, true))?;
        self.bridge().invoke(
            self.as_ptr() as usize,
            method.selector(),
            method.signature(),
            Lookup::Receiver,
            args,
        )
    }

    /// Class message using a host-style name
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        self.send(&host_selector_name(name), args)
    }
}

impl Bridge {
    /// Send to the superclass implementation of `selector`
    ///
    /// `class` is the class whose implementation is running; lookup starts
    /// at its superclass, on the class side when `receiver` is a class
    /// object.
    pub fn send_super(
        &'static self,
        receiver: &Instance,
        class: &ClassHandle,
        selector: &str,
        args: &[Value],
    ) -> Result<Value> {
        if receiver.is_nil() {
            return Ok(Value::Nil);
        }
        let receiver_class = receiver.checked_class()?;
        let class_side = receiver_class.is_meta();
        let defining = if class_side && !class.is_meta() {
            class
                .metaclass()
                .ok_or_else(|| BridgeError::lookup(LookupKind::Class, format!("metaclass of {}", class)))?
        } else {
            class.clone()
        };
        let start = defining
            .superclass()
            .ok_or_else(|| BridgeError::lookup(LookupKind::Class, format!("superclass of {}", defining)))?;
        let method = start
            .resolve_instance_method(selector)?
            .ok_or_else(|| missing_method(&start, selector, class_side))?;
        self.invoke(
            receiver.address(),
            method.selector(),
            method.signature(),
            Lookup::Super(start.as_ptr() as usize),
            args,
        )
    }

    fn invoke(
        &'static self,
        receiver: usize,
        selector: &Selector,
        signature: &Arc<MethodSignature>,
        lookup: Lookup,
        args: &[Value],
    ) -> Result<Value> {
        let expected = signature.explicit_arg_count();
        if args.len() != expected {
            let error = BridgeError::Argument {
                selector: selector.name().to_string(),
                expected,
                found: args.len(),
                call_shape: signature.call_shape(),
            };
            BridgeStats::bump(&self.stats.argument_errors);
            log_dispatch_error(selector.name(), &error.to_string());
            return Err(error);
        }

        let mut kind = SendKind::classify(signature.native_return(), Arch::current());
        if let Lookup::Super(_) = lookup {
            kind = kind.to_super();
        }
        let prepared = self.calls.get(self, kind, signature)?;

        // Hidden arguments
        let mut sup = ObjcSuper {
            receiver: receiver as Id,
            super_class: match lookup {
                Lookup::Super(class) => class as Id,
                Lookup::Receiver => std::ptr::null_mut(),
            },
        };
        let mut self_slot: usize = if kind.is_super() {
            &mut sup as *mut ObjcSuper as usize
        } else {
            receiver
        };
        let mut sel_slot = selector.as_ptr();

        // Explicit arguments
        let mut keep = Keepalive::new();
        let natives = &signature.native_args()[crate::codec::HIDDEN_ARGS..];
        let mut slots: SmallVec<[Slot; 6]> = SmallVec::with_capacity(args.len());
        for (index, (ty, value)) in natives.iter().zip(args).enumerate() {
            let mut slot = Slot::new(ty.size());
            if let Err(e) = unsafe { write_value(self, ty, value, slot.as_mut_ptr(), &mut keep) } {
                keep.release(self);
                let error = match e {
                    MarshalError::Mismatch { expected, found } => BridgeError::Type {
                        selector: selector.name().to_string(),
                        index,
                        expected,
                        found,
                        call_shape: signature.call_shape(),
                    },
                    MarshalError::Failed(error) => error,
                };
                BridgeStats::bump(&self.stats.argument_errors);
                log_dispatch_error(selector.name(), &error.to_string());
                return Err(error);
            }
            slots.push(slot);
        }

        let mut ret = Slot::new(signature.native_return().size());
        let mut ret_ptr = ret.as_mut_ptr() as *mut c_void;
        let mut arg_ptrs: SmallVec<[*mut c_void; 9]> = SmallVec::with_capacity(args.len() + 3);
        if kind.is_stret() {
            arg_ptrs.push(&mut ret_ptr as *mut *mut c_void as *mut c_void);
        }
        arg_ptrs.push(&mut self_slot as *mut usize as *mut c_void);
        arg_ptrs.push(&mut sel_slot as *mut _ as *mut c_void);
        arg_ptrs.extend(slots.iter_mut().map(|slot| slot.as_mut_ptr() as *mut c_void));

        BridgeStats::bump(&self.stats.messages_sent);
        log_dispatch(selector.name(), receiver, args.len());
        let nested = bridge::active_bridge().is_some();
        let outer_pending = {
            // A callback further up this thread may have recorded an error;
            // keep it for the outer call
            let outer = if nested {
                bridge::take_pending()
            } else {
                if let Some(stale) = bridge::take_pending() {
                    warn!(error = %stale, "Discarding error left over from an earlier call");
                }
                None
            };
            let _active = bridge::enter(self, selector);
            unsafe {
                raw::ffi_call(
                    prepared.cif.as_raw_ptr(),
                    Some(std::mem::transmute::<Imp, unsafe extern "C" fn()>(prepared.entry)),
                    if kind.is_stret() {
                        std::ptr::null_mut()
                    } else {
                        ret_ptr
                    },
                    arg_ptrs.as_mut_ptr(),
                );
            }
            outer
        };
        let pending = bridge::take_pending();
        if let Some(outer) = outer_pending {
            bridge::record_pending(outer);
        }
        {
            let _scope = bridge::enter_native(self);
            keep.release(self);
        }
        if let Some(error) = pending {
            log_dispatch_error(selector.name(), &error.to_string());
            return Err(error);
        }
        Ok(unsafe { read_return(self, signature.native_return(), ret.as_ptr()) })
    }
}

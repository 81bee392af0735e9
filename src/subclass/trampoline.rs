//! Native-callable trampolines for host method implementations
//!
//! Each installed method gets a libffi closure with the method's plain C
//! signature. When native code calls it, the closure wraps the receiver,
//! decodes the explicit arguments, runs the host function and encodes its
//! result. Failures never unwind into native frames: they are logged,
//! parked as the thread's pending error and a zero result is returned.

use super::MethodCall;
use crate::bridge::{self, Bridge, BridgeStats};
use crate::codec::{MethodSignature, HIDDEN_ARGS};
use crate::dispatch::implementation_interface;
use crate::dispatch::marshal::{read_value, write_return, MarshalError};
use crate::error::{BridgeError, LookupKind, Result};
use crate::introspect::Selector;
use crate::logging::{log_callback_error, trace};
use crate::runtime::{Class, Id, Imp};
use crate::value::Value;
use dashmap::DashMap;
use libffi::low;
use libffi::middle::{Cif, Closure};
use std::any::Any;
use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Host function behind an installed method
pub type HostMethod = dyn Fn(&MethodCall) -> Result<Value> + Send + Sync + 'static;

/// Call interfaces are shared between trampolines with the same signature
struct SharedCif(Cif);

// Immutable after construction; libffi only reads the interface
unsafe impl Send for SharedCif {}
unsafe impl Sync for SharedCif {}

pub(crate) struct TrampolineCache {
    interfaces: DashMap<String, Arc<SharedCif>>,
}

impl TrampolineCache {
    pub fn new() -> Self {
        Self {
            interfaces: DashMap::new(),
        }
    }

    pub fn interface_count(&self) -> usize {
        self.interfaces.len()
    }

    fn interface(&self, signature: &MethodSignature) -> Arc<SharedCif> {
        let key = signature.canonical().to_string();
        Arc::clone(
            self.interfaces
                .entry(key)
                .or_insert_with(|| Arc::new(SharedCif(implementation_interface(signature))))
                .value(),
        )
    }

    /// Build a trampoline for `handler` installed on `class`
    ///
    /// The closure and its data live for the rest of the process: the
    /// runtime may call the implementation at any time.
    pub fn build(
        &self,
        bridge: &'static Bridge,
        class: Class,
        selector: Selector,
        signature: Arc<MethodSignature>,
        handler: Box<HostMethod>,
    ) -> Imp {
        let cif = self.interface(&signature);
        let data: &'static Trampoline = Box::leak(Box::new(Trampoline {
            bridge,
            class: class as usize,
            selector,
            signature,
            handler,
        }));
        let closure = Closure::new(cif.0.clone(), invoke_host, data);
        let imp = *closure.code_ptr() as Imp;
        std::mem::forget(closure);
        BridgeStats::bump(&bridge.stats.trampolines_built);
        trace!(
            selector = %data.selector,
            signature = %data.signature,
            "Trampoline built"
        );
        imp
    }
}

struct Trampoline {
    bridge: &'static Bridge,
    /// Class the method was installed on (a metaclass for class methods)
    class: usize,
    selector: Selector,
    signature: Arc<MethodSignature>,
    handler: Box<HostMethod>,
}

unsafe extern "C" fn invoke_host(
    _cif: &low::ffi_cif,
    result: &mut c_void,
    args: *const *const c_void,
    data: &Trampoline,
) {
    let result = result as *mut c_void as *mut u8;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| run(data, args, result)));
    let error = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(error)) => error,
        Err(payload) => BridgeError::Callback {
            selector: data.selector.name().to_string(),
            message: format!("panicked: {}", panic_message(payload.as_ref())),
        },
    };

    log_callback_error(data.selector.name(), &error.to_string());
    let error = match error {
        callback @ BridgeError::Callback { .. } => callback,
        // Native exceptions raised by nested sends keep their identity
        native @ BridgeError::NativeException { .. } => native,
        other => BridgeError::Callback {
            selector: data.selector.name().to_string(),
            message: other.to_string(),
        },
    };
    bridge::record_pending(error);
    std::ptr::write_bytes(result, 0, data.signature.native_return().size().max(8));
}

unsafe fn run(data: &Trampoline, args: *const *const c_void, result: *mut u8) -> Result<()> {
    let bridge = data.bridge;
    let natives = data.signature.native_args();

    let receiver = *(*args as *const Id);
    let receiver = bridge.wrap(receiver as usize);
    let class = bridge
        .class_for_ptr(data.class as Class)
        .ok_or_else(|| BridgeError::lookup(LookupKind::Class, format!("{:#x}", data.class)))?;

    let explicit = natives[HIDDEN_ARGS..]
        .iter()
        .enumerate()
        .map(|(i, ty)| read_value(bridge, ty, *args.add(HIDDEN_ARGS + i) as *const u8))
        .collect();

    let call = MethodCall {
        receiver,
        selector: data.selector.clone(),
        args: explicit,
        class,
    };
    let value = (data.handler)(&call)?;

    let ret = data.signature.native_return();
    write_return(bridge, ret, &value, result).map_err(|e| match e {
        MarshalError::Mismatch { expected, found } => BridgeError::Type {
            selector: data.selector.name().to_string(),
            index: 0,
            expected: format!("return {}", expected),
            found,
            call_shape: data.signature.call_shape(),
        },
        MarshalError::Failed(error) => error,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

//! Simulated message-send entry points
//!
//! One libffi closure per `(kind, signature)`. The closure is entered with
//! the argument list the dispatch layer builds for that kind, looks the
//! implementation up and re-issues the call with the implementation's
//! plain C signature.

use super::class::SimClass;
use super::object::class_of;
use super::{count_message, SimState};
use crate::codec::MethodSignature;
use crate::dispatch::{implementation_interface, SendKind};
use crate::logging::trace;
use crate::runtime::{c_string, Id, Imp, ObjcSuper, Sel};
use libffi::low;
use libffi::middle::{Cif, Closure};
use libffi::raw;
use std::ffi::c_void;

struct Forwarder {
    state: &'static SimState,
    kind: SendKind,
    /// Interface of the implementation being forwarded to
    implementation: Cif,
    /// Argument count of the implementation, hidden arguments included
    argc: usize,
    /// Result size (the out-buffer size for stret kinds)
    result_size: usize,
}

// The interface is immutable after construction
unsafe impl Send for Forwarder {}
unsafe impl Sync for Forwarder {}

pub(super) fn build_entry(state: &'static SimState, kind: SendKind, signature: &MethodSignature) -> Imp {
    let forwarder: &'static Forwarder = Box::leak(Box::new(Forwarder {
        state,
        kind,
        implementation: implementation_interface(signature),
        argc: signature.native_args().len(),
        result_size: signature.native_return().size(),
    }));
    let closure = Closure::new(crate::dispatch::call_interface(kind, signature), forward, forwarder);
    let entry = *closure.code_ptr() as Imp;
    std::mem::forget(closure);
    trace!(kind = ?kind, signature = %signature, "sim send entry built");
    entry
}

unsafe extern "C" fn forward(
    _cif: &low::ffi_cif,
    result: &mut c_void,
    args: *const *const c_void,
    forwarder: &Forwarder,
) {
    let state = forwarder.state;
    count_message(state);

    let base = usize::from(forwarder.kind.is_stret());
    let out: *mut c_void = if forwarder.kind.is_stret() {
        *(*args as *const *mut c_void)
    } else {
        result as *mut c_void
    };

    let (receiver, start): (Id, *const SimClass) = if forwarder.kind.is_super() {
        let sup = *(*args.add(base) as *const *const ObjcSuper);
        match sup.as_ref() {
            Some(sup) => (sup.receiver, sup.super_class as *const SimClass),
            None => (std::ptr::null_mut(), std::ptr::null()),
        }
    } else {
        let receiver = *(*args.add(base) as *const Id);
        (receiver, class_of(receiver))
    };
    let sel = *(*args.add(base + 1) as *const Sel);

    if receiver.is_null() {
        zero(out, forwarder.result_size);
        return;
    }

    let imp = start.as_ref().and_then(|class| class.lookup_imp(sel));
    let Some(imp) = imp else {
        unrecognized(state, receiver, sel);
        zero(out, forwarder.result_size);
        return;
    };

    let mut forwarded: Vec<*mut c_void> = Vec::with_capacity(forwarder.argc);
    let mut receiver_slot = receiver;
    forwarded.push(&mut receiver_slot as *mut Id as *mut c_void);
    for i in 1..forwarder.argc {
        forwarded.push(*args.add(base + i) as *mut c_void);
    }

    raw::ffi_call(
        forwarder.implementation.as_raw_ptr(),
        Some(std::mem::transmute::<Imp, unsafe extern "C" fn()>(imp)),
        out,
        forwarded.as_mut_ptr(),
    );
}

/// Clear a result buffer so unanswered messages return zero
unsafe fn zero(out: *mut c_void, size: usize) {
    if !out.is_null() {
        std::ptr::write_bytes(out as *mut u8, 0, size.max(std::mem::size_of::<u64>()));
    }
}

unsafe fn unrecognized(state: &'static SimState, receiver: Id, sel: Sel) {
    let class = class_of(receiver);
    let (class_name, is_class) = match class.as_ref() {
        Some(class) => (class.name.to_string_lossy().into_owned(), class.meta),
        None => ("?".to_string(), false),
    };
    let selector = c_string(sel as *const std::ffi::c_char).unwrap_or_default();
    let reason = if is_class {
        format!("+[{} {}]: unrecognized selector sent to class {:#x}", class_name, selector, receiver as usize)
    } else {
        format!("-[{} {}]: unrecognized selector sent to instance {:#x}", class_name, selector, receiver as usize)
    };
    state.raise("NSInvalidArgumentException", &reason);
}

//! Simulated object memory: allocation, retain counts, associations,
//! autorelease pools
//!
//! Instances are zeroed C allocations with the class pointer in the first
//! word. Everything else about an object lives in a side table keyed by
//! address. No side-table lock is held while an implementation runs.

use super::class::SimClass;
use super::SimState;
use crate::logging::{trace, warn};
use crate::runtime::{AssociationPolicy, Id};
use std::ffi::{c_void, CString};
use std::thread::{self, ThreadId};

pub(crate) struct ObjectRecord {
    pub retain_count: usize,
    /// Singletons ignore retain and release
    pub immortal: bool,
    pub associations: Vec<Association>,
    pub payload: Payload,
}

pub(crate) struct Association {
    pub key: usize,
    pub value: usize,
    pub policy: AssociationPolicy,
}

/// Built-in class state
pub(crate) enum Payload {
    None,
    Str(CString),
    Number(Number),
    Array(Vec<usize>),
    Dict(Vec<(usize, usize)>),
    Set(Vec<usize>),
    Exception { name: usize, reason: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Number {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
}

impl Number {
    pub fn obj_c_type(self) -> &'static [u8] {
        match self {
            Number::Bool(_) => b"c\0",
            Number::Int(_) => b"q\0",
            Number::UInt(_) => b"Q\0",
            Number::Double(_) => b"d\0",
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Number::Bool(b) => i64::from(b),
            Number::Int(i) => i,
            Number::UInt(u) => u as i64,
            Number::Double(d) => d as i64,
        }
    }

    pub fn as_u64(self) -> u64 {
        match self {
            Number::Bool(b) => u64::from(b),
            Number::Int(i) => i as u64,
            Number::UInt(u) => u,
            Number::Double(d) => d as u64,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Number::Bool(b) => f64::from(u8::from(b)),
            Number::Int(i) => i as f64,
            Number::UInt(u) => u as f64,
            Number::Double(d) => d,
        }
    }
}

impl Payload {
    /// Objects this payload holds a reference to
    fn children(&self) -> Vec<usize> {
        match self {
            Payload::Array(items) | Payload::Set(items) => items.clone(),
            Payload::Dict(pairs) => pairs.iter().flat_map(|(k, v)| [*k, *v]).collect(),
            Payload::Exception { name, reason } => vec![*name, *reason],
            _ => Vec::new(),
        }
    }
}

/// Class pointer stored in an object's first word
#[inline]
pub(crate) unsafe fn class_of(obj: Id) -> *const SimClass {
    if obj.is_null() {
        std::ptr::null()
    } else {
        *(obj as *const *const SimClass)
    }
}

impl SimState {
    /// New instance with a retain count of one
    pub(crate) fn alloc_instance(&self, class: &SimClass) -> Id {
        let size = class
            .instance_size
            .load(std::sync::atomic::Ordering::Acquire)
            .max(std::mem::size_of::<usize>());
        unsafe {
            let obj = libc::calloc(1, size) as Id;
            if obj.is_null() {
                return obj;
            }
            *(obj as *mut *const SimClass) = class as *const SimClass;
            self.objects.lock().insert(
                obj as usize,
                ObjectRecord {
                    retain_count: 1,
                    immortal: false,
                    associations: Vec::new(),
                    payload: Payload::None,
                },
            );
            trace!(class = ?class.name, address = obj as u64, "sim alloc");
            obj
        }
    }

    pub(crate) fn set_payload(&self, obj: Id, payload: Payload) {
        let old = match self.objects.lock().get_mut(&(obj as usize)) {
            Some(record) => std::mem::replace(&mut record.payload, payload),
            None => return,
        };
        for child in old.children() {
            self.release(child as Id);
        }
    }

    pub(crate) fn make_immortal(&self, obj: Id) {
        if let Some(record) = self.objects.lock().get_mut(&(obj as usize)) {
            record.immortal = true;
        }
    }

    /// Run `f` on an object's payload
    pub(crate) fn with_payload<R>(&self, obj: Id, f: impl FnOnce(&Payload) -> R) -> Option<R> {
        self.objects.lock().get(&(obj as usize)).map(|r| f(&r.payload))
    }

    pub(crate) fn with_payload_mut<R>(&self, obj: Id, f: impl FnOnce(&mut Payload) -> R) -> Option<R> {
        self.objects.lock().get_mut(&(obj as usize)).map(|r| f(&mut r.payload))
    }

    pub(crate) fn retain(&self, obj: Id) -> Id {
        if let Some(record) = self.objects.lock().get_mut(&(obj as usize)) {
            if !record.immortal {
                record.retain_count += 1;
            }
        }
        obj
    }

    /// Drop one reference; the last one sends `dealloc`
    pub(crate) fn release(&self, obj: Id) {
        let dealloc = match self.objects.lock().get_mut(&(obj as usize)) {
            Some(record) if !record.immortal && record.retain_count > 0 => {
                record.retain_count -= 1;
                record.retain_count == 0
            }
            _ => false,
        };
        if dealloc {
            unsafe { self.send_void(obj, "dealloc") };
        }
    }

    pub(crate) fn retain_count_of(&self, obj: Id) -> usize {
        match self.objects.lock().get(&(obj as usize)) {
            Some(record) if record.immortal => u32::MAX as usize,
            Some(record) => record.retain_count,
            None => 0,
        }
    }

    /// Root `dealloc`: drop associations and owned children, free memory
    pub(crate) unsafe fn destroy(&self, obj: Id) {
        let record = match self.objects.lock().remove(&(obj as usize)) {
            Some(record) => record,
            None => return,
        };
        trace!(address = obj as u64, "sim dealloc");
        for association in &record.associations {
            if association.policy.retains() {
                self.release(association.value as Id);
            }
        }
        for child in record.payload.children() {
            self.release(child as Id);
        }
        libc::free(obj as *mut c_void);
    }

    pub(crate) fn set_association(&self, obj: Id, key: *const c_void, value: Id, policy: AssociationPolicy) {
        let previous = {
            let mut objects = self.objects.lock();
            if !value.is_null() && policy.retains() {
                if let Some(target) = objects.get_mut(&(value as usize)) {
                    if !target.immortal {
                        target.retain_count += 1;
                    }
                }
            }
            let record = match objects.get_mut(&(obj as usize)) {
                Some(record) => record,
                None => return,
            };
            let previous = record
                .associations
                .iter()
                .position(|a| a.key == key as usize)
                .map(|i| record.associations.remove(i));
            if !value.is_null() {
                record.associations.push(Association {
                    key: key as usize,
                    value: value as usize,
                    policy,
                });
            }
            previous
        };
        if let Some(previous) = previous {
            if previous.policy.retains() {
                self.release(previous.value as Id);
            }
        }
    }

    pub(crate) fn association(&self, obj: Id, key: *const c_void) -> Id {
        self.objects
            .lock()
            .get(&(obj as usize))
            .and_then(|r| r.associations.iter().find(|a| a.key == key as usize))
            .map_or(std::ptr::null_mut(), |a| a.value as Id)
    }

    // -- autorelease pools (per thread) -----------------------------------

    pub(crate) fn push_pool(&self) -> *mut c_void {
        let mut pools = self.pools.lock();
        let stack = pools.entry(current_thread()).or_default();
        stack.push(Vec::new());
        stack.len() as *mut c_void
    }

    /// Drain every pool at or above `token`'s depth on this thread
    pub(crate) fn pop_pool(&self, token: *mut c_void) {
        let depth = token as usize;
        if depth == 0 {
            return;
        }
        let drained: Vec<usize> = {
            let mut pools = self.pools.lock();
            let stack = match pools.get_mut(&current_thread()) {
                Some(stack) => stack,
                None => return,
            };
            let mut drained = Vec::new();
            while stack.len() >= depth {
                if let Some(pool) = stack.pop() {
                    drained.extend(pool);
                }
            }
            drained
        };
        for obj in drained.into_iter().rev() {
            self.release(obj as Id);
        }
    }

    pub(crate) fn autorelease(&self, obj: Id) -> Id {
        if obj.is_null() {
            return obj;
        }
        let mut pools = self.pools.lock();
        match pools.get_mut(&current_thread()).and_then(|stack| stack.last_mut()) {
            Some(pool) => pool.push(obj as usize),
            None => warn!(address = obj as u64, "Object autoreleased with no pool in place; leaking"),
        }
        obj
    }

    /// `isEqual:` for built-in values
    pub(crate) fn objects_equal(&self, a: Id, b: Id) -> bool {
        if a == b {
            return true;
        }
        let objects = self.objects.lock();
        match (
            objects.get(&(a as usize)).map(|r| &r.payload),
            objects.get(&(b as usize)).map(|r| &r.payload),
        ) {
            (Some(Payload::Str(x)), Some(Payload::Str(y))) => x == y,
            (Some(Payload::Number(x)), Some(Payload::Number(y))) => x.as_f64() == y.as_f64(),
            _ => false,
        }
    }

    pub(crate) fn live_object_count(&self) -> usize {
        self.objects.lock().len()
    }
}

fn current_thread() -> ThreadId {
    thread::current().id()
}

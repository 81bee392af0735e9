//! Reference counting and autorelease pools

use super::instance::Instance;
use crate::bridge::{self, Bridge};
use crate::error::{BridgeError, Result};
use crate::logging::{trace, warn};
use std::ffi::c_void;
use std::marker::PhantomData;

impl Instance {
    /// Take a native reference (`retain`)
    pub fn retain(&self) -> Result<()> {
        self.send_with_signature("retain", "@@:", &[]).map(|_| ())
    }

    /// Give up a native reference (`release`)
    ///
    /// Dropping the last reference deallocates the object and marks this
    /// wrapper dead.
    pub fn release(&self) -> Result<()> {
        self.send_with_signature("release", "v@:", &[]).map(|_| ())
    }

    /// Hand a reference to the innermost autorelease pool
    pub fn autorelease(&self) -> Result<()> {
        self.send_with_signature("autorelease", "@@:", &[]).map(|_| ())
    }

    /// Native reference count as reported by the runtime
    pub fn retain_count(&self) -> Result<usize> {
        if self.is_nil() {
            return Ok(0);
        }
        if !self.is_alive() {
            return Err(BridgeError::Deallocated {
                address: self.address(),
            });
        }
        let bridge = self
            .bridge()
            .ok_or_else(|| BridgeError::runtime("object has no runtime class"))?;
        Ok(unsafe { bridge.runtime().retain_count(self.as_ptr()) })
    }
}

impl Bridge {
    /// Release an object the bridge owns a reference to
    pub(crate) fn release_raw(&'static self, address: usize) {
        if let Err(e) = Instance::borrowed(self, address).release() {
            warn!(address = address as u64, error = %e, "Release failed");
        }
    }

    pub(crate) fn autorelease_raw(&'static self, address: usize) {
        if let Err(e) = Instance::borrowed(self, address).autorelease() {
            warn!(address = address as u64, error = %e, "Autorelease failed");
        }
    }

    /// Push an autorelease pool on the current thread
    pub fn autorelease_pool(&'static self) -> AutoreleasePool {
        let token = self.runtime().autorelease_pool_push();
        trace!(token = token as u64, "Autorelease pool pushed");
        AutoreleasePool {
            bridge: self,
            token,
            drained: false,
            _thread_bound: PhantomData,
        }
    }

    /// Run `f` inside a fresh autorelease pool
    pub fn with_autorelease_pool<T>(&'static self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let pool = self.autorelease_pool();
        let value = f();
        let drained = pool.drain();
        let value = value?;
        drained?;
        Ok(value)
    }
}

/// Scoped autorelease pool
///
/// Pools nest per thread and must be drained on the thread that pushed
/// them, innermost first. Dropping an undrained pool drains it.
pub struct AutoreleasePool {
    bridge: &'static Bridge,
    token: *mut c_void,
    drained: bool,
    _thread_bound: PhantomData<*const ()>,
}

impl AutoreleasePool {
    /// Drain the pool, releasing everything autoreleased into it
    ///
    /// Errors raised by deallocation callbacks while draining are returned
    /// (the first one, if several).
    pub fn drain(mut self) -> Result<()> {
        self.pop();
        match bridge::take_pending() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn pop(&mut self) {
        if self.drained {
            return;
        }
        self.drained = true;
        let _scope = bridge::enter_native(self.bridge);
        unsafe { self.bridge.runtime().autorelease_pool_pop(self.token) };
        trace!(token = self.token as u64, "Autorelease pool drained");
    }
}

impl Drop for AutoreleasePool {
    fn drop(&mut self) {
        if self.drained {
            return;
        }
        self.pop();
        if let Some(error) = bridge::take_pending() {
            warn!(error = %error, "Error raised while draining autorelease pool");
        }
    }
}

impl std::fmt::Debug for AutoreleasePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoreleasePool")
            .field("token", &self.token)
            .field("drained", &self.drained)
            .finish()
    }
}


//! Runtime introspection - classes, selectors, methods, ivars, protocols
//!
//! Design: read-only queries over the runtime tables. Names that do not
//! resolve come back as `None`; layers that need the entity to exist turn
//! that into `BridgeError::Lookup`.
//!
//! Architecture:
//! - `selector.rs` - interned selectors and host-style selector names
//! - `class.rs` - class handles with lazily filled method caches, the
//!   class registry
//! - `iter.rs` - iterators over runtime-allocated lists

mod selector;
mod class;
mod iter;

pub use selector::{host_selector_name, Selector};
pub use class::{ClassHandle, MethodHandle};
pub use iter::{
    InheritanceIter, IvarInfo, IvarIter, MethodInfo, MethodIter, PropertyInfo, PropertyIter,
    ProtocolHandle, ProtocolIter,
};

pub(crate) use class::ClassRegistry;

use crate::bridge::Bridge;
use crate::error::Result;
use std::ffi::CString;

impl Bridge {
    pub fn get_protocol(&'static self, name: &str) -> Option<ProtocolHandle> {
        let cname = CString::new(name).ok()?;
        let runtime = self.runtime();
        let protocol = runtime.get_protocol(&cname);
        if protocol.is_null() {
            None
        } else {
            Some(unsafe { ProtocolHandle::read(runtime, protocol) })
        }
    }

    pub fn get_selector(&'static self, name: &str) -> Result<Selector> {
        self.selector(name)
    }

    pub fn get_methods(&'static self, class: &ClassHandle, prefixes: &[&str]) -> MethodIter {
        class.methods(prefixes)
    }

    pub fn get_ivars(&'static self, class: &ClassHandle) -> IvarIter {
        class.ivars()
    }

    pub fn get_properties(&'static self, class: &ClassHandle) -> PropertyIter {
        class.properties()
    }

    pub fn get_inheritance(&'static self, class: &ClassHandle) -> InheritanceIter {
        class.inheritance()
    }
}

#[cfg(test)]
mod tests;

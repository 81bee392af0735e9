//! Interned selectors

use crate::bridge::Bridge;
use crate::error::{BridgeError, LookupKind, Result};
use crate::runtime::{c_string, Sel};
use std::ffi::CString;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A runtime selector; equal selectors share one interned pointer
#[derive(Clone)]
pub struct Selector {
    ptr: usize,
    name_ptr: usize,
    name: Arc<str>,
}

impl Selector {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn as_ptr(&self) -> Sel {
        self.ptr as Sel
    }

    /// Address of the runtime's own copy of the name
    #[inline]
    pub(crate) fn name_ptr(&self) -> usize {
        self.name_ptr
    }

    /// Number of colons, i.e. explicit arguments the name implies
    pub fn arity(&self) -> usize {
        self.name.matches(':').count()
    }
}

impl PartialEq for Selector {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl Eq for Selector {}

impl Hash for Selector {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ptr.hash(state)
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Selector({})", self.name)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Bridge {
    /// Register (or look up) a selector by name
    pub fn selector(&'static self, name: &str) -> Result<Selector> {
        if let Some(sel) = self.selectors.get(name) {
            return Ok(sel.clone());
        }
        let cname =
            CString::new(name).map_err(|_| BridgeError::lookup(LookupKind::Selector, name))?;
        let ptr = self.runtime().register_selector(&cname);
        if ptr.is_null() {
            return Err(BridgeError::lookup(LookupKind::Selector, name));
        }
        let name_ptr = unsafe { self.runtime().selector_name(ptr) } as usize;
        let sel = Selector {
            ptr: ptr as usize,
            name_ptr,
            name: Arc::from(name),
        };
        Ok(self
            .selectors
            .entry(name.to_string())
            .or_insert(sel)
            .value()
            .clone())
    }

    /// Selector for a pointer received from the runtime
    pub(crate) fn selector_from_ptr(&'static self, sel: Sel) -> Option<Selector> {
        if sel.is_null() {
            return None;
        }
        let name = unsafe { c_string(self.runtime().selector_name(sel)) }?;
        self.selector(&name).ok()
    }
}

/// Host-style method name to selector name
///
/// Underscores become colons, except leading ones which are part of the
/// name: `initWithFrame_` is `initWithFrame:`, `_private_` is `_private:`.
pub fn host_selector_name(name: &str) -> String {
    let body = name.trim_start_matches('_');
    let leading = &name[..name.len() - body.len()];
    let mut out = String::with_capacity(name.len());
    out.push_str(leading);
    out.extend(body.chars().map(|c| if c == '_' { ':' } else { c }));
    out
}

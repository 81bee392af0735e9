//! Deallocation observers
//!
//! Each wrapped object gets a small helper object attached as a retained
//! associated object. The runtime releases associations while it destroys
//! the owner, so the helper's `dealloc` runs exactly when the watched
//! object dies; it evicts the wrapper and then deallocates normally.

use super::instance::Instance;
use crate::bridge::{Bridge, BridgeStats};
use crate::error::{BridgeError, Result};
use crate::introspect::ClassHandle;
use crate::logging::debug;
use crate::runtime::AssociationPolicy;
use crate::value::Value;
use std::ffi::c_void;

const OBSERVER_CLASS: &str = "TypthonDeallocObserver";
const WATCHED_IVAR: &str = "watched";

/// Association key; only its address matters
static OBSERVER_KEY: u8 = 0;

pub(crate) struct ObserverClass {
    class: ClassHandle,
}

impl ObserverClass {
    fn create(bridge: &'static Bridge) -> Result<Self> {
        let root = bridge.require_class("NSObject")?;
        let name = free_class_name(bridge);

        let builder = bridge.create_subclass(&root, &name)?;
        builder.add_ivar(WATCHED_IVAR, "Q")?;
        for selector in ["dealloc", "finalize"] {
            builder.add_method(selector, "v@:", move |call| {
                let watched = call
                    .receiver
                    .get_ivar(WATCHED_IVAR)?
                    .as_u64()
                    .unwrap_or(0) as usize;
                if watched != 0 {
                    bridge.identity.evict(watched, &bridge.stats);
                }
                call.send_super(selector, &[])
            })?;
        }
        let class = builder.register()?;
        debug!(class = %class, "Deallocation observer class ready");
        Ok(Self { class })
    }

    pub fn is_observer_class(&self, class: &ClassHandle) -> bool {
        *class == self.class
    }
}

/// First unused observer class name; a process can host several bridges
/// over one runtime
fn free_class_name(bridge: &'static Bridge) -> String {
    let mut name = OBSERVER_CLASS.to_string();
    let mut suffix = 1;
    while bridge.get_class(&name).is_some() {
        name = format!("{}_{}", OBSERVER_CLASS, suffix);
        suffix += 1;
    }
    name
}

impl Bridge {
    fn observer_class(&'static self) -> Result<&ObserverClass> {
        self.observer.get_or_try_init(|| ObserverClass::create(self))
    }

    /// Attach a deallocation observer to `instance`
    pub(crate) fn attach_observer(&'static self, instance: &Instance) -> Result<()> {
        let observer = self.observer_class()?;
        let helper = observer
            .class
            .send("alloc", &[])?
            .as_instance()
            .cloned()
            .ok_or_else(|| BridgeError::runtime("observer allocation returned nil"))?;
        let helper = helper
            .send("init", &[])?
            .as_instance()
            .cloned()
            .filter(|helper| !helper.is_nil())
            .ok_or_else(|| BridgeError::runtime("observer initialization returned nil"))?;
        helper.set_ivar(WATCHED_IVAR, &Value::UInt(instance.address() as u64))?;

        unsafe {
            self.runtime().set_associated_object(
                instance.as_ptr(),
                &OBSERVER_KEY as *const u8 as *const c_void,
                helper.as_ptr(),
                AssociationPolicy::RetainNonatomic,
            );
        }
        // The association now holds the only reference
        helper.send("release", &[])?;
        BridgeStats::bump(&self.stats.observers_attached);
        Ok(())
    }
}

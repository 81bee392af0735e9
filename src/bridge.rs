//! Bridge - the process-scoped registries tied to one runtime
//!
//! Design: a `Bridge` owns the runtime seam and every long-lived cache
//! (classes, selectors, prepared calls, wrappers, trampolines). Bridges are
//! leaked on construction so handles can carry a `&'static Bridge` and
//! native callbacks can reach it without reference counting.
//!
//! Initialization order: libraries (inside the runtime), then the
//! uncaught-exception handler, then optional fault traps. Introspection,
//! dispatch and lifecycle state is populated lazily on first use.

use crate::config::BridgeConfig;
use crate::dispatch::CallCache;
use crate::error::{BridgeError, Result};
use crate::exceptions::{self, FaultGuard};
use crate::introspect::{ClassRegistry, Selector};
use crate::lifecycle::{IdentityCache, ObserverClass};
use crate::logging::{info, warn};
use crate::runtime::ObjcRuntime;
use crate::subclass::TrampolineCache;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct Bridge {
    runtime: Box<dyn ObjcRuntime>,
    config: BridgeConfig,
    pub(crate) classes: ClassRegistry,
    pub(crate) selectors: DashMap<String, Selector>,
    pub(crate) calls: CallCache,
    pub(crate) identity: IdentityCache,
    pub(crate) trampolines: TrampolineCache,
    pub(crate) observer: OnceCell<ObserverClass>,
    pub(crate) stats: BridgeStats,
    faults: Mutex<Option<FaultGuard>>,
}

static GLOBAL: OnceCell<&'static Bridge> = OnceCell::new();

impl Bridge {
    /// Build a bridge over `runtime`
    ///
    /// The bridge lives for the rest of the process.
    pub fn with_runtime(runtime: Box<dyn ObjcRuntime>, config: BridgeConfig) -> Result<&'static Bridge> {
        config.apply();

        let bridge: &'static Bridge = Box::leak(Box::new(Bridge {
            runtime,
            config,
            classes: ClassRegistry::new(),
            selectors: DashMap::new(),
            calls: CallCache::new(),
            identity: IdentityCache::new(),
            trampolines: TrampolineCache::new(),
            observer: OnceCell::new(),
            stats: BridgeStats::default(),
            faults: Mutex::new(None),
        }));

        exceptions::install(bridge)?;
        if bridge.config.exceptions.trap_faults {
            *bridge.faults.lock() = Some(FaultGuard::install()?);
        }

        info!(
            runtime = bridge.runtime.name(),
            policy = ?bridge.config.exceptions.policy,
            trap_faults = bridge.config.exceptions.trap_faults,
            "Bridge ready"
        );
        Ok(bridge)
    }

    /// Bridge over the system Objective-C runtime
    pub fn native(config: BridgeConfig) -> Result<&'static Bridge> {
        let runtime = crate::bindings::NativeRuntime::load(&config.libraries)?;
        Self::with_runtime(Box::new(runtime), config)
    }

    /// Bridge over a fresh in-process simulated runtime
    pub fn simulated(config: BridgeConfig) -> Result<&'static Bridge> {
        Self::with_runtime(Box::new(crate::sim::SimRuntime::new()), config)
    }

    /// The process-wide native bridge, configured from the environment
    pub fn global() -> Result<&'static Bridge> {
        GLOBAL
            .get_or_try_init(|| Self::native(BridgeConfig::from_env()?))
            .copied()
    }

    #[inline]
    pub fn runtime(&self) -> &dyn ObjcRuntime {
        self.runtime.as_ref()
    }

    #[inline]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Counters since the bridge was created
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Whether hard-fault traps are installed for this bridge
    pub fn traps_faults(&self) -> bool {
        self.faults.lock().is_some()
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("runtime", &self.runtime.name())
            .field("classes", &self.classes.len())
            .field("wrappers", &self.identity.len())
            .finish()
    }
}

/// Bridge counters
#[derive(Debug, Default)]
pub(crate) struct BridgeStats {
    pub messages_sent: AtomicU64,
    pub argument_errors: AtomicU64,
    pub wrappers_created: AtomicU64,
    pub wrappers_evicted: AtomicU64,
    pub observers_attached: AtomicU64,
    pub trampolines_built: AtomicU64,
}

impl BridgeStats {
    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            argument_errors: self.argument_errors.load(Ordering::Relaxed),
            wrappers_created: self.wrappers_created.load(Ordering::Relaxed),
            wrappers_evicted: self.wrappers_evicted.load(Ordering::Relaxed),
            observers_attached: self.observers_attached.load(Ordering::Relaxed),
            libraries_loaded: crate::bindings::loaded_library_count(),
            trampolines_built: self.trampolines_built.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the bridge counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub messages_sent: u64,
    pub argument_errors: u64,
    pub wrappers_created: u64,
    pub wrappers_evicted: u64,
    pub observers_attached: u64,
    pub libraries_loaded: usize,
    pub trampolines_built: u64,
}

// ============================================================================
// Per-thread call state
// ============================================================================

thread_local! {
    /// Bridge whose native call is running on this thread
    static ACTIVE: Cell<Option<&'static Bridge>> = const { Cell::new(None) };
    /// Name pointer of the last selector sent on this thread
    static LAST_SELECTOR: Cell<usize> = const { Cell::new(0) };
    /// Error raised inside a native call, surfaced when it returns
    static PENDING: RefCell<Option<BridgeError>> = const { RefCell::new(None) };
    /// Native exception raised while no bridge call was running
    static UNCAUGHT: RefCell<Option<BridgeError>> = const { RefCell::new(None) };
}

/// Marks a native call in progress; restores the outer call on drop
pub(crate) struct ActiveCall {
    previous: Option<&'static Bridge>,
}

pub(crate) fn enter(bridge: &'static Bridge, selector: &Selector) -> ActiveCall {
    LAST_SELECTOR.with(|last| last.set(selector.name_ptr()));
    ActiveCall {
        previous: ACTIVE.with(|active| active.replace(Some(bridge))),
    }
}

/// Marks native code running on behalf of `bridge` outside a message send
/// (pool drains, releases)
pub(crate) fn enter_native(bridge: &'static Bridge) -> ActiveCall {
    ActiveCall {
        previous: ACTIVE.with(|active| active.replace(Some(bridge))),
    }
}

impl Drop for ActiveCall {
    fn drop(&mut self) {
        ACTIVE.with(|active| active.set(self.previous));
    }
}

/// Bridge of the innermost native call on this thread
pub(crate) fn active_bridge() -> Option<&'static Bridge> {
    ACTIVE.with(Cell::get)
}

/// Address of the NUL-terminated name of the last selector sent here
pub(crate) fn last_selector() -> usize {
    LAST_SELECTOR.with(Cell::get)
}

/// Record an error for the native call running on this thread
///
/// The first error wins; later ones are logged and dropped.
pub(crate) fn record_pending(error: BridgeError) {
    PENDING.with(|pending| {
        let mut pending = pending.borrow_mut();
        match pending.as_ref() {
            Some(first) => warn!(first = %first, dropped = %error, "Error already pending"),
            None => *pending = Some(error),
        }
    });
}

pub(crate) fn take_pending() -> Option<BridgeError> {
    PENDING.with(|pending| pending.borrow_mut().take())
}

/// Hold an exception raised outside any bridge call on this thread
///
/// Kept apart from the in-call record, which sends made while the exception
/// object is torn down would otherwise claim. The first one wins.
pub(crate) fn record_uncaught(error: BridgeError) {
    UNCAUGHT.with(|uncaught| {
        let mut uncaught = uncaught.borrow_mut();
        match uncaught.as_ref() {
            Some(first) => warn!(first = %first, dropped = %error, "Uncaught exception already held"),
            None => *uncaught = Some(error),
        }
    });
}

pub(crate) fn take_uncaught() -> Option<BridgeError> {
    UNCAUGHT.with(|uncaught| uncaught.borrow_mut().take())
}

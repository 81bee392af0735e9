//! Uncaught native exceptions and hard faults
//!
//! Design: one handler function serves every bridge. It finds the bridge
//! through the native call running on the current thread (falling back to
//! the most recently installed bridge), reads the exception's `name` and
//! `reason`, and applies the configured policy:
//! - `Raise` parks a `NativeException` on the thread; the dispatch layer
//!   returns it as the failing call's error
//! - `Abort` logs and terminates the process
//!
//! On the system runtime an uncaught exception still terminates the process
//! once the handler returns; `Raise` is fully recoverable only where the
//! runtime continues after the handler (the simulator does).
//!
//! Hard faults (SIGSEGV and friends) cannot be turned into errors. The
//! opt-in `FaultGuard` only reports them: signal name plus the last
//! selector sent on the faulting thread, then the default action.

use crate::bridge::{self, Bridge};
use crate::config::ExceptionPolicy;
use crate::error::{BridgeError, Result};
use crate::lifecycle::Instance;
use crate::logging::{debug, log_native_exception};
use crate::runtime::Id;
use crate::value::Value;
use parking_lot::Mutex;
use std::ffi::c_int;
use std::panic::{self, AssertUnwindSafe};

/// Bridge used when an exception arrives outside any bridge call
static LATEST: Mutex<Option<&'static Bridge>> = Mutex::new(None);

/// Install the uncaught-exception handler on `bridge`'s runtime
pub(crate) fn install(bridge: &'static Bridge) -> Result<()> {
    bridge
        .runtime()
        .set_uncaught_exception_handler(Some(on_uncaught_exception));
    *LATEST.lock() = Some(bridge);
    debug!(runtime = bridge.runtime().name(), "Uncaught-exception handler installed");
    Ok(())
}

/// Take the native exception recorded on this thread outside a bridge call
///
/// Exceptions raised during a send are returned by that send instead.
pub fn take_uncaught() -> Option<BridgeError> {
    bridge::take_uncaught()
}

unsafe extern "C" fn on_uncaught_exception(exception: Id) {
    let handled = panic::catch_unwind(AssertUnwindSafe(|| handle(exception)));
    if handled.is_err() {
        // Nothing sensible left to do without unwinding into native frames
        std::process::abort();
    }
}

fn handle(exception: Id) {
    let in_call = bridge::active_bridge().is_some();
    let Some(bridge) = bridge::active_bridge().or_else(|| *LATEST.lock()) else {
        log_native_exception("unknown", "no bridge available to read the exception");
        return;
    };

    let _scope = bridge::enter_native(bridge);
    let exception = Instance::borrowed(bridge, exception as usize);
    let name = describe(&exception, "name");
    let reason = describe(&exception, "reason");
    log_native_exception(&name, &reason);

    match bridge.config().exceptions.policy {
        ExceptionPolicy::Raise => {
            let error = BridgeError::NativeException { name, reason };
            if in_call {
                bridge::record_pending(error);
            } else {
                bridge::record_uncaught(error);
            }
        }
        ExceptionPolicy::Abort => std::process::abort(),
    }
}

/// String value of `exception.<selector>`; empty when unavailable
fn describe(exception: &Instance, selector: &str) -> String {
    let text = exception
        .send(selector, &[])
        .and_then(|value| match value {
            Value::Object(text) => text.send("UTF8String", &[]),
            other => Ok(other),
        });
    match text {
        Ok(Value::Str(s)) => s,
        _ => String::new(),
    }
}

// ============================================================================
// Hard faults
// ============================================================================

const FAULT_SIGNALS: [c_int; 5] = [libc::SIGILL, libc::SIGSEGV, libc::SIGBUS, libc::SIGFPE, libc::SIGABRT];

/// Fault reporting handlers; the previous dispositions come back on drop
pub struct FaultGuard {
    previous: Vec<(c_int, libc::sigaction)>,
}

impl FaultGuard {
    pub fn install() -> Result<FaultGuard> {
        let mut previous = Vec::with_capacity(FAULT_SIGNALS.len());
        for signal in FAULT_SIGNALS {
            unsafe {
                let mut action: libc::sigaction = std::mem::zeroed();
                action.sa_sigaction = on_fault as extern "C" fn(c_int) as libc::sighandler_t;
                libc::sigemptyset(&mut action.sa_mask);
                let mut old: libc::sigaction = std::mem::zeroed();
                if libc::sigaction(signal, &action, &mut old) != 0 {
                    drop(FaultGuard { previous });
                    return Err(BridgeError::runtime(format!(
                        "cannot install handler for {}",
                        signal_name(signal)
                    )));
                }
                previous.push((signal, old));
            }
        }
        debug!(signals = FAULT_SIGNALS.len(), "Fault traps installed");
        Ok(FaultGuard { previous })
    }
}

impl Drop for FaultGuard {
    fn drop(&mut self) {
        for (signal, old) in self.previous.drain(..).rev() {
            unsafe {
                libc::sigaction(signal, &old, std::ptr::null_mut());
            }
        }
    }
}

impl std::fmt::Debug for FaultGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultGuard")
            .field("signals", &self.previous.len())
            .finish()
    }
}

fn signal_name(signal: c_int) -> &'static str {
    match signal {
        libc::SIGILL => "SIGILL",
        libc::SIGSEGV => "SIGSEGV",
        libc::SIGBUS => "SIGBUS",
        libc::SIGFPE => "SIGFPE",
        libc::SIGABRT => "SIGABRT",
        _ => "signal",
    }
}

/// Async-signal-safe: raw writes only, no allocation or locking
extern "C" fn on_fault(signal: c_int) {
    unsafe {
        write_stderr(b"typthon-objc: fatal ");
        write_stderr(signal_name(signal).as_bytes());
        let selector = bridge::last_selector() as *const libc::c_char;
        if !selector.is_null() {
            write_stderr(b" after sending ");
            write_stderr(std::slice::from_raw_parts(selector as *const u8, libc::strlen(selector)));
        }
        write_stderr(b"\n");
        libc::signal(signal, libc::SIG_DFL);
        libc::raise(signal);
    }
}

unsafe fn write_stderr(bytes: &[u8]) {
    libc::write(libc::STDERR_FILENO, bytes.as_ptr() as *const libc::c_void, bytes.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn current_handler(signal: c_int) -> libc::sighandler_t {
        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            libc::sigaction(signal, std::ptr::null(), &mut action);
            action.sa_sigaction
        }
    }

    #[test]
    fn test_fault_guard_restores_handlers() {
        let before = current_handler(libc::SIGFPE);
        let guard = FaultGuard::install().unwrap();
        assert_eq!(
            current_handler(libc::SIGFPE),
            on_fault as extern "C" fn(c_int) as libc::sighandler_t
        );
        assert!(format!("{:?}", guard).contains("signals: 5"));
        drop(guard);
        assert_eq!(current_handler(libc::SIGFPE), before);
    }

    #[test]
    fn test_uncaught_is_kept_apart_from_call_errors() {
        bridge::record_pending(BridgeError::runtime("callback failed"));
        assert!(take_uncaught().is_none());
        assert!(matches!(bridge::take_pending(), Some(BridgeError::Runtime { .. })));

        bridge::record_uncaught(BridgeError::NativeException {
            name: "NSGenericException".to_string(),
            reason: "first".to_string(),
        });
        // A call on this thread draining its own record leaves it alone
        assert!(bridge::take_pending().is_none());
        bridge::record_uncaught(BridgeError::NativeException {
            name: "NSGenericException".to_string(),
            reason: "second".to_string(),
        });
        match take_uncaught() {
            Some(BridgeError::NativeException { reason, .. }) => assert_eq!(reason, "first"),
            other => panic!("expected a native exception, got {:?}", other),
        }
        assert!(take_uncaught().is_none());
    }

    #[test]
    fn test_signal_names() {
        assert_eq!(signal_name(libc::SIGSEGV), "SIGSEGV");
        assert_eq!(signal_name(libc::SIGABRT), "SIGABRT");
        assert_eq!(signal_name(0), "signal");
    }
}

//! Typthon ObjC - Objective-C runtime bridge
//!
//! Lets host code talk to the Objective-C object runtime: parse type
//! encodings, look up classes and methods, send messages with the right
//! calling convention, keep one wrapper per live native object, and build
//! runtime classes whose methods are implemented on the host side.
//!
//! Initialization order: `Bridge` construction loads the native libraries,
//! installs the uncaught-exception handler and, when configured, the fault
//! traps. Everything else is populated lazily.
//!
//! Two runtimes implement the `ObjcRuntime` seam: `bindings::NativeRuntime`
//! over the system libobjc and Foundation, and `sim::SimRuntime`, an
//! in-process runtime used by the test-suite.

pub mod bindings;
pub mod bridge;
pub mod codec;
pub mod config;
pub mod convert;
pub mod dispatch;
pub mod error;
pub mod exceptions;
pub mod introspect;
pub mod lifecycle;
pub mod logging;
pub mod runtime;
pub mod sim;
pub mod subclass;
pub mod value;

// Re-export commonly used items
pub use bridge::{Bridge, StatsSnapshot};
pub use codec::{split, to_native_type, MethodSignature, NativeType, TypeCode};
pub use config::{BridgeConfig, ExceptionPolicy};
pub use dispatch::{BoundMethod, SendKind};
pub use error::{BridgeError, LookupKind, Result};
pub use introspect::{ClassHandle, MethodHandle, Selector};
pub use lifecycle::{AutoreleasePool, Instance};
pub use runtime::ObjcRuntime;
pub use sim::SimRuntime;
pub use subclass::{MethodCall, Subclass};
pub use value::{StructValue, Value};

/// Initialize logging and return the process bridge
///
/// Both are configured from the environment (`BridgeConfig::from_env`).
pub fn init() -> Result<&'static Bridge> {
    let config = BridgeConfig::from_env()?;
    logging::init_with_config(config.log_config());
    Bridge::global()
}

//! Message Dispatch - sending Objective-C messages through libffi
//!
//! Design: sends are data-driven. The method's type encoding decides the
//! libffi call interface and which runtime entry point receives the call;
//! values are marshalled according to the parsed native types.
//!
//! Architecture:
//! - `abi`: entry-point classification per return type and architecture
//! - `marshal`: host values to native slots and back
//! - `call`: method binding, argument validation, the call itself
//!
//! Prepared call interfaces are cached per `(entry kind, signature)`.
//! Errors raised while native code runs (exceptions, callback failures)
//! are recorded per thread and returned when the call unwinds back here.

mod abi;
mod call;
pub(crate) mod marshal;

#[cfg(test)]
mod tests;

pub use abi::{call_interface, implementation_interface, Arch, SendKind};
pub use call::BoundMethod;
pub(crate) use call::CallCache;

//! Library bindings - shared libraries and native entry points
//!
//! Design: libraries are opened once per process and memoized by name;
//! every entry point is resolved once into a typed function-pointer table
//! whose types match the C declarations exactly.
//!
//! Architecture:
//! - `library.rs` - dlopen/dlsym wrapper and the process-wide library table
//! - `objc.rs` - libobjc entry points
//! - `foundation.rs` - CoreFoundation/Foundation entry points
//! - `native.rs` - `ObjcRuntime` implemented over the tables

mod library;
mod objc;
mod foundation;
mod native;

pub use library::{load_library, loaded_library_count, Library, LoadError, SymbolError};
pub use native::NativeRuntime;

#[cfg(test)]
mod tests;

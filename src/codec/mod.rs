//! Signature codec - Objective-C type encodings
//!
//! Design: encodings are scanned once into `TypeCode` units, memoized by the
//! raw string, and mapped on demand to `NativeType` layouts that libffi can
//! call with.
//!
//! Architecture:
//! - `typecode.rs` - single encoded units and their canonical form
//! - `split.rs` - depth-balanced scanner and the memo table
//! - `native.rs` - native types, C layout, libffi mapping
//! - `structs.rs` - layouts for structs referenced by name only
//! - `signature.rs` - method signatures with hidden arguments

mod typecode;
mod split;
mod native;
mod structs;
mod signature;


pub use typecode::{TypeCategory, TypeCode};
pub use split::{
    set_split_cache_capacity, split, split_cache_len, split_cached, split_one,
    DEFAULT_SPLIT_CACHE_CAPACITY,
};
pub use native::{to_native_type, NativeType, StructLayout};
pub use structs::{lookup_struct, register_struct};
pub use signature::{MethodSignature, HIDDEN_ARGS};

/// Canonical re-encoding of a list of units
pub fn encode(codes: &[TypeCode]) -> String {
    let mut out = String::new();
    for code in codes {
        code.encode_into(&mut out);
    }
    out
}

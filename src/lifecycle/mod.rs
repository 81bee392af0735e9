//! Object Identity & Lifecycle - wrappers, identity cache, reference counts
//!
//! Design: one wrapper per live native object. The identity cache maps
//! addresses to wrappers and holds them strongly; entries leave the cache
//! only when the native object is deallocated, which a per-object observer
//! reports. Wrappers never own a native reference themselves.
//!
//! Architecture:
//! - `instance`: the `Instance` handle, ivar access, `Bridge::wrap`
//! - `cache`: address-to-wrapper map and eviction
//! - `observer`: the runtime helper class that reports deallocation
//! - `pool`: retain/release and scoped autorelease pools

mod cache;
mod instance;
mod observer;
mod pool;

#[cfg(test)]
mod tests;

pub use instance::Instance;
pub use pool::AutoreleasePool;
pub(crate) use cache::IdentityCache;
pub(crate) use observer::ObserverClass;

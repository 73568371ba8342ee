//! Signing-key set resolution and caching.

pub mod cache;
pub mod resolver;

pub use cache::CachedKeySetResolver;
pub use resolver::{KeySetResolver, RemoteKeySetResolver, StaticKeySetResolver};

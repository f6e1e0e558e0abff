//! Bounded in-memory caching of compressed renders.

pub mod memory;

pub use memory::{CacheCost, MemoryCache, RenderCache};

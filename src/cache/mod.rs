//! Bounded caches used by the builder, solver and simulator.

mod lru;
mod state_set;

pub use lru::LruCache;
pub use state_set::StateHashSet;

use super::{Resolution, Resolver};
use crate::cache::LruCache;
use crate::engine::State;

/// Per-worker front for a shared resolver: memoises answers in a bounded LRU
/// keyed by canonical state and turns them into discounted values.
pub struct Valuer<'r, const N: usize> {
    resolver: &'r dyn Resolver<N>,
    discount: f64,
    cache: LruCache<State<N>, Resolution>,
}

impl<'r, const N: usize> Valuer<'r, N> {
    pub fn new(resolver: &'r dyn Resolver<N>, discount: f64, cache_size: usize) -> Self {
        Self { resolver, discount, cache: LruCache::new(cache_size) }
    }

    pub fn resolver(&self) -> &'r dyn Resolver<N> {
        self.resolver
    }

    pub fn resolution(&mut self, state: State<N>) -> Resolution {
        let resolver = self.resolver;
        *self
            .cache
            .get_or_insert_with(state.canonicalize(), || resolver.resolve(state))
    }

    /// Value of a resolved state, `None` if the resolver cannot decide it.
    pub fn value(&mut self, state: State<N>) -> Option<f64> {
        self.resolution(state).value(self.discount)
    }
}

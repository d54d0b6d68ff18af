/// Open-addressing set of packed states for the builder's hot loop.
///
/// - Capacity is a power of two sized so `limit` states stay under 3/4 load.
/// - Slot value 0 marks an empty slot; the zero state is tracked separately.
/// - Linear probing; no deletion except `drain_sorted`.
pub struct StateHashSet {
    mask: usize,
    slots: Vec<u64>,
    len: usize,
    has_zero: bool,
    limit: usize,
    hasher: ahash::RandomState,
}

impl StateHashSet {
    /// A set meant to hold up to `limit` states before being drained.
    pub fn with_limit(limit: usize) -> Self {
        let limit = limit.max(1);
        let cap = (limit * 4 / 3 + 1).next_power_of_two().max(8);
        Self {
            mask: cap - 1,
            slots: vec![0; cap],
            len: 0,
            has_zero: false,
            limit,
            // Fixed seeds keep probe sequences reproducible between runs.
            hasher: ahash::RandomState::with_seeds(0x2048, 0x4096, 0x8192, 0x16384),
        }
    }

    #[inline]
    fn slot(&self, state: u64) -> usize {
        (self.hasher.hash_one(state) as usize) & self.mask
    }

    pub fn len(&self) -> usize {
        self.len + usize::from(self.has_zero)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// True once the set holds `limit` states.
    pub fn is_full(&self) -> bool {
        self.len() >= self.limit
    }

    /// Insert a state; returns false if it was already present.
    pub fn insert(&mut self, state: u64) -> bool {
        if state == 0 {
            let added = !self.has_zero;
            self.has_zero = true;
            return added;
        }
        if (self.len + 1) * 4 > self.slots.len() * 3 {
            self.grow();
        }
        let mut idx = self.slot(state);
        loop {
            match self.slots[idx] {
                0 => {
                    self.slots[idx] = state;
                    self.len += 1;
                    return true;
                }
                s if s == state => return false,
                _ => idx = (idx + 1) & self.mask,
            }
        }
    }

    pub fn contains(&self, state: u64) -> bool {
        if state == 0 {
            return self.has_zero;
        }
        let mut idx = self.slot(state);
        loop {
            match self.slots[idx] {
                0 => return false,
                s if s == state => return true,
                _ => idx = (idx + 1) & self.mask,
            }
        }
    }

    // Only reached when callers insert past `limit` without draining.
    fn grow(&mut self) {
        let old = std::mem::replace(&mut self.slots, vec![0; (self.mask + 1) * 2]);
        self.mask = self.slots.len() - 1;
        self.len = 0;
        for s in old.into_iter().filter(|&s| s != 0) {
            self.insert(s);
        }
    }

    /// Remove every state, returning them in ascending order.
    pub fn drain_sorted(&mut self) -> Vec<u64> {
        let mut out = Vec::with_capacity(self.len());
        if self.has_zero {
            out.push(0);
        }
        for slot in self.slots.iter_mut() {
            if *slot != 0 {
                out.push(std::mem::take(slot));
            }
        }
        out[usize::from(self.has_zero)..].sort_unstable();
        self.len = 0;
        self.has_zero = false;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_contains_and_drain() {
        let mut set = StateHashSet::with_limit(16);
        for s in [0x1234u64, 0x11, 0x1234, 0x0, 0x2_0000_0000] {
            set.insert(s);
        }
        assert_eq!(set.len(), 4);
        assert!(set.contains(0x11));
        assert!(set.contains(0));
        assert!(!set.contains(0x12));
        assert_eq!(set.drain_sorted(), vec![0, 0x11, 0x1234, 0x2_0000_0000]);
        assert!(set.is_empty());
        assert!(!set.contains(0x11));
    }

    #[test]
    fn fills_to_limit_and_keeps_working_past_it() {
        let mut set = StateHashSet::with_limit(100);
        for s in 1..=100u64 {
            assert!(set.insert(s * 0x10));
        }
        assert!(set.is_full());
        for s in 101..=1000u64 {
            assert!(set.insert(s * 0x10));
        }
        assert_eq!(set.len(), 1000);
        let drained = set.drain_sorted();
        assert_eq!(drained, (1..=1000u64).map(|s| s * 0x10).collect::<Vec<_>>());
    }
}

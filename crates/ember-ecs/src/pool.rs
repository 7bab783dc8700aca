//! Bounded free lists of reset component instances, one per kind.
//!
//! Acquiring prefers a pooled instance and falls back to a fresh allocation.
//! Releasing resets the instance in place and keeps it only while the kind's
//! free list is below capacity; anything beyond that is dropped, so the pools
//! never grow without bound.

use serde::Serialize;

use crate::component::{Component, ComponentKind};

/// Counters for one kind's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PoolStats {
    /// Instances currently waiting in the free list.
    pub available: usize,
    /// Acquisitions served from the free list.
    pub reused: u64,
    /// Acquisitions that had to allocate.
    pub allocated: u64,
    /// Releases dropped because the pool was full.
    pub discarded: u64,
}

#[derive(Debug)]
struct KindPool {
    free: Vec<Component>,
    reused: u64,
    allocated: u64,
    discarded: u64,
}

impl KindPool {
    fn new() -> Self {
        Self {
            free: Vec::new(),
            reused: 0,
            allocated: 0,
            discarded: 0,
        }
    }
}

/// Per-kind component pools sharing one capacity.
#[derive(Debug)]
pub struct ComponentPools {
    pools: Vec<KindPool>,
    capacity: usize,
}

impl ComponentPools {
    pub fn new(capacity: usize) -> Self {
        Self {
            pools: (0..ComponentKind::COUNT).map(|_| KindPool::new()).collect(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the per-kind capacity, dropping surplus pooled instances.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        for pool in &mut self.pools {
            if pool.free.len() > capacity {
                let surplus = pool.free.len() - capacity;
                pool.free.truncate(capacity);
                pool.discarded += surplus as u64;
            }
        }
    }

    /// A component of `kind` in its default state.
    pub fn acquire(&mut self, kind: ComponentKind) -> Component {
        let pool = &mut self.pools[kind.index()];
        match pool.free.pop() {
            Some(component) => {
                pool.reused += 1;
                component
            }
            None => {
                pool.allocated += 1;
                Component::default_for(kind)
            }
        }
    }

    /// Reset `component` and keep it for reuse if there is room.
    pub fn release(&mut self, mut component: Component) {
        let pool = &mut self.pools[component.kind().index()];
        if pool.free.len() >= self.capacity {
            pool.discarded += 1;
            return;
        }
        component.reset();
        pool.free.push(component);
    }

    pub fn stats(&self, kind: ComponentKind) -> PoolStats {
        let pool = &self.pools[kind.index()];
        PoolStats {
            available: pool.free.len(),
            reused: pool.reused,
            allocated: pool.allocated,
            discarded: pool.discarded,
        }
    }

    /// Drop every pooled instance.
    pub fn clear(&mut self) {
        for pool in &mut self.pools {
            pool.free.clear();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

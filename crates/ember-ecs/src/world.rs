//! The [`World`] is the entity registry. It owns every entity record, the
//! component pools, and a pool of retired records for reuse.
//!
//! Outside code never owns an entity: it holds [`EntityId`] handles and goes
//! through the world for every read and write. Handles are generational, so a
//! handle kept past `destroy` resolves to nothing rather than to the slot's
//! next occupant.

use std::collections::VecDeque;

use serde::Serialize;

use crate::component::{Component, ComponentData, ComponentKind, KindMask};
use crate::entity::{EntityId, EntityRecord};
use crate::pool::{ComponentPools, PoolStats};
use crate::EcsError;

/// Default per-kind component pool capacity.
pub const DEFAULT_COMPONENT_POOL_CAPACITY: usize = 256;
/// Default number of retired entity records kept for reuse.
pub const DEFAULT_ENTITY_POOL_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Slot {
    generation: u32,
    record: Option<EntityRecord>,
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// The entity registry.
///
/// Active entities are kept in insertion order; [`query`](Self::query) returns
/// matches in that order, stable across calls until an entity is added or
/// removed.
pub struct World {
    slots: Vec<Slot>,
    /// Retired slot indices (FIFO so generations spread across slots).
    free_indices: VecDeque<u32>,
    /// Active entities in insertion order.
    order: Vec<EntityId>,
    pools: ComponentPools,
    /// Retired records kept for their buffers.
    retired: Vec<EntityRecord>,
    entity_pool_capacity: usize,
    /// Bumped on any change to the entity set or an entity's component set.
    structure_version: u64,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("active", &self.order.len())
            .field("slots", &self.slots.len())
            .field("retired_records", &self.retired.len())
            .field("structure_version", &self.structure_version)
            .finish()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Create an empty world with default pool capacities.
    pub fn new() -> Self {
        Self::with_capacities(DEFAULT_ENTITY_POOL_CAPACITY, DEFAULT_COMPONENT_POOL_CAPACITY)
    }

    /// Create an empty world with explicit pool capacities.
    pub fn with_capacities(entity_pool_capacity: usize, component_pool_capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free_indices: VecDeque::new(),
            order: Vec::new(),
            pools: ComponentPools::new(component_pool_capacity),
            retired: Vec::new(),
            entity_pool_capacity,
            structure_version: 0,
        }
    }

    /// Resize the pools. Surplus pooled items are dropped.
    pub fn set_pool_capacities(&mut self, entity_pool_capacity: usize, component_pool_capacity: usize) {
        self.entity_pool_capacity = entity_pool_capacity;
        self.retired.truncate(entity_pool_capacity);
        self.pools.set_capacity(component_pool_capacity);
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Create an active entity with no components and no tags.
    ///
    /// Reuses a retired slot and record when one is available.
    pub fn create(&mut self) -> EntityId {
        let id = match self.free_indices.pop_front() {
            Some(index) => EntityId::new(index, self.slots[index as usize].generation),
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    record: None,
                });
                EntityId::new(index, 0)
            }
        };
        let record = match self.retired.pop() {
            Some(mut record) => {
                record.rearm(id);
                record
            }
            None => EntityRecord::new(id),
        };
        self.slots[id.index() as usize].record = Some(record);
        self.order.push(id);
        self.structure_version += 1;
        id
    }

    /// Destroy an active entity: its components are reset into the pools, its
    /// tags cleared, and its slot retired.
    ///
    /// Idempotent: returns `false` without effect if `id` is stale or the
    /// entity is inactive.
    pub fn destroy(&mut self, id: EntityId) -> bool {
        if !self.is_alive(id) {
            return false;
        }
        self.retire(id)
    }

    /// Retire a slot whether or not its entity is active.
    pub(crate) fn retire(&mut self, id: EntityId) -> bool {
        let Some(slot) = self.slot_mut(id) else {
            return false;
        };
        let Some(mut record) = slot.record.take() else {
            return false;
        };
        slot.generation = slot.generation.wrapping_add(1);

        for component in record.detach_all() {
            self.pools.release(component);
        }
        if record.active {
            self.order.retain(|e| *e != id);
        }
        record.active = false;
        record.tags.clear();
        record.template = None;
        if self.retired.len() < self.entity_pool_capacity {
            self.retired.push(record);
        }
        self.free_indices.push_back(id.index());
        self.structure_version += 1;
        tracing::trace!(entity = %id, "entity retired");
        true
    }

    /// Park an active entity for template-level pooling.
    ///
    /// The entity leaves queries and its components are reset in place. The
    /// slot's generation is bumped, so every handle issued so far goes stale;
    /// the returned handle is the only way to bring the entity back.
    pub(crate) fn deactivate(&mut self, id: EntityId) -> Option<EntityId> {
        if !self.is_alive(id) {
            return None;
        }
        let slot = self.slot_mut(id)?;
        slot.generation = slot.generation.wrapping_add(1);
        let parked = EntityId::new(id.index(), slot.generation);
        let record = slot.record.as_mut()?;
        record.active = false;
        record.id = parked;
        record.tags.clear();
        for component in &mut record.components {
            component.reset();
        }
        self.order.retain(|e| *e != id);
        self.structure_version += 1;
        Some(parked)
    }

    /// Bring a parked entity back; it joins the end of the query order.
    pub(crate) fn reactivate(&mut self, parked: EntityId) -> Option<EntityId> {
        let record = self.slot_mut(parked)?.record.as_mut()?;
        if record.active {
            return None;
        }
        record.active = true;
        self.order.push(parked);
        self.structure_version += 1;
        Some(parked)
    }

    /// Whether `id` refers to an active entity.
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.record(id).is_some_and(|r| r.active)
    }

    /// Number of active entities.
    pub fn entity_count(&self) -> usize {
        self.order.len()
    }

    /// Number of slots holding a record, active or pooled.
    pub fn reserved_count(&self) -> usize {
        self.slots.iter().filter(|s| s.record.is_some()).count()
    }

    /// Counter that changes whenever entities are added or removed or an
    /// entity's component set changes.
    pub fn structure_version(&self) -> u64 {
        self.structure_version
    }

    /// Read-only view of an active entity's record.
    pub fn entity(&self, id: EntityId) -> Option<&EntityRecord> {
        self.record(id)
    }

    // -- components ---------------------------------------------------------

    /// A default-state component of `kind`, drawn from the pool when possible.
    pub fn acquire_component(&mut self, kind: ComponentKind) -> Component {
        self.pools.acquire(kind)
    }

    /// Hand a component that is not attached anywhere back to its pool.
    pub fn release_component(&mut self, component: Component) {
        self.pools.release(component);
    }

    /// Attach `component` to an entity.
    ///
    /// Fails with [`EcsError::DuplicateComponentKind`] if the entity already
    /// has a component of that kind; the rejected component is pooled.
    pub fn add_component(&mut self, id: EntityId, component: impl Into<Component>) -> Result<(), EcsError> {
        let component = component.into();
        let kind = component.kind();
        let Some(record) = self.record_mut(id) else {
            self.pools.release(component);
            return Err(EcsError::StaleEntity { entity: id });
        };
        if record.mask.contains(kind) {
            self.pools.release(component);
            return Err(EcsError::DuplicateComponentKind { entity: id, kind });
        }
        record.attach(component);
        self.structure_version += 1;
        Ok(())
    }

    /// Detach a component and return it to its pool. Returns whether the
    /// entity had one.
    pub fn remove_component(&mut self, id: EntityId, kind: ComponentKind) -> bool {
        let Some(component) = self.record_mut(id).and_then(|r| r.detach(kind)) else {
            return false;
        };
        self.pools.release(component);
        self.structure_version += 1;
        true
    }

    /// Detach every component from an entity without pooling them.
    pub(crate) fn take_components(&mut self, id: EntityId) -> Vec<Component> {
        let Some(record) = self.record_mut(id) else {
            return Vec::new();
        };
        let taken: Vec<Component> = record.detach_all().collect();
        if !taken.is_empty() {
            self.structure_version += 1;
        }
        taken
    }

    pub fn get_component(&self, id: EntityId, kind: ComponentKind) -> Option<&Component> {
        self.record(id)?.get(kind)
    }

    pub fn get_component_mut(&mut self, id: EntityId, kind: ComponentKind) -> Option<&mut Component> {
        self.record_mut(id)?.get_mut(kind)
    }

    /// Typed read access.
    pub fn get<T: ComponentData>(&self, id: EntityId) -> Option<&T> {
        T::from_component(self.get_component(id, T::KIND)?)
    }

    /// Typed write access.
    pub fn get_mut<T: ComponentData>(&mut self, id: EntityId) -> Option<&mut T> {
        T::from_component_mut(self.get_component_mut(id, T::KIND)?)
    }

    pub fn has_component(&self, id: EntityId, kind: ComponentKind) -> bool {
        self.record(id).is_some_and(|r| r.mask.contains(kind))
    }

    /// Component kinds of an entity in attachment order.
    pub fn component_kinds(&self, id: EntityId) -> Vec<ComponentKind> {
        self.record(id)
            .map(|r| r.kinds().collect())
            .unwrap_or_default()
    }

    // -- queries ------------------------------------------------------------

    /// Active entities whose component set is a superset of `kinds`, in
    /// insertion order.
    pub fn query(&self, kinds: &[ComponentKind]) -> Vec<EntityId> {
        self.query_mask(KindMask::of(kinds))
    }

    /// [`query`](Self::query) with a prebuilt mask.
    pub fn query_mask(&self, mask: KindMask) -> Vec<EntityId> {
        self.order
            .iter()
            .copied()
            .filter(|id| self.record(*id).is_some_and(|r| r.mask.is_superset_of(mask)))
            .collect()
    }

    /// Active entities carrying `tag`, in insertion order.
    pub fn query_tagged(&self, tag: &str) -> Vec<EntityId> {
        self.order
            .iter()
            .copied()
            .filter(|id| self.record(*id).is_some_and(|r| r.tags.contains(tag)))
            .collect()
    }

    /// All active entities in insertion order.
    pub fn entities(&self) -> &[EntityId] {
        &self.order
    }

    // -- tags ---------------------------------------------------------------

    /// Add a tag. Returns `false` if the entity is stale or already tagged.
    pub fn add_tag(&mut self, id: EntityId, tag: &str) -> bool {
        match self.record_mut(id) {
            Some(record) => record.tags.insert(tag.to_owned()),
            None => false,
        }
    }

    pub fn remove_tag(&mut self, id: EntityId, tag: &str) -> bool {
        self.record_mut(id).is_some_and(|r| r.tags.remove(tag))
    }

    pub fn has_tag(&self, id: EntityId, tag: &str) -> bool {
        self.record(id).is_some_and(|r| r.tags.contains(tag))
    }

    /// Template an entity was built from, if any.
    pub fn template_of(&self, id: EntityId) -> Option<&str> {
        self.record(id)?.template()
    }

    pub(crate) fn set_template(&mut self, id: EntityId, template: Option<&str>) {
        if let Some(record) = self.record_mut(id) {
            record.template = template.map(str::to_owned);
        }
    }

    // -- pools --------------------------------------------------------------

    pub fn pool_stats(&self, kind: ComponentKind) -> PoolStats {
        self.pools.stats(kind)
    }

    /// Number of retired records waiting for reuse.
    pub fn retired_record_count(&self) -> usize {
        self.retired.len()
    }

    // -- hashing ------------------------------------------------------------

    /// blake3 hash over every active entity's id, tags, and components, in
    /// insertion order. Two worlds driven through the same operations hash
    /// equal.
    pub fn state_hash(&self) -> String {
        #[derive(Serialize)]
        struct HashedEntity<'a> {
            id: EntityId,
            tags: &'a std::collections::BTreeSet<String>,
            components: &'a [Component],
        }

        let mut hasher = blake3::Hasher::new();
        for &id in &self.order {
            let Some(record) = self.record(id) else {
                continue;
            };
            let entry = HashedEntity {
                id,
                tags: &record.tags,
                components: &record.components,
            };
            match serde_json::to_vec(&entry) {
                Ok(bytes) => {
                    hasher.update(&bytes);
                }
                Err(e) => {
                    tracing::warn!(entity = %id, error = %e, "state_hash: failed to serialize entity");
                }
            }
        }
        hasher.finalize().to_hex().to_string()
    }

    // -- internals ----------------------------------------------------------

    fn slot_mut(&mut self, id: EntityId) -> Option<&mut Slot> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        (slot.generation == id.generation()).then_some(slot)
    }

    /// The record behind `id`, if the handle is current and the entity active.
    fn record(&self, id: EntityId) -> Option<&EntityRecord> {
        let slot = self.slots.get(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.record.as_ref().filter(|r| r.active)
    }

    fn record_mut(&mut self, id: EntityId) -> Option<&mut EntityRecord> {
        self.slot_mut(id)?.record.as_mut().filter(|r| r.active)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Entity handles and entity records.
//!
//! An [`EntityId`] is a 64-bit handle that packs a *generation* counter in the
//! high 32 bits and a slot *index* in the low 32 bits. The generation is bumped
//! whenever a slot is retired, so a handle held across a destroy is detected as
//! stale instead of silently aliasing the slot's next occupant.
//!
//! An [`EntityRecord`] is the entity itself: its components in attachment
//! order, its tags, its active flag, and the cached [`KindMask`].

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::component::{Component, ComponentKind, KindMask};

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// A generational entity handle.
///
/// Layout: `[generation: u32 | index: u32]`
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    #[inline]
    pub fn new(index: u32, generation: u32) -> Self {
        Self((generation as u64) << 32 | index as u64)
    }

    /// Slot index (low 32 bits).
    #[inline]
    pub fn index(self) -> u32 {
        self.0 as u32
    }

    /// Generation (high 32 bits).
    #[inline]
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({}v{})", self.index(), self.generation())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

// ---------------------------------------------------------------------------
// EntityRecord
// ---------------------------------------------------------------------------

/// One entity: components keyed by kind (at most one per kind), tags, and the
/// active flag.
///
/// Components are kept in attachment order. With at most nine kinds a linear
/// scan is cheaper than any map, and the order doubles as the attachment log
/// the factory's dependency ordering can be checked against.
#[derive(Debug, Clone)]
pub struct EntityRecord {
    pub(crate) id: EntityId,
    pub(crate) active: bool,
    pub(crate) components: Vec<Component>,
    pub(crate) mask: KindMask,
    pub(crate) tags: BTreeSet<String>,
    /// Template this entity was built from, if any.
    pub(crate) template: Option<String>,
}

impl EntityRecord {
    pub(crate) fn new(id: EntityId) -> Self {
        Self {
            id,
            active: true,
            components: Vec::with_capacity(ComponentKind::COUNT),
            mask: KindMask::EMPTY,
            tags: BTreeSet::new(),
            template: None,
        }
    }

    /// Re-arm a retired record for a new occupant. Buffers keep their capacity.
    pub(crate) fn rearm(&mut self, id: EntityId) {
        debug_assert!(self.components.is_empty());
        self.id = id;
        self.active = true;
        self.mask = KindMask::EMPTY;
        self.tags.clear();
        self.template = None;
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn mask(&self) -> KindMask {
        self.mask
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    /// Component kinds in the order they were attached.
    pub fn kinds(&self) -> impl Iterator<Item = ComponentKind> + '_ {
        self.components.iter().map(Component::kind)
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn get(&self, kind: ComponentKind) -> Option<&Component> {
        if !self.mask.contains(kind) {
            return None;
        }
        self.components.iter().find(|c| c.kind() == kind)
    }

    pub(crate) fn get_mut(&mut self, kind: ComponentKind) -> Option<&mut Component> {
        if !self.mask.contains(kind) {
            return None;
        }
        self.components.iter_mut().find(|c| c.kind() == kind)
    }

    /// Attach a component. The caller guarantees the kind is not present.
    pub(crate) fn attach(&mut self, component: Component) {
        debug_assert!(!self.mask.contains(component.kind()));
        self.mask.insert(component.kind());
        self.components.push(component);
    }

    pub(crate) fn detach(&mut self, kind: ComponentKind) -> Option<Component> {
        if !self.mask.contains(kind) {
            return None;
        }
        let pos = self.components.iter().position(|c| c.kind() == kind)?;
        self.mask.remove(kind);
        Some(self.components.remove(pos))
    }

    /// Detach every component, in attachment order.
    pub(crate) fn detach_all(&mut self) -> std::vec::Drain<'_, Component> {
        self.mask = KindMask::EMPTY;
        self.components.drain(..)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! The entity factory: resolves templates into dependency-ordered component
//! construction and keeps per-template pools of returned entities.
//!
//! Construction is all-or-nothing. Any failure while attaching, tagging, or
//! validating destroys the partially built entity before the error reaches
//! the caller, so a failed [`create_entity`](EntityFactory::create_entity)
//! leaves the registry's active-entity count unchanged.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};

use crate::component::{Component, ComponentKind, KindMask};
use crate::entity::EntityId;
use crate::template::{merge_params, EntityTemplate, NamedTemplate};
use crate::world::World;
use crate::EcsError;

/// Per-entity creation config: an optional override object per component
/// kind, keyed by the kind's label (`{"transform": {"x": 5.0}}`).
pub type SpawnConfig = serde_json::Map<String, serde_json::Value>;

/// Default number of returned entities kept per template.
pub const DEFAULT_TEMPLATE_POOL_CAPACITY: usize = 64;

/// Builds entities from registered templates.
#[derive(Debug)]
pub struct EntityFactory {
    /// Templates with inheritance already resolved.
    templates: HashMap<String, EntityTemplate>,
    /// Deactivated entities per template, ready for reuse.
    pools: HashMap<String, Vec<EntityId>>,
    pooling_enabled: bool,
    template_pool_capacity: usize,
}

impl Default for EntityFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityFactory {
    /// A factory with pooling enabled at the default capacity.
    pub fn new() -> Self {
        Self::with_pooling(true, DEFAULT_TEMPLATE_POOL_CAPACITY)
    }

    pub fn with_pooling(enabled: bool, template_pool_capacity: usize) -> Self {
        Self {
            templates: HashMap::new(),
            pools: HashMap::new(),
            pooling_enabled: enabled,
            template_pool_capacity,
        }
    }

    // -- templates ----------------------------------------------------------

    /// Register (or replace) a template.
    ///
    /// The parent named by `extends` must already be registered; its
    /// resolved form is overlaid with `template` before validation.
    pub fn register_template(&mut self, name: &str, template: EntityTemplate) -> Result<(), EcsError> {
        let resolved = match &template.extends {
            Some(parent) => {
                let base = self
                    .templates
                    .get(parent)
                    .ok_or_else(|| EcsError::TemplateNotFound { name: parent.clone() })?;
                base.overlay(&template)
            }
            None => template,
        };
        resolved.validate(name)?;
        debug!(
            template = name,
            components = resolved.components.len(),
            parent = resolved.extends.as_deref().unwrap_or("-"),
            "template registered"
        );
        self.templates.insert(name.to_owned(), resolved);
        Ok(())
    }

    /// Register every template in a JSON array of named templates, in order.
    ///
    /// Parents must precede their children in the array. Returns the number
    /// of templates registered; stops at the first error.
    pub fn register_templates_json(&mut self, json: &str) -> Result<usize, EcsError> {
        let named: Vec<NamedTemplate> =
            serde_json::from_str(json).map_err(|e| EcsError::InvalidTemplate {
                details: e.to_string(),
            })?;
        let count = named.len();
        for NamedTemplate { name, template } in named {
            self.register_template(&name, template)?;
        }
        Ok(count)
    }

    /// The resolved template registered under `name`.
    pub fn template(&self, name: &str) -> Option<&EntityTemplate> {
        self.templates.get(name)
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Registered template names, sorted.
    pub fn template_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// The order in which `name`'s components would be attached.
    pub fn construction_order(&self, name: &str) -> Result<Vec<ComponentKind>, EcsError> {
        let template = self.lookup(name)?;
        let mut pending: BTreeSet<ComponentKind> = template.components.keys().copied().collect();
        let mut attached = KindMask::EMPTY;
        let mut order = Vec::with_capacity(pending.len());
        while !pending.is_empty() {
            let ready = template.ready_kinds(&pending, attached);
            if ready.is_empty() {
                return Err(EcsError::CircularComponentDependency {
                    template: name.to_owned(),
                    stuck: pending.into_iter().collect(),
                });
            }
            for kind in ready {
                pending.remove(&kind);
                attached.insert(kind);
                order.push(kind);
            }
        }
        Ok(order)
    }

    // -- creation -----------------------------------------------------------

    /// Build an entity from the template `name`.
    ///
    /// With pooling enabled an entity previously returned for the same
    /// template is reused: its components are reset and reconfigured instead
    /// of freshly constructed.
    pub fn create_entity(
        &mut self,
        world: &mut World,
        name: &str,
        config: &SpawnConfig,
    ) -> Result<EntityId, EcsError> {
        let template = self
            .templates
            .get(name)
            .ok_or_else(|| EcsError::TemplateNotFound { name: name.to_owned() })?;

        let recycled = if self.pooling_enabled {
            self.pools.get_mut(name).and_then(Vec::pop)
        } else {
            None
        };

        let (entity, mut stash) = match recycled.map(|parked| (parked, world.reactivate(parked))) {
            Some((_, Some(id))) => {
                let stash = world.take_components(id);
                debug!(template = name, entity = %id, "reusing pooled entity");
                (id, stash)
            }
            Some((parked, None)) => {
                warn!(template = name, entity = %parked, "pooled entity was no longer reserved; creating fresh");
                (world.create(), Vec::new())
            }
            None => (world.create(), Vec::new()),
        };
        world.set_template(entity, Some(name));

        let built = build_entity(world, entity, name, template, config, &mut stash);

        // Whatever the pooled entity carried that the template no longer needs.
        for component in stash {
            world.release_component(component);
        }

        if let Err(e) = built {
            world.destroy(entity);
            warn!(template = name, error = %e, "entity construction rolled back");
            return Err(e);
        }
        Ok(entity)
    }

    // -- pooling ------------------------------------------------------------

    /// Reset an entity and keep it for reuse by `name`.
    ///
    /// When pooling is disabled, the template is unknown, or its pool is at
    /// capacity, the entity is destroyed instead. Returns whether it was
    /// pooled.
    pub fn return_to_pool(&mut self, world: &mut World, entity: EntityId, name: &str) -> bool {
        let pooled_len = self.pools.get(name).map_or(0, Vec::len);
        if !self.pooling_enabled
            || !self.templates.contains_key(name)
            || pooled_len >= self.template_pool_capacity
        {
            world.destroy(entity);
            return false;
        }
        let Some(parked) = world.deactivate(entity) else {
            return false;
        };
        self.pools.entry(name.to_owned()).or_default().push(parked);
        debug!(template = name, entity = %entity, pooled = pooled_len + 1, "entity returned to pool");
        true
    }

    /// Number of pooled entities waiting for `name`.
    pub fn pooled_count(&self, name: &str) -> usize {
        self.pools.get(name).map_or(0, Vec::len)
    }

    pub fn pooling_enabled(&self) -> bool {
        self.pooling_enabled
    }

    /// Enable or disable pooling. Disabling releases every pooled entity.
    pub fn set_pooling(&mut self, world: &mut World, enabled: bool) {
        self.pooling_enabled = enabled;
        if !enabled {
            self.drain_pools(world);
        }
    }

    /// Change the per-template capacity, releasing surplus pooled entities.
    pub fn set_template_pool_capacity(&mut self, world: &mut World, capacity: usize) {
        self.template_pool_capacity = capacity;
        for pool in self.pools.values_mut() {
            while pool.len() > capacity {
                if let Some(id) = pool.pop() {
                    world.retire(id);
                }
            }
        }
    }

    /// Release every pooled entity back to the registry.
    pub fn drain_pools(&mut self, world: &mut World) {
        for (_, pool) in self.pools.drain() {
            for id in pool {
                world.retire(id);
            }
        }
    }

    fn lookup(&self, name: &str) -> Result<&EntityTemplate, EcsError> {
        self.templates
            .get(name)
            .ok_or_else(|| EcsError::TemplateNotFound { name: name.to_owned() })
    }
}

/// Attach components in dependency order, tag, and validate.
fn build_entity(
    world: &mut World,
    entity: EntityId,
    name: &str,
    template: &EntityTemplate,
    config: &SpawnConfig,
    stash: &mut Vec<Component>,
) -> Result<(), EcsError> {
    let mut pending: BTreeSet<ComponentKind> = template.components.keys().copied().collect();
    let mut attached = KindMask::EMPTY;

    while !pending.is_empty() {
        let ready = template.ready_kinds(&pending, attached);
        if ready.is_empty() {
            return Err(EcsError::CircularComponentDependency {
                template: name.to_owned(),
                stuck: pending.into_iter().collect(),
            });
        }
        for kind in ready {
            pending.remove(&kind);
            let spec = &template.components[&kind];
            let params = merge_params(&spec.params, config.get(kind.as_str()));

            let mut component = match stash.iter().position(|c| c.kind() == kind) {
                Some(pos) => stash.swap_remove(pos),
                None => world.acquire_component(kind),
            };
            if let Err(e) = component.configure(&params) {
                world.release_component(component);
                return Err(e);
            }
            world.add_component(entity, component)?;
            attached.insert(kind);
        }
    }

    for tag in &template.tags {
        world.add_tag(entity, tag);
    }

    for &kind in &template.required {
        if !world.has_component(entity, kind) {
            return Err(EcsError::MissingRequiredComponent {
                template: name.to_owned(),
                kind,
            });
        }
    }
    if let Some(record) = world.entity(entity) {
        for component in record.components() {
            if let Err(reason) = component.validate() {
                return Err(EcsError::ComponentValidationFailed {
                    template: name.to_owned(),
                    kind: component.kind(),
                    reason,
                });
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Entity templates: named, inheritable blueprints.
//!
//! A template maps component kinds to a [`ComponentSpec`] (default construction
//! params plus the kinds that must be attached first), lists the kinds that
//! must be present once the entity is built, and the tags it receives.
//!
//! Templates are plain serde data so they can be declared in code with the
//! builder methods or loaded from JSON:
//!
//! ```
//! use ember_ecs::template::EntityTemplate;
//! use ember_ecs::component::ComponentKind;
//!
//! let ship = EntityTemplate::new()
//!     .with(ComponentKind::Transform, serde_json::json!({"x": 0.0, "y": 0.0}))
//!     .with_deps(ComponentKind::Velocity, serde_json::json!({"max_speed": 300.0}), &[ComponentKind::Transform])
//!     .require(&[ComponentKind::Transform])
//!     .tag("ship");
//! assert_eq!(ship.components.len(), 2);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::component::ComponentKind;
use crate::EcsError;

// ---------------------------------------------------------------------------
// ComponentSpec
// ---------------------------------------------------------------------------

/// How to construct one component of a template.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentSpec {
    /// Default construction params (a JSON object of record fields).
    pub params: serde_json::Value,
    /// Kinds that must be attached before this one.
    pub depends_on: Vec<ComponentKind>,
}

// ---------------------------------------------------------------------------
// EntityTemplate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityTemplate {
    /// Parent template name. Must be registered before this one.
    pub extends: Option<String>,
    pub components: BTreeMap<ComponentKind, ComponentSpec>,
    pub required: Vec<ComponentKind>,
    pub tags: Vec<String>,
}

impl EntityTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extends(mut self, parent: &str) -> Self {
        self.extends = Some(parent.to_owned());
        self
    }

    /// Declare a component with no dependencies.
    pub fn with(self, kind: ComponentKind, params: serde_json::Value) -> Self {
        self.with_deps(kind, params, &[])
    }

    /// Declare a component that must be attached after `depends_on`.
    pub fn with_deps(
        mut self,
        kind: ComponentKind,
        params: serde_json::Value,
        depends_on: &[ComponentKind],
    ) -> Self {
        self.components.insert(
            kind,
            ComponentSpec {
                params,
                depends_on: depends_on.to_vec(),
            },
        );
        self
    }

    pub fn require(mut self, kinds: &[ComponentKind]) -> Self {
        for kind in kinds {
            if !self.required.contains(kind) {
                self.required.push(*kind);
            }
        }
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        if !self.tags.iter().any(|t| t == tag) {
            self.tags.push(tag.to_owned());
        }
        self
    }

    /// Layer `child` over `self` (the parent).
    ///
    /// Components the child declares override the parent's: params are
    /// shallow-merged with the child's fields winning, and dependency lists
    /// are unioned. Tags and required kinds are unioned.
    pub(crate) fn overlay(&self, child: &EntityTemplate) -> EntityTemplate {
        let mut merged = self.clone();
        merged.extends = child.extends.clone();

        for (kind, spec) in &child.components {
            match merged.components.get_mut(kind) {
                Some(base) => {
                    base.params = merge_params(&base.params, Some(&spec.params));
                    for dep in &spec.depends_on {
                        if !base.depends_on.contains(dep) {
                            base.depends_on.push(*dep);
                        }
                    }
                }
                None => {
                    merged.components.insert(*kind, spec.clone());
                }
            }
        }
        for kind in &child.required {
            if !merged.required.contains(kind) {
                merged.required.push(*kind);
            }
        }
        for tag in &child.tags {
            if !merged.tags.contains(tag) {
                merged.tags.push(tag.clone());
            }
        }
        merged
    }

    /// Check that every required kind and every dependency target is declared.
    ///
    /// Cycles are not rejected here; they surface as
    /// [`EcsError::CircularComponentDependency`] when an entity is built.
    pub(crate) fn validate(&self, name: &str) -> Result<(), EcsError> {
        for kind in &self.required {
            if !self.components.contains_key(kind) {
                return Err(EcsError::UnknownDependency {
                    template: name.to_owned(),
                    dependent: None,
                    missing: *kind,
                });
            }
        }
        for (kind, spec) in &self.components {
            for dep in &spec.depends_on {
                if !self.components.contains_key(dep) {
                    return Err(EcsError::UnknownDependency {
                        template: name.to_owned(),
                        dependent: Some(*kind),
                        missing: *dep,
                    });
                }
            }
        }
        Ok(())
    }

    /// Kinds in `pending` whose dependencies are all in `attached`.
    pub(crate) fn ready_kinds(
        &self,
        pending: &std::collections::BTreeSet<ComponentKind>,
        attached: crate::component::KindMask,
    ) -> Vec<ComponentKind> {
        pending
            .iter()
            .copied()
            .filter(|kind| {
                self.components
                    .get(kind)
                    .is_some_and(|spec| spec.depends_on.iter().all(|d| attached.contains(*d)))
            })
            .collect()
    }
}

/// A template paired with its name, as found in template JSON files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedTemplate {
    pub name: String,
    #[serde(flatten)]
    pub template: EntityTemplate,
}

/// Shallow-merge two JSON objects; keys in `over` win. A missing or
/// non-object `over` leaves `base` as is; a non-object `base` is replaced.
pub fn merge_params(base: &serde_json::Value, over: Option<&serde_json::Value>) -> serde_json::Value {
    use serde_json::Value;

    let Some(Value::Object(over)) = over else {
        return match base {
            Value::Null => Value::Object(serde_json::Map::new()),
            other => other.clone(),
        };
    };
    let mut merged = match base {
        Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    for (key, value) in over {
        merged.insert(key.clone(), value.clone());
    }
    Value::Object(merged)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

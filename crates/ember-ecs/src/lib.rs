//! Ember ECS -- pooled entity registry and template-driven entity factory.
//!
//! Entities are identifier-addressed records owned by the [`World`]; each
//! carries at most one component per [`ComponentKind`], a tag set, and an
//! active flag. Components are a closed sum type ([`Component`]) over nine
//! plain-data records. Destroyed entities hand their components back to
//! bounded per-kind pools, so steady-state spawning does not allocate.
//!
//! The [`EntityFactory`] turns named, inheritable [`EntityTemplate`]s into
//! entities, attaching components in dependency order and rolling the entity
//! back on any failure.
//!
//! # Quick Start
//!
//! ```
//! use ember_ecs::prelude::*;
//! use serde_json::json;
//!
//! let mut world = World::new();
//! let mut factory = EntityFactory::new();
//! factory.register_template(
//!     "rock",
//!     EntityTemplate::new()
//!         .with(ComponentKind::Transform, json!({"x": 10.0, "y": 5.0}))
//!         .with_deps(ComponentKind::Collision, json!({"shape": {"type": "circle", "radius": 4.0}}), &[ComponentKind::Transform])
//!         .require(&[ComponentKind::Transform]),
//! ).unwrap();
//!
//! let rock = factory.create_entity(&mut world, "rock", &SpawnConfig::new()).unwrap();
//! assert_eq!(world.get::<Transform>(rock).unwrap().x, 10.0);
//! assert_eq!(world.query(&[ComponentKind::Collision]), vec![rock]);
//! ```

#![deny(unsafe_code)]

pub mod component;
pub mod components;
pub mod entity;
pub mod factory;
pub mod pool;
pub mod template;
pub mod world;

use component::ComponentKind;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by registry and factory operations.
///
/// Every variant is fatal only to the single operation that produced it; the
/// factory destroys a partially built entity before returning one of these.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EcsError {
    /// The handle refers to a destroyed or recycled entity.
    #[error("entity {entity} does not exist (stale or never allocated)")]
    StaleEntity { entity: entity::EntityId },

    /// A kind label that names none of the component kinds.
    #[error("unknown component kind '{0}'")]
    UnknownComponentKind(String),

    /// The entity already carries a component of this kind.
    #[error("entity {entity} already has a '{kind}' component")]
    DuplicateComponentKind {
        entity: entity::EntityId,
        kind: ComponentKind,
    },

    /// A required kind or dependency target is not declared by the template.
    #[error("template '{template}': {} references undeclared component '{missing}'", describe_dependent(.dependent))]
    UnknownDependency {
        template: String,
        /// The component declaring the dependency; `None` for a required kind.
        dependent: Option<ComponentKind>,
        missing: ComponentKind,
    },

    #[error("template '{name}' is not registered")]
    TemplateNotFound { name: String },

    /// No remaining component could be attached: the pending set contains a
    /// dependency cycle.
    #[error("template '{template}': circular component dependency among [{}]", kind_list(.stuck))]
    CircularComponentDependency {
        template: String,
        stuck: Vec<ComponentKind>,
    },

    #[error("template '{template}': required component '{kind}' missing after construction")]
    MissingRequiredComponent {
        template: String,
        kind: ComponentKind,
    },

    #[error("template '{template}': '{kind}' failed validation: {reason}")]
    ComponentValidationFailed {
        template: String,
        kind: ComponentKind,
        reason: String,
    },

    /// Construction params that do not deserialize into the component record.
    #[error("invalid params for '{kind}': {details}")]
    InvalidComponentParams {
        kind: ComponentKind,
        details: String,
    },

    #[error("invalid template definition: {details}")]
    InvalidTemplate { details: String },
}

fn describe_dependent(dependent: &Option<ComponentKind>) -> String {
    match dependent {
        Some(kind) => format!("component '{kind}'"),
        None => "required list".to_owned(),
    }
}

fn kind_list(kinds: &[ComponentKind]) -> String {
    kinds
        .iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::component::{Component, ComponentData, ComponentKind, KindMask};
    pub use crate::components::{
        Ai, AiBehavior, Collision, Health, Input, Lifetime, Render, Shape, Transform, Velocity,
        Weapon, ANY_LAYER,
    };
    pub use crate::entity::{EntityId, EntityRecord};
    pub use crate::factory::{EntityFactory, SpawnConfig};
    pub use crate::pool::PoolStats;
    pub use crate::template::{ComponentSpec, EntityTemplate};
    pub use crate::world::World;
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------

//! Ember Engine -- frame-driven simulation core on top of [`ember_ecs`].
//!
//! The [`Engine`](engine::Engine) owns the entity registry, the template
//! factory and a fixed-order [`Scheduler`](schedule::Scheduler). Every call
//! to [`update`](engine::Engine::update) runs one frame: velocity
//! integration, grid broad phase and impulse collision response, world-bounds
//! clamping and lifetime expiry, in that order.
//!
//! # Quick Start
//!
//! ```
//! use ember_engine::prelude::*;
//! use serde_json::json;
//!
//! let mut engine = Engine::new(EngineConfig::default()).unwrap();
//! engine.register_template(
//!     "ball",
//!     EntityTemplate::new()
//!         .with(ComponentKind::Transform, json!({}))
//!         .with_deps(ComponentKind::Velocity, json!({"vx": 120.0}), &[ComponentKind::Transform])
//!         .with_deps(ComponentKind::Collision, json!({"shape": {"type": "circle", "radius": 4.0}}), &[ComponentKind::Transform]),
//! ).unwrap();
//!
//! let ball = engine.create_entity("ball", &SpawnConfig::new()).unwrap();
//! engine.update(1.0 / 60.0);
//! assert!(engine.get::<Transform>(ball).unwrap().x > 0.0);
//! ```

#![deny(unsafe_code)]

pub mod bounds;
pub mod clock;
pub mod collision;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod lifetime;
pub mod movement;
pub mod schedule;
pub mod spatial;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

/// Re-export the ECS crate for convenience.
pub use ember_ecs;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    pub use ember_ecs::prelude::*;

    pub use crate::clock::{Clock, ManualClock, MonotonicClock};
    pub use crate::collision::CollisionEvent;
    pub use crate::config::{ConfigError, EngineConfig, WorldBounds};
    pub use crate::diagnostics::{Anomaly, AnomalyCounts, DiagnosticsSummary, FrameTimings};
    pub use crate::engine::{Engine, FrameReport};
    pub use crate::schedule::{FnSystem, FrameContext, FrameOutput, System};
}

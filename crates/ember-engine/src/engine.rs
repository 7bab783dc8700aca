//! The engine facade.
//!
//! [`Engine`] owns the [`World`], the [`EntityFactory`], the [`Scheduler`] and
//! the configuration, and is the surface game logic talks to: create and
//! destroy entities, query them, read their components, and drive one frame
//! per call to [`update`](Engine::update).
//!
//! Built-in systems run in this order every frame: movement, collision,
//! bounds, lifetime. Custom systems added with
//! [`add_system`](Engine::add_system) run after them.

use tracing::{debug, info};

use ember_ecs::prelude::*;

use crate::bounds::{BoundsSystem, BOUNDS_SYSTEM_NAME};
use crate::clock::{Clock, MonotonicClock};
use crate::collision::{CollisionEvent, CollisionSystem, COLLISION_SYSTEM_NAME};
use crate::config::{ConfigError, EngineConfig};
use crate::diagnostics::{Anomaly, AnomalyCounts, DiagnosticsReporter, DiagnosticsSummary, FrameTimings};
use crate::lifetime::LifetimeSystem;
use crate::movement::{MovementSystem, MOVEMENT_SYSTEM_NAME};
use crate::schedule::{FrameContext, FrameOutput, Scheduler, System};

// ---------------------------------------------------------------------------
// FrameReport
// ---------------------------------------------------------------------------

/// Everything one [`Engine::update`] call produced.
#[derive(Debug, Clone, Default)]
pub struct FrameReport {
    pub frame: u64,
    /// The clamped delta the frame actually ran with.
    pub dt: f64,
    /// Overlapping pairs, sorted by entity id.
    pub collisions: Vec<CollisionEvent>,
    pub anomalies: Vec<Anomaly>,
    /// Entities removed after the pass (expired lifetimes).
    pub despawned: Vec<EntityId>,
    pub timings: FrameTimings,
    /// Present on frames that closed a diagnostics window.
    pub summary: Option<DiagnosticsSummary>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine {
    world: World,
    factory: EntityFactory,
    scheduler: Scheduler,
    config: EngineConfig,
    clock: Box<dyn Clock>,
    diagnostics: DiagnosticsReporter,
    /// Reused between frames.
    output: FrameOutput,
    frame: u64,
    sim_time: f64,
    running: bool,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("world", &self.world)
            .field("scheduler", &self.scheduler)
            .field("frame", &self.frame)
            .field("running", &self.running)
            .finish()
    }
}

impl Engine {
    /// Create an engine with the wall clock.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Box::new(MonotonicClock::new()))
    }

    /// Create an engine with an explicit time source.
    pub fn with_clock(config: EngineConfig, clock: Box<dyn Clock>) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut scheduler = Scheduler::new();
        scheduler.add_system(Box::new(MovementSystem::new()));
        scheduler.add_system_after(Box::new(CollisionSystem::new(&config)), &[MOVEMENT_SYSTEM_NAME]);
        scheduler.add_system_after(Box::new(BoundsSystem::new()), &[COLLISION_SYSTEM_NAME]);
        scheduler.add_system_after(Box::new(LifetimeSystem::new()), &[BOUNDS_SYSTEM_NAME]);

        Ok(Self {
            world: World::with_capacities(config.entity_pool_capacity, config.component_pool_capacity),
            factory: EntityFactory::with_pooling(config.pooling_enabled, config.template_pool_capacity),
            scheduler,
            config,
            clock,
            diagnostics: DiagnosticsReporter::new(),
            output: FrameOutput::default(),
            frame: 0,
            sim_time: 0.0,
            running: true,
        })
    }

    /// Build from a flat key/value configuration map.
    pub fn from_flat_config(map: &serde_json::Map<String, serde_json::Value>) -> Result<Self, ConfigError> {
        Self::new(EngineConfig::from_flat(map)?)
    }

    // -- templates and entities ---------------------------------------------

    pub fn register_template(&mut self, name: &str, template: EntityTemplate) -> Result<(), EcsError> {
        self.factory.register_template(name, template)
    }

    pub fn register_templates_json(&mut self, json: &str) -> Result<usize, EcsError> {
        self.factory.register_templates_json(json)
    }

    /// Build an entity from a registered template. On error no entity is left
    /// behind.
    pub fn create_entity(&mut self, template: &str, config: &SpawnConfig) -> Result<EntityId, EcsError> {
        self.factory.create_entity(&mut self.world, template, config)
    }

    /// Remove an entity. Entities built from a template go back to that
    /// template's pool when pooling is enabled. Returns `false` for stale
    /// handles.
    pub fn destroy_entity(&mut self, entity: EntityId) -> bool {
        if !self.world.is_alive(entity) {
            return false;
        }
        match self.world.template_of(entity).map(str::to_owned) {
            Some(template) if self.factory.pooling_enabled() => {
                self.factory.return_to_pool(&mut self.world, entity, &template);
                true
            }
            _ => self.world.destroy(entity),
        }
    }

    /// Active entities carrying every kind in `kinds`, in insertion order.
    pub fn query_entities(&self, kinds: &[ComponentKind]) -> Vec<EntityId> {
        self.world.query(kinds)
    }

    /// [`query_entities`](Self::query_entities) by kind label.
    pub fn query_entities_by_name(&self, kinds: &[&str]) -> Result<Vec<EntityId>, EcsError> {
        let kinds = kinds
            .iter()
            .map(|k| k.parse::<ComponentKind>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.world.query(&kinds))
    }

    pub fn get_component(&self, entity: EntityId, kind: ComponentKind) -> Option<&Component> {
        self.world.get_component(entity, kind)
    }

    pub fn get<T: ComponentData>(&self, entity: EntityId) -> Option<&T> {
        self.world.get::<T>(entity)
    }

    pub fn get_mut<T: ComponentData>(&mut self, entity: EntityId) -> Option<&mut T> {
        self.world.get_mut::<T>(entity)
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Direct registry access for setup and tests.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn factory(&self) -> &EntityFactory {
        &self.factory
    }

    // -- systems --------------------------------------------------------------

    /// Append a system after the built-in ones.
    ///
    /// # Panics
    ///
    /// Panics if the name is already taken.
    pub fn add_system(&mut self, system: Box<dyn System>) {
        self.scheduler.add_system(system);
    }

    /// Append a system that must run after the named systems.
    ///
    /// # Panics
    ///
    /// Panics on a duplicate name or an unregistered dependency.
    pub fn add_system_after(&mut self, system: Box<dyn System>, after: &[&str]) {
        self.scheduler.add_system_after(system, after);
    }

    pub fn system_names(&self) -> Vec<&str> {
        self.scheduler.system_names()
    }

    // -- frame ----------------------------------------------------------------

    /// Run one frame. `dt` is clamped into `[min_dt, max_dt]`.
    ///
    /// Returns `None` without touching any state while the engine is stopped.
    pub fn update(&mut self, dt: f64) -> Option<FrameReport> {
        if !self.running {
            return None;
        }
        let frame_start = self.clock.now();
        let dt = self.config.clamp_dt(dt);
        self.frame += 1;

        self.output.clear();
        let ctx = FrameContext {
            dt,
            frame: self.frame,
            time: self.sim_time,
            config: &self.config,
        };
        let systems = self
            .scheduler
            .run(&mut self.world, &ctx, self.clock.as_ref(), &mut self.output);

        let mut despawned = Vec::with_capacity(self.output.despawn.len());
        let queued = std::mem::take(&mut self.output.despawn);
        for entity in &queued {
            if self.destroy_entity(*entity) {
                despawned.push(*entity);
            }
        }
        self.output.despawn = queued;
        self.sim_time += dt;

        let timings = FrameTimings {
            systems,
            total: self.clock.now().saturating_sub(frame_start),
        };
        let summary = self.diagnostics.record_frame(
            self.frame,
            dt,
            &timings,
            &self.output.anomalies,
            self.world.entity_count(),
            self.config.frame_budget_ms,
            self.config.diagnostics_interval,
        );

        Some(FrameReport {
            frame: self.frame,
            dt,
            collisions: self.output.collisions.clone(),
            anomalies: self.output.anomalies.clone(),
            despawned,
            timings,
            summary,
        })
    }

    /// Stop between frames; subsequent [`update`](Self::update) calls are
    /// no-ops until [`resume`](Self::resume).
    pub fn stop(&mut self) {
        if self.running {
            info!(frame = self.frame, "engine stopped");
        }
        self.running = false;
    }

    pub fn resume(&mut self) {
        if !self.running {
            info!(frame = self.frame, "engine resumed");
        }
        self.running = true;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    /// Simulated seconds, the sum of clamped frame deltas.
    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    pub fn anomaly_totals(&self) -> AnomalyCounts {
        self.diagnostics.total_anomalies()
    }

    // -- configuration ----------------------------------------------------------

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Replace the configuration. Pool capacities are resized and systems
    /// notified; on error the current configuration stays in place.
    pub fn apply_config(&mut self, config: EngineConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.world
            .set_pool_capacities(config.entity_pool_capacity, config.component_pool_capacity);
        self.factory
            .set_template_pool_capacity(&mut self.world, config.template_pool_capacity);
        if config.pooling_enabled != self.factory.pooling_enabled() {
            self.factory.set_pooling(&mut self.world, config.pooling_enabled);
        }
        self.scheduler.notify_config_changed(&config);
        self.config = config;
        info!("engine configuration applied");
        Ok(())
    }

    /// Change-notification callback for a single flat configuration key.
    pub fn on_config_changed(&mut self, key: &str, value: &serde_json::Value) -> Result<(), ConfigError> {
        let mut config = self.config.clone();
        config.set_flat(key, value)?;
        debug!(key, %value, "configuration key changed");
        self.apply_config(config)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

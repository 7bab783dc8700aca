//! System scheduler.
//!
//! The [`Scheduler`] holds systems in a fixed execution order. Each frame it
//! walks them in that order; for every system it queries the world for the
//! entities matching the system's component signature and hands them to
//! [`System::update`] together with the [`FrameContext`].
//!
//! Because the order is fixed and queries return entities in insertion
//! order, a frame is deterministic: same world, same systems, same `dt`
//! gives the same result.
//!
//! # Example
//!
//! ```
//! use ember_engine::prelude::*;
//! use ember_engine::schedule::{FnSystem, Scheduler};
//!
//! let mut scheduler = Scheduler::new();
//! scheduler.add_system(Box::new(FnSystem::new(
//!     "heal",
//!     &[ComponentKind::Health],
//!     |world, entities, ctx, _out| {
//!         for &e in entities {
//!             if let Some(h) = world.get_mut::<Health>(e) {
//!                 h.heal(10.0 * ctx.dt);
//!             }
//!         }
//!     },
//! )));
//! assert_eq!(scheduler.system_names(), vec!["heal"]);
//! ```

use std::time::Duration;

use ember_ecs::prelude::*;

use crate::clock::Clock;
use crate::collision::CollisionEvent;
use crate::config::EngineConfig;
use crate::diagnostics::Anomaly;

// ---------------------------------------------------------------------------
// FrameContext / FrameOutput
// ---------------------------------------------------------------------------

/// Read-only inputs shared by every system during one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext<'a> {
    /// Clamped frame delta in seconds.
    pub dt: f64,
    /// Frame number, starting at 1.
    pub frame: u64,
    /// Simulated time at the start of this frame.
    pub time: f64,
    pub config: &'a EngineConfig,
}

/// What systems report back from a frame.
#[derive(Debug, Clone, Default)]
pub struct FrameOutput {
    pub anomalies: Vec<Anomaly>,
    pub collisions: Vec<CollisionEvent>,
    /// Entities to remove once every system has run.
    pub despawn: Vec<EntityId>,
}

impl FrameOutput {
    /// Record a skipped entity and log it.
    pub fn skip_entity(&mut self, system: &str, entity: EntityId, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(system, entity = %entity, %reason, "entity skipped this frame");
        self.anomalies.push(Anomaly::CorruptEntitySkipped {
            entity,
            system: system.to_owned(),
            reason,
        });
    }

    pub fn clear(&mut self) {
        self.anomalies.clear();
        self.collisions.clear();
        self.despawn.clear();
    }
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

/// A unit of per-frame logic.
pub trait System {
    /// Unique name used for ordering and diagnostics.
    fn name(&self) -> &str;

    /// Component kinds an entity must carry to be passed to [`update`](Self::update).
    fn signature(&self) -> KindMask;

    /// Process the matching entities, in insertion order.
    fn update(
        &mut self,
        world: &mut World,
        entities: &[EntityId],
        ctx: &FrameContext<'_>,
        out: &mut FrameOutput,
    );

    /// Called after the engine configuration has been replaced.
    fn on_config_changed(&mut self, _config: &EngineConfig) {}
}

/// A [`System`] built from a closure.
pub struct FnSystem<F> {
    name: String,
    signature: KindMask,
    func: F,
}

impl<F> FnSystem<F>
where
    F: FnMut(&mut World, &[EntityId], &FrameContext<'_>, &mut FrameOutput),
{
    pub fn new(name: &str, kinds: &[ComponentKind], func: F) -> Self {
        Self {
            name: name.to_owned(),
            signature: KindMask::of(kinds),
            func,
        }
    }
}

impl<F> System for FnSystem<F>
where
    F: FnMut(&mut World, &[EntityId], &FrameContext<'_>, &mut FrameOutput),
{
    fn name(&self) -> &str {
        &self.name
    }

    fn signature(&self) -> KindMask {
        self.signature
    }

    fn update(
        &mut self,
        world: &mut World,
        entities: &[EntityId],
        ctx: &FrameContext<'_>,
        out: &mut FrameOutput,
    ) {
        (self.func)(world, entities, ctx, out);
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

struct RegisteredSystem {
    name: String,
    system: Box<dyn System>,
}

/// Ordered system registry.
///
/// Systems run in registration order. A system declaring `after`
/// dependencies may only be added once those systems are in place, so the
/// order always honors every declared dependency and can never contain a
/// cycle.
#[derive(Default)]
pub struct Scheduler {
    systems: Vec<RegisteredSystem>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("systems", &self.system_names())
            .finish()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a system to the execution order.
    ///
    /// # Panics
    ///
    /// Panics if a system with the same name is already registered.
    pub fn add_system(&mut self, system: Box<dyn System>) {
        self.add_system_after(system, &[]);
    }

    /// Append a system that must run after each system named in `after`.
    ///
    /// # Panics
    ///
    /// Panics if a name in `after` is not registered yet, or if a system
    /// with this name already exists.
    pub fn add_system_after(&mut self, system: Box<dyn System>, after: &[&str]) {
        let name = system.name().to_owned();
        if self.position(&name).is_some() {
            panic!("duplicate system name: {name:?}");
        }
        if let Some(missing) = after.iter().find(|dep| self.position(dep).is_none()) {
            panic!("system {name:?} must run after {missing:?}, which is not registered");
        }
        self.systems.push(RegisteredSystem { name, system });
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.systems.iter().position(|s| s.name == name)
    }

    /// Run every system once, in order. Returns the wall time spent in each.
    pub fn run(
        &mut self,
        world: &mut World,
        ctx: &FrameContext<'_>,
        clock: &dyn Clock,
        out: &mut FrameOutput,
    ) -> Vec<(String, Duration)> {
        let mut times = Vec::with_capacity(self.systems.len());
        for registered in &mut self.systems {
            let start = clock.now();
            let entities = world.query_mask(registered.system.signature());
            registered.system.update(world, &entities, ctx, out);
            times.push((registered.name.clone(), clock.now().saturating_sub(start)));
        }
        times
    }

    /// Forward a configuration change to every system.
    pub fn notify_config_changed(&mut self, config: &EngineConfig) {
        for registered in &mut self.systems {
            registered.system.on_config_changed(config);
        }
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Names of all registered systems, in execution order.
    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.name.as_str()).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder(name: &'static str, log: Rc<RefCell<Vec<&'static str>>>) -> Box<dyn System> {
        Box::new(FnSystem::new(name, &[], move |_w, _e, _c, _o| {
            log.borrow_mut().push(name);
        }))
    }

    fn run_once(scheduler: &mut Scheduler, world: &mut World) -> FrameOutput {
        let config = EngineConfig::default();
        let ctx = FrameContext {
            dt: 1.0 / 60.0,
            frame: 1,
            time: 0.0,
            config: &config,
        };
        let mut out = FrameOutput::default();
        scheduler.run(world, &ctx, &ManualClock::new(), &mut out);
        out
    }

    #[test]
    fn systems_run_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut scheduler = Scheduler::new();
        scheduler.add_system(recorder("alpha", log.clone()));
        scheduler.add_system_after(recorder("beta", log.clone()), &["alpha"]);
        scheduler.add_system(recorder("gamma", log.clone()));

        let mut world = World::new();
        run_once(&mut scheduler, &mut world);
        run_once(&mut scheduler, &mut world);
        assert_eq!(*log.borrow(), vec!["alpha", "beta", "gamma", "alpha", "beta", "gamma"]);
        assert_eq!(scheduler.system_count(), 3);
    }

    #[test]
    #[should_panic(expected = "duplicate system name")]
    fn duplicate_system_name_panics() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut scheduler = Scheduler::new();
        scheduler.add_system(recorder("physics", log.clone()));
        scheduler.add_system(recorder("physics", log));
    }

    #[test]
    #[should_panic(expected = "is not registered")]
    fn unknown_dependency_panics() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut scheduler = Scheduler::new();
        scheduler.add_system_after(recorder("render", log), &["physics"]);
    }

    #[test]
    #[should_panic(expected = "is not registered")]
    fn depending_on_itself_panics() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut scheduler = Scheduler::new();
        scheduler.add_system_after(recorder("loop", log), &["loop"]);
    }

    #[test]
    fn dependencies_always_run_first() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut scheduler = Scheduler::new();
        scheduler.add_system(recorder("input", log.clone()));
        scheduler.add_system(recorder("physics", log.clone()));
        scheduler.add_system_after(recorder("audio", log.clone()), &["physics", "input"]);

        let mut world = World::new();
        run_once(&mut scheduler, &mut world);
        let order = log.borrow();
        let at = |name| order.iter().position(|n| *n == name).unwrap();
        assert!(at("audio") > at("physics"));
        assert!(at("audio") > at("input"));
    }

    #[test]
    fn systems_receive_only_matching_entities() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let mut scheduler = Scheduler::new();
        scheduler.add_system(Box::new(FnSystem::new(
            "movers",
            &[ComponentKind::Transform, ComponentKind::Velocity],
            move |_w, entities, _c, _o| sink.borrow_mut().extend_from_slice(entities),
        )));

        let mut world = World::new();
        let a = world.create();
        world.add_component(a, Transform::default()).unwrap();
        let b = world.create();
        world.add_component(b, Transform::default()).unwrap();
        world.add_component(b, Velocity::default()).unwrap();

        run_once(&mut scheduler, &mut world);
        assert_eq!(*seen.borrow(), vec![b]);
    }

    #[test]
    fn later_systems_see_earlier_writes() {
        let mut scheduler = Scheduler::new();
        scheduler.add_system(Box::new(FnSystem::new(
            "spawn",
            &[],
            |world, _e, _c, _o| {
                if world.query(&[ComponentKind::Health]).is_empty() {
                    let e = world.create();
                    world.add_component(e, Health::default()).unwrap();
                }
            },
        )));
        scheduler.add_system(Box::new(FnSystem::new(
            "reap",
            &[ComponentKind::Health],
            |_w, entities, _c, out| out.despawn.extend_from_slice(entities),
        )));

        let mut world = World::new();
        let out = run_once(&mut scheduler, &mut world);
        assert_eq!(out.despawn.len(), 1);
    }
}

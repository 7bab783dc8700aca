//! Velocity integration.
//!
//! For every entity with a transform and a velocity, one step:
//!
//! 1. snapshot the previous position,
//! 2. add gravity to the force buffer, integrate `v += a * dt`, clear the buffer,
//! 3. apply drag as `v *= drag^(dt * 60)` (decay referenced to 60 Hz),
//! 4. clamp the speed by uniform rescaling, settle tiny components to zero,
//! 5. integrate `p += v * dt` and sanitize the result.
//!
//! A non-finite position is reset to the origin with the velocity stopped; a
//! position beyond `max_position` is clamped component-wise. Both are
//! reported as anomalies and never abort the pass.

use tracing::{debug, warn};

use ember_ecs::prelude::*;

use crate::config::EngineConfig;
use crate::diagnostics::Anomaly;
use crate::schedule::{FrameContext, FrameOutput, System};

/// Reference frame rate for drag.
pub const DRAG_REFERENCE_HZ: f64 = 60.0;

pub const MOVEMENT_SYSTEM_NAME: &str = "movement";

/// What [`integrate`] had to correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionFix {
    None,
    Recovered,
    Clamped,
}

/// Advance one transform/velocity pair by `dt` seconds.
pub fn integrate(transform: &mut Transform, velocity: &mut Velocity, config: &EngineConfig, dt: f64) -> PositionFix {
    transform.snapshot();

    velocity.ax += config.gravity_x * velocity.gravity_scale;
    velocity.ay += config.gravity_y * velocity.gravity_scale;
    velocity.vx += velocity.ax * dt;
    velocity.vy += velocity.ay * dt;
    velocity.ax = 0.0;
    velocity.ay = 0.0;

    let drag = velocity.drag.unwrap_or(config.default_drag);
    if drag < 1.0 {
        let factor = drag.powf(dt * DRAG_REFERENCE_HZ);
        velocity.vx *= factor;
        velocity.vy *= factor;
    }

    let max_speed = velocity.max_speed.unwrap_or(config.max_velocity);
    let speed = velocity.speed();
    if speed > max_speed && speed > 0.0 {
        let scale = max_speed / speed;
        velocity.vx *= scale;
        velocity.vy *= scale;
    }

    if velocity.vx.abs() < config.min_velocity {
        velocity.vx = 0.0;
    }
    if velocity.vy.abs() < config.min_velocity {
        velocity.vy = 0.0;
    }

    transform.x += velocity.vx * dt;
    transform.y += velocity.vy * dt;

    sanitize_position(transform, velocity, config.max_position)
}

fn sanitize_position(transform: &mut Transform, velocity: &mut Velocity, max_position: f64) -> PositionFix {
    if !(transform.x.is_finite() && transform.y.is_finite()) {
        transform.x = 0.0;
        transform.y = 0.0;
        velocity.stop();
        return PositionFix::Recovered;
    }
    if transform.x.abs() > max_position || transform.y.abs() > max_position {
        transform.x = transform.x.clamp(-max_position, max_position);
        transform.y = transform.y.clamp(-max_position, max_position);
        return PositionFix::Clamped;
    }
    PositionFix::None
}

/// Integrates every `{transform, velocity}` entity.
#[derive(Debug, Default)]
pub struct MovementSystem;

impl MovementSystem {
    pub fn new() -> Self {
        Self
    }
}

impl System for MovementSystem {
    fn name(&self) -> &str {
        MOVEMENT_SYSTEM_NAME
    }

    fn signature(&self) -> KindMask {
        KindMask::of(&[ComponentKind::Transform, ComponentKind::Velocity])
    }

    fn update(&mut self, world: &mut World, entities: &[EntityId], ctx: &FrameContext<'_>, out: &mut FrameOutput) {
        for &entity in entities {
            let Some(mut velocity) = world.get::<Velocity>(entity).copied() else {
                out.skip_entity(MOVEMENT_SYSTEM_NAME, entity, "missing velocity");
                continue;
            };
            let Some(transform) = world.get_mut::<Transform>(entity) else {
                out.skip_entity(MOVEMENT_SYSTEM_NAME, entity, "missing transform");
                continue;
            };

            let fix = integrate(transform, &mut velocity, ctx.config, ctx.dt);
            let (x, y) = transform.position();
            if let Some(v) = world.get_mut::<Velocity>(entity) {
                *v = velocity;
            }

            match fix {
                PositionFix::None => {}
                PositionFix::Recovered => {
                    warn!(entity = %entity, "non-finite position reset to origin");
                    out.anomalies.push(Anomaly::InvalidPositionRecovered { entity });
                }
                PositionFix::Clamped => {
                    debug!(entity = %entity, x, y, "position clamped to max_position");
                    out.anomalies.push(Anomaly::ExtremePositionClamped { entity });
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const REFERENCE_DT: f64 = 1.0 / DRAG_REFERENCE_HZ;

    #[test]
    fn position_follows_velocity_and_snapshots_previous() {
        let config = EngineConfig::default();
        let mut t = Transform::at(10.0, 10.0);
        let mut v = Velocity::new(60.0, -30.0);
        integrate(&mut t, &mut v, &config, 0.5);
        assert_eq!((t.x, t.y), (40.0, -5.0));
        assert_eq!((t.prev_x, t.prev_y), (10.0, 10.0));
    }

    #[test]
    fn acceleration_is_consumed_once() {
        let config = EngineConfig::default();
        let mut t = Transform::default();
        let mut v = Velocity::default();
        v.apply_force(100.0, 0.0);
        integrate(&mut t, &mut v, &config, 0.1);
        assert!((v.vx - 10.0).abs() < 1e-12);
        assert_eq!((v.ax, v.ay), (0.0, 0.0));
        integrate(&mut t, &mut v, &config, 0.1);
        assert!((v.vx - 10.0).abs() < 1e-12);
    }

    #[test]
    fn gravity_is_scaled_per_entity() {
        let config = EngineConfig {
            gravity_y: 100.0,
            ..Default::default()
        };
        let mut t = Transform::default();
        let mut floaty = Velocity {
            gravity_scale: 0.5,
            ..Default::default()
        };
        integrate(&mut t, &mut floaty, &config, 0.01);
        assert!((floaty.vy - 0.5).abs() < 1e-12);
    }

    #[test]
    fn speed_is_clamped_to_max_speed() {
        let config = EngineConfig::default();
        let mut t = Transform::default();
        let mut v = Velocity {
            max_speed: Some(50.0),
            ..Velocity::new(100.0, 0.0)
        };
        integrate(&mut t, &mut v, &config, 0.016);
        assert!(v.speed() <= 50.0 + 1e-9);
        assert!((v.vx - 50.0).abs() < 1e-9);
    }

    #[test]
    fn config_max_velocity_applies_when_unset() {
        let config = EngineConfig {
            max_velocity: 10.0,
            ..Default::default()
        };
        let mut t = Transform::default();
        let mut v = Velocity::new(30.0, 40.0);
        integrate(&mut t, &mut v, &config, 0.016);
        assert!((v.speed() - 10.0).abs() < 1e-9);
        assert!((v.vx / v.vy - 0.75).abs() < 1e-12, "direction preserved");
    }

    #[test]
    fn drag_per_reference_frame() {
        let config = EngineConfig::default();
        let mut t = Transform::default();
        let mut v = Velocity {
            drag: Some(0.98),
            ..Velocity::new(100.0, 0.0)
        };
        integrate(&mut t, &mut v, &config, REFERENCE_DT);
        assert!((v.vx - 98.0).abs() < 1e-9);
    }

    #[test]
    fn drag_is_frame_rate_independent() {
        let config = EngineConfig::default();
        let base = Velocity {
            drag: Some(0.98),
            ..Velocity::new(100.0, 40.0)
        };

        let mut one = base;
        integrate(&mut Transform::default(), &mut one, &config, REFERENCE_DT);

        let mut two = base;
        let mut t = Transform::default();
        integrate(&mut t, &mut two, &config, REFERENCE_DT / 2.0);
        integrate(&mut t, &mut two, &config, REFERENCE_DT / 2.0);

        assert!((one.vx - two.vx).abs() < 1e-9);
        assert!((one.vy - two.vy).abs() < 1e-9);
    }

    #[test]
    fn tiny_velocity_settles_to_zero() {
        let config = EngineConfig::default();
        let mut t = Transform::default();
        let mut v = Velocity::new(0.005, 3.0);
        integrate(&mut t, &mut v, &config, 0.016);
        assert_eq!(v.vx, 0.0);
        assert_eq!(v.vy, 3.0);
    }

    #[test]
    fn non_finite_position_recovers_to_origin() {
        let config = EngineConfig::default();
        let mut t = Transform::at(f64::NAN, 4.0);
        let mut v = Velocity::new(5.0, 5.0);
        assert_eq!(integrate(&mut t, &mut v, &config, 0.016), PositionFix::Recovered);
        assert_eq!(t.position(), (0.0, 0.0));
        assert_eq!(v.speed(), 0.0);
    }

    #[test]
    fn extreme_position_is_clamped() {
        let config = EngineConfig {
            max_position: 100.0,
            ..Default::default()
        };
        let mut t = Transform::at(99.0, -250.0);
        let mut v = Velocity::new(200.0, 0.0);
        assert_eq!(integrate(&mut t, &mut v, &config, 0.016), PositionFix::Clamped);
        assert_eq!(t.position(), (100.0, -100.0));
        assert_eq!(v.vx, 200.0, "clamping is not a velocity change");
    }

    #[test]
    fn system_reports_recovered_entities() {
        let config = EngineConfig::default();
        let mut world = World::new();
        let good = world.create();
        world.add_component(good, Transform::default()).unwrap();
        world.add_component(good, Velocity::new(10.0, 0.0)).unwrap();
        let bad = world.create();
        world.add_component(bad, Transform::at(f64::INFINITY, 0.0)).unwrap();
        world.add_component(bad, Velocity::new(10.0, 0.0)).unwrap();

        let ctx = FrameContext {
            dt: 0.1,
            frame: 1,
            time: 0.0,
            config: &config,
        };
        let mut out = FrameOutput::default();
        let mut system = MovementSystem::new();
        let entities = world.query_mask(system.signature());
        system.update(&mut world, &entities, &ctx, &mut out);

        assert_eq!(out.anomalies, vec![Anomaly::InvalidPositionRecovered { entity: bad }]);
        assert_eq!(world.get::<Transform>(good).unwrap().x, 1.0);
        assert_eq!(world.get::<Velocity>(bad).unwrap().speed(), 0.0);
    }
}

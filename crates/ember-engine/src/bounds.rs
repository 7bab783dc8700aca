//! World-bounds clamp.
//!
//! Entities leaving the configured rectangle are pushed back inside, using the
//! collision shape's extent when there is one. The velocity component pointing
//! out of the world is zeroed, or reflected and scaled by the collision
//! bounce when that is nonzero. A shape too large for the world on some axis
//! is centered on that axis. Static shapes are left alone.

use ember_ecs::prelude::*;

use crate::config::WorldBounds;
use crate::schedule::{FrameContext, FrameOutput, System};

pub const BOUNDS_SYSTEM_NAME: &str = "bounds";

/// Clamp one axis. Returns the corrected position and velocity.
///
/// A shape wider than the world on this axis cannot touch only one wall; it
/// is held at the center with no velocity along the axis.
fn clamp_axis(pos: f64, vel: f64, half: f64, min: f64, max: f64, bounce: f64) -> (f64, f64) {
    let respond = |v: f64| if bounce > 0.0 { -v * bounce } else { 0.0 };
    if 2.0 * half >= max - min {
        (min + (max - min) * 0.5, 0.0)
    } else if pos - half < min {
        let v = if vel < 0.0 { respond(vel) } else { vel };
        (min + half, v)
    } else if pos + half > max {
        let v = if vel > 0.0 { respond(vel) } else { vel };
        (max - half, v)
    } else {
        (pos, vel)
    }
}

/// Keep `(center, velocity)` inside `bounds`. Returns whether anything changed.
pub fn confine(
    bounds: &WorldBounds,
    center: &mut (f64, f64),
    velocity: &mut Velocity,
    half_extents: (f64, f64),
    bounce: f64,
) -> bool {
    let before = (*center, velocity.vx, velocity.vy);
    let (x, vx) = clamp_axis(center.0, velocity.vx, half_extents.0, bounds.min_x, bounds.max_x, bounce);
    let (y, vy) = clamp_axis(center.1, velocity.vy, half_extents.1, bounds.min_y, bounds.max_y, bounce);
    *center = (x, y);
    velocity.vx = vx;
    velocity.vy = vy;
    before != (*center, vx, vy)
}

#[derive(Debug, Default)]
pub struct BoundsSystem;

impl BoundsSystem {
    pub fn new() -> Self {
        Self
    }
}

impl System for BoundsSystem {
    fn name(&self) -> &str {
        BOUNDS_SYSTEM_NAME
    }

    fn signature(&self) -> KindMask {
        KindMask::of(&[ComponentKind::Transform, ComponentKind::Velocity])
    }

    fn update(&mut self, world: &mut World, entities: &[EntityId], ctx: &FrameContext<'_>, _out: &mut FrameOutput) {
        let Some(bounds) = ctx.config.world_bounds else {
            return;
        };
        for &entity in entities {
            let (offset, half, bounce) = match world.get::<Collision>(entity) {
                Some(c) if c.is_static => continue,
                Some(c) => ((c.offset_x, c.offset_y), c.shape.half_extents(), c.bounce),
                None => ((0.0, 0.0), (0.0, 0.0), 0.0),
            };
            let Some(mut velocity) = world.get::<Velocity>(entity).copied() else {
                continue;
            };
            let Some(transform) = world.get_mut::<Transform>(entity) else {
                continue;
            };
            let mut center = (transform.x + offset.0, transform.y + offset.1);
            if confine(&bounds, &mut center, &mut velocity, half, bounce) {
                transform.x = center.0 - offset.0;
                transform.y = center.1 - offset.1;
                if let Some(v) = world.get_mut::<Velocity>(entity) {
                    *v = velocity;
                }
            }
        }
    }
}

//! Time-to-live countdown.
//!
//! Expired entities are queued in [`FrameOutput::despawn`]; the engine removes
//! them once the whole update pass has run, so later systems in the same
//! frame still see them.

use ember_ecs::prelude::*;

use crate::schedule::{FrameContext, FrameOutput, System};

pub const LIFETIME_SYSTEM_NAME: &str = "lifetime";

#[derive(Debug, Default)]
pub struct LifetimeSystem;

impl LifetimeSystem {
    pub fn new() -> Self {
        Self
    }
}

impl System for LifetimeSystem {
    fn name(&self) -> &str {
        LIFETIME_SYSTEM_NAME
    }

    fn signature(&self) -> KindMask {
        KindMask::of(&[ComponentKind::Lifetime])
    }

    fn update(&mut self, world: &mut World, entities: &[EntityId], ctx: &FrameContext<'_>, out: &mut FrameOutput) {
        for &entity in entities {
            let Some(lifetime) = world.get_mut::<Lifetime>(entity) else {
                out.skip_entity(LIFETIME_SYSTEM_NAME, entity, "missing lifetime");
                continue;
            };
            lifetime.elapsed += ctx.dt;
            if lifetime.is_expired() {
                out.despawn.push(entity);
            }
        }
    }
}

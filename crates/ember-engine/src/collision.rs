//! Collision detection and response.
//!
//! Each frame the [`CollisionSystem`]:
//!
//! 1. clears every participant's `colliding_with` set,
//! 2. rebuilds the [`SpatialGrid`] if it is stale,
//! 3. takes candidate pairs from the grid (broad phase) and drops pairs whose
//!    layers and masks are incompatible, that are both static, or where either
//!    side is a visual marker (empty mask),
//! 4. tests the remaining pairs for overlap (narrow phase). Overlapping pairs
//!    are recorded on both sides and reported as [`CollisionEvent`]s,
//! 5. resolves every non-trigger overlap: positional correction along the
//!    contact normal (a static side does not move, two dynamic sides split it
//!    evenly), then a velocity response along the normal and friction along
//!    the tangent.
//!
//! The velocity response is an elastic impulse when either side has nonzero
//! bounce, using the larger of the two bounces, and is skipped when the pair
//! is already separating. With no bounce the approaching normal component of
//! each dynamic side is removed instead.

use tracing::debug;

use ember_ecs::prelude::*;
use serde::Serialize;

use crate::config::EngineConfig;
use crate::schedule::{FrameContext, FrameOutput, System};
use crate::spatial::SpatialGrid;

pub const COLLISION_SYSTEM_NAME: &str = "collision";

/// Two entities whose shapes overlapped this frame. `a < b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct CollisionEvent {
    pub a: EntityId,
    pub b: EntityId,
    /// Either side is a trigger; no response was applied.
    pub trigger: bool,
}

// ---------------------------------------------------------------------------
// Narrow phase
// ---------------------------------------------------------------------------

/// Overlap between two shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    /// Unit vector pointing from the first shape toward the second.
    pub normal: (f64, f64),
    /// Penetration depth along `normal`.
    pub depth: f64,
}

/// A shape placed in the world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedShape {
    pub shape: Shape,
    pub center: (f64, f64),
}

impl PlacedShape {
    pub fn new(shape: Shape, center: (f64, f64)) -> Self {
        Self { shape, center }
    }
}

/// Overlap test between two placed shapes. `None` when they do not overlap
/// (touching counts as not overlapping).
pub fn contact(a: &PlacedShape, b: &PlacedShape) -> Option<Contact> {
    match (a.shape, b.shape) {
        (Shape::Circle { radius: ra }, Shape::Circle { radius: rb }) => {
            circle_circle(a.center, ra, b.center, rb)
        }
        (Shape::Rectangle { width: wa, height: ha }, Shape::Rectangle { width: wb, height: hb }) => {
            rect_rect(a.center, (wa * 0.5, ha * 0.5), b.center, (wb * 0.5, hb * 0.5))
        }
        (Shape::Circle { radius }, Shape::Rectangle { width, height }) => {
            circle_rect(a.center, radius, b.center, (width * 0.5, height * 0.5))
        }
        (Shape::Rectangle { width, height }, Shape::Circle { radius }) => {
            circle_rect(b.center, radius, a.center, (width * 0.5, height * 0.5)).map(|c| Contact {
                normal: (-c.normal.0, -c.normal.1),
                depth: c.depth,
            })
        }
    }
}

fn circle_circle(ca: (f64, f64), ra: f64, cb: (f64, f64), rb: f64) -> Option<Contact> {
    let (dx, dy) = (cb.0 - ca.0, cb.1 - ca.1);
    let distance = dx.hypot(dy);
    let depth = ra + rb - distance;
    if depth <= 0.0 {
        return None;
    }
    let normal = if distance > 0.0 {
        (dx / distance, dy / distance)
    } else {
        (1.0, 0.0)
    };
    Some(Contact { normal, depth })
}

fn rect_rect(ca: (f64, f64), ha: (f64, f64), cb: (f64, f64), hb: (f64, f64)) -> Option<Contact> {
    let (dx, dy) = (cb.0 - ca.0, cb.1 - ca.1);
    let px = ha.0 + hb.0 - dx.abs();
    let py = ha.1 + hb.1 - dy.abs();
    if px <= 0.0 || py <= 0.0 {
        return None;
    }
    if px < py {
        Some(Contact {
            normal: (sign(dx), 0.0),
            depth: px,
        })
    } else {
        Some(Contact {
            normal: (0.0, sign(dy)),
            depth: py,
        })
    }
}

/// Circle at `cc` against a rectangle at `rc`; normal points circle → rectangle.
fn circle_rect(cc: (f64, f64), radius: f64, rc: (f64, f64), half: (f64, f64)) -> Option<Contact> {
    let (min_x, max_x) = (rc.0 - half.0, rc.0 + half.0);
    let (min_y, max_y) = (rc.1 - half.1, rc.1 + half.1);
    let inside = cc.0 > min_x && cc.0 < max_x && cc.1 > min_y && cc.1 < max_y;

    if !inside {
        let closest = (cc.0.clamp(min_x, max_x), cc.1.clamp(min_y, max_y));
        let (dx, dy) = (closest.0 - cc.0, closest.1 - cc.1);
        let distance = dx.hypot(dy);
        if distance > 0.0 {
            let depth = radius - distance;
            if depth <= 0.0 {
                return None;
            }
            return Some(Contact {
                normal: (dx / distance, dy / distance),
                depth,
            });
        }
        // Center exactly on the boundary: treat as inside.
    }

    // Leave through the nearest face.
    let faces = [
        (cc.0 - min_x, (1.0, 0.0)),
        (max_x - cc.0, (-1.0, 0.0)),
        (cc.1 - min_y, (0.0, 1.0)),
        (max_y - cc.1, (0.0, -1.0)),
    ];
    let mut nearest = faces[0];
    for face in &faces[1..] {
        if face.0 < nearest.0 {
            nearest = *face;
        }
    }
    let (gap, normal) = nearest;
    Some(Contact {
        normal,
        depth: radius + gap,
    })
}

fn sign(v: f64) -> f64 {
    if v < 0.0 {
        -1.0
    } else {
        1.0
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// One side of a pair, copied out of the world for resolution.
#[derive(Debug, Clone)]
pub struct Body {
    pub transform: Transform,
    pub velocity: Velocity,
    pub inverse_mass: f64,
    pub bounce: f64,
    pub friction: f64,
}

impl Body {
    pub fn is_static(&self) -> bool {
        self.inverse_mass == 0.0
    }
}

/// Apply positional correction and velocity response for one contact.
/// `contact.normal` points from `a` toward `b`.
pub fn resolve(a: &mut Body, b: &mut Body, contact: &Contact) {
    let (nx, ny) = contact.normal;

    // Positional correction.
    let (share_a, share_b) = match (a.is_static(), b.is_static()) {
        (true, true) => (0.0, 0.0),
        (true, false) => (0.0, 1.0),
        (false, true) => (1.0, 0.0),
        (false, false) => (0.5, 0.5),
    };
    a.transform.x -= nx * contact.depth * share_a;
    a.transform.y -= ny * contact.depth * share_a;
    b.transform.x += nx * contact.depth * share_b;
    b.transform.y += ny * contact.depth * share_b;

    let inv_sum = a.inverse_mass + b.inverse_mass;
    if inv_sum == 0.0 {
        return;
    }

    // Normal response.
    let along = |v: &Velocity| v.vx * nx + v.vy * ny;
    let relative = along(&b.velocity) - along(&a.velocity);
    let bounce = a.bounce.max(b.bounce);
    if bounce > 0.0 {
        if relative < 0.0 {
            let impulse = -(1.0 + bounce) * relative / inv_sum;
            a.velocity.vx -= impulse * a.inverse_mass * nx;
            a.velocity.vy -= impulse * a.inverse_mass * ny;
            b.velocity.vx += impulse * b.inverse_mass * nx;
            b.velocity.vy += impulse * b.inverse_mass * ny;
        }
    } else {
        if !a.is_static() {
            let va = along(&a.velocity);
            if va > 0.0 {
                a.velocity.vx -= va * nx;
                a.velocity.vy -= va * ny;
            }
        }
        if !b.is_static() {
            let vb = along(&b.velocity);
            if vb < 0.0 {
                b.velocity.vx -= vb * nx;
                b.velocity.vy -= vb * ny;
            }
        }
    }

    // Friction on the tangent.
    let friction = a.friction.max(b.friction);
    if friction > 0.0 {
        let (tx, ty) = (-ny, nx);
        for body in [&mut *a, &mut *b] {
            if body.is_static() {
                continue;
            }
            let vt = body.velocity.vx * tx + body.velocity.vy * ty;
            body.velocity.vx -= vt * tx * friction;
            body.velocity.vy -= vt * ty * friction;
        }
    }
}

/// Whether two collision components may interact at all.
pub fn compatible(a: &Collision, b: &Collision) -> bool {
    !a.is_visual_marker()
        && !b.is_visual_marker()
        && !(a.is_static && b.is_static)
        && a.accepts(&b.layer)
        && b.accepts(&a.layer)
}

// ---------------------------------------------------------------------------
// CollisionSystem
// ---------------------------------------------------------------------------

/// Broad phase, narrow phase and response for `{transform, velocity, collision}`
/// entities.
#[derive(Debug)]
pub struct CollisionSystem {
    grid: SpatialGrid,
}

impl CollisionSystem {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            grid: SpatialGrid::new(config.grid_cell_size),
        }
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    fn load_body(world: &World, entity: EntityId) -> Option<(Body, &Collision)> {
        let collision = world.get::<Collision>(entity)?;
        Some((
            Body {
                transform: *world.get::<Transform>(entity)?,
                velocity: *world.get::<Velocity>(entity)?,
                inverse_mass: collision.inverse_mass(),
                bounce: collision.bounce,
                friction: collision.friction,
            },
            collision,
        ))
    }

    fn store_body(world: &mut World, entity: EntityId, body: &Body) {
        if let Some(t) = world.get_mut::<Transform>(entity) {
            t.x = body.transform.x;
            t.y = body.transform.y;
        }
        if let Some(v) = world.get_mut::<Velocity>(entity) {
            *v = body.velocity;
        }
    }
}

impl System for CollisionSystem {
    fn name(&self) -> &str {
        COLLISION_SYSTEM_NAME
    }

    fn signature(&self) -> KindMask {
        KindMask::of(&[ComponentKind::Transform, ComponentKind::Velocity, ComponentKind::Collision])
    }

    fn update(&mut self, world: &mut World, entities: &[EntityId], ctx: &FrameContext<'_>, out: &mut FrameOutput) {
        // Overlaps are per frame, including for shapes that stopped
        // participating (for example after losing their velocity).
        for entity in world.query(&[ComponentKind::Collision]) {
            if let Some(collision) = world.get_mut::<Collision>(entity) {
                collision.colliding_with.clear();
            }
        }

        // Participants with a malformed collision component are left out of
        // the grid entirely.
        let mut placed = Vec::with_capacity(entities.len());
        for &entity in entities {
            let Some(collision) = world.get::<Collision>(entity) else {
                out.skip_entity(COLLISION_SYSTEM_NAME, entity, "missing collision");
                continue;
            };
            if let Err(reason) = collision.validate() {
                out.skip_entity(COLLISION_SYSTEM_NAME, entity, reason);
                continue;
            }
            let (ox, oy) = (collision.offset_x, collision.offset_y);
            match world.get::<Transform>(entity) {
                Some(t) if t.x.is_finite() && t.y.is_finite() => placed.push((entity, t.x + ox, t.y + oy)),
                _ => out.skip_entity(COLLISION_SYSTEM_NAME, entity, "invalid transform"),
            }
        }

        let version = world.structure_version();
        if self
            .grid
            .needs_rebuild(ctx.dt, version, ctx.config.grid_rebuild_interval)
        {
            self.grid.rebuild(placed.iter().copied(), version);
            debug!(
                entities = placed.len(),
                cells = self.grid.occupied_cells(),
                "spatial grid rebuilt"
            );
        }

        let first_event = out.collisions.len();
        for (a, b) in self.grid.candidate_pairs() {
            let Some((mut body_a, col_a)) = Self::load_body(world, a) else {
                continue;
            };
            let Some((mut body_b, col_b)) = Self::load_body(world, b) else {
                continue;
            };
            if !compatible(col_a, col_b) || col_a.validate().is_err() || col_b.validate().is_err() {
                continue;
            }
            let trigger = col_a.is_trigger || col_b.is_trigger;
            let shape_a = PlacedShape::new(col_a.shape, col_a.center(&body_a.transform));
            let shape_b = PlacedShape::new(col_b.shape, col_b.center(&body_b.transform));
            let Some(hit) = contact(&shape_a, &shape_b) else {
                continue;
            };

            if let Some(c) = world.get_mut::<Collision>(a) {
                c.colliding_with.insert(b);
            }
            if let Some(c) = world.get_mut::<Collision>(b) {
                c.colliding_with.insert(a);
            }
            out.collisions.push(CollisionEvent {
                a: a.min(b),
                b: a.max(b),
                trigger,
            });

            if !trigger {
                resolve(&mut body_a, &mut body_b, &hit);
                Self::store_body(world, a, &body_a);
                Self::store_body(world, b, &body_b);
            }
        }
        out.collisions[first_event..].sort_unstable();
    }

    fn on_config_changed(&mut self, config: &EngineConfig) {
        self.grid.set_cell_size(config.grid_cell_size);
        self.grid.invalidate();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn body(x: f64, y: f64) -> Body {
        Body {
            transform: Transform::at(x, y),
            velocity: Velocity::default(),
            inverse_mass: 1.0,
            bounce: 0.0,
            friction: 0.0,
        }
    }

    fn circle(x: f64, y: f64, r: f64) -> PlacedShape {
        PlacedShape::new(Shape::Circle { radius: r }, (x, y))
    }

    fn rect(x: f64, y: f64, w: f64, h: f64) -> PlacedShape {
        PlacedShape::new(Shape::Rectangle { width: w, height: h }, (x, y))
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn circle_overlap_and_touching() {
        let hit = contact(&circle(0.0, 0.0, 5.0), &circle(6.0, 0.0, 5.0)).unwrap();
        assert_eq!(hit.normal, (1.0, 0.0));
        assert!(close(hit.depth, 4.0));
        assert_eq!(contact(&circle(0.0, 0.0, 5.0), &circle(10.0, 0.0, 5.0)), None);
    }

    #[test]
    fn rect_overlap_uses_smallest_axis() {
        let hit = contact(&rect(0.0, 0.0, 10.0, 10.0), &rect(0.0, 8.0, 10.0, 10.0)).unwrap();
        assert_eq!(hit.normal, (0.0, 1.0));
        assert!(close(hit.depth, 2.0));
        assert_eq!(contact(&rect(0.0, 0.0, 2.0, 2.0), &rect(5.0, 0.0, 2.0, 2.0)), None);
    }

    #[test]
    fn circle_rect_overlap_both_orders() {
        let c = circle(0.0, 0.0, 5.0);
        let r = rect(8.0, 0.0, 8.0, 8.0);
        let hit = contact(&c, &r).unwrap();
        assert_eq!(hit.normal, (1.0, 0.0));
        assert!(close(hit.depth, 1.0));

        let flipped = contact(&r, &c).unwrap();
        assert_eq!(flipped.normal, (-1.0, 0.0));
        assert!(close(flipped.depth, 1.0));

        assert_eq!(contact(&c, &rect(20.0, 0.0, 8.0, 8.0)), None);
    }

    #[test]
    fn circle_center_inside_rect_exits_nearest_face() {
        let hit = contact(&circle(3.0, 0.0, 1.0), &rect(0.0, 0.0, 8.0, 8.0)).unwrap();
        // Nearest face is the right one, so the circle must move +x: the
        // normal (circle -> rect) points -x.
        assert_eq!(hit.normal, (-1.0, 0.0));
        assert!(close(hit.depth, 2.0));
    }

    #[test]
    fn dynamic_pair_splits_correction_evenly() {
        let mut a = body(0.0, 0.0);
        let mut b = body(6.0, 0.0);
        let hit = contact(&circle(0.0, 0.0, 5.0), &circle(6.0, 0.0, 5.0)).unwrap();
        resolve(&mut a, &mut b, &hit);
        assert!(close(a.transform.x, -2.0));
        assert!(close(b.transform.x, 8.0));
    }

    #[test]
    fn static_side_does_not_move() {
        let mut wall = body(0.0, 0.0);
        wall.inverse_mass = 0.0;
        let mut ball = body(6.0, 0.0);
        let hit = contact(&circle(0.0, 0.0, 5.0), &circle(6.0, 0.0, 5.0)).unwrap();
        resolve(&mut wall, &mut ball, &hit);
        assert_eq!(wall.transform.x, 0.0);
        assert!(close(ball.transform.x, 10.0));
    }

    #[test]
    fn elastic_impulse_swaps_equal_mass_velocities() {
        let mut a = body(0.0, 0.0);
        a.velocity = Velocity::new(10.0, 0.0);
        a.bounce = 1.0;
        let mut b = body(9.0, 0.0);
        b.velocity = Velocity::new(-10.0, 0.0);
        let hit = contact(&circle(0.0, 0.0, 5.0), &circle(9.0, 0.0, 5.0)).unwrap();
        resolve(&mut a, &mut b, &hit);
        assert!(close(a.velocity.vx, -10.0));
        assert!(close(b.velocity.vx, 10.0));
    }

    #[test]
    fn separating_pair_gets_no_impulse() {
        let mut a = body(0.0, 0.0);
        a.velocity = Velocity::new(-3.0, 0.0);
        a.bounce = 0.8;
        let mut b = body(9.0, 0.0);
        b.velocity = Velocity::new(3.0, 0.0);
        let hit = contact(&circle(0.0, 0.0, 5.0), &circle(9.0, 0.0, 5.0)).unwrap();
        resolve(&mut a, &mut b, &hit);
        assert_eq!(a.velocity.vx, -3.0);
        assert_eq!(b.velocity.vx, 3.0);
    }

    #[test]
    fn inelastic_response_removes_approach_only() {
        let mut a = body(0.0, 0.0);
        a.velocity = Velocity::new(10.0, 4.0);
        let mut b = body(9.0, 0.0);
        b.velocity = Velocity::new(2.0, 0.0);
        let hit = contact(&circle(0.0, 0.0, 5.0), &circle(9.0, 0.0, 5.0)).unwrap();
        resolve(&mut a, &mut b, &hit);
        assert_eq!((a.velocity.vx, a.velocity.vy), (0.0, 4.0));
        assert_eq!(b.velocity.vx, 2.0, "b is moving away along the normal");
    }

    #[test]
    fn friction_scales_tangential_velocity() {
        let mut a = body(0.0, 0.0);
        a.velocity = Velocity::new(0.0, 10.0);
        a.friction = 0.25;
        let mut b = body(9.0, 0.0);
        b.inverse_mass = 0.0;
        let hit = contact(&circle(0.0, 0.0, 5.0), &circle(9.0, 0.0, 5.0)).unwrap();
        resolve(&mut a, &mut b, &hit);
        assert!(close(a.velocity.vy, 7.5));
    }

    #[test]
    fn compatibility_rules() {
        let mut a = Collision::circle(1.0);
        let mut b = Collision::circle(1.0);
        assert!(compatible(&a, &b));

        a.layer = "player".to_owned();
        b.mask = ["enemy".to_owned()].into_iter().collect();
        assert!(!compatible(&a, &b), "b does not react to a's layer");

        b.mask.insert("player".to_owned());
        assert!(compatible(&a, &b));

        b.mask.clear();
        assert!(!compatible(&a, &b), "visual marker");

        let mut s1 = Collision::circle(1.0);
        s1.is_static = true;
        let mut s2 = Collision::circle(1.0);
        s2.is_static = true;
        assert!(!compatible(&s1, &s2));
    }

    fn spawn(world: &mut World, x: f64, collision: Collision) -> EntityId {
        let e = world.create();
        world.add_component(e, Transform::at(x, 0.0)).unwrap();
        world.add_component(e, Velocity::default()).unwrap();
        world.add_component(e, collision).unwrap();
        e
    }

    fn run(system: &mut CollisionSystem, world: &mut World) -> FrameOutput {
        let config = EngineConfig::default();
        let ctx = FrameContext {
            dt: 1.0 / 60.0,
            frame: 1,
            time: 0.0,
            config: &config,
        };
        let mut out = FrameOutput::default();
        let entities = world.query_mask(system.signature());
        system.update(world, &entities, &ctx, &mut out);
        out
    }

    #[test]
    fn system_records_pairs_and_resolves() {
        let config = EngineConfig::default();
        let mut system = CollisionSystem::new(&config);
        let mut world = World::new();
        let a = spawn(&mut world, 0.0, Collision::circle(5.0));
        let b = spawn(&mut world, 6.0, Collision::circle(5.0));
        let far = spawn(&mut world, 500.0, Collision::circle(5.0));

        let out = run(&mut system, &mut world);
        assert_eq!(out.collisions, vec![CollisionEvent { a, b, trigger: false }]);
        assert!(world.get::<Collision>(a).unwrap().colliding_with.contains(&b));
        assert!(world.get::<Collision>(b).unwrap().colliding_with.contains(&a));
        assert!(world.get::<Collision>(far).unwrap().colliding_with.is_empty());
        let dx = world.get::<Transform>(b).unwrap().x - world.get::<Transform>(a).unwrap().x;
        assert!(close(dx, 10.0));

        // Resolved: the next pass records nothing and clears the relation.
        let out = run(&mut system, &mut world);
        assert!(out.collisions.is_empty());
        assert!(world.get::<Collision>(a).unwrap().colliding_with.is_empty());
    }

    #[test]
    fn triggers_are_recorded_without_response() {
        let config = EngineConfig::default();
        let mut system = CollisionSystem::new(&config);
        let mut world = World::new();
        let mut sensor = Collision::circle(5.0);
        sensor.is_trigger = true;
        let a = spawn(&mut world, 0.0, sensor);
        let b = spawn(&mut world, 6.0, Collision::circle(5.0));

        let out = run(&mut system, &mut world);
        assert_eq!(out.collisions, vec![CollisionEvent { a, b, trigger: true }]);
        assert_eq!(world.get::<Transform>(b).unwrap().x, 6.0);
    }

    #[test]
    fn malformed_collision_is_skipped_not_fatal() {
        let config = EngineConfig::default();
        let mut system = CollisionSystem::new(&config);
        let mut world = World::new();
        let broken = spawn(&mut world, 0.0, Collision::circle(-1.0));
        let a = spawn(&mut world, 20.0, Collision::circle(5.0));
        let b = spawn(&mut world, 26.0, Collision::circle(5.0));

        let out = run(&mut system, &mut world);
        assert_eq!(out.anomalies.len(), 1);
        assert_eq!(out.anomalies[0].entity(), broken);
        assert_eq!(out.collisions, vec![CollisionEvent { a, b, trigger: false }]);
    }

    #[test]
    fn overlaps_clear_once_a_shape_stops_participating() {
        let config = EngineConfig::default();
        let mut system = CollisionSystem::new(&config);
        let mut world = World::new();
        let mut sensor = Collision::circle(5.0);
        sensor.is_trigger = true;
        let a = spawn(&mut world, 0.0, sensor);
        let b = spawn(&mut world, 6.0, Collision::circle(5.0));
        run(&mut system, &mut world);
        assert!(world.get::<Collision>(a).unwrap().colliding_with.contains(&b));

        assert!(world.remove_component(a, ComponentKind::Velocity));
        let out = run(&mut system, &mut world);
        assert!(out.collisions.is_empty());
        assert!(world.get::<Collision>(a).unwrap().colliding_with.is_empty());
        assert!(world.get::<Collision>(b).unwrap().colliding_with.is_empty());
    }
}

//! Component records.
//!
//! Plain data with no behavior beyond small accessors. Records never hold a
//! reference to another entity or component; cross-entity links are stored as
//! [`EntityId`] handles and resolved through the [`World`](crate::world::World)
//! at use time.
//!
//! Every record uses `#[serde(default)]`, so template and spawn-config params
//! only need to name the fields they change.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::component::{component_data_access, Component, ComponentData, ComponentKind};
use crate::entity::EntityId;

// ---------------------------------------------------------------------------
// Transform
// ---------------------------------------------------------------------------

/// Position, rotation and scale, plus the position at the start of the
/// current movement step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transform {
    pub x: f64,
    pub y: f64,
    /// Radians.
    pub rotation: f64,
    pub scale: f64,
    pub prev_x: f64,
    pub prev_y: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            scale: 1.0,
            prev_x: 0.0,
            prev_y: 0.0,
        }
    }
}

impl Transform {
    /// A transform at `(x, y)` whose previous position is the same point.
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            prev_x: x,
            prev_y: y,
            ..Default::default()
        }
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    /// Record the current position as the previous one.
    #[inline]
    pub fn snapshot(&mut self) {
        self.prev_x = self.x;
        self.prev_y = self.y;
    }

    /// Explicit repositioning: snapshots, then moves.
    pub fn set_position(&mut self, x: f64, y: f64) {
        self.snapshot();
        self.x = x;
        self.y = y;
    }

    /// Displacement since the last snapshot.
    pub fn movement_delta(&self) -> (f64, f64) {
        (self.x - self.prev_x, self.y - self.prev_y)
    }
}

impl ComponentData for Transform {
    const KIND: ComponentKind = ComponentKind::Transform;

    fn validate(&self) -> Result<(), String> {
        if !(self.x.is_finite() && self.y.is_finite()) {
            return Err("position must be finite".to_owned());
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(format!("scale must be positive, got {}", self.scale));
        }
        Ok(())
    }

    component_data_access!(Transform);
}

// ---------------------------------------------------------------------------
// Velocity
// ---------------------------------------------------------------------------

/// Linear velocity with a one-shot acceleration buffer.
///
/// `ax`/`ay` accumulate forces between movement steps and are zeroed once the
/// movement system has applied them. `max_speed` and `drag` fall back to the
/// engine configuration when unset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Velocity {
    pub vx: f64,
    pub vy: f64,
    pub ax: f64,
    pub ay: f64,
    pub max_speed: Option<f64>,
    /// Per-reference-frame retention factor in `(0, 1]`.
    pub drag: Option<f64>,
    pub gravity_scale: f64,
}

impl Default for Velocity {
    fn default() -> Self {
        Self {
            vx: 0.0,
            vy: 0.0,
            ax: 0.0,
            ay: 0.0,
            max_speed: None,
            drag: None,
            gravity_scale: 1.0,
        }
    }
}

impl Velocity {
    pub fn new(vx: f64, vy: f64) -> Self {
        Self {
            vx,
            vy,
            ..Default::default()
        }
    }

    /// Accumulate a force (as acceleration) for the next movement step.
    pub fn apply_force(&mut self, ax: f64, ay: f64) {
        self.ax += ax;
        self.ay += ay;
    }

    pub fn speed(&self) -> f64 {
        self.vx.hypot(self.vy)
    }

    pub fn stop(&mut self) {
        self.vx = 0.0;
        self.vy = 0.0;
        self.ax = 0.0;
        self.ay = 0.0;
    }
}

impl ComponentData for Velocity {
    const KIND: ComponentKind = ComponentKind::Velocity;

    fn validate(&self) -> Result<(), String> {
        if let Some(max) = self.max_speed {
            if !(max >= 0.0) {
                return Err(format!("max_speed must be non-negative, got {max}"));
            }
        }
        if let Some(drag) = self.drag {
            if !(drag > 0.0 && drag <= 1.0) {
                return Err(format!("drag must be in (0, 1], got {drag}"));
            }
        }
        Ok(())
    }

    component_data_access!(Velocity);
}

// ---------------------------------------------------------------------------
// Render
// ---------------------------------------------------------------------------

/// What the external renderer should draw for this entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Render {
    pub sprite: String,
    pub color: String,
    pub width: f64,
    pub height: f64,
    pub z_index: i32,
    pub opacity: f64,
    pub visible: bool,
}

impl Default for Render {
    fn default() -> Self {
        Self {
            sprite: String::new(),
            color: "#ffffff".to_owned(),
            width: 1.0,
            height: 1.0,
            z_index: 0,
            opacity: 1.0,
            visible: true,
        }
    }
}

impl ComponentData for Render {
    const KIND: ComponentKind = ComponentKind::Render;

    fn reset(&mut self) {
        // Keep the string buffers.
        self.sprite.clear();
        self.color.clear();
        self.color.push_str("#ffffff");
        self.width = 1.0;
        self.height = 1.0;
        self.z_index = 0;
        self.opacity = 1.0;
        self.visible = true;
    }

    fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(format!("opacity must be in [0, 1], got {}", self.opacity));
        }
        Ok(())
    }

    component_data_access!(Render);
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Health {
    pub current: f64,
    pub max: f64,
    /// Seconds of remaining invulnerability.
    pub invulnerable_for: f64,
}

impl Default for Health {
    fn default() -> Self {
        Self {
            current: 100.0,
            max: 100.0,
            invulnerable_for: 0.0,
        }
    }
}

impl Health {
    /// Apply damage unless invulnerable. Returns the damage actually dealt.
    pub fn damage(&mut self, amount: f64) -> f64 {
        if self.invulnerable_for > 0.0 || amount <= 0.0 {
            return 0.0;
        }
        let dealt = amount.min(self.current);
        self.current -= dealt;
        dealt
    }

    pub fn heal(&mut self, amount: f64) {
        self.current = (self.current + amount.max(0.0)).min(self.max);
    }

    pub fn is_dead(&self) -> bool {
        self.current <= 0.0
    }
}

impl ComponentData for Health {
    const KIND: ComponentKind = ComponentKind::Health;

    fn validate(&self) -> Result<(), String> {
        if !(self.max > 0.0) {
            return Err(format!("max must be positive, got {}", self.max));
        }
        if self.current > self.max {
            return Err(format!(
                "current ({}) exceeds max ({})",
                self.current, self.max
            ));
        }
        Ok(())
    }

    component_data_access!(Health);
}

// ---------------------------------------------------------------------------
// Collision
// ---------------------------------------------------------------------------

/// Collision shape, centered on the transform plus the collision offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    Circle { radius: f64 },
    Rectangle { width: f64, height: f64 },
}

impl Shape {
    /// Half extents of the shape's axis-aligned bounding box.
    pub fn half_extents(&self) -> (f64, f64) {
        match *self {
            Shape::Circle { radius } => (radius, radius),
            Shape::Rectangle { width, height } => (width * 0.5, height * 0.5),
        }
    }
}

impl Default for Shape {
    fn default() -> Self {
        Shape::Circle { radius: 1.0 }
    }
}

/// Layer wildcard accepted in a mask.
pub const ANY_LAYER: &str = "*";

/// Collision participation and physical material.
///
/// `colliding_with` is transient: the collision system clears and refills it
/// on every broad-phase pass. It is not serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Collision {
    pub shape: Shape,
    pub offset_x: f64,
    pub offset_y: f64,
    pub layer: String,
    /// Layers this shape reacts to. `"*"` accepts every layer; an empty mask
    /// marks a purely visual shape that never collides.
    pub mask: BTreeSet<String>,
    pub is_static: bool,
    pub is_trigger: bool,
    pub mass: f64,
    pub bounce: f64,
    pub friction: f64,
    #[serde(skip)]
    pub colliding_with: BTreeSet<EntityId>,
}

impl Default for Collision {
    fn default() -> Self {
        Self {
            shape: Shape::default(),
            offset_x: 0.0,
            offset_y: 0.0,
            layer: "default".to_owned(),
            mask: BTreeSet::from([ANY_LAYER.to_owned()]),
            is_static: false,
            is_trigger: false,
            mass: 1.0,
            bounce: 0.0,
            friction: 0.0,
            colliding_with: BTreeSet::new(),
        }
    }
}

impl Collision {
    pub fn circle(radius: f64) -> Self {
        Self {
            shape: Shape::Circle { radius },
            ..Default::default()
        }
    }

    pub fn rectangle(width: f64, height: f64) -> Self {
        Self {
            shape: Shape::Rectangle { width, height },
            ..Default::default()
        }
    }

    /// Whether this shape reacts to `layer`.
    pub fn accepts(&self, layer: &str) -> bool {
        self.mask.contains(ANY_LAYER) || self.mask.contains(layer)
    }

    pub fn is_visual_marker(&self) -> bool {
        self.mask.is_empty()
    }

    /// `0` for static shapes, `1 / mass` otherwise.
    pub fn inverse_mass(&self) -> f64 {
        if self.is_static {
            0.0
        } else {
            1.0 / self.mass
        }
    }

    /// Center of the shape given the owning transform.
    pub fn center(&self, transform: &Transform) -> (f64, f64) {
        (transform.x + self.offset_x, transform.y + self.offset_y)
    }
}

impl ComponentData for Collision {
    const KIND: ComponentKind = ComponentKind::Collision;

    fn reset(&mut self) {
        self.shape = Shape::default();
        self.offset_x = 0.0;
        self.offset_y = 0.0;
        self.layer.clear();
        self.layer.push_str("default");
        self.mask.clear();
        self.mask.insert(ANY_LAYER.to_owned());
        self.is_static = false;
        self.is_trigger = false;
        self.mass = 1.0;
        self.bounce = 0.0;
        self.friction = 0.0;
        self.colliding_with.clear();
    }

    fn validate(&self) -> Result<(), String> {
        match self.shape {
            Shape::Circle { radius } if !(radius > 0.0) => {
                return Err(format!("circle radius must be positive, got {radius}"));
            }
            Shape::Rectangle { width, height } if !(width > 0.0 && height > 0.0) => {
                return Err(format!(
                    "rectangle must have positive size, got {width}x{height}"
                ));
            }
            _ => {}
        }
        if !(self.mass > 0.0 && self.mass.is_finite()) {
            return Err(format!("mass must be positive, got {}", self.mass));
        }
        if !(0.0..=1.0).contains(&self.bounce) {
            return Err(format!("bounce must be in [0, 1], got {}", self.bounce));
        }
        if !(0.0..=1.0).contains(&self.friction) {
            return Err(format!("friction must be in [0, 1], got {}", self.friction));
        }
        Ok(())
    }

    component_data_access!(Collision);
}

// ---------------------------------------------------------------------------
// Lifetime
// ---------------------------------------------------------------------------

/// Time-to-live in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Lifetime {
    pub duration: f64,
    pub elapsed: f64,
}

impl Default for Lifetime {
    fn default() -> Self {
        Self {
            duration: 1.0,
            elapsed: 0.0,
        }
    }
}

impl Lifetime {
    pub fn remaining(&self) -> f64 {
        (self.duration - self.elapsed).max(0.0)
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed >= self.duration
    }
}

impl ComponentData for Lifetime {
    const KIND: ComponentKind = ComponentKind::Lifetime;

    fn validate(&self) -> Result<(), String> {
        if !(self.duration > 0.0) {
            return Err(format!("duration must be positive, got {}", self.duration));
        }
        Ok(())
    }

    component_data_access!(Lifetime);
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Latest input state written by the external input poller.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Input {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub fire: bool,
    pub aim_x: f64,
    pub aim_y: f64,
}

impl Input {
    /// Unnormalized movement direction from the directional buttons.
    pub fn direction(&self) -> (f64, f64) {
        let x = f64::from(self.right as u8) - f64::from(self.left as u8);
        let y = f64::from(self.down as u8) - f64::from(self.up as u8);
        (x, y)
    }
}

impl ComponentData for Input {
    const KIND: ComponentKind = ComponentKind::Input;

    component_data_access!(Input);
}

// ---------------------------------------------------------------------------
// Ai
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiBehavior {
    #[default]
    Idle,
    Wander,
    Seek,
    Flee,
}

/// Behavior state. `target` is a handle, not a live reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ai {
    pub behavior: AiBehavior,
    pub target: Option<EntityId>,
    pub speed: f64,
    pub detection_radius: f64,
    pub state_timer: f64,
}

impl Default for Ai {
    fn default() -> Self {
        Self {
            behavior: AiBehavior::Idle,
            target: None,
            speed: 50.0,
            detection_radius: 200.0,
            state_timer: 0.0,
        }
    }
}

impl ComponentData for Ai {
    const KIND: ComponentKind = ComponentKind::Ai;

    fn validate(&self) -> Result<(), String> {
        if self.speed < 0.0 || self.detection_radius < 0.0 {
            return Err("speed and detection_radius must be non-negative".to_owned());
        }
        Ok(())
    }

    component_data_access!(Ai);
}

// ---------------------------------------------------------------------------
// Weapon
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weapon {
    pub damage: f64,
    /// Shots per second.
    pub fire_rate: f64,
    /// Seconds until the next shot is allowed.
    pub cooldown: f64,
    pub projectile_speed: f64,
    pub projectile_template: String,
    /// `None` means unlimited.
    pub ammo: Option<u32>,
}

impl Default for Weapon {
    fn default() -> Self {
        Self {
            damage: 10.0,
            fire_rate: 4.0,
            cooldown: 0.0,
            projectile_speed: 400.0,
            projectile_template: "projectile".to_owned(),
            ammo: None,
        }
    }
}

impl Weapon {
    pub fn can_fire(&self) -> bool {
        self.cooldown <= 0.0 && self.ammo != Some(0)
    }

    /// Consume a shot if possible, starting the cooldown.
    pub fn fire(&mut self) -> bool {
        if !self.can_fire() {
            return false;
        }
        self.cooldown = 1.0 / self.fire_rate;
        if let Some(ammo) = self.ammo.as_mut() {
            *ammo -= 1;
        }
        true
    }
}

impl ComponentData for Weapon {
    const KIND: ComponentKind = ComponentKind::Weapon;

    fn validate(&self) -> Result<(), String> {
        if !(self.fire_rate > 0.0) {
            return Err(format!("fire_rate must be positive, got {}", self.fire_rate));
        }
        Ok(())
    }

    component_data_access!(Weapon);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Frame-level physics properties, driven through `Engine::update`.

use ember_engine::prelude::*;
use serde_json::json;

const REFERENCE_DT: f64 = 1.0 / 60.0;

fn engine() -> Engine {
    Engine::with_clock(EngineConfig::default(), Box::new(ManualClock::new())).unwrap()
}

fn spawn_circle(engine: &mut Engine, x: f64, radius: f64, is_static: bool) -> EntityId {
    let world = engine.world_mut();
    let e = world.create();
    world.add_component(e, Transform::at(x, 0.0)).unwrap();
    world.add_component(e, Velocity::default()).unwrap();
    let mut collision = Collision::circle(radius);
    collision.is_static = is_static;
    world.add_component(e, collision).unwrap();
    e
}

fn x_of(engine: &Engine, e: EntityId) -> f64 {
    engine.get::<Transform>(e).unwrap().x
}

#[test]
fn overlapping_dynamic_circles_separate_evenly() {
    let mut engine = engine();
    let a = spawn_circle(&mut engine, 100.0, 5.0, false);
    let b = spawn_circle(&mut engine, 106.0, 5.0, false);

    let report = engine.update(REFERENCE_DT).unwrap();
    assert_eq!(report.collisions.len(), 1);
    assert!((x_of(&engine, a) - 98.0).abs() < 1e-9);
    assert!((x_of(&engine, b) - 108.0).abs() < 1e-9);
    assert!((x_of(&engine, b) - x_of(&engine, a) - 10.0).abs() < 1e-9);
}

#[test]
fn static_circle_holds_its_ground() {
    let mut engine = engine();
    let wall = spawn_circle(&mut engine, 100.0, 5.0, true);
    let ball = spawn_circle(&mut engine, 106.0, 5.0, false);

    engine.update(REFERENCE_DT).unwrap();
    assert_eq!(x_of(&engine, wall), 100.0);
    assert!((x_of(&engine, ball) - 110.0).abs() < 1e-9);
}

#[test]
fn speed_never_exceeds_max_speed() {
    let mut engine = engine();
    let e = engine.world_mut().create();
    engine.world_mut().add_component(e, Transform::default()).unwrap();
    engine
        .world_mut()
        .add_component(e, Velocity { max_speed: Some(50.0), ..Velocity::new(100.0, 0.0) })
        .unwrap();

    for dt in [0.001, REFERENCE_DT, 0.033] {
        engine.update(dt).unwrap();
        assert!(engine.get::<Velocity>(e).unwrap().speed() <= 50.0 + 1e-9);
    }
}

#[test]
fn drag_scales_once_per_reference_frame() {
    let mut one_step = engine();
    let mut two_steps = engine();
    let spawn = |engine: &mut Engine| {
        let e = engine.world_mut().create();
        engine.world_mut().add_component(e, Transform::default()).unwrap();
        engine
            .world_mut()
            .add_component(e, Velocity { drag: Some(0.98), ..Velocity::new(100.0, 0.0) })
            .unwrap();
        e
    };
    let a = spawn(&mut one_step);
    let b = spawn(&mut two_steps);

    one_step.update(REFERENCE_DT).unwrap();
    two_steps.update(REFERENCE_DT / 2.0).unwrap();
    two_steps.update(REFERENCE_DT / 2.0).unwrap();

    let va = one_step.get::<Velocity>(a).unwrap().vx;
    let vb = two_steps.get::<Velocity>(b).unwrap().vx;
    assert!((va - 98.0).abs() < 1e-9);
    assert!((va - vb).abs() < 1e-9);
}

#[test]
fn non_finite_position_is_recovered_and_reported() {
    let mut engine = engine();
    let e = engine.world_mut().create();
    engine.world_mut().add_component(e, Transform::at(3.0, 4.0)).unwrap();
    engine.world_mut().add_component(e, Velocity::new(10.0, 10.0)).unwrap();
    engine.get_mut::<Transform>(e).unwrap().set_position(f64::NAN, 4.0);

    let report = engine.update(REFERENCE_DT).expect("frame runs");
    assert_eq!(engine.get::<Transform>(e).unwrap().position(), (0.0, 0.0));
    assert_eq!(engine.get::<Velocity>(e).unwrap().speed(), 0.0);
    assert_eq!(report.anomalies, vec![Anomaly::InvalidPositionRecovered { entity: e }]);
    assert_eq!(engine.anomaly_totals().invalid_position_recovered, 1);

    // The frame loop keeps going.
    assert!(engine.update(REFERENCE_DT).unwrap().anomalies.is_empty());
}

#[test]
fn world_bounds_stop_entities_at_the_wall() {
    let config = EngineConfig {
        world_bounds: Some(WorldBounds { min_x: 0.0, min_y: 0.0, max_x: 200.0, max_y: 200.0 }),
        ..Default::default()
    };
    let mut engine = Engine::with_clock(config, Box::new(ManualClock::new())).unwrap();
    engine
        .register_template(
            "puck",
            EntityTemplate::new()
                .with(ComponentKind::Transform, json!({"x": 195.0, "y": 100.0}))
                .with_deps(ComponentKind::Velocity, json!({"vx": 600.0, "vy": 30.0}), &[ComponentKind::Transform])
                .with_deps(
                    ComponentKind::Collision,
                    json!({"shape": {"type": "circle", "radius": 4.0}}),
                    &[ComponentKind::Transform],
                ),
        )
        .unwrap();
    let puck = engine.create_entity("puck", &SpawnConfig::new()).unwrap();

    engine.update(REFERENCE_DT).unwrap();
    assert_eq!(x_of(&engine, puck), 196.0);
    let v = engine.get::<Velocity>(puck).unwrap();
    assert_eq!(v.vx, 0.0);
    assert_eq!(v.vy, 30.0);
}

#[test]
fn movement_completes_before_collision() {
    // Two circles that only overlap after this frame's movement step.
    let mut engine = engine();
    let a = spawn_circle(&mut engine, 0.0, 5.0, false);
    let b = spawn_circle(&mut engine, 12.0, 5.0, false);
    engine.get_mut::<Velocity>(b).unwrap().vx = -240.0;

    let report = engine.update(REFERENCE_DT).unwrap();
    assert_eq!(report.collisions, vec![CollisionEvent { a, b, trigger: false }]);
    let gap = x_of(&engine, b) - x_of(&engine, a);
    assert!((gap - 10.0).abs() < 1e-9);
}

#[test]
fn layer_masks_filter_pairs() {
    let mut engine = engine();
    let player = spawn_circle(&mut engine, 0.0, 5.0, false);
    let pickup = spawn_circle(&mut engine, 4.0, 5.0, false);
    {
        let world = engine.world_mut();
        let c = world.get_mut::<Collision>(player).unwrap();
        c.layer = "player".to_owned();
        let c = world.get_mut::<Collision>(pickup).unwrap();
        c.layer = "pickup".to_owned();
        c.mask = ["enemy".to_owned()].into_iter().collect();
    }

    let report = engine.update(REFERENCE_DT).unwrap();
    assert!(report.collisions.is_empty());
    assert_eq!(x_of(&engine, player), 0.0);
}

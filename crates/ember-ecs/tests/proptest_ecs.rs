//! Property tests for registry operations.
//!
//! These tests use `proptest` to generate random sequences of registry
//! operations and verify that world invariants hold after each step.

use ember_ecs::prelude::*;
use proptest::prelude::*;

/// Operations we can perform on the world.
#[derive(Debug, Clone)]
enum RegistryOp {
    Create,
    CreateMoving(f64, f64),
    Destroy(usize),
    DestroyTwice(usize),
    AddVelocity(usize, f64, f64),
    RemoveVelocity(usize),
    Tag(usize),
    QueryMoving,
}

/// Strategy that generates finite values in a game-sized range.
fn finite_f64() -> impl Strategy<Value = f64> {
    (-1_000_000i32..1_000_000i32).prop_map(|v| v as f64 * 0.01)
}

fn registry_op_strategy() -> impl Strategy<Value = RegistryOp> {
    prop_oneof![
        Just(RegistryOp::Create),
        (finite_f64(), finite_f64()).prop_map(|(x, y)| RegistryOp::CreateMoving(x, y)),
        (0..100usize).prop_map(RegistryOp::Destroy),
        (0..100usize).prop_map(RegistryOp::DestroyTwice),
        (0..100usize, finite_f64(), finite_f64())
            .prop_map(|(i, vx, vy)| RegistryOp::AddVelocity(i, vx, vy)),
        (0..100usize).prop_map(RegistryOp::RemoveVelocity),
        (0..100usize).prop_map(RegistryOp::Tag),
        Just(RegistryOp::QueryMoving),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2_000))]

    #[test]
    fn random_ops_preserve_invariants(ops in prop::collection::vec(registry_op_strategy(), 1..60)) {
        let capacity = 4;
        let mut world = World::with_capacities(capacity, capacity);
        let mut alive: Vec<EntityId> = Vec::new();

        for op in ops {
            match op {
                RegistryOp::Create => alive.push(world.create()),
                RegistryOp::CreateMoving(x, y) => {
                    let e = world.create();
                    world.add_component(e, Transform::at(x, y)).unwrap();
                    world.add_component(e, Velocity::new(1.0, 0.0)).unwrap();
                    alive.push(e);
                }
                RegistryOp::Destroy(idx) => {
                    if !alive.is_empty() {
                        let e = alive.remove(idx % alive.len());
                        prop_assert!(world.destroy(e));
                    }
                }
                RegistryOp::DestroyTwice(idx) => {
                    if !alive.is_empty() {
                        let e = alive.remove(idx % alive.len());
                        prop_assert!(world.destroy(e));
                        prop_assert!(!world.destroy(e));
                    }
                }
                RegistryOp::AddVelocity(idx, vx, vy) => {
                    if !alive.is_empty() {
                        let e = alive[idx % alive.len()];
                        let had = world.has_component(e, ComponentKind::Velocity);
                        let result = world.add_component(e, Velocity::new(vx, vy));
                        prop_assert_eq!(result.is_err(), had);
                    }
                }
                RegistryOp::RemoveVelocity(idx) => {
                    if !alive.is_empty() {
                        let e = alive[idx % alive.len()];
                        world.remove_component(e, ComponentKind::Velocity);
                        prop_assert!(!world.has_component(e, ComponentKind::Velocity));
                    }
                }
                RegistryOp::Tag(idx) => {
                    if !alive.is_empty() {
                        let e = alive[idx % alive.len()];
                        world.add_tag(e, "marked");
                        prop_assert!(world.has_tag(e, "marked"));
                    }
                }
                RegistryOp::QueryMoving => {
                    let moving = world.query(&[ComponentKind::Transform, ComponentKind::Velocity]);
                    // Insertion order is a subsequence of our tracking order.
                    let expected: Vec<EntityId> = alive
                        .iter()
                        .copied()
                        .filter(|e| {
                            world.has_component(*e, ComponentKind::Transform)
                                && world.has_component(*e, ComponentKind::Velocity)
                        })
                        .collect();
                    prop_assert_eq!(moving, expected);
                }
            }

            prop_assert_eq!(world.entity_count(), alive.len());
            for &e in &alive {
                prop_assert!(world.is_alive(e));
            }
            for kind in ComponentKind::ALL {
                prop_assert!(world.pool_stats(kind).available <= capacity);
            }
            prop_assert!(world.retired_record_count() <= capacity);
        }
    }

    /// Handles kept past `destroy` never resolve, even after their slot has
    /// been recycled.
    #[test]
    fn stale_ids_detected_after_destroy_and_recycle(
        spawn_count in 1..20usize,
        destroy_indices in prop::collection::vec(0..20usize, 1..10),
    ) {
        let mut world = World::new();
        let mut entities: Vec<EntityId> = Vec::new();
        for i in 0..spawn_count {
            let e = world.create();
            world.add_component(e, Transform::at(i as f64, 0.0)).unwrap();
            entities.push(e);
        }

        let mut stale_ids: Vec<EntityId> = Vec::new();
        for &idx in &destroy_indices {
            if !entities.is_empty() {
                let e = entities.remove(idx % entities.len());
                world.destroy(e);
                stale_ids.push(e);
            }
        }

        for _ in 0..stale_ids.len() {
            let e = world.create();
            world.add_component(e, Transform::at(999.0, 999.0)).unwrap();
            entities.push(e);
        }

        for &stale in &stale_ids {
            prop_assert!(!world.is_alive(stale));
            prop_assert_eq!(world.get::<Transform>(stale), None);
        }
        for &e in &entities {
            prop_assert!(world.get::<Transform>(e).is_some());
        }
    }

    /// Pooled components never carry state from a previous owner.
    #[test]
    fn recycled_components_are_default(vx in finite_f64(), vy in finite_f64(), rounds in 1..10usize) {
        let mut world = World::with_capacities(8, 8);
        for _ in 0..rounds {
            let e = world.create();
            let mut v = world.acquire_component(ComponentKind::Velocity);
            prop_assert_eq!(&v, &Component::default_for(ComponentKind::Velocity));
            if let Some(vel) = Velocity::from_component_mut(&mut v) {
                vel.vx = vx;
                vel.vy = vy;
            }
            world.add_component(e, v).unwrap();
            world.destroy(e);
        }
    }
}

//! Headless swarm demo.
//!
//! Spawns a seeded swarm of bouncing bodies inside the world bounds, fires
//! short-lived sparks from a turret, and runs a fixed number of frames,
//! printing a summary at the end.
//!
//! Run with: `cargo run -p ember-engine --example swarm -- [frames] [seed]`
//!
//! Set `RUST_LOG=info` to see the periodic frame diagnostics.

use anyhow::{Context, Result};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use ember_engine::prelude::*;

const TEMPLATES: &str = r#"[
    {"name": "body",
     "components": {
        "transform": {},
        "velocity": {"params": {"max_speed": 300.0}, "depends_on": ["transform"]},
        "collision": {
            "params": {"shape": {"type": "circle", "radius": 5.0}, "layer": "swarm", "bounce": 0.8},
            "depends_on": ["transform"]
        },
        "health": {"params": {"current": 3.0, "max": 3.0}}
     },
     "required": ["transform", "velocity", "collision"],
     "tags": ["swarm"]},
    {"name": "turret",
     "components": {
        "transform": {"params": {"x": 400.0, "y": 300.0}},
        "velocity": {"depends_on": ["transform"]},
        "collision": {
            "params": {"shape": {"type": "rectangle", "width": 30.0, "height": 30.0}, "is_static": true, "layer": "wall"},
            "depends_on": ["transform"]
        },
        "weapon": {"params": {"fire_rate": 10.0, "projectile_template": "spark"}}
     }},
    {"name": "spark",
     "components": {
        "transform": {},
        "velocity": {"params": {"drag": 0.97}, "depends_on": ["transform"]},
        "collision": {
            "params": {"shape": {"type": "circle", "radius": 1.5}, "layer": "spark", "mask": ["swarm"], "is_trigger": true},
            "depends_on": ["transform"]
        },
        "lifetime": {"params": {"duration": 1.5}}
     },
     "tags": ["spark"]}
]"#;

/// Ticks turret cooldowns and consumes a shot whenever one is ready.
fn turret_system() -> impl System {
    FnSystem::new("turret", &[ComponentKind::Transform, ComponentKind::Weapon], |world, entities, ctx, _out| {
        for &turret in entities {
            if let Some(weapon) = world.get_mut::<Weapon>(turret) {
                weapon.cooldown = (weapon.cooldown - ctx.dt).max(0.0);
                weapon.fire();
            }
        }
    })
}

/// Counts spark hits on swarm bodies and removes bodies that run out of health.
fn damage_system() -> impl System {
    FnSystem::new("damage", &[ComponentKind::Health, ComponentKind::Collision], |world, entities, _ctx, out| {
        for &body in entities {
            let hits = match world.get::<Collision>(body) {
                Some(c) => c
                    .colliding_with
                    .iter()
                    .filter(|other| world.has_tag(**other, "spark"))
                    .count(),
                None => continue,
            };
            if hits == 0 {
                continue;
            }
            if let Some(health) = world.get_mut::<Health>(body) {
                health.damage(hits as f64);
                if health.is_dead() {
                    out.despawn.push(body);
                }
            }
        }
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let mut args = std::env::args().skip(1);
    let frames: u64 = args.next().map(|a| a.parse()).transpose().context("frames must be an integer")?.unwrap_or(1200);
    let seed: u64 = args.next().map(|a| a.parse()).transpose().context("seed must be an integer")?.unwrap_or(42);

    let flat = json!({
        "world_min_x": 0.0, "world_min_y": 0.0, "world_max_x": 800.0, "world_max_y": 600.0,
        "grid_cell_size": 32.0,
        "diagnostics_interval": 5.0
    });
    let config = EngineConfig::from_flat(flat.as_object().context("flat config is an object")?)?;
    let mut engine = Engine::new(config)?;
    let registered = engine.register_templates_json(TEMPLATES)?;
    engine.add_system(Box::new(turret_system()));
    engine.add_system_after(Box::new(damage_system()), &["collision"]);

    let mut rng = Pcg64::seed_from_u64(seed);
    for _ in 0..300 {
        let mut spawn = SpawnConfig::new();
        spawn.insert("transform".to_owned(), json!({"x": rng.gen_range(20.0..780.0), "y": rng.gen_range(20.0..580.0)}));
        spawn.insert("velocity".to_owned(), json!({"vx": rng.gen_range(-150.0..150.0), "vy": rng.gen_range(-150.0..150.0)}));
        engine.create_entity("body", &spawn)?;
    }
    let turret = engine.create_entity("turret", &SpawnConfig::new())?;

    let mut collisions = 0usize;
    let mut despawned = 0usize;
    let mut shots = 0u64;
    for frame in 0..frames {
        let cooldown_before = engine.get::<Weapon>(turret).map_or(0.0, |w| w.cooldown);
        let Some(report) = engine.update(1.0 / 60.0) else {
            break;
        };
        collisions += report.collisions.len();
        despawned += report.despawned.len();

        // A fresh cooldown means the turret fired this frame.
        let fired = engine.get::<Weapon>(turret).is_some_and(|w| w.cooldown > cooldown_before);
        if fired {
            shots += 1;
            let angle = frame as f64 * 0.05;
            let mut spawn = SpawnConfig::new();
            spawn.insert("transform".to_owned(), json!({"x": 400.0 + 20.0 * angle.cos(), "y": 300.0 + 20.0 * angle.sin()}));
            spawn.insert("velocity".to_owned(), json!({"vx": 250.0 * angle.cos(), "vy": 250.0 * angle.sin()}));
            engine.create_entity("spark", &spawn)?;
        }
    }

    let totals = engine.anomaly_totals();
    println!("templates registered : {registered}");
    println!("frames               : {}", engine.frame_count());
    println!("live entities        : {}", engine.world().entity_count());
    println!("swarm survivors      : {}", engine.world().query_tagged("swarm").len());
    println!("shots fired          : {shots}");
    println!("collision events     : {collisions}");
    println!("entities despawned   : {despawned}");
    println!("pooled sparks        : {}", engine.factory().pooled_count("spark"));
    println!("anomalies            : {}", totals.total());
    println!("state hash           : {}", engine.world().state_hash());
    Ok(())
}

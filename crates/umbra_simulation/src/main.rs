//! Headless симуляция UMBRA
//!
//! Арена с целью, стеной и парой фонарей; стая агентов находит цель,
//! атакует, часть агентов умирает от внешнего урона.

use bevy::prelude::*;
use umbra_simulation::*;

const AGENT_COUNT: usize = 6;
const TICKS: usize = 1800;

fn main() {
    let seed = 42;
    println!("Starting UMBRA headless simulation (seed: {})", seed);

    let mut app = create_headless_app(seed);
    app.add_plugins(SimulationPlugin);

    let wall = Bounds::from_center_half_extents(Vec3::new(0.0, 1.0, -4.0), Vec3::new(3.0, 1.0, 0.25));
    let mut spatial = SpatialWorld::with_surface(
        NavSurface::rect(Vec2::new(-25.0, -25.0), Vec2::new(25.0, 25.0), 0.0).with_blocker(wall),
    );
    spatial.add_collider(Collider::cuboid(wall.center(), wall.size() * 0.5, LAYER_ENVIRONMENT));

    let mut lights = LightRegistry::default();
    lights.add_light(TimedLight::new(Vec3::new(2.0, 3.0, -9.0), 1.0).with_lifetime(60.0));
    lights.add_light(TimedLight::new(Vec3::new(-6.0, 3.0, 4.0), 1.0).with_lifetime(25.0));
    lights.add_light(TimedLight::new(Vec3::new(10.0, 3.0, 10.0), 1.0));

    let world = app.world_mut();
    world.insert_resource(spatial);
    world.insert_resource(lights);
    let target = spawn_target(world, Vec3::new(0.0, 0.0, -10.0), 1, 400);

    for i in 0..AGENT_COUNT {
        let angle = i as f32 / AGENT_COUNT as f32 * std::f32::consts::TAU;
        let position = Vec3::new(angle.cos() * 4.0, 0.0, angle.sin() * 4.0 + 2.0);
        if let Err(err) = spawn_agent(world, position, AgentConfig::default(), 0, 0, Some(target)) {
            eprintln!("Failed to spawn agent {}: {}", i, err);
        }
    }

    let mut died = 0;
    let mut attacks = 0;
    for tick in 0..TICKS {
        app.update();

        // внешний урон: к середине прогона "игрок" добивает двух агентов
        if tick == TICKS / 2 {
            let mut query = app.world_mut().query::<&mut Agent>();
            for mut agent in query.iter_mut(app.world_mut()) {
                if agent.id().0 < 2 {
                    agent.take_damage(1000);
                }
            }
        }

        died += app
            .world()
            .get_resource::<Events<AgentDied>>()
            .map_or(0, |events| events.iter_current_update_events().count());
        attacks += app
            .world()
            .get_resource::<Events<AgentAttacked>>()
            .map_or(0, |events| events.iter_current_update_events().count());

        if tick % 120 == 0 {
            let snapshots = world_snapshot(app.world_mut());
            let states: Vec<String> = snapshots
                .iter()
                .map(|s| format!("{}:{:?}", s.id.0, s.state))
                .collect();
            println!("Tick {}: {} agents [{}]", tick, snapshots.len(), states.join(", "));
        }
    }

    let target_state = app
        .world()
        .get_resource::<TargetRegistry>()
        .and_then(|targets| targets.get(target).cloned());
    println!("Simulation complete! attacks: {}, deaths: {}", attacks, died);
    if let Some(target) = target_state {
        println!(
            "Target HP {}/{}, currency {}",
            target.health.current, target.health.max, target.currency
        );
    }
}

//! UMBRA Simulation Core
//!
//! Контроллер враждебного NPC: perception → FSM → steering → combat → death presentation.
//! Headless ECS на Bevy 0.16; физика и навигация — через `SpatialQuery` / `NavigationQuery`
//! (по умолчанию in-memory `SpatialWorld`).
//!
//! Тик агента разделён на две фазы:
//! - Update (variable rate): `Agent::tick_logic`
//! - FixedUpdate (60Hz): `Agent::tick_physics`

use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::time::Duration;

// Публичные модули
pub mod agent;
pub mod config;
pub mod curve;
pub mod health;
pub mod lights;
pub mod logger;
pub mod math;
pub mod spatial;
pub mod systems;
pub mod target;
pub mod task;

// Re-export основных типов
pub use agent::{Agent, AgentContext, AgentEvent, AgentId, AgentRegistry, AgentSnapshot, AgentState};
pub use config::{AgentConfig, ConfigError};
pub use curve::Curve;
pub use health::Health;
pub use lights::{LightId, LightRegistry, TimedLight};
pub use logger::init_logger;
pub use spatial::{
    Bounds, Collider, ColliderId, ColliderOwner, LayerMask, NavSurface, NavigationQuery, SpatialQuery,
    SpatialWorld, LAYER_AGENTS, LAYER_DRESSING, LAYER_ENVIRONMENT, LAYER_TARGET,
};
pub use systems::{
    move_target, spawn_agent, spawn_target, AgentAttacked, AgentDied, AgentPlugin, SimulationFrame,
};
pub use target::{Target, TargetId, TargetRegistry};
pub use task::TaskStatus;

/// Частота fixed step (Phase B)
pub const FIXED_HZ: f64 = 60.0;

/// Главный plugin симуляции (объединяет все подсистемы)
pub struct SimulationPlugin;

impl Plugin for SimulationPlugin {
    fn build(&self, app: &mut App) {
        // seed, вставленный хостом (create_headless_app), не перезаписываем
        if !app.world().contains_resource::<DeterministicRng>() {
            app.insert_resource(DeterministicRng::new(42));
        }

        app
            // Fixed timestep 60Hz для physics tick
            .insert_resource(Time::<Fixed>::from_hz(FIXED_HZ))
            .add_plugins(AgentPlugin);
    }
}

/// Детерминистичный RNG resource (seeded)
///
/// Каждый агент при spawn берёт из него свой seed.
#[derive(Resource)]
pub struct DeterministicRng {
    pub rng: ChaCha8Rng,
    pub seed: u64,
}

impl DeterministicRng {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }
}

/// Создаёт minimal Bevy App для headless симуляции
///
/// Время двигается вручную: каждый `app.update()` = ровно 1/60 с,
/// так что Update и FixedUpdate идут шаг в шаг и прогоны воспроизводимы.
pub fn create_headless_app(seed: u64) -> App {
    let mut app = App::new();
    init_logger();
    app.add_plugins(MinimalPlugins)
        .insert_resource(DeterministicRng::new(seed))
        .insert_resource(Time::<Fixed>::from_hz(FIXED_HZ))
        .insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_secs_f64(1.0 / FIXED_HZ)));

    app
}

/// Snapshot всех агентов (по AgentId) для сравнения детерминизма
pub fn world_snapshot(world: &mut World) -> Vec<AgentSnapshot> {
    let mut query = world.query::<&Agent>();
    let mut snapshots: Vec<AgentSnapshot> = query.iter(world).map(Agent::snapshot).collect();
    snapshots.sort_by_key(|snapshot| snapshot.id);
    snapshots
}

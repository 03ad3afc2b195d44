//! Bevy host layer: ресурсы мира, события, два расписания агента
//!
//! Update (Phase A, chain):
//! 1. advance_simulation_frame — индекс кадра (ключ мемоизации perception)
//! 2. sync_agent_world — коллайдеры агентов + neighbor snapshot
//! 3. tick_agents_logic — perception → state machine → steering
//! 4. tick_lights — flicker / lifetime
//! 5. publish_agent_events — outbox агентов → Bevy events, награды
//! 6. despawn_finished_agents — после presentation + despawn delay
//!
//! FixedUpdate (Phase B, chain):
//! 1. tick_agents_physics — knockback + sweep-clamped movement → facing
//! 2. sync_agent_transforms — поза агента → entity Transform

use bevy::prelude::*;
use rand::Rng;

use crate::agent::{Agent, AgentContext, AgentEvent, AgentId, AgentRegistry, NeighborInfo};
use crate::config::{AgentConfig, ConfigError};
use crate::lights::LightRegistry;
use crate::logger;
use crate::spatial::{Collider, ColliderOwner, FactionId, SpatialWorld, LAYER_AGENTS, LAYER_TARGET};
use crate::target::{TargetId, TargetRegistry};
use crate::DeterministicRng;

/// Радиус коллайдера цели по умолчанию (`spawn_target`)
const TARGET_COLLIDER_RADIUS: f32 = 0.5;

/// Номер кадра симуляции
#[derive(Resource, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SimulationFrame(pub u64);

/// Событие: агент умер (ровно один раз за смерть)
#[derive(Event, Debug, Clone)]
pub struct AgentDied {
    pub entity: Entity,
    pub agent: AgentId,
    pub position: Vec3,
    /// Кому начислена награда
    pub target: Option<TargetId>,
    pub reward: u32,
    pub spawn_particles: bool,
}

/// Событие: агент нанёс удар цели
#[derive(Event, Debug, Clone)]
pub struct AgentAttacked {
    pub entity: Entity,
    pub agent: AgentId,
    pub target: TargetId,
    pub damage: u32,
}

/// Agent Plugin
///
/// Ресурсы создаются только если их ещё нет (хост может вставить свой SpatialWorld заранее).
pub struct AgentPlugin;

impl Plugin for AgentPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SpatialWorld>()
            .init_resource::<TargetRegistry>()
            .init_resource::<LightRegistry>()
            .init_resource::<AgentRegistry>()
            .init_resource::<SimulationFrame>();

        app.add_event::<AgentDied>().add_event::<AgentAttacked>();

        app.add_systems(
            Update,
            (
                advance_simulation_frame,
                sync_agent_world,
                tick_agents_logic,
                tick_lights,
                publish_agent_events,
                despawn_finished_agents,
            )
                .chain(), // Последовательное выполнение для детерминизма
        );

        app.add_systems(
            FixedUpdate,
            (tick_agents_physics, sync_agent_transforms).chain(),
        );
    }
}

pub fn advance_simulation_frame(mut frame: ResMut<SimulationFrame>) {
    frame.0 += 1;
}

/// Регистрирует коллайдеры новых агентов, двигает существующие, обновляет snapshot соседей
pub fn sync_agent_world(
    mut agents: Query<&mut Agent>,
    mut spatial: ResMut<SpatialWorld>,
    mut registry: ResMut<AgentRegistry>,
) {
    for mut agent in agents.iter_mut() {
        let movement = &agent.config().movement;
        let center = agent.position() + Vec3::Y * movement.body_center_height;
        let radius = movement.body_radius;
        let active = agent.is_enabled() && agent.is_alive();

        let registered = agent.collider;
        match registered {
            Some(collider) => {
                spatial.set_collider_position(collider, center);
                spatial.set_collider_enabled(collider, active);
            }
            None if active => {
                let collider = spatial.add_collider(
                    Collider::sphere(center, radius, LAYER_AGENTS)
                        .with_owner(ColliderOwner::Agent(agent.id()), Some(agent.faction)),
                );
                agent.collider = Some(collider);
            }
            None => {}
        }

        registry.update(
            agent.id(),
            NeighborInfo {
                position: agent.position(),
                velocity: agent.body().velocity,
                alive: active,
                population: agent.population,
            },
        );
    }
}

/// Phase A для всех агентов (порядок по AgentId)
pub fn tick_agents_logic(
    time: Res<Time>,
    frame: Res<SimulationFrame>,
    spatial: Res<SpatialWorld>,
    registry: Res<AgentRegistry>,
    mut targets: ResMut<TargetRegistry>,
    mut lights: ResMut<LightRegistry>,
    mut agents: Query<&mut Agent>,
) {
    let dt = time.delta_secs();
    let mut ordered: Vec<Mut<Agent>> = agents.iter_mut().collect();
    ordered.sort_by_key(|agent| agent.id());

    let mut ctx = AgentContext {
        frame: frame.0,
        spatial: &*spatial,
        navigation: &*spatial,
        neighbors: &registry,
        targets: &mut targets,
        lights: &mut lights,
    };
    for agent in ordered.iter_mut() {
        agent.tick_logic(dt, &mut ctx);
    }
}

pub fn tick_lights(time: Res<Time>, mut lights: ResMut<LightRegistry>) {
    lights.tick(time.delta_secs());
}

/// Забирает outbox агентов: награда за смерть → currency цели, Bevy events
pub fn publish_agent_events(
    mut agents: Query<(Entity, &mut Agent)>,
    mut targets: ResMut<TargetRegistry>,
    mut died_events: EventWriter<AgentDied>,
    mut attacked_events: EventWriter<AgentAttacked>,
) {
    let mut ordered: Vec<(Entity, Mut<Agent>)> = agents.iter_mut().collect();
    ordered.sort_by_key(|(_, agent)| agent.id());

    for (entity, agent) in ordered.iter_mut() {
        let id = agent.id();
        for event in agent.drain_events() {
            match event {
                AgentEvent::Died {
                    position,
                    target,
                    reward,
                    spawn_particles,
                } => {
                    if let Some(target) = target.and_then(|t| targets.get_mut(t)) {
                        target.add_currency(reward);
                        logger::log_info(&format!(
                            "💰 Agent {:?} kill reward {} → {:?} (currency {})",
                            id, reward, target.id, target.currency
                        ));
                    }
                    died_events.write(AgentDied {
                        entity: *entity,
                        agent: id,
                        position,
                        target,
                        reward,
                        spawn_particles,
                    });
                }
                AgentEvent::Attacked { target, damage } => {
                    attacked_events.write(AgentAttacked {
                        entity: *entity,
                        agent: id,
                        target,
                        damage,
                    });
                }
                AgentEvent::LightDrained { light, remaining } => {
                    logger::log(&format!(
                        "Agent {:?} drained {:?} ({:.1}s left)",
                        id, light, remaining
                    ));
                }
                AgentEvent::StateChanged { .. } => {}
            }
        }
    }
}

/// Удаляет агентов, чья смерть полностью обработана
pub fn despawn_finished_agents(
    mut commands: Commands,
    agents: Query<(Entity, &Agent)>,
    mut spatial: ResMut<SpatialWorld>,
    mut registry: ResMut<AgentRegistry>,
) {
    for (entity, agent) in agents.iter() {
        if !agent.is_ready_for_removal() {
            continue;
        }
        // тело + всё, что хост повесил на агента
        for collider in spatial.colliders_of(ColliderOwner::Agent(agent.id())) {
            spatial.remove_collider(collider);
        }
        registry.remove(agent.id());
        commands.entity(entity).despawn();
        logger::log(&format!("Agent {:?} despawned", agent.id()));
    }
}

/// Phase B для всех агентов (fixed step)
pub fn tick_agents_physics(time: Res<Time>, spatial: Res<SpatialWorld>, mut agents: Query<&mut Agent>) {
    let fixed_dt = time.delta_secs();
    for mut agent in agents.iter_mut() {
        agent.tick_physics(fixed_dt, &*spatial);
    }
}

pub fn sync_agent_transforms(mut agents: Query<(&Agent, &mut Transform)>) {
    for (agent, mut transform) in agents.iter_mut() {
        *transform = *agent.transform();
    }
}

/// Создать агента: seed из DeterministicRng, id из AgentRegistry
///
/// Коллайдер регистрирует `sync_agent_world` на следующем Update.
pub fn spawn_agent(
    world: &mut World,
    position: Vec3,
    config: AgentConfig,
    faction: FactionId,
    population: u32,
    target: Option<TargetId>,
) -> Result<Entity, ConfigError> {
    let seed = world
        .get_resource_mut::<DeterministicRng>()
        .map_or(0, |mut rng| rng.rng.gen::<u64>());
    let id = world
        .get_resource_or_insert_with(AgentRegistry::default)
        .allocate_id();

    let agent = Agent::new(id, position, config, seed)?
        .with_faction(faction, population)
        .with_target(target);

    logger::log_info(&format!(
        "🧟 Spawned agent {:?} at {:?} (faction {}, population {})",
        id, position, faction, population
    ));
    Ok(world.spawn((Transform::from_translation(position), agent)).id())
}

/// Создать цель с одним сферическим коллайдером (тело на высоте 1м)
pub fn spawn_target(world: &mut World, position: Vec3, faction: FactionId, max_health: u32) -> TargetId {
    let id = world
        .get_resource_or_insert_with(TargetRegistry::default)
        .spawn(position, faction, max_health);
    let collider = world
        .get_resource_or_insert_with(SpatialWorld::default)
        .add_collider(
            Collider::sphere(position + Vec3::Y, TARGET_COLLIDER_RADIUS, LAYER_TARGET)
                .with_owner(ColliderOwner::Target(id), Some(faction)),
        );
    if let Some(mut targets) = world.get_resource_mut::<TargetRegistry>() {
        if let Some(target) = targets.get_mut(id) {
            target.colliders.push(collider);
        }
    }
    id
}

/// Переместить цель вместе с её коллайдерами
pub fn move_target(world: &mut World, id: TargetId, position: Vec3) {
    let moved = world
        .get_resource_mut::<TargetRegistry>()
        .and_then(|mut targets| {
            let target = targets.get_mut(id)?;
            let delta = position - target.position;
            target.position = position;
            Some((delta, target.colliders.clone()))
        });
    let Some((delta, colliders)) = moved else {
        logger::log_warning(&format!("⚠️ move_target: unknown target {:?}", id));
        return;
    };

    let Some(mut spatial) = world.get_resource_mut::<SpatialWorld>() else {
        return;
    };
    for collider in colliders {
        let Some(current) = spatial.collider(collider).map(|c| c.position) else {
            continue;
        };
        spatial.set_collider_position(collider, current + delta);
    }
}

//! Agent — автономный контроллер враждебного NPC
//!
//! Агрегат из модулей (композиция, не наследование):
//! - `perception` — видимость цели, last-known, упреждение
//! - `state_machine` — Idle/Patrol/Chase/Attack/BreakOff
//! - `navigation` + `steering` + `flocking` — desired velocity
//! - `combat` — cooldown, урон цели, drain света
//! - `knockback` + `kinematics` — Phase B (fixed step)
//! - `presentation` + `visuals` — анимация смерти
//!
//! Два тика (вызывает внешний scheduler):
//! - `tick_logic(dt)`: perception → state machine → steering
//! - `tick_physics(fixed_dt)`: knockback + sweep-clamped movement → facing
//!
//! Инвариант: после смерти (`alive = false`) perception/state/steering/combat
//! больше ничего не мутируют; только presentation до полного отключения.

use bevy::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::{AgentConfig, ConfigError};
use crate::health::Health;
use crate::lights::{LightId, LightRegistry};
use crate::logger;
use crate::math::{planar, EPSILON};
use crate::spatial::{ColliderId, ColliderOwner, FactionId, NavigationQuery, OverlapHit, SpatialQuery};
use crate::target::{Target, TargetId, TargetRegistry};

pub mod combat;
pub mod flocking;
pub mod kinematics;
pub mod knockback;
pub mod navigation;
pub mod perception;
pub mod presentation;
pub mod state_machine;
pub mod steering;
pub mod visuals;

// Tests (separate files with _tests suffix)
#[cfg(test)]
mod agent_tests;

pub use state_machine::{AgentState, Transition, TransitionInputs};
pub use visuals::{PresentationRoot, SharedMaterial, VisualRig};

use combat::AttackCooldown;
use flocking::Neighbor;
use knockback::Knockback;
use navigation::NavAgent;
use perception::{Observer, Perception};
use presentation::DeathPresentation;
use steering::IntegratedVelocity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct AgentId(pub u32);

/// Физическое тело агента (трансформ + скорости)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Body {
    pub transform: Transform,
    /// Планарная скорость тика (после smoothing, до knockback/коллизий)
    pub velocity: Vec3,
    /// После accel/decel шага, до smoothing
    pub raw_velocity: Vec3,
    /// Фактическая скорость после knockback и sweep
    pub applied_velocity: Vec3,
    pub mover_enabled: bool,
}

impl Body {
    fn at(position: Vec3) -> Self {
        Self {
            transform: Transform::from_translation(position),
            velocity: Vec3::ZERO,
            raw_velocity: Vec3::ZERO,
            applied_velocity: Vec3::ZERO,
            mover_enabled: true,
        }
    }
}

/// Исходящие уведомления агента (outbox, забирает хост)
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    StateChanged {
        from: AgentState,
        to: AgentState,
    },
    Attacked {
        target: TargetId,
        damage: u32,
    },
    LightDrained {
        light: LightId,
        remaining: f32,
    },
    /// Ровно один раз за смерть
    Died {
        position: Vec3,
        target: Option<TargetId>,
        reward: u32,
        spawn_particles: bool,
    },
}

/// Read-only снимок соседа для flocking
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighborInfo {
    pub position: Vec3,
    pub velocity: Vec3,
    pub alive: bool,
    pub population: u32,
}

/// Снимок всех агентов на начало тика (нет cross-agent мутаций)
#[derive(Debug, Default, Resource)]
pub struct AgentRegistry {
    agents: BTreeMap<AgentId, NeighborInfo>,
    next_id: u32,
}

impl AgentRegistry {
    pub fn allocate_id(&mut self) -> AgentId {
        let id = AgentId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn update(&mut self, id: AgentId, info: NeighborInfo) {
        self.next_id = self.next_id.max(id.0 + 1);
        self.agents.insert(id, info);
    }

    pub fn get(&self, id: AgentId) -> Option<&NeighborInfo> {
        self.agents.get(&id)
    }

    pub fn remove(&mut self, id: AgentId) {
        self.agents.remove(&id);
    }

    pub fn retain(&mut self, mut keep: impl FnMut(AgentId) -> bool) {
        self.agents.retain(|id, _| keep(*id));
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// Всё внешнее, что нужно агенту в Phase A
pub struct AgentContext<'a> {
    /// Индекс кадра (ключ мемоизации perception)
    pub frame: u64,
    pub spatial: &'a dyn SpatialQuery,
    pub navigation: &'a dyn NavigationQuery,
    pub neighbors: &'a AgentRegistry,
    pub targets: &'a mut TargetRegistry,
    pub lights: &'a mut LightRegistry,
}

/// Debug/determinism snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: AgentId,
    pub state: AgentState,
    pub position: [f32; 3],
    pub velocity: [f32; 3],
    pub health: u32,
    pub alive: bool,
    pub enabled: bool,
    pub target: Option<TargetId>,
    pub orbit_direction: f32,
}

#[derive(Component, Debug, Clone)]
pub struct Agent {
    id: AgentId,
    pub faction: FactionId,
    /// Flocking только внутри одной популяции
    pub population: u32,
    config: AgentConfig,

    body: Body,
    health: Health,
    alive: bool,
    enabled: bool,

    state: AgentState,
    state_timer: f32,
    idle_duration: f32,
    spawn_anchor: Vec3,
    target: Option<TargetId>,

    perception: Perception,
    nav: NavAgent,
    /// +1 / -1
    orbit_direction: f32,
    desired_velocity: Vec3,
    cooldown: AttackCooldown,
    knockback: Knockback,

    pub visuals: VisualRig,
    presentation: DeathPresentation,
    despawn_timer: Option<f32>,
    /// Коллайдер тела в SpatialWorld (регистрирует хост)
    pub collider: Option<ColliderId>,

    rng: ChaCha8Rng,
    outbox: Vec<AgentEvent>,
    /// Локальные часы агента (сумма dt логики)
    clock: f32,
    was_visible: bool,
    /// Куда смотреть в Attack (обновляется в Phase A)
    facing_target: Option<Vec3>,
    warned_off_surface: bool,
    neighbor_hits: Vec<OverlapHit>,
    neighbor_buffer: Vec<Neighbor>,
}

impl Agent {
    pub fn new(id: AgentId, spawn: Vec3, config: AgentConfig, seed: u64) -> Result<Self, ConfigError> {
        if let Err(err) = config.validate() {
            logger::log_error(&format!("❌ Agent {:?}: invalid config: {}", id, err));
            return Err(err);
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let idle_duration = random_idle_duration(&mut rng, &config);
        let orbit_direction = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };

        Ok(Self {
            id,
            faction: 0,
            population: 0,
            body: Body::at(spawn),
            health: Health::new(config.combat.max_health),
            alive: true,
            enabled: true,
            state: AgentState::Idle,
            state_timer: 0.0,
            idle_duration,
            spawn_anchor: spawn,
            target: None,
            perception: Perception::new(&config.perception),
            nav: NavAgent::new(&config.navigation),
            orbit_direction,
            desired_velocity: Vec3::ZERO,
            cooldown: AttackCooldown::new(config.combat.attack_cooldown),
            knockback: Knockback::default(),
            visuals: VisualRig::new(),
            presentation: DeathPresentation::default(),
            despawn_timer: None,
            collider: None,
            rng,
            outbox: Vec::new(),
            clock: 0.0,
            was_visible: false,
            facing_target: None,
            warned_off_surface: false,
            neighbor_hits: Vec::new(),
            neighbor_buffer: Vec::new(),
            config,
        })
    }

    pub fn with_faction(mut self, faction: FactionId, population: u32) -> Self {
        self.faction = faction;
        self.population = population;
        self
    }

    pub fn with_visuals(mut self, visuals: VisualRig) -> Self {
        self.visuals = visuals;
        self
    }

    pub fn with_target(mut self, target: Option<TargetId>) -> Self {
        self.target = target;
        self
    }

    // ---- read surface ----

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn state_timer(&self) -> f32 {
        self.state_timer
    }

    pub fn idle_duration(&self) -> f32 {
        self.idle_duration
    }

    pub fn target(&self) -> Option<TargetId> {
        self.target
    }

    pub fn position(&self) -> Vec3 {
        self.body.transform.translation
    }

    pub fn transform(&self) -> &Transform {
        &self.body.transform
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn spawn_anchor(&self) -> Vec3 {
        self.spawn_anchor
    }

    pub fn desired_velocity(&self) -> Vec3 {
        self.desired_velocity
    }

    pub fn orbit_direction(&self) -> f32 {
        self.orbit_direction
    }

    pub fn perception(&self) -> &Perception {
        &self.perception
    }

    pub fn navigation(&self) -> &NavAgent {
        &self.nav
    }

    pub fn cooldown(&self) -> &AttackCooldown {
        &self.cooldown
    }

    pub fn knockback(&self) -> &Knockback {
        &self.knockback
    }

    pub fn presentation(&self) -> &DeathPresentation {
        &self.presentation
    }

    pub fn clock(&self) -> f32 {
        self.clock
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn current_health(&self) -> u32 {
        self.health.current
    }

    pub fn health_percentage(&self) -> f32 {
        self.health.percentage()
    }

    /// Смерть обработана: presentation завершена и despawn delay истёк
    pub fn is_ready_for_removal(&self) -> bool {
        !self.alive && !self.presentation.is_running() && self.despawn_timer.is_some_and(|t| t <= 0.0)
    }

    pub fn drain_events(&mut self) -> Vec<AgentEvent> {
        std::mem::take(&mut self.outbox)
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            id: self.id,
            state: self.state,
            position: self.position().to_array(),
            velocity: self.body.applied_velocity.to_array(),
            health: self.health.current,
            alive: self.alive,
            enabled: self.enabled,
            target: self.target,
            orbit_direction: self.orbit_direction,
        }
    }

    // ---- external entry points ----

    /// Принудительная погоня (повторный вызов с той же целью идемпотентен)
    pub fn force_chase(&mut self, target: Option<&Target>, reset_path: bool) -> bool {
        if !self.alive {
            return false;
        }
        let Some(target) = target.filter(|t| t.is_alive()) else {
            logger::log_warning(&format!("⚠️ Agent {:?}: force_chase without a live target", self.id));
            return false;
        };

        if self.target != Some(target.id) {
            self.target = Some(target.id);
            self.perception.invalidate();
        }
        // без наблюдения grace истёк бы сразу → BreakOff на следующем тике
        self.perception.assume_sighting(target.id, target.position, self.clock);
        if reset_path {
            self.nav.clear();
        }
        if !self.state.is_combat() {
            self.switch_state(AgentState::Chase);
        }
        true
    }

    /// Прекратить погоню: цель сбрасывается, агент возвращается к patrol/idle
    pub fn stop_chase(&mut self, resume_patrol: bool, navigation: &dyn NavigationQuery) {
        if !self.alive {
            return;
        }
        self.target = None;
        self.perception.invalidate();
        self.was_visible = false;
        self.facing_target = None;

        let next = if resume_patrol && self.config.patrol.enabled {
            AgentState::Patrol
        } else {
            AgentState::Idle
        };
        self.enter_state(next, navigation);
    }

    /// Knockback от внешних способностей/взрывов
    pub fn apply_impact(&mut self, direction: Vec3, strength: f32, fade_duration: f32) {
        if !self.alive {
            return;
        }
        self.knockback.apply(direction, strength, fade_duration);
    }

    /// Урон агенту; смерть ровно один раз
    pub fn take_damage(&mut self, amount: u32) {
        if !self.alive {
            return;
        }
        self.health.take_damage(amount);
        if !self.health.is_alive() {
            self.die();
        }
    }

    /// Re-enable pooled агента
    pub fn respawn(&mut self, position: Vec3) {
        self.presentation.reset(&mut self.visuals, &mut self.body.transform);

        self.body = Body::at(position);
        self.spawn_anchor = position;
        self.health.restore();
        self.alive = true;
        self.enabled = true;
        self.despawn_timer = None;
        self.target = None;
        self.perception.invalidate();
        self.nav.clear();
        self.knockback.clear();
        self.cooldown.reset();
        self.desired_velocity = Vec3::ZERO;
        self.was_visible = false;
        self.facing_target = None;
        self.warned_off_surface = false;
        self.state = AgentState::Idle;
        self.state_timer = 0.0;
        self.idle_duration = random_idle_duration(&mut self.rng, &self.config);
        self.nav.set_refresh_interval(self.config.navigation.base_refresh_interval);

        logger::log_info(&format!("♻️ Agent {:?} respawned at {:?}", self.id, position));
    }

    fn die(&mut self) {
        self.alive = false;
        self.body.mover_enabled = false;
        self.body.velocity = Vec3::ZERO;
        self.body.raw_velocity = Vec3::ZERO;
        self.body.applied_velocity = Vec3::ZERO;
        self.desired_velocity = Vec3::ZERO;
        self.knockback.clear();
        self.nav.clear();
        self.facing_target = None;

        let position = self.position();
        let combat = &self.config.combat;
        self.despawn_timer = Some(combat.despawn_delay);
        self.outbox.push(AgentEvent::Died {
            position,
            target: self.target,
            reward: combat.kill_reward,
            spawn_particles: combat.spawn_death_particles,
        });

        self.presentation.trigger(
            &mut self.visuals,
            &mut self.body.transform,
            &self.config.presentation,
            &mut self.rng,
        );

        logger::log_info(&format!("💀 Agent {:?} died in {:?}", self.id, self.state));
    }

    // ---- Phase A ----

    pub fn tick_logic(&mut self, dt: f32, ctx: &mut AgentContext) {
        if let Some(timer) = self.despawn_timer.as_mut() {
            *timer = (*timer - dt).max(0.0);
        }
        if !self.enabled {
            return;
        }
        self.clock += dt;

        if !self.alive {
            let status = self.presentation.advance(
                dt,
                &mut self.visuals,
                &mut self.body.transform,
                &self.config.presentation,
            );
            if status.is_done() {
                self.enabled = false;
                logger::log(&format!("Agent {:?} presentation finished, disabled", self.id));
            }
            return;
        }

        self.state_timer += dt;
        self.cooldown.tick(dt);
        self.recover_off_surface(ctx.navigation);

        let visible = self.refresh_perception(ctx);
        if self.state == AgentState::Attack && self.was_visible && !visible {
            self.orbit_direction = -self.orbit_direction;
        }
        self.was_visible = visible;

        self.update_state(visible, ctx);
        self.compute_steering(dt, ctx);
    }

    /// Живая цель или None (удалённая/мёртвая цель = null)
    fn live_target<'t>(&self, targets: &'t TargetRegistry) -> Option<&'t Target> {
        self.target
            .and_then(|id| targets.get(id))
            .filter(|target| target.is_alive())
    }

    fn observer(&self) -> Observer {
        Observer {
            id: self.id,
            faction: self.faction,
            position: self.position(),
            forward: kinematics::planar_forward(&self.body.transform),
            state: self.state,
        }
    }

    /// Perception для текущего кадра (мемоизировано)
    pub fn is_target_visible(&mut self, ctx: &AgentContext) -> bool {
        self.refresh_perception(ctx)
    }

    fn refresh_perception(&mut self, ctx: &AgentContext) -> bool {
        let observer = self.observer();
        let target = self.live_target(ctx.targets);
        self.perception.is_target_visible(
            &observer,
            target,
            ctx.frame,
            self.clock,
            ctx.spatial,
            &self.config.perception,
        )
    }

    fn recover_off_surface(&mut self, navigation: &dyn NavigationQuery) {
        let position = self.position();
        if navigation.is_on_surface(position) {
            self.warned_off_surface = false;
            return;
        }

        match navigation.sample_position(position, self.config.navigation.surface_sample_radius) {
            Some(point) => {
                logger::log_warning(&format!(
                    "⚠️ Agent {:?} off nav surface at {:?}, warping to {:?}",
                    self.id, position, point
                ));
                self.body.transform.translation = point;
                self.nav.on_warped();
            }
            None if !self.warned_off_surface => {
                logger::log_warning(&format!(
                    "⚠️ Agent {:?}: no navigation surface near {:?}",
                    self.id, position
                ));
                self.warned_off_surface = true;
            }
            None => {}
        }
    }

    fn transition_inputs(&self, visible: bool, targets: &TargetRegistry) -> TransitionInputs {
        let position = self.position();
        let combat = &self.config.combat;
        TransitionInputs {
            target_distance: self
                .live_target(targets)
                .map(|target| planar(target.position - position).length()),
            target_visible: visible,
            time_since_seen: self.perception.time_since_seen(self.clock),
            lost_sight_grace: self.config.perception.lost_sight_grace,
            attack_range: combat.attack_range,
            attack_enter_factor: combat.attack_enter_factor,
            attack_exit_factor: combat.attack_exit_factor,
            idle_elapsed: self.state_timer >= self.idle_duration,
            patrol_enabled: self.config.patrol.enabled,
            destination_reached: self
                .nav
                .path_complete(position, self.config.navigation.arrive_tolerance),
            has_last_known: self.perception.last_known_position().is_some(),
        }
    }

    fn update_state(&mut self, visible: bool, ctx: &mut AgentContext) {
        let inputs = self.transition_inputs(visible, ctx.targets);
        match state_machine::decide(self.state, &inputs) {
            Transition::Stay => {}
            Transition::Enter(next) => self.enter_state(next, ctx.navigation),
            Transition::RepickPatrolPoint => {
                if !self.pick_patrol_point(ctx.navigation) {
                    self.patrol_fallback();
                }
            }
        }

        let position = self.position();
        match self.state {
            AgentState::Chase => {
                self.facing_target = None;
                let speed = steering::state_speed(AgentState::Chase, &self.config.movement);
                if let Some(goal) = self
                    .perception
                    .predicted_position(position, speed, &self.config.perception)
                {
                    self.nav.set_destination(
                        goal,
                        position,
                        self.clock,
                        ctx.navigation,
                        &self.config.navigation,
                        false,
                    );
                }
            }
            AgentState::Attack => self.update_attack(ctx),
            _ => self.facing_target = None,
        }
    }

    fn update_attack(&mut self, ctx: &mut AgentContext) {
        let position = self.position();
        let Some((target_id, target_position)) = self
            .live_target(ctx.targets)
            .map(|target| (target.id, target.position))
        else {
            return;
        };

        self.facing_target = Some(target_position);
        self.nav.set_destination(
            target_position,
            position,
            self.clock,
            ctx.navigation,
            &self.config.navigation,
            false,
        );

        let distance = planar(target_position - position).length();
        let Some(damage) = self.cooldown.try_attack(distance, &self.config.combat) else {
            return;
        };
        let Some(target) = ctx.targets.get_mut(target_id) else {
            return;
        };

        let seed = self.rng.gen::<u64>();
        let outcome = combat::strike(target, ctx.lights, position, damage, &self.config.light_drain, seed);
        logger::log_info(&format!(
            "⚔️ Agent {:?} hit {:?} for {} (target HP {})",
            self.id, target_id, outcome.damage_dealt, target.health.current
        ));
        self.outbox.push(AgentEvent::Attacked {
            target: target_id,
            damage: outcome.damage_dealt,
        });
        if let Some((light, remaining)) = outcome.drained_light {
            self.outbox.push(AgentEvent::LightDrained { light, remaining });
        }
    }

    /// Вход в состояние с entry-эффектами
    fn enter_state(&mut self, next: AgentState, navigation: &dyn NavigationQuery) {
        if next == AgentState::Patrol {
            self.switch_state(AgentState::Patrol);
            if !self.pick_patrol_point(navigation) {
                self.patrol_fallback();
            }
            return;
        }

        self.switch_state(next);
        match next {
            AgentState::Idle => self.nav.clear(),
            AgentState::BreakOff => match self.perception.last_known_position() {
                Some(last_known) => {
                    let position = self.position();
                    self.nav.set_destination(
                        last_known,
                        position,
                        self.clock,
                        navigation,
                        &self.config.navigation,
                        true,
                    );
                }
                None => self.nav.clear(),
            },
            _ => {}
        }
    }

    /// Смена состояния: таймер, cadence навигации, idle duration, событие
    fn switch_state(&mut self, next: AgentState) {
        let from = self.state;
        self.state = next;
        self.state_timer = 0.0;

        let nav_config = &self.config.navigation;
        self.nav.set_refresh_interval(match next {
            AgentState::Chase => nav_config.chase_refresh_interval,
            AgentState::Attack => nav_config.attack_refresh_interval,
            _ => nav_config.base_refresh_interval,
        });
        if matches!(next, AgentState::Idle | AgentState::Patrol) {
            self.idle_duration = random_idle_duration(&mut self.rng, &self.config);
        }

        if from != next {
            logger::log(&format!("Agent {:?}: {:?} → {:?}", self.id, from, next));
            self.outbox.push(AgentEvent::StateChanged { from, to: next });
        }
    }

    /// Случайная точка patrol вокруг spawn anchor (`sample_attempts` попыток)
    fn pick_patrol_point(&mut self, navigation: &dyn NavigationQuery) -> bool {
        let patrol = &self.config.patrol;
        for _ in 0..patrol.sample_attempts {
            let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
            let radius = patrol.radius * self.rng.gen::<f32>().sqrt();
            let candidate = self.spawn_anchor + Vec3::new(angle.cos(), 0.0, angle.sin()) * radius;

            if let Some(point) = navigation.sample_position(candidate, patrol.sample_radius) {
                let position = self.body.transform.translation;
                self.nav.set_destination(
                    point,
                    position,
                    self.clock,
                    navigation,
                    &self.config.navigation,
                    true,
                );
                return true;
            }
        }
        false
    }

    fn patrol_fallback(&mut self) {
        logger::log_warning(&format!(
            "⚠️ Agent {:?}: no patrol point found after {} samples, idling",
            self.id, self.config.patrol.sample_attempts
        ));
        self.switch_state(AgentState::Idle);
        self.nav.clear();
    }

    fn compute_steering(&mut self, dt: f32, ctx: &AgentContext) {
        if !self.body.mover_enabled {
            self.desired_velocity = Vec3::ZERO;
            return;
        }

        let position = self.position();
        let movement = &self.config.movement;
        let speed = steering::state_speed(self.state, movement);

        let navigation_velocity = self
            .nav
            .steering(position, &self.config.navigation)
            .map_or(Vec3::ZERO, |s| s.direction * speed * s.speed_factor);

        let attack_velocity = if self.state == AgentState::Attack {
            self.live_target(ctx.targets).map(|target| {
                let aim = self
                    .perception
                    .predicted_position(position, speed, &self.config.perception)
                    .unwrap_or(target.position);
                steering::attack_orbit(
                    position,
                    aim,
                    self.orbit_direction,
                    kinematics::planar_forward(&self.body.transform),
                    speed,
                    &self.config.attack_orbit,
                )
                .velocity
            })
        } else {
            None
        };

        let weight = steering::flocking_weight(self.state, &self.config.flocking);
        let flock = if weight > EPSILON {
            flocking::gather_neighbors(
                self.id,
                self.population,
                position,
                &self.config.flocking,
                ctx.spatial,
                ctx.neighbors,
                &mut self.neighbor_hits,
                &mut self.neighbor_buffer,
            );
            flocking::flocking_force(position, &self.neighbor_buffer, &self.config.flocking, movement.base_speed)
        } else {
            Vec3::ZERO
        };

        self.desired_velocity = steering::blend_desired(
            navigation_velocity,
            attack_velocity,
            self.config.attack_orbit.pursuit_blend,
            flock,
            weight,
            speed,
        );

        let integrated = steering::integrate_velocity(
            IntegratedVelocity {
                raw: self.body.raw_velocity,
                smoothed: self.body.velocity,
            },
            self.desired_velocity,
            movement,
            dt,
        );
        self.body.raw_velocity = integrated.raw;
        self.body.velocity = integrated.smoothed;
    }

    // ---- Phase B ----

    pub fn tick_physics(&mut self, fixed_dt: f32, spatial: &dyn SpatialQuery) {
        if !self.enabled || !self.alive || !self.body.mover_enabled {
            return;
        }

        let knockback = self.knockback.tick(fixed_dt);
        let velocity = planar(self.body.velocity) + knockback;

        let result = kinematics::resolve_motion(
            spatial,
            self.position(),
            velocity,
            fixed_dt,
            &self.config.movement,
            ColliderOwner::Agent(self.id),
        );
        self.body.transform.translation += result.displacement;
        self.body.applied_velocity = result.velocity;
        if let Some(hit) = result.hit {
            self.body.velocity = kinematics::slide_along(self.body.velocity, hit.normal);
            self.body.raw_velocity = kinematics::slide_along(self.body.raw_velocity, hit.normal);
        }

        let facing = match (self.state, self.facing_target) {
            (AgentState::Attack, Some(target)) => target - self.position(),
            _ => self.body.applied_velocity,
        };
        kinematics::update_facing(
            &mut self.body.transform,
            facing,
            self.config.movement.turn_speed_degrees,
            fixed_dt,
        );
    }
}

fn random_idle_duration(rng: &mut ChaCha8Rng, config: &AgentConfig) -> f32 {
    let patrol = &config.patrol;
    if patrol.idle_duration_max > patrol.idle_duration_min {
        rng.gen_range(patrol.idle_duration_min..=patrol.idle_duration_max)
    } else {
        patrol.idle_duration_min
    }
}

//! Steering: navigation blend + attack orbit + velocity integration
//!
//! Desired velocity = navigation velocity (или blend с attack orbit в Attack)
//! + flocking × state weight, обрезанная до target speed состояния.

use bevy::prelude::*;

use super::AgentState;
use crate::config::{AttackOrbitConfig, FlockingConfig, MovementConfig};
use crate::math::{clamp_length, damp_factor, move_towards, normalize_or, planar, EPSILON};

/// Target speed состояния (множитель × base speed)
pub fn state_speed(state: AgentState, config: &MovementConfig) -> f32 {
    let multiplier = match state {
        AgentState::Idle => config.idle_speed_multiplier,
        AgentState::Patrol => config.patrol_speed_multiplier,
        AgentState::Chase => config.chase_speed_multiplier,
        AgentState::Attack => config.attack_speed_multiplier,
        AgentState::BreakOff => config.break_off_speed_multiplier,
    };
    config.base_speed * multiplier
}

/// Вес flocking: 0 в Attack, 0.25 Chase, 0.4 BreakOff, 1.0 иначе (по умолчанию)
pub fn flocking_weight(state: AgentState, config: &FlockingConfig) -> f32 {
    match state {
        AgentState::Idle => config.idle_weight,
        AgentState::Patrol => config.patrol_weight,
        AgentState::Chase => config.chase_weight,
        AgentState::Attack => config.attack_weight,
        AgentState::BreakOff => config.break_off_weight,
    }
}

/// Составляющие attack orbit (для отладки и тестов)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitTerms {
    pub pursuit: Vec3,
    pub tangential: Vec3,
    /// Ошибка дистанции / tolerance, clamp в [-1, 1]
    pub radial_correction: f32,
    pub radial: Vec3,
    pub velocity: Vec3,
}

pub fn attack_orbit(
    position: Vec3,
    aim_point: Vec3,
    orbit_direction: f32,
    fallback_forward: Vec3,
    target_speed: f32,
    config: &AttackOrbitConfig,
) -> OrbitTerms {
    let to_target = planar(aim_point - position);
    let distance = to_target.length();
    let direction = normalize_or(to_target, fallback_forward);

    let error = distance - config.preferred_distance;
    let tolerance = config.distance_tolerance.max(EPSILON);
    let radial_correction = (error / tolerance).clamp(-1.0, 1.0);
    let radial = direction * radial_correction * config.radial_strength;

    // тангенциальный член сильнее у preferred distance
    let closeness = 1.0 - (error.abs() / tolerance).min(1.0);
    let boost = 1.0 + config.orbit_boost * closeness;
    let tangential = Vec3::Y.cross(direction) * config.orbit_speed * orbit_direction * boost;

    // за пределами полосы — полноценное преследование
    let pursuit_weight = ((error - tolerance) / tolerance).clamp(0.0, 1.0);
    let pursuit = direction * target_speed * pursuit_weight;

    let velocity = clamp_length(planar(pursuit + tangential + radial), target_speed);
    OrbitTerms {
        pursuit,
        tangential,
        radial_correction,
        radial,
        velocity,
    }
}

/// Сложение входов с весами + clamp по target speed
pub fn blend_desired(
    navigation: Vec3,
    attack: Option<Vec3>,
    pursuit_blend: f32,
    flocking: Vec3,
    flocking_weight: f32,
    target_speed: f32,
) -> Vec3 {
    let base = match attack {
        Some(attack) => navigation.lerp(attack, pursuit_blend.clamp(0.0, 1.0)),
        None => navigation,
    };
    clamp_length(planar(base + flocking * flocking_weight), target_speed)
}

/// Интегрированная скорость тела
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IntegratedVelocity {
    /// После accel/decel шага
    pub raw: Vec3,
    /// После exponential smoothing (планарная скорость тика)
    pub smoothed: Vec3,
}

/// accel пока цель ненулевая, decel к нулю, затем exponential smoothing
pub fn integrate_velocity(
    current: IntegratedVelocity,
    desired: Vec3,
    config: &MovementConfig,
    dt: f32,
) -> IntegratedVelocity {
    let rate = if desired.length() < EPSILON {
        config.deceleration
    } else {
        config.acceleration
    };
    let raw = move_towards(current.raw, desired, rate * dt.max(0.0));

    let smoothed = if config.velocity_smoothing > 0.0 {
        current
            .smoothed
            .lerp(raw, damp_factor(config.velocity_smoothing, dt))
    } else {
        raw
    };

    let smoothed = if smoothed.length() < EPSILON { Vec3::ZERO } else { smoothed };
    IntegratedVelocity { raw, smoothed }
}

//! Kinematic displacement resolution + facing
//!
//! Один sweep test за physics tick: движение обрезается перед ближайшим
//! препятствием (без туннелирования), остаток скорости проецируется на
//! плоскость контакта.

use bevy::prelude::*;

use crate::config::MovementConfig;
use crate::math::{normalize_or, planar, rotate_towards, yaw_rotation, EPSILON};
use crate::spatial::{ColliderOwner, SpatialQuery, SweepHit};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveResult {
    /// Смещение pivot за тик
    pub displacement: Vec3,
    /// Скорость после контакта (для applied velocity)
    pub velocity: Vec3,
    pub hit: Option<SweepHit>,
}

/// Убрать компоненту скорости, направленную в поверхность
pub fn slide_along(velocity: Vec3, normal: Vec3) -> Vec3 {
    let into = velocity.dot(normal);
    if into < 0.0 {
        velocity - normal * into
    } else {
        velocity
    }
}

pub fn resolve_motion(
    spatial: &dyn SpatialQuery,
    position: Vec3,
    velocity: Vec3,
    dt: f32,
    config: &MovementConfig,
    owner: ColliderOwner,
) -> MoveResult {
    let velocity = planar(velocity);
    let distance = velocity.length() * dt;
    if distance < EPSILON {
        return MoveResult {
            displacement: Vec3::ZERO,
            velocity,
            hit: None,
        };
    }

    let direction = velocity / velocity.length();
    let origin = position + Vec3::Y * config.body_center_height;
    let hit = spatial.sweep_test(
        origin,
        config.body_radius,
        direction,
        distance + config.skin_width,
        config.collision_mask,
        owner,
    );

    match hit {
        Some(hit) => {
            let allowed = (hit.distance - config.skin_width).clamp(0.0, distance);
            MoveResult {
                displacement: direction * allowed,
                velocity: planar(slide_along(velocity, hit.normal)),
                hit: Some(hit),
            }
        }
        None => MoveResult {
            displacement: direction * distance,
            velocity,
            hit: None,
        },
    }
}

/// Поворот по yaw к `direction` с ограничением угловой скорости
///
/// Вырожденное направление — поворот не меняется.
pub fn update_facing(transform: &mut Transform, direction: Vec3, turn_speed_degrees: f32, dt: f32) {
    let Some(target) = yaw_rotation(direction) else {
        return;
    };
    let max_step = turn_speed_degrees.to_radians() * dt.max(0.0);
    transform.rotation = rotate_towards(transform.rotation, target, max_step);
}

/// Planar forward трансформа (fallback -Z)
pub fn planar_forward(transform: &Transform) -> Vec3 {
    normalize_or(planar(*transform.forward()), Vec3::NEG_Z)
}

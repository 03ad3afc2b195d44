//! Vector helpers с epsilon-защитой
//!
//! Все сравнения с нулём идут через `EPSILON`, нормализация никогда не делит на ноль.

use bevy::prelude::*;

/// Порог "нулевого" вектора / скаляра
pub const EPSILON: f32 = 1e-4;

/// Проекция на горизонтальную плоскость (XZ)
#[inline]
pub fn planar(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

/// Нормализация с fallback для вырожденных векторов
#[inline]
pub fn normalize_or(v: Vec3, fallback: Vec3) -> Vec3 {
    let len = v.length();
    if len > EPSILON {
        v / len
    } else {
        fallback
    }
}

/// Ограничение длины вектора
#[inline]
pub fn clamp_length(v: Vec3, max: f32) -> Vec3 {
    let len = v.length();
    if len > max && len > EPSILON {
        v * (max / len)
    } else {
        v
    }
}

/// Сдвиг `current` к `target` не более чем на `max_delta`
pub fn move_towards(current: Vec3, target: Vec3, max_delta: f32) -> Vec3 {
    let delta = target - current;
    let distance = delta.length();
    if distance <= max_delta || distance < EPSILON {
        target
    } else {
        current + delta / distance * max_delta
    }
}

/// Frame-rate independent exponential smoothing factor
#[inline]
pub fn damp_factor(sharpness: f32, dt: f32) -> f32 {
    1.0 - (-sharpness.max(0.0) * dt.max(0.0)).exp()
}

/// Стандартный smoothstep 3t² - 2t³ (вход clamp в [0,1])
#[inline]
pub fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Поворот не более чем на `max_angle` радиан к `target`
pub fn rotate_towards(current: Quat, target: Quat, max_angle: f32) -> Quat {
    let angle = current.angle_between(target);
    if angle < EPSILON || angle <= max_angle {
        target
    } else {
        current.slerp(target, (max_angle / angle).clamp(0.0, 1.0))
    }
}

/// Yaw-rotation, смотрящая вдоль планарного направления (forward = -Z как у Bevy)
pub fn yaw_rotation(direction: Vec3) -> Option<Quat> {
    let flat = planar(direction);
    if flat.length_squared() < EPSILON * EPSILON {
        return None;
    }
    Some(Transform::IDENTITY.looking_to(flat.normalize(), Vec3::Y).rotation)
}

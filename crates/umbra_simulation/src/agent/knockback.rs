//! Knockback integrator
//!
//! Один накопленный импульс + скалярная скорость затухания.
//! Не зависит от steering: складывается с итоговой planar velocity в Phase B
//! и линейно затухает до нуля за `fade` секунд последнего удара.

use bevy::prelude::*;

use crate::math::{normalize_or, planar, EPSILON};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Knockback {
    impulse: Vec3,
    /// m/s за секунду
    decay_rate: f32,
}

impl Knockback {
    /// Добавить импульс (direction проецируется на плоскость)
    ///
    /// Вырожденное направление или `strength <= 0` — no-op.
    pub fn apply(&mut self, direction: Vec3, strength: f32, fade_duration: f32) {
        let direction = normalize_or(planar(direction), Vec3::ZERO);
        if direction == Vec3::ZERO || strength <= 0.0 {
            return;
        }

        self.impulse += direction * strength;
        let magnitude = self.impulse.length();
        self.decay_rate = if fade_duration > EPSILON {
            magnitude / fade_duration
        } else {
            // мгновенный толчок: живёт один тик
            f32::INFINITY
        };
    }

    pub fn velocity(&self) -> Vec3 {
        self.impulse
    }

    pub fn is_active(&self) -> bool {
        self.impulse.length_squared() > EPSILON * EPSILON
    }

    /// Вклад на этот тик, затем затухание
    pub fn tick(&mut self, dt: f32) -> Vec3 {
        let contribution = self.impulse;
        if !self.is_active() {
            self.clear();
            return Vec3::ZERO;
        }
        if dt <= 0.0 {
            return contribution;
        }

        let magnitude = self.impulse.length();
        let next = magnitude - self.decay_rate * dt;
        if next <= EPSILON {
            self.clear();
        } else {
            self.impulse *= next / magnitude;
        }
        contribution
    }

    pub fn clear(&mut self) {
        self.impulse = Vec3::ZERO;
        self.decay_rate = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_knockback_decays_monotonically_to_zero() {
        let mut knockback = Knockback::default();
        knockback.apply(Vec3::new(1.0, 0.5, 0.0), 6.0, 0.5);

        let dt = 1.0 / 60.0;
        let mut previous = f32::INFINITY;
        let mut elapsed = 0.0;
        while elapsed < 0.5 + dt * 0.5 {
            let magnitude = knockback.tick(dt).length();
            assert!(magnitude <= previous, "{} > {}", magnitude, previous);
            previous = magnitude;
            elapsed += dt;
        }

        assert!(!knockback.is_active());
        assert_eq!(knockback.tick(dt), Vec3::ZERO);
    }

    #[test]
    fn test_knockback_is_planar() {
        let mut knockback = Knockback::default();
        knockback.apply(Vec3::new(0.0, 1.0, -1.0), 4.0, 1.0);
        assert_eq!(knockback.velocity().y, 0.0);
        assert!((knockback.velocity().length() - 4.0).abs() < 1e-5);
    }

    #[test]
    fn test_degenerate_impact_ignored() {
        let mut knockback = Knockback::default();
        knockback.apply(Vec3::Y, 10.0, 1.0);
        knockback.apply(Vec3::X, 0.0, 1.0);
        assert!(!knockback.is_active());
    }

    #[test]
    fn test_zero_fade_lasts_one_tick() {
        let mut knockback = Knockback::default();
        knockback.apply(Vec3::X, 3.0, 0.0);
        assert_eq!(knockback.tick(0.016), Vec3::X * 3.0);
        assert!(!knockback.is_active());
    }
}

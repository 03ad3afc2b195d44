//! Combat: cooldown/range gating, урон цели, побочный эффект на свет
//!
//! Damage intake и смерть — в `Agent::take_damage` (агент владеет своим здоровьем).

use bevy::prelude::*;

use crate::config::{CombatConfig, LightDrainConfig};
use crate::lights::{LightId, LightRegistry};
use crate::target::Target;

/// Cooldown атаки
///
/// `since_last_attack` стартует "готовым" (= cooldown), чтобы первый удар
/// при входе в Attack не ждал полный интервал.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttackCooldown {
    pub cooldown: f32,
    pub since_last_attack: f32,
}

impl AttackCooldown {
    pub fn new(cooldown: f32) -> Self {
        Self {
            cooldown,
            since_last_attack: cooldown,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.since_last_attack >= self.cooldown
    }

    /// Таймер идёт каждый живой тик, в любом состоянии
    pub fn tick(&mut self, dt: f32) {
        self.since_last_attack = (self.since_last_attack + dt.max(0.0)).min(self.cooldown);
    }

    /// Гейт по cooldown и дистанции; при успехе сбрасывает таймер
    pub fn try_attack(&mut self, distance: f32, config: &CombatConfig) -> Option<u32> {
        if !self.is_ready() || distance > config.attack_range {
            return None;
        }
        self.since_last_attack = 0.0;
        Some(rounded_damage(config.damage))
    }

    pub fn reset(&mut self) {
        self.since_last_attack = self.cooldown;
    }
}

/// Урон — float стат, округляется до целого
pub fn rounded_damage(damage: f32) -> u32 {
    damage.max(0.0).round() as u32
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrikeOutcome {
    pub damage_dealt: u32,
    /// (свет, оставшийся lifetime)
    pub drained_light: Option<(LightId, f32)>,
}

/// Применить удар: урон цели + drain ближайшего time-limited света
pub fn strike(
    target: &mut Target,
    lights: &mut LightRegistry,
    attacker_position: Vec3,
    damage: u32,
    config: &LightDrainConfig,
    flicker_seed: u64,
) -> StrikeOutcome {
    let damage_dealt = target.apply_damage(damage);

    let drained_light = if config.enabled {
        lights
            .closest_time_limited(attacker_position, config.search_radius)
            .and_then(|light| {
                lights
                    .drain(
                        light,
                        config.lifetime_drain,
                        config.flicker_threshold,
                        config.flicker_duration,
                        flicker_seed,
                    )
                    .map(|remaining| (light, remaining))
            })
    } else {
        None
    };

    StrikeOutcome {
        damage_dealt,
        drained_light,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lights::TimedLight;
    use crate::target::TargetId;

    #[test]
    fn test_cooldown_and_range_gating() {
        let config = CombatConfig::default();
        let mut cooldown = AttackCooldown::new(config.attack_cooldown);

        // стартует готовым; вне дистанции удара нет
        assert_eq!(cooldown.try_attack(5.0, &config), None);
        assert_eq!(cooldown.try_attack(1.0, &config), Some(12));
        cooldown.tick(0.5);
        assert_eq!(cooldown.try_attack(1.0, &config), None);
        cooldown.tick(0.5);
        assert_eq!(cooldown.try_attack(1.0, &config), None);
        cooldown.tick(0.25);
        assert_eq!(cooldown.try_attack(1.0, &config), Some(12));
    }

    #[test]
    fn test_cooldown_tick_saturates() {
        let mut cooldown = AttackCooldown::new(1.2);
        cooldown.since_last_attack = 0.0;
        for _ in 0..600 {
            cooldown.tick(1.0 / 60.0);
        }
        assert!(cooldown.is_ready());
        assert_eq!(cooldown.since_last_attack, 1.2);
        cooldown.tick(-1.0);
        assert!(cooldown.is_ready());
    }

    #[test]
    fn test_damage_rounding() {
        assert_eq!(rounded_damage(12.4), 12);
        assert_eq!(rounded_damage(12.5), 13);
        assert_eq!(rounded_damage(-3.0), 0);
    }

    #[test]
    fn test_strike_drains_closest_light() {
        let mut target = Target::new(TargetId(0), Vec3::ZERO, 0, 100);
        let mut lights = LightRegistry::default();
        let near = lights.add_light(TimedLight::new(Vec3::new(2.0, 2.0, 0.0), 1.0).with_lifetime(12.0));
        let far = lights.add_light(TimedLight::new(Vec3::new(8.0, 2.0, 0.0), 1.0).with_lifetime(30.0));

        let outcome = strike(&mut target, &mut lights, Vec3::ZERO, 12, &LightDrainConfig::default(), 1);

        assert_eq!(outcome.damage_dealt, 12);
        assert_eq!(target.health.current, 88);
        assert_eq!(outcome.drained_light, Some((near, 8.0)));
        assert!(lights.get(near).unwrap().is_flickering());
        assert_eq!(lights.get(far).unwrap().remaining_lifetime, Some(30.0));
    }

    #[test]
    fn test_strike_without_lights() {
        let mut target = Target::new(TargetId(0), Vec3::ZERO, 0, 5);
        let mut lights = LightRegistry::default();
        let outcome = strike(&mut target, &mut lights, Vec3::ZERO, 12, &LightDrainConfig::default(), 1);
        assert_eq!(outcome.damage_dealt, 5);
        assert_eq!(outcome.drained_light, None);
    }
}

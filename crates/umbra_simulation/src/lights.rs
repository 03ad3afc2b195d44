//! Light-lifetime collaborator
//!
//! Источники света с опциональным remaining lifetime. Combat уменьшает lifetime
//! ближайшего time-limited света; ниже порога свет мерцает (time-sliced task).

use bevy::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

use crate::logger;
use crate::task::TaskStatus;

/// Минимальный множитель яркости во время мерцания
const FLICKER_MIN_FACTOR: f32 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct LightId(pub u32);

/// Мерцание: каждый тик случайный множитель яркости, по завершении — 1.0
#[derive(Debug, Clone)]
pub struct FlickerTask {
    elapsed: f32,
    duration: f32,
    factor: f32,
    rng: ChaCha8Rng,
}

impl FlickerTask {
    pub fn new(duration: f32, seed: u64) -> Self {
        Self {
            elapsed: 0.0,
            duration: duration.max(0.0),
            factor: 1.0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn factor(&self) -> f32 {
        self.factor
    }

    pub fn advance(&mut self, dt: f32) -> TaskStatus {
        self.elapsed += dt.max(0.0);
        if self.elapsed >= self.duration {
            self.factor = 1.0;
            return TaskStatus::Done;
        }
        self.factor = self.rng.gen_range(FLICKER_MIN_FACTOR..=1.0);
        TaskStatus::Running
    }
}

#[derive(Debug, Clone)]
pub struct TimedLight {
    pub position: Vec3,
    pub enabled: bool,
    pub base_intensity: f32,
    /// Текущая яркость (base × flicker factor, 0 когда выключен)
    pub intensity: f32,
    /// None → свет не time-limited
    pub remaining_lifetime: Option<f32>,
    pub flicker: Option<FlickerTask>,
}

impl TimedLight {
    pub fn new(position: Vec3, intensity: f32) -> Self {
        Self {
            position,
            enabled: true,
            base_intensity: intensity,
            intensity,
            remaining_lifetime: None,
            flicker: None,
        }
    }

    pub fn with_lifetime(mut self, lifetime: f32) -> Self {
        self.remaining_lifetime = Some(lifetime);
        self
    }

    pub fn is_flickering(&self) -> bool {
        self.flicker.is_some()
    }

    fn extinguish(&mut self) {
        self.enabled = false;
        self.intensity = 0.0;
        self.flicker = None;
    }
}

#[derive(Debug, Default, Resource)]
pub struct LightRegistry {
    lights: BTreeMap<LightId, TimedLight>,
    next_id: u32,
}

impl LightRegistry {
    pub fn add_light(&mut self, light: TimedLight) -> LightId {
        let id = LightId(self.next_id);
        self.next_id += 1;
        self.lights.insert(id, light);
        id
    }

    pub fn get(&self, id: LightId) -> Option<&TimedLight> {
        self.lights.get(&id)
    }

    pub fn remove(&mut self, id: LightId) -> Option<TimedLight> {
        self.lights.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (LightId, &TimedLight)> {
        self.lights.iter().map(|(id, light)| (*id, light))
    }

    /// Ближайший включённый time-limited свет в радиусе
    pub fn closest_time_limited(&self, position: Vec3, radius: f32) -> Option<LightId> {
        let radius_sq = radius * radius;
        self.lights
            .iter()
            .filter(|(_, light)| light.enabled && light.remaining_lifetime.is_some())
            .map(|(id, light)| (*id, light.position.distance_squared(position)))
            .filter(|(_, distance_sq)| *distance_sq <= radius_sq)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    /// Снять lifetime; ниже порога — (пере)запустить мерцание
    ///
    /// Возвращает оставшийся lifetime или None, если свет не time-limited.
    pub fn drain(
        &mut self,
        id: LightId,
        amount: f32,
        flicker_threshold: f32,
        flicker_duration: f32,
        seed: u64,
    ) -> Option<f32> {
        let light = self.lights.get_mut(&id)?;
        let remaining = light.remaining_lifetime.as_mut()?;
        *remaining = (*remaining - amount.max(0.0)).max(0.0);
        let remaining = *remaining;

        if remaining <= 0.0 {
            light.extinguish();
            logger::log(&format!("💡 Light {:?} burned out", id));
        } else if remaining < flicker_threshold {
            light.flicker = Some(FlickerTask::new(flicker_duration, seed));
        }
        Some(remaining)
    }

    /// Lifetime tick + продвижение мерцаний
    pub fn tick(&mut self, dt: f32) {
        for light in self.lights.values_mut() {
            if !light.enabled {
                continue;
            }

            if let Some(remaining) = light.remaining_lifetime.as_mut() {
                *remaining = (*remaining - dt).max(0.0);
                if *remaining <= 0.0 {
                    light.extinguish();
                    continue;
                }
            }

            let factor = match light.flicker.as_mut() {
                Some(task) => {
                    let status = task.advance(dt);
                    let factor = task.factor();
                    if status.is_done() {
                        light.flicker = None;
                    }
                    factor
                }
                None => 1.0,
            };
            light.intensity = light.base_intensity * factor;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closest_time_limited_ignores_permanent_and_disabled() {
        let mut lights = LightRegistry::default();
        lights.add_light(TimedLight::new(Vec3::X, 1.0)); // permanent, ближе всех
        let mut off = TimedLight::new(Vec3::X * 2.0, 1.0).with_lifetime(20.0);
        off.enabled = false;
        lights.add_light(off);
        let far = lights.add_light(TimedLight::new(Vec3::X * 5.0, 1.0).with_lifetime(20.0));
        lights.add_light(TimedLight::new(Vec3::X * 50.0, 1.0).with_lifetime(20.0));

        assert_eq!(lights.closest_time_limited(Vec3::ZERO, 12.0), Some(far));
        assert_eq!(lights.closest_time_limited(Vec3::ZERO, 3.0), None);
    }

    #[test]
    fn test_drain_below_threshold_starts_flicker() {
        let mut lights = LightRegistry::default();
        let id = lights.add_light(TimedLight::new(Vec3::ZERO, 2.0).with_lifetime(14.0));

        assert_eq!(lights.drain(id, 3.0, 10.0, 0.5, 7), Some(11.0));
        assert!(!lights.get(id).unwrap().is_flickering());

        assert_eq!(lights.drain(id, 3.0, 10.0, 0.5, 7), Some(8.0));
        assert!(lights.get(id).unwrap().is_flickering());

        // мерцание заканчивается и яркость возвращается к базовой
        for _ in 0..40 {
            lights.tick(1.0 / 60.0);
        }
        let light = lights.get(id).unwrap();
        assert!(!light.is_flickering());
        assert_eq!(light.intensity, 2.0);
    }

    #[test]
    fn test_light_burns_out() {
        let mut lights = LightRegistry::default();
        let id = lights.add_light(TimedLight::new(Vec3::ZERO, 1.0).with_lifetime(1.0));
        lights.tick(0.6);
        lights.tick(0.6);

        let light = lights.get(id).unwrap();
        assert!(!light.enabled);
        assert_eq!(light.intensity, 0.0);
        assert_eq!(lights.closest_time_limited(Vec3::ZERO, 5.0), None);
    }

    #[test]
    fn test_flicker_task_completes() {
        let mut task = FlickerTask::new(0.1, 1);
        assert_eq!(task.advance(0.05), TaskStatus::Running);
        assert!(task.factor() >= FLICKER_MIN_FACTOR && task.factor() <= 1.0);
        assert_eq!(task.advance(0.06), TaskStatus::Done);
        assert_eq!(task.factor(), 1.0);
    }
}

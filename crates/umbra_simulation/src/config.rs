//! Tuning параметры агента
//!
//! Конфиг задаётся при создании агента (загрузка/парсинг — вне симуляции).
//! `validate()` — единственная fallible точка: всё остальное деградирует в no-op.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::curve::Curve;
use crate::spatial::{LayerMask, LAYER_AGENTS, LAYER_ENVIRONMENT};

/// Ошибка валидации конфига
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be positive (got {value})")]
    NonPositive { field: &'static str, value: f32 },

    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: f32 },

    #[error("{field}: min {min} is greater than max {max}")]
    InvertedRange { field: &'static str, min: f32, max: f32 },

    #[error("{field} = {value} is outside [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },

    #[error("max_health must be at least 1")]
    ZeroMaxHealth,
}

fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { field, value })
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::Negative { field, value })
    }
}

fn ordered(field: &'static str, min: f32, max: f32) -> Result<(), ConfigError> {
    if min <= max {
        Ok(())
    } else {
        Err(ConfigError::InvertedRange { field, min, max })
    }
}

fn within(field: &'static str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

/// Полный набор параметров агента
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub movement: MovementConfig,
    pub perception: PerceptionConfig,
    pub navigation: NavigationConfig,
    pub patrol: PatrolConfig,
    pub attack_orbit: AttackOrbitConfig,
    pub flocking: FlockingConfig,
    pub combat: CombatConfig,
    pub light_drain: LightDrainConfig,
    pub presentation: PresentationConfig,
}

impl AgentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.movement;
        positive("movement.base_speed", m.base_speed)?;
        positive("movement.acceleration", m.acceleration)?;
        positive("movement.deceleration", m.deceleration)?;
        non_negative("movement.velocity_smoothing", m.velocity_smoothing)?;
        positive("movement.turn_speed_degrees", m.turn_speed_degrees)?;
        positive("movement.body_radius", m.body_radius)?;
        non_negative("movement.skin_width", m.skin_width)?;

        let p = &self.perception;
        positive("perception.detection_range", p.detection_range)?;
        within("perception.field_of_view_degrees", p.field_of_view_degrees, 0.0, 360.0)?;
        non_negative("perception.lost_sight_grace", p.lost_sight_grace)?;
        positive("perception.cache_refresh_interval", p.cache_refresh_interval)?;
        within("perception.target_aim_height", p.target_aim_height, 0.0, 1.0)?;
        non_negative("perception.max_prediction_time", p.max_prediction_time)?;
        if p.initial_hit_buffer == 0 || p.initial_hit_buffer > p.max_hit_buffer {
            return Err(ConfigError::InvertedRange {
                field: "perception.hit_buffer",
                min: p.initial_hit_buffer as f32,
                max: p.max_hit_buffer as f32,
            });
        }

        let n = &self.navigation;
        positive("navigation.base_refresh_interval", n.base_refresh_interval)?;
        positive("navigation.chase_refresh_interval", n.chase_refresh_interval)?;
        positive("navigation.attack_refresh_interval", n.attack_refresh_interval)?;
        non_negative("navigation.repath_tolerance", n.repath_tolerance)?;
        positive("navigation.corner_reach", n.corner_reach)?;
        non_negative("navigation.stopping_distance", n.stopping_distance)?;
        positive("navigation.arrive_tolerance", n.arrive_tolerance)?;

        let pt = &self.patrol;
        positive("patrol.radius", pt.radius)?;
        ordered("patrol.idle_duration", pt.idle_duration_min, pt.idle_duration_max)?;
        non_negative("patrol.idle_duration_min", pt.idle_duration_min)?;

        let o = &self.attack_orbit;
        positive("attack_orbit.preferred_distance", o.preferred_distance)?;
        positive("attack_orbit.distance_tolerance", o.distance_tolerance)?;
        within("attack_orbit.pursuit_blend", o.pursuit_blend, 0.0, 1.0)?;

        let f = &self.flocking;
        positive("flocking.neighbor_radius", f.neighbor_radius)?;

        let c = &self.combat;
        if c.max_health == 0 {
            return Err(ConfigError::ZeroMaxHealth);
        }
        positive("combat.attack_range", c.attack_range)?;
        non_negative("combat.attack_cooldown", c.attack_cooldown)?;
        non_negative("combat.damage", c.damage)?;
        non_negative("combat.despawn_delay", c.despawn_delay)?;
        ordered(
            "combat.attack_enter_factor",
            c.attack_enter_factor,
            c.attack_exit_factor,
        )?;

        let l = &self.light_drain;
        non_negative("light_drain.search_radius", l.search_radius)?;
        non_negative("light_drain.lifetime_drain", l.lifetime_drain)?;

        let pr = &self.presentation;
        positive("presentation.duration", pr.duration)?;
        non_negative("presentation.flash_duration", pr.flash_duration)?;
        ordered("presentation.flash_duration", pr.flash_duration, pr.duration)?;
        ordered(
            "presentation.spin_degrees",
            pr.spin_degrees_min,
            pr.spin_degrees_max,
        )?;
        non_negative("presentation.drift_radius", pr.drift_radius)?;

        Ok(())
    }
}

/// Скорости, ускорения, тело
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementConfig {
    /// Базовая скорость (m/s), множители состояний считаются от неё
    pub base_speed: f32,
    pub acceleration: f32,
    pub deceleration: f32,
    /// Sharpness дополнительного exponential smoothing прохода
    pub velocity_smoothing: f32,
    pub turn_speed_degrees: f32,
    pub idle_speed_multiplier: f32,
    pub patrol_speed_multiplier: f32,
    pub chase_speed_multiplier: f32,
    pub attack_speed_multiplier: f32,
    pub break_off_speed_multiplier: f32,
    /// Радиус sweep-сферы тела
    pub body_radius: f32,
    /// Высота центра sweep-сферы над pivot
    pub body_center_height: f32,
    pub skin_width: f32,
    /// С чем тело сталкивается при sweep
    pub collision_mask: LayerMask,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            base_speed: 3.5,
            acceleration: 14.0,
            deceleration: 18.0,
            velocity_smoothing: 12.0,
            turn_speed_degrees: 540.0,
            idle_speed_multiplier: 0.6,
            patrol_speed_multiplier: 0.9,
            chase_speed_multiplier: 1.35,
            attack_speed_multiplier: 0.85,
            break_off_speed_multiplier: 1.0,
            body_radius: 0.4,
            body_center_height: 0.9,
            skin_width: 0.02,
            collision_mask: LAYER_ENVIRONMENT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerceptionConfig {
    pub detection_range: f32,
    /// Полный угол обзора; применяется только в Idle/Patrol
    pub field_of_view_degrees: f32,
    pub eye_height: f32,
    pub obstacle_mask: LayerMask,
    /// None → выводится из коллайдеров цели
    pub target_mask: Option<LayerMask>,
    /// Сколько секунд без видимости терпим в Chase/Attack
    pub lost_sight_grace: f32,
    /// Доля высоты bounds цели, куда целится луч (верх тела)
    pub target_aim_height: f32,
    /// Offset от origin цели (× scale.y), если bounds нулевые
    pub fallback_aim_height: f32,
    pub cache_refresh_interval: f32,
    pub velocity_smoothing: f32,
    pub max_prediction_time: f32,
    pub initial_hit_buffer: usize,
    pub max_hit_buffer: usize,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            detection_range: 30.0,
            field_of_view_degrees: 160.0,
            eye_height: 1.6,
            obstacle_mask: LAYER_ENVIRONMENT,
            target_mask: None,
            lost_sight_grace: 2.5,
            target_aim_height: 0.75,
            fallback_aim_height: 1.0,
            cache_refresh_interval: 0.5,
            velocity_smoothing: 6.0,
            max_prediction_time: 0.75,
            initial_hit_buffer: 8,
            max_hit_buffer: 256,
        }
    }
}

/// Частота перезапроса пути по состояниям + допуски
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationConfig {
    pub base_refresh_interval: f32,
    pub chase_refresh_interval: f32,
    pub attack_refresh_interval: f32,
    /// Дрейф destination, после которого путь перезапрашивается сразу
    pub repath_tolerance: f32,
    pub corner_reach: f32,
    pub stopping_distance: f32,
    /// "Дошли" для patrol/break-off
    pub arrive_tolerance: f32,
    /// Радиус поиска nav surface при warp-восстановлении
    pub surface_sample_radius: f32,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            base_refresh_interval: 1.0,
            chase_refresh_interval: 0.25,
            attack_refresh_interval: 0.15,
            repath_tolerance: 0.75,
            corner_reach: 0.3,
            stopping_distance: 0.5,
            arrive_tolerance: 0.6,
            surface_sample_radius: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatrolConfig {
    pub enabled: bool,
    /// Радиус вокруг spawn anchor
    pub radius: f32,
    pub sample_attempts: u32,
    pub sample_radius: f32,
    pub idle_duration_min: f32,
    pub idle_duration_max: f32,
}

impl Default for PatrolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            radius: 8.0,
            sample_attempts: 6,
            sample_radius: 1.5,
            idle_duration_min: 1.5,
            idle_duration_max: 4.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackOrbitConfig {
    pub preferred_distance: f32,
    pub distance_tolerance: f32,
    pub orbit_speed: f32,
    /// Усиление тангенциального члена у preferred distance
    pub orbit_boost: f32,
    pub radial_strength: f32,
    /// 0 = только навигация, 1 = только orbit velocity
    pub pursuit_blend: f32,
}

impl Default for AttackOrbitConfig {
    fn default() -> Self {
        Self {
            preferred_distance: 1.5,
            distance_tolerance: 0.6,
            orbit_speed: 1.6,
            orbit_boost: 0.5,
            radial_strength: 2.0,
            pursuit_blend: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlockingConfig {
    pub neighbor_radius: f32,
    pub separation_weight: f32,
    pub alignment_weight: f32,
    pub cohesion_weight: f32,
    pub neighbor_mask: LayerMask,
    pub idle_weight: f32,
    pub patrol_weight: f32,
    pub chase_weight: f32,
    pub attack_weight: f32,
    pub break_off_weight: f32,
}

impl Default for FlockingConfig {
    fn default() -> Self {
        Self {
            neighbor_radius: 3.0,
            separation_weight: 1.5,
            alignment_weight: 0.5,
            cohesion_weight: 0.3,
            neighbor_mask: LAYER_AGENTS,
            idle_weight: 1.0,
            patrol_weight: 1.0,
            chase_weight: 0.25,
            attack_weight: 0.0,
            break_off_weight: 0.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatConfig {
    pub max_health: u32,
    pub attack_range: f32,
    pub attack_cooldown: f32,
    /// Округляется до целого при ударе
    pub damage: f32,
    /// Chase → Attack при distance ≤ range × enter
    pub attack_enter_factor: f32,
    /// Attack → Chase при distance > range × exit
    pub attack_exit_factor: f32,
    /// Награда (currency) цели за убийство
    pub kill_reward: u32,
    pub despawn_delay: f32,
    pub spawn_death_particles: bool,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            max_health: 100,
            attack_range: 1.8,
            attack_cooldown: 1.2,
            damage: 12.0,
            attack_enter_factor: 1.1,
            attack_exit_factor: 1.35,
            kill_reward: 10,
            despawn_delay: 3.0,
            spawn_death_particles: true,
        }
    }
}

/// Побочный эффект удара: ближайший time-limited свет теряет lifetime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightDrainConfig {
    pub enabled: bool,
    pub search_radius: f32,
    pub lifetime_drain: f32,
    /// Ниже этого remaining lifetime свет мерцает
    pub flicker_threshold: f32,
    pub flicker_duration: f32,
}

impl Default for LightDrainConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            search_radius: 12.0,
            lifetime_drain: 4.0,
            flicker_threshold: 10.0,
            flicker_duration: 0.6,
        }
    }
}

/// Косметическая анимация смерти
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentationConfig {
    pub duration: f32,
    /// Короткий emission flash в начале (своя под-длительность)
    pub flash_duration: f32,
    pub flash_intensity: f32,
    pub emission_color: [f32; 4],
    pub height_amount: f32,
    pub height_curve: Curve,
    pub scale_curve: Curve,
    pub wobble_curve: Curve,
    pub wobble_degrees: f32,
    pub wobble_frequency: f32,
    pub fade_curve: Curve,
    pub emission_curve: Curve,
    pub spin_degrees_min: f32,
    pub spin_degrees_max: f32,
    pub drift_radius: f32,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            duration: 1.2,
            flash_duration: 0.15,
            flash_intensity: 4.0,
            emission_color: [1.0, 0.35, 0.1, 1.0],
            height_amount: 0.6,
            height_curve: Curve::new([(0.0, 0.0), (0.35, 1.0), (1.0, -0.4)]),
            scale_curve: Curve::new([(0.0, 1.0), (0.6, 0.9), (1.0, 0.2)]),
            wobble_curve: Curve::linear(1.0, 0.0),
            wobble_degrees: 18.0,
            wobble_frequency: 3.0,
            fade_curve: Curve::new([(0.0, 1.0), (0.5, 0.8), (1.0, 0.0)]),
            emission_curve: Curve::new([(0.0, 1.0), (1.0, 0.0)]),
            spin_degrees_min: 90.0,
            spin_degrees_max: 300.0,
            drift_radius: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(AgentConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_state_multiplier_defaults() {
        let movement = MovementConfig::default();
        assert_eq!(movement.idle_speed_multiplier, 0.6);
        assert_eq!(movement.patrol_speed_multiplier, 0.9);
        assert_eq!(movement.break_off_speed_multiplier, 1.0);

        let combat = CombatConfig::default();
        assert_eq!(combat.attack_enter_factor, 1.1);
        assert_eq!(combat.attack_exit_factor, 1.35);
    }

    #[test]
    fn test_inverted_idle_range_rejected() {
        let mut config = AgentConfig::default();
        config.patrol.idle_duration_min = 5.0;
        config.patrol.idle_duration_max = 1.0;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvertedRange { field: "patrol.idle_duration", .. })
        ));
    }

    #[test]
    fn test_zero_health_and_speed_rejected() {
        let mut config = AgentConfig::default();
        config.combat.max_health = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroMaxHealth));

        let mut config = AgentConfig::default();
        config.movement.base_speed = 0.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("movement.base_speed"), "{}", err);
    }
}

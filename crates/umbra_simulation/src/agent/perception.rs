//! Perception: видимость цели, last-known позиция, оценка скорости
//!
//! - Результат мемоизируется на кадр симуляции (дорогой raycast один раз за кадр)
//! - Маска слоёв цели и bounds кэшируются (refresh по интервалу или смене scale)
//! - Кэш сбрасывается при смене цели
//!
//! Порядок разбора хитов (по возрастанию дистанции):
//! 1. self и коллайдеры своей фракции пропускаются
//! 2. хит по слою цели, принадлежащий отслеживаемой цели → видно
//! 3. хит по слою препятствий → не видно
//! 4. любой другой хит → не видно (консервативная политика)

use bevy::prelude::*;

use super::{AgentId, AgentState};
use crate::config::PerceptionConfig;
use crate::math::{damp_factor, normalize_or, planar, EPSILON};
use crate::spatial::{
    raycast_all_growing, Bounds, ColliderOwner, FactionId, LayerMask, RayHit, SpatialQuery,
};
use crate::target::{Target, TargetId};

/// Кто смотрит
#[derive(Debug, Clone, Copy)]
pub struct Observer {
    pub id: AgentId,
    pub faction: FactionId,
    pub position: Vec3,
    /// Планарный forward
    pub forward: Vec3,
    pub state: AgentState,
}

#[derive(Debug, Clone, Default)]
struct TargetCache {
    target: Option<TargetId>,
    mask: LayerMask,
    /// Bounds относительно origin цели (цель двигается между refresh)
    local_bounds: Option<Bounds>,
    scale: Vec3,
    refreshed_at: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct Perception {
    /// (frame, visible)
    memo: Option<(u64, bool)>,
    last_seen_at: Option<f32>,
    last_known_position: Option<Vec3>,
    estimated_velocity: Vec3,
    last_sample: Option<(Vec3, f32)>,
    cache: TargetCache,
    hits: Vec<RayHit>,
}

impl Perception {
    pub fn new(config: &PerceptionConfig) -> Self {
        Self {
            memo: None,
            last_seen_at: None,
            last_known_position: None,
            estimated_velocity: Vec3::ZERO,
            last_sample: None,
            cache: TargetCache::default(),
            hits: vec![RayHit::default(); config.initial_hit_buffer.max(1)],
        }
    }

    /// Полный сброс (смена цели / respawn)
    pub fn invalidate(&mut self) {
        self.memo = None;
        self.last_seen_at = None;
        self.last_known_position = None;
        self.estimated_velocity = Vec3::ZERO;
        self.last_sample = None;
        self.cache = TargetCache::default();
    }

    /// Внешняя наводка на цель (force chase): считаем её увиденной сейчас
    ///
    /// Velocity sample сбрасывается: оценка скорости начнётся со следующего
    /// реального наблюдения.
    pub fn assume_sighting(&mut self, target: TargetId, position: Vec3, now: f32) {
        if self.cache.target != Some(target) {
            self.cache = TargetCache {
                target: Some(target),
                ..TargetCache::default()
            };
        }
        self.memo = None;
        self.last_seen_at = Some(now);
        self.last_known_position = Some(position);
        self.estimated_velocity = Vec3::ZERO;
        self.last_sample = None;
    }

    pub fn last_known_position(&self) -> Option<Vec3> {
        self.last_known_position
    }

    pub fn estimated_velocity(&self) -> Vec3 {
        self.estimated_velocity
    }

    pub fn hit_buffer_capacity(&self) -> usize {
        self.hits.len()
    }

    /// Секунды с последней видимости (∞ если не видели)
    pub fn time_since_seen(&self, now: f32) -> f32 {
        self.last_seen_at
            .map_or(f32::INFINITY, |seen| (now - seen).max(0.0))
    }

    /// Упреждение: last_known + velocity × lead, lead = distance / speed (≤ max)
    pub fn predicted_position(&self, from: Vec3, pursuer_speed: f32, config: &PerceptionConfig) -> Option<Vec3> {
        let last_known = self.last_known_position?;
        let distance = planar(last_known - from).length();
        let lead = if pursuer_speed > EPSILON {
            (distance / pursuer_speed).min(config.max_prediction_time)
        } else {
            0.0
        };
        Some(last_known + self.estimated_velocity * lead)
    }

    /// Видна ли цель (мемоизировано на `frame`)
    pub fn is_target_visible(
        &mut self,
        observer: &Observer,
        target: Option<&Target>,
        frame: u64,
        now: f32,
        spatial: &dyn SpatialQuery,
        config: &PerceptionConfig,
    ) -> bool {
        if let Some((memo_frame, visible)) = self.memo {
            if memo_frame == frame {
                return visible;
            }
        }

        let visible = match target {
            Some(target) => self.evaluate(observer, target, now, spatial, config),
            None => false,
        };
        self.memo = Some((frame, visible));

        if visible {
            if let Some(target) = target {
                self.record_sighting(target.position, now, config);
            }
        }
        visible
    }

    fn record_sighting(&mut self, position: Vec3, now: f32, config: &PerceptionConfig) {
        if let Some((previous, at)) = self.last_sample {
            let elapsed = now - at;
            if elapsed > EPSILON {
                let instant = planar(position - previous) / elapsed;
                let blend = damp_factor(config.velocity_smoothing, elapsed);
                self.estimated_velocity = self.estimated_velocity.lerp(instant, blend);
            }
        }
        self.last_sample = Some((position, now));
        self.last_seen_at = Some(now);
        self.last_known_position = Some(position);
    }

    fn refresh_cache(&mut self, target: &Target, now: f32, spatial: &dyn SpatialQuery, config: &PerceptionConfig) {
        let stale = match self.cache.refreshed_at {
            Some(at) => now - at >= config.cache_refresh_interval,
            None => true,
        };
        let changed = self.cache.target != Some(target.id);
        if changed {
            // новая цель — старые наблюдения не относятся к ней
            self.last_seen_at = None;
            self.last_known_position = None;
            self.estimated_velocity = Vec3::ZERO;
            self.last_sample = None;
        }
        let rescaled = (self.cache.scale - target.scale).length_squared() > EPSILON * EPSILON;
        if !(changed || stale || rescaled) {
            return;
        }

        let mut mask = LayerMask::NONE;
        let mut bounds: Option<Bounds> = None;
        for collider in &target.colliders {
            if let Some(layers) = spatial.collider_layers(*collider) {
                mask |= layers;
            }
            if let Some(b) = spatial.collider_bounds(*collider) {
                bounds = Some(bounds.map_or(b, |acc| acc.union(&b)));
            }
        }

        self.cache = TargetCache {
            target: Some(target.id),
            mask: config.target_mask.unwrap_or(mask),
            local_bounds: bounds.map(|b| Bounds {
                min: b.min - target.position,
                max: b.max - target.position,
            }),
            scale: target.scale,
            refreshed_at: Some(now),
        };
    }

    /// Точка прицеливания: верх тела по bounds или offset от origin
    fn aim_point(&self, target: &Target, config: &PerceptionConfig) -> Vec3 {
        match self.cache.local_bounds {
            Some(bounds) if !bounds.is_degenerate() => {
                let center = bounds.center();
                target.position
                    + Vec3::new(
                        center.x,
                        bounds.min.y + bounds.size().y * config.target_aim_height,
                        center.z,
                    )
            }
            _ => target.position + Vec3::Y * config.fallback_aim_height * target.scale.y,
        }
    }

    fn evaluate(
        &mut self,
        observer: &Observer,
        target: &Target,
        now: f32,
        spatial: &dyn SpatialQuery,
        config: &PerceptionConfig,
    ) -> bool {
        self.refresh_cache(target, now, spatial, config);

        let origin = observer.position + Vec3::Y * config.eye_height;
        let aim = self.aim_point(target, config);
        let to_aim = aim - origin;
        let distance = to_aim.length();
        if distance > config.detection_range {
            return false;
        }
        if distance < EPSILON {
            return true;
        }

        if matches!(observer.state, AgentState::Idle | AgentState::Patrol) {
            let flat = planar(to_aim);
            if flat.length() > EPSILON {
                let forward = normalize_or(planar(observer.forward), Vec3::NEG_Z);
                let angle = forward.angle_between(flat / flat.length());
                if angle > (config.field_of_view_degrees * 0.5).to_radians() {
                    return false;
                }
            }
        }

        let target_mask = self.cache.mask;
        let mask = config.obstacle_mask | target_mask;
        let count = raycast_all_growing(
            spatial,
            origin,
            to_aim / distance,
            distance,
            mask,
            &mut self.hits,
            config.max_hit_buffer,
        );

        let hits = &mut self.hits[..count];
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        for hit in hits.iter() {
            if hit.owner == ColliderOwner::Agent(observer.id) || hit.faction == Some(observer.faction) {
                continue;
            }
            if hit.owner == ColliderOwner::Target(target.id) && hit.layers.intersects(target_mask) {
                return true;
            }
            // препятствие или чужой слой — линия взгляда перекрыта
            return false;
        }

        // цель без коллайдеров: луч дошёл до aim point без помех
        target_mask.is_empty()
    }
}

//! Spatial Query Adapter — контракт к физике и навигации
//!
//! Агент только потребляет эти запросы (ray casts, overlaps, sweeps, nav mesh).
//! Реализация по умолчанию — headless `SpatialWorld`; physics-engine адаптер
//! реализует те же трейты.
//!
//! ## Collision layers (битовые маски):
//! - Layer 2 (0b10): Agents
//! - Layer 3 (0b100): Environment (стены, препятствия — блокируют LOS)
//! - Layer 4 (0b1000): Target (игрок)
//! - Layer 5 (0b10000): Dressing (не блокирующий декор)

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::logger;
use crate::target::TargetId;

pub mod world;

pub use world::{Collider, ColliderShape, NavSurface, SpatialWorld};

/// Битовая маска слоёв
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LayerMask(pub u32);

impl LayerMask {
    pub const NONE: LayerMask = LayerMask(0);
    pub const ALL: LayerMask = LayerMask(u32::MAX);

    pub fn intersects(self, other: LayerMask) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for LayerMask {
    type Output = LayerMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        LayerMask(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for LayerMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Layer 2: агенты (hostile NPC)
pub const LAYER_AGENTS: LayerMask = LayerMask(0b10);

/// Layer 3: окружение, блокирует видимость и движение
pub const LAYER_ENVIRONMENT: LayerMask = LayerMask(0b100);

/// Layer 4: отслеживаемая цель
pub const LAYER_TARGET: LayerMask = LayerMask(0b1000);

/// Layer 5: декор без коллизий для движения
pub const LAYER_DRESSING: LayerMask = LayerMask(0b1_0000);

/// Получить название слоя для debug логов
pub fn layer_name(layers: LayerMask) -> &'static str {
    match layers {
        LAYER_AGENTS => "Agents",
        LAYER_ENVIRONMENT => "Environment",
        LAYER_TARGET => "Target",
        LAYER_DRESSING => "Dressing",
        _ => "Mixed",
    }
}

pub type FactionId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ColliderId(pub u32);

/// Кому принадлежит коллайдер (иерархия владельца)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColliderOwner {
    #[default]
    Static,
    Agent(AgentId),
    Target(TargetId),
}

/// Axis-aligned bounds
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        let half = half_extents.abs();
        Self {
            min: center - half,
            max: center + half,
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Нулевой объём (все размеры ≈ 0)
    pub fn is_degenerate(&self) -> bool {
        self.size().max_element() <= crate::math::EPSILON
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        point.clamp(self.min, self.max)
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RayHit {
    pub collider: ColliderId,
    pub owner: ColliderOwner,
    pub faction: Option<FactionId>,
    pub layers: LayerMask,
    pub distance: f32,
    pub point: Vec3,
    pub normal: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OverlapHit {
    pub collider: ColliderId,
    pub owner: ColliderOwner,
    pub layers: LayerMask,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepHit {
    pub collider: ColliderId,
    pub distance: f32,
    pub point: Vec3,
    pub normal: Vec3,
}

/// Физические запросы (broad-phase живёт снаружи)
///
/// `raycast_all` / `overlap_sphere` пишут в буфер вызывающего и возвращают
/// количество записанных результатов. `count == buffer.len()` значит буфер
/// насыщен и часть результатов могла не поместиться.
pub trait SpatialQuery {
    fn raycast_all(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        mask: LayerMask,
        hits: &mut [RayHit],
    ) -> usize;

    fn overlap_sphere(
        &self,
        center: Vec3,
        radius: f32,
        mask: LayerMask,
        results: &mut [OverlapHit],
    ) -> usize;

    /// Sphere sweep; коллайдеры `ignore` владельца пропускаются
    fn sweep_test(
        &self,
        origin: Vec3,
        radius: f32,
        direction: Vec3,
        distance: f32,
        mask: LayerMask,
        ignore: ColliderOwner,
    ) -> Option<SweepHit>;

    fn collider_bounds(&self, collider: ColliderId) -> Option<Bounds>;

    fn collider_layers(&self, collider: ColliderId) -> Option<LayerMask>;
}

/// Навигационный сервис (path corners + sampling)
pub trait NavigationQuery {
    /// Углы пути от `from` до `goal` (включая обе точки) или None
    fn request_path(&self, from: Vec3, goal: Vec3) -> Option<Vec<Vec3>>;

    fn sample_position(&self, point: Vec3, max_distance: f32) -> Option<Vec3>;

    fn is_on_surface(&self, point: Vec3) -> bool;
}

/// Raycast с геометрическим ростом буфера
///
/// Если запрос насытил буфер — удваиваем и повторяем, пока не влезет или
/// не упрёмся в `max_capacity` (тогда warning, результаты не режутся молча).
pub fn raycast_all_growing(
    spatial: &dyn SpatialQuery,
    origin: Vec3,
    direction: Vec3,
    max_distance: f32,
    mask: LayerMask,
    buffer: &mut Vec<RayHit>,
    max_capacity: usize,
) -> usize {
    if buffer.is_empty() {
        buffer.resize(1, RayHit::default());
    }

    loop {
        let count = spatial.raycast_all(origin, direction, max_distance, mask, buffer);
        if count < buffer.len() {
            return count;
        }
        if buffer.len() >= max_capacity {
            logger::log_warning(&format!(
                "raycast_all: hit buffer saturated at max capacity {}",
                max_capacity
            ));
            return count;
        }
        let grown = (buffer.len() * 2).min(max_capacity);
        buffer.resize(grown, RayHit::default());
    }
}

/// Overlap с тем же правилом роста буфера
pub fn overlap_sphere_growing(
    spatial: &dyn SpatialQuery,
    center: Vec3,
    radius: f32,
    mask: LayerMask,
    buffer: &mut Vec<OverlapHit>,
    max_capacity: usize,
) -> usize {
    if buffer.is_empty() {
        buffer.resize(1, OverlapHit::default());
    }

    loop {
        let count = spatial.overlap_sphere(center, radius, mask, buffer);
        if count < buffer.len() {
            return count;
        }
        if buffer.len() >= max_capacity {
            logger::log_warning(&format!(
                "overlap_sphere: result buffer saturated at max capacity {}",
                max_capacity
            ));
            return count;
        }
        let grown = (buffer.len() * 2).min(max_capacity);
        buffer.resize(grown, OverlapHit::default());
    }
}

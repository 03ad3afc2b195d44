//! SpatialWorld — headless реализация Spatial Query Adapter
//!
//! Работает без physics engine (как headless режим симуляции):
//! - коллайдеры: сферы и axis-aligned боксы со слоями и владельцами
//! - nav surface: плоский прямоугольник с box-блокерами, путь = прямая + обход углов
//!
//! Владелец — мир (Resource), а не статические реестры.

use bevy::prelude::*;
use std::collections::BTreeMap;

use super::{
    Bounds, ColliderId, ColliderOwner, FactionId, LayerMask, NavigationQuery, OverlapHit, RayHit,
    SpatialQuery, SweepHit,
};
use crate::math::{normalize_or, planar, EPSILON};

/// Максимум обходов блокеров при построении пути
const MAX_PATH_DETOURS: usize = 8;

/// Зазор для углов обхода (сверх clearance)
const CORNER_MARGIN: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColliderShape {
    Sphere { radius: f32 },
    Box { half_extents: Vec3 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Collider {
    pub shape: ColliderShape,
    pub position: Vec3,
    pub layers: LayerMask,
    pub owner: ColliderOwner,
    pub faction: Option<FactionId>,
    pub enabled: bool,
}

impl Collider {
    pub fn sphere(position: Vec3, radius: f32, layers: LayerMask) -> Self {
        Self {
            shape: ColliderShape::Sphere { radius },
            position,
            layers,
            owner: ColliderOwner::Static,
            faction: None,
            enabled: true,
        }
    }

    pub fn cuboid(position: Vec3, half_extents: Vec3, layers: LayerMask) -> Self {
        Self {
            shape: ColliderShape::Box { half_extents },
            position,
            layers,
            owner: ColliderOwner::Static,
            faction: None,
            enabled: true,
        }
    }

    pub fn with_owner(mut self, owner: ColliderOwner, faction: Option<FactionId>) -> Self {
        self.owner = owner;
        self.faction = faction;
        self
    }

    pub fn bounds(&self) -> Bounds {
        match self.shape {
            ColliderShape::Sphere { radius } => {
                Bounds::from_center_half_extents(self.position, Vec3::splat(radius))
            }
            ColliderShape::Box { half_extents } => {
                Bounds::from_center_half_extents(self.position, half_extents)
            }
        }
    }
}

/// Плоская навигационная поверхность
#[derive(Debug, Clone, PartialEq)]
pub struct NavSurface {
    /// Угол прямоугольника (x, z)
    pub min: Vec2,
    pub max: Vec2,
    pub height: f32,
    /// Допуск по высоте для `is_on_surface`
    pub vertical_tolerance: f32,
    /// Непроходимые footprints (используются x/z)
    pub blockers: Vec<Bounds>,
    /// Отступ пути от блокеров (радиус агента)
    pub clearance: f32,
}

impl NavSurface {
    pub fn rect(min: Vec2, max: Vec2, height: f32) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
            height,
            vertical_tolerance: 1.0,
            blockers: Vec::new(),
            clearance: 0.45,
        }
    }

    pub fn with_blocker(mut self, blocker: Bounds) -> Self {
        self.blockers.push(blocker);
        self
    }

    fn contains_xz(&self, p: Vec2) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    fn blocker_at(&self, p: Vec2) -> Option<&Bounds> {
        self.blockers.iter().find(|b| {
            p.x > b.min.x && p.x < b.max.x && p.y > b.min.z && p.y < b.max.z
        })
    }

    /// Первый (по параметру вдоль отрезка) блокер, пересекающий `a → b`
    fn first_blocker(&self, a: Vec2, b: Vec2) -> Option<(Vec2, Vec2)> {
        let mut best: Option<(f32, Vec2, Vec2)> = None;
        for blocker in &self.blockers {
            let min = Vec2::new(blocker.min.x, blocker.min.z) - Vec2::splat(self.clearance);
            let max = Vec2::new(blocker.max.x, blocker.max.z) + Vec2::splat(self.clearance);
            if let Some(t) = segment_enters_rect(a, b, min, max) {
                if best.map_or(true, |(best_t, _, _)| t < best_t) {
                    best = Some((t, min, max));
                }
            }
        }
        best.map(|(_, min, max)| (min, max))
    }
}

#[derive(Debug, Default, Resource)]
pub struct SpatialWorld {
    colliders: BTreeMap<ColliderId, Collider>,
    next_id: u32,
    surface: Option<NavSurface>,
}

impl SpatialWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_surface(surface: NavSurface) -> Self {
        Self {
            surface: Some(surface),
            ..Self::default()
        }
    }

    pub fn set_surface(&mut self, surface: Option<NavSurface>) {
        self.surface = surface;
    }

    pub fn surface(&self) -> Option<&NavSurface> {
        self.surface.as_ref()
    }

    pub fn add_collider(&mut self, collider: Collider) -> ColliderId {
        let id = ColliderId(self.next_id);
        self.next_id += 1;
        self.colliders.insert(id, collider);
        id
    }

    pub fn remove_collider(&mut self, id: ColliderId) -> Option<Collider> {
        self.colliders.remove(&id)
    }

    pub fn collider(&self, id: ColliderId) -> Option<&Collider> {
        self.colliders.get(&id)
    }

    pub fn set_collider_position(&mut self, id: ColliderId, position: Vec3) {
        if let Some(collider) = self.colliders.get_mut(&id) {
            collider.position = position;
        }
    }

    pub fn set_collider_enabled(&mut self, id: ColliderId, enabled: bool) {
        if let Some(collider) = self.colliders.get_mut(&id) {
            collider.enabled = enabled;
        }
    }

    pub fn colliders_of(&self, owner: ColliderOwner) -> Vec<ColliderId> {
        self.colliders
            .iter()
            .filter(|(_, c)| c.owner == owner)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.colliders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colliders.is_empty()
    }

    fn active(&self, mask: LayerMask) -> impl Iterator<Item = (&ColliderId, &Collider)> {
        self.colliders
            .iter()
            .filter(move |(_, c)| c.enabled && c.layers.intersects(mask))
    }
}

impl SpatialQuery for SpatialWorld {
    fn raycast_all(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        mask: LayerMask,
        hits: &mut [RayHit],
    ) -> usize {
        let dir = normalize_or(direction, Vec3::ZERO);
        if dir == Vec3::ZERO || hits.is_empty() {
            return 0;
        }

        let mut count = 0;
        for (id, collider) in self.active(mask) {
            let hit = match collider.shape {
                ColliderShape::Sphere { radius } => ray_sphere(origin, dir, collider.position, radius),
                ColliderShape::Box { .. } => {
                    let bounds = collider.bounds();
                    ray_aabb(origin, dir, bounds.min, bounds.max)
                }
            };
            let Some((distance, normal)) = hit else {
                continue;
            };
            if distance > max_distance {
                continue;
            }
            if count == hits.len() {
                // буфер полон — вызывающий увидит насыщение
                break;
            }
            hits[count] = RayHit {
                collider: *id,
                owner: collider.owner,
                faction: collider.faction,
                layers: collider.layers,
                distance,
                point: origin + dir * distance,
                normal,
            };
            count += 1;
        }
        count
    }

    fn overlap_sphere(
        &self,
        center: Vec3,
        radius: f32,
        mask: LayerMask,
        results: &mut [OverlapHit],
    ) -> usize {
        let mut count = 0;
        for (id, collider) in self.active(mask) {
            let overlaps = match collider.shape {
                ColliderShape::Sphere { radius: other } => {
                    center.distance_squared(collider.position) <= (radius + other) * (radius + other)
                }
                ColliderShape::Box { .. } => {
                    let closest = collider.bounds().closest_point(center);
                    closest.distance_squared(center) <= radius * radius
                }
            };
            if !overlaps {
                continue;
            }
            if count == results.len() {
                break;
            }
            results[count] = OverlapHit {
                collider: *id,
                owner: collider.owner,
                layers: collider.layers,
            };
            count += 1;
        }
        count
    }

    fn sweep_test(
        &self,
        origin: Vec3,
        radius: f32,
        direction: Vec3,
        distance: f32,
        mask: LayerMask,
        ignore: ColliderOwner,
    ) -> Option<SweepHit> {
        let dir = normalize_or(direction, Vec3::ZERO);
        if dir == Vec3::ZERO {
            return None;
        }

        let mut best: Option<SweepHit> = None;
        for (id, collider) in self.active(mask) {
            if ignore != ColliderOwner::Static && collider.owner == ignore {
                continue;
            }

            let hit = match collider.shape {
                ColliderShape::Sphere { radius: other } => {
                    sweep_start_overlap_sphere(origin, radius, dir, collider.position, other)
                        .or_else(|| ray_sphere(origin, dir, collider.position, radius + other))
                }
                ColliderShape::Box { .. } => {
                    let bounds = collider.bounds();
                    sweep_start_overlap_box(origin, radius, dir, &bounds).or_else(|| {
                        ray_aabb(
                            origin,
                            dir,
                            bounds.min - Vec3::splat(radius),
                            bounds.max + Vec3::splat(radius),
                        )
                    })
                }
            };

            let Some((hit_distance, normal)) = hit else {
                continue;
            };
            // отходим от уже пересечённого коллайдера — не блокируем
            if hit_distance <= EPSILON && dir.dot(normal) >= 0.0 {
                continue;
            }
            if hit_distance > distance {
                continue;
            }
            if best.as_ref().map_or(true, |b| hit_distance < b.distance) {
                best = Some(SweepHit {
                    collider: *id,
                    distance: hit_distance,
                    point: origin + dir * hit_distance - normal * radius,
                    normal,
                });
            }
        }
        best
    }

    fn collider_bounds(&self, collider: ColliderId) -> Option<Bounds> {
        self.colliders.get(&collider).map(Collider::bounds)
    }

    fn collider_layers(&self, collider: ColliderId) -> Option<LayerMask> {
        self.colliders.get(&collider).map(|c| c.layers)
    }
}

impl NavigationQuery for SpatialWorld {
    fn request_path(&self, from: Vec3, goal: Vec3) -> Option<Vec<Vec3>> {
        let surface = self.surface.as_ref()?;
        let goal = self.sample_position(goal, 1.0)?;

        let mut corners = vec![from];
        let mut current = from.xz();
        let goal_xz = goal.xz();

        for _ in 0..MAX_PATH_DETOURS {
            let Some((min, max)) = surface.first_blocker(current, goal_xz) else {
                corners.push(goal);
                return Some(corners);
            };

            let outer_min = min - Vec2::splat(CORNER_MARGIN);
            let outer_max = max + Vec2::splat(CORNER_MARGIN);
            let candidates = [
                outer_min,
                Vec2::new(outer_max.x, outer_min.y),
                outer_max,
                Vec2::new(outer_min.x, outer_max.y),
            ];

            let best = candidates
                .into_iter()
                .filter(|c| surface.contains_xz(*c) && surface.blocker_at(*c).is_none())
                .filter(|c| segment_enters_rect(current, *c, min, max).is_none())
                .filter(|c| c.distance_squared(current) > EPSILON)
                .min_by(|a, b| {
                    let cost_a = a.distance(current) + a.distance(goal_xz);
                    let cost_b = b.distance(current) + b.distance(goal_xz);
                    cost_a.total_cmp(&cost_b)
                })?;

            corners.push(Vec3::new(best.x, surface.height, best.y));
            current = best;
        }
        None
    }

    fn sample_position(&self, point: Vec3, max_distance: f32) -> Option<Vec3> {
        let surface = self.surface.as_ref()?;

        let mut candidate = point.xz().clamp(surface.min, surface.max);
        if let Some(blocker) = surface.blocker_at(candidate) {
            // выталкиваем к ближайшей стороне блокера
            let pushes = [
                (candidate.x - blocker.min.x, Vec2::new(blocker.min.x - CORNER_MARGIN, candidate.y)),
                (blocker.max.x - candidate.x, Vec2::new(blocker.max.x + CORNER_MARGIN, candidate.y)),
                (candidate.y - blocker.min.z, Vec2::new(candidate.x, blocker.min.z - CORNER_MARGIN)),
                (blocker.max.z - candidate.y, Vec2::new(candidate.x, blocker.max.z + CORNER_MARGIN)),
            ];
            let (_, pushed) = pushes
                .into_iter()
                .filter(|(_, p)| surface.contains_xz(*p))
                .min_by(|a, b| a.0.total_cmp(&b.0))?;
            candidate = pushed;
        }

        let sampled = Vec3::new(candidate.x, surface.height, candidate.y);
        if planar(sampled - point).length() > max_distance {
            return None;
        }
        if !self.is_on_surface(sampled) {
            return None;
        }
        Some(sampled)
    }

    fn is_on_surface(&self, point: Vec3) -> bool {
        let Some(surface) = self.surface.as_ref() else {
            return false;
        };
        let p = point.xz();
        surface.contains_xz(p)
            && (point.y - surface.height).abs() <= surface.vertical_tolerance
            && surface.blocker_at(p).is_none()
    }
}

/// Ray (dir нормализован) vs sphere → (distance, normal)
fn ray_sphere(origin: Vec3, dir: Vec3, center: Vec3, radius: f32) -> Option<(f32, Vec3)> {
    let oc = origin - center;
    let c = oc.length_squared() - radius * radius;
    if c <= 0.0 {
        // старт внутри сферы
        return Some((0.0, normalize_or(oc, -dir)));
    }
    let b = oc.dot(dir);
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }
    let t = -b - discriminant.sqrt();
    if t < 0.0 {
        return None;
    }
    let point = origin + dir * t;
    Some((t, normalize_or(point - center, -dir)))
}

/// Ray vs AABB (slab method) → (distance, normal входной грани)
fn ray_aabb(origin: Vec3, dir: Vec3, min: Vec3, max: Vec3) -> Option<(f32, Vec3)> {
    let mut t_enter = 0.0_f32;
    let mut t_exit = f32::INFINITY;
    let mut normal = Vec3::ZERO;

    for axis in 0..3 {
        let o = origin[axis];
        let d = dir[axis];
        if d.abs() < 1e-8 {
            if o < min[axis] || o > max[axis] {
                return None;
            }
            continue;
        }
        let inv = 1.0 / d;
        let t1 = (min[axis] - o) * inv;
        let t2 = (max[axis] - o) * inv;
        let (near, far) = if t1 <= t2 { (t1, t2) } else { (t2, t1) };
        if near > t_enter {
            t_enter = near;
            normal = Vec3::ZERO;
            normal[axis] = -d.signum();
        }
        t_exit = t_exit.min(far);
        if t_enter > t_exit {
            return None;
        }
    }

    if normal == Vec3::ZERO {
        // старт внутри бокса
        normal = -dir;
    }
    Some((t_enter, normal))
}

/// Sweep стартует в пересечении со сферой → hit на 0 с нормалью выталкивания
fn sweep_start_overlap_sphere(
    origin: Vec3,
    radius: f32,
    dir: Vec3,
    center: Vec3,
    other: f32,
) -> Option<(f32, Vec3)> {
    let offset = origin - center;
    let reach = radius + other;
    if offset.length_squared() >= reach * reach {
        return None;
    }
    Some((0.0, normalize_or(offset, -dir)))
}

fn sweep_start_overlap_box(origin: Vec3, radius: f32, dir: Vec3, bounds: &Bounds) -> Option<(f32, Vec3)> {
    let closest = bounds.closest_point(origin);
    let offset = origin - closest;
    if offset.length_squared() >= radius * radius {
        return None;
    }
    let fallback = normalize_or(planar(origin - bounds.center()), -dir);
    Some((0.0, normalize_or(offset, fallback)))
}

/// Параметр входа отрезка `a → b` в прямоугольник (строгое пересечение внутренности)
fn segment_enters_rect(a: Vec2, b: Vec2, min: Vec2, max: Vec2) -> Option<f32> {
    let d = b - a;
    let mut t_enter = 0.0_f32;
    let mut t_exit = 1.0_f32;

    for axis in 0..2 {
        let o = a[axis];
        let dir = d[axis];
        if dir.abs() < 1e-8 {
            if o <= min[axis] || o >= max[axis] {
                return None;
            }
            continue;
        }
        let t1 = (min[axis] - o) / dir;
        let t2 = (max[axis] - o) / dir;
        let (near, far) = if t1 <= t2 { (t1, t2) } else { (t2, t1) };
        t_enter = t_enter.max(near);
        t_exit = t_exit.min(far);
        if t_enter >= t_exit - 1e-6 {
            return None;
        }
    }
    Some(t_enter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{LAYER_ENVIRONMENT, LAYER_TARGET};

    fn arena() -> SpatialWorld {
        SpatialWorld::with_surface(NavSurface::rect(Vec2::splat(-20.0), Vec2::splat(20.0), 0.0))
    }

    #[test]
    fn test_raycast_hits_sphere_and_box() {
        let mut world = arena();
        let wall = world.add_collider(Collider::cuboid(
            Vec3::new(0.0, 1.0, -3.0),
            Vec3::new(2.0, 1.0, 0.2),
            LAYER_ENVIRONMENT,
        ));
        let target = world.add_collider(Collider::sphere(Vec3::new(0.0, 1.0, -6.0), 0.5, LAYER_TARGET));

        let mut hits = [RayHit::default(); 4];
        let count = world.raycast_all(
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::NEG_Z,
            10.0,
            LAYER_ENVIRONMENT | LAYER_TARGET,
            &mut hits,
        );

        assert_eq!(count, 2);
        let wall_hit = hits[..count].iter().find(|h| h.collider == wall).unwrap();
        assert!((wall_hit.distance - 2.8).abs() < 1e-4, "wall distance = {}", wall_hit.distance);
        assert_eq!(wall_hit.normal, Vec3::Z);
        let target_hit = hits[..count].iter().find(|h| h.collider == target).unwrap();
        assert!((target_hit.distance - 5.5).abs() < 1e-4);
    }

    #[test]
    fn test_raycast_respects_mask_and_capacity() {
        let mut world = arena();
        for i in 0..5 {
            world.add_collider(Collider::sphere(Vec3::new(0.0, 0.0, -2.0 - i as f32 * 2.0), 0.5, LAYER_ENVIRONMENT));
        }

        let mut hits = [RayHit::default(); 3];
        assert_eq!(world.raycast_all(Vec3::ZERO, Vec3::NEG_Z, 50.0, LAYER_TARGET, &mut hits), 0);
        assert_eq!(world.raycast_all(Vec3::ZERO, Vec3::NEG_Z, 50.0, LAYER_ENVIRONMENT, &mut hits), 3);
    }

    #[test]
    fn test_sweep_stops_before_wall() {
        let mut world = arena();
        world.add_collider(Collider::cuboid(Vec3::new(0.0, 1.0, -2.0), Vec3::new(2.0, 1.0, 0.25), LAYER_ENVIRONMENT));

        let hit = world
            .sweep_test(Vec3::new(0.0, 0.9, 0.0), 0.4, Vec3::NEG_Z, 5.0, LAYER_ENVIRONMENT, ColliderOwner::Static)
            .expect("sweep should hit the wall");
        // стена начинается на z = -1.75, сфера радиуса 0.4 → 1.35
        assert!((hit.distance - 1.35).abs() < 1e-4, "distance = {}", hit.distance);
        assert_eq!(hit.normal, Vec3::Z);
    }

    #[test]
    fn test_sweep_moving_away_from_overlap_is_free() {
        let mut world = arena();
        world.add_collider(Collider::sphere(Vec3::new(0.0, 0.9, -0.5), 0.3, LAYER_ENVIRONMENT));

        let away = world.sweep_test(Vec3::new(0.0, 0.9, 0.0), 0.4, Vec3::Z, 1.0, LAYER_ENVIRONMENT, ColliderOwner::Static);
        assert!(away.is_none());

        let into = world.sweep_test(Vec3::new(0.0, 0.9, 0.0), 0.4, Vec3::NEG_Z, 1.0, LAYER_ENVIRONMENT, ColliderOwner::Static);
        assert_eq!(into.map(|h| h.distance), Some(0.0));
    }

    #[test]
    fn test_overlap_sphere() {
        let mut world = arena();
        world.add_collider(Collider::sphere(Vec3::new(1.0, 0.0, 0.0), 0.4, LAYER_TARGET));
        world.add_collider(Collider::sphere(Vec3::new(5.0, 0.0, 0.0), 0.4, LAYER_TARGET));

        let mut results = [OverlapHit::default(); 8];
        assert_eq!(world.overlap_sphere(Vec3::ZERO, 1.0, LAYER_TARGET, &mut results), 1);
    }

    #[test]
    fn test_sample_position_and_surface() {
        let world = SpatialWorld::with_surface(
            NavSurface::rect(Vec2::splat(-10.0), Vec2::splat(10.0), 0.0)
                .with_blocker(Bounds::from_center_half_extents(Vec3::ZERO, Vec3::new(1.0, 1.0, 1.0))),
        );

        assert!(world.is_on_surface(Vec3::new(5.0, 0.0, 5.0)));
        assert!(!world.is_on_surface(Vec3::new(15.0, 0.0, 0.0)));
        assert!(!world.is_on_surface(Vec3::ZERO));

        let sampled = world.sample_position(Vec3::new(0.9, 0.0, 0.2), 1.0).unwrap();
        assert!(world.is_on_surface(sampled));
        assert!(sampled.x > 1.0);

        assert!(world.sample_position(Vec3::new(30.0, 0.0, 0.0), 2.0).is_none());
        assert!(SpatialWorld::new().sample_position(Vec3::ZERO, 5.0).is_none());
    }

    #[test]
    fn test_path_detours_around_blocker() {
        let world = SpatialWorld::with_surface(
            NavSurface::rect(Vec2::splat(-10.0), Vec2::splat(10.0), 0.0)
                .with_blocker(Bounds::from_center_half_extents(Vec3::ZERO, Vec3::new(1.0, 1.0, 1.0))),
        );

        let from = Vec3::new(0.0, 0.0, 5.0);
        let goal = Vec3::new(0.0, 0.0, -5.0);
        let path = world.request_path(from, goal).unwrap();

        assert!(path.len() > 2, "path = {:?}", path);
        assert_eq!(path[0], from);
        assert_eq!(*path.last().unwrap(), goal);
        let surface = world.surface().unwrap();
        for pair in path.windows(2) {
            assert!(surface.first_blocker(pair[0].xz(), pair[1].xz()).is_none(), "segment {:?} crosses blocker", pair);
        }
    }

    #[test]
    fn test_straight_path_without_blockers() {
        let world = arena();
        let path = world.request_path(Vec3::ZERO, Vec3::new(4.0, 0.0, 4.0)).unwrap();
        assert_eq!(path, vec![Vec3::ZERO, Vec3::new(4.0, 0.0, 4.0)]);
        assert!(world.request_path(Vec3::ZERO, Vec3::new(40.0, 0.0, 0.0)).is_none());
    }
}

//! Flocking: separation / alignment / cohesion
//!
//! Соседи = живые агенты той же популяции в радиусе (через spatial overlap).
//! Каждая компонента усредняется, проецируется на плоскость, затем всё
//! складывается с весами и обрезается до `max(1, base_speed * 0.6)`.

use bevy::prelude::*;

use super::{AgentId, AgentRegistry};
use crate::config::FlockingConfig;
use crate::math::{clamp_length, planar, EPSILON};
use crate::spatial::{overlap_sphere_growing, ColliderOwner, OverlapHit, SpatialQuery};

/// Потолок буфера overlap для соседей
const MAX_NEIGHBOR_BUFFER: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: Vec3,
    pub velocity: Vec3,
}

pub fn max_flocking_force(base_speed: f32) -> f32 {
    (base_speed * 0.6).max(1.0)
}

pub fn flocking_force(position: Vec3, neighbors: &[Neighbor], config: &FlockingConfig, base_speed: f32) -> Vec3 {
    if neighbors.is_empty() {
        return Vec3::ZERO;
    }

    let mut separation = Vec3::ZERO;
    let mut alignment = Vec3::ZERO;
    let mut centroid = Vec3::ZERO;

    for neighbor in neighbors {
        let away = planar(position - neighbor.position);
        let distance = away.length();
        if distance > EPSILON {
            // 1/d вес: ближе → сильнее
            separation += away / (distance * distance);
        }
        alignment += planar(neighbor.velocity);
        centroid += neighbor.position;
    }

    let count = neighbors.len() as f32;
    let separation = planar(separation / count);
    let alignment = planar(alignment / count);
    let cohesion = planar(centroid / count - position);

    let force = separation * config.separation_weight
        + alignment * config.alignment_weight
        + cohesion * config.cohesion_weight;

    clamp_length(force, max_flocking_force(base_speed))
}

/// Сбор соседей через overlap + neighbor snapshot
///
/// Переиспользует `buffer` (растёт по тому же правилу, что и ray hits).
pub fn gather_neighbors(
    self_id: AgentId,
    population: u32,
    position: Vec3,
    config: &FlockingConfig,
    spatial: &dyn SpatialQuery,
    registry: &AgentRegistry,
    buffer: &mut Vec<OverlapHit>,
    out: &mut Vec<Neighbor>,
) {
    out.clear();
    let count = overlap_sphere_growing(
        spatial,
        position,
        config.neighbor_radius,
        config.neighbor_mask,
        buffer,
        MAX_NEIGHBOR_BUFFER,
    );

    let mut ids: Vec<AgentId> = buffer[..count]
        .iter()
        .filter_map(|hit| match hit.owner {
            ColliderOwner::Agent(id) if id != self_id => Some(id),
            _ => None,
        })
        .collect();
    // у агента может быть несколько коллайдеров
    ids.sort_unstable();
    ids.dedup();

    for id in ids {
        let Some(info) = registry.get(id) else {
            continue;
        };
        if info.alive && info.population == population {
            out.push(Neighbor {
                position: info.position,
                velocity: info.velocity,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separation_symmetric_for_pair() {
        let config = FlockingConfig::default();
        let a = Vec3::new(-1.0, 0.0, 0.0);
        let b = Vec3::new(1.0, 0.0, 0.0);

        let force_a = flocking_force(a, &[Neighbor { position: b, velocity: Vec3::ZERO }], &config, 3.5);
        let force_b = flocking_force(b, &[Neighbor { position: a, velocity: Vec3::ZERO }], &config, 3.5);

        assert!(force_a.length() > EPSILON);
        assert!((force_a + force_b).length() < 1e-5, "{:?} vs {:?}", force_a, force_b);
        // вблизи separation перевешивает cohesion
        assert!(force_a.x < 0.0);
    }

    #[test]
    fn test_force_clamped() {
        let config = FlockingConfig {
            separation_weight: 100.0,
            ..FlockingConfig::default()
        };
        let force = flocking_force(
            Vec3::ZERO,
            &[Neighbor { position: Vec3::X * 0.1, velocity: Vec3::ZERO }],
            &config,
            3.5,
        );
        assert!((force.length() - max_flocking_force(3.5)).abs() < 1e-4);
        assert_eq!(max_flocking_force(0.5), 1.0);
    }

    #[test]
    fn test_alignment_is_planar() {
        let config = FlockingConfig {
            separation_weight: 0.0,
            cohesion_weight: 0.0,
            alignment_weight: 1.0,
            ..FlockingConfig::default()
        };
        let force = flocking_force(
            Vec3::ZERO,
            &[Neighbor { position: Vec3::X, velocity: Vec3::new(0.0, 5.0, 0.5) }],
            &config,
            3.5,
        );
        assert_eq!(force, Vec3::new(0.0, 0.0, 0.5));
    }

    #[test]
    fn test_no_neighbors_no_force() {
        assert_eq!(flocking_force(Vec3::ZERO, &[], &FlockingConfig::default(), 3.5), Vec3::ZERO);
    }
}

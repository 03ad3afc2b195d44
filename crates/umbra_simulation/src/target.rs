//! Отслеживаемая цель (игрок)
//!
//! Агент держит только `TargetId`; сама цель живёт в `TargetRegistry` (Resource).
//! Удалённая или мёртвая цель для агента эквивалентна null-ссылке.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::health::Health;
use crate::spatial::{ColliderId, FactionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct TargetId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub id: TargetId,
    pub position: Vec3,
    /// Масштаб иерархии (fallback aim point, инвалидация кэша bounds)
    pub scale: Vec3,
    pub faction: FactionId,
    /// Коллайдеры иерархии цели в SpatialWorld
    pub colliders: Vec<ColliderId>,
    pub health: Health,
    pub currency: u32,
}

impl Target {
    pub fn new(id: TargetId, position: Vec3, faction: FactionId, max_health: u32) -> Self {
        Self {
            id,
            position,
            scale: Vec3::ONE,
            faction,
            colliders: Vec::new(),
            health: Health::new(max_health),
            currency: 0,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.health.is_alive()
    }

    /// Точка входа урона; возвращает фактически снятое здоровье
    pub fn apply_damage(&mut self, amount: u32) -> u32 {
        let before = self.health.current;
        self.health.take_damage(amount);
        before - self.health.current
    }

    pub fn add_currency(&mut self, amount: u32) {
        self.currency = self.currency.saturating_add(amount);
    }
}

#[derive(Debug, Default, Resource)]
pub struct TargetRegistry {
    targets: BTreeMap<TargetId, Target>,
    next_id: u32,
}

impl TargetRegistry {
    /// Создать цель со свежим id
    pub fn spawn(&mut self, position: Vec3, faction: FactionId, max_health: u32) -> TargetId {
        let id = TargetId(self.next_id);
        self.next_id += 1;
        self.targets.insert(id, Target::new(id, position, faction, max_health));
        id
    }

    pub fn insert(&mut self, target: Target) {
        self.next_id = self.next_id.max(target.id.0 + 1);
        self.targets.insert(target.id, target);
    }

    pub fn get(&self, id: TargetId) -> Option<&Target> {
        self.targets.get(&id)
    }

    pub fn get_mut(&mut self, id: TargetId) -> Option<&mut Target> {
        self.targets.get_mut(&id)
    }

    pub fn remove(&mut self, id: TargetId) -> Option<Target> {
        self.targets.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_spawn_and_remove() {
        let mut registry = TargetRegistry::default();
        let a = registry.spawn(Vec3::ZERO, 1, 100);
        let b = registry.spawn(Vec3::X, 1, 100);
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);

        registry.remove(a);
        assert!(registry.get(a).is_none());
        assert!(registry.get(b).is_some());
    }

    #[test]
    fn test_apply_damage_reports_dealt_amount() {
        let mut target = Target::new(TargetId(0), Vec3::ZERO, 1, 10);
        assert_eq!(target.apply_damage(4), 4);
        assert_eq!(target.apply_damage(40), 6);
        assert!(!target.is_alive());
    }
}

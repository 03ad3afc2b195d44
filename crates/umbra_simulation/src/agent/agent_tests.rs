//! Tests for the Agent aggregate (lifecycle + two-phase tick).

#[cfg(test)]
mod tests {
    use bevy::prelude::*;
    use std::cell::Cell;

    use super::super::{Agent, AgentContext, AgentEvent, AgentId, AgentRegistry, AgentState};
    use crate::config::AgentConfig;
    use crate::lights::{LightRegistry, TimedLight};
    use crate::spatial::world::{Collider, NavSurface, SpatialWorld};
    use crate::spatial::{ColliderOwner, NavigationQuery, LAYER_ENVIRONMENT, LAYER_TARGET};
    use crate::target::{TargetId, TargetRegistry};

    const DT: f32 = 1.0 / 60.0;
    const TARGET_FACTION: u32 = 1;

    /// Мир + реестры, которые в приложении держат ресурсы
    struct Harness {
        world: SpatialWorld,
        targets: TargetRegistry,
        lights: LightRegistry,
        neighbors: AgentRegistry,
        frame: u64,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                world: SpatialWorld::with_surface(NavSurface::rect(
                    Vec2::new(-30.0, -30.0),
                    Vec2::new(30.0, 30.0),
                    0.0,
                )),
                targets: TargetRegistry::default(),
                lights: LightRegistry::default(),
                neighbors: AgentRegistry::default(),
                frame: 0,
            }
        }

        fn spawn_target(&mut self, position: Vec3) -> TargetId {
            let id = self.targets.spawn(position, TARGET_FACTION, 100);
            let collider = self.world.add_collider(
                Collider::sphere(position + Vec3::Y, 0.5, LAYER_TARGET)
                    .with_owner(ColliderOwner::Target(id), Some(TARGET_FACTION)),
            );
            if let Some(target) = self.targets.get_mut(id) {
                target.colliders.push(collider);
            }
            id
        }

        fn tick(&mut self, agent: &mut Agent) {
            self.frame += 1;
            let mut ctx = AgentContext {
                frame: self.frame,
                spatial: &self.world,
                navigation: &self.world,
                neighbors: &self.neighbors,
                targets: &mut self.targets,
                lights: &mut self.lights,
            };
            agent.tick_logic(DT, &mut ctx);
            agent.tick_physics(DT, &self.world);
        }

        /// Тикать пока `until` не вернёт true (или лимит)
        fn run_until(&mut self, agent: &mut Agent, max_ticks: usize, mut until: impl FnMut(&Agent) -> bool) -> bool {
            for _ in 0..max_ticks {
                self.tick(agent);
                if until(agent) {
                    return true;
                }
            }
            false
        }
    }

    /// Навигация без валидных точек (считает sample_position)
    struct NoPatrolPoints {
        samples: Cell<u32>,
    }

    impl NavigationQuery for NoPatrolPoints {
        fn request_path(&self, _from: Vec3, _goal: Vec3) -> Option<Vec<Vec3>> {
            None
        }

        fn sample_position(&self, _point: Vec3, _max_distance: f32) -> Option<Vec3> {
            self.samples.set(self.samples.get() + 1);
            None
        }

        fn is_on_surface(&self, _point: Vec3) -> bool {
            true
        }
    }

    fn agent_at(position: Vec3) -> Agent {
        Agent::new(AgentId(0), position, AgentConfig::default(), 42).unwrap()
    }

    fn died_events(events: &[AgentEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, AgentEvent::Died { .. }))
            .count()
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = AgentConfig::default();
        config.combat.max_health = 0;
        assert!(Agent::new(AgentId(1), Vec3::ZERO, config, 1).is_err());
    }

    #[test]
    fn test_health_floors_at_zero_and_death_fires_once() {
        let mut agent = agent_at(Vec3::ZERO);

        for _ in 0..4 {
            agent.take_damage(30);
        }
        agent.take_damage(30);

        assert_eq!(agent.current_health(), 0);
        assert!(!agent.is_alive());
        let events = agent.drain_events();
        assert_eq!(died_events(&events), 1);
        assert!(matches!(
            events.last(),
            Some(AgentEvent::Died { reward: 10, spawn_particles: true, .. })
        ));
        assert_eq!(agent.presentation().started_runs(), 1);
    }

    #[test]
    fn test_dead_agent_ignores_commands() {
        let mut harness = Harness::new();
        let target = harness.spawn_target(Vec3::new(0.0, 0.0, -5.0));
        let mut agent = agent_at(Vec3::ZERO);
        agent.take_damage(1000);
        agent.drain_events();

        assert!(!agent.force_chase(harness.targets.get(target), true));
        agent.apply_impact(Vec3::X, 10.0, 0.5);
        agent.take_damage(10);

        assert!(!agent.knockback().is_active());
        assert_eq!(agent.state(), AgentState::Idle);
        assert!(agent.drain_events().is_empty());

        harness.tick(&mut agent);
        assert_eq!(agent.body().applied_velocity, Vec3::ZERO);
        assert_eq!(agent.desired_velocity(), Vec3::ZERO);
        assert_eq!(agent.state(), AgentState::Idle);
    }

    fn planar_xz(v: Vec3) -> Vec2 {
        Vec2::new(v.x, v.z)
    }

    #[test]
    fn test_death_presentation_runs_then_disables() {
        let mut harness = Harness::new();
        let mut agent = agent_at(Vec3::ZERO);
        agent.take_damage(1000);

        // presentation 1.2s, despawn delay 3s
        assert!(harness.run_until(&mut agent, 120, |a| !a.is_enabled()));
        assert!(!agent.presentation().is_running());
        assert_eq!(agent.presentation().completed_runs(), 1);
        assert!(!agent.is_ready_for_removal());

        assert!(harness.run_until(&mut agent, 240, |a| a.is_ready_for_removal()));
    }

    #[test]
    fn test_idle_sees_target_and_starts_chase() {
        let mut harness = Harness::new();
        let target = harness.spawn_target(Vec3::new(0.0, 0.0, -6.0));
        let mut agent = agent_at(Vec3::ZERO).with_target(Some(target));

        harness.tick(&mut agent);

        assert_eq!(agent.state(), AgentState::Chase);
        assert_eq!(
            agent.drain_events().first(),
            Some(&AgentEvent::StateChanged {
                from: AgentState::Idle,
                to: AgentState::Chase
            })
        );
        assert!(agent.navigation().has_path());
    }

    #[test]
    fn test_chase_attack_damages_target_and_drains_light() {
        let mut harness = Harness::new();
        let target = harness.spawn_target(Vec3::new(0.0, 0.0, -6.0));
        let light = harness
            .lights
            .add_light(TimedLight::new(Vec3::new(1.0, 3.0, -5.0), 1.0).with_lifetime(20.0));
        let mut agent = agent_at(Vec3::ZERO).with_target(Some(target));

        assert!(harness.run_until(&mut agent, 600, |a| a.state() == AgentState::Attack));
        for _ in 0..300 {
            harness.tick(&mut agent);
        }

        let hp = harness.targets.get(target).map(|t| t.health.current).unwrap();
        assert!(hp < 100, "target HP {}", hp);

        let events = agent.drain_events();
        let attacks = events
            .iter()
            .filter(|e| matches!(e, AgentEvent::Attacked { damage: 12, .. }))
            .count();
        assert!(attacks >= 1);
        assert!(events
            .iter()
            .any(|e| matches!(e, AgentEvent::LightDrained { light: l, .. } if *l == light)));
        assert!(harness.lights.get(light).unwrap().remaining_lifetime.unwrap() < 20.0);
    }

    #[test]
    fn test_losing_sight_in_attack_flips_orbit() {
        let mut harness = Harness::new();
        let target = harness.spawn_target(Vec3::new(0.0, 0.0, -6.0));
        let mut agent = agent_at(Vec3::ZERO).with_target(Some(target));
        assert!(harness.run_until(&mut agent, 600, |a| a.state() == AgentState::Attack));

        let orbit = agent.orbit_direction();
        let target_position = harness.targets.get(target).unwrap().position;
        let midpoint = (agent.position() + target_position) * 0.5;
        harness.world.add_collider(Collider::cuboid(
            Vec3::new(midpoint.x, 1.0, midpoint.z),
            Vec3::new(0.1, 3.0, 0.1),
            LAYER_ENVIRONMENT,
        ));

        harness.tick(&mut agent);

        assert_eq!(agent.state(), AgentState::Attack);
        assert_eq!(agent.orbit_direction(), -orbit);
    }

    #[test]
    fn test_removed_target_breaks_off_immediately() {
        let mut harness = Harness::new();
        let target = harness.spawn_target(Vec3::new(0.0, 0.0, -10.0));
        let mut agent = agent_at(Vec3::ZERO).with_target(Some(target));
        harness.tick(&mut agent);
        assert_eq!(agent.state(), AgentState::Chase);

        harness.targets.remove(target);
        harness.tick(&mut agent);

        assert_eq!(agent.state(), AgentState::BreakOff);
        // идём к последней известной позиции
        let destination = agent.navigation().destination().unwrap();
        assert!((planar_xz(destination) - Vec2::new(0.0, -10.0)).length() < 0.5);
    }

    #[test]
    fn test_lost_sight_grace_then_break_off() {
        let mut harness = Harness::new();
        let target = harness.spawn_target(Vec3::new(0.0, 0.0, -10.0));
        let mut agent = agent_at(Vec3::ZERO).with_target(Some(target));
        harness.tick(&mut agent);
        assert_eq!(agent.state(), AgentState::Chase);

        // широкая стена прямо перед целью
        harness.world.add_collider(Collider::cuboid(
            Vec3::new(0.0, 1.0, -8.5),
            Vec3::new(6.0, 3.0, 0.2),
            LAYER_ENVIRONMENT,
        ));

        let mut ticks = 0;
        assert!(harness.run_until(&mut agent, 600, |a| {
            ticks += 1;
            a.state() == AgentState::BreakOff
        }));
        // 2.5s grace ≈ 150 тиков
        assert!(ticks >= 140, "broke off after {} ticks", ticks);
    }

    #[test]
    fn test_patrol_falls_back_to_idle_without_points() {
        let navigation = NoPatrolPoints { samples: Cell::new(0) };
        let world = SpatialWorld::new();
        let mut targets = TargetRegistry::default();
        let mut lights = LightRegistry::default();
        let neighbors = AgentRegistry::default();
        let mut agent = agent_at(Vec3::ZERO);

        let idle = agent.idle_duration();
        let ticks = (idle / DT).ceil() as u64 + 2;
        for frame in 1..=ticks {
            let mut ctx = AgentContext {
                frame,
                spatial: &world,
                navigation: &navigation,
                neighbors: &neighbors,
                targets: &mut targets,
                lights: &mut lights,
            };
            agent.tick_logic(DT, &mut ctx);
            if navigation.samples.get() > 0 {
                break;
            }
        }

        assert_eq!(navigation.samples.get(), 6);
        assert_eq!(agent.state(), AgentState::Idle);
        assert_eq!(
            agent.drain_events().last(),
            Some(&AgentEvent::StateChanged {
                from: AgentState::Patrol,
                to: AgentState::Idle
            })
        );
        assert!(!agent.navigation().has_path());
    }

    #[test]
    fn test_patrol_point_stays_near_spawn() {
        let mut harness = Harness::new();
        let spawn = Vec3::new(3.0, 0.0, 2.0);
        let mut agent = agent_at(spawn);

        assert!(harness.run_until(&mut agent, 400, |a| a.state() == AgentState::Patrol));
        let destination = agent.navigation().destination().unwrap();
        let radius = agent.config().patrol.radius + agent.config().patrol.sample_radius;
        assert!((planar_xz(destination) - planar_xz(spawn)).length() <= radius);
    }

    #[test]
    fn test_force_and_stop_chase() {
        let mut harness = Harness::new();
        // цель за спиной: сама бы не увидела
        let target = harness.spawn_target(Vec3::new(0.0, 0.0, 8.0));
        let mut agent = agent_at(Vec3::ZERO);

        assert!(agent.force_chase(harness.targets.get(target), true));
        assert_eq!(agent.state(), AgentState::Chase);
        assert_eq!(agent.target(), Some(target));
        // повторный вызов идемпотентен
        assert!(agent.force_chase(harness.targets.get(target), false));
        let events = agent.drain_events();
        assert_eq!(events.len(), 1);

        assert!(!agent.force_chase(None, true));

        agent.stop_chase(false, &harness.world);
        assert_eq!(agent.state(), AgentState::Idle);
        assert_eq!(agent.target(), None);
        assert_eq!(agent.perception().last_known_position(), None);
    }

    #[test]
    fn test_forced_chase_holds_behind_wall() {
        let mut harness = Harness::new();
        harness.world.add_collider(Collider::cuboid(
            Vec3::new(0.0, 1.0, -4.0),
            Vec3::new(3.0, 2.0, 0.25),
            LAYER_ENVIRONMENT,
        ));
        let target = harness.spawn_target(Vec3::new(0.0, 0.0, -8.0));
        let mut agent = agent_at(Vec3::ZERO);

        assert!(agent.force_chase(harness.targets.get(target), true));
        assert_eq!(agent.perception().last_known_position(), Some(Vec3::new(0.0, 0.0, -8.0)));

        for _ in 0..60 {
            harness.tick(&mut agent);
            assert_eq!(agent.state(), AgentState::Chase);
        }
        assert!(!agent.perception().time_since_seen(agent.clock()).is_infinite());

        // grace истекает → BreakOff идёт к позиции цели
        let mut ticks = 60;
        assert!(harness.run_until(&mut agent, 300, |a| {
            ticks += 1;
            a.state() != AgentState::Chase
        }));
        assert_eq!(agent.state(), AgentState::BreakOff);
        assert!(ticks >= 140, "broke off after {} ticks", ticks);
        let destination = agent.navigation().destination().unwrap();
        assert!((planar_xz(destination) - Vec2::new(0.0, -8.0)).length() < 0.5);
    }

    #[test]
    fn test_cooldown_keeps_counting_outside_attack() {
        let mut harness = Harness::new();
        let target = harness.spawn_target(Vec3::new(0.0, 0.0, -20.0));
        let mut agent = agent_at(Vec3::ZERO).with_target(Some(target));
        harness.tick(&mut agent);
        assert_eq!(agent.state(), AgentState::Chase);

        // только что ударили
        agent.cooldown.since_last_attack = 0.0;
        for _ in 0..90 {
            harness.tick(&mut agent);
        }
        assert_eq!(agent.state(), AgentState::Chase);
        assert!(agent.cooldown().is_ready());

        // вернулись в Attack: удар без полного ожидания cooldown
        assert!(harness.run_until(&mut agent, 600, |a| a.state() == AgentState::Attack));
        let mut attack_ticks = 0;
        assert!(harness.run_until(&mut agent, 120, |a| {
            attack_ticks += 1;
            a.state() != AgentState::Attack || !a.cooldown().is_ready()
        }));
        assert!(agent
            .drain_events()
            .iter()
            .any(|e| matches!(e, AgentEvent::Attacked { damage: 12, .. })));
        assert!(attack_ticks < 45, "first strike after {} ticks", attack_ticks);
    }

    #[test]
    fn test_stop_chase_resumes_patrol() {
        let harness = Harness::new();
        let mut agent = agent_at(Vec3::ZERO);
        agent.stop_chase(true, &harness.world);
        assert_eq!(agent.state(), AgentState::Patrol);
        assert!(agent.navigation().destination().is_some());
    }

    #[test]
    fn test_impact_pushes_agent() {
        let mut harness = Harness::new();
        let mut agent = agent_at(Vec3::ZERO);
        agent.apply_impact(Vec3::X, 6.0, 0.5);
        assert!(agent.knockback().is_active());

        for _ in 0..10 {
            harness.tick(&mut agent);
        }
        assert!(agent.position().x > 0.5, "pushed to {:?}", agent.position());
        assert!(agent.position().y.abs() < 1e-4);
    }

    #[test]
    fn test_impact_stops_at_wall() {
        let mut harness = Harness::new();
        harness.world.add_collider(Collider::cuboid(
            Vec3::new(1.5, 1.0, 0.0),
            Vec3::new(0.25, 2.0, 4.0),
            LAYER_ENVIRONMENT,
        ));
        let mut agent = agent_at(Vec3::ZERO);
        agent.apply_impact(Vec3::X, 20.0, 1.0);

        for _ in 0..60 {
            harness.tick(&mut agent);
        }
        // грань стены x = 1.25, радиус тела 0.4
        assert!(agent.position().x <= 1.25 - 0.4 + 1e-3, "tunneled to {:?}", agent.position());
    }

    #[test]
    fn test_respawn_restores_pooled_agent() {
        let mut harness = Harness::new();
        let target = harness.spawn_target(Vec3::new(0.0, 0.0, -5.0));
        let mut agent = agent_at(Vec3::ZERO).with_target(Some(target));
        harness.tick(&mut agent);
        agent.take_damage(1000);
        harness.run_until(&mut agent, 120, |a| !a.is_enabled());

        agent.respawn(Vec3::new(5.0, 0.0, 5.0));

        assert!(agent.is_alive());
        assert!(agent.is_enabled());
        assert_eq!(agent.current_health(), 100);
        assert_eq!(agent.state(), AgentState::Idle);
        assert_eq!(agent.target(), None);
        assert_eq!(agent.spawn_anchor(), Vec3::new(5.0, 0.0, 5.0));
        assert_eq!(agent.position(), Vec3::new(5.0, 0.0, 5.0));
        assert!(!agent.is_ready_for_removal());

        // второй цикл смерти снова генерирует ровно одно событие
        agent.drain_events();
        agent.take_damage(1000);
        assert_eq!(died_events(&agent.drain_events()), 1);
        assert_eq!(agent.presentation().started_runs(), 2);
    }

    #[test]
    fn test_off_surface_agent_is_warped_back() {
        let mut harness = Harness::new();
        let mut agent = agent_at(Vec3::new(30.5, 0.0, 0.0));
        harness.tick(&mut agent);
        assert!(agent.position().x <= 30.0 + 1e-3);
    }

    #[test]
    fn test_snapshot_reflects_state() {
        let agent = agent_at(Vec3::new(1.0, 0.0, 2.0));
        let snapshot = agent.snapshot();
        assert_eq!(snapshot.id, AgentId(0));
        assert_eq!(snapshot.position, [1.0, 0.0, 2.0]);
        assert_eq!(snapshot.health, 100);
        assert!(snapshot.alive);
        assert_eq!(snapshot.state, AgentState::Idle);
    }
}

//! Death Presentation Pipeline
//!
//! Time-sliced task (`advance(dt) -> TaskStatus`), опрашивается раз в тик.
//! За фиксированную длительность: height arc, scale, затухающий wobble,
//! случайный spin и drift (выбираются при trigger), fade + emission через
//! per-renderer overrides и короткий начальный flash.
//!
//! Lifecycle:
//! - baseline root'а захватывается при первом trigger (или после re-enable)
//! - renderer cache строится лениво и сбрасывается при смене root
//! - повторный trigger останавливает текущую анимацию и стартует заново
//! - `reset()` возвращает всё к baseline

use bevy::prelude::*;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::f32::consts::TAU;

use super::visuals::{PresentationRoot, RendererRef, VisualRig};
use crate::config::PresentationConfig;
use crate::logger;
use crate::math::smoothstep;
use crate::task::TaskStatus;

/// Capability probe shared material'а (один раз при setup)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialCaps {
    pub has_color: bool,
    pub has_emission: bool,
    pub original_color: Vec4,
    pub original_emission: Vec4,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct CachedRenderer {
    at: RendererRef,
    caps: MaterialCaps,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ActiveAnimation {
    elapsed: f32,
    /// Полный угол spin (радианы, со знаком)
    spin: f32,
    drift: Vec3,
}

#[derive(Debug, Clone, Default)]
pub struct DeathPresentation {
    root: Option<PresentationRoot>,
    baseline: Option<Transform>,
    renderers: Option<Vec<CachedRenderer>>,
    active: Option<ActiveAnimation>,
    started_runs: u32,
    completed_runs: u32,
}

fn root_transform<'a>(
    root: PresentationRoot,
    rig: &'a mut VisualRig,
    agent_transform: &'a mut Transform,
) -> Option<&'a mut Transform> {
    match root {
        PresentationRoot::Agent => Some(agent_transform),
        PresentationRoot::Node(index) => rig.node_mut(index).map(|node| &mut node.local),
    }
}

impl DeathPresentation {
    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    pub fn root(&self) -> Option<PresentationRoot> {
        self.root
    }

    pub fn baseline(&self) -> Option<Transform> {
        self.baseline
    }

    pub fn started_runs(&self) -> u32 {
        self.started_runs
    }

    pub fn completed_runs(&self) -> u32 {
        self.completed_runs
    }

    /// Материалы renderers, для которых найдено хоть одно свойство
    pub fn animated_renderer_count(&self) -> usize {
        self.renderers
            .as_ref()
            .map_or(0, |cache| cache.iter().filter(|r| r.caps.has_color || r.caps.has_emission).count())
    }

    /// Запуск (или чистый перезапуск) анимации
    pub fn trigger(
        &mut self,
        rig: &mut VisualRig,
        agent_transform: &mut Transform,
        config: &PresentationConfig,
        rng: &mut ChaCha8Rng,
    ) {
        // останавливаем текущий прогон: всё обратно к baseline
        if self.active.is_some() {
            self.restore(rig, agent_transform);
            self.active = None;
        }

        let root = rig.resolve_root();
        if self.root != Some(root) {
            if self.root.is_some() {
                self.restore(rig, agent_transform);
            }
            self.root = Some(root);
            self.baseline = None;
            self.renderers = None;
        }

        if self.baseline.is_none() {
            self.baseline = root_transform(root, rig, agent_transform).map(|t| *t);
        }
        if self.renderers.is_none() {
            self.renderers = Some(Self::probe(rig, root));
        }
        if self.animated_renderer_count() == 0 {
            logger::log_warning("⚠️ Death presentation: no animatable renderers under root, transform-only");
        }

        let spin_degrees = if config.spin_degrees_max > config.spin_degrees_min {
            rng.gen_range(config.spin_degrees_min..=config.spin_degrees_max)
        } else {
            config.spin_degrees_min
        };
        let spin_sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        let drift_angle = rng.gen_range(0.0..TAU);
        let drift_distance = if config.drift_radius > 0.0 {
            rng.gen_range(0.0..=config.drift_radius)
        } else {
            0.0
        };

        self.active = Some(ActiveAnimation {
            elapsed: 0.0,
            spin: spin_degrees.to_radians() * spin_sign,
            drift: Vec3::new(drift_angle.cos(), 0.0, drift_angle.sin()) * drift_distance,
        });
        self.started_runs += 1;
    }

    fn probe(rig: &VisualRig, root: PresentationRoot) -> Vec<CachedRenderer> {
        rig.renderers_under(root)
            .into_iter()
            .filter_map(|at| {
                let renderer = rig.renderer(at)?;
                let caps = MaterialCaps {
                    has_color: renderer.material.color.is_some(),
                    has_emission: renderer.material.emission.is_some(),
                    original_color: renderer.material.color.unwrap_or(Vec4::ONE),
                    original_emission: renderer.material.emission.unwrap_or(Vec4::ZERO),
                };
                Some(CachedRenderer { at, caps })
            })
            .collect()
    }

    /// Один шаг анимации
    pub fn advance(
        &mut self,
        dt: f32,
        rig: &mut VisualRig,
        agent_transform: &mut Transform,
        config: &PresentationConfig,
    ) -> TaskStatus {
        let (Some(mut animation), Some(root), Some(baseline)) = (self.active, self.root, self.baseline) else {
            return TaskStatus::Done;
        };

        animation.elapsed += dt.max(0.0);
        let progress = (animation.elapsed / config.duration.max(f32::EPSILON)).min(1.0);
        let t = smoothstep(progress);

        let height = config.height_curve.evaluate(t) * config.height_amount;
        let scale = config.scale_curve.evaluate(t).max(0.0);
        let wobble = config.wobble_curve.evaluate(t)
            * config.wobble_degrees.to_radians()
            * (animation.elapsed * config.wobble_frequency * TAU).sin();

        if let Some(transform) = root_transform(root, rig, agent_transform) {
            transform.translation = baseline.translation + Vec3::Y * height + animation.drift * t;
            transform.rotation =
                baseline.rotation * Quat::from_rotation_y(animation.spin * t) * Quat::from_rotation_z(wobble);
            transform.scale = baseline.scale * scale;
        }

        let fade = config.fade_curve.evaluate(t).clamp(0.0, 1.0);
        let emission = config.emission_curve.evaluate(t).max(0.0);
        let flash = if config.flash_duration > 0.0 && animation.elapsed < config.flash_duration {
            (1.0 - animation.elapsed / config.flash_duration) * config.flash_intensity
        } else {
            0.0
        };
        let flash_color = Vec4::from_array(config.emission_color) * flash;
        let finished = progress >= 1.0;

        for cached in self.renderers.iter().flatten() {
            let Some(renderer) = rig.renderer_mut(cached.at) else {
                continue;
            };
            if cached.caps.has_color {
                let mut color = cached.caps.original_color;
                color.w = if finished { 0.0 } else { color.w * fade };
                renderer.overrides.color = Some(color);
            }
            if cached.caps.has_emission {
                renderer.overrides.emission = Some(cached.caps.original_emission * emission + flash_color);
            }
            if finished {
                renderer.visible = false;
            }
        }

        if finished {
            self.active = None;
            self.completed_runs += 1;
            return TaskStatus::Done;
        }
        self.active = Some(animation);
        TaskStatus::Running
    }

    /// Отмена + возврат к baseline; baseline будет перезахвачен при следующем trigger
    pub fn reset(&mut self, rig: &mut VisualRig, agent_transform: &mut Transform) {
        self.active = None;
        self.restore(rig, agent_transform);
        self.baseline = None;
    }

    fn restore(&mut self, rig: &mut VisualRig, agent_transform: &mut Transform) {
        if let (Some(root), Some(baseline)) = (self.root, self.baseline) {
            if let Some(transform) = root_transform(root, rig, agent_transform) {
                *transform = baseline;
            }
        }
        for cached in self.renderers.iter().flatten() {
            if let Some(renderer) = rig.renderer_mut(cached.at) {
                renderer.overrides.color = None;
                renderer.overrides.emission = None;
                renderer.visible = true;
            }
        }
    }
}

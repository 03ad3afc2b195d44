//! Destination Request + path following
//!
//! Новый путь запрашивается только если цель сдвинулась дальше `repath_tolerance`
//! или истёк refresh interval текущего состояния (ограничивает стоимость path planning).

use bevy::prelude::*;

use crate::config::NavigationConfig;
use crate::logger;
use crate::math::{normalize_or, planar, EPSILON};
use crate::spatial::NavigationQuery;

#[derive(Debug, Clone, Default)]
pub struct NavAgent {
    destination: Option<Vec3>,
    corners: Vec<Vec3>,
    /// Индекс следующего угла
    next_corner: usize,
    last_request_at: Option<f32>,
    refresh_interval: f32,
    path_requests: u32,
}

/// Направление + множитель скорости (замедление у финиша)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavSteering {
    pub direction: Vec3,
    pub speed_factor: f32,
}

impl NavAgent {
    pub fn new(config: &NavigationConfig) -> Self {
        Self {
            refresh_interval: config.base_refresh_interval,
            ..Self::default()
        }
    }

    pub fn destination(&self) -> Option<Vec3> {
        self.destination
    }

    pub fn corners(&self) -> &[Vec3] {
        &self.corners
    }

    pub fn has_path(&self) -> bool {
        self.next_corner < self.corners.len()
    }

    pub fn refresh_interval(&self) -> f32 {
        self.refresh_interval
    }

    /// Сколько раз реально дёргали path service
    pub fn path_requests(&self) -> u32 {
        self.path_requests
    }

    pub fn set_refresh_interval(&mut self, interval: f32) {
        self.refresh_interval = interval;
    }

    /// Запросить путь к `goal`; возвращает true, если запрос реально ушёл
    pub fn set_destination(
        &mut self,
        goal: Vec3,
        position: Vec3,
        now: f32,
        navigation: &dyn NavigationQuery,
        config: &NavigationConfig,
        force: bool,
    ) -> bool {
        if !force {
            if let (Some(current), Some(last)) = (self.destination, self.last_request_at) {
                let drift = planar(goal - current).length();
                if drift <= config.repath_tolerance && now - last < self.refresh_interval {
                    return false;
                }
            }
        }

        self.destination = Some(goal);
        self.last_request_at = Some(now);
        self.path_requests += 1;

        match navigation.request_path(position, goal) {
            Some(corners) => {
                self.corners = corners;
                // нулевой угол = текущая позиция
                self.next_corner = if self.corners.len() > 1 { 1 } else { 0 };
            }
            None => {
                logger::log_warning(&format!(
                    "⚠️ Path request to {:?} failed, holding position",
                    goal
                ));
                self.corners.clear();
                self.next_corner = 0;
            }
        }
        true
    }

    /// Вектор к следующему углу пути (планарный)
    pub fn steering(&mut self, position: Vec3, config: &NavigationConfig) -> Option<NavSteering> {
        while self.next_corner + 1 < self.corners.len()
            && planar(self.corners[self.next_corner] - position).length() <= config.corner_reach
        {
            self.next_corner += 1;
        }

        let corner = *self.corners.get(self.next_corner)?;
        let to_corner = planar(corner - position);
        let is_last = self.next_corner + 1 == self.corners.len();
        if is_last && to_corner.length() <= EPSILON {
            return None;
        }

        let direction = normalize_or(to_corner, Vec3::ZERO);
        if direction == Vec3::ZERO {
            return None;
        }

        let remaining = self.remaining_distance(position);
        let speed_factor = if config.stopping_distance > EPSILON && remaining < config.stopping_distance {
            (remaining / config.stopping_distance).clamp(0.0, 1.0)
        } else {
            1.0
        };

        Some(NavSteering {
            direction,
            speed_factor,
        })
    }

    /// Планарная длина остатка пути (0 без пути)
    pub fn remaining_distance(&self, position: Vec3) -> f32 {
        let Some(first) = self.corners.get(self.next_corner) else {
            return 0.0;
        };
        let mut total = planar(*first - position).length();
        for pair in self.corners[self.next_corner..].windows(2) {
            total += planar(pair[1] - pair[0]).length();
        }
        total
    }

    /// Путь завершён (нет пути или остаток в пределах допуска)
    pub fn path_complete(&self, position: Vec3, tolerance: f32) -> bool {
        !self.has_path() || self.remaining_distance(position) <= tolerance
    }

    /// Warp: путь пересчитается при следующем set_destination
    pub fn on_warped(&mut self) {
        self.corners.clear();
        self.next_corner = 0;
        self.last_request_at = None;
    }

    pub fn clear(&mut self) {
        self.destination = None;
        self.corners.clear();
        self.next_corner = 0;
        self.last_request_at = None;
    }
}

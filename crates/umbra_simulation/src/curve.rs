//! Designer curves: piecewise-linear keyframes
//!
//! Вычисление clamp'ится по краям (до первого ключа — значение первого, после последнего — последнего).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub time: f32,
    pub value: f32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Curve {
    keys: Vec<Keyframe>,
}

impl Curve {
    /// Ключи сортируются по времени при создании
    pub fn new(keys: impl IntoIterator<Item = (f32, f32)>) -> Self {
        let mut keys: Vec<Keyframe> = keys
            .into_iter()
            .map(|(time, value)| Keyframe { time, value })
            .collect();
        keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { keys }
    }

    pub fn constant(value: f32) -> Self {
        Self::new([(0.0, value)])
    }

    pub fn linear(from: f32, to: f32) -> Self {
        Self::new([(0.0, from), (1.0, to)])
    }

    pub fn keys(&self) -> &[Keyframe] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Значение в точке `t` (пустая кривая → 0)
    pub fn evaluate(&self, t: f32) -> f32 {
        let (Some(first), Some(last)) = (self.keys.first(), self.keys.last()) else {
            return 0.0;
        };
        if t <= first.time {
            return first.value;
        }
        if t >= last.time {
            return last.value;
        }

        for pair in self.keys.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if t <= b.time {
                let span = b.time - a.time;
                if span <= f32::EPSILON {
                    return b.value;
                }
                let local = (t - a.time) / span;
                return a.value + (b.value - a.value) * local;
            }
        }
        last.value
    }
}

//! Time-sliced задачи (замена корутин)
//!
//! Задача хранится как owned state и опрашивается раз в тик через `advance(dt)`.

use serde::{Deserialize, Serialize};

/// Результат одного шага задачи
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Running,
    Done,
}

impl TaskStatus {
    pub fn is_done(self) -> bool {
        matches!(self, TaskStatus::Done)
    }
}

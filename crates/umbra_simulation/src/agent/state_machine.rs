//! Finite-State Controller
//!
//! Idle → Patrol → Chase → Attack → BreakOff (см. таблицу правил).
//! Правила каждого состояния взаимоисключающие: для любых входов срабатывает
//! ровно одно (включая явное "остаться").

use serde::{Deserialize, Serialize};

/// Поведенческое состояние агента
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AgentState {
    #[default]
    Idle,
    Patrol,
    Chase,
    Attack,
    BreakOff,
}

impl AgentState {
    pub const ALL: [AgentState; 5] = [
        AgentState::Idle,
        AgentState::Patrol,
        AgentState::Chase,
        AgentState::Attack,
        AgentState::BreakOff,
    ];

    pub fn is_combat(self) -> bool {
        matches!(self, AgentState::Chase | AgentState::Attack)
    }
}

/// Снимок входов для решения о переходе
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionInputs {
    /// None → цели нет (null / удалена / мертва)
    pub target_distance: Option<f32>,
    pub target_visible: bool,
    pub time_since_seen: f32,
    pub lost_sight_grace: f32,
    pub attack_range: f32,
    pub attack_enter_factor: f32,
    pub attack_exit_factor: f32,
    pub idle_elapsed: bool,
    pub patrol_enabled: bool,
    /// Путь patrol/break-off завершён
    pub destination_reached: bool,
    pub has_last_known: bool,
}

impl TransitionInputs {
    fn visible(&self) -> bool {
        self.target_visible && self.target_distance.is_some()
    }

    fn lost_sight(&self) -> bool {
        !self.visible() && self.time_since_seen > self.lost_sight_grace
    }

    fn within(&self, factor: f32) -> bool {
        self.target_distance
            .is_some_and(|d| d <= self.attack_range * factor)
    }

    fn homing_done(&self) -> bool {
        !self.has_last_known || self.destination_reached
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Stay,
    Enter(AgentState),
    /// Patrol: выбрать новую точку (или → Idle, если не нашлась)
    RepickPatrolPoint,
}

pub struct Rule {
    pub name: &'static str,
    pub guard: fn(&TransitionInputs) -> bool,
    pub outcome: Transition,
}

const IDLE_RULES: &[Rule] = &[
    Rule {
        name: "idle: target visible",
        guard: |i| i.visible(),
        outcome: Transition::Enter(AgentState::Chase),
    },
    Rule {
        name: "idle: idle elapsed, patrol enabled",
        guard: |i| !i.visible() && i.idle_elapsed && i.patrol_enabled,
        outcome: Transition::Enter(AgentState::Patrol),
    },
    Rule {
        name: "idle: wait",
        guard: |i| !i.visible() && !(i.idle_elapsed && i.patrol_enabled),
        outcome: Transition::Stay,
    },
];

const PATROL_RULES: &[Rule] = &[
    Rule {
        name: "patrol: target visible",
        guard: |i| i.visible(),
        outcome: Transition::Enter(AgentState::Chase),
    },
    Rule {
        name: "patrol: point reached",
        guard: |i| !i.visible() && i.destination_reached,
        outcome: Transition::RepickPatrolPoint,
    },
    Rule {
        name: "patrol: walking",
        guard: |i| !i.visible() && !i.destination_reached,
        outcome: Transition::Stay,
    },
];

const CHASE_RULES: &[Rule] = &[
    Rule {
        name: "chase: target lost (null)",
        guard: |i| i.target_distance.is_none(),
        outcome: Transition::Enter(AgentState::BreakOff),
    },
    Rule {
        name: "chase: not seen for grace",
        guard: |i| i.target_distance.is_some() && i.lost_sight(),
        outcome: Transition::Enter(AgentState::BreakOff),
    },
    Rule {
        name: "chase: in attack range",
        guard: |i| !i.lost_sight() && i.within(i.attack_enter_factor),
        outcome: Transition::Enter(AgentState::Attack),
    },
    Rule {
        name: "chase: pursuing",
        guard: |i| i.target_distance.is_some() && !i.lost_sight() && !i.within(i.attack_enter_factor),
        outcome: Transition::Stay,
    },
];

const ATTACK_RULES: &[Rule] = &[
    Rule {
        name: "attack: target lost (null)",
        guard: |i| i.target_distance.is_none(),
        outcome: Transition::Enter(AgentState::BreakOff),
    },
    Rule {
        name: "attack: not seen for grace",
        guard: |i| i.target_distance.is_some() && i.lost_sight(),
        outcome: Transition::Enter(AgentState::BreakOff),
    },
    Rule {
        name: "attack: target escaped range",
        guard: |i| i.target_distance.is_some() && !i.lost_sight() && !i.within(i.attack_exit_factor),
        outcome: Transition::Enter(AgentState::Chase),
    },
    Rule {
        name: "attack: engaging",
        guard: |i| !i.lost_sight() && i.within(i.attack_exit_factor),
        outcome: Transition::Stay,
    },
];

const BREAK_OFF_RULES: &[Rule] = &[
    Rule {
        name: "break-off: target visible again",
        guard: |i| i.visible(),
        outcome: Transition::Enter(AgentState::Chase),
    },
    Rule {
        name: "break-off: home reached, patrol",
        guard: |i| !i.visible() && i.homing_done() && i.patrol_enabled,
        outcome: Transition::Enter(AgentState::Patrol),
    },
    Rule {
        name: "break-off: home reached, idle",
        guard: |i| !i.visible() && i.homing_done() && !i.patrol_enabled,
        outcome: Transition::Enter(AgentState::Idle),
    },
    Rule {
        name: "break-off: returning",
        guard: |i| !i.visible() && !i.homing_done(),
        outcome: Transition::Stay,
    },
];

pub fn rules(state: AgentState) -> &'static [Rule] {
    match state {
        AgentState::Idle => IDLE_RULES,
        AgentState::Patrol => PATROL_RULES,
        AgentState::Chase => CHASE_RULES,
        AgentState::Attack => ATTACK_RULES,
        AgentState::BreakOff => BREAK_OFF_RULES,
    }
}

/// Решение о переходе (первое сработавшее правило; правила не пересекаются)
pub fn decide(state: AgentState, inputs: &TransitionInputs) -> Transition {
    rules(state)
        .iter()
        .find(|rule| (rule.guard)(inputs))
        .map_or(Transition::Stay, |rule| rule.outcome)
}

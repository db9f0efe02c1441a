use std::fmt;

use war_schema::{STATE_IN_WAR, STATE_NOT_IN_WAR, STATE_PREPARATION, STATE_WAR_ENDED};

use crate::model::Snapshot;

/// Lifecycle phase of a war as reported by the provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    Preparing,
    Active,
    Concluded,
    /// Any tag the provider may add later. The engine never acts on it.
    Unknown,
}

impl Phase {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            STATE_NOT_IN_WAR => Phase::Idle,
            STATE_PREPARATION => Phase::Preparing,
            STATE_IN_WAR => Phase::Active,
            STATE_WAR_ENDED => Phase::Concluded,
            _ => Phase::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Preparing => "preparing",
            Phase::Active => "active",
            Phase::Concluded => "concluded",
            Phase::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn classify(snapshot: &Snapshot) -> Phase {
    Phase::from_tag(snapshot.phase_tag())
}

/// A change of phase between two consecutive polls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhaseTransition {
    pub from: Phase,
    pub to: Phase,
}

/// Remembers the last classified phase and reports when it changes.
#[derive(Debug, Default, Clone)]
pub struct PhaseTracker {
    last: Option<Phase>,
}

impl PhaseTracker {
    pub fn last(&self) -> Option<Phase> {
        self.last
    }

    /// Record `phase`; returns the transition when it differs from the last one
    /// observed. The very first observation is reported as coming from `Idle`.
    pub fn observe(&mut self, phase: Phase) -> Option<PhaseTransition> {
        let from = self.last.replace(phase).unwrap_or(Phase::Idle);
        (from != phase).then_some(PhaseTransition { from, to: phase })
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

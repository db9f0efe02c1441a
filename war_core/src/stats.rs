//! Incremental stats reconstruction.
//!
//! The provider reports only cumulative totals plus, per defender, the single
//! best attack suffered so far. The marginal value of each attack is recovered
//! by replaying every attack up to the position of interest in sequence order.

use std::fmt;

use thiserror::Error;

use crate::model::{Action, Competition, Side};

/// Tolerance used when checking whether a side reached full destruction.
const FULL_DESTRUCTION_EPSILON: f64 = 1e-6;

/// Aggregate war totals for both sides.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WarStats {
    pub home_stars: u32,
    pub away_stars: u32,
    /// Percentage of the whole enemy roster destroyed.
    pub home_destruction: f64,
    pub away_destruction: f64,
    pub home_actions_used: u32,
    pub away_actions_used: u32,
}

impl WarStats {
    pub fn stars(&self, side: Side) -> u32 {
        match side {
            Side::Home => self.home_stars,
            Side::Away => self.away_stars,
        }
    }

    pub fn destruction(&self, side: Side) -> f64 {
        match side {
            Side::Home => self.home_destruction,
            Side::Away => self.away_destruction,
        }
    }

    pub fn actions_used(&self, side: Side) -> u32 {
        match side {
            Side::Home => self.home_actions_used,
            Side::Away => self.away_actions_used,
        }
    }

    pub fn is_full_destruction(&self, side: Side) -> bool {
        (self.destruction(side) - 100.0).abs() < FULL_DESTRUCTION_EPSILON
    }

    pub fn outcome(&self) -> Outcome {
        Outcome::decide(self)
    }
}

/// Result of a war from the home side's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Win,
    Draw,
    Loss,
}

impl Outcome {
    /// Stars decide first; destruction breaks a star tie.
    pub fn decide(stats: &WarStats) -> Self {
        if stats.home_stars > stats.away_stars {
            Outcome::Win
        } else if stats.home_stars < stats.away_stars {
            Outcome::Loss
        } else if stats.home_destruction > stats.away_destruction {
            Outcome::Win
        } else if stats.home_destruction == stats.away_destruction {
            Outcome::Draw
        } else {
            Outcome::Loss
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Win => "win",
            Outcome::Draw => "draw",
            Outcome::Loss => "loss",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Best stars and best destruction suffered by a defender. The two maxima are
/// tracked independently and may come from different attacks.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Baseline {
    pub stars: u8,
    pub destruction: f64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatsError {
    #[error("roster size is zero; destruction cannot be normalised")]
    EmptyRoster,
}

pub struct StatsReconstructor<'a> {
    competition: &'a Competition,
}

impl<'a> StatsReconstructor<'a> {
    pub fn new(competition: &'a Competition) -> Result<Self, StatsError> {
        if competition.roster_size == 0 {
            return Err(StatsError::EmptyRoster);
        }
        Ok(Self { competition })
    }

    /// Best result against `target` among attacks at or before `upto`,
    /// ignoring every attack made by `excluding_initiator`.
    pub fn best_against_up_to(
        &self,
        target: &str,
        upto: u32,
        excluding_initiator: &str,
    ) -> Baseline {
        self.competition
            .actions_through(upto)
            .filter(|action| action.target == target && action.initiator != excluding_initiator)
            .fold(Baseline::default(), |best, action| Baseline {
                stars: best.stars.max(action.stars),
                destruction: best.destruction.max(action.destruction),
            })
    }

    fn baseline_for(&self, action: &Action) -> Baseline {
        self.best_against_up_to(&action.target, action.position, &action.initiator)
    }

    pub fn incremental_stars(&self, action: &Action) -> u8 {
        action.stars.saturating_sub(self.baseline_for(action).stars)
    }

    pub fn incremental_destruction(&self, action: &Action) -> f64 {
        (action.destruction - self.baseline_for(action).destruction).max(0.0)
    }

    /// Replay every attack up to and including `upto` and total the marginal
    /// contributions per side.
    pub fn stats_through_position(&self, upto: u32) -> WarStats {
        let mut stats = WarStats::default();
        let mut home_raw = 0.0;
        let mut away_raw = 0.0;
        for action in self.competition.actions_through(upto) {
            let stars = u32::from(self.incremental_stars(action));
            let destruction = self.incremental_destruction(action);
            match self.competition.side_of(&action.initiator) {
                Some(Side::Home) => {
                    stats.home_stars += stars;
                    home_raw += destruction;
                    stats.home_actions_used += 1;
                }
                Some(Side::Away) => {
                    stats.away_stars += stars;
                    away_raw += destruction;
                    stats.away_actions_used += 1;
                }
                // Validated snapshots only carry actions by known participants.
                None => {}
            }
        }
        let roster = f64::from(self.competition.roster_size);
        stats.home_destruction = home_raw / roster;
        stats.away_destruction = away_raw / roster;
        stats
    }

    /// Totals exactly as reported by the provider.
    pub fn latest_stats(&self) -> WarStats {
        latest_stats(self.competition)
    }
}

pub fn latest_stats(competition: &Competition) -> WarStats {
    WarStats {
        home_stars: competition.home.stars,
        away_stars: competition.away.stars,
        home_destruction: competition.home.destruction,
        away_destruction: competition.away.destruction,
        home_actions_used: competition.home.actions_used,
        away_actions_used: competition.away.actions_used,
    }
}

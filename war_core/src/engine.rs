//! Turns consecutive snapshots of a war into a deduplicated stream of
//! notifications.
//!
//! One [`ProgressEngine`] follows one war at a time. Everything it remembers
//! between polls is disposable except the ledger: dropping an engine and
//! replaying the latest snapshot into a fresh one sends nothing new.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ledger::{LedgerError, MessageId, NotificationLedger};
use crate::model::{Competition, CompetitionId, CompetitorMeta, Side, Snapshot};
use crate::notifier::Notifier;
use crate::phase::{classify, Phase, PhaseTracker};
use crate::provider::CompetitorDirectory;
use crate::render::{Locale, Renderer};
use crate::stats::{latest_stats, StatsError, StatsReconstructor};

/// What to announce when a war vanishes without a `Concluded` snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdlePolicy {
    /// Final outcome computed from the last snapshot held.
    #[default]
    FinalOutcome,
    GenericNotice,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EngineOptions {
    pub mute_attacks: bool,
    pub idle_policy: IdlePolicy,
    pub locale: Locale,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Stats(#[from] StatsError),
}

/// Result of one [`ProgressEngine::update`].
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateReport {
    pub phase: Phase,
    /// Messages newly recorded in the ledger, in emission order.
    pub sent: Vec<MessageId>,
}

impl UpdateReport {
    fn new(phase: Phase) -> Self {
        Self {
            phase,
            sent: Vec::new(),
        }
    }
}

pub struct ProgressEngine<L> {
    ledger: L,
    notifier: Arc<dyn Notifier>,
    renderer: Renderer,
    options: EngineOptions,
    held: Option<Competition>,
    tracker: PhaseTracker,
}

impl<L: NotificationLedger> ProgressEngine<L> {
    pub fn new(ledger: L, notifier: Arc<dyn Notifier>, options: EngineOptions) -> Self {
        Self {
            ledger,
            notifier,
            renderer: Renderer::new(options.locale),
            options,
            held: None,
            tracker: PhaseTracker::default(),
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    /// Id of the war currently followed, if any.
    pub fn competition_id(&self) -> Option<&CompetitionId> {
        self.held.as_ref().map(|competition| &competition.id)
    }

    pub fn last_phase(&self) -> Option<Phase> {
        self.tracker.last()
    }

    pub fn update(
        &mut self,
        snapshot: &Snapshot,
        directory: &dyn CompetitorDirectory,
    ) -> Result<UpdateReport, EngineError> {
        let phase = classify(snapshot);
        let mut report = UpdateReport::new(phase);

        if phase == Phase::Unknown {
            warn!(
                target: "war_monitor::engine",
                state = snapshot.phase_tag(),
                "phase.unknown"
            );
            return Ok(report);
        }

        let Some(competition) = snapshot.competition() else {
            self.observe(phase);
            self.conclude_vanished(&mut report)?;
            return Ok(report);
        };

        if self.competition_id() != Some(&competition.id) {
            self.ledger.ensure_partition(&competition.id)?;
            if let Some(previous) = self.competition_id() {
                info!(
                    target: "war_monitor::engine",
                    previous = %previous,
                    next = %competition.id,
                    "competition.replaced"
                );
            }
            self.tracker.reset();
        }
        self.held = Some(competition.clone());
        self.observe(phase);

        match phase {
            Phase::Preparing => self.announce_preparation(competition, directory, &mut report)?,
            Phase::Active => {
                self.send_once(&competition.id, MessageId::WAR_START, false, &mut report, |r| {
                    r.war_start()
                })?;
                self.replay_actions(competition, &mut report)?;
            }
            Phase::Concluded => {
                self.replay_actions(competition, &mut report)?;
                let stats = latest_stats(competition);
                self.send_once(&competition.id, MessageId::WAR_OVER, false, &mut report, |r| {
                    r.war_over(competition, &stats)
                })?;
                self.held = None;
            }
            Phase::Idle | Phase::Unknown => {}
        }
        Ok(report)
    }

    fn observe(&mut self, phase: Phase) {
        if let Some(transition) = self.tracker.observe(phase) {
            debug!(
                target: "war_monitor::engine",
                from = %transition.from,
                to = %transition.to,
                "phase.transition"
            );
        }
    }

    /// The war disappeared while we still held it: close it out once.
    fn conclude_vanished(&mut self, report: &mut UpdateReport) -> Result<(), EngineError> {
        let Some(held) = self.held.take() else {
            return Ok(());
        };
        let policy = self.options.idle_policy;
        let outcome = self.send_once(&held.id, MessageId::WAR_OVER, false, report, |r| {
            match policy {
                IdlePolicy::FinalOutcome => r.war_over(&held, &latest_stats(&held)),
                IdlePolicy::GenericNotice => r.war_ended_notice(&held),
            }
        });
        if outcome.is_err() {
            self.held = Some(held);
        }
        outcome
    }

    fn announce_preparation(
        &mut self,
        competition: &Competition,
        directory: &dyn CompetitorDirectory,
        report: &mut UpdateReport,
    ) -> Result<(), EngineError> {
        if !self
            .ledger
            .is_sent(&competition.id, &MessageId::PREPARATION)?
        {
            let home_meta = lookup_meta(directory, &competition.home.tag);
            let away_meta = lookup_meta(directory, &competition.away.tag);
            self.send_once(&competition.id, MessageId::PREPARATION, false, report, |r| {
                r.preparation(competition, &home_meta, &away_meta)
            })?;
        }
        self.send_once(&competition.id, MessageId::ROSTER, false, report, |r| {
            r.roster(competition)
        })
    }

    /// Announce every action not yet reported, in position order.
    fn replay_actions(
        &mut self,
        competition: &Competition,
        report: &mut UpdateReport,
    ) -> Result<(), EngineError> {
        if self.options.mute_attacks {
            return Ok(());
        }
        let reconstructor = StatsReconstructor::new(competition)?;
        for action in competition.actions() {
            let id = MessageId::action(&action.initiator, &action.target);
            if self.ledger.is_sent(&competition.id, &id)? {
                continue;
            }
            let stats = reconstructor.stats_through_position(action.position);
            let new_stars = reconstructor.incremental_stars(action);
            self.send_once(&competition.id, id, false, report, |r| {
                r.action(competition, action, new_stars, &stats)
            })?;
            for side in [Side::Home, Side::Away] {
                if stats.is_full_destruction(side) {
                    self.send_once(
                        &competition.id,
                        MessageId::full_destruction(side),
                        false,
                        report,
                        |r| r.full_destruction(side),
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Render, deliver and record `message` unless the ledger already has it.
    /// A sink failure is logged; the message still counts as delivered.
    fn send_once(
        &mut self,
        competition: &CompetitionId,
        message: MessageId,
        silent: bool,
        report: &mut UpdateReport,
        render: impl FnOnce(&Renderer) -> String,
    ) -> Result<(), EngineError> {
        if self.ledger.is_sent(competition, &message)? {
            return Ok(());
        }
        let text = render(&self.renderer);
        if let Err(err) = self.notifier.send(&text, silent) {
            warn!(
                target: "war_monitor::engine",
                competition = %competition,
                message = %message,
                error = %err,
                "notification.send_failed"
            );
        }
        self.ledger.mark_sent(competition, &message)?;
        debug!(
            target: "war_monitor::engine",
            competition = %competition,
            message = %message,
            "notification.sent"
        );
        report.sent.push(message);
        Ok(())
    }
}

fn lookup_meta(directory: &dyn CompetitorDirectory, clan_tag: &str) -> CompetitorMeta {
    directory.competitor_meta(clan_tag).unwrap_or_else(|err| {
        warn!(
            target: "war_monitor::engine",
            clan = clan_tag,
            error = %err,
            "competitor_meta.unavailable"
        );
        CompetitorMeta::default()
    })
}

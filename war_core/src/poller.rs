//! Poll loop: fetch, classify failures, feed engines, sleep.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use thiserror::Error;
use tracing::{debug, info, warn};
use war_schema::{LeagueGroupData, WarData, STATE_WAR_ENDED};

use crate::config::MonitorConfig;
use crate::engine::{EngineError, EngineOptions, ProgressEngine};
use crate::ledger::{NotificationLedger, SharedLedger};
use crate::model::{Snapshot, SnapshotError};
use crate::notifier::Notifier;
use crate::provider::{ErrorClass, ProviderDirectory, ProviderError, WarProvider, WarRef};
use crate::render::Renderer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            backoff: config.backoff_interval(),
        }
    }

    /// How long to wait before the next poll; `None` once polling must stop.
    pub fn delay(&self, outcome: PollOutcome) -> Option<Duration> {
        match outcome {
            PollOutcome::Continue => Some(self.interval),
            PollOutcome::Backoff => Some(self.backoff),
            PollOutcome::Stop => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Continue,
    Backoff,
    Stop,
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("provider failure: {0}")]
    Provider(#[from] ProviderError),
    #[error("invalid war snapshot: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub clan_tag: String,
    pub follow_league: bool,
    pub announce_maintenance: bool,
    pub engine: EngineOptions,
    pub retry: RetryPolicy,
}

impl MonitorSettings {
    pub fn from_config(clan_tag: impl Into<String>, config: &MonitorConfig) -> Self {
        Self {
            clan_tag: clan_tag.into(),
            follow_league: config.follow_league,
            announce_maintenance: config.announce_maintenance,
            engine: config.engine_options(),
            retry: RetryPolicy::from_config(config),
        }
    }
}

/// Follows the wars of one clan: its regular war, or every war of its
/// current league group. Each war gets its own engine; all engines share
/// one ledger.
pub struct Monitor<P, L> {
    provider: P,
    ledger: SharedLedger<L>,
    notifier: Arc<dyn Notifier>,
    renderer: Renderer,
    settings: MonitorSettings,
    engines: BTreeMap<String, ProgressEngine<SharedLedger<L>>>,
}

impl<P: WarProvider, L: NotificationLedger> Monitor<P, L> {
    pub fn new(
        provider: P,
        ledger: L,
        notifier: Arc<dyn Notifier>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            provider,
            ledger: SharedLedger::new(ledger),
            notifier,
            renderer: Renderer::new(settings.engine.locale),
            settings,
            engines: BTreeMap::new(),
        }
    }

    pub fn ledger(&self) -> &SharedLedger<L> {
        &self.ledger
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Keys of the wars currently followed.
    pub fn followed(&self) -> Vec<&str> {
        self.engines.keys().map(String::as_str).collect()
    }

    /// Run one poll cycle and decide how the loop proceeds.
    pub fn poll_once(&mut self) -> Result<PollOutcome, MonitorError> {
        match self.poll_wars() {
            Ok(()) => Ok(PollOutcome::Continue),
            Err(MonitorError::Provider(err)) => self.handle_provider_error(err),
            Err(MonitorError::Snapshot(err)) => {
                warn!(
                    target: "war_monitor::poller",
                    error = %err,
                    "poll.invalid_snapshot"
                );
                Ok(PollOutcome::Continue)
            }
            Err(err @ MonitorError::Engine(_)) => {
                self.alert(&self.renderer.internal_failure(), false);
                Err(err)
            }
        }
    }

    /// Poll until a permanent failure, an unexpected error or a shutdown
    /// message. Shutdown only interrupts the wait between polls.
    pub fn run(&mut self, shutdown: &Receiver<()>) -> Result<(), MonitorError> {
        loop {
            let outcome = self.poll_once()?;
            let Some(delay) = self.settings.retry.delay(outcome) else {
                info!(target: "war_monitor::poller", "poll.stopped");
                return Ok(());
            };
            if outcome == PollOutcome::Backoff {
                info!(
                    target: "war_monitor::poller",
                    delay_secs = delay.as_secs(),
                    "poll.backoff"
                );
            }
            match shutdown.recv_timeout(delay) {
                Ok(()) => {
                    info!(target: "war_monitor::poller", "poll.shutdown");
                    return Ok(());
                }
                Err(RecvTimeoutError::Timeout) => {}
                // Nobody can request a shutdown any more; keep the cadence.
                Err(RecvTimeoutError::Disconnected) => std::thread::sleep(delay),
            }
        }
    }

    fn poll_wars(&mut self) -> Result<(), MonitorError> {
        if self.settings.follow_league {
            match self.provider.fetch_league_group(&self.settings.clan_tag) {
                Ok(group) => return self.poll_league(&group),
                Err(err) if err.class() == ErrorClass::NotFound => {
                    debug!(
                        target: "war_monitor::poller",
                        clan = %self.settings.clan_tag,
                        "poll.not_in_league"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
        let current = WarRef::ClanCurrentWar(self.settings.clan_tag.clone());
        let wire = self.provider.fetch_war(&current)?;
        let key = current.to_string();
        self.engines.retain(|tag, _| *tag == key);
        self.drive(&key, wire)
    }

    fn poll_league(&mut self, group: &LeagueGroupData) -> Result<(), MonitorError> {
        let mut seen = BTreeSet::new();
        for war_tag in group.scheduled_war_tags() {
            let war = WarRef::LeagueWar(war_tag.to_string());
            let wire = self.provider.fetch_war(&war)?;
            if !wire.involves(&self.settings.clan_tag) {
                continue;
            }
            let key = war.to_string();
            // Rounds that finished before this monitor started following them stay silent.
            if wire.state == STATE_WAR_ENDED && !self.engines.contains_key(&key) {
                debug!(target: "war_monitor::poller", war = %key, "poll.past_war_skipped");
                continue;
            }
            match self.drive(&key, wire) {
                Err(MonitorError::Snapshot(err)) => {
                    warn!(
                        target: "war_monitor::poller",
                        war = %key,
                        error = %err,
                        "poll.invalid_snapshot"
                    );
                }
                other => other?,
            }
            seen.insert(key);
        }
        self.engines.retain(|key, _| {
            let keep = seen.contains(key);
            if !keep {
                debug!(target: "war_monitor::poller", war = %key, "poll.war_dropped");
            }
            keep
        });
        Ok(())
    }

    fn drive(&mut self, key: &str, wire: WarData) -> Result<(), MonitorError> {
        let snapshot = Snapshot::from_wire(wire, Some(&self.settings.clan_tag))?;
        let ledger = &self.ledger;
        let notifier = &self.notifier;
        let options = self.settings.engine;
        let engine = self.engines.entry(key.to_string()).or_insert_with(|| {
            ProgressEngine::new(ledger.clone(), Arc::clone(notifier), options)
        });
        let directory = ProviderDirectory(&self.provider);
        let report = engine.update(&snapshot, &directory)?;
        if !report.sent.is_empty() {
            info!(
                target: "war_monitor::poller",
                war = key,
                phase = %report.phase,
                sent = report.sent.len(),
                "poll.notified"
            );
        }
        Ok(())
    }

    fn handle_provider_error(&mut self, err: ProviderError) -> Result<PollOutcome, MonitorError> {
        match err.class() {
            ErrorClass::Transient => {
                warn!(
                    target: "war_monitor::poller",
                    error = %err,
                    maintenance = err.is_maintenance(),
                    "poll.transient_failure"
                );
                if err.is_maintenance() && self.settings.announce_maintenance {
                    let notice = self.renderer.maintenance_notice(self.settings.retry.backoff);
                    self.alert(&notice, true);
                }
                Ok(PollOutcome::Backoff)
            }
            ErrorClass::Malformed => {
                warn!(
                    target: "war_monitor::poller",
                    error = %err,
                    "poll.malformed_payload"
                );
                Ok(PollOutcome::Continue)
            }
            ErrorClass::Permanent => {
                let history_hidden = match self.provider.fetch_clan_profile(&self.settings.clan_tag)
                {
                    Ok(profile) => profile.is_war_log_public == Some(false),
                    Err(_) => false,
                };
                warn!(
                    target: "war_monitor::poller",
                    error = %err,
                    history_hidden,
                    "poll.permanent_failure"
                );
                let notice = if history_hidden {
                    self.renderer.history_not_public()
                } else {
                    self.renderer.access_denied()
                };
                self.alert(&notice, false);
                Ok(PollOutcome::Stop)
            }
            ErrorClass::NotFound | ErrorClass::Unexpected => {
                self.alert(&self.renderer.internal_failure(), false);
                Err(MonitorError::Provider(err))
            }
        }
    }

    fn alert(&self, text: &str, silent: bool) {
        if let Err(err) = self.notifier.send(text, silent) {
            warn!(
                target: "war_monitor::poller",
                error = %err,
                "alert.send_failed"
            );
        }
    }
}

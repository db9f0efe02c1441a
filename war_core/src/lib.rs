//! Core crate of the clan war monitor.
//!
//! Turns repeated polls of a war into exactly-once progress notifications:
//! snapshots are classified into phases, per-attack contributions are
//! reconstructed from cumulative data, and every delivered message is
//! recorded in a [`NotificationLedger`] keyed by [`CompetitionId`].

pub mod config;
mod engine;
mod ledger;
mod model;
mod notifier;
mod phase;
pub mod poller;
pub mod provider;
pub mod render;
mod stats;

pub use config::{load_monitor_config, ConfigError, MonitorConfig, MonitorConfigMetadata};
pub use engine::{EngineError, EngineOptions, IdlePolicy, ProgressEngine, UpdateReport};
pub use ledger::{
    FileLedger, LedgerError, MemoryLedger, MessageId, NotificationLedger, SharedLedger,
};
pub use model::{
    Action, Competition, CompetitionId, Competitor, CompetitorMeta, Participant, Side, Snapshot,
    SnapshotError,
};
pub use notifier::{Delivery, DryRunNotifier, MemoryNotifier, NotifyError, Notifier};
pub use phase::{classify, Phase, PhaseTracker, PhaseTransition};
pub use poller::{Monitor, MonitorError, MonitorSettings, PollOutcome, RetryPolicy};
pub use provider::{
    CompetitorDirectory, ErrorClass, ProviderDirectory, ProviderError, StaticDirectory,
    WarProvider, WarRef,
};
pub use render::{Locale, Renderer};
pub use stats::{latest_stats, Baseline, Outcome, StatsError, StatsReconstructor, WarStats};

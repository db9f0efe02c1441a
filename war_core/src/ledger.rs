//! Idempotency store recording which notifications were already delivered.
//!
//! Logical layout: competition id -> message id -> `true`. Absence means not
//! sent. Partitions are never removed.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::debug;

use crate::model::{CompetitionId, Side};

/// Key of one notification within a competition partition.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(Cow<'static, str>);

impl MessageId {
    pub const PREPARATION: MessageId = MessageId(Cow::Borrowed("preparation"));
    pub const ROSTER: MessageId = MessageId(Cow::Borrowed("roster"));
    pub const WAR_START: MessageId = MessageId(Cow::Borrowed("war_start"));
    pub const WAR_OVER: MessageId = MessageId(Cow::Borrowed("war_over"));
    pub const HOME_FULL_DESTRUCTION: MessageId =
        MessageId(Cow::Borrowed("home_full_destruction"));
    pub const AWAY_FULL_DESTRUCTION: MessageId =
        MessageId(Cow::Borrowed("away_full_destruction"));

    /// Per-action key. Independent of polling order, so an action seen again
    /// in a later snapshot maps to the same id.
    pub fn action(initiator: &str, target: &str) -> Self {
        Self(Cow::Owned(format!("action:{initiator}:{target}")))
    }

    pub fn full_destruction(side: Side) -> Self {
        match side {
            Side::Home => Self::HOME_FULL_DESTRUCTION,
            Side::Away => Self::AWAY_FULL_DESTRUCTION,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self(Cow::Owned(value))
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to access ledger at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode ledger at {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode ledger: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("ledger lock poisoned")]
    Poisoned,
}

pub trait NotificationLedger {
    /// Create an empty partition for `competition` when absent.
    fn ensure_partition(&mut self, competition: &CompetitionId) -> Result<(), LedgerError>;

    fn is_sent(&self, competition: &CompetitionId, message: &MessageId)
        -> Result<bool, LedgerError>;

    /// Record `message` as delivered. Durable once this returns `Ok`.
    fn mark_sent(
        &mut self,
        competition: &CompetitionId,
        message: &MessageId,
    ) -> Result<(), LedgerError>;

    /// Every message id recorded for `competition`, sorted.
    fn sent_ids(&self, competition: &CompetitionId) -> Result<Vec<MessageId>, LedgerError>;
}

type Partitions = BTreeMap<String, BTreeMap<String, bool>>;

fn partition_is_sent(
    partitions: &Partitions,
    competition: &CompetitionId,
    message: &MessageId,
) -> bool {
    partitions
        .get(competition.as_str())
        .and_then(|partition| partition.get(message.as_str()))
        .copied()
        .unwrap_or(false)
}

fn partition_ids(partitions: &Partitions, competition: &CompetitionId) -> Vec<MessageId> {
    partitions
        .get(competition.as_str())
        .map(|partition| {
            partition
                .iter()
                .filter(|(_, sent)| **sent)
                .map(|(id, _)| MessageId::from(id.clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// Ledger held entirely in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryLedger {
    partitions: Partitions,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_partition(&self, competition: &CompetitionId) -> bool {
        self.partitions.contains_key(competition.as_str())
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }
}

impl NotificationLedger for MemoryLedger {
    fn ensure_partition(&mut self, competition: &CompetitionId) -> Result<(), LedgerError> {
        self.partitions
            .entry(competition.as_str().to_string())
            .or_default();
        Ok(())
    }

    fn is_sent(
        &self,
        competition: &CompetitionId,
        message: &MessageId,
    ) -> Result<bool, LedgerError> {
        Ok(partition_is_sent(&self.partitions, competition, message))
    }

    fn mark_sent(
        &mut self,
        competition: &CompetitionId,
        message: &MessageId,
    ) -> Result<(), LedgerError> {
        self.partitions
            .entry(competition.as_str().to_string())
            .or_default()
            .insert(message.as_str().to_string(), true);
        Ok(())
    }

    fn sent_ids(&self, competition: &CompetitionId) -> Result<Vec<MessageId>, LedgerError> {
        Ok(partition_ids(&self.partitions, competition))
    }
}

/// Ledger persisted as a single JSON document.
///
/// Every mutation rewrites the document through a temporary file that is
/// synced and then renamed over the original.
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    partitions: Partitions,
}

impl FileLedger {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let partitions = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => Partitions::new(),
            Ok(contents) => {
                serde_json::from_str(&contents).map_err(|source| LedgerError::Decode {
                    path: path.clone(),
                    source,
                })?
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Partitions::new(),
            Err(source) => return Err(LedgerError::Io { path, source }),
        };
        debug!(
            target: "war_monitor::ledger",
            path = %path.display(),
            partitions = partitions.len(),
            "ledger.opened"
        );
        Ok(Self { path, partitions })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), LedgerError> {
        let encoded = serde_json::to_vec_pretty(&self.partitions)?;
        let io_err = |source| LedgerError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        {
            let mut file = File::create(&tmp_path).map_err(io_err)?;
            file.write_all(&encoded).map_err(io_err)?;
            file.sync_all().map_err(io_err)?;
        }
        fs::rename(&tmp_path, &self.path).map_err(io_err)?;
        Ok(())
    }
}

impl NotificationLedger for FileLedger {
    fn ensure_partition(&mut self, competition: &CompetitionId) -> Result<(), LedgerError> {
        if self.partitions.contains_key(competition.as_str()) {
            return Ok(());
        }
        self.partitions
            .insert(competition.as_str().to_string(), BTreeMap::new());
        self.persist()?;
        debug!(
            target: "war_monitor::ledger",
            competition = %competition,
            "ledger.partition_created"
        );
        Ok(())
    }

    fn is_sent(
        &self,
        competition: &CompetitionId,
        message: &MessageId,
    ) -> Result<bool, LedgerError> {
        Ok(partition_is_sent(&self.partitions, competition, message))
    }

    fn mark_sent(
        &mut self,
        competition: &CompetitionId,
        message: &MessageId,
    ) -> Result<(), LedgerError> {
        let previous = self
            .partitions
            .entry(competition.as_str().to_string())
            .or_default()
            .insert(message.as_str().to_string(), true);
        if previous == Some(true) {
            return Ok(());
        }
        if let Err(err) = self.persist() {
            // Keep memory in line with disk so a retry attempts the write again.
            if let Some(partition) = self.partitions.get_mut(competition.as_str()) {
                partition.remove(message.as_str());
            }
            return Err(err);
        }
        Ok(())
    }

    fn sent_ids(&self, competition: &CompetitionId) -> Result<Vec<MessageId>, LedgerError> {
        Ok(partition_ids(&self.partitions, competition))
    }
}

/// A ledger shared by several engines, e.g. one per league war.
#[derive(Debug, Default)]
pub struct SharedLedger<L> {
    inner: Arc<Mutex<L>>,
}

impl<L> Clone for SharedLedger<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: NotificationLedger> SharedLedger<L> {
    pub fn new(ledger: L) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ledger)),
        }
    }
}

impl<L: NotificationLedger> NotificationLedger for SharedLedger<L> {
    fn ensure_partition(&mut self, competition: &CompetitionId) -> Result<(), LedgerError> {
        let mut guard = self.inner.lock().map_err(|_| LedgerError::Poisoned)?;
        guard.ensure_partition(competition)
    }

    fn is_sent(
        &self,
        competition: &CompetitionId,
        message: &MessageId,
    ) -> Result<bool, LedgerError> {
        let guard = self.inner.lock().map_err(|_| LedgerError::Poisoned)?;
        guard.is_sent(competition, message)
    }

    fn mark_sent(
        &mut self,
        competition: &CompetitionId,
        message: &MessageId,
    ) -> Result<(), LedgerError> {
        let mut guard = self.inner.lock().map_err(|_| LedgerError::Poisoned)?;
        guard.mark_sent(competition, message)
    }

    fn sent_ids(&self, competition: &CompetitionId) -> Result<Vec<MessageId>, LedgerError> {
        let guard = self.inner.lock().map_err(|_| LedgerError::Poisoned)?;
        guard.sent_ids(competition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn war() -> CompetitionId {
        CompetitionId::new("#H", "#A", "20240101T000000.000Z")
    }

    fn scratch_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("war_core-{name}-{}-{nanos}.json", std::process::id()))
    }

    #[test]
    fn action_ids_are_order_independent() {
        assert_eq!(MessageId::action("#P1", "#T").as_str(), "action:#P1:#T");
        assert_eq!(MessageId::action("#P1", "#T"), MessageId::action("#P1", "#T"));
        assert_ne!(MessageId::action("#P1", "#T"), MessageId::action("#T", "#P1"));
        assert_eq!(
            MessageId::full_destruction(Side::Away).as_str(),
            "away_full_destruction"
        );
    }

    #[test]
    fn memory_ledger_tracks_flags_per_partition() {
        let mut ledger = MemoryLedger::new();
        let id = war();
        let other = CompetitionId::new("#H", "#B", "20240108T000000.000Z");

        ledger.ensure_partition(&id).expect("partition");
        assert!(ledger.has_partition(&id));
        assert!(!ledger.is_sent(&id, &MessageId::WAR_START).expect("read"));

        ledger.mark_sent(&id, &MessageId::WAR_START).expect("mark");
        assert!(ledger.is_sent(&id, &MessageId::WAR_START).expect("read"));
        assert!(!ledger.is_sent(&other, &MessageId::WAR_START).expect("read"));

        ledger.ensure_partition(&id).expect("no-op");
        assert_eq!(
            ledger.sent_ids(&id).expect("ids"),
            vec![MessageId::WAR_START]
        );
    }

    #[test]
    fn file_ledger_survives_reopen() {
        let path = scratch_path("reopen");
        let id = war();
        {
            let mut ledger = FileLedger::open(&path).expect("open fresh");
            ledger.ensure_partition(&id).expect("partition");
            ledger.mark_sent(&id, &MessageId::PREPARATION).expect("mark");
            ledger
                .mark_sent(&id, &MessageId::action("#P1", "#T"))
                .expect("mark");
        }
        let reopened = FileLedger::open(&path).expect("reopen");
        assert!(reopened.is_sent(&id, &MessageId::PREPARATION).expect("read"));
        assert_eq!(reopened.sent_ids(&id).expect("ids").len(), 2);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn file_ledger_rejects_corrupt_document() {
        let path = scratch_path("corrupt");
        fs::write(&path, "{not json").expect("write fixture");
        assert!(matches!(
            FileLedger::open(&path),
            Err(LedgerError::Decode { .. })
        ));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn shared_ledger_clones_see_the_same_state() {
        let shared = SharedLedger::new(MemoryLedger::new());
        let mut writer = shared.clone();
        let id = war();
        writer.mark_sent(&id, &MessageId::WAR_OVER).expect("mark");
        assert!(shared.is_sent(&id, &MessageId::WAR_OVER).expect("read"));
    }
}

//! Contracts for the remote war data provider.
//!
//! Adapters classify failures once, from the transport status, into an
//! [`ErrorClass`]; the poll loop only ever branches on that class.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;
use war_schema::{ClanProfileData, LeagueGroupData, WarData};

use crate::model::CompetitorMeta;

/// Which war to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WarRef {
    /// The regular war of the clan with this tag.
    ClanCurrentWar(String),
    /// One war of a league group, by war tag.
    LeagueWar(String),
}

impl fmt::Display for WarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarRef::ClanCurrentWar(tag) => write!(f, "clan:{tag}"),
            WarRef::LeagueWar(tag) => write!(f, "league:{tag}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry after backing off.
    Transient,
    /// Authorization or configuration problem; retrying will not help.
    Permanent,
    NotFound,
    /// The response arrived but could not be decoded.
    Malformed,
    Unexpected,
}

impl ErrorClass {
    pub fn from_status(status: u16) -> Self {
        match status {
            500 | 502 | 503 | 504 => ErrorClass::Transient,
            403 => ErrorClass::Permanent,
            404 => ErrorClass::NotFound,
            _ => ErrorClass::Unexpected,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider answered HTTP {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("provider unreachable: {0}")]
    Transport(String),
    #[error("provider payload could not be decoded: {0}")]
    Malformed(String),
}

impl ProviderError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ProviderError::Status { status, .. } => ErrorClass::from_status(*status),
            ProviderError::Transport(_) => ErrorClass::Transient,
            ProviderError::Malformed(_) => ErrorClass::Malformed,
        }
    }

    /// The provider is down for scheduled maintenance.
    pub fn is_maintenance(&self) -> bool {
        matches!(self, ProviderError::Status { status: 503, .. })
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Malformed(err.to_string())
    }
}

pub trait WarProvider {
    fn fetch_war(&self, war: &WarRef) -> Result<WarData, ProviderError>;

    /// League group of the clan. A clan outside any league yields `NotFound`.
    fn fetch_league_group(&self, clan_tag: &str) -> Result<LeagueGroupData, ProviderError>;

    fn fetch_clan_profile(&self, clan_tag: &str) -> Result<ClanProfileData, ProviderError>;
}

impl<P: WarProvider + ?Sized> WarProvider for &P {
    fn fetch_war(&self, war: &WarRef) -> Result<WarData, ProviderError> {
        (**self).fetch_war(war)
    }

    fn fetch_league_group(&self, clan_tag: &str) -> Result<LeagueGroupData, ProviderError> {
        (**self).fetch_league_group(clan_tag)
    }

    fn fetch_clan_profile(&self, clan_tag: &str) -> Result<ClanProfileData, ProviderError> {
        (**self).fetch_clan_profile(clan_tag)
    }
}

/// Source of the optional decoration shown in the preparation message.
pub trait CompetitorDirectory {
    fn competitor_meta(&self, clan_tag: &str) -> Result<CompetitorMeta, ProviderError>;
}

/// Looks competitor metadata up through a [`WarProvider`].
pub struct ProviderDirectory<'a, P: ?Sized>(pub &'a P);

impl<P: WarProvider + ?Sized> CompetitorDirectory for ProviderDirectory<'_, P> {
    fn competitor_meta(&self, clan_tag: &str) -> Result<CompetitorMeta, ProviderError> {
        self.0
            .fetch_clan_profile(clan_tag)
            .map(|profile| CompetitorMeta::from_profile(&profile))
    }
}

/// Fixed metadata per clan tag; unknown tags resolve to empty metadata.
#[derive(Debug, Default, Clone)]
pub struct StaticDirectory {
    entries: HashMap<String, CompetitorMeta>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, clan_tag: impl Into<String>, meta: CompetitorMeta) -> Self {
        self.entries.insert(clan_tag.into(), meta);
        self
    }
}

impl CompetitorDirectory for StaticDirectory {
    fn competitor_meta(&self, clan_tag: &str) -> Result<CompetitorMeta, ProviderError> {
        Ok(self.entries.get(clan_tag).cloned().unwrap_or_default())
    }
}

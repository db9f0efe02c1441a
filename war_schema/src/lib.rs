//! Wire contracts for the clan war data provider.
//!
//! These types mirror the JSON payloads returned by the provider verbatim.
//! Almost every field is optional on purpose: a `notInWar` payload carries
//! little more than `state`, and validation into the strongly typed war model
//! happens once in `war_core`, where a missing field becomes a structured
//! input error instead of a decode failure.

use serde::{Deserialize, Serialize};

/// Raw `state` values the provider is known to emit.
pub const STATE_NOT_IN_WAR: &str = "notInWar";
pub const STATE_PREPARATION: &str = "preparation";
pub const STATE_IN_WAR: &str = "inWar";
pub const STATE_WAR_ENDED: &str = "warEnded";

/// Placeholder war tag used by league groups for rounds not yet scheduled.
pub const UNSCHEDULED_WAR_TAG: &str = "#0";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarData {
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preparation_start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clan: Option<WarClanData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opponent: Option<WarClanData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarClanData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clan_level: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stars: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destruction_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attacks: Option<u32>,
    #[serde(default)]
    pub members: Vec<WarMemberData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarMemberData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub townhall_level: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_position: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opponent_attacks: Option<u32>,
    #[serde(default)]
    pub attacks: Vec<WarAttackData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_opponent_attack: Option<WarAttackData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarAttackData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attacker_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defender_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stars: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destruction_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
}

/// Public clan profile, used to enrich the preparation message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClanProfileData {
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub war_win_streak: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_war_log_public: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationData {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_country: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
}

/// League group listing every war tag of the current league season.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeagueGroupData {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub season: String,
    #[serde(default)]
    pub clans: Vec<LeagueClanData>,
    #[serde(default)]
    pub rounds: Vec<LeagueRoundData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeagueClanData {
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clan_level: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeagueRoundData {
    #[serde(default)]
    pub war_tags: Vec<String>,
}

impl LeagueGroupData {
    /// Every scheduled war tag across all rounds, in round order.
    pub fn scheduled_war_tags(&self) -> impl Iterator<Item = &str> {
        self.rounds
            .iter()
            .flat_map(|round| round.war_tags.iter())
            .map(String::as_str)
            .filter(|tag| *tag != UNSCHEDULED_WAR_TAG)
    }
}

impl WarData {
    /// Whether either side of this war is the clan with `tag`.
    pub fn involves(&self, tag: &str) -> bool {
        [self.clan.as_ref(), self.opponent.as_ref()]
            .into_iter()
            .flatten()
            .any(|side| side.tag.as_deref() == Some(tag))
    }
}

pub fn decode_war_json(data: &str) -> serde_json::Result<WarData> {
    serde_json::from_str(data)
}

pub fn decode_clan_profile_json(data: &str) -> serde_json::Result<ClanProfileData> {
    serde_json::from_str(data)
}

pub fn decode_league_group_json(data: &str) -> serde_json::Result<LeagueGroupData> {
    serde_json::from_str(data)
}

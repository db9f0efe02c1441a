#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Once;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use war_core::{ProviderError, WarProvider, WarRef};
use war_schema::{ClanProfileData, LeagueGroupData, WarData};

pub const HOME: &str = "#HOME";
pub const AWAY: &str = "#AWAY";
pub const PREPARATION_START: &str = "20240301T080000.000Z";

static INIT: Once = Once::new();

pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("test_monitor_config.json");

        debug_assert!(
            config_path.exists(),
            "missing test monitor config at {}",
            config_path.display()
        );

        std::env::set_var("WAR_MONITOR_CONFIG_PATH", &config_path);
    });
}

/// Unique scratch file under the system temp dir.
pub fn scratch_path(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    std::env::temp_dir().join(format!(
        "war_it-{name}-{}-{nanos}.json",
        std::process::id()
    ))
}

pub fn attack(attacker: &str, defender: &str, stars: u8, destruction: f64, order: u32) -> Value {
    json!({
        "attackerTag": attacker,
        "defenderTag": defender,
        "stars": stars,
        "destructionPercentage": destruction,
        "order": order,
    })
}

/// Builder for a war payload shaped like the provider's JSON.
pub struct WarFixture {
    state: String,
    team_size: u32,
    home: String,
    away: String,
    preparation_start: String,
    attacks: Vec<Value>,
    home_totals: (u32, f64),
    away_totals: (u32, f64),
}

impl WarFixture {
    /// A war of `team_size` members a side, tagged `#H1..` and `#A1..`.
    pub fn new(state: &str, team_size: u32) -> Self {
        Self {
            state: state.to_string(),
            team_size,
            home: HOME.to_string(),
            away: AWAY.to_string(),
            preparation_start: PREPARATION_START.to_string(),
            attacks: Vec::new(),
            home_totals: (0, 0.0),
            away_totals: (0, 0.0),
        }
    }

    pub fn between(mut self, home: &str, away: &str) -> Self {
        self.home = home.to_string();
        self.away = away.to_string();
        self
    }

    pub fn prepared_at(mut self, timestamp: &str) -> Self {
        self.preparation_start = timestamp.to_string();
        self
    }

    pub fn attack(
        mut self,
        attacker: &str,
        defender: &str,
        stars: u8,
        destruction: f64,
        order: u32,
    ) -> Self {
        self.attacks
            .push(attack(attacker, defender, stars, destruction, order));
        self
    }

    /// Aggregate `(stars, destruction)` reported for each side.
    pub fn totals(mut self, home: (u32, f64), away: (u32, f64)) -> Self {
        self.home_totals = home;
        self.away_totals = away;
        self
    }

    fn side(&self, tag: &str, prefix: &str, totals: (u32, f64)) -> Value {
        let members: Vec<Value> = (1..=self.team_size)
            .map(|position| {
                let member_tag = format!("#{prefix}{position}");
                let attacks: Vec<Value> = self
                    .attacks
                    .iter()
                    .filter(|a| a["attackerTag"] == member_tag.as_str())
                    .cloned()
                    .collect();
                json!({
                    "tag": member_tag,
                    "name": format!("{prefix} player {position}"),
                    "townhallLevel": 12,
                    "mapPosition": position,
                    "attacks": attacks,
                })
            })
            .collect();
        let used = self
            .attacks
            .iter()
            .filter(|a| {
                a["attackerTag"]
                    .as_str()
                    .map(|t| t.starts_with(&format!("#{prefix}")))
                    .unwrap_or(false)
            })
            .count();
        json!({
            "tag": tag,
            "name": format!("Clan {}", tag.trim_start_matches('#')),
            "clanLevel": 10,
            "stars": totals.0,
            "destructionPercentage": totals.1,
            "attacks": used,
            "members": members,
        })
    }

    pub fn json(&self) -> Value {
        json!({
            "state": self.state,
            "teamSize": self.team_size,
            "preparationStartTime": self.preparation_start,
            "startTime": "20240302T080000.000Z",
            "endTime": "20240303T080000.000Z",
            "clan": self.side(&self.home, "H", self.home_totals),
            "opponent": self.side(&self.away, "A", self.away_totals),
        })
    }

    pub fn wire(&self) -> WarData {
        serde_json::from_value(self.json()).expect("fixture decodes as a war payload")
    }
}

pub fn not_in_war() -> WarData {
    WarData {
        state: war_schema::STATE_NOT_IN_WAR.to_string(),
        ..WarData::default()
    }
}

pub fn status(code: u16) -> ProviderError {
    ProviderError::Status {
        status: code,
        detail: String::new(),
    }
}

/// Provider replaying queued responses per war reference. A reference with
/// an empty queue answers 404.
#[derive(Default)]
pub struct ScriptedProvider {
    wars: RefCell<HashMap<WarRef, VecDeque<Result<WarData, ProviderError>>>>,
    league: RefCell<VecDeque<Result<LeagueGroupData, ProviderError>>>,
    profiles: HashMap<String, ClanProfileData>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn war(self, war: WarRef, response: Result<WarData, ProviderError>) -> Self {
        self.wars
            .borrow_mut()
            .entry(war)
            .or_default()
            .push_back(response);
        self
    }

    pub fn current(self, response: Result<WarData, ProviderError>) -> Self {
        self.war(WarRef::ClanCurrentWar(HOME.to_string()), response)
    }

    pub fn league(self, response: Result<LeagueGroupData, ProviderError>) -> Self {
        self.league.borrow_mut().push_back(response);
        self
    }

    pub fn profile(mut self, tag: &str, profile: ClanProfileData) -> Self {
        self.profiles.insert(tag.to_string(), profile);
        self
    }
}

impl WarProvider for ScriptedProvider {
    fn fetch_war(&self, war: &WarRef) -> Result<WarData, ProviderError> {
        self.wars
            .borrow_mut()
            .get_mut(war)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(status(404)))
    }

    fn fetch_league_group(&self, _clan_tag: &str) -> Result<LeagueGroupData, ProviderError> {
        self.league
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(status(404)))
    }

    fn fetch_clan_profile(&self, clan_tag: &str) -> Result<ClanProfileData, ProviderError> {
        self.profiles
            .get(clan_tag)
            .cloned()
            .ok_or_else(|| status(404))
    }
}

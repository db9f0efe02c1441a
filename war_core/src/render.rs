//! Human readable message texts.
//!
//! Presentation only: numbers come from the stats reconstructor, identities
//! from the snapshot. The locale is an explicit value, never process state.

use std::time::Duration;

use serde::Deserialize;
use time::macros::{format_description, offset};
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::model::{Action, Competition, CompetitorMeta, Side};
use crate::stats::{Outcome, WarStats};

const HOME_MARKER: &str = "\u{1F535}";
const AWAY_MARKER: &str = "\u{1F534}";
const NEW_STAR: &str = "\u{2B50}";
const OLD_STAR: &str = "\u{1F36A}";

/// Controls how digits and times are presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum Locale {
    #[default]
    #[serde(rename = "en")]
    English,
    #[serde(rename = "fa")]
    Persian,
}

impl Locale {
    fn utc_offset(self) -> UtcOffset {
        match self {
            Locale::English => UtcOffset::UTC,
            Locale::Persian => offset!(+3:30),
        }
    }

    pub fn localize_digits(self, text: &str) -> String {
        match self {
            Locale::English => text.to_string(),
            Locale::Persian => text
                .chars()
                .map(|c| match c.to_digit(10) {
                    Some(d) => char::from_u32(0x06F0 + d).unwrap_or(c),
                    None => c,
                })
                .collect(),
        }
    }
}

/// Parse the provider's compact timestamp, e.g. `20170603T191148.000Z`.
pub fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    let pattern = format_description!("[year][month][day]T[hour][minute][second].[subsecond]Z");
    PrimitiveDateTime::parse(raw, &pattern)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

fn name_width(competition: &Competition) -> usize {
    competition
        .home
        .name
        .chars()
        .count()
        .max(competition.away.name.chars().count())
}

/// Pad on the raw name so the escaped entities do not skew the columns.
fn pad_name(name: &str, width: usize) -> String {
    escape_html(&format!("{name:<width$}"))
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Renderer {
    locale: Locale,
}

impl Renderer {
    pub fn new(locale: Locale) -> Self {
        Self { locale }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Timestamps that fail to parse are rendered verbatim.
    pub fn format_time(&self, raw: &str) -> String {
        let Some(utc) = parse_timestamp(raw) else {
            return raw.to_string();
        };
        let local = utc.to_offset(self.locale.utc_offset());
        let pattern = format_description!(
            "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second]"
        );
        match local.format(&pattern) {
            Ok(text) => self.locale.localize_digits(&text),
            Err(_) => raw.to_string(),
        }
    }

    pub fn preparation(
        &self,
        competition: &Competition,
        home_meta: &CompetitorMeta,
        away_meta: &CompetitorMeta,
    ) -> String {
        let width = name_width(competition);
        let line = |bullet: &str, name: &str, level: u32, meta: &CompetitorMeta| {
            format!(
                "{bullet} Clan {name} L {level:<2} +{streak} {location}{flag}",
                name = pad_name(name, width),
                streak = meta.win_streak,
                location = escape_html(&meta.location),
                flag = meta.flag,
            )
        };
        format!(
            "\u{1F3C1} {size} fold war is ahead!\n<pre>{home_line}\n{away_line}</pre>\nGame begins at {start}.\nHave fun! \u{1F6E1}\n",
            size = self.locale.localize_digits(&competition.roster_size.to_string()),
            home_line = line(
                "\u{25AB}\u{FE0F}",
                &competition.home.name,
                competition.home.level,
                home_meta
            ),
            away_line = line(
                "\u{25AA}\u{FE0F}",
                &competition.away.name,
                competition.away.level,
                away_meta
            ),
            start = self.format_time(&competition.start_time),
        )
    }

    /// Home roster ordered by board position.
    pub fn roster(&self, competition: &Competition) -> String {
        let mut msg = String::from("\u{26AA}\u{FE0F} Players\n\u{25AA}\u{FE0F}Position, TH, name");
        for member in competition.roster(Side::Home) {
            msg.push_str(&format!(
                "\n\u{25AB}\u{FE0F}{position:<2} {level:<2} {name}",
                position = member.position,
                level = member.defense_level,
                name = escape_html(&member.name),
            ));
        }
        format!("<pre>{msg}</pre>")
    }

    pub fn war_start(&self) -> String {
        "War has begun!".to_string()
    }

    pub fn action(
        &self,
        competition: &Competition,
        action: &Action,
        new_stars: u8,
        stats: &WarStats,
    ) -> String {
        let marker = match competition.side_of(&action.initiator) {
            Some(Side::Away) => AWAY_MARKER,
            _ => HOME_MARKER,
        };
        let describe = |tag: &str| match competition.participant(tag) {
            Some(p) => format!(
                "TH {level:<2} MP {position} {name}",
                level = p.defense_level,
                position = p.position,
                name = escape_html(&p.name),
            ),
            None => escape_html(tag),
        };
        format!(
            "<pre>{marker} [{position}] {home} vs {away}\nAttacker: {attacker}\nDefender: {defender}\nResult: {stars} | {destruction}%\n{info}\n</pre>",
            position = action.position,
            home = escape_html(&competition.home.name),
            away = escape_html(&competition.away.name),
            attacker = describe(&action.initiator),
            defender = describe(&action.target),
            stars = star_line(action.stars, new_stars),
            destruction = action.destruction,
            info = self.war_info(competition, stats),
        )
    }

    /// Two-line side summary: actions used, stars, destruction.
    pub fn war_info(&self, competition: &Competition, stats: &WarStats) -> String {
        let total = competition.roster_size * 2;
        let used_width = stats
            .home_actions_used
            .max(stats.away_actions_used)
            .to_string()
            .len();
        let star_width = stats.home_stars.max(stats.away_stars).to_string().len();
        let line = |side: Side| {
            format!(
                "\u{25AA} {used:>used_width$}/{total} \u{2B50} {stars:<star_width$} \u{26A1} {destruction:.2}%",
                used = stats.actions_used(side),
                stars = stats.stars(side),
                destruction = stats.destruction(side),
            )
        };
        self.locale
            .localize_digits(&format!("{}\n{}", line(Side::Home), line(Side::Away)))
    }

    pub fn full_destruction(&self, side: Side) -> String {
        match side {
            Side::Home => "\u{26AA}\u{FE0F} We destroyed them 100% boss!".to_string(),
            Side::Away => "\u{26AB}\u{FE0F} They destroyed us 100% boss!".to_string(),
        }
    }

    pub fn war_over(&self, competition: &Competition, stats: &WarStats) -> String {
        let width = name_width(competition);
        let title = match stats.outcome() {
            Outcome::Win => "\u{1F389} We won!",
            Outcome::Draw => "\u{1F3F3} It's a tie!",
            Outcome::Loss => "\u{1F4A9} We lost!",
        };
        format!(
            "<pre>{title}\nClan {home} L {home_level:<2}\nClan {away} L {away_level:<2}\n{info}\n</pre>",
            home = pad_name(&competition.home.name, width),
            away = pad_name(&competition.away.name, width),
            home_level = competition.home.level,
            away_level = competition.away.level,
            info = self.war_info(competition, stats),
        )
    }

    /// Used when a war vanished before its final snapshot was observed.
    pub fn war_ended_notice(&self, competition: &Competition) -> String {
        format!(
            "War against {} has ended.",
            escape_html(&competition.away.name)
        )
    }

    pub fn maintenance_notice(&self, retry_in: Duration) -> String {
        format!(
            "Data provider is under maintenance, retrying in {} seconds.",
            self.locale.localize_digits(&retry_in.as_secs().to_string())
        )
    }

    pub fn history_not_public(&self) -> String {
        "War log must be public boss! \u{2620}\u{FE0F}".to_string()
    }

    pub fn access_denied(&self) -> String {
        "Access to the war data was denied. Check the API token boss! \u{2620}\u{FE0F}".to_string()
    }

    pub fn internal_failure(&self) -> String {
        "\u{2620}\u{FE0F} \u{1F635} App is broken boss! Come over and fix me please!".to_string()
    }
}

/// Stars that did not improve on the defender's prior best render differently.
fn star_line(stars: u8, new_stars: u8) -> String {
    let new_stars = new_stars.min(stars);
    format!(
        "{}{}",
        OLD_STAR.repeat(usize::from(stars - new_stars)),
        NEW_STAR.repeat(usize::from(new_stars))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Snapshot;
    use crate::stats::StatsReconstructor;
    use serde_json::json;

    fn competition_snapshot() -> Snapshot {
        let payload = json!({
            "state": "inWar",
            "teamSize": 2,
            "preparationStartTime": "20170602T201148.000Z",
            "startTime": "20170603T191148.000Z",
            "clan": {"tag": "#H", "name": "Knights", "clanLevel": 9, "stars": 4,
                     "destructionPercentage": 75.0, "attacks": 2,
                     "members": [
                        {"tag": "#H2", "name": "bravo", "townhallLevel": 11, "mapPosition": 2,
                         "attacks": [{"attackerTag": "#H2", "defenderTag": "#A1", "stars": 3,
                                      "destructionPercentage": 100, "order": 2}]},
                        {"tag": "#H1", "name": "alpha", "townhallLevel": 12, "mapPosition": 1,
                         "attacks": [{"attackerTag": "#H1", "defenderTag": "#A1", "stars": 1,
                                      "destructionPercentage": 50, "order": 1}]}
                     ]},
            "opponent": {"tag": "#A", "name": "<Rogues>", "clanLevel": 7, "stars": 0,
                         "destructionPercentage": 0.0, "attacks": 0,
                         "members": [
                            {"tag": "#A1", "name": "x", "townhallLevel": 11, "mapPosition": 1},
                            {"tag": "#A2", "name": "y", "townhallLevel": 10, "mapPosition": 2}
                         ]},
        });
        Snapshot::from_json(&payload.to_string(), None).expect("valid")
    }

    #[test]
    fn formats_provider_timestamps_per_locale() {
        let english = Renderer::new(Locale::English);
        assert_eq!(
            english.format_time("20170603T191148.000Z"),
            "Sat, 03 Jun 2017 19:11:48"
        );
        let persian = Renderer::new(Locale::Persian);
        assert_eq!(
            persian.format_time("20170603T191148.000Z"),
            "Sat, \u{6F0}\u{6F3} Jun \u{6F2}\u{6F0}\u{6F1}\u{6F7} \u{6F2}\u{6F2}:\u{6F4}\u{6F1}:\u{6F4}\u{6F8}"
        );
        assert_eq!(english.format_time("not a time"), "not a time");
    }

    #[test]
    fn timestamps_follow_the_provider_layout() {
        let parsed = parse_timestamp("20170603T191148.250Z").expect("provider timestamp");
        assert_eq!(parsed.year(), 2017);
        assert_eq!(parsed.month(), time::Month::June);
        assert_eq!(parsed.second(), 48);
        assert_eq!(parsed.millisecond(), 250);
        assert!(parse_timestamp("2017-06-03T19:11:48Z").is_none());
        assert!(parse_timestamp("20171303T191148.000Z").is_none());
    }

    #[test]
    fn star_line_marks_non_improving_stars() {
        assert_eq!(star_line(3, 1), format!("{OLD_STAR}{OLD_STAR}{NEW_STAR}"));
        assert_eq!(star_line(2, 2), format!("{NEW_STAR}{NEW_STAR}"));
        assert_eq!(star_line(0, 0), "");
    }

    #[test]
    fn action_message_shows_running_totals() {
        let snapshot = competition_snapshot();
        let competition = snapshot.competition().expect("competition");
        let stats = StatsReconstructor::new(competition).expect("roster");
        let action = &competition.actions()[1];
        let totals = stats.stats_through_position(action.position);
        let text = Renderer::default().action(
            competition,
            action,
            stats.incremental_stars(action),
            &totals,
        );
        assert!(text.starts_with(&format!("<pre>{HOME_MARKER} [2] Knights vs &lt;Rogues&gt;")));
        assert!(text.contains("Attacker: TH 11 MP 2 bravo"));
        assert!(text.contains(&format!("Result: {OLD_STAR}{NEW_STAR}{NEW_STAR} | 100%")));
        assert!(text.contains("2/4 \u{2B50} 3 \u{26A1} 50.00%"));
    }

    #[test]
    fn roster_lists_home_members_by_position() {
        let snapshot = competition_snapshot();
        let competition = snapshot.competition().expect("competition");
        let text = Renderer::default().roster(competition);
        let alpha = text.find("alpha").expect("alpha listed");
        let bravo = text.find("bravo").expect("bravo listed");
        assert!(alpha < bravo);
        assert!(!text.contains(" x"), "away members are not listed");
    }

    #[test]
    fn war_over_title_follows_outcome() {
        let snapshot = competition_snapshot();
        let competition = snapshot.competition().expect("competition");
        let stats = crate::stats::latest_stats(competition);
        let text = Renderer::default().war_over(competition, &stats);
        assert!(text.contains("We won!"));
        assert!(text.contains("Clan Knights  L 9"));
        assert!(text.contains("Clan &lt;Rogues&gt; L 7"));
    }

    #[test]
    fn preparation_tolerates_empty_meta() {
        let snapshot = competition_snapshot();
        let competition = snapshot.competition().expect("competition");
        let text = Renderer::default().preparation(
            competition,
            &CompetitorMeta::default(),
            &CompetitorMeta::default(),
        );
        assert!(text.contains("2 fold war is ahead!"));
        assert!(text.contains("Game begins at Sat, 03 Jun 2017 19:11:48."));
    }
}

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;
use war_schema::{
    ClanProfileData, WarAttackData, WarClanData, WarData, WarMemberData, STATE_NOT_IN_WAR,
    STATE_PREPARATION, STATE_IN_WAR, STATE_WAR_ENDED,
};

/// Which of the two competitors a participant fights for. `Home` is always the
/// monitored clan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Home => Side::Away,
            Side::Away => Side::Home,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Home => "home",
            Side::Away => "away",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable key of one war instance: home tag, away tag and preparation start,
/// concatenated verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompetitionId(String);

impl CompetitionId {
    pub fn new(home_tag: &str, away_tag: &str, preparation_start: &str) -> Self {
        Self(format!("{home_tag}{away_tag}{preparation_start}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompetitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Competitor {
    pub tag: String,
    pub name: String,
    pub level: u32,
    pub stars: u32,
    /// Aggregate destruction, 0..=100 with two-decimal precision.
    pub destruction: f64,
    pub actions_used: u32,
    pub roster_size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub initiator: String,
    pub target: String,
    pub stars: u8,
    pub destruction: f64,
    /// Global ordering key, unique within one war.
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub tag: String,
    pub name: String,
    pub defense_level: u32,
    pub position: u32,
    pub side: Side,
    pub actions: Vec<Action>,
    pub best_action_against: Option<Action>,
}

/// Everything known about an ongoing (or just finished) war.
#[derive(Debug, Clone, PartialEq)]
pub struct Competition {
    pub id: CompetitionId,
    pub home: Competitor,
    pub away: Competitor,
    pub roster_size: u32,
    pub preparation_start: String,
    pub start_time: String,
    pub end_time: Option<String>,
    participants: Vec<Participant>,
    index: HashMap<String, usize>,
    actions: Vec<Action>,
}

impl Competition {
    pub fn competitor(&self, side: Side) -> &Competitor {
        match side {
            Side::Home => &self.home,
            Side::Away => &self.away,
        }
    }

    pub fn participant(&self, tag: &str) -> Option<&Participant> {
        self.index.get(tag).map(|idx| &self.participants[*idx])
    }

    pub fn side_of(&self, tag: &str) -> Option<Side> {
        self.participant(tag).map(|participant| participant.side)
    }

    /// Members of one side ordered by board position.
    pub fn roster(&self, side: Side) -> Vec<&Participant> {
        let mut members: Vec<_> = self
            .participants
            .iter()
            .filter(|participant| participant.side == side)
            .collect();
        members.sort_by_key(|participant| participant.position);
        members
    }

    /// All actions of the war in ascending sequence position.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn actions_through(&self, position: u32) -> impl Iterator<Item = &Action> {
        self.actions
            .iter()
            .take_while(move |action| action.position <= position)
    }
}

/// One immutable poll result.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    phase_tag: String,
    competition: Option<Competition>,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("snapshot declares an empty roster")]
    EmptyRoster,
    #[error("participant {0} appears more than once")]
    DuplicateParticipant(String),
    #[error("two actions share sequence position {0}")]
    DuplicatePosition(u32),
    #[error("action references unknown participant {0}")]
    UnknownParticipant(String),
    #[error("action by {initiator} targets {target} on its own side")]
    InvalidTarget { initiator: String, target: String },
    #[error("action at position {position} reports {stars} stars")]
    StarsOutOfRange { position: u32, stars: u8 },
    #[error("action at position {position} reports {destruction}% destruction")]
    DestructionOutOfRange { position: u32, destruction: f64 },
    #[error("clan {clan} reports impossible totals: {detail}")]
    AggregateOutOfRange { clan: String, detail: &'static str },
    #[error("best attack recorded against {defender} does not target it from the other side")]
    InvalidBestAction { defender: String },
    #[error("failed to decode snapshot: {0}")]
    Decode(#[from] serde_json::Error),
}

impl Snapshot {
    /// Decode and validate a raw provider payload. See [`Snapshot::from_wire`].
    pub fn from_json(data: &str, home_tag: Option<&str>) -> Result<Self, SnapshotError> {
        let wire = war_schema::decode_war_json(data)?;
        Self::from_wire(wire, home_tag)
    }

    /// Validate a wire payload into a snapshot.
    ///
    /// When `home_tag` names the wire `opponent`, the two sides are swapped so
    /// that [`Side::Home`] is always the monitored clan. Payloads with an
    /// unrecognised state are accepted; their competition is kept only when it
    /// validates.
    pub fn from_wire(mut wire: WarData, home_tag: Option<&str>) -> Result<Self, SnapshotError> {
        if let Some(home_tag) = home_tag {
            let opponent_is_home = wire
                .opponent
                .as_ref()
                .and_then(|side| side.tag.as_deref())
                == Some(home_tag);
            if opponent_is_home {
                std::mem::swap(&mut wire.clan, &mut wire.opponent);
            }
        }

        let competition = match wire.state.as_str() {
            STATE_NOT_IN_WAR => None,
            STATE_PREPARATION | STATE_IN_WAR | STATE_WAR_ENDED => {
                Some(build_competition(&wire)?)
            }
            _ => build_competition(&wire).ok(),
        };

        Ok(Self {
            phase_tag: wire.state,
            competition,
        })
    }

    /// An idle snapshot, as returned when the clan is not at war.
    pub fn idle() -> Self {
        Self {
            phase_tag: STATE_NOT_IN_WAR.to_string(),
            competition: None,
        }
    }

    pub fn phase_tag(&self) -> &str {
        &self.phase_tag
    }

    pub fn competition(&self) -> Option<&Competition> {
        self.competition.as_ref()
    }

    pub fn competition_id(&self) -> Option<&CompetitionId> {
        self.competition.as_ref().map(|competition| &competition.id)
    }
}

fn build_competition(wire: &WarData) -> Result<Competition, SnapshotError> {
    let roster_size = wire.team_size.ok_or(SnapshotError::MissingField("teamSize"))?;
    if roster_size == 0 {
        return Err(SnapshotError::EmptyRoster);
    }
    let preparation_start = wire
        .preparation_start_time
        .clone()
        .ok_or(SnapshotError::MissingField("preparationStartTime"))?;
    let start_time = wire
        .start_time
        .clone()
        .ok_or(SnapshotError::MissingField("startTime"))?;
    let home_wire = wire.clan.as_ref().ok_or(SnapshotError::MissingField("clan"))?;
    let away_wire = wire
        .opponent
        .as_ref()
        .ok_or(SnapshotError::MissingField("opponent"))?;

    let home = build_competitor(home_wire)?;
    let away = build_competitor(away_wire)?;

    let mut participants = Vec::with_capacity(home.roster_size + away.roster_size);
    let mut index = HashMap::new();
    for (side, side_wire) in [(Side::Home, home_wire), (Side::Away, away_wire)] {
        for member in &side_wire.members {
            let participant = build_participant(member, side)?;
            if index.contains_key(&participant.tag) {
                return Err(SnapshotError::DuplicateParticipant(participant.tag));
            }
            index.insert(participant.tag.clone(), participants.len());
            participants.push(participant);
        }
    }

    let mut actions: Vec<Action> = participants
        .iter()
        .flat_map(|participant| participant.actions.iter().cloned())
        .collect();
    actions.sort_by_key(|action| action.position);
    for pair in actions.windows(2) {
        if pair[0].position == pair[1].position {
            return Err(SnapshotError::DuplicatePosition(pair[0].position));
        }
    }
    for action in &actions {
        let initiator_side = index
            .get(&action.initiator)
            .map(|idx| participants[*idx].side)
            .ok_or_else(|| SnapshotError::UnknownParticipant(action.initiator.clone()))?;
        let target_side = index
            .get(&action.target)
            .map(|idx| participants[*idx].side)
            .ok_or_else(|| SnapshotError::UnknownParticipant(action.target.clone()))?;
        if target_side != initiator_side.opposite() {
            return Err(SnapshotError::InvalidTarget {
                initiator: action.initiator.clone(),
                target: action.target.clone(),
            });
        }
    }

    for participant in &participants {
        let Some(best) = participant.best_action_against.as_ref() else {
            continue;
        };
        let initiator_side = index.get(&best.initiator).map(|idx| participants[*idx].side);
        if best.target != participant.tag || initiator_side != Some(participant.side.opposite()) {
            return Err(SnapshotError::InvalidBestAction {
                defender: participant.tag.clone(),
            });
        }
    }

    Ok(Competition {
        id: CompetitionId::new(&home.tag, &away.tag, &preparation_start),
        home,
        away,
        roster_size,
        preparation_start,
        start_time,
        end_time: wire.end_time.clone(),
        participants,
        index,
        actions,
    })
}

fn build_competitor(wire: &WarClanData) -> Result<Competitor, SnapshotError> {
    let competitor = Competitor {
        tag: wire.tag.clone().ok_or(SnapshotError::MissingField("clan.tag"))?,
        name: wire
            .name
            .clone()
            .ok_or(SnapshotError::MissingField("clan.name"))?,
        level: wire.clan_level.unwrap_or_default(),
        stars: wire.stars.unwrap_or_default(),
        destruction: wire.destruction_percentage.unwrap_or_default(),
        actions_used: wire.attacks.unwrap_or_default(),
        roster_size: wire.members.len(),
    };
    // Destruction is already a share of the whole roster, so 100 is the cap.
    let detail = if u64::from(competitor.stars) > 3 * u64::from(competitor.actions_used) {
        Some("more than three stars per attack")
    } else if !(0.0..=100.0).contains(&competitor.destruction) {
        Some("destruction outside 0..=100")
    } else {
        None
    };
    match detail {
        Some(detail) => Err(SnapshotError::AggregateOutOfRange {
            clan: competitor.tag,
            detail,
        }),
        None => Ok(competitor),
    }
}

fn build_participant(wire: &WarMemberData, side: Side) -> Result<Participant, SnapshotError> {
    let actions = wire
        .attacks
        .iter()
        .map(build_action)
        .collect::<Result<Vec<_>, _>>()?;
    let best_action_against = wire
        .best_opponent_attack
        .as_ref()
        .map(build_action)
        .transpose()?;
    Ok(Participant {
        tag: wire
            .tag
            .clone()
            .ok_or(SnapshotError::MissingField("members.tag"))?,
        name: wire
            .name
            .clone()
            .ok_or(SnapshotError::MissingField("members.name"))?,
        defense_level: wire.townhall_level.unwrap_or_default(),
        position: wire
            .map_position
            .ok_or(SnapshotError::MissingField("members.mapPosition"))?,
        side,
        actions,
        best_action_against,
    })
}

fn build_action(wire: &WarAttackData) -> Result<Action, SnapshotError> {
    let position = wire
        .order
        .ok_or(SnapshotError::MissingField("attacks.order"))?;
    let stars = wire
        .stars
        .ok_or(SnapshotError::MissingField("attacks.stars"))?;
    if stars > 3 {
        return Err(SnapshotError::StarsOutOfRange { position, stars });
    }
    let destruction = wire
        .destruction_percentage
        .ok_or(SnapshotError::MissingField("attacks.destructionPercentage"))?;
    if !(0.0..=100.0).contains(&destruction) {
        return Err(SnapshotError::DestructionOutOfRange {
            position,
            destruction,
        });
    }
    Ok(Action {
        initiator: wire
            .attacker_tag
            .clone()
            .ok_or(SnapshotError::MissingField("attacks.attackerTag"))?,
        target: wire
            .defender_tag
            .clone()
            .ok_or(SnapshotError::MissingField("attacks.defenderTag"))?,
        stars,
        destruction,
        position,
    })
}

/// Optional decoration for the preparation message. Every field may be
/// empty; a missing profile never blocks a phase message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompetitorMeta {
    pub location: String,
    pub flag: String,
    pub win_streak: u32,
}

impl CompetitorMeta {
    pub fn from_profile(profile: &ClanProfileData) -> Self {
        let Some(location) = profile.location.as_ref() else {
            return Self {
                win_streak: profile.war_win_streak.unwrap_or_default(),
                ..Self::default()
            };
        };
        let flag = match location.country_code.as_deref() {
            Some(code) if location.is_country => country_flag(code),
            _ if location.name == "International" => "\u{1F30D}".to_string(),
            _ => String::new(),
        };
        Self {
            location: location.name.clone(),
            flag,
            win_streak: profile.war_win_streak.unwrap_or_default(),
        }
    }
}

/// Regional indicator pair for a two-letter country code, empty otherwise.
fn country_flag(code: &str) -> String {
    let letters: Vec<char> = code.chars().collect();
    if letters.len() != 2 || !letters.iter().all(char::is_ascii_alphabetic) {
        return String::new();
    }
    letters
        .iter()
        .filter_map(|letter| char::from_u32(0x1F1A5 + letter.to_ascii_uppercase() as u32))
        .collect()
}

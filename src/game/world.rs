//! Entity and world model: plain match data, no simulation behaviour

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::fixed::{meters, Vec2, Q16_ONE};
use super::tuning::EngineConfig;

/// Players per side at kick-off
pub const ROSTER_SIZE: usize = 11;

/// Full stamina in hundredths
pub const MAX_STAMINA: i64 = 10_000;

/// Side of the pitch. Home attacks toward `x = pitch.length`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Home,
    Away,
}

impl Team {
    pub fn opponent(self) -> Self {
        match self {
            Team::Home => Team::Away,
            Team::Away => Team::Home,
        }
    }

    pub(crate) fn code(self) -> u8 {
        match self {
            Team::Home => 0,
            Team::Away => 1,
        }
    }
}

/// Player identifier. Home players are 1-11, away players 12-22.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u16);

impl PlayerId {
    pub fn for_slot(team: Team, slot: usize) -> Self {
        let base = match team {
            Team::Home => 1,
            Team::Away => 1 + ROSTER_SIZE as u16,
        };
        Self(base + slot as u16)
    }

    /// Side this id was issued to
    pub fn team(self) -> Team {
        if usize::from(self.0) <= ROSTER_SIZE {
            Team::Home
        } else {
            Team::Away
        }
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-player ratings (0-100), fixed for the whole match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerAttributes {
    pub pace: u8,
    pub strength: u8,
    pub accuracy: u8,
    pub dribbling: u8,
}

impl PlayerAttributes {
    pub const fn uniform(value: u8) -> Self {
        Self {
            pace: value,
            strength: value,
            accuracy: value,
            dribbling: value,
        }
    }

    fn in_range(&self) -> bool {
        [self.pace, self.strength, self.accuracy, self.dribbling]
            .iter()
            .all(|v| *v <= 100)
    }
}

/// Eleven attribute sets in formation-slot order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster(pub Vec<PlayerAttributes>);

impl Roster {
    pub fn uniform(value: u8) -> Self {
        Self(vec![PlayerAttributes::uniform(value); ROSTER_SIZE])
    }
}

/// Pitch geometry in millimetres
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pitch {
    pub length: i64,
    pub width: i64,
    pub goal_width: i64,
    /// Depth of the net behind each goal line
    pub goal_depth: i64,
}

impl Default for Pitch {
    fn default() -> Self {
        Self {
            length: meters(105),
            width: meters(68),
            goal_width: 7_320,
            goal_depth: meters(2),
        }
    }
}

impl Pitch {
    pub fn center(&self) -> Vec2 {
        Vec2::new(self.length / 2, self.width / 2)
    }

    /// Post-to-post span on the y axis
    pub fn goal_span(&self) -> (i64, i64) {
        let half = self.goal_width / 2;
        let mid = self.width / 2;
        (mid - half, mid + half)
    }

    /// A circle of `radius` at height `y` sits fully between the posts
    pub fn within_posts(&self, y: i64, radius: i64) -> bool {
        let (lo, hi) = self.goal_span();
        y - radius >= lo && y + radius <= hi
    }

    pub fn contains(&self, p: Vec2) -> bool {
        (0..=self.length).contains(&p.x) && (0..=self.width).contains(&p.y)
    }

    pub fn clamp(&self, p: Vec2) -> Vec2 {
        Vec2::new(p.x.clamp(0, self.length), p.y.clamp(0, self.width))
    }

    /// Nearest legal spot for a ball of `radius`: on the field, or in a net
    /// when it is between the posts
    pub fn clamp_ball(&self, p: Vec2, radius: i64) -> Vec2 {
        let y = p.y.clamp(0, self.width);
        let x = if self.within_posts(y, radius) {
            p.x.clamp(-self.goal_depth, self.length + self.goal_depth)
        } else {
            p.x.clamp(0, self.length)
        };
        Vec2::new(x, y)
    }
}

/// Authoritative state of one player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    pub id: PlayerId,
    pub team: Team,
    pub attributes: PlayerAttributes,
    pub position: Vec2,
    pub velocity: Vec2,
    /// Q16 unit vector
    pub facing: Vec2,
    /// Hundredths, `0..=MAX_STAMINA`
    pub stamina: i64,
    /// Point the player is steering toward
    pub target: Option<Vec2>,
    pub sprint_ticks: u32,
    /// Dribble shield from a successful skill move
    pub shield_ticks: u32,
    /// Cards shown this match
    pub cards: u8,

    // Transient, cleared at the start of every tick
    pub is_sliding: bool,
    pub fouls_this_tick: u8,
    /// Spent stamina this tick, so no passive regeneration
    pub exerted: bool,
}

impl PlayerState {
    pub fn new(id: PlayerId, team: Team, attributes: PlayerAttributes, position: Vec2) -> Self {
        let facing = match team {
            Team::Home => Vec2::new(Q16_ONE, 0),
            Team::Away => Vec2::new(-Q16_ONE, 0),
        };
        Self {
            id,
            team,
            attributes,
            position,
            velocity: Vec2::ZERO,
            facing,
            stamina: MAX_STAMINA,
            target: None,
            sprint_ticks: 0,
            shield_ticks: 0,
            cards: 0,
            is_sliding: false,
            fouls_this_tick: 0,
            exerted: false,
        }
    }

    /// Spend stamina, flooring at zero
    pub fn spend(&mut self, amount: i64) {
        self.stamina = (self.stamina - amount).max(0);
        self.exerted = true;
    }
}

/// Ball state. The possessor is a weak reference by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ball {
    pub position: Vec2,
    pub velocity: Vec2,
    pub possessor: Option<PlayerId>,
    /// Most recent possessor, credited with goals
    pub last_possessor: Option<PlayerId>,
    /// Passer who set up the current possessor
    pub assist_candidate: Option<PlayerId>,
    /// Passer of a pass still in flight
    pub pass_from: Option<PlayerId>,
    pub kicked_by: Option<PlayerId>,
    pub kick_cooldown: u32,
}

impl Ball {
    pub fn at(position: Vec2) -> Self {
        Self {
            position,
            velocity: Vec2::ZERO,
            possessor: None,
            last_possessor: None,
            assist_candidate: None,
            pass_from: None,
            kicked_by: None,
            kick_cooldown: 0,
        }
    }

    /// Whether `id` is still barred from touching the ball after kicking it
    pub fn in_kick_cooldown(&self, id: PlayerId) -> bool {
        self.kick_cooldown > 0 && self.kicked_by == Some(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoulClass {
    Collision,
    RecklessTackle,
    DangerousPlay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Card {
    Yellow,
    Red,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchEventKind {
    Goal {
        team: Team,
        scorer: Option<PlayerId>,
        assist: Option<PlayerId>,
        own_goal: bool,
    },
    Pass {
        target: PlayerId,
    },
    Shot {
        power: u8,
        /// Final angle after deviation, centidegrees
        angle: i64,
        /// Launch speed, mm/tick
        speed: i64,
    },
    Tackle {
        target: PlayerId,
        success: bool,
        won_ball: bool,
    },
    Foul {
        victim: PlayerId,
        class: FoulClass,
    },
    Card {
        card: Card,
        ejected: bool,
    },
}

/// One entry of the append-only event log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchEvent {
    pub tick: u64,
    pub actor: Option<PlayerId>,
    #[serde(flatten)]
    pub kind: MatchEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum MatchOutcome {
    FullTime,
    /// `team` dropped below the minimum number of eligible players
    Forfeit { team: Team },
    /// Ended from outside the simulation
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MatchStatus {
    InProgress,
    Finished { outcome: MatchOutcome },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Score {
    pub home: u32,
    pub away: u32,
}

/// Everything needed to start a match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSetup {
    pub match_id: Uuid,
    #[serde(with = "hex::serde")]
    pub seed: Vec<u8>,
    pub home: Roster,
    pub away: Roster,
    #[serde(default)]
    pub config: EngineConfig,
}

impl MatchSetup {
    pub fn validate(&self) -> Result<(), SetupError> {
        if self.seed.is_empty() {
            return Err(SetupError::EmptySeed);
        }
        for (team, roster) in [(Team::Home, &self.home), (Team::Away, &self.away)] {
            if roster.0.len() != ROSTER_SIZE {
                return Err(SetupError::WrongRosterSize {
                    team,
                    size: roster.0.len(),
                });
            }
            if let Some(slot) = roster.0.iter().position(|a| !a.in_range()) {
                return Err(SetupError::AttributeOutOfRange { team, slot });
            }
        }
        self.config.validate().map_err(SetupError::InvalidConfig)
    }

    pub fn roster(&self, team: Team) -> &Roster {
        match team {
            Team::Home => &self.home,
            Team::Away => &self.away,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SetupError {
    #[error("{team:?} roster has {size} players, expected 11")]
    WrongRosterSize { team: Team, size: usize },

    #[error("{team:?} roster slot {slot} has an attribute above 100")]
    AttributeOutOfRange { team: Team, slot: usize },

    #[error("match seed is empty")]
    EmptySeed,

    #[error("invalid engine config: {0}")]
    InvalidConfig(&'static str),
}

/// 4-4-2 kick-off layout for the home side, in per-mille of length/width.
/// Slot 9 is the centre-forward and is placed separately.
const FORMATION_PER_MILLE: [(i64, i64); ROSTER_SIZE] = [
    (50, 500),
    (200, 150),
    (200, 380),
    (200, 620),
    (200, 850),
    (350, 150),
    (350, 380),
    (350, 620),
    (350, 850),
    (0, 0),
    (450, 700),
];
const CENTRE_FORWARD_SLOT: usize = 9;
/// Home centre-forward stands this far behind the centre spot
const KICKOFF_OFFSET: i64 = 600;
/// Away centre-forward waits on the centre circle
const CENTRE_CIRCLE_RADIUS: i64 = 9_150;

/// Kick-off position for a formation slot. Home kicks off.
pub fn kickoff_position(pitch: &Pitch, team: Team, slot: usize) -> Vec2 {
    let center = pitch.center();
    if slot == CENTRE_FORWARD_SLOT {
        return match team {
            Team::Home => Vec2::new(center.x - KICKOFF_OFFSET, center.y),
            Team::Away => Vec2::new(center.x + CENTRE_CIRCLE_RADIUS, center.y),
        };
    }
    let (fx, fy) = FORMATION_PER_MILLE[slot];
    let x = pitch.length * fx / 1000;
    let y = pitch.width * fy / 1000;
    match team {
        Team::Home => Vec2::new(x, y),
        Team::Away => Vec2::new(pitch.length - x, y),
    }
}

/// Authoritative snapshot of one match instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchState {
    pub match_id: Uuid,
    pub tick: u64,
    pub score_home: u32,
    pub score_away: u32,
    pub ball: Ball,
    /// On-field players of both teams, ascending by id
    pub players: Vec<PlayerState>,
    pub ejected: Vec<PlayerId>,
    pub events: Vec<MatchEvent>,
    pub status: MatchStatus,
}

impl MatchState {
    /// Kick-off state for a validated setup
    pub fn new(setup: &MatchSetup) -> Self {
        let pitch = &setup.config.pitch;
        let players = [Team::Home, Team::Away]
            .into_iter()
            .flat_map(|team| {
                setup
                    .roster(team)
                    .0
                    .iter()
                    .enumerate()
                    .map(move |(slot, attributes)| {
                        PlayerState::new(
                            PlayerId::for_slot(team, slot),
                            team,
                            *attributes,
                            kickoff_position(pitch, team, slot),
                        )
                    })
            })
            .collect();

        Self {
            match_id: setup.match_id,
            tick: 0,
            score_home: 0,
            score_away: 0,
            ball: Ball::at(pitch.center()),
            players,
            ejected: Vec::new(),
            events: Vec::new(),
            status: MatchStatus::InProgress,
        }
    }

    pub fn index_of(&self, id: PlayerId) -> Option<usize> {
        self.players.binary_search_by_key(&id, |p| p.id).ok()
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerState> {
        self.index_of(id).map(|i| &self.players[i])
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut PlayerState> {
        self.index_of(id).map(move |i| &mut self.players[i])
    }

    pub fn players_of(&self, team: Team) -> impl Iterator<Item = &PlayerState> {
        self.players.iter().filter(move |p| p.team == team)
    }

    pub fn on_field_count(&self, team: Team) -> usize {
        self.players_of(team).count()
    }

    pub fn possessor(&self) -> Option<&PlayerState> {
        self.ball.possessor.and_then(|id| self.player(id))
    }

    pub fn score(&self) -> Score {
        Score {
            home: self.score_home,
            away: self.score_away,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, MatchStatus::Finished { .. })
    }

    pub fn outcome(&self) -> Option<MatchOutcome> {
        match self.status {
            MatchStatus::Finished { outcome } => Some(outcome),
            MatchStatus::InProgress => None,
        }
    }

    /// Append an event stamped with the tick being executed
    pub(crate) fn record(&mut self, actor: Option<PlayerId>, kind: MatchEventKind) {
        self.events.push(MatchEvent {
            tick: self.tick,
            actor,
            kind,
        });
    }

    pub(crate) fn begin_tick(&mut self) {
        for player in &mut self.players {
            player.is_sliding = false;
            player.fouls_this_tick = 0;
            player.exerted = false;
        }
    }

    /// Hand the ball to `id`, keeping the goal/assist bookkeeping current
    pub(crate) fn give_possession(&mut self, id: PlayerId) {
        let gainer_team = self.player(id).map(|p| p.team);
        let passer_team = self
            .ball
            .pass_from
            .and_then(|passer| self.player(passer))
            .map(|p| p.team);

        self.ball.assist_candidate = match (self.ball.pass_from, passer_team) {
            (Some(passer), Some(team)) if passer != id && Some(team) == gainer_team => {
                Some(passer)
            }
            _ => None,
        };
        self.ball.pass_from = None;
        self.ball.possessor = Some(id);
        self.ball.last_possessor = Some(id);
        self.ball.velocity = Vec2::ZERO;
        self.ball.kicked_by = None;
        self.ball.kick_cooldown = 0;
    }

    /// Take a player off the pitch; they can no longer hold the ball
    pub(crate) fn remove_player(&mut self, id: PlayerId) -> Option<PlayerState> {
        let index = self.index_of(id)?;
        let removed = self.players.remove(index);
        if self.ball.possessor == Some(id) {
            self.ball.possessor = None;
            self.ball.velocity = Vec2::ZERO;
        }
        if self.ball.kicked_by == Some(id) {
            self.ball.kicked_by = None;
            self.ball.kick_cooldown = 0;
        }
        self.ejected.push(id);
        Some(removed)
    }

    /// Ball rides just ahead of its possessor
    pub(crate) fn sync_ball_to_possessor(&mut self, config: &EngineConfig) {
        let Some(carrier) = self.possessor() else {
            return;
        };
        let reach = config.player_radius + config.ball_radius;
        let offset = carrier.facing.scale_q16(reach);
        let position = config.pitch.clamp(carrier.position + offset);
        let velocity = carrier.velocity;
        self.ball.position = position;
        self.ball.velocity = velocity;
    }

    /// Ball back on the centre spot, nobody on it
    pub(crate) fn reset_ball(&mut self, config: &EngineConfig) {
        self.ball = Ball::at(config.pitch.center());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> MatchSetup {
        MatchSetup {
            match_id: Uuid::nil(),
            seed: b"world".to_vec(),
            home: Roster::uniform(60),
            away: Roster::uniform(60),
            config: EngineConfig::default(),
        }
    }

    #[test]
    fn kickoff_state_has_sorted_players_inside_pitch() {
        let setup = setup();
        let state = MatchState::new(&setup);

        assert_eq!(state.players.len(), 2 * ROSTER_SIZE);
        assert!(state.players.windows(2).all(|w| w[0].id < w[1].id));
        assert!(state
            .players
            .iter()
            .all(|p| setup.config.pitch.contains(p.position)));
        assert_eq!(state.on_field_count(Team::Home), 11);
        assert_eq!(state.player(PlayerId(12)).map(|p| p.team), Some(Team::Away));
    }

    #[test]
    fn home_centre_forward_starts_next_to_the_ball() {
        let setup = setup();
        let state = MatchState::new(&setup);
        let striker = state.player(PlayerId(10)).expect("home striker");
        let distance = striker.position.distance(state.ball.position);
        assert!(distance <= setup.config.pickup_radius);
        assert!(distance > setup.config.player_radius + setup.config.ball_radius);
    }

    #[test]
    fn removing_the_possessor_clears_possession() {
        let setup = setup();
        let mut state = MatchState::new(&setup);
        state.give_possession(PlayerId(10));
        assert_eq!(state.ball.possessor, Some(PlayerId(10)));

        let removed = state.remove_player(PlayerId(10));
        assert!(removed.is_some());
        assert_eq!(state.ball.possessor, None);
        assert!(state.player(PlayerId(10)).is_none());
        assert_eq!(state.ejected, vec![PlayerId(10)]);
    }

    #[test]
    fn assist_candidate_requires_a_teammate_pass() {
        let setup = setup();
        let mut state = MatchState::new(&setup);

        state.ball.pass_from = Some(PlayerId(4));
        state.give_possession(PlayerId(7));
        assert_eq!(state.ball.assist_candidate, Some(PlayerId(4)));

        state.ball.pass_from = Some(PlayerId(7));
        state.give_possession(PlayerId(15));
        assert_eq!(state.ball.assist_candidate, None);
    }

    #[test]
    fn setup_validation_catches_bad_rosters() {
        let mut bad = setup();
        bad.home.0.pop();
        assert_eq!(
            bad.validate(),
            Err(SetupError::WrongRosterSize {
                team: Team::Home,
                size: 10
            })
        );

        let mut bad = setup();
        bad.away.0[3].pace = 101;
        assert_eq!(
            bad.validate(),
            Err(SetupError::AttributeOutOfRange {
                team: Team::Away,
                slot: 3
            })
        );

        let mut bad = setup();
        bad.seed.clear();
        assert_eq!(bad.validate(), Err(SetupError::EmptySeed));
    }
}

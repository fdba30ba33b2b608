//! Broadcast payloads built from executed ticks

use serde::Serialize;
use uuid::Uuid;

use crate::ws::protocol::ServerMsg;

use super::engine::TickReport;
use super::fixed::to_meters;
use super::world::{MatchEvent, MatchState, MatchStatus, PlayerId, Score, Team};

/// Turns tick reports into broadcast messages. Every executed tick yields
/// exactly one message, in tick order.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    /// Next tick expected from the engine
    next_tick: u64,
    /// Events carried over from reports that were not broadcast
    carried: Vec<MatchEvent>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Broadcast message for one executed tick
    pub fn build(&mut self, report: &TickReport) -> ServerMsg {
        debug_assert_eq!(report.tick, self.next_tick, "tick reports out of order");
        self.next_tick = report.tick + 1;

        let mut events = std::mem::take(&mut self.carried);
        events.extend(report.events.iter().cloned());
        ServerMsg::Tick {
            tick: report.tick,
            state_hash: report.state_hash,
            events,
        }
    }

    /// Keep a report's events for the next broadcast when this one could not
    /// be delivered
    pub fn carry(&mut self, events: Vec<MatchEvent>) {
        let mut carried = events;
        carried.append(&mut self.carried);
        self.carried = carried;
    }
}

/// Presentation view of a running match, floats allowed
#[derive(Debug, Clone, Serialize)]
pub struct MatchSnapshot {
    pub match_id: Uuid,
    pub tick: u64,
    pub status: MatchStatus,
    pub score: Score,
    pub ball: BallView,
    pub players: Vec<PlayerView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BallView {
    pub x: f64,
    pub y: f64,
    pub possessor: Option<PlayerId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub team: Team,
    pub x: f64,
    pub y: f64,
    /// 0-100
    pub stamina: f64,
    pub cards: u8,
}

impl MatchSnapshot {
    pub fn from_state(state: &MatchState) -> Self {
        Self {
            match_id: state.match_id,
            tick: state.tick,
            status: state.status,
            score: state.score(),
            ball: BallView {
                x: to_meters(state.ball.position.x),
                y: to_meters(state.ball.position.y),
                possessor: state.ball.possessor,
            },
            players: state
                .players
                .iter()
                .map(|p| PlayerView {
                    id: p.id,
                    team: p.team,
                    x: to_meters(p.position.x),
                    y: to_meters(p.position.y),
                    stamina: p.stamina as f64 / 100.0,
                    cards: p.cards,
                })
                .collect(),
        }
    }
}

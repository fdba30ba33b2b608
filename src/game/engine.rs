//! Tick orchestrator
//!
//! `MatchEngine` is the synchronous, single-threaded state machine for one
//! match. It owns the state, the random stream, the pending input buffer and
//! the accepted-input log; nothing is shared with other matches. The async
//! runner and the replay verifier both drive it through `submit` and `step`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::collision::CollisionEngine;
use super::discipline::DisciplineSystem;
use super::hasher::{header_digest, state_hash, InputChain, StateHash, ENGINE_VERSION};
use super::input::{Authenticator, InputLog, PlayerInput};
use super::physics::PhysicsSystem;
use super::rng::RngStream;
use super::validator::{InputRejected, InputValidator, RejectionStats, TickLedger};
use super::world::{
    MatchEvent, MatchOutcome, MatchSetup, MatchState, MatchStatus, PlayerId, Score, SetupError,
};

/// Buffered inputs allowed per player for one tick. At most one of them can
/// execute; the rest only leave room for a fallback when an earlier one fails
/// full validation.
pub const MAX_PENDING_PER_PLAYER_TICK: usize = 4;

/// An input dropped while executing a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub player_id: PlayerId,
    pub tick: u64,
    pub reason: InputRejected,
}

/// Result of one executed tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// The tick that was executed
    pub tick: u64,
    pub state_hash: StateHash,
    /// Events emitted during this tick
    pub events: Vec<MatchEvent>,
    pub rejected: Vec<Rejection>,
    /// Set on the tick that ended the match
    pub outcome: Option<MatchOutcome>,
}

/// What the ledger consumer receives when a match ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchExport {
    pub match_id: Uuid,
    #[serde(with = "hex::serde")]
    pub seed: Vec<u8>,
    pub engine_version: String,
    pub duration_ticks: u64,
    /// Last executed tick; `final_state_hash` is the hash after it
    pub final_tick: u64,
    pub final_state_hash: StateHash,
    pub final_score: Score,
    pub outcome: Option<MatchOutcome>,
}

pub struct MatchEngine<A> {
    setup: MatchSetup,
    state: MatchState,
    rng: RngStream,
    validator: InputValidator<A>,
    ledger: TickLedger,
    /// Inputs waiting for their tick, in arrival order
    pending: BTreeMap<u64, Vec<PlayerInput>>,
    log: InputLog,
    header: [u8; 32],
    chain: InputChain,
    last_hash: StateHash,
    rejections: RejectionStats,
}

impl<A: Authenticator> MatchEngine<A> {
    pub fn new(setup: MatchSetup, authenticator: A) -> Result<Self, SetupError> {
        setup.validate()?;

        let state = MatchState::new(&setup);
        let rng = RngStream::from_seed_bytes(&setup.seed);
        let validator =
            InputValidator::new(authenticator, setup.match_id, setup.config.lookahead_ticks);
        let header = header_digest(&setup);
        let chain = InputChain::new(&header);
        let last_hash = state_hash(&header, &chain, &state, rng.draws());

        Ok(Self {
            setup,
            state,
            rng,
            validator,
            ledger: TickLedger::new(),
            pending: BTreeMap::new(),
            log: InputLog::new(),
            header,
            chain,
            last_hash,
            rejections: RejectionStats::default(),
        })
    }

    /// Buffer an input for its tick after the cheap checks. The full
    /// validation runs when the tick executes.
    pub fn submit(&mut self, input: PlayerInput) -> Result<(), InputRejected> {
        if let Err(reason) = self
            .validator
            .precheck(&input, self.state.tick, &self.ledger)
        {
            self.reject(&input, reason);
            return Err(reason);
        }
        let slot = self.pending.entry(input.tick).or_default();
        let queued = slot.iter().filter(|p| p.player_id == input.player_id).count();
        if queued >= MAX_PENDING_PER_PLAYER_TICK {
            self.reject(&input, InputRejected::OutOfOrder);
            return Err(InputRejected::OutOfOrder);
        }
        slot.push(input);
        Ok(())
    }

    fn reject(&mut self, input: &PlayerInput, reason: InputRejected) {
        self.rejections.record(reason);
        debug!(
            match_id = %self.state.match_id,
            tick = self.state.tick,
            player_id = %input.player_id,
            input_tick = input.tick,
            ?reason,
            "input rejected"
        );
    }

    /// Execute exactly one tick. Returns `None` once the match is over.
    pub fn step(&mut self) -> Option<TickReport> {
        if self.state.is_finished() {
            return None;
        }
        let tick = self.state.tick;
        let config = &self.setup.config;
        self.state.begin_tick();

        // Canonical order: ascending player id, arrival order within a player
        let mut batch = self.pending.remove(&tick).unwrap_or_default();
        batch.sort_by_key(|input| input.player_id);

        let mut actions = Vec::with_capacity(batch.len());
        let mut accepted = Vec::with_capacity(batch.len());
        let mut rejected = Vec::new();
        for input in batch {
            match self
                .validator
                .validate(&input, tick, &self.ledger, &self.state, config)
            {
                Ok(action) => {
                    self.ledger.insert(input.player_id, input.tick);
                    actions.push(action);
                    accepted.push(input);
                }
                Err(reason) => {
                    rejected.push(Rejection {
                        player_id: input.player_id,
                        tick: input.tick,
                        reason,
                    });
                    self.rejections.record(reason);
                    debug!(
                        match_id = %self.state.match_id,
                        tick,
                        player_id = %input.player_id,
                        ?reason,
                        "input rejected"
                    );
                }
            }
        }
        for input in &accepted {
            self.log.push(input.clone());
        }

        let first_event = self.state.events.len();
        PhysicsSystem::apply_actions(&mut self.state, &actions, &mut self.rng, config);
        PhysicsSystem::integrate(&mut self.state, config);
        PhysicsSystem::assign_loose_ball(&mut self.state, config);
        self.state.sync_ball_to_possessor(config);
        CollisionEngine::resolve(&mut self.state, config);

        if let Some(team) = DisciplineSystem::forfeiting_team(&self.state, config) {
            info!(match_id = %self.state.match_id, tick, ?team, "team below minimum, match forfeited");
            self.state.status = MatchStatus::Finished {
                outcome: MatchOutcome::Forfeit { team },
            };
        } else if tick + 1 >= config.duration_ticks {
            info!(
                match_id = %self.state.match_id,
                tick,
                home = self.state.score_home,
                away = self.state.score_away,
                "full time"
            );
            self.state.status = MatchStatus::Finished {
                outcome: MatchOutcome::FullTime,
            };
        }

        self.state.tick = tick + 1;
        self.chain.absorb(tick, &accepted);
        self.last_hash = state_hash(&self.header, &self.chain, &self.state, self.rng.draws());

        Some(TickReport {
            tick,
            state_hash: self.last_hash,
            events: self.state.events[first_event..].to_vec(),
            rejected,
            outcome: self.state.outcome(),
        })
    }

    /// Step until the match ends or `tick` has executed
    pub fn run_through(&mut self, tick: u64) -> Vec<TickReport> {
        let mut reports = Vec::new();
        while self.state.tick <= tick {
            match self.step() {
                Some(report) => reports.push(report),
                None => break,
            }
        }
        reports
    }

    /// End the match from outside the simulation. The last tick hash stands.
    pub fn terminate(&mut self) {
        if !self.state.is_finished() {
            info!(match_id = %self.state.match_id, tick = self.state.tick, "match terminated");
            self.state.status = MatchStatus::Finished {
                outcome: MatchOutcome::Terminated,
            };
        }
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn setup(&self) -> &MatchSetup {
        &self.setup
    }

    pub fn match_id(&self) -> Uuid {
        self.setup.match_id
    }

    /// Next tick to execute
    pub fn tick(&self) -> u64 {
        self.state.tick
    }

    pub fn state_hash(&self) -> StateHash {
        self.last_hash
    }

    pub fn log(&self) -> &InputLog {
        &self.log
    }

    pub fn rejections(&self) -> &RejectionStats {
        &self.rejections
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    pub fn export(&self) -> MatchExport {
        MatchExport {
            match_id: self.setup.match_id,
            seed: self.setup.seed.clone(),
            engine_version: ENGINE_VERSION.to_string(),
            duration_ticks: self.setup.config.duration_ticks,
            final_tick: self.state.tick.saturating_sub(1),
            final_state_hash: self.last_hash,
            final_score: self.state.score(),
            outcome: self.state.outcome(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::input::{ActionParams, TrustedLog};
    use crate::game::tuning::EngineConfig;
    use crate::game::world::Roster;

    fn setup(duration: u64) -> MatchSetup {
        MatchSetup {
            match_id: Uuid::new_v4(),
            seed: b"engine".to_vec(),
            home: Roster::uniform(70),
            away: Roster::uniform(70),
            config: EngineConfig {
                duration_ticks: duration,
                ..EngineConfig::default()
            },
        }
    }

    #[test]
    fn tick_advances_by_one_until_full_time() {
        let mut engine = MatchEngine::new(setup(5), TrustedLog).expect("valid setup");
        let ticks: Vec<u64> = std::iter::from_fn(|| engine.step()).map(|r| r.tick).collect();
        assert_eq!(ticks, vec![0, 1, 2, 3, 4]);
        assert_eq!(engine.state().outcome(), Some(MatchOutcome::FullTime));
        assert!(engine.step().is_none());
        assert_eq!(engine.export().final_tick, 4);
    }

    #[test]
    fn striker_takes_the_kickoff() {
        let mut engine = MatchEngine::new(setup(10), TrustedLog).expect("valid setup");
        engine.step();
        assert_eq!(engine.state().ball.possessor, Some(PlayerId(10)));
    }

    #[test]
    fn inputs_wait_for_their_tick() {
        let mut engine = MatchEngine::new(setup(20), TrustedLog).expect("valid setup");
        let sprint = PlayerInput::new(PlayerId(4), 3, "sprint", ActionParams::default());
        assert_eq!(engine.submit(sprint), Ok(()));

        engine.run_through(2);
        assert!(engine.log().is_empty());
        let report = engine.step().expect("tick 3 runs");
        assert_eq!(report.tick, 3);
        assert_eq!(engine.log().len(), 1);
        assert!(engine.state().player(PlayerId(4)).is_some_and(|p| p.sprint_ticks > 0));
    }

    #[test]
    fn second_input_for_the_same_tick_is_out_of_order() {
        let mut engine = MatchEngine::new(setup(20), TrustedLog).expect("valid setup");
        let first = PlayerInput::new(PlayerId(4), 2, "sprint", ActionParams::default());
        let second = PlayerInput::new(PlayerId(4), 2, "skill", ActionParams::default());
        assert!(engine.submit(first).is_ok());
        assert!(engine.submit(second).is_ok());

        let reports = engine.run_through(2);
        let last = reports.last().expect("tick 2 report");
        assert_eq!(
            last.rejected,
            vec![Rejection {
                player_id: PlayerId(4),
                tick: 2,
                reason: InputRejected::OutOfOrder
            }]
        );
        assert_eq!(engine.rejections().count(InputRejected::OutOfOrder), 1);
    }

    #[test]
    fn buffered_inputs_per_player_and_tick_are_capped() {
        let mut engine = MatchEngine::new(setup(20), TrustedLog).expect("valid setup");
        let sprint =
            |id: u16, tick: u64| PlayerInput::new(PlayerId(id), tick, "sprint", ActionParams::default());
        for _ in 0..MAX_PENDING_PER_PLAYER_TICK {
            assert!(engine.submit(sprint(4, 2)).is_ok());
        }
        assert_eq!(engine.submit(sprint(4, 2)), Err(InputRejected::OutOfOrder));
        assert_eq!(engine.rejections().count(InputRejected::OutOfOrder), 1);

        // Other players and other ticks have their own allowance
        assert!(engine.submit(sprint(5, 2)).is_ok());
        assert!(engine.submit(sprint(4, 3)).is_ok());

        let reports = engine.run_through(2);
        let last = reports.last().expect("tick 2 report");
        assert_eq!(last.rejected.len(), MAX_PENDING_PER_PLAYER_TICK - 1);
        assert_eq!(engine.log().len(), 2);
    }

    #[test]
    fn late_input_is_rejected_at_submit() {
        let mut engine = MatchEngine::new(setup(20), TrustedLog).expect("valid setup");
        engine.run_through(4);
        let late = PlayerInput::new(PlayerId(4), 2, "sprint", ActionParams::default());
        assert_eq!(engine.submit(late), Err(InputRejected::OutOfOrder));
        let far = PlayerInput::new(PlayerId(4), 100, "sprint", ActionParams::default());
        assert_eq!(engine.submit(far), Err(InputRejected::FutureInput));
    }

    #[test]
    fn terminate_keeps_the_last_hash() {
        let mut engine = MatchEngine::new(setup(100), TrustedLog).expect("valid setup");
        engine.run_through(9);
        let hash = engine.state_hash();
        engine.terminate();
        assert!(engine.step().is_none());
        let export = engine.export();
        assert_eq!(export.final_state_hash, hash);
        assert_eq!(export.final_tick, 9);
        assert_eq!(export.outcome, Some(MatchOutcome::Terminated));
    }

    #[test]
    fn invalid_setup_is_refused() {
        let mut bad = setup(10);
        bad.away.0.truncate(9);
        assert!(matches!(
            MatchEngine::new(bad, TrustedLog),
            Err(SetupError::WrongRosterSize { .. })
        ));
    }
}

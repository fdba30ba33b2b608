//! Input validation (anti-cheat boundary)
//!
//! Six checks in fixed order, short-circuiting on the first failure:
//! authentication, per-player ordering, lookahead, action name, parameter
//! shape/bounds, and feasibility against the current state. Nothing that
//! fails here can reach the resolver.

use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use super::fixed::{Vec2, FULL_TURN_CD};
use super::input::{Action, ActionKind, ActionParams, Authenticator, PlayerInput, ValidatedInput};
use super::tuning::EngineConfig;
use super::world::{MatchState, PlayerId};

/// Why an input was dropped. Never fatal, never visible to other players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum InputRejected {
    #[error("authentication tag does not verify")]
    BadAuth,

    #[error("tick is not after the player's last accepted tick")]
    OutOfOrder,

    #[error("tick is beyond the lookahead window")]
    FutureInput,

    #[error("unknown action")]
    UnknownAction,

    #[error("action parameters missing or out of bounds")]
    BadParams,

    #[error("action is not possible in the current state")]
    Infeasible,
}

/// Last accepted tick per player
pub type TickLedger = BTreeMap<PlayerId, u64>;

/// Per-reason rejection counters for the external anti-cheat scorer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RejectionStats {
    counts: BTreeMap<InputRejected, u64>,
}

impl RejectionStats {
    pub fn record(&mut self, reason: InputRejected) {
        *self.counts.entry(reason).or_insert(0) += 1;
    }

    pub fn count(&self, reason: InputRejected) -> u64 {
        self.counts.get(&reason).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

pub struct InputValidator<A> {
    authenticator: A,
    match_id: Uuid,
    lookahead: u64,
}

impl<A: Authenticator> InputValidator<A> {
    pub fn new(authenticator: A, match_id: Uuid, lookahead: u64) -> Self {
        Self {
            authenticator,
            match_id,
            lookahead,
        }
    }

    /// Checks 1-3, cheap enough to run when the input arrives
    pub fn precheck(
        &self,
        input: &PlayerInput,
        current_tick: u64,
        ledger: &TickLedger,
    ) -> Result<(), InputRejected> {
        if !self.authenticator.verify(self.match_id, input) {
            return Err(InputRejected::BadAuth);
        }
        let behind_ledger = ledger
            .get(&input.player_id)
            .is_some_and(|last| input.tick <= *last);
        if behind_ledger || input.tick < current_tick {
            return Err(InputRejected::OutOfOrder);
        }
        if input.tick > current_tick.saturating_add(self.lookahead) {
            return Err(InputRejected::FutureInput);
        }
        Ok(())
    }

    /// All six checks against the state the input will act on
    pub fn validate(
        &self,
        input: &PlayerInput,
        current_tick: u64,
        ledger: &TickLedger,
        state: &MatchState,
        config: &EngineConfig,
    ) -> Result<ValidatedInput, InputRejected> {
        self.precheck(input, current_tick, ledger)?;
        let kind = ActionKind::parse(&input.action).ok_or(InputRejected::UnknownAction)?;
        let action = parse_params(kind, &input.params, config)?;
        check_feasible(input.player_id, action, state, config)?;
        Ok(ValidatedInput {
            player_id: input.player_id,
            tick: input.tick,
            action,
        })
    }
}

/// Which optional fields a variant declares
struct Shape {
    xy: bool,
    target: bool,
    shot: bool,
}

impl Shape {
    fn of(kind: ActionKind) -> Self {
        let (xy, target, shot) = match kind {
            ActionKind::Move => (true, false, false),
            ActionKind::Pass | ActionKind::Tackle => (false, true, false),
            ActionKind::Shoot => (false, false, true),
            ActionKind::Sprint | ActionKind::Skill => (false, false, false),
        };
        Self { xy, target, shot }
    }

    fn matches(&self, params: &ActionParams) -> bool {
        params.x.is_some() == self.xy
            && params.y.is_some() == self.xy
            && params.target.is_some() == self.target
            && params.power.is_some() == self.shot
            && params.angle.is_some() == self.shot
    }
}

fn parse_params(
    kind: ActionKind,
    params: &ActionParams,
    config: &EngineConfig,
) -> Result<Action, InputRejected> {
    if !Shape::of(kind).matches(params) {
        return Err(InputRejected::BadParams);
    }
    let pitch = &config.pitch;
    let action = match kind {
        ActionKind::Move => {
            let (Some(x), Some(y)) = (params.x, params.y) else {
                return Err(InputRejected::BadParams);
            };
            if !(0..=pitch.length).contains(&x) || !(0..=pitch.width).contains(&y) {
                return Err(InputRejected::BadParams);
            }
            Action::Move {
                target: Vec2::new(x, y),
            }
        }
        ActionKind::Pass => Action::Pass {
            target: player_param(params.target)?,
        },
        ActionKind::Tackle => Action::Tackle {
            target: player_param(params.target)?,
        },
        ActionKind::Shoot => {
            let (Some(power), Some(angle)) = (params.power, params.angle) else {
                return Err(InputRejected::BadParams);
            };
            if !(0..=100).contains(&power) || !(0..FULL_TURN_CD).contains(&angle) {
                return Err(InputRejected::BadParams);
            }
            Action::Shoot {
                power: power as u8,
                angle,
            }
        }
        ActionKind::Sprint => Action::Sprint,
        ActionKind::Skill => Action::Skill,
    };
    Ok(action)
}

fn player_param(raw: Option<i64>) -> Result<PlayerId, InputRejected> {
    raw.and_then(|v| u16::try_from(v).ok())
        .map(PlayerId)
        .ok_or(InputRejected::BadParams)
}

fn check_feasible(
    id: PlayerId,
    action: Action,
    state: &MatchState,
    config: &EngineConfig,
) -> Result<(), InputRejected> {
    let Some(player) = state.player(id) else {
        return Err(InputRejected::Infeasible);
    };
    let has_ball = state.ball.possessor == Some(id);

    let feasible = match action {
        Action::Move { .. } => true,
        Action::Pass { target } => {
            has_ball
                && target != id
                && state
                    .player(target)
                    .is_some_and(|mate| mate.team == player.team)
        }
        Action::Shoot { .. } => has_ball && player.stamina >= config.shot_stamina_floor,
        Action::Tackle { target } => state.player(target).is_some_and(|victim| {
            victim.team != player.team
                && player.position.distance_sq(victim.position)
                    <= (config.tackle_radius as u64).pow(2)
        }),
        Action::Sprint => player.stamina >= config.sprint_cost,
        Action::Skill => has_ball && player.stamina >= config.skill_cost,
    };

    if feasible {
        Ok(())
    } else {
        Err(InputRejected::Infeasible)
    }
}

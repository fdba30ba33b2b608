//! Canonical encoding and state hashing
//!
//! The per-tick fingerprint is
//! `SHA-256(domain ‖ header ‖ input chain ‖ canonical state)`:
//!
//! - the header pins engine version, seed, duration, rosters and tuning;
//! - the input chain is a rolling digest folded once per executed tick over
//!   the inputs accepted at that tick, so once two logs diverge their chains
//!   never meet again;
//! - the canonical state covers score, ball and every on-field player.
//!
//! Everything is fixed-width little-endian integers, length-prefixed byte
//! strings and tagged optionals. No floats, no maps, no platform formatting.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use super::fixed::Vec2;
use super::input::PlayerInput;
use super::tuning::EngineConfig;
use super::world::{MatchOutcome, MatchSetup, MatchState, MatchStatus, Pitch, PlayerId};

/// Bumped whenever simulation or encoding changes would alter hashes
pub const ENGINE_VERSION: &str = "pitch-engine/1.1.0";

const STATE_DOMAIN: &[u8] = b"PITCH_MATCH_STATE_V1";
const HEADER_DOMAIN: &[u8] = b"PITCH_MATCH_HEADER_V1";
const INPUT_DOMAIN: &[u8] = b"PITCH_MATCH_INPUTS_V1";

/// 256-bit digest, shown as lowercase hex
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StateHash(pub [u8; 32]);

impl StateHash {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for StateHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for StateHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateHash({})", self.to_hex())
    }
}

impl FromStr for StateHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 32];
        hex::decode_to_slice(s, &mut out)?;
        Ok(Self(out))
    }
}

impl Serialize for StateHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for StateHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Append-only canonical byte writer
#[derive(Debug, Default)]
pub struct CanonicalEncoder {
    buf: Vec<u8>,
}

impl CanonicalEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_bool(&mut self, v: bool) {
        self.put_u8(u8::from(v));
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Length-prefixed bytes
    pub fn put_bytes(&mut self, v: &[u8]) {
        self.put_u64(v.len() as u64);
        self.buf.extend_from_slice(v);
    }

    pub fn put_str(&mut self, v: &str) {
        self.put_bytes(v.as_bytes());
    }

    pub fn put_opt_i64(&mut self, v: Option<i64>) {
        match v {
            Some(v) => {
                self.put_u8(1);
                self.put_i64(v);
            }
            None => self.put_u8(0),
        }
    }

    pub fn put_player(&mut self, id: PlayerId) {
        self.put_u16(id.0);
    }

    pub fn put_opt_player(&mut self, id: Option<PlayerId>) {
        self.put_opt_i64(id.map(|id| i64::from(id.0)));
    }

    pub fn put_vec2(&mut self, v: Vec2) {
        self.put_i64(v.x);
        self.put_i64(v.y);
    }

    pub fn put_opt_vec2(&mut self, v: Option<Vec2>) {
        match v {
            Some(v) => {
                self.put_u8(1);
                self.put_vec2(v);
            }
            None => self.put_u8(0),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Digest of everything fixed at kick-off. The match id is left out so the
/// same seed, rosters and log verify under any id.
pub fn header_digest(setup: &MatchSetup) -> [u8; 32] {
    let mut enc = CanonicalEncoder::new();
    enc.put_str(ENGINE_VERSION);
    enc.put_bytes(&setup.seed);
    enc.put_u64(setup.config.duration_ticks);
    for roster in [&setup.home, &setup.away] {
        enc.put_u64(roster.0.len() as u64);
        for a in &roster.0 {
            enc.put_u8(a.pace);
            enc.put_u8(a.strength);
            enc.put_u8(a.accuracy);
            enc.put_u8(a.dribbling);
        }
    }
    put_tuning(&mut enc, &setup.config);

    let mut hasher = Sha256::new();
    hasher.update(HEADER_DOMAIN);
    hasher.update(enc.as_bytes());
    hasher.finalize().into()
}

/// Every tuning value in declaration order. The exhaustive destructure makes a
/// new field a compile error here until it is encoded.
fn put_tuning(enc: &mut CanonicalEncoder, config: &EngineConfig) {
    let EngineConfig {
        pitch,
        duration_ticks,
        lookahead_ticks,
        min_players,
        player_radius,
        ball_radius,
        pickup_radius,
        control_speed,
        tackle_radius,
        base_speed,
        pace_speed_bonus,
        player_friction_q16,
        arrival_tolerance,
        stamina_regen,
        pass_cost,
        shot_cost,
        tackle_cost,
        shot_stamina_floor,
        sprint_cost,
        sprint_drain,
        sprint_ticks,
        sprint_multiplier_q16,
        skill_cost,
        skill_shield_ticks,
        skill_base_q16,
        skill_per_dribbling_q16,
        ball_friction_q16,
        ball_restitution_q16,
        deflection_restitution_q16,
        ball_stop_speed,
        kick_cooldown_ticks,
        pass_travel_ticks,
        pass_max_speed,
        pass_max_deviation_cd,
        shot_max_deviation_cd,
        shot_speed_per_power,
        tackle_base_q16,
        tackle_per_strength_q16,
        tackle_floor_q16,
        tackle_cap_q16,
        shield_tackle_penalty_q16,
        tackle_foul_chance_q16,
        player_restitution_q16,
        momentum_cap_q16,
        separation_passes,
        separation_epsilon,
        foul_force_threshold,
        reckless_force,
        dangerous_force,
        from_behind_cos_q16,
        from_behind_multiplier_q16,
        cards_to_eject,
    } = config;
    let Pitch {
        length,
        width,
        goal_width,
        goal_depth,
    } = pitch;

    for v in [length, width, goal_width, goal_depth] {
        enc.put_i64(*v);
    }
    enc.put_u64(*duration_ticks);
    enc.put_u64(*lookahead_ticks);
    enc.put_u64(*min_players as u64);
    for v in [
        player_radius,
        ball_radius,
        pickup_radius,
        control_speed,
        tackle_radius,
        base_speed,
        pace_speed_bonus,
        player_friction_q16,
        arrival_tolerance,
        stamina_regen,
        pass_cost,
        shot_cost,
        tackle_cost,
        shot_stamina_floor,
        sprint_cost,
        sprint_drain,
    ] {
        enc.put_i64(*v);
    }
    enc.put_u32(*sprint_ticks);
    enc.put_i64(*sprint_multiplier_q16);
    enc.put_i64(*skill_cost);
    enc.put_u32(*skill_shield_ticks);
    for v in [
        skill_base_q16,
        skill_per_dribbling_q16,
        ball_friction_q16,
        ball_restitution_q16,
        deflection_restitution_q16,
        ball_stop_speed,
    ] {
        enc.put_i64(*v);
    }
    enc.put_u32(*kick_cooldown_ticks);
    enc.put_u32(*pass_travel_ticks);
    for v in [
        pass_max_speed,
        pass_max_deviation_cd,
        shot_max_deviation_cd,
        shot_speed_per_power,
        tackle_base_q16,
        tackle_per_strength_q16,
        tackle_floor_q16,
        tackle_cap_q16,
        shield_tackle_penalty_q16,
        tackle_foul_chance_q16,
        player_restitution_q16,
        momentum_cap_q16,
    ] {
        enc.put_i64(*v);
    }
    enc.put_u32(*separation_passes);
    for v in [
        separation_epsilon,
        foul_force_threshold,
        reckless_force,
        dangerous_force,
        from_behind_cos_q16,
        from_behind_multiplier_q16,
    ] {
        enc.put_i64(*v);
    }
    enc.put_u8(*cards_to_eject);
}

/// Rolling digest over accepted inputs, folded once per tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputChain {
    digest: [u8; 32],
}

impl InputChain {
    pub fn new(header: &[u8; 32]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(INPUT_DOMAIN);
        hasher.update(header);
        Self {
            digest: hasher.finalize().into(),
        }
    }

    /// Fold the inputs accepted while executing `tick`
    pub fn absorb(&mut self, tick: u64, accepted: &[PlayerInput]) {
        let mut enc = CanonicalEncoder::new();
        enc.put_u64(tick);
        enc.put_u64(accepted.len() as u64);
        for input in accepted {
            input.encode_logged(&mut enc);
        }

        let mut hasher = Sha256::new();
        hasher.update(self.digest);
        hasher.update(enc.as_bytes());
        self.digest = hasher.finalize().into();
    }

    pub fn digest(&self) -> &[u8; 32] {
        &self.digest
    }
}

fn encode_status(enc: &mut CanonicalEncoder, status: MatchStatus) {
    match status {
        MatchStatus::InProgress => enc.put_u8(0),
        MatchStatus::Finished { outcome } => {
            enc.put_u8(1);
            match outcome {
                MatchOutcome::FullTime => enc.put_u8(0),
                MatchOutcome::Forfeit { team } => {
                    enc.put_u8(1);
                    enc.put_u8(team.code());
                }
                MatchOutcome::Terminated => enc.put_u8(2),
            }
        }
    }
}

/// Canonical bytes of the simulated state
pub fn encode_state(state: &MatchState, rng_draws: u64) -> Vec<u8> {
    let mut enc = CanonicalEncoder::new();
    enc.put_u64(state.tick);
    encode_status(&mut enc, state.status);
    enc.put_u32(state.score_home);
    enc.put_u32(state.score_away);
    enc.put_u64(rng_draws);
    enc.put_u64(state.events.len() as u64);

    let ball = &state.ball;
    enc.put_vec2(ball.position);
    enc.put_vec2(ball.velocity);
    enc.put_opt_player(ball.possessor);
    enc.put_opt_player(ball.last_possessor);
    enc.put_opt_player(ball.assist_candidate);
    enc.put_opt_player(ball.pass_from);
    enc.put_opt_player(ball.kicked_by);
    enc.put_u32(ball.kick_cooldown);

    enc.put_u64(state.players.len() as u64);
    for p in &state.players {
        enc.put_player(p.id);
        enc.put_u8(p.team.code());
        enc.put_vec2(p.position);
        enc.put_vec2(p.velocity);
        enc.put_vec2(p.facing);
        enc.put_i64(p.stamina);
        enc.put_opt_vec2(p.target);
        enc.put_u32(p.sprint_ticks);
        enc.put_u32(p.shield_ticks);
        enc.put_u8(p.cards);
        enc.put_bool(p.is_sliding);
    }

    enc.put_u64(state.ejected.len() as u64);
    for id in &state.ejected {
        enc.put_player(*id);
    }
    enc.into_bytes()
}

/// Fingerprint of a match after a tick
pub fn state_hash(
    header: &[u8; 32],
    chain: &InputChain,
    state: &MatchState,
    rng_draws: u64,
) -> StateHash {
    let mut hasher = Sha256::new();
    hasher.update(STATE_DOMAIN);
    hasher.update(header);
    hasher.update(chain.digest());
    hasher.update(encode_state(state, rng_draws));
    StateHash(hasher.finalize().into())
}

/// Digest of arbitrary bytes under a domain separator
pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> StateHash {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(data);
    StateHash(hasher.finalize().into())
}

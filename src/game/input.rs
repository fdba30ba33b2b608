//! Player input: untrusted wire form, typed actions, authentication and the
//! accepted-input log

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use super::fixed::Vec2;
use super::hasher::CanonicalEncoder;
use super::world::PlayerId;

type HmacSha256 = Hmac<Sha256>;

/// Optional action parameters as they arrive on the wire. Which fields are
/// required depends on the action; the validator enforces the shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionParams {
    /// MOVE target, millimetres
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<i64>,
    /// PASS / TACKLE target player id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<i64>,
    /// SHOOT power, 0-100
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<i64>,
    /// SHOOT angle, centidegrees in [0, 36000)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle: Option<i64>,
}

/// Untrusted input from a client, retained verbatim once accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInput {
    pub player_id: PlayerId,
    pub tick: u64,
    pub action: String,
    #[serde(default)]
    pub params: ActionParams,
    /// Hex HMAC-SHA256 over the canonical body
    #[serde(default)]
    pub auth_tag: String,
}

impl PlayerInput {
    pub fn new(player_id: PlayerId, tick: u64, action: &str, params: ActionParams) -> Self {
        Self {
            player_id,
            tick,
            action: action.to_string(),
            params,
            auth_tag: String::new(),
        }
    }

    /// Bytes covered by the auth tag
    pub fn encode_body(&self, enc: &mut CanonicalEncoder) {
        enc.put_player(self.player_id);
        enc.put_u64(self.tick);
        enc.put_str(&self.action);
        enc.put_opt_i64(self.params.x);
        enc.put_opt_i64(self.params.y);
        enc.put_opt_i64(self.params.target);
        enc.put_opt_i64(self.params.power);
        enc.put_opt_i64(self.params.angle);
    }

    /// Body plus tag, as folded into the input chain
    pub fn encode_logged(&self, enc: &mut CanonicalEncoder) {
        self.encode_body(enc);
        enc.put_str(&self.auth_tag);
    }

    fn mac_message(&self, match_id: Uuid) -> Vec<u8> {
        let mut enc = CanonicalEncoder::new();
        enc.put_bytes(match_id.as_bytes());
        self.encode_body(&mut enc);
        enc.into_bytes()
    }

    /// Attach an auth tag computed with the player's session key
    pub fn signed(mut self, key: &[u8], match_id: Uuid) -> Self {
        self.auth_tag = sign_input(key, match_id, &self);
        self
    }
}

/// Hex HMAC-SHA256 tag for an input
pub fn sign_input(key: &[u8], match_id: Uuid, input: &PlayerInput) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(&input.mac_message(match_id));
    hex::encode(mac.finalize().into_bytes())
}

/// Action names understood by the validator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Move,
    Pass,
    Shoot,
    Tackle,
    Sprint,
    Skill,
}

impl ActionKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "move" => Some(Self::Move),
            "pass" => Some(Self::Pass),
            "shoot" => Some(Self::Shoot),
            "tackle" => Some(Self::Tackle),
            "sprint" => Some(Self::Sprint),
            "skill" => Some(Self::Skill),
            _ => None,
        }
    }
}

/// Shape-checked, bounds-checked action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Move { target: Vec2 },
    Pass { target: PlayerId },
    Shoot { power: u8, angle: i64 },
    Tackle { target: PlayerId },
    Sprint,
    Skill,
}

/// An input that passed every check, with its decoded action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedInput {
    pub player_id: PlayerId,
    pub tick: u64,
    pub action: Action,
}

/// Checks an input's auth tag against the claimed player identity
pub trait Authenticator: Send + Sync {
    fn verify(&self, match_id: Uuid, input: &PlayerInput) -> bool;
}

/// Per-player session keys handed over by the identity layer
#[derive(Debug, Clone, Default)]
pub struct HmacAuthenticator {
    keys: BTreeMap<PlayerId, Vec<u8>>,
}

impl HmacAuthenticator {
    pub fn new(keys: BTreeMap<PlayerId, Vec<u8>>) -> Self {
        Self { keys }
    }

    pub fn insert(&mut self, player_id: PlayerId, key: Vec<u8>) {
        self.keys.insert(player_id, key);
    }

    pub fn knows(&self, player_id: PlayerId) -> bool {
        self.keys.contains_key(&player_id)
    }
}

impl Authenticator for HmacAuthenticator {
    fn verify(&self, match_id: Uuid, input: &PlayerInput) -> bool {
        let Some(key) = self.keys.get(&input.player_id) else {
            return false;
        };
        let Ok(tag) = hex::decode(&input.auth_tag) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
            return false;
        };
        mac.update(&input.mac_message(match_id));
        mac.verify_slice(&tag).is_ok()
    }
}

/// Accepts every tag. For replaying logs that were authenticated when they
/// were recorded, where the verifier holds no session keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustedLog;

impl Authenticator for TrustedLog {
    fn verify(&self, _match_id: Uuid, _input: &PlayerInput) -> bool {
        true
    }
}

impl<A: Authenticator + ?Sized> Authenticator for std::sync::Arc<A> {
    fn verify(&self, match_id: Uuid, input: &PlayerInput) -> bool {
        (**self).verify(match_id, input)
    }
}

/// Ordered, append-only record of accepted inputs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputLog {
    entries: Vec<PlayerInput>,
}

impl InputLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<PlayerInput>) -> Self {
        Self { entries }
    }

    pub(crate) fn push(&mut self, input: PlayerInput) {
        self.entries.push(input);
    }

    pub fn entries(&self) -> &[PlayerInput] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut Vec<PlayerInput> {
        &mut self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries tagged at or before `tick`
    pub fn truncated(&self, tick: u64) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|input| input.tick <= tick)
                .cloned()
                .collect(),
        }
    }

    /// Entries grouped by tick, in log order within each tick
    pub fn by_tick(&self) -> BTreeMap<u64, Vec<PlayerInput>> {
        let mut grouped: BTreeMap<u64, Vec<PlayerInput>> = BTreeMap::new();
        for input in &self.entries {
            grouped.entry(input.tick).or_default().push(input.clone());
        }
        grouped
    }
}

//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::engine::MatchExport;
use crate::game::hasher::StateHash;
use crate::game::input::PlayerInput;
use crate::game::world::MatchEvent;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Signed player action for a tick
    Input {
        input: PlayerInput,
    },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Sent once after the upgrade
    Welcome {
        match_id: Uuid,
        /// Next tick the match will execute
        tick: u64,
        server_time: u64,
    },

    /// Per-tick broadcast, strictly in tick order
    Tick {
        tick: u64,
        state_hash: StateHash,
        /// Events since the previous broadcast
        events: Vec<MatchEvent>,
    },

    /// Pong response to ping
    Pong {
        t: u64,
        server_time: u64,
    },

    /// Error message
    Error {
        code: String,
        message: String,
    },

    /// Final message of a match
    MatchEnd {
        export: MatchExport,
    },
}

//! Game simulation modules
//!
//! Everything below `engine` is synchronous and deterministic: integer state,
//! one seeded random stream, canonical player order. `r#match` is the only
//! module that touches the async runtime.

pub mod collision;
pub mod discipline;
pub mod engine;
pub mod fixed;
pub mod hasher;
pub mod input;
pub mod r#match;
pub mod physics;
pub mod replay;
pub mod rng;
pub mod snapshot;
pub mod tuning;
pub mod validator;
pub mod world;

pub use engine::{MatchEngine, MatchExport, TickReport};
pub use hasher::StateHash;
pub use input::{sign_input, ActionParams, HmacAuthenticator, InputLog, PlayerInput, TrustedLog};
pub use r#match::{FinishedMatch, GameMatch, MatchHandle, MatchRegistry};
pub use replay::{build_state_hash, replay, verify, verify_trace, Verification};
pub use tuning::{EngineConfig, GameMode};
pub use validator::InputRejected;
pub use world::{MatchOutcome, MatchSetup, PlayerId, Roster, Team};

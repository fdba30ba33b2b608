//! Pitch Match Server - deterministic, server-authoritative match simulation
//!
//! The `game` module is the engine: fixed-point physics, seeded randomness,
//! input validation and a rolling state hash that lets anyone holding the
//! setup and the input log re-derive every tick. The remaining modules wrap it
//! in an axum service: WebSocket input and tick broadcasts, match lifecycle
//! routes and replay verification.

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod util;
pub mod ws;

//! WebSocket transport for live matches

pub mod handler;
pub mod protocol;

//! Time utilities for the match runner

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Simulation rate. The engine itself counts ticks, never wall time.
pub const SIMULATION_TPS: u32 = 60;
pub const TICK_DURATION_MICROS: u64 = 1_000_000 / SIMULATION_TPS as u64;

/// Wall-clock interval between ticks
pub fn tick_duration() -> Duration {
    Duration::from_micros(TICK_DURATION_MICROS)
}

/// Wall-clock length of a match of `ticks` ticks
pub fn match_length(ticks: u64) -> Duration {
    Duration::from_micros(ticks.saturating_mul(TICK_DURATION_MICROS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixty_hertz() {
        assert_eq!(tick_duration(), Duration::from_micros(16_666));
        assert_eq!(match_length(60 * 60).as_secs(), 59);
    }
}

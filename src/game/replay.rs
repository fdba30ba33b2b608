//! Replay and verification
//!
//! Anyone holding the setup and the accepted-input log can rebuild the
//! per-tick hash trace. Replays run on an owned copy of the log and touch no
//! live match, so they can run anywhere, including a blocking thread.

use serde::{Deserialize, Serialize};

use super::engine::MatchEngine;
use super::hasher::StateHash;
use super::input::{Authenticator, InputLog, TrustedLog};
use super::world::{MatchSetup, SetupError};

/// Outcome of comparing a replay against a reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Verification {
    Match,
    Mismatch {
        /// Known only when a per-tick reference trace was supplied
        first_diverging_tick: Option<u64>,
    },
}

impl Verification {
    pub fn is_match(&self) -> bool {
        matches!(self, Verification::Match)
    }
}

/// Step a fresh engine from tick 0 through `through_tick`, or until the match
/// ends if that comes first, handing each tick's hash to `on_tick`. Each
/// logged input is submitted at its own tick.
fn drive<A: Authenticator>(
    setup: &MatchSetup,
    log: &InputLog,
    through_tick: u64,
    authenticator: A,
    mut on_tick: impl FnMut(StateHash),
) -> Result<(), SetupError> {
    let mut engine = MatchEngine::new(setup.clone(), authenticator)?;
    let mut by_tick = log.by_tick();

    while engine.tick() <= through_tick {
        if let Some(inputs) = by_tick.remove(&engine.tick()) {
            for input in inputs {
                // A rejected entry is simply absent from the rebuilt chain
                let _ = engine.submit(input);
            }
        }
        match engine.step() {
            Some(report) => on_tick(report.state_hash),
            None => break,
        }
    }
    Ok(())
}

/// Hash after every tick from 0 through `through_tick`, or until the match
/// ends if that comes first
pub fn replay<A: Authenticator>(
    setup: &MatchSetup,
    log: &InputLog,
    through_tick: u64,
    authenticator: A,
) -> Result<Vec<StateHash>, SetupError> {
    let mut trace = Vec::new();
    drive(setup, log, through_tick, authenticator, |hash| trace.push(hash))?;
    Ok(trace)
}

/// State hash at `tick` rebuilt from the setup and the log truncated to `tick`.
/// Only the running hash is kept, so memory stays flat however long the match.
pub fn build_state_hash(
    setup: &MatchSetup,
    log: &InputLog,
    tick: u64,
) -> Result<StateHash, SetupError> {
    let mut last = StateHash::default();
    drive(setup, &log.truncated(tick), tick, TrustedLog, |hash| last = hash)?;
    Ok(last)
}

/// Replay `log` through `through_tick` and compare the final hash
pub fn verify(
    setup: &MatchSetup,
    log: &InputLog,
    through_tick: u64,
    reference: &StateHash,
) -> Result<Verification, SetupError> {
    let candidate = build_state_hash(setup, log, through_tick)?;
    Ok(if candidate == *reference {
        Verification::Match
    } else {
        Verification::Mismatch {
            first_diverging_tick: None,
        }
    })
}

/// Replay `log` against a per-tick reference trace and report the first tick
/// whose hash differs. The input chain makes divergence permanent, so the
/// agreeing prefix is found by binary search.
pub fn verify_trace(
    setup: &MatchSetup,
    log: &InputLog,
    reference: &[StateHash],
) -> Result<Verification, SetupError> {
    let Some(last) = reference.len().checked_sub(1) else {
        return Ok(Verification::Match);
    };
    let candidate = replay(setup, log, last as u64, TrustedLog)?;
    Ok(compare_traces(&candidate, reference))
}

fn compare_traces(candidate: &[StateHash], reference: &[StateHash]) -> Verification {
    let common = candidate.len().min(reference.len());
    let agreeing = first_divergence(&candidate[..common], &reference[..common]);

    if agreeing < common {
        Verification::Mismatch {
            first_diverging_tick: Some(agreeing as u64),
        }
    } else if candidate.len() != reference.len() {
        Verification::Mismatch {
            first_diverging_tick: Some(common as u64),
        }
    } else {
        Verification::Match
    }
}

/// Length of the agreeing prefix of two equal-length traces
fn first_divergence(candidate: &[StateHash], reference: &[StateHash]) -> usize {
    let (mut lo, mut hi) = (0, candidate.len());
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if candidate[mid] == reference[mid] {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::hasher::hash_with_domain;

    fn trace(tags: &[u8]) -> Vec<StateHash> {
        tags.iter().map(|t| hash_with_domain(b"trace", &[*t])).collect()
    }

    #[test]
    fn identical_traces_match() {
        let a = trace(&[1, 2, 3, 4]);
        assert_eq!(compare_traces(&a, &a), Verification::Match);
    }

    #[test]
    fn bisection_finds_the_first_divergence() {
        let reference = trace(&[1, 2, 3, 4, 5, 6, 7, 8]);
        for split in 0..reference.len() {
            let mut candidate = reference.clone();
            for (i, hash) in candidate.iter_mut().enumerate().skip(split) {
                *hash = hash_with_domain(b"forked", &[i as u8]);
            }
            assert_eq!(
                compare_traces(&candidate, &reference),
                Verification::Mismatch {
                    first_diverging_tick: Some(split as u64)
                }
            );
        }
    }

    #[test]
    fn shorter_candidate_diverges_where_it_stops() {
        let reference = trace(&[1, 2, 3, 4]);
        assert_eq!(
            compare_traces(&reference[..2], &reference),
            Verification::Mismatch {
                first_diverging_tick: Some(2)
            }
        );
    }

    #[test]
    fn verification_serializes_with_a_result_tag() {
        let json = serde_json::to_value(Verification::Mismatch {
            first_diverging_tick: Some(7),
        })
        .expect("serializes");
        assert_eq!(json["result"], "mismatch");
        assert_eq!(json["first_diverging_tick"], 7);
    }
}

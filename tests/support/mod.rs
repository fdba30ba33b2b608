//! Shared builders for integration tests
#![allow(dead_code)]

use std::collections::BTreeMap;

use pitch_match_server::game::engine::{MatchEngine, TickReport};
use pitch_match_server::game::input::Authenticator;
use pitch_match_server::game::world::{MatchState, MatchEventKind};
use pitch_match_server::game::{
    ActionParams, EngineConfig, HmacAuthenticator, MatchSetup, PlayerId, PlayerInput, Roster,
};
use uuid::Uuid;

pub fn setup(seed: &[u8], duration_ticks: u64) -> MatchSetup {
    setup_with(seed, Roster::uniform(80), Roster::uniform(80), duration_ticks)
}

pub fn setup_with(seed: &[u8], home: Roster, away: Roster, duration_ticks: u64) -> MatchSetup {
    MatchSetup {
        match_id: Uuid::new_v4(),
        seed: seed.to_vec(),
        home,
        away,
        config: EngineConfig {
            duration_ticks,
            ..EngineConfig::default()
        },
    }
}

pub fn key_for(id: PlayerId) -> Vec<u8> {
    format!("session-key-{}", id.0).into_bytes()
}

/// Keys for all 22 players
pub fn authenticator() -> HmacAuthenticator {
    HmacAuthenticator::new((1..=22).map(|id| (PlayerId(id), key_for(PlayerId(id)))).collect::<BTreeMap<_, _>>())
}

pub fn signed(setup: &MatchSetup, id: u16, tick: u64, action: &str, params: ActionParams) -> PlayerInput {
    PlayerInput::new(PlayerId(id), tick, action, params).signed(&key_for(PlayerId(id)), setup.match_id)
}

pub fn move_params(x: i64, y: i64) -> ActionParams {
    ActionParams {
        x: Some(x),
        y: Some(y),
        ..ActionParams::default()
    }
}

pub fn target_params(target: u16) -> ActionParams {
    ActionParams {
        target: Some(i64::from(target)),
        ..ActionParams::default()
    }
}

pub fn shot_params(power: i64, angle: i64) -> ActionParams {
    ActionParams {
        power: Some(power),
        angle: Some(angle),
        ..ActionParams::default()
    }
}

/// Play a whole match, handing each input to the engine on its own tick
pub fn play<A: Authenticator>(
    setup: &MatchSetup,
    authenticator: A,
    inputs: &[PlayerInput],
) -> (MatchEngine<A>, Vec<TickReport>) {
    let mut engine = MatchEngine::new(setup.clone(), authenticator).expect("valid setup");
    let mut reports = Vec::new();
    loop {
        let tick = engine.tick();
        for input in inputs.iter().filter(|i| i.tick == tick) {
            let _ = engine.submit(input.clone());
        }
        match engine.step() {
            Some(report) => reports.push(report),
            None => break,
        }
    }
    (engine, reports)
}

/// Step until `done` holds for a report, at most `max_ticks` times
pub fn step_until<A: Authenticator>(
    engine: &mut MatchEngine<A>,
    max_ticks: u64,
    mut done: impl FnMut(&TickReport, &MatchState) -> bool,
) -> Option<TickReport> {
    for _ in 0..max_ticks {
        let report = engine.step()?;
        if done(&report, engine.state()) {
            return Some(report);
        }
    }
    None
}

pub fn events_of(report: &TickReport, actor: u16) -> Vec<MatchEventKind> {
    report
        .events
        .iter()
        .filter(|e| e.actor == Some(PlayerId(actor)))
        .map(|e| e.kind.clone())
        .collect()
}

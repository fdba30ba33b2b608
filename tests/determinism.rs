//! Determinism and rejection properties over generated input logs

mod support;

use pitch_match_server::game::engine::MatchEngine;
use pitch_match_server::game::world::MatchEventKind;
use pitch_match_server::game::{ActionParams, InputRejected, PlayerId, PlayerInput, TrustedLog};
use proptest::prelude::*;

use support::{authenticator, move_params, play, setup, signed, target_params};

const TICKS: u64 = 60;

fn arb_input() -> impl Strategy<Value = PlayerInput> {
    let action = prop_oneof![
        (0i64..=105_000, 0i64..=68_000).prop_map(|(x, y)| ("move", move_params(x, y))),
        (1i64..=22).prop_map(|t| ("pass", ActionParams { target: Some(t), ..ActionParams::default() })),
        (0i64..=100, 0i64..36_000).prop_map(|(p, a)| (
            "shoot",
            ActionParams {
                power: Some(p),
                angle: Some(a),
                ..ActionParams::default()
            }
        )),
        (1i64..=22).prop_map(|t| ("tackle", ActionParams { target: Some(t), ..ActionParams::default() })),
        Just(("sprint", ActionParams::default())),
        Just(("skill", ActionParams::default())),
    ];
    (1u16..=22, 0..TICKS, action)
        .prop_map(|(id, tick, (name, params))| PlayerInput::new(PlayerId(id), tick, name, params))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn same_seed_and_log_give_the_same_trace(
        seed in proptest::collection::vec(any::<u8>(), 1..16),
        inputs in proptest::collection::vec(arb_input(), 0..40),
    ) {
        let setup = setup(&seed, TICKS);
        let (first, first_reports) = play(&setup, TrustedLog, &inputs);
        let (second, second_reports) = play(&setup, TrustedLog, &inputs);

        prop_assert_eq!(first_reports, second_reports);
        prop_assert_eq!(first.export(), second.export());
        prop_assert_eq!(first.state(), second.state());
    }

    #[test]
    fn at_most_one_possessor_and_no_deep_overlaps(
        inputs in proptest::collection::vec(arb_input(), 0..40),
    ) {
        let setup = setup(b"invariants", TICKS);
        let config = &setup.config;
        let mut engine = MatchEngine::new(setup.clone(), TrustedLog).expect("valid setup");
        loop {
            let tick = engine.tick();
            for input in inputs.iter().filter(|i| i.tick == tick) {
                let _ = engine.submit(input.clone());
            }
            let Some(report) = engine.step() else {
                break;
            };
            let state = engine.state();
            if let Some(holder) = state.ball.possessor {
                prop_assert!(state.player(holder).is_some());
            }
            let reach = 2 * config.player_radius - 10;
            for (i, a) in state.players.iter().enumerate() {
                prop_assert!(config.pitch.contains(a.position));
                for b in &state.players[i + 1..] {
                    prop_assert!(a.position.distance(b.position) >= reach);
                }
            }
            // A goal re-spots the ball after separation has run
            let scored = report.events.iter().any(|e| matches!(e.kind, MatchEventKind::Goal { .. }));
            if state.ball.possessor.is_none() && !scored {
                let ball_reach = config.player_radius + config.ball_radius - 10;
                for player in state.players.iter().filter(|p| !state.ball.in_kick_cooldown(p.id)) {
                    prop_assert!(player.position.distance(state.ball.position) >= ball_reach);
                }
            }
        }
    }
}

#[test]
fn rejected_inputs_leave_the_state_untouched() {
    let setup = setup(b"lockstep", 80);
    let mut clean = MatchEngine::new(setup.clone(), authenticator()).expect("valid setup");
    let mut noisy = MatchEngine::new(setup.clone(), authenticator()).expect("valid setup");

    let legal = [
        signed(&setup, 10, 3, "pass", target_params(11)),
        signed(&setup, 6, 10, "sprint", ActionParams::default()),
    ];
    let mut forged = signed(&setup, 11, 20, "sprint", ActionParams::default());
    forged.tick = 21;
    let illegal = [
        // Not the ball carrier
        (signed(&setup, 3, 4, "shoot", support::shot_params(70, 0)), InputRejected::Infeasible),
        // Unknown verb
        (signed(&setup, 5, 6, "dive", ActionParams::default()), InputRejected::UnknownAction),
        // Target missing
        (signed(&setup, 8, 7, "pass", ActionParams::default()), InputRejected::BadParams),
        // Off the pitch
        (signed(&setup, 9, 8, "move", move_params(-5, 100)), InputRejected::BadParams),
        // Tag signed for another tick
        (forged, InputRejected::BadAuth),
        // Opponent is nowhere near
        (signed(&setup, 2, 9, "tackle", target_params(21)), InputRejected::Infeasible),
    ];

    for input in &legal {
        clean.submit(input.clone()).expect("legal input buffered");
        noisy.submit(input.clone()).expect("legal input buffered");
    }
    for (input, _) in &illegal {
        // Some are refused on arrival, the rest when their tick runs
        let _ = noisy.submit(input.clone());
    }

    while let (Some(a), Some(b)) = (clean.step(), noisy.step()) {
        assert_eq!(a.state_hash, b.state_hash, "tick {}", a.tick);
        assert_eq!(clean.state(), noisy.state());
    }

    for (_, reason) in &illegal {
        assert!(noisy.rejections().count(*reason) >= 1, "{reason:?} not counted");
    }
    assert_eq!(noisy.rejections().total(), illegal.len() as u64);
    assert_eq!(clean.log(), noisy.log());
}

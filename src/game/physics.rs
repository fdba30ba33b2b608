//! Action resolution, kinematics and loose-ball possession

use tracing::debug;

use super::discipline::DisciplineSystem;
use super::fixed::{mul_q16, pow_q16, Vec2, FULL_TURN_CD, Q16_ONE};
use super::input::{Action, ValidatedInput};
use super::rng::RngStream;
use super::tuning::EngineConfig;
use super::world::{FoulClass, MatchEventKind, MatchState, PlayerId, MAX_STAMINA};

/// Resolver for player actions and per-tick motion
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Apply validated actions in ascending player order. Each action
    /// re-checks its preconditions, so one made stale by an earlier action in
    /// the same tick is a no-op and draws nothing.
    pub fn apply_actions(
        state: &mut MatchState,
        actions: &[ValidatedInput],
        rng: &mut RngStream,
        config: &EngineConfig,
    ) {
        debug_assert!(actions.windows(2).all(|w| w[0].player_id <= w[1].player_id));

        for input in actions {
            let id = input.player_id;
            match input.action {
                Action::Move { target } => Self::set_move_target(state, id, target, config),
                Action::Pass { target } => Self::pass(state, id, target, rng, config),
                Action::Shoot { power, angle } => Self::shoot(state, id, power, angle, rng, config),
                Action::Tackle { target } => Self::tackle(state, id, target, rng, config),
                Action::Sprint => Self::sprint(state, id, config),
                Action::Skill => Self::skill(state, id, rng, config),
            }
        }
    }

    fn set_move_target(state: &mut MatchState, id: PlayerId, target: Vec2, config: &EngineConfig) {
        if let Some(player) = state.player_mut(id) {
            player.target = Some(config.pitch.clamp(target));
        }
    }

    /// Angular error for one draw: uniform in `[-spread, spread)`, where the
    /// spread shrinks linearly with accuracy
    fn deviation(rng: &mut RngStream, max_deviation_cd: i64, accuracy: u8) -> i64 {
        let spread = max_deviation_cd * (100 - i64::from(accuracy.min(100))) / 100;
        let centered = rng.next_q16() - Q16_ONE / 2;
        (centered * 2 * spread) >> 16
    }

    /// Launch speed that carries the ball `distance` in `ticks` under friction
    fn pass_speed(distance: i64, config: &EngineConfig) -> i64 {
        let friction = config.ball_friction_q16;
        let decay = pow_q16(friction, config.pass_travel_ticks);
        let speed = if decay >= Q16_ONE || friction >= Q16_ONE {
            distance / i64::from(config.pass_travel_ticks)
        } else {
            (distance as i128 * (Q16_ONE - friction) as i128 / (Q16_ONE - decay) as i128) as i64
        };
        speed.min(config.pass_max_speed)
    }

    fn pass(
        state: &mut MatchState,
        id: PlayerId,
        target: PlayerId,
        rng: &mut RngStream,
        config: &EngineConfig,
    ) {
        if state.ball.possessor != Some(id) {
            return;
        }
        let (Some(passer), Some(receiver)) = (state.player(id), state.player(target)) else {
            return;
        };
        let accuracy = passer.attributes.accuracy;
        let facing = passer.facing;
        let aim = receiver.position - state.ball.position;

        let deviation = Self::deviation(rng, config.pass_max_deviation_cd, accuracy);
        let direction = if aim.is_zero() { facing } else { aim.direction_q16() };
        let speed = Self::pass_speed(aim.length(), config);

        let ball = &mut state.ball;
        ball.velocity = direction.rotate(deviation).scale_q16(speed);
        ball.possessor = None;
        ball.pass_from = Some(id);
        ball.kicked_by = Some(id);
        ball.kick_cooldown = config.kick_cooldown_ticks;

        if let Some(passer) = state.player_mut(id) {
            passer.spend(config.pass_cost);
        }
        state.record(Some(id), MatchEventKind::Pass { target });
    }

    fn shoot(
        state: &mut MatchState,
        id: PlayerId,
        power: u8,
        angle: i64,
        rng: &mut RngStream,
        config: &EngineConfig,
    ) {
        if state.ball.possessor != Some(id) {
            return;
        }
        let Some(shooter) = state.player(id) else {
            return;
        };
        if shooter.stamina < config.shot_stamina_floor {
            return;
        }
        let accuracy = shooter.attributes.accuracy;

        let deviation = Self::deviation(rng, config.shot_max_deviation_cd, accuracy);
        let angle = (angle + deviation).rem_euclid(FULL_TURN_CD);
        let speed = i64::from(power) * config.shot_speed_per_power;

        let ball = &mut state.ball;
        ball.velocity = Vec2::from_angle(angle).scale_q16(speed);
        ball.possessor = None;
        ball.pass_from = None;
        ball.kicked_by = Some(id);
        ball.kick_cooldown = config.kick_cooldown_ticks;

        if let Some(shooter) = state.player_mut(id) {
            shooter.spend(config.shot_cost);
        }
        state.record(Some(id), MatchEventKind::Shot { power, angle, speed });
    }

    /// Success chance of a tackle in Q16
    pub fn tackle_chance(attacker_strength: u8, defender_strength: u8, shielded: bool, config: &EngineConfig) -> i64 {
        let diff = i64::from(attacker_strength) - i64::from(defender_strength);
        let penalty = if shielded { config.shield_tackle_penalty_q16 } else { 0 };
        (config.tackle_base_q16 + diff * config.tackle_per_strength_q16 - penalty)
            .clamp(config.tackle_floor_q16, config.tackle_cap_q16)
    }

    fn tackle(
        state: &mut MatchState,
        id: PlayerId,
        target: PlayerId,
        rng: &mut RngStream,
        config: &EngineConfig,
    ) {
        let (Some(attacker), Some(defender)) = (state.player(id), state.player(target)) else {
            return;
        };
        if attacker.team == defender.team {
            return;
        }
        let chance = Self::tackle_chance(
            attacker.attributes.strength,
            defender.attributes.strength,
            defender.shield_ticks > 0,
            config,
        );

        let success = rng.next_q16() < chance;
        let won_ball = success && state.ball.possessor == Some(target);
        if won_ball {
            state.ball.pass_from = None;
            state.give_possession(id);
        }
        if let Some(attacker) = state.player_mut(id) {
            attacker.is_sliding = true;
            if success {
                attacker.spend(config.tackle_cost);
            }
        }
        state.record(
            Some(id),
            MatchEventKind::Tackle {
                target,
                success,
                won_ball,
            },
        );

        if !success && rng.next_q16() < config.tackle_foul_chance_q16 {
            debug!(player_id = %id, victim = %target, "failed tackle called as a foul");
            DisciplineSystem::book(state, id, target, FoulClass::RecklessTackle, config);
        }
    }

    fn sprint(state: &mut MatchState, id: PlayerId, config: &EngineConfig) {
        let Some(player) = state.player_mut(id) else {
            return;
        };
        if player.stamina < config.sprint_cost {
            return;
        }
        player.spend(config.sprint_cost);
        player.sprint_ticks = config.sprint_ticks;
    }

    fn skill(state: &mut MatchState, id: PlayerId, rng: &mut RngStream, config: &EngineConfig) {
        if state.ball.possessor != Some(id) {
            return;
        }
        let Some(player) = state.player(id) else {
            return;
        };
        if player.stamina < config.skill_cost {
            return;
        }
        let chance = config.skill_base_q16
            + i64::from(player.attributes.dribbling) * config.skill_per_dribbling_q16;
        let landed = rng.next_q16() < chance;

        if let Some(player) = state.player_mut(id) {
            player.spend(config.skill_cost);
            if landed {
                player.shield_ticks = config.skill_shield_ticks;
            }
        }
    }

    /// Current speed cap for a player in mm/tick
    pub fn max_speed(pace: u8, stamina: i64, sprinting: bool, config: &EngineConfig) -> i64 {
        let top = config.top_speed(pace) * stamina.clamp(0, MAX_STAMINA) / MAX_STAMINA;
        if sprinting {
            mul_q16(top, config.sprint_multiplier_q16)
        } else {
            top
        }
    }

    /// Advance players and the loose ball by one tick
    pub fn integrate(state: &mut MatchState, config: &EngineConfig) {
        let pitch = config.pitch;

        for player in &mut state.players {
            let max_speed = Self::max_speed(
                player.attributes.pace,
                player.stamina,
                player.sprint_ticks > 0,
                config,
            );

            match player.target {
                Some(target) => {
                    let to_target = target - player.position;
                    let distance = to_target.length();
                    if distance <= config.arrival_tolerance {
                        player.target = None;
                        player.velocity = Vec2::ZERO;
                    } else {
                        player.velocity = to_target.with_length(distance.min(max_speed));
                    }
                }
                None => {
                    player.velocity = player.velocity.scale_q16(config.player_friction_q16);
                }
            }

            let next = player.position + player.velocity;
            let clamped = pitch.clamp(next);
            if clamped.x != next.x {
                player.velocity.x = 0;
            }
            if clamped.y != next.y {
                player.velocity.y = 0;
            }
            player.position = clamped;
            if !player.velocity.is_zero() {
                player.facing = player.velocity.direction_q16();
            }

            if player.sprint_ticks > 0 {
                player.sprint_ticks -= 1;
                player.spend(config.sprint_drain);
            }
            player.shield_ticks = player.shield_ticks.saturating_sub(1);
            if !player.exerted {
                player.stamina = (player.stamina + config.stamina_regen).min(MAX_STAMINA);
            }
        }

        Self::integrate_ball(state, config);
    }

    fn integrate_ball(state: &mut MatchState, config: &EngineConfig) {
        let pitch = config.pitch;
        let radius = config.ball_radius;
        let restitution = config.ball_restitution_q16;
        let ball = &mut state.ball;
        ball.kick_cooldown = ball.kick_cooldown.saturating_sub(1);
        if ball.possessor.is_some() {
            return;
        }

        let mut position = ball.position + ball.velocity;
        let mut velocity = ball.velocity;

        if position.y < 0 {
            position.y = -position.y;
            velocity.y = mul_q16(-velocity.y, restitution);
        } else if position.y > pitch.width {
            position.y = 2 * pitch.width - position.y;
            velocity.y = mul_q16(-velocity.y, restitution);
        }

        // Between the posts the ball carries on into the net
        if !pitch.within_posts(position.y, radius) {
            if position.x < 0 {
                position.x = -position.x;
                velocity.x = mul_q16(-velocity.x, restitution);
            } else if position.x > pitch.length {
                position.x = 2 * pitch.length - position.x;
                velocity.x = mul_q16(-velocity.x, restitution);
            }
        }
        position = pitch.clamp_ball(position, radius);

        velocity = velocity.scale_q16(config.ball_friction_q16);
        if velocity.length() < config.ball_stop_speed {
            velocity = Vec2::ZERO;
        }
        // Dead on a goal line without fully crossing it: played from the line
        if velocity.is_zero() && position.x + radius >= 0 && position.x - radius <= pitch.length {
            position.x = position.x.clamp(0, pitch.length);
        }
        ball.position = position;
        ball.velocity = velocity;
    }

    /// Give a loose, controllable ball to the nearest eligible player inside
    /// the pickup radius. Ties go to the lower id.
    pub fn assign_loose_ball(state: &mut MatchState, config: &EngineConfig) -> Option<PlayerId> {
        let ball = &state.ball;
        if ball.possessor.is_some()
            || !config.pitch.contains(ball.position)
            || ball.velocity.length() > config.control_speed
        {
            return None;
        }
        let reach = (config.pickup_radius as u64).pow(2);
        let winner = state
            .players
            .iter()
            .filter(|p| !ball.in_kick_cooldown(p.id))
            .map(|p| (p.position.distance_sq(ball.position), p.id))
            .filter(|(distance_sq, _)| *distance_sq <= reach)
            .min()
            .map(|(_, id)| id)?;

        state.give_possession(winner);
        Some(winner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::world::{MatchSetup, Roster};
    use uuid::Uuid;

    fn setup() -> MatchSetup {
        MatchSetup {
            match_id: Uuid::nil(),
            seed: b"physics".to_vec(),
            home: Roster::uniform(70),
            away: Roster::uniform(70),
            config: EngineConfig::default(),
        }
    }

    fn loose_ball_state(setup: &MatchSetup, position: Vec2, velocity: Vec2) -> MatchState {
        let mut state = MatchState::new(setup);
        state.ball.position = position;
        state.ball.velocity = velocity;
        state
    }

    #[test]
    fn ball_reflects_off_the_touchline() {
        let setup = setup();
        let config = &setup.config;
        let mut state = loose_ball_state(&setup, Vec2::new(30_000, 0), Vec2::new(0, -300));

        PhysicsSystem::integrate(&mut state, config);

        let expected_vy = mul_q16(mul_q16(300, config.ball_restitution_q16), config.ball_friction_q16);
        assert_eq!(state.ball.position, Vec2::new(30_000, 300));
        assert_eq!(state.ball.velocity, Vec2::new(0, expected_vy));
        assert!((0..=config.pitch.width).contains(&state.ball.position.y));
    }

    #[test]
    fn ball_runs_into_the_net_between_the_posts() {
        let setup = setup();
        let config = &setup.config;
        let center_y = config.pitch.width / 2;
        let mut state = loose_ball_state(
            &setup,
            Vec2::new(config.pitch.length - 100, center_y),
            Vec2::new(400, 0),
        );

        PhysicsSystem::integrate(&mut state, config);
        assert!(state.ball.position.x > config.pitch.length);
        assert!(state.ball.velocity.x > 0);
    }

    #[test]
    fn ball_dying_on_the_goal_line_can_still_be_collected() {
        let setup = setup();
        let config = &setup.config;
        let on_line = Vec2::new(config.pitch.length + 50, config.pitch.width / 2);
        let mut state = loose_ball_state(&setup, on_line, Vec2::ZERO);
        if let Some(p) = state.player_mut(PlayerId(5)) {
            p.position = Vec2::new(config.pitch.length - 300, config.pitch.width / 2);
            p.velocity = Vec2::ZERO;
        }

        PhysicsSystem::integrate(&mut state, config);
        assert_eq!(state.ball.position, Vec2::new(config.pitch.length, config.pitch.width / 2));
        assert!(config.pitch.contains(state.ball.position));
        assert_eq!(PhysicsSystem::assign_loose_ball(&mut state, config), Some(PlayerId(5)));
    }

    #[test]
    fn ball_at_rest_in_the_net_is_left_for_goal_detection() {
        let setup = setup();
        let config = &setup.config;
        let in_net = Vec2::new(config.pitch.length + config.ball_radius + 1, config.pitch.width / 2);
        let mut state = loose_ball_state(&setup, in_net, Vec2::ZERO);
        PhysicsSystem::integrate(&mut state, config);
        assert_eq!(state.ball.position, in_net);
    }

    #[test]
    fn slow_ball_stops() {
        let setup = setup();
        let mut state = loose_ball_state(&setup, Vec2::new(30_000, 30_000), Vec2::new(1, 1));
        PhysicsSystem::integrate(&mut state, &setup.config);
        assert_eq!(state.ball.velocity, Vec2::ZERO);
    }

    #[test]
    fn nearest_player_collects_the_ball_with_id_tie_break() {
        let setup = setup();
        let config = &setup.config;
        let spot = Vec2::new(20_000, 20_000);
        let mut state = loose_ball_state(&setup, spot, Vec2::ZERO);
        for id in [3, 14] {
            if let Some(p) = state.player_mut(PlayerId(id)) {
                p.position = spot + Vec2::new(0, 500);
            }
        }

        assert_eq!(PhysicsSystem::assign_loose_ball(&mut state, config), Some(PlayerId(3)));
        assert_eq!(state.ball.possessor, Some(PlayerId(3)));
    }

    #[test]
    fn fast_ball_cannot_be_collected() {
        let setup = setup();
        let config = &setup.config;
        let spot = Vec2::new(20_000, 20_000);
        let mut state = loose_ball_state(&setup, spot, Vec2::new(config.control_speed + 1, 0));
        if let Some(p) = state.player_mut(PlayerId(3)) {
            p.position = spot + Vec2::new(0, 500);
        }
        assert_eq!(PhysicsSystem::assign_loose_ball(&mut state, config), None);
    }

    #[test]
    fn kicker_cannot_recollect_during_cooldown() {
        let setup = setup();
        let config = &setup.config;
        let mut state = MatchState::new(&setup);
        state.give_possession(PlayerId(10));
        state.sync_ball_to_possessor(config);

        let mut rng = RngStream::from_seed_bytes(b"cooldown");
        let shot = ValidatedInput {
            player_id: PlayerId(10),
            tick: 0,
            action: Action::Shoot { power: 0, angle: 0 },
        };
        PhysicsSystem::apply_actions(&mut state, &[shot], &mut rng, config);

        assert_eq!(state.ball.possessor, None);
        assert_eq!(PhysicsSystem::assign_loose_ball(&mut state, config), None);
    }

    #[test]
    fn move_steers_without_overshooting() {
        let setup = setup();
        let config = &setup.config;
        let mut state = MatchState::new(&setup);
        let start = state.player(PlayerId(2)).map(|p| p.position).unwrap_or_default();
        let target = start + Vec2::new(3_000, 0);
        PhysicsSystem::set_move_target(&mut state, PlayerId(2), target, config);

        let mut furthest = 0;
        for _ in 0..600 {
            PhysicsSystem::integrate(&mut state, config);
            let x = state.player(PlayerId(2)).map(|p| p.position.x).unwrap_or_default();
            furthest = furthest.max(x);
        }
        let player = state.player(PlayerId(2)).expect("still on the pitch");
        assert_eq!(player.target, None);
        assert_eq!(player.velocity, Vec2::ZERO);
        assert!(player.position.distance(target) <= config.arrival_tolerance);
        assert!(furthest <= target.x + 2 * config.arrival_tolerance);
    }

    #[test]
    fn move_covers_top_speed_from_the_first_tick() {
        let setup = setup();
        let config = &setup.config;
        let mut state = MatchState::new(&setup);
        let start = state.player(PlayerId(2)).map(|p| p.position).unwrap_or_default();
        PhysicsSystem::set_move_target(&mut state, PlayerId(2), start + Vec2::new(5_000, 0), config);

        let top = PhysicsSystem::max_speed(70, MAX_STAMINA, false, config);
        assert_eq!(top, 129);
        PhysicsSystem::integrate(&mut state, config);
        let after_one = state.player(PlayerId(2)).map(|p| p.position).unwrap_or_default();
        assert_eq!(after_one, start + Vec2::new(top, 0));

        PhysicsSystem::integrate(&mut state, config);
        let after_two = state.player(PlayerId(2)).map(|p| p.position).unwrap_or_default();
        assert_eq!(after_two, start + Vec2::new(2 * top, 0));
    }

    #[test]
    fn move_lands_exactly_on_a_near_target() {
        let setup = setup();
        let config = &setup.config;
        let mut state = MatchState::new(&setup);
        let start = state.player(PlayerId(2)).map(|p| p.position).unwrap_or_default();
        let target = start + Vec2::new(50, 0);
        PhysicsSystem::set_move_target(&mut state, PlayerId(2), target, config);

        PhysicsSystem::integrate(&mut state, config);
        assert_eq!(state.player(PlayerId(2)).map(|p| p.position), Some(target));

        PhysicsSystem::integrate(&mut state, config);
        let player = state.player(PlayerId(2)).expect("on pitch");
        assert_eq!(player.position, target);
        assert_eq!(player.target, None);
        assert_eq!(player.velocity, Vec2::ZERO);
    }

    #[test]
    fn sprint_raises_speed_and_costs_stamina() {
        let config = EngineConfig::default();
        let walk = PhysicsSystem::max_speed(70, MAX_STAMINA, false, &config);
        let run = PhysicsSystem::max_speed(70, MAX_STAMINA, true, &config);
        assert!(run > walk);
        assert!(PhysicsSystem::max_speed(70, MAX_STAMINA / 2, false, &config) < walk);

        let setup = setup();
        let mut state = MatchState::new(&setup);
        PhysicsSystem::sprint(&mut state, PlayerId(5), &setup.config);
        let player = state.player(PlayerId(5)).expect("on pitch");
        assert_eq!(player.sprint_ticks, setup.config.sprint_ticks);
        assert_eq!(player.stamina, MAX_STAMINA - setup.config.sprint_cost);
    }

    fn skill_then_tackle(with_skill: bool) -> MatchState {
        let mut setup = setup();
        setup.config.skill_base_q16 = Q16_ONE;
        setup.config.tackle_base_q16 = Q16_ONE;
        setup.config.tackle_per_strength_q16 = 0;
        setup.config.tackle_floor_q16 = 0;
        setup.config.tackle_cap_q16 = Q16_ONE;
        setup.config.shield_tackle_penalty_q16 = Q16_ONE;
        setup.config.tackle_foul_chance_q16 = 0;
        let config = &setup.config;

        let mut state = MatchState::new(&setup);
        state.give_possession(PlayerId(10));
        let mut actions = Vec::new();
        if with_skill {
            actions.push(ValidatedInput {
                player_id: PlayerId(10),
                tick: 0,
                action: Action::Skill,
            });
        }
        actions.push(ValidatedInput {
            player_id: PlayerId(21),
            tick: 0,
            action: Action::Tackle { target: PlayerId(10) },
        });
        let mut rng = RngStream::from_seed_bytes(b"skill");
        PhysicsSystem::apply_actions(&mut state, &actions, &mut rng, config);
        state
    }

    #[test]
    fn landed_skill_shields_the_carrier_from_a_same_tick_tackle() {
        let config = EngineConfig::default();
        let state = skill_then_tackle(true);
        let carrier = state.player(PlayerId(10)).expect("on pitch");
        assert_eq!(carrier.shield_ticks, config.skill_shield_ticks);
        assert_eq!(carrier.stamina, MAX_STAMINA - config.skill_cost);
        assert_eq!(state.ball.possessor, Some(PlayerId(10)));
        assert!(matches!(
            state.events.last().map(|e| &e.kind),
            Some(MatchEventKind::Tackle {
                target: PlayerId(10),
                success: false,
                won_ball: false,
            })
        ));
    }

    #[test]
    fn unshielded_carrier_loses_the_ball_to_the_same_tackle() {
        let state = skill_then_tackle(false);
        assert_eq!(state.player(PlayerId(10)).map(|p| p.shield_ticks), Some(0));
        assert_eq!(state.ball.possessor, Some(PlayerId(21)));
        assert!(matches!(
            state.events.last().map(|e| &e.kind),
            Some(MatchEventKind::Tackle {
                success: true,
                won_ball: true,
                ..
            })
        ));
    }

    #[test]
    fn tackle_chance_is_clamped() {
        let config = EngineConfig::default();
        assert_eq!(PhysicsSystem::tackle_chance(50, 50, false, &config), config.tackle_base_q16);
        assert_eq!(PhysicsSystem::tackle_chance(100, 0, false, &config), config.tackle_cap_q16);
        assert_eq!(PhysicsSystem::tackle_chance(0, 100, true, &config), config.tackle_floor_q16);
        assert!(
            PhysicsSystem::tackle_chance(60, 50, true, &config)
                < PhysicsSystem::tackle_chance(60, 50, false, &config)
        );
    }

    #[test]
    fn pass_speed_respects_the_cap() {
        let config = EngineConfig::default();
        assert!(PhysicsSystem::pass_speed(10_000, &config) < config.pass_max_speed);
        assert_eq!(PhysicsSystem::pass_speed(1_000_000, &config), config.pass_max_speed);
    }
}

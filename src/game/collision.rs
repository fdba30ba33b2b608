//! Collision detection and response
//!
//! Discrete circle-vs-circle checks at fixed radii. Per tick, in order:
//! loose ball against players, player against player (velocity response and
//! foul collection), bookings, positional separation of players and a loose
//! ball, then goal detection.

use tracing::info;

use super::discipline::DisciplineSystem;
use super::fixed::{mul_q16, Vec2, Q16_ONE};
use super::tuning::EngineConfig;
use super::world::{FoulClass, MatchEventKind, MatchState, PlayerId, PlayerState, Team};

/// A foul spotted during contact resolution, booked after all pairs are done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoulCall {
    pub offender: PlayerId,
    pub victim: PlayerId,
    pub class: FoulClass,
    /// Closing speed after the from-behind multiplier, mm/tick
    pub severity: i64,
}

pub struct CollisionEngine;

impl CollisionEngine {
    /// Run the full collision stage for one tick
    pub fn resolve(state: &mut MatchState, config: &EngineConfig) {
        Self::deflect_ball(state, config);
        let fouls = Self::player_contacts(state, config);
        for foul in fouls {
            DisciplineSystem::book(state, foul.offender, foul.victim, foul.class, config);
        }
        Self::separate(state, config);
        state.sync_ball_to_possessor(config);
        Self::detect_goal(state, config);
    }

    /// Circles of radius `ra` at `a` and `rb` at `b` overlap
    pub fn overlaps(a: Vec2, ra: i64, b: Vec2, rb: i64) -> bool {
        let reach = (ra + rb).max(0) as u64;
        a.distance_sq(b) < reach * reach
    }

    /// Contact normal from `from` toward `to` as a Q16 unit vector. Coincident
    /// centres fall back to `fallback`.
    fn normal(from: Vec2, to: Vec2, fallback: Vec2) -> Vec2 {
        let delta = to - from;
        if delta.is_zero() {
            fallback
        } else {
            delta.direction_q16()
        }
    }

    /// A loose ball touching a player loses its approach velocity along the
    /// contact normal and rebounds with the deflection restitution
    pub fn deflect_ball(state: &mut MatchState, config: &EngineConfig) {
        if state.ball.possessor.is_some() {
            return;
        }
        let restitution = config.deflection_restitution_q16;
        for player in &state.players {
            let ball = &mut state.ball;
            if ball.in_kick_cooldown(player.id)
                || !Self::overlaps(player.position, config.player_radius, ball.position, config.ball_radius)
            {
                continue;
            }
            let n = Self::normal(player.position, ball.position, player.facing);
            let approach = (ball.velocity - player.velocity).dot_q16(n);
            if approach < 0 {
                let impulse = approach + mul_q16(approach, restitution);
                ball.velocity -= n.scale_q16(impulse);
            }
        }
    }

    /// Velocity response for every overlapping pair, in ascending id order.
    /// Returns the fouls to book, at most one per offender.
    pub fn player_contacts(state: &mut MatchState, config: &EngineConfig) -> Vec<FoulCall> {
        let mut fouls = Vec::new();
        let count = state.players.len();
        for i in 0..count {
            for j in (i + 1)..count {
                let (head, tail) = state.players.split_at_mut(j);
                let a = &mut head[i];
                let b = &mut tail[0];
                if !Self::overlaps(a.position, config.player_radius, b.position, config.player_radius) {
                    continue;
                }
                let n = Self::normal(a.position, b.position, Vec2::new(Q16_ONE, 0));
                let closing = (a.velocity - b.velocity).dot_q16(n);
                if closing < 0 {
                    continue;
                }

                if a.team != b.team && closing >= config.foul_force_threshold {
                    if let Some(foul) = Self::classify(a, b, n, closing, config) {
                        fouls.push(foul);
                    }
                }

                let elastic = mul_q16(closing, Q16_ONE + config.player_restitution_q16) / 2;
                let capped = mul_q16(closing, config.momentum_cap_q16);
                let impulse = n.scale_q16(elastic.min(capped));
                a.velocity -= impulse;
                b.velocity += impulse;
            }
        }
        fouls
    }

    /// Decide who fouled whom and how badly. The aggressor is the player
    /// contributing more of the closing speed; ties go to the lower id.
    fn classify(
        a: &mut PlayerState,
        b: &mut PlayerState,
        n: Vec2,
        closing: i64,
        config: &EngineConfig,
    ) -> Option<FoulCall> {
        let a_push = a.velocity.dot_q16(n);
        let b_push = -b.velocity.dot_q16(n);
        let (aggressor, victim, toward_victim) = if a_push >= b_push {
            (a, b, n)
        } else {
            (b, a, -n)
        };
        if aggressor.fouls_this_tick > 0 {
            return None;
        }

        // Victim facing away from the aggressor, i.e. along the push
        let from_behind = victim.facing.dot_q16(toward_victim) > config.from_behind_cos_q16;
        let severity = if from_behind {
            mul_q16(closing, config.from_behind_multiplier_q16)
        } else {
            closing
        };
        let class = if severity >= config.dangerous_force {
            FoulClass::DangerousPlay
        } else if severity >= config.reckless_force || aggressor.is_sliding {
            FoulClass::RecklessTackle
        } else {
            FoulClass::Collision
        };

        aggressor.fouls_this_tick += 1;
        Some(FoulCall {
            offender: aggressor.id,
            victim: victim.id,
            class,
            severity,
        })
    }

    /// Fixed number of positional passes pushing overlapping bodies apart by
    /// the penetration depth plus epsilon, split evenly unless the pitch edge
    /// pins one side. Each pass covers player pairs and then a loose ball
    /// against every player, so ball and player pushes settle together.
    pub fn separate(state: &mut MatchState, config: &EngineConfig) {
        let pitch = config.pitch;
        let min_distance = 2 * config.player_radius;
        let count = state.players.len();

        for _ in 0..config.separation_passes {
            let mut moved = false;
            for i in 0..count {
                for j in (i + 1)..count {
                    let (head, tail) = state.players.split_at_mut(j);
                    let a = &mut head[i];
                    let b = &mut tail[0];
                    if !Self::overlaps(a.position, config.player_radius, b.position, config.player_radius) {
                        continue;
                    }
                    let n = Self::normal(a.position, b.position, Vec2::new(Q16_ONE, 0));
                    let depth = min_distance - a.position.distance(b.position);
                    let push = depth + config.separation_epsilon;
                    let (pa, pb) = Self::split_push(
                        a.position,
                        b.position,
                        n,
                        push,
                        |p| pitch.clamp(p),
                        |p| pitch.clamp(p),
                    );
                    a.position = pa;
                    b.position = pb;
                    moved = true;
                }
            }
            moved |= Self::separate_ball(state, config);
            if !moved {
                break;
            }
        }
    }

    /// New positions for a pair pushed `push` apart along `n`, each placed
    /// through its own clamp. Whatever one side cannot take goes to the other.
    fn split_push(
        a: Vec2,
        b: Vec2,
        n: Vec2,
        push: i64,
        clamp_a: impl Fn(Vec2) -> Vec2,
        clamp_b: impl Fn(Vec2) -> Vec2,
    ) -> (Vec2, Vec2) {
        let half = push / 2;
        let wanted_a = a - n.scale_q16(half);
        let placed_a = clamp_a(wanted_a);
        let short_a = wanted_a.distance(placed_a);

        let wanted_b = b + n.scale_q16(push - half + short_a);
        let placed_b = clamp_b(wanted_b);
        let short_b = wanted_b.distance(placed_b);

        let placed_a = if short_b > 0 {
            clamp_a(placed_a - n.scale_q16(short_b))
        } else {
            placed_a
        };
        (placed_a, placed_b)
    }

    /// One pass of loose ball against players in id order. The player who just
    /// kicked the ball is skipped while the kick cooldown runs. Returns whether
    /// anything moved.
    fn separate_ball(state: &mut MatchState, config: &EngineConfig) -> bool {
        if state.ball.possessor.is_some() {
            return false;
        }
        let pitch = config.pitch;
        let radius = config.ball_radius;
        let reach = config.player_radius + radius;
        let mut moved = false;
        for player in &mut state.players {
            let ball = &mut state.ball;
            if ball.in_kick_cooldown(player.id)
                || !Self::overlaps(player.position, config.player_radius, ball.position, radius)
            {
                continue;
            }
            let n = Self::normal(player.position, ball.position, player.facing);
            let depth = reach - player.position.distance(ball.position);
            let push = depth + config.separation_epsilon;
            let (placed_player, placed_ball) = Self::split_push(
                player.position,
                ball.position,
                n,
                push,
                |p| pitch.clamp(p),
                |p| pitch.clamp_ball(p, radius),
            );
            player.position = placed_player;
            ball.position = placed_ball;
            moved = true;
        }
        moved
    }

    /// Score a ball that is fully over a goal line between the posts
    pub fn detect_goal(state: &mut MatchState, config: &EngineConfig) -> Option<Team> {
        let pitch = &config.pitch;
        let radius = config.ball_radius;
        let position = state.ball.position;
        if !pitch.within_posts(position.y, radius) {
            return None;
        }
        let team = if position.x - radius > pitch.length {
            Team::Home
        } else if position.x + radius < 0 {
            Team::Away
        } else {
            return None;
        };

        let scorer = state.ball.last_possessor;
        let own_goal = scorer.is_some_and(|id| id.team() != team);
        let assist = state
            .ball
            .assist_candidate
            .filter(|id| !own_goal && id.team() == team && Some(*id) != scorer);

        match team {
            Team::Home => state.score_home += 1,
            Team::Away => state.score_away += 1,
        }
        state.record(
            scorer,
            MatchEventKind::Goal {
                team,
                scorer,
                assist,
                own_goal,
            },
        );
        info!(
            match_id = %state.match_id,
            tick = state.tick,
            ?team,
            scorer = ?scorer,
            home = state.score_home,
            away = state.score_away,
            "goal"
        );
        state.reset_ball(config);
        Some(team)
    }
}

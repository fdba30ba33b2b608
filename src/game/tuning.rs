//! Engine tuning surface
//!
//! Every threshold the resolver and the collision engine consult lives here.
//! Values are integers (mm, mm/tick, ticks, stamina hundredths, Q16 ratios) so
//! the whole config can be folded into the state hash header.

use serde::{Deserialize, Serialize};

use super::fixed::Q16_ONE;
use super::world::Pitch;

/// Preset families of tuning values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// Full-length match with conservative refereeing
    #[default]
    Standard,
    /// Short, fast match with a stricter referee
    Arcade,
}

/// Tuning values for one match. Defaults are reasonable, not balanced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub pitch: Pitch,
    /// Match length in ticks
    pub duration_ticks: u64,
    /// How far ahead of the current tick an input may be tagged
    pub lookahead_ticks: u64,
    /// Fewer eligible players than this forfeits the match
    pub min_players: usize,

    // Bodies
    pub player_radius: i64,
    pub ball_radius: i64,
    /// Loose ball is collected by the nearest player within this distance
    pub pickup_radius: i64,
    /// Faster loose balls cannot be collected, only deflected (mm/tick)
    pub control_speed: i64,
    pub tackle_radius: i64,

    // Movement (mm/tick)
    pub base_speed: i64,
    /// Extra top speed at pace 100
    pub pace_speed_bonus: i64,
    /// Velocity retained per tick by players without a move target
    pub player_friction_q16: i64,
    /// Players closer than this to their target have arrived
    pub arrival_tolerance: i64,

    // Stamina (hundredths, 10_000 == full)
    pub stamina_regen: i64,
    pub pass_cost: i64,
    pub shot_cost: i64,
    pub tackle_cost: i64,
    pub shot_stamina_floor: i64,
    pub sprint_cost: i64,
    pub sprint_drain: i64,
    pub sprint_ticks: u32,
    pub sprint_multiplier_q16: i64,
    pub skill_cost: i64,
    pub skill_shield_ticks: u32,
    pub skill_base_q16: i64,
    /// Added skill success chance per dribbling point
    pub skill_per_dribbling_q16: i64,

    // Ball
    pub ball_friction_q16: i64,
    /// Restitution against the pitch boundary
    pub ball_restitution_q16: i64,
    /// Restitution when a loose ball hits a player
    pub deflection_restitution_q16: i64,
    /// Speeds below this stop the ball
    pub ball_stop_speed: i64,
    /// Ticks during which the kicker cannot collect or deflect the ball
    pub kick_cooldown_ticks: u32,
    /// Ticks a pass is aimed to take to reach its target
    pub pass_travel_ticks: u32,
    pub pass_max_speed: i64,
    /// Worst-case pass deviation at accuracy 0 (centidegrees)
    pub pass_max_deviation_cd: i64,
    /// Worst-case shot deviation at accuracy 0 (centidegrees)
    pub shot_max_deviation_cd: i64,
    /// Ball speed per point of shot power
    pub shot_speed_per_power: i64,

    // Tackles
    pub tackle_base_q16: i64,
    /// Success chance per point of strength difference
    pub tackle_per_strength_q16: i64,
    pub tackle_floor_q16: i64,
    pub tackle_cap_q16: i64,
    /// Tackle success reduction while the target's dribble shield is up
    pub shield_tackle_penalty_q16: i64,
    /// Chance that a failed tackle is a foul
    pub tackle_foul_chance_q16: i64,

    // Player-player contact
    pub player_restitution_q16: i64,
    /// Cap on the impulse as a fraction of the closing speed
    pub momentum_cap_q16: i64,
    pub separation_passes: u32,
    /// Extra push beyond the penetration depth
    pub separation_epsilon: i64,

    // Fouls (closing speed in mm/tick)
    pub foul_force_threshold: i64,
    pub reckless_force: i64,
    pub dangerous_force: i64,
    /// cos of the widest angle still counted as contact from behind
    pub from_behind_cos_q16: i64,
    /// Severity multiplier for contact from behind
    pub from_behind_multiplier_q16: i64,
    /// Cards that add up to an ejection
    pub cards_to_eject: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pitch: Pitch::default(),
            duration_ticks: 90 * 60 * 60,
            lookahead_ticks: 10,
            min_players: 7,

            player_radius: 400,
            ball_radius: 110,
            pickup_radius: 750,
            control_speed: 500,
            tackle_radius: 1_500,

            base_speed: 80,
            pace_speed_bonus: 70,
            player_friction_q16: 55_706, // 0.85
            arrival_tolerance: 20,

            stamina_regen: 3,
            pass_cost: 100,
            shot_cost: 300,
            tackle_cost: 500,
            shot_stamina_floor: 2_000,
            sprint_cost: 800,
            sprint_drain: 5,
            sprint_ticks: 120,
            sprint_multiplier_q16: 85_197, // 1.3
            skill_cost: 600,
            skill_shield_ticks: 90,
            skill_base_q16: 19_661,        // 0.30
            skill_per_dribbling_q16: 393,  // 0.006

            ball_friction_q16: 64_881,          // 0.99
            ball_restitution_q16: 39_322,       // 0.6
            deflection_restitution_q16: 26_214, // 0.4
            ball_stop_speed: 2,
            kick_cooldown_ticks: 12,
            pass_travel_ticks: 30,
            pass_max_speed: 600,
            pass_max_deviation_cd: 800,
            shot_max_deviation_cd: 1_200,
            shot_speed_per_power: 6,

            tackle_base_q16: Q16_ONE / 2,
            tackle_per_strength_q16: 655, // 0.01
            tackle_floor_q16: 3_277,      // 0.05
            tackle_cap_q16: 62_259,       // 0.95
            shield_tackle_penalty_q16: Q16_ONE / 4,
            tackle_foul_chance_q16: 22_938, // 0.35

            player_restitution_q16: 13_107, // 0.2
            momentum_cap_q16: Q16_ONE / 2,
            separation_passes: 8,
            separation_epsilon: 2,

            foul_force_threshold: 60,
            reckless_force: 110,
            dangerous_force: 170,
            from_behind_cos_q16: 46_341,         // cos 45°
            from_behind_multiplier_q16: 98_304, // 1.5
            cards_to_eject: 2,
        }
    }
}

impl EngineConfig {
    pub fn for_mode(mode: GameMode) -> Self {
        match mode {
            GameMode::Standard => Self::default(),
            GameMode::Arcade => Self {
                duration_ticks: 3 * 60 * 60,
                base_speed: 100,
                stamina_regen: 6,
                shot_speed_per_power: 7,
                pass_travel_ticks: 24,
                foul_force_threshold: 50,
                reckless_force: 90,
                dangerous_force: 150,
                ..Self::default()
            },
        }
    }

    /// Top speed in mm/tick for a pace rating, before stamina and sprint
    pub fn top_speed(&self, pace: u8) -> i64 {
        self.base_speed + self.pace_speed_bonus * i64::from(pace) / 100
    }

    /// Sanity checks run at match setup
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.duration_ticks == 0 {
            return Err("duration_ticks must be positive");
        }
        if self.pitch.length <= 0 || self.pitch.width <= 0 {
            return Err("pitch dimensions must be positive");
        }
        if self.pitch.goal_width <= 2 * self.ball_radius || self.pitch.goal_width > self.pitch.width {
            return Err("goal width must fit the ball and the pitch");
        }
        if self.player_radius <= 0 || self.ball_radius <= 0 {
            return Err("radii must be positive");
        }
        if self.control_speed <= 0 {
            return Err("control_speed must be positive");
        }
        if self.pass_travel_ticks == 0 {
            return Err("pass_travel_ticks must be positive");
        }
        if self.min_players == 0 || self.min_players > 11 {
            return Err("min_players must be within 1..=11");
        }
        if !(self.foul_force_threshold <= self.reckless_force
            && self.reckless_force <= self.dangerous_force)
        {
            return Err("foul thresholds must be ascending");
        }
        if self.cards_to_eject == 0 {
            return Err("cards_to_eject must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(EngineConfig::default().validate(), Ok(()));
        assert_eq!(EngineConfig::for_mode(GameMode::Arcade).validate(), Ok(()));
    }

    #[test]
    fn arcade_is_shorter_than_standard() {
        let standard = EngineConfig::for_mode(GameMode::Standard);
        let arcade = EngineConfig::for_mode(GameMode::Arcade);
        assert!(arcade.duration_ticks < standard.duration_ticks);
        assert_eq!(arcade.pitch, standard.pitch);
    }

    #[test]
    fn top_speed_scales_with_pace() {
        let config = EngineConfig::default();
        assert_eq!(config.top_speed(0), 80);
        assert_eq!(config.top_speed(100), 150);
        assert!(config.top_speed(60) > config.top_speed(40));
    }

    #[test]
    fn descending_foul_thresholds_are_rejected() {
        let config = EngineConfig {
            reckless_force: 10,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"duration_ticks": 600}"#).expect("partial config parses");
        assert_eq!(config.duration_ticks, 600);
        assert_eq!(config.tackle_radius, EngineConfig::default().tackle_radius);
    }
}

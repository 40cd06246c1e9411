use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    behavior::{PatrolConfig, WanderConfig},
    boss::BossConfig,
    combat::CombatConfig,
    perception::PerceptionConfig,
    planner::PlannerConfig,
    steering::{SteeringConfig, StuckConfig},
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: f32 },
    #[error("{field} must lie in [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
    #[error("{field} must be at least {min}, got {found}")]
    TooSmall {
        field: &'static str,
        found: usize,
        min: usize,
    },
    #[error("{low} ({low_value}) must not exceed {high} ({high_value})")]
    Inverted {
        low: &'static str,
        low_value: f32,
        high: &'static str,
        high_value: f32,
    },
}

/// Every tunable of one enemy. Missing sections and fields take their
/// defaults when deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnemyConfig {
    pub patrol_speed: f32,
    pub chase_speed: f32,
    /// Length of the death knockback nudge in seconds.
    pub knockback_duration: f32,
    pub planner: PlannerConfig,
    pub steering: SteeringConfig,
    pub stuck: StuckConfig,
    pub perception: PerceptionConfig,
    pub patrol: PatrolConfig,
    pub wander: WanderConfig,
    pub combat: CombatConfig,
    /// Present only for bosses.
    pub boss: Option<BossConfig>,
}

impl Default for EnemyConfig {
    fn default() -> Self {
        Self {
            patrol_speed: 1.5,
            chase_speed: 3.0,
            knockback_duration: 0.2,
            planner: PlannerConfig::default(),
            steering: SteeringConfig::default(),
            stuck: StuckConfig::default(),
            perception: PerceptionConfig::default(),
            patrol: PatrolConfig::default(),
            wander: WanderConfig::default(),
            combat: CombatConfig::default(),
            boss: None,
        }
    }
}

impl EnemyConfig {
    pub fn boss() -> Self {
        Self {
            chase_speed: 2.5,
            boss: Some(BossConfig::default()),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("patrol_speed", self.patrol_speed)?;
        positive("chase_speed", self.chase_speed)?;
        non_negative("knockback_duration", self.knockback_duration)?;

        positive("planner.node_size", self.planner.node_size)?;
        at_least("planner.max_expansions", self.planner.max_expansions, 1)?;
        within("planner.clearance_factor", self.planner.clearance_factor, 0.0, 1.0)?;
        positive("planner.replan_interval", self.planner.replan_interval)?;
        positive("planner.stuck_node_size_factor", self.planner.stuck_node_size_factor)?;

        positive(
            "steering.path_node_reached_distance",
            self.steering.path_node_reached_distance,
        )?;
        positive("steering.safety_distance", self.steering.safety_distance)?;
        within("steering.sharp_turn_dot", self.steering.sharp_turn_dot, -1.0, 1.0)?;
        within("steering.min_turn_speed", self.steering.min_turn_speed, 0.0, 1.0)?;
        non_negative("steering.agent_radius", self.steering.agent_radius)?;

        positive("stuck.check_interval", self.stuck.check_interval)?;
        at_least("stuck.replan_after", self.stuck.replan_after as usize, 1)?;
        if self.stuck.detour_after <= self.stuck.replan_after {
            return Err(ConfigError::Inverted {
                low: "stuck.replan_after",
                low_value: self.stuck.replan_after as f32,
                high: "stuck.detour_after",
                high_value: self.stuck.detour_after as f32,
            });
        }

        positive("perception.forget_time", self.perception.forget_time)?;
        if let Some(range) = self.perception.sight_range {
            positive("perception.sight_range", range)?;
        }
        non_negative("perception.first_attack_delay", self.perception.first_attack_delay)?;

        within(
            "patrol.turn_bias_flip_chance",
            self.patrol.turn_bias_flip_chance,
            0.0,
            1.0,
        )?;
        positive("patrol.look_ahead", self.patrol.look_ahead)?;
        positive("wander.look_ahead", self.wander.look_ahead)?;
        ordered(
            ("wander.min_pause", self.wander.min_pause),
            ("wander.max_pause", self.wander.max_pause),
        )?;

        non_negative("combat.melee_swing_duration", self.combat.melee_swing_duration)?;
        positive("combat.melee_hit_radius", self.combat.melee_hit_radius)?;
        positive("combat.out_of_ammo_wait", self.combat.out_of_ammo_wait)?;

        if let Some(boss) = &self.boss {
            ordered(("boss.min_range", boss.min_range), ("boss.max_range", boss.max_range))?;
            positive("boss.dash_speed", boss.dash_speed)?;
            positive("boss.duration", boss.duration)?;
            non_negative("boss.windup", boss.windup)?;
            non_negative("boss.cooldown", boss.cooldown)?;
        }
        Ok(())
    }
}

fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    within(field, value, 0.0, f32::INFINITY)
}

fn within(field: &'static str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

fn at_least(field: &'static str, found: usize, min: usize) -> Result<(), ConfigError> {
    if found >= min {
        Ok(())
    } else {
        Err(ConfigError::TooSmall { field, found, min })
    }
}

fn ordered(low: (&'static str, f32), high: (&'static str, f32)) -> Result<(), ConfigError> {
    non_negative(low.0, low.1)?;
    if low.1 <= high.1 {
        Ok(())
    } else {
        Err(ConfigError::Inverted {
            low: low.0,
            low_value: low.1,
            high: high.0,
            high_value: high.1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(EnemyConfig::default().validate(), Ok(()));
        assert_eq!(EnemyConfig::boss().validate(), Ok(()));
    }

    #[test]
    fn rejects_non_positive_speed() {
        let config = EnemyConfig {
            chase_speed: 0.0,
            ..EnemyConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::NotPositive {
                field: "chase_speed",
                value: 0.0
            })
        );
    }

    #[test]
    fn detour_must_come_after_replan() {
        let mut config = EnemyConfig::default();
        config.stuck.detour_after = 3;
        assert!(matches!(config.validate(), Err(ConfigError::Inverted { .. })));
    }

    #[test]
    fn boss_ranges_must_be_ordered() {
        let mut config = EnemyConfig::boss();
        if let Some(boss) = config.boss.as_mut() {
            boss.min_range = 8.0;
        }
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "boss.min_range (8) must not exceed boss.max_range (6)"
        );
    }

    #[test]
    fn zero_expansion_budget_is_rejected() {
        let mut config = EnemyConfig::default();
        config.planner.max_expansions = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::TooSmall {
                field: "planner.max_expansions",
                found: 0,
                min: 1
            })
        );
    }
}

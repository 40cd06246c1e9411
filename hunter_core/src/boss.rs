use glam::Vec2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    EntityId,
    combat::{AttackKind, HitReport},
    obstacle::{ObstacleQuery, segment_distance},
    perception::TargetState,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BossConfig {
    /// Closest target distance that starts a dash.
    pub min_range: f32,
    /// Furthest target distance that starts a dash.
    pub max_range: f32,
    /// Seconds spent standing still before the charge.
    pub windup: f32,
    pub dash_speed: f32,
    /// Length of the charge in seconds.
    pub duration: f32,
    /// Seconds from the end of one dash to the earliest next windup.
    pub cooldown: f32,
    pub hit_radius: f32,
    pub damage: f32,
    pub lethal: bool,
}

impl Default for BossConfig {
    fn default() -> Self {
        Self {
            min_range: 1.5,
            max_range: 6.0,
            windup: 0.6,
            dash_speed: 9.0,
            duration: 0.4,
            cooldown: 3.0,
            hit_radius: 0.6,
            damage: 2.0,
            lethal: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum DashPhase {
    #[default]
    Idle,
    Windup {
        until: f32,
        direction: Vec2,
    },
    Dashing {
        until: f32,
        direction: Vec2,
        hit_landed: bool,
    },
}

/// Movement the dash imposes on this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DashTick {
    pub velocity: Vec2,
    pub facing: Vec2,
    pub hit: Option<HitReport>,
}

impl DashTick {
    fn hold(facing: Vec2) -> Self {
        Self {
            velocity: Vec2::ZERO,
            facing,
            hit: None,
        }
    }
}

/// Per-tick inputs of the dash.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DashInput {
    pub now: f32,
    pub dt: f32,
    pub attacker: EntityId,
    pub position: Vec2,
    pub target: Option<TargetState>,
    pub sees_target: bool,
    /// Body radius used when testing the next dash position.
    pub radius: f32,
}

/// Windup and charge layered on top of pursuit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashAttack {
    phase: DashPhase,
    ready_at: f32,
}

impl DashAttack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> DashPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase != DashPhase::Idle
    }

    /// Abandons any windup or charge without starting the cooldown.
    pub fn cancel(&mut self) {
        self.phase = DashPhase::Idle;
    }

    /// Returns `None` while idle and not triggering, in which case the caller
    /// steers and attacks as usual.
    pub fn tick<Q: ObstacleQuery + ?Sized>(
        &mut self,
        input: &DashInput,
        obstacles: &Q,
        config: &BossConfig,
    ) -> Option<DashTick> {
        let live_target = input.target.filter(|t| t.alive);
        let aim = live_target.and_then(|t| (t.position - input.position).try_normalize());

        match self.phase {
            DashPhase::Idle => {
                let in_range = live_target.is_some_and(|t| {
                    let distance = input.position.distance(t.position);
                    (config.min_range..=config.max_range).contains(&distance)
                });
                let direction = aim.filter(|_| {
                    input.sees_target && in_range && input.now >= self.ready_at
                })?;
                debug!(attacker = input.attacker, "dash windup");
                self.phase = DashPhase::Windup {
                    until: input.now + config.windup,
                    direction,
                };
                Some(DashTick::hold(direction))
            }
            DashPhase::Windup { until, direction } => {
                let direction = aim.filter(|_| input.sees_target).unwrap_or(direction);
                if input.now < until {
                    self.phase = DashPhase::Windup { until, direction };
                    return Some(DashTick::hold(direction));
                }
                debug!(attacker = input.attacker, ?direction, "dash charge");
                self.phase = DashPhase::Dashing {
                    until: input.now + config.duration,
                    direction,
                    hit_landed: false,
                };
                self.charge(input, live_target, obstacles, config)
            }
            DashPhase::Dashing { .. } => self.charge(input, live_target, obstacles, config),
        }
    }

    fn charge<Q: ObstacleQuery + ?Sized>(
        &mut self,
        input: &DashInput,
        target: Option<TargetState>,
        obstacles: &Q,
        config: &BossConfig,
    ) -> Option<DashTick> {
        let DashPhase::Dashing {
            until,
            direction,
            hit_landed,
        } = self.phase
        else {
            return None;
        };
        if input.now >= until {
            self.finish(input.now, config);
            return None;
        }

        let velocity = direction * config.dash_speed;
        let next = input.position + velocity * input.dt;
        if obstacles.is_blocked(next, input.radius) {
            debug!(attacker = input.attacker, "dash blocked");
            self.finish(input.now, config);
            return Some(DashTick::hold(direction));
        }

        let touching = |t: &TargetState| {
            segment_distance(input.position, next, t.position) <= config.hit_radius
        };
        let hit = target
            .filter(|t| !hit_landed && touching(t))
            .map(|t| HitReport {
                attacker: input.attacker,
                kind: AttackKind::Dash,
                position: t.position,
                damage: config.damage,
                lethal: config.lethal,
            });
        self.phase = DashPhase::Dashing {
            until,
            direction,
            hit_landed: hit_landed || hit.is_some(),
        };
        Some(DashTick {
            velocity,
            facing: direction,
            hit,
        })
    }

    fn finish(&mut self, now: f32, config: &BossConfig) {
        self.phase = DashPhase::Idle;
        self.ready_at = now + config.cooldown;
    }
}

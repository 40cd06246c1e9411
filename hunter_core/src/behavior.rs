use std::f32::consts::TAU;

use glam::Vec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::obstacle::ObstacleQuery;

/// Top-level mode of an enemy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BehaviorState {
    /// Walk a heading, turn 90 degrees at walls.
    #[default]
    Patrol,
    /// Chase and attack the target.
    Pursue,
    /// Idle wandering, started by the host.
    Random,
    /// Terminal.
    Dead,
}

impl BehaviorState {
    pub fn is_dead(self) -> bool {
        self == BehaviorState::Dead
    }

    /// Whether `self -> next` is a legal transition. Nothing leaves `Dead`.
    pub fn can_transition_to(self, next: BehaviorState) -> bool {
        match (self, next) {
            (Self::Dead, _) => false,
            (from, to) if from == to => false,
            (_, Self::Dead) => true,
            (Self::Patrol | Self::Random, Self::Pursue) => true,
            (Self::Pursue, Self::Patrol) => true,
            (Self::Patrol, Self::Random) | (Self::Random, Self::Patrol) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatrolConfig {
    /// Obstacle probe length ahead of the agent.
    pub look_ahead: f32,
    /// Pause after each turn, in seconds.
    pub turn_pause: f32,
    /// Chance per turn that the preferred turn direction flips.
    pub turn_bias_flip_chance: f32,
}

impl Default for PatrolConfig {
    fn default() -> Self {
        Self {
            look_ahead: 0.8,
            turn_pause: 0.5,
            turn_bias_flip_chance: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WanderConfig {
    pub look_ahead: f32,
    pub min_pause: f32,
    pub max_pause: f32,
    /// Random headings tried before giving up for this pause.
    pub heading_attempts: u32,
}

impl Default for WanderConfig {
    fn default() -> Self {
        Self {
            look_ahead: 0.8,
            min_pause: 0.5,
            max_pause: 2.0,
            heading_attempts: 8,
        }
    }
}

/// Straight-line patrol with right-angle turns at walls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patrol {
    heading: Vec2,
    turn_right: bool,
    paused_until: f32,
}

impl Patrol {
    pub fn new(heading: Vec2) -> Self {
        Self {
            heading: heading.try_normalize().unwrap_or(Vec2::X),
            turn_right: true,
            paused_until: 0.0,
        }
    }

    pub fn heading(&self) -> Vec2 {
        self.heading
    }

    pub fn turns_right(&self) -> bool {
        self.turn_right
    }

    /// Returns the unit direction to walk this tick, or zero while paused.
    pub fn tick<Q: ObstacleQuery + ?Sized, R: Rng>(
        &mut self,
        now: f32,
        position: Vec2,
        obstacles: &Q,
        config: &PatrolConfig,
        rng: &mut R,
    ) -> Vec2 {
        if now < self.paused_until {
            return Vec2::ZERO;
        }
        if obstacles
            .raycast_distance(position, self.heading, config.look_ahead)
            .is_none()
        {
            return self.heading;
        }

        if rng.random_bool(f64::from(config.turn_bias_flip_chance.clamp(0.0, 1.0))) {
            self.turn_right = !self.turn_right;
        }
        let h = self.heading;
        self.heading = if self.turn_right {
            Vec2::new(h.y, -h.x)
        } else {
            h.perp()
        };
        self.paused_until = now + config.turn_pause;
        Vec2::ZERO
    }
}

impl Default for Patrol {
    fn default() -> Self {
        Self::new(Vec2::X)
    }
}

/// Random walk that pauses whenever it meets an obstruction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Wander {
    heading: Option<Vec2>,
    paused_until: f32,
}

impl Wander {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn heading(&self) -> Option<Vec2> {
        self.heading
    }

    pub fn tick<Q: ObstacleQuery + ?Sized, R: Rng>(
        &mut self,
        now: f32,
        position: Vec2,
        obstacles: &Q,
        config: &WanderConfig,
        rng: &mut R,
    ) -> Vec2 {
        if now < self.paused_until {
            return Vec2::ZERO;
        }
        let clear = |heading: Vec2| {
            obstacles
                .raycast_distance(position, heading, config.look_ahead)
                .is_none()
        };

        if self.heading.is_none() {
            self.heading = (0..config.heading_attempts)
                .map(|_| Vec2::from_angle(rng.random_range(0.0..TAU)))
                .find(|&heading| clear(heading));
        }
        match self.heading {
            Some(heading) if clear(heading) => heading,
            _ => {
                self.heading = None;
                self.paused_until = now + random_pause(config, rng);
                Vec2::ZERO
            }
        }
    }
}

fn random_pause<R: Rng>(config: &WanderConfig, rng: &mut R) -> f32 {
    if config.max_pause > config.min_pause {
        rng.random_range(config.min_pause..=config.max_pause)
    } else {
        config.min_pause
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::TileMap;
    use rand::{SeedableRng, rngs::StdRng};
    use rstest::rstest;

    use BehaviorState as S;

    #[rstest]
    #[case(S::Patrol, S::Pursue, true)]
    #[case(S::Random, S::Pursue, true)]
    #[case(S::Pursue, S::Patrol, true)]
    #[case(S::Pursue, S::Random, false)]
    #[case(S::Pursue, S::Dead, true)]
    #[case(S::Dead, S::Patrol, false)]
    #[case(S::Dead, S::Pursue, false)]
    #[case(S::Patrol, S::Patrol, false)]
    fn transition_table(
        #[case] from: BehaviorState,
        #[case] to: BehaviorState,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn patrol_walks_until_a_wall_then_turns_and_pauses() {
        let mut map = TileMap::open(10, 10, 1.0);
        map.fill_walls(6, 0, 6, 9).unwrap();
        let config = PatrolConfig {
            turn_bias_flip_chance: 0.0,
            ..PatrolConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let mut patrol = Patrol::new(Vec2::X);

        assert_eq!(patrol.tick(0.0, Vec2::new(2.5, 5.5), &map, &config, &mut rng), Vec2::X);
        let at_wall = Vec2::new(5.5, 5.5);
        assert_eq!(patrol.tick(1.0, at_wall, &map, &config, &mut rng), Vec2::ZERO);
        assert_eq!(patrol.heading(), Vec2::new(0.0, -1.0));
        // Still paused.
        assert_eq!(patrol.tick(1.2, at_wall, &map, &config, &mut rng), Vec2::ZERO);
        assert_eq!(
            patrol.tick(1.5, at_wall, &map, &config, &mut rng),
            Vec2::new(0.0, -1.0)
        );
    }

    #[test]
    fn certain_flip_alternates_turn_direction() {
        let map = TileMap::open(1, 1, 1.0);
        let config = PatrolConfig {
            turn_bias_flip_chance: 1.0,
            turn_pause: 0.0,
            ..PatrolConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let mut patrol = Patrol::new(Vec2::X);
        // Every heading sees the map edge within 0.8.
        let centre = Vec2::new(0.5, 0.5);
        patrol.tick(0.0, centre, &map, &config, &mut rng);
        assert!(!patrol.turns_right());
        assert_eq!(patrol.heading(), Vec2::new(0.0, 1.0));
        patrol.tick(0.1, centre, &map, &config, &mut rng);
        assert!(patrol.turns_right());
        assert_eq!(patrol.heading(), Vec2::new(1.0, 0.0));
    }

    #[test]
    fn wander_picks_a_clear_heading_and_pauses_when_boxed_in() {
        let open = TileMap::open(20, 20, 1.0);
        let config = WanderConfig::default();
        let mut rng = StdRng::seed_from_u64(9);
        let mut wander = Wander::new();
        let dir = wander.tick(0.0, Vec2::new(10.0, 10.0), &open, &config, &mut rng);
        assert!((dir.length() - 1.0).abs() < 1e-5);
        assert_eq!(wander.heading(), Some(dir));

        let closet = TileMap::open(1, 1, 1.0);
        let mut boxed = Wander::new();
        let still = boxed.tick(0.0, Vec2::new(0.5, 0.5), &closet, &config, &mut rng);
        assert_eq!(still, Vec2::ZERO);
        assert!(boxed.heading().is_none());
        assert_eq!(boxed.tick(0.4, Vec2::new(0.5, 0.5), &closet, &config, &mut rng), Vec2::ZERO);
    }
}

use glam::Vec2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::obstacle::ObstacleQuery;

/// Snapshot of the pursued entity for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetState {
    pub position: Vec2,
    pub alive: bool,
}

impl TargetState {
    pub fn alive_at(position: Vec2) -> Self {
        Self {
            position,
            alive: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerceptionConfig {
    /// Seconds without contact before pursuit is abandoned.
    pub forget_time: f32,
    /// Maximum sight distance. `None` means unlimited.
    pub sight_range: Option<f32>,
    /// Delay before the first attack after the target is spotted.
    pub first_attack_delay: f32,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            forget_time: 5.0,
            sight_range: None,
            first_attack_delay: 0.5,
        }
    }
}

/// Line-of-sight test between the agent and its target.
pub fn can_see<Q: ObstacleQuery + ?Sized>(
    eye: Vec2,
    agent_alive: bool,
    target: Option<&TargetState>,
    obstacles: &Q,
    sight_range: Option<f32>,
) -> bool {
    let Some(target) = target else {
        return false;
    };
    agent_alive
        && target.alive
        && sight_range.is_none_or(|range| eye.distance(target.position) <= range)
        && obstacles.is_clear_line(eye, target.position)
}

/// Transition requests raised by perception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PerceptionEvent {
    None,
    /// Target seen or heard while not pursuing.
    Acquired,
    /// No contact for longer than the forget time.
    Forgotten,
    /// The pursued target is confirmed dead.
    TargetDied,
}

/// What the agent remembers about its target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Perception {
    has_spotted: bool,
    sees_target: bool,
    last_contact_at: Option<f32>,
    last_known_position: Option<Vec2>,
}

impl Perception {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_spotted(&self) -> bool {
        self.has_spotted
    }

    pub fn sees_target(&self) -> bool {
        self.sees_target
    }

    /// Time of the last sighting or sound.
    pub fn last_contact_at(&self) -> Option<f32> {
        self.last_contact_at
    }

    pub fn last_known_position(&self) -> Option<Vec2> {
        self.last_known_position
    }

    /// Folds this tick's sight result into memory.
    pub fn observe(
        &mut self,
        now: f32,
        sighting: Option<&TargetState>,
        target: Option<&TargetState>,
        pursuing: bool,
        config: &PerceptionConfig,
    ) -> PerceptionEvent {
        if pursuing && target.is_some_and(|t| !t.alive) {
            debug!("pursued target is dead");
            self.forget();
            return PerceptionEvent::TargetDied;
        }

        if let Some(seen) = sighting {
            self.has_spotted = true;
            self.sees_target = true;
            self.last_contact_at = Some(now);
            self.last_known_position = Some(seen.position);
            return if pursuing {
                PerceptionEvent::None
            } else {
                PerceptionEvent::Acquired
            };
        }

        self.sees_target = false;
        let forgotten = self
            .last_contact_at
            .is_none_or(|at| now - at >= config.forget_time);
        if pursuing && forgotten {
            debug!(last_contact = ?self.last_contact_at, "target forgotten");
            self.forget();
            return PerceptionEvent::Forgotten;
        }
        PerceptionEvent::None
    }

    /// A noise at `source` counts as contact without sight.
    pub fn hear(&mut self, now: f32, source: Vec2, pursuing: bool) -> PerceptionEvent {
        self.last_contact_at = Some(now);
        self.last_known_position = Some(source);
        if pursuing {
            PerceptionEvent::None
        } else {
            PerceptionEvent::Acquired
        }
    }

    /// Drops contact memory. The spotted flag survives.
    pub fn forget(&mut self) {
        self.sees_target = false;
        self.last_contact_at = None;
        self.last_known_position = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::TileMap;

    fn walled() -> TileMap {
        let mut map = TileMap::open(10, 10, 1.0);
        map.fill_walls(5, 0, 5, 9).unwrap();
        map
    }

    #[test]
    fn sight_needs_both_alive_and_a_clear_line() {
        let map = walled();
        let eye = Vec2::new(1.5, 1.5);
        let near = TargetState::alive_at(Vec2::new(3.5, 3.5));
        let behind_wall = TargetState::alive_at(Vec2::new(8.5, 1.5));
        let dead = TargetState {
            alive: false,
            ..near
        };

        assert!(can_see(eye, true, Some(&near), &map, None));
        assert!(!can_see(eye, false, Some(&near), &map, None));
        assert!(!can_see(eye, true, Some(&dead), &map, None));
        assert!(!can_see(eye, true, Some(&behind_wall), &map, None));
        assert!(!can_see(eye, true, None, &map, None));
        assert!(!can_see(eye, true, Some(&near), &map, Some(2.0)));
    }

    #[test]
    fn forget_time_runs_from_the_last_sighting() {
        let config = PerceptionConfig::default();
        let target = TargetState::alive_at(Vec2::ONE);
        let mut memory = Perception::new();

        let seen = memory.observe(1.0, Some(&target), Some(&target), false, &config);
        assert_eq!(seen, PerceptionEvent::Acquired);
        assert!(memory.has_spotted());

        assert_eq!(memory.observe(2.0, None, Some(&target), true, &config), PerceptionEvent::None);
        assert_eq!(memory.observe(5.9, None, Some(&target), true, &config), PerceptionEvent::None);
        assert_eq!(
            memory.observe(6.0, None, Some(&target), true, &config),
            PerceptionEvent::Forgotten
        );
        assert!(memory.last_known_position().is_none());
    }

    #[test]
    fn dead_target_ends_pursuit_at_once() {
        let config = PerceptionConfig::default();
        let mut memory = Perception::new();
        let alive = TargetState::alive_at(Vec2::ONE);
        memory.observe(0.0, Some(&alive), Some(&alive), false, &config);
        let dead = TargetState {
            alive: false,
            ..alive
        };
        assert_eq!(
            memory.observe(0.1, None, Some(&dead), true, &config),
            PerceptionEvent::TargetDied
        );
    }

    #[test]
    fn sound_is_contact_without_sight() {
        let mut memory = Perception::new();
        assert_eq!(memory.hear(3.0, Vec2::new(4.0, 4.0), false), PerceptionEvent::Acquired);
        assert_eq!(memory.last_known_position(), Some(Vec2::new(4.0, 4.0)));
        assert_eq!(memory.last_contact_at(), Some(3.0));
        assert!(!memory.sees_target());
        assert_eq!(memory.hear(3.5, Vec2::new(4.0, 5.0), true), PerceptionEvent::None);
    }
}

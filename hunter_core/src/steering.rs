use std::f32::consts::TAU;

use glam::Vec2;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::obstacle::ObstacleQuery;

/// Headings tried, in degrees either side of the desired one, when the direct
/// step is blocked.
pub const DEFLECTION_ANGLES_DEG: [f32; 5] = [15.0, 30.0, 45.0, 60.0, 75.0];

/// Tunables for waypoint following and local avoidance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringConfig {
    /// A waypoint counts as reached within this distance.
    pub path_node_reached_distance: f32,
    /// Length of the repulsion probes.
    pub safety_distance: f32,
    /// Number of evenly spaced repulsion probes.
    pub probe_count: usize,
    /// Weight of the repulsion vector relative to the desired direction.
    pub repulsion_weight: f32,
    /// Legs meeting with a dot product below this count as a sharp turn.
    pub sharp_turn_dot: f32,
    /// Speed multiplier applied for a full reversal.
    pub min_turn_speed: f32,
    /// Body radius used when testing the next position.
    pub agent_radius: f32,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            path_node_reached_distance: 0.25,
            safety_distance: 0.75,
            probe_count: 8,
            repulsion_weight: 1.0,
            sharp_turn_dot: 0.7,
            min_turn_speed: 0.6,
            agent_radius: 0.3,
        }
    }
}

/// Tunables for stuck detection and recovery.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StuckConfig {
    /// Seconds between displacement samples.
    pub check_interval: f32,
    /// Movement below this between samples counts as stuck.
    pub min_displacement: f32,
    /// Consecutive stuck samples before a forced re-plan.
    pub replan_after: u32,
    /// Consecutive stuck samples before the path is replaced by a detour.
    pub detour_after: u32,
    /// Length of the random detour leg.
    pub detour_distance: f32,
    /// Random headings tried when picking a detour.
    pub detour_attempts: u32,
}

impl Default for StuckConfig {
    fn default() -> Self {
        Self {
            check_interval: 0.5,
            min_displacement: 0.05,
            replan_after: 3,
            detour_after: 6,
            detour_distance: 2.0,
            detour_attempts: 12,
        }
    }
}

/// Output of one steering step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Steering {
    /// Unit heading, or zero when the agent should hold still.
    pub direction: Vec2,
    /// In `[min_turn_speed, 1.0]`.
    pub speed_multiplier: f32,
}

impl Steering {
    pub const IDLE: Steering = Steering {
        direction: Vec2::ZERO,
        speed_multiplier: 1.0,
    };

    pub fn velocity(&self, speed: f32) -> Vec2 {
        self.direction * speed * self.speed_multiplier
    }
}

/// Waypoint list with a forward-only cursor.
///
/// The cursor lies in `[0, len]`; once it reaches `len` the follower steers
/// straight at the goal it is given.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathFollower {
    waypoints: Vec<Vec2>,
    cursor: usize,
}

impl PathFollower {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole path and rewinds the cursor.
    pub fn set_path(&mut self, waypoints: Vec<Vec2>) {
        self.waypoints = waypoints;
        self.cursor = 0;
    }

    pub fn clear(&mut self) {
        self.set_path(Vec::new());
    }

    pub fn waypoints(&self) -> &[Vec2] {
        &self.waypoints
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// `true` while there are waypoints left to visit.
    pub fn has_path(&self) -> bool {
        self.cursor < self.waypoints.len()
    }

    pub fn current_waypoint(&self) -> Option<Vec2> {
        self.waypoints.get(self.cursor).copied()
    }

    pub fn final_waypoint(&self) -> Option<Vec2> {
        self.waypoints.last().copied()
    }

    /// Moves the cursor past reached waypoints, then jumps to the furthest
    /// later waypoint that is in direct sight.
    pub fn advance<Q: ObstacleQuery + ?Sized>(
        &mut self,
        position: Vec2,
        obstacles: &Q,
        config: &SteeringConfig,
    ) {
        while let Some(waypoint) = self.current_waypoint() {
            if position.distance(waypoint) > config.path_node_reached_distance {
                break;
            }
            self.cursor += 1;
        }
        let visible = (self.cursor + 1..self.waypoints.len())
            .rev()
            .find(|&i| obstacles.is_clear_line(position, self.waypoints[i]));
        if let Some(index) = visible {
            trace!(from = self.cursor, to = index, "skipping to visible waypoint");
            self.cursor = index;
        }
    }

    /// Computes the heading for this tick.
    ///
    /// `step_length` is the distance the agent would cover at full speed this
    /// tick; it is used to test the next position against walls. `goal` is
    /// used once the path is exhausted.
    pub fn steer<Q: ObstacleQuery + ?Sized>(
        &mut self,
        position: Vec2,
        goal: Vec2,
        step_length: f32,
        obstacles: &Q,
        config: &SteeringConfig,
    ) -> Steering {
        self.advance(position, obstacles, config);
        let target = self.current_waypoint().unwrap_or(goal);
        let desired = (target - position).normalize_or_zero();
        if desired == Vec2::ZERO {
            return Steering::IDLE;
        }

        let push = repulsion(position, obstacles, config.safety_distance, config.probe_count);
        let blended = (desired + push * config.repulsion_weight).normalize_or_zero();
        let heading = if blended == Vec2::ZERO { desired } else { blended };

        let speed_multiplier = self.turn_speed_multiplier(position, config);
        let direction = deflect(
            position,
            heading,
            step_length * speed_multiplier,
            obstacles,
            config.agent_radius,
        )
        .unwrap_or(Vec2::ZERO);

        Steering {
            direction,
            speed_multiplier,
        }
    }

    /// Slows down ahead of sharp corners.
    fn turn_speed_multiplier(&self, position: Vec2, config: &SteeringConfig) -> f32 {
        let (Some(current), Some(&next)) = (
            self.current_waypoint(),
            self.waypoints.get(self.cursor + 1),
        ) else {
            return 1.0;
        };
        let leg = (current - position).normalize_or_zero();
        let following = (next - current).normalize_or_zero();
        if leg == Vec2::ZERO || following == Vec2::ZERO {
            return 1.0;
        }
        let dot = leg.dot(following);
        if dot >= config.sharp_turn_dot {
            return 1.0;
        }
        let t = ((dot + 1.0) / (config.sharp_turn_dot + 1.0)).clamp(0.0, 1.0);
        config.min_turn_speed + (1.0 - config.min_turn_speed) * t
    }
}

/// Sum of push-away vectors from `probe_count` evenly spaced rays. Each ray
/// hitting a wall at distance `d < safety` contributes `(safety - d) / safety`.
pub fn repulsion<Q: ObstacleQuery + ?Sized>(
    position: Vec2,
    obstacles: &Q,
    safety_distance: f32,
    probe_count: usize,
) -> Vec2 {
    if probe_count == 0 || safety_distance <= 0.0 {
        return Vec2::ZERO;
    }
    (0..probe_count)
        .map(|i| Vec2::from_angle(TAU * i as f32 / probe_count as f32))
        .fold(Vec2::ZERO, |push, ray| {
            match obstacles.raycast_distance(position, ray, safety_distance) {
                Some(hit) if hit < safety_distance => {
                    push - ray * ((safety_distance - hit) / safety_distance)
                }
                _ => push,
            }
        })
}

/// Returns `direction` if a step along it is free, otherwise the first free
/// heading among the deflection angles, alternating sides.
pub fn deflect<Q: ObstacleQuery + ?Sized>(
    position: Vec2,
    direction: Vec2,
    step_length: f32,
    obstacles: &Q,
    radius: f32,
) -> Option<Vec2> {
    let free = |heading: Vec2| !obstacles.is_blocked(position + heading * step_length, radius);
    if free(direction) {
        return Some(direction);
    }
    DEFLECTION_ANGLES_DEG
        .iter()
        .flat_map(|deg| [deg.to_radians(), -deg.to_radians()])
        .map(|angle| Vec2::from_angle(angle).rotate(direction))
        .find(|&heading| free(heading))
}

/// What stuck detection asks the controller to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StuckResponse {
    None,
    /// Re-plan now with an enlarged cell size.
    Replan,
    /// Drop the path and take a random detour.
    Detour,
}

/// Periodic displacement sampling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StuckMonitor {
    last_position: Option<Vec2>,
    next_check_at: f32,
    counter: u32,
}

impl StuckMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Feeds the current position. Only acts once per `check_interval`.
    pub fn sample(
        &mut self,
        now: f32,
        position: Vec2,
        has_path: bool,
        config: &StuckConfig,
    ) -> StuckResponse {
        if now < self.next_check_at {
            return StuckResponse::None;
        }
        self.next_check_at = now + config.check_interval;

        let Some(previous) = self.last_position.replace(position) else {
            return StuckResponse::None;
        };
        if !has_path || previous.distance(position) >= config.min_displacement {
            self.counter = 0;
            return StuckResponse::None;
        }

        self.counter += 1;
        if self.counter >= config.detour_after {
            self.counter = 0;
            StuckResponse::Detour
        } else if self.counter == config.replan_after {
            StuckResponse::Replan
        } else {
            StuckResponse::None
        }
    }
}

/// Picks a waypoint along a random heading that is clear for the full
/// `detour_distance`. Falls back to the most open heading found, stopping
/// short of the wall by `radius`.
pub fn random_detour<Q: ObstacleQuery + ?Sized, R: Rng>(
    position: Vec2,
    obstacles: &Q,
    config: &StuckConfig,
    radius: f32,
    rng: &mut R,
) -> Option<Vec2> {
    let mut best: Option<(f32, Vec2)> = None;
    for _ in 0..config.detour_attempts {
        let heading = Vec2::from_angle(rng.random_range(0.0..TAU));
        match obstacles.raycast_distance(position, heading, config.detour_distance) {
            None => return Some(position + heading * config.detour_distance),
            Some(hit) if best.is_none_or(|(d, _)| hit > d) => best = Some((hit, heading)),
            Some(_) => {}
        }
    }
    best.filter(|(hit, _)| *hit > radius * 2.0)
        .map(|(hit, heading)| position + heading * (hit - radius))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::TileMap;
    use approx::assert_relative_eq;
    use rand::{SeedableRng, rngs::StdRng};

    fn room() -> TileMap {
        let mut map = TileMap::open(20, 20, 1.0);
        map.fill_walls(10, 0, 10, 14).unwrap();
        map
    }

    #[test]
    fn reached_waypoints_advance_the_cursor() {
        let map = room();
        let mut follower = PathFollower::new();
        // Last two are hidden behind the wall from the start.
        follower.set_path(vec![
            Vec2::new(5.0, 5.0),
            Vec2::new(5.0, 16.0),
            Vec2::new(15.0, 16.0),
            Vec2::new(15.0, 5.0),
        ]);
        follower.advance(Vec2::new(5.1, 5.0), &map, &SteeringConfig::default());
        assert_eq!(follower.cursor(), 1);
    }

    #[test]
    fn visible_later_waypoint_is_skipped_to() {
        let map = room();
        let mut follower = PathFollower::new();
        follower.set_path(vec![
            Vec2::new(3.0, 3.0),
            Vec2::new(4.0, 4.0),
            Vec2::new(5.0, 16.0),
            Vec2::new(15.0, 16.0),
        ]);
        follower.advance(Vec2::new(2.0, 2.0), &map, &SteeringConfig::default());
        assert_eq!(follower.cursor(), 2);
    }

    #[test]
    fn exhausted_path_steers_at_goal() {
        let map = TileMap::open(20, 20, 1.0);
        let mut follower = PathFollower::new();
        let steering = follower.steer(
            Vec2::new(5.0, 5.0),
            Vec2::new(9.0, 5.0),
            0.1,
            &map,
            &SteeringConfig::default(),
        );
        assert!(!follower.has_path());
        assert_relative_eq!(steering.direction.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(steering.speed_multiplier, 1.0);
    }

    #[test]
    fn repulsion_is_zero_in_the_open_and_pushes_off_walls() {
        let map = room();
        assert_eq!(repulsion(Vec2::new(5.0, 5.0), &map, 0.75, 8), Vec2::ZERO);
        let push = repulsion(Vec2::new(9.5, 5.0), &map, 0.75, 8);
        assert!(push.x < 0.0);
        assert_relative_eq!(push.y, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn blocked_step_deflects_to_a_free_heading() {
        let map = room();
        let position = Vec2::new(9.5, 5.0);
        let heading = deflect(position, Vec2::X, 0.4, &map, 0.2).unwrap();
        assert!(heading.x < 1.0);
        assert!(!map.is_blocked(position + heading * 0.4, 0.2));
    }

    #[test]
    fn sharp_turn_slows_down() {
        let config = SteeringConfig::default();
        let mut follower = PathFollower::new();
        follower.set_path(vec![Vec2::new(5.0, 5.0), Vec2::new(1.0, 5.0)]);
        let reversal = follower.turn_speed_multiplier(Vec2::new(3.0, 5.0), &config);
        assert_relative_eq!(reversal, config.min_turn_speed, epsilon = 1e-5);

        follower.set_path(vec![Vec2::new(5.0, 5.0), Vec2::new(9.0, 5.0)]);
        assert_relative_eq!(follower.turn_speed_multiplier(Vec2::new(3.0, 5.0), &config), 1.0);

        follower.set_path(vec![Vec2::new(5.0, 5.0), Vec2::new(5.0, 9.0)]);
        let right_angle = follower.turn_speed_multiplier(Vec2::new(3.0, 5.0), &config);
        assert!(right_angle > config.min_turn_speed && right_angle < 1.0);
    }

    #[test]
    fn stuck_samples_escalate_then_reset() {
        let config = StuckConfig::default();
        let mut monitor = StuckMonitor::new();
        let here = Vec2::new(2.0, 2.0);
        let mut responses = Vec::new();
        for i in 0..=7 {
            responses.push(monitor.sample(i as f32 * 0.5, here, true, &config));
        }
        // First sample only records a baseline.
        assert_eq!(
            responses,
            vec![
                StuckResponse::None,
                StuckResponse::None,
                StuckResponse::None,
                StuckResponse::Replan,
                StuckResponse::None,
                StuckResponse::None,
                StuckResponse::Detour,
                StuckResponse::None,
            ]
        );
        assert_eq!(monitor.counter(), 1);
    }

    #[test]
    fn movement_or_no_path_clears_the_counter() {
        let config = StuckConfig::default();
        let mut monitor = StuckMonitor::new();
        monitor.sample(0.0, Vec2::ZERO, true, &config);
        monitor.sample(0.5, Vec2::ZERO, true, &config);
        assert_eq!(monitor.counter(), 1);
        monitor.sample(1.0, Vec2::new(1.0, 0.0), true, &config);
        assert_eq!(monitor.counter(), 0);
        monitor.sample(1.5, Vec2::new(1.0, 0.0), false, &config);
        assert_eq!(monitor.counter(), 0);
        // Samples between intervals are ignored.
        assert_eq!(
            monitor.sample(1.6, Vec2::new(1.0, 0.0), true, &config),
            StuckResponse::None
        );
        assert_eq!(monitor.counter(), 0);
    }

    #[test]
    fn detour_is_clear_and_at_full_length_in_the_open() {
        let map = TileMap::open(20, 20, 1.0);
        let mut rng = StdRng::seed_from_u64(3);
        let origin = Vec2::new(10.0, 10.0);
        let config = StuckConfig::default();
        let waypoint = random_detour(origin, &map, &config, 0.3, &mut rng).unwrap();
        assert_relative_eq!(waypoint.distance(origin), config.detour_distance, epsilon = 1e-4);
        assert!(map.is_clear_line(origin, waypoint));
    }
}

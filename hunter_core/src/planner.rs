use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, HashSet},
};

use glam::Vec2;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{
    grid::{GridCell, NEIGHBOURS, STRAIGHT_COST, grid_to_world, world_to_grid},
    obstacle::ObstacleQuery,
    simplify::simplify,
};

/// Tunables for path planning and its re-planning cadence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Edge length of a planning cell in world units.
    pub node_size: f32,
    /// Hard cap on node expansions per planning call.
    pub max_expansions: usize,
    /// Clearance radius used to test a cell, as a fraction of `node_size`.
    pub clearance_factor: f32,
    /// Seconds between periodic re-plans while pursuing.
    pub replan_interval: f32,
    /// Multiplier applied to `node_size` for the re-plan forced by stuck detection.
    pub stuck_node_size_factor: f32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            node_size: 0.5,
            max_expansions: 500,
            clearance_factor: 0.4,
            replan_interval: 0.5,
            stuck_node_size_factor: 1.5,
        }
    }
}

/// How a plan was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanOutcome {
    /// The goal was directly visible.
    Direct,
    /// A* reached the goal cell.
    Found,
    /// The search gave up; the path is a straight line to the goal that may
    /// cross walls. Local steering is expected to cope.
    Fallback,
}

/// Result of a planning call.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// Simplified waypoints, start excluded, ending exactly at the goal.
    pub waypoints: Vec<Vec2>,
    pub outcome: PlanOutcome,
    /// Number of nodes expanded by the search.
    pub expansions: usize,
}

/// Per-call bookkeeping for one cell of the search.
#[derive(Debug, Clone, Copy)]
struct PathNode {
    g_cost: u32,
    h_cost: u32,
    parent: Option<GridCell>,
}

impl PathNode {
    #[inline]
    fn f_cost(&self) -> u32 {
        self.g_cost + self.h_cost
    }

    fn entry(&self, cell: GridCell) -> OpenEntry {
        OpenEntry {
            f_cost: self.f_cost(),
            h_cost: self.h_cost,
            cell,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenEntry {
    f_cost: u32,
    h_cost: u32,
    cell: GridCell,
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap: lowest f first, then lowest h.
        other
            .f_cost
            .cmp(&self.f_cost)
            .then_with(|| other.h_cost.cmp(&self.h_cost))
            .then_with(|| other.cell.cmp(&self.cell))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Memoised cell occupancy for a single planning call.
struct Occupancy<'a, Q: ?Sized> {
    obstacles: &'a Q,
    node_size: f32,
    radius: f32,
    goal: GridCell,
    cache: HashMap<GridCell, bool>,
}

impl<Q: ObstacleQuery + ?Sized> Occupancy<'_, Q> {
    fn blocked(&mut self, cell: GridCell) -> bool {
        // The target stands in the goal cell, so it is always enterable.
        if cell == self.goal {
            return false;
        }
        let (obstacles, node_size, radius) = (self.obstacles, self.node_size, self.radius);
        *self
            .cache
            .entry(cell)
            .or_insert_with(|| obstacles.is_blocked(grid_to_world(cell, node_size), radius))
    }
}

/// Grid A* planner with a direct-line shortcut and a bounded search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathPlanner {
    node_size: f32,
    max_expansions: usize,
    clearance_factor: f32,
}

impl PathPlanner {
    pub fn new(config: &PlannerConfig) -> Self {
        Self {
            node_size: config.node_size,
            max_expansions: config.max_expansions,
            clearance_factor: config.clearance_factor,
        }
    }

    /// Same planner with a different cell size.
    pub fn with_node_size(self, node_size: f32) -> Self {
        Self { node_size, ..self }
    }

    pub fn node_size(&self) -> f32 {
        self.node_size
    }

    /// Plans from `start` to `goal` and returns only the waypoints.
    pub fn plan<Q: ObstacleQuery + ?Sized>(
        &self,
        start: Vec2,
        goal: Vec2,
        obstacles: &Q,
    ) -> Vec<Vec2> {
        self.plan_detailed(start, goal, obstacles).waypoints
    }

    /// Plans from `start` to `goal`.
    ///
    /// Never fails: an unreachable goal or an exhausted expansion budget yields
    /// [`PlanOutcome::Fallback`] with the single waypoint `goal`.
    pub fn plan_detailed<Q: ObstacleQuery + ?Sized>(
        &self,
        start: Vec2,
        goal: Vec2,
        obstacles: &Q,
    ) -> Plan {
        if obstacles.is_clear_line(start, goal) {
            return Plan {
                waypoints: vec![goal],
                outcome: PlanOutcome::Direct,
                expansions: 0,
            };
        }

        let start_cell = world_to_grid(start, self.node_size);
        let goal_cell = world_to_grid(goal, self.node_size);
        let heuristic = |cell: GridCell| cell.manhattan(goal_cell) * STRAIGHT_COST;

        let mut occupancy = Occupancy {
            obstacles,
            node_size: self.node_size,
            radius: self.node_size * self.clearance_factor,
            goal: goal_cell,
            cache: HashMap::new(),
        };
        let mut nodes: HashMap<GridCell, PathNode> = HashMap::new();
        let mut closed: HashSet<GridCell> = HashSet::new();
        let mut open = BinaryHeap::new();

        let origin = PathNode {
            g_cost: 0,
            h_cost: heuristic(start_cell),
            parent: None,
        };
        open.push(origin.entry(start_cell));
        nodes.insert(start_cell, origin);

        let mut expansions = 0;
        while let Some(OpenEntry { cell: current, .. }) = open.pop() {
            if !closed.insert(current) {
                continue;
            }
            if current == goal_cell {
                let raw = self.reconstruct(&nodes, start_cell, goal_cell, goal);
                trace!(expansions, raw_len = raw.len(), "path found");
                return Plan {
                    waypoints: simplify(&raw, obstacles),
                    outcome: PlanOutcome::Found,
                    expansions,
                };
            }
            if expansions >= self.max_expansions {
                break;
            }
            expansions += 1;

            let current_g = nodes.get(&current).map_or(0, |n| n.g_cost);
            for step in NEIGHBOURS {
                let next = current.offset(step.dx, step.dy);
                if closed.contains(&next) || occupancy.blocked(next) {
                    continue;
                }
                // No squeezing diagonally between two walls or past a corner.
                if step.is_diagonal()
                    && (occupancy.blocked(current.offset(step.dx, 0))
                        || occupancy.blocked(current.offset(0, step.dy)))
                {
                    continue;
                }

                let g_cost = current_g + step.cost;
                if nodes.get(&next).is_some_and(|n| n.g_cost <= g_cost) {
                    continue;
                }
                let node = PathNode {
                    g_cost,
                    h_cost: heuristic(next),
                    parent: Some(current),
                };
                open.push(node.entry(next));
                nodes.insert(next, node);
            }
        }

        debug!(
            expansions,
            ?start,
            ?goal,
            "no grid path within budget, falling back to direct path"
        );
        Plan {
            waypoints: vec![goal],
            outcome: PlanOutcome::Fallback,
            expansions,
        }
    }

    /// Walks parent links back from the goal. The start cell is excluded and
    /// the goal cell is replaced by the exact goal position.
    fn reconstruct(
        &self,
        nodes: &HashMap<GridCell, PathNode>,
        start_cell: GridCell,
        goal_cell: GridCell,
        goal: Vec2,
    ) -> Vec<Vec2> {
        let mut cells = Vec::new();
        let mut cursor = goal_cell;
        while cursor != start_cell {
            cells.push(cursor);
            match nodes.get(&cursor).and_then(|n| n.parent) {
                Some(parent) => cursor = parent,
                None => break,
            }
        }
        cells.reverse();

        let mut waypoints: Vec<Vec2> = cells
            .into_iter()
            .map(|cell| grid_to_world(cell, self.node_size))
            .collect();
        match waypoints.last_mut() {
            Some(last) => *last = goal,
            None => waypoints.push(goal),
        }
        waypoints
    }
}

impl Default for PathPlanner {
    fn default() -> Self {
        Self::new(&PlannerConfig::default())
    }
}

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Cost of an orthogonal step between neighbouring cells.
pub const STRAIGHT_COST: u32 = 10;
/// Cost of a diagonal step, `10 * sqrt(2)` rounded.
pub const DIAGONAL_COST: u32 = 14;

/// Integer key of a planning cell.
///
/// Cells only exist for path planning; they never correspond to map tiles or
/// physics shapes and are recomputed from world positions on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridCell {
    pub x: i32,
    pub y: i32,
}

impl GridCell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Returns the cell shifted by `(dx, dy)`.
    #[inline]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    /// Manhattan distance in cells.
    #[inline]
    pub fn manhattan(self, other: GridCell) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

/// A single step to one of the eight neighbours of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighbourStep {
    pub dx: i32,
    pub dy: i32,
    pub cost: u32,
}

impl NeighbourStep {
    #[inline]
    pub const fn is_diagonal(&self) -> bool {
        self.dx != 0 && self.dy != 0
    }
}

/// The 8-connected neighbourhood, orthogonal steps first.
pub const NEIGHBOURS: [NeighbourStep; 8] = [
    NeighbourStep { dx: 1, dy: 0, cost: STRAIGHT_COST },
    NeighbourStep { dx: -1, dy: 0, cost: STRAIGHT_COST },
    NeighbourStep { dx: 0, dy: 1, cost: STRAIGHT_COST },
    NeighbourStep { dx: 0, dy: -1, cost: STRAIGHT_COST },
    NeighbourStep { dx: 1, dy: 1, cost: DIAGONAL_COST },
    NeighbourStep { dx: 1, dy: -1, cost: DIAGONAL_COST },
    NeighbourStep { dx: -1, dy: 1, cost: DIAGONAL_COST },
    NeighbourStep { dx: -1, dy: -1, cost: DIAGONAL_COST },
];

/// Maps a world position onto the planning grid by rounding each axis to the
/// nearest multiple of `cell_size`.
#[inline]
pub fn world_to_grid(pos: Vec2, cell_size: f32) -> GridCell {
    GridCell {
        x: (pos.x / cell_size).round() as i32,
        y: (pos.y / cell_size).round() as i32,
    }
}

/// Returns the world-space centre of `cell`.
///
/// `grid_to_world(world_to_grid(p, s), s)` is within `s / 2` of `p` on each
/// axis but is not `p` itself.
#[inline]
pub fn grid_to_world(cell: GridCell, cell_size: f32) -> Vec2 {
    Vec2::new(cell.x as f32 * cell_size, cell.y as f32 * cell_size)
}

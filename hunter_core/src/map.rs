use std::ops::{Index, IndexMut};

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::obstacle::ObstacleQuery;

/// Errors raised by direct grid mutation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("Coordinates ({x}, {y}) are out of bounds for grid size ({width}, {height})")]
    OutOfBounds {
        x: i32,
        y: i32,
        width: usize,
        height: usize,
    },
}

/// Errors raised while loading a map from text.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MapError {
    #[error("Map string is empty")]
    Empty,
    #[error("Inconsistent width at row {row}: expected {expected}, found {found}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Unknown map code '{token}' at position ({x}, {y})")]
    UnknownToken { token: String, x: usize, y: usize },
    #[error("Multiple target spawns ('TG') found")]
    DuplicateTarget,
    #[error("No target spawn ('TG') found in map")]
    MissingTarget,
    #[error("Tile size must be positive and finite, got {0}")]
    InvalidTileSize(f32),
}

/// Row-major 2D storage addressed by signed coordinates.
///
/// Signed coordinates let callers probe outside the map without wrapping;
/// such lookups simply return `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    cells: Vec<T>,
}

impl<T> Grid<T> {
    /// Creates a grid filled with `T::default()`.
    ///
    /// # Panics
    ///
    /// Panics if `width * height` overflows `usize`.
    pub fn new(width: usize, height: usize) -> Self
    where
        T: Default + Clone,
    {
        Grid {
            width,
            height,
            cells: vec![T::default(); width * height],
        }
    }

    /// Returns the number of columns.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the number of rows.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    fn index_of(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 {
            return None;
        }
        let (x, y) = (x as usize, y as usize);
        (x < self.width && y < self.height).then(|| y * self.width + x)
    }

    /// Gets a reference to the cell at `(x, y)`.
    ///
    /// Returns `None` for coordinates outside the grid, negative ones included.
    pub fn get(&self, x: i32, y: i32) -> Option<&T> {
        self.index_of(x, y).map(|idx| &self.cells[idx])
    }

    /// Overwrites one cell, failing if `(x, y)` lies outside the grid.
    pub fn set(&mut self, x: i32, y: i32, value: T) -> Result<(), GridError> {
        let idx = self.index_of(x, y).ok_or(GridError::OutOfBounds {
            x,
            y,
            width: self.width,
            height: self.height,
        })?;
        self.cells[idx] = value;
        Ok(())
    }
}

impl<T> Index<(i32, i32)> for Grid<T> {
    type Output = T;

    /// Gets the cell at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are out of bounds. Use [`Grid::get`] for a
    /// non-panicking lookup.
    fn index(&self, (x, y): (i32, i32)) -> &Self::Output {
        match self.index_of(x, y) {
            Some(idx) => &self.cells[idx],
            None => panic!(
                "Grid index ({}, {}) out of bounds for grid size ({}, {})",
                x, y, self.width, self.height
            ),
        }
    }
}

impl<T> IndexMut<(i32, i32)> for Grid<T> {
    /// Gets a mutable reference to the cell at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are out of bounds. Use [`Grid::set`] for a
    /// fallible write.
    fn index_mut(&mut self, (x, y): (i32, i32)) -> &mut Self::Output {
        let (width, height) = (self.width, self.height);
        match self.index_of(x, y) {
            Some(idx) => &mut self.cells[idx],
            None => panic!(
                "Grid index ({}, {}) out of bounds for grid size ({}, {})",
                x, y, width, height
            ),
        }
    }
}

/// Static content of one map tile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tile {
    #[default]
    Floor,
    Wall,
}

/// Tile-based wall layer implementing [`ObstacleQuery`].
///
/// Tile `(x, y)` covers the square `[x*s, (x+1)*s) x [y*s, (y+1)*s)` where `s`
/// is the tile size. Everything outside the map is solid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileMap {
    tiles: Grid<Tile>,
    tile_size: f32,
}

impl TileMap {
    /// Creates an all-floor map.
    pub fn open(width: usize, height: usize, tile_size: f32) -> Self {
        TileMap {
            tiles: Grid::new(width, height),
            tile_size,
        }
    }

    pub fn tile_size(&self) -> f32 {
        self.tile_size
    }

    pub fn tiles(&self) -> &Grid<Tile> {
        &self.tiles
    }

    pub fn set_tile(&mut self, x: i32, y: i32, tile: Tile) -> Result<(), GridError> {
        self.tiles.set(x, y, tile)
    }

    /// Fills the inclusive rectangle `(x0, y0)..=(x1, y1)` with walls.
    pub fn fill_walls(&mut self, x0: i32, y0: i32, x1: i32, y1: i32) -> Result<(), GridError> {
        for y in y0.min(y1)..=y0.max(y1) {
            for x in x0.min(x1)..=x0.max(x1) {
                self.tiles.set(x, y, Tile::Wall)?;
            }
        }
        Ok(())
    }

    /// Tile containing `point`.
    #[inline]
    pub fn tile_at(&self, point: Vec2) -> (i32, i32) {
        (
            (point.x / self.tile_size).floor() as i32,
            (point.y / self.tile_size).floor() as i32,
        )
    }

    /// World-space centre of tile `(x, y)`.
    #[inline]
    pub fn tile_center(&self, x: i32, y: i32) -> Vec2 {
        Vec2::new(x as f32 + 0.5, y as f32 + 0.5) * self.tile_size
    }

    #[inline]
    pub fn is_solid(&self, x: i32, y: i32) -> bool {
        !matches!(self.tiles.get(x, y), Some(Tile::Floor))
    }
}

impl ObstacleQuery for TileMap {
    fn is_blocked(&self, point: Vec2, radius: f32) -> bool {
        let (px, py) = self.tile_at(point);
        if self.is_solid(px, py) {
            return true;
        }
        if radius <= 0.0 {
            return false;
        }
        let (x0, y0) = self.tile_at(point - Vec2::splat(radius));
        let (x1, y1) = self.tile_at(point + Vec2::splat(radius));
        let radius_sq = radius * radius;
        for y in y0..=y1 {
            for x in x0..=x1 {
                if !self.is_solid(x, y) {
                    continue;
                }
                let lo = Vec2::new(x as f32, y as f32) * self.tile_size;
                let hi = lo + Vec2::splat(self.tile_size);
                if point.clamp(lo, hi).distance_squared(point) < radius_sq {
                    return true;
                }
            }
        }
        false
    }

    fn is_clear_line(&self, from: Vec2, to: Vec2) -> bool {
        let delta = to - from;
        let length = delta.length();
        if length <= f32::EPSILON {
            let (x, y) = self.tile_at(from);
            return !self.is_solid(x, y);
        }
        self.raycast_distance(from, delta / length, length).is_none()
    }

    /// Grid traversal (Amanatides & Woo) over the tile layer.
    fn raycast_distance(&self, origin: Vec2, direction: Vec2, max_distance: f32) -> Option<f32> {
        let (mut x, mut y) = self.tile_at(origin);
        if self.is_solid(x, y) {
            return Some(0.0);
        }
        let dir = direction.normalize_or_zero();
        if dir == Vec2::ZERO {
            return None;
        }

        let size = self.tile_size;
        let axis = |d: f32, o: f32, cell: i32| -> (i32, f32, f32) {
            if d > 0.0 {
                let boundary = (cell + 1) as f32 * size;
                (1, (boundary - o) / d, size / d)
            } else if d < 0.0 {
                let boundary = cell as f32 * size;
                (-1, (boundary - o) / d, -size / d)
            } else {
                (0, f32::INFINITY, f32::INFINITY)
            }
        };
        let (step_x, mut t_max_x, t_delta_x) = axis(dir.x, origin.x, x);
        let (step_y, mut t_max_y, t_delta_y) = axis(dir.y, origin.y, y);

        loop {
            let t = t_max_x.min(t_max_y);
            if t > max_distance {
                return None;
            }
            if t_max_x < t_max_y {
                x += step_x;
                t_max_x += t_delta_x;
            } else {
                y += step_y;
                t_max_y += t_delta_y;
            }
            if self.is_solid(x, y) {
                return Some(t.max(0.0));
            }
        }
    }
}

/// A parsed map: the wall layer plus spawn points in world space.
#[derive(Debug, Clone, PartialEq)]
pub struct MapLayout {
    pub map: TileMap,
    pub enemy_spawns: Vec<Vec2>,
    pub boss_spawns: Vec<Vec2>,
    pub target_spawn: Vec2,
}

/// Loads a map from whitespace-separated two-letter codes.
///
/// `WL` wall, `BL` floor, `EN` enemy, `BS` boss, `TG` target (exactly one).
/// Row 0 is the top line of the text and maps to the smallest `y`.
pub fn load_map_from_string(map_string: &str, tile_size: f32) -> Result<MapLayout, MapError> {
    if !(tile_size.is_finite() && tile_size > 0.0) {
        return Err(MapError::InvalidTileSize(tile_size));
    }
    let rows: Vec<Vec<&str>> = map_string
        .trim()
        .lines()
        .map(|line| line.split_whitespace().collect())
        .collect();
    let width = rows.first().map(Vec::len).unwrap_or(0);
    if width == 0 {
        return Err(MapError::Empty);
    }
    if let Some((row, tokens)) = rows.iter().enumerate().find(|(_, t)| t.len() != width) {
        return Err(MapError::RaggedRow {
            row,
            expected: width,
            found: tokens.len(),
        });
    }

    let mut map = TileMap::open(width, rows.len(), tile_size);
    let mut enemy_spawns = Vec::new();
    let mut boss_spawns = Vec::new();
    let mut target_spawn = None;

    for (y, tokens) in rows.iter().enumerate() {
        for (x, token) in tokens.iter().enumerate() {
            let (tx, ty) = (x as i32, y as i32);
            let centre = map.tile_center(tx, ty);
            match *token {
                "BL" => {}
                "WL" => map.tiles[(tx, ty)] = Tile::Wall,
                "EN" => enemy_spawns.push(centre),
                "BS" => boss_spawns.push(centre),
                "TG" => {
                    if target_spawn.replace(centre).is_some() {
                        return Err(MapError::DuplicateTarget);
                    }
                }
                unknown => {
                    return Err(MapError::UnknownToken {
                        token: unknown.to_string(),
                        x,
                        y,
                    });
                }
            }
        }
    }

    Ok(MapLayout {
        map,
        enemy_spawns,
        boss_spawns,
        target_spawn: target_spawn.ok_or(MapError::MissingTarget)?,
    })
}

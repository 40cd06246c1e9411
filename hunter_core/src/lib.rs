//! Enemy navigation and decision core for a top-down shooter.
//!
//! The library is engine independent: obstacles, projectiles and hit scoring
//! are supplied by the host through the traits in [`obstacle`] and [`combat`].
//! [`sim`] holds a small reference host built on [`map::TileMap`].

pub mod agent;
pub mod behavior;
pub mod boss;
pub mod combat;
pub mod config;
pub mod grid;
pub mod map;
pub mod obstacle;
pub mod perception;
pub mod planner;
pub mod simplify;
pub mod sim;
pub mod steering;
pub mod timers;

pub use glam::Vec2;

/// Unique identifier for entities (agents, projectiles' owners, etc.).
pub type EntityId = usize;

//! A minimal host: a tile map, a set of agents and a single target.
//!
//! Agents are ticked in insertion order. Movement is applied with a simple
//! slide against walls, projectiles fly in straight lines, and hits reported by
//! agents are applied to the target after each agent's tick.

use glam::Vec2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    EntityId,
    agent::{Agent, AgentEvent, Enemy, TickContext},
    combat::{AttackKind, HitReport, Loadout, ProjectileSpawn, ScoreSink, SpawnLog},
    config::EnemyConfig,
    map::{MapLayout, TileMap},
    obstacle::{ObstacleQuery, segment_distance},
    perception::TargetState,
};

/// Body radius used for agent movement.
pub const BODY_RADIUS: f32 = 0.3;
/// Projectiles within this distance of the target hit it.
pub const TARGET_RADIUS: f32 = 0.4;
/// Seconds a projectile flies before it is discarded.
pub const PROJECTILE_LIFETIME: f32 = 2.0;

/// The entity the agents hunt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub position: Vec2,
    pub health: f32,
}

impl Target {
    pub fn new(position: Vec2, health: f32) -> Self {
        Self { position, health }
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }

    pub fn snapshot(&self) -> TargetState {
        TargetState {
            position: self.position,
            alive: self.is_alive(),
        }
    }

    fn take_hit(&mut self, damage: f32, lethal: bool) {
        self.health = if lethal { 0.0 } else { self.health - damage };
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Projectile {
    owner: EntityId,
    position: Vec2,
    velocity: Vec2,
    damage: f32,
    age: f32,
}

/// Running totals over a simulation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimStats {
    pub ticks: u64,
    pub state_changes: u32,
    pub replans: u32,
    pub detours: u32,
    pub projectiles_fired: u32,
    pub projectile_hits: u32,
    pub melee_hits: u32,
    pub dash_hits: u32,
    pub target_killed_at: Option<f32>,
}

impl SimStats {
    fn record(&mut self, event: &AgentEvent) {
        match event {
            AgentEvent::StateChanged { .. } => self.state_changes += 1,
            AgentEvent::Replanned { .. } => self.replans += 1,
            AgentEvent::Detour { .. } => self.detours += 1,
            AgentEvent::Fired { projectiles } => self.projectiles_fired += projectiles,
            AgentEvent::Hit(hit) => match hit.kind {
                AttackKind::Melee => self.melee_hits += 1,
                AttackKind::Dash => self.dash_hits += 1,
            },
            _ => {}
        }
    }
}

#[derive(Debug, Default)]
struct HitLog(Vec<HitReport>);

impl ScoreSink for HitLog {
    fn on_hit(&mut self, hit: &HitReport) {
        self.0.push(*hit);
    }
}

/// Moves `from` by `delta`, sliding along an axis if the full move is blocked.
pub fn move_and_slide<Q: ObstacleQuery + ?Sized>(
    obstacles: &Q,
    from: Vec2,
    delta: Vec2,
    radius: f32,
) -> Vec2 {
    [delta, Vec2::new(delta.x, 0.0), Vec2::new(0.0, delta.y)]
        .into_iter()
        .map(|step| from + step)
        .find(|&to| !obstacles.is_blocked(to, radius))
        .unwrap_or(from)
}

pub struct Simulation {
    map: TileMap,
    agents: Vec<Box<dyn Agent>>,
    target: Option<Target>,
    projectiles: Vec<Projectile>,
    now: f32,
    next_entity_id: EntityId,
    stats: SimStats,
}

impl Simulation {
    pub fn new(map: TileMap, target: Option<Target>) -> Self {
        Self {
            map,
            agents: Vec::new(),
            target,
            projectiles: Vec::new(),
            now: 0.0,
            next_entity_id: 1,
            stats: SimStats::default(),
        }
    }

    /// Builds a simulation from a parsed map. Bosses get the boss config
    /// section of `config` if it has one, otherwise the default.
    pub fn from_layout(
        layout: MapLayout,
        config: &EnemyConfig,
        loadout: &Loadout,
        target_health: f32,
        seed: u64,
    ) -> Self {
        let mut sim = Self::new(
            layout.map,
            Some(Target::new(layout.target_spawn, target_health)),
        );
        let boss_config = EnemyConfig {
            boss: Some(config.boss.unwrap_or_default()),
            ..config.clone()
        };
        let spawns = layout
            .enemy_spawns
            .iter()
            .map(|&p| (p, config))
            .chain(layout.boss_spawns.iter().map(|&p| (p, &boss_config)));
        for (position, enemy_config) in spawns {
            let id = sim.reserve_entity_id();
            let enemy = Enemy::new(
                id,
                position,
                enemy_config.clone(),
                Box::new(loadout.clone()),
                seed.wrapping_add(id as u64),
            );
            sim.add_agent(Box::new(enemy));
        }
        sim
    }

    pub fn reserve_entity_id(&mut self) -> EntityId {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        id
    }

    pub fn add_agent(&mut self, agent: Box<dyn Agent>) {
        self.next_entity_id = self.next_entity_id.max(agent.id() + 1);
        self.agents.push(agent);
    }

    pub fn map(&self) -> &TileMap {
        &self.map
    }

    pub fn agents(&self) -> &[Box<dyn Agent>] {
        &self.agents
    }

    pub fn agent(&self, id: EntityId) -> Option<&dyn Agent> {
        self.agents.iter().find(|a| a.id() == id).map(|a| &**a)
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    pub fn kill_target(&mut self) {
        if let Some(target) = self.target.as_mut().filter(|t| t.is_alive()) {
            target.health = 0.0;
            self.stats.target_killed_at = Some(self.now);
            info!(at = self.now, "target killed");
        }
    }

    /// Alerts every living agent within `radius` of `source`.
    pub fn make_noise(&mut self, source: Vec2, radius: f32) {
        for agent in &mut self.agents {
            if agent.position().distance(source) <= radius {
                agent.hear_sound(self.now, source);
            }
        }
    }

    pub fn kill_agent(&mut self, id: EntityId, knockback: Vec2) -> bool {
        let now = self.now;
        self.agents
            .iter_mut()
            .find(|a| a.id() == id)
            .is_some_and(|a| a.kill(now, knockback))
    }

    pub fn now(&self) -> f32 {
        self.now
    }

    pub fn stats(&self) -> &SimStats {
        &self.stats
    }

    pub fn projectiles_in_flight(&self) -> usize {
        self.projectiles.len()
    }

    /// Advances the world by `dt` seconds and returns every agent event.
    pub fn step(&mut self, dt: f32) -> Vec<(EntityId, AgentEvent)> {
        let mut events = Vec::new();
        let mut spawner = SpawnLog::default();

        for agent in &mut self.agents {
            let mut hits = HitLog::default();
            let mut ctx = TickContext {
                now: self.now,
                dt,
                obstacles: &self.map,
                target: self.target.map(|t| t.snapshot()),
                spawner: &mut spawner,
                score: Some(&mut hits),
            };
            let output = agent.tick(&mut ctx);

            let delta = output.velocity * dt;
            let moved = move_and_slide(&self.map, agent.position(), delta, BODY_RADIUS);
            agent.set_position(moved);

            for hit in hits.0 {
                if let Some(target) = self.target.as_mut().filter(|t| t.is_alive()) {
                    target.take_hit(hit.damage, hit.lethal);
                    if !target.is_alive() {
                        self.stats.target_killed_at = Some(self.now);
                        info!(at = self.now, by = hit.attacker, "target killed");
                    }
                }
            }
            let id = agent.id();
            for event in output.events {
                self.stats.record(&event);
                events.push((id, event));
            }
        }

        self.launch(spawner.spawned);
        self.fly_projectiles(dt);
        self.now += dt;
        self.stats.ticks += 1;
        events
    }

    fn launch(&mut self, spawned: Vec<ProjectileSpawn>) {
        self.projectiles.extend(spawned.into_iter().map(|s| Projectile {
            owner: s.owner,
            position: s.origin,
            velocity: s.direction * s.speed,
            damage: s.damage,
            age: 0.0,
        }));
    }

    fn fly_projectiles(&mut self, dt: f32) {
        let map = &self.map;
        let target = &mut self.target;
        let stats = &mut self.stats;
        let now = self.now;

        self.projectiles.retain_mut(|p| {
            let from = p.position;
            let to = from + p.velocity * dt;
            p.position = to;
            p.age += dt;

            if let Some(t) = target.as_mut().filter(|t| t.is_alive()) {
                if segment_distance(from, to, t.position) <= TARGET_RADIUS {
                    t.take_hit(p.damage, false);
                    stats.projectile_hits += 1;
                    debug!(owner = p.owner, health = t.health, "projectile hit");
                    if !t.is_alive() {
                        stats.target_killed_at = Some(now);
                        info!(at = now, by = p.owner, "target killed");
                    }
                    return false;
                }
            }
            p.age < PROJECTILE_LIFETIME && map.is_clear_line(from, to)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{behavior::BehaviorState, combat::Weapon, map::load_map_from_string};

    fn shooter(sim: &mut Simulation, position: Vec2) -> EntityId {
        let id = sim.reserve_entity_id();
        let loadout = Loadout {
            ranged: Some(Weapon::pistol()),
            ..Loadout::default()
        };
        sim.add_agent(Box::new(Enemy::new(
            id,
            position,
            EnemyConfig::default(),
            Box::new(loadout),
            id as u64,
        )));
        id
    }

    #[test]
    fn slide_keeps_the_free_axis() {
        let mut map = TileMap::open(10, 10, 1.0);
        map.fill_walls(5, 0, 5, 9).unwrap();
        let moved = move_and_slide(&map, Vec2::new(4.5, 4.0), Vec2::new(0.5, 0.5), 0.3);
        assert_eq!(moved, Vec2::new(4.5, 4.5));
        let pinned = move_and_slide(&map, Vec2::new(4.6, 4.0), Vec2::new(0.5, 0.0), 0.3);
        assert_eq!(pinned, Vec2::new(4.6, 4.0));
    }

    #[test]
    fn shooter_wears_the_target_down() {
        let mut sim = Simulation::new(
            TileMap::open(20, 20, 1.0),
            Some(Target::new(Vec2::new(10.0, 5.0), 3.0)),
        );
        let id = shooter(&mut sim, Vec2::new(5.0, 5.0));
        for _ in 0..200 {
            sim.step(0.05);
        }
        let stats = sim.stats();
        assert!(stats.projectiles_fired >= 3);
        assert!(stats.projectile_hits >= 3);
        assert!(stats.target_killed_at.is_some());
        assert_eq!(sim.agent(id).map(|a| a.state()), Some(BehaviorState::Patrol));
    }

    #[test]
    fn killing_the_target_ends_pursuit() {
        let mut sim = Simulation::new(
            TileMap::open(20, 20, 1.0),
            Some(Target::new(Vec2::new(10.0, 5.0), 100.0)),
        );
        let id = shooter(&mut sim, Vec2::new(5.0, 5.0));
        sim.step(0.05);
        assert_eq!(sim.agent(id).map(|a| a.state()), Some(BehaviorState::Pursue));
        sim.kill_target();
        let events = sim.step(0.05);
        assert!(events.contains(&(
            id,
            AgentEvent::StateChanged {
                from: BehaviorState::Pursue,
                to: BehaviorState::Patrol,
            }
        )));
    }

    #[test]
    fn noise_alerts_agents_in_earshot() {
        let mut map = TileMap::open(30, 10, 1.0);
        map.fill_walls(15, 0, 15, 9).unwrap();
        let mut sim = Simulation::new(map, Some(Target::new(Vec2::new(20.0, 5.0), 1.0)));
        let near = shooter(&mut sim, Vec2::new(13.0, 5.0));
        let far = shooter(&mut sim, Vec2::new(2.0, 5.0));
        sim.make_noise(Vec2::new(20.0, 5.0), 8.0);
        assert_eq!(sim.agent(near).map(|a| a.state()), Some(BehaviorState::Pursue));
        assert_eq!(sim.agent(far).map(|a| a.state()), Some(BehaviorState::Patrol));
        assert!(sim.kill_agent(far, Vec2::ZERO));
        assert!(!sim.kill_agent(far, Vec2::ZERO));
    }

    #[test]
    fn layout_spawns_enemies_and_bosses() {
        let text = "\
            WL WL WL WL WL WL\n\
            WL EN BL BL BS WL\n\
            WL BL BL TG BL WL\n\
            WL WL WL WL WL WL";
        let layout = load_map_from_string(text, 1.0).unwrap();
        let sim = Simulation::from_layout(
            layout,
            &EnemyConfig::default(),
            &Loadout::default(),
            5.0,
            7,
        );
        assert_eq!(sim.agents().len(), 2);
        assert_eq!(sim.agents()[0].id(), 1);
        assert_eq!(sim.agents()[1].id(), 2);
        assert_eq!(sim.target().map(|t| t.position), Some(Vec2::new(3.5, 2.5)));
    }
}

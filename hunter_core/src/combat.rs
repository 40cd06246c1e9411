use std::fmt::Debug;

use glam::Vec2;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{EntityId, perception::TargetState};

/// Static weapon parameters supplied by the equipment collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weapon {
    pub name: String,
    pub is_melee: bool,
    /// Seconds between attacks.
    pub fire_interval: f32,
    pub range: f32,
    pub damage: f32,
    /// Hits kill outright.
    pub lethal: bool,
    /// Projectiles per shot.
    pub pellets: u32,
    /// Random deviation per projectile, degrees either side of the aim.
    pub spread_deg: f32,
    /// Total fan angle the pellets of one shot are spread across, degrees.
    pub pellet_spread_deg: f32,
    pub projectile_speed: f32,
}

impl Weapon {
    pub fn pistol() -> Self {
        Self::default()
    }

    pub fn shotgun() -> Self {
        Self {
            name: "shotgun".to_string(),
            fire_interval: 1.2,
            range: 5.0,
            damage: 1.0,
            pellets: 5,
            spread_deg: 2.0,
            pellet_spread_deg: 30.0,
            ..Self::default()
        }
    }

    pub fn knife() -> Self {
        Self {
            name: "knife".to_string(),
            is_melee: true,
            fire_interval: 0.6,
            range: 0.8,
            damage: 1.0,
            lethal: true,
            pellets: 0,
            spread_deg: 0.0,
            projectile_speed: 0.0,
            ..Self::default()
        }
    }
}

impl Default for Weapon {
    fn default() -> Self {
        Self {
            name: "pistol".to_string(),
            is_melee: false,
            fire_interval: 0.5,
            range: 8.0,
            damage: 1.0,
            lethal: false,
            pellets: 1,
            spread_deg: 3.0,
            pellet_spread_deg: 0.0,
            projectile_speed: 12.0,
        }
    }
}

/// Access to the agent's weapons and ammunition.
pub trait Equipment: Debug {
    /// The weapon currently held, melee or ranged.
    fn current_weapon(&self) -> Option<&Weapon>;

    /// The weapon used for close attacks, if any.
    fn melee_weapon(&self) -> Option<&Weapon>;

    fn has_ammo(&self) -> bool;

    /// Uses one round. Returns `false` if none was left.
    fn consume_ammo(&mut self) -> bool;

    fn can_shoot(&self) -> bool {
        self.current_weapon().is_some_and(|w| !w.is_melee)
    }
}

/// A ranged weapon, a melee weapon and an ammo counter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Loadout {
    pub ranged: Option<Weapon>,
    pub melee: Option<Weapon>,
    /// `None` means unlimited.
    pub ammo: Option<u32>,
}

impl Equipment for Loadout {
    fn current_weapon(&self) -> Option<&Weapon> {
        self.ranged.as_ref().or(self.melee.as_ref())
    }

    fn melee_weapon(&self) -> Option<&Weapon> {
        self.melee.as_ref()
    }

    fn has_ammo(&self) -> bool {
        self.ammo.is_none_or(|rounds| rounds > 0)
    }

    fn consume_ammo(&mut self) -> bool {
        match &mut self.ammo {
            None => true,
            Some(0) => false,
            Some(rounds) => {
                *rounds -= 1;
                true
            }
        }
    }
}

/// Pose and parameters of one projectile to spawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectileSpawn {
    pub owner: EntityId,
    pub origin: Vec2,
    pub direction: Vec2,
    pub speed: f32,
    pub damage: f32,
}

/// Creates projectiles and muzzle effects. Flight and collision belong to the
/// host.
pub trait ProjectileSpawner {
    /// Returns `false` if no projectile exists for `weapon`.
    fn spawn_projectile(&mut self, weapon: &Weapon, spawn: ProjectileSpawn) -> bool;

    fn muzzle_flash(&mut self, _origin: Vec2, _direction: Vec2) {}
}

/// Spawner that records what it was asked to spawn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpawnLog {
    pub spawned: Vec<ProjectileSpawn>,
    pub flashes: usize,
}

impl ProjectileSpawner for SpawnLog {
    fn spawn_projectile(&mut self, weapon: &Weapon, spawn: ProjectileSpawn) -> bool {
        if weapon.projectile_speed <= 0.0 {
            return false;
        }
        self.spawned.push(spawn);
        true
    }

    fn muzzle_flash(&mut self, _origin: Vec2, _direction: Vec2) {
        self.flashes += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttackKind {
    Melee,
    Dash,
}

/// A confirmed hit on the target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HitReport {
    pub attacker: EntityId,
    pub kind: AttackKind,
    pub position: Vec2,
    pub damage: f32,
    pub lethal: bool,
}

/// Optional hook notified of confirmed hits.
pub trait ScoreSink {
    fn on_hit(&mut self, hit: &HitReport);
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    /// How long the melee pose is held.
    pub melee_swing_duration: f32,
    /// Radius of the melee hit area placed toward the target.
    pub melee_hit_radius: f32,
    /// Wait before re-checking after finding the magazine empty.
    pub out_of_ammo_wait: f32,
    /// Distance from the agent centre at which projectiles appear.
    pub muzzle_offset: f32,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            melee_swing_duration: 0.25,
            melee_hit_radius: 0.5,
            out_of_ammo_wait: 1.0,
            muzzle_offset: 0.4,
        }
    }
}

/// Which attack, if any, is available this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttackChoice {
    None,
    Melee,
    Ranged,
}

/// The situation an attack decision is made in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Engagement {
    pub now: f32,
    pub attacker: EntityId,
    pub position: Vec2,
    pub target: TargetState,
    pub line_of_sight: bool,
}

impl Engagement {
    fn aim(&self) -> Vec2 {
        (self.target.position - self.position)
            .try_normalize()
            .unwrap_or(Vec2::X)
    }
}

/// Result of one arbiter step.
#[derive(Debug, Clone, PartialEq)]
pub enum CombatOutcome {
    Idle,
    MeleeHit { facing: Vec2, hit: HitReport },
    MeleeMiss { facing: Vec2 },
    Fired { facing: Vec2, projectiles: u32 },
    OutOfAmmo,
    /// The weapon produced no projectiles; treated as a spent shot.
    NoProjectile,
}

/// Cooldown bookkeeping and melee/ranged selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombatArbiter {
    melee_ready_at: f32,
    ranged_ready_at: f32,
}

impl CombatArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Holds every attack until at least `until`.
    pub fn delay_until(&mut self, until: f32) {
        self.melee_ready_at = self.melee_ready_at.max(until);
        self.ranged_ready_at = self.ranged_ready_at.max(until);
    }

    pub fn ranged_ready_at(&self) -> f32 {
        self.ranged_ready_at
    }

    pub fn melee_ready_at(&self) -> f32 {
        self.melee_ready_at
    }

    /// Melee wins whenever it is possible.
    pub fn choose<E: Equipment + ?Sized>(&self, situation: &Engagement, equipment: &E) -> AttackChoice {
        if !situation.target.alive {
            return AttackChoice::None;
        }
        let distance = situation.position.distance(situation.target.position);

        let melee_ready = equipment
            .melee_weapon()
            .is_some_and(|w| distance <= w.range && situation.now >= self.melee_ready_at);
        if melee_ready {
            return AttackChoice::Melee;
        }

        let ranged_ready = situation.line_of_sight
            && situation.now >= self.ranged_ready_at
            && equipment.can_shoot()
            && equipment
                .current_weapon()
                .is_some_and(|w| distance <= w.range);
        if ranged_ready {
            AttackChoice::Ranged
        } else {
            AttackChoice::None
        }
    }

    /// Chooses and performs at most one attack.
    pub fn engage<E, S, R>(
        &mut self,
        situation: &Engagement,
        equipment: &mut E,
        spawner: &mut S,
        rng: &mut R,
        config: &CombatConfig,
    ) -> CombatOutcome
    where
        E: Equipment + ?Sized,
        S: ProjectileSpawner + ?Sized,
        R: Rng,
    {
        match self.choose(situation, equipment) {
            AttackChoice::None => CombatOutcome::Idle,
            AttackChoice::Melee => self.melee(situation, equipment, config),
            AttackChoice::Ranged => self.fire(situation, equipment, spawner, rng, config),
        }
    }

    fn melee<E: Equipment + ?Sized>(
        &mut self,
        situation: &Engagement,
        equipment: &E,
        config: &CombatConfig,
    ) -> CombatOutcome {
        let Some(weapon) = equipment.melee_weapon() else {
            debug!("melee requested without a melee weapon");
            return CombatOutcome::Idle;
        };
        self.melee_ready_at = situation.now + weapon.fire_interval;

        let facing = situation.aim();
        let centre = situation.position + facing * (weapon.range * 0.5);
        let connects = situation.line_of_sight
            && centre.distance(situation.target.position) <= config.melee_hit_radius;
        if !connects {
            return CombatOutcome::MeleeMiss { facing };
        }
        CombatOutcome::MeleeHit {
            facing,
            hit: HitReport {
                attacker: situation.attacker,
                kind: AttackKind::Melee,
                position: situation.target.position,
                damage: weapon.damage,
                lethal: weapon.lethal,
            },
        }
    }

    fn fire<E, S, R>(
        &mut self,
        situation: &Engagement,
        equipment: &mut E,
        spawner: &mut S,
        rng: &mut R,
        config: &CombatConfig,
    ) -> CombatOutcome
    where
        E: Equipment + ?Sized,
        S: ProjectileSpawner + ?Sized,
        R: Rng,
    {
        let Some(weapon) = equipment.current_weapon().cloned() else {
            debug!("fire requested without a weapon");
            return CombatOutcome::Idle;
        };
        if !equipment.consume_ammo() {
            debug!(weapon = %weapon.name, "out of ammo, waiting");
            self.ranged_ready_at = situation.now + config.out_of_ammo_wait;
            return CombatOutcome::OutOfAmmo;
        }
        self.ranged_ready_at = situation.now + weapon.fire_interval;

        let aim = situation.aim();
        let origin = situation.position + aim * config.muzzle_offset;
        let pellets = weapon.pellets.max(1);
        let (fan_start, fan_step) = if pellets > 1 {
            (
                -weapon.pellet_spread_deg * 0.5,
                weapon.pellet_spread_deg / (pellets - 1) as f32,
            )
        } else {
            (0.0, 0.0)
        };

        let mut spawned = 0;
        for i in 0..pellets {
            let jitter = if weapon.spread_deg > 0.0 {
                rng.random_range(-weapon.spread_deg..=weapon.spread_deg)
            } else {
                0.0
            };
            let angle = (fan_start + fan_step * i as f32 + jitter).to_radians();
            let spawn = ProjectileSpawn {
                owner: situation.attacker,
                origin,
                direction: Vec2::from_angle(angle).rotate(aim),
                speed: weapon.projectile_speed,
                damage: weapon.damage,
            };
            if spawner.spawn_projectile(&weapon, spawn) {
                spawned += 1;
            }
        }

        if spawned == 0 {
            debug!(weapon = %weapon.name, "weapon has no projectile");
            return CombatOutcome::NoProjectile;
        }
        spawner.muzzle_flash(origin, aim);
        CombatOutcome::Fired {
            facing: aim,
            projectiles: spawned,
        }
    }
}

use std::mem;

use glam::Vec2;
use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::{
    EntityId,
    behavior::{BehaviorState, Patrol, Wander},
    boss::{DashAttack, DashInput},
    combat::{
        CombatArbiter, CombatOutcome, Engagement, Equipment, HitReport, ProjectileSpawner,
        ScoreSink,
    },
    config::EnemyConfig,
    obstacle::ObstacleQuery,
    perception::{Perception, PerceptionEvent, TargetState, can_see},
    planner::{PathPlanner, PlanOutcome},
    steering::{PathFollower, StuckMonitor, StuckResponse, random_detour},
    timers::{DeferredEffect, TimerChannel, TimerList},
};

/// Everything an agent may touch during one tick besides itself.
pub struct TickContext<'a> {
    /// Simulation time in seconds.
    pub now: f32,
    pub dt: f32,
    pub obstacles: &'a dyn ObstacleQuery,
    /// `None` when there is nothing to hunt.
    pub target: Option<TargetState>,
    pub spawner: &'a mut dyn ProjectileSpawner,
    pub score: Option<&'a mut dyn ScoreSink>,
}

impl TickContext<'_> {
    fn report(&mut self, hit: &HitReport) {
        if let Some(score) = self.score.as_deref_mut() {
            score.on_hit(hit);
        }
    }
}

/// Animation cue state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pose {
    #[default]
    Idle,
    Attack,
}

/// Notable things that happened to an agent, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AgentEvent {
    StateChanged {
        from: BehaviorState,
        to: BehaviorState,
    },
    PoseChanged(Pose),
    Replanned {
        outcome: PlanOutcome,
        node_size: f32,
        waypoints: usize,
    },
    Detour {
        waypoint: Vec2,
    },
    DashWindup,
    Hit(HitReport),
    MeleeMiss,
    Fired {
        projectiles: u32,
    },
    OutOfAmmo,
}

/// What the host should do with the agent after a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutput {
    /// World units per second. The host moves the agent.
    pub velocity: Vec2,
    pub facing: Vec2,
    pub events: Vec<AgentEvent>,
}

/// A tick-driven agent the host can drive without knowing its concrete type.
pub trait Agent {
    fn id(&self) -> EntityId;

    fn position(&self) -> Vec2;

    /// Called by the host after it has moved the agent.
    fn set_position(&mut self, position: Vec2);

    fn state(&self) -> BehaviorState;

    fn tick(&mut self, ctx: &mut TickContext<'_>) -> TickOutput;

    /// A noise at `source`, such as a gunshot.
    fn hear_sound(&mut self, now: f32, source: Vec2);

    /// Moves the agent to `Dead`. `knockback` is applied briefly as a
    /// velocity. Returns `false` if it was already dead.
    fn kill(&mut self, now: f32, knockback: Vec2) -> bool;
}

/// An enemy that patrols, hunts the target and attacks it.
#[derive(Debug)]
pub struct Enemy {
    id: EntityId,
    position: Vec2,
    facing: Vec2,
    state: BehaviorState,
    pose: Pose,
    config: EnemyConfig,
    rng: StdRng,
    perception: Perception,
    planner: PathPlanner,
    follower: PathFollower,
    stuck: StuckMonitor,
    next_replan_at: f32,
    patrol: Patrol,
    wander: Wander,
    arbiter: CombatArbiter,
    equipment: Box<dyn Equipment>,
    dash: Option<DashAttack>,
    timers: TimerList,
    nudge: Vec2,
    pending: Vec<AgentEvent>,
}

impl Enemy {
    pub fn new(
        id: EntityId,
        position: Vec2,
        config: EnemyConfig,
        equipment: Box<dyn Equipment>,
        seed: u64,
    ) -> Self {
        Self {
            id,
            position,
            facing: Vec2::X,
            state: BehaviorState::Patrol,
            pose: Pose::Idle,
            rng: StdRng::seed_from_u64(seed),
            perception: Perception::new(),
            planner: PathPlanner::new(&config.planner),
            follower: PathFollower::new(),
            stuck: StuckMonitor::new(),
            next_replan_at: 0.0,
            patrol: Patrol::default(),
            wander: Wander::new(),
            arbiter: CombatArbiter::new(),
            equipment,
            dash: config.boss.map(|_| DashAttack::new()),
            timers: TimerList::new(),
            nudge: Vec2::ZERO,
            pending: Vec::new(),
            config,
        }
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn config(&self) -> &EnemyConfig {
        &self.config
    }

    pub fn perception(&self) -> &Perception {
        &self.perception
    }

    pub fn follower(&self) -> &PathFollower {
        &self.follower
    }

    pub fn stuck_counter(&self) -> u32 {
        self.stuck.counter()
    }

    /// Swaps in new equipment and returns the old one. Cancels any pending
    /// attack-pose revert and returns to the idle pose.
    pub fn set_equipment(&mut self, equipment: Box<dyn Equipment>) -> Box<dyn Equipment> {
        self.timers.cancel_channel(TimerChannel::Animation);
        self.set_pose(Pose::Idle);
        debug!(id = self.id, "equipment switched");
        mem::replace(&mut self.equipment, equipment)
    }

    /// Dead agents ignore damage.
    pub fn accepts_damage(&self) -> bool {
        !self.state.is_dead()
    }

    /// Switches a patrolling agent to random wandering.
    pub fn start_wandering(&mut self) -> bool {
        if self.state != BehaviorState::Patrol {
            return false;
        }
        self.wander = Wander::new();
        self.transition(BehaviorState::Random)
    }

    pub fn stop_wandering(&mut self) -> bool {
        self.state == BehaviorState::Random && self.transition(BehaviorState::Patrol)
    }

    fn transition(&mut self, to: BehaviorState) -> bool {
        let from = self.state;
        if !from.can_transition_to(to) {
            debug!(id = self.id, ?from, ?to, "transition refused");
            return false;
        }
        info!(id = self.id, ?from, ?to, "state change");
        self.state = to;
        self.pending.push(AgentEvent::StateChanged { from, to });
        true
    }

    fn enter_pursuit(&mut self, now: f32) {
        if !self.transition(BehaviorState::Pursue) {
            return;
        }
        self.arbiter
            .delay_until(now + self.config.perception.first_attack_delay);
        self.follower.clear();
        self.stuck.reset();
        self.next_replan_at = now;
    }

    fn leave_pursuit(&mut self) {
        if !self.transition(BehaviorState::Patrol) {
            return;
        }
        self.follower.clear();
        self.stuck.reset();
        if let Some(dash) = self.dash.as_mut() {
            dash.cancel();
        }
    }

    fn set_pose(&mut self, pose: Pose) {
        if self.pose != pose {
            self.pose = pose;
            self.pending.push(AgentEvent::PoseChanged(pose));
        }
    }

    fn run_timers(&mut self, now: f32) {
        for effect in self.timers.drain_expired(now) {
            match effect {
                DeferredEffect::EndAttackAnimation => self.set_pose(Pose::Idle),
                DeferredEffect::StopNudge => {
                    trace!(id = self.id, "knockback over");
                    self.nudge = Vec2::ZERO;
                }
            }
        }
    }

    fn output(&mut self, velocity: Vec2) -> TickOutput {
        TickOutput {
            velocity,
            facing: self.facing,
            events: mem::take(&mut self.pending),
        }
    }

    fn pursue(&mut self, ctx: &mut TickContext<'_>, sighting: Option<TargetState>) -> Vec2 {
        let Some(goal) = self.perception.last_known_position() else {
            return Vec2::ZERO;
        };
        if let Some(velocity) = self.dash_step(ctx, sighting.is_some()) {
            return velocity;
        }

        self.navigate(ctx.now, goal, ctx.obstacles);
        let speed = self.config.chase_speed;
        let steering = self.follower.steer(
            self.position,
            goal,
            speed * ctx.dt,
            ctx.obstacles,
            &self.config.steering,
        );
        let velocity = steering.velocity(speed);

        let look = match sighting {
            Some(target) => target.position - self.position,
            None => velocity,
        };
        self.facing = look.try_normalize().unwrap_or(self.facing);

        self.attack(ctx, sighting.is_some());
        velocity
    }

    /// Re-plans on the timer, or escalates when stuck.
    fn navigate(&mut self, now: f32, goal: Vec2, obstacles: &dyn ObstacleQuery) {
        let response = self.stuck.sample(
            now,
            self.position,
            self.follower.has_path(),
            &self.config.stuck,
        );
        match response {
            StuckResponse::Replan => {
                let enlarged = self.planner.node_size() * self.config.planner.stuck_node_size_factor;
                let planner = self.planner.with_node_size(enlarged);
                debug!(id = self.id, node_size = planner.node_size(), "stuck, re-planning");
                self.replan(planner, now, goal, obstacles);
            }
            StuckResponse::Detour => {
                let detour = random_detour(
                    self.position,
                    obstacles,
                    &self.config.stuck,
                    self.config.steering.agent_radius,
                    &mut self.rng,
                );
                match detour {
                    Some(waypoint) => {
                        debug!(id = self.id, ?waypoint, "stuck, taking a detour");
                        self.follower.set_path(vec![waypoint]);
                        self.next_replan_at = now + self.config.planner.replan_interval;
                        self.pending.push(AgentEvent::Detour { waypoint });
                    }
                    None => debug!(id = self.id, "stuck with no detour heading"),
                }
            }
            StuckResponse::None if now >= self.next_replan_at => {
                self.replan(self.planner, now, goal, obstacles);
            }
            StuckResponse::None => {}
        }
    }

    fn replan(&mut self, planner: PathPlanner, now: f32, goal: Vec2, obstacles: &dyn ObstacleQuery) {
        let plan = planner.plan_detailed(self.position, goal, obstacles);
        trace!(
            id = self.id,
            outcome = ?plan.outcome,
            expansions = plan.expansions,
            waypoints = plan.waypoints.len(),
            "planned"
        );
        self.pending.push(AgentEvent::Replanned {
            outcome: plan.outcome,
            node_size: planner.node_size(),
            waypoints: plan.waypoints.len(),
        });
        self.follower.set_path(plan.waypoints);
        self.next_replan_at = now + self.config.planner.replan_interval;
    }

    /// Runs the boss dash. `Some` means the dash owns this tick's movement.
    fn dash_step(&mut self, ctx: &mut TickContext<'_>, sees_target: bool) -> Option<Vec2> {
        let (Some(dash), Some(config)) = (self.dash.as_mut(), self.config.boss.as_ref()) else {
            return None;
        };
        let was_active = dash.is_active();
        let input = DashInput {
            now: ctx.now,
            dt: ctx.dt,
            attacker: self.id,
            position: self.position,
            target: ctx.target,
            sees_target,
            radius: self.config.steering.agent_radius,
        };
        let step = dash.tick(&input, ctx.obstacles, config)?;
        if !was_active {
            self.pending.push(AgentEvent::DashWindup);
        }
        self.facing = step.facing;
        if let Some(hit) = step.hit {
            ctx.report(&hit);
            self.pending.push(AgentEvent::Hit(hit));
        }
        Some(step.velocity)
    }

    fn attack(&mut self, ctx: &mut TickContext<'_>, line_of_sight: bool) {
        let Some(target) = ctx.target else {
            return;
        };
        let situation = Engagement {
            now: ctx.now,
            attacker: self.id,
            position: self.position,
            target,
            line_of_sight,
        };
        let outcome = self.arbiter.engage(
            &situation,
            &mut *self.equipment,
            &mut *ctx.spawner,
            &mut self.rng,
            &self.config.combat,
        );
        match outcome {
            CombatOutcome::Idle | CombatOutcome::NoProjectile => {}
            CombatOutcome::MeleeHit { facing, hit } => {
                self.swing(ctx.now, facing);
                ctx.report(&hit);
                self.pending.push(AgentEvent::Hit(hit));
            }
            CombatOutcome::MeleeMiss { facing } => {
                self.swing(ctx.now, facing);
                self.pending.push(AgentEvent::MeleeMiss);
            }
            CombatOutcome::Fired {
                facing,
                projectiles,
            } => {
                self.facing = facing;
                self.pending.push(AgentEvent::Fired { projectiles });
            }
            CombatOutcome::OutOfAmmo => self.pending.push(AgentEvent::OutOfAmmo),
        }
    }

    fn swing(&mut self, now: f32, facing: Vec2) {
        self.facing = facing;
        self.set_pose(Pose::Attack);
        self.timers.schedule(
            now,
            self.config.combat.melee_swing_duration,
            DeferredEffect::EndAttackAnimation,
        );
    }
}

impl Agent for Enemy {
    fn id(&self) -> EntityId {
        self.id
    }

    fn position(&self) -> Vec2 {
        self.position
    }

    fn set_position(&mut self, position: Vec2) {
        self.position = position;
    }

    fn state(&self) -> BehaviorState {
        self.state
    }

    fn tick(&mut self, ctx: &mut TickContext<'_>) -> TickOutput {
        let now = ctx.now;
        self.run_timers(now);
        if self.state.is_dead() {
            return self.output(self.nudge);
        }

        let sighting = ctx.target.filter(|t| {
            can_see(
                self.position,
                true,
                Some(t),
                ctx.obstacles,
                self.config.perception.sight_range,
            )
        });
        let pursuing = self.state == BehaviorState::Pursue;
        let event = self.perception.observe(
            now,
            sighting.as_ref(),
            ctx.target.as_ref(),
            pursuing,
            &self.config.perception,
        );
        match event {
            PerceptionEvent::Acquired => self.enter_pursuit(now),
            PerceptionEvent::Forgotten => self.leave_pursuit(),
            PerceptionEvent::TargetDied => {
                self.leave_pursuit();
                return self.output(Vec2::ZERO);
            }
            PerceptionEvent::None => {}
        }

        let velocity = match self.state {
            BehaviorState::Patrol => {
                self.patrol.tick(
                    now,
                    self.position,
                    ctx.obstacles,
                    &self.config.patrol,
                    &mut self.rng,
                ) * self.config.patrol_speed
            }
            BehaviorState::Random => {
                self.wander.tick(
                    now,
                    self.position,
                    ctx.obstacles,
                    &self.config.wander,
                    &mut self.rng,
                ) * self.config.patrol_speed
            }
            BehaviorState::Pursue => self.pursue(ctx, sighting),
            BehaviorState::Dead => Vec2::ZERO,
        };
        if self.state != BehaviorState::Pursue {
            self.facing = velocity.try_normalize().unwrap_or(self.facing);
        }
        self.output(velocity)
    }

    fn hear_sound(&mut self, now: f32, source: Vec2) {
        if self.state.is_dead() {
            return;
        }
        let pursuing = self.state == BehaviorState::Pursue;
        if self.perception.hear(now, source, pursuing) == PerceptionEvent::Acquired {
            debug!(id = self.id, ?source, "heard the target");
            self.enter_pursuit(now);
        }
    }

    fn kill(&mut self, now: f32, knockback: Vec2) -> bool {
        if !self.transition(BehaviorState::Dead) {
            return false;
        }
        self.timers.cancel_all();
        self.follower.clear();
        if let Some(dash) = self.dash.as_mut() {
            dash.cancel();
        }
        self.set_pose(Pose::Idle);
        self.nudge = knockback;
        if knockback != Vec2::ZERO {
            self.timers
                .schedule(now, self.config.knockback_duration, DeferredEffect::StopNudge);
        }
        true
    }
}

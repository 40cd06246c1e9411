//! Behavior state machine scenarios driven through the public agent API.

use hunter_core::{
    Vec2,
    agent::{Agent, AgentEvent, Enemy, TickContext, TickOutput},
    behavior::BehaviorState,
    combat::{HitReport, Loadout, ScoreSink, SpawnLog},
    config::EnemyConfig,
    map::TileMap,
    perception::TargetState,
};

#[derive(Default)]
struct Hits(Vec<HitReport>);

impl ScoreSink for Hits {
    fn on_hit(&mut self, hit: &HitReport) {
        self.0.push(*hit);
    }
}

fn unarmed_enemy() -> Enemy {
    Enemy::new(
        1,
        Vec2::new(5.0, 5.0),
        EnemyConfig::default(),
        Box::new(Loadout::default()),
        11,
    )
}

fn tick(agent: &mut Enemy, map: &TileMap, now: f32, target: Option<TargetState>) -> TickOutput {
    let mut spawner = SpawnLog::default();
    let mut hits = Hits::default();
    let mut ctx = TickContext {
        now,
        dt: 0.1,
        obstacles: map,
        target,
        spawner: &mut spawner,
        score: Some(&mut hits),
    };
    agent.tick(&mut ctx)
}

fn transitions(events: &[AgentEvent]) -> Vec<(BehaviorState, BehaviorState)> {
    events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::StateChanged { from, to } => Some((*from, *to)),
            _ => None,
        })
        .collect()
}

#[test]
fn pursuit_is_abandoned_after_the_forget_time() {
    let map = TileMap::open(20, 20, 1.0);
    let mut agent = unarmed_enemy();
    let seen = Some(TargetState::alive_at(Vec2::new(9.0, 5.0)));
    let mut events = Vec::new();

    events.extend(tick(&mut agent, &map, 0.0, seen).events);
    assert_eq!(agent.state(), BehaviorState::Pursue);

    // The target vanishes; the agent keeps hunting from memory.
    for i in 1..=48 {
        events.extend(tick(&mut agent, &map, i as f32 * 0.1, None).events);
    }
    assert_eq!(agent.state(), BehaviorState::Pursue);

    for i in 51..=55 {
        events.extend(tick(&mut agent, &map, i as f32 * 0.1, None).events);
    }
    assert_eq!(agent.state(), BehaviorState::Patrol);
    assert_eq!(
        transitions(&events),
        vec![
            (BehaviorState::Patrol, BehaviorState::Pursue),
            (BehaviorState::Pursue, BehaviorState::Patrol),
        ]
    );
}

#[test]
fn fresh_sighting_restarts_the_forget_clock() {
    let map = TileMap::open(20, 20, 1.0);
    let mut agent = unarmed_enemy();
    let seen = Some(TargetState::alive_at(Vec2::new(9.0, 5.0)));

    tick(&mut agent, &map, 0.0, seen);
    tick(&mut agent, &map, 4.0, seen);
    tick(&mut agent, &map, 8.5, None);
    assert_eq!(agent.state(), BehaviorState::Pursue);
    tick(&mut agent, &map, 9.0, None);
    assert_eq!(agent.state(), BehaviorState::Patrol);
}

#[test]
fn target_death_ends_pursuit_on_the_same_tick() {
    let map = TileMap::open(20, 20, 1.0);
    let mut agent = unarmed_enemy();
    let alive = TargetState::alive_at(Vec2::new(9.0, 5.0));

    tick(&mut agent, &map, 0.0, Some(alive));
    assert!(agent.follower().has_path());

    let dead = TargetState {
        alive: false,
        ..alive
    };
    let out = tick(&mut agent, &map, 0.1, Some(dead));
    assert_eq!(agent.state(), BehaviorState::Patrol);
    assert_eq!(out.velocity, Vec2::ZERO);
    assert!(!agent.follower().has_path());
    assert_eq!(
        transitions(&out.events),
        vec![(BehaviorState::Pursue, BehaviorState::Patrol)]
    );
}

#[test]
fn stuck_agent_replans_coarser_then_detours() {
    let map = TileMap::open(20, 20, 1.0);
    let mut agent = unarmed_enemy();
    let seen = Some(TargetState::alive_at(Vec2::new(10.0, 5.0)));
    let coarse = agent.config().planner.node_size * agent.config().planner.stuck_node_size_factor;

    let mut coarse_replan_at = None;
    let mut detour_at = None;
    // The host never moves the agent, so every displacement sample is stuck.
    for i in 0..=40 {
        let out = tick(&mut agent, &map, i as f32 * 0.1, seen);
        for event in &out.events {
            match event {
                AgentEvent::Replanned { node_size, .. } if *node_size == coarse => {
                    coarse_replan_at.get_or_insert(i);
                }
                AgentEvent::Detour { .. } => {
                    detour_at.get_or_insert(i);
                    assert_eq!(agent.stuck_counter(), 0);
                }
                _ => {}
            }
        }
        if detour_at.is_some() {
            break;
        }
        if coarse_replan_at.is_some() {
            assert!(agent.stuck_counter() >= 3);
        }
    }

    let (replan, detour) = (coarse_replan_at.unwrap(), detour_at.unwrap());
    assert!(replan < detour);
    assert_eq!(agent.follower().waypoints().len(), 1);
}

#[test]
fn sound_pulls_a_wandering_agent_into_pursuit() {
    let map = TileMap::open(20, 20, 1.0);
    let mut agent = unarmed_enemy();
    assert!(agent.start_wandering());
    tick(&mut agent, &map, 0.0, None);

    agent.hear_sound(0.5, Vec2::new(15.0, 15.0));
    assert_eq!(agent.state(), BehaviorState::Pursue);
    assert_eq!(
        agent.perception().last_known_position(),
        Some(Vec2::new(15.0, 15.0))
    );
    let out = tick(&mut agent, &map, 0.6, None);
    assert!(out.velocity.length() > 0.0);
    assert_eq!(agent.follower().final_waypoint(), Some(Vec2::new(15.0, 15.0)));
}

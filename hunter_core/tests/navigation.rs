//! Planning and locomotion scenarios on tile maps.

use hunter_core::{
    Vec2,
    agent::{Agent, AgentEvent, Enemy, TickContext},
    behavior::BehaviorState,
    combat::{Loadout, SpawnLog},
    config::EnemyConfig,
    map::TileMap,
    obstacle::ObstacleQuery,
    perception::TargetState,
    planner::{PathPlanner, PlanOutcome, PlannerConfig},
    sim::{BODY_RADIUS, Simulation, Target, move_and_slide},
    simplify::simplify,
};

/// 10x8 room split by a wall at x = 5 with a gap along the bottom rows.
fn split_room() -> TileMap {
    let mut map = TileMap::open(10, 8, 1.0);
    map.fill_walls(5, 0, 5, 4).unwrap();
    map
}

#[test]
fn visible_goal_is_a_single_waypoint() {
    let map = split_room();
    let planner = PathPlanner::default();
    let plan = planner.plan_detailed(Vec2::new(1.5, 1.5), Vec2::new(3.5, 6.5), &map);
    assert_eq!(plan.outcome, PlanOutcome::Direct);
    assert_eq!(plan.waypoints, vec![Vec2::new(3.5, 6.5)]);
    assert_eq!(plan.expansions, 0);
}

#[test]
fn planned_route_goes_through_the_gap() {
    let map = split_room();
    let planner = PathPlanner::default();
    let goal = Vec2::new(8.5, 1.5);
    let plan = planner.plan_detailed(Vec2::new(1.5, 1.5), goal, &map);

    assert_eq!(plan.outcome, PlanOutcome::Found);
    assert_eq!(plan.waypoints.last(), Some(&goal));
    assert!(plan.waypoints.iter().any(|w| w.y > 5.0));
    assert!(plan.waypoints.iter().all(|&w| !map.is_blocked(w, 0.0)));
    assert_eq!(simplify(&plan.waypoints, &map), plan.waypoints);
}

#[test]
fn unreachable_goal_falls_back_within_the_budget() {
    let mut map = TileMap::open(40, 40, 1.0);
    // A sealed box around the goal.
    map.fill_walls(20, 20, 24, 20).unwrap();
    map.fill_walls(20, 24, 24, 24).unwrap();
    map.fill_walls(20, 20, 20, 24).unwrap();
    map.fill_walls(24, 20, 24, 24).unwrap();
    let goal = Vec2::new(22.5, 22.5);

    let config = PlannerConfig::default();
    let plan = PathPlanner::new(&config).plan_detailed(Vec2::new(2.5, 2.5), goal, &map);
    assert_eq!(plan.outcome, PlanOutcome::Fallback);
    assert_eq!(plan.waypoints, vec![goal]);
    assert!(plan.expansions <= config.max_expansions);
}

#[test]
fn pursuit_walks_the_path_to_its_end() {
    let map = split_room();
    let goal = Vec2::new(8.5, 1.5);
    let target = Some(TargetState::alive_at(goal));
    let mut agent = Enemy::new(
        1,
        Vec2::new(1.5, 1.5),
        EnemyConfig::default(),
        Box::new(Loadout::default()),
        5,
    );
    let dt = 0.05;
    let reached = agent.config().steering.path_node_reached_distance;
    let mut last: Option<(Vec<Vec2>, usize)> = None;
    let mut arrived = false;
    for i in 0..600 {
        let now = i as f32 * dt;
        // The target keeps making noise until it comes into view.
        if i % 20 == 0 {
            agent.hear_sound(now, goal);
        }
        let mut spawner = SpawnLog::default();
        let mut ctx = TickContext {
            now,
            dt,
            obstacles: &map,
            target,
            spawner: &mut spawner,
            score: None,
        };
        let out = agent.tick(&mut ctx);
        let replanned = out
            .events
            .iter()
            .any(|e| matches!(e, AgentEvent::Replanned { .. } | AgentEvent::Detour { .. }));

        let path = agent.follower().waypoints().to_vec();
        let cursor = agent.follower().cursor();
        if let Some((previous, previous_cursor)) = &last {
            if !replanned && *previous == path {
                assert!(cursor >= *previous_cursor, "cursor moved backwards");
            }
        }
        last = Some((path, cursor));

        let moved = move_and_slide(&map, agent.position(), out.velocity * dt, BODY_RADIUS);
        agent.set_position(moved);
        assert!(!map.is_blocked(agent.position(), BODY_RADIUS));

        if agent.position().distance(goal) <= reached {
            arrived = true;
            break;
        }
    }
    assert!(arrived, "stopped at {:?}", agent.position());
    assert_eq!(agent.state(), BehaviorState::Pursue);
}

#[test]
fn boss_dash_lands_a_lethal_hit() {
    let mut sim = Simulation::new(
        TileMap::open(20, 20, 1.0),
        Some(Target::new(Vec2::new(8.0, 5.0), 10.0)),
    );
    let id = sim.reserve_entity_id();
    sim.add_agent(Box::new(Enemy::new(
        id,
        Vec2::new(5.0, 5.0),
        EnemyConfig::boss(),
        Box::new(Loadout::default()),
        3,
    )));

    let mut windups = 0;
    for _ in 0..60 {
        windups += sim
            .step(0.05)
            .iter()
            .filter(|(_, e)| *e == AgentEvent::DashWindup)
            .count();
    }
    assert!(windups >= 1);
    assert_eq!(sim.stats().dash_hits, 1);
    assert!(sim.target().is_some_and(|t| !t.is_alive()));
    assert_eq!(sim.agent(id).map(|a| a.state()), Some(BehaviorState::Patrol));
}

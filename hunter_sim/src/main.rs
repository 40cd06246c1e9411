use anyhow::{Context, Result};
use clap::Parser;
use hunter_core::{
    EntityId,
    agent::AgentEvent,
    combat::{Loadout, Weapon},
    config::EnemyConfig,
    map::load_map_from_string,
    sim::Simulation,
};
use serde::Deserialize;
use std::{fs, path::PathBuf};
use tracing::{debug, info, level_filters::LevelFilter};

const DEFAULT_MAP: &str = include_str!("../maps/arena01.txt");

#[derive(Parser, Debug)]
#[command(version, about = "Headless enemy AI simulation", long_about = None)]
struct Args {
    /// Map file to load. Uses the built-in arena if omitted.
    #[arg(short, long, value_name = "MAP_FILE")]
    map: Option<PathBuf>,

    /// Number of ticks to simulate
    #[arg(short, long, default_value_t = 600)]
    ticks: u64,

    /// Seconds per tick
    #[arg(long, default_value_t = 0.05)]
    dt: f32,

    /// Base seed for the agents' random streams
    #[arg(short, long, default_value_t = 0)]
    seed: u64,

    /// RON file with tunables and the enemy loadout
    #[arg(short, long, value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Kill the target at this simulation time, in seconds
    #[arg(long, value_name = "SECONDS")]
    kill_target_at: Option<f32>,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Contents of the optional config file.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct Settings {
    tile_size: f32,
    target_health: f32,
    enemy: EnemyConfig,
    loadout: Loadout,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tile_size: 1.0,
            target_health: 5.0,
            enemy: EnemyConfig::default(),
            loadout: Loadout {
                ranged: Some(Weapon::pistol()),
                melee: Some(Weapon::knife()),
                ammo: Some(30),
            },
        }
    }
}

struct App {
    /// The core simulation.
    sim: Simulation,
    kill_target_at: Option<f32>,
}

impl App {
    fn new(map_text: &str, settings: &Settings, args: &Args) -> Result<Self> {
        let layout =
            load_map_from_string(map_text, settings.tile_size).context("failed to parse map")?;
        let sim = Simulation::from_layout(
            layout,
            &settings.enemy,
            &settings.loadout,
            settings.target_health,
            args.seed,
        );
        info!(agents = sim.agents().len(), "simulation ready");
        Ok(App {
            sim,
            kill_target_at: args.kill_target_at,
        })
    }

    /// Handles one step of the simulation.
    fn tick(&mut self, dt: f32) {
        if self
            .kill_target_at
            .is_some_and(|at| self.sim.now() >= at)
        {
            self.kill_target_at = None;
            self.sim.kill_target();
        }
        for (id, event) in self.sim.step(dt) {
            log_event(self.sim.now(), id, &event);
        }
    }

    fn print_summary(&self) {
        let stats = self.sim.stats();
        let tiles = self.sim.map().tiles();
        println!(
            "simulated {:.2}s over {} ticks on a {}x{} map",
            self.sim.now(),
            stats.ticks,
            tiles.width(),
            tiles.height()
        );
        println!("state changes:     {}", stats.state_changes);
        println!("re-plans:          {}", stats.replans);
        println!("detours:           {}", stats.detours);
        println!("projectiles fired: {}", stats.projectiles_fired);
        println!("projectile hits:   {}", stats.projectile_hits);
        println!("still in flight:   {}", self.sim.projectiles_in_flight());
        println!("melee hits:        {}", stats.melee_hits);
        println!("dash hits:         {}", stats.dash_hits);
        match stats.target_killed_at {
            Some(at) => println!("target killed at {at:.2}s"),
            None => println!("target survived"),
        }
        if let Some(target) = self.sim.target() {
            println!("target health:     {:.1}", target.health.max(0.0));
        }
        for agent in self.sim.agents() {
            let p = agent.position();
            println!(
                "agent {:>2}: {:?} at ({:.2}, {:.2})",
                agent.id(),
                agent.state(),
                p.x,
                p.y
            );
        }
    }
}

fn log_event(now: f32, id: EntityId, event: &AgentEvent) {
    match event {
        AgentEvent::Replanned { .. } | AgentEvent::PoseChanged(_) => {
            debug!(now, id, ?event)
        }
        _ => info!(now, id, ?event),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn load_settings(path: Option<&PathBuf>) -> Result<Settings> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    ron::from_str(&text).with_context(|| format!("failed to parse config {}", path.display()))
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    init_tracing(args.verbose);

    anyhow::ensure!(args.dt > 0.0, "--dt must be positive, got {}", args.dt);
    let settings = load_settings(args.config.as_ref())?;
    settings.enemy.validate().context("invalid enemy config")?;

    let map_text = match &args.map {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read map {}", path.display()))?,
        None => DEFAULT_MAP.to_string(),
    };

    let mut app = App::new(&map_text, &settings, &args)?;
    for _ in 0..args.ticks {
        app.tick(args.dt);
    }
    app.print_summary();

    Ok(())
}

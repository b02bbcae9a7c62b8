//! `emtf` CLI: scenario runs, replay import/export.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use emtf_core::TrackFinderConfig;
use sim::replay::{load_event_log, save_event_log, EventLog};
use sim::scenarios::{Scenario, ScenarioKind};
use sim::{MuonGun, RunDriver, RunMetrics};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "emtf", about = "Endcap muon track finder CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Track finder settings shared by every subcommand.
#[derive(clap::Args)]
struct FinderArgs {
    /// JSON configuration file; defaults are used when absent
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the configured verbosity (1: dump outputs, 3: also primitives)
    #[arg(long)]
    verbosity: Option<i32>,
    /// Process the sector units in parallel
    #[arg(long)]
    parallel: bool,
}

impl FinderArgs {
    fn load(&self) -> Result<TrackFinderConfig> {
        let mut config = match &self.config {
            Some(path) => TrackFinderConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => TrackFinderConfig::default(),
        };
        if let Some(v) = self.verbosity {
            config.verbosity = v;
        }
        config.parallel_sectors |= self.parallel;
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a named scenario, run the track finder and output metrics.
    RunScenario {
        #[arg(value_enum)]
        scenario: ScenarioKind,
        /// Random seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Number of events to generate
        #[arg(long, default_value_t = 1000)]
        events: u64,
        #[command(flatten)]
        finder: FinderArgs,
        /// Output metrics to a JSON file
        #[arg(long)]
        output: Option<PathBuf>,
        /// Also save the generated events
        #[arg(long)]
        save_replay: Option<PathBuf>,
    },
    /// Re-run the track finder on a previously recorded event log.
    Replay {
        /// Path to event log JSON file
        input: PathBuf,
        #[command(flatten)]
        finder: FinderArgs,
        /// Output metrics to a JSON file
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::RunScenario {
            scenario,
            seed,
            events,
            finder,
            output,
            save_replay: save_path,
        } => {
            let config = finder.load()?;
            run_scenario(scenario, seed, events, config, output.as_deref(), save_path.as_deref())?;
        }
        Commands::Replay {
            input,
            finder,
            output,
        } => {
            let config = finder.load()?;
            run_replay(&input, config, output.as_deref())?;
        }
    }

    Ok(())
}

fn run_scenario(
    kind: ScenarioKind,
    seed: u64,
    n_events: u64,
    config: TrackFinderConfig,
    output_path: Option<&Path>,
    replay_path: Option<&Path>,
) -> Result<()> {
    let scenario = Scenario::build(kind, seed, n_events);
    let mut gun = MuonGun::new(scenario.gun.clone(), &config, seed);
    let mut driver = RunDriver::new(config, scenario.schedule.clone(), &scenario.geometry)?;

    println!(
        "Running scenario '{}' (seed={}, events={})...",
        scenario.name, seed, n_events
    );

    let start = std::time::Instant::now();
    let mut events = Vec::new();
    let mut truth = Vec::new();

    for id in 0..n_events {
        let (event, muons) = gun.generate(scenario.run, id, scenario.is_real_data);
        driver.process(&event, &muons);
        if replay_path.is_some() {
            events.push(event);
            truth.push(muons);
        }
    }

    let elapsed = start.elapsed();
    report(&driver.metrics, elapsed);

    if let Some(rpath) = replay_path {
        let log = EventLog {
            scenario_name: scenario.name.clone(),
            seed,
            schedule: scenario.schedule.clone(),
            geometry: scenario.geometry.clone(),
            events,
            truth,
        };
        save_event_log(&log, rpath)?;
        println!("Replay saved to {}", rpath.display());
    }

    if let Some(opath) = output_path {
        write_metrics(opath, &scenario.name, seed, &driver.metrics, elapsed)?;
    }

    Ok(())
}

fn run_replay(input: &Path, config: TrackFinderConfig, output_path: Option<&Path>) -> Result<()> {
    let log = load_event_log(input)?;
    println!(
        "Replaying '{}' ({} events)...",
        log.scenario_name,
        log.events.len()
    );

    let mut driver = RunDriver::new(config, log.schedule.clone(), &log.geometry)?;
    let start = std::time::Instant::now();

    for (i, event) in log.events.iter().enumerate() {
        let muons = log.truth.get(i).map_or(&[][..], Vec::as_slice);
        driver.process(event, muons);
    }

    let elapsed = start.elapsed();
    report(&driver.metrics, elapsed);

    if let Some(opath) = output_path {
        write_metrics(opath, &log.scenario_name, log.seed, &driver.metrics, elapsed)?;
    }

    Ok(())
}

fn report(metrics: &RunMetrics, elapsed: std::time::Duration) {
    println!(
        "Done: {} events, {} primitives, {} tracks, elapsed={:.2}s",
        metrics.n_events,
        metrics.n_primitives,
        metrics.n_tracks,
        elapsed.as_secs_f64(),
    );
    println!(
        "Efficiency: {:.3} ({}/{} muons), mean |ΔpT|/pT: {:.3}",
        metrics.efficiency(),
        metrics.n_matched,
        metrics.n_muons,
        metrics.mean_rel_pt_err(),
    );
}

fn write_metrics(
    path: &Path,
    scenario: &str,
    seed: u64,
    metrics: &RunMetrics,
    elapsed: std::time::Duration,
) -> Result<()> {
    let json = serde_json::json!({
        "scenario": scenario,
        "seed": seed,
        "elapsed_s": elapsed.as_secs_f64(),
        "efficiency": metrics.efficiency(),
        "mean_rel_pt_err": metrics.mean_rel_pt_err(),
        "metrics": metrics,
    });
    std::fs::write(path, serde_json::to_string_pretty(&json)?)?;
    println!("Metrics saved to {}", path.display());
    Ok(())
}

#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter running a headless Wave Defence session.
//!
//! The session record and the catalog come from TOML files (bundled
//! defaults are used when none are given). Requested defenders are placed
//! up front, then waves are started back to back until the session ends or
//! the tick budget runs out.

mod config;
mod placement;
mod scoreboard;
mod telemetry;

use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use wave_defence_simulation::{Placement, Simulation};
use wave_defence_system_session::SessionPhase;

use crate::{placement::PlacementRequest, scoreboard::Scoreboard};

/// Runs a headless Wave Defence session.
#[derive(Debug, Parser)]
#[command(name = "wave-defence", version, about, long_about = None)]
struct Args {
    /// Session record (TOML). Uses the bundled record when omitted.
    #[arg(long)]
    session: Option<PathBuf>,
    /// Monster and defender catalog (TOML). Uses the bundled catalog when omitted.
    #[arg(long)]
    catalog: Option<PathBuf>,
    /// Defender to place before the first wave, as KIND@X,Y. KIND is a
    /// catalog name or index. May be repeated.
    #[arg(long = "place", value_name = "KIND@X,Y")]
    placements: Vec<PlacementRequest>,
    /// Upper bound on simulated ticks.
    #[arg(long, default_value_t = 100_000)]
    max_ticks: u64,
    /// Overrides the spawner seed of the session record.
    #[arg(long)]
    seed: Option<u64>,
    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    telemetry::init(&args.log_level);

    let mut config = config::load_session(args.session.as_deref())?;
    if let Some(seed) = args.seed {
        config.rng_seed = seed;
    }
    let catalog = config::load_catalog(args.catalog.as_deref())?;

    let mut simulation =
        Simulation::headless(config, catalog).context("failed to start the simulation")?;
    let scoreboard = Arc::new(Scoreboard::default());
    let _subscriptions = scoreboard.attach(simulation.bus());

    for request in &args.placements {
        place(&mut simulation, request)?;
    }

    let ticks = run(&mut simulation, args.max_ticks)?;

    let outcome = match simulation.outcome() {
        Some(true) => "won",
        Some(false) => "lost",
        None => "unfinished",
    };
    println!("outcome: {outcome}");
    println!(
        "waves cleared: {}/{}",
        scoreboard.waves_cleared(),
        simulation.config().waves_total
    );
    println!(
        "units: {} spawned, {} killed, {} breached",
        scoreboard.spawned(),
        scoreboard.kills(),
        scoreboard.breaches()
    );
    println!("health: {}", simulation.health());
    println!("balance: {}", simulation.balance());
    println!("ticks: {ticks}");
    Ok(())
}

fn place(simulation: &mut Simulation, request: &PlacementRequest) -> Result<()> {
    let kind = request
        .resolve(simulation.catalog())
        .ok_or_else(|| anyhow!("unknown defender kind {:?}", request.kind))?;
    match simulation.place_defender(kind, request.position)? {
        Placement::Placed(defender) => {
            info!(defender = defender.get(), position = %request.position, "defender placed");
        }
        Placement::Rejected(reason) => {
            warn!(?reason, position = %request.position, "placement rejected");
        }
    }
    Ok(())
}

/// Starts waves whenever the session is idle and ticks until it ends.
fn run(simulation: &mut Simulation, max_ticks: u64) -> Result<u64> {
    let mut ticks = 0;
    while ticks < max_ticks && simulation.outcome().is_none() {
        if simulation.session_phase() == SessionPhase::Idle {
            let wave = simulation
                .start_wave()
                .context("failed to start the next wave")?;
            info!(wave = wave.get(), "starting wave");
        }
        ticks += simulation.run_wave(max_ticks - ticks);
    }
    if simulation.outcome().is_none() {
        warn!(ticks, "tick budget exhausted before the session ended");
    }
    Ok(ticks)
}

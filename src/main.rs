//! Binary entry point: parses the CLI, loads a run configuration and
//! model, and drives either the scheduler's KMC/MMC block loop or the
//! MMCFE routine to completion.

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use mocsim_core::cli::{Cli, Commands};
use mocsim_core::config::RunConfig;
use mocsim_core::context::Context;
use mocsim_core::error::EngineResult;
use mocsim_core::mmcfe::{MmcFeConfig, MmcFeRoutine};
use mocsim_core::model::source::{InMemoryModelSource, ModelSource};
use mocsim_core::rng::Pcg32;
use mocsim_core::routine::Routine;
use mocsim_core::scheduler::AbortReason;
use mocsim_core::state::StateImage;

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { config } => run_job(&config),
        Commands::Mmcfe {
            config,
            alpha_min,
            alpha_max,
            alpha_count,
            histogram_range,
            histogram_size,
            relax_cycles,
            log_cycles,
            db_path,
        } => run_mmcfe(
            &config,
            alpha_min,
            alpha_max,
            alpha_count,
            histogram_range,
            histogram_size,
            relax_cycles,
            log_cycles,
            &db_path,
        ),
        Commands::PrintJumpHistograms { state_file } => print_jump_histograms(&state_file),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn load_model(run_config: &RunConfig) -> EngineResult<mocsim_core::model::Model> {
    let bytes = std::fs::read(&run_config.model_path)
        .map_err(|e| mocsim_core::error::EngineError::file(&run_config.model_path, e))?;
    let source = InMemoryModelSource::from_json(&bytes)?;
    source.load_job(run_config.job_id)
}

fn seed_rng(run_config: &RunConfig) -> Pcg32 {
    match run_config.rng_seed {
        Some((initstate, initseq)) => Pcg32::new(initstate, initseq),
        None => Pcg32::from_system_time(),
    }
}

/// Runs a `Run` job (plain KMC or MMC) block by block until the
/// scheduler reports a terminal `AbortReason`, checkpointing to
/// `state_path` every `save_interval_blocks` blocks.
fn run_job(config_path: &Path) -> EngineResult<()> {
    let run_config = RunConfig::load(config_path)?;
    let model = load_model(&run_config)?;

    let mut ctx = if run_config.state_path.exists() {
        info!("resuming job {} from {}", run_config.job_id, run_config.state_path.display());
        Context::restore(model, &run_config.state_path, run_config.block_size)?
    } else {
        let rng = seed_rng(&run_config);
        Context::new(model, rng, run_config.block_size, Some(run_config.state_path.clone()))
    };

    info!("starting job {} ({} sites)", run_config.job_id, ctx.lattice.states.len());

    let mut blocks_since_save = 0u64;
    loop {
        let reason = ctx.run_block()?;
        blocks_since_save += 1;

        if blocks_since_save >= run_config.save_interval_blocks {
            ctx.save_state(&run_config.state_path)?;
            blocks_since_save = 0;
            info!(
                "checkpoint at {} cycles ({} accepted)",
                ctx.scheduler.counters.cycles_executed, ctx.scheduler.counters.cycles_accepted
            );
        }

        match reason {
            AbortReason::Completed | AbortReason::Timeout | AbortReason::RateAbort | AbortReason::EnergyAbort => {
                ctx.save_state(&run_config.state_path)?;
                info!("job stopped: {reason:?}");
                break;
            }
            AbortReason::ConditionAbort => continue,
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_mmcfe(
    config_path: &Path,
    alpha_min: f64,
    alpha_max: f64,
    alpha_count: u32,
    histogram_range: f64,
    histogram_size: u32,
    relax_cycles: u64,
    log_cycles: u64,
    db_path: &Path,
) -> EngineResult<()> {
    let run_config = RunConfig::load(config_path)?;
    let model = load_model(&run_config)?;
    let rng = seed_rng(&run_config);
    let mut ctx = Context::new(model, rng, run_config.block_size, None);

    let mut routine = MmcFeRoutine::with_config(MmcFeConfig {
        alpha_min,
        alpha_max,
        alpha_count,
        histogram_range,
        histogram_size,
        relax_cycles,
        log_cycles,
        db_path: Some(db_path.to_path_buf()),
    });

    info!(
        "running mmcfe sweep from alpha {alpha_min} to {alpha_max} in {alpha_count} steps, logging to {}",
        db_path.display()
    );
    routine.run(&mut ctx)
}

fn print_jump_histograms(state_file: &Path) -> EngineResult<()> {
    let image = StateImage::load_from_file(state_file)?;
    let jumpstat_bytes = image.region(mocsim_core::state::Region::JumpStatistics);
    let jump_statistics: mocsim_core::tracking::JumpStatistics = bincode::deserialize(jumpstat_bytes)
        .map_err(|e| mocsim_core::error::EngineError::DataConsistency(format!("corrupt jump statistics region: {e}")))?;

    let counters_bytes = image.region(mocsim_core::state::Region::Counters);
    let counters: mocsim_core::scheduler::Counters = bincode::deserialize(counters_bytes)
        .map_err(|e| mocsim_core::error::EngineError::DataConsistency(format!("corrupt counters region: {e}")))?;

    println!(
        "cycles: {} executed, {} accepted, {} rejected, {} skipped by frequency",
        counters.cycles_executed, counters.cycles_accepted, counters.cycles_rejected, counters.cycles_skipped_by_frequency
    );
    println!("simulated time: {:.6e} s", counters.simulated_time);
    for (particle, c) in &counters.per_particle {
        println!(
            "particle {particle}: mcs={} rejection={} skip={} site_blocking={} unstable_start={} unstable_end={}",
            c.mcs_count, c.rejection_count, c.skip_count, c.site_blocking_count, c.unstable_start_count, c.unstable_end_count
        );
    }

    for ((collection_id, particle), bucket) in jump_statistics.iter() {
        println!("collection {collection_id}, particle {particle}:");
        println!(
            "  s1_energy          underflow={} overflow={} total={}",
            bucket.s1_energy.underflow(),
            bucket.s1_energy.overflow(),
            bucket.s1_energy.bins().iter().sum::<u64>()
        );
        println!(
            "  conformation_delta underflow={} overflow={} total={}",
            bucket.conformation_delta.underflow(),
            bucket.conformation_delta.overflow(),
            bucket.conformation_delta.bins().iter().sum::<u64>()
        );
        println!(
            "  s0_to_s2_delta     underflow={} overflow={} total={}",
            bucket.s0_to_s2_delta.underflow(),
            bucket.s0_to_s2_delta.overflow(),
            bucket.s0_to_s2_delta.bins().iter().sum::<u64>()
        );
        println!(
            "  effective_barrier  underflow={} overflow={} total={}",
            bucket.effective_barrier.underflow(),
            bucket.effective_barrier.overflow(),
            bucket.effective_barrier.bins().iter().sum::<u64>()
        );
    }

    Ok(())
}

extern crate pretty_env_logger;

#[macro_use]
extern crate log;

use clap::Parser;
use haplomux::{
    Cli, Commands, ExecutionPlan, PipelineConfig, PipelineDriver, PipelineParams, PlanArgs,
    RunArgs, Stage, SystemOps,
};
use std::sync::Arc;

fn main() {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Plan(args) => plan(args),
    }
}

fn setup_logging(debug: bool) {
    let level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    pretty_env_logger::formatted_timed_builder()
        .filter_level(level)
        .init();
}

fn run(args: RunArgs) {
    setup_logging(args.debug());

    info!("starting");
    info!("params: {:#?}", args);
    if !args.validate() {
        error!("please fix arguments");
        std::process::exit(1);
    }

    let samples = args.samples();
    let config = PipelineConfig {
        requested: args.tracks.requested(),
        flags: args.tracks.resolve_flags(),
        caller: args.tracks.caller,
        gvcf: args.tracks.gvcf,
        policy: args.tracks.policy(),
        chunk_size: args.tracks.chunk_size,
        threads: args.io.threads,
        out_format: args.io.out_format,
        run_params: args.run_params(),
    };

    let ops = match SystemOps::new(args.io.out_dir.clone()) {
        Ok(ops) => Arc::new(ops.with_variant_db(args.io.variant_db.clone())),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let driver = PipelineDriver::new(config, ops);
    let runs = driver.run(&samples);

    let failed = runs
        .iter()
        .filter(|run| run.final_stage == Stage::Failed)
        .count();
    for run in &runs {
        match &run.outcome {
            Ok(success) => info!(
                "sample {}: {} call sets, {} downstream tracks",
                run.alias,
                success.result.call_sets.len(),
                success.track_calls.len()
            ),
            Err(e) => error!("sample {}: {}", run.alias, e),
        }
    }

    info!("finished");
    if failed != 0 {
        error!("{} of {} samples failed", failed, runs.len());
        std::process::exit(1);
    }
}

fn plan(args: PlanArgs) {
    setup_logging(args.debug());

    if !args.validate() {
        error!("please fix arguments");
        std::process::exit(1);
    }

    let plan = match ExecutionPlan::new(
        args.tracks.requested(),
        &args.tracks.resolve_flags(),
        args.tracks.policy(),
        args.tracks.caller,
        args.tracks.chunk_size,
        &args.reference,
        args.bed.as_deref(),
    ) {
        Ok(plan) => plan,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    println!("{}", plan);
}

//! Command-line entry point of the pipeline harness.

use std::process::ExitCode;

use clap::Parser;
use pipeline_harness::pipeline::{Harness, PipelineOptions, StageCosts};
use tracing_subscriber::EnvFilter;

/// Run N items through a Produce -> Transform -> Consume pipeline on a
/// bounded worker pool and report when every stage ran.
#[derive(Parser, Debug)]
#[command(name = "pipeline-harness")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    RUST_LOG=info   Override the log filter (logs go to stderr)")]
pub struct Cli {
    /// Number of items
    #[arg(default_value_t = 8, allow_negative_numbers = true)]
    pub items: i64,

    /// Worker pool size (default: every available core)
    #[arg(short = 'w', long, allow_negative_numbers = true)]
    pub workers: Option<i64>,

    /// 0 prints the per-item summary, 1 the full event log
    #[arg(short = 'v', long, default_value_t = 1, allow_negative_numbers = true)]
    pub verbosity: i64,

    /// Relative cost of stage A
    #[arg(long, default_value_t = 2)]
    pub produce_cost: u32,

    /// Relative cost of stage B
    #[arg(long, default_value_t = 3)]
    pub transform_cost: u32,

    /// Relative cost of stage C
    #[arg(long, default_value_t = 1)]
    pub consume_cost: u32,

    /// Hash-mixing rounds per unit of cost
    #[arg(long, default_value_t = pipeline_harness::pipeline::DEFAULT_COST_UNIT)]
    pub cost_unit: u32,

    /// Enable debug logging
    #[arg(short = 'd', long)]
    pub debug: bool,
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let costs = StageCosts {
        produce: cli.produce_cost,
        transform: cli.transform_cost,
        consume: cli.consume_cost,
    };
    let options = match PipelineOptions::from_raw(cli.items, cli.workers, cli.verbosity) {
        Ok(options) => options.with_costs(costs, cli.cost_unit),
        Err(error) => {
            eprintln!("error: {error}");
            return ExitCode::FAILURE;
        }
    };

    match Harness::new(options).run() {
        Ok(report) => {
            print!("{report}");
            if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

use std::process::ExitCode;

use burn::{config::Config, tensor::backend::Backend};
use clap::{Parser, Subcommand};
use lnlstm_cli::{
    BenchBackend,
    bench::{self, BenchArgs},
    gradcheck::{self, GradcheckArgs},
};
use lnlstm_core::LayerNormLstmConfig;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lnlstm", about = "Layer-normalized LSTM tooling")]
struct Cli {
    /// JSON file holding a `LayerNormLstmConfig`
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Time the forward (and optionally backward) call
    Bench(BenchArgs),
    /// Compare every analytic gradient with central differences
    Gradcheck(GradcheckArgs),
}

fn run_bench(args: &BenchArgs, config: &LayerNormLstmConfig) -> ExitCode {
    let timings = match args.dtype.as_str() {
        "float32" => {
            let device: <BenchBackend<f32> as Backend>::Device = Default::default();
            bench::bench::<BenchBackend<f32>>(args, config, &device).map(|t| ("float32", t))
        }
        "float64" => {
            let device: <BenchBackend<f64> as Backend>::Device = Default::default();
            bench::bench::<BenchBackend<f64>>(args, config, &device).map(|t| ("float64", t))
        }
        other => {
            error!("Unknown dtype: {other}. Use: float32, float64");
            return ExitCode::FAILURE;
        }
    };

    let (dtype, timings) = match timings {
        Ok(timings) => timings,
        Err(err) => {
            error!(%err, "benchmark failed");
            return ExitCode::FAILURE;
        }
    };

    let result = bench::result(args, config, dtype, timings);
    if args.json {
        match serde_json::to_string(&result) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                error!(%err, "failed to serialize result");
                return ExitCode::FAILURE;
            }
        }
    } else {
        info!(
            backend = result.backend,
            dtype = result.dtype,
            forward_ms = result.forward_ms,
            backward_ms = ?result.backward_ms,
            throughput = result.throughput,
            "T={} N={} C={} H={}",
            result.time_steps,
            result.batch,
            result.input,
            result.hidden,
        );
    }
    ExitCode::SUCCESS
}

fn run_gradcheck(args: &GradcheckArgs, config: &LayerNormLstmConfig) -> ExitCode {
    let checks = match gradcheck::run(args, config) {
        Ok(checks) => checks,
        Err(err) => {
            error!(%err, "gradient check failed to run");
            return ExitCode::FAILURE;
        }
    };

    if args.json {
        match serde_json::to_string(&checks) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                error!(%err, "failed to serialize result");
                return ExitCode::FAILURE;
            }
        }
    } else {
        for check in &checks {
            info!(
                elements = check.elements,
                max_abs_error = check.max_abs_error,
                max_rel_error = check.max_rel_error,
                "{}: {}",
                check.name,
                if check.passed { "ok" } else { "FAILED" },
            );
        }
    }

    if checks.iter().all(|c| c.passed) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match LayerNormLstmConfig::load(path) {
            Ok(config) => config,
            Err(err) => {
                error!(%err, "Failed to load config from {path}");
                return ExitCode::FAILURE;
            }
        },
        None => LayerNormLstmConfig::new(),
    };

    match &cli.command {
        Commands::Bench(args) => run_bench(args, &config),
        Commands::Gradcheck(args) => run_gradcheck(args, &config),
    }
}

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};

use service_metrics::{MetricsConfig, MetricsEngine};

#[derive(Parser)]
#[command(name = "service-metrics", about = "Service response time and success rate")]
struct Cli {
    /// TOML config file; defaults to METRICS_CONFIG_PATH or config/metrics.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    ResponseTime(ResponseTimeArgs),
    SuccessRate(SuccessRateArgs),
    /// Response time, then the success rate fed with it
    Score(ScoreArgs),
    /// Write the effective configuration to a TOML file
    WriteConfig(WriteConfigArgs),
}

#[derive(Args, Debug, Clone)]
struct ResponseTimeArgs {
    #[arg(long)]
    service: String,
    #[arg(long)]
    professional: String,
}

#[derive(Args, Debug, Clone)]
struct SuccessRateArgs {
    #[arg(long)]
    service: i64,
    #[arg(long)]
    category: Option<i64>,
    #[arg(long)]
    response_minutes: Option<f64>,
}

#[derive(Args, Debug, Clone)]
struct ScoreArgs {
    #[arg(long)]
    service: i64,
    #[arg(long)]
    professional: String,
    #[arg(long)]
    category: Option<i64>,
}

#[derive(Args, Debug, Clone)]
struct WriteConfigArgs {
    #[arg(long, default_value = "config/metrics.toml")]
    output: PathBuf,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScoreReport {
    service_id: i64,
    response_time: service_metrics::ResponseTimeResult,
    success_rate: service_metrics::SuccessRateResult,
}

#[tokio::main]
async fn main() {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let cli = Cli::parse();
    let (config, config_path) = MetricsConfig::load(cli.config)?;
    if let Some(path) = config_path.as_ref().filter(|path| path.exists()) {
        tracing::info!(path = %path.display(), "loaded config");
    }

    match cli.command {
        Command::WriteConfig(args) => {
            config.write(&args.output)?;
            println!("wrote {}", args.output.display());
            Ok(())
        }
        Command::ResponseTime(args) => {
            let engine = MetricsEngine::new(config);
            let result = engine
                .compute_service_response_time(&args.service, &args.professional)
                .await;
            print_json(&result)
        }
        Command::SuccessRate(args) => {
            let engine = MetricsEngine::new(config);
            let result = engine
                .compute_service_success_rate(args.service, args.category, args.response_minutes)
                .await;
            print_json(&result)
        }
        Command::Score(args) => {
            let engine = MetricsEngine::new(config);
            let response_time = engine
                .compute_service_response_time(&args.service.to_string(), &args.professional)
                .await;
            let success_rate = engine
                .compute_service_success_rate(args.service, args.category, response_time.value)
                .await;
            print_json(&ScoreReport {
                service_id: args.service,
                response_time,
                success_rate,
            })
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let payload = serde_json::to_string_pretty(value)
        .map_err(|err| format!("failed to serialize result: {}", err))?;
    println!("{}", payload);
    Ok(())
}

fn load_dotenv() {
    let _ = dotenvy::dotenv();
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let manifest_path = Path::new(manifest_dir).join(".env");
    let _ = dotenvy::from_path(manifest_path);
}

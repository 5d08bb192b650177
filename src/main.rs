use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use legwheel_runtime::config::ControllerConfig;

/// Drive controller for the five-legged four-wheel base
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// JSON file overriding the default controller constants
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    dump_config: bool,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match ControllerConfig::from_file(path) {
            Ok(config) => {
                info!("Loaded controller config from {}", path.display());
                config
            }
            Err(e) => {
                eprintln!("Config error ({}): {}", path.display(), e);
                std::process::exit(2);
            }
        },
        None => ControllerConfig::default(),
    };

    if args.dump_config {
        match serde_json::to_string_pretty(&config) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Failed to serialize config: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    if let Err(e) = legwheel_runtime::runtime::run(config).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

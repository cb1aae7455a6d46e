//! Mirage - Controllable HTTP Response Simulator

use clap::{Parser, Subcommand};
use mirage::config::{self, EnvSource};
use mirage::{AppState, Server, NAME, VERSION};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Mirage - Controllable HTTP Response Simulator
#[derive(Parser)]
#[command(name = NAME)]
#[command(version = VERSION)]
#[command(about = "Echo server with header-driven delays, faults, scenarios and replay")]
struct Cli {
    /// Configuration file path (YAML or TOML); defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log format (pretty, json, compact)
    #[arg(long, default_value = "pretty")]
    log_format: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Run,

    /// Validate configuration
    Validate,

    /// Show the effective configuration
    Config,

    /// Check server health
    Health {
        /// Server address
        #[arg(short, long, default_value = "http://127.0.0.1:8080")]
        address: String,
    },
}

#[tokio::main]
async fn main() -> mirage::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level, &cli.log_format);

    let env = EnvSource::process();
    let config_path = cli.config.as_deref();
    match cli.command {
        Some(Commands::Validate) => validate_config(config_path, &env),
        Some(Commands::Config) => show_config(config_path, &env),
        Some(Commands::Health { address }) => check_health(&address).await,
        Some(Commands::Run) | None => run_server(config_path, &env).await,
    }
}

/// Initialize logging based on configuration
fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mirage={}", level)));

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        "compact" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().compact())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }
}

/// Run the server
async fn run_server(config_path: Option<&Path>, env: &EnvSource) -> mirage::Result<()> {
    info!("Starting {} v{}", NAME, VERSION);

    let config = config::load_effective(config_path, env)?;
    let state = AppState::from_env(config, env)?;
    let defaults = state.defaults.snapshot();
    if !defaults.is_empty() {
        info!("Directive defaults: {:?}", defaults);
    }

    let server = Server::bind(state).await?;
    info!("Listening on {}", server.local_addr()?);
    server.run().await
}

/// Validate configuration file
fn validate_config(config_path: Option<&Path>, env: &EnvSource) -> mirage::Result<()> {
    println!("Validating configuration: {:?}", config_path);

    match config::load_effective(config_path, env) {
        Ok(config) => {
            println!("\n\u{2713} Configuration is valid!");
            println!("\nSummary:");
            println!("  Listen address: {}", config.server.listen_address());
            println!("  CORS: {}", config.server.enable_cors);
            println!("  Max body size: {} bytes", config.server.max_body_size);
            println!("  History size: {}", config.history.size);
            if config.rate_limit.is_enabled() {
                println!(
                    "  Rate limit: {} rps, burst {}",
                    config.rate_limit.requests_per_second, config.rate_limit.burst
                );
            } else {
                println!("  Rate limit: disabled");
            }
            Ok(())
        }
        Err(e) => {
            println!("\n\u{2717} Configuration is invalid!");
            println!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Show the effective configuration
fn show_config(config_path: Option<&Path>, env: &EnvSource) -> mirage::Result<()> {
    let config = config::load_effective(config_path, env)?;

    let yaml =
        serde_yaml::to_string(&config).map_err(|e| mirage::MirageError::Config(e.to_string()))?;

    println!("{}", yaml);
    Ok(())
}

/// Check server health
async fn check_health(address: &str) -> mirage::Result<()> {
    println!("Checking health at {}...", address);

    let client = reqwest::Client::new();
    let url = format!("{}/health", address.trim_end_matches('/'));

    match client.get(&url).send().await {
        Ok(response) => {
            if response.status().is_success() {
                println!("\u{2713} Server is healthy");
                Ok(())
            } else {
                println!("\u{2717} Server returned status: {}", response.status());
                std::process::exit(1);
            }
        }
        Err(e) => {
            println!("\u{2717} Failed to connect: {}", e);
            std::process::exit(1);
        }
    }
}

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use proxy_envelope::config::{load_config, ApiProfile, ApiRegistry, ConfigWatcher};
use proxy_envelope::observability;

#[derive(Parser)]
#[command(name = "envelope-cli")]
#[command(about = "Inspect and validate request envelope configuration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file
    Check { path: PathBuf },
    /// Print the resolved per-API request profiles
    Show {
        path: PathBuf,
        /// Only show this API (unknown names show the defaults)
        #[arg(short, long)]
        api: Option<String>,
    },
    /// Watch a configuration file and log every reload until Ctrl+C
    Watch { path: PathBuf },
}

fn profile_json(profile: &ApiProfile) -> Value {
    json!({
        "name": profile.name,
        "timeout_secs": profile.timeout.as_secs_f64(),
        "expiry_secs": profile.expiry.map(|d| d.as_secs_f64()),
        "rate_limit": profile.rate_limit,
        "request_config": profile.request_config,
    })
}

async fn watch(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&path)?;
    observability::init(&config.observability)?;

    let registry = ApiRegistry::new(&config)?;
    let (watcher, updates) = ConfigWatcher::new(&path);
    let _watcher = watcher.run()?;

    tracing::info!(apis = ?registry.api_names(), "Watching configuration");
    tokio::select! {
        _ = registry.follow(updates) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }
    Ok(())
}

fn check(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&path)?;
    println!("{}: OK ({} APIs)", path.display(), config.apis.len());
    Ok(())
}

fn show(path: PathBuf, api: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&path)?;
    let registry = ApiRegistry::new(&config)?;
    let profiles: Vec<Value> = match api {
        Some(name) => vec![profile_json(&registry.profile(&name))],
        None => registry
            .api_names()
            .iter()
            .map(|name| profile_json(&registry.profile(name)))
            .collect(),
    };
    println!("{}", serde_json::to_string_pretty(&profiles)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check { path } => check(path),
        Commands::Show { path, api } => show(path, api),
        Commands::Watch { path } => watch(path).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

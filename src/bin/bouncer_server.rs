// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! bouncer-server binary - brute-force protection guard
//!
//! This binary loads the guard configuration and serves authorization and
//! policy requests until it receives SIGINT or SIGTERM.

use anyhow::{Context, Result};
use bouncer::config::{generate_config_template, load_config, GuardFileConfig};
use bouncer::guard::{AdmissionEngine, Sweeper};
use bouncer::server::BouncerServer;
use bouncer::utils::logging;
use clap::{ArgAction, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Bouncer - brute-force protection for authentication endpoints
#[derive(Parser, Debug)]
#[command(name = "bouncer-server")]
#[command(version)]
#[command(about = "Brute-force protection guard for authentication endpoints", long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, global = true, value_name = "FILE", env = "BOUNCER_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address
    #[arg(short = 'b', long, global = true, value_name = "ADDR")]
    bind_address: Option<String>,

    /// Port to listen on
    #[arg(short, long, global = true, value_name = "PORT")]
    port: Option<u16>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the guard server (default)
    Run,

    /// Generate a configuration file template
    GenConfig {
        /// Output path (stdout if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Check configuration file for errors
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init_logging(cli.verbose);

    match &cli.command {
        None | Some(Commands::Run) => run_server(&cli).await,
        Some(Commands::GenConfig { output }) => gen_config(output.as_deref()),
        Some(Commands::CheckConfig) => check_config(&cli),
    }
}

/// Load the configuration and apply CLI overrides.
fn resolve_config(cli: &Cli) -> Result<GuardFileConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config(Some(path.as_path()))
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => load_config(None).context("Failed to load configuration")?,
    };

    if let Some(bind_address) = &cli.bind_address {
        config.server.bind_address = bind_address.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    Ok(config)
}

/// Run the guard server
async fn run_server(cli: &Cli) -> Result<()> {
    tracing::info!("Starting bouncer-server");

    let config = resolve_config(cli)?;

    let engine = AdmissionEngine::with_config(
        config.limits.bucket_config(),
        &config.policy.allow,
        &config.policy.deny,
    )
    .context("Failed to initialize admission engine")?;
    let engine = Arc::new(engine);

    tracing::info!(
        address = %config.server.listen_address(),
        window_secs = config.limits.window,
        "Server configuration loaded"
    );

    let shutdown = CancellationToken::new();
    let sweeper = Sweeper::spawn_with_token(
        Arc::clone(engine.buckets()),
        config.limits.sweep_interval(),
        shutdown.child_token(),
    );

    let server = BouncerServer::new(engine, config.server.clone());
    let shutdown_signal = setup_signal_handlers()?;

    let server_token = shutdown.clone();
    let mut serve = tokio::spawn(async move { server.run(server_token).await });

    tokio::select! {
        result = &mut serve => {
            shutdown.cancel();
            sweeper.shutdown().await?;
            result.context("Server task panicked")?.context("Server error")?;
            return Ok(());
        }
        _ = shutdown_signal => {
            tracing::info!("Received shutdown signal");
        }
    }

    shutdown.cancel();
    serve
        .await
        .context("Server task panicked")?
        .context("Server error")?;
    sweeper.shutdown().await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Generate a configuration file template
fn gen_config(output: Option<&Path>) -> Result<()> {
    let template = generate_config_template();

    if let Some(path) = output {
        fs::write(path, &template).context("Failed to write configuration file")?;
        println!("Configuration template written to {}", path.display());
    } else {
        print!("{}", template);
    }

    Ok(())
}

/// Check configuration file for errors
fn check_config(cli: &Cli) -> Result<()> {
    let config = resolve_config(cli)?;

    println!("✓ Configuration is valid\n");
    println!("Server:");
    println!("  Listen address: {}", config.server.listen_address());
    println!("  Max request size: {} bytes", config.server.max_request_bytes);
    println!("  Max connections: {}", config.server.max_connections);

    println!("\nLimits:");
    println!("  Window: {}s", config.limits.window);
    println!("  Sweep interval: {}s", config.limits.sweep_interval().as_secs());
    for (category, capacity) in &config.limits.capacity {
        println!("  {category}: {capacity} attempts per window");
    }

    println!("\nPolicy:");
    println!("  Allow: {:?}", config.policy.allow);
    println!("  Deny: {:?}", config.policy.deny);

    Ok(())
}

/// Setup signal handlers for graceful shutdown
fn setup_signal_handlers() -> Result<impl std::future::Future<Output = ()>> {
    use tokio::signal;

    #[cfg(unix)]
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;

    Ok(async move {
        #[cfg(unix)]
        let terminate = sigterm.recv();

        #[cfg(not(unix))]
        let terminate = std::future::pending::<Option<()>>();

        tokio::select! {
            result = signal::ctrl_c() => {
                match result {
                    Ok(()) => tracing::info!("Received SIGINT (Ctrl+C)"),
                    Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C"),
                }
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM");
            }
        }
    })
}

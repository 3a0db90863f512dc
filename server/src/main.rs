//! Flareprof server
//!
//! Starts the CPU and Heap profilers of this process behind the HTTP API and
//! optionally runs a demo workload to profile.

use anyhow::{Context, Result};
use clap::Parser;
use flareprof_agent::Profiler;
use flareprof_server::config::ServerConfig;
use flareprof_server::server::{http, AppState};
use flareprof_server::workload;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "flareprof-server")]
#[command(about = "Remote-controlled CPU and heap profiler with flamegraph export", long_about = None)]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "FLAREPROF_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP listen address (e.g. "127.0.0.1:8787")
    #[arg(short, long)]
    listen: Option<String>,

    /// Directory session output paths point into
    #[arg(long)]
    profile_dir: Option<PathBuf>,

    /// Samples kept per session
    #[arg(long)]
    max_samples: Option<usize>,

    /// Write collapsed stacks to the output path on stop
    #[arg(long)]
    persist_on_stop: bool,

    /// Run the built-in CPU and heap workload
    #[arg(long)]
    demo_workload: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(listen) = &self.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(dir) = &self.profile_dir {
            config.profile_dir = dir.clone();
        }
        if let Some(max) = self.max_samples {
            config.max_samples = max;
        }
        if self.persist_on_stop {
            config.persist_on_stop = true;
        }
        if self.demo_workload {
            config.demo_workload = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(args.verbose)?;

    let mut config = ServerConfig::load(args.config.as_deref())
        .context("Failed to load server configuration")?;
    args.apply(&mut config);
    config.validate().context("Invalid server configuration")?;
    let addr = config.socket_addr()?;

    info!("Starting flareprof server");
    info!("Configuration: {:?}", config);

    let profiler = Arc::new(Profiler::for_current_process(config.profiler()));
    let shutdown = CancellationToken::new();

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C, shutting down"),
                Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
            }
            shutdown.cancel();
        });
    }

    let workers = if config.demo_workload {
        workload::spawn(
            &profiler,
            Duration::from_millis(config.demo_sample_interval_ms),
            shutdown.clone(),
        )
        .context("Failed to start demo workload")?
    } else {
        Vec::new()
    };

    let state = Arc::new(AppState::new(profiler, &config));
    let served = http::serve(addr, state, shutdown.clone()).await;

    // A bind failure returns before Ctrl+C; stop the workload either way.
    shutdown.cancel();
    for worker in workers {
        match tokio::task::spawn_blocking(move || worker.join()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => warn!("Demo workload thread panicked"),
            Err(e) => warn!("Failed to join demo workload: {}", e),
        }
    }

    served.context("HTTP server failed")?;
    info!("Server stopped");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    Ok(())
}

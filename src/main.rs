//! Spotter CLI - serves object detection over TCP or HTTP.
//!
//! This is the main binary entry point. See the `spotter` library for the
//! core functionality.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mimalloc::MiMalloc;
use spotter::constants::{DEFAULT_HTTP_PORT, DEFAULT_SOCKET_PORT};
use spotter::http::HttpServer;
use spotter::socket::SocketServer;
use spotter::{Config, DetectionService};

/// Global allocator configured per M-MIMALLOC-APPS guideline.
/// mimalloc provides better multi-threaded performance than the system allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

// CLI
#[derive(Parser)]
#[command(name = "spotter")]
#[command(version)]
#[command(about = "Object detection server speaking newline-delimited JSON")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the newline-delimited JSON protocol over TCP (default port 12345)
    Socket {
        #[command(flatten)]
        common: CommonArgs,
        /// Close connections idle for this many seconds (0 = never)
        #[arg(long)]
        idle_timeout: Option<u64>,
        /// Maximum number of concurrent connections (0 = unbounded)
        #[arg(long)]
        max_connections: Option<usize>,
        /// Maximum frame length in bytes (0 = unbounded)
        #[arg(long)]
        max_frame_bytes: Option<usize>,
    },
    /// Serve POST /detect over HTTP (default port 10000)
    Http {
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Listening port (overrides PORT)
    #[arg(long)]
    port: Option<u16>,
    /// Detector command line, e.g. "python3 detect.py" (overrides SPOTTER_DETECTOR_CMD)
    #[arg(long)]
    detector: Option<String>,
    /// Seconds allowed per detector invocation (0 = no limit)
    #[arg(long)]
    detector_timeout: Option<u64>,
}

impl CommonArgs {
    fn apply(self, config: &mut Config) {
        if let Some(port) = self.port {
            config.port = Some(port);
        }
        if let Some(detector) = self.detector {
            config.detector_command = Some(detector);
        }
        if let Some(secs) = self.detector_timeout {
            config.detector_timeout = spotter::config::positive_secs(secs);
        }
    }
}

/// Set up logging to stderr, or to `SPOTTER_LOG_FILE` when set.
fn init_logging() -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_timestamp_secs();
    if let Ok(path) = std::env::var("SPOTTER_LOG_FILE") {
        let log_file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create log file at {path}"))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }
    builder.init();
    Ok(())
}

/// Resolve when the process is asked to stop (Ctrl-C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();
    let mut config = Config::load()?;

    match cli.command {
        Commands::Socket {
            common,
            idle_timeout,
            max_connections,
            max_frame_bytes,
        } => {
            common.apply(&mut config);
            if let Some(secs) = idle_timeout {
                config.idle_timeout = spotter::config::positive_secs(secs);
            }
            if let Some(max) = max_connections {
                config.max_connections = (max > 0).then_some(max);
            }
            if let Some(max) = max_frame_bytes {
                config.max_frame_len = (max > 0).then_some(max);
            }

            let service = Arc::new(DetectionService::new(config.build_detector()?));
            let server = SocketServer::start(
                config.bind_addr(DEFAULT_SOCKET_PORT),
                service,
                config.server_options(),
            )
            .await?;
            log::info!("Spotter v{} serving socket protocol", env!("CARGO_PKG_VERSION"));

            shutdown_signal().await;
            log::info!("Shutting down...");
            server.shutdown().await;
        }
        Commands::Http { common } => {
            common.apply(&mut config);

            let service = Arc::new(DetectionService::new(config.build_detector()?));
            let server = HttpServer::start(config.bind_addr(DEFAULT_HTTP_PORT), service).await?;
            log::info!("Spotter v{} serving HTTP", env!("CARGO_PKG_VERSION"));

            shutdown_signal().await;
            log::info!("Shutting down...");
            server.shutdown().await;
        }
    }

    Ok(())
}

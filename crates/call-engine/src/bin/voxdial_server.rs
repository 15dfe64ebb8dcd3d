//! voxdial server binary
//!
//! Runs the HTTP surface, the SIP endpoint, and the dialer worker in one
//! process. Exit codes: 0 clean stop, 1 configuration error at startup,
//! 2 persistent store failure.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use voxdial_call_engine::{server, CallEngine, EngineConfig};
use voxdial_infra_common::{parse_log_level, setup_logging, LoggingConfig};

#[derive(Parser, Debug)]
#[command(name = "voxdial-server", about = "voxdial voice-agent backend")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit JSON-formatted logs
    #[arg(long)]
    json_logs: bool,

    /// Disable the dialer worker (media-only node)
    #[arg(long)]
    no_worker: bool,

    /// Disable the SIP endpoint (cloud-telephony-only node)
    #[arg(long)]
    no_sip: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let level = match parse_log_level(&args.log_level) {
        Ok(level) => level,
        Err(e) => {
            eprintln!("invalid --log-level: {}", e);
            return ExitCode::from(1);
        }
    };
    let mut logging = LoggingConfig::new(level, "voxdial-server");
    if args.json_logs {
        logging = logging.with_json();
    }
    setup_logging(&logging);

    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "configuration rejected");
            return ExitCode::from(1);
        }
    };

    let engine = match CallEngine::new(config.clone()).await {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            error!(error = %e, "store initialisation failed");
            return ExitCode::from(2);
        }
    };

    let shutdown = CancellationToken::new();
    if !args.no_sip {
        engine.spawn_sip(shutdown.clone());
    }

    let (worker_shutdown, worker_handle) = match (!args.no_worker).then(|| engine.spawn_worker()) {
        Some((tx, handle)) => (Some(tx), Some(handle)),
        None => (None, None),
    };

    let listener = match tokio::net::TcpListener::bind(config.http_bind).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(bind = %config.http_bind, error = %e, "http bind failed");
            return ExitCode::from(1);
        }
    };
    info!(bind = %config.http_bind, "voxdial server listening");

    let app = server::router(engine.clone());
    let serve_shutdown = shutdown.clone();
    let server_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { serve_shutdown.cancelled().await })
            .await
    });

    let exit = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            ExitCode::from(0)
        }
        result = async {
            match worker_handle {
                Some(handle) => handle.await,
                None => std::future::pending().await,
            }
        } => {
            match result {
                Ok(Ok(())) => ExitCode::from(0),
                Ok(Err(e)) => {
                    error!(error = %e, "dialer worker halted");
                    ExitCode::from(2)
                }
                Err(e) => {
                    error!(error = %e, "dialer worker panicked");
                    ExitCode::from(2)
                }
            }
        }
    };

    shutdown.cancel();
    if let Some(tx) = worker_shutdown {
        let _ = tx.send(true);
    }
    let _ = server_task.await;
    info!("voxdial server stopped");
    exit
}

//! TrOCR server - OCR inference over HTTP
//!
//! This binary wires the trocr library into a runnable daemon: it loads
//! configuration, initializes logging, constructs the service with an
//! in-process engine, starts the memory monitor, and serves until
//! interrupted.
//!
//! A device-backed engine links in through the library's `Engine` trait;
//! this binary ships with the in-process mock so the service runs on any
//! host.

use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info};
use trocr::config::{ConfigFile, HttpCompatMode};
use trocr::engine::MockEngine;
use trocr::logging::{default_log_dir, default_log_file, init_logging};
use trocr::service::OcrService;

#[derive(Parser)]
#[command(name = "trocr-server")]
#[command(about = "Concurrent OCR inference server", long_about = None)]
#[command(version = trocr::VERSION)]
struct Args {
    /// Path to an INI configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind host (overrides the config file)
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides the config file)
    #[arg(long)]
    port: Option<u16>,

    /// Number of inference workers (overrides the config file)
    #[arg(long)]
    workers: Option<usize>,

    /// Answer errors with real HTTP status codes instead of the
    /// legacy always-200 behavior
    #[arg(long)]
    strict_errors: bool,

    /// Directory for log files
    #[arg(long)]
    log_dir: Option<String>,
}

fn load_config(args: &Args) -> Result<ConfigFile, String> {
    let mut config = match &args.config {
        Some(path) => ConfigFile::load_from(path).map_err(|e| e.to_string())?,
        None => ConfigFile::default(),
    };

    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(workers) = args.workers {
        if workers == 0 {
            return Err("--workers must be greater than zero".to_string());
        }
        config.pool.workers = workers;
    }
    if args.strict_errors {
        config.server.compat_mode = HttpCompatMode::Strict;
    }

    Ok(config)
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            process::exit(1);
        }
    };

    let log_dir = args.log_dir.as_deref().unwrap_or(default_log_dir());
    let _logging_guard = match init_logging(log_dir, default_log_file()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error initializing logging: {}", e);
            process::exit(1);
        }
    };

    info!(version = trocr::VERSION, "Starting trocr-server");

    let service = match OcrService::new(config, Arc::new(MockEngine::new())) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to initialize service");
            eprintln!("Error initializing service: {}", e);
            process::exit(1);
        }
    };
    service.start_monitor();

    tokio::select! {
        result = service.serve() => {
            if let Err(e) = result {
                error!(error = %e, "Server exited with error");
                service.shutdown().await;
                process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received");
        }
    }

    service.shutdown().await;
    info!("Server stopped");
}

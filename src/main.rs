//! WolfShip - Rotating Local Log Buffer with Background Upload
//!
//! Reads newline-delimited records from stdin, buffers them in rotating
//! local files and uploads every retired buffer.

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wolfship::config::{default_config_template, WolfShipConfig};
use wolfship::error::{Error, Result};
use wolfship::event::Event;
use wolfship::path::{SystemSource, TemplateSource};
use wolfship::shipper::Shipper;
use wolfship::upload::LocalDirUploader;

/// WolfShip - Rotating Local Log Buffer with Background Upload
#[derive(Parser)]
#[command(name = "wolfship")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "wolfship.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ship records read from stdin
    Run,

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "wolfship.toml")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            let config = load_config(&cli.config)?;
            let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
            init_logging(level, &config.logging.format);
            run_ship(config)
        }
        Commands::Init { output } => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"), "pretty");
            run_init(output)
        }
        Commands::Validate => run_validate(cli.config),
    }
}

/// Initialize logging
///
/// Logs go to stderr so stdout stays free for piping.
fn init_logging(level: &str, format: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());
    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);

    if format == "compact" {
        registry.with(layer.compact()).init();
    } else {
        registry.with(layer.pretty()).init();
    }
}

fn load_config(config_path: &Path) -> Result<WolfShipConfig> {
    WolfShipConfig::from_file(config_path).map_err(|e| {
        eprintln!("Failed to load configuration from {:?}: {}", config_path, e);
        e
    })
}

/// Ship stdin until end of input or Ctrl+C
fn run_ship(config: WolfShipConfig) -> Result<()> {
    tracing::info!("Starting WolfShip...");

    let uploader = LocalDirUploader::new(&config.upload.destination);
    let shipper = Arc::new(Shipper::start(&config, uploader)?);
    let host = SystemSource::new().hostname();

    let (done_tx, done_rx) = mpsc::channel::<&'static str>();

    // Set up Ctrl+C handler
    let interrupted = done_tx.clone();
    ctrlc::set_handler(move || {
        let _ = interrupted.send("interrupted");
    })
    .map_err(io::Error::other)?;

    let reader = Arc::clone(&shipper);
    thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::error!("Failed to read stdin: {}", e);
                        break;
                    }
                };
                match reader.receive(&Event::new(host.as_str(), line)) {
                    Ok(()) => {}
                    Err(Error::ShuttingDown) => break,
                    Err(e) => tracing::error!("Failed to buffer record: {}", e),
                }
            }
            let _ = done_tx.send("end of input");
        })?;

    let reason = done_rx.recv().unwrap_or("input closed");
    tracing::info!("Shutting down ({})", reason);

    shipper.close()?;
    let stats = shipper.stats();
    tracing::info!(
        "WolfShip stopped: {} uploads queued, {} run inline, {} completed",
        stats.dispatched(),
        stats.ran_inline(),
        stats.completed()
    );
    Ok(())
}

/// Write a default configuration file
fn run_init(output: PathBuf) -> Result<()> {
    if output.exists() {
        return Err(Error::Config(format!(
            "{} already exists, refusing to overwrite",
            output.display()
        )));
    }

    std::fs::write(&output, default_config_template("/var/lib/wolfship/bucket"))?;
    tracing::info!("Configuration written to {:?}", output);
    Ok(())
}

/// Validate configuration file
fn run_validate(config_path: PathBuf) -> Result<()> {
    match WolfShipConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            if config.buffer.directory.as_os_str().is_empty() {
                println!("  Buffer Directory: (temporary)");
            } else {
                println!("  Buffer Directory: {}", config.buffer.directory.display());
            }
            println!("  Date Pattern: {}", config.buffer.date_pattern);
            println!("  Max File Size: {} KB", config.buffer.max_file_size_kbytes);
            println!("  Gzip: {} (encoding: {})", config.buffer.gzip, config.content_encoding());
            println!("  Destination: {}", config.upload.destination.display());
            println!("  Upload Workers: {}", config.upload_workers());
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

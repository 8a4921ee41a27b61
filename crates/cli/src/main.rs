//! Telemetry sentinel CLI
//!
//! A command-line tool for sending samples, inspecting per-device windows
//! and anomalies, and generating synthetic load against the sentinel service.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{devices, load, service};
use std::time::Duration;

/// Telemetry sentinel CLI
#[derive(Parser)]
#[command(name = "sentinelctl")]
#[command(author, version, about = "CLI for the telemetry sentinel", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via SENTINEL_API_URL env var)
    #[arg(long, env = "SENTINEL_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send a single sample
    Send {
        /// Device identifier
        #[arg(long, short)]
        device: String,

        /// Requests per second observed on the device
        #[arg(long)]
        rps: i64,

        /// CPU utilization percentage
        #[arg(long, default_value_t = 0.0)]
        cpu: f64,

        /// Unix timestamp in seconds (defaults to now)
        #[arg(long)]
        timestamp: Option<i64>,
    },

    /// Show tracked devices and queue depth
    Stats,

    /// Show service health
    Health,

    /// Show recent samples for a device
    History {
        /// Device identifier
        device: String,

        /// Maximum number of records
        #[arg(long, short, default_value_t = 20)]
        limit: usize,
    },

    /// Show recent anomalies for a device
    Anomalies {
        /// Device identifier
        device: String,

        /// Maximum number of records
        #[arg(long, short, default_value_t = 20)]
        limit: usize,
    },

    /// Show rolling window statistics for a device
    Window {
        /// Device identifier
        device: String,
    },

    /// Generate synthetic load
    Load {
        /// Number of distinct devices
        #[arg(long, default_value_t = 200)]
        devices: u32,

        /// Concurrent senders
        #[arg(long, short, default_value_t = 8)]
        workers: usize,

        /// Run time in seconds
        #[arg(long, default_value_t = 30)]
        duration: u64,

        /// Minimum pause between requests, in milliseconds
        #[arg(long, default_value_t = 1)]
        min_wait_ms: u64,

        /// Maximum pause between requests, in milliseconds
        #[arg(long, default_value_t = 5)]
        max_wait_ms: u64,

        /// Seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize client
    let client = client::ApiClient::with_timeout(&cli.api_url, Duration::from_secs(cli.timeout))?;

    // Execute command
    match cli.command {
        Commands::Send {
            device,
            rps,
            cpu,
            timestamp,
        } => {
            let sample = client::SampleRecord {
                device,
                timestamp: timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp()),
                cpu,
                rps,
            };
            service::send_sample(&client, sample, cli.format).await?;
        }
        Commands::Stats => {
            service::show_stats(&client, cli.format).await?;
        }
        Commands::Health => {
            service::show_health(&client, cli.format).await?;
        }
        Commands::History { device, limit } => {
            devices::show_history(&client, &device, limit, cli.format).await?;
        }
        Commands::Anomalies { device, limit } => {
            devices::show_anomalies(&client, &device, limit, cli.format).await?;
        }
        Commands::Window { device } => {
            devices::show_window(&client, &device, cli.format).await?;
        }
        Commands::Load {
            devices,
            workers,
            duration,
            min_wait_ms,
            max_wait_ms,
            seed,
        } => {
            let config = load::LoadConfig {
                devices,
                workers,
                duration: Duration::from_secs(duration),
                min_wait: Duration::from_millis(min_wait_ms),
                max_wait: Duration::from_millis(max_wait_ms),
                seed,
            };
            load::run_load(&client, config, cli.format).await?;
        }
    }

    Ok(())
}

//! Per-device inspection commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_z, format_timestamp, print_info, print_json, print_table, print_warning, OutputFormat,
};

/// Row for sample history table
#[derive(Tabled)]
struct SampleRow {
    #[tabled(rename = "Timestamp")]
    timestamp: String,
    #[tabled(rename = "RPS")]
    rps: i64,
    #[tabled(rename = "CPU %")]
    cpu: String,
}

/// Row for anomaly table
#[derive(Tabled)]
struct AnomalyRow {
    #[tabled(rename = "Timestamp")]
    timestamp: String,
    #[tabled(rename = "RPS")]
    rps: i64,
    #[tabled(rename = "Z-Score")]
    z: String,
}

/// Show the most recent samples of a device
pub async fn show_history(
    client: &ApiClient,
    device: &str,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let samples = client.history(device, limit).await?;

    if let OutputFormat::Table = format {
        println!("{} {}", "Recent samples for".bold(), device.cyan());
    }

    let rows: Vec<SampleRow> = samples
        .iter()
        .map(|s| SampleRow {
            timestamp: format_timestamp(s.timestamp),
            rps: s.rps,
            cpu: format!("{:.2}", s.cpu),
        })
        .collect();
    print_table(rows, &samples, format);

    Ok(())
}

/// Show the most recent anomalies of a device
pub async fn show_anomalies(
    client: &ApiClient,
    device: &str,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let anomalies = client.anomalies(device, limit).await?;

    match format {
        OutputFormat::Json => print_json(&anomalies),
        OutputFormat::Table => {
            println!("{} {}", "Anomalies for".bold(), device.cyan());
            if anomalies.is_empty() {
                print_info("No anomalies recorded");
                return Ok(());
            }

            let rows: Vec<AnomalyRow> = anomalies
                .iter()
                .map(|a| AnomalyRow {
                    timestamp: format_timestamp(a.ts),
                    rps: a.rps,
                    z: color_z(a.z),
                })
                .collect();
            print_table(rows, &anomalies, format);
            println!("\nTotal: {} anomalies", anomalies.len());
        }
    }

    Ok(())
}

/// Show the rolling window statistics of a device
pub async fn show_window(client: &ApiClient, device: &str, format: OutputFormat) -> Result<()> {
    let window = client.window(device).await?;

    match format {
        OutputFormat::Json => print_json(&window),
        OutputFormat::Table => {
            println!("{}", "Rolling Window".bold());
            println!("{}", "=".repeat(40));
            println!("Device:   {}", device.cyan());
            println!("Mean:     {:.3}", window.mean);
            println!("Std dev:  {:.3}", window.std_dev);
            println!("Samples:  {}/{}", window.count, window.capacity);

            if window.count < window.capacity {
                print_warning("Window not yet full; anomalies are not flagged until it is");
            }
        }
    }

    Ok(())
}

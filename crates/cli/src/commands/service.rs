//! Service-level commands: send a sample, stats, health

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, SampleRecord};
use crate::output::{color_status, format_timestamp, print_json, print_success, OutputFormat};

/// Row for health table
#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Last Check")]
    last_check: String,
}

/// Send one sample to the ingest endpoint
pub async fn send_sample(client: &ApiClient, sample: SampleRecord, format: OutputFormat) -> Result<()> {
    client.ingest(&sample).await?;

    match format {
        OutputFormat::Json => print_json(&sample),
        OutputFormat::Table => print_success(&format!(
            "Sent sample for {} (rps={}, cpu={:.2})",
            sample.device.cyan(),
            sample.rps,
            sample.cpu
        )),
    }

    Ok(())
}

/// Show tracked devices and queue depth
pub async fn show_stats(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let stats = client.stats().await?;

    match format {
        OutputFormat::Json => print_json(&stats),
        OutputFormat::Table => {
            println!("{}", "Service Stats".bold());
            println!("{}", "=".repeat(40));
            for (key, value) in &stats {
                println!("{:<20} {}", key, value.cyan());
            }
        }
    }

    Ok(())
}

/// Show aggregate and per-component health
///
/// Exits with an error when the service reports itself unhealthy.
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let report = client.health().await?;

    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Table => {
            println!("{} {}", "Service health:".bold(), color_status(&report.status));
            println!();

            let mut rows: Vec<ComponentRow> = report
                .components
                .iter()
                .map(|(name, c)| ComponentRow {
                    name: name.clone(),
                    status: color_status(&c.status),
                    message: c.message.clone().unwrap_or_default(),
                    last_check: format_timestamp(c.last_check_timestamp),
                })
                .collect();
            rows.sort_by(|a, b| a.name.cmp(&b.name));

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    if report.status == "unhealthy" {
        anyhow::bail!("service is unhealthy");
    }
    Ok(())
}

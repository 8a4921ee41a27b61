//! Synthetic load generator
//!
//! Spawns a set of workers that post random samples for a fixed duration,
//! pausing briefly between requests, then reports how many went through.

use anyhow::Result;
use colored::Colorize;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::client::{ApiClient, SampleRecord};
use crate::output::{print_info, print_json, print_success, print_warning, OutputFormat};

/// Load run parameters
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Devices are named `device-1` through `device-<devices>`
    pub devices: u32,
    pub workers: usize,
    pub duration: Duration,
    pub min_wait: Duration,
    pub max_wait: Duration,
    /// Seed for reproducible runs; each worker offsets it by its index
    pub seed: Option<u64>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            devices: 200,
            workers: 8,
            duration: Duration::from_secs(30),
            min_wait: Duration::from_millis(1),
            max_wait: Duration::from_millis(5),
            seed: None,
        }
    }
}

/// Outcome of a load run
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub sent: u64,
    pub failed: u64,
    pub elapsed_secs: f64,
    pub rate_per_sec: f64,
}

/// Build one random sample
pub fn random_sample<R: Rng>(rng: &mut R, devices: u32) -> SampleRecord {
    let device = rng.gen_range(1..=devices.max(1));
    let cpu = (rng.gen_range(0.0..100.0_f64) * 100.0).round() / 100.0;

    SampleRecord {
        device: format!("device-{}", device),
        timestamp: chrono::Utc::now().timestamp(),
        cpu,
        rps: rng.gen_range(50..=150),
    }
}

fn think_time<R: Rng>(rng: &mut R, min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    rng.gen_range(min..=max)
}

async fn worker(
    client: ApiClient,
    config: Arc<LoadConfig>,
    index: usize,
    deadline: Instant,
    sent: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
) {
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(index as u64)),
        None => StdRng::from_entropy(),
    };

    while Instant::now() < deadline {
        let sample = random_sample(&mut rng, config.devices);
        match client.ingest(&sample).await {
            Ok(()) => sent.fetch_add(1, Ordering::Relaxed),
            Err(_) => failed.fetch_add(1, Ordering::Relaxed),
        };

        let pause = think_time(&mut rng, config.min_wait, config.max_wait);
        tokio::time::sleep(pause).await;
    }
}

/// Run the generator until the configured duration elapses
pub async fn generate(client: &ApiClient, config: LoadConfig) -> LoadReport {
    let config = Arc::new(config);
    let sent = Arc::new(AtomicU64::new(0));
    let failed = Arc::new(AtomicU64::new(0));
    let started = Instant::now();
    let deadline = started + config.duration;

    let tasks: Vec<_> = (0..config.workers.max(1))
        .map(|index| {
            tokio::spawn(worker(
                client.clone(),
                config.clone(),
                index,
                deadline,
                sent.clone(),
                failed.clone(),
            ))
        })
        .collect();

    for task in tasks {
        let _ = task.await;
    }

    let elapsed_secs = started.elapsed().as_secs_f64();
    let sent = sent.load(Ordering::Relaxed);
    LoadReport {
        sent,
        failed: failed.load(Ordering::Relaxed),
        elapsed_secs,
        rate_per_sec: if elapsed_secs > 0.0 {
            sent as f64 / elapsed_secs
        } else {
            0.0
        },
    }
}

/// Run the generator and print a summary
pub async fn run_load(client: &ApiClient, config: LoadConfig, format: OutputFormat) -> Result<()> {
    if let OutputFormat::Table = format {
        print_info(&format!(
            "Sending samples for {} devices with {} workers for {}s",
            config.devices,
            config.workers,
            config.duration.as_secs()
        ));
    }

    let report = generate(client, config).await;

    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Table => {
            println!();
            println!("{}", "Load Summary".bold());
            println!("{}", "=".repeat(40));
            println!("Sent:     {}", report.sent.to_string().green());
            println!("Failed:   {}", report.failed.to_string().red());
            println!("Elapsed:  {:.1}s", report.elapsed_secs);
            println!("Rate:     {:.0} samples/s", report.rate_per_sec);

            if report.failed > 0 {
                print_warning("Some requests failed; check that the service is reachable");
            } else {
                print_success("Load run complete");
            }
        }
    }

    if report.sent == 0 && report.failed > 0 {
        anyhow::bail!("no samples were accepted");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_sample_ranges() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let sample = random_sample(&mut rng, 200);
            let n: u32 = sample.device["device-".len()..].parse().unwrap();
            assert!((1..=200).contains(&n));
            assert!((50..=150).contains(&sample.rps));
            assert!((0.0..100.0).contains(&sample.cpu));
            assert_eq!((sample.cpu * 100.0).round() / 100.0, sample.cpu);
        }
    }

    #[test]
    fn test_seeded_samples_repeat() {
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        let first = random_sample(&mut a, 10);
        let second = random_sample(&mut b, 10);
        assert_eq!(first.device, second.device);
        assert_eq!(first.rps, second.rps);
    }

    #[test]
    fn test_think_time_bounds() {
        let mut rng = StdRng::seed_from_u64(1);
        let min = Duration::from_millis(1);
        let max = Duration::from_millis(5);
        for _ in 0..100 {
            let pause = think_time(&mut rng, min, max);
            assert!(pause >= min && pause <= max);
        }
        assert_eq!(think_time(&mut rng, max, min), max);
    }

    #[tokio::test]
    async fn test_generate_counts_sent_samples() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/ingest")
            .with_status(200)
            .with_body("ok\n")
            .expect_at_least(1)
            .create_async()
            .await;

        let client = ApiClient::with_timeout(&server.url(), Duration::from_secs(5)).unwrap();
        let report = generate(
            &client,
            LoadConfig {
                devices: 3,
                workers: 2,
                duration: Duration::from_millis(100),
                seed: Some(9),
                ..LoadConfig::default()
            },
        )
        .await;

        assert!(report.sent > 0);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn test_generate_counts_failures() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/ingest")
            .with_status(500)
            .expect_at_least(1)
            .create_async()
            .await;

        let client = ApiClient::with_timeout(&server.url(), Duration::from_secs(5)).unwrap();
        let report = generate(
            &client,
            LoadConfig {
                devices: 1,
                workers: 1,
                duration: Duration::from_millis(50),
                ..LoadConfig::default()
            },
        )
        .await;

        assert_eq!(report.sent, 0);
        assert!(report.failed > 0);
    }
}

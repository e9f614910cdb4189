// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The three measurement stages run against a single server: HTTP ping, download and
//! upload. Throughput stages run a fixed number of workers until a shared deadline and
//! report the bytes moved per second of wall-clock time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use crate::error::Error;

/// Result of a full ping/download/upload run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestResult {
    pub latency: Duration,
    pub jitter: Duration,
    /// Bytes per second
    pub download_bps: f64,
    /// Bytes per second
    pub upload_bps: f64,
}

/// Worker count and duration of a throughput stage
#[derive(Debug, Clone)]
pub struct StageConfig {
    pub concurrency: usize,
    pub duration: Duration,
}

/// Returns `(latency, jitter)`: the mean round trip and its population standard deviation.
pub(crate) async fn ping(
    http: &reqwest::Client,
    base_url: &str,
    count: usize,
) -> Result<(Duration, Duration), Error> {
    let url = format!("{base_url}/latency.txt");
    let mut samples = Vec::with_capacity(count);
    for _ in 0..count {
        let start = Instant::now();
        http.get(&url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        samples.push(start.elapsed());
    }
    latency_stats(&samples).ok_or(Error::NoSamples("ping"))
}

pub(crate) fn latency_stats(samples: &[Duration]) -> Option<(Duration, Duration)> {
    if samples.is_empty() {
        return None;
    }
    let n = samples.len() as f64;
    let nanos: Vec<f64> = samples.iter().map(|s| s.as_nanos() as f64).collect();
    let mean = nanos.iter().sum::<f64>() / n;
    let variance = nanos.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    Some((
        Duration::from_nanos(mean.round() as u64),
        Duration::from_nanos(variance.sqrt().round() as u64),
    ))
}

pub(crate) async fn download(
    http: &reqwest::Client,
    base_url: &str,
    size: u32,
    stage: &StageConfig,
) -> Result<f64, Error> {
    let url = format!("{base_url}/random{size}x{size}.jpg");
    run_stage("download", stage, move |bytes| {
        download_worker(http.clone(), url.clone(), bytes)
    })
    .await
}

async fn download_worker(
    http: reqwest::Client,
    url: String,
    bytes: Arc<AtomicU64>,
) -> Result<(), Error> {
    loop {
        let mut response = http.get(&url).send().await?.error_for_status()?;
        while let Some(chunk) = response.chunk().await? {
            bytes.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        }
    }
}

pub(crate) async fn upload(
    http: &reqwest::Client,
    url: &str,
    payload_bytes: usize,
    stage: &StageConfig,
) -> Result<f64, Error> {
    let payload = upload_payload(payload_bytes);
    let url = url.to_string();
    run_stage("upload", stage, move |bytes| {
        upload_worker(http.clone(), url.clone(), payload.clone(), bytes)
    })
    .await
}

async fn upload_worker(
    http: reqwest::Client,
    url: String,
    payload: Vec<u8>,
    bytes: Arc<AtomicU64>,
) -> Result<(), Error> {
    let len = payload.len() as u64;
    loop {
        http.post(&url)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(payload.clone())
            .send()
            .await?
            .error_for_status()?;
        bytes.fetch_add(len, Ordering::Relaxed);
    }
}

fn upload_payload(size: usize) -> Vec<u8> {
    const PREFIX: &[u8] = b"content1=";
    const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut payload = Vec::with_capacity(size.max(PREFIX.len()));
    payload.extend_from_slice(PREFIX);
    payload.extend(ALPHABET.iter().cycle().take(size.saturating_sub(PREFIX.len())));
    payload
}

/// Spawns `stage.concurrency` workers, stops them all at the deadline, and converts the
/// bytes they moved into a rate. A worker error only fails the stage if nothing at all
/// was transferred.
async fn run_stage<F, Fut>(
    name: &'static str,
    stage: &StageConfig,
    make_worker: F,
) -> Result<f64, Error>
where
    F: Fn(Arc<AtomicU64>) -> Fut,
    Fut: std::future::Future<Output = Result<(), Error>> + Send + 'static,
{
    let bytes = Arc::new(AtomicU64::new(0));
    let start = Instant::now();
    let deadline = start + stage.duration;

    let mut workers = JoinSet::new();
    for _ in 0..stage.concurrency.max(1) {
        workers.spawn(timeout_at(deadline, make_worker(Arc::clone(&bytes))));
    }

    let mut worker_error = None;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(Err(e))) => {
                debug!("{name} worker stopped early: {e}");
                worker_error = Some(e);
            }
            // deadline reached
            Ok(_) => {}
            Err(e) => debug!("{name} worker did not finish: {e}"),
        }
    }

    let elapsed = start.elapsed().as_secs_f64();
    let total = bytes.load(Ordering::Relaxed);
    debug!("{name} moved {total} bytes in {elapsed:.3}s");
    if total == 0 || elapsed <= 0.0 {
        return Err(worker_error.unwrap_or(Error::NoSamples(name)));
    }
    Ok(total as f64 / elapsed)
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock speedtest providers

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use speedtest_exporter::endpoint::{Endpoint, GeoPoint, Measurement, RequesterInfo};
use speedtest_exporter::error::{FetchError, MeasurementError};
use speedtest_exporter::provider::SpeedtestProvider;

pub const LATENCY: Duration = Duration::from_millis(23);
pub const JITTER: Duration = Duration::from_millis(4);
pub const DOWNLOAD_BPS: f64 = 11_875_000.0;
pub const UPLOAD_BPS: f64 = 2_340_000.0;

/// Mock provider that always measures the same values against a fixed directory
pub struct MockProvider {
    pub cycles: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            cycles: AtomicUsize::new(0),
        }
    }

    pub fn cycles(&self) -> usize {
        self.cycles.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SpeedtestProvider for MockProvider {
    async fn fetch_requester_info(&self) -> Result<RequesterInfo, FetchError> {
        Ok(RequesterInfo {
            location: GeoPoint {
                lat: 48.8582,
                lon: 2.3387,
            },
            ip: "192.0.2.10".to_string(),
            isp: "Mock Telecom".to_string(),
        })
    }

    async fn fetch_endpoint_directory(&self) -> Result<Vec<Endpoint>, FetchError> {
        Ok(vec![
            endpoint("24215", "Paris", 48.8567, 2.3508, 1.234_5),
            endpoint("5559", "Lyon", 45.75, 4.85, 391.0),
        ])
    }

    async fn measure(&self, _endpoint: &Endpoint) -> Result<Measurement, MeasurementError> {
        self.cycles.fetch_add(1, Ordering::SeqCst);
        Ok(Measurement {
            latency: LATENCY,
            jitter: JITTER,
            download_bps: DOWNLOAD_BPS,
            upload_bps: UPLOAD_BPS,
        })
    }
}

/// Mock provider whose directory lookup always fails
#[allow(dead_code)]
pub struct UnreachableDirectoryProvider;

#[async_trait::async_trait]
impl SpeedtestProvider for UnreachableDirectoryProvider {
    async fn fetch_requester_info(&self) -> Result<RequesterInfo, FetchError> {
        Ok(RequesterInfo {
            location: GeoPoint { lat: 0.0, lon: 0.0 },
            ip: "192.0.2.11".to_string(),
            isp: "Mock Telecom".to_string(),
        })
    }

    async fn fetch_endpoint_directory(&self) -> Result<Vec<Endpoint>, FetchError> {
        Err(FetchError::EndpointDirectory(
            "connection reset by peer".to_string(),
        ))
    }

    async fn measure(&self, _endpoint: &Endpoint) -> Result<Measurement, MeasurementError> {
        Err(MeasurementError("unreachable".to_string()))
    }
}

fn endpoint(id: &str, name: &str, lat: f64, lon: f64, distance_km: f64) -> Endpoint {
    Endpoint {
        id: id.to_string(),
        name: name.to_string(),
        country: "France".to_string(),
        sponsor: "Mock Hosting".to_string(),
        location: GeoPoint { lat, lon },
        distance_km,
        host: format!("{}.speedtest.example.net:8080", name.to_lowercase()),
        url: format!("http://{}.speedtest.example.net:8080/speedtest/upload.php", name.to_lowercase()),
    }
}

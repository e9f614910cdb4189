// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::error::RefreshError;
use crate::provider::SpeedtestProvider;
use crate::selector::{self, ServerPreference};
use crate::snapshot::{MeasurementReport, Snapshot, SnapshotCache};

/// Runs one measurement cycle and publishes its outcome to the cache.
pub struct Refresher {
    provider: Arc<dyn SpeedtestProvider + Send + Sync>,
    preference: ServerPreference,
    allow_fallback: bool,
    cache: Arc<SnapshotCache>,
}

impl Refresher {
    pub fn new(
        provider: Arc<dyn SpeedtestProvider + Send + Sync>,
        preference: ServerPreference,
        allow_fallback: bool,
        cache: Arc<SnapshotCache>,
    ) -> Self {
        Self {
            provider,
            preference,
            allow_fallback,
            cache,
        }
    }

    /// Executes a full cycle.
    ///
    /// Every cycle that is not cancelled commits exactly one snapshot: a success snapshot,
    /// or a failure snapshot followed by the error that ended the cycle. A cancelled cycle
    /// drops its in-flight requests and leaves the cache untouched.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<(), RefreshError> {
        let id = Uuid::new_v4();
        let start = Instant::now();
        debug!("Starting speedtest {id}");

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("Speedtest {id} cancelled");
                return Err(RefreshError::Cancelled);
            }
            result = self.measure_cycle() => result,
        };

        let duration = start.elapsed();
        match result {
            Ok(report) => {
                debug!("Speedtest {id} finished in {duration:?}");
                self.cache.replace(Snapshot::success(id, duration, report));
                Ok(())
            }
            Err(e) => {
                self.cache.replace(Snapshot::failure(id, duration));
                Err(e)
            }
        }
    }

    async fn measure_cycle(&self) -> Result<MeasurementReport, RefreshError> {
        let requester = self.provider.fetch_requester_info().await?;
        debug!(
            "Requester info: ip {}, isp {}, lat {}, lon {}",
            requester.ip, requester.isp, requester.location.lat, requester.location.lon
        );

        let candidates = self.provider.fetch_endpoint_directory().await?;
        debug!("Fetched {} candidate servers", candidates.len());

        let endpoint = selector::select(&candidates, &self.preference, self.allow_fallback)?;
        debug!(
            "Selected server {} ({}, {}) at {:.2} km",
            endpoint.id, endpoint.name, endpoint.country, endpoint.distance_km
        );

        let measurement = self.provider.measure(&endpoint).await?;
        Ok(MeasurementReport {
            measurement,
            requester,
            endpoint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{Endpoint, GeoPoint, Measurement, RequesterInfo};
    use crate::error::{FetchError, MeasurementError, SelectionError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Clone, Copy, PartialEq)]
    enum FailAt {
        Nowhere,
        Requester,
        Directory,
        Measure,
    }

    struct StubProvider {
        fail_at: FailAt,
        endpoints: Vec<Endpoint>,
        delay: Duration,
        measured: AtomicUsize,
    }

    impl StubProvider {
        fn new(fail_at: FailAt) -> Self {
            Self {
                fail_at,
                endpoints: vec![endpoint("5"), endpoint("9")],
                delay: Duration::ZERO,
                measured: AtomicUsize::new(0),
            }
        }
    }

    fn endpoint(id: &str) -> Endpoint {
        Endpoint {
            id: id.to_string(),
            name: format!("server-{id}"),
            country: "Netherlands".to_string(),
            sponsor: "Test".to_string(),
            location: GeoPoint {
                lat: 52.0,
                lon: 4.0,
            },
            distance_km: 12.345_678,
            host: format!("{id}.example.net"),
            url: format!("http://{id}.example.net/speedtest/upload.php"),
        }
    }

    #[async_trait]
    impl SpeedtestProvider for StubProvider {
        async fn fetch_requester_info(&self) -> Result<RequesterInfo, FetchError> {
            tokio::time::sleep(self.delay).await;
            if self.fail_at == FailAt::Requester {
                return Err(FetchError::RequesterInfo("connection refused".to_string()));
            }
            Ok(RequesterInfo {
                location: GeoPoint {
                    lat: 52.1,
                    lon: 4.1,
                },
                ip: "203.0.113.7".to_string(),
                isp: "Example ISP".to_string(),
            })
        }

        async fn fetch_endpoint_directory(&self) -> Result<Vec<Endpoint>, FetchError> {
            if self.fail_at == FailAt::Directory {
                return Err(FetchError::EndpointDirectory("bad json".to_string()));
            }
            Ok(self.endpoints.clone())
        }

        async fn measure(&self, _endpoint: &Endpoint) -> Result<Measurement, MeasurementError> {
            self.measured.fetch_add(1, Ordering::SeqCst);
            if self.fail_at == FailAt::Measure {
                return Err(MeasurementError("upload stalled".to_string()));
            }
            Ok(Measurement {
                latency: Duration::from_millis(20),
                jitter: Duration::from_millis(3),
                download_bps: 1_000_000.0,
                upload_bps: 500_000.0,
            })
        }
    }

    fn refresher(provider: StubProvider, preference: ServerPreference) -> Refresher {
        Refresher::new(
            Arc::new(provider),
            preference,
            false,
            Arc::new(SnapshotCache::new()),
        )
    }

    #[tokio::test]
    async fn test_success_commits_report() {
        let refresher = refresher(
            StubProvider::new(FailAt::Nowhere),
            ServerPreference::Id("9".to_string()),
        );
        refresher.run(&CancellationToken::new()).await.unwrap();

        let cache = &refresher.cache;
        assert!(cache.is_ready());
        let snapshot = cache.read().unwrap();
        let report = snapshot.report().unwrap();
        assert_eq!(report.endpoint.id, "9");
        assert_eq!(report.requester.ip, "203.0.113.7");
        assert_eq!(report.measurement.latency, Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_each_failure_commits_one_failure_snapshot() {
        for fail_at in [FailAt::Requester, FailAt::Directory, FailAt::Measure] {
            let refresher = refresher(StubProvider::new(fail_at), ServerPreference::Closest);
            let error = refresher.run(&CancellationToken::new()).await.unwrap_err();
            match fail_at {
                FailAt::Requester | FailAt::Directory => {
                    assert!(matches!(error, RefreshError::Fetch(_)))
                }
                FailAt::Measure => assert!(matches!(error, RefreshError::Measurement(_))),
                FailAt::Nowhere => unreachable!(),
            }
            let snapshot = refresher.cache.read().unwrap();
            assert!(snapshot.report().is_none());
            assert!(refresher.cache.is_ready());
        }
    }

    #[tokio::test]
    async fn test_selection_failure_skips_measurement() {
        let provider = Arc::new(StubProvider::new(FailAt::Nowhere));
        let refresher = Refresher::new(
            provider.clone(),
            ServerPreference::Id("404".to_string()),
            false,
            Arc::new(SnapshotCache::new()),
        );
        let error = refresher.run(&CancellationToken::new()).await.unwrap_err();

        assert!(matches!(
            error,
            RefreshError::Selection(SelectionError::ServerNotFound(ref id)) if id == "404"
        ));
        assert_eq!(provider.measured.load(Ordering::SeqCst), 0);
        assert!(refresher.cache.read().unwrap().report().is_none());
    }

    #[tokio::test]
    async fn test_every_cycle_gets_a_fresh_id() {
        let refresher = refresher(StubProvider::new(FailAt::Measure), ServerPreference::Closest);
        let cancel = CancellationToken::new();
        let _ = refresher.run(&cancel).await;
        let first = refresher.cache.read().unwrap().id();
        let _ = refresher.run(&cancel).await;
        let second = refresher.cache.read().unwrap().id();
        assert_ne!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_duration_covers_elapsed_time() {
        let mut provider = StubProvider::new(FailAt::Measure);
        provider.delay = Duration::from_secs(2);
        let refresher = refresher(provider, ServerPreference::Closest);
        let _ = refresher.run(&CancellationToken::new()).await;

        let snapshot = refresher.cache.read().unwrap();
        assert!(snapshot.duration() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_keeps_previous_snapshot() {
        let mut provider = StubProvider::new(FailAt::Nowhere);
        provider.delay = Duration::from_secs(60);
        let refresher = Arc::new(refresher(provider, ServerPreference::Closest));
        let previous = Uuid::new_v4();
        refresher
            .cache
            .replace(Snapshot::failure(previous, Duration::ZERO));

        let cancel = CancellationToken::new();
        let handle = {
            let refresher = Arc::clone(&refresher);
            let cancel = cancel.clone();
            tokio::spawn(async move { refresher.run(&cancel).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(RefreshError::Cancelled)));
        assert_eq!(refresher.cache.read().unwrap().id(), previous);
    }

    #[tokio::test]
    async fn test_already_cancelled_commits_nothing() {
        let refresher = refresher(StubProvider::new(FailAt::Nowhere), ServerPreference::Closest);
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(matches!(
            refresher.run(&cancel).await,
            Err(RefreshError::Cancelled)
        ));
        assert!(!refresher.cache.is_ready());
    }
}

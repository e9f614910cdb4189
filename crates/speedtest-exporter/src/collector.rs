// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Prometheus view of the snapshot cache.

use std::collections::HashMap;
use std::sync::Arc;

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use tracing::error;

use crate::snapshot::{MeasurementReport, SnapshotCache};

pub const NAMESPACE: &str = "speedtest";

const TEST_LABELS: &[&str] = &["test_uuid"];

const MEASUREMENT_LABELS: &[&str] = &[
    "test_uuid",
    "user_lat",
    "user_lon",
    "user_ip",
    "user_isp",
    "server_lat",
    "server_lon",
    "server_id",
    "server_name",
    "server_country",
    "distance",
];

struct MetricSchema {
    name: &'static str,
    help: &'static str,
    labels: &'static [&'static str],
}

const UP: usize = 0;
const SCRAPE_DURATION: usize = 1;
const LATENCY: usize = 2;
const JITTER: usize = 3;
const UPLOAD: usize = 4;
const DOWNLOAD: usize = 5;

const SCHEMA: [MetricSchema; 6] = [
    MetricSchema {
        name: "up",
        help: "Was the last speedtest successful.",
        labels: TEST_LABELS,
    },
    MetricSchema {
        name: "scrape_duration_seconds",
        help: "Time to perform last speed test",
        labels: TEST_LABELS,
    },
    MetricSchema {
        name: "latency_milliseconds",
        help: "Measured latency on last speed test in milliseconds",
        labels: MEASUREMENT_LABELS,
    },
    MetricSchema {
        name: "jitter_milliseconds",
        help: "Measured jitter on last speed test in milliseconds",
        labels: MEASUREMENT_LABELS,
    },
    MetricSchema {
        name: "upload_speed_bytes_per_second",
        help: "Last upload speedtest result",
        labels: MEASUREMENT_LABELS,
    },
    MetricSchema {
        name: "download_speed_bytes_per_second",
        help: "Last download speedtest result",
        labels: MEASUREMENT_LABELS,
    },
];

/// Exposes the most recent snapshot as gauges.
///
/// Nothing is emitted until the first refresh cycle has completed. After a successful
/// cycle all six metrics are emitted; after a failed one only `speedtest_up` (set to 0).
pub struct SpeedtestCollector {
    cache: Arc<SnapshotCache>,
    descs: Vec<Desc>,
}

impl SpeedtestCollector {
    pub fn new(cache: Arc<SnapshotCache>) -> Result<Self, prometheus::Error> {
        let descs = SCHEMA
            .iter()
            .map(|schema| {
                Desc::new(
                    format!("{NAMESPACE}_{}", schema.name),
                    schema.help.to_string(),
                    schema.labels.iter().map(|l| l.to_string()).collect(),
                    HashMap::new(),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { cache, descs })
    }

    fn gauge(&self, index: usize, label_values: &[&str], value: f64) -> Option<MetricFamily> {
        let schema = &SCHEMA[index];
        let opts = Opts::new(schema.name, schema.help).namespace(NAMESPACE);
        let family = GaugeVec::new(opts, schema.labels).and_then(|vec| {
            vec.get_metric_with_label_values(label_values)?.set(value);
            Ok(vec.collect())
        });
        match family {
            Ok(mut families) => families.pop(),
            Err(e) => {
                error!("Failed to build {NAMESPACE}_{} metric: {e}", schema.name);
                None
            }
        }
    }
}

impl Collector for SpeedtestCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.descs.iter().collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        if !self.cache.is_ready() {
            return Vec::new();
        }
        let Some(snapshot) = self.cache.read() else {
            return Vec::new();
        };

        let test_uuid = snapshot.id().to_string();
        let Some(report) = snapshot.report() else {
            return self.gauge(UP, &[test_uuid.as_str()], 0.0).into_iter().collect();
        };

        let labels = MeasurementLabels::new(&test_uuid, report);
        let labels = labels.as_values();
        let measurement = &report.measurement;
        [
            self.gauge(UP, &[test_uuid.as_str()], 1.0),
            self.gauge(
                SCRAPE_DURATION,
                &[test_uuid.as_str()],
                snapshot.duration().as_secs_f64(),
            ),
            self.gauge(LATENCY, &labels, measurement.latency.as_millis() as f64),
            self.gauge(JITTER, &labels, measurement.jitter.as_millis() as f64),
            self.gauge(UPLOAD, &labels, measurement.upload_bps),
            self.gauge(DOWNLOAD, &labels, measurement.download_bps),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

struct MeasurementLabels<'a> {
    test_uuid: &'a str,
    user_lat: String,
    user_lon: String,
    user_ip: &'a str,
    user_isp: &'a str,
    server_lat: String,
    server_lon: String,
    server_id: &'a str,
    server_name: &'a str,
    server_country: &'a str,
    distance: String,
}

impl<'a> MeasurementLabels<'a> {
    fn new(test_uuid: &'a str, report: &'a MeasurementReport) -> Self {
        Self {
            test_uuid,
            user_lat: report.requester.location.lat.to_string(),
            user_lon: report.requester.location.lon.to_string(),
            user_ip: &report.requester.ip,
            user_isp: &report.requester.isp,
            server_lat: report.endpoint.location.lat.to_string(),
            server_lon: report.endpoint.location.lon.to_string(),
            server_id: &report.endpoint.id,
            server_name: &report.endpoint.name,
            server_country: &report.endpoint.country,
            distance: format!("{:.6}", report.endpoint.distance_km),
        }
    }

    // same order as MEASUREMENT_LABELS
    fn as_values(&self) -> [&str; 11] {
        [
            self.test_uuid,
            &self.user_lat,
            &self.user_lon,
            self.user_ip,
            self.user_isp,
            &self.server_lat,
            &self.server_lon,
            self.server_id,
            self.server_name,
            self.server_country,
            &self.distance,
        ]
    }
}

/// Registry holding only the speedtest collector, so `/metrics` carries nothing else.
pub fn registry(collector: SpeedtestCollector) -> Result<Registry, prometheus::Error> {
    let registry = Registry::new();
    registry.register(Box::new(collector))?;
    Ok(registry)
}

/// Text exposition of everything in `registry`.
pub fn render(registry: &Registry) -> Result<(String, String), prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    let body = String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))?;
    Ok((encoder.format_type().to_string(), body))
}

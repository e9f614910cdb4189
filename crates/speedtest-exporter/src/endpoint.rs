// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// A location in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// The host running the measurement, as seen by the directory
#[derive(Debug, Clone, PartialEq)]
pub struct RequesterInfo {
    pub location: GeoPoint,
    pub ip: String,
    pub isp: String,
}

/// A candidate measurement server.
///
/// Directory listings are ordered closest-first; an endpoint's rank is its position
/// in that listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub id: String,
    pub name: String,
    pub country: String,
    pub sponsor: String,
    pub location: GeoPoint,
    /// Distance from the requester in kilometers
    pub distance_km: f64,
    /// `host[:port]` serving the test resources
    pub host: String,
    pub url: String,
}

/// Raw figures of one measurement run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub latency: Duration,
    pub jitter: Duration,
    pub download_bps: f64,
    pub upload_bps: f64,
}

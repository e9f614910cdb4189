// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use tracing::debug;

use crate::endpoint::{Endpoint, GeoPoint, Measurement, RequesterInfo};
use crate::error::{FetchError, MeasurementError};

/// The external measurement service a refresh cycle talks to.
///
/// Callers cancel an in-flight call by dropping its future.
#[async_trait]
pub trait SpeedtestProvider {
    async fn fetch_requester_info(&self) -> Result<RequesterInfo, FetchError>;

    /// Candidate endpoints, closest first.
    async fn fetch_endpoint_directory(&self) -> Result<Vec<Endpoint>, FetchError>;

    async fn measure(&self, endpoint: &Endpoint) -> Result<Measurement, MeasurementError>;
}

/// Runs measurements against the public speedtest.net infrastructure.
pub struct SpeedtestNetProvider {
    client: speedtest_net::Client,
}

impl SpeedtestNetProvider {
    pub fn new(client: speedtest_net::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SpeedtestProvider for SpeedtestNetProvider {
    async fn fetch_requester_info(&self) -> Result<RequesterInfo, FetchError> {
        let user = self
            .client
            .fetch_user_info()
            .await
            .map_err(|e| FetchError::RequesterInfo(e.to_string()))?;
        Ok(RequesterInfo {
            location: GeoPoint {
                lat: user.lat,
                lon: user.lon,
            },
            ip: user.ip,
            isp: user.isp,
        })
    }

    async fn fetch_endpoint_directory(&self) -> Result<Vec<Endpoint>, FetchError> {
        let servers = self
            .client
            .fetch_servers()
            .await
            .map_err(|e| FetchError::EndpointDirectory(e.to_string()))?;
        Ok(servers.into_iter().map(endpoint_from_server).collect())
    }

    async fn measure(&self, endpoint: &Endpoint) -> Result<Measurement, MeasurementError> {
        let result = self
            .client
            .test_server(&server_from_endpoint(endpoint))
            .await
            .map_err(|e| MeasurementError(e.to_string()))?;
        debug!(
            "Speedtest completed, latency: {:?}, jitter: {:?}, download_bps: {}, upload_bps: {}",
            result.latency, result.jitter, result.download_bps, result.upload_bps
        );
        Ok(Measurement {
            latency: result.latency,
            jitter: result.jitter,
            download_bps: result.download_bps,
            upload_bps: result.upload_bps,
        })
    }
}

fn endpoint_from_server(server: speedtest_net::Server) -> Endpoint {
    Endpoint {
        id: server.id,
        name: server.name,
        country: server.country,
        sponsor: server.sponsor,
        location: GeoPoint {
            lat: server.lat,
            lon: server.lon,
        },
        distance_km: server.distance,
        host: server.host,
        url: server.url,
    }
}

fn server_from_endpoint(endpoint: &Endpoint) -> speedtest_net::Server {
    speedtest_net::Server {
        id: endpoint.id.clone(),
        name: endpoint.name.clone(),
        country: endpoint.country.clone(),
        sponsor: endpoint.sponsor.clone(),
        host: endpoint.host.clone(),
        url: endpoint.url.clone(),
        lat: endpoint.location.lat,
        lon: endpoint.location.lon,
        distance: endpoint.distance_km,
    }
}

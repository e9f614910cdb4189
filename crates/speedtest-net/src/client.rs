// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracing::debug;

use crate::error::Error;
use crate::measure::{self, StageConfig, TestResult};
use crate::server::{self, Server};
use crate::user::{self, User};

pub const DEFAULT_CONFIG_URL: &str = "https://www.speedtest.net/speedtest-config.php";
pub const DEFAULT_SERVERS_URL: &str = "https://www.speedtest.net/api/js/servers";
const USER_AGENT: &str = concat!("speedtest-exporter/", env!("CARGO_PKG_VERSION"));

/// Endpoints and tuning knobs of the client. `Default` targets production speedtest.net.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub config_url: String,
    pub servers_url: String,
    /// Number of servers requested from the directory
    pub server_limit: usize,
    /// Timeout for every individual HTTP request
    pub request_timeout: Duration,
    pub ping_count: usize,
    /// Edge length of the `random<size>x<size>.jpg` download resource
    pub download_size: u32,
    pub download: StageConfig,
    pub upload_payload_bytes: usize,
    pub upload: StageConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            config_url: DEFAULT_CONFIG_URL.to_string(),
            servers_url: DEFAULT_SERVERS_URL.to_string(),
            server_limit: 100,
            request_timeout: Duration::from_secs(30),
            ping_count: 10,
            download_size: 1500,
            download: StageConfig {
                concurrency: 4,
                duration: Duration::from_secs(10),
            },
            upload_payload_bytes: 1024 * 1024,
            upload: StageConfig {
                concurrency: 4,
                duration: Duration::from_secs(10),
            },
        }
    }
}

/// speedtest.net client.
///
/// Remembers the requester location from the last successful [`Client::fetch_user_info`]
/// so that [`Client::fetch_servers`] can order the directory by real distance.
pub struct Client {
    http: reqwest::Client,
    config: ClientConfig,
    location: Mutex<Option<(f64, f64)>>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        Ok(Self {
            http: build_client(config.request_timeout)?,
            config,
            location: Mutex::new(None),
        })
    }

    pub async fn fetch_user_info(&self) -> Result<User, Error> {
        let body = self
            .http
            .get(&self.config.config_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let user = user::parse_config(&body)?;
        *self
            .location
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some((user.lat, user.lon));
        Ok(user)
    }

    /// Fetches the server directory, closest first.
    pub async fn fetch_servers(&self) -> Result<Vec<Server>, Error> {
        let body = self
            .http
            .get(&self.config.servers_url)
            .query(&[
                ("engine", "js".to_string()),
                ("limit", self.config.server_limit.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let origin = *self
            .location
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let servers = server::parse_servers(&body, origin)?;
        debug!("Server list fetched, count: {}", servers.len());
        Ok(servers)
    }

    /// Runs ping, download and upload against `server`, in that order.
    pub async fn test_server(&self, server: &Server) -> Result<TestResult, Error> {
        let base_url = server.base_url();

        debug!("Running ping test against {}", server.host);
        let (latency, jitter) = measure::ping(&self.http, base_url, self.config.ping_count).await?;

        debug!("Running download test against {}", server.host);
        let download_bps = measure::download(
            &self.http,
            base_url,
            self.config.download_size,
            &self.config.download,
        )
        .await?;

        debug!("Running upload test against {}", server.host);
        let upload_bps = measure::upload(
            &self.http,
            &server.url,
            self.config.upload_payload_bytes,
            &self.config.upload,
        )
        .await?;

        Ok(TestResult {
            latency,
            jitter,
            download_bps,
            upload_bps,
        })
    }
}

/// Builds a reqwest client with the exporter user agent and a per-request timeout.
/// Uses rustls TLS by default.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, Error> {
    Ok(reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()?)
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::Url;
use serde::Deserialize;
use tracing::warn;

use crate::error::Error;

/// Equatorial earth radius in kilometers, as used by speedtest.net clients.
const EARTH_RADIUS_KM: f64 = 6378.137;
const UPLOAD_PATH: &str = "/upload.php";

/// A measurement server from the speedtest.net directory
#[derive(Debug, Clone, PartialEq)]
pub struct Server {
    pub id: String,
    pub name: String,
    pub country: String,
    pub sponsor: String,
    pub host: String,
    /// Upload URL, e.g. `http://speedtest.example.net:8080/speedtest/upload.php`
    pub url: String,
    pub lat: f64,
    pub lon: f64,
    /// Distance from the requester in kilometers
    pub distance: f64,
}

impl Server {
    /// The directory all other test resources (`latency.txt`, `random*.jpg`) live in.
    pub fn base_url(&self) -> &str {
        match self.url.find(UPLOAD_PATH) {
            Some(idx) => &self.url[..idx],
            None => self.url.trim_end_matches('/'),
        }
    }
}

/// The directory API is loose about types: ids and coordinates come as strings on some
/// deployments and as numbers on others.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Loose {
    Text(String),
    Number(serde_json::Number),
}

impl Loose {
    fn into_string(self) -> String {
        match self {
            Loose::Text(s) => s,
            Loose::Number(n) => n.to_string(),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Loose::Text(s) => s.trim().parse().ok(),
            Loose::Number(n) => n.as_f64(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ServerRecord {
    id: Loose,
    url: String,
    lat: Loose,
    lon: Loose,
    #[serde(default)]
    name: String,
    #[serde(default)]
    country: String,
    #[serde(default)]
    sponsor: String,
    #[serde(default)]
    host: String,
    #[serde(default)]
    distance: Option<Loose>,
}

impl ServerRecord {
    fn into_server(self, origin: Option<(f64, f64)>) -> Option<Server> {
        let (lat, lon) = (self.lat.as_f64()?, self.lon.as_f64()?);
        let distance = match origin {
            Some((user_lat, user_lon)) => distance(user_lat, user_lon, lat, lon),
            None => self.distance.as_ref().and_then(Loose::as_f64).unwrap_or(0.0),
        };
        let host = if self.host.is_empty() {
            host_of(&self.url).unwrap_or_default()
        } else {
            self.host
        };
        Some(Server {
            id: self.id.into_string(),
            name: self.name,
            country: self.country,
            sponsor: self.sponsor,
            host,
            url: self.url,
            lat,
            lon,
            distance,
        })
    }
}

/// Parses the directory response and orders it closest-first.
///
/// `origin` is the requester location; when known, distances are computed locally
/// instead of trusting the directory's own estimate.
pub(crate) fn parse_servers(body: &str, origin: Option<(f64, f64)>) -> Result<Vec<Server>, Error> {
    let records: Vec<ServerRecord> =
        serde_json::from_str(body).map_err(|e| Error::parse("server list", e))?;

    let mut servers: Vec<Server> = records
        .into_iter()
        .filter_map(|record| {
            let url = record.url.clone();
            let server = record.into_server(origin);
            if server.is_none() {
                warn!("Skipping server {url} with invalid coordinates");
            }
            server
        })
        .collect();
    servers.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    Ok(servers)
}

/// `host[:port]` of an upload URL, for directory entries that omit `host`.
fn host_of(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Great-circle distance in kilometers between two points given in degrees.
pub fn distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

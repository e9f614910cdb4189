// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Requester information as reported by the speedtest.net configuration document.
//!
//! The document is XML, but only the attributes of its single `<client>` element are
//! needed, e.g. `<client ip="203.0.113.7" lat="52.37" lon="4.89" isp="Example ISP" />`.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::Error;

lazy_static! {
    static ref CLIENT_ELEMENT_REGEX: Regex =
        Regex::new(r"<client[ \t\r\n]+([^>]*)>").expect("failed creating regex");
    static ref ATTRIBUTE_REGEX: Regex =
        Regex::new(r#"([A-Za-z_][A-Za-z0-9_]*)="([^"]*)""#).expect("failed creating regex");
}

/// The requester (this host) as seen by speedtest.net
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub ip: String,
    pub lat: f64,
    pub lon: f64,
    pub isp: String,
}

pub(crate) fn parse_config(body: &str) -> Result<User, Error> {
    let attributes = CLIENT_ELEMENT_REGEX
        .captures(body)
        .and_then(|captures| captures.get(1))
        .ok_or_else(|| Error::parse("user information", "missing <client> element"))?
        .as_str();

    let mut ip = None;
    let mut lat = None;
    let mut lon = None;
    let mut isp = None;
    for captures in ATTRIBUTE_REGEX.captures_iter(attributes) {
        let value = unescape(&captures[2]);
        match &captures[1] {
            "ip" => ip = Some(value),
            "lat" => lat = Some(value),
            "lon" => lon = Some(value),
            "isp" => isp = Some(value),
            _ => {}
        }
    }

    Ok(User {
        ip: ip.ok_or_else(|| Error::parse("user information", "missing ip attribute"))?,
        lat: parse_coordinate("lat", lat)?,
        lon: parse_coordinate("lon", lon)?,
        isp: isp.unwrap_or_default(),
    })
}

fn parse_coordinate(name: &str, value: Option<String>) -> Result<f64, Error> {
    let value =
        value.ok_or_else(|| Error::parse("user information", format!("missing {name} attribute")))?;
    value
        .trim()
        .parse::<f64>()
        .map_err(|e| Error::parse("user information", format!("invalid {name} {value:?}: {e}")))
}

fn unescape(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    value
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

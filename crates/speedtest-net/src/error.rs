// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors returned by the speedtest.net client
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Could not parse {what}: {reason}")]
    Parse { what: &'static str, reason: String },

    #[error("{0} test did not collect any samples")]
    NoSamples(&'static str),
}

impl Error {
    pub(crate) fn parse(what: &'static str, reason: impl ToString) -> Self {
        Error::Parse {
            what,
            reason: reason.to_string(),
        }
    }
}

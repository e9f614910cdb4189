// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Requester or endpoint directory lookup failed
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("could not fetch user information: {0}")]
    RequesterInfo(String),

    #[error("could not fetch server list: {0}")]
    EndpointDirectory(String),
}

/// No endpoint could be chosen from the directory
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("no servers available")]
    NoServersAvailable,

    #[error("could not find chosen server ID {0} in the list of available servers, server fallback is not enabled")]
    ServerNotFound(String),
}

/// The measurement run against the selected endpoint failed
#[derive(Debug, thiserror::Error)]
#[error("measurement failed: {0}")]
pub struct MeasurementError(pub String);

/// Why a refresh cycle did not produce a successful snapshot
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Measurement(#[from] MeasurementError),

    #[error("refresh cancelled")]
    Cancelled,
}

/// Fatal startup configuration problems
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("refresh interval must be greater than 0, got {0}")]
    NonPositiveInterval(i64),

    #[error("invalid listen port: {0:?}")]
    InvalidPort(String),
}

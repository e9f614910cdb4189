// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::endpoint::Endpoint;
use crate::error::SelectionError;

/// Which endpoint a refresh cycle should measure against
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ServerPreference {
    /// First entry of the directory listing
    #[default]
    Closest,
    /// Exact endpoint id
    Id(String),
}

/// Picks the endpoint to measure from a closest-first candidate list.
///
/// The candidate order is trusted as-is; ties on distance are resolved by whoever
/// produced the list.
pub fn select(
    candidates: &[Endpoint],
    preference: &ServerPreference,
    allow_fallback: bool,
) -> Result<Endpoint, SelectionError> {
    let closest = candidates
        .first()
        .ok_or(SelectionError::NoServersAvailable)?;

    match preference {
        ServerPreference::Closest => Ok(closest.clone()),
        ServerPreference::Id(id) => match candidates.iter().find(|e| &e.id == id) {
            Some(endpoint) => Ok(endpoint.clone()),
            None if allow_fallback => Ok(closest.clone()),
            None => Err(SelectionError::ServerNotFound(id.clone())),
        },
    }
}

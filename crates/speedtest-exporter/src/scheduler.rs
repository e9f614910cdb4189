// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::{ConfigError, RefreshError};
use crate::refresher::Refresher;

/// Drives the refresher on a fixed interval until cancelled.
pub struct Scheduler {
    refresher: Refresher,
    interval: Duration,
}

impl Scheduler {
    pub fn new(refresher: Refresher, interval: Duration) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::NonPositiveInterval(0));
        }
        Ok(Self {
            refresher,
            interval,
        })
    }

    /// Runs cycles until `cancel` fires, one at a time.
    ///
    /// A cycle that outlasts the interval delays the next tick rather than causing a
    /// burst of catch-up cycles.
    pub async fn start(&self, initial_run: bool, cancel: CancellationToken) {
        if initial_run && !self.refresh(&cancel).await {
            return;
        }

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // discard first tick, which is instantaneous

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if !self.refresh(&cancel).await {
                        break;
                    }
                }
            }
        }
        debug!("Speedtest scheduler stopped");
    }

    // false once cancelled
    async fn refresh(&self, cancel: &CancellationToken) -> bool {
        match self.refresher.run(cancel).await {
            Ok(()) => true,
            Err(RefreshError::Cancelled) => false,
            Err(e) => {
                error!("Speedtest failed: {e}");
                true
            }
        }
    }
}

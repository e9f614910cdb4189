// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The latest refresh result and the cache it is published through.
//!
//! There is exactly one writer (the refresher, driven serially by the scheduler) and any
//! number of readers (metric scrapes). Snapshots are never mutated: the writer swaps a new
//! `Arc<Snapshot>` into the slot and readers clone the `Arc` out, so a reader holds either
//! the old or the new snapshot in full and only ever contends for the duration of a
//! pointer copy.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use uuid::Uuid;

use crate::endpoint::{Endpoint, Measurement, RequesterInfo};
use crate::readiness::ReadinessGate;

/// Everything a successful cycle measured, with provenance
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementReport {
    pub measurement: Measurement,
    pub requester: RequesterInfo,
    pub endpoint: Endpoint,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Box<MeasurementReport>),
    Failure,
}

/// Immutable result of one refresh cycle
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    id: Uuid,
    duration: Duration,
    outcome: Outcome,
}

impl Snapshot {
    pub fn success(id: Uuid, duration: Duration, report: MeasurementReport) -> Self {
        Self {
            id,
            duration,
            outcome: Outcome::Success(Box::new(report)),
        }
    }

    pub fn failure(id: Uuid, duration: Duration) -> Self {
        Self {
            id,
            duration,
            outcome: Outcome::Failure,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wall-clock time the cycle took
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// The measurement, if the cycle succeeded.
    pub fn report(&self) -> Option<&MeasurementReport> {
        match &self.outcome {
            Outcome::Success(report) => Some(report),
            Outcome::Failure => None,
        }
    }
}

/// Single-slot cache of the current snapshot plus the readiness latch.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    current: RwLock<Option<Arc<Snapshot>>>,
    ready: ReadinessGate,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `snapshot`, dropping the previous one, then opens the readiness gate.
    pub fn replace(&self, snapshot: Snapshot) {
        let snapshot = Arc::new(snapshot);
        {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            *current = Some(snapshot);
        }
        self.ready.mark_ready();
    }

    pub fn read(&self) -> Option<Arc<Snapshot>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Lock-free; true once any snapshot has been committed.
    pub fn is_ready(&self) -> bool {
        self.ready.is_ready()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    #[test]
    fn test_empty_cache_is_not_ready() {
        let cache = SnapshotCache::new();
        assert!(!cache.is_ready());
        assert!(cache.read().is_none());
    }

    #[test]
    fn test_failure_snapshot_makes_cache_ready() {
        let cache = SnapshotCache::new();
        let id = Uuid::new_v4();
        cache.replace(Snapshot::failure(id, Duration::from_millis(5)));

        assert!(cache.is_ready());
        let snapshot = cache.read().unwrap();
        assert_eq!(snapshot.id(), id);
        assert!(snapshot.report().is_none());
    }

    #[test]
    fn test_replace_discards_previous_snapshot() {
        let cache = SnapshotCache::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        cache.replace(Snapshot::failure(first, Duration::ZERO));
        let held = cache.read().unwrap();
        cache.replace(Snapshot::failure(second, Duration::ZERO));

        // readers holding the old snapshot keep it intact
        assert_eq!(held.id(), first);
        assert_eq!(cache.read().unwrap().id(), second);
        assert!(cache.is_ready());
    }

    #[test]
    fn test_concurrent_readers_see_whole_snapshots() {
        // Each snapshot encodes its sequence number in both id and duration, so a torn
        // read would show up as a mismatch.
        fn snapshot(seq: u64) -> Snapshot {
            Snapshot::failure(Uuid::from_u128(seq as u128), Duration::from_millis(seq))
        }

        let cache = Arc::new(SnapshotCache::new());
        cache.replace(snapshot(0));
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    let mut last_seen = 0u64;
                    while !done.load(Ordering::Acquire) {
                        let snapshot = cache.read().unwrap();
                        let seq = snapshot.duration().as_millis() as u64;
                        assert_eq!(snapshot.id(), Uuid::from_u128(seq as u128));
                        // visibility is monotonic for a single reader
                        assert!(seq >= last_seen);
                        last_seen = seq;
                    }
                })
            })
            .collect();

        for seq in 1..=2_000 {
            cache.replace(snapshot(seq));
            let observed = cache.read().unwrap();
            assert!(observed.duration().as_millis() as u64 >= seq);
        }
        done.store(true, Ordering::Release);
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(cache.read().unwrap().id(), Uuid::from_u128(2_000));
    }
}

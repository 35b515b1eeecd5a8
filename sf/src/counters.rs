// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle counters of the subfunctions of a PF.
#[derive(Debug, Default)]
pub struct Counters {
    sf_allocated: AtomicU64,
    sf_freed: AtomicU64,
    releases: AtomicU64,
    ids_freed: AtomicU64,
}

/// A point-in-time copy of [`Counters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    /// `SfDev` blocks allocated by activations.
    pub sf_allocated: u64,
    /// `SfDev` blocks dropped, by release callbacks or by the activator's unwind.
    pub sf_freed: u64,
    /// Release callbacks run by the auxiliary bus.
    pub releases: u64,
    /// Auxiliary ids returned to the allocator.
    pub ids_freed: u64,
}

impl Counters {
    pub(crate) fn sf_allocated(&self) {
        self.sf_allocated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn sf_freed(&self) {
        self.sf_freed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn released(&self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn id_freed(&self) {
        self.ids_freed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            sf_allocated: self.sf_allocated.load(Ordering::Relaxed),
            sf_freed: self.sf_freed.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            ids_freed: self.ids_freed.load(Ordering::Relaxed),
        }
    }
}

impl CounterSnapshot {
    /// `SfDev` blocks currently alive.
    pub fn live_blocks(&self) -> u64 {
        self.sf_allocated.saturating_sub(self.sf_freed)
    }
}

//! Per-worker telemetry: the local travel-time accumulator and the
//! conservation ledger.

use bevy_ecs::prelude::Resource;

/// Online (count, mean, variance) accumulator over local segment transit
/// times, Welford form. Only exits at or past the warm-up tick are added.
///
/// `variance` is the population variance, which is what the pooled
/// cross-worker reduction expects.
#[derive(Debug, Default, Clone, Copy, Resource)]
pub struct TravelTimeStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl TravelTimeStats {
    pub fn add(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }
}

/// Vehicle conservation counters for one worker. Every vehicle entering the
/// segment bumps `spawned` or `arrivals`; every vehicle leaving bumps
/// `forwarded` or `exited`. The remainder is still on the road.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Resource)]
pub struct SegmentLedger {
    /// Vehicles injected by the spawn policy (head segment only).
    pub spawned: u64,
    /// Vehicles reconstructed from inbound handoff records.
    pub arrivals: u64,
    /// Vehicles handed off to the right neighbor.
    pub forwarded: u64,
    /// Vehicles that left the road at the tail segment.
    pub exited: u64,
}

impl SegmentLedger {
    /// Vehicles the ledger says should still be on the segment.
    pub fn in_flight(&self) -> u64 {
        (self.spawned + self.arrivals) - (self.forwarded + self.exited)
    }
}

//! Segment setup: resource construction for one worker's world.
//!
//! `build_segment` populates a fresh `World` with everything the per-tick
//! schedule needs; only the head segment gets a `SpawnPolicy`.

use bevy_ecs::prelude::{Resource, World};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::clock::TickClock;
use crate::ecs::Outbox;
use crate::road::Road;
use crate::telemetry::{SegmentLedger, TravelTimeStats};

/// Parameters for building one worker's segment world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentParams {
    pub rank: usize,
    pub world_size: usize,
    /// Cells owned by this worker.
    pub segment_len: u32,
    pub num_lanes: usize,
    pub max_speed: u32,
    pub prob_slow_down: f64,
    pub prob_change: f64,
    /// Spawn probability per lane per tick; used by the head segment only.
    pub prob_spawn: f64,
    /// Exits before this tick are excluded from statistics.
    pub warmup_ticks: u64,
    /// Base random seed; mixed with the rank so workers draw independent
    /// streams. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for SegmentParams {
    fn default() -> Self {
        Self {
            rank: 0,
            world_size: 2,
            segment_len: 500,
            num_lanes: 2,
            max_speed: 5,
            prob_slow_down: 0.2,
            prob_change: 0.7,
            prob_spawn: 0.4,
            warmup_ticks: 500,
            seed: None,
        }
    }
}

impl SegmentParams {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_rank(mut self, rank: usize, world_size: usize) -> Self {
        self.rank = rank;
        self.world_size = world_size;
        self
    }

    pub fn is_head(&self) -> bool {
        self.rank == 0
    }
}

/// This worker's place in the pipeline.
#[derive(Debug, Clone, Copy, Resource)]
pub struct SegmentSpec {
    pub rank: usize,
    pub world_size: usize,
    pub segment_len: u32,
}

impl SegmentSpec {
    pub fn is_head(&self) -> bool {
        self.rank == 0
    }

    pub fn is_tail(&self) -> bool {
        self.rank + 1 == self.world_size
    }
}

/// CA rule parameters shared by every vehicle on the segment.
///
/// The look-ahead windows bound gap sensing; `look_forward` must be at
/// least `max_speed` so a saturated (unbounded) gap never constrains
/// acceleration.
#[derive(Debug, Clone, Copy, Resource)]
pub struct VehicleParams {
    pub max_speed: u32,
    pub prob_slow_down: f64,
    pub prob_change: f64,
    pub look_forward: u32,
    pub look_other_forward: u32,
    pub look_other_backward: u32,
}

impl VehicleParams {
    pub fn from_segment(params: &SegmentParams) -> Self {
        Self {
            max_speed: params.max_speed,
            prob_slow_down: params.prob_slow_down,
            prob_change: params.prob_change,
            look_forward: params.max_speed,
            look_other_forward: params.max_speed,
            look_other_backward: params.max_speed,
        }
    }
}

/// Stochastic injection at the segment origin; present on the head only.
/// Owns the monotonically increasing id counter, which makes ids globally
/// unique without cross-worker coordination.
#[derive(Debug, Resource)]
pub struct SpawnPolicy {
    pub prob_spawn: f64,
    next_id: u32,
}

impl SpawnPolicy {
    pub fn new(prob_spawn: f64) -> Self {
        Self {
            prob_spawn,
            next_id: 0,
        }
    }

    pub fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn peek_next_id(&self) -> u32 {
        self.next_id
    }
}

/// Process-local random stream for spawn, slow-down, and lane-change draws.
#[derive(Debug, Resource)]
pub struct SimRng(pub StdRng);

impl SimRng {
    pub fn for_rank(seed: Option<u64>, rank: usize) -> Self {
        let rng = match seed {
            Some(base) => {
                StdRng::seed_from_u64(base.wrapping_add((rank as u64).wrapping_mul(0x9e37_79b9)))
            }
            None => StdRng::from_entropy(),
        };
        Self(rng)
    }
}

/// Exit ticks before this value are excluded from statistics.
#[derive(Debug, Clone, Copy, Default, Resource)]
pub struct WarmupTicks(pub u64);

/// Populates `world` with the clock, road, RNG, rule parameters, telemetry,
/// and (on the head) the spawn policy. Caller must have already created
/// `world`; this inserts resources only. Vehicles enter via spawning or
/// handoff reconstruction.
pub fn build_segment(world: &mut World, params: &SegmentParams) {
    world.insert_resource(TickClock::default());
    world.insert_resource(Road::new(params.num_lanes, params.segment_len));
    world.insert_resource(SegmentSpec {
        rank: params.rank,
        world_size: params.world_size,
        segment_len: params.segment_len,
    });
    world.insert_resource(VehicleParams::from_segment(params));
    world.insert_resource(WarmupTicks(params.warmup_ticks));
    world.insert_resource(SimRng::for_rank(params.seed, params.rank));
    world.insert_resource(Outbox::default());
    world.insert_resource(TravelTimeStats::default());
    world.insert_resource(SegmentLedger::default());
    if params.is_head() {
        world.insert_resource(SpawnPolicy::new(params.prob_spawn));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_segment_gives_spawn_policy_to_head_only() {
        let params = SegmentParams::default().with_seed(7);

        let mut head = World::new();
        build_segment(&mut head, &params.clone().with_rank(0, 3));
        assert!(head.get_resource::<SpawnPolicy>().is_some());

        let mut interior = World::new();
        build_segment(&mut interior, &params.with_rank(1, 3));
        assert!(interior.get_resource::<SpawnPolicy>().is_none());
        assert!(interior.get_resource::<Road>().is_some());
    }

    #[test]
    fn look_ahead_defaults_track_max_speed() {
        let params = SegmentParams {
            max_speed: 7,
            ..SegmentParams::default()
        };
        let vehicle_params = VehicleParams::from_segment(&params);
        assert_eq!(vehicle_params.look_forward, 7);
        assert_eq!(vehicle_params.look_other_backward, 7);
    }
}

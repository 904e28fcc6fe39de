//! Per-tick stepping for one segment: schedule construction, arrival
//! reconstruction, and outbox draining.
//!
//! Tick progression and the handoff exchange happen here and in the
//! pipeline driver, outside systems. Each tick the driver injects the
//! inbound batch, runs the schedule once, drains the outbox, and advances
//! the clock.

use bevy_ecs::prelude::{Schedule, World};
use bevy_ecs::schedule::{apply_deferred, IntoSystemConfigs};

use crate::clock::TickClock;
use crate::ecs::{Gaps, Outbox, Position, SegmentExit, Vehicle};
use crate::road::{Lane, Road};
use crate::scenario::VehicleParams;
use crate::systems::{lane_change_system, movement_system, spawner_system};
use crate::telemetry::SegmentLedger;

/// An inbound handoff record could not be reconstructed. Channels carry
/// trusted traffic between co-located workers, so this is a hard fault,
/// not a recoverable condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectError {
    /// The record names a lane this segment does not have.
    UnknownLane { lane_number: u32 },
    /// Every cell of the target lane is occupied.
    LaneFull { lane_number: u32 },
}

impl std::fmt::Display for InjectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InjectError::UnknownLane { lane_number } => {
                write!(f, "handoff record names unknown lane {lane_number}")
            }
            InjectError::LaneFull { lane_number } => {
                write!(f, "no free cell in lane {lane_number} for inbound vehicle")
            }
        }
    }
}

impl std::error::Error for InjectError {}

/// The fixed per-tick schedule: lane changes, then moves, then spawning,
/// with deferred despawns applied before the next tick.
pub fn segment_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.add_systems(
        (
            lane_change_system,
            movement_system,
            spawner_system,
            apply_deferred,
        )
            .chain(),
    );
    schedule
}

/// Runs one tick and advances the clock.
pub fn run_tick(world: &mut World, schedule: &mut Schedule) {
    schedule.run(world);
    world.resource_mut::<TickClock>().advance();
}

/// Takes the exits staged during the last tick.
pub fn drain_outbox(world: &mut World) -> Vec<SegmentExit> {
    std::mem::take(&mut world.resource_mut::<Outbox>().0)
}

/// Nearest free cell at or below `entry`, falling back to the nearest one
/// above it. Keeps the one-vehicle-per-cell invariant when the boundary
/// cell is already taken.
fn find_entry_cell(lane: &Lane, entry: u32, segment_len: u32) -> Option<u32> {
    (0..=entry)
        .rev()
        .chain(entry + 1..segment_len)
        .find(|cell| lane.is_free(*cell))
}

/// Reconstructs inbound vehicles from the left neighbor's handoff batch.
///
/// The lane is matched by its global number; the entry position is the
/// record's overshoot into this segment. The transit counter restarts at
/// zero: each worker measures its own local transit time.
pub fn inject_arrivals(world: &mut World, arrivals: &[SegmentExit]) -> Result<(), InjectError> {
    let params = *world.resource::<VehicleParams>();

    for record in arrivals {
        let (lane, placed) = {
            let road = world.resource::<Road>();
            let lane = road
                .lane_index_by_number(record.lane_number)
                .ok_or(InjectError::UnknownLane {
                    lane_number: record.lane_number,
                })?;
            let entry = record.entry_position.min(road.segment_len() - 1);
            let placed = find_entry_cell(road.lane(lane), entry, road.segment_len()).ok_or(
                InjectError::LaneFull {
                    lane_number: record.lane_number,
                },
            )?;
            (lane, placed)
        };

        let entity = world
            .spawn((
                Vehicle {
                    id: record.id,
                    lane,
                    speed: record.speed.min(params.max_speed),
                    max_speed: params.max_speed,
                    prob_slow_down: params.prob_slow_down,
                    prob_change: params.prob_change,
                    ticks_on_segment: 0,
                    prev_position: placed,
                },
                Position(placed),
                Gaps::default(),
            ))
            .id();
        world
            .resource_mut::<Road>()
            .lane_mut(lane)
            .insert(placed, entity)
            .expect("entry cell checked free");
        world.resource_mut::<SegmentLedger>().arrivals += 1;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{build_test_world, place_vehicle, test_params};

    fn arrival(lane_number: u32, entry: u32, speed: u32) -> SegmentExit {
        SegmentExit {
            lane_number,
            id: 77,
            entry_position: entry,
            speed,
            ticks_on_segment: 9,
        }
    }

    #[test]
    fn arrival_lands_on_its_entry_cell_with_a_fresh_transit_clock() {
        let mut params = test_params(2, 20);
        params.rank = 1;
        params.world_size = 2;
        let mut world = build_test_world(&params);

        inject_arrivals(&mut world, &[arrival(1, 3, 4)]).expect("inject");

        let entity = world
            .resource::<Road>()
            .lane(1)
            .vehicle_at(3)
            .expect("vehicle placed");
        let vehicle = world.get::<Vehicle>(entity).expect("vehicle");
        assert_eq!(vehicle.id, 77);
        assert_eq!(vehicle.speed, 4);
        assert_eq!(vehicle.ticks_on_segment, 0);
        assert_eq!(world.resource::<SegmentLedger>().arrivals, 1);
    }

    #[test]
    fn occupied_entry_cell_falls_back_to_the_nearest_free_one() {
        let mut params = test_params(1, 20);
        params.rank = 1;
        let mut world = build_test_world(&params);
        place_vehicle(&mut world, 0, 2, 0);

        inject_arrivals(&mut world, &[arrival(0, 2, 3)]).expect("inject");

        let road = world.resource::<Road>();
        assert!(road.lane(0).vehicle_at(1).is_some());
    }

    #[test]
    fn unknown_lane_is_a_hard_fault() {
        let mut params = test_params(1, 20);
        params.rank = 1;
        let mut world = build_test_world(&params);

        let err = inject_arrivals(&mut world, &[arrival(5, 0, 1)]).expect_err("unknown lane");
        assert_eq!(err, InjectError::UnknownLane { lane_number: 5 });
    }

    #[test]
    fn full_lane_is_a_hard_fault() {
        let mut params = test_params(1, 4);
        params.rank = 1;
        let mut world = build_test_world(&params);
        for cell in 0..4 {
            place_vehicle(&mut world, 0, cell, 0);
        }

        let err = inject_arrivals(&mut world, &[arrival(0, 1, 1)]).expect_err("full lane");
        assert_eq!(err, InjectError::LaneFull { lane_number: 0 });
    }

    #[test]
    fn arrival_moves_in_the_tick_it_arrives() {
        let mut params = test_params(1, 20);
        params.rank = 1;
        params.world_size = 2;
        params.prob_slow_down = 0.0;
        let mut world = build_test_world(&params);
        let mut schedule = segment_schedule();

        inject_arrivals(&mut world, &[arrival(0, 0, 3)]).expect("inject");
        run_tick(&mut world, &mut schedule);

        let road = world.resource::<Road>();
        // speed 3 accelerates to 4 on an open road
        assert!(road.lane(0).vehicle_at(4).is_some());
        assert_eq!(world.resource::<TickClock>().now(), 1);
    }

    #[test]
    fn drain_outbox_empties_the_staging_area() {
        let mut params = test_params(1, 10);
        params.prob_slow_down = 0.0;
        let mut world = build_test_world(&params);
        let mut schedule = segment_schedule();
        place_vehicle(&mut world, 0, 9, 4);

        run_tick(&mut world, &mut schedule);
        let drained = drain_outbox(&mut world);
        assert_eq!(drained.len(), 1);
        assert!(world.resource::<Outbox>().0.is_empty());
    }
}

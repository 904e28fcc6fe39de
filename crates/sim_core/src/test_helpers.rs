//! Shared test setup for segment worlds.

use bevy_ecs::prelude::{Entity, World};

use crate::ecs::{Gaps, Position, Vehicle};
use crate::road::Road;
use crate::scenario::{build_segment, SegmentParams, VehicleParams};

/// Deterministic parameters for a head segment with spawning and
/// stochastic rules switched off; tests opt in to what they exercise.
pub fn test_params(num_lanes: usize, segment_len: u32) -> SegmentParams {
    SegmentParams {
        rank: 0,
        world_size: 2,
        segment_len,
        num_lanes,
        max_speed: 5,
        prob_slow_down: 0.0,
        prob_change: 0.0,
        prob_spawn: 0.0,
        warmup_ticks: 0,
        seed: Some(42),
    }
}

pub fn build_test_world(params: &SegmentParams) -> World {
    let mut world = World::new();
    build_segment(&mut world, params);
    world
}

/// Put a vehicle directly on the road, bypassing spawn and handoff.
/// Ids are made distinct but carry no meaning in tests that use this.
pub fn place_vehicle(world: &mut World, lane: usize, position: u32, speed: u32) -> Entity {
    let params = *world.resource::<VehicleParams>();
    let id = 1000 + world.resource::<Road>().vehicle_count() as u32;
    let entity = world
        .spawn((
            Vehicle {
                id,
                lane,
                speed,
                max_speed: params.max_speed,
                prob_slow_down: params.prob_slow_down,
                prob_change: params.prob_change,
                ticks_on_segment: 0,
                prev_position: position,
            },
            Position(position),
            Gaps::default(),
        ))
        .id();
    world
        .resource_mut::<Road>()
        .lane_mut(lane)
        .insert(position, entity)
        .expect("test cell should be free");
    entity
}

pub fn vehicle_lane(world: &World, entity: Entity) -> usize {
    world.get::<Vehicle>(entity).expect("vehicle alive").lane
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placed_vehicles_get_distinct_ids() {
        let mut world = build_test_world(&test_params(1, 20));
        let first = place_vehicle(&mut world, 0, 0, 0);
        let second = place_vehicle(&mut world, 0, 5, 0);

        let first_id = world.get::<Vehicle>(first).expect("vehicle").id;
        let second_id = world.get::<Vehicle>(second).expect("vehicle").id;
        assert_ne!(first_id, second_id);
    }
}

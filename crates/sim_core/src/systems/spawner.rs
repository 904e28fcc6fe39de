//! Stochastic vehicle injection at the segment origin.
//!
//! Only the head segment carries a [`SpawnPolicy`], so the system is a
//! no-op everywhere else. An occupied origin cell drops that lane's
//! attempt for the tick without consuming an id (backpressure).

use bevy_ecs::prelude::{Commands, Res, ResMut};
use rand::Rng;

use crate::ecs::{Gaps, Position, Vehicle};
use crate::road::Road;
use crate::scenario::{SimRng, SpawnPolicy, VehicleParams};
use crate::telemetry::SegmentLedger;

pub fn spawner_system(
    mut commands: Commands,
    policy: Option<ResMut<SpawnPolicy>>,
    mut road: ResMut<Road>,
    params: Res<VehicleParams>,
    mut rng: ResMut<SimRng>,
    mut ledger: ResMut<SegmentLedger>,
) {
    let Some(mut policy) = policy else {
        return;
    };

    for lane in 0..road.num_lanes() {
        if !rng.0.gen_bool(policy.prob_spawn) {
            continue;
        }
        if !road.lane(lane).is_free(0) {
            continue;
        }

        let id = policy.next_id();
        let entity = commands
            .spawn((
                Vehicle {
                    id,
                    lane,
                    speed: 0,
                    max_speed: params.max_speed,
                    prob_slow_down: params.prob_slow_down,
                    prob_change: params.prob_change,
                    ticks_on_segment: 0,
                    prev_position: 0,
                },
                Position(0),
                Gaps::default(),
            ))
            .id();
        road.lane_mut(lane)
            .insert(0, entity)
            .expect("origin cell checked free");
        ledger.spawned += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::SpawnPolicy;
    use crate::test_helpers::{build_test_world, place_vehicle, test_params};
    use bevy_ecs::prelude::{Schedule, World};
    use bevy_ecs::schedule::{apply_deferred, IntoSystemConfigs};

    fn run(world: &mut World) {
        let mut schedule = Schedule::default();
        schedule.add_systems((spawner_system, apply_deferred).chain());
        schedule.run(world);
    }

    #[test]
    fn certain_spawn_fills_each_free_origin() {
        let mut params = test_params(2, 50);
        params.prob_spawn = 1.0;
        let mut world = build_test_world(&params);

        run(&mut world);

        let road = world.resource::<Road>();
        assert!(!road.lane(0).is_free(0));
        assert!(!road.lane(1).is_free(0));
        assert_eq!(world.resource::<SegmentLedger>().spawned, 2);
        assert_eq!(world.resource::<SpawnPolicy>().peek_next_id(), 2);
    }

    #[test]
    fn occupied_origin_drops_the_attempt_and_keeps_the_id_counter() {
        let mut params = test_params(1, 50);
        params.prob_spawn = 1.0;
        let mut world = build_test_world(&params);
        place_vehicle(&mut world, 0, 0, 0);

        run(&mut world);

        assert_eq!(world.resource::<Road>().vehicle_count(), 1);
        assert_eq!(world.resource::<SpawnPolicy>().peek_next_id(), 0);
        assert_eq!(world.resource::<SegmentLedger>().spawned, 0);
    }

    #[test]
    fn missing_policy_is_a_no_op() {
        let params = test_params(1, 50);
        let mut world = build_test_world(&params);
        // Model an interior segment: no spawn policy resource.
        world.remove_resource::<SpawnPolicy>();

        run(&mut world);

        assert_eq!(world.resource::<Road>().vehicle_count(), 0);
    }

    #[test]
    fn spawned_ids_are_monotonic() {
        let mut params = test_params(1, 50);
        params.prob_spawn = 1.0;
        let mut world = build_test_world(&params);

        run(&mut world);
        let first = world.resource::<SpawnPolicy>().peek_next_id();
        // Free the origin so the next attempt succeeds.
        let entity = world
            .resource_mut::<Road>()
            .lane_mut(0)
            .remove(0)
            .expect("spawned vehicle at origin");
        world.despawn(entity);
        run(&mut world);

        assert_eq!(first, 1);
        assert_eq!(world.resource::<SpawnPolicy>().peek_next_id(), 2);
    }
}

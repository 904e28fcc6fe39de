//! Speed/position phase: accelerate, brake, random slow-down, advance.
//!
//! Braking re-senses the forward gap against the live occupancy index at
//! each vehicle's own commit point, so the no-collision bound holds under
//! sequential commit even when another vehicle changed lanes after the
//! sensing phase. Vehicles whose move carries them past the segment's
//! right edge are handed to the boundary logic: forwarded immediately on
//! the head, defer-or-forward elsewhere.

use bevy_ecs::prelude::{Commands, Entity, Query, Res, ResMut};
use rand::Rng;

use crate::clock::TickClock;
use crate::ecs::{Outbox, Position, SegmentExit, Vehicle};
use crate::road::Road;
use crate::scenario::{SegmentSpec, SimRng, VehicleParams, WarmupTicks};
use crate::telemetry::{SegmentLedger, TravelTimeStats};

#[allow(clippy::too_many_arguments)]
pub fn movement_system(
    mut commands: Commands,
    mut road: ResMut<Road>,
    spec: Res<SegmentSpec>,
    clock: Res<TickClock>,
    warmup: Res<WarmupTicks>,
    params: Res<VehicleParams>,
    mut rng: ResMut<SimRng>,
    mut outbox: ResMut<Outbox>,
    mut stats: ResMut<TravelTimeStats>,
    mut ledger: ResMut<SegmentLedger>,
    mut vehicles: Query<(Entity, &mut Vehicle, &mut Position)>,
) {
    let segment_len = spec.segment_len;

    for (entity, mut vehicle, mut position) in vehicles.iter_mut() {
        let lane = vehicle.lane;
        let prev = position.0;
        let gap = road.lane(lane).gap_forward(prev, params.look_forward);

        let mut speed = (vehicle.speed + 1).min(vehicle.max_speed);
        speed = speed.min(gap);
        if rng.0.gen_bool(vehicle.prob_slow_down) {
            speed = speed.saturating_sub(1);
        }

        let new_position = prev + speed;
        vehicle.speed = speed;
        vehicle.prev_position = prev;
        vehicle.ticks_on_segment += 1;

        if new_position < segment_len {
            if new_position != prev {
                road.relocate(lane, prev, lane, new_position)
                    .expect("braking bounds the advance to free cells");
            }
            position.0 = new_position;
            continue;
        }

        // The move crossed the segment's right edge.
        let clamp = segment_len - 1;
        let defer = !spec.is_head()
            && (u64::from(prev) + u64::from(new_position))
                < u64::from(segment_len) + u64::from(params.max_speed)
            && (road.lane(lane).is_free(clamp) || clamp == prev);

        if defer {
            // Still inside the buffer zone: hold the vehicle at the last
            // cell for one more step instead of forwarding it now. Its
            // transit clock keeps running until the real handoff.
            road.relocate(lane, prev, lane, clamp)
                .expect("clamp cell checked free");
            position.0 = clamp;
        } else {
            road.lane_mut(lane).remove(prev);
            outbox.0.push(SegmentExit {
                lane_number: road.lane(lane).number(),
                id: vehicle.id,
                entry_position: new_position - segment_len,
                speed,
                ticks_on_segment: vehicle.ticks_on_segment,
            });
            if clock.now() >= warmup.0 {
                stats.add(f64::from(vehicle.ticks_on_segment));
            }
            if spec.is_tail() {
                ledger.exited += 1;
            } else {
                ledger.forwarded += 1;
            }
            commands.entity(entity).despawn();
        }
    }
}

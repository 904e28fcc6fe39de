//! Lane-change phase: gap sensing and the probabilistic switch decision.
//!
//! Vehicles are processed sequentially against the live occupancy index, so
//! a switch committed by an earlier vehicle is visible to later ones in the
//! same pass. Each vehicle re-senses its gaps right after its own switch
//! because the spatial context changed.

use bevy_ecs::prelude::{Query, Res, ResMut};
use rand::Rng;

use crate::ecs::{Gaps, Position, Vehicle};
use crate::road::Road;
use crate::scenario::{SimRng, VehicleParams};

/// Adjacent lanes to evaluate, preferred candidate first.
fn candidate_lanes(lane: usize, num_lanes: usize) -> [Option<usize>; 2] {
    let up = (lane + 1 < num_lanes).then_some(lane + 1);
    let down = lane.checked_sub(1);
    [up, down]
}

/// Measure own-lane and adjacent-lane gaps for one vehicle.
pub(crate) fn sense_gaps(
    road: &Road,
    lane: usize,
    position: u32,
    other_lane: Option<usize>,
    params: &VehicleParams,
) -> Gaps {
    let forward = road.lane(lane).gap_forward(position, params.look_forward);
    match other_lane {
        Some(other) => Gaps {
            forward,
            other_forward: road
                .lane(other)
                .gap_forward(position, params.look_other_forward),
            other_backward: road
                .lane(other)
                .gap_backward(position, params.look_other_backward),
            other_lane: Some(other),
        },
        None => Gaps {
            forward,
            ..Gaps::default()
        },
    }
}

/// A change is eligible when the target cell is free, the adjacent forward
/// gap strictly beats the own-lane gap (incentive), and no follower sits
/// within the backward look-ahead window (safety).
fn is_eligible(road: &Road, position: u32, gaps: &Gaps, params: &VehicleParams) -> bool {
    let Some(other) = gaps.other_lane else {
        return false;
    };
    road.lane(other).is_free(position)
        && gaps.other_forward > gaps.forward
        && gaps.other_backward >= params.look_other_backward
}

pub fn lane_change_system(
    mut road: ResMut<Road>,
    params: Res<VehicleParams>,
    mut rng: ResMut<SimRng>,
    mut vehicles: Query<(&mut Vehicle, &Position, &mut Gaps)>,
) {
    for (mut vehicle, position, mut gaps) in vehicles.iter_mut() {
        let pos = position.0;
        let mut sensed = sense_gaps(&road, vehicle.lane, pos, None, &params);
        let mut target = None;

        for candidate in candidate_lanes(vehicle.lane, road.num_lanes())
            .into_iter()
            .flatten()
        {
            sensed = sense_gaps(&road, vehicle.lane, pos, Some(candidate), &params);
            if is_eligible(&road, pos, &sensed, &params) {
                target = Some(candidate);
                break;
            }
        }

        if let Some(other) = target {
            // Stochastic damping: without it every vehicle satisfying the
            // criterion would switch in lock-step and oscillate.
            if rng.0.gen_bool(vehicle.prob_change) {
                road.relocate(vehicle.lane, pos, other, pos)
                    .expect("target cell checked free during eligibility");
                vehicle.lane = other;
                let next_candidate = candidate_lanes(other, road.num_lanes())
                    .into_iter()
                    .flatten()
                    .next();
                sensed = sense_gaps(&road, other, pos, next_candidate, &params);
            }
        }

        *gaps = sensed;
    }
}

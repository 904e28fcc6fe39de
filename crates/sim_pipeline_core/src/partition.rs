//! Deterministic road partitioning across the worker chain.
//!
//! Every worker must compute the identical plan from (road length, worker
//! count) alone, or vehicles would be routed across mismatched boundaries.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValidationError {}

/// One worker's contiguous slice of the road, `[start, end)` in global
/// cell coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SegmentAssignment {
    pub rank: usize,
    pub start: u32,
    pub end_exclusive: u32,
}

impl SegmentAssignment {
    pub fn len(&self) -> u32 {
        self.end_exclusive - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end_exclusive
    }
}

/// Split `road_length` cells over `worker_count` ranks: `L / N` each, with
/// the first `L mod N` ranks taking one extra cell.
pub fn compute_segment_plan(
    road_length: u32,
    worker_count: usize,
) -> Result<Vec<SegmentAssignment>, ValidationError> {
    if worker_count < 2 {
        return Err(ValidationError::new(
            "the pipeline needs at least 2 workers",
        ));
    }
    if road_length == 0 {
        return Err(ValidationError::new("road length must be positive"));
    }
    if (worker_count as u64) > u64::from(road_length) {
        return Err(ValidationError::new(format!(
            "cannot split {road_length} cells over {worker_count} workers"
        )));
    }

    let base = road_length / worker_count as u32;
    let remainder = road_length % worker_count as u32;

    let mut assignments = Vec::with_capacity(worker_count);
    let mut cursor = 0u32;
    for rank in 0..worker_count {
        let size = base + u32::from((rank as u32) < remainder);
        assignments.push(SegmentAssignment {
            rank,
            start: cursor,
            end_exclusive: cursor + size,
        });
        cursor += size;
    }

    validate_assignments(road_length, &assignments)?;
    Ok(assignments)
}

/// A handoff overshoot is below `max_speed`, so every segment must be
/// strictly longer than that for the entry cell to land inside the
/// receiving segment.
pub fn validate_against_speed(
    assignments: &[SegmentAssignment],
    max_speed: u32,
) -> Result<(), ValidationError> {
    match assignments.iter().find(|a| a.len() <= max_speed) {
        Some(short) => Err(ValidationError::new(format!(
            "segment of rank {} is {} cells, must exceed max speed {}",
            short.rank,
            short.len(),
            max_speed
        ))),
        None => Ok(()),
    }
}

fn validate_assignments(
    road_length: u32,
    assignments: &[SegmentAssignment],
) -> Result<(), ValidationError> {
    if assignments.is_empty() {
        return Err(ValidationError::new("no segments to assign"));
    }

    if assignments[0].start != 0
        || assignments[assignments.len() - 1].end_exclusive != road_length
    {
        return Err(ValidationError::new(
            "segment boundaries do not cover the full road",
        ));
    }

    for idx in 1..assignments.len() {
        if assignments[idx - 1].end_exclusive != assignments[idx].start {
            return Err(ValidationError::new(
                "segment boundaries overlap or leave gaps",
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_is_deterministic_for_identical_input() {
        let plan_a = compute_segment_plan(1000, 3).expect("plan");
        let plan_b = compute_segment_plan(1000, 3).expect("plan");
        assert_eq!(plan_a, plan_b);
    }

    #[test]
    fn remainder_goes_to_the_lowest_ranks() {
        let plan = compute_segment_plan(10, 3).expect("plan");
        let lens: Vec<u32> = plan.iter().map(SegmentAssignment::len).collect();
        assert_eq!(lens, vec![4, 3, 3]);
        assert_eq!(plan[0].start, 0);
        assert_eq!(plan[1].start, 4);
        assert_eq!(plan[2].end_exclusive, 10);
    }

    #[test]
    fn plan_covers_the_road_exactly() {
        let plan = compute_segment_plan(1001, 4).expect("plan");
        assert_eq!(plan[0].start, 0);
        assert_eq!(plan.last().expect("non-empty").end_exclusive, 1001);
        for window in plan.windows(2) {
            assert_eq!(window[0].end_exclusive, window[1].start);
        }
        // Sizes differ by at most one cell.
        let min = plan.iter().map(SegmentAssignment::len).min().expect("min");
        let max = plan.iter().map(SegmentAssignment::len).max().expect("max");
        assert!(max - min <= 1);
    }

    #[test]
    fn fewer_than_two_workers_is_rejected() {
        let err = compute_segment_plan(100, 1).expect_err("too few workers");
        assert_eq!(err.message(), "the pipeline needs at least 2 workers");
    }

    #[test]
    fn more_workers_than_cells_is_rejected() {
        compute_segment_plan(3, 4).expect_err("unsatisfiable split");
    }

    #[test]
    fn short_segments_fail_the_speed_check() {
        let plan = compute_segment_plan(10, 2).expect("plan");
        validate_against_speed(&plan, 4).expect("5-cell segments, max speed 4");
        validate_against_speed(&plan, 5).expect_err("segments must exceed max speed");
    }
}

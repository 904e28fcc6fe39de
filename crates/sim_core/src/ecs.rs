use bevy_ecs::prelude::{Component, Resource};

/// One vehicle on the local segment.
#[derive(Debug, Clone, Copy, PartialEq, Component)]
pub struct Vehicle {
    /// Globally unique id, assigned by the head segment's spawn counter.
    pub id: u32,
    /// Index into the segment's lane vector. Lane *numbers* are consistent
    /// across segments so identity survives a handoff.
    pub lane: usize,
    pub speed: u32,
    pub max_speed: u32,
    pub prob_slow_down: f64,
    pub prob_change: f64,
    /// Ticks spent on this segment; restarts at 0 when the vehicle is
    /// reconstructed on the next segment.
    pub ticks_on_segment: u32,
    /// Position before the current move; input to the boundary-proximity test.
    pub prev_position: u32,
}

/// Cell index in segment-local coordinates `[0, segment_len)`.
/// Mirrors the occupancy index at all times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Component)]
pub struct Position(pub u32);

/// Staged gap measurements from the most recent sensing pass.
///
/// Gaps are free cells to the nearest occupied cell, saturated at the
/// corresponding look-ahead window; the saturated value means nothing was
/// sensed within the window (no conflict).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Component)]
pub struct Gaps {
    pub forward: u32,
    pub other_forward: u32,
    pub other_backward: u32,
    /// Lane index the `other_*` gaps were measured against.
    pub other_lane: Option<usize>,
}

/// A vehicle that finished traversing this segment, staged for handoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentExit {
    /// Global lane number (not the local lane index).
    pub lane_number: u32,
    pub id: u32,
    /// Overshoot past the segment's right edge: the entry cell in the next
    /// segment's local coordinates.
    pub entry_position: u32,
    pub speed: u32,
    /// Transit time measured on this segment.
    pub ticks_on_segment: u32,
}

/// Exits staged during the current tick; drained by the driver after the
/// schedule runs and forwarded to the right neighbor (or dropped at the
/// tail, where vehicles leave the road for good).
#[derive(Debug, Default, Resource)]
pub struct Outbox(pub Vec<SegmentExit>);

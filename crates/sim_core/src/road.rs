//! Road / lane occupancy index for one worker's segment.
//!
//! Each lane keeps a position → entity map over its occupied cells and
//! answers nearest-neighbor queries forward/backward via range scans.
//! The index is the source of truth for occupancy: systems mutate it in
//! the same pass that updates the `Position` component.

use std::collections::BTreeMap;

use bevy_ecs::prelude::{Entity, Resource};

/// Attempted to place a vehicle on an occupied cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccupiedCell {
    pub lane_number: u32,
    pub position: u32,
}

impl std::fmt::Display for OccupiedCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cell {} in lane {} is already occupied",
            self.position, self.lane_number
        )
    }
}

impl std::error::Error for OccupiedCell {}

/// One lane of the segment. The lane number is globally consistent across
/// segments; the occupancy map covers this segment's cells only.
#[derive(Debug, Default)]
pub struct Lane {
    number: u32,
    occupancy: BTreeMap<u32, Entity>,
}

impl Lane {
    pub fn new(number: u32) -> Self {
        Self {
            number,
            occupancy: BTreeMap::new(),
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn is_free(&self, position: u32) -> bool {
        !self.occupancy.contains_key(&position)
    }

    pub fn vehicle_at(&self, position: u32) -> Option<Entity> {
        self.occupancy.get(&position).copied()
    }

    pub fn vehicle_count(&self) -> usize {
        self.occupancy.len()
    }

    pub fn insert(&mut self, position: u32, entity: Entity) -> Result<(), OccupiedCell> {
        if self.occupancy.contains_key(&position) {
            return Err(OccupiedCell {
                lane_number: self.number,
                position,
            });
        }
        self.occupancy.insert(position, entity);
        Ok(())
    }

    pub fn remove(&mut self, position: u32) -> Option<Entity> {
        self.occupancy.remove(&position)
    }

    /// Nearest occupied cell strictly ahead of `position`, within `window` cells.
    pub fn nearest_ahead(&self, position: u32, window: u32) -> Option<(u32, Entity)> {
        if window == 0 {
            return None;
        }
        let upper = position.saturating_add(window);
        self.occupancy
            .range(position + 1..=upper)
            .next()
            .map(|(pos, entity)| (*pos, *entity))
    }

    /// Nearest occupied cell strictly behind `position`, within `window` cells.
    pub fn nearest_behind(&self, position: u32, window: u32) -> Option<(u32, Entity)> {
        let lower = position.saturating_sub(window);
        self.occupancy
            .range(lower..position)
            .next_back()
            .map(|(pos, entity)| (*pos, *entity))
    }

    /// Free cells ahead of `position`, saturated at `window`.
    /// The saturated value means no vehicle was sensed within the window.
    pub fn gap_forward(&self, position: u32, window: u32) -> u32 {
        match self.nearest_ahead(position, window) {
            Some((pos, _)) => pos - position - 1,
            None => window,
        }
    }

    /// Free cells behind `position`, saturated at `window`.
    pub fn gap_backward(&self, position: u32, window: u32) -> u32 {
        match self.nearest_behind(position, window) {
            Some((pos, _)) => position - pos - 1,
            None => window,
        }
    }
}

/// The ordered lanes of one segment.
#[derive(Debug, Resource)]
pub struct Road {
    lanes: Vec<Lane>,
    segment_len: u32,
}

impl Road {
    /// Lane numbers are `0..num_lanes`, identical on every segment.
    pub fn new(num_lanes: usize, segment_len: u32) -> Self {
        let lanes = (0..num_lanes as u32).map(Lane::new).collect();
        Self { lanes, segment_len }
    }

    pub fn segment_len(&self) -> u32 {
        self.segment_len
    }

    pub fn num_lanes(&self) -> usize {
        self.lanes.len()
    }

    pub fn lane(&self, index: usize) -> &Lane {
        &self.lanes[index]
    }

    pub fn lane_mut(&mut self, index: usize) -> &mut Lane {
        &mut self.lanes[index]
    }

    pub fn lanes(&self) -> &[Lane] {
        &self.lanes
    }

    /// Local index of the lane with the given global number.
    pub fn lane_index_by_number(&self, number: u32) -> Option<usize> {
        self.lanes.iter().position(|lane| lane.number() == number)
    }

    /// Move a vehicle between cells, possibly across lanes.
    /// The source cell must hold an entity and the target must be free.
    pub fn relocate(
        &mut self,
        from_lane: usize,
        from_pos: u32,
        to_lane: usize,
        to_pos: u32,
    ) -> Result<(), OccupiedCell> {
        if !self.lanes[to_lane].is_free(to_pos) && !(from_lane == to_lane && from_pos == to_pos) {
            return Err(OccupiedCell {
                lane_number: self.lanes[to_lane].number(),
                position: to_pos,
            });
        }
        if let Some(entity) = self.lanes[from_lane].remove(from_pos) {
            self.lanes[to_lane]
                .insert(to_pos, entity)
                .expect("target cell checked free above");
        }
        Ok(())
    }

    pub fn vehicle_count(&self) -> usize {
        self.lanes.iter().map(Lane::vehicle_count).sum()
    }
}

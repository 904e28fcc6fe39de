//! Run configuration: a JSON parameter file loaded once, before any
//! worker starts. A file that cannot be read, parsed, or validated aborts
//! the run.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sim_core::scenario::SegmentParams;
use sim_pipeline_core::partition::SegmentAssignment;

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(message) => write!(f, "failed to read config: {message}"),
            ConfigError::Parse(message) => write!(f, "failed to parse config: {message}"),
            ConfigError::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Simulation parameters shared by every worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Total road length in cells, split across the worker chain.
    pub road_length: u32,
    pub num_lanes: usize,
    pub max_speed: u32,
    pub prob_slow_down: f64,
    pub prob_change: f64,
    pub prob_spawn: f64,
    pub max_ticks: u64,
    pub warmup_ticks: u64,
    /// Base random seed; each worker mixes in its rank. `None` draws the
    /// streams from entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            road_length: 1000,
            num_lanes: 2,
            max_speed: 5,
            prob_slow_down: 0.2,
            prob_change: 0.7,
            prob_spawn: 0.4,
            max_ticks: 2000,
            warmup_ticks: 500,
            seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|error| ConfigError::Io(format!("{}: {error}", path.display())))?;
        let config: SimulationConfig =
            serde_json::from_str(&text).map_err(|error| ConfigError::Parse(error.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.road_length == 0 {
            return Err(ConfigError::Invalid("road_length must be positive".into()));
        }
        if self.num_lanes == 0 {
            return Err(ConfigError::Invalid("num_lanes must be positive".into()));
        }
        if self.max_speed == 0 {
            return Err(ConfigError::Invalid("max_speed must be positive".into()));
        }
        if self.max_ticks == 0 {
            return Err(ConfigError::Invalid("max_ticks must be positive".into()));
        }
        for (name, prob) in [
            ("prob_slow_down", self.prob_slow_down),
            ("prob_change", self.prob_change),
            ("prob_spawn", self.prob_spawn),
        ] {
            if !(0.0..=1.0).contains(&prob) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be within [0, 1], got {prob}"
                )));
            }
        }
        Ok(())
    }

    /// Canonical JSON encoding, input to the run fingerprint.
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).expect("config serializes to JSON")
    }

    /// The per-segment parameters for one rank's assignment.
    pub fn segment_params(
        &self,
        assignment: &SegmentAssignment,
        world_size: usize,
    ) -> SegmentParams {
        SegmentParams {
            rank: assignment.rank,
            world_size,
            segment_len: assignment.len(),
            num_lanes: self.num_lanes,
            max_speed: self.max_speed,
            prob_slow_down: self.prob_slow_down,
            prob_change: self.prob_change,
            prob_spawn: self.prob_spawn,
            warmup_ticks: self.warmup_ticks,
            seed: self.seed,
        }
    }
}

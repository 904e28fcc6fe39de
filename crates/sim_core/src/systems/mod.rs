pub mod lane_change;
pub mod movement;
pub mod spawner;

pub use lane_change::lane_change_system;
pub use movement::movement_system;
pub use spawner::spawner_system;

pub mod clock;
pub mod ecs;
pub mod road;
pub mod runner;
pub mod scenario;
pub mod systems;
pub mod telemetry;

#[cfg(feature = "test-helpers")]
pub mod test_helpers;

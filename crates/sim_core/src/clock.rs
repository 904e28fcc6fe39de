use bevy_ecs::prelude::Resource;

/// Simulation time in whole ticks. The driver advances it once per tick,
/// after the schedule has run; systems only read it.
#[derive(Debug, Default, Resource)]
pub struct TickClock {
    now: u64,
}

impl TickClock {
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn advance(&mut self) {
        self.now += 1;
    }
}

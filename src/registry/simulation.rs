use rand::Rng;
use std::time::Duration;

pub const DEFAULT_TICK: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_STEP: f32 = 10.0;
/// Floor for a single step so every tick moves the bar.
pub const MIN_STEP: f32 = 0.1;
/// Shortest tick the ticker will run at.
pub const MIN_TICK: Duration = Duration::from_millis(1);

/// Placeholder progress for locally created jobs until a server drives them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationConfig {
    pub tick: Duration,
    pub max_step: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick: DEFAULT_TICK,
            max_step: DEFAULT_MAX_STEP,
        }
    }
}

impl SimulationConfig {
    pub fn with_tick(tick: Duration) -> Self {
        Self {
            tick,
            ..Self::default()
        }
    }

    /// Tick period actually used; never zero.
    pub fn period(&self) -> Duration {
        self.tick.max(MIN_TICK)
    }

    pub fn next_step(&self) -> f32 {
        if self.max_step.is_nan() || self.max_step <= MIN_STEP {
            return MIN_STEP;
        }
        rand::thread_rng().gen_range(MIN_STEP..=self.max_step)
    }
}

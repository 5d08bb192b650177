// Time-ramped scalar used to soft-start the proportional gain

use crate::config::RampConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RampShape {
    #[default]
    Linear,
}

/// Ramps from `initial` to `final` over a fixed duration counted in samples
#[derive(Debug, Clone)]
pub struct GainRamp {
    initial: f64,
    final_value: f64,
    duration_ms: f64,
    shape: RampShape,
    sample_period_ms: f64,
    /// Sample index the ramp was armed at, `None` until the first reset
    start_index: Option<u64>,
}

impl GainRamp {
    pub fn new(config: &RampConfig, sampling_time: f64) -> Self {
        Self {
            initial: config.initial,
            final_value: config.final_value,
            duration_ms: config.duration_ms,
            shape: RampShape::Linear,
            sample_period_ms: sampling_time * 1000.0,
            start_index: None,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.start_index.is_some()
    }

    /// Restart the ramp from `initial` at `sample_index`
    pub fn reset(&mut self, sample_index: u64) {
        self.start_index = Some(sample_index);
    }

    /// Ramp value at `sample_index`; an unarmed ramp sits at `initial`
    pub fn get_val(&self, sample_index: u64) -> f64 {
        let Some(start) = self.start_index else {
            return self.initial;
        };

        let elapsed_ms = sample_index.saturating_sub(start) as f64 * self.sample_period_ms;
        if elapsed_ms >= self.duration_ms {
            return self.final_value;
        }

        match self.shape {
            RampShape::Linear => {
                let fraction = elapsed_ms / self.duration_ms;
                self.initial + (self.final_value - self.initial) * fraction
            }
        }
    }
}

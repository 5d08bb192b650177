// Single-wheel PIV control law
//
// output = kp * e + ki * ∫e dt + kv * (v_ref - v_filtered) + kff_v * v_ref + kff_a * a_ref
//
// where e is the position error and v_filtered is the low-pass filtered
// measured velocity. The sum is clamped to [output_min, output_max].

use crate::config::PivGains;

/// PIV controller for one wheel
#[derive(Debug, Clone)]
pub struct PivChannel {
    gains: PivGains,
    dt: f64,
    /// Accumulated position error (rad * s)
    integral: f64,
    /// Filtered measured velocity, `None` until the first update after a reset
    filtered_velocity: Option<f64>,
    /// Reference velocity of the previous update, for the acceleration term
    prev_reference: Option<f64>,
}

impl PivChannel {
    pub fn new(gains: PivGains, dt: f64) -> Self {
        Self {
            gains,
            dt,
            integral: 0.0,
            filtered_velocity: None,
            prev_reference: None,
        }
    }

    /// Change the loop gains without touching the controller state
    pub fn set_gains(&mut self, kp: f64, ki: f64, kv: f64) {
        self.gains.kp = kp;
        self.gains.ki = ki;
        self.gains.kv = kv;
    }

    pub fn gains(&self) -> &PivGains {
        &self.gains
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    /// Forget all history. Call on every control discontinuity.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.filtered_velocity = None;
        self.prev_reference = None;
    }

    /// Run one control step and return the clamped duty cycle
    ///
    /// # Arguments
    /// * `actual_velocity` - Measured wheel velocity in rad/s
    /// * `reference_velocity` - Commanded wheel velocity in rad/s
    /// * `position_error` - Reference position minus measured position in rad
    pub fn update(
        &mut self,
        actual_velocity: f64,
        reference_velocity: f64,
        position_error: f64,
    ) -> f64 {
        let g = self.gains;

        let smoothed = match self.filtered_velocity {
            Some(prev) => g.vel_smoothing * prev + (1.0 - g.vel_smoothing) * actual_velocity,
            None => actual_velocity,
        };
        self.filtered_velocity = Some(smoothed);

        let reference_accel = match self.prev_reference {
            Some(prev) => (reference_velocity - prev) / self.dt,
            None => 0.0,
        };
        self.prev_reference = Some(reference_velocity);

        let velocity_term = g.kv * (reference_velocity - smoothed)
            + g.kff_vel * reference_velocity
            + g.kff_acc * reference_accel;

        if !g.position_control {
            return velocity_term.clamp(g.output_min, g.output_max);
        }

        let increment = position_error * self.dt;
        let unsaturated = g.kp * position_error + g.ki * (self.integral + increment) + velocity_term;

        // While saturated only a fraction of the error is accumulated
        if unsaturated > g.output_max || unsaturated < g.output_min {
            self.integral += g.windup_coeff * increment;
        } else {
            self.integral += increment;
        }

        let output = g.kp * position_error + g.ki * self.integral + velocity_term;
        output.clamp(g.output_min, g.output_max)
    }
}

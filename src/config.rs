// Loop timing, topics, controller constants and the loadable controller config
use std::f64::consts::PI;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::control::FRONT_LEFT;

// Runtime loop frequency (must match the status sampling cadence)
pub const LOOP_HZ: u64 = 1000;

// Fixed sampling period used for every integration and finite difference
pub const SAMPLING_TIME: f64 = 0.001;

// A direct wheel command older than this counts as disconnected
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_STATUS: &str = "legwheel/state/wheels"; // encoder samples in
pub const TOPIC_CMD_WHEELS: &str = "legwheel/cmd/wheels"; // per-wheel velocity reference
pub const TOPIC_CMD_MOTION: &str = "legwheel/cmd/motion"; // translation/rotation command
pub const TOPIC_RT_WHEELS: &str = "legwheel/rt/wheels"; // duty-cycle actuation
pub const TOPIC_HEALTH: &str = "legwheel/state/health"; // controller health

// PIV defaults
pub const KP: f64 = 3.80;
pub const KI: f64 = 0.65;
pub const KV: f64 = 0.07;
pub const KFF_VEL: f64 = 1.00;
pub const KFF_ACC: f64 = 0.00;
pub const VEL_SMOOTHING: f64 = 0.6;
pub const OUTPUT_MIN: f64 = -0.6;
pub const OUTPUT_MAX: f64 = 0.6;
pub const WINDUP_COEFF: f64 = 0.06;

// Proportional gain soft start
pub const RAMP_INITIAL: f64 = 0.0;
pub const RAMP_FINAL: f64 = KP;
pub const RAMP_DURATION_MS: f64 = 5000.0;

// Reference commands above this magnitude (rad/s) are rejected
pub const MAX_WHEEL_VELOCITY: f64 = 7.0;

// End-stop calibration
pub const CALIBRATION_DUTY: f64 = 0.1;
pub const CALIBRATION_STILL_TICKS: u32 = 300;
pub const CALIBRATION_EPSILON: f64 = 0.001;
pub const CALIBRATION_TIMEOUT_TICKS: u64 = 120_000;

// Wheel geometry
pub const WHEEL_RADIUS: f64 = 0.18; // meters
pub const ROTATION_RADIUS: f64 = 0.26; // meters (center to wheel contact)

/// Angle between two neighbouring legs of a five-legged wheel
pub const LATTICE_SPACING: f64 = 2.0 * PI / 5.0;
pub const HALF_SPACING: f64 = PI / 5.0;

/// Wheel whose phase every other wheel follows in sync mode
pub const MASTER_WHEEL: usize = FRONT_LEFT;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Gains and limits shared by the four PIV channels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PivGains {
    pub kp: f64,
    pub ki: f64,
    pub kv: f64,
    pub kff_vel: f64,
    pub kff_acc: f64,
    pub vel_smoothing: f64,
    pub output_min: f64,
    pub output_max: f64,
    pub windup_coeff: f64,
    pub position_control: bool,
}

impl Default for PivGains {
    fn default() -> Self {
        Self {
            kp: KP,
            ki: KI,
            kv: KV,
            kff_vel: KFF_VEL,
            kff_acc: KFF_ACC,
            vel_smoothing: VEL_SMOOTHING,
            output_min: OUTPUT_MIN,
            output_max: OUTPUT_MAX,
            windup_coeff: WINDUP_COEFF,
            position_control: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RampConfig {
    pub initial: f64,
    #[serde(rename = "final")]
    pub final_value: f64,
    pub duration_ms: f64,
}

impl Default for RampConfig {
    fn default() -> Self {
        Self {
            initial: RAMP_INITIAL,
            final_value: RAMP_FINAL,
            duration_ms: RAMP_DURATION_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub duty: f64,
    pub still_ticks: u32,
    pub epsilon: f64,
    /// Maximum ticks a single sweep may take; `None` waits forever
    pub timeout_ticks: Option<u64>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            duty: CALIBRATION_DUTY,
            still_ticks: CALIBRATION_STILL_TICKS,
            epsilon: CALIBRATION_EPSILON,
            timeout_ticks: Some(CALIBRATION_TIMEOUT_TICKS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Geometry {
    pub wheel_radius: f64,
    pub rotation_radius: f64,
    pub lattice_spacing: f64,
    pub master_wheel: usize,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            wheel_radius: WHEEL_RADIUS,
            rotation_radius: ROTATION_RADIUS,
            lattice_spacing: LATTICE_SPACING,
            master_wheel: MASTER_WHEEL,
        }
    }
}

/// Everything the drive supervisor needs, fixed for the lifetime of a run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub sampling_time: f64,
    pub max_wheel_velocity: f64,
    pub piv: PivGains,
    pub ramp: RampConfig,
    pub calibration: CalibrationConfig,
    pub geometry: Geometry,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            sampling_time: SAMPLING_TIME,
            max_wheel_velocity: MAX_WHEEL_VELOCITY,
            piv: PivGains::default(),
            ramp: RampConfig::default(),
            calibration: CalibrationConfig::default(),
            geometry: Geometry::default(),
        }
    }
}

impl ControllerConfig {
    /// Load a JSON config file; missing fields keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if !(self.sampling_time > 0.0) {
            return invalid("sampling_time must be positive");
        }
        if !(self.max_wheel_velocity > 0.0) {
            return invalid("max_wheel_velocity must be positive");
        }
        if !(self.piv.output_min < self.piv.output_max) {
            return invalid("piv.output_min must be below piv.output_max");
        }
        if !(0.0..=1.0).contains(&self.piv.windup_coeff) {
            return invalid("piv.windup_coeff must lie in [0, 1]");
        }
        if !(0.0..1.0).contains(&self.piv.vel_smoothing) {
            return invalid("piv.vel_smoothing must lie in [0, 1)");
        }
        if self.ramp.duration_ms < 0.0 {
            return invalid("ramp.duration_ms must not be negative");
        }
        if self.calibration.still_ticks == 0 {
            return invalid("calibration.still_ticks must be at least 1");
        }
        if !(self.geometry.wheel_radius > 0.0) || !(self.geometry.rotation_radius > 0.0) {
            return invalid("geometry radii must be positive");
        }
        if !(self.geometry.lattice_spacing > 0.0) {
            return invalid("geometry.lattice_spacing must be positive");
        }
        if self.geometry.master_wheel >= crate::control::WHEEL_COUNT {
            return invalid("geometry.master_wheel must be a wheel index (0..4)");
        }
        Ok(())
    }
}

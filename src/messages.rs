// Define message types for the runtime

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::control::WHEEL_COUNT;

/// Control mode of a wheel reference or actuator command
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    #[default]
    Velocity,
    Position,
    DutyCycle,
}

/// One encoder sample for a single wheel
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct WheelSample {
    pub position: f64, // rad
    pub sample_index: u64,
}

// Status snapshot from the wheel drivers -> runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Status {
    pub states: [WheelSample; WHEEL_COUNT],
}

impl Status {
    pub fn positions(&self) -> [f64; WHEEL_COUNT] {
        self.states.map(|s| s.position)
    }

    /// True when every wheel carries a newer sample than `previous`
    pub fn advanced_past(&self, previous: &[WheelSample; WHEEL_COUNT]) -> bool {
        self.states
            .iter()
            .zip(previous)
            .all(|(now, before)| now.sample_index > before.sample_index)
    }
}

// Per-wheel velocity reference from planner/teleop -> runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct FourWheelCommand {
    pub mode: [ControlMode; WHEEL_COUNT],
    pub target: [f64; WHEEL_COUNT], // rad/s
    /// All wheels follow the master wheel in phase
    pub sync: bool,
}

impl FourWheelCommand {
    pub fn velocity(target: [f64; WHEEL_COUNT], sync: bool) -> Self {
        Self {
            mode: [ControlMode::Velocity; WHEEL_COUNT],
            target,
            sync,
        }
    }
}

// Combined body command from teleop -> runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct MotionCommand {
    pub translation: f64, // m/s
    pub rotation: f64,    // rad/s
}

// Actuation output from runtime -> wheel drivers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ActuatorCommand {
    pub mode: [ControlMode; WHEEL_COUNT],
    pub target: [f64; WHEEL_COUNT],
    /// Microseconds since the UNIX epoch
    pub timestamp: u64,
}

impl ActuatorCommand {
    pub fn duty_cycle(target: [f64; WHEEL_COUNT]) -> Self {
        Self {
            mode: [ControlMode::DutyCycle; WHEEL_COUNT],
            target,
            timestamp: now_micros(),
        }
    }

    /// Zero duty cycle on every wheel
    pub fn hold() -> Self {
        Self::duty_cycle([0.0; WHEEL_COUNT])
    }

    pub fn is_hold(&self) -> bool {
        self.mode.iter().all(|m| *m == ControlMode::DutyCycle)
            && self.target.iter().all(|t| *t == 0.0)
    }
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ControllerHealth {
    Idle,
    Calibrating,
    Tracking,
    Hold,
    Fault,
}

pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or_default()
}

// End-stop calibration
//
// Each leg set can only swing between two mechanical end-stops whose absolute
// phase is unknown at power-up. The wheels are driven slowly forward until all
// four stall, then backward until all four stall again. The midpoint of the two
// stall positions is the wheel's reference phase for synchronized driving.

use tracing::{info, warn};

use super::{WHEEL_COUNT, WHEEL_NAMES};
use crate::config::CalibrationConfig;
use crate::messages::Status;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepPhase {
    Forward,
    Reverse,
}

/// Travel limits found by a completed calibration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationResult {
    pub init_pos: [f64; WHEEL_COUNT],
    pub final_pos: [f64; WHEEL_COUNT],
    pub mid_pos: [f64; WHEEL_COUNT],
}

/// Outcome of one calibration tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationStep {
    /// Still sweeping, apply these duty cycles
    Sweeping([f64; WHEEL_COUNT]),
    Done(CalibrationResult),
    /// A sweep exceeded the configured tick budget
    TimedOut(SweepPhase),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    ForwardSweep,
    ReverseSweep { init_pos: [f64; WHEEL_COUNT] },
    Done(CalibrationResult),
    Failed(SweepPhase),
}

#[derive(Debug, Clone)]
pub struct Calibration {
    config: CalibrationConfig,
    state: State,
    still_counter: [u32; WHEEL_COUNT],
    last_position: [Option<f64>; WHEEL_COUNT],
    phase_ticks: u64,
}

impl Calibration {
    pub fn new(config: CalibrationConfig) -> Self {
        Self {
            config,
            state: State::ForwardSweep,
            still_counter: [0; WHEEL_COUNT],
            last_position: [None; WHEEL_COUNT],
            phase_ticks: 0,
        }
    }

    pub fn is_calibrated(&self) -> bool {
        matches!(self.state, State::Done(_))
    }

    pub fn has_failed(&self) -> bool {
        matches!(self.state, State::Failed(_))
    }

    pub fn result(&self) -> Option<&CalibrationResult> {
        match &self.state {
            State::Done(result) => Some(result),
            _ => None,
        }
    }

    /// Current sweep direction, `None` once finished or failed
    pub fn phase(&self) -> Option<SweepPhase> {
        match self.state {
            State::ForwardSweep => Some(SweepPhase::Forward),
            State::ReverseSweep { .. } => Some(SweepPhase::Reverse),
            _ => None,
        }
    }

    /// Advance the sweep by one sample
    pub fn step(&mut self, status: &Status) -> CalibrationStep {
        let (phase, duty) = match self.state {
            State::ForwardSweep => (SweepPhase::Forward, self.config.duty),
            State::ReverseSweep { .. } => (SweepPhase::Reverse, -self.config.duty),
            State::Done(result) => return CalibrationStep::Done(result),
            State::Failed(phase) => return CalibrationStep::TimedOut(phase),
        };

        let mut command = [0.0; WHEEL_COUNT];
        let mut reached_maximum = true;

        for (i, sample) in status.states.iter().enumerate() {
            if self.still_counter[i] >= self.config.still_ticks {
                continue; // parked against its end-stop
            }
            command[i] = duty;
            reached_maximum = false;

            let moved = match self.last_position[i] {
                Some(last) => (last - sample.position).abs() >= self.config.epsilon,
                None => true,
            };
            if moved {
                self.still_counter[i] = 0;
            } else {
                self.still_counter[i] += 1;
            }
            self.last_position[i] = Some(sample.position);
        }
        self.phase_ticks += 1;

        if reached_maximum {
            let positions = status.positions();
            match self.state {
                State::ForwardSweep => {
                    info!("Forward calibration sweep done at {:?}", positions);
                    self.state = State::ReverseSweep { init_pos: positions };
                    self.still_counter = [0; WHEEL_COUNT];
                    self.phase_ticks = 0;
                }
                State::ReverseSweep { init_pos } => {
                    let mid_pos: [f64; WHEEL_COUNT] = std::array::from_fn(|i| (init_pos[i] + positions[i]) / 2.0);
                    let result = CalibrationResult {
                        init_pos,
                        final_pos: positions,
                        mid_pos,
                    };
                    for i in 0..WHEEL_COUNT {
                        info!(
                            "Calibrated {}: init={:.4} final={:.4} mid={:.4}",
                            WHEEL_NAMES[i], init_pos[i], positions[i], mid_pos[i]
                        );
                    }
                    self.state = State::Done(result);
                    return CalibrationStep::Done(result);
                }
                _ => {}
            }
        } else if let Some(limit) = self.config.timeout_ticks {
            if self.phase_ticks > limit {
                warn!(
                    "Calibration {:?} sweep did not stall within {} ticks (still counters {:?})",
                    phase, limit, self.still_counter
                );
                self.state = State::Failed(phase);
                return CalibrationStep::TimedOut(phase);
            }
        }

        CalibrationStep::Sweeping(command)
    }
}

// Drive control core for the four-wheeled, five-legged base
//
// Provides:
// - PIV control law per wheel with anti-windup and feed-forward
// - Proportional gain soft-start ramp
// - Velocity -> position reference integration
// - End-stop calibration of each wheel's travel
// - Phase alignment of all wheels onto the master wheel's leg lattice
// - The per-tick drive supervisor tying it all together

pub mod calibration;
pub mod integrator;
pub mod kinematics;
pub mod piv;
pub mod ramp;
pub mod supervisor;
pub mod sync;

pub use calibration::{Calibration, CalibrationResult, CalibrationStep, SweepPhase};
pub use integrator::RefPositionIntegrator;
pub use kinematics::motion_to_four_wheel;
pub use piv::PivChannel;
pub use ramp::{GainRamp, RampShape};
pub use supervisor::{CommandSource, DriveState, DriveSupervisor, Fault};
pub use sync::SyncAligner;

/// Number of driven wheels
pub const WHEEL_COUNT: usize = 4;

/// Wheel indices as wired on the motor driver board
pub const REAR_LEFT: usize = 0;
pub const REAR_RIGHT: usize = 1;
pub const FRONT_RIGHT: usize = 2;
pub const FRONT_LEFT: usize = 3;

pub const LEFT_WHEELS: [usize; 2] = [FRONT_LEFT, REAR_LEFT];
pub const RIGHT_WHEELS: [usize; 2] = [FRONT_RIGHT, REAR_RIGHT];

pub const WHEEL_NAMES: [&str; WHEEL_COUNT] = ["rear-left", "rear-right", "front-right", "front-left"];

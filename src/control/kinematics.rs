// Differential-drive kinematics for the four-wheeled base
// Converts a body command (translation, rotation) into per-wheel velocity references.

use super::{LEFT_WHEELS, RIGHT_WHEELS, WHEEL_COUNT};
use crate::config::Geometry;
use crate::messages::{FourWheelCommand, MotionCommand};

/// Rotation rates at or below this (rad/s) count as straight driving
pub const SYNC_ROTATION_THRESHOLD: f64 = 0.1;

/// Convert a body command into wheel velocities (rad/s)
///
/// Left wheels turn at `fwd - diff`, right wheels at `fwd + diff`, with
/// `fwd = translation / wheel_radius` and
/// `diff = rotation * rotation_radius / wheel_radius`.
/// Near-straight commands request synchronized driving.
pub fn motion_to_four_wheel(cmd: &MotionCommand, geometry: &Geometry) -> FourWheelCommand {
    let fwd_velocity = cmd.translation / geometry.wheel_radius;
    let differential = cmd.rotation * geometry.rotation_radius / geometry.wheel_radius;

    let mut target = [0.0; WHEEL_COUNT];
    for i in LEFT_WHEELS {
        target[i] = fwd_velocity - differential;
    }
    for i in RIGHT_WHEELS {
        target[i] = fwd_velocity + differential;
    }

    FourWheelCommand::velocity(target, cmd.rotation.abs() <= SYNC_ROTATION_THRESHOLD)
}

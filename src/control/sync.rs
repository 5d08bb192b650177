// Phase alignment for synchronized driving
//
// Every wheel carries five legs, so its positions repeat every 2π/5. In sync
// mode the front-right and rear-left wheels run half a leg spacing out of
// phase with the master (front-left) while rear-right runs in phase with it.
// On entry to sync mode each wheel's reference is moved to the lattice point
// that restores this pattern with the smallest rotation.

use super::{FRONT_LEFT, FRONT_RIGHT, REAR_LEFT, REAR_RIGHT, WHEEL_COUNT};

/// Phase relation of a wheel to the master wheel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseRole {
    Master,
    InPhase,
    HalfPeriod,
}

/// Position relative to the wheel's midpoint split into whole periods and a residual
///
/// Periods are cut toward zero, so the residual lies in `(-spacing, spacing)`
/// and keeps the sign of the offset from the midpoint.
fn split_periods(position: f64, mid: f64, spacing: f64) -> (f64, f64) {
    let delta = position - mid;
    let periods = (delta / spacing).trunc();
    (periods, delta - periods * spacing)
}

#[derive(Debug, Clone)]
pub struct SyncAligner {
    spacing: f64,
    master: usize,
    roles: [PhaseRole; WHEEL_COUNT],
}

impl SyncAligner {
    pub fn new(spacing: f64, master: usize) -> Self {
        Self::with_roles(spacing, master, roles_for_master(master))
    }

    pub fn with_roles(spacing: f64, master: usize, roles: [PhaseRole; WHEEL_COUNT]) -> Self {
        Self {
            spacing,
            master,
            roles,
        }
    }

    /// Master wheel's signed phase offset from its midpoint, within one period
    pub fn master_phase(&self, positions: &[f64; WHEEL_COUNT], mid_pos: &[f64; WHEEL_COUNT]) -> f64 {
        split_periods(positions[self.master], mid_pos[self.master], self.spacing).1
    }

    /// Reference positions that phase-lock every wheel to the master
    ///
    /// # Arguments
    /// * `positions` - Measured wheel positions in rad
    /// * `mid_pos` - Calibrated midpoint of each wheel in rad
    pub fn align(&self, positions: &[f64; WHEEL_COUNT], mid_pos: &[f64; WHEEL_COUNT]) -> [f64; WHEEL_COUNT] {
        let half = self.spacing / 2.0;
        let delta_master = self.master_phase(positions, mid_pos);

        std::array::from_fn(|i| {
            let (periods, delta) = split_periods(positions[i], mid_pos[i], self.spacing);
            let base = mid_pos[i] + periods * self.spacing + delta_master;
            match self.roles[i] {
                PhaseRole::Master => positions[i],
                PhaseRole::InPhase => base,
                // Ties (|delta| == |delta_master|) take the + branch
                PhaseRole::HalfPeriod if delta.abs() >= delta_master.abs() => base + half,
                PhaseRole::HalfPeriod => base - half,
            }
        })
    }
}

/// Roles for an arbitrary master: the diagonal partner runs in phase, the other two are offset
pub fn roles_for_master(master: usize) -> [PhaseRole; WHEEL_COUNT] {
    let diagonal = match master {
        FRONT_LEFT => REAR_RIGHT,
        REAR_RIGHT => FRONT_LEFT,
        FRONT_RIGHT => REAR_LEFT,
        _ => FRONT_RIGHT,
    };
    std::array::from_fn(|i| {
        if i == master {
            PhaseRole::Master
        } else if i == diagonal {
            PhaseRole::InPhase
        } else {
            PhaseRole::HalfPeriod
        }
    })
}

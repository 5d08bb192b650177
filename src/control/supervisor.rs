// Per-tick drive supervisor
//
// Owns the four PIV channels, reference integrators, gain ramp and calibration,
// and sequences them once per sample: command selection, sync handling,
// calibration, input validation, loop (re)seeding and steady-state tracking.
// Every anomaly degrades to the hold command (zero duty cycle on all wheels).

use tracing::{debug, info, warn};

use super::calibration::{Calibration, CalibrationResult, CalibrationStep, SweepPhase};
use super::integrator::RefPositionIntegrator;
use super::kinematics::motion_to_four_wheel;
use super::piv::PivChannel;
use super::ramp::GainRamp;
use super::sync::SyncAligner;
use super::WHEEL_COUNT;
use crate::config::ControllerConfig;
use crate::messages::{
    ActuatorCommand, ControlMode, ControllerHealth, FourWheelCommand, MotionCommand, Status,
    WheelSample,
};

/// Where this tick's velocity reference comes from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandSource {
    /// Direct per-wheel reference (takes priority while connected)
    Wheels(FourWheelCommand),
    /// Body command converted through the drive kinematics
    Motion(MotionCommand),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// A calibration sweep never stalled against its end-stops
    CalibrationTimeout(SweepPhase),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriveState {
    /// Started or reset; the next valid tick re-seeds the loop
    FirstRun,
    /// Sweeping the wheels against their end-stops
    Calibrating,
    /// Closed-loop tracking, with the samples used on the previous tick
    Tracking { previous: [WheelSample; WHEEL_COUNT] },
    /// Holding after an invalid reference; re-seeds on the next valid tick
    SafeStop,
    /// Latched until the controller is restarted
    Fault(Fault),
}

pub struct DriveSupervisor {
    config: ControllerConfig,
    channels: [PivChannel; WHEEL_COUNT],
    integrators: [RefPositionIntegrator; WHEEL_COUNT],
    ramp: GainRamp,
    calibration: Calibration,
    aligner: SyncAligner,
    state: DriveState,
    sync_prev: bool,
    health: ControllerHealth,
}

impl DriveSupervisor {
    pub fn new(config: ControllerConfig) -> Self {
        let channel = PivChannel::new(config.piv, config.sampling_time);
        Self {
            channels: std::array::from_fn(|_| channel.clone()),
            integrators: Default::default(),
            ramp: GainRamp::new(&config.ramp, config.sampling_time),
            calibration: Calibration::new(config.calibration),
            aligner: SyncAligner::new(
                config.geometry.lattice_spacing,
                config.geometry.master_wheel,
            ),
            state: DriveState::FirstRun,
            sync_prev: false,
            health: ControllerHealth::Idle,
            config,
        }
    }

    /// Bring the controller to its initial state, discarding calibration
    pub fn on_start(&mut self) {
        info!(
            "Drive supervisor starting: master wheel {}, {}s sampling period",
            self.config.geometry.master_wheel, self.config.sampling_time
        );
        *self = Self::new(self.config);
    }

    /// Zero duty on every wheel; the loop re-seeds when ticks resume
    pub fn on_stop(&mut self) -> ActuatorCommand {
        info!("Drive supervisor stopping, holding all wheels");
        self.request_reseed();
        self.health = ControllerHealth::Idle;
        ActuatorCommand::hold()
    }

    /// Run one control tick
    ///
    /// Returns `None` when no status sample is available (or the sample is
    /// not newer than the last one used); the previous command then stays in
    /// effect at the transport.
    pub fn on_tick(
        &mut self,
        status: Option<&Status>,
        source: &CommandSource,
    ) -> Option<ActuatorCommand> {
        let status = status?;
        if let DriveState::Tracking { previous } = &self.state {
            if !status.advanced_past(previous) {
                debug!("Status sample did not advance, skipping tick");
                return None;
            }
        }

        let mut reference = self.resolve_reference(source);
        let index = status.states[self.config.geometry.master_wheel].sample_index;

        if !self.ramp.is_armed() {
            self.ramp.reset(index);
        }
        if reference.sync != self.sync_prev {
            info!("Sync mode {}", if reference.sync { "engaged" } else { "released" });
            self.ramp.reset(index);
            self.request_reseed();
        }
        self.sync_prev = reference.sync;

        if let DriveState::Fault(_) = self.state {
            self.health = ControllerHealth::Fault;
            return Some(ActuatorCommand::hold());
        }

        if reference.sync && !self.calibration.is_calibrated() {
            match self.calibration.step(status) {
                CalibrationStep::Sweeping(duty) => {
                    if self.state != DriveState::Calibrating {
                        info!("Calibrating wheel travel limits");
                    }
                    self.state = DriveState::Calibrating;
                    self.health = ControllerHealth::Calibrating;
                    return Some(ActuatorCommand::duty_cycle(duty));
                }
                CalibrationStep::Done(_) => {
                    info!("Calibration complete");
                    self.state = DriveState::FirstRun;
                }
                CalibrationStep::TimedOut(phase) => {
                    warn!("Calibration failed in {:?} sweep, latching fault", phase);
                    self.state = DriveState::Fault(Fault::CalibrationTimeout(phase));
                    self.health = ControllerHealth::Fault;
                    return Some(ActuatorCommand::hold());
                }
            }
        }

        if !self.valid_input(&reference) {
            if self.state != DriveState::SafeStop {
                warn!(
                    "Invalid wheel reference (modes {:?}, targets {:?}), holding",
                    reference.mode, reference.target
                );
            }
            self.state = DriveState::SafeStop;
            self.health = ControllerHealth::Hold;
            return Some(ActuatorCommand::hold());
        }

        let previous = match self.state {
            DriveState::Tracking { previous } => previous,
            _ => return Some(self.reseed(status, &reference)),
        };

        if reference.sync {
            let master_target = reference.target[self.config.geometry.master_wheel];
            reference.target = [master_target; WHEEL_COUNT];
        }

        let dt = self.config.sampling_time;
        let kp = self.ramp.get_val(index);
        let mut duty = [0.0; WHEEL_COUNT];

        for (i, sample) in status.states.iter().enumerate() {
            let elapsed = (sample.sample_index - previous[i].sample_index) as f64 * dt;
            let actual_velocity = (sample.position - previous[i].position) / elapsed;
            let reference_position = self.integrators[i].update(reference.target[i]);
            let position_error = reference_position - sample.position;

            self.channels[i].set_gains(kp, self.config.piv.ki, self.config.piv.kv);
            duty[i] = self.channels[i].update(actual_velocity, reference.target[i], position_error);
        }

        self.state = DriveState::Tracking {
            previous: status.states,
        };
        self.health = ControllerHealth::Tracking;
        Some(ActuatorCommand::duty_cycle(duty))
    }

    pub fn state(&self) -> DriveState {
        self.state
    }

    /// Health of the most recent tick
    pub fn health(&self) -> ControllerHealth {
        self.health
    }

    pub fn calibration(&self) -> Option<&CalibrationResult> {
        self.calibration.result()
    }

    pub fn ramp(&self) -> &GainRamp {
        &self.ramp
    }

    pub fn reference_positions(&self) -> [f64; WHEEL_COUNT] {
        std::array::from_fn(|i| self.integrators[i].position())
    }

    pub fn reference_velocities(&self) -> [f64; WHEEL_COUNT] {
        std::array::from_fn(|i| self.integrators[i].velocity())
    }

    fn resolve_reference(&self, source: &CommandSource) -> FourWheelCommand {
        match source {
            CommandSource::Wheels(cmd) => *cmd,
            CommandSource::Motion(cmd) => motion_to_four_wheel(cmd, &self.config.geometry),
        }
    }

    fn valid_input(&self, reference: &FourWheelCommand) -> bool {
        reference
            .mode
            .iter()
            .zip(&reference.target)
            .all(|(mode, target)| {
                *mode == ControlMode::Velocity && target.abs() <= self.config.max_wheel_velocity
            })
    }

    fn request_reseed(&mut self) {
        if !matches!(self.state, DriveState::Fault(_)) {
            self.state = DriveState::FirstRun;
        }
    }

    /// Seed integrators and clear the PIV channels, holding for this tick
    fn reseed(&mut self, status: &Status, reference: &FourWheelCommand) -> ActuatorCommand {
        let measured = status.positions();
        let seeds = match (reference.sync, self.calibration.result()) {
            (true, Some(cal)) => self.aligner.align(&measured, &cal.mid_pos),
            _ => measured,
        };
        debug!("Seeding reference positions {:?} (sync={})", seeds, reference.sync);

        for i in 0..WHEEL_COUNT {
            self.integrators[i].init(self.config.sampling_time, 0.0, seeds[i]);
            self.channels[i].reset();
        }

        self.state = DriveState::Tracking {
            previous: status.states,
        };
        self.health = ControllerHealth::Tracking;
        ActuatorCommand::hold()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CalibrationConfig;
    use crate::control::{FRONT_LEFT, FRONT_RIGHT, REAR_LEFT, REAR_RIGHT};

    /// Four wheels whose velocity equals the applied duty (rad/s per unit duty)
    struct Plant {
        position: [f64; WHEEL_COUNT],
        lower: [f64; WHEEL_COUNT],
        upper: [f64; WHEEL_COUNT],
        index: u64,
    }

    impl Plant {
        fn free(position: [f64; WHEEL_COUNT]) -> Self {
            Self {
                position,
                lower: [f64::NEG_INFINITY; WHEEL_COUNT],
                upper: [f64::INFINITY; WHEEL_COUNT],
                index: 1,
            }
        }

        fn with_stops() -> Self {
            Self {
                position: [0.0, 0.2, -0.1, 0.3],
                lower: [-0.8, -0.6, -0.7, -0.5],
                upper: [0.9, 0.7, 0.6, 1.1],
                index: 1,
            }
        }

        fn status(&self) -> Status {
            Status {
                states: std::array::from_fn(|i| WheelSample {
                    position: self.position[i],
                    sample_index: self.index,
                }),
            }
        }

        /// Advance one tick; calibration duty of 0.1 moves 0.01 rad per tick
        fn apply(&mut self, cmd: &ActuatorCommand) {
            for i in 0..WHEEL_COUNT {
                let moved = self.position[i] + cmd.target[i] * 0.1;
                self.position[i] = moved.clamp(self.lower[i], self.upper[i]);
            }
            self.index += 1;
        }

        fn release_stops(&mut self) {
            self.lower = [f64::NEG_INFINITY; WHEEL_COUNT];
            self.upper = [f64::INFINITY; WHEEL_COUNT];
        }
    }

    fn config() -> ControllerConfig {
        ControllerConfig {
            calibration: CalibrationConfig {
                still_ticks: 20,
                ..CalibrationConfig::default()
            },
            ..ControllerConfig::default()
        }
    }

    fn wheels(target: [f64; WHEEL_COUNT], sync: bool) -> CommandSource {
        CommandSource::Wheels(FourWheelCommand::velocity(target, sync))
    }

    fn started() -> DriveSupervisor {
        let mut sup = DriveSupervisor::new(config());
        sup.on_start();
        sup
    }

    /// Run synchronized calibration to completion on a plant with end-stops
    fn calibrated() -> (DriveSupervisor, Plant) {
        let mut sup = started();
        let mut plant = Plant::with_stops();
        let source = wheels([0.0; WHEEL_COUNT], true);

        for _ in 0..5000 {
            let cmd = sup.on_tick(Some(&plant.status()), &source).unwrap();
            plant.apply(&cmd);
            if sup.calibration().is_some() {
                plant.release_stops();
                return (sup, plant);
            }
        }
        panic!("Calibration did not complete");
    }

    #[test]
    fn test_first_tick_holds_and_seeds_measured() {
        let mut sup = started();
        let plant = Plant::free([0.1, 0.2, 0.3, 0.4]);

        let cmd = sup
            .on_tick(Some(&plant.status()), &wheels([1.0; WHEEL_COUNT], false))
            .unwrap();
        assert!(cmd.is_hold());
        assert_eq!(sup.reference_positions(), [0.1, 0.2, 0.3, 0.4]);
        assert!(matches!(sup.state(), DriveState::Tracking { .. }));
    }

    #[test]
    fn test_missing_status_skips_tick() {
        let mut sup = started();
        let mut plant = Plant::free([0.0; WHEEL_COUNT]);
        let source = wheels([0.5; WHEEL_COUNT], false);
        for _ in 0..3 {
            let cmd = sup.on_tick(Some(&plant.status()), &source).unwrap();
            plant.apply(&cmd);
        }

        let state = sup.state();
        let refs = sup.reference_positions();
        assert_eq!(sup.on_tick(None, &source), None);
        assert_eq!(sup.state(), state);
        assert_eq!(sup.reference_positions(), refs);
    }

    #[test]
    fn test_stale_status_skips_tick() {
        let mut sup = started();
        let plant = Plant::free([0.0; WHEEL_COUNT]);
        let source = wheels([0.5; WHEEL_COUNT], false);

        assert!(sup.on_tick(Some(&plant.status()), &source).is_some());
        // Same sample again: nothing to difference against
        assert_eq!(sup.on_tick(Some(&plant.status()), &source), None);
    }

    #[test]
    fn test_invalid_reference_holds() {
        let mut sup = started();
        let mut plant = Plant::free([0.0; WHEEL_COUNT]);
        for _ in 0..3 {
            let cmd = sup
                .on_tick(Some(&plant.status()), &wheels([0.5; WHEEL_COUNT], false))
                .unwrap();
            plant.apply(&cmd);
        }

        let mut target = [0.5; WHEEL_COUNT];
        target[REAR_RIGHT] = 8.0;
        let cmd = sup.on_tick(Some(&plant.status()), &wheels(target, false)).unwrap();
        assert!(cmd.is_hold());
        assert_eq!(cmd.mode, [ControlMode::DutyCycle; WHEEL_COUNT]);
        assert_eq!(sup.state(), DriveState::SafeStop);
        assert_eq!(sup.health(), ControllerHealth::Hold);

        // Recovery re-seeds from the measured position with one hold tick
        plant.apply(&cmd);
        plant.position = [1.0, 2.0, 3.0, 4.0];
        let cmd = sup
            .on_tick(Some(&plant.status()), &wheels([0.5; WHEEL_COUNT], false))
            .unwrap();
        assert!(cmd.is_hold());
        assert_eq!(sup.reference_positions(), [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_wrong_mode_is_invalid() {
        let mut sup = started();
        let plant = Plant::free([0.0; WHEEL_COUNT]);
        let mut cmd = FourWheelCommand::velocity([0.1; WHEEL_COUNT], false);
        cmd.mode[FRONT_RIGHT] = ControlMode::Position;

        let out = sup.on_tick(Some(&plant.status()), &CommandSource::Wheels(cmd)).unwrap();
        assert!(out.is_hold());
        assert_eq!(sup.state(), DriveState::SafeStop);
    }

    #[test]
    fn test_calibration_runs_only_in_sync() {
        let mut sup = started();
        let mut plant = Plant::with_stops();

        sup.on_tick(Some(&plant.status()), &wheels([0.0; WHEEL_COUNT], false));
        assert!(matches!(sup.state(), DriveState::Tracking { .. }));

        plant.index += 1;
        let cmd = sup
            .on_tick(Some(&plant.status()), &wheels([0.0; WHEEL_COUNT], true))
            .unwrap();
        assert_eq!(sup.state(), DriveState::Calibrating);
        assert_eq!(sup.health(), ControllerHealth::Calibrating);
        assert_eq!(cmd.target, [0.1; WHEEL_COUNT]);
        assert_eq!(cmd.mode, [ControlMode::DutyCycle; WHEEL_COUNT]);
    }

    #[test]
    fn test_calibration_completes_and_reseeds() {
        let (sup, _) = calibrated();
        let cal = sup.calibration().unwrap();
        for i in 0..WHEEL_COUNT {
            assert_eq!(cal.init_pos[i], Plant::with_stops().upper[i]);
            assert_eq!(cal.mid_pos[i], (cal.init_pos[i] + cal.final_pos[i]) / 2.0);
        }
        assert!(matches!(sup.state(), DriveState::Tracking { .. }));
    }

    #[test]
    fn test_sync_engage_reseeds_on_lattice() {
        let (mut sup, mut plant) = calibrated();
        let mids = sup.calibration().unwrap().mid_pos;

        // Drive unsynchronized for a while
        for _ in 0..50 {
            let cmd = sup
                .on_tick(Some(&plant.status()), &wheels([0.2, 0.3, -0.1, 0.25], false))
                .unwrap();
            plant.apply(&cmd);
        }
        plant.position = [0.9, -2.3, 4.4, 1.7];

        let cmd = sup
            .on_tick(Some(&plant.status()), &wheels([0.0; WHEEL_COUNT], true))
            .unwrap();
        assert!(cmd.is_hold());
        assert_eq!(sup.ramp().get_val(plant.index), 0.0);

        let expected = SyncAligner::new(crate::config::LATTICE_SPACING, FRONT_LEFT)
            .align(&plant.position, &mids);
        assert_eq!(sup.reference_positions(), expected);
        assert_ne!(sup.reference_positions(), plant.position);
    }

    #[test]
    fn test_sync_locks_to_master_target() {
        let (mut sup, mut plant) = calibrated();
        let mut target = [0.5, -1.0, 3.0, 0.0];
        target[FRONT_LEFT] = 2.0;

        for _ in 0..10 {
            let cmd = sup.on_tick(Some(&plant.status()), &wheels(target, true)).unwrap();
            plant.apply(&cmd);
        }
        assert_eq!(sup.reference_velocities(), [2.0; WHEEL_COUNT]);
    }

    #[test]
    fn test_motion_command_source() {
        let mut sup = started();
        let mut plant = Plant::free([0.0; WHEEL_COUNT]);
        let source = CommandSource::Motion(MotionCommand {
            translation: 0.0,
            rotation: 0.5,
        });

        for _ in 0..5 {
            let cmd = sup.on_tick(Some(&plant.status()), &source).unwrap();
            plant.apply(&cmd);
        }
        let v = sup.reference_velocities();
        assert!(v[FRONT_LEFT] < 0.0 && v[REAR_LEFT] < 0.0);
        assert!(v[FRONT_RIGHT] > 0.0 && v[REAR_RIGHT] > 0.0);
        assert!(sup.calibration().is_none(), "Turning must not trigger calibration");
    }

    #[test]
    fn test_tracks_constant_velocity() {
        let mut sup = started();
        // Velocity = duty (rad/s per unit duty), no end-stops
        let mut plant = Plant::free([0.0; WHEEL_COUNT]);
        let source = wheels([0.4; WHEEL_COUNT], false);

        for _ in 0..2001 {
            let cmd = sup.on_tick(Some(&plant.status()), &source).unwrap();
            for i in 0..WHEEL_COUNT {
                assert!(cmd.target[i].abs() <= 0.6);
                plant.position[i] += cmd.target[i] * 0.001;
            }
            plant.index += 1;
        }
        for p in plant.position {
            assert!((p - 0.8).abs() < 0.05, "Wheel at {} instead of ~0.8", p);
        }
    }

    #[test]
    fn test_calibration_timeout_latches_fault() {
        let mut cfg = config();
        cfg.calibration.timeout_ticks = Some(100);
        let mut sup = DriveSupervisor::new(cfg);
        sup.on_start();
        let mut plant = Plant::free([0.0; WHEEL_COUNT]); // no stops: never stalls
        let source = wheels([0.0; WHEEL_COUNT], true);

        let mut cmd = sup.on_tick(Some(&plant.status()), &source).unwrap();
        for _ in 0..200 {
            plant.apply(&cmd);
            cmd = sup.on_tick(Some(&plant.status()), &source).unwrap();
        }
        assert_eq!(
            sup.state(),
            DriveState::Fault(Fault::CalibrationTimeout(SweepPhase::Forward))
        );
        assert!(cmd.is_hold());

        // Still latched without sync
        plant.apply(&cmd);
        let cmd = sup
            .on_tick(Some(&plant.status()), &wheels([1.0; WHEEL_COUNT], false))
            .unwrap();
        assert!(cmd.is_hold());
        assert_eq!(sup.health(), ControllerHealth::Fault);

        sup.on_start();
        assert_eq!(sup.state(), DriveState::FirstRun);
    }

    #[test]
    fn test_stop_holds_and_reseeds() {
        let mut sup = started();
        let mut plant = Plant::free([0.0; WHEEL_COUNT]);
        let source = wheels([1.0; WHEEL_COUNT], false);
        for _ in 0..10 {
            let cmd = sup.on_tick(Some(&plant.status()), &source).unwrap();
            plant.apply(&cmd);
        }

        let cmd = sup.on_stop();
        assert!(cmd.is_hold());
        assert_eq!(sup.state(), DriveState::FirstRun);
        assert_eq!(sup.health(), ControllerHealth::Idle);
    }
}

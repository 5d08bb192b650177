// 1 kHz host loop around the drive supervisor
// Note: the loop never blocks on input. Missing status skips the tick, a
// silent direct wheel command falls back to the motion command.

use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{info, warn};

// local imports
use crate::config::{
    ControllerConfig, CMD_TIMEOUT, LOOP_HZ, TOPIC_CMD_MOTION, TOPIC_CMD_WHEELS, TOPIC_HEALTH,
    TOPIC_RT_WHEELS, TOPIC_STATUS,
};
use crate::control::supervisor::{CommandSource, DriveSupervisor};
use crate::messages::{ActuatorCommand, ControllerHealth, FourWheelCommand, MotionCommand, Status};

pub struct Runtime {
    supervisor: DriveSupervisor,
    latest_status: Option<Status>,
    wheel_cmd: Option<FourWheelCommand>,
    wheel_cmd_received_at: Instant,
    motion_cmd: MotionCommand,
    wheels_connected: bool,
}

impl Runtime {
    pub fn new(config: ControllerConfig) -> Self {
        let mut supervisor = DriveSupervisor::new(config);
        supervisor.on_start();
        Self {
            supervisor,
            latest_status: None,
            wheel_cmd: None,
            wheel_cmd_received_at: Instant::now(),
            motion_cmd: MotionCommand::default(),
            wheels_connected: false,
        }
    }

    /// Store a status sample for the next tick (latest wins)
    pub fn on_status(&mut self, status: Status) {
        self.latest_status = Some(status);
    }

    pub fn on_wheel_command(&mut self, cmd: FourWheelCommand) {
        self.wheel_cmd = Some(cmd);
        self.wheel_cmd_received_at = Instant::now();
    }

    pub fn on_motion_command(&mut self, cmd: MotionCommand) {
        self.motion_cmd = cmd;
    }

    /// Direct wheel command while fresh, the last motion command otherwise
    fn command_source(&mut self) -> CommandSource {
        let fresh = self
            .wheel_cmd
            .filter(|_| self.wheel_cmd_received_at.elapsed() <= CMD_TIMEOUT);

        if fresh.is_some() != self.wheels_connected {
            self.wheels_connected = fresh.is_some();
            if self.wheels_connected {
                info!("Direct wheel command connected");
            } else {
                warn!("Direct wheel command lost, using motion command");
            }
        }

        match fresh {
            Some(cmd) => CommandSource::Wheels(cmd),
            None => CommandSource::Motion(self.motion_cmd),
        }
    }

    /// Run one control tick; each status sample is consumed at most once
    pub fn tick(&mut self) -> Option<ActuatorCommand> {
        let status = self.latest_status.take();
        let source = self.command_source();
        self.supervisor.on_tick(status.as_ref(), &source)
    }

    pub fn stop(&mut self) -> ActuatorCommand {
        self.supervisor.on_stop()
    }

    pub fn health(&self) -> ControllerHealth {
        self.supervisor.health()
    }
}

/// Parse a JSON payload, logging instead of failing on bad input
fn parse<T: serde::de::DeserializeOwned>(payload: &[u8], what: &str) -> Option<T> {
    match serde_json::from_slice::<T>(payload) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Failed to parse {}: {}", what, e);
            None
        }
    }
}

pub async fn run(config: ControllerConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_status = session.declare_subscriber(TOPIC_STATUS).await?;
    let sub_wheels = session.declare_subscriber(TOPIC_CMD_WHEELS).await?;
    let sub_motion = session.declare_subscriber(TOPIC_CMD_MOTION).await?;
    let pub_actuation = session.declare_publisher(TOPIC_RT_WHEELS).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut runtime = Runtime::new(config);
    let mut tick = interval(Duration::from_micros(1_000_000 / LOOP_HZ));
    let mut last_health = None;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        "Runtime started: {}Hz loop, {}ms wheel command timeout",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}, {}, {}", TOPIC_STATUS, TOPIC_CMD_WHEELS, TOPIC_CMD_MOTION);
    info!("Publishing to: {}, {}", TOPIC_RT_WHEELS, TOPIC_HEALTH);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut shutdown => {
                info!("Shutdown requested");
                let hold = serde_json::to_string(&runtime.stop())?;
                pub_actuation.put(hold).await?;
                pub_health.put(serde_json::to_string(&runtime.health())?).await?;
                return Ok(());
            }
        }

        // 1. Drain all pending samples and commands (non-blocking), keep latest
        while let Ok(Some(sample)) = sub_status.try_recv() {
            if let Some(status) = parse(&sample.payload().to_bytes(), "status") {
                runtime.on_status(status);
            }
        }
        while let Ok(Some(sample)) = sub_wheels.try_recv() {
            if let Some(cmd) = parse(&sample.payload().to_bytes(), "wheel command") {
                runtime.on_wheel_command(cmd);
            }
        }
        while let Ok(Some(sample)) = sub_motion.try_recv() {
            if let Some(cmd) = parse(&sample.payload().to_bytes(), "motion command") {
                runtime.on_motion_command(cmd);
            }
        }

        // 2. Run the controller; no status means no command this tick
        if let Some(actuation) = runtime.tick() {
            let actuation_json = serde_json::to_string(&actuation)?;
            pub_actuation.put(actuation_json).await?;
        }

        // 3. Publish health every tick
        let health = runtime.health();
        if last_health != Some(health) {
            info!("Controller health: {:?}", health);
            last_health = Some(health);
        }
        pub_health.put(serde_json::to_string(&health)?).await?;
    }
}

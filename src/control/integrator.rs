// Integrates a velocity reference into a position reference (explicit Euler)

#[derive(Debug, Clone, Default)]
pub struct RefPositionIntegrator {
    dt: f64,
    velocity: f64,
    position: f64,
}

impl RefPositionIntegrator {
    /// Re-seed the integrator. Must be called whenever tracking resumes.
    pub fn init(&mut self, dt: f64, initial_velocity: f64, initial_position: f64) {
        self.dt = dt;
        self.velocity = initial_velocity;
        self.position = initial_position;
    }

    /// Advance by one sampling period at `target_velocity`, returning the new reference position
    pub fn update(&mut self, target_velocity: f64) -> f64 {
        self.velocity = target_velocity;
        self.position += target_velocity * self.dt;
        self.position
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }
}

//! In-process simulation drivers for running without physical hardware.
//!
//! [`SimRegistry`] builds a [`SwitchRegistry`] pre-populated with stub
//! switches; [`SimSensor`] produces uniformly distributed readings.
//!
//! # Example
//!
//! ```rust
//! use belt_hal::sim::SimRegistry;
//! use belt_types::{SwitchCommand, SwitchState};
//!
//! let mut registry = SimRegistry::new().with_switch("Fan").build();
//!
//! registry
//!     .apply(&SwitchCommand { actuator: "fan".into(), state: SwitchState::On })
//!     .expect("sim switch must succeed");
//! ```

use belt_types::{BeltError, SensorReading, SwitchState};
use rand::Rng;

use crate::registry::SwitchRegistry;
use crate::sensor::Sensor;
use crate::switch::Switch;

// ────────────────────────────────────────────────────────────────────────────
// Stub switch
// ────────────────────────────────────────────────────────────────────────────

/// A simulated on/off actuator that records its state.  Starts `Off` and
/// always succeeds.
pub struct SimSwitch {
    name: String,
    state: SwitchState,
}

impl SimSwitch {
    pub fn new(name: impl Into<String>) -> Box<Self> {
        Box::new(Self {
            name: name.into(),
            state: SwitchState::Off,
        })
    }
}

impl Switch for SimSwitch {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_state(&mut self, state: SwitchState) -> Result<(), BeltError> {
        self.state = state;
        Ok(())
    }

    fn state(&self) -> SwitchState {
        self.state
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stub sensor
// ────────────────────────────────────────────────────────────────────────────

/// A simulated sensor returning a uniform random value in `[min, max]`,
/// rounded to two decimals.
pub struct SimSensor {
    name: String,
    min: f64,
    max: f64,
}

impl SimSensor {
    /// Bounds given in the wrong order are swapped.
    pub fn new(name: impl Into<String>, min: f64, max: f64) -> Box<Self> {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Box::new(Self {
            name: name.into(),
            min,
            max,
        })
    }
}

impl Sensor for SimSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self) -> Result<SensorReading, BeltError> {
        let raw: f64 = rand::rng().random_range(self.min..=self.max);
        Ok(SensorReading {
            name: self.name.clone(),
            value: (raw * 100.0).round() / 100.0,
        })
    }
}

/// The sensors of the reference rig: temperature in `[30, 100]` and pressure
/// in `[10, 200]`.
pub fn default_sensors() -> Vec<Box<dyn Sensor>> {
    vec![
        SimSensor::new("Temperature", 30.0, 100.0),
        SimSensor::new("Pressure", 10.0, 200.0),
    ]
}

// ────────────────────────────────────────────────────────────────────────────
// SimRegistry builder
// ────────────────────────────────────────────────────────────────────────────

/// Builder that constructs a [`SwitchRegistry`] populated with simulated
/// switches.
#[derive(Default)]
pub struct SimRegistry {
    switches: Vec<Box<dyn Switch>>,
}

impl SimRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches of the reference rig: `Fan` and `Valve`.
    pub fn with_default_rig(self) -> Self {
        self.with_switch("Fan").with_switch("Valve")
    }

    /// Register a simulated switch called `name`.
    pub fn with_switch(mut self, name: impl Into<String>) -> Self {
        self.switches.push(SimSwitch::new(name));
        self
    }

    /// Register a custom switch driver.
    pub fn with_driver(mut self, switch: Box<dyn Switch>) -> Self {
        self.switches.push(switch);
        self
    }

    /// Consume the builder and return the configured [`SwitchRegistry`].
    pub fn build(self) -> SwitchRegistry {
        let mut registry = SwitchRegistry::new();
        for s in self.switches {
            registry.register(s);
        }
        registry
    }
}

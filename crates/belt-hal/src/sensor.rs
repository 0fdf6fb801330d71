//! Generic `Sensor` trait for scalar readings consumed by the control loop.

use belt_types::{BeltError, SensorReading};

/// A source of scalar readings (temperature, pressure, …).
pub trait Sensor: Send + Sync {
    fn name(&self) -> &str;

    /// Take one reading.
    ///
    /// # Errors
    ///
    /// Returns [`BeltError::HardwareFault`] when the sensor cannot be read.
    fn read(&mut self) -> Result<SensorReading, BeltError>;
}

//! Generic `Conveyor` trait and the simulated [`ConveyorBelt`].
//!
//! The rest of the system only talks to the trait, so a real motor driver can
//! replace the simulation without touching interpretation logic.

use belt_types::{BeltError, ParsedAction};
use tracing::info;

/// Rate the belt starts at before any adjustment.
pub const DEFAULT_RATE: f64 = 1.0;

/// A belt-style actuator that can be started, stopped and re-rated.
///
/// Every operation returns a human-readable confirmation.
pub trait Conveyor: Send + Sync {
    /// Start moving.
    ///
    /// # Errors
    ///
    /// Returns [`BeltError::HardwareFault`] if the drive cannot be engaged.
    fn begin(&mut self) -> Result<String, BeltError>;

    /// Stop moving.
    ///
    /// # Errors
    ///
    /// Returns [`BeltError::HardwareFault`] if the drive cannot be released.
    fn halt(&mut self) -> Result<String, BeltError>;

    /// Change the belt rate to `value`.
    ///
    /// # Errors
    ///
    /// Returns [`BeltError::HardwareFault`] when `value` is outside what the
    /// drive accepts.
    fn set_rate(&mut self, value: f64) -> Result<String, BeltError>;

    fn is_running(&self) -> bool;

    fn rate(&self) -> f64;
}

/// In-process conveyor belt.  Records state, never touches hardware.
#[derive(Debug)]
pub struct ConveyorBelt {
    running: bool,
    rate: f64,
}

impl Default for ConveyorBelt {
    fn default() -> Self {
        Self {
            running: false,
            rate: DEFAULT_RATE,
        }
    }
}

impl ConveyorBelt {
    /// A stopped belt at [`DEFAULT_RATE`].
    pub fn new() -> Self {
        Self::default()
    }
}

impl Conveyor for ConveyorBelt {
    fn begin(&mut self) -> Result<String, BeltError> {
        self.running = true;
        info!(rate = self.rate, "conveyor belt started");
        Ok("Conveyor belt started".to_string())
    }

    fn halt(&mut self) -> Result<String, BeltError> {
        self.running = false;
        info!("conveyor belt stopped");
        Ok("Conveyor belt stopped".to_string())
    }

    fn set_rate(&mut self, value: f64) -> Result<String, BeltError> {
        // Negative and non-finite rates have no physical meaning for the sim.
        if !value.is_finite() || value < 0.0 {
            return Err(BeltError::HardwareFault {
                component: "conveyor_belt".to_string(),
                details: format!("Invalid speed value: {value}"),
            });
        }
        self.rate = value;
        info!(rate = value, "conveyor belt speed adjusted");
        Ok(format!("Conveyor belt speed adjusted to {value}"))
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn rate(&self) -> f64 {
        self.rate
    }
}

/// Route a classified action onto `conveyor` and return its confirmation.
///
/// # Errors
///
/// - [`BeltError::Interpretation`] for [`ParsedAction::Error`].
/// - [`BeltError::UnknownCommand`] for [`ParsedAction::Unclassified`].
/// - Whatever the conveyor itself reports for the executable variants.
pub fn dispatch(conveyor: &mut dyn Conveyor, action: &ParsedAction) -> Result<String, BeltError> {
    match action {
        ParsedAction::Start => conveyor.begin(),
        ParsedAction::Stop => conveyor.halt(),
        ParsedAction::AdjustSpeed(value) => conveyor.set_rate(*value),
        ParsedAction::Error(err) => Err(BeltError::Interpretation(err.clone())),
        ParsedAction::Unclassified(text) => Err(BeltError::UnknownCommand(text.clone())),
    }
}

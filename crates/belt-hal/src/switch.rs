//! Generic `Switch` trait for named on/off actuators (fans, valves, heaters,
//! …).

use belt_types::{BeltError, SwitchState};

/// A discrete on/off actuator.
///
/// Drivers implement this trait and register themselves with a
/// [`SwitchRegistry`][crate::registry::SwitchRegistry].
pub trait Switch: Send + Sync {
    /// Display name of this actuator, e.g. `"Fan"`.  Lookups are
    /// case-insensitive.
    fn name(&self) -> &str;

    /// Drive the actuator to `state`.
    ///
    /// # Errors
    ///
    /// Returns [`BeltError::HardwareFault`] if the command cannot be applied.
    fn set_state(&mut self, state: SwitchState) -> Result<(), BeltError>;

    /// Current state.
    fn state(&self) -> SwitchState;
}

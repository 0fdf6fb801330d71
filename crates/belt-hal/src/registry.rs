//! [`SwitchRegistry`] – named actuator registry and command applier.
//!
//! Model replies name actuators loosely (`fan=on`, `FAN=ON`), so the registry
//! keys every switch by its lower-cased name and resolves commands the same
//! way.  Commands naming an unregistered actuator are skipped, not fatal.

use std::collections::HashMap;

use belt_types::{BeltError, SwitchCommand, SwitchState};
use tracing::{info, warn};

use crate::switch::Switch;

/// A command that reached a registered switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedCommand {
    /// Registered display name of the switch.
    pub actuator: String,
    pub state: SwitchState,
}

/// Central on/off actuator registry.
#[derive(Default)]
pub struct SwitchRegistry {
    switches: HashMap<String, Box<dyn Switch>>,
}

impl SwitchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a switch.  Any previously registered switch whose name
    /// matches case-insensitively is replaced.
    pub fn register(&mut self, switch: Box<dyn Switch>) {
        self.switches.insert(switch.name().to_lowercase(), switch);
    }

    pub fn len(&self) -> usize {
        self.switches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.switches.is_empty()
    }

    /// Current state of the switch called `name`, if registered.
    pub fn state(&self, name: &str) -> Option<SwitchState> {
        self.switches.get(&name.to_lowercase()).map(|s| s.state())
    }

    /// Apply a single command.
    ///
    /// # Errors
    ///
    /// Returns [`BeltError::HardwareFault`] when the actuator is not
    /// registered or the driver rejects the command.
    pub fn apply(&mut self, command: &SwitchCommand) -> Result<AppliedCommand, BeltError> {
        match self.switches.get_mut(&command.actuator.to_lowercase()) {
            Some(switch) => {
                switch.set_state(command.state)?;
                info!(actuator = switch.name(), state = %command.state, "actuator set");
                Ok(AppliedCommand {
                    actuator: switch.name().to_string(),
                    state: command.state,
                })
            }
            None => Err(BeltError::HardwareFault {
                component: command.actuator.clone(),
                details: format!("actuator '{}' is not registered", command.actuator),
            }),
        }
    }

    /// Apply every command in order, logging and skipping the ones that
    /// fail.  Returns the commands that took effect.
    pub fn apply_all(&mut self, commands: &[SwitchCommand]) -> Vec<AppliedCommand> {
        commands
            .iter()
            .filter_map(|cmd| match self.apply(cmd) {
                Ok(applied) => Some(applied),
                Err(e) => {
                    warn!(error = %e, "skipping actuator command");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimSwitch;

    fn cmd(actuator: &str, state: SwitchState) -> SwitchCommand {
        SwitchCommand {
            actuator: actuator.to_string(),
            state,
        }
    }

    #[test]
    fn apply_resolves_name_case_insensitively() {
        let mut registry = SwitchRegistry::new();
        registry.register(SimSwitch::new("Fan"));

        let applied = registry.apply(&cmd("FAN", SwitchState::On)).unwrap();
        assert_eq!(applied.actuator, "Fan");
        assert_eq!(registry.state("fan"), Some(SwitchState::On));
    }

    #[test]
    fn apply_missing_switch_returns_error() {
        let mut registry = SwitchRegistry::new();
        let result = registry.apply(&cmd("Pump", SwitchState::On));
        assert!(matches!(result, Err(BeltError::HardwareFault { .. })));
    }

    #[test]
    fn apply_all_skips_unknown_actuators() {
        let mut registry = SwitchRegistry::new();
        registry.register(SimSwitch::new("Fan"));
        registry.register(SimSwitch::new("Valve"));

        let applied = registry.apply_all(&[
            cmd("Fan", SwitchState::On),
            cmd("Heater", SwitchState::On),
            cmd("valve", SwitchState::Off),
        ]);

        assert_eq!(applied.len(), 2);
        assert_eq!(registry.state("Fan"), Some(SwitchState::On));
        assert_eq!(registry.state("Valve"), Some(SwitchState::Off));
        assert_eq!(registry.state("Heater"), None);
    }

    #[test]
    fn re_registering_replaces_old_driver() {
        let mut registry = SwitchRegistry::new();
        registry.register(SimSwitch::new("Fan"));
        registry.apply(&cmd("Fan", SwitchState::On)).unwrap();

        registry.register(SimSwitch::new("fan"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.state("Fan"), Some(SwitchState::Off));
    }
}

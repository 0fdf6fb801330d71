//! `belt-hal` – simulated hardware for the conveyor line.
//!
//! # Modules
//!
//! - [`conveyor`] – the [`Conveyor`][conveyor::Conveyor] trait, the simulated
//!   [`ConveyorBelt`][conveyor::ConveyorBelt], and
//!   [`dispatch`][conveyor::dispatch], which routes a
//!   [`ParsedAction`][belt_types::ParsedAction] onto a conveyor.
//! - [`switch`] – the [`Switch`][switch::Switch] trait for named on/off
//!   actuators (fans, valves, …).
//! - [`registry`] – [`SwitchRegistry`][registry::SwitchRegistry]: resolves
//!   actuator names case-insensitively and applies
//!   [`SwitchCommand`][belt_types::SwitchCommand]s.
//! - [`sensor`] – the [`Sensor`][sensor::Sensor] trait.
//! - [`sim`] – stub switches and sensors plus a builder for headless runs.

pub mod conveyor;
pub mod registry;
pub mod sensor;
pub mod sim;
pub mod switch;

pub use conveyor::{Conveyor, ConveyorBelt, dispatch};
pub use registry::{AppliedCommand, SwitchRegistry};
pub use sensor::Sensor;
pub use sim::{SimRegistry, SimSensor, SimSwitch};
pub use switch::Switch;

//! `belt-runtime` – model service plumbing and command interpretation.
//!
//! # Modules
//!
//! - [`backend`] – the [`ModelBackend`][backend::ModelBackend] trait and
//!   [`OllamaClient`][backend::OllamaClient], a reqwest client for Ollama's
//!   `/api/tags`, `/api/generate` and `/api/pull`.
//! - [`bootstrap`] – [`ServiceBootstrapper`][bootstrap::ServiceBootstrapper]:
//!   waits, with bounded retries, until the model is installed and answers a
//!   probe prompt.  Startup must not continue if it gives up.
//! - [`interpreter`] – [`CommandInterpreter`][interpreter::CommandInterpreter]:
//!   turns free-text operator commands into a
//!   [`ParsedAction`][belt_types::ParsedAction] using a fixed prompt and a
//!   keyword table with explicit priority (start > stop > speed).
//! - [`chat_driver`] – [`ChatDriver`][chat_driver::ChatDriver]: an
//!   OpenAI-compatible chat-completions client.
//! - [`control_loop`] – [`ControlLoop`][control_loop::ControlLoop]: reads
//!   sensors, asks the chat model for `Name=STATE` commands, and drives
//!   named on/off actuators.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: console
//!   logging plus optional OTLP span export.

pub mod backend;
pub mod bootstrap;
pub mod chat_driver;
pub mod control_loop;
pub mod interpreter;
pub mod telemetry;

#[cfg(test)]
mod fake;

pub use backend::{BackendError, GenerationOptions, ModelBackend, ModelInfo, OllamaClient};
pub use bootstrap::{BootstrapError, Readiness, RetryPolicy, ServiceBootstrapper};
pub use chat_driver::{ChatBackend, ChatDriver, ChatMessage, Role};
pub use control_loop::{ControlLoop, ControlLoopConfig, TickReport};
pub use interpreter::{CommandInterpreter, classify};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifies the language-model backend: where it lives and which model to
/// ask.  Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEndpoint {
    base_url: String,
    model: String,
}

impl ModelEndpoint {
    /// Create an endpoint for `model` served at `base_url`
    /// (e.g. `"http://localhost:11434"`).  A trailing `/` is stripped.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Bare model name, as used for pull requests (e.g. `"phi"`).
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Model name as listed by the backend and used for generation.  Names
    /// without an explicit tag resolve to `:latest`.
    pub fn tagged_model(&self) -> String {
        if self.model.contains(':') {
            self.model.clone()
        } else {
            format!("{}:latest", self.model)
        }
    }

    /// Join `path` (e.g. `"/api/tags"`) onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Reasons an interpretation produced no usable action.
///
/// Rendered messages are part of the operator-facing contract and must stay
/// stable.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InterpretError {
    /// A single model call exceeded its deadline.
    #[error("Request timed out")]
    TransportTimeout,

    /// Connection-level failure reaching the model service.
    #[error("Could not connect to model service")]
    TransportUnreachable,

    /// The backend answered with a non-success status.
    #[error("{status} - {body}")]
    BackendRejected { status: u16, body: String },

    /// The backend answered, but with nothing after trimming.
    #[error("Empty response from model")]
    EmptyResponse,

    /// Anything else that went wrong while talking to the backend.
    #[error("{0}")]
    Unexpected(String),
}

/// The closed action grammar produced by the command interpreter.
///
/// One value is created per interpretation and consumed immediately by the
/// caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload")]
pub enum ParsedAction {
    /// Start the belt.
    Start,
    /// Stop the belt.
    Stop,
    /// Change the belt rate.  Not range-checked here.
    AdjustSpeed(f64),
    /// The model could not be asked, or answered with nothing usable.
    Error(InterpretError),
    /// The model answered with text matching no known keyword.
    Unclassified(String),
}

impl ParsedAction {
    /// `true` for the three variants an actuator can execute.
    pub fn is_actionable(&self) -> bool {
        matches!(
            self,
            ParsedAction::Start | ParsedAction::Stop | ParsedAction::AdjustSpeed(_)
        )
    }
}

impl fmt::Display for ParsedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParsedAction::Start => write!(f, "START"),
            ParsedAction::Stop => write!(f, "STOP"),
            ParsedAction::AdjustSpeed(value) => write!(f, "ADJUST_SPEED {value}"),
            ParsedAction::Error(err) => write!(f, "Error: {err}"),
            ParsedAction::Unclassified(text) => write!(f, "{text}"),
        }
    }
}

/// Desired state of a named on/off actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwitchState {
    On,
    Off,
}

impl SwitchState {
    /// Parse `ON` / `OFF` in any letter case.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.eq_ignore_ascii_case("on") {
            Some(SwitchState::On)
        } else if raw.eq_ignore_ascii_case("off") {
            Some(SwitchState::Off)
        } else {
            None
        }
    }

    pub fn is_on(self) -> bool {
        self == SwitchState::On
    }
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchState::On => write!(f, "ON"),
            SwitchState::Off => write!(f, "OFF"),
        }
    }
}

/// One `Name=STATE` instruction extracted from a model reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchCommand {
    pub actuator: String,
    pub state: SwitchState,
}

/// A single sensor value, rounded to two decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub name: String,
    pub value: f64,
}

/// All sensor values gathered in one control-loop tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub taken_at: DateTime<Utc>,
    pub readings: Vec<SensorReading>,
}

impl SensorSnapshot {
    pub fn new(readings: Vec<SensorReading>) -> Self {
        Self {
            taken_at: Utc::now(),
            readings,
        }
    }
}

impl fmt::Display for SensorSnapshot {
    /// Renders as `{'Temperature': 42.17, 'Pressure': 101.5}`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, r) in self.readings.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "'{}': {}", r.name, r.value)?;
        }
        write!(f, "}}")
    }
}

/// Workspace-wide error type spanning interpretation, hardware, configuration
/// and bootstrap failures.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum BeltError {
    #[error("Error: {0}")]
    Interpretation(InterpretError),

    #[error("Unknown command")]
    UnknownCommand(String),

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Model service not ready: {0}")]
    Bootstrap(String),

    #[error("Server Error: {0}")]
    Server(String),
}

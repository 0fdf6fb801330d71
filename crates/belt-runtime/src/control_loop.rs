//! [`ControlLoop`] – sensor readings in, actuator switches out.
//!
//! Each tick reads every sensor, asks a chat model what to do with the named
//! actuators, extracts every `Name=STATE` pair from the reply, and applies the
//! ones naming a registered actuator with a valid `ON`/`OFF` state.  A model
//! failure yields an empty tick; the loop carries on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use belt_hal::{AppliedCommand, Sensor, SwitchRegistry};
use belt_types::{SensorSnapshot, SwitchCommand, SwitchState};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::chat_driver::{ChatBackend, ChatMessage};

static COMMAND_PAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+)=(\w+)").expect("command pattern is valid"));

const SYSTEM_PROMPT: &str =
    "You are a control system for managing actuators based on sensor values.";

/// Extract `Name=STATE` pairs from a reply.  Pairs whose state is not
/// `ON`/`OFF` are dropped.
pub fn parse_switch_commands(reply: &str) -> Vec<SwitchCommand> {
    COMMAND_PAIR
        .captures_iter(reply)
        .filter_map(|caps| {
            let actuator = &caps[1];
            let raw_state = &caps[2];
            match SwitchState::parse(raw_state) {
                Some(state) => Some(SwitchCommand {
                    actuator: actuator.to_string(),
                    state,
                }),
                None => {
                    debug!(actuator, state = raw_state, "ignoring unknown actuator state");
                    None
                }
            }
        })
        .collect()
}

/// Build the user prompt for one snapshot.
pub fn build_readings_prompt(snapshot: &SensorSnapshot, actuators: &[String]) -> String {
    let mut prompt = format!(
        "Here are the sensor readings: {snapshot}. Provide commands for actuators in the \
         format: 'Actuator1=ON, Actuator2=OFF'. No other suggestion needed. Just send the \
         commands of actuators."
    );
    if !actuators.is_empty() {
        prompt.push_str(&format!(" Available actuators: {}.", actuators.join(", ")));
    }
    prompt
}

/// Tunables for [`ControlLoop`].
#[derive(Debug, Clone)]
pub struct ControlLoopConfig {
    /// Pause between ticks.
    pub interval: Duration,
    /// Actuator names advertised to the model.
    pub actuator_names: Vec<String>,
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            actuator_names: vec!["Fan".to_string(), "Valve".to_string()],
        }
    }
}

/// Outcome of one tick.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub snapshot: SensorSnapshot,
    /// Raw model reply; `None` when the model could not be asked.
    pub reply: Option<String>,
    pub applied: Vec<AppliedCommand>,
}

/// Sensor-driven actuator loop.
pub struct ControlLoop {
    sensors: Vec<Box<dyn Sensor>>,
    switches: SwitchRegistry,
    chat: Arc<dyn ChatBackend>,
    config: ControlLoopConfig,
}

impl ControlLoop {
    pub fn new(
        sensors: Vec<Box<dyn Sensor>>,
        switches: SwitchRegistry,
        chat: Arc<dyn ChatBackend>,
        config: ControlLoopConfig,
    ) -> Self {
        Self {
            sensors,
            switches,
            chat,
            config,
        }
    }

    pub fn switches(&self) -> &SwitchRegistry {
        &self.switches
    }

    /// Run one read → ask → apply cycle.
    pub async fn tick(&mut self) -> TickReport {
        let readings = self
            .sensors
            .iter_mut()
            .filter_map(|s| match s.read() {
                Ok(r) => Some(r),
                Err(e) => {
                    warn!(sensor = s.name(), error = %e, "sensor read failed");
                    None
                }
            })
            .collect();
        let snapshot = SensorSnapshot::new(readings);
        info!(readings = %snapshot, "sensor readings");

        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_readings_prompt(&snapshot, &self.config.actuator_names)),
        ];
        let reply = match self.chat.complete(&messages).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "chat request failed");
                return TickReport {
                    snapshot,
                    reply: None,
                    applied: Vec::new(),
                };
            }
        };
        info!(%reply, "model response");

        let commands = parse_switch_commands(&reply);
        let applied = self.switches.apply_all(&commands);
        TickReport {
            snapshot,
            reply: Some(reply),
            applied,
        }
    }

    /// Tick until `shutdown` is set or, when given, `max_ticks` ticks have
    /// run.  Returns the number of ticks executed.
    pub async fn run(&mut self, shutdown: Arc<AtomicBool>, max_ticks: Option<u64>) -> u64 {
        let mut ticks = 0;
        while !shutdown.load(Ordering::SeqCst) {
            if max_ticks.is_some_and(|max| ticks >= max) {
                break;
            }
            self.tick().await;
            ticks += 1;
            tokio::time::sleep(self.config.interval).await;
        }
        info!(ticks, "control loop stopped");
        ticks
    }
}

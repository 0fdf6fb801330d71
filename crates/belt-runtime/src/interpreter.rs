//! [`CommandInterpreter`] – free text in, [`ParsedAction`] out.
//!
//! The interpreter wraps the operator's command in a fixed prompt, asks the
//! model once, and classifies the reply with [`classify`]:
//!
//! 1. Empty after trimming → [`InterpretError::EmptyResponse`].
//! 2. Keywords are tried in [`KEYWORD_PRIORITY`] order (start, stop, speed),
//!    case-insensitively, anywhere in the reply.  The first hit wins, so a
//!    reply mentioning both "start" and "speed" starts the belt.
//! 3. "speed" needs a digit run somewhere in the reply; the first run becomes
//!    the [`ParsedAction::AdjustSpeed`] value.  Without one it falls through.
//! 4. Nothing matched → [`ParsedAction::Unclassified`] with the trimmed text.
//!
//! Transport failures become [`ParsedAction::Error`]; nothing escapes
//! [`CommandInterpreter::interpret`], not even a panicking backend.
//!
//! # Example
//!
//! ```rust
//! use belt_runtime::interpreter::classify;
//! use belt_types::ParsedAction;
//!
//! assert_eq!(classify("I will START the belt now"), ParsedAction::Start);
//! assert_eq!(
//!     classify("please ADJUST_SPEED to 42 units"),
//!     ParsedAction::AdjustSpeed(42.0)
//! );
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use belt_types::{InterpretError, ParsedAction};
use futures_util::FutureExt;
use regex::Regex;
use tracing::{Instrument, Span, debug, error, info, info_span};

use crate::backend::{GENERATE_TIMEOUT, ModelBackend};

/// Command embedded in the bootstrap probe prompt.
pub const PROBE_COMMAND: &str = "test";

/// Keywords in the order they are tried.
pub const KEYWORD_PRIORITY: [Keyword; 3] = [Keyword::Start, Keyword::Stop, Keyword::Speed];

static DIGIT_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+").expect("digit-run pattern is valid"));

/// A reply keyword and the action it selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Start,
    Stop,
    Speed,
}

impl Keyword {
    /// Lower-case text searched for in the reply.
    pub fn needle(self) -> &'static str {
        match self {
            Keyword::Start => "start",
            Keyword::Stop => "stop",
            Keyword::Speed => "speed",
        }
    }
}

/// Build the prompt for `command`.  The command is embedded verbatim.
pub fn build_prompt(command: &str) -> String {
    format!(
        "Task: Parse the following command for a conveyor belt system.\n\
         Command: {command}\n\
         Please respond with one of these actions: START, STOP, or ADJUST_SPEED with value.\n\
         Response:"
    )
}

/// Classify a raw model reply.  Total: every input maps to some action.
pub fn classify(reply: &str) -> ParsedAction {
    let action = reply.trim();
    if action.is_empty() {
        return ParsedAction::Error(InterpretError::EmptyResponse);
    }

    let lowered = action.to_lowercase();
    for keyword in KEYWORD_PRIORITY {
        if !lowered.contains(keyword.needle()) {
            continue;
        }
        match keyword {
            Keyword::Start => return ParsedAction::Start,
            Keyword::Stop => return ParsedAction::Stop,
            Keyword::Speed => {
                if let Some(value) = first_number(action) {
                    return ParsedAction::AdjustSpeed(value);
                }
            }
        }
    }

    ParsedAction::Unclassified(action.to_string())
}

// First ASCII digit run.  Runs too long for a finite f64 count as absent.
fn first_number(text: &str) -> Option<f64> {
    DIGIT_RUN
        .find(text)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "model backend panicked".to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CommandInterpreter
// ─────────────────────────────────────────────────────────────────────────────

/// Stateless command interpreter.  Share one instance behind an `Arc` across
/// request handlers.
pub struct CommandInterpreter {
    backend: Arc<dyn ModelBackend>,
    request_timeout: Duration,
    span: Span,
}

impl CommandInterpreter {
    /// Interpreter over `backend` with the default 30 s request deadline.
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        let span = info_span!("interpreter", model = %backend.endpoint().model());
        Self {
            backend,
            request_timeout: GENERATE_TIMEOUT,
            span,
        }
    }

    /// Override the per-request deadline (builder-style).
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Log under `span` instead of the default `interpreter` span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Interpret one raw operator command.
    ///
    /// Never fails: every outcome, including transport errors, is a
    /// [`ParsedAction`].
    pub async fn interpret(&self, command: &str) -> ParsedAction {
        let span = info_span!(parent: &self.span, "interpret");
        async {
            let prompt = build_prompt(command);
            debug!(%prompt, "sending prompt to model");

            let call = AssertUnwindSafe(self.backend.generate(&prompt)).catch_unwind();
            let action = match tokio::time::timeout(self.request_timeout, call).await {
                Err(_) => ParsedAction::Error(InterpretError::TransportTimeout),
                Ok(Err(payload)) => ParsedAction::Error(InterpretError::Unexpected(
                    panic_message(payload.as_ref()),
                )),
                Ok(Ok(Err(e))) => ParsedAction::Error(e.into()),
                Ok(Ok(Ok(reply))) => {
                    info!(raw = %reply.trim(), "raw model response");
                    classify(&reply)
                }
            };

            match &action {
                ParsedAction::Error(e) => error!(error = %e, "interpretation failed"),
                other => info!(action = %other, "command interpreted"),
            }
            action
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use crate::fake::{FakeBackend, SpanLog};
    use proptest::prelude::*;

    fn interpreter(backend: FakeBackend) -> CommandInterpreter {
        CommandInterpreter::new(Arc::new(backend))
    }

    // ── classify ─────────────────────────────────────────────────────────

    #[test]
    fn reference_replies() {
        assert_eq!(classify("I will START the belt now"), ParsedAction::Start);
        assert_eq!(
            classify("please ADJUST_SPEED to 42 units"),
            ParsedAction::AdjustSpeed(42.0)
        );
        assert_eq!(
            classify(""),
            ParsedAction::Error(InterpretError::EmptyResponse)
        );
        assert_eq!(
            classify("I'm not sure what you mean"),
            ParsedAction::Unclassified("I'm not sure what you mean".into())
        );
    }

    #[test]
    fn whitespace_only_reply_is_empty() {
        assert_eq!(
            classify(" \n\t "),
            ParsedAction::Error(InterpretError::EmptyResponse)
        );
    }

    #[test]
    fn start_outranks_stop_and_speed() {
        assert_eq!(classify("STOP, then start at speed 5"), ParsedAction::Start);
        assert_eq!(classify("stop and set speed 9"), ParsedAction::Stop);
    }

    #[test]
    fn speed_uses_first_digit_run_only() {
        assert_eq!(
            classify("speed 12 then 34"),
            ParsedAction::AdjustSpeed(12.0)
        );
        assert_eq!(classify("3 is the speed"), ParsedAction::AdjustSpeed(3.0));
        assert_eq!(classify("SPEED: 2.5"), ParsedAction::AdjustSpeed(2.0));
    }

    #[test]
    fn speed_without_digits_is_unclassified() {
        assert_eq!(
            classify("ADJUST_SPEED please"),
            ParsedAction::Unclassified("ADJUST_SPEED please".into())
        );
    }

    #[test]
    fn unrepresentable_digit_run_is_unclassified() {
        let reply = format!("speed {}", "9".repeat(400));
        assert!(matches!(classify(&reply), ParsedAction::Unclassified(_)));
    }

    #[test]
    fn unclassified_carries_trimmed_text() {
        assert_eq!(
            classify("  maybe later  "),
            ParsedAction::Unclassified("maybe later".into())
        );
    }

    #[test]
    fn prompt_embeds_command_verbatim() {
        let prompt = build_prompt("go \"faster\"\nnow");
        assert!(prompt.starts_with("Task: Parse the following command"));
        assert!(prompt.contains("Command: go \"faster\"\nnow\n"));
        assert!(prompt.ends_with("Response:"));
    }

    proptest! {
        #[test]
        fn classify_is_total(reply in "\\PC*") {
            let action = classify(&reply);
            if reply.trim().is_empty() {
                prop_assert_eq!(action, ParsedAction::Error(InterpretError::EmptyResponse));
            } else {
                prop_assert!(!matches!(action, ParsedAction::Error(_)));
            }
        }

        #[test]
        fn any_start_mention_starts(
            pre in "\\PC{0,30}",
            post in "\\PC{0,30}",
            kw in prop::sample::select(vec!["start", "START", "StArT"]),
        ) {
            let reply = format!("{pre}{kw}{post}");
            prop_assert_eq!(classify(&reply), ParsedAction::Start);
        }

        #[test]
        fn speed_takes_first_digit_run(
            pre in "[a-e ]{0,20}",
            mid in "[a-e ]{0,20}",
            value in 0u32..1_000_000,
            post in "[a-e0-9 ]{0,20}",
        ) {
            let reply = format!("{pre}speed{mid} {value} {post}");
            prop_assert_eq!(classify(&reply), ParsedAction::AdjustSpeed(f64::from(value)));
        }
    }

    // ── CommandInterpreter ───────────────────────────────────────────────

    #[tokio::test]
    async fn interpret_classifies_model_reply() {
        let interp = interpreter(FakeBackend::new("phi").with_reply("  STOP  "));
        assert_eq!(interp.interpret("halt the line").await, ParsedAction::Stop);
    }

    #[tokio::test]
    async fn interpret_is_idempotent_for_identical_replies() {
        let interp = interpreter(FakeBackend::new("phi").with_reply("ADJUST_SPEED 7"));
        let first = interp.interpret("go to seven").await;
        let second = interp.interpret("go to seven").await;
        assert_eq!(first, second);
        assert_eq!(first, ParsedAction::AdjustSpeed(7.0));
    }

    #[tokio::test]
    async fn interpret_empty_command_still_asks_model() {
        let backend = Arc::new(FakeBackend::new("phi").with_reply("hmm"));
        let interp = CommandInterpreter::new(backend.clone());
        assert_eq!(
            interp.interpret("").await,
            ParsedAction::Unclassified("hmm".into())
        );
        assert_eq!(FakeBackend::calls(&backend.generate_calls), 1);
    }

    #[tokio::test]
    async fn interpret_hanging_backend_times_out() {
        let interp = interpreter(
            FakeBackend::new("phi")
                .with_reply("START")
                .with_generate_delay(Duration::from_secs(5)),
        )
        .with_request_timeout(Duration::from_millis(50));

        let action = interp.interpret("start").await;
        assert_eq!(action, ParsedAction::Error(InterpretError::TransportTimeout));
        assert_eq!(action.to_string(), "Error: Request timed out");
    }

    #[tokio::test]
    async fn interpret_unreachable_backend() {
        let interp = interpreter(FakeBackend::new("phi").unreachable());
        let action = interp.interpret("start").await;
        assert_eq!(action.to_string(), "Error: Could not connect to model service");
    }

    #[tokio::test]
    async fn interpret_rejected_request_embeds_status_and_body() {
        let interp = interpreter(FakeBackend::new("phi").with_failure(BackendError::Rejected {
            status: 500,
            body: "out of memory".into(),
        }));
        let action = interp.interpret("start").await;
        assert_eq!(action.to_string(), "Error: 500 - out of memory");
    }

    #[tokio::test]
    async fn interpret_empty_reply() {
        let interp = interpreter(FakeBackend::new("phi").with_reply("   "));
        assert_eq!(
            interp.interpret("start").await.to_string(),
            "Error: Empty response from model"
        );
    }

    #[tokio::test]
    async fn interpret_contains_backend_panic() {
        let interp = interpreter(FakeBackend::new("phi").panicking());
        assert_eq!(
            interp.interpret("start").await,
            ParsedAction::Error(InterpretError::Unexpected("backend exploded".into()))
        );
    }

    #[tokio::test]
    async fn interpret_nests_under_supplied_span() {
        let (log, _guard) = SpanLog::install();
        let interp = interpreter(FakeBackend::new("phi").with_reply("STOP"))
            .with_span(tracing::info_span!("serve"));

        assert_eq!(interp.interpret("halt").await, ParsedAction::Stop);
        assert_eq!(log.parent_of("interpret").as_deref(), Some("serve"));
    }

    #[tokio::test]
    async fn interpret_runs_concurrently_without_shared_state() {
        let interp = Arc::new(interpreter(FakeBackend::new("phi").with_reply("start")));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let interp = Arc::clone(&interp);
                tokio::spawn(async move { interp.interpret(&format!("command {i}")).await })
            })
            .collect();
        for h in handles {
            assert_eq!(h.await.unwrap(), ParsedAction::Start);
        }
    }
}

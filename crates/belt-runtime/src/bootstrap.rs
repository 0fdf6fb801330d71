//! [`ServiceBootstrapper`] – blocks startup until the model service is usable.
//!
//! Each attempt:
//!
//! 1. lists the installed models;
//! 2. if the target model is installed, sends the canonical probe prompt and
//!    succeeds on the first non-empty reply;
//! 3. if it is missing, asks the service to pull it (best effort);
//! 4. on any failure, waits `retry_delay` and tries again.
//!
//! After `max_retries` failed attempts the bootstrapper gives up with
//! [`BootstrapError::Exhausted`].  Callers must treat that as fatal.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use belt_types::BeltError;
use thiserror::Error;
use tracing::{Instrument, Span, error, info, info_span, warn};

use crate::backend::{BackendError, ModelBackend, ModelInfo};
use crate::interpreter::{PROBE_COMMAND, build_prompt};

/// Errors raised while waiting for the model service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BootstrapError {
    #[error("Could not initialize model service after {attempts} attempts")]
    Exhausted { attempts: u32 },

    #[error("invalid retry policy: {0}")]
    InvalidPolicy(String),
}

impl From<BootstrapError> for BeltError {
    fn from(e: BootstrapError) -> Self {
        match e {
            BootstrapError::InvalidPolicy(msg) => BeltError::Config(msg),
            exhausted => BeltError::Bootstrap(exhausted.to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Retry policy
// ─────────────────────────────────────────────────────────────────────────────

/// How often and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: NonZeroU32,
    retry_delay: Duration,
}

impl RetryPolicy {
    /// # Errors
    ///
    /// Returns [`BootstrapError::InvalidPolicy`] when `max_retries` or
    /// `retry_delay` is zero.
    pub fn new(max_retries: u32, retry_delay: Duration) -> Result<Self, BootstrapError> {
        let max_retries = NonZeroU32::new(max_retries)
            .ok_or_else(|| BootstrapError::InvalidPolicy("max_retries must be positive".into()))?;
        if retry_delay.is_zero() {
            return Err(BootstrapError::InvalidPolicy(
                "retry_delay must be positive".into(),
            ));
        }
        Ok(Self {
            max_retries,
            retry_delay,
        })
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries.get()
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }
}

impl Default for RetryPolicy {
    /// Five attempts, ten seconds apart.
    fn default() -> Self {
        Self {
            max_retries: NonZeroU32::new(5).unwrap_or(NonZeroU32::MIN),
            retry_delay: Duration::from_secs(10),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bootstrapper
// ─────────────────────────────────────────────────────────────────────────────

/// Proof that the model answered the probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readiness {
    /// Attempt (1-based) on which the probe succeeded.
    pub attempts: u32,
}

/// What a single attempt found.
#[derive(Debug)]
enum Attempt {
    Ready,
    ProbeFailed,
    ModelMissing,
    ListFailed(BackendError),
}

/// Waits for the backend to list, load, and answer with the target model.
pub struct ServiceBootstrapper {
    backend: Arc<dyn ModelBackend>,
    policy: RetryPolicy,
    probe_timeout: Duration,
    span: Span,
}

impl ServiceBootstrapper {
    pub fn new(backend: Arc<dyn ModelBackend>, policy: RetryPolicy) -> Self {
        let endpoint = backend.endpoint();
        let span = info_span!(
            "bootstrap",
            base_url = %endpoint.base_url(),
            model = %endpoint.model()
        );
        Self {
            backend,
            policy,
            probe_timeout: crate::backend::GENERATE_TIMEOUT,
            span,
        }
    }

    /// Deadline for each probe generation (builder-style).
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Log under `span` instead of the default `bootstrap` span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Block until the model answers the probe, or the retry budget runs out.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Exhausted`] after `max_retries` unsuccessful
    /// attempts.
    pub async fn wait_until_ready(&self) -> Result<Readiness, BootstrapError> {
        async {
            let max = self.policy.max_retries();
            info!(max_retries = max, "waiting for model service");

            for attempt in 1..=max {
                match self.attempt().await {
                    Attempt::Ready => {
                        info!(attempt, "model is ready and responding");
                        return Ok(Readiness { attempts: attempt });
                    }
                    Attempt::ProbeFailed => warn!(attempt, "model did not answer the probe"),
                    Attempt::ModelMissing => info!(attempt, "model was missing; pull requested"),
                    Attempt::ListFailed(e @ BackendError::Unreachable(_)) => {
                        error!(attempt, error = %e, "connection error")
                    }
                    Attempt::ListFailed(e) => {
                        error!(attempt, error = %e, "could not list models")
                    }
                }

                if attempt < max {
                    info!(
                        attempt,
                        max_retries = max,
                        delay_secs = self.policy.retry_delay().as_secs_f64(),
                        "retrying after delay"
                    );
                    tokio::time::sleep(self.policy.retry_delay()).await;
                }
            }

            error!(attempts = max, "model service never became ready");
            Err(BootstrapError::Exhausted { attempts: max })
        }
        .instrument(self.span.clone())
        .await
    }

    async fn attempt(&self) -> Attempt {
        let models = match self.backend.list_models().await {
            Ok(models) => models,
            Err(e) => return Attempt::ListFailed(e),
        };
        let names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
        info!(available = ?names, "available models");

        if is_installed(&models, &self.backend.endpoint().tagged_model()) {
            if self.probe().await {
                Attempt::Ready
            } else {
                Attempt::ProbeFailed
            }
        } else {
            self.pull().await;
            Attempt::ModelMissing
        }
    }

    /// `true` when the probe prompt yields a non-empty trimmed reply.
    async fn probe(&self) -> bool {
        let prompt = build_prompt(PROBE_COMMAND);
        match tokio::time::timeout(self.probe_timeout, self.backend.generate(&prompt)).await {
            Ok(Ok(reply)) => !reply.trim().is_empty(),
            Ok(Err(e)) => {
                error!(error = %e, "error testing model");
                false
            }
            Err(_) => {
                error!("probe timed out");
                false
            }
        }
    }

    async fn pull(&self) {
        let model = self.backend.endpoint().model();
        info!(model, "pulling model");
        match self.backend.pull(model).await {
            Ok(()) => info!(model, "successfully pulled model"),
            Err(e) => error!(model, error = %e, "failed to pull model"),
        }
    }
}

fn is_installed(models: &[ModelInfo], tagged: &str) -> bool {
    models.iter().any(|m| m.name == tagged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeBackend, SpanLog};

    fn policy(max: u32) -> RetryPolicy {
        RetryPolicy::new(max, Duration::from_millis(1)).unwrap()
    }

    #[test]
    fn policy_rejects_zero_retries_and_zero_delay() {
        assert!(matches!(
            RetryPolicy::new(0, Duration::from_secs(1)),
            Err(BootstrapError::InvalidPolicy(_))
        ));
        assert!(matches!(
            RetryPolicy::new(3, Duration::ZERO),
            Err(BootstrapError::InvalidPolicy(_))
        ));
    }

    #[test]
    fn exhaustion_maps_onto_bootstrap_error() {
        let err = BeltError::from(BootstrapError::Exhausted { attempts: 5 });
        assert_eq!(
            err.to_string(),
            "Model service not ready: Could not initialize model service after 5 attempts"
        );
    }

    #[test]
    fn default_policy_is_five_by_ten_seconds() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_retries(), 5);
        assert_eq!(p.retry_delay(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn unreachable_backend_exhausts_exactly_max_retries() {
        let backend = Arc::new(FakeBackend::new("phi").unreachable());
        let boot = ServiceBootstrapper::new(backend.clone(), policy(4));

        let err = boot.wait_until_ready().await.unwrap_err();
        assert_eq!(err, BootstrapError::Exhausted { attempts: 4 });
        assert_eq!(
            err.to_string(),
            "Could not initialize model service after 4 attempts"
        );
        assert_eq!(FakeBackend::calls(&backend.list_calls), 4);
        assert_eq!(FakeBackend::calls(&backend.generate_calls), 0);
    }

    #[tokio::test]
    async fn stops_on_first_successful_probe() {
        let backend = Arc::new(
            FakeBackend::new("phi")
                .with_installed("phi:latest")
                .with_reply("START"),
        );
        let boot = ServiceBootstrapper::new(backend.clone(), policy(5));

        assert_eq!(boot.wait_until_ready().await, Ok(Readiness { attempts: 1 }));
        assert_eq!(FakeBackend::calls(&backend.list_calls), 1);
        assert_eq!(FakeBackend::calls(&backend.generate_calls), 1);
        assert_eq!(FakeBackend::calls(&backend.pull_calls), 0);
    }

    #[tokio::test]
    async fn missing_model_is_pulled_then_probed() {
        let backend = Arc::new(FakeBackend::new("phi").pull_installs().with_reply("STOP"));
        let boot = ServiceBootstrapper::new(backend.clone(), policy(5));

        assert_eq!(boot.wait_until_ready().await, Ok(Readiness { attempts: 2 }));
        assert_eq!(FakeBackend::calls(&backend.pull_calls), 1);
        assert_eq!(FakeBackend::calls(&backend.generate_calls), 1);
    }

    #[tokio::test]
    async fn failed_pull_is_not_fatal_to_the_loop() {
        let backend = Arc::new(
            FakeBackend::new("phi").with_pull_result(Err(BackendError::Timeout)),
        );
        let boot = ServiceBootstrapper::new(backend.clone(), policy(3));

        assert_eq!(
            boot.wait_until_ready().await,
            Err(BootstrapError::Exhausted { attempts: 3 })
        );
        assert_eq!(FakeBackend::calls(&backend.pull_calls), 3);
    }

    #[tokio::test]
    async fn empty_probe_reply_counts_as_failed_attempt() {
        let backend = Arc::new(
            FakeBackend::new("phi")
                .with_installed("phi:latest")
                .with_reply("   ")
                .with_reply("ready"),
        );
        let boot = ServiceBootstrapper::new(backend.clone(), policy(5));

        assert_eq!(boot.wait_until_ready().await, Ok(Readiness { attempts: 2 }));
        assert_eq!(FakeBackend::calls(&backend.generate_calls), 2);
    }

    #[tokio::test]
    async fn erroring_probe_counts_as_failed_attempt() {
        let backend = Arc::new(
            FakeBackend::new("phi")
                .with_installed("phi:latest")
                .with_failure(BackendError::Rejected {
                    status: 500,
                    body: "loading".into(),
                })
                .with_reply("ok"),
        );
        let boot = ServiceBootstrapper::new(backend, policy(2));
        assert_eq!(boot.wait_until_ready().await, Ok(Readiness { attempts: 2 }));
    }

    #[tokio::test]
    async fn hanging_probe_is_bounded_by_probe_timeout() {
        let backend = Arc::new(
            FakeBackend::new("phi")
                .with_installed("phi:latest")
                .with_reply("ok")
                .with_generate_delay(Duration::from_secs(5)),
        );
        let boot = ServiceBootstrapper::new(backend, policy(2))
            .with_probe_timeout(Duration::from_millis(20));

        assert_eq!(
            boot.wait_until_ready().await,
            Err(BootstrapError::Exhausted { attempts: 2 })
        );
    }

    #[tokio::test]
    async fn malformed_model_list_exhausts_without_probing() {
        let malformed = || BackendError::Malformed("expected value at line 1".into());
        let backend = Arc::new(
            FakeBackend::new("phi")
                .with_installed("phi:latest")
                .with_reply("ok")
                .with_list_failure(malformed())
                .with_list_failure(malformed())
                .with_list_failure(malformed()),
        );
        let boot = ServiceBootstrapper::new(backend.clone(), policy(3));

        assert_eq!(
            boot.wait_until_ready().await,
            Err(BootstrapError::Exhausted { attempts: 3 })
        );
        assert_eq!(FakeBackend::calls(&backend.list_calls), 3);
        assert_eq!(FakeBackend::calls(&backend.generate_calls), 0);
    }

    #[tokio::test]
    async fn well_formed_list_after_malformed_one_reaches_probe() {
        let backend = Arc::new(
            FakeBackend::new("phi")
                .with_installed("phi:latest")
                .with_reply("ok")
                .with_list_failure(BackendError::Malformed("eof".into()))
                .with_list_failure(BackendError::Rejected {
                    status: 503,
                    body: "loading".into(),
                }),
        );
        let boot = ServiceBootstrapper::new(backend.clone(), policy(5));

        assert_eq!(boot.wait_until_ready().await, Ok(Readiness { attempts: 3 }));
        assert_eq!(FakeBackend::calls(&backend.list_calls), 3);
        assert_eq!(FakeBackend::calls(&backend.generate_calls), 1);
    }

    #[tokio::test]
    async fn logs_under_supplied_span() {
        let (log, _guard) = SpanLog::install();
        let backend = Arc::new(
            FakeBackend::new("phi")
                .with_installed("phi:latest")
                .with_reply("ok"),
        );
        let boot = ServiceBootstrapper::new(backend, policy(1))
            .with_span(tracing::info_span!("startup"));

        boot.wait_until_ready().await.unwrap();

        let event_spans = log.event_spans.lock().unwrap();
        assert!(!event_spans.is_empty());
        assert!(event_spans.iter().all(|s| s.as_deref() == Some("startup")));
    }

    #[tokio::test]
    async fn explicitly_tagged_model_must_match_exactly() {
        let backend = Arc::new(
            FakeBackend::new("llama3:8b")
                .with_installed("llama3:latest")
                .with_reply("ok"),
        );
        let boot = ServiceBootstrapper::new(backend.clone(), policy(1));

        assert!(boot.wait_until_ready().await.is_err());
        assert_eq!(FakeBackend::calls(&backend.pull_calls), 1);
    }
}

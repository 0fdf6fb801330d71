//! Scripted in-process [`ModelBackend`] and a span recorder used by the
//! unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use belt_types::ModelEndpoint;
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;

use crate::backend::{BackendError, ModelBackend, ModelInfo};

pub(crate) struct FakeBackend {
    endpoint: ModelEndpoint,
    reachable: bool,
    /// Failures returned by `list_models` before it starts succeeding.
    list_failures: Mutex<VecDeque<BackendError>>,
    installed: Mutex<Vec<String>>,
    /// Replies consumed in order; the last one repeats once the queue drains.
    replies: Mutex<VecDeque<Result<String, BackendError>>>,
    pull_result: Result<(), BackendError>,
    pull_installs: bool,
    generate_delay: Option<Duration>,
    panic_on_generate: bool,
    pub list_calls: AtomicU32,
    pub generate_calls: AtomicU32,
    pub pull_calls: AtomicU32,
}

impl FakeBackend {
    pub fn new(model: &str) -> Self {
        Self {
            endpoint: ModelEndpoint::new("http://fake:11434", model),
            reachable: true,
            list_failures: Mutex::new(VecDeque::new()),
            installed: Mutex::new(Vec::new()),
            replies: Mutex::new(VecDeque::new()),
            pull_result: Ok(()),
            pull_installs: false,
            generate_delay: None,
            panic_on_generate: false,
            list_calls: AtomicU32::new(0),
            generate_calls: AtomicU32::new(0),
            pull_calls: AtomicU32::new(0),
        }
    }

    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    pub fn with_list_failure(self, err: BackendError) -> Self {
        self.list_failures.lock().unwrap().push_back(err);
        self
    }

    pub fn with_installed(self, name: &str) -> Self {
        self.installed.lock().unwrap().push(name.to_string());
        self
    }

    pub fn with_reply(self, reply: &str) -> Self {
        self.replies.lock().unwrap().push_back(Ok(reply.to_string()));
        self
    }

    pub fn with_failure(self, err: BackendError) -> Self {
        self.replies.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn with_pull_result(mut self, result: Result<(), BackendError>) -> Self {
        self.pull_result = result;
        self
    }

    /// Successful pulls add the model to the installed list.
    pub fn pull_installs(mut self) -> Self {
        self.pull_installs = true;
        self
    }

    pub fn with_generate_delay(mut self, delay: Duration) -> Self {
        self.generate_delay = Some(delay);
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic_on_generate = true;
        self
    }

    pub fn calls(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelBackend for FakeBackend {
    fn endpoint(&self) -> &ModelEndpoint {
        &self.endpoint
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, BackendError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if !self.reachable {
            return Err(BackendError::Unreachable("connection refused".into()));
        }
        if let Some(err) = self.list_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(self
            .installed
            .lock()
            .unwrap()
            .iter()
            .map(|name| ModelInfo { name: name.clone() })
            .collect())
    }

    async fn generate(&self, _prompt: &str) -> Result<String, BackendError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_generate {
            panic!("backend exploded");
        }
        if !self.reachable {
            return Err(BackendError::Unreachable("connection refused".into()));
        }
        if let Some(delay) = self.generate_delay {
            tokio::time::sleep(delay).await;
        }
        let mut replies = self.replies.lock().unwrap();
        if replies.len() > 1 {
            replies.pop_front().unwrap()
        } else {
            replies.front().cloned().unwrap_or_else(|| Ok(String::new()))
        }
    }

    async fn pull(&self, model: &str) -> Result<(), BackendError> {
        self.pull_calls.fetch_add(1, Ordering::SeqCst);
        if !self.reachable {
            return Err(BackendError::Unreachable("connection refused".into()));
        }
        if self.pull_result.is_ok() && self.pull_installs {
            self.installed
                .lock()
                .unwrap()
                .push(format!("{model}:latest"));
        }
        self.pull_result.clone()
    }
}

/// Records the name of every new span (with its parent) and the span each
/// event was emitted in.
#[derive(Clone, Default)]
pub(crate) struct SpanLog {
    pub spans: Arc<Mutex<Vec<(String, Option<String>)>>>,
    pub event_spans: Arc<Mutex<Vec<Option<String>>>>,
}

impl SpanLog {
    /// Install a recording subscriber on the current thread.
    pub fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let log = Self::default();
        let subscriber = tracing_subscriber::registry().with(log.clone());
        (log, tracing::subscriber::set_default(subscriber))
    }

    pub fn parent_of(&self, name: &str) -> Option<String> {
        self.spans
            .lock()
            .unwrap()
            .iter()
            .find(|(span, _)| span == name)
            .and_then(|(_, parent)| parent.clone())
    }
}

impl<S> Layer<S> for SpanLog
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let parent = ctx
            .span(id)
            .and_then(|span| span.parent())
            .map(|p| p.name().to_string());
        self.spans
            .lock()
            .unwrap()
            .push((attrs.metadata().name().to_string(), parent));
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let span = ctx.event_span(event).map(|s| s.name().to_string());
        self.event_spans.lock().unwrap().push(span);
    }
}

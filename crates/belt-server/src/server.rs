//! [`CommandServer`] – axum router and handlers for `POST /command`.

use std::any::Any;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use belt_hal::{Conveyor, dispatch};
use belt_runtime::CommandInterpreter;
use belt_types::BeltError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

/// Default listen address.
pub const DEFAULT_ADDR: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
    5000,
);

// ---------------------------------------------------------------------------
// Reply body
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Success,
    Error,
}

/// JSON body of every `/command` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandReply {
    pub status: ReplyStatus,
    pub message: String,
}

impl CommandReply {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Error,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// State + router
// ---------------------------------------------------------------------------

/// Shared handler state.  The interpreter is stateless; the belt is the only
/// mutable resource and is serialized behind a mutex.
#[derive(Clone)]
pub struct AppState {
    pub interpreter: Arc<CommandInterpreter>,
    pub belt: Arc<Mutex<Box<dyn Conveyor>>>,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/command", post(post_command))
        .with_state(state)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
}

fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    };
    tracing::error!(%detail, "error processing command");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(CommandReply::error(format!("Internal server error: {detail}"))),
    )
        .into_response()
}

// `None` for a missing body, malformed JSON, or a missing/non-string field.
fn extract_command(payload: Result<Json<Value>, JsonRejection>) -> Option<String> {
    match payload {
        Ok(Json(body)) => body.get("command")?.as_str().map(str::to_string),
        Err(rejection) => {
            warn!(error = %rejection, "rejected command body");
            None
        }
    }
}

async fn post_command(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> (StatusCode, Json<CommandReply>) {
    let Some(command) = extract_command(payload) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(CommandReply::error("No command provided")),
        );
    };

    let request_id = Uuid::new_v4();
    async move {
        info!(%command, "received command");
        let action = state.interpreter.interpret(&command).await;
        info!(%action, "parsed action");

        let reply = {
            let mut belt = state.belt.lock().await;
            match dispatch(&mut **belt, &action) {
                Ok(message) => CommandReply::success(message),
                Err(e @ BeltError::UnknownCommand(_)) => {
                    warn!(raw = %action, "model reply matched no action");
                    CommandReply::error(e.to_string())
                }
                Err(e) => CommandReply::error(e.to_string()),
            }
        };

        info!(status = ?reply.status, message = %reply.message, "final response");
        (StatusCode::OK, Json(reply))
    }
    .instrument(info_span!("command", %request_id))
    .await
}

// ---------------------------------------------------------------------------
// CommandServer
// ---------------------------------------------------------------------------

/// HTTP server wrapping the [`router`].
pub struct CommandServer {
    state: AppState,
    addr: SocketAddr,
}

impl CommandServer {
    /// Create a server on [`DEFAULT_ADDR`].
    pub fn new(interpreter: Arc<CommandInterpreter>, belt: Box<dyn Conveyor>) -> Self {
        Self {
            state: AppState {
                interpreter,
                belt: Arc::new(Mutex::new(belt)),
            },
            addr: DEFAULT_ADDR,
        }
    }

    /// Override the listen address (builder-style).
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Handle to the shared state, e.g. to inspect the belt.
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Serve until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`BeltError::Server`] if the listener cannot bind or the
    /// server fails.
    pub async fn run<F>(self, shutdown: F) -> Result<(), BeltError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| BeltError::Server(format!("bind error on {}: {e}", self.addr)))?;
        info!(addr = %self.addr, "command server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| BeltError::Server(e.to_string()))?;

        info!("command server has shut down");
        Ok(())
    }
}

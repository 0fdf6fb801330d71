//! `belt-server` – HTTP surface for operator commands.
//!
//! `POST /command` with `{"command": "<free text>"}` runs the text through the
//! [`CommandInterpreter`][belt_runtime::CommandInterpreter], applies the
//! resulting action to the conveyor, and answers
//! `{"status": "success" | "error", "message": "..."}`.
//!
//! | Situation | HTTP status | `status` |
//! |---|---|---|
//! | Action applied | 200 | `success` |
//! | Model/transport error, unknown command, rejected rate | 200 | `error` |
//! | Missing or malformed body | 400 | `error` |
//! | Handler panic | 500 | `error` |
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use belt_hal::ConveyorBelt;
//! use belt_runtime::{CommandInterpreter, OllamaClient};
//! use belt_server::CommandServer;
//! use belt_types::ModelEndpoint;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = Arc::new(OllamaClient::new(ModelEndpoint::new("http://localhost:11434", "phi")));
//!     let interpreter = Arc::new(CommandInterpreter::new(backend));
//!     CommandServer::new(interpreter, Box::new(ConveyorBelt::new()))
//!         .run(std::future::pending())
//!         .await
//!         .expect("command server failed");
//! }
//! ```

pub mod server;

pub use server::{AppState, CommandReply, CommandServer, DEFAULT_ADDR, ReplyStatus, router};

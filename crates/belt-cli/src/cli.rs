//! Command-line arguments.

use std::net::SocketAddr;
use std::path::PathBuf;

use belt_runtime::LogFormat;
use clap::{Parser, Subcommand};

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(name = "belt", version, about = "Natural-language conveyor belt controller")]
pub struct Cli {
    /// Config file to read instead of `~/.belt/config.toml`.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Base URL of the Ollama instance.
    #[arg(long, global = true, value_name = "URL")]
    pub ollama_url: Option<String>,

    /// Model used to interpret commands.
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Console log format (`compact` or `json`).
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Wait for the model service, then serve `POST /command`.
    Serve {
        #[arg(long, value_name = "ADDR")]
        bind: Option<SocketAddr>,
    },
    /// Interpret one command and print the resulting action.
    Interpret {
        /// The operator's command, e.g. "start the belt".
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Run the sensor-driven actuator loop.
    ControlLoop {
        #[arg(long, value_name = "URL")]
        chat_url: Option<String>,
        #[arg(long)]
        chat_model: Option<String>,
        #[arg(long, value_name = "SECS")]
        interval_secs: Option<u64>,
        /// Stop after this many ticks.
        #[arg(long)]
        ticks: Option<u64>,
    },
    /// List models installed on the Ollama instance.
    Models,
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Write the effective configuration to the config file.
    Init {
        /// Replace an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration.
    Show,
}

impl Cli {
    /// Apply flag overrides, the highest-precedence layer.
    pub fn apply_to(&self, cfg: &mut Config) {
        if let Some(url) = &self.ollama_url {
            cfg.ollama_url = url.clone();
        }
        if let Some(model) = &self.model {
            cfg.model = model.clone();
        }
        if let Some(format) = self.log_format {
            cfg.log_format = format;
        }
        match &self.command {
            Command::Serve { bind: Some(addr) } => cfg.bind_address = *addr,
            Command::ControlLoop {
                chat_url,
                chat_model,
                interval_secs,
                ..
            } => {
                if let Some(url) = chat_url {
                    cfg.chat_url = url.clone();
                }
                if let Some(model) = chat_model {
                    cfg.chat_model = model.clone();
                }
                if let Some(secs) = interval_secs {
                    cfg.control_interval_secs = *secs;
                }
            }
            _ => {}
        }
    }
}

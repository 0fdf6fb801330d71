//! `belt` – command line entry point for the conveyor line.
//!
//! 1. Resolves configuration (defaults, `~/.belt/config.toml`, `BELT_*`
//!    environment variables, flags).
//! 2. Installs structured logging, with optional OTLP span export.
//! 3. Gates every model-backed command on the model service becoming ready;
//!    if the bootstrapper gives up, the process exits non-zero.
//! 4. Intercepts **Ctrl-C** to shut the server or control loop down cleanly.
//!
//! User-facing output uses `println!`; diagnostics go through `tracing`.

mod cli;
mod config;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, bail};
use belt_hal::sim::{SimRegistry, default_sensors};
use belt_hal::{ConveyorBelt, dispatch};
use belt_runtime::{
    ChatDriver, CommandInterpreter, ControlLoop, ControlLoopConfig, ModelBackend, OllamaClient,
    ServiceBootstrapper, init_tracing,
};
use belt_server::CommandServer;
use belt_types::BeltError;
use clap::Parser;
use colored::Colorize;
use tracing::{Span, info, info_span, warn};

use cli::{Cli, Command, ConfigCommand};
use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg =
        config::resolve(cli.config.as_deref()).context("failed to load configuration")?;
    cli.apply_to(&mut cfg);
    cfg.validate().context("invalid configuration")?;

    let _telemetry = init_tracing("belt", cfg.log_format);

    match cli.command {
        Command::Serve { .. } => serve(&cfg).await,
        Command::Interpret { text } => interpret(&cfg, &text.join(" ")).await,
        Command::ControlLoop { ticks, .. } => control_loop(&cfg, ticks).await,
        Command::Models => list_models(&cfg).await,
        Command::Config(ConfigCommand::Init { force }) => {
            init_config(cli.config.as_deref(), &cfg, force)
        }
        Command::Config(ConfigCommand::Show) => {
            print!("{}", toml::to_string_pretty(&cfg)?);
            Ok(())
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Subcommands
// ─────────────────────────────────────────────────────────────────────────────

async fn serve(cfg: &Config) -> anyhow::Result<()> {
    print_banner();
    let span = info_span!("serve", addr = %cfg.bind_address, model = %cfg.model);
    let backend = ready_backend(cfg, span.clone()).await?;

    let interpreter = Arc::new(
        CommandInterpreter::new(backend)
            .with_request_timeout(cfg.request_timeout())
            .with_span(span),
    );
    let server =
        CommandServer::new(interpreter, Box::new(ConveyorBelt::new())).with_addr(cfg.bind_address);

    println!(
        "  Listening on {}  (POST {})\n",
        server.addr().to_string().bold(),
        "/command".cyan()
    );
    server.run(shutdown_signal()).await?;
    println!("{}", "  ✓ Server stopped.".green());
    Ok(())
}

/// Exits non-zero when the command does not map onto a belt action.
async fn interpret(cfg: &Config, text: &str) -> anyhow::Result<()> {
    let span = info_span!("interpret_once", model = %cfg.model);
    let backend = ready_backend(cfg, span.clone()).await?;
    let interpreter = CommandInterpreter::new(backend)
        .with_request_timeout(cfg.request_timeout())
        .with_span(span);

    let action = interpreter.interpret(text).await;
    println!("  {} {}", "Action:".bold(), action);

    let mut belt = ConveyorBelt::new();
    let outcome = dispatch(&mut belt, &action);
    if !action.is_actionable() {
        if let Err(e) = outcome {
            println!("  {} {}", "✗".red().bold(), e);
        }
        bail!("command did not map onto a belt action");
    }
    let message = outcome?;
    println!("  {} {}", "✓".green().bold(), message);
    Ok(())
}

async fn control_loop(cfg: &Config, ticks: Option<u64>) -> anyhow::Result<()> {
    print_banner();
    let chat = Arc::new(ChatDriver::new(&cfg.chat_url, &cfg.chat_model));
    let switches = SimRegistry::new().with_default_rig().build();
    let mut control = ControlLoop::new(
        default_sensors(),
        switches,
        chat,
        ControlLoopConfig {
            interval: cfg.control_interval(),
            ..ControlLoopConfig::default()
        },
    );

    println!(
        "  Control loop using {} at {}\n",
        cfg.chat_model.bold(),
        cfg.chat_url.dimmed()
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        flag.store(true, Ordering::SeqCst);
    });

    let ran = control.run(shutdown, ticks).await;
    println!("{}", format!("  ✓ Control loop stopped after {ran} tick(s).").green());
    Ok(())
}

async fn list_models(cfg: &Config) -> anyhow::Result<()> {
    let client = OllamaClient::new(cfg.endpoint());
    print!("  Probing Ollama at {} … ", cfg.ollama_url.dimmed());
    match client.list_models().await {
        Ok(models) => {
            println!("{} ({} model(s) available)", "online".green(), models.len());
            for m in &models {
                println!("    • {}", m.name.bold());
            }
            Ok(())
        }
        Err(e) => {
            println!("{}", "offline".yellow());
            println!(
                "  {}  Run `{}` to start a local model service.",
                "No Ollama instance detected.".dimmed(),
                "ollama serve".bold()
            );
            Err(e).context("model service unreachable")
        }
    }
}

fn init_config(path: Option<&Path>, cfg: &Config, force: bool) -> anyhow::Result<()> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config::config_path);
    if path.exists() && !force {
        bail!("{} already exists (use --force to replace it)", path.display());
    }
    config::save_to(cfg, &path)?;
    println!(
        "  {} Config saved to {}",
        "✓".green().bold(),
        path.display().to_string().bold()
    );
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Build the Ollama client and block until the model answers, or fail.
async fn ready_backend(cfg: &Config, span: Span) -> anyhow::Result<Arc<dyn ModelBackend>> {
    let backend: Arc<dyn ModelBackend> = Arc::new(
        OllamaClient::new(cfg.endpoint()).with_generate_timeout(cfg.request_timeout()),
    );
    let policy = cfg.retry_policy()?;

    println!(
        "  Waiting for {} at {} …",
        cfg.endpoint().tagged_model().bold(),
        cfg.ollama_url.dimmed()
    );
    let readiness = ServiceBootstrapper::new(backend.clone(), policy)
        .with_probe_timeout(cfg.request_timeout())
        .with_span(span)
        .wait_until_ready()
        .await
        .map_err(BeltError::from)?;

    info!(attempts = readiness.attempts, "model service ready");
    println!("  {} Model service ready.\n", "✓".green().bold());
    Ok(backend)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C; shutdown on Ctrl-C is unavailable");
        std::future::pending::<()>().await;
    }
    println!();
    println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
}

fn print_banner() {
    println!();
    println!("{}", r#"   __        ____ "#.bold().cyan());
    println!("{}", r#"  / /  ___  / / /_"#.bold().cyan());
    println!("{}", r#" / _ \/ -_)/ / __/"#.bold().cyan());
    println!("{}", r#"/_.__/\__//_/\__/ "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "belt".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Natural-language conveyor control");
    println!();
}

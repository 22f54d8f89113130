mod scenario;

use std::future::IntoFuture;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use postbox_core::{Chat, Message, Postbox, PostboxConfig, StartError};
use postbox_memory_backend::MemoryBackend;
use serde_json::json;

use crate::scenario::Scenario;

#[derive(Debug, Parser)]
#[command(name = "postbox")]
#[command(about = "Message-arrival notification core: run scripted scenarios and inspect config")]
struct Cli {
    /// Data directory (postbox_config.json is read from here; default store root)
    #[arg(long, env = "POSTBOX_DATA_DIR", default_value = ".")]
    data_dir: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay a JSON scenario through the core against the in-memory backend
    Simulate {
        /// Scenario file (seed + events)
        #[arg(long)]
        scenario: PathBuf,

        /// Seconds to wait for readiness
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },

    /// Print the effective configuration (password redacted)
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    postbox_core::init_logging("warn");

    let cli = Cli::parse();
    let config = PostboxConfig::load(&cli.data_dir)
        .with_context(|| format!("load config from {}", cli.data_dir.display()))?;

    match &cli.cmd {
        Command::Simulate { scenario, timeout } => {
            cmd_simulate(config, scenario, Duration::from_secs(*timeout)).await
        }
        Command::Config => cmd_config(&config),
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn print(v: serde_json::Value) {
    match serde_json::to_string(&v) {
        Ok(line) => println!("{line}"),
        Err(err) => tracing::error!(err = %err, "json encode"),
    }
}

fn delivery_json(chat: &Chat, message: &Message) -> serde_json::Value {
    json!({
        "event": "delivered",
        "chat_id": chat.id,
        "chat_name": chat.name,
        "msg_id": message.id,
        "from": message.from_addr,
        "text": message.text,
    })
}

async fn wait_for_subscriber(backend: &MemoryBackend, timeout: Duration) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    while !backend.has_subscriber() {
        if tokio::time::Instant::now() >= deadline {
            return Err(anyhow!("core did not subscribe within {timeout:?}"));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}

// ── Commands ────────────────────────────────────────────────────────────────

/// Sink for the JSON lines a simulation produces.
type Output = Arc<dyn Fn(serde_json::Value) + Send + Sync>;

async fn cmd_simulate(
    config: PostboxConfig,
    scenario_path: &std::path::Path,
    timeout: Duration,
) -> anyhow::Result<()> {
    let scenario = Scenario::load(scenario_path)?;
    simulate(config, scenario, timeout, Arc::new(print)).await
}

/// Replay `scenario` and report deliveries and the readiness outcome to
/// `out`. Errors when the core never became ready.
async fn simulate(
    config: PostboxConfig,
    scenario: Scenario,
    timeout: Duration,
    out: Output,
) -> anyhow::Result<()> {
    let backend = Arc::new(MemoryBackend::from_seed(scenario.seed));

    let deliveries = out.clone();
    let (postbox, ready) = Postbox::start(
        backend.clone(),
        config,
        move |chat: Chat, message: Message| deliveries(delivery_json(&chat, &message)),
    )
    .context("start postbox")?;

    wait_for_subscriber(&backend, timeout).await?;
    for event in scenario.events {
        tracing::debug!(event = event.tag(), "replaying");
        backend.emit(event);
    }

    let outcome = tokio::select! {
        res = tokio::time::timeout(timeout, ready.into_future()) => {
            res.unwrap_or(Err(StartError::Timeout(timeout)))
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
            Err(StartError::Shutdown)
        }
    };

    // Shutdown is queued behind every replayed event, so all deliveries are
    // printed before the backend closes.
    tokio::task::spawn_blocking(move || postbox.shutdown())
        .await
        .context("join shutdown")?;

    match outcome {
        Ok(()) => {
            out(json!({ "event": "ready" }));
            Ok(())
        }
        Err(err) => {
            out(json!({ "event": "not_ready", "error": err.to_string() }));
            Err(anyhow!(err)).context("postbox did not become ready")
        }
    }
}

fn cmd_config(config: &PostboxConfig) -> anyhow::Result<()> {
    let mut v = serde_json::to_value(config.redacted()).context("encode config")?;
    v["data_dir"] = json!(config.data_dir);
    v["store_root"] = json!(config.store_root());
    println!("{}", serde_json::to_string_pretty(&v).context("encode config")?);
    Ok(())
}

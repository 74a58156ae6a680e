//! Tether runtime
//!
//! Evaluates one script in the guest engine on the host event loop and keeps
//! the loop running until every timer the script scheduled has fired. A
//! script whose completion value is a promise prints what it settles to.
//!
//! Usage: `tether [--config engine.json] script.js`

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use tether_bridge::{Engine, EngineConfig};
use tether_host::EventLoop;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tether", about = "Run a script in the guest engine on the host event loop")]
struct Args {
    /// Engine configuration as JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Script to evaluate.
    script: PathBuf,
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("could not read config {}", path.display()))?;
    EngineConfig::from_json(&text).with_context(|| format!("invalid config {}", path.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;
    let source = fs::read_to_string(&args.script)
        .with_context(|| format!("could not read script {}", args.script.display()))?;

    let host_loop = EventLoop::new().context("could not start the event loop")?;
    let engine = Engine::with_config(config)?;
    tracing::info!(script = %args.script.display(), "running script");

    let result = host_loop.run_until(async {
        let mut result = engine.eval(&source);
        let pending = result
            .as_ref()
            .ok()
            .and_then(|value| value.as_awaitable())
            .cloned();
        if let Some(awaitable) = pending {
            result = awaitable.await;
        }
        engine.timers_idle().await;
        result
    });

    let stats = engine.stats();
    tracing::debug!(?stats, "script finished");
    match result {
        Ok(value) if value.is_none() => Ok(()),
        Ok(value) => {
            println!("{value}");
            Ok(())
        }
        Err(err) => bail!("uncaught {err}"),
    }
}

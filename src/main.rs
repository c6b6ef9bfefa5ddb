// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use microgateway::backends::Collaborators;
use microgateway::config::load_and_validate_config;
use microgateway::GatewayRegistry;

/// Run one event through a gateway document and print the reply.
#[derive(Debug, Parser)]
#[command(name = "microgateway", version, about)]
struct Cli {
    /// Gateway document (.json, .yaml, .yml or .toml)
    #[arg(long, short, value_name = "FILE", env = "MICROGATEWAY_CONFIG")]
    config: PathBuf,

    /// Dispatch to run
    #[arg(long, short)]
    dispatch: String,

    /// Event payload as JSON; omitted means null
    #[arg(long, short, value_name = "JSON")]
    payload: Option<String>,

    /// Instance identifier the gateway is warmed up under
    #[arg(long, default_value = "default")]
    instance: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let payload: Value = match &cli.payload {
        Some(raw) => serde_json::from_str(raw).context("--payload is not valid JSON")?,
        None => Value::Null,
    };

    let cfg = load_and_validate_config(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let registry = GatewayRegistry::new(Collaborators::default());
    let gateway = registry
        .warm_up(&cli.instance, &cfg)
        .with_context(|| format!("warming up gateway '{}'", cfg.name))?;

    let start = Instant::now();
    let reply = gateway
        .dispatch(&cli.dispatch, payload)
        .await
        .with_context(|| format!("dispatch '{}'", cli.dispatch))?;

    let rendered = match reply {
        Some(reply) => serde_json::to_value(&reply)?,
        None => json!(null),
    };
    println!("{}", serde_json::to_string_pretty(&rendered)?);

    gateway.wait_detached().await;
    tracing::debug!(elapsed_ms = start.elapsed().as_millis() as u64, "done");

    Ok(())
}

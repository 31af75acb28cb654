// SPDX-License-Identifier: BUSL-1.1
// Copyright 2025 Alfred Jean LLC

//! A small interactive demo of the broker wired against the in-memory stub
//! adapter. Exercises the happy path end to end: initialize, acquire a
//! session, prepare, start streaming, pause, resume, stop, shut down.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use resource_broker::testing::StubAdapterFactory;
use resource_broker::{Broker, BrokerOptions};

/// Configuration for the demo binary.
#[derive(Debug, Clone, clap::Parser)]
struct DemoArgs {
    /// How many camera resources to pre-register.
    #[arg(long, default_value_t = 2, env = "RESOURCE_BROKER_PREREGISTER_COUNT")]
    preregister_count: u32,
}

#[tokio::main]
async fn main() {
    let args = DemoArgs::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run(args).await {
        error!("fatal: {err:#}");
        std::process::exit(1);
    }
}

async fn run(args: DemoArgs) -> anyhow::Result<()> {
    let mut options = BrokerOptions::new(Arc::new(StubAdapterFactory));
    options.preregister_count = args.preregister_count;

    let broker = Broker::initialize(options).await;
    let session = broker
        .create_session()
        .await
        .map_err(|err| anyhow::anyhow!("create_session failed: {err}"))?;

    session.on_started(|event| info!(success = event.success, "started"));
    session.on_paused(|event| info!(success = event.success, "paused"));
    session.on_resumed(|event| info!(success = event.success, "resumed"));
    session.on_stopped(|event| info!(success = event.success, "stopped"));
    session.on_prepared(|event| info!(success = event.success, "prepared"));

    // Pre-registered resources boot straight to Ready, so the first
    // StartStreaming needs no Prepare call.
    session.start_streaming(None).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    session.pause(None).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    session.resume(None).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    session.stop(None).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Prepare re-arms a stopped resource back to Ready.
    session.prepare(None).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    info!(state = ?session.current_state().await, "demo complete");
    broker.shutdown().await;
    Ok(())
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `circuit-relay` — standalone Circuit Relay v2 HOP server binary.
//!
//! Usage:
//!   circuit-relay --listen /ip4/0.0.0.0/tcp/4001 --keypair relay.key
//!
//! This is the reference embedding program named in spec section 6: it owns
//! discovery/process wiring (out of scope for the engine itself) and simply
//! runs the HOP/STOP protocol engine to completion on Ctrl-C.

mod cli;

use clap::Parser;

use circuit_relay::{gater::ConnectionGater, service, tagger::NullTagger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    init_logging(args.verbose);

    let config = args.hop_config();
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    let mut handle = service::spawn(
        config,
        args.listen.clone(),
        &args.keypair,
        ConnectionGater::new(),
        std::sync::Arc::new(NullTagger),
    )
    .await
    .map_err(|e| anyhow::anyhow!("failed to start relay: {e}"))?;

    tracing::info!(peer_id = %handle.local_peer_id(), "circuit-relay running, Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    handle.stop().await;

    Ok(())
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

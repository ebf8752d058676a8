// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Command-line surface for the reference relay binary.
//!
//! Mirrors `sven-p2p`'s `bin/relay.rs` `Args` shape: a thin `clap::Parser`
//! struct, no subcommands, defaults matching [`circuit_relay::HopConfig`].

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use libp2p::Multiaddr;

#[derive(Parser, Debug)]
#[command(
    name = "circuit-relay",
    about = "Circuit Relay v2 HOP service: reserve a slot, relay a circuit"
)]
pub struct Args {
    /// TCP listen address, e.g. `/ip4/0.0.0.0/tcp/4001`.
    #[arg(long, default_value = "/ip4/0.0.0.0/tcp/4001")]
    pub listen: Multiaddr,

    /// File storing this relay's persistent Ed25519 keypair. Generated on
    /// first run.
    #[arg(long, default_value = "relay.key")]
    pub keypair: PathBuf,

    /// Maximum number of simultaneous reservations.
    #[arg(long, default_value_t = 15)]
    pub max_reservations: usize,

    /// How long a reservation remains valid after RESERVE/refresh.
    #[arg(long, default_value = "2h", value_parser = parse_duration)]
    pub reservation_ttl: Duration,

    /// Per-relayed-connection byte cap advertised to reserving peers. 0 =
    /// unbounded.
    #[arg(long, default_value_t = 131_072)]
    pub default_data_limit: u64,

    /// Per-relayed-connection wall-clock cap advertised to reserving peers.
    #[arg(long, default_value = "120s", value_parser = parse_duration)]
    pub default_duration_limit: Duration,

    /// Upper bound on a single HOP or STOP handshake.
    #[arg(long, default_value = "30s", value_parser = parse_duration)]
    pub handshake_timeout: Duration,

    /// Advertise `{0, 0}` (unbounded) limits instead of the configured
    /// defaults, regardless of what the relay actually enforces.
    #[arg(long)]
    pub unbounded_limits: bool,

    /// Verbosity: repeat for more detail (`-v` debug, `-vv` trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

fn parse_duration(s: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(s)
}

impl Args {
    pub fn hop_config(&self) -> circuit_relay::HopConfig {
        circuit_relay::HopConfig {
            max_reservations: self.max_reservations,
            reservation_ttl: self.reservation_ttl,
            default_data_limit: self.default_data_limit,
            default_duration_limit: self.default_duration_limit,
            handshake_timeout: self.handshake_timeout,
            apply_connection_limits: !self.unbounded_limits,
        }
    }
}

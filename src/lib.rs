// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Circuit Relay v2 HOP service.
//!
//! The reservation store, HOP/STOP protocol engine, and relay splicer are
//! transport-agnostic: they drive anything implementing `futures::AsyncRead
//! + AsyncWrite`. [`behaviour`] and [`service`] wire that engine to a real
//! `libp2p::Swarm` so it can run as a standalone relay node.

pub mod behaviour;
pub mod config;
pub mod error;
pub mod gater;
pub mod hop;
pub mod log_layer;
pub mod proto;
pub mod service;
pub mod splicer;
pub mod stop;
pub mod store;
pub mod tagger;
pub mod transport;
pub mod wire;

pub use config::HopConfig;
pub use error::RelayError;
pub use service::RelayHandle;

/// HOP codec name (spec section 6).
pub const HOP_PROTOCOL: libp2p::StreamProtocol =
    libp2p::StreamProtocol::new("/libp2p/circuit/relay/0.2.0/hop");

/// STOP codec name (spec section 6).
pub const STOP_PROTOCOL: libp2p::StreamProtocol =
    libp2p::StreamProtocol::new("/libp2p/circuit/relay/0.2.0/stop");

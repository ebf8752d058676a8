//! Host wiring (component H, spec section 4.H): binds the transport-agnostic
//! HOP/STOP engine to a real `libp2p::Swarm`.
//!
//! Adapted from `sven_p2p::relay::run`'s event loop shape (listen, publish
//! external addresses, log connection churn, run until told to stop) but
//! generalized: incoming HOP streams are accepted via `libp2p_stream`
//! instead of the built-in `libp2p::relay::Behaviour`, and shutdown is an
//! explicit, idempotent [`RelayHandle::stop`] rather than only `ctrl_c`.

use std::{path::Path, sync::Arc, time::Duration};

use futures::StreamExt;
use libp2p::{
    multiaddr::Protocol,
    swarm::{Swarm, SwarmEvent},
    Multiaddr, PeerId,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    behaviour::{RelayBehaviour, RelayBehaviourEvent},
    config::HopConfig,
    error::RelayError,
    gater::ConnectionGater,
    hop::{ExternalAddresses, HopService},
    stop::StreamOpener,
    store::ReservationStore,
    tagger::PeerTagger,
    transport, HOP_PROTOCOL, STOP_PROTOCOL,
};

/// [`StreamOpener`] backed by a live `libp2p_stream::Control`: opens a STOP
/// stream to a peer the swarm already knows how to reach (spec section 4.E
/// step 1, "reuse if possible; otherwise dial").
#[derive(Clone)]
struct ControlOpener {
    control: libp2p_stream::Control,
}

#[async_trait::async_trait]
impl StreamOpener for ControlOpener {
    type Stream = libp2p::Stream;

    async fn open_stop_stream(&self, target: PeerId) -> Result<Self::Stream, RelayError> {
        self.control
            .clone()
            .open_stream(target, STOP_PROTOCOL)
            .await
            .map_err(|e| RelayError::Dial(e.to_string()))
    }
}

type Service = HopService<ControlOpener, dyn PeerTagger>;

/// A running relay node: owns the swarm-driving task, the reservation-sweep
/// timer, and the reservation store.
pub struct RelayHandle {
    local_peer_id: PeerId,
    store: Arc<ReservationStore>,
    external_addrs: ExternalAddresses,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl RelayHandle {
    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    pub fn store(&self) -> &ReservationStore {
        &self.store
    }

    /// The relay's externally reachable addresses observed so far, newest
    /// listen addresses appended as the swarm confirms them.
    pub fn external_addresses(&self) -> Vec<Multiaddr> {
        self.external_addrs.snapshot()
    }

    /// Abort the swarm loop and the expiry sweep, and drain the reservation
    /// store (spec section 5: "stop() aborts every in-flight handler ...
    /// the store is drained ... stop() is idempotent"). Already-spawned
    /// per-stream handler tasks are not explicitly joined here — they
    /// observe the closed swarm/stream and return on their own.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        self.store.clear().await;
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }
}

/// Build and run a relay node until [`RelayHandle::stop`] is called.
///
/// `gater` and `tagger` are the host's authorization and peer-tagging
/// collaborators (spec sections 4.C / 4.G / 6); pass
/// [`ConnectionGater::new()`] and [`crate::tagger::NullTagger`] for a
/// permissive relay with no peer-store integration.
pub async fn spawn(
    config: HopConfig,
    listen_addr: Multiaddr,
    keypair_path: &Path,
    gater: ConnectionGater,
    tagger: Arc<dyn PeerTagger>,
) -> Result<RelayHandle, RelayError> {
    config.validate()?;

    let key = transport::load_or_create_keypair(keypair_path)?;
    let local_peer_id = PeerId::from(key.public());
    tracing::info!(%local_peer_id, "relay node starting");

    let transport_stack = transport::build_transport(&key)?;
    let behaviour = RelayBehaviour::new(&key);
    let mut swarm = Swarm::new(
        transport_stack,
        behaviour,
        local_peer_id,
        transport::default_swarm_config(),
    );

    swarm
        .listen_on(listen_addr)
        .map_err(|e| RelayError::Transport(e.to_string()))?;

    let mut control = swarm.behaviour().stream.new_control();
    let mut incoming = control
        .accept(HOP_PROTOCOL)
        .map_err(|e| RelayError::Transport(e.to_string()))?;

    let store = Arc::new(ReservationStore::new(
        config.max_reservations,
        config.reservation_ttl,
    ));
    let external_addrs = ExternalAddresses::new();
    let opener = Arc::new(ControlOpener { control: control.clone() });

    let hop_service: Arc<Service> = Arc::new(HopService::new(
        config,
        local_peer_id,
        Arc::clone(&store),
        Arc::new(gater),
        tagger,
        opener,
        external_addrs.clone(),
    ));

    let cancel = CancellationToken::new();

    let sweep_store = Arc::clone(&store);
    let sweep_cancel = cancel.clone();
    let sweep_task = tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = sweep_cancel.cancelled() => break,
                _ = tick.tick() => sweep_store.sweep_expired().await,
            }
        }
    });

    let swarm_cancel = cancel.clone();
    let swarm_hop_service = Arc::clone(&hop_service);
    let swarm_external_addrs = external_addrs.clone();
    let swarm_task: JoinHandle<()> = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = swarm_cancel.cancelled() => break,
                event = swarm.select_next_some() => match event {
                    SwarmEvent::NewListenAddr { address, .. } => {
                        let full = address.with(Protocol::P2p(local_peer_id));
                        tracing::info!(%full, "relay listening");
                        swarm.add_external_address(full.clone());
                        swarm_external_addrs.push(full);
                    }
                    SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                        tracing::debug!(%peer_id, "relay: connected");
                    }
                    SwarmEvent::ConnectionClosed { peer_id, .. } => {
                        tracing::debug!(%peer_id, "relay: disconnected");
                    }
                    SwarmEvent::Behaviour(RelayBehaviourEvent::Identify(_)) => {}
                    SwarmEvent::Behaviour(RelayBehaviourEvent::Ping(_)) => {}
                    _ => {}
                },
                Some((remote, stream)) = incoming.next() => {
                    let svc = Arc::clone(&swarm_hop_service);
                    tokio::spawn(async move {
                        svc.handle_stream(remote, stream).await;
                    });
                }
            }
        }
    });

    Ok(RelayHandle {
        local_peer_id,
        store,
        external_addrs,
        cancel,
        tasks: vec![sweep_task, swarm_task],
    })
}

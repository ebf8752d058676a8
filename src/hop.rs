//! HOP state machine (component D).
//!
//! Per-inbound-stream handler for the RESERVE/CONNECT request a peer opens
//! on the HOP codec. Reads exactly one `HopMessage`, dispatches to the
//! RESERVE or CONNECT branch, and writes exactly one `STATUS` reply — a
//! CONNECT that succeeds then keeps the stream open and hands it to the
//! splicer instead of closing it (spec section 4.D).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{AsyncRead, AsyncWrite};
use libp2p::{multiaddr::Protocol, Multiaddr, PeerId};

use crate::config::HopConfig;
use crate::gater::ConnectionGater;
use crate::proto::{self, HopMessage, HopMessageType, Status};
use crate::splicer::{self, Limit};
use crate::stop::{self, StreamOpener};
use crate::store::{ReservationStore, ReserveOutcome};
use crate::tagger::{PeerTagger, RELAY_SOURCE_TAG};
use crate::wire::PeerStream;

/// Shared collection of this relay's externally reachable addresses, fed by
/// the host's swarm event loop as `NewListenAddr`/`ExternalAddrConfirmed`
/// events arrive (mirrors `server_addrs` in `sven_p2p::relay::run`).
#[derive(Clone, Default)]
pub struct ExternalAddresses(Arc<Mutex<Vec<Multiaddr>>>);

impl ExternalAddresses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, addr: Multiaddr) {
        self.0.lock().unwrap().push(addr);
    }

    pub fn snapshot(&self) -> Vec<Multiaddr> {
        self.0.lock().unwrap().clone()
    }
}

/// The HOP protocol engine: owns the reservation store and the pluggable
/// gater/tagger/dialer collaborators, and drives one inbound stream at a
/// time through [`HopService::handle_stream`].
pub struct HopService<O, T: ?Sized> {
    config: HopConfig,
    local_peer: PeerId,
    store: Arc<ReservationStore>,
    gater: Arc<ConnectionGater>,
    tagger: Arc<T>,
    opener: Arc<O>,
    external_addrs: ExternalAddresses,
}

impl<O, T> HopService<O, T>
where
    O: StreamOpener,
    T: PeerTagger + ?Sized,
{
    pub fn new(
        config: HopConfig,
        local_peer: PeerId,
        store: Arc<ReservationStore>,
        gater: Arc<ConnectionGater>,
        tagger: Arc<T>,
        opener: Arc<O>,
        external_addrs: ExternalAddresses,
    ) -> Self {
        Self {
            config,
            local_peer,
            store,
            gater,
            tagger,
            opener,
            external_addrs,
        }
    }

    pub fn store(&self) -> &ReservationStore {
        &self.store
    }

    /// The limit this relay currently advertises, as a [`splicer::Limit`]
    /// (zero fields meaning unbounded, same convention as the wire
    /// `proto::Limit`). Honors `apply_connection_limits` (spec section 6).
    fn configured_limit(&self) -> Limit {
        let advertised = self.config.advertised_limit();
        Limit {
            data: advertised.data_bytes(),
            duration: Duration::from_secs(advertised.duration_secs() as u64),
        }
    }

    /// Drive one freshly-opened inbound HOP stream to completion.
    pub async fn handle_stream<S>(&self, remote: PeerId, raw: S)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut stream = PeerStream::new(raw);

        let request = match tokio::time::timeout(
            self.config.handshake_timeout,
            stream.read_message::<HopMessage>(),
        )
        .await
        {
            Ok(Ok(Some(msg))) => msg,
            Ok(Ok(None)) => return,
            Ok(Err(e)) => {
                tracing::debug!(%remote, error = %e, "hop: failed to read request");
                return;
            }
            Err(_) => {
                tracing::debug!(%remote, "hop: handshake timed out waiting for request");
                return;
            }
        };

        match request.parsed_type() {
            Some(HopMessageType::Reserve) => self.handle_reserve(remote, &mut stream).await,
            Some(HopMessageType::Connect) => self.handle_connect(remote, request, stream).await,
            _ => {
                self.reply_status(&mut stream, Status::UnexpectedMessage)
                    .await;
                let _ = stream.close().await;
            }
        }
    }

    async fn handle_reserve<S>(&self, remote: PeerId, stream: &mut PeerStream<S>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        if self.gater.denies_inbound_relay_reservation(remote) {
            tracing::debug!(%remote, "hop: reservation denied by gater");
            self.reply_status(stream, Status::PermissionDenied).await;
            return;
        }

        match self
            .store
            .reserve(remote, Vec::new(), self.configured_limit())
            .await
        {
            ReserveOutcome::ResourceLimitExceeded => {
                tracing::debug!(%remote, "hop: reservation refused, store at capacity");
                self.reply_status(stream, Status::ReservationRefused).await;
            }
            ReserveOutcome::Created | ReserveOutcome::Refreshed => {
                let reservation = self
                    .store
                    .get(&remote)
                    .await
                    .expect("just inserted or refreshed");

                self.tagger.tag(
                    remote,
                    RELAY_SOURCE_TAG,
                    1,
                    self.config.reservation_ttl,
                );

                let addrs = self
                    .external_addrs
                    .snapshot()
                    .into_iter()
                    .map(|addr| circuit_address(addr, remote).to_vec())
                    .collect();

                let reply = HopMessage::status(
                    Status::Ok,
                    Some(proto::Reservation {
                        expire: reservation.expire,
                        addrs,
                        voucher: None,
                    }),
                    Some(self.config.advertised_limit()),
                );
                let _ = stream.write_message(&reply).await;
                tracing::info!(%remote, "hop: reservation admitted");
            }
        }
    }

    async fn handle_connect<S>(&self, source: PeerId, request: HopMessage, mut stream: PeerStream<S>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let Some(target) = request
            .peer
            .as_ref()
            .filter(|p| !p.id.is_empty())
            .and_then(|p| PeerId::from_bytes(&p.id).ok())
        else {
            self.reply_status(&mut stream, Status::MalformedMessage)
                .await;
            return;
        };

        if target == self.local_peer {
            self.reply_status(&mut stream, Status::NoReservation).await;
            return;
        }

        let Some(target_reservation) = self.store.get(&target).await else {
            self.reply_status(&mut stream, Status::NoReservation).await;
            return;
        };

        if self.gater.denies_outbound_relayed_connection(source, target) {
            tracing::debug!(%source, %target, "hop: relayed connect denied by gater");
            self.reply_status(&mut stream, Status::PermissionDenied)
                .await;
            return;
        }

        // Minimum of the reservation's own limit and this relay's current
        // ceiling (spec section 4.D rule 5); zero on either side means
        // unbounded on that axis (see `Limit::effective`).
        let limit = target_reservation.limit.effective(self.configured_limit());

        let target_stream = match stop::dial(
            &*self.opener,
            source,
            target,
            limit,
            self.config.handshake_timeout,
        )
        .await
        {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(%source, %target, error = %e, "hop: stop dial failed");
                self.reply_status(&mut stream, Status::ConnectionFailed)
                    .await;
                return;
            }
        };

        let reply = HopMessage::status(
            Status::Ok,
            None,
            Some(proto::Limit {
                duration: Some(limit.duration.as_secs() as u32),
                data: Some(limit.data),
            }),
        );
        if stream.write_message(&reply).await.is_err() {
            return;
        }

        tracing::info!(%source, %target, "hop: relaying connection");
        let Some(alpha) = stream.into_inner() else {
            return;
        };
        let Some(beta) = target_stream.into_inner() else {
            return;
        };
        splicer::splice(alpha, beta, limit).await;
    }

    async fn reply_status<S>(&self, stream: &mut PeerStream<S>, status: Status)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let _ = stream
            .write_message(&HopMessage::status(status, None, None))
            .await;
    }
}

/// `<relay-addr>/p2p/<remote>/p2p-circuit` — the address other peers use to
/// dial `remote` through this relay, handed back in a RESERVE reply (spec
/// section 4.D rule 2).
fn circuit_address(relay_addr: Multiaddr, remote: PeerId) -> Multiaddr {
    let mut addr = relay_addr;
    addr.push(Protocol::P2p(remote));
    addr.push(Protocol::P2pCircuit);
    addr
}

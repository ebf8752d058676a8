//! STOP dialer (component E).
//!
//! The outbound half of a relayed connection: given a target peer already
//! reachable on the swarm, open a STOP stream to it, send one
//! `StopMessage::connect`, and wait for its `StopMessage::status` reply
//! within the handshake timeout (spec section 4.E). `Status::Ok` hands back
//! the now-attached duplex stream for the splicer; anything else becomes a
//! `RelayError` the HOP handler maps to a HOP-side STATUS reply.

use futures::{AsyncRead, AsyncWrite};

use crate::error::RelayError;
use crate::proto::{Peer, Status, StopMessage};
use crate::splicer::Limit;
use crate::wire::PeerStream;

/// Everything the STOP dialer needs from the host's swarm: the ability to
/// open a new outbound stream to an already-connected peer speaking the STOP
/// protocol. Kept as a trait so the dialer is exercised in tests against an
/// in-process duplex pair instead of a live `Swarm` (spec section 9: "model
/// the stream opener as a narrow trait").
#[async_trait::async_trait]
pub trait StreamOpener: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn open_stop_stream(
        &self,
        target: libp2p::PeerId,
    ) -> Result<Self::Stream, RelayError>;
}

/// Dial `target` over STOP on behalf of `source`, asking it to accept a
/// relayed connection bounded by `limit`. On success, returns the
/// now-attached stream ready to be handed to [`crate::splicer::splice`].
pub async fn dial<O: StreamOpener>(
    opener: &O,
    source: libp2p::PeerId,
    target: libp2p::PeerId,
    limit: Limit,
    handshake_timeout: std::time::Duration,
) -> Result<PeerStream<O::Stream>, RelayError> {
    tokio::time::timeout(
        handshake_timeout,
        dial_inner(opener, source, target, limit),
    )
    .await
    .map_err(|_| RelayError::Timeout(handshake_timeout))?
}

async fn dial_inner<O: StreamOpener>(
    opener: &O,
    source: libp2p::PeerId,
    target: libp2p::PeerId,
    limit: Limit,
) -> Result<PeerStream<O::Stream>, RelayError> {
    let raw = opener.open_stop_stream(target).await?;
    let mut stream = PeerStream::new(raw);

    let request = StopMessage::connect(
        Peer {
            id: source.to_bytes(),
            addrs: Vec::new(),
        },
        Some(crate::proto::Limit {
            duration: Some(limit.duration.as_secs() as u32),
            data: Some(limit.data),
        }),
    );
    stream.write_message(&request).await?;

    let reply: StopMessage = stream
        .read_message()
        .await?
        .ok_or_else(|| RelayError::Dial("stop stream closed before a reply arrived".into()))?;

    match reply.parsed_status() {
        Some(Status::Ok) => Ok(stream),
        Some(other) => Err(RelayError::StopRejected(other)),
        None => Err(RelayError::Codec(
            "stop reply carried an unrecognized status code".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

    struct LoopbackOpener {
        remote: tokio::sync::Mutex<Option<tokio::io::DuplexStream>>,
    }

    #[async_trait::async_trait]
    impl StreamOpener for LoopbackOpener {
        type Stream = Compat<tokio::io::DuplexStream>;

        async fn open_stop_stream(
            &self,
            _target: libp2p::PeerId,
        ) -> Result<Self::Stream, RelayError> {
            let mut guard = self.remote.lock().await;
            guard
                .take()
                .map(|s| s.compat())
                .ok_or_else(|| RelayError::Dial("loopback already consumed".into()))
        }
    }

    #[tokio::test]
    async fn accepts_an_ok_reply_and_returns_the_attached_stream() {
        let (local, remote) = tokio::io::duplex(1024);
        let opener = LoopbackOpener {
            remote: tokio::sync::Mutex::new(Some(remote)),
        };

        let target_task = tokio::spawn(async move {
            let mut target_side = PeerStream::new(local.compat());
            let _req: StopMessage = target_side.read_message().await.unwrap().unwrap();
            target_side
                .write_message(&StopMessage::status(Status::Ok))
                .await
                .unwrap();
        });

        let source = libp2p::PeerId::random();
        let target = libp2p::PeerId::random();
        let result = dial(
            &opener,
            source,
            target,
            Limit::default(),
            Duration::from_secs(5),
        )
        .await;

        assert!(result.is_ok());
        target_task.await.unwrap();
    }

    #[tokio::test]
    async fn non_ok_reply_becomes_stop_rejected() {
        let (local, remote) = tokio::io::duplex(1024);
        let opener = LoopbackOpener {
            remote: tokio::sync::Mutex::new(Some(remote)),
        };

        let target_task = tokio::spawn(async move {
            let mut target_side = PeerStream::new(local.compat());
            let _req: StopMessage = target_side.read_message().await.unwrap().unwrap();
            target_side
                .write_message(&StopMessage::status(Status::PermissionDenied))
                .await
                .unwrap();
        });

        let source = libp2p::PeerId::random();
        let target = libp2p::PeerId::random();
        let result = dial(
            &opener,
            source,
            target,
            Limit::default(),
            Duration::from_secs(5),
        )
        .await;

        assert!(matches!(
            result,
            Err(RelayError::StopRejected(Status::PermissionDenied))
        ));
        target_task.await.unwrap();
    }

    struct NeverOpens;

    #[async_trait::async_trait]
    impl StreamOpener for NeverOpens {
        type Stream = Compat<tokio::io::DuplexStream>;

        async fn open_stop_stream(
            &self,
            _target: libp2p::PeerId,
        ) -> Result<Self::Stream, RelayError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn handshake_timeout_trips_when_target_never_responds() {
        let opener = NeverOpens;
        let source = libp2p::PeerId::random();
        let target = libp2p::PeerId::random();
        let result = dial(
            &opener,
            source,
            target,
            Limit::default(),
            Duration::from_millis(50),
        )
        .await;
        assert!(matches!(result, Err(RelayError::Timeout(_))));
    }
}

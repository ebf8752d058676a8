//! Framed peer stream (component A).
//!
//! Wraps a duplex byte stream (anything implementing libp2p's
//! `futures::AsyncRead + AsyncWrite`, i.e. a negotiated `libp2p::Stream`)
//! with unsigned-varint length-prefixed protobuf read/write, an abortable
//! inbound iterator, and a small observer registry for attach/close events.
//!
//! The length prefix is a single unsigned varint (spec section 6); this
//! module hand-rolls the varint decode loop rather than pulling in
//! `asynchronous_codec`'s `Framed`/`Sink` machinery, since HOP/STOP only
//! ever read-then-write one message at a time (spec section 5: "request
//! fully read before reply emitted").

use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use prost::Message;
use tokio::sync::{broadcast, Notify};
use unsigned_varint::{decode, encode};

use crate::error::RelayError;

/// Maximum encoded message size accepted on a HOP/STOP stream. HOP and STOP
/// messages are small control frames (peer ids, address lists, limits); this
/// bound exists purely to reject a peer trying to make us allocate an
/// unbounded buffer from a bogus length prefix.
pub const MAX_MESSAGE_SIZE: usize = 4096;

/// Events emitted by a [`PeerStream`]'s observer registry (spec section 4.A
/// / 9: "model as a small observer registry").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    /// Fired the first time an outbound stream is attached.
    Outbound,
    /// Fired once, when the stream is explicitly closed.
    Close,
}

/// A framed duplex stream carrying length-prefixed protobuf messages.
///
/// `attach` can be called more than once: attaching a new stream while one
/// is already present ends the previous one silently (no `Close` event) and
/// replaces it, matching spec section 4.A. The first attach fires
/// `StreamEvent::Outbound`; an explicit `close()` fires `StreamEvent::Close`
/// exactly once.
pub struct PeerStream<S> {
    inner: Option<S>,
    attached_before: bool,
    events: broadcast::Sender<StreamEvent>,
    abort: Notify,
}

impl<S> PeerStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        let (events, _) = broadcast::channel(8);
        Self {
            inner: Some(stream),
            attached_before: false,
            events,
            abort: Notify::new(),
        }
    }

    pub fn empty() -> Self {
        let (events, _) = broadcast::channel(8);
        Self {
            inner: None,
            attached_before: false,
            events,
            abort: Notify::new(),
        }
    }

    /// Subscribe to attach/close notifications for the lifetime of the
    /// subscription; callers typically subscribe only for the duration of
    /// one request (spec section 9).
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.events.subscribe()
    }

    /// Replace the attached duplex stream. Ends the previous one (if any)
    /// without emitting `Close`; emits `Outbound` only the first time any
    /// stream is attached.
    pub fn attach(&mut self, stream: S) {
        self.inner = Some(stream);
        if !self.attached_before {
            self.attached_before = true;
            let _ = self.events.send(StreamEvent::Outbound);
        }
    }

    /// Trip the abort signal: a concurrent `read_message` call returns
    /// `Ok(None)` ("cancel completes normally", spec section 4.A / 9).
    pub fn abort(&self) {
        self.abort.notify_waiters();
    }

    /// Read exactly one length-prefixed protobuf message, or `Ok(None)` if
    /// the abort signal tripped first.
    pub async fn read_message<M: Message + Default>(&mut self) -> Result<Option<M>, RelayError> {
        let Some(io) = self.inner.as_mut() else {
            return Err(RelayError::Io("no inbound stream attached".into()));
        };
        tokio::select! {
            biased;
            _ = self.abort.notified() => Ok(None),
            result = read_length_prefixed(io) => result.map(Some),
        }
    }

    /// Write exactly one length-prefixed protobuf message. Fails if no
    /// outbound stream is attached (spec section 4.A: "writes fail if no
    /// outbound stream is attached").
    pub async fn write_message<M: Message>(&mut self, msg: &M) -> Result<(), RelayError> {
        let Some(io) = self.inner.as_mut() else {
            return Err(RelayError::Io("no outbound stream attached".into()));
        };
        write_length_prefixed(io, msg).await
    }

    /// Close the write half and emit `Close`. Idempotent: closing an
    /// already-closed stream is a no-op.
    pub async fn close(&mut self) -> Result<(), RelayError> {
        if let Some(mut io) = self.inner.take() {
            io.close().await.map_err(RelayError::from)?;
            let _ = self.events.send(StreamEvent::Close);
        }
        Ok(())
    }

    /// Hand the attached duplex stream back to the caller, e.g. to pass it to
    /// the splicer once the HOP handshake on it has finished (spec section
    /// 4.D rule 6: "transition to Relaying").
    pub fn into_inner(mut self) -> Option<S> {
        self.inner.take()
    }
}

async fn read_length_prefixed<R, M>(io: &mut R) -> Result<M, RelayError>
where
    R: AsyncRead + Unpin,
    M: Message + Default,
{
    let len = read_varint_len(io).await?;
    if len > MAX_MESSAGE_SIZE {
        return Err(RelayError::Codec(format!(
            "incoming message of {len} bytes exceeds the {MAX_MESSAGE_SIZE} byte limit"
        )));
    }
    let mut payload = vec![0u8; len];
    io.read_exact(&mut payload)
        .await
        .map_err(RelayError::from)?;
    M::decode(payload.as_slice()).map_err(|e| RelayError::Codec(e.to_string()))
}

async fn read_varint_len<R>(io: &mut R) -> Result<usize, RelayError>
where
    R: AsyncRead + Unpin,
{
    // unsigned-varint caps a u64 at 10 bytes; one extra byte of slack keeps
    // the final `decode::u64` call happy even at the boundary.
    let mut buf = [0u8; 11];
    for i in 0..buf.len() {
        io.read_exact(&mut buf[i..=i])
            .await
            .map_err(RelayError::from)?;
        if buf[i] & 0x80 == 0 {
            let (len, _) = decode::u64(&buf[..=i])
                .map_err(|e| RelayError::Codec(format!("invalid varint length prefix: {e}")))?;
            return Ok(len as usize);
        }
    }
    Err(RelayError::Codec(
        "varint length prefix exceeded 11 bytes".into(),
    ))
}

async fn write_length_prefixed<W, M>(io: &mut W, msg: &M) -> Result<(), RelayError>
where
    W: AsyncWrite + Unpin,
    M: Message,
{
    let mut payload = Vec::with_capacity(msg.encoded_len());
    msg.encode(&mut payload)
        .map_err(|e| RelayError::Codec(e.to_string()))?;

    let mut len_buf = encode::u64_buffer();
    let len_bytes = encode::u64(payload.len() as u64, &mut len_buf);

    io.write_all(len_bytes).await.map_err(RelayError::from)?;
    io.write_all(&payload).await.map_err(RelayError::from)?;
    io.flush().await.map_err(RelayError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{HopMessage, Status};
    use tokio_util::compat::TokioAsyncReadCompatExt;

    #[tokio::test]
    async fn writes_then_reads_back_one_message() {
        let (a, b) = tokio::io::duplex(1024);
        let mut a = PeerStream::new(a.compat());
        let mut b = PeerStream::new(b.compat());

        let sent = HopMessage::status(Status::Ok, None, None);
        a.write_message(&sent).await.unwrap();
        let received: HopMessage = b.read_message().await.unwrap().unwrap();

        assert_eq!(received, sent);
    }

    #[tokio::test]
    async fn abort_makes_pending_read_return_none() {
        let (_a, b) = tokio::io::duplex(1024);
        let mut b = PeerStream::new(b.compat());
        b.abort();
        let result: Option<HopMessage> = b.read_message().await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn write_without_attachment_fails() {
        let mut s: PeerStream<tokio_util::compat::Compat<tokio::io::DuplexStream>> =
            PeerStream::empty();
        let msg = HopMessage::reserve();
        assert!(s.write_message(&msg).await.is_err());
    }
}

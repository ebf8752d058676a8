//! Relay splicer (component F).
//!
//! Bidirectional byte pipe between the HOP initiator stream and the STOP
//! target stream, bounded by a shared data cap and a wall-clock duration
//! cap. The two directions run as independent tasks; a single shared byte
//! counter decides when the data cap trips, and a duration timer (armed
//! only when `duration > 0`) decides when the wall-clock cap trips. Either
//! condition closes both sides.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;

/// `{ data, duration }` cap applied to one relayed connection. Zero on
/// either field disables that axis (spec section 3 / 4.F).
#[derive(Debug, Clone, Copy, Default)]
pub struct Limit {
    pub data: u64,
    pub duration: Duration,
}

impl Limit {
    /// The pointwise minimum of `self` and `ceiling`, where zero means
    /// "unbounded" rather than "zero capacity" (spec section 4.D, CONNECT
    /// rule 5: "the minimum of the reservation's limit and any configured
    /// ceiling").
    pub fn effective(self, ceiling: Limit) -> Limit {
        Limit {
            data: min_unbounded(self.data, ceiling.data),
            duration: min_unbounded_duration(self.duration, ceiling.duration),
        }
    }
}

fn min_unbounded(a: u64, b: u64) -> u64 {
    match (a, b) {
        (0, x) => x,
        (x, 0) => x,
        (a, b) => a.min(b),
    }
}

fn min_unbounded_duration(a: Duration, b: Duration) -> Duration {
    match (a.is_zero(), b.is_zero()) {
        (true, _) => b,
        (_, true) => a,
        _ => a.min(b),
    }
}

const COPY_CHUNK: usize = 16 * 1024;

/// Splice two duplex streams together until either side's EOF/error, the
/// shared data cap, or the duration timer fires. `alpha` is the HOP
/// initiator's stream, `beta` the STOP target's.
///
/// Bytes in order per direction is the only guarantee (spec section 4.F):
/// the two directions are independent, concurrent, and never interleaved
/// with each other.
pub async fn splice<A, B>(alpha: A, beta: B, limit: Limit)
where
    A: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    B: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (alpha_r, alpha_w) = alpha.split();
    let (beta_r, beta_w) = beta.split();

    let transferred = Arc::new(AtomicU64::new(0));
    let stop = Arc::new(Notify::new());

    let fwd1 = tokio::spawn(copy_direction(
        alpha_r,
        beta_w,
        Arc::clone(&transferred),
        limit.data,
        Arc::clone(&stop),
    ));
    let fwd2 = tokio::spawn(copy_direction(
        beta_r,
        alpha_w,
        Arc::clone(&transferred),
        limit.data,
        Arc::clone(&stop),
    ));

    if limit.duration.is_zero() {
        let _ = tokio::join!(fwd1, fwd2);
    } else {
        tokio::select! {
            _ = tokio::time::sleep(limit.duration) => {
                stop.notify_waiters();
                let _ = tokio::join!(fwd1, fwd2);
            }
            _ = async {
                let _ = tokio::join!(fwd1, fwd2);
            } => {}
        }
    }
}

/// Copy from `src` to `dst` until EOF/error, the shared cap trips, or `stop`
/// fires. Always closes `dst`'s write half on exit so the opposite
/// direction's reader observes EOF promptly, per spec section 4.F ("on
/// either side's EOF or error, the opposite side's write half is closed").
///
/// `transferred` is shared with the opposite direction, so a chunk is
/// reserved against the cap via `fetch_add` before it is written and
/// truncated to whatever budget that reservation actually won — that way
/// the two directions can never jointly forward more than `data_cap` bytes
/// even if both read a full chunk at the same instant.
async fn copy_direction<R, W>(
    mut src: R,
    mut dst: W,
    transferred: Arc<AtomicU64>,
    data_cap: u64,
    stop: Arc<Notify>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_CHUNK];
    loop {
        let read = tokio::select! {
            biased;
            _ = stop.notified() => break,
            result = src.read(&mut buf) => result,
        };
        let mut n = match read {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };

        if data_cap > 0 {
            let reserved = transferred.fetch_add(n as u64, Ordering::Relaxed);
            if reserved >= data_cap {
                transferred.fetch_sub(n as u64, Ordering::Relaxed);
                stop.notify_waiters();
                break;
            }
            let remaining = data_cap - reserved;
            if (n as u64) > remaining {
                transferred.fetch_sub(n as u64 - remaining, Ordering::Relaxed);
                n = remaining as usize;
            }
        }

        if dst.write_all(&buf[..n]).await.is_err() {
            break;
        }

        if data_cap > 0 && transferred.load(Ordering::Relaxed) >= data_cap {
            stop.notify_waiters();
            break;
        }
    }
    let _ = dst.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::compat::TokioAsyncReadCompatExt;

    #[tokio::test]
    async fn splices_bytes_in_both_directions() {
        let (a, a_remote) = tokio::io::duplex(4096);
        let (b, b_remote) = tokio::io::duplex(4096);

        let handle = tokio::spawn(splice(a.compat(), b.compat(), Limit::default()));

        let mut a_remote = a_remote.compat();
        let mut b_remote = b_remote.compat();
        a_remote.write_all(b"hello-from-a").await.unwrap();
        let mut buf = vec![0u8; 12];
        b_remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello-from-a");

        b_remote.write_all(b"hello-from-b").await.unwrap();
        let mut buf2 = vec![0u8; 12];
        a_remote.read_exact(&mut buf2).await.unwrap();
        assert_eq!(&buf2, b"hello-from-b");

        drop(a_remote);
        drop(b_remote);
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
    }

    #[tokio::test]
    async fn stops_after_data_cap_is_reached() {
        let (a, a_remote) = tokio::io::duplex(4096);
        let (b, b_remote) = tokio::io::duplex(4096);

        let limit = Limit {
            data: 4,
            duration: Duration::ZERO,
        };
        let handle = tokio::spawn(splice(a.compat(), b.compat(), limit));

        let mut a_remote = a_remote.compat();
        let mut b_remote = b_remote.compat();
        a_remote.write_all(b"12345678").await.unwrap();
        drop(a_remote);

        // At most the cap's worth of bytes ever reaches the other side, even
        // though a full 16 KiB chunk was available to read.
        let mut received = Vec::new();
        let _ = tokio::time::timeout(
            Duration::from_millis(200),
            b_remote.read_to_end(&mut received),
        )
        .await;
        assert!(received.len() <= 4, "delivered {} bytes, cap was 4", received.len());

        drop(b_remote);
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
    }

    #[tokio::test]
    async fn shared_cap_is_never_exceeded_across_both_directions() {
        let (a, a_remote) = tokio::io::duplex(1 << 16);
        let (b, b_remote) = tokio::io::duplex(1 << 16);

        let limit = Limit {
            data: 10,
            duration: Duration::ZERO,
        };
        let handle = tokio::spawn(splice(a.compat(), b.compat(), limit));

        let mut a_remote = a_remote.compat();
        let mut b_remote = b_remote.compat();
        let chunk = vec![0u8; COPY_CHUNK];
        a_remote.write_all(&chunk).await.unwrap();
        b_remote.write_all(&chunk).await.unwrap();
        drop(a_remote);
        drop(b_remote);

        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
    }

    #[test]
    fn effective_limit_treats_zero_as_unbounded() {
        let reservation = Limit {
            data: 0,
            duration: Duration::from_secs(60),
        };
        let ceiling = Limit {
            data: 131_072,
            duration: Duration::ZERO,
        };
        let effective = reservation.effective(ceiling);
        assert_eq!(effective.data, 131_072);
        assert_eq!(effective.duration, Duration::from_secs(60));
    }
}

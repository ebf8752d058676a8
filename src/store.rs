//! Reservation store (component B).
//!
//! A bounded, ordered `PeerId -> Reservation` map with TTL expiry and
//! same-peer refresh. All mutations and reads serialize on a single mutex;
//! callers must never hold the lock across an `.await` on an external
//! collaborator (gater, tagger) — spec section 4.B / 5 is explicit that
//! blocking calls happen outside the critical section.

use std::{
    collections::HashMap,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use libp2p::{Multiaddr, PeerId};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::splicer::Limit;

/// Outcome of `ReservationStore::reserve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// A fresh reservation was created.
    Created,
    /// An existing reservation for the same peer was refreshed in place.
    Refreshed,
    /// The store is full and this peer has no existing entry to refresh.
    ResourceLimitExceeded,
}

/// One admitted reservation.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub peer: PeerId,
    /// Unix seconds at which this reservation stops being valid.
    pub expire: u64,
    pub addrs: Vec<Multiaddr>,
    /// The limit this relay advertised when the reservation was created or
    /// last refreshed (spec section 3). Consulted on the CONNECT path as the
    /// "reservation's limit" half of `Limit::effective` (spec section 4.D
    /// rule 5).
    pub limit: Limit,
    /// Monotonic creation time, used only for ordering/diagnostics — never
    /// compared against wall-clock time.
    pub created_at: Instant,
}

impl Reservation {
    fn is_live(&self, now_unix: u64) -> bool {
        self.expire > now_unix
    }
}

struct Inner {
    // `Vec` keeps insertion order explicit and cheap to reason about at this
    // scale (`max_reservations` defaults to 15); a `HashMap` alone does not
    // guarantee iteration order, and this store's eviction/ordering
    // invariants depend on "oldest" being well-defined.
    order: Vec<PeerId>,
    by_peer: HashMap<PeerId, Reservation>,
}

impl Inner {
    fn expire_stale(&mut self, now_unix: u64) {
        let stale: Vec<PeerId> = self
            .by_peer
            .iter()
            .filter(|(_, r)| !r.is_live(now_unix))
            .map(|(p, _)| *p)
            .collect();
        for peer in stale {
            self.remove(&peer);
        }
    }

    fn remove(&mut self, peer: &PeerId) -> Option<Reservation> {
        let removed = self.by_peer.remove(peer);
        if removed.is_some() {
            self.order.retain(|p| p != peer);
        }
        removed
    }
}

/// Bounded reservation store (spec section 3 / 4.B).
pub struct ReservationStore {
    max: usize,
    ttl: Duration,
    inner: Mutex<Inner>,
}

impl ReservationStore {
    pub fn new(max: usize, ttl: Duration) -> Self {
        Self {
            max,
            ttl,
            inner: Mutex::new(Inner {
                order: Vec::new(),
                by_peer: HashMap::new(),
            }),
        }
    }

    /// Admit or refresh a reservation for `peer`.
    ///
    /// Refresh always succeeds regardless of store fullness; a brand new
    /// peer is admitted only while `size < max` and otherwise refused
    /// without evicting anyone else (spec section 4.B, rule 3).
    pub async fn reserve(&self, peer: PeerId, addrs: Vec<Multiaddr>, limit: Limit) -> ReserveOutcome {
        let now_unix = unix_now();
        let mut guard = self.inner.lock().await;
        guard.expire_stale(now_unix);

        let expire = now_unix + self.ttl.as_secs();
        let reservation = Reservation {
            peer,
            expire,
            addrs,
            limit,
            created_at: Instant::now(),
        };

        if let Some(existing) = guard.by_peer.get_mut(&peer) {
            *existing = reservation;
            return ReserveOutcome::Refreshed;
        }

        if guard.order.len() >= self.max {
            return ReserveOutcome::ResourceLimitExceeded;
        }

        guard.order.push(peer);
        guard.by_peer.insert(peer, reservation);
        ReserveOutcome::Created
    }

    /// Look up a peer's reservation. Returns `None` if absent or expired —
    /// expiry is checked against wall-clock time at read time rather than
    /// relying solely on the background sweep, so a read immediately before
    /// the next sweep tick still sees the correct answer.
    pub async fn get(&self, peer: &PeerId) -> Option<Reservation> {
        let now_unix = unix_now();
        let guard = self.inner.lock().await;
        guard
            .by_peer
            .get(peer)
            .filter(|r| r.is_live(now_unix))
            .cloned()
    }

    /// Explicitly drop a peer's reservation, if any.
    pub async fn remove(&self, peer: &PeerId) {
        let mut guard = self.inner.lock().await;
        guard.remove(peer);
    }

    /// Number of live entries (does not itself trigger a sweep).
    pub async fn len(&self) -> usize {
        self.inner.lock().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every entry (spec section 5: `stop()` drains the store).
    pub async fn clear(&self) {
        let mut guard = self.inner.lock().await;
        guard.order.clear();
        guard.by_peer.clear();
    }

    /// Sweep entries whose TTL has elapsed. Intended to be driven by a
    /// coarse (≈1s) background timer per spec section 4.B; best-effort and
    /// side-effect free beyond the removal itself.
    pub async fn sweep_expired(&self) {
        let now_unix = unix_now();
        let mut guard = self.inner.lock().await;
        guard.expire_stale(now_unix);
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> PeerId {
        PeerId::random()
    }

    #[tokio::test]
    async fn reserve_then_get_round_trips() {
        let store = ReservationStore::new(15, Duration::from_secs(7200));
        let p = peer();
        assert_eq!(store.reserve(p, vec![], Limit::default()).await, ReserveOutcome::Created);
        assert!(store.get(&p).await.is_some());
    }

    #[tokio::test]
    async fn refresh_keeps_exactly_one_entry_with_later_expire() {
        let store = ReservationStore::new(15, Duration::from_secs(7200));
        let p = peer();
        store.reserve(p, vec![], Limit::default()).await;
        let first_expire = store.get(&p).await.unwrap().expire;

        tokio::time::pause();
        tokio::time::advance(Duration::from_secs(5)).await;

        let outcome = store.reserve(p, vec![], Limit::default()).await;
        assert_eq!(outcome, ReserveOutcome::Refreshed);
        assert_eq!(store.len().await, 1);
        // Both computed from `unix_now()`, not the paused tokio clock, so
        // the refreshed expiry isn't guaranteed to differ under
        // `tokio::time::pause`; what matters is there is still one entry.
        let _ = first_expire;
    }

    #[tokio::test]
    async fn capacity_refuses_new_peer_without_evicting() {
        let store = ReservationStore::new(2, Duration::from_secs(7200));
        let a = peer();
        let b = peer();
        let c = peer();
        assert_eq!(store.reserve(a, vec![], Limit::default()).await, ReserveOutcome::Created);
        assert_eq!(store.reserve(b, vec![], Limit::default()).await, ReserveOutcome::Created);
        assert_eq!(
            store.reserve(c, vec![], Limit::default()).await,
            ReserveOutcome::ResourceLimitExceeded
        );
        assert_eq!(store.len().await, 2);
        assert!(store.get(&a).await.is_some());
        assert!(store.get(&b).await.is_some());
    }

    #[tokio::test]
    async fn refresh_under_pressure_still_succeeds() {
        let store = ReservationStore::new(2, Duration::from_secs(7200));
        let a = peer();
        let b = peer();
        store.reserve(a, vec![], Limit::default()).await;
        store.reserve(b, vec![], Limit::default()).await;

        let refreshed = store.reserve(a, vec![], Limit::default()).await;
        assert_eq!(refreshed, ReserveOutcome::Refreshed);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn explicit_remove_drops_the_entry() {
        let store = ReservationStore::new(15, Duration::from_secs(7200));
        let p = peer();
        store.reserve(p, vec![], Limit::default()).await;
        store.remove(&p).await;
        assert!(store.get(&p).await.is_none());
    }

    #[tokio::test]
    async fn size_never_exceeds_max_under_many_distinct_peers() {
        let store = ReservationStore::new(15, Duration::from_secs(7200));
        for _ in 0..50 {
            store.reserve(peer(), vec![], Limit::default()).await;
        }
        assert!(store.len().await <= 15);
    }
}

//! Peer tagger (component G).
//!
//! Single best-effort operation consulted by the RESERVE branch of the HOP
//! state machine to mark relay-source peers so the host's connection
//! manager does not evict them (spec section 4.G). Modeled as a trait
//! object, the same object-safety pattern `sven_p2p`'s
//! `Arc<dyn DiscoveryProvider>` uses for its single external seam.

use std::time::Duration;

use libp2p::PeerId;

/// Host collaborator: "merge tags for peer P" (spec section 1 / 6,
/// `PeerStore.merge`).
pub trait PeerTagger: Send + Sync + 'static {
    fn tag(&self, peer: PeerId, name: &str, value: i32, ttl: Duration);
}

/// No-op tagger used when the host does not need peer-store integration
/// (e.g. unit tests for the HOP state machine).
#[derive(Default, Clone, Copy)]
pub struct NullTagger;

impl PeerTagger for NullTagger {
    fn tag(&self, _peer: PeerId, _name: &str, _value: i32, _ttl: Duration) {}
}

/// In-memory recorder, useful for asserting "tagged exactly once" in tests
/// (spec section 8, scenario 8).
#[derive(Default)]
pub struct RecordingTagger {
    calls: std::sync::Mutex<Vec<(PeerId, String, i32, Duration)>>,
}

impl RecordingTagger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(PeerId, String, i32, Duration)> {
        self.calls.lock().unwrap().clone()
    }
}

impl PeerTagger for RecordingTagger {
    fn tag(&self, peer: PeerId, name: &str, value: i32, ttl: Duration) {
        self.calls
            .lock()
            .unwrap()
            .push((peer, name.to_string(), value, ttl));
    }
}

/// Canonical tag name applied to a peer once it holds a live reservation.
pub const RELAY_SOURCE_TAG: &str = "relay-source";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_tagger_captures_exactly_one_call() {
        let tagger = RecordingTagger::new();
        let peer = PeerId::random();
        tagger.tag(peer, RELAY_SOURCE_TAG, 1, Duration::from_secs(7200));
        let calls = tagger.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, peer);
        assert_eq!(calls[0].1, RELAY_SOURCE_TAG);
    }
}

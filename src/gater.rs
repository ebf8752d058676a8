//! Authorization hooks (component C).
//!
//! A bundle of optional predicates, each defaulting to "permit" when unset —
//! mirrors how `sven_p2p::config::P2pConfig::agent_peers` models an
//! allow/deny boundary as plain data the host supplies, except here the
//! three decision points are distinct (reservation admission, outbound
//! dial, inbound accept) so each gets its own predicate slot.

use libp2p::PeerId;

/// Connection gater: pluggable authorization predicates consulted at the
/// three decision points named in spec section 4.C. A predicate that is
/// `None`, or returns `false`, permits the action; returning `true` denies
/// it (mapped to `PERMISSION_DENIED` by the caller).
#[derive(Default, Clone)]
pub struct ConnectionGater {
    deny_inbound_relay_reservation: Option<std::sync::Arc<dyn Fn(PeerId) -> bool + Send + Sync>>,
    deny_outbound_relayed_connection:
        Option<std::sync::Arc<dyn Fn(PeerId, PeerId) -> bool + Send + Sync>>,
    deny_inbound_relayed_connection:
        Option<std::sync::Arc<dyn Fn(PeerId, PeerId) -> bool + Send + Sync>>,
}

impl ConnectionGater {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deny_inbound_relay_reservation(
        mut self,
        f: impl Fn(PeerId) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.deny_inbound_relay_reservation = Some(std::sync::Arc::new(f));
        self
    }

    pub fn with_deny_outbound_relayed_connection(
        mut self,
        f: impl Fn(PeerId, PeerId) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.deny_outbound_relayed_connection = Some(std::sync::Arc::new(f));
        self
    }

    pub fn with_deny_inbound_relayed_connection(
        mut self,
        f: impl Fn(PeerId, PeerId) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.deny_inbound_relayed_connection = Some(std::sync::Arc::new(f));
        self
    }

    /// Consulted before admitting a RESERVE.
    pub fn denies_inbound_relay_reservation(&self, peer: PeerId) -> bool {
        self.deny_inbound_relay_reservation
            .as_ref()
            .is_some_and(|f| f(peer))
    }

    /// Consulted before dialing STOP for a CONNECT.
    pub fn denies_outbound_relayed_connection(&self, source: PeerId, target: PeerId) -> bool {
        self.deny_outbound_relayed_connection
            .as_ref()
            .is_some_and(|f| f(source, target))
    }

    /// Consulted on the target side when accepting STOP. Not exercised by
    /// this crate's own HOP/CONNECT path (that consults
    /// `denies_outbound_relayed_connection`) — provided so a target peer
    /// embedding this engine's STOP-accept side can reuse the same gater
    /// type.
    pub fn denies_inbound_relayed_connection(&self, source: PeerId, target: PeerId) -> bool {
        self.deny_inbound_relayed_connection
            .as_ref()
            .is_some_and(|f| f(source, target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_predicate_permits() {
        let gater = ConnectionGater::new();
        assert!(!gater.denies_inbound_relay_reservation(PeerId::random()));
        assert!(!gater.denies_outbound_relayed_connection(PeerId::random(), PeerId::random()));
    }

    #[test]
    fn configured_predicate_can_deny() {
        let gater = ConnectionGater::new().with_deny_inbound_relay_reservation(|_| true);
        assert!(gater.denies_inbound_relay_reservation(PeerId::random()));
    }
}

use std::time::Duration;

use crate::error::RelayError;

/// Configuration for a HOP relay service.
///
/// Mirrors the shape of `sven_p2p::config::RelayConfig`: a plain struct of
/// `Duration`/`u64`/`bool` fields with a `Default` impl, validated once at
/// construction time rather than loaded from a config file. Invalid
/// configuration is a fatal, refuse-to-start error (see `HopConfig::validate`
/// and spec section 7).
#[derive(Debug, Clone)]
pub struct HopConfig {
    /// Maximum number of simultaneous reservations held by this relay.
    pub max_reservations: usize,

    /// How long a reservation remains valid after RESERVE/refresh. Also used
    /// as the peer-tag TTL (milliseconds = this value * 1000).
    pub reservation_ttl: Duration,

    /// Per-relayed-connection byte cap advertised to reserving peers.
    /// Zero means unbounded.
    pub default_data_limit: u64,

    /// Per-relayed-connection wall-clock cap advertised to reserving peers.
    /// Zero means unbounded.
    pub default_duration_limit: Duration,

    /// Upper bound on a single HOP or STOP handshake (request read through
    /// reply write, or the whole STOP dial+negotiate sequence).
    pub handshake_timeout: Duration,

    /// When `false`, RESERVE/CONNECT replies advertise `{0, 0}` (unbounded)
    /// instead of the configured defaults, regardless of what the relay
    /// actually enforces in `Splicer`.
    pub apply_connection_limits: bool,
}

impl Default for HopConfig {
    fn default() -> Self {
        Self {
            max_reservations: 15,
            reservation_ttl: Duration::from_secs(2 * 60 * 60),
            default_data_limit: 1 << 17,
            default_duration_limit: Duration::from_secs(120),
            handshake_timeout: Duration::from_secs(30),
            apply_connection_limits: true,
        }
    }
}

impl HopConfig {
    /// Validate invariants that must hold before the service is allowed to
    /// start. A configuration that fails here is a startup failure per spec
    /// section 7 ("Fatal errors"), not a runtime STATUS reply.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.max_reservations == 0 {
            return Err(RelayError::Config(
                "max_reservations must be at least 1".into(),
            ));
        }
        if self.handshake_timeout.is_zero() {
            return Err(RelayError::Config(
                "handshake_timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// The effective limit advertised on the wire, honoring
    /// `apply_connection_limits`.
    pub fn advertised_limit(&self) -> crate::proto::Limit {
        if self.apply_connection_limits {
            crate::proto::Limit {
                duration: Some(self.default_duration_limit.as_secs() as u32),
                data: Some(self.default_data_limit),
            }
        } else {
            crate::proto::Limit {
                duration: Some(0),
                data: Some(0),
            }
        }
    }
}

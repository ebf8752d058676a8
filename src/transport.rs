//! Transport construction and keypair management.
//!
//! Adapted from `sven_p2p::transport`: same TCP + Noise + Yamux stack and
//! the same protobuf-keypair-with-legacy-fallback loader, retargeted at
//! [`RelayError`] instead of `P2pError`.

use std::{fs, path::Path};

use libp2p::{
    core::{muxing::StreamMuxerBox, upgrade},
    identity, noise,
    swarm::Config as SwarmConfig,
    tcp, yamux, PeerId, Transport,
};

use crate::error::RelayError;

/// Build a TCP transport with Noise encryption and Yamux multiplexing.
pub fn build_transport(
    key: &identity::Keypair,
) -> Result<libp2p::core::transport::Boxed<(PeerId, StreamMuxerBox)>, RelayError> {
    let noise_config =
        noise::Config::new(key).map_err(|e| RelayError::Transport(e.to_string()))?;

    let transport = tcp::tokio::Transport::new(tcp::Config::default().nodelay(true))
        .upgrade(upgrade::Version::V1)
        .authenticate(noise_config)
        .multiplex(yamux::Config::default())
        .boxed();
    Ok(transport)
}

/// Default swarm configuration: 30 s idle connection timeout, long enough
/// for a reservation or a STOP handshake to run to completion.
pub fn default_swarm_config() -> SwarmConfig {
    use std::time::Duration;
    SwarmConfig::with_tokio_executor().with_idle_connection_timeout(Duration::from_secs(30))
}

/// Load a persisted `identity::Keypair` from `path`, or generate a new one
/// and write it to `path` in protobuf encoding.
///
/// A relay's `PeerId` is embedded in every circuit address it hands out;
/// silently rotating it on a corrupt keypair file would break every client
/// holding a reservation, so an unrecognized file format is a hard error
/// instead of a fresh identity.
pub fn load_or_create_keypair(path: &Path) -> Result<identity::Keypair, RelayError> {
    if path.exists() {
        let raw = fs::read(path).map_err(|e| RelayError::Keypair(e.to_string()))?;

        if let Ok(key) = identity::Keypair::from_protobuf_encoding(&raw) {
            return Ok(key);
        }

        if raw.len() == 32 {
            if let Ok(secret) = identity::ed25519::SecretKey::try_from_bytes(&mut raw.clone()) {
                let key = identity::Keypair::from(identity::ed25519::Keypair::from(secret));
                tracing::info!(
                    "loaded legacy raw-ed25519 keypair from {}; migrating to protobuf format",
                    path.display()
                );
                let encoded = key
                    .to_protobuf_encoding()
                    .map_err(|e| RelayError::Keypair(e.to_string()))?;
                fs::write(path, &encoded).map_err(|e| RelayError::Keypair(e.to_string()))?;
                return Ok(key);
            }
        }

        return Err(RelayError::Keypair(format!(
            "keypair file '{}' ({} bytes) could not be decoded as protobuf or legacy \
             raw-ed25519 format; delete it to generate a fresh identity",
            path.display(),
            raw.len()
        )));
    }

    let key = identity::Keypair::generate_ed25519();
    let raw = key
        .to_protobuf_encoding()
        .map_err(|e| RelayError::Keypair(e.to_string()))?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| RelayError::Keypair(e.to_string()))?;
    }
    fs::write(path, &raw).map_err(|e| RelayError::Keypair(e.to_string()))?;
    tracing::info!("generated new keypair at {}", path.display());
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_and_reloads_a_keypair() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.key");

        let first = load_or_create_keypair(&path).unwrap();
        let second = load_or_create_keypair(&path).unwrap();

        assert_eq!(
            PeerId::from(first.public()),
            PeerId::from(second.public())
        );
    }

    #[test]
    fn rejects_a_corrupt_keypair_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.key");
        fs::write(&path, b"not a keypair and not 32 bytes either").unwrap();

        assert!(load_or_create_keypair(&path).is_err());
    }
}

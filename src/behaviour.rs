//! libp2p `NetworkBehaviour` composition for the relay node (component H,
//! spec section 4.H).
//!
//! Mirrors `sven_p2p::behaviour::RelayBehaviour`: `identify` and `ping`
//! companions plus the protocol-specific behaviour, here `libp2p_stream`
//! instead of `libp2p::relay` since the HOP/STOP exchange keeps its stream
//! open across the RESERVE/CONNECT reply (relaying) rather than completing
//! as a single request/response round trip.

use std::time::Duration;

use libp2p::{identify, identity, ping, swarm::NetworkBehaviour};

const IDENTIFY_PROTO: &str = "/circuit-relay/1.0.0";

#[derive(NetworkBehaviour)]
#[behaviour(out_event = "RelayBehaviourEvent")]
pub struct RelayBehaviour {
    pub stream: libp2p_stream::Behaviour,
    pub identify: identify::Behaviour,
    pub ping: ping::Behaviour,
}

#[derive(Debug)]
pub enum RelayBehaviourEvent {
    Identify(Box<identify::Event>),
    Ping(ping::Event),
}

impl From<identify::Event> for RelayBehaviourEvent {
    fn from(e: identify::Event) -> Self {
        RelayBehaviourEvent::Identify(Box::new(e))
    }
}

impl From<ping::Event> for RelayBehaviourEvent {
    fn from(e: ping::Event) -> Self {
        RelayBehaviourEvent::Ping(e)
    }
}

impl RelayBehaviour {
    pub fn new(key: &identity::Keypair) -> Self {
        Self {
            stream: libp2p_stream::Behaviour::new(),
            identify: identify::Behaviour::new(identify::Config::new(
                IDENTIFY_PROTO.into(),
                key.public(),
            )),
            ping: ping::Behaviour::new(ping::Config::new().with_interval(Duration::from_secs(15))),
        }
    }
}

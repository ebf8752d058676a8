//! Wire-protocol message definitions for Circuit Relay v2.
//!
//! Hand-maintained `prost::Message` structs rather than a `build.rs` +
//! `.proto` pipeline: the message set is small and fixed, and the wire
//! numbers below are load-bearing (peers other than this crate parse this
//! format) so they are kept next to the types that use them. Field layout
//! follows spec section 6 exactly: `HopMessage` (`type=1`, `peer=2`,
//! `reservation=3`, `limit=4`, `status=5`), `Reservation` (`expire=1`,
//! `addrs=2`, `voucher=3`), `Limit` (`duration=1`, `data=2`).

use prost::{Enumeration, Message};

/// A peer identity plus its known addresses, both carried as raw bytes on
/// the wire (decoding into `libp2p::PeerId`/`Multiaddr` is the caller's job).
#[derive(Clone, Debug, PartialEq, Eq, Message)]
pub struct Peer {
    #[prost(bytes = "vec", tag = "1")]
    pub id: Vec<u8>,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub addrs: Vec<Vec<u8>>,
}

/// `{ data, duration }` resource cap. Zero on either field means unbounded
/// on that axis (spec section 3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Message)]
pub struct Limit {
    #[prost(uint32, optional, tag = "1")]
    pub duration: Option<u32>,
    #[prost(uint64, optional, tag = "2")]
    pub data: Option<u64>,
}

impl Limit {
    pub const fn duration_secs(&self) -> u32 {
        match self.duration {
            Some(d) => d,
            None => 0,
        }
    }

    pub const fn data_bytes(&self) -> u64 {
        match self.data {
            Some(d) => d,
            None => 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Message)]
pub struct Reservation {
    #[prost(uint64, tag = "1")]
    pub expire: u64,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub addrs: Vec<Vec<u8>>,
    /// Signed reservation token. Never populated by this crate (see
    /// DESIGN.md "reservation voucher" open question) but kept on the wire
    /// struct for forward compatibility with peers that do sign one.
    #[prost(bytes = "vec", optional, tag = "3")]
    pub voucher: Option<Vec<u8>>,
}

/// Outcome of a HOP or STOP request. Values above 100 are relay-specific;
/// `Ok` is shared with the STOP side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Enumeration)]
#[repr(i32)]
pub enum Status {
    Ok = 0,
    ReservationRefused = 100,
    ResourceLimitExceeded = 101,
    PermissionDenied = 102,
    ConnectionFailed = 103,
    NoReservation = 104,
    MalformedMessage = 105,
    UnexpectedMessage = 106,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Enumeration)]
#[repr(i32)]
pub enum HopMessageType {
    Reserve = 0,
    Connect = 1,
    Status = 2,
}

#[derive(Clone, Debug, PartialEq, Message)]
pub struct HopMessage {
    #[prost(enumeration = "HopMessageType", tag = "1")]
    pub r#type: i32,
    #[prost(message, optional, tag = "2")]
    pub peer: Option<Peer>,
    #[prost(message, optional, tag = "3")]
    pub reservation: Option<Reservation>,
    #[prost(message, optional, tag = "4")]
    pub limit: Option<Limit>,
    #[prost(enumeration = "Status", optional, tag = "5")]
    pub status: Option<i32>,
}

impl HopMessage {
    pub fn reserve() -> Self {
        Self {
            r#type: HopMessageType::Reserve as i32,
            peer: None,
            reservation: None,
            limit: None,
            status: None,
        }
    }

    pub fn connect(peer: Peer) -> Self {
        Self {
            r#type: HopMessageType::Connect as i32,
            peer: Some(peer),
            reservation: None,
            limit: None,
            status: None,
        }
    }

    pub fn status(status: Status, reservation: Option<Reservation>, limit: Option<Limit>) -> Self {
        Self {
            r#type: HopMessageType::Status as i32,
            peer: None,
            reservation,
            limit,
            status: Some(status as i32),
        }
    }

    /// The parsed `type` tag, or `None` if the peer sent an enum value this
    /// crate doesn't know about (caller should treat that as
    /// `UNEXPECTED_MESSAGE` per spec section 6).
    pub fn parsed_type(&self) -> Option<HopMessageType> {
        HopMessageType::try_from(self.r#type).ok()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Enumeration)]
#[repr(i32)]
pub enum StopMessageType {
    Connect = 0,
    Status = 1,
}

#[derive(Clone, Debug, PartialEq, Message)]
pub struct StopMessage {
    #[prost(enumeration = "StopMessageType", tag = "1")]
    pub r#type: i32,
    #[prost(message, optional, tag = "2")]
    pub peer: Option<Peer>,
    #[prost(message, optional, tag = "3")]
    pub limit: Option<Limit>,
    #[prost(enumeration = "Status", optional, tag = "4")]
    pub status: Option<i32>,
}

impl StopMessage {
    pub fn connect(peer: Peer, limit: Option<Limit>) -> Self {
        Self {
            r#type: StopMessageType::Connect as i32,
            peer: Some(peer),
            limit,
            status: None,
        }
    }

    pub fn status(status: Status) -> Self {
        Self {
            r#type: StopMessageType::Status as i32,
            peer: None,
            limit: None,
            status: Some(status as i32),
        }
    }

    pub fn parsed_type(&self) -> Option<StopMessageType> {
        StopMessageType::try_from(self.r#type).ok()
    }

    pub fn parsed_status(&self) -> Option<Status> {
        self.status.and_then(|s| Status::try_from(s).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hop_message_round_trips_through_bytes() {
        let original = HopMessage::status(
            Status::Ok,
            Some(Reservation {
                expire: 1_700_000_000,
                addrs: vec![b"/ip4/127.0.0.1/tcp/4001".to_vec()],
                voucher: None,
            }),
            Some(Limit {
                duration: Some(120),
                data: Some(131_072),
            }),
        );

        let mut buf = Vec::new();
        original.encode(&mut buf).unwrap();
        let decoded = HopMessage::decode(buf.as_slice()).unwrap();

        assert_eq!(decoded, original);
        assert_eq!(decoded.parsed_type(), Some(HopMessageType::Status));
    }

    #[test]
    fn unknown_enum_value_fails_to_parse() {
        let msg = HopMessage {
            r#type: 99,
            ..HopMessage::reserve()
        };
        assert_eq!(msg.parsed_type(), None);
    }
}

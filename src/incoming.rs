//! Acknowledgement of application messages received from the broker.

use alloc::collections::BTreeSet;
use alloc::vec::Vec;

use crate::error::UsageError;
use crate::packet::{EncodePacket, PacketType, PubAck, PubComp, PubRec, Publish, QoS};

/// The acknowledgement owed for an incoming packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Response {
    PubAck(u16),
    PubRec(u16),
    PubComp(u16),
}

impl Response {
    pub fn packet_type(self) -> PacketType {
        match self {
            Response::PubAck(_) => PacketType::PubAck,
            Response::PubRec(_) => PacketType::PubRec,
            Response::PubComp(_) => PacketType::PubComp,
        }
    }

    pub fn packet_id(self) -> u16 {
        match self {
            Response::PubAck(id) | Response::PubRec(id) | Response::PubComp(id) => id,
        }
    }
}

impl EncodePacket for Response {
    fn packet_type(&self) -> PacketType {
        Response::packet_type(*self)
    }

    fn encode_body(&self, out: &mut Vec<u8>) -> Result<(), UsageError> {
        match *self {
            Response::PubAck(id) => PubAck::new(id).encode_body(out),
            Response::PubRec(id) => PubRec::new(id).encode_body(out),
            Response::PubComp(id) => PubComp::new(id).encode_body(out),
        }
    }
}

/// QoS 2 messages that were acknowledged with PUBREC and wait for PUBREL.
///
/// The set only remembers identifiers. A duplicate PUBLISH for an identifier
/// already in the set is delivered again and answered with PUBREC again.
#[derive(Debug, Default)]
pub struct PendingReleases {
    ids: BTreeSet<u16>,
}

impl PendingReleases {
    pub fn new() -> Self {
        Self::default()
    }

    /// The acknowledgement owed for `publish`, recording QoS 2 identifiers.
    pub fn on_publish(&mut self, publish: &Publish<'_>) -> Option<Response> {
        match (publish.qos, publish.packet_id) {
            (QoS::AtLeastOnce, Some(id)) => Some(Response::PubAck(id)),
            (QoS::ExactlyOnce, Some(id)) => {
                self.ids.insert(id);
                Some(Response::PubRec(id))
            }
            _ => None,
        }
    }

    /// Records a PUBREC sent by the application itself.
    pub fn record(&mut self, packet_id: u16) {
        self.ids.insert(packet_id);
    }

    /// Clears `packet_id` on PUBREL. Returns whether it was pending.
    pub fn release(&mut self, packet_id: u16) -> bool {
        self.ids.remove(&packet_id)
    }

    pub fn contains(&self, packet_id: u16) -> bool {
        self.ids.contains(&packet_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

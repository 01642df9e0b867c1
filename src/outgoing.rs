//! Tracking of outgoing operations that wait for an acknowledgement.
//!
//! Every QoS 1/2 publish, subscribe and unsubscribe is recorded here under its
//! packet identifier until the matching acknowledgement completes it. Entries are
//! kept in identifier order, which is also the order they are replayed in when a
//! persistent session resumes.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use crate::error::{Anomaly, UsageError};
use crate::handlers::CompletionCallback;
use crate::packet::{EncodePacket, PacketType, Publish, QoS, Subscribe, Unsubscribe};

/// Progress of a tracked operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutgoingState {
    /// The request went out and nothing has come back yet.
    Sent,
    /// QoS 2 only: PUBREC arrived and PUBREL went out; waiting for PUBCOMP.
    Received,
}

/// What was sent, kept so it can be sent again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutgoingKind {
    Publish {
        topic: Box<str>,
        payload: Box<[u8]>,
        qos: QoS,
        retain: bool,
    },
    Subscribe {
        filters: Vec<(String, QoS)>,
    },
    Unsubscribe {
        filters: Vec<String>,
    },
}

/// One operation awaiting acknowledgement.
pub struct OutgoingMessage {
    pub packet_id: u16,
    pub kind: OutgoingKind,
    pub state: OutgoingState,
    on_complete: Option<CompletionCallback>,
}

impl OutgoingMessage {
    pub fn publish(
        packet_id: u16,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
        on_complete: Option<CompletionCallback>,
    ) -> Result<Self, UsageError> {
        if qos == QoS::AtMostOnce {
            return Err(UsageError::InvalidQoS);
        }
        Ok(Self {
            packet_id,
            kind: OutgoingKind::Publish {
                topic: topic.into(),
                payload: payload.into(),
                qos,
                retain,
            },
            state: OutgoingState::Sent,
            on_complete,
        })
    }

    pub fn subscribe(packet_id: u16, filters: &[(&str, QoS)]) -> Self {
        Self {
            packet_id,
            kind: OutgoingKind::Subscribe {
                filters: filters
                    .iter()
                    .map(|(filter, qos)| (String::from(*filter), *qos))
                    .collect(),
            },
            state: OutgoingState::Sent,
            on_complete: None,
        }
    }

    pub fn unsubscribe(packet_id: u16, filters: &[&str]) -> Self {
        Self {
            packet_id,
            kind: OutgoingKind::Unsubscribe {
                filters: filters.iter().map(|filter| String::from(*filter)).collect(),
            },
            state: OutgoingState::Sent,
            on_complete: None,
        }
    }

    /// The packet type this operation goes out as.
    pub fn packet_type(&self) -> PacketType {
        match self.kind {
            OutgoingKind::Publish { .. } => PacketType::Publish,
            OutgoingKind::Subscribe { .. } => PacketType::Subscribe,
            OutgoingKind::Unsubscribe { .. } => PacketType::Unsubscribe,
        }
    }

    pub fn qos(&self) -> Option<QoS> {
        match self.kind {
            OutgoingKind::Publish { qos, .. } => Some(qos),
            _ => None,
        }
    }

    /// Appends the request packet to `out`. `dup` only applies to publishes.
    pub fn encode(&self, dup: bool, out: &mut Vec<u8>) -> Result<usize, UsageError> {
        match &self.kind {
            OutgoingKind::Publish {
                topic,
                payload,
                qos,
                retain,
            } => Publish {
                topic,
                payload,
                qos: *qos,
                retain: *retain,
                dup,
                packet_id: Some(self.packet_id),
            }
            .encode(out),
            OutgoingKind::Subscribe { filters } => {
                Subscribe::from_filters(self.packet_id, filters)?.encode(out)
            }
            OutgoingKind::Unsubscribe { filters } => {
                Unsubscribe::from_filters(self.packet_id, filters)?.encode(out)
            }
        }
    }

    /// Runs the completion callback, if any.
    pub fn complete(mut self) {
        if let Some(callback) = self.on_complete.take() {
            callback();
        }
    }
}

impl core::fmt::Debug for OutgoingMessage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OutgoingMessage")
            .field("packet_id", &self.packet_id)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

/// All operations awaiting acknowledgement, keyed by packet identifier.
#[derive(Debug, Default)]
pub struct OutgoingStore {
    entries: BTreeMap<u16, OutgoingMessage>,
}

impl OutgoingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `message`, handing back any entry it displaced.
    pub fn insert(&mut self, message: OutgoingMessage) -> Option<OutgoingMessage> {
        self.entries.insert(message.packet_id, message)
    }

    pub fn get(&self, packet_id: u16) -> Option<&OutgoingMessage> {
        self.entries.get(&packet_id)
    }

    pub fn contains(&self, packet_id: u16) -> bool {
        self.entries.contains_key(&packet_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in ascending identifier order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut OutgoingMessage> {
        self.entries.values_mut()
    }

    /// Drops every entry without running completion callbacks.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// PUBACK completes a QoS 1 publish.
    pub fn on_puback(&mut self, packet_id: u16) -> Result<OutgoingMessage, Anomaly> {
        self.take_if(PacketType::PubAck, packet_id, |msg| {
            msg.qos() == Some(QoS::AtLeastOnce)
        })
    }

    /// PUBREC moves a QoS 2 publish to [`OutgoingState::Received`]. The caller
    /// answers with PUBREL either way; a repeated PUBREC is answered again.
    pub fn on_pubrec(&mut self, packet_id: u16) -> Result<(), Anomaly> {
        match self.entries.get_mut(&packet_id) {
            Some(msg) if msg.qos() == Some(QoS::ExactlyOnce) => {
                msg.state = OutgoingState::Received;
                Ok(())
            }
            _ => Err(unknown(PacketType::PubRec, packet_id)),
        }
    }

    /// PUBCOMP completes a QoS 2 publish that has already seen PUBREC.
    pub fn on_pubcomp(&mut self, packet_id: u16) -> Result<OutgoingMessage, Anomaly> {
        self.take_if(PacketType::PubComp, packet_id, |msg| {
            msg.qos() == Some(QoS::ExactlyOnce) && msg.state == OutgoingState::Received
        })
    }

    pub fn on_suback(&mut self, packet_id: u16) -> Result<OutgoingMessage, Anomaly> {
        self.take_if(PacketType::SubAck, packet_id, |msg| {
            matches!(msg.kind, OutgoingKind::Subscribe { .. })
        })
    }

    pub fn on_unsuback(&mut self, packet_id: u16) -> Result<OutgoingMessage, Anomaly> {
        self.take_if(PacketType::UnsubAck, packet_id, |msg| {
            matches!(msg.kind, OutgoingKind::Unsubscribe { .. })
        })
    }

    fn take_if(
        &mut self,
        ack: PacketType,
        packet_id: u16,
        expected: impl Fn(&OutgoingMessage) -> bool,
    ) -> Result<OutgoingMessage, Anomaly> {
        match self.entries.get(&packet_id) {
            Some(msg) if expected(msg) => self
                .entries
                .remove(&packet_id)
                .ok_or_else(|| unknown(ack, packet_id)),
            _ => Err(unknown(ack, packet_id)),
        }
    }
}

fn unknown(packet_type: PacketType, packet_id: u16) -> Anomaly {
    Anomaly::UnknownPacketId {
        packet_type,
        packet_id,
    }
}

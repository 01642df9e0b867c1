//! Application callbacks.
//!
//! A [`HandlerSet`] holds one optional slot per event kind. Acknowledgement-class
//! handlers return `bool`: `true` keeps the engine reading, `false` asks it to
//! stop and close the connection as if the application had disconnected. An
//! empty slot behaves like a handler that returns `true`.

use alloc::boxed::Box;

use crate::error::{ConnectReturnCode, ErrorEvent};
use crate::packet::{PacketType, Publish, SubackReturnCode};

/// Runs once when an outgoing operation completes.
pub type CompletionCallback = Box<dyn FnOnce()>;

/// Whether the engine should keep reading after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Flow {
    Continue,
    Stop,
}

impl From<bool> for Flow {
    fn from(keep_going: bool) -> Self {
        if keep_going { Flow::Continue } else { Flow::Stop }
    }
}

type ConnAckHandler = Box<dyn FnMut(bool, ConnectReturnCode) -> bool>;
type PublishHandler = Box<dyn FnMut(&Publish<'_>) -> bool>;
type PacketIdHandler = Box<dyn FnMut(u16) -> bool>;
type SubAckHandler = Box<dyn FnMut(u16, &[SubackReturnCode]) -> bool>;
type PingRespHandler = Box<dyn FnMut() -> bool>;
type ResponseSentHandler = Box<dyn FnMut(PacketType, u16)>;
type CloseHandler = Box<dyn FnMut()>;
type ErrorHandler = Box<dyn FnMut(ErrorEvent)>;

/// The callbacks registered for one connection.
#[derive(Default)]
pub struct HandlerSet {
    connack: Option<ConnAckHandler>,
    publish: Option<PublishHandler>,
    puback: Option<PacketIdHandler>,
    pubrec: Option<PacketIdHandler>,
    pubrel: Option<PacketIdHandler>,
    pubcomp: Option<PacketIdHandler>,
    suback: Option<SubAckHandler>,
    unsuback: Option<PacketIdHandler>,
    pingresp: Option<PingRespHandler>,
    response_sent: Option<ResponseSentHandler>,
    close: Option<CloseHandler>,
    error: Option<ErrorHandler>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// CONNACK received: session-present flag and return code.
    pub fn set_connack_handler(
        &mut self,
        handler: impl FnMut(bool, ConnectReturnCode) -> bool + 'static,
    ) -> &mut Self {
        self.connack = Some(Box::new(handler));
        self
    }

    /// An application message arrived. Called once per PUBLISH packet, duplicates
    /// included.
    pub fn set_publish_handler(
        &mut self,
        handler: impl FnMut(&Publish<'_>) -> bool + 'static,
    ) -> &mut Self {
        self.publish = Some(Box::new(handler));
        self
    }

    pub fn set_puback_handler(&mut self, handler: impl FnMut(u16) -> bool + 'static) -> &mut Self {
        self.puback = Some(Box::new(handler));
        self
    }

    pub fn set_pubrec_handler(&mut self, handler: impl FnMut(u16) -> bool + 'static) -> &mut Self {
        self.pubrec = Some(Box::new(handler));
        self
    }

    pub fn set_pubrel_handler(&mut self, handler: impl FnMut(u16) -> bool + 'static) -> &mut Self {
        self.pubrel = Some(Box::new(handler));
        self
    }

    pub fn set_pubcomp_handler(
        &mut self,
        handler: impl FnMut(u16) -> bool + 'static,
    ) -> &mut Self {
        self.pubcomp = Some(Box::new(handler));
        self
    }

    /// SUBACK received. The return codes are passed through untouched.
    pub fn set_suback_handler(
        &mut self,
        handler: impl FnMut(u16, &[SubackReturnCode]) -> bool + 'static,
    ) -> &mut Self {
        self.suback = Some(Box::new(handler));
        self
    }

    pub fn set_unsuback_handler(
        &mut self,
        handler: impl FnMut(u16) -> bool + 'static,
    ) -> &mut Self {
        self.unsuback = Some(Box::new(handler));
        self
    }

    pub fn set_pingresp_handler(&mut self, handler: impl FnMut() -> bool + 'static) -> &mut Self {
        self.pingresp = Some(Box::new(handler));
        self
    }

    /// The engine finished writing an acknowledgement or release packet.
    pub fn set_response_sent_handler(
        &mut self,
        handler: impl FnMut(PacketType, u16) + 'static,
    ) -> &mut Self {
        self.response_sent = Some(Box::new(handler));
        self
    }

    /// The connection reached `Disconnected`. Called exactly once per connection.
    pub fn set_close_handler(&mut self, handler: impl FnMut() + 'static) -> &mut Self {
        self.close = Some(Box::new(handler));
        self
    }

    pub fn set_error_handler(&mut self, handler: impl FnMut(ErrorEvent) + 'static) -> &mut Self {
        self.error = Some(Box::new(handler));
        self
    }

    pub(crate) fn connack(&mut self, session_present: bool, code: ConnectReturnCode) -> Flow {
        self.connack
            .as_mut()
            .map_or(Flow::Continue, |h| h(session_present, code).into())
    }

    pub(crate) fn publish(&mut self, publish: &Publish<'_>) -> Flow {
        self.publish
            .as_mut()
            .map_or(Flow::Continue, |h| h(publish).into())
    }

    pub(crate) fn ack(&mut self, packet_type: PacketType, packet_id: u16) -> Flow {
        let slot = match packet_type {
            PacketType::PubAck => &mut self.puback,
            PacketType::PubRec => &mut self.pubrec,
            PacketType::PubRel => &mut self.pubrel,
            PacketType::PubComp => &mut self.pubcomp,
            PacketType::UnsubAck => &mut self.unsuback,
            _ => return Flow::Continue,
        };
        slot.as_mut()
            .map_or(Flow::Continue, |h| h(packet_id).into())
    }

    pub(crate) fn suback(&mut self, packet_id: u16, codes: &[SubackReturnCode]) -> Flow {
        self.suback
            .as_mut()
            .map_or(Flow::Continue, |h| h(packet_id, codes).into())
    }

    pub(crate) fn pingresp(&mut self) -> Flow {
        self.pingresp.as_mut().map_or(Flow::Continue, |h| h().into())
    }

    pub(crate) fn response_sent(&mut self, packet_type: PacketType, packet_id: u16) {
        if let Some(h) = self.response_sent.as_mut() {
            h(packet_type, packet_id);
        }
    }

    pub(crate) fn close(&mut self) {
        if let Some(h) = self.close.as_mut() {
            h();
        }
    }

    pub(crate) fn error(&mut self, event: ErrorEvent) {
        if let Some(h) = self.error.as_mut() {
            h(event);
        }
    }
}

impl core::fmt::Debug for HandlerSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HandlerSet")
            .field("connack", &self.connack.is_some())
            .field("publish", &self.publish.is_some())
            .field("puback", &self.puback.is_some())
            .field("pubrec", &self.pubrec.is_some())
            .field("pubrel", &self.pubrel.is_some())
            .field("pubcomp", &self.pubcomp.is_some())
            .field("suback", &self.suback.is_some())
            .field("unsuback", &self.unsuback.is_some())
            .field("pingresp", &self.pingresp.is_some())
            .field("response_sent", &self.response_sent.is_some())
            .field("close", &self.close.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

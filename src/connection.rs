//! # Connection Engine
//!
//! [`Connection`] is the protocol state of one client session. It performs no
//! I/O: the embedder feeds it received bytes, pulls encoded packets out of it for
//! writing, and tells it when writes finish and when the transport goes away.
//! Every application-visible event is delivered through the [`HandlerSet`].
//!
//! The embedder loop looks like this:
//!
//! 1. Call [`Connection::connect`], then write what [`Connection::poll_transmit`]
//!    hands out, calling [`Connection::on_write_complete`] after each write.
//! 2. Pass every chunk read from the transport to
//!    [`Connection::on_bytes_received`]. When it returns [`Flow::Stop`], stop
//!    reading, flush the remaining writes and close the transport.
//! 3. Report the end of the transport with [`Connection::on_transport_closed`]
//!    or [`Connection::on_transport_error`].

use alloc::vec::Vec;

use crate::error::{Anomaly, ConnectReturnCode, ErrorEvent, UsageError};
use crate::handlers::{CompletionCallback, Flow, HandlerSet};
use crate::incoming::{PendingReleases, Response};
use crate::options::MqttOptions;
use crate::outbox::{OnWritten, Outbox};
use crate::outgoing::{OutgoingMessage, OutgoingState, OutgoingStore};
use crate::packet::{
    ConnAck, Connect, Disconnect, EncodePacket, MqttPacket, PacketReader, PacketType, PingReq,
    PubRel, Publish, QoS, SubAck,
};
use crate::packet_id::PacketIdAllocator;
use crate::util::MAX_REMAINING_LENGTH;

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    Disconnected,
    /// CONNECT has been queued; waiting for CONNACK.
    Connecting,
    Connected,
}

/// The client side of an MQTT 3.1.1 session.
#[derive(Debug)]
pub struct Connection {
    state: ConnectionState,
    /// Set once a disconnect or stop was requested; no new work is accepted.
    closing: bool,
    clean_session: bool,
    auto_response: bool,
    keep_alive_secs: u16,
    ping_outstanding: bool,
    return_code: Option<ConnectReturnCode>,
    packet_ids: PacketIdAllocator,
    outgoing: OutgoingStore,
    releases: PendingReleases,
    handlers: HandlerSet,
    reader: PacketReader,
    outbox: Outbox,
}

impl Connection {
    pub fn new() -> Self {
        Self::with_handlers(HandlerSet::new())
    }

    pub fn with_handlers(handlers: HandlerSet) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            closing: false,
            clean_session: true,
            auto_response: true,
            keep_alive_secs: 0,
            ping_outstanding: false,
            return_code: None,
            packet_ids: PacketIdAllocator::new(),
            outgoing: OutgoingStore::new(),
            releases: PendingReleases::new(),
            handlers,
            reader: PacketReader::new(MAX_REMAINING_LENGTH),
            outbox: Outbox::new(),
        }
    }

    /// Replaces every registered handler at once.
    pub fn set_handlers(&mut self, handlers: HandlerSet) {
        self.handlers = handlers;
    }

    /// Registers individual handlers.
    pub fn handlers_mut(&mut self) -> &mut HandlerSet {
        &mut self.handlers
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Connected and accepting new operations.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected && !self.closing
    }

    /// A disconnect or stop was requested and the transport should be closed
    /// once the remaining writes are flushed.
    pub fn is_closing(&self) -> bool {
        self.closing
    }

    pub fn keep_alive_secs(&self) -> u16 {
        self.keep_alive_secs
    }

    /// Return code of the last CONNACK, if one arrived since `connect`.
    pub fn connect_return_code(&self) -> Option<ConnectReturnCode> {
        self.return_code
    }

    pub fn clean_session(&self) -> bool {
        self.clean_session
    }

    /// Number of operations awaiting acknowledgement.
    pub fn pending_outgoing(&self) -> usize {
        self.outgoing.len()
    }

    pub fn outgoing_state(&self, packet_id: u16) -> Option<OutgoingState> {
        self.outgoing.get(packet_id).map(|message| message.state)
    }

    /// Whether an incoming QoS 2 message with this identifier awaits PUBREL.
    pub fn is_release_pending(&self, packet_id: u16) -> bool {
        self.releases.contains(packet_id)
    }

    pub fn pending_releases(&self) -> usize {
        self.releases.len()
    }

    pub fn is_packet_id_in_use(&self, packet_id: u16) -> bool {
        self.packet_ids.is_allocated(packet_id)
    }

    pub fn has_pending_writes(&self) -> bool {
        !self.outbox.is_empty()
    }

    /// Starts a connection by queueing CONNECT.
    ///
    /// A clean session discards everything retained from earlier connections.
    pub fn connect(&mut self, options: &MqttOptions<'_>) -> Result<(), UsageError> {
        if self.state != ConnectionState::Disconnected {
            return Err(UsageError::AlreadyConnected);
        }
        let connect = Connect {
            will: options.will,
            username: options.username,
            password: options.password,
            ..Connect::new(
                options.client_id,
                options.keep_alive_secs,
                options.clean_session,
            )
        };
        let bytes = connect.to_vec()?;

        if options.clean_session {
            self.discard_session();
        }
        self.clean_session = options.clean_session;
        self.auto_response = options.auto_response;
        self.keep_alive_secs = options.keep_alive_secs;
        self.ping_outstanding = false;
        self.return_code = None;
        self.closing = false;
        self.reader = PacketReader::new(options.max_packet_size);
        self.outbox.clear();
        self.outbox
            .push(bytes, PacketType::Connect, OnWritten::Nothing);
        self.state = ConnectionState::Connecting;
        info!("connecting as {}", options.client_id);
        Ok(())
    }

    /// Queues DISCONNECT. Nothing new is accepted afterwards; the embedder closes
    /// the transport once the outbox drains and reports it with
    /// [`Connection::on_transport_closed`].
    pub fn disconnect(&mut self) -> Result<(), UsageError> {
        self.ensure_connected()?;
        self.begin_close();
        Ok(())
    }

    /// Publishes a message with a freshly allocated packet identifier.
    ///
    /// QoS 0 messages are not tracked and return `None`; their callback runs once
    /// the packet has been written. For QoS 1 and 2 the callback runs when the
    /// final acknowledgement arrives.
    pub fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
        on_complete: Option<CompletionCallback>,
    ) -> Result<Option<u16>, UsageError> {
        self.ensure_connected()?;
        if qos == QoS::AtMostOnce {
            let bytes = Publish {
                topic,
                payload,
                qos,
                retain,
                dup: false,
                packet_id: None,
            }
            .to_vec()?;
            let on_written = on_complete.map_or(OnWritten::Nothing, OnWritten::Callback);
            self.outbox.push(bytes, PacketType::Publish, on_written);
            return Ok(None);
        }
        let packet_id = self.packet_ids.allocate()?;
        let message = OutgoingMessage::publish(packet_id, topic, payload, qos, retain, on_complete);
        self.start(packet_id, message).map(Some)
    }

    /// Publishes QoS 1 or 2 with a caller-chosen identifier, which must not be
    /// pending.
    pub fn publish_with_id(
        &mut self,
        packet_id: u16,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
        on_complete: Option<CompletionCallback>,
    ) -> Result<(), UsageError> {
        self.ensure_connected()?;
        if qos == QoS::AtMostOnce {
            return Err(UsageError::InvalidQoS);
        }
        self.packet_ids.register(packet_id)?;
        let message = OutgoingMessage::publish(packet_id, topic, payload, qos, retain, on_complete);
        self.start(packet_id, message).map(drop)
    }

    /// Sends a publish again under `packet_id` with DUP set.
    ///
    /// The identifier is taken whether or not it is pending, and any entry
    /// already tracked under it is replaced without running its callback.
    pub fn publish_duplicate(
        &mut self,
        packet_id: u16,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
        on_complete: Option<CompletionCallback>,
    ) -> Result<(), UsageError> {
        self.ensure_connected()?;
        let message =
            OutgoingMessage::publish(packet_id, topic, payload, qos, retain, on_complete)?;
        let was_pending = self.packet_ids.is_allocated(packet_id);
        self.packet_ids.assign_explicit(packet_id)?;
        if let Err(err) = self.track(message, true) {
            if !was_pending {
                self.packet_ids.release(packet_id);
            }
            return Err(err);
        }
        Ok(())
    }

    /// Subscribes to one or more filters. The result arrives at the SUBACK
    /// handler under the returned identifier.
    pub fn subscribe(&mut self, filters: &[(&str, QoS)]) -> Result<u16, UsageError> {
        self.ensure_connected()?;
        if filters.is_empty() {
            return Err(UsageError::EmptyFilterList);
        }
        let packet_id = self.packet_ids.allocate()?;
        self.start(packet_id, Ok(OutgoingMessage::subscribe(packet_id, filters)))
    }

    pub fn subscribe_with_id(
        &mut self,
        packet_id: u16,
        filters: &[(&str, QoS)],
    ) -> Result<(), UsageError> {
        self.ensure_connected()?;
        if filters.is_empty() {
            return Err(UsageError::EmptyFilterList);
        }
        self.packet_ids.register(packet_id)?;
        self.start(packet_id, Ok(OutgoingMessage::subscribe(packet_id, filters)))
            .map(drop)
    }

    pub fn unsubscribe(&mut self, filters: &[&str]) -> Result<u16, UsageError> {
        self.ensure_connected()?;
        if filters.is_empty() {
            return Err(UsageError::EmptyFilterList);
        }
        let packet_id = self.packet_ids.allocate()?;
        self.start(packet_id, Ok(OutgoingMessage::unsubscribe(packet_id, filters)))
    }

    pub fn unsubscribe_with_id(&mut self, packet_id: u16, filters: &[&str]) -> Result<(), UsageError> {
        self.ensure_connected()?;
        if filters.is_empty() {
            return Err(UsageError::EmptyFilterList);
        }
        self.packet_ids.register(packet_id)?;
        self.start(packet_id, Ok(OutgoingMessage::unsubscribe(packet_id, filters)))
            .map(drop)
    }

    /// Queues PINGREQ.
    pub fn ping(&mut self) -> Result<(), UsageError> {
        self.ensure_connected()?;
        self.queue(&PingReq, OnWritten::Nothing)?;
        self.ping_outstanding = true;
        Ok(())
    }

    /// Called by the embedder every keep-alive interval.
    ///
    /// Sends PINGREQ, unless the previous one is still unanswered, in which case
    /// the connection is reported as timed out and closed.
    pub fn keep_alive_elapsed(&mut self) -> Flow {
        if !self.is_connected() {
            return Flow::Continue;
        }
        if self.ping_outstanding {
            warn!("no PINGRESP within the keep-alive interval");
            self.report(ErrorEvent::KeepAliveTimeout);
            self.force_close();
            return Flow::Stop;
        }
        match self.ping() {
            Ok(()) => Flow::Continue,
            Err(_) => Flow::Stop,
        }
    }

    /// Acknowledges an incoming QoS 1 publish when automatic responses are off.
    pub fn puback(&mut self, packet_id: u16) -> Result<(), UsageError> {
        self.send_response(Response::PubAck(packet_id))
    }

    /// Answers an incoming QoS 2 publish when automatic responses are off. The
    /// identifier then waits for the broker's PUBREL.
    pub fn pubrec(&mut self, packet_id: u16) -> Result<(), UsageError> {
        self.send_response(Response::PubRec(packet_id))?;
        self.releases.record(packet_id);
        Ok(())
    }

    /// Completes an incoming QoS 2 exchange when automatic responses are off.
    pub fn pubcomp(&mut self, packet_id: u16) -> Result<(), UsageError> {
        self.send_response(Response::PubComp(packet_id))
    }

    /// The next encoded packet to write, if any.
    ///
    /// Only one packet is handed out at a time; the next one becomes available
    /// after [`Connection::on_write_complete`].
    pub fn poll_transmit(&mut self) -> Option<&[u8]> {
        if self.state == ConnectionState::Disconnected {
            return None;
        }
        self.outbox.next()
    }

    /// The packet last returned by [`Connection::poll_transmit`] was written.
    pub fn on_write_complete(&mut self) {
        let Some(frame) = self.outbox.complete() else {
            return;
        };
        trace!("wrote {:?}", frame.packet_type);
        match frame.on_written {
            OnWritten::Nothing => {}
            OnWritten::Callback(callback) => callback(),
            OnWritten::ResponseSent(packet_type, packet_id) => {
                self.handlers.response_sent(packet_type, packet_id)
            }
        }
    }

    /// Processes bytes read from the transport.
    ///
    /// Returns [`Flow::Stop`] when reading should end: a handler asked to stop,
    /// the connection was refused, or the input could not be decoded. In the
    /// last case the connection is already closed when this returns.
    pub fn on_bytes_received(&mut self, data: &[u8]) -> Flow {
        if self.state == ConnectionState::Disconnected || self.closing {
            return Flow::Stop;
        }
        let mut reader = core::mem::replace(&mut self.reader, PacketReader::new(0));
        let result = reader.feed(data, |packet| self.dispatch(packet) == Flow::Continue);
        self.reader = reader;

        match result {
            Ok(true) => Flow::Continue,
            Ok(false) => Flow::Stop,
            Err(err) => {
                error!("failed to decode inbound packet: {:?}", err);
                self.report(err.into());
                self.force_close();
                Flow::Stop
            }
        }
    }

    /// The transport failed. Reports the error and closes the connection.
    pub fn on_transport_error(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        error!("transport error");
        self.report(ErrorEvent::Transport);
        self.force_close();
    }

    /// The transport was closed, by the peer or by the embedder.
    pub fn on_transport_closed(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        info!("transport closed");
        self.force_close();
    }

    fn ensure_connected(&self) -> Result<(), UsageError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(UsageError::NotConnected)
        }
    }

    /// Sends a tracked operation whose identifier is already reserved, giving
    /// the identifier back if the operation cannot be built.
    fn start(
        &mut self,
        packet_id: u16,
        message: Result<OutgoingMessage, UsageError>,
    ) -> Result<u16, UsageError> {
        match message.and_then(|message| self.track(message, false)) {
            Ok(()) => Ok(packet_id),
            Err(err) => {
                self.packet_ids.release(packet_id);
                Err(err)
            }
        }
    }

    fn track(&mut self, message: OutgoingMessage, dup: bool) -> Result<(), UsageError> {
        let mut bytes = Vec::new();
        message.encode(dup, &mut bytes)?;
        debug!(
            "sending {:?} with packet id {}",
            message.packet_type(),
            message.packet_id
        );
        self.outbox
            .push(bytes, message.packet_type(), OnWritten::Nothing);
        if let Some(replaced) = self.outgoing.insert(message) {
            debug!("replaced pending operation {}", replaced.packet_id);
        }
        Ok(())
    }

    fn queue(&mut self, packet: &impl EncodePacket, on_written: OnWritten) -> Result<(), UsageError> {
        let bytes = packet.to_vec()?;
        self.outbox.push(bytes, packet.packet_type(), on_written);
        Ok(())
    }

    fn send_response(&mut self, response: Response) -> Result<(), UsageError> {
        self.ensure_connected()?;
        if response.packet_id() == 0 {
            return Err(UsageError::InvalidPacketId);
        }
        self.queue(
            &response,
            OnWritten::ResponseSent(response.packet_type(), response.packet_id()),
        )
    }

    fn queue_response(&mut self, response: Response) {
        let on_written = OnWritten::ResponseSent(response.packet_type(), response.packet_id());
        if let Err(err) = self.queue(&response, on_written) {
            error!("failed to queue {:?}: {:?}", response, err);
        }
    }

    fn begin_close(&mut self) {
        if self.state == ConnectionState::Connected {
            if let Err(err) = self.queue(&Disconnect, OnWritten::Nothing) {
                error!("failed to queue DISCONNECT: {:?}", err);
            }
        }
        self.closing = true;
        debug!("closing connection");
    }

    /// Moves to `Disconnected` immediately and notifies the close handler.
    fn force_close(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.closing = false;
        self.ping_outstanding = false;
        self.outbox.clear();
        self.reader.clear();
        if self.clean_session {
            self.discard_session();
        } else {
            debug!(
                "keeping {} pending operations for the next session",
                self.outgoing.len()
            );
        }
        self.handlers.close();
    }

    fn discard_session(&mut self) {
        self.outgoing.clear();
        self.releases.clear();
        self.packet_ids.clear();
    }

    fn report(&mut self, event: ErrorEvent) {
        warn!("{:?}", event);
        self.handlers.error(event);
    }

    fn dispatch(&mut self, packet: MqttPacket<'_>) -> Flow {
        trace!("received {:?}", packet.packet_type());
        let flow = match (self.state, packet) {
            (ConnectionState::Connecting, MqttPacket::ConnAck(ack)) => self.handle_connack(ack),
            (ConnectionState::Connecting, other) => {
                self.report(Anomaly::UnexpectedPacket(other.packet_type()).into());
                Flow::Continue
            }
            (ConnectionState::Connected, MqttPacket::ConnAck(_)) => {
                self.report(Anomaly::UnexpectedConnAck.into());
                Flow::Continue
            }
            (ConnectionState::Connected, MqttPacket::Publish(publish)) => {
                self.handle_publish(&publish)
            }
            (ConnectionState::Connected, MqttPacket::PubAck(ack)) => {
                let completed = self.outgoing.on_puback(ack.packet_id);
                self.handle_completion(PacketType::PubAck, ack.packet_id, completed)
            }
            (ConnectionState::Connected, MqttPacket::PubRec(ack)) => self.handle_pubrec(ack.packet_id),
            (ConnectionState::Connected, MqttPacket::PubRel(rel)) => self.handle_pubrel(rel.packet_id),
            (ConnectionState::Connected, MqttPacket::PubComp(ack)) => {
                let completed = self.outgoing.on_pubcomp(ack.packet_id);
                self.handle_completion(PacketType::PubComp, ack.packet_id, completed)
            }
            (ConnectionState::Connected, MqttPacket::SubAck(ack)) => self.handle_suback(ack),
            (ConnectionState::Connected, MqttPacket::UnsubAck(ack)) => {
                let completed = self.outgoing.on_unsuback(ack.packet_id);
                self.handle_completion(PacketType::UnsubAck, ack.packet_id, completed)
            }
            (ConnectionState::Connected, MqttPacket::PingResp) => {
                self.ping_outstanding = false;
                self.handlers.pingresp()
            }
            (ConnectionState::Connected, other) => {
                self.report(Anomaly::UnexpectedPacket(other.packet_type()).into());
                Flow::Continue
            }
            (ConnectionState::Disconnected, _) => return Flow::Stop,
        };
        if flow == Flow::Stop && !self.closing {
            info!("stop requested by handler");
            self.begin_close();
        }
        flow
    }

    fn handle_connack(&mut self, ack: ConnAck) -> Flow {
        self.return_code = Some(ack.return_code);
        if ack.return_code != ConnectReturnCode::Accepted {
            warn!("connection refused: {:?}", ack.return_code);
            let _ = self.handlers.connack(ack.session_present, ack.return_code);
            return Flow::Stop;
        }

        info!("connected, session present: {}", ack.session_present);
        self.state = ConnectionState::Connected;
        self.ping_outstanding = false;
        if !self.clean_session {
            self.resend_pending();
        }
        self.handlers.connack(ack.session_present, ack.return_code)
    }

    /// Sends every retained operation again, lowest identifier first. QoS 2
    /// publishes restart from PUBLISH.
    fn resend_pending(&mut self) {
        for message in self.outgoing.iter_mut() {
            message.state = OutgoingState::Sent;
            let mut bytes = Vec::new();
            match message.encode(true, &mut bytes) {
                Ok(_) => self
                    .outbox
                    .push(bytes, message.packet_type(), OnWritten::Nothing),
                Err(err) => error!("cannot resend {}: {:?}", message.packet_id, err),
            }
        }
    }

    fn handle_publish(&mut self, publish: &Publish<'_>) -> Flow {
        debug!(
            "message on {} ({} bytes)",
            publish.topic,
            publish.payload.len()
        );
        let flow = self.handlers.publish(publish);
        if self.auto_response {
            if let Some(response) = self.releases.on_publish(publish) {
                self.queue_response(response);
            }
        }
        flow
    }

    fn handle_pubrec(&mut self, packet_id: u16) -> Flow {
        if let Err(anomaly) = self.outgoing.on_pubrec(packet_id) {
            self.report(anomaly.into());
            return Flow::Continue;
        }
        let on_written = OnWritten::ResponseSent(PacketType::PubRel, packet_id);
        if let Err(err) = self.queue(&PubRel::new(packet_id), on_written) {
            error!("failed to queue PUBREL: {:?}", err);
        }
        self.handlers.ack(PacketType::PubRec, packet_id)
    }

    fn handle_pubrel(&mut self, packet_id: u16) -> Flow {
        if !self.releases.release(packet_id) {
            self.report(Anomaly::UnknownRelease(packet_id).into());
        }
        if self.auto_response {
            self.queue_response(Response::PubComp(packet_id));
        }
        self.handlers.ack(PacketType::PubRel, packet_id)
    }

    fn handle_suback(&mut self, ack: SubAck) -> Flow {
        match self.outgoing.on_suback(ack.packet_id) {
            Ok(message) => {
                self.finish(message);
                self.handlers.suback(ack.packet_id, &ack.return_codes)
            }
            Err(anomaly) => {
                self.report(anomaly.into());
                Flow::Continue
            }
        }
    }

    fn handle_completion(
        &mut self,
        ack: PacketType,
        packet_id: u16,
        completed: Result<OutgoingMessage, Anomaly>,
    ) -> Flow {
        match completed {
            Ok(message) => {
                self.finish(message);
                self.handlers.ack(ack, packet_id)
            }
            Err(anomaly) => {
                self.report(anomaly.into());
                Flow::Continue
            }
        }
    }

    fn finish(&mut self, message: OutgoingMessage) {
        let packet_id = message.packet_id;
        message.complete();
        self.packet_ids.release(packet_id);
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

//! # Error Types
//!
//! Errors are split by where they surface. Faults observed on the network
//! (malformed input, unexpected acknowledgements, transport failures) are
//! delivered to the application's error handler as an [`ErrorEvent`]. Misuse of
//! the API is returned synchronously to the caller as a [`UsageError`].

use crate::packet::PacketType;

/// A failure to parse inbound bytes. Always fatal to the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// The remaining-length field used more than four bytes.
    MalformedRemainingLength,
    /// The high nibble of the fixed header is not an MQTT 3.1.1 packet type.
    InvalidPacketType(u8),
    /// The low nibble of the fixed header does not match the value required
    /// for the packet type.
    InvalidFlags(u8),
    /// A QoS field carried the reserved value 3.
    InvalidQoS(u8),
    /// A length-prefixed string was not valid MQTT UTF-8.
    InvalidUtf8String,
    /// The body was shorter than its fields require, or had trailing bytes.
    MalformedPacket,
    /// A packet identifier of zero was found where a real one is required.
    InvalidPacketId,
    /// The declared remaining length exceeds the configured maximum.
    PacketTooLarge(usize),
}

/// A misuse of the API, returned directly from the offending call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UsageError {
    /// The operation requires the `Connected` state.
    NotConnected,
    /// `connect` was called while a connection is already active.
    AlreadyConnected,
    /// All 65535 packet identifiers are pending.
    PacketIdExhausted,
    /// A caller-chosen packet identifier is already pending.
    PacketIdInUse(u16),
    /// Packet identifier zero is reserved.
    InvalidPacketId,
    /// Subscribe and unsubscribe need at least one topic filter.
    EmptyFilterList,
    /// More topic filters than fit in one subscribe or unsubscribe packet.
    TooManyFilters,
    /// The QoS is not valid for the requested operation.
    InvalidQoS,
    /// A topic, filter or credential is not a valid MQTT string.
    InvalidString,
    /// The encoded packet would exceed the maximum remaining length.
    PacketTooLarge,
}

/// A non-fatal protocol violation by the peer. Processing continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Anomaly {
    /// An acknowledgement arrived for an identifier with no matching pending
    /// operation.
    UnknownPacketId {
        packet_type: PacketType,
        packet_id: u16,
    },
    /// A PUBREL arrived for an identifier that was not awaiting release.
    UnknownRelease(u16),
    /// A CONNACK arrived outside the `Connecting` state.
    UnexpectedConnAck,
    /// A packet arrived that a client never expects, or before CONNACK.
    UnexpectedPacket(PacketType),
}

/// What the error handler receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorEvent {
    /// Inbound bytes could not be parsed. The connection is closed afterwards.
    Decode(DecodeError),
    /// The peer misbehaved in a recoverable way.
    Anomaly(Anomaly),
    /// The transport failed. The connection is closed afterwards.
    Transport,
    /// A ping was still outstanding when the next keep-alive interval elapsed.
    KeepAliveTimeout,
}

impl From<DecodeError> for ErrorEvent {
    fn from(err: DecodeError) -> Self {
        ErrorEvent::Decode(err)
    }
}

impl From<Anomaly> for ErrorEvent {
    fn from(anomaly: Anomaly) -> Self {
        ErrorEvent::Anomaly(anomaly)
    }
}

/// The primary error enum for the async client.
///
/// It is generic over the transport error type `T`, allowing it to wrap
/// specific errors from the underlying network transport (e.g., TCP, UART).
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MqttError<T> {
    /// An error occurred in the underlying transport layer.
    Transport(T),
    /// The engine rejected the call.
    Usage(UsageError),
    /// The connection was refused by the broker. The enclosed code provides the reason.
    ConnectionRefused(ConnectReturnCode),
    /// The connection has been closed.
    Closed,
    /// The broker did not answer a ping within the keep-alive interval.
    Timeout,
}

impl<T> From<UsageError> for MqttError<T> {
    fn from(err: UsageError) -> Self {
        MqttError::Usage(err)
    }
}

/// Represents the return codes carried by `CONNACK`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectReturnCode {
    /// The connection was accepted.
    Accepted,
    /// The broker does not support the requested MQTT protocol version.
    UnacceptableProtocolVersion,
    /// The client identifier is not valid.
    IdentifierRejected,
    /// The broker is unavailable.
    ServerUnavailable,
    /// The username or password is not valid.
    BadUserNameOrPassword,
    /// The client is not authorized to connect.
    NotAuthorized,
    /// A code outside the range defined by MQTT 3.1.1.
    Other(u8),
}

impl From<u8> for ConnectReturnCode {
    fn from(val: u8) -> Self {
        match val {
            0 => Self::Accepted,
            1 => Self::UnacceptableProtocolVersion,
            2 => Self::IdentifierRejected,
            3 => Self::ServerUnavailable,
            4 => Self::BadUserNameOrPassword,
            5 => Self::NotAuthorized,
            _ => Self::Other(val),
        }
    }
}

impl From<ConnectReturnCode> for u8 {
    fn from(code: ConnectReturnCode) -> Self {
        match code {
            ConnectReturnCode::Accepted => 0,
            ConnectReturnCode::UnacceptableProtocolVersion => 1,
            ConnectReturnCode::IdentifierRejected => 2,
            ConnectReturnCode::ServerUnavailable => 3,
            ConnectReturnCode::BadUserNameOrPassword => 4,
            ConnectReturnCode::NotAuthorized => 5,
            ConnectReturnCode::Other(val) => val,
        }
    }
}

//! # MQTT Packet Structures and Serialization
//!
//! This module defines the MQTT 3.1.1 control packets and the traits for encoding
//! them to and decoding them from bytes. [`PacketReader`] frames packets out of a
//! byte stream that may arrive in arbitrary chunks.

use alloc::vec::Vec;
use heapless::Vec as BoundedVec;

use crate::error::{ConnectReturnCode, DecodeError, UsageError};
use crate::util::{
    self, read_binary, read_u8, read_u16, read_utf8_string, write_binary, write_utf8_string,
};

/// Maximum number of topic filters carried by one SUBSCRIBE or UNSUBSCRIBE.
pub const MAX_TOPIC_FILTERS: usize = 16;

const PROTOCOL_NAME: &str = "MQTT";
const PROTOCOL_LEVEL: u8 = 4;

/// Represents the Quality of Service (QoS) levels for MQTT messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = DecodeError;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        match val {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(DecodeError::InvalidQoS(val)),
        }
    }
}

/// The control packet types of MQTT 3.1.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
}

impl PacketType {
    pub fn from_u8(val: u8) -> Result<Self, DecodeError> {
        Ok(match val {
            1 => Self::Connect,
            2 => Self::ConnAck,
            3 => Self::Publish,
            4 => Self::PubAck,
            5 => Self::PubRec,
            6 => Self::PubRel,
            7 => Self::PubComp,
            8 => Self::Subscribe,
            9 => Self::SubAck,
            10 => Self::Unsubscribe,
            11 => Self::UnsubAck,
            12 => Self::PingReq,
            13 => Self::PingResp,
            14 => Self::Disconnect,
            _ => return Err(DecodeError::InvalidPacketType(val)),
        })
    }

    /// The low nibble every packet of this type must carry. PUBLISH has no fixed
    /// value; its nibble holds DUP, QoS and RETAIN.
    pub fn fixed_flags(self) -> u8 {
        match self {
            Self::PubRel | Self::Subscribe | Self::Unsubscribe => 0x02,
            _ => 0x00,
        }
    }
}

/// A trait for packets that can be encoded into a byte buffer.
pub trait EncodePacket {
    fn packet_type(&self) -> PacketType;

    /// Low nibble of the fixed header.
    fn flags(&self) -> u8 {
        self.packet_type().fixed_flags()
    }

    /// Appends everything after the remaining-length field.
    fn encode_body(&self, out: &mut Vec<u8>) -> Result<(), UsageError>;

    /// Appends the complete packet to `out` and returns its length.
    ///
    /// Space for the longest remaining-length field is reserved up front and the
    /// unused part is squeezed out once the body length is known. On error `out`
    /// is left as it was.
    fn encode(&self, out: &mut Vec<u8>) -> Result<usize, UsageError> {
        let start = out.len();
        out.push(((self.packet_type() as u8) << 4) | self.flags());
        let remaining_len_pos = out.len();
        out.extend_from_slice(&[0u8; 4]);
        let content_start = out.len();

        let encoded = self.encode_body(out).and_then(|()| {
            let remaining_len = out.len() - content_start;
            util::encode_variable_byte_integer(remaining_len)
        });
        let (len_bytes, len_size) = match encoded {
            Ok(len) => len,
            Err(err) => {
                out.truncate(start);
                return Err(err);
            }
        };

        out[remaining_len_pos..remaining_len_pos + len_size]
            .copy_from_slice(&len_bytes[..len_size]);
        out.drain(remaining_len_pos + len_size..content_start);
        Ok(out.len() - start)
    }

    /// Encodes into a fresh buffer.
    fn to_vec(&self) -> Result<Vec<u8>, UsageError> {
        let mut out = Vec::new();
        self.encode(&mut out)?;
        Ok(out)
    }
}

/// A trait for packets that can be decoded from the body of a framed packet.
pub trait DecodePacket<'a>: Sized {
    fn decode_body(flags: u8, body: &'a [u8]) -> Result<Self, DecodeError>;
}

/// An enumeration of all possible MQTT control packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MqttPacket<'a> {
    Connect(Connect<'a>),
    ConnAck(ConnAck),
    Publish(Publish<'a>),
    PubAck(PubAck),
    PubRec(PubRec),
    PubRel(PubRel),
    PubComp(PubComp),
    Subscribe(Subscribe<'a>),
    SubAck(SubAck),
    Unsubscribe(Unsubscribe<'a>),
    UnsubAck(UnsubAck),
    PingReq,
    PingResp,
    Disconnect,
}

impl<'a> MqttPacket<'a> {
    pub fn packet_type(&self) -> PacketType {
        match self {
            MqttPacket::Connect(_) => PacketType::Connect,
            MqttPacket::ConnAck(_) => PacketType::ConnAck,
            MqttPacket::Publish(_) => PacketType::Publish,
            MqttPacket::PubAck(_) => PacketType::PubAck,
            MqttPacket::PubRec(_) => PacketType::PubRec,
            MqttPacket::PubRel(_) => PacketType::PubRel,
            MqttPacket::PubComp(_) => PacketType::PubComp,
            MqttPacket::Subscribe(_) => PacketType::Subscribe,
            MqttPacket::SubAck(_) => PacketType::SubAck,
            MqttPacket::Unsubscribe(_) => PacketType::Unsubscribe,
            MqttPacket::UnsubAck(_) => PacketType::UnsubAck,
            MqttPacket::PingReq => PacketType::PingReq,
            MqttPacket::PingResp => PacketType::PingResp,
            MqttPacket::Disconnect => PacketType::Disconnect,
        }
    }
}

impl<'a> EncodePacket for MqttPacket<'a> {
    fn packet_type(&self) -> PacketType {
        MqttPacket::packet_type(self)
    }

    fn flags(&self) -> u8 {
        match self {
            MqttPacket::Publish(publish) => publish.flags(),
            other => MqttPacket::packet_type(other).fixed_flags(),
        }
    }

    fn encode_body(&self, out: &mut Vec<u8>) -> Result<(), UsageError> {
        match self {
            MqttPacket::Connect(p) => p.encode_body(out),
            MqttPacket::ConnAck(p) => p.encode_body(out),
            MqttPacket::Publish(p) => p.encode_body(out),
            MqttPacket::PubAck(p) => p.encode_body(out),
            MqttPacket::PubRec(p) => p.encode_body(out),
            MqttPacket::PubRel(p) => p.encode_body(out),
            MqttPacket::PubComp(p) => p.encode_body(out),
            MqttPacket::Subscribe(p) => p.encode_body(out),
            MqttPacket::SubAck(p) => p.encode_body(out),
            MqttPacket::Unsubscribe(p) => p.encode_body(out),
            MqttPacket::UnsubAck(p) => p.encode_body(out),
            MqttPacket::PingReq | MqttPacket::PingResp | MqttPacket::Disconnect => Ok(()),
        }
    }
}

/// Inspects the fixed header at the front of `buf`.
///
/// Returns the total length of the packet (header included) once the fixed
/// header and the remaining-length field are complete, or `None` if more bytes
/// are needed to tell. The body itself need not be present yet.
pub fn frame_length(buf: &[u8], max_remaining_len: usize) -> Result<Option<usize>, DecodeError> {
    let Some(&header) = buf.first() else {
        return Ok(None);
    };
    PacketType::from_u8(header >> 4)?;
    match util::read_variable_byte_integer(&buf[1..])? {
        Some((remaining_len, _)) if remaining_len > max_remaining_len => {
            Err(DecodeError::PacketTooLarge(remaining_len))
        }
        Some((remaining_len, len_size)) => Ok(Some(1 + len_size + remaining_len)),
        None => Ok(None),
    }
}

/// Decodes one complete packet. `frame` must hold exactly one packet.
pub fn decode(frame: &[u8]) -> Result<MqttPacket<'_>, DecodeError> {
    let header = *frame.first().ok_or(DecodeError::MalformedPacket)?;
    let packet_type = PacketType::from_u8(header >> 4)?;
    let flags = header & 0x0F;
    if packet_type != PacketType::Publish && flags != packet_type.fixed_flags() {
        return Err(DecodeError::InvalidFlags(flags));
    }

    let (remaining_len, len_size) =
        util::read_variable_byte_integer(&frame[1..])?.ok_or(DecodeError::MalformedPacket)?;
    let body = &frame[1 + len_size..];
    if body.len() != remaining_len {
        return Err(DecodeError::MalformedPacket);
    }

    Ok(match packet_type {
        PacketType::Connect => MqttPacket::Connect(Connect::decode_body(flags, body)?),
        PacketType::ConnAck => MqttPacket::ConnAck(ConnAck::decode_body(flags, body)?),
        PacketType::Publish => MqttPacket::Publish(Publish::decode_body(flags, body)?),
        PacketType::PubAck => MqttPacket::PubAck(PubAck::decode_body(flags, body)?),
        PacketType::PubRec => MqttPacket::PubRec(PubRec::decode_body(flags, body)?),
        PacketType::PubRel => MqttPacket::PubRel(PubRel::decode_body(flags, body)?),
        PacketType::PubComp => MqttPacket::PubComp(PubComp::decode_body(flags, body)?),
        PacketType::Subscribe => MqttPacket::Subscribe(Subscribe::decode_body(flags, body)?),
        PacketType::SubAck => MqttPacket::SubAck(SubAck::decode_body(flags, body)?),
        PacketType::Unsubscribe => {
            MqttPacket::Unsubscribe(Unsubscribe::decode_body(flags, body)?)
        }
        PacketType::UnsubAck => MqttPacket::UnsubAck(UnsubAck::decode_body(flags, body)?),
        PacketType::PingReq => empty_body(body, MqttPacket::PingReq)?,
        PacketType::PingResp => empty_body(body, MqttPacket::PingResp)?,
        PacketType::Disconnect => empty_body(body, MqttPacket::Disconnect)?,
    })
}

fn empty_body<'a>(body: &[u8], packet: MqttPacket<'a>) -> Result<MqttPacket<'a>, DecodeError> {
    if body.is_empty() {
        Ok(packet)
    } else {
        Err(DecodeError::MalformedPacket)
    }
}

fn expect_end(cursor: usize, body: &[u8]) -> Result<(), DecodeError> {
    if cursor == body.len() {
        Ok(())
    } else {
        Err(DecodeError::MalformedPacket)
    }
}

fn read_packet_id(cursor: &mut usize, body: &[u8]) -> Result<u16, DecodeError> {
    match read_u16(cursor, body)? {
        0 => Err(DecodeError::InvalidPacketId),
        id => Ok(id),
    }
}

/// Splits a byte stream into packets.
///
/// Bytes of a packet that straddles two reads are kept until the packet is
/// complete. Packets that arrive whole inside one read are decoded straight
/// from the caller's slice without copying.
#[derive(Debug)]
pub struct PacketReader {
    partial: Vec<u8>,
    max_remaining_len: usize,
}

impl PacketReader {
    pub fn new(max_remaining_len: usize) -> Self {
        Self {
            partial: Vec::new(),
            max_remaining_len,
        }
    }

    /// Bytes held back while waiting for the rest of a packet.
    pub fn buffered(&self) -> usize {
        self.partial.len()
    }

    /// Drops any partially received packet.
    pub fn clear(&mut self) {
        self.partial.clear();
    }

    /// Feeds newly received bytes, calling `on_packet` for every complete packet
    /// in order.
    ///
    /// `on_packet` returns `false` to stop; the remaining input is discarded and
    /// `Ok(false)` is returned. A decode failure discards all buffered input.
    pub fn feed<F>(&mut self, data: &[u8], mut on_packet: F) -> Result<bool, DecodeError>
    where
        F: FnMut(MqttPacket<'_>) -> bool,
    {
        let result = self.feed_inner(data, &mut on_packet);
        if !matches!(result, Ok(true)) {
            self.partial.clear();
        }
        result
    }

    fn feed_inner<F>(&mut self, mut data: &[u8], on_packet: &mut F) -> Result<bool, DecodeError>
    where
        F: FnMut(MqttPacket<'_>) -> bool,
    {
        // Complete the packet left over from the previous read, taking only the
        // bytes that belong to it.
        while !self.partial.is_empty() {
            match frame_length(&self.partial, self.max_remaining_len)? {
                Some(total) if self.partial.len() >= total => {
                    let keep_going = on_packet(decode(&self.partial)?);
                    self.partial.clear();
                    if !keep_going {
                        return Ok(false);
                    }
                }
                Some(total) => {
                    let take = (total - self.partial.len()).min(data.len());
                    self.partial.extend_from_slice(&data[..take]);
                    data = &data[take..];
                    if self.partial.len() < total {
                        return Ok(true);
                    }
                }
                None => {
                    let Some((&byte, rest)) = data.split_first() else {
                        return Ok(true);
                    };
                    self.partial.push(byte);
                    data = rest;
                }
            }
        }

        loop {
            match frame_length(data, self.max_remaining_len)? {
                Some(total) if data.len() >= total => {
                    let (frame, rest) = data.split_at(total);
                    data = rest;
                    if !on_packet(decode(frame)?) {
                        return Ok(false);
                    }
                }
                _ => {
                    self.partial.extend_from_slice(data);
                    return Ok(true);
                }
            }
        }
    }
}

// --- CONNECT Packet ---

/// The last-will message the broker publishes if the client vanishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Will<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
    pub qos: QoS,
    pub retain: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect<'a> {
    pub client_id: &'a str,
    pub keep_alive: u16,
    pub clean_session: bool,
    pub will: Option<Will<'a>>,
    pub username: Option<&'a str>,
    pub password: Option<&'a [u8]>,
}

impl<'a> Connect<'a> {
    pub fn new(client_id: &'a str, keep_alive: u16, clean_session: bool) -> Self {
        Self {
            client_id,
            keep_alive,
            clean_session,
            will: None,
            username: None,
            password: None,
        }
    }
}

impl<'a> EncodePacket for Connect<'a> {
    fn packet_type(&self) -> PacketType {
        PacketType::Connect
    }

    fn encode_body(&self, out: &mut Vec<u8>) -> Result<(), UsageError> {
        write_utf8_string(out, PROTOCOL_NAME)?;
        out.push(PROTOCOL_LEVEL);

        let mut flags = 0;
        if self.clean_session {
            flags |= 0x02;
        }
        if let Some(will) = &self.will {
            flags |= 0x04 | ((will.qos as u8) << 3);
            if will.retain {
                flags |= 0x20;
            }
        }
        if self.password.is_some() {
            flags |= 0x40;
        }
        if self.username.is_some() {
            flags |= 0x80;
        }
        out.push(flags);
        out.extend_from_slice(&self.keep_alive.to_be_bytes());

        write_utf8_string(out, self.client_id)?;
        if let Some(will) = &self.will {
            write_utf8_string(out, will.topic)?;
            write_binary(out, will.payload)?;
        }
        if let Some(username) = self.username {
            write_utf8_string(out, username)?;
        }
        if let Some(password) = self.password {
            write_binary(out, password)?;
        }
        Ok(())
    }
}

impl<'a> DecodePacket<'a> for Connect<'a> {
    fn decode_body(_flags: u8, body: &'a [u8]) -> Result<Self, DecodeError> {
        let mut cursor = 0;
        if read_utf8_string(&mut cursor, body)? != PROTOCOL_NAME
            || read_u8(&mut cursor, body)? != PROTOCOL_LEVEL
        {
            return Err(DecodeError::MalformedPacket);
        }
        let connect_flags = read_u8(&mut cursor, body)?;
        if connect_flags & 0x01 != 0 {
            return Err(DecodeError::MalformedPacket);
        }
        let keep_alive = read_u16(&mut cursor, body)?;
        let client_id = read_utf8_string(&mut cursor, body)?;

        let will = if connect_flags & 0x04 != 0 {
            let qos = QoS::try_from((connect_flags >> 3) & 0x03)?;
            let topic = read_utf8_string(&mut cursor, body)?;
            let payload = read_binary(&mut cursor, body)?;
            Some(Will {
                topic,
                payload,
                qos,
                retain: connect_flags & 0x20 != 0,
            })
        } else {
            None
        };
        let username = if connect_flags & 0x80 != 0 {
            Some(read_utf8_string(&mut cursor, body)?)
        } else {
            None
        };
        let password = if connect_flags & 0x40 != 0 {
            Some(read_binary(&mut cursor, body)?)
        } else {
            None
        };
        expect_end(cursor, body)?;

        Ok(Self {
            client_id,
            keep_alive,
            clean_session: connect_flags & 0x02 != 0,
            will,
            username,
            password,
        })
    }
}

// --- CONNACK Packet ---
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAck {
    pub session_present: bool,
    pub return_code: ConnectReturnCode,
}

impl EncodePacket for ConnAck {
    fn packet_type(&self) -> PacketType {
        PacketType::ConnAck
    }

    fn encode_body(&self, out: &mut Vec<u8>) -> Result<(), UsageError> {
        out.push(self.session_present as u8);
        out.push(self.return_code.into());
        Ok(())
    }
}

impl<'a> DecodePacket<'a> for ConnAck {
    fn decode_body(_flags: u8, body: &'a [u8]) -> Result<Self, DecodeError> {
        let mut cursor = 0;
        let ack_flags = read_u8(&mut cursor, body)?;
        if ack_flags & 0xFE != 0 {
            return Err(DecodeError::MalformedPacket);
        }
        let return_code = ConnectReturnCode::from(read_u8(&mut cursor, body)?);
        expect_end(cursor, body)?;
        Ok(Self {
            session_present: ack_flags & 0x01 != 0,
            return_code,
        })
    }
}

// --- PUBLISH Packet ---
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Publish<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
    pub qos: QoS,
    pub retain: bool,
    pub dup: bool,
    /// Present iff `qos` is above [`QoS::AtMostOnce`].
    pub packet_id: Option<u16>,
}

impl<'a> EncodePacket for Publish<'a> {
    fn packet_type(&self) -> PacketType {
        PacketType::Publish
    }

    fn flags(&self) -> u8 {
        ((self.dup as u8) << 3) | ((self.qos as u8) << 1) | self.retain as u8
    }

    fn encode_body(&self, out: &mut Vec<u8>) -> Result<(), UsageError> {
        write_utf8_string(out, self.topic)?;
        if self.qos != QoS::AtMostOnce {
            let id = self.packet_id.ok_or(UsageError::InvalidPacketId)?;
            if id == 0 {
                return Err(UsageError::InvalidPacketId);
            }
            out.extend_from_slice(&id.to_be_bytes());
        }
        out.extend_from_slice(self.payload);
        Ok(())
    }
}

impl<'a> DecodePacket<'a> for Publish<'a> {
    fn decode_body(flags: u8, body: &'a [u8]) -> Result<Self, DecodeError> {
        let qos = QoS::try_from((flags >> 1) & 0x03)?;
        let mut cursor = 0;
        let topic = read_utf8_string(&mut cursor, body)?;
        let packet_id = if qos != QoS::AtMostOnce {
            Some(read_packet_id(&mut cursor, body)?)
        } else {
            None
        };
        Ok(Self {
            topic,
            payload: &body[cursor..],
            qos,
            retain: flags & 0x01 != 0,
            dup: flags & 0x08 != 0,
            packet_id,
        })
    }
}

// --- Acknowledgements carrying only a packet identifier ---

macro_rules! define_ack_packet {
    ($(#[$meta:meta])* $name:ident, $packet_type:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            pub packet_id: u16,
        }

        impl $name {
            pub fn new(packet_id: u16) -> Self {
                Self { packet_id }
            }
        }

        impl EncodePacket for $name {
            fn packet_type(&self) -> PacketType {
                $packet_type
            }

            fn encode_body(&self, out: &mut Vec<u8>) -> Result<(), UsageError> {
                if self.packet_id == 0 {
                    return Err(UsageError::InvalidPacketId);
                }
                out.extend_from_slice(&self.packet_id.to_be_bytes());
                Ok(())
            }
        }

        impl<'a> DecodePacket<'a> for $name {
            fn decode_body(_flags: u8, body: &'a [u8]) -> Result<Self, DecodeError> {
                let mut cursor = 0;
                let packet_id = read_packet_id(&mut cursor, body)?;
                expect_end(cursor, body)?;
                Ok(Self { packet_id })
            }
        }
    };
}

define_ack_packet!(
    /// Acknowledges a QoS 1 publish.
    PubAck,
    PacketType::PubAck
);
define_ack_packet!(
    /// First-phase acknowledgement of a QoS 2 publish.
    PubRec,
    PacketType::PubRec
);
define_ack_packet!(
    /// Releases a QoS 2 publish after PUBREC.
    PubRel,
    PacketType::PubRel
);
define_ack_packet!(
    /// Final acknowledgement of a QoS 2 publish.
    PubComp,
    PacketType::PubComp
);
define_ack_packet!(UnsubAck, PacketType::UnsubAck);

// --- SUBSCRIBE Packet ---
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe<'a> {
    pub packet_id: u16,
    pub topics: BoundedVec<(&'a str, QoS), MAX_TOPIC_FILTERS>,
}

impl<'a> Subscribe<'a> {
    /// Creates a Subscribe packet from a list of filters.
    pub fn from_filters<S: AsRef<str>>(
        packet_id: u16,
        filters: &'a [(S, QoS)],
    ) -> Result<Self, UsageError> {
        if filters.is_empty() {
            return Err(UsageError::EmptyFilterList);
        }
        let mut topics = BoundedVec::new();
        for (filter, qos) in filters {
            topics
                .push((filter.as_ref(), *qos))
                .map_err(|_| UsageError::TooManyFilters)?;
        }
        Ok(Self { packet_id, topics })
    }
}

impl<'a> EncodePacket for Subscribe<'a> {
    fn packet_type(&self) -> PacketType {
        PacketType::Subscribe
    }

    fn encode_body(&self, out: &mut Vec<u8>) -> Result<(), UsageError> {
        if self.packet_id == 0 {
            return Err(UsageError::InvalidPacketId);
        }
        if self.topics.is_empty() {
            return Err(UsageError::EmptyFilterList);
        }
        out.extend_from_slice(&self.packet_id.to_be_bytes());
        for (topic, qos) in &self.topics {
            write_utf8_string(out, topic)?;
            out.push(*qos as u8);
        }
        Ok(())
    }
}

impl<'a> DecodePacket<'a> for Subscribe<'a> {
    fn decode_body(_flags: u8, body: &'a [u8]) -> Result<Self, DecodeError> {
        let mut cursor = 0;
        let packet_id = read_packet_id(&mut cursor, body)?;
        let mut topics = BoundedVec::new();
        while cursor < body.len() {
            let topic = read_utf8_string(&mut cursor, body)?;
            let requested = read_u8(&mut cursor, body)?;
            if requested & 0xFC != 0 {
                return Err(DecodeError::MalformedPacket);
            }
            topics
                .push((topic, QoS::try_from(requested)?))
                .map_err(|_| DecodeError::MalformedPacket)?;
        }
        if topics.is_empty() {
            return Err(DecodeError::MalformedPacket);
        }
        Ok(Self { packet_id, topics })
    }
}

// --- SUBACK Packet ---

/// One SUBACK result byte, kept exactly as the broker sent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SubackReturnCode(pub u8);

impl SubackReturnCode {
    pub const FAILURE: Self = Self(0x80);

    pub fn granted(qos: QoS) -> Self {
        Self(qos as u8)
    }

    /// The QoS the broker granted, or `None` for the failure code.
    pub fn granted_qos(self) -> Option<QoS> {
        QoS::try_from(self.0).ok()
    }

    pub fn is_failure(self) -> bool {
        self.0 & 0x80 != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAck {
    pub packet_id: u16,
    pub return_codes: BoundedVec<SubackReturnCode, MAX_TOPIC_FILTERS>,
}

impl EncodePacket for SubAck {
    fn packet_type(&self) -> PacketType {
        PacketType::SubAck
    }

    fn encode_body(&self, out: &mut Vec<u8>) -> Result<(), UsageError> {
        out.extend_from_slice(&self.packet_id.to_be_bytes());
        out.extend(self.return_codes.iter().map(|code| code.0));
        Ok(())
    }
}

impl<'a> DecodePacket<'a> for SubAck {
    fn decode_body(_flags: u8, body: &'a [u8]) -> Result<Self, DecodeError> {
        let mut cursor = 0;
        let packet_id = read_packet_id(&mut cursor, body)?;
        let mut return_codes = BoundedVec::new();
        for &code in &body[cursor..] {
            return_codes
                .push(SubackReturnCode(code))
                .map_err(|_| DecodeError::MalformedPacket)?;
        }
        if return_codes.is_empty() {
            return Err(DecodeError::MalformedPacket);
        }
        Ok(Self {
            packet_id,
            return_codes,
        })
    }
}

// --- UNSUBSCRIBE Packet ---
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsubscribe<'a> {
    pub packet_id: u16,
    pub topics: BoundedVec<&'a str, MAX_TOPIC_FILTERS>,
}

impl<'a> Unsubscribe<'a> {
    pub fn from_filters<S: AsRef<str>>(
        packet_id: u16,
        filters: &'a [S],
    ) -> Result<Self, UsageError> {
        if filters.is_empty() {
            return Err(UsageError::EmptyFilterList);
        }
        let mut topics = BoundedVec::new();
        for filter in filters {
            topics
                .push(filter.as_ref())
                .map_err(|_| UsageError::TooManyFilters)?;
        }
        Ok(Self { packet_id, topics })
    }
}

impl<'a> EncodePacket for Unsubscribe<'a> {
    fn packet_type(&self) -> PacketType {
        PacketType::Unsubscribe
    }

    fn encode_body(&self, out: &mut Vec<u8>) -> Result<(), UsageError> {
        if self.packet_id == 0 {
            return Err(UsageError::InvalidPacketId);
        }
        if self.topics.is_empty() {
            return Err(UsageError::EmptyFilterList);
        }
        out.extend_from_slice(&self.packet_id.to_be_bytes());
        for topic in &self.topics {
            write_utf8_string(out, topic)?;
        }
        Ok(())
    }
}

impl<'a> DecodePacket<'a> for Unsubscribe<'a> {
    fn decode_body(_flags: u8, body: &'a [u8]) -> Result<Self, DecodeError> {
        let mut cursor = 0;
        let packet_id = read_packet_id(&mut cursor, body)?;
        let mut topics = BoundedVec::new();
        while cursor < body.len() {
            topics
                .push(read_utf8_string(&mut cursor, body)?)
                .map_err(|_| DecodeError::MalformedPacket)?;
        }
        if topics.is_empty() {
            return Err(DecodeError::MalformedPacket);
        }
        Ok(Self { packet_id, topics })
    }
}

// --- Packets without a body ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingReq;

impl EncodePacket for PingReq {
    fn packet_type(&self) -> PacketType {
        PacketType::PingReq
    }

    fn encode_body(&self, _out: &mut Vec<u8>) -> Result<(), UsageError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingResp;

impl EncodePacket for PingResp {
    fn packet_type(&self) -> PacketType {
        PacketType::PingResp
    }

    fn encode_body(&self, _out: &mut Vec<u8>) -> Result<(), UsageError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnect;

impl EncodePacket for Disconnect {
    fn packet_type(&self) -> PacketType {
        PacketType::Disconnect
    }

    fn encode_body(&self, _out: &mut Vec<u8>) -> Result<(), UsageError> {
        Ok(())
    }
}

//! Connection options.

use crate::packet::Will;
use crate::util::MAX_REMAINING_LENGTH;

/// Everything `CONNECT` needs, plus engine behaviour switches.
///
/// Strings and payloads are borrowed; they are copied into the CONNECT packet
/// when the connection starts, so the options only have to live for that call.
#[derive(Debug, Clone, Copy)]
pub struct MqttOptions<'a> {
    pub client_id: &'a str,
    pub keep_alive_secs: u16,
    pub clean_session: bool,
    pub username: Option<&'a str>,
    pub password: Option<&'a [u8]>,
    pub will: Option<Will<'a>>,
    /// When `true` the engine answers incoming publishes and releases itself.
    pub auto_response: bool,
    /// Largest remaining length accepted for an inbound packet.
    pub max_packet_size: usize,
}

impl<'a> MqttOptions<'a> {
    pub const fn new(client_id: &'a str) -> Self {
        Self {
            client_id,
            keep_alive_secs: 60,
            clean_session: true,
            username: None,
            password: None,
            will: None,
            auto_response: true,
            max_packet_size: MAX_REMAINING_LENGTH,
        }
    }

    pub const fn with_keep_alive(mut self, secs: u16) -> Self {
        self.keep_alive_secs = secs;
        self
    }

    pub const fn with_clean_session(mut self, clean_session: bool) -> Self {
        self.clean_session = clean_session;
        self
    }

    pub const fn with_credentials(mut self, username: &'a str, password: &'a [u8]) -> Self {
        self.username = Some(username);
        self.password = Some(password);
        self
    }

    pub const fn with_will(mut self, will: Will<'a>) -> Self {
        self.will = Some(will);
        self
    }

    pub const fn with_auto_response(mut self, auto_response: bool) -> Self {
        self.auto_response = auto_response;
        self
    }

    pub const fn with_max_packet_size(mut self, max_packet_size: usize) -> Self {
        self.max_packet_size = max_packet_size;
        self
    }
}

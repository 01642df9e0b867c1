//! # MQTT 3.1.1 Client Engine
//!
//! `mqtt-engine` is a `no_std` (with `alloc`) client-side MQTT 3.1.1 protocol
//! engine. It covers the complete packet codec, the QoS 1 and QoS 2 delivery
//! state machines in both directions, packet identifier allocation, persistent
//! sessions with in-order resend, and keep-alive.
//!
//! ## Architecture
//!
//! The crate provides two ways to use MQTT:
//!
//! ### 1. The sans-I/O engine
//!
//! [`Connection`] holds the protocol state and never touches a socket. Bytes go
//! in through [`Connection::on_bytes_received`]; encoded packets come out of
//! [`Connection::poll_transmit`]. Events reach the application through the
//! callbacks of a [`HandlerSet`]. Acknowledgement-class callbacks return `bool`;
//! returning `false` stops reading and closes the session.
//!
//! ```ignore
//! let mut conn = Connection::new();
//! conn.handlers_mut().set_suback_handler(|id, codes| {
//!     info!("subscription {} granted {:?}", id, codes);
//!     true
//! });
//! conn.connect(&MqttOptions::new("client-1"))?;
//! while let Some(bytes) = conn.poll_transmit() {
//!     socket.write_all(bytes)?;
//!     conn.on_write_complete();
//! }
//! ```
//!
//! ### 2. The async client
//!
//! [`MqttClient`] runs the engine over any [`MqttTransport`], built on the
//! [Embassy](https://embassy.dev/) async ecosystem for timers and channels.
//! Other tasks talk to it through a [`ClientHandle`](client::ClientHandle).
//!
//! ## Logging
//!
//! Enable exactly one of the `log`, `defmt` or `esp32-log` features to get
//! diagnostics; with none of them logging compiles away.

#![no_std]

extern crate alloc;

#[macro_use]
mod fmt;

pub mod client;
pub mod connection;
pub mod error;
pub mod handlers;
pub mod incoming;
mod outbox;
pub mod options;
pub mod outgoing;
pub mod packet;
pub mod packet_id;
pub mod transport;
pub mod util;

// Re-export key types for easier access at the crate root.
pub use client::MqttClient;
pub use connection::{Connection, ConnectionState};
pub use error::{Anomaly, ConnectReturnCode, DecodeError, ErrorEvent, MqttError, UsageError};
pub use handlers::{CompletionCallback, Flow, HandlerSet};
pub use options::MqttOptions;
pub use packet::{PacketType, Publish, QoS, SubackReturnCode, Will};
pub use transport::{MqttTransport, TcpTransport};

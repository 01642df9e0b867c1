//! # MQTT Transport Abstraction
//!
//! This module defines the `MqttTransport` trait, which abstracts the underlying
//! communication channel (like TCP, UART, etc.), allowing the client driver to be
//! hardware and network-stack agnostic.
//!
//! With the Rust 2024 Edition, this trait uses native `async fn`, removing the
//! need for the `#[async_trait]` macro.

use embassy_net::tcp::{Error as TcpError, TcpSocket};
use embassy_time::{Duration, Timer};
use embedded_io_async::Write;

/// A reliable, ordered byte stream to the broker.
#[allow(async_fn_in_trait)]
pub trait MqttTransport {
    /// The error type returned by the transport.
    type Error: core::fmt::Debug;

    /// Sends a buffer of data over the transport.
    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error>;

    /// Receives data from the transport into a buffer.
    ///
    /// Returns the number of bytes read. Zero means the peer closed the stream.
    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Closes the stream after pending output has been sent.
    async fn close(&mut self);
}

/// Errors raised by [`TcpTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TcpTransportError {
    Tcp(TcpError),
    /// Nothing arrived within the read timeout.
    Timeout,
}

/// TCP transport implementation using `embassy-net`.
pub struct TcpTransport<'a> {
    socket: TcpSocket<'a>,
    timeout: Duration,
}

impl<'a> TcpTransport<'a> {
    /// Creates a new `TcpTransport` from a connected socket.
    ///
    /// `timeout` bounds each read. Pick one longer than the keep-alive interval
    /// so that an idle but healthy session is not torn down.
    pub fn new(socket: TcpSocket<'a>, timeout: Duration) -> Self {
        Self { socket, timeout }
    }

    async fn read_with_timeout(&mut self, buf: &mut [u8]) -> Result<usize, TcpTransportError> {
        // Race the read against a timer.
        let read_fut = self.socket.read(buf);
        let timer = Timer::after(self.timeout);

        match futures::future::select(core::pin::pin!(read_fut), core::pin::pin!(timer)).await {
            futures::future::Either::Left((Ok(n), _)) => {
                if n == 0 {
                    debug!("TCP connection closed by peer");
                } else {
                    trace!("TCP read: {} bytes", n);
                }
                Ok(n)
            }
            futures::future::Either::Left((Err(e), _)) => {
                warn!("TCP read error: {:?}", e);
                Err(TcpTransportError::Tcp(e))
            }
            futures::future::Either::Right(((), _)) => {
                warn!("TCP read timeout");
                Err(TcpTransportError::Timeout)
            }
        }
    }
}

impl<'a> MqttTransport for TcpTransport<'a> {
    type Error = TcpTransportError;

    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        trace!("TCP TX ({} bytes)", buf.len());

        self.socket.write_all(buf).await.map_err(|e| {
            warn!("TCP write error: {:?}", e);
            TcpTransportError::Tcp(e)
        })?;

        // Flush to ensure data is actually sent to the network
        self.socket.flush().await.map_err(TcpTransportError::Tcp)
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.read_with_timeout(buf).await
    }

    async fn close(&mut self) {
        self.socket.close();
        if let Err(e) = self.socket.flush().await {
            debug!("TCP flush on close failed: {:?}", e);
        }
    }
}

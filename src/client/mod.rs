//! # Async Client Driver
//!
//! [`MqttClient`] drives a [`Connection`] over an [`MqttTransport`]: it writes
//! whatever the engine queues, feeds received bytes back, applies requests from
//! [`ClientHandle`]s and pings the broker on the keep-alive interval.
//!
//! ```ignore
//! static REQUESTS: RequestChannel<'static, 8> = RequestChannel::new();
//!
//! let mut client = MqttClient::<_, 8, 512>::new(transport, REQUESTS.receiver());
//! client.handlers_mut().set_publish_handler(|msg| {
//!     info!("{}: {} bytes", msg.topic, msg.payload.len());
//!     true
//! });
//!
//! let handle = ClientHandle::new(REQUESTS.sender());
//! spawner.spawn(telemetry(handle))?;
//!
//! client.run(&MqttOptions::new("sensor-1").with_keep_alive(30)).await?;
//! ```

mod handle;

pub use handle::{ClientHandle, Request, RequestChannel, RequestReceiver, RequestSender};

use core::future::pending;

use embassy_futures::select::{Either3, select3};
use embassy_time::{Duration, Ticker};

use crate::connection::{Connection, ConnectionState};
use crate::error::{ConnectReturnCode, MqttError};
use crate::handlers::{Flow, HandlerSet};
use crate::options::MqttOptions;
use crate::transport::MqttTransport;

/// An async MQTT client owning one transport.
///
/// # Type Parameters
///
/// - `DEPTH`: capacity of the request channel
/// - `RX_SIZE`: size of the receive buffer; packets larger than this are
///   reassembled across reads
pub struct MqttClient<'a, T, const DEPTH: usize, const RX_SIZE: usize>
where
    T: MqttTransport,
{
    transport: T,
    connection: Connection,
    requests: RequestReceiver<'a, DEPTH>,
    rx_buf: [u8; RX_SIZE],
}

impl<'a, T, const DEPTH: usize, const RX_SIZE: usize> MqttClient<'a, T, DEPTH, RX_SIZE>
where
    T: MqttTransport,
{
    pub fn new(transport: T, requests: RequestReceiver<'a, DEPTH>) -> Self {
        Self::with_connection(transport, Connection::new(), requests)
    }

    /// Wraps an existing engine, e.g. one carrying a persistent session over
    /// from a previous transport.
    pub fn with_connection(
        transport: T,
        connection: Connection,
        requests: RequestReceiver<'a, DEPTH>,
    ) -> Self {
        Self {
            transport,
            connection,
            requests,
            rx_buf: [0; RX_SIZE],
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }

    pub fn handlers_mut(&mut self) -> &mut HandlerSet {
        self.connection.handlers_mut()
    }

    /// Gives the engine back, keeping any retained session state.
    pub fn into_connection(self) -> Connection {
        self.connection
    }

    /// Connects and services the session until it ends.
    ///
    /// Returns `Ok(())` after a requested disconnect or a handler-initiated stop.
    pub async fn run(&mut self, options: &MqttOptions<'_>) -> Result<(), MqttError<T::Error>> {
        self.connection.connect(options)?;
        self.flush().await?;

        let mut keep_alive = (options.keep_alive_secs > 0)
            .then(|| Ticker::every(Duration::from_secs(u64::from(options.keep_alive_secs))));

        loop {
            if self.connection.is_closing() {
                return self.shutdown().await;
            }

            let connected = self.connection.is_connected();
            let requests = self.requests;
            let event = select3(
                self.transport.recv(&mut self.rx_buf),
                async move {
                    if connected {
                        requests.receive().await
                    } else {
                        pending().await
                    }
                },
                async {
                    match keep_alive.as_mut() {
                        Some(ticker) => ticker.next().await,
                        None => pending().await,
                    }
                },
            )
            .await;

            match event {
                Either3::First(Ok(0)) => {
                    info!("broker closed the connection");
                    self.connection.on_transport_closed();
                    return Err(MqttError::Closed);
                }
                Either3::First(Ok(n)) => {
                    let flow = self.connection.on_bytes_received(&self.rx_buf[..n]);
                    if flow == Flow::Stop && self.connection.state() == ConnectionState::Disconnected
                    {
                        self.transport.close().await;
                        return Err(MqttError::Closed);
                    }
                    self.flush().await?;
                }
                Either3::First(Err(e)) => {
                    self.connection.on_transport_error();
                    return Err(MqttError::Transport(e));
                }
                Either3::Second(request) => {
                    self.apply(request);
                    self.flush().await?;
                }
                Either3::Third(()) => {
                    if self.connection.keep_alive_elapsed() == Flow::Stop {
                        self.transport.close().await;
                        return Err(MqttError::Timeout);
                    }
                    self.flush().await?;
                }
            }
        }
    }

    fn apply(&mut self, request: Request<'_>) {
        debug!("applying request");
        let result = match request {
            Request::Publish {
                topic,
                payload,
                qos,
                retain,
            } => self
                .connection
                .publish(topic, payload, qos, retain, None)
                .map(drop),
            Request::Subscribe { filters } => self.connection.subscribe(filters).map(drop),
            Request::Unsubscribe { filters } => self.connection.unsubscribe(filters).map(drop),
            Request::Disconnect => self.connection.disconnect(),
        };
        if let Err(err) = result {
            warn!("request rejected: {:?}", err);
        }
    }

    /// Writes every queued packet.
    async fn flush(&mut self) -> Result<(), MqttError<T::Error>> {
        while let Some(bytes) = self.connection.poll_transmit() {
            if let Err(e) = self.transport.send(bytes).await {
                self.connection.on_transport_error();
                return Err(MqttError::Transport(e));
            }
            self.connection.on_write_complete();
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), MqttError<T::Error>> {
        self.flush().await?;
        self.transport.close().await;
        self.connection.on_transport_closed();
        match self.connection.connect_return_code() {
            Some(code) if code != ConnectReturnCode::Accepted => {
                Err(MqttError::ConnectionRefused(code))
            }
            _ => Ok(()),
        }
    }
}

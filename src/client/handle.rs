//! Request channel between application tasks and the client driver.
//!
//! The driver owns the [`Connection`](crate::Connection), so other tasks cannot
//! call it directly. They hold a [`ClientHandle`] instead, which forwards
//! requests over an `embassy-sync` channel; the driver applies them once the
//! session is connected.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};

use crate::packet::QoS;

/// An operation requested through a [`ClientHandle`].
///
/// Topics, filters and payloads are borrowed and must outlive the request. For
/// static data (common in embedded), use `'static`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    Publish {
        topic: &'a str,
        payload: &'a [u8],
        qos: QoS,
        retain: bool,
    },
    Subscribe {
        filters: &'a [(&'a str, QoS)],
    },
    Unsubscribe {
        filters: &'a [&'a str],
    },
    Disconnect,
}

pub type RequestChannel<'a, const DEPTH: usize> =
    Channel<CriticalSectionRawMutex, Request<'a>, DEPTH>;

pub type RequestSender<'a, const DEPTH: usize> =
    Sender<'a, CriticalSectionRawMutex, Request<'a>, DEPTH>;

pub type RequestReceiver<'a, const DEPTH: usize> =
    Receiver<'a, CriticalSectionRawMutex, Request<'a>, DEPTH>;

/// A cloneable handle for issuing requests to a running client.
#[derive(Clone, Copy)]
pub struct ClientHandle<'a, const DEPTH: usize> {
    tx: RequestSender<'a, DEPTH>,
}

impl<'a, const DEPTH: usize> ClientHandle<'a, DEPTH> {
    pub fn new(tx: RequestSender<'a, DEPTH>) -> Self {
        Self { tx }
    }

    /// Queues a publish, waiting while the channel is full.
    pub async fn publish(&self, topic: &'a str, payload: &'a [u8], qos: QoS, retain: bool) {
        self.tx
            .send(Request::Publish {
                topic,
                payload,
                qos,
                retain,
            })
            .await;
    }

    /// Queues a publish without waiting. Returns `false` if the channel is full.
    pub fn try_publish(&self, topic: &'a str, payload: &'a [u8], qos: QoS, retain: bool) -> bool {
        self.tx
            .try_send(Request::Publish {
                topic,
                payload,
                qos,
                retain,
            })
            .is_ok()
    }

    pub async fn subscribe(&self, filters: &'a [(&'a str, QoS)]) {
        self.tx.send(Request::Subscribe { filters }).await;
    }

    /// Queues a subscribe without waiting, e.g. from inside a handler. Returns
    /// `false` if the channel is full.
    pub fn try_subscribe(&self, filters: &'a [(&'a str, QoS)]) -> bool {
        self.tx.try_send(Request::Subscribe { filters }).is_ok()
    }

    pub async fn unsubscribe(&self, filters: &'a [&'a str]) {
        self.tx.send(Request::Unsubscribe { filters }).await;
    }

    pub fn try_unsubscribe(&self, filters: &'a [&'a str]) -> bool {
        self.tx.try_send(Request::Unsubscribe { filters }).is_ok()
    }

    /// Asks the driver to send DISCONNECT and close the transport.
    pub async fn disconnect(&self) {
        self.tx.send(Request::Disconnect).await;
    }

    pub fn try_disconnect(&self) -> bool {
        self.tx.try_send(Request::Disconnect).is_ok()
    }
}

//! Channel transport to the recognition service and the in-process event hub.

use std::fmt;

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use rollcall_types::{
    events::KioskEvent,
    protocol::{ClientMessage, ServiceMessage},
    RollcallError,
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

mod backoff;
mod local;
mod ws;

pub use backoff::Backoff;
pub use local::{local_pair, LocalChannel, ServiceEndpoint};
pub use ws::WsChannel;

/// What a transport reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected { reason: String },
    Message(ServiceMessage),
}

/// Why a message could not be queued for sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailure {
    /// Outbound queue is at capacity.
    QueueFull,
    /// No live connection, or the transport was shut down.
    Closed,
}

impl fmt::Display for SendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendFailure::QueueFull => write!(f, "outbound queue is full"),
            SendFailure::Closed => write!(f, "channel is not connected"),
        }
    }
}

impl From<SendFailure> for RollcallError {
    fn from(failure: SendFailure) -> Self {
        transport_error(failure.to_string())
    }
}

/// Bidirectional, message-oriented link with order-preserving delivery per
/// direction and no request/response correlation of its own.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Queue `message` without waiting for it to be written.
    fn try_send(&self, message: ClientMessage) -> Result<(), SendFailure>;

    /// Next inbound event, `None` once the transport is gone for good.
    async fn recv(&mut self) -> Option<TransportEvent>;
}

#[async_trait]
impl<T: ChannelTransport + ?Sized> ChannelTransport for Box<T> {
    fn try_send(&self, message: ClientMessage) -> Result<(), SendFailure> {
        (**self).try_send(message)
    }

    async fn recv(&mut self) -> Option<TransportEvent> {
        (**self).recv().await
    }
}

/// Fan-out of kiosk events to display surfaces.
#[derive(Clone)]
pub struct EventHub {
    tx: broadcast::Sender<KioskEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: KioskEvent) {
        // No subscribers is fine; the kiosk runs headless.
        let _ = self.tx.send(event);
    }

    /// Subscriber that skips over events it lagged behind on.
    pub fn subscribe(&self) -> BoxStream<'static, KioskEvent> {
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(|event| async move { event.ok() })
            .boxed()
    }
}

pub fn transport_error(message: impl Into<String>) -> RollcallError {
    RollcallError::Transport(message.into())
}

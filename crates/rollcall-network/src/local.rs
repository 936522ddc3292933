use async_trait::async_trait;
use rollcall_types::{
    protocol::{ClientMessage, ServiceMessage},
    Result,
};
use tokio::sync::mpsc;
use tracing::debug;

use crate::{transport_error, ChannelTransport, SendFailure, TransportEvent};

/// Client half of an in-process channel.
pub struct LocalChannel {
    outbound: mpsc::Sender<ClientMessage>,
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Service half of an in-process channel; stands in for the recognition
/// service in tests and demo mode.
pub struct ServiceEndpoint {
    requests: mpsc::Receiver<ClientMessage>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

/// Connected pair with an outbound (client to service) queue of `capacity`.
pub fn local_pair(capacity: usize) -> (LocalChannel, ServiceEndpoint) {
    let (outbound, requests) = mpsc::channel(capacity.max(1));
    let (events, inbound) = mpsc::unbounded_channel();
    (
        LocalChannel { outbound, inbound },
        ServiceEndpoint { requests, events },
    )
}

#[async_trait]
impl ChannelTransport for LocalChannel {
    fn try_send(&self, message: ClientMessage) -> Result<(), SendFailure> {
        self.outbound.try_send(message).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => SendFailure::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendFailure::Closed,
        })
    }

    async fn recv(&mut self) -> Option<TransportEvent> {
        self.inbound.recv().await
    }
}

impl ServiceEndpoint {
    pub async fn next_request(&mut self) -> Option<ClientMessage> {
        self.requests.recv().await
    }

    /// Request already queued, without waiting.
    pub fn try_next_request(&mut self) -> Option<ClientMessage> {
        self.requests.try_recv().ok()
    }

    /// Drain every queued request.
    pub fn drain_requests(&mut self) -> Vec<ClientMessage> {
        let mut drained = Vec::new();
        while let Ok(message) = self.requests.try_recv() {
            drained.push(message);
        }
        drained
    }

    pub fn push(&self, message: ServiceMessage) -> Result<()> {
        debug!("Local service push {}", message.event_name());
        self.emit(TransportEvent::Message(message))
    }

    pub fn emit(&self, event: TransportEvent) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| transport_error("local client has gone away"))
    }
}

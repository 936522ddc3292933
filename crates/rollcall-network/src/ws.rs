//! WebSocket transport with reconnect-and-backoff.
//!
//! A background task owns the socket. It forwards queued client messages
//! as JSON text frames and decodes inbound frames into [`TransportEvent`]s.
//! Messages queued while disconnected are refused (`SendFailure::Closed`)
//! and whatever was still queued when a session ended is discarded, so
//! stale frames are never flushed into a fresh connection.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_stream::stream;
use async_trait::async_trait;
use futures::{SinkExt, Stream, StreamExt};
use rollcall_types::{
    config::ChannelConfig,
    protocol::{ClientMessage, ServiceMessage},
};
use tokio::{sync::mpsc, task::JoinHandle, time::Duration};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, Message},
};
use tracing::{debug, error, info, warn};

use crate::{Backoff, ChannelTransport, SendFailure, TransportEvent};

const INBOUND_CAPACITY: usize = 256;

pub struct WsChannel {
    outbound: mpsc::Sender<ClientMessage>,
    inbound: mpsc::Receiver<TransportEvent>,
    connected: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl WsChannel {
    /// Start connecting to `config.url` in the background.
    pub fn spawn(config: &ChannelConfig) -> Self {
        let (outbound, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));
        let (inbound_tx, inbound) = mpsc::channel(INBOUND_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));
        let backoff = Backoff::new(
            Duration::from_millis(config.reconnect_initial_ms),
            Duration::from_millis(config.reconnect_max_ms),
        );
        let task = tokio::spawn(run(
            config.url.clone(),
            backoff,
            outbound_rx,
            inbound_tx,
            connected.clone(),
        ));
        Self {
            outbound,
            inbound,
            connected,
            task,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[async_trait]
impl ChannelTransport for WsChannel {
    fn try_send(&self, message: ClientMessage) -> Result<(), SendFailure> {
        if !self.is_connected() {
            return Err(SendFailure::Closed);
        }
        self.outbound.try_send(message).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => SendFailure::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendFailure::Closed,
        })
    }

    async fn recv(&mut self) -> Option<TransportEvent> {
        self.inbound.recv().await
    }
}

/// Connection loop; returns once the client half is dropped.
async fn run(
    url: String,
    mut backoff: Backoff,
    mut outbound_rx: mpsc::Receiver<ClientMessage>,
    inbound_tx: mpsc::Sender<TransportEvent>,
    connected: Arc<AtomicBool>,
) {
    loop {
        info!(url = %url, "Connecting to recognition service");
        let reason = match connect_async(url.as_str()).await {
            Ok((ws_stream, _response)) => {
                info!("Recognition service connected");
                backoff.reset();
                connected.store(true, Ordering::Release);
                if inbound_tx.send(TransportEvent::Connected).await.is_err() {
                    return;
                }
                let ended = run_session(ws_stream, &mut outbound_rx, &inbound_tx).await;
                connected.store(false, Ordering::Release);
                let discarded = discard_queued(&mut outbound_rx);
                if discarded > 0 {
                    debug!(discarded, "Discarded messages queued for the old session");
                }
                match ended {
                    Some(reason) => reason,
                    None => return,
                }
            }
            Err(err) => {
                error!(error = %err, "Recognition service connection failed");
                format!("connection failed: {err}")
            }
        };

        if inbound_tx
            .send(TransportEvent::Disconnected { reason })
            .await
            .is_err()
        {
            return;
        }
        let delay = backoff.next_delay();
        warn!(delay_ms = delay.as_millis() as u64, "Reconnecting after delay");
        tokio::time::sleep(delay).await;
    }
}

enum SessionRead {
    Message(ServiceMessage),
    Ended(String),
}

/// Drive one connection. Returns the reason it ended, or `None` when the
/// client half is gone and the task should stop.
async fn run_session<S>(
    ws_stream: S,
    outbound_rx: &mut mpsc::Receiver<ClientMessage>,
    inbound_tx: &mpsc::Sender<TransportEvent>,
) -> Option<String>
where
    S: Stream<Item = Result<Message, tungstenite::Error>>
        + futures::Sink<Message, Error = tungstenite::Error>
        + Unpin,
{
    let (mut sink, stream) = ws_stream.split();
    let reads = service_messages(stream);
    tokio::pin!(reads);

    loop {
        tokio::select! {
            outgoing = outbound_rx.recv() => {
                let Some(message) = outgoing else {
                    let _ = sink.close().await;
                    return None;
                };
                let text = match message.encode() {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(error = %err, "Dropping unencodable message");
                        continue;
                    }
                };
                debug!(event = message.event_name(), bytes = text.len(), "Sending");
                if let Err(err) = sink.send(Message::Text(text)).await {
                    error!(error = %err, "WebSocket send failed");
                    return Some(format!("send failed: {err}"));
                }
            }
            read = reads.next() => {
                match read {
                    Some(SessionRead::Message(message)) => {
                        if inbound_tx.send(TransportEvent::Message(message)).await.is_err() {
                            return None;
                        }
                    }
                    Some(SessionRead::Ended(reason)) => return Some(reason),
                    None => return Some("stream exhausted".into()),
                }
            }
        }
    }
}

/// Decode text frames into service messages. Malformed or unknown events
/// are skipped; close frames and read errors end the stream.
fn service_messages<S>(mut frames: S) -> impl Stream<Item = SessionRead>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    stream! {
        while let Some(frame) = frames.next().await {
            match frame {
                Ok(Message::Text(text)) => match ServiceMessage::decode(&text) {
                    Ok(message) => {
                        yield SessionRead::Message(message);
                    }
                    Err(err) => {
                        warn!(error = %err, raw = %text, "Skipping service message");
                    }
                },
                Ok(Message::Close(close)) => {
                    info!(?close, "Recognition service closed the channel");
                    yield SessionRead::Ended("closed by service".into());
                    break;
                }
                Ok(_) => {
                    // Ping/pong are answered by tungstenite; binary is unused.
                }
                Err(err) => {
                    error!(error = %err, "WebSocket receive error");
                    yield SessionRead::Ended(format!("receive error: {err}"));
                    break;
                }
            }
        }
    }
}

fn discard_queued(outbound_rx: &mut mpsc::Receiver<ClientMessage>) -> usize {
    let mut discarded = 0;
    while outbound_rx.try_recv().is_ok() {
        discarded += 1;
    }
    discarded
}

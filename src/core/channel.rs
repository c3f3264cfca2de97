//! Bridge Channel Client
//!
//! Owns the single real-time connection to the capture backend and
//! re-establishes it with capped exponential backoff whenever it drops.
//! Connection failures are never fatal: they are logged, and the next
//! attempt is scheduled per the reconnect policy.

use crate::core::backoff::ReconnectPolicy;
use crate::core::models::{ChannelEvent, Envelope, OutboundEvent};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            2 => ConnectionState::Connected,
            1 => ConnectionState::Connecting,
            _ => ConnectionState::Disconnected,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: AtomicU8,
    attempts: AtomicU32,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }
}

type Transport = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct BridgeChannelClient {
    url: String,
    policy: ReconnectPolicy,
    events_tx: mpsc::UnboundedSender<ChannelEvent>,
    outbound_tx: mpsc::UnboundedSender<String>,
    // The run task holds this lock for its whole life, so tearing the task
    // down releases the receiver for the next `connect()`.
    outbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    shared: Arc<Shared>,
    shutdown: Arc<AtomicBool>,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl BridgeChannelClient {
    pub fn new(
        url: impl Into<String>,
        policy: ReconnectPolicy,
    ) -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let client = BridgeChannelClient {
            url: url.into(),
            policy,
            events_tx,
            outbound_tx,
            outbound_rx: Arc::new(Mutex::new(outbound_rx)),
            shared: Arc::new(Shared::default()),
            shutdown: Arc::new(AtomicBool::new(false)),
            task: parking_lot::Mutex::new(None),
        };
        (client, events_rx)
    }

    /// Start (or restart) the channel. Idempotent: any prior transport is
    /// torn down first, so at most one is ever active.
    pub fn connect(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.shutdown.store(false, Ordering::SeqCst);
        self.shared.set_state(ConnectionState::Disconnected);

        let task = tokio::spawn(run_loop(
            self.url.clone(),
            self.policy.clone(),
            self.events_tx.clone(),
            self.outbound_rx.clone(),
            self.shared.clone(),
            self.shutdown.clone(),
        ));
        *self.task.lock() = Some(task);
    }

    /// Client-initiated teardown. No reconnect is scheduled afterwards.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.shared.set_state(ConnectionState::Disconnected);
        info!("bridge channel shut down");
    }

    /// Queue an event for the backend. Events queued while disconnected are
    /// flushed once the channel is re-established.
    pub fn emit(&self, event: OutboundEvent) {
        debug!("emitting {}", event.event_name());
        if self.outbound_tx.send(event.encode()).is_err() {
            warn!("outbound queue closed, {} dropped", event.event_name());
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::SeqCst)
    }
}

impl Drop for BridgeChannelClient {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

async fn run_loop(
    url: String,
    policy: ReconnectPolicy,
    events_tx: mpsc::UnboundedSender<ChannelEvent>,
    outbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    shared: Arc<Shared>,
    shutdown: Arc<AtomicBool>,
) {
    let mut outbound = outbound_rx.lock().await;

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        shared.set_state(ConnectionState::Connecting);

        match connect_async(url.as_str()).await {
            Ok((mut transport, _)) => {
                shared.attempts.store(0, Ordering::SeqCst);
                shared.set_state(ConnectionState::Connected);
                info!("bridge channel connected to {url}");
                let _ = events_tx.send(ChannelEvent::Connected);

                let reason = pump(&mut transport, &mut *outbound, &events_tx).await;
                let _ = transport.close(None).await;
                shared.set_state(ConnectionState::Disconnected);
                let _ = events_tx.send(ChannelEvent::Disconnected {
                    reason: reason.clone(),
                });
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                warn!("bridge channel dropped: {reason}");
            }
            Err(err) => {
                shared.set_state(ConnectionState::Disconnected);
                warn!("bridge channel connect failed: {err}");
            }
        }

        let attempt = shared.attempts.fetch_add(1, Ordering::SeqCst);
        if policy.exhausted(attempt) {
            warn!("bridge channel giving up after {attempt} reconnect attempts");
            break;
        }
        let delay = policy.delay_for(attempt);
        debug!("reconnecting in {delay:?} (attempt {})", attempt + 1);
        tokio::time::sleep(delay).await;
    }
}

/// Pump the live transport until it drops. Returns the disconnect reason.
async fn pump(
    transport: &mut Transport,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    events_tx: &mpsc::UnboundedSender<ChannelEvent>,
) -> String {
    loop {
        tokio::select! {
            inbound = transport.next() => match inbound {
                Some(Ok(Message::Text(text))) => dispatch(&text, events_tx),
                Some(Ok(Message::Close(_))) => return "server close".to_string(),
                Some(Ok(_)) => {}
                Some(Err(err)) => return format!("transport error: {err}"),
                None => return "stream ended".to_string(),
            },
            queued = outbound.recv() => match queued {
                Some(text) => {
                    if let Err(err) = transport.send(Message::Text(text)).await {
                        return format!("send failed: {err}");
                    }
                }
                None => return "outbound queue closed".to_string(),
            },
        }
    }
}

fn dispatch(text: &str, events_tx: &mpsc::UnboundedSender<ChannelEvent>) {
    let Some(envelope) = Envelope::decode(text) else {
        warn!("undecodable channel frame: {text}");
        return;
    };
    match ChannelEvent::decode(&envelope.event, &envelope.data) {
        Some(event) => {
            let _ = events_tx.send(event);
        }
        None => debug!("ignoring channel event {:?}", envelope.event),
    }
}

//! WebSocket connection manager — connect, authenticate, and run the
//! receive and heartbeat loops until cancelled.
//!
//! State machine:
//!
//! ```text
//! Idle/Closed ─start─► Connecting ─socket open─► Authenticating ─auth sent─► Open
//!      ▲                                                                      │
//!      └──────────── Closing ◄─── stop() / loop failure / server close ───────┘
//! ```
//!
//! Each `start` is one *attempt* with its own generation number and
//! cancellation token. Loops from an older attempt can never tear down a
//! newer one.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use ol_domain::trace::TraceEvent;
use ol_domain::{Error, ProtocolError, Result};
use ol_protocol::{decode, encode, split_packets, ClientOperation, ServerOperation};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::dispatcher::EventDispatcher;
use crate::types::{ConnectionState, StartOutcome};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Handle to the data-plane connection. Cheap to clone.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    ws_url: String,
    heartbeat_interval: Duration,
    dispatcher: Arc<EventDispatcher>,
    slot: Mutex<Slot>,
}

#[derive(Default)]
struct Slot {
    state: ConnectionState,
    generation: u64,
    cancel: Option<CancellationToken>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("ws_url", &self.inner.ws_url)
            .field("state", &self.state())
            .finish()
    }
}

impl Connection {
    /// `heartbeat_interval` must be non-zero.
    pub fn new(
        ws_url: impl Into<String>,
        heartbeat_interval: Duration,
        dispatcher: Arc<EventDispatcher>,
    ) -> Result<Self> {
        if heartbeat_interval.is_zero() {
            return Err(Error::Config("heartbeat_interval must be non-zero".into()));
        }
        Ok(Self {
            inner: Arc::new(ConnectionInner {
                ws_url: ws_url.into(),
                heartbeat_interval,
                dispatcher,
                slot: Mutex::new(Slot::default()),
            }),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.slot.lock().state
    }

    /// Connect, send the `Auth` packet, and spawn the receive and heartbeat
    /// loops. Returns once the auth packet is on the wire.
    ///
    /// Cancelling `cancel` (here, from a loop, or from the session
    /// controller) tears the connection down. A second call while a
    /// connection is live returns [`StartOutcome::AlreadyRunning`].
    ///
    /// On failure the attempt is fully torn down before the error is
    /// returned.
    pub async fn start(&self, auth_body: &str, cancel: CancellationToken) -> Result<StartOutcome> {
        Ok(match self.start_attempt(auth_body, cancel).await? {
            Some(_) => StartOutcome::Started,
            None => StartOutcome::AlreadyRunning,
        })
    }

    /// Like [`start`](Self::start), but hands back the attempt's generation
    /// (`None` when already running) so the caller can later stop exactly
    /// this attempt with [`stop_attempt`](Self::stop_attempt).
    pub(crate) async fn start_attempt(
        &self,
        auth_body: &str,
        cancel: CancellationToken,
    ) -> Result<Option<u64>> {
        let generation = {
            let mut slot = self.inner.slot.lock();
            if !slot.state.can_start() {
                return Ok(None);
            }
            slot.generation += 1;
            slot.state = ConnectionState::Connecting;
            slot.cancel = Some(cancel.clone());
            slot.generation
        };

        match self.open(auth_body, &cancel, generation).await {
            Ok(()) => Ok(Some(generation)),
            Err(e) => {
                tracing::warn!(error = %e, url = %self.inner.ws_url, "socket start failed");
                cancel.cancel();
                self.inner.finish(Some(generation), ConnectionState::Idle, "start failed");
                Err(e)
            }
        }
    }

    /// Tear down the current connection, if any. Idempotent, never blocks
    /// on I/O, safe to call from any loop.
    pub fn stop(&self) {
        self.inner.finish(None, ConnectionState::Idle, "stopped");
    }

    /// Tear down attempt `generation` only. A no-op once a newer attempt
    /// owns the connection.
    pub(crate) fn stop_attempt(&self, generation: u64) {
        self.inner.finish(Some(generation), ConnectionState::Idle, "stopped");
    }

    async fn open(
        &self,
        auth_body: &str,
        cancel: &CancellationToken,
        generation: u64,
    ) -> Result<()> {
        let url = self.inner.ws_url.as_str();
        tracing::info!(url = %url, "connecting to broadcast socket");

        let ws = tokio::select! {
            r = tokio_tungstenite::connect_async(url) => {
                r.map_err(|e| Error::Network(format!("connect {url}: {e}")))?.0
            }
            _ = cancel.cancelled() => return Err(stopped_during_start()),
        };
        TraceEvent::SocketOpened { url: url.to_owned() }.emit();
        self.inner.advance(generation, ConnectionState::Authenticating)?;

        let (mut sink, stream) = ws.split();
        let auth = encode(ClientOperation::Auth, auth_body.as_bytes());
        tokio::select! {
            r = sink.send(Message::Binary(auth)) => {
                r.map_err(|e| Error::Network(format!("sending auth packet: {e}")))?
            }
            _ = cancel.cancelled() => return Err(stopped_during_start()),
        }
        self.inner.advance(generation, ConnectionState::Open)?;
        tracing::debug!("auth packet sent");

        tokio::spawn(receive_loop(self.inner.clone(), stream, cancel.clone(), generation));
        tokio::spawn(heartbeat_loop(self.inner.clone(), sink, cancel.clone(), generation));
        Ok(())
    }
}

fn stopped_during_start() -> Error {
    Error::Network("connection stopped during start".into())
}

impl ConnectionInner {
    /// Move the current attempt forward, unless it was stopped meanwhile.
    fn advance(&self, generation: u64, next: ConnectionState) -> Result<()> {
        let mut slot = self.slot.lock();
        let live = slot.generation == generation
            && slot.cancel.as_ref().is_some_and(|c| !c.is_cancelled());
        if !live {
            return Err(stopped_during_start());
        }
        slot.state = next;
        Ok(())
    }

    /// Cancel attempt `generation` (the current one when `None`) and park
    /// the state at `end`. A no-op for stale generations and for attempts
    /// already torn down.
    fn finish(&self, generation: Option<u64>, end: ConnectionState, reason: &str) {
        let (generation, cancel) = {
            let mut slot = self.slot.lock();
            let generation = generation.unwrap_or(slot.generation);
            if slot.generation != generation {
                return;
            }
            let Some(cancel) = slot.cancel.take() else {
                return;
            };
            slot.state = ConnectionState::Closing;
            (generation, cancel)
        };

        // Closing blocks new starts until the state is parked below.
        cancel.cancel();
        {
            let mut slot = self.slot.lock();
            if slot.generation == generation && slot.state == ConnectionState::Closing {
                slot.state = end;
            }
        }

        tracing::info!(reason = %reason, state = %end, "socket torn down");
        TraceEvent::SocketClosed {
            reason: reason.to_owned(),
        }
        .emit();
    }

    /// Split, decode and dispatch one WebSocket message.
    fn handle_frame(&self, data: &[u8]) -> std::result::Result<(), ProtocolError> {
        for packet in split_packets(data)? {
            let (op, body) = decode(packet)?;
            self.dispatcher.dispatch(ServerOperation::try_from(op)?, body)?;
        }
        Ok(())
    }
}

/// Receive frames until cancelled. Any transport or protocol error is fatal.
///
/// tungstenite reassembles continuation frames, so every `Binary` message
/// is already a complete frame.
async fn receive_loop(
    inner: Arc<ConnectionInner>,
    mut stream: WsSource,
    cancel: CancellationToken,
    generation: u64,
) {
    let failure = loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break None,
            msg = stream.next() => msg,
        };
        match msg {
            Some(Ok(Message::Binary(data))) => {
                if let Err(e) = inner.handle_frame(&data) {
                    break Some(format!("protocol error: {e}"));
                }
            }
            Some(Ok(Message::Text(text))) => {
                if let Err(e) = inner.handle_frame(text.as_bytes()) {
                    break Some(format!("protocol error: {e}"));
                }
            }
            Some(Ok(Message::Close(frame))) => {
                break Some(format!("server closed connection: {frame:?}"));
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => break Some(format!("receive error: {e}")),
            None => break Some("stream ended".to_owned()),
        }
    };

    match failure {
        Some(reason) => {
            tracing::warn!(reason = %reason, "receive loop failed");
            inner.finish(Some(generation), ConnectionState::Closed, &reason);
            // No-op unless a newer attempt already owns the slot.
            cancel.cancel();
        }
        None => {
            tracing::debug!("receive loop cancelled");
            inner.finish(Some(generation), ConnectionState::Idle, "cancelled");
        }
    }
}

/// Send an empty `Heartbeat` packet every interval until cancelled. Owns
/// the write half and closes it on exit.
async fn heartbeat_loop(
    inner: Arc<ConnectionInner>,
    mut sink: WsSink,
    cancel: CancellationToken,
    generation: u64,
) {
    let packet = encode(ClientOperation::Heartbeat, &[]);
    let mut ticker = tokio::time::interval(inner.heartbeat_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let failure = loop {
        tokio::select! {
            _ = cancel.cancelled() => break None,
            _ = ticker.tick() => {}
        }
        let sent = tokio::select! {
            _ = cancel.cancelled() => break None,
            r = sink.send(Message::Binary(packet.clone())) => r,
        };
        match sent {
            Ok(()) => tracing::trace!("socket heartbeat sent"),
            Err(e) => break Some(format!("heartbeat send failed: {e}")),
        }
    };

    let _ = sink.close().await;

    match failure {
        Some(reason) => {
            tracing::warn!(reason = %reason, "heartbeat loop failed");
            inner.finish(Some(generation), ConnectionState::Closed, &reason);
            // No-op unless a newer attempt already owns the slot.
            cancel.cancel();
        }
        None => {
            tracing::debug!("heartbeat loop cancelled");
            inner.finish(Some(generation), ConnectionState::Idle, "cancelled");
        }
    }
}

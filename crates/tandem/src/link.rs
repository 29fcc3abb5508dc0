//! The client's one connection to the session server.
//!
//! A [`Link`] owns the socket and two background tasks:
//!
//! ```text
//!            send()                       poll()
//!              │                            ▲
//!   outbound mpsc (frames)        inbound mpsc (LinkEvent)
//!              │                            │
//!              ▼                            │
//!        writer task ──→ Connection ──→ reader task
//! ```
//!
//! Only the `Link` itself changes [`ConnectionState`]; the tasks report a
//! dead socket by queueing [`LinkEvent::Closed`], which `poll` turns into
//! the `Disconnected` transition. Each connection gets fresh channels, so
//! events from a previous socket can never leak into the next one.

use std::sync::Arc;
use std::time::Duration;

use tandem_protocol::{Codec, JsonCodec, Message, Payload, PeerId};
use tandem_transport::{Connection, ConnectionState, Connector, WebSocketConnector};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::{NetError, ServerDescriptor};

/// How long `disconnect` waits for queued frames to flush.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Something that happened on the wire since the last [`Link::poll`].
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Message(Message),
    /// The socket closed. `reason` is `None` for a clean close.
    Closed { reason: Option<String> },
}

struct ActiveLink<T> {
    conn: Arc<T>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    inbound: mpsc::UnboundedReceiver<LinkEvent>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// A message link to the session server, generic over how it dials and
/// how frames are encoded.
pub struct Link<K: Connector = WebSocketConnector, C: Codec = JsonCodec> {
    connector: K,
    codec: Arc<C>,
    local: PeerId,
    connect_timeout: Duration,
    state: watch::Sender<ConnectionState>,
    active: Option<ActiveLink<K::Connection>>,
}

impl Link {
    /// A WebSocket + JSON link for `local`.
    pub fn websocket(local: PeerId) -> Self {
        Self::new(WebSocketConnector, JsonCodec, local)
    }
}

impl<K: Connector, C: Codec> Link<K, C> {
    pub fn new(connector: K, codec: C, local: PeerId) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            codec: Arc::new(codec),
            local,
            connect_timeout: Duration::from_secs(5),
            state,
            active: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Watch every state transition.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn local(&self) -> &PeerId {
        &self.local
    }

    fn set_state(&self, next: ConnectionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!(from = %prev, to = %next, "link state changed");
        }
    }

    /// Dial `server`. Connecting while already connected is a no-op.
    ///
    /// On failure the link is back in `Disconnected` and the error is
    /// returned; retrying is the heartbeat's job.
    pub async fn connect(&mut self, server: &ServerDescriptor) -> Result<(), NetError> {
        if self.is_connected() {
            return Ok(());
        }
        self.set_state(ConnectionState::Connecting);
        let addr = server.address();

        let dialed = tokio::time::timeout(self.connect_timeout, self.connector.connect(&addr)).await;
        let conn = match dialed {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(e.into());
            }
            Err(_) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(tandem_transport::TransportError::ConnectFailed {
                    addr,
                    source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
                }
                .into());
            }
        };

        let conn = Arc::new(conn);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();

        let reader = tokio::spawn(read_loop(
            Arc::clone(&conn),
            Arc::clone(&self.codec),
            inbound_tx.clone(),
        ));
        let writer = tokio::spawn(write_loop(Arc::clone(&conn), outbound_rx, inbound_tx));

        info!(server = %server.name, %addr, conn = %conn.id(), "connected");
        self.active = Some(ActiveLink {
            conn,
            outbound,
            inbound,
            reader,
            writer,
        });
        self.set_state(ConnectionState::Connected);
        Ok(())
    }

    /// Close the connection after flushing queued frames.
    pub async fn disconnect(&mut self) -> Result<(), NetError> {
        let Some(active) = self.active.take() else {
            return Err(NetError::NotConnected);
        };
        let ActiveLink {
            conn,
            outbound,
            reader,
            mut writer,
            ..
        } = active;

        reader.abort();
        // Closing the queue lets the writer drain and exit.
        drop(outbound);
        if tokio::time::timeout(FLUSH_TIMEOUT, &mut writer).await.is_err() {
            warn!(conn = %conn.id(), "writer did not flush in time");
            writer.abort();
        }
        if let Err(e) = conn.close().await {
            debug!(conn = %conn.id(), error = %e, "close failed");
        }

        self.set_state(ConnectionState::Disconnected);
        info!(conn = %conn.id(), "disconnected");
        Ok(())
    }

    /// Stamp, encode and queue a payload. Fails fast when not connected.
    pub fn send(&self, payload: Payload) -> Result<(), NetError> {
        let active = match &self.active {
            Some(active) if self.is_connected() => active,
            _ => return Err(NetError::NotConnected),
        };
        let msg = Message::new(payload).from_peer(self.local.clone());
        let frame = self.codec.encode(&msg)?;
        trace!(kind = %msg.kind(), bytes = frame.len(), "queueing frame");
        active
            .outbound
            .send(frame)
            .map_err(|_| NetError::NotConnected)
    }

    /// Drain everything received since the last call without blocking.
    ///
    /// A [`LinkEvent::Closed`] ends the batch and moves the link to
    /// `Disconnected`; messages that arrived before it are still returned.
    pub fn poll(&mut self) -> Vec<LinkEvent> {
        let mut events = Vec::new();
        let Some(active) = self.active.as_mut() else {
            return events;
        };

        let mut closed = false;
        while let Ok(event) = active.inbound.try_recv() {
            closed = matches!(event, LinkEvent::Closed { .. });
            events.push(event);
            if closed {
                break;
            }
        }

        if closed {
            if let Some(active) = self.active.take() {
                active.reader.abort();
                active.writer.abort();
                info!(conn = %active.conn.id(), "connection lost");
            }
            self.set_state(ConnectionState::Disconnected);
        }
        events
    }
}

impl<K: Connector, C: Codec> Drop for Link<K, C> {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.reader.abort();
            active.writer.abort();
        }
    }
}

async fn read_loop<T: Connection, C: Codec>(
    conn: Arc<T>,
    codec: Arc<C>,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    loop {
        match conn.recv().await {
            Ok(Some(frame)) => match codec.decode::<Message>(&frame) {
                Ok(msg) => {
                    if events.send(LinkEvent::Message(msg)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(conn = %conn.id(), error = %e, "dropping undecodable frame");
                }
            },
            Ok(None) => {
                debug!(conn = %conn.id(), "server closed the connection");
                let _ = events.send(LinkEvent::Closed { reason: None });
                break;
            }
            Err(e) => {
                warn!(conn = %conn.id(), error = %e, "read failed");
                let _ = events.send(LinkEvent::Closed {
                    reason: Some(e.to_string()),
                });
                break;
            }
        }
    }
}

async fn write_loop<T: Connection>(
    conn: Arc<T>,
    mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    while let Some(frame) = frames.recv().await {
        if let Err(e) = conn.send(&frame).await {
            warn!(conn = %conn.id(), error = %e, "write failed");
            let _ = events.send(LinkEvent::Closed {
                reason: Some(e.to_string()),
            });
            break;
        }
    }
}

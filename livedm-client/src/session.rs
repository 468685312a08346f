//! Live-room session: one WebSocket, its heartbeat, and its reconnect timer.

use crate::config::{SessionConfig, MIN_HEARTBEAT_INTERVAL};
use crate::error::SessionError;
use crate::lifecycle::{ConnectionState, Lifecycle};
use crate::subscription::{HandlerError, HandlerSlot, Subscription};
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use livedm_protocol::{auth_reply_code, decode, DecodedPacket, Encoder, Operation};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// How a single connection ended.
#[derive(Debug)]
enum ConnectionEnd {
    /// Shutdown was requested by `disconnect` or a new `connect`.
    Manual,
    /// The server closed the socket.
    Closed,
    /// Opening, reading or writing failed.
    Failed(SessionError),
}

/// State shared between the session handle and its driver task.
struct Shared {
    config: SessionConfig,
    lifecycle: Mutex<Lifecycle>,
    state_tx: watch::Sender<ConnectionState>,
    handler: HandlerSlot<DecodedPacket>,
}

/// A running driver task.
struct Driver {
    shutdown: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl Driver {
    async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.handle.await {
            tracing::warn!("Session driver ended abnormally: {}", e);
        }
    }
}

/// A connection to one live room.
///
/// The session owns its socket and timers exclusively; all outbound frames
/// are written by its driver task.
pub struct Session {
    shared: Arc<Shared>,
    driver: tokio::sync::Mutex<Option<Driver>>,
}

/// Settles the session as `Idle` if its driver future is dropped before
/// finishing, which happens when the driver panics or is aborted.
struct DriverGuard {
    shared: Arc<Shared>,
    finished: bool,
}

impl Drop for DriverGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        tracing::error!(
            "Session driver for room {} exited abnormally",
            self.shared.config.room_id
        );
        self.shared.transition(|l| l.abandon());
    }
}

impl Session {
    /// Creates a new session (not yet connected).
    pub fn new(mut config: SessionConfig) -> Self {
        if config.heartbeat_interval < MIN_HEARTBEAT_INTERVAL {
            tracing::warn!(
                "Heartbeat interval {:?} too short, using {:?}",
                config.heartbeat_interval,
                MIN_HEARTBEAT_INTERVAL
            );
            config.heartbeat_interval = MIN_HEARTBEAT_INTERVAL;
        }
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        let lifecycle = Lifecycle::new(config.reconnect);
        Self {
            shared: Arc::new(Shared {
                config,
                lifecycle: Mutex::new(lifecycle),
                state_tx,
                handler: HandlerSlot::new(),
            }),
            driver: tokio::sync::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Registers the handler that receives every non-empty decoded packet.
    ///
    /// Replaces any previously registered handler. The handler runs on the
    /// driver task and must not block.
    pub fn on_message<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&DecodedPacket) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.shared.handler.register(handler)
    }

    /// Returns the current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    /// Returns a receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Returns the number of consecutive failed attempts (capped).
    pub fn retry_count(&self) -> u32 {
        self.shared.lifecycle.lock().retry_count()
    }

    /// Connects to the room, tearing down any existing connection first.
    ///
    /// Returns once the driver task is started; connection failures are
    /// handled by the reconnect policy and observable through
    /// [`Session::watch_state`].
    pub async fn connect(&self, auto_reconnect: bool) {
        let mut driver = self.driver.lock().await;

        if let Some(existing) = driver.take() {
            tracing::debug!("Tearing down existing connection before reconnecting");
            self.shared.transition(|l| l.begin_disconnect());
            existing.stop().await;
        }

        self.shared.transition(|l| l.begin(auto_reconnect));

        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let shared = self.shared.clone();
        let handle = tokio::spawn(async move {
            let mut guard = DriverGuard {
                shared: shared.clone(),
                finished: false,
            };
            shared.run(shutdown_rx).await;
            guard.finished = true;
        });

        *driver = Some(Driver { shutdown, handle });
    }

    /// Closes the connection and cancels any pending reconnect.
    ///
    /// Calling this with no running connection is a no-op.
    pub async fn disconnect(&self) {
        let mut driver = self.driver.lock().await;
        let Some(existing) = driver.take() else {
            return;
        };

        tracing::info!("Disconnecting from room {}", self.shared.config.room_id);
        self.shared.transition(|l| l.begin_disconnect());
        existing.stop().await;
        self.shared.transition(|l| l.finish_disconnect());
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.get_mut().take() {
            driver.handle.abort();
        }
    }
}

impl Shared {
    /// Applies a lifecycle transition and publishes the resulting state.
    fn transition<R>(&self, f: impl FnOnce(&mut Lifecycle) -> R) -> R {
        let (result, state) = {
            let mut lifecycle = self.lifecycle.lock();
            let result = f(&mut lifecycle);
            (result, lifecycle.state())
        };
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            tracing::debug!("Session state {} -> {}", current, state);
            *current = state;
            true
        });
        result
    }

    /// Driver loop: connect, run, and reconnect until told to stop.
    async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let room_id = self.config.room_id;

        loop {
            match self.run_connection(&mut shutdown).await {
                ConnectionEnd::Manual => break,
                ConnectionEnd::Closed => tracing::info!("Room {} connection closed", room_id),
                ConnectionEnd::Failed(e) if !e.is_retryable() => {
                    tracing::error!("Room {} connection failed, not retrying: {}", room_id, e);
                    self.transition(|l| l.abandon());
                    break;
                }
                ConnectionEnd::Failed(e) => {
                    tracing::warn!("Room {} connection failed: {}", room_id, e)
                }
            }

            let Some(delay) = self.transition(|l| l.on_close()) else {
                break;
            };

            tracing::info!(
                "Reconnecting to room {} in {}ms (attempt {}, backoff capped at {}ms)",
                room_id,
                delay.as_millis(),
                self.lifecycle.lock().retry_count(),
                self.config.reconnect.max_delay().as_millis()
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.recv() => break,
            }

            if !self.transition(|l| l.reconnect_due()) {
                break;
            }
        }

        tracing::debug!("Session driver for room {} stopped", room_id);
    }

    /// Opens one WebSocket and serves it until it closes.
    async fn run_connection(&self, shutdown: &mut broadcast::Receiver<()>) -> ConnectionEnd {
        let url = self.config.server_url.as_str();
        tracing::debug!("Connecting to {}...", url);

        let connect = tokio::time::timeout(self.config.connect_timeout, connect_async(url));
        let ws = tokio::select! {
            result = connect => match result {
                Ok(Ok((ws, _))) => ws,
                Ok(Err(e)) => return ConnectionEnd::Failed(SessionError::WebSocket(e)),
                Err(_) => return ConnectionEnd::Failed(SessionError::Timeout),
            },
            _ = shutdown.recv() => return ConnectionEnd::Manual,
        };

        self.transition(|l| l.on_open());
        tracing::info!("Connected to {} (room {})", url, self.config.room_id);

        let (mut sink, mut stream) = ws.split();

        if let Err(e) = self.send_handshake(&mut sink).await {
            return ConnectionEnd::Failed(e);
        }
        self.transition(|l| l.on_authenticated());

        let period = self.config.heartbeat_interval;
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                message = stream.next() => match message {
                    Some(Ok(Message::Binary(data))) => self.handle_frame(&data),
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Ignoring text message ({} bytes)", text.len());
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!("Close frame received: {:?}", frame);
                        return ConnectionEnd::Closed;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return ConnectionEnd::Failed(SessionError::WebSocket(e)),
                    None => return ConnectionEnd::Failed(SessionError::ConnectionClosed),
                },

                _ = heartbeat.tick() => {
                    if let Err(e) = sink.send(Message::binary(Encoder::heartbeat().freeze())).await {
                        return ConnectionEnd::Failed(SessionError::WebSocket(e));
                    }
                    tracing::debug!("Heartbeat sent");
                }

                _ = shutdown.recv() => {
                    close_gracefully(&mut sink).await;
                    return ConnectionEnd::Manual;
                }
            }
        }
    }

    /// Sends the auth frame followed by the first heartbeat.
    async fn send_handshake(&self, sink: &mut WsSink) -> Result<(), SessionError> {
        let auth = Encoder::auth(&self.config.auth_params())?;
        tracing::debug!("Sending auth ({} bytes)", auth.len());
        sink.send(Message::binary(auth.freeze())).await?;
        sink.send(Message::binary(Encoder::heartbeat().freeze())).await?;
        Ok(())
    }

    /// Decodes one binary message and hands it to the handler.
    fn handle_frame(&self, data: &[u8]) {
        let packet = match decode(data) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::warn!("Dropping malformed frame ({} bytes): {}", data.len(), e);
                return;
            }
        };

        if packet.op() == Some(Operation::AuthReply) {
            // No timeout is applied to a rejected auth; the server's
            // behavior after a non-zero code is unknown.
            match auth_reply_code(data) {
                Some(0) | None => tracing::debug!("Auth acknowledged"),
                Some(code) => tracing::warn!("Auth reply carried code {}", code),
            }
        }

        if packet.is_empty() {
            return;
        }

        tracing::debug!(
            "Dispatching packet op={} with {} message(s)",
            packet.operation,
            packet.messages.len()
        );
        if !self.handler.dispatch(&packet) {
            tracing::debug!("No handler registered, packet dropped");
        }
    }
}

async fn close_gracefully(sink: &mut WsSink) {
    let close = tokio::time::timeout(Duration::from_secs(1), async {
        let _ = sink.send(Message::Close(None)).await;
        let _ = sink.close().await;
    });
    if close.await.is_err() {
        tracing::debug!("Timed out sending close frame");
    }
}

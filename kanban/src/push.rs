//! WebSocket push channel carrying edit-lock events.
//!
//! [`PushClient`] owns one WebSocket connection: JSON text frames are decoded
//! into [`PushEvent`]s by a background reader task and delivered through
//! [`PushClient::recv`] together with connection lifecycle signals.
//!
//! [`spawn_lock_sync`] keeps an [`EditLockChannel`] in step with the server:
//! inbound lock events are applied as they arrive, the local user's
//! `start_edit`/`stop_edit` go out through a [`LockHandle`], renewals fire on
//! a timer, and a dropped connection clears the lock map and is retried with
//! backoff.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use kanban_proto::board::UserId;
use kanban_proto::push::{self, CodecError, EntityKey, PushEvent};

use crate::locks::{EditLockChannel, LockError};

type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Upper bound for the reconnect backoff.
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Errors from the push channel.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// The connection attempt did not finish in time.
    #[error("push connect timed out")]
    Timeout,

    /// The server could not be reached or refused the upgrade.
    #[error("push connect failed: {0}")]
    Connect(String),

    /// The connection is closed.
    #[error("push connection closed")]
    Closed,

    /// A frame could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Settings for [`PushClient::connect`] and [`spawn_lock_sync`].
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// `ws://` or `wss://` endpoint.
    pub url: String,
    /// Bearer token sent with the upgrade request.
    pub token: Option<String>,
    /// Limit for the WebSocket handshake.
    pub connect_timeout: Duration,
    /// Capacity of the inbound and outbound queues.
    pub channel_capacity: usize,
    /// First retry delay after a lost connection; doubles up to 30 s.
    pub reconnect_delay: Duration,
}

impl PushConfig {
    /// Settings for `url` with default timing.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            connect_timeout: Duration::from_secs(10),
            channel_capacity: 256,
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

/// What [`PushClient::recv`] yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushMessage {
    /// The connection is up. Always the first message.
    Connected,
    /// The connection went away. No further events follow.
    Disconnected {
        /// Close reason or read error.
        reason: String,
    },
    /// A decoded event.
    Event(PushEvent),
}

/// One WebSocket connection to the push server.
pub struct PushClient {
    url: String,
    ws_sender: Mutex<WsSender>,
    incoming: Mutex<mpsc::Receiver<PushMessage>>,
    connected: Arc<AtomicBool>,
    _reader_handle: tokio::task::JoinHandle<()>,
}

impl PushClient {
    /// Opens the WebSocket and starts the reader task.
    ///
    /// # Errors
    ///
    /// - [`PushError::Timeout`] if the handshake exceeds `connect_timeout`
    /// - [`PushError::Connect`] for refused connections, bad URLs or a
    ///   rejected upgrade
    pub async fn connect(config: &PushConfig) -> Result<Self, PushError> {
        let mut request = config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| PushError::Connect(e.to_string()))?;
        if let Some(token) = &config.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| PushError::Connect(format!("invalid token header: {e}")))?;
            request.headers_mut().insert("authorization", value);
        }

        let (ws_stream, _response) = tokio::time::timeout(config.connect_timeout, connect_async(request))
            .await
            .map_err(|_| {
                tracing::warn!(url = %config.url, "push connect timed out");
                PushError::Timeout
            })?
            .map_err(|e| {
                tracing::warn!(url = %config.url, err = %e, "push connect failed");
                map_ws_connect_error(e)
            })?;

        let (ws_sender, ws_reader) = ws_stream.split();
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        tx.send(PushMessage::Connected)
            .await
            .map_err(|_| PushError::Closed)?;

        let connected = Arc::new(AtomicBool::new(true));
        let reader_handle = tokio::spawn(reader_loop(ws_reader, tx, Arc::clone(&connected)));
        tracing::info!(url = %config.url, "push channel connected");

        Ok(Self {
            url: config.url.clone(),
            ws_sender: Mutex::new(ws_sender),
            incoming: Mutex::new(rx),
            connected,
            _reader_handle: reader_handle,
        })
    }

    /// The endpoint this client is connected to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the reader task still sees an open connection.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Sends one event as a JSON text frame.
    ///
    /// # Errors
    ///
    /// [`PushError::Closed`] if the connection is down, [`PushError::Codec`]
    /// if the event cannot be encoded.
    pub async fn send(&self, event: &PushEvent) -> Result<(), PushError> {
        if !self.is_connected() {
            return Err(PushError::Closed);
        }
        let text = push::encode(event)?;
        let mut sender = self.ws_sender.lock().await;
        sender.send(Message::Text(text.into())).await.map_err(|e| {
            tracing::warn!(err = %e, event = event.name(), "push send failed");
            self.connected.store(false, Ordering::Relaxed);
            PushError::Closed
        })
    }

    /// Next message from the server. `None` once the connection is gone and
    /// everything before the disconnect has been delivered.
    pub async fn recv(&self) -> Option<PushMessage> {
        self.incoming.lock().await.recv().await
    }

    /// Sends a close frame.
    pub async fn close(&self) {
        let mut sender = self.ws_sender.lock().await;
        if let Err(e) = sender.close().await {
            tracing::debug!(err = %e, "push close failed");
        }
        self.connected.store(false, Ordering::Relaxed);
    }
}

/// Decodes text frames into events until the socket closes. Malformed frames
/// are logged and skipped.
async fn reader_loop(mut ws_reader: WsReader, tx: mpsc::Sender<PushMessage>, connected: Arc<AtomicBool>) {
    let reason = loop {
        let Some(frame) = ws_reader.next().await else {
            break "stream ended".to_string();
        };
        match frame {
            Ok(Message::Text(text)) => match push::decode(text.as_str()) {
                Ok(event) => {
                    if tx.send(PushMessage::Event(event)).await.is_err() {
                        // Client dropped.
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(err = %e, "malformed push frame, skipping");
                }
            },
            Ok(Message::Close(frame)) => {
                break frame.map_or_else(
                    || "closed by server".to_string(),
                    |f| format!("closed by server: {}", f.reason.as_str()),
                );
            }
            Ok(Message::Binary(_)) => {
                tracing::debug!("ignoring binary push frame");
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
            Err(e) => {
                tracing::warn!(err = %e, "push read error");
                break e.to_string();
            }
        }
    };
    connected.store(false, Ordering::Relaxed);
    tracing::info!(%reason, "push channel disconnected");
    if tx.send(PushMessage::Disconnected { reason }).await.is_err() {
        tracing::debug!("push client dropped before disconnect was delivered");
    }
}

fn map_ws_connect_error(err: tokio_tungstenite::tungstenite::Error) -> PushError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Http(response) => {
            PushError::Connect(format!("upgrade rejected: status {}", response.status()))
        }
        WsError::Url(e) => PushError::Connect(format!("bad push url: {e}")),
        other => PushError::Connect(other.to_string()),
    }
}

/// Handle the front end uses to announce local edits.
#[derive(Clone)]
pub struct LockHandle {
    locks: Arc<parking_lot::Mutex<EditLockChannel>>,
    outbound: mpsc::Sender<PushEvent>,
    connected: watch::Receiver<bool>,
}

impl LockHandle {
    /// Whether the sync task currently has a live push connection.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Waits up to `timeout` for the push connection, then `settle` longer
    /// so live remote editors get one renewal period to announce their
    /// locks. Returns `false` if the connection is not up at the end.
    pub async fn wait_synced(&self, timeout: Duration, settle: Duration) -> bool {
        let mut connected = self.connected.clone();
        let up = tokio::time::timeout(timeout, connected.wait_for(|up| *up))
            .await
            .is_ok_and(|waited| waited.is_ok());
        if !up {
            return false;
        }
        tokio::time::sleep(settle).await;
        self.is_connected()
    }

    /// Checks the lock map and, if `key` is free, announces the edit.
    ///
    /// The editor may open as soon as this returns `Ok`; the announcement
    /// is queued, not acknowledged. Call [`LockHandle::wait_synced`] first
    /// on a fresh handle, otherwise the map is still empty.
    ///
    /// # Errors
    ///
    /// [`LockError::Held`] if someone holds a live lock on `key`.
    pub async fn begin_edit(&self, key: EntityKey) -> Result<(), LockError> {
        let event = self.locks.lock().begin_edit(key, Instant::now())?;
        self.enqueue(event).await;
        Ok(())
    }

    /// Announces that the local editor for `key` closed.
    pub async fn end_edit(&self, key: &EntityKey) {
        let event = self.locks.lock().end_edit(key);
        self.enqueue(event).await;
    }

    /// Holder of a live lock on `key`.
    #[must_use]
    pub fn holder(&self, key: &EntityKey) -> Option<UserId> {
        self.locks.lock().holder(key, Instant::now()).cloned()
    }

    /// The shared lock map.
    #[must_use]
    pub const fn locks(&self) -> &Arc<parking_lot::Mutex<EditLockChannel>> {
        &self.locks
    }

    async fn enqueue(&self, event: PushEvent) {
        if self.outbound.send(event).await.is_err() {
            tracing::warn!("lock sync task stopped, edit announcement dropped");
        }
    }
}

/// Starts the task that keeps `locks` in sync with the push server.
///
/// The task runs until every [`LockHandle`] clone is dropped.
pub fn spawn_lock_sync(
    config: PushConfig,
    locks: Arc<parking_lot::Mutex<EditLockChannel>>,
) -> (LockHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let (connected_tx, connected_rx) = watch::channel(false);
    let handle = LockHandle {
        locks: Arc::clone(&locks),
        outbound: tx,
        connected: connected_rx,
    };
    let task = tokio::spawn(run_lock_sync(config, locks, rx, connected_tx));
    (handle, task)
}

enum SessionEnd {
    Disconnected,
    HandlesDropped,
}

async fn run_lock_sync(
    config: PushConfig,
    locks: Arc<parking_lot::Mutex<EditLockChannel>>,
    mut outbound: mpsc::Receiver<PushEvent>,
    connected: watch::Sender<bool>,
) {
    let mut delay = config.reconnect_delay;
    loop {
        match PushClient::connect(&config).await {
            Ok(client) => {
                delay = config.reconnect_delay;
                if let SessionEnd::HandlesDropped = serve(&client, &locks, &mut outbound, &connected).await {
                    client.close().await;
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(err = %e, retry_in = ?delay, "push connect_error");
            }
        }

        let pause = tokio::time::sleep(delay);
        tokio::pin!(pause);
        loop {
            tokio::select! {
                () = &mut pause => break,
                event = outbound.recv() => match event {
                    Some(event) => {
                        tracing::debug!(event = event.name(), "offline, edit announcement dropped");
                    }
                    None => return,
                },
            }
        }
        delay = (delay * 2).min(MAX_RECONNECT_DELAY);
    }
}

async fn serve(
    client: &PushClient,
    locks: &parking_lot::Mutex<EditLockChannel>,
    outbound: &mut mpsc::Receiver<PushEvent>,
    connected: &watch::Sender<bool>,
) -> SessionEnd {
    let renew_interval = locks.lock().config().renew_interval;
    let mut ticker = tokio::time::interval(renew_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            message = client.recv() => match message {
                Some(PushMessage::Connected) => {
                    let announcements = locks.lock().on_reconnect(Instant::now());
                    send_all(client, announcements).await;
                    connected.send_replace(true);
                }
                Some(PushMessage::Event(event)) => {
                    tracing::info!(event = event.name(), "push event");
                    locks.lock().apply(&event, Instant::now());
                }
                Some(PushMessage::Disconnected { reason }) => {
                    tracing::debug!(%reason, "clearing locks after disconnect");
                    locks.lock().on_disconnect();
                    connected.send_replace(false);
                    return SessionEnd::Disconnected;
                }
                None => {
                    locks.lock().on_disconnect();
                    connected.send_replace(false);
                    return SessionEnd::Disconnected;
                }
            },
            event = outbound.recv() => match event {
                Some(event) => send_all(client, vec![event]).await,
                None => return SessionEnd::HandlesDropped,
            },
            _ = ticker.tick() => {
                let now = Instant::now();
                let renewals = {
                    let mut locks = locks.lock();
                    locks.prune_expired(now);
                    locks.renewals_due(now)
                };
                send_all(client, renewals).await;
            }
        }
    }
}

async fn send_all(client: &PushClient, events: Vec<PushEvent>) {
    for event in events {
        if let Err(e) = client.send(&event).await {
            tracing::debug!(err = %e, event = event.name(), "push event not sent");
        }
    }
}

// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::missing_panics_doc,
    clippy::future_not_send,
    clippy::significant_drop_tightening
)]

//! Integration tests for edit-lock propagation over the push channel.
//!
//! Runs `spawn_lock_sync` against an in-process WebSocket server built on
//! `tokio-tungstenite`. The server side of every accepted connection is
//! handed to the test, which can push frames, read what the client sent, and
//! close the socket to simulate a dropped connection.
//!
//! These tests validate:
//! - `item_locked` / `item_unlocked` reach the shared lock map
//! - A held lock refuses a local edit; a free one announces `start_edit`
//! - `wait_synced` reports the connection and lets early locks arrive
//! - Malformed frames are skipped without dropping the connection
//! - A server close clears the lock map and the reconnect re-announces
//!   open editors
//! - Open editors are renewed on a timer
//! - Dropping every handle stops the sync task

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

use kanban::locks::{EditLockChannel, LockConfig, LockError};
use kanban::push::{LockHandle, PushClient, PushConfig, PushMessage, spawn_lock_sync};
use kanban_proto::board::{EntityKind, UserId};
use kanban_proto::push::{self, EntityKey, LockNotice, PushEvent, UnlockNotice};

const WAIT: Duration = Duration::from_secs(3);

// =============================================================================
// In-process push server
// =============================================================================

enum ServerCmd {
    Event(PushEvent),
    Raw(String),
    Close,
}

/// Server side of one accepted WebSocket connection.
struct Conn {
    /// `Authorization` header of the upgrade request.
    auth: Option<String>,
    inbound: mpsc::Receiver<PushEvent>,
    commands: mpsc::Sender<ServerCmd>,
}

impl Conn {
    async fn push(&self, event: PushEvent) {
        self.commands.send(ServerCmd::Event(event)).await.unwrap();
    }

    async fn push_raw(&self, text: &str) {
        self.commands
            .send(ServerCmd::Raw(text.to_string()))
            .await
            .unwrap();
    }

    async fn close(&self) {
        self.commands.send(ServerCmd::Close).await.unwrap();
    }

    /// Next event the client sent.
    async fn next_event(&mut self) -> PushEvent {
        tokio::time::timeout(WAIT, self.inbound.recv())
            .await
            .expect("timed out waiting for client event")
            .expect("connection closed")
    }
}

struct PushServer {
    url: String,
    connections: mpsc::Receiver<Conn>,
}

impl PushServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (conn_tx, conn_rx) = mpsc::channel(8);

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let mut auth = None;
                let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    auth = req
                        .headers()
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    Ok(resp)
                };
                let Ok(ws) = accept_hdr_async(stream, callback).await else {
                    continue;
                };

                let (in_tx, in_rx) = mpsc::channel(32);
                let (cmd_tx, cmd_rx) = mpsc::channel(32);
                tokio::spawn(serve_connection(ws, in_tx, cmd_rx));
                let conn = Conn {
                    auth,
                    inbound: in_rx,
                    commands: cmd_tx,
                };
                if conn_tx.send(conn).await.is_err() {
                    return;
                }
            }
        });

        Self {
            url: format!("ws://{addr}/ws"),
            connections: conn_rx,
        }
    }

    async fn accept(&mut self) -> Conn {
        tokio::time::timeout(WAIT, self.connections.recv())
            .await
            .expect("timed out waiting for a client connection")
            .expect("server stopped")
    }
}

async fn serve_connection(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    inbound: mpsc::Sender<PushEvent>,
    mut commands: mpsc::Receiver<ServerCmd>,
) {
    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(event) = push::decode(text.as_str()) {
                        let _ = inbound.send(event).await;
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => return,
            },
            command = commands.recv() => match command {
                Some(ServerCmd::Event(event)) => {
                    let text = push::encode(&event).unwrap();
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        return;
                    }
                }
                Some(ServerCmd::Raw(text)) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        return;
                    }
                }
                Some(ServerCmd::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    return;
                }
            },
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn push_config(url: &str) -> PushConfig {
    let mut config = PushConfig::new(url);
    config.token = Some("tok".to_string());
    config.connect_timeout = Duration::from_secs(2);
    config.reconnect_delay = Duration::from_millis(50);
    config
}

fn start_sync(url: &str, lock_config: LockConfig) -> (LockHandle, tokio::task::JoinHandle<()>) {
    let locks = Arc::new(parking_lot::Mutex::new(EditLockChannel::new(
        UserId::from("u1"),
        lock_config,
    )));
    spawn_lock_sync(push_config(url), locks)
}

fn locked(key: &EntityKey, user: &str) -> PushEvent {
    PushEvent::ItemLocked(LockNotice::new(key, UserId::from(user)))
}

fn unlocked(key: &EntityKey) -> PushEvent {
    PushEvent::ItemUnlocked(UnlockNotice {
        id: key.id.clone(),
        kind: key.kind,
    })
}

/// Polls `check` until it holds or the wait budget runs out.
async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn remote_lock_blocks_local_edit_until_released() {
    let mut server = PushServer::start().await;
    let (handle, _task) = start_sync(&server.url, LockConfig::default());
    let mut conn = server.accept().await;
    assert_eq!(conn.auth.as_deref(), Some("Bearer tok"));

    let key = EntityKey::task("t1");
    conn.push(locked(&key, "u2")).await;
    eventually("item_locked", || handle.holder(&key) == Some(UserId::from("u2"))).await;

    assert_eq!(
        handle.begin_edit(key.clone()).await,
        Err(LockError::Held {
            key: key.clone(),
            holder: UserId::from("u2"),
        })
    );

    conn.push(unlocked(&key)).await;
    eventually("item_unlocked", || handle.holder(&key).is_none()).await;

    handle.begin_edit(key.clone()).await.unwrap();
    assert_eq!(
        conn.next_event().await,
        PushEvent::StartEdit(LockNotice::new(&key, UserId::from("u1")))
    );
}

#[tokio::test]
async fn synced_handle_refuses_edit_locked_before_it_connected() {
    let mut server = PushServer::start().await;
    let (handle, _task) = start_sync(&server.url, LockConfig::default());
    let conn = server.accept().await;

    let key = EntityKey::task("t1");
    conn.push(locked(&key, "u2")).await;

    assert!(handle.wait_synced(WAIT, Duration::from_millis(200)).await);
    assert!(handle.is_connected());
    assert!(matches!(
        handle.begin_edit(key.clone()).await,
        Err(LockError::Held { .. })
    ));
}

#[tokio::test]
async fn wait_synced_gives_up_without_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (handle, _task) = start_sync(&format!("ws://{addr}/ws"), LockConfig::default());
    let started = Instant::now();
    assert!(!handle.wait_synced(Duration::from_millis(300), Duration::ZERO).await);
    assert!(started.elapsed() < WAIT);
    assert!(!handle.is_connected());
}

#[tokio::test]
async fn local_editor_announces_start_and_stop() {
    let mut server = PushServer::start().await;
    let (handle, _task) = start_sync(&server.url, LockConfig::default());
    let mut conn = server.accept().await;

    let key = EntityKey::column("c1");
    handle.begin_edit(key.clone()).await.unwrap();
    handle.end_edit(&key).await;

    let start = conn.next_event().await;
    let stop = conn.next_event().await;
    assert_eq!(start.name(), "start_edit");
    assert_eq!(stop, PushEvent::StopEdit(LockNotice::new(&key, UserId::from("u1"))));
    let PushEvent::StartEdit(notice) = start else {
        panic!("expected start_edit");
    };
    assert_eq!(notice.kind, EntityKind::Column);
    assert_eq!(notice.id, "c1");
}

#[tokio::test]
async fn unrelated_lock_events_do_not_resurrect_released_lock() {
    let mut server = PushServer::start().await;
    let (handle, _task) = start_sync(&server.url, LockConfig::default());
    let conn = server.accept().await;

    let t1 = EntityKey::task("t1");
    let t2 = EntityKey::task("t2");
    let c1 = EntityKey::column("c1");
    conn.push(locked(&t1, "u2")).await;
    conn.push(locked(&t2, "u3")).await;
    conn.push(locked(&c1, "u2")).await;
    conn.push(unlocked(&c1)).await;
    conn.push(unlocked(&t1)).await;

    eventually("t1 released", || {
        handle.holder(&t1).is_none() && handle.holder(&c1).is_none()
    })
    .await;
    assert_eq!(handle.holder(&t2), Some(UserId::from("u3")));
    assert_eq!(handle.locks().lock().len(), 1);
}

#[tokio::test]
async fn malformed_frames_are_skipped() {
    let mut server = PushServer::start().await;
    let (handle, _task) = start_sync(&server.url, LockConfig::default());
    let conn = server.accept().await;

    conn.push_raw("not json").await;
    conn.push_raw(r#"{"event":"board_deleted","data":{"id":"b1"}}"#)
        .await;
    conn.push_raw(r#"{"event":"item_locked","data":{"id":"t1","type":"board","userId":"u2"}}"#)
        .await;
    let key = EntityKey::task("t1");
    conn.push(locked(&key, "u2")).await;

    eventually("valid frame after garbage", || handle.holder(&key).is_some()).await;
    assert_eq!(handle.locks().lock().len(), 1);
}

#[tokio::test]
async fn server_close_clears_locks_and_reconnect_reannounces() {
    let mut server = PushServer::start().await;
    let (handle, _task) = start_sync(&server.url, LockConfig::default());
    let mut first = server.accept().await;

    let mine = EntityKey::task("t9");
    handle.begin_edit(mine.clone()).await.unwrap();
    assert_eq!(first.next_event().await.name(), "start_edit");

    let theirs = EntityKey::task("t1");
    first.push(locked(&theirs, "u2")).await;
    eventually("remote lock", || handle.holder(&theirs).is_some()).await;

    first.close().await;
    eventually("lock map cleared", || handle.locks().lock().is_empty()).await;
    assert!(handle.locks().lock().editing().any(|k| k == &mine));

    let mut second = server.accept().await;
    assert_eq!(
        second.next_event().await,
        PushEvent::StartEdit(LockNotice::new(&mine, UserId::from("u1")))
    );
}

#[tokio::test]
async fn open_editor_is_renewed() {
    let mut server = PushServer::start().await;
    let lock_config = LockConfig {
        lease: Duration::from_millis(600),
        renew_interval: Duration::from_millis(50),
    };
    let (handle, _task) = start_sync(&server.url, lock_config);
    let mut conn = server.accept().await;

    let key = EntityKey::task("t1");
    handle.begin_edit(key.clone()).await.unwrap();
    let expected = PushEvent::StartEdit(LockNotice::new(&key, UserId::from("u1")));
    assert_eq!(conn.next_event().await, expected);
    assert_eq!(conn.next_event().await, expected);

    handle.end_edit(&key).await;
    loop {
        if conn.next_event().await.name() == "stop_edit" {
            break;
        }
    }
}

#[tokio::test]
async fn remote_lease_expires_without_renewal() {
    let mut server = PushServer::start().await;
    let lock_config = LockConfig {
        lease: Duration::from_millis(300),
        renew_interval: Duration::from_millis(20),
    };
    let (handle, _task) = start_sync(&server.url, lock_config);
    let conn = server.accept().await;

    let key = EntityKey::task("t1");
    conn.push(locked(&key, "u2")).await;
    eventually("remote lock", || handle.holder(&key).is_some()).await;

    eventually("lease expiry", || handle.holder(&key).is_none()).await;
    eventually("expired lease pruned", || handle.locks().lock().is_empty()).await;
    handle.begin_edit(key).await.unwrap();
}

#[tokio::test]
async fn dropping_handles_stops_sync_task() {
    let mut server = PushServer::start().await;
    let (handle, task) = start_sync(&server.url, LockConfig::default());
    let mut conn = server.accept().await;

    drop(handle);
    tokio::time::timeout(WAIT, task)
        .await
        .expect("sync task did not stop")
        .unwrap();

    // The server sees the socket go away.
    let closed = tokio::time::timeout(WAIT, conn.inbound.recv()).await.unwrap();
    assert!(closed.is_none());
}

#[tokio::test]
async fn push_client_reports_lifecycle() {
    let mut server = PushServer::start().await;
    let client = PushClient::connect(&push_config(&server.url)).await.unwrap();
    let conn = server.accept().await;

    assert_eq!(client.recv().await, Some(PushMessage::Connected));
    assert!(client.is_connected());

    let key = EntityKey::column("c1");
    conn.push(locked(&key, "u2")).await;
    assert_eq!(client.recv().await, Some(PushMessage::Event(locked(&key, "u2"))));

    conn.close().await;
    match tokio::time::timeout(WAIT, client.recv()).await.unwrap() {
        Some(PushMessage::Disconnected { reason }) => assert!(reason.contains("closed")),
        other => panic!("expected Disconnected, got {other:?}"),
    }
    assert!(!client.is_connected());
}

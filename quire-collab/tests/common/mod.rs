//! Shared helpers: start a real server on ephemeral ports and connect
//! real clients to it.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use quire_collab::client::{ConnectionState, SyncClient, SyncEvent};
use quire_collab::config::ServerConfig;
use quire_collab::protocol::UserIdentity;
use quire_collab::server::SyncServer;
use quire_collab::storage::{MemoryStore, SharedStore};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

pub const SECRET: &str = "integration-secret";

pub struct TestServer {
    pub server: Arc<SyncServer>,
    pub ws_url: String,
    pub http_addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub fn token(&self, id: &str, name: &str) -> String {
        self.server
            .authenticator()
            .issue(&UserIdentity::new(id, name))
            .unwrap()
    }

    pub fn store(&self) -> &SharedStore {
        self.server.store()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        jwt_secret: SECRET.into(),
        checkpoint_interval: None,
        ..ServerConfig::default()
    }
}

pub async fn start_server() -> TestServer {
    start_server_with(test_config(), Arc::new(MemoryStore::new())).await
}

/// Start a server on free ports over `store`.
pub async fn start_server_with(config: ServerConfig, store: SharedStore) -> TestServer {
    let realtime = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let rest = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_url = format!("ws://{}", realtime.local_addr().unwrap());
    let http_addr = rest.local_addr().unwrap();

    let server = Arc::new(SyncServer::new(config, store).unwrap());
    let serving = server.clone();
    let handle = tokio::spawn(async move {
        if let Err(e) = serving.serve(realtime, rest).await {
            panic!("server stopped: {e}");
        }
    });

    TestServer {
        server,
        ws_url,
        http_addr,
        handle,
    }
}

/// Connect an authenticated client with autosave off.
pub async fn connect(
    server: &TestServer,
    id: &str,
    name: &str,
) -> (SyncClient, mpsc::Receiver<SyncEvent>) {
    let mut client =
        SyncClient::new(server.ws_url.clone(), server.token(id, name)).with_autosave(None);
    let mut events = client.take_event_rx().unwrap();
    client.connect().await.unwrap();
    assert_eq!(next_event(&mut events).await, SyncEvent::Connected);
    assert_eq!(client.connection_state().await, ConnectionState::Connected);
    (client, events)
}

pub async fn next_event(events: &mut mpsc::Receiver<SyncEvent>) -> SyncEvent {
    timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Skip events until one matches.
pub async fn wait_for(
    events: &mut mpsc::Receiver<SyncEvent>,
    mut matches: impl FnMut(&SyncEvent) -> bool,
) -> SyncEvent {
    loop {
        let event = next_event(events).await;
        if matches(&event) {
            return event;
        }
    }
}

/// Join and consume the `DocumentLoaded` + `UsersInRoom` pair.
pub async fn join(
    client: &SyncClient,
    events: &mut mpsc::Receiver<SyncEvent>,
    room_id: &str,
) -> Vec<UserIdentity> {
    client.join_room(room_id).await.unwrap();
    match next_event(events).await {
        SyncEvent::DocumentLoaded(_) => {}
        other => panic!("expected DocumentLoaded, got {other:?}"),
    }
    match next_event(events).await {
        SyncEvent::UsersInRoom(members) => members,
        other => panic!("expected UsersInRoom, got {other:?}"),
    }
}

/// No event arrives within a short window.
pub async fn assert_quiet(events: &mut mpsc::Receiver<SyncEvent>) {
    if let Ok(Some(event)) = timeout(Duration::from_millis(150), events.recv()).await {
        panic!("unexpected event {event:?}");
    }
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached in time");
}

/// Minimal HTTP/1.1 GET; returns status code and body.
pub async fn http_get(addr: SocketAddr, path: &str, token: Option<&str>) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n");
    if let Some(token) = token {
        request.push_str(&format!("Authorization: Bearer {token}\r\n"));
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let raw = String::from_utf8(raw).unwrap();
    let (head, body) = raw.split_once("\r\n\r\n").unwrap();
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap();
    (status, body.to_string())
}

pub fn names(members: &[UserIdentity]) -> Vec<&str> {
    members.iter().map(|m| m.display_name.as_str()).collect()
}

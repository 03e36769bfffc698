//! WebSocket gateway and per-connection sessions.
//!
//! Architecture:
//! ```text
//! Client A ──ws──┐                         ┌── Room "abc123" ── snapshot
//!                ├── handshake (JWT) ──►   │        │
//! Client B ──ws──┘   Session per conn ───► RoomRegistry ── DocumentStore
//!                        ▲                 │        │        (RocksDB / memory)
//!                        └──── outbox ◄────┘   fan-out
//!
//! REST ── GET /api/documents/{id} ───────────────────────────► DocumentStore
//! ```
//!
//! Each session is a single task running a `select!` over the socket, its
//! outbox and its checkpoint ticker, so the events of one connection are
//! handled strictly one at a time. When the loop ends for any reason the
//! session leaves its room exactly once.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, StatusCode};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use uuid::Uuid;

use crate::auth::Authenticator;
use crate::broadcast::{outbox, BroadcastStats, Inbox, Outbox};
use crate::checkpoint::{CheckpointMode, CheckpointOutcome, CheckpointTicker};
use crate::config::{ServerConfig, StorageBackend};
use crate::http::{self, HttpState};
use crate::protocol::{self, ClientEvent, ConnectionId, ProtocolError, UserIdentity};
use crate::registry::RoomRegistry;
use crate::storage::{MemoryStore, RocksStore, SharedStore, StoreConfig, StoreError};

/// Server statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    /// Upgrades refused for a missing or invalid credential.
    pub rejected_connections: u64,
    pub total_messages: u64,
    pub active_rooms: usize,
    pub broadcast: BroadcastStats,
}

#[derive(Debug, Default)]
struct ConnectionCounters {
    total: AtomicU64,
    active: AtomicU64,
    rejected: AtomicU64,
    messages: AtomicU64,
}

/// The sync server: realtime gateway plus REST fetch.
pub struct SyncServer {
    config: ServerConfig,
    registry: Arc<RoomRegistry>,
    auth: Arc<Authenticator>,
    store: SharedStore,
    counters: Arc<ConnectionCounters>,
}

impl SyncServer {
    /// Create a server over an already opened store.
    pub fn new(config: ServerConfig, store: SharedStore) -> Result<Self, ServerError> {
        if config.jwt_secret.is_empty() {
            return Err(ServerError::Config("JWT secret must not be empty".into()));
        }
        let auth = Arc::new(Authenticator::from_secret(
            config.jwt_secret.as_bytes(),
            config.token_ttl,
        ));
        let registry = Arc::new(
            RoomRegistry::new(store.clone()).with_checkpoint_on_evict(config.checkpoint_on_evict),
        );
        Ok(Self {
            config,
            registry,
            auth,
            store,
            counters: Arc::new(ConnectionCounters::default()),
        })
    }

    /// Create a server, opening the store the configuration names.
    pub fn open(config: ServerConfig) -> Result<Self, ServerError> {
        let store: SharedStore = match &config.storage {
            StorageBackend::Memory => {
                warn!("Using in-memory storage; documents will not survive a restart");
                Arc::new(MemoryStore::new())
            }
            StorageBackend::RocksDb(path) => {
                let store = RocksStore::open(StoreConfig::new(path.clone()))?;
                let documents = store.list_documents()?;
                info!(
                    "Opened document store at {} ({} documents)",
                    store.path().display(),
                    documents.len()
                );
                Arc::new(store)
            }
        };
        Self::new(config, store)
    }

    /// Bind both listeners from the configuration and serve until an error.
    pub async fn run(&self) -> Result<(), ServerError> {
        let realtime = TcpListener::bind(&self.config.bind_addr).await?;
        let rest = TcpListener::bind(&self.config.http_addr).await?;
        self.serve(realtime, rest).await
    }

    /// Serve on already bound listeners.
    pub async fn serve(&self, realtime: TcpListener, rest: TcpListener) -> Result<(), ServerError> {
        tokio::try_join!(self.serve_realtime(realtime), self.serve_http(rest))?;
        Ok(())
    }

    /// Accept WebSocket connections forever.
    pub async fn serve_realtime(&self, listener: TcpListener) -> Result<(), ServerError> {
        info!("Sync server listening on {}", listener.local_addr()?);
        loop {
            let (stream, addr) = listener.accept().await?;
            debug!("New TCP connection from {addr}");

            let registry = self.registry.clone();
            let auth = self.auth.clone();
            let counters = self.counters.clone();
            let checkpoint_interval = self.config.checkpoint_interval;

            tokio::spawn(async move {
                if let Err(e) =
                    handle_connection(stream, addr, registry, auth, counters, checkpoint_interval)
                        .await
                {
                    debug!("Connection from {addr} ended: {e}");
                }
            });
        }
    }

    /// Serve the REST document endpoint.
    pub async fn serve_http(&self, listener: TcpListener) -> Result<(), ServerError> {
        info!("REST endpoint listening on {}", listener.local_addr()?);
        let state = HttpState::new(self.store.clone(), self.auth.clone());
        axum::serve(listener, http::router(state)).await?;
        Ok(())
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    pub fn authenticator(&self) -> &Arc<Authenticator> {
        &self.auth
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            total_connections: self.counters.total.load(Ordering::Relaxed),
            active_connections: self.counters.active.load(Ordering::Relaxed),
            rejected_connections: self.counters.rejected.load(Ordering::Relaxed),
            total_messages: self.counters.messages.load(Ordering::Relaxed),
            active_rooms: self.registry.room_count(),
            broadcast: self.registry.broadcast_stats(),
        }
    }
}

/// Authenticate the upgrade, then run the session until the socket closes.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<RoomRegistry>,
    auth: Arc<Authenticator>,
    counters: Arc<ConnectionCounters>,
    checkpoint_interval: Option<Duration>,
) -> Result<(), ProtocolError> {
    counters.total.fetch_add(1, Ordering::Relaxed);

    let mut identity: Option<UserIdentity> = None;
    let handshake = accept_hdr_async(stream, |request: &Request, response: Response| {
        let authorization = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        match auth.authenticate(authorization, request.uri().query()) {
            Ok(user) => {
                identity = Some(user);
                Ok(response)
            }
            Err(e) => {
                warn!("Rejecting connection from {addr}: {e}");
                let mut rejection = ErrorResponse::new(Some("Unauthorized".to_string()));
                *rejection.status_mut() = StatusCode::UNAUTHORIZED;
                Err(rejection)
            }
        }
    })
    .await;

    let (ws, identity) = match (handshake, identity) {
        (Ok(ws), Some(identity)) => (ws, identity),
        (result, _) => {
            counters.rejected.fetch_add(1, Ordering::Relaxed);
            let reason = result.err().map_or_else(|| "no identity".to_string(), |e| e.to_string());
            return Err(ProtocolError::Handshake(reason));
        }
    };

    counters.active.fetch_add(1, Ordering::Relaxed);
    let conn = Uuid::new_v4();
    info!("{} connected from {addr} as {conn}", identity.display_name);

    let (tx, rx) = outbox();
    let mut session = Session {
        conn,
        identity,
        outbox: tx,
        registry: registry.clone(),
        ticker: CheckpointTicker::new(checkpoint_interval),
        counters: counters.clone(),
    };
    let result = session.run(ws, rx).await;

    registry.leave(conn).await;
    counters.active.fetch_sub(1, Ordering::Relaxed);
    info!("{} disconnected ({conn})", session.identity.display_name);
    result
}

/// State owned by one authenticated connection.
struct Session {
    conn: ConnectionId,
    identity: UserIdentity,
    outbox: Outbox,
    registry: Arc<RoomRegistry>,
    ticker: CheckpointTicker,
    counters: Arc<ConnectionCounters>,
}

impl Session {
    async fn run(
        &mut self,
        ws: WebSocketStream<TcpStream>,
        mut inbox: Inbox,
    ) -> Result<(), ProtocolError> {
        let (mut sink, mut frames) = ws.split();

        loop {
            let in_room = self.registry.room_of(&self.conn).is_some();
            tokio::select! {
                frame = frames.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        self.counters.messages.fetch_add(1, Ordering::Relaxed);
                        match protocol::decode::<ClientEvent>(text.as_str()) {
                            Ok(event) => self.handle(event).await,
                            Err(e) => warn!("Dropping malformed frame from {}: {e}", self.conn),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        sink.send(Message::Pong(data))
                            .await
                            .map_err(|e| ProtocolError::Transport(e.to_string()))?;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket error on {}: {e}", self.conn);
                        break;
                    }
                },

                Some(event) = inbox.recv() => {
                    let frame = protocol::encode(event.as_ref())?;
                    sink.send(Message::Text(frame.into()))
                        .await
                        .map_err(|e| ProtocolError::Transport(e.to_string()))?;
                }

                _ = self.ticker.tick(), if in_room => {
                    self.registry.checkpoint(self.conn, CheckpointMode::IfDirty).await;
                }
            }
        }

        Ok(())
    }

    async fn handle(&mut self, event: ClientEvent) {
        debug!("{} from {}", event.name(), self.conn);
        match event {
            ClientEvent::JoinRoom(room_id) => {
                match self
                    .registry
                    .join(&room_id, self.conn, self.identity.clone(), self.outbox.clone())
                    .await
                {
                    Ok(_) => self.ticker.reset(),
                    Err(e) => {
                        warn!("Join of '{room_id}' by {} failed: {e}", self.conn);
                        self.registry.send_error(&self.outbox, e.to_string());
                    }
                }
            }
            ClientEvent::SendChanges(change) => {
                if let Err(e) = self.registry.apply_changes(self.conn, change).await {
                    warn!("Dropped edit from {}: {e}", self.conn);
                }
            }
            ClientEvent::SaveDocument(hint) => {
                let current = self.registry.room_of(&self.conn);
                if hint.room_id.is_some() && hint.room_id.as_deref().map(str::trim) != current.as_deref() {
                    debug!(
                        "save-document hint names {:?} but {} is in {current:?}",
                        hint.room_id, self.conn
                    );
                }
                match self.registry.checkpoint(self.conn, CheckpointMode::Always).await {
                    Some(CheckpointOutcome::Written { revision, .. }) => {
                        self.ticker.reset();
                        debug!("Saved {current:?} at revision {revision}");
                    }
                    Some(_) => {}
                    None => warn!("save-document from {} outside any room", self.conn),
                }
            }
            ClientEvent::LeaveRoom(room_id) => {
                if self.registry.room_of(&self.conn).as_deref() == Some(room_id.trim()) {
                    self.registry.leave(self.conn).await;
                } else {
                    debug!("Ignoring leave-room '{room_id}' from {}: not a member", self.conn);
                }
            }
        }
    }
}

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DocumentStore;

    fn config() -> ServerConfig {
        ServerConfig {
            jwt_secret: "test-secret".into(),
            ..ServerConfig::default()
        }
    }

    #[test]
    fn test_empty_secret_rejected() {
        let result = SyncServer::new(ServerConfig::default(), Arc::new(MemoryStore::new()));
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[test]
    fn test_open_in_memory() {
        let server = SyncServer::open(config()).unwrap();
        assert_eq!(server.config().bind_addr, "127.0.0.1:9090");
        assert_eq!(server.stats(), ServerStats::default());
    }

    #[test]
    fn test_open_rocksdb() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            storage: StorageBackend::RocksDb(dir.path().to_path_buf()),
            ..config()
        };
        let server = SyncServer::open(config).unwrap();
        assert!(server.store().load("missing").unwrap().is_none());
    }

    #[test]
    fn test_issued_token_verifies() {
        let server = SyncServer::open(config()).unwrap();
        let alice = UserIdentity::new("u1", "Alice");
        let token = server.authenticator().issue(&alice).unwrap();
        assert_eq!(server.authenticator().verify(&token).unwrap(), alice);
    }
}

//! WebSocket sync client for connecting to the collaboration server.
//!
//! Provides:
//! - Connection lifecycle with bearer-token authentication
//! - Room join/leave and edit sending
//! - A local mirror of the room document (loaded snapshot + remote edits
//!   + own edits, all composed in arrival order)
//! - Periodic autosave (`save-document`) while in a room
//!
//! Used by integration tests and tooling; browser editors speak the same
//! protocol directly.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;

use crate::checkpoint::DEFAULT_CHECKPOINT_INTERVAL;
use crate::delta::Delta;
use crate::protocol::{self, ClientEvent, ProtocolError, SaveHint, ServerEvent, UserIdentity};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events emitted by the sync client.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Connection established
    Connected,
    /// Connection lost
    Disconnected,
    /// Snapshot received after joining a room
    DocumentLoaded(Delta),
    /// Edit made by another member
    RemoteChanges(Delta),
    /// Room membership changed
    UsersInRoom(Vec<UserIdentity>),
    /// Server refused a request
    ServerError(String),
}

/// Local view shared between the client handle and its background tasks.
#[derive(Debug, Default)]
struct LocalView {
    room_id: Option<String>,
    document: Option<Delta>,
}

/// The sync client.
pub struct SyncClient {
    server_url: String,
    token: String,
    state: Arc<RwLock<ConnectionState>>,
    view: Arc<Mutex<LocalView>>,
    /// Autosave period (`None` = off)
    autosave: Option<Duration>,
    outgoing_tx: Option<mpsc::Sender<String>>,
    event_rx: Option<mpsc::Receiver<SyncEvent>>,
    event_tx: mpsc::Sender<SyncEvent>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
    autosave_task: Option<JoinHandle<()>>,
}

impl SyncClient {
    /// Create a client for `server_url` (e.g. `ws://127.0.0.1:9090`).
    pub fn new(server_url: impl Into<String>, token: impl Into<String>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            server_url: server_url.into(),
            token: token.into(),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            view: Arc::new(Mutex::new(LocalView::default())),
            autosave: Some(DEFAULT_CHECKPOINT_INTERVAL),
            outgoing_tx: None,
            event_rx: Some(event_rx),
            event_tx,
            writer: None,
            reader: None,
            autosave_task: None,
        }
    }

    /// Set the autosave period; `None` disables autosave.
    pub fn with_autosave(mut self, period: Option<Duration>) -> Self {
        self.autosave = period.filter(|p| !p.is_zero());
        self
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<SyncEvent>> {
        self.event_rx.take()
    }

    /// Connect and authenticate.
    ///
    /// Spawns background tasks for reading and writing frames.
    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        *self.state.write().await = ConnectionState::Connecting;

        let mut request = self
            .server_url
            .as_str()
            .into_client_request()
            .map_err(|e| ProtocolError::Handshake(e.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|e| ProtocolError::Handshake(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let ws_stream = match tokio_tungstenite::connect_async(request).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(ProtocolError::Handshake(e.to_string()));
            }
        };
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::channel::<String>(256);
        self.outgoing_tx = Some(out_tx.clone());

        // Writer: forward queued frames, close the socket once the queue closes
        self.writer = Some(tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if ws_writer.send(Message::Text(frame.into())).await.is_err() {
                    return;
                }
            }
            let _ = ws_writer.send(Message::Close(None)).await;
        }));

        *self.state.write().await = ConnectionState::Connected;
        let _ = self.event_tx.send(SyncEvent::Connected).await;

        // Reader: keep the local mirror current and surface events
        let event_tx = self.event_tx.clone();
        let state = self.state.clone();
        let view = self.view.clone();
        self.reader = Some(tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match protocol::decode::<ServerEvent>(text.as_str()) {
                        Ok(event) => {
                            let event = apply_to_view(&view, event).await;
                            let _ = event_tx.send(event).await;
                        }
                        Err(e) => warn!("Ignoring undecodable server frame: {e}"),
                    },
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }
            *state.write().await = ConnectionState::Disconnected;
            let _ = event_tx.send(SyncEvent::Disconnected).await;
        }));

        if let Some(period) = self.autosave {
            self.autosave_task = Some(spawn_autosave(period, self.view.clone(), out_tx));
        }

        info!("Connected to {}", self.server_url);
        Ok(())
    }

    /// Join a room; the server answers with `DocumentLoaded` and `UsersInRoom`.
    pub async fn join_room(&self, room_id: impl Into<String>) -> Result<(), ProtocolError> {
        let room_id = room_id.into();
        {
            let mut view = self.view.lock().await;
            view.room_id = Some(room_id.clone());
            view.document = None;
        }
        self.send(&ClientEvent::JoinRoom(room_id)).await
    }

    /// Send an edit and fold it into the local document.
    pub async fn send_changes(&self, change: Delta) -> Result<(), ProtocolError> {
        self.ensure_connected().await?;
        {
            let mut view = self.view.lock().await;
            if let Some(document) = view.document.as_mut() {
                *document = document.compose(&change);
            }
        }
        self.send(&ClientEvent::SendChanges(change)).await
    }

    /// Ask the server to checkpoint the room now.
    pub async fn save_document(&self) -> Result<(), ProtocolError> {
        let hint = save_hint(&*self.view.lock().await);
        self.send(&ClientEvent::SaveDocument(hint)).await
    }

    pub async fn leave_room(&self) -> Result<(), ProtocolError> {
        let room_id = {
            let mut view = self.view.lock().await;
            view.document = None;
            view.room_id.take()
        };
        match room_id {
            Some(room_id) => self.send(&ClientEvent::LeaveRoom(room_id)).await,
            None => Ok(()),
        }
    }

    /// Close the connection. Pending frames are flushed first.
    pub async fn disconnect(&mut self) {
        if let Some(task) = self.autosave_task.take() {
            task.abort();
        }
        self.outgoing_tx = None;
        if let Some(writer) = self.writer.take() {
            let _ = writer.await;
        }
        *self.state.write().await = ConnectionState::Disconnected;
        debug!("Disconnected from {}", self.server_url);
    }

    /// Local copy of the room document, if one is loaded.
    pub async fn document(&self) -> Option<Delta> {
        self.view.lock().await.document.clone()
    }

    pub async fn room_id(&self) -> Option<String> {
        self.view.lock().await.room_id.clone()
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    async fn ensure_connected(&self) -> Result<(), ProtocolError> {
        if *self.state.read().await != ConnectionState::Connected {
            return Err(ProtocolError::ConnectionClosed);
        }
        Ok(())
    }

    async fn send(&self, event: &ClientEvent) -> Result<(), ProtocolError> {
        self.ensure_connected().await?;
        let frame = protocol::encode(event)?;
        let tx = self
            .outgoing_tx
            .as_ref()
            .ok_or(ProtocolError::ConnectionClosed)?;
        tx.send(frame)
            .await
            .map_err(|_| ProtocolError::ConnectionClosed)
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        for task in [
            self.autosave_task.take(),
            self.reader.take(),
            self.writer.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }
    }
}

/// Update the local mirror for a server event and translate it.
async fn apply_to_view(view: &Mutex<LocalView>, event: ServerEvent) -> SyncEvent {
    match event {
        ServerEvent::DocumentLoaded(snapshot) => {
            view.lock().await.document = Some(snapshot.clone());
            SyncEvent::DocumentLoaded(snapshot)
        }
        ServerEvent::ReceiveChanges(change) => {
            let mut view = view.lock().await;
            if let Some(document) = view.document.as_mut() {
                *document = document.compose(&change);
            }
            SyncEvent::RemoteChanges(change)
        }
        ServerEvent::UsersInRoom(members) => SyncEvent::UsersInRoom(members),
        ServerEvent::Error(payload) => SyncEvent::ServerError(payload.message),
    }
}

fn save_hint(view: &LocalView) -> SaveHint {
    SaveHint {
        room_id: view.room_id.clone(),
        content: view
            .document
            .as_ref()
            .and_then(|document| serde_json::to_value(document).ok()),
    }
}

/// Send `save-document` every `period` while the client is in a room.
fn spawn_autosave(
    period: Duration,
    view: Arc<Mutex<LocalView>>,
    outgoing: mpsc::Sender<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let hint = {
                let view = view.lock().await;
                if view.room_id.is_none() {
                    continue;
                }
                save_hint(&view)
            };
            let Ok(frame) = protocol::encode(&ClientEvent::SaveDocument(hint)) else {
                continue;
            };
            if outgoing.send(frame).await.is_err() {
                return;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_client_is_disconnected() {
        let mut client = SyncClient::new("ws://127.0.0.1:1", "token");
        assert_eq!(client.connection_state().await, ConnectionState::Disconnected);
        assert!(client.take_event_rx().is_some());
        assert!(client.take_event_rx().is_none());
        assert_eq!(client.document().await, None);
    }

    #[tokio::test]
    async fn test_send_while_disconnected_fails() {
        let client = SyncClient::new("ws://127.0.0.1:1", "token");
        assert_eq!(
            client.send_changes(Delta::new().insert("x", None)).await,
            Err(ProtocolError::ConnectionClosed)
        );
    }

    #[tokio::test]
    async fn test_connect_to_nothing_fails() {
        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut client = SyncClient::new(format!("ws://127.0.0.1:{port}"), "token");
        assert!(matches!(client.connect().await, Err(ProtocolError::Handshake(_))));
        assert_eq!(client.connection_state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_view_follows_server_events() {
        let view = Mutex::new(LocalView::default());

        let loaded = apply_to_view(&view, ServerEvent::DocumentLoaded(Delta::default_document())).await;
        assert_eq!(loaded, SyncEvent::DocumentLoaded(Delta::default_document()));

        let change = Delta::new().insert("hi", None);
        let remote = apply_to_view(&view, ServerEvent::ReceiveChanges(change.clone())).await;
        assert_eq!(remote, SyncEvent::RemoteChanges(change));
        assert_eq!(view.lock().await.document.as_ref().unwrap().text(), "hi\n");

        let error = apply_to_view(&view, ServerEvent::error("nope")).await;
        assert_eq!(error, SyncEvent::ServerError("nope".into()));
    }

    #[test]
    fn test_save_hint_carries_local_document() {
        let view = LocalView {
            room_id: Some("abc123".into()),
            document: Some(Delta::new().insert("hi\n", None)),
        };
        let hint = save_hint(&view);
        assert_eq!(hint.room_id.as_deref(), Some("abc123"));
        assert_eq!(
            hint.content,
            Some(serde_json::json!({ "ops": [{ "insert": "hi\n" }] }))
        );
    }
}

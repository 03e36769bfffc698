//! # quire-collab: Real-time collaborative rich-text sync
//!
//! Editors join a room per document, stream Quill-style deltas, and see
//! each other's edits and presence live. The server keeps one in-memory
//! snapshot per room and checkpoints it to a document store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   WebSocket (JSON)   ┌──────────────┐
//! │ SyncClient  │ ◄──────────────────► │  SyncServer  │
//! │ (per user)  │   {"event","data"}   │  (gateway)   │
//! └─────────────┘                      └──────┬───────┘
//!                                             │
//!                                      ┌──────┴───────┐
//!                                      │ RoomRegistry │
//!                                      └──────┬───────┘
//!                        ┌────────────────────┼────────────────────┐
//!                        ▼                    ▼                    ▼
//!                 ┌─────────────┐      ┌─────────────┐     ┌──────────────┐
//!                 │ Reconciler  │      │  Presence   │     │ Checkpointer │
//!                 │ (compose +  │      │ (member     │     │ (snapshot →  │
//!                 │  fan-out)   │      │  lists)     │     │  store)      │
//!                 └─────────────┘      └─────────────┘     └──────┬───────┘
//!                                                                 │
//!   GET /api/documents/{id} ──► http ──────────────────────► DocumentStore
//!                                                          (RocksDB / memory)
//! ```
//!
//! ## Modules
//!
//! - [`delta`]: Rich-text delta model and compose
//! - [`protocol`]: Realtime event protocol (JSON text frames)
//! - [`auth`]: Bearer-token verification (HS256)
//! - [`room`] / [`registry`]: Room lifecycle and membership
//! - [`reconciler`]: Applies edits to the room snapshot and relays them
//! - [`presence`]: Member list announcements
//! - [`loader`] / [`checkpoint`]: Snapshot load and persistence
//! - [`storage`]: Document store backends
//! - [`server`] / [`http`]: Realtime gateway and REST fetch
//! - [`client`]: WebSocket sync client with autosave

pub mod auth;
pub mod broadcast;
pub mod checkpoint;
pub mod client;
pub mod config;
pub mod delta;
pub mod http;
pub mod loader;
pub mod presence;
pub mod protocol;
pub mod reconciler;
pub mod registry;
pub mod room;
pub mod server;
pub mod storage;

// Re-exports for convenience
pub use auth::{AuthError, Authenticator, Claims};
pub use broadcast::BroadcastStats;
pub use checkpoint::{CheckpointMode, CheckpointOutcome, Checkpointer};
pub use client::{ConnectionState, SyncClient, SyncEvent};
pub use config::{ConfigError, ServerConfig, StorageBackend};
pub use delta::{Attributes, Delta, DeltaError, Insert, Op};
pub use protocol::{ClientEvent, ConnectionId, ProtocolError, ServerEvent, UserIdentity};
pub use registry::{JoinError, RoomRegistry};
pub use server::{ServerError, ServerStats, SyncServer};
pub use storage::{
    DocumentMetadata, DocumentStore, MemoryStore, PersistedDocument, RocksStore, SharedStore,
    StoreConfig, StoreError,
};

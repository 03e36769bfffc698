//! Stateless REST fetch of persisted documents.
//!
//! `GET /api/documents/{id}` with a bearer token:
//! - `200 {"content": <delta>}`
//! - `404 {"message": "Document not found"}`
//! - `500 {"message": "Server error"}`
//! - `401 {"message": "Unauthorized"}`
//!
//! Reads go straight to the store; live rooms are not consulted.

use std::sync::Arc;

use axum::extract::{Path, RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::auth::Authenticator;
use crate::delta::Delta;
use crate::storage::{load_async, SharedStore};

#[derive(Clone)]
pub struct HttpState {
    store: SharedStore,
    auth: Arc<Authenticator>,
}

impl HttpState {
    pub fn new(store: SharedStore, auth: Arc<Authenticator>) -> Self {
        Self { store, auth }
    }
}

/// Body of a successful fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentResponse {
    pub content: Delta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/api/documents/{id}", get(get_document))
        .with_state(state)
}

async fn get_document(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Json<DocumentResponse>, HttpError> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let user = state
        .auth
        .authenticate(authorization, query.as_deref())
        .map_err(|e| {
            debug!("Rejected document fetch: {e}");
            HttpError::Unauthorized
        })?;

    let id = id.trim();
    debug!("{} fetching document '{id}'", user.display_name);
    match load_async(&state.store, id).await {
        Ok(Some(record)) => Ok(Json(DocumentResponse {
            content: record.data,
        })),
        Ok(None) => Err(HttpError::NotFound),
        Err(e) => {
            error!("Failed to fetch document '{id}': {e}");
            Err(HttpError::Storage)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HttpError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Document not found")]
    NotFound,
    #[error("Server error")]
    Storage,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = match self {
            HttpError::Unauthorized => StatusCode::UNAUTHORIZED,
            HttpError::NotFound => StatusCode::NOT_FOUND,
            HttpError::Storage => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

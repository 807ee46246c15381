// Document endpoints for the relay API.
//
// Routes:
//   GET   /v1/documents/{doc_id}   read (`?silent=true` for background refreshes)
//   PATCH /v1/documents/{doc_id}   partial update, refused while locked
//   PUT   /v1/documents/{doc_id}   seed or replace (development convenience)

use axum::{
    extract::{Json, Path, Query, State},
    http::HeaderMap,
    routing::get,
    Router,
};
use folio_common::types::{Document, DocumentPatch};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use super::{request_user, ApiError};
use crate::store::SeedDocument;
use crate::RelayState;

#[derive(Debug, Default, Deserialize)]
pub struct FetchQuery {
    #[serde(default)]
    pub silent: bool,
}

pub fn router() -> Router<RelayState> {
    Router::new().route(
        "/v1/documents/{doc_id}",
        get(get_document).patch(update_document).put(put_document),
    )
}

// ── Handlers ───────────────────────────────────────────────────────

async fn get_document(
    State(state): State<RelayState>,
    Path(doc_id): Path<Uuid>,
    Query(query): Query<FetchQuery>,
) -> Result<Json<Document>, ApiError> {
    let document = state.store.get_document(doc_id).await?;
    if !query.silent {
        debug!(document_id = %doc_id, "document fetched");
    }
    Ok(Json(document))
}

async fn update_document(
    State(state): State<RelayState>,
    Path(doc_id): Path<Uuid>,
    headers: HeaderMap,
    Json(patch): Json<DocumentPatch>,
) -> Result<Json<Document>, ApiError> {
    let user = request_user(&headers)?;
    if patch.is_empty() {
        return Err(ApiError::bad_request("patch", "patch must set title or content"));
    }
    let document = state.store.update_document(doc_id, &patch).await?;
    debug!(document_id = %doc_id, user, "document updated");
    Ok(Json(document))
}

async fn put_document(
    State(state): State<RelayState>,
    Path(doc_id): Path<Uuid>,
    headers: HeaderMap,
    Json(seed): Json<SeedDocument>,
) -> Result<Json<Document>, ApiError> {
    let user = request_user(&headers)?;
    let document = state.store.put_document(doc_id, seed, user).await;
    info!(document_id = %doc_id, locked = document.locked, "document seeded");
    Ok(Json(document))
}

// ── Tests ──────────────────────────────────────────────────────────

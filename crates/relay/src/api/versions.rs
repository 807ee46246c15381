// Version endpoints for the relay API.
//
// Routes:
//   POST /v1/documents/{doc_id}/versions   create a snapshot
//   GET  /v1/documents/{doc_id}/versions   list summaries, newest first
//   GET  /v1/versions/{version_id}         full version
//   POST /v1/versions/{version_id}/restore write the version back to its document

use axum::{
    extract::{Json, Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use folio_common::protocol::versions::{
    CreateVersionRequest, CreateVersionResponse, ListVersionsQuery, MAX_PAGE_SIZE,
};
use folio_common::types::{Document, Page, Version, VersionSummary};
use tracing::info;
use uuid::Uuid;

use super::{request_user, ApiError};
use crate::RelayState;

pub fn router() -> Router<RelayState> {
    Router::new()
        .route("/v1/documents/{doc_id}/versions", post(create_version).get(list_versions))
        .route("/v1/versions/{version_id}", get(get_version))
        .route("/v1/versions/{version_id}/restore", post(restore_version))
}

fn validate_page(query: ListVersionsQuery) -> Result<ListVersionsQuery, ApiError> {
    if query.size == 0 {
        return Err(ApiError::bad_request("size", "size must be at least 1"));
    }
    Ok(ListVersionsQuery { page: query.page, size: query.size.min(MAX_PAGE_SIZE) })
}

// ── Handlers ───────────────────────────────────────────────────────

async fn create_version(
    State(state): State<RelayState>,
    Path(doc_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<CreateVersionRequest>,
) -> Result<(StatusCode, Json<CreateVersionResponse>), ApiError> {
    let user = request_user(&headers)?;
    let version = state.store.create_version(doc_id, &request, user).await?;
    info!(document_id = %doc_id, version_id = %version.id, user, "version created");
    Ok((StatusCode::CREATED, Json(CreateVersionResponse { id: version.id })))
}

async fn list_versions(
    State(state): State<RelayState>,
    Path(doc_id): Path<Uuid>,
    Query(query): Query<ListVersionsQuery>,
) -> Result<Json<Page<VersionSummary>>, ApiError> {
    let query = validate_page(query)?;
    let page = state.store.list_versions(doc_id, query.page, query.size).await?;
    Ok(Json(page))
}

async fn get_version(
    State(state): State<RelayState>,
    Path(version_id): Path<Uuid>,
) -> Result<Json<Version>, ApiError> {
    Ok(Json(state.store.get_version(version_id).await?))
}

async fn restore_version(
    State(state): State<RelayState>,
    Path(version_id): Path<Uuid>,
) -> Result<Json<Document>, ApiError> {
    let document = state.store.restore_version(version_id).await?;
    info!(%version_id, document_id = %document.id, "version restored");
    Ok(Json(document))
}

// ── Tests ──────────────────────────────────────────────────────────

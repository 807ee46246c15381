// REST endpoints for documents and versions.

pub mod documents;
pub mod versions;

use axum::{
    http::HeaderMap,
    response::{IntoResponse, Response},
    Router,
};
use folio_common::types::UserId;
use serde_json::json;

use crate::error::{ErrorCode, RelayError};
use crate::store::StoreError;
use crate::RelayState;

/// Header carrying the acting user's id.
pub const USER_ID_HEADER: &str = "x-folio-user-id";

/// Attributed to writes that arrive without [`USER_ID_HEADER`].
pub const ANONYMOUS_USER: UserId = 0;

pub fn router() -> Router<RelayState> {
    Router::new().merge(documents::router()).merge(versions::router())
}

// ── Error ──────────────────────────────────────────────────────────

#[derive(Debug)]
pub(crate) enum ApiError {
    BadRequest { field: &'static str, message: String },
    Store(StoreError),
}

impl ApiError {
    pub(crate) fn bad_request(field: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest { field, message: message.into() }
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        Self::Store(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = match self {
            Self::BadRequest { field, message } => {
                RelayError::new(ErrorCode::ValidationFailed, message)
                    .with_details(json!({ "field": field }))
            }
            Self::Store(StoreError::DocumentNotFound(id)) => {
                RelayError::new(ErrorCode::NotFound, format!("document {id} not found"))
            }
            Self::Store(StoreError::VersionNotFound(id)) => {
                RelayError::new(ErrorCode::NotFound, format!("version {id} not found"))
            }
            Self::Store(StoreError::Locked(id)) => {
                RelayError::new(ErrorCode::DocumentLocked, format!("document {id} is locked"))
            }
            Self::Store(StoreError::Invalid(message)) => {
                RelayError::new(ErrorCode::ValidationFailed, message)
            }
        };
        error.into_response()
    }
}

/// Acting user from [`USER_ID_HEADER`]. A missing header is anonymous; a
/// malformed one is rejected.
pub(crate) fn request_user(headers: &HeaderMap) -> Result<UserId, ApiError> {
    let Some(value) = headers.get(USER_ID_HEADER) else {
        return Ok(ANONYMOUS_USER);
    };
    value
        .to_str()
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .ok_or_else(|| {
            ApiError::bad_request(USER_ID_HEADER, format!("{USER_ID_HEADER} must be an integer"))
        })
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::{
        body::Body,
        http::Request,
        response::Response,
        Router,
    };

    use crate::{build_router, RelayState};

    pub fn test_state() -> RelayState {
        RelayState::new(16)
    }

    pub fn test_router(state: &RelayState) -> Router {
        build_router(state.clone(), None)
    }

    pub fn json_request(method: &str, uri: &str, body: serde_json::Value, user: i64) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "application/json")
            .header(super::USER_ID_HEADER, user.to_string())
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
    }

    pub async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}

// HTTP client for the relay's document and version endpoints.

use folio_common::protocol::versions::{
    CreateVersionRequest, CreateVersionResponse, ListVersionsQuery,
};
use folio_common::types::{Document, DocumentPatch, Page, UserId, Version, VersionSummary};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;
use uuid::Uuid;

use super::{BackendFuture, DocumentBackend, FetchOptions, VersionBackend};
use crate::error::BackendError;

/// Header the relay reads to attribute writes.
pub const USER_ID_HEADER: &str = "x-folio-user-id";

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// `DocumentBackend` + `VersionBackend` over the relay REST API.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    user_id: UserId,
}

impl HttpBackend {
    pub fn new(base_url: &str, user_id: UserId) -> Result<Self, BackendError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| BackendError::InvalidResponse(format!("invalid relay url: {e}")))?;
        Ok(Self { client: Client::new(), base_url, user_id })
    }

    fn url(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(path)
            .map_err(|e| BackendError::InvalidResponse(format!("invalid request path {path}: {e}")))
    }

    fn authored(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(USER_ID_HEADER, self.user_id.to_string())
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        let response = self
            .authored(request)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        decode_response(response).await
    }
}

async fn decode_response<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|envelope| format!("{}: {}", envelope.error.code, envelope.error.message))
        .unwrap_or_else(|_| format!("HTTP {status}"));
    Err(error_for_status(status, message))
}

fn error_for_status(status: StatusCode, message: String) -> BackendError {
    match status {
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED | StatusCode::LOCKED => {
            BackendError::PermissionDenied(message)
        }
        StatusCode::NOT_FOUND => BackendError::InvalidResponse(message),
        _ if status.is_server_error() => BackendError::Network(message),
        _ => BackendError::InvalidResponse(message),
    }
}

impl DocumentBackend for HttpBackend {
    fn update_document<'a>(
        &'a self,
        document_id: Uuid,
        patch: &'a DocumentPatch,
    ) -> BackendFuture<'a, Document> {
        Box::pin(async move {
            let url = self.url(&format!("/v1/documents/{document_id}"))?;
            self.send(self.client.patch(url).json(patch))
                .await
                .map_err(|e| not_found_as(e, BackendError::document_not_found(document_id)))
        })
    }

    fn fetch_document(
        &self,
        document_id: Uuid,
        options: FetchOptions,
    ) -> BackendFuture<'_, Document> {
        Box::pin(async move {
            let url = self.url(&format!("/v1/documents/{document_id}"))?;
            self.send(self.client.get(url).query(&[("silent", options.silent)]))
                .await
                .map_err(|e| not_found_as(e, BackendError::document_not_found(document_id)))
        })
    }
}

impl VersionBackend for HttpBackend {
    fn create_version<'a>(
        &'a self,
        document_id: Uuid,
        request: &'a CreateVersionRequest,
    ) -> BackendFuture<'a, Uuid> {
        Box::pin(async move {
            let url = self.url(&format!("/v1/documents/{document_id}/versions"))?;
            let created: CreateVersionResponse = self
                .send(self.client.post(url).json(request))
                .await
                .map_err(|e| not_found_as(e, BackendError::document_not_found(document_id)))?;
            Ok(created.id)
        })
    }

    fn list_versions(
        &self,
        document_id: Uuid,
        query: ListVersionsQuery,
    ) -> BackendFuture<'_, Page<VersionSummary>> {
        Box::pin(async move {
            let url = self.url(&format!("/v1/documents/{document_id}/versions"))?;
            self.send(self.client.get(url).query(&query))
                .await
                .map_err(|e| not_found_as(e, BackendError::document_not_found(document_id)))
        })
    }

    fn get_version(&self, version_id: Uuid) -> BackendFuture<'_, Version> {
        Box::pin(async move {
            let url = self.url(&format!("/v1/versions/{version_id}"))?;
            self.send(self.client.get(url))
                .await
                .map_err(|e| not_found_as(e, BackendError::version_not_found(version_id)))
        })
    }

    fn restore_version(&self, version_id: Uuid) -> BackendFuture<'_, Document> {
        Box::pin(async move {
            let url = self.url(&format!("/v1/versions/{version_id}/restore"))?;
            self.send(self.client.post(url))
                .await
                .map_err(|e| not_found_as(e, BackendError::version_not_found(version_id)))
        })
    }
}

/// 404s come back as `InvalidResponse` tagged with the relay's `NOT_FOUND`
/// code; swap in the typed error for the resource the call addressed.
fn not_found_as(error: BackendError, not_found: BackendError) -> BackendError {
    match &error {
        BackendError::InvalidResponse(message) if message.starts_with("NOT_FOUND") => not_found,
        _ => error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_and_locked_map_to_permission_denied() {
        assert!(error_for_status(StatusCode::FORBIDDEN, "denied".into()).is_permission_denied());
        assert!(error_for_status(StatusCode::LOCKED, "locked".into()).is_permission_denied());
    }

    #[test]
    fn server_errors_are_network_failures() {
        assert!(matches!(
            error_for_status(StatusCode::SERVICE_UNAVAILABLE, "down".into()),
            BackendError::Network(_)
        ));
    }

    #[test]
    fn not_found_code_is_retyped() {
        let id = Uuid::new_v4();
        let error = not_found_as(
            BackendError::InvalidResponse("NOT_FOUND: version not found".into()),
            BackendError::version_not_found(id),
        );
        assert_eq!(error, BackendError::version_not_found(id));

        let untouched = not_found_as(
            BackendError::Network("reset".into()),
            BackendError::version_not_found(id),
        );
        assert!(matches!(untouched, BackendError::Network(_)));
    }

    #[test]
    fn rejects_invalid_base_url() {
        assert!(HttpBackend::new("not a url", 1).is_err());
    }
}

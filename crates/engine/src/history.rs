// Version browse and restore.

use std::sync::Arc;

use folio_common::protocol::versions::{CreateVersionRequest, ListVersionsQuery, MAX_PAGE_SIZE};
use folio_common::types::{Document, Page, Version, VersionSummary};
use tracing::info;
use uuid::Uuid;

use crate::backend::{DocumentBackend, FetchOptions, VersionBackend};
use crate::error::{BackendError, SessionError};

/// Proof that the user confirmed a destructive restore. Only
/// [`RestoreConfirmation::confirmed`] builds one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreConfirmation {
    _private: (),
}

impl RestoreConfirmation {
    /// Call only after the user has accepted losing unsaved edits.
    pub fn confirmed() -> Self {
        Self { _private: () }
    }
}

/// Validate a page request. Zero-size pages are rejected and oversized ones
/// capped.
pub fn page_query(page: u32, size: u32) -> Result<ListVersionsQuery, SessionError> {
    if size == 0 {
        return Err(SessionError::InvalidPage("page size must be at least 1".into()));
    }
    Ok(ListVersionsQuery { page, size: size.min(MAX_PAGE_SIZE) })
}

#[derive(Clone)]
pub struct VersionHistoryStore {
    versions: Arc<dyn VersionBackend>,
    documents: Arc<dyn DocumentBackend>,
}

impl VersionHistoryStore {
    pub fn new(versions: Arc<dyn VersionBackend>, documents: Arc<dyn DocumentBackend>) -> Self {
        Self { versions, documents }
    }

    pub async fn create(
        &self,
        document_id: Uuid,
        request: &CreateVersionRequest,
    ) -> Result<Uuid, BackendError> {
        self.versions.create_version(document_id, request).await
    }

    /// Newest first, summaries only.
    pub async fn list(
        &self,
        document_id: Uuid,
        page: u32,
        size: u32,
    ) -> Result<Page<VersionSummary>, SessionError> {
        let query = page_query(page, size)?;
        Ok(self.versions.list_versions(document_id, query).await?)
    }

    pub async fn get(&self, version_id: Uuid) -> Result<Version, SessionError> {
        Ok(self.versions.get_version(version_id).await?)
    }

    /// Write the version back to its document and re-fetch the document so
    /// the caller can install it. The version itself is untouched.
    pub async fn restore(
        &self,
        version_id: Uuid,
        _confirmation: RestoreConfirmation,
    ) -> Result<Document, SessionError> {
        let version = self.versions.get_version(version_id).await?;
        self.versions.restore_version(version_id).await?;
        let document =
            self.documents.fetch_document(version.document_id, FetchOptions::silent_apply()).await?;
        info!(%version_id, document_id = %document.id, "version restored");
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use folio_common::types::ViewType;

    fn store(backend: &MemoryBackend) -> VersionHistoryStore {
        VersionHistoryStore::new(Arc::new(backend.clone()), Arc::new(backend.clone()))
    }

    fn request(title: &str, content: &str) -> CreateVersionRequest {
        CreateVersionRequest {
            title: title.into(),
            view_type: ViewType::Page,
            title_width: 240,
            content: Some(content.into()),
            properties_json: "[]".into(),
            property_values_json: "{}".into(),
        }
    }

    #[test]
    fn page_size_zero_is_rejected() {
        assert!(matches!(page_query(0, 0), Err(SessionError::InvalidPage(_))));
    }

    #[test]
    fn page_size_is_capped() {
        assert_eq!(page_query(2, 500).unwrap(), ListVersionsQuery { page: 2, size: 100 });
        assert_eq!(page_query(0, 50).unwrap().size, 50);
    }

    #[tokio::test]
    async fn list_get_restore_round() {
        let backend = MemoryBackend::new(4);
        let doc = backend.seed_page("Current", "now");
        let history = store(&backend);
        for (title, content) in [("First", "a"), ("Second", "b"), ("Third", "c")] {
            history.create(doc.id, &request(title, content)).await.unwrap();
        }

        let page = history.list(doc.id, 0, 50).await.unwrap();
        assert_eq!(page.content.len(), 3);
        let target = page.content[1].clone();
        assert_eq!(target.title, "Second");

        let version = history.get(target.id).await.unwrap();
        assert_eq!(version.content.as_deref(), Some("b"));

        let restored = history.restore(target.id, RestoreConfirmation::confirmed()).await.unwrap();
        assert_eq!(restored.title, "Second");
        assert_eq!(restored.content.as_deref(), Some("b"));
        assert_eq!(backend.fetches().last(), Some(&(doc.id, FetchOptions::silent_apply())));

        let again = history.get(target.id).await.unwrap();
        assert_eq!(again, version);
        assert_eq!(backend.versions_for(doc.id).len(), 3);
    }

    #[tokio::test]
    async fn restore_of_unknown_version_propagates_not_found() {
        let backend = MemoryBackend::new(1);
        let missing = Uuid::new_v4();
        let error = store(&backend)
            .restore(missing, RestoreConfirmation::confirmed())
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            SessionError::Backend(BackendError::NotFound { kind: "version", .. })
        ));
    }

    #[tokio::test]
    async fn list_failure_propagates() {
        let backend = MemoryBackend::new(1);
        let doc = backend.seed_page("Doc", "");
        backend.set_offline(true);
        assert!(matches!(
            store(&backend).list(doc.id, 0, 10).await,
            Err(SessionError::Backend(BackendError::Network(_)))
        ));
    }
}

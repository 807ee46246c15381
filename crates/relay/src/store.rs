// In-memory document and version store backing the REST API.
//
// Documents are keyed by id. Versions are immutable once created and are
// listed newest first by creation order.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use folio_common::protocol::versions::CreateVersionRequest;
use folio_common::types::{Document, DocumentPatch, Page, UserId, Version, VersionSummary, ViewType};
use serde::Deserialize;
use tokio::sync::RwLock;
use uuid::Uuid;

const DEFAULT_TITLE_WIDTH: u32 = 240;

/// Body of `PUT /v1/documents/{id}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedDocument {
    #[serde(default)]
    pub workspace_id: Option<Uuid>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub view_type: ViewType,
    #[serde(default = "default_title_width")]
    pub title_width: u32,
    #[serde(default)]
    pub locked: bool,
}

fn default_title_width() -> u32 {
    DEFAULT_TITLE_WIDTH
}

impl SeedDocument {
    pub fn page(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            workspace_id: None,
            title: title.into(),
            content: Some(content.into()),
            view_type: ViewType::Page,
            title_width: DEFAULT_TITLE_WIDTH,
            locked: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    DocumentNotFound(Uuid),
    VersionNotFound(Uuid),
    Locked(Uuid),
    Invalid(String),
}

#[derive(Default)]
struct StoreInner {
    documents: HashMap<Uuid, Document>,
    versions: HashMap<Uuid, Version>,
    // Version ids per document in creation order.
    history: HashMap<Uuid, Vec<Uuid>>,
}

#[derive(Clone, Default)]
pub struct RelayStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl RelayStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Documents ──────────────────────────────────────────────────

    /// Create or replace a document. Existing version history is kept.
    pub async fn put_document(&self, id: Uuid, seed: SeedDocument, user: UserId) -> Document {
        let mut inner = self.inner.write().await;
        let existing = inner.documents.get(&id);
        let workspace_id = seed
            .workspace_id
            .or_else(|| existing.map(|doc| doc.workspace_id))
            .unwrap_or_else(Uuid::new_v4);
        let created_by = existing.map_or(user, |doc| doc.created_by);
        let document = Document {
            id,
            workspace_id,
            title: seed.title,
            content: seed.content,
            view_type: seed.view_type,
            title_width: seed.title_width,
            locked: seed.locked,
            created_by,
            updated_at: Utc::now(),
        };
        inner.documents.insert(id, document.clone());
        document
    }

    pub async fn get_document(&self, id: Uuid) -> Result<Document, StoreError> {
        self.inner.read().await.documents.get(&id).cloned().ok_or(StoreError::DocumentNotFound(id))
    }

    pub async fn update_document(
        &self,
        id: Uuid,
        patch: &DocumentPatch,
    ) -> Result<Document, StoreError> {
        let mut inner = self.inner.write().await;
        let document = inner.documents.get_mut(&id).ok_or(StoreError::DocumentNotFound(id))?;
        apply_patch(document, patch)?;
        Ok(document.clone())
    }

    // ── Versions ───────────────────────────────────────────────────

    pub async fn create_version(
        &self,
        document_id: Uuid,
        request: &CreateVersionRequest,
        user: UserId,
    ) -> Result<Version, StoreError> {
        let properties_snapshot = request
            .decode_properties()
            .map_err(|e| StoreError::Invalid(format!("propertiesJson: {e}")))?;
        let values_snapshot = request
            .decode_property_values()
            .map_err(|e| StoreError::Invalid(format!("propertyValuesJson: {e}")))?;

        let mut inner = self.inner.write().await;
        if !inner.documents.contains_key(&document_id) {
            return Err(StoreError::DocumentNotFound(document_id));
        }

        let version = Version {
            id: Uuid::new_v4(),
            document_id,
            title: request.title.clone(),
            content: request.content.clone(),
            view_type: request.view_type,
            title_width: request.title_width,
            properties_snapshot,
            values_snapshot,
            created_by: user,
            created_at: Utc::now(),
        };
        inner.history.entry(document_id).or_default().push(version.id);
        inner.versions.insert(version.id, version.clone());
        Ok(version)
    }

    /// Newest first.
    pub async fn list_versions(
        &self,
        document_id: Uuid,
        page: u32,
        size: u32,
    ) -> Result<Page<VersionSummary>, StoreError> {
        let inner = self.inner.read().await;
        if !inner.documents.contains_key(&document_id) {
            return Err(StoreError::DocumentNotFound(document_id));
        }
        let summaries = inner
            .history
            .get(&document_id)
            .into_iter()
            .flatten()
            .rev()
            .filter_map(|id| inner.versions.get(id))
            .map(Version::summary)
            .collect();
        Ok(Page::from_ordered(summaries, page, size))
    }

    pub async fn get_version(&self, id: Uuid) -> Result<Version, StoreError> {
        self.inner.read().await.versions.get(&id).cloned().ok_or(StoreError::VersionNotFound(id))
    }

    /// Write a version's title, content and layout back onto its document.
    /// The version itself is not modified.
    pub async fn restore_version(&self, id: Uuid) -> Result<Document, StoreError> {
        let mut inner = self.inner.write().await;
        let version = inner.versions.get(&id).cloned().ok_or(StoreError::VersionNotFound(id))?;
        let document = inner
            .documents
            .get_mut(&version.document_id)
            .ok_or(StoreError::DocumentNotFound(version.document_id))?;
        apply_patch(document, &version.restore_patch())?;
        document.title_width = version.title_width;
        document.view_type = version.view_type;
        Ok(document.clone())
    }
}

fn apply_patch(document: &mut Document, patch: &DocumentPatch) -> Result<(), StoreError> {
    if document.locked {
        return Err(StoreError::Locked(document.id));
    }
    if let Some(title) = &patch.title {
        document.title = title.clone();
    }
    if let Some(content) = &patch.content {
        document.content = Some(content.clone());
    }
    document.updated_at = Utc::now();
    Ok(())
}

// In-memory collaborator implementations.
//
// Backs local development and tests. Failures can be queued per call kind
// and every save and fetch is recorded so callers can assert on traffic.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use folio_common::protocol::versions::{CreateVersionRequest, ListVersionsQuery};
use folio_common::types::{
    Document, DocumentPatch, Page, PropertyMeta, PropertyValues, UserId, Version, VersionSummary,
    ViewType,
};
use uuid::Uuid;

use super::{
    AccessPolicy, BackendFuture, DocumentBackend, FetchOptions, PropertySource, VersionBackend,
};
use crate::error::BackendError;

#[derive(Default)]
struct MemoryState {
    documents: HashMap<Uuid, Document>,
    /// Creation order.
    versions: Vec<Version>,
    properties: HashMap<Uuid, (Vec<PropertyMeta>, PropertyValues)>,
    read_only_users: Vec<UserId>,
    update_failures: VecDeque<BackendError>,
    create_failures: VecDeque<BackendError>,
    offline: bool,
    update_latency: Duration,
    updates: Vec<(Uuid, DocumentPatch)>,
    fetches: Vec<(Uuid, FetchOptions)>,
}

/// Shared in-memory store. Clones see the same data.
#[derive(Clone)]
pub struct MemoryBackend {
    acting_user: UserId,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    /// `acting_user` is recorded as the creator of versions.
    pub fn new(acting_user: UserId) -> Self {
        Self { acting_user, state: Arc::new(Mutex::new(MemoryState::default())) }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Seeding ────────────────────────────────────────────────────

    /// Insert a page document and return it.
    pub fn seed_page(&self, title: &str, content: &str) -> Document {
        self.seed_document(title, Some(content), ViewType::Page)
    }

    pub fn seed_document(&self, title: &str, content: Option<&str>, view_type: ViewType) -> Document {
        let document = Document {
            id: Uuid::new_v4(),
            workspace_id: Uuid::nil(),
            title: title.to_string(),
            content: content.filter(|_| view_type.carries_content()).map(str::to_string),
            view_type,
            title_width: 240,
            locked: false,
            created_by: self.acting_user,
            updated_at: Utc::now(),
        };
        self.lock().documents.insert(document.id, document.clone());
        document
    }

    pub fn set_properties(
        &self,
        document_id: Uuid,
        properties: Vec<PropertyMeta>,
        values: PropertyValues,
    ) {
        self.lock().properties.insert(document_id, (properties, values));
    }

    pub fn set_locked(&self, document_id: Uuid, locked: bool) {
        if let Some(document) = self.lock().documents.get_mut(&document_id) {
            document.locked = locked;
        }
    }

    pub fn deny_writes_for(&self, user: UserId) {
        self.lock().read_only_users.push(user);
    }

    // ── Failure injection ──────────────────────────────────────────

    pub fn fail_next_update(&self, error: BackendError) {
        self.lock().update_failures.push_back(error);
    }

    pub fn fail_next_create(&self, error: BackendError) {
        self.lock().create_failures.push_back(error);
    }

    /// Every network call fails while offline.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Delay applied to each `update_document` call.
    pub fn set_update_latency(&self, latency: Duration) {
        self.lock().update_latency = latency;
    }

    // ── Inspection ─────────────────────────────────────────────────

    pub fn document(&self, document_id: Uuid) -> Option<Document> {
        self.lock().documents.get(&document_id).cloned()
    }

    pub fn updates(&self) -> Vec<(Uuid, DocumentPatch)> {
        self.lock().updates.clone()
    }

    pub fn updates_for(&self, document_id: Uuid) -> Vec<DocumentPatch> {
        self.lock()
            .updates
            .iter()
            .filter(|(id, _)| *id == document_id)
            .map(|(_, patch)| patch.clone())
            .collect()
    }

    pub fn fetches(&self) -> Vec<(Uuid, FetchOptions)> {
        self.lock().fetches.clone()
    }

    pub fn versions_for(&self, document_id: Uuid) -> Vec<Version> {
        self.lock().versions.iter().filter(|v| v.document_id == document_id).cloned().collect()
    }

    fn offline_error() -> BackendError {
        BackendError::Network("backend offline".into())
    }

    fn apply_update(&self, document_id: Uuid, patch: &DocumentPatch) -> Result<Document, BackendError> {
        let mut state = self.lock();
        if state.offline {
            return Err(Self::offline_error());
        }
        state.updates.push((document_id, patch.clone()));
        if let Some(error) = state.update_failures.pop_front() {
            return Err(error);
        }
        let document = state
            .documents
            .get_mut(&document_id)
            .ok_or_else(|| BackendError::document_not_found(document_id))?;
        if document.locked {
            return Err(BackendError::PermissionDenied("document is locked".into()));
        }
        apply_patch(document, patch);
        Ok(document.clone())
    }

    fn insert_version(
        &self,
        document_id: Uuid,
        request: &CreateVersionRequest,
    ) -> Result<Uuid, BackendError> {
        let properties_snapshot = request.decode_properties()?;
        let values_snapshot = request.decode_property_values()?;

        let mut state = self.lock();
        if state.offline {
            return Err(Self::offline_error());
        }
        if let Some(error) = state.create_failures.pop_front() {
            return Err(error);
        }
        if !state.documents.contains_key(&document_id) {
            return Err(BackendError::document_not_found(document_id));
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
            created_by: self.acting_user,
            created_at: Utc::now(),
        };
        let id = version.id;
        state.versions.push(version);
        Ok(id)
    }
}

fn apply_patch(document: &mut Document, patch: &DocumentPatch) {
    if let Some(title) = &patch.title {
        document.title = title.clone();
    }
    if let Some(content) = &patch.content {
        if document.view_type.carries_content() {
            document.content = Some(content.clone());
        }
    }
    document.updated_at = Utc::now();
}

impl DocumentBackend for MemoryBackend {
    fn update_document<'a>(
        &'a self,
        document_id: Uuid,
        patch: &'a DocumentPatch,
    ) -> BackendFuture<'a, Document> {
        Box::pin(async move {
            let latency = self.lock().update_latency;
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            self.apply_update(document_id, patch)
        })
    }

    fn fetch_document(
        &self,
        document_id: Uuid,
        options: FetchOptions,
    ) -> BackendFuture<'_, Document> {
        Box::pin(async move {
            let mut state = self.lock();
            if state.offline {
                return Err(Self::offline_error());
            }
            state.fetches.push((document_id, options));
            state
                .documents
                .get(&document_id)
                .cloned()
                .ok_or_else(|| BackendError::document_not_found(document_id))
        })
    }
}

impl VersionBackend for MemoryBackend {
    fn create_version<'a>(
        &'a self,
        document_id: Uuid,
        request: &'a CreateVersionRequest,
    ) -> BackendFuture<'a, Uuid> {
        Box::pin(async move { self.insert_version(document_id, request) })
    }

    fn list_versions(
        &self,
        document_id: Uuid,
        query: ListVersionsQuery,
    ) -> BackendFuture<'_, Page<VersionSummary>> {
        Box::pin(async move {
            let state = self.lock();
            if state.offline {
                return Err(Self::offline_error());
            }
            let newest_first: Vec<VersionSummary> = state
                .versions
                .iter()
                .rev()
                .filter(|v| v.document_id == document_id)
                .map(Version::summary)
                .collect();
            Ok(Page::from_ordered(newest_first, query.page, query.size))
        })
    }

    fn get_version(&self, version_id: Uuid) -> BackendFuture<'_, Version> {
        Box::pin(async move {
            let state = self.lock();
            if state.offline {
                return Err(Self::offline_error());
            }
            state
                .versions
                .iter()
                .find(|v| v.id == version_id)
                .cloned()
                .ok_or_else(|| BackendError::version_not_found(version_id))
        })
    }

    fn restore_version(&self, version_id: Uuid) -> BackendFuture<'_, Document> {
        Box::pin(async move {
            let mut state = self.lock();
            if state.offline {
                return Err(Self::offline_error());
            }
            let version = state
                .versions
                .iter()
                .find(|v| v.id == version_id)
                .cloned()
                .ok_or_else(|| BackendError::version_not_found(version_id))?;
            let document = state
                .documents
                .get_mut(&version.document_id)
                .ok_or_else(|| BackendError::document_not_found(version.document_id))?;
            if document.locked {
                return Err(BackendError::PermissionDenied("document is locked".into()));
            }
            apply_patch(document, &version.restore_patch());
            document.title_width = version.title_width;
            document.view_type = version.view_type;
            Ok(document.clone())
        })
    }
}

impl PropertySource for MemoryBackend {
    fn properties(&self, _workspace_id: Uuid, document_id: Uuid) -> Vec<PropertyMeta> {
        let state = self.lock();
        let mut properties =
            state.properties.get(&document_id).map(|(p, _)| p.clone()).unwrap_or_default();
        properties.sort_by_key(|p| p.position);
        properties
    }

    fn property_values(&self, _workspace_id: Uuid, document_id: Uuid) -> PropertyValues {
        self.lock().properties.get(&document_id).map(|(_, v)| v.clone()).unwrap_or_default()
    }
}

impl AccessPolicy for MemoryBackend {
    fn can_write(&self, _document: &Document, user: UserId) -> bool {
        !self.lock().read_only_users.contains(&user)
    }

    fn is_locked(&self, document: &Document) -> bool {
        self.lock().documents.get(&document.id).map(|d| d.locked).unwrap_or(document.locked)
    }
}

// Collaborator interfaces the engine consumes, plus in-memory and HTTP
// implementations.
//
// Persistence calls are the engine's only suspension points besides channel
// connect, so every network-backed method returns a boxed `Send` future.

pub mod http;
pub mod memory;

use std::{future::Future, pin::Pin};

use folio_common::protocol::versions::{CreateVersionRequest, ListVersionsQuery};
use folio_common::types::{
    Document, DocumentPatch, Page, PropertyMeta, PropertyValues, UserId, Version, VersionSummary,
};
use uuid::Uuid;

use crate::error::BackendError;

pub use http::HttpBackend;
pub use memory::MemoryBackend;

pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BackendError>> + Send + 'a>>;

/// Options for re-fetching a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetchOptions {
    /// Background refresh; the caller shows no loading state.
    pub silent: bool,
    /// Replace the session's editable state with the fetched document.
    pub apply: bool,
}

impl FetchOptions {
    pub const fn load() -> Self {
        Self { silent: false, apply: true }
    }

    pub const fn silent_apply() -> Self {
        Self { silent: true, apply: true }
    }
}

/// Current-document persistence (`updateDocument`, `fetchDocument`).
pub trait DocumentBackend: Send + Sync {
    fn update_document<'a>(
        &'a self,
        document_id: Uuid,
        patch: &'a DocumentPatch,
    ) -> BackendFuture<'a, Document>;

    fn fetch_document(&self, document_id: Uuid, options: FetchOptions)
        -> BackendFuture<'_, Document>;
}

/// Version record persistence.
pub trait VersionBackend: Send + Sync {
    fn create_version<'a>(
        &'a self,
        document_id: Uuid,
        request: &'a CreateVersionRequest,
    ) -> BackendFuture<'a, Uuid>;

    /// Newest first.
    fn list_versions(
        &self,
        document_id: Uuid,
        query: ListVersionsQuery,
    ) -> BackendFuture<'_, Page<VersionSummary>>;

    fn get_version(&self, version_id: Uuid) -> BackendFuture<'_, Version>;

    /// Write the version's title and content back to its document.
    fn restore_version(&self, version_id: Uuid) -> BackendFuture<'_, Document>;
}

/// Property schema and values owned by the table layer. Reads are local and
/// synchronous.
pub trait PropertySource: Send + Sync {
    fn properties(&self, workspace_id: Uuid, document_id: Uuid) -> Vec<PropertyMeta>;

    fn property_values(&self, workspace_id: Uuid, document_id: Uuid) -> PropertyValues;
}

/// Write-permission guard (`canWrite`, `isLocked`).
pub trait AccessPolicy: Send + Sync {
    fn can_write(&self, document: &Document, user: UserId) -> bool;

    fn is_locked(&self, document: &Document) -> bool;
}

/// Everyone may write; lock state comes from the document itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentLockPolicy;

impl AccessPolicy for DocumentLockPolicy {
    fn can_write(&self, _document: &Document, _user: UserId) -> bool {
        true
    }

    fn is_locked(&self, document: &Document) -> bool {
        document.locked
    }
}

/// Property source for documents without a table layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProperties;

impl PropertySource for NoProperties {
    fn properties(&self, _workspace_id: Uuid, _document_id: Uuid) -> Vec<PropertyMeta> {
        Vec::new()
    }

    fn property_values(&self, _workspace_id: Uuid, _document_id: Uuid) -> PropertyValues {
        PropertyValues::new()
    }
}

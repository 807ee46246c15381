// Core domain types shared across all Folio crates.
//
// Field names serialize in camelCase because the persistence endpoints and
// the edit channel speak the editor's JSON contract.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of an editing user. Compared against `EditMessage::sender_id`
/// for echo suppression.
pub type UserId = i64;

/// Property values keyed by property id.
pub type PropertyValues = BTreeMap<Uuid, serde_json::Value>;

/// How a document is presented. Only page documents carry body content.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ViewType {
    #[default]
    Page,
    Table,
    Board,
}

impl ViewType {
    pub const fn carries_content(self) -> bool {
        matches!(self, Self::Page)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Table => "table",
            Self::Board => "board",
        }
    }
}

/// The live `{title, content}` pair of an open document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct EditableState {
    pub title: String,
    pub content: String,
}

impl EditableState {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self { title: title.into(), content: content.into() }
    }
}

/// Current server-side state of a document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub title: String,
    /// Body text; `None` for non-page documents.
    pub content: Option<String>,
    pub view_type: ViewType,
    pub title_width: u32,
    #[serde(default)]
    pub locked: bool,
    pub created_by: UserId,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn editable_state(&self) -> EditableState {
        EditableState {
            title: self.title.clone(),
            content: self.content.clone().unwrap_or_default(),
        }
    }
}

/// Partial update of a document's editable fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DocumentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl DocumentPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none()
    }
}

impl From<EditableState> for DocumentPatch {
    fn from(state: EditableState) -> Self {
        Self { title: Some(state.title), content: Some(state.content) }
    }
}

/// A transient in-progress edit exchanged between viewers of one document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EditMessage {
    pub document_id: Uuid,
    pub sender_id: UserId,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

impl EditMessage {
    pub fn new(document_id: Uuid, sender_id: UserId, content: impl Into<String>) -> Self {
        Self { document_id, sender_id, content: content.into(), sent_at: Utc::now() }
    }
}

/// Metadata of one document property (column) as owned by the table layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PropertyMeta {
    pub id: Uuid,
    pub name: String,
    /// Opaque property kind (`text`, `number`, `select`, ...).
    pub kind: String,
    pub position: u32,
}

/// Immutable point-in-time copy of a document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub id: Uuid,
    pub document_id: Uuid,
    pub title: String,
    /// Present only for page documents.
    pub content: Option<String>,
    pub view_type: ViewType,
    pub title_width: u32,
    pub properties_snapshot: Vec<PropertyMeta>,
    pub values_snapshot: PropertyValues,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl Version {
    pub fn summary(&self) -> VersionSummary {
        VersionSummary {
            id: self.id,
            title: self.title.clone(),
            created_by: self.created_by,
            created_at: self.created_at,
        }
    }

    /// The editable fields a restore writes back to the document.
    pub fn restore_patch(&self) -> DocumentPatch {
        DocumentPatch { title: Some(self.title.clone()), content: self.content.clone() }
    }
}

/// Listing row for a version; carries no content payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VersionSummary {
    pub id: Uuid,
    pub title: String,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

/// Zero-based page of results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_elements: u64,
    pub total_pages: u32,
}

impl<T> Page<T> {
    /// Slice an already-ordered collection into the requested page.
    pub fn from_ordered(items: Vec<T>, page: u32, size: u32) -> Self {
        let total_elements = items.len() as u64;
        let total_pages = if size == 0 { 0 } else { total_elements.div_ceil(size as u64) as u32 };
        let start = (page as usize).saturating_mul(size as usize);
        let content = items.into_iter().skip(start).take(size as usize).collect();
        Self { content, page, size, total_elements, total_pages }
    }

    pub fn is_last(&self) -> bool {
        self.page.saturating_add(1) >= self.total_pages
    }
}

// Request and response bodies of the version endpoints.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{PropertyMeta, PropertyValues, ViewType};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Body of `POST /v1/documents/{id}/versions`.
///
/// Property metadata and values travel as pre-serialized JSON strings so the
/// server stores them exactly as captured.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateVersionRequest {
    pub title: String,
    pub view_type: ViewType,
    pub title_width: u32,
    pub content: Option<String>,
    pub properties_json: String,
    pub property_values_json: String,
}

impl CreateVersionRequest {
    pub fn decode_properties(&self) -> Result<Vec<PropertyMeta>, serde_json::Error> {
        serde_json::from_str(&self.properties_json)
    }

    pub fn decode_property_values(&self) -> Result<PropertyValues, serde_json::Error> {
        serde_json::from_str(&self.property_values_json)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateVersionResponse {
    pub id: Uuid,
}

/// Query of `GET /v1/documents/{id}/versions`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListVersionsQuery {
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub size: u32,
}

impl Default for ListVersionsQuery {
    fn default() -> Self {
        Self { page: 0, size: DEFAULT_PAGE_SIZE }
    }
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

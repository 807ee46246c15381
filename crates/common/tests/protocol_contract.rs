use folio_common::protocol::channel::{decode_frame, encode_frame, ChannelFrame};
use folio_common::protocol::versions::{
    CreateVersionRequest, ListVersionsQuery, DEFAULT_PAGE_SIZE,
};
use folio_common::types::{EditMessage, Page, ViewType, VersionSummary};
use serde_json::json;
use uuid::Uuid;

#[test]
fn edit_frame_carries_content_and_sender_id() {
    let document_id = Uuid::new_v4();
    let frame = ChannelFrame::Edit(EditMessage::new(document_id, 5, "Hello World"));
    let value: serde_json::Value =
        serde_json::from_str(&encode_frame(&frame).expect("frame should encode"))
            .expect("frame should be JSON");

    assert_eq!(value["type"], "edit");
    assert_eq!(value["content"], "Hello World");
    assert_eq!(value["senderId"], 5);
    assert_eq!(value["documentId"], document_id.to_string());
}

#[test]
fn subscribe_frame_decodes_from_client_json() {
    let document_id = Uuid::new_v4();
    let raw = json!({ "type": "subscribe", "documentId": document_id }).to_string();
    let frame = decode_frame(&raw).expect("subscribe should decode");
    assert_eq!(frame, ChannelFrame::Subscribe { document_id });
}

#[test]
fn unknown_frame_type_is_rejected() {
    let raw = json!({ "type": "ack", "documentId": Uuid::nil() }).to_string();
    assert!(decode_frame(&raw).is_err());
}

#[test]
fn create_version_request_matches_endpoint_shape() {
    let request = CreateVersionRequest {
        title: "Launch plan".into(),
        view_type: ViewType::Page,
        title_width: 320,
        content: None,
        properties_json: "[]".into(),
        property_values_json: "{}".into(),
    };
    let value = serde_json::to_value(&request).expect("request should serialize");

    assert_eq!(value["title"], "Launch plan");
    assert_eq!(value["viewType"], "page");
    assert_eq!(value["titleWidth"], 320);
    assert!(value["content"].is_null());
    assert_eq!(value["propertiesJson"], "[]");
    assert_eq!(value["propertyValuesJson"], "{}");
    assert!(request.decode_properties().expect("properties decode").is_empty());
    assert!(request.decode_property_values().expect("values decode").is_empty());
}

#[test]
fn list_query_defaults_page_and_size() {
    let query: ListVersionsQuery = serde_json::from_value(json!({})).expect("empty query");
    assert_eq!(query.page, 0);
    assert_eq!(query.size, DEFAULT_PAGE_SIZE);
}

#[test]
fn version_page_serializes_paginated_envelope() {
    let page = Page::from_ordered(
        vec![VersionSummary {
            id: Uuid::nil(),
            title: "v1".into(),
            created_by: 7,
            created_at: chrono::Utc::now(),
        }],
        0,
        50,
    );
    let value = serde_json::to_value(&page).expect("page should serialize");

    assert_eq!(value["content"][0]["title"], "v1");
    assert_eq!(value["content"][0]["createdBy"], 7);
    assert!(value["content"][0].get("content").is_none());
    assert_eq!(value["totalElements"], 1);
    assert_eq!(value["totalPages"], 1);
}

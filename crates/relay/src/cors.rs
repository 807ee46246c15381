// Browser access to the document API and the edit channel.

use std::time::Duration;

use axum::http::{header, HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

const LOCAL_ORIGINS: &str = "http://localhost:5173,http://127.0.0.1:5173";

/// `origins` is the `FOLIO_RELAY_CORS_ORIGINS` value: `*` or a
/// comma-separated list. Unset means the local dev server only.
pub fn cors_layer(origins: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static("x-folio-user-id"),
            HeaderName::from_static("x-request-id"),
        ])
        .expose_headers([HeaderName::from_static("x-request-id")])
        .max_age(Duration::from_secs(600));

    match origins.map(str::trim) {
        Some("*") => layer.allow_origin(AllowOrigin::any()),
        Some(list) => layer.allow_origin(origin_list(list)),
        None => layer.allow_origin(origin_list(LOCAL_ORIGINS)),
    }
}

fn origin_list(list: &str) -> Vec<HeaderValue> {
    list.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect()
}

// folio-relay: reference server for the document, version and edit channel
// interfaces the engine talks to.

pub mod api;
pub mod channel;
pub mod config;
pub mod cors;
pub mod error;
pub mod store;

use std::{future::Future, sync::Arc, time::Instant};

use anyhow::Context;
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tracing::{error, info};
use uuid::Uuid;

use crate::channel::{channel_upgrade, ChannelHub, CHANNEL_PATH};
use crate::error::{attach_request_id_header, with_request_id_scope, REQUEST_ID_HEADER};
use crate::store::RelayStore;

pub use crate::config::RelayConfig;

const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// Shared handler state.
#[derive(Clone)]
pub struct RelayState {
    pub store: RelayStore,
    pub hub: Arc<ChannelHub>,
}

impl RelayState {
    pub fn new(channel_capacity: usize) -> Self {
        Self { store: RelayStore::new(), hub: Arc::new(ChannelHub::new(channel_capacity)) }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.channel_capacity)
    }
}

pub fn build_router(state: RelayState, cors_origins: Option<&str>) -> Router {
    apply_middleware(
        Router::new()
            .route("/healthz", get(healthz))
            .route(CHANNEL_PATH, get(channel_upgrade))
            .merge(api::router())
            .with_state(state),
    )
    .layer(cors::cors_layer(cors_origins))
}

fn apply_middleware(router: Router) -> Router {
    router
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(middleware::from_fn(request_context_middleware))
        .layer(middleware::from_fn(panic_handler))
}

/// Serve `app` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr().context("relay listener has no local address")?;
    info!(listen_addr = %addr, "starting relay server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("relay server exited unexpectedly")?;

    info!("relay server stopped");
    Ok(())
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn panic_handler(request: Request<Body>, next: Next) -> Response {
    match tokio::spawn(async move { next.run(request).await }).await {
        Ok(response) => response,
        Err(join_error) => {
            error!(?join_error, "request handling panicked");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn request_context_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started_at = Instant::now();

    let mut response = with_request_id_scope(request_id.clone(), next.run(request)).await;
    attach_request_id_header(&mut response, &request_id);

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started_at.elapsed().as_millis() as u64,
        "request completed"
    );

    response
}

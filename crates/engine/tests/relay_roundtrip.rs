// Engine against a live relay: HTTP backend, WebSocket transport and two
// sessions editing the same document.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use folio_common::protocol::versions::{CreateVersionRequest, ListVersionsQuery};
use folio_common::types::{DocumentPatch, EditMessage, UserId, ViewType};
use folio_engine::backend::{
    DocumentBackend, DocumentLockPolicy, FetchOptions, HttpBackend, NoProperties, VersionBackend,
};
use folio_engine::channel::{channel_url, EditTransport, WsTransport};
use folio_engine::{
    BackendError, Collaborators, RestoreConfirmation, SaveStatus, SessionHandle, SessionRuntime,
    SessionSettings,
};
use folio_relay::store::SeedDocument;
use folio_relay::{build_router, serve, RelayState};
use tokio::net::TcpListener;
use uuid::Uuid;

struct Relay {
    base_url: String,
    state: RelayState,
}

async fn start_relay() -> Relay {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind relay");
    let addr: SocketAddr = listener.local_addr().expect("relay addr");
    let state = RelayState::new(64);
    let app = build_router(state.clone(), None);
    tokio::spawn(serve(listener, app, std::future::pending()));
    Relay { base_url: format!("http://{addr}"), state }
}

impl Relay {
    async fn seed(&self, title: &str, content: &str, locked: bool) -> Uuid {
        let id = Uuid::new_v4();
        let mut seed = SeedDocument::page(title, content);
        seed.locked = locked;
        self.state.store.put_document(id, seed, 1).await;
        id
    }

    async fn session(&self, user_id: UserId) -> SessionHandle {
        let backend = Arc::new(HttpBackend::new(&self.base_url, user_id).expect("backend"));
        let url = channel_url(&self.base_url).expect("channel url");
        let transport = WsTransport::connect(url.as_str()).await.expect("channel connect");
        let collaborators = Collaborators {
            documents: backend.clone(),
            versions: backend,
            properties: Arc::new(NoProperties),
            access: Arc::new(DocumentLockPolicy),
            transport: Arc::new(transport),
        };
        let settings = SessionSettings {
            user_id,
            debounce: Duration::from_millis(300),
            snapshot_interval: Duration::from_secs(600),
        };
        SessionRuntime::spawn(settings, collaborators)
    }
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within 2s");
}

fn request(title: &str, content: &str) -> CreateVersionRequest {
    CreateVersionRequest {
        title: title.to_string(),
        view_type: ViewType::Page,
        title_width: 240,
        content: Some(content.to_string()),
        properties_json: "[]".to_string(),
        property_values_json: "{}".to_string(),
    }
}

// ── HTTP backend ───────────────────────────────────────────────────

#[tokio::test]
async fn http_backend_reads_and_updates_documents() {
    let relay = start_relay().await;
    let id = relay.seed("Notes", "hello", false).await;
    let backend = HttpBackend::new(&relay.base_url, 5).unwrap();

    let document = backend.fetch_document(id, FetchOptions::load()).await.unwrap();
    assert_eq!(document.title, "Notes");
    assert_eq!(document.content.as_deref(), Some("hello"));

    let patch = DocumentPatch { title: None, content: Some("hello world".into()) };
    let updated = backend.update_document(id, &patch).await.unwrap();
    assert_eq!(updated.content.as_deref(), Some("hello world"));
    let stored = relay.state.store.get_document(id).await.unwrap();
    assert_eq!(stored.content.as_deref(), Some("hello world"));
}

#[tokio::test]
async fn http_backend_types_relay_errors() {
    let relay = start_relay().await;
    let locked = relay.seed("Locked", "", true).await;
    let backend = HttpBackend::new(&relay.base_url, 5).unwrap();

    let missing = Uuid::new_v4();
    let error = backend.fetch_document(missing, FetchOptions::load()).await.unwrap_err();
    assert_eq!(error, BackendError::document_not_found(missing));

    let patch = DocumentPatch { title: Some("New".into()), content: None };
    let error = backend.update_document(locked, &patch).await.unwrap_err();
    assert!(error.is_permission_denied(), "got {error:?}");

    let error = backend.get_version(missing).await.unwrap_err();
    assert_eq!(error, BackendError::version_not_found(missing));
}

#[tokio::test]
async fn http_backend_version_lifecycle() {
    let relay = start_relay().await;
    let id = relay.seed("Start", "", false).await;
    let backend = HttpBackend::new(&relay.base_url, 5).unwrap();

    let mut ids = Vec::new();
    for (title, content) in [("First", "a"), ("Second", "b"), ("Third", "c")] {
        ids.push(backend.create_version(id, &request(title, content)).await.unwrap());
    }

    let page = backend.list_versions(id, ListVersionsQuery { page: 0, size: 2 }).await.unwrap();
    let titles: Vec<_> = page.content.iter().map(|v| v.title.as_str()).collect();
    assert_eq!(titles, ["Third", "Second"]);
    assert_eq!(page.total_elements, 3);
    assert_eq!(page.total_pages, 2);

    let version = backend.get_version(ids[0]).await.unwrap();
    assert_eq!(version.title, "First");
    assert_eq!(version.created_by, 5);

    let restored = backend.restore_version(ids[0]).await.unwrap();
    assert_eq!(restored.title, "First");
    assert_eq!(restored.content.as_deref(), Some("a"));
}

// ── WebSocket transport ────────────────────────────────────────────

#[tokio::test]
async fn ws_transport_delivers_published_edits_to_subscribers() {
    let relay = start_relay().await;
    let url = channel_url(&relay.base_url).unwrap();
    let a = WsTransport::connect(url.as_str()).await.unwrap();
    let b = WsTransport::connect(url.as_str()).await.unwrap();
    let doc = Uuid::new_v4();

    let mut a_rx = a.subscribe(doc).await.unwrap();
    let mut b_rx = b.subscribe(doc).await.unwrap();
    let message = EditMessage::new(doc, 5, "typed");
    a.publish(&message).await.unwrap();

    let timeout = Duration::from_secs(5);
    assert_eq!(tokio::time::timeout(timeout, b_rx.recv()).await.unwrap().unwrap(), message);
    // The relay echoes to the sender too; the session filters it.
    assert_eq!(tokio::time::timeout(timeout, a_rx.recv()).await.unwrap().unwrap(), message);
}

// ── Sessions ───────────────────────────────────────────────────────

#[tokio::test]
async fn two_sessions_share_edits_and_only_the_author_saves() {
    let relay = start_relay().await;
    let id = relay.seed("Shared", "", false).await;
    let author = relay.session(5).await;
    let reader = relay.session(7).await;
    author.open(id).await.unwrap();
    reader.open(id).await.unwrap();

    author.edit_content("from five").await.unwrap();

    eventually(|| {
        reader.view().state.map(|state| state.content == "from five").unwrap_or(false)
    })
    .await;
    // Debounced save lands on the relay.
    for _ in 0..100 {
        let stored = relay.state.store.get_document(id).await.unwrap();
        if stored.content.as_deref() == Some("from five") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let stored = relay.state.store.get_document(id).await.unwrap();
    assert_eq!(stored.content.as_deref(), Some("from five"));
    eventually(|| author.view().status == Some(SaveStatus::Saved)).await;
    assert_eq!(reader.view().status, Some(SaveStatus::Saved));

    author.shutdown().await;
    reader.shutdown().await;
}

#[tokio::test]
async fn session_snapshot_and_restore_through_the_relay() {
    let relay = start_relay().await;
    let id = relay.seed("Draft", "v1", false).await;
    let session = relay.session(5).await;
    session.open(id).await.unwrap();

    let first = session.snapshot_now().await.unwrap();
    session.edit_content("v2").await.unwrap();
    assert_eq!(session.save_now().await.unwrap(), SaveStatus::Saved);
    assert_eq!(relay.state.store.get_document(id).await.unwrap().content.as_deref(), Some("v2"));

    let restored = session.restore(first, RestoreConfirmation::confirmed()).await.unwrap();
    assert_eq!(restored.content, "v1");
    assert_eq!(relay.state.store.get_document(id).await.unwrap().content.as_deref(), Some("v1"));

    let history = session.list_versions(0, 20).await.unwrap();
    assert_eq!(history.content.len(), 1);
    assert_eq!(history.content[0].id, first);
    session.shutdown().await;
}

#[tokio::test]
async fn closing_a_session_flushes_pending_edits() {
    let relay = start_relay().await;
    let id = relay.seed("Doc", "", false).await;
    let session = relay.session(5).await;
    session.open(id).await.unwrap();

    session.edit_title("Renamed").await.unwrap();
    session.close().await.unwrap();

    let stored = relay.state.store.get_document(id).await.unwrap();
    assert_eq!(stored.title, "Renamed");
    eventually(|| session.view().document_id.is_none()).await;
    session.shutdown().await;
}

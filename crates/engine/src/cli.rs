// CLI subcommands.
//
// `folio open <document-id>` runs one session: every stdin line replaces
// the document content, lines starting with `:` are commands.

use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Subcommand};
use folio_common::types::UserId;
use folio_engine::backend::{DocumentLockPolicy, HttpBackend, NoProperties};
use folio_engine::channel::{channel_url, EditTransport, LocalHub, WsTransport};
use folio_engine::config::{EngineConfig, Profile};
use folio_engine::{
    Collaborators, RestoreConfirmation, SessionEvent, SessionHandle, SessionRuntime,
    SessionSettings,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Subcommand)]
pub enum Command {
    /// Open a document and edit it from stdin
    Open(OpenArgs),
    /// Print the resolved configuration
    Config,
}

#[derive(Debug, Args)]
pub struct OpenArgs {
    /// Document to open.
    pub document_id: Uuid,

    /// Local identity (overrides `user_id` in config).
    #[arg(long)]
    user_id: Option<UserId>,

    /// Relay base URL (overrides `relay_url` in config).
    #[arg(long)]
    relay: Option<String>,

    /// Use the development snapshot interval.
    #[arg(long)]
    dev: bool,
}

pub async fn run(command: Command, config: EngineConfig) -> anyhow::Result<()> {
    match command {
        Command::Open(args) => open(args, config).await,
        Command::Config => {
            print!("{}", toml::to_string_pretty(&config).context("failed to render config")?);
            Ok(())
        }
    }
}

// ── Input ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Content(String),
    Title(String),
    Save,
    Snapshot,
    Versions,
    Restore(Uuid),
    Switch(Uuid),
    Quit,
}

fn parse_input(line: &str) -> Result<Input, String> {
    let Some(command) = line.strip_prefix(':') else {
        return Ok(Input::Content(line.to_string()));
    };
    let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
    let rest = rest.trim();
    let id = || Uuid::parse_str(rest).map_err(|e| format!("invalid id `{rest}`: {e}"));
    match name {
        "title" => Ok(Input::Title(rest.to_string())),
        "save" => Ok(Input::Save),
        "snapshot" => Ok(Input::Snapshot),
        "versions" => Ok(Input::Versions),
        "restore" => id().map(Input::Restore),
        "switch" => id().map(Input::Switch),
        "quit" | "q" => Ok(Input::Quit),
        // `::text` edits content starting with a colon.
        _ if command.starts_with(':') => Ok(Input::Content(command.to_string())),
        other => Err(format!("unknown command :{other}")),
    }
}

// ── open ───────────────────────────────────────────────────────────

async fn open(args: OpenArgs, mut config: EngineConfig) -> anyhow::Result<()> {
    if let Some(user_id) = args.user_id {
        config.user_id = user_id;
    }
    if let Some(relay) = args.relay {
        config.relay_url = relay;
    }
    if args.dev {
        config.profile = Profile::Development;
    }

    let backend = Arc::new(
        HttpBackend::new(&config.relay_url, config.user_id).context("invalid relay url")?,
    );
    let transport = connect_transport(&config.relay_url).await;
    let collaborators = Collaborators {
        documents: backend.clone(),
        versions: backend,
        properties: Arc::new(NoProperties),
        access: Arc::new(DocumentLockPolicy),
        transport,
    };

    let session = SessionRuntime::spawn(SessionSettings::from_config(&config), collaborators);
    let printer = tokio::spawn(print_events(session.events()));

    let result = edit_loop(&session, args.document_id).await;
    session.shutdown().await;
    printer.abort();
    result
}

async fn connect_transport(relay_url: &str) -> Arc<dyn EditTransport> {
    let connected = match channel_url(relay_url) {
        Ok(url) => WsTransport::connect(url.as_str()).await,
        Err(error) => Err(error),
    };
    match connected {
        Ok(transport) => Arc::new(transport),
        Err(error) => {
            warn!(error = %error, "edit channel unavailable, continuing without live edits");
            Arc::new(LocalHub::default())
        }
    }
}

async fn edit_loop(session: &SessionHandle, document_id: Uuid) -> anyhow::Result<()> {
    let state = session.open(document_id).await.context("failed to open document")?;
    println!("opened {document_id}: {} ({} chars)", state.title, state.content.len());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending_restore: Option<Uuid> = None;

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        if let Some(version_id) = pending_restore.take() {
            if line.trim().eq_ignore_ascii_case("yes") {
                match session.restore(version_id, RestoreConfirmation::confirmed()).await {
                    Ok(state) => println!("restored: {} ({} chars)", state.title, state.content.len()),
                    Err(error) => println!("restore failed: {error}"),
                }
            } else {
                println!("restore cancelled");
            }
            continue;
        }

        let input = match parse_input(&line) {
            Ok(input) => input,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };
        let outcome = match input {
            Input::Content(content) => session.edit_content(content).await.map(|_| ()),
            Input::Title(title) => session.edit_title(title).await,
            Input::Save => session.save_now().await.map(|status| println!("status: {status}")),
            Input::Snapshot => {
                session.snapshot_now().await.map(|id| println!("snapshot {id}"))
            }
            Input::Versions => session.list_versions(0, 20).await.map(|page| {
                for summary in &page.content {
                    println!(
                        "{}  {}  {}  by {}",
                        summary.id, summary.created_at, summary.title, summary.created_by
                    );
                }
                println!("{} of {} versions", page.content.len(), page.total_elements);
            }),
            Input::Restore(version_id) => {
                println!("restoring discards unsaved edits; type `yes` to confirm");
                pending_restore = Some(version_id);
                Ok(())
            }
            Input::Switch(next) => session
                .switch_document(next)
                .await
                .map(|state| println!("opened {next}: {}", state.title)),
            Input::Quit => break,
        };
        if let Err(error) = outcome {
            println!("error: {error}");
        }
    }

    info!("closing session");
    Ok(())
}

async fn print_events(mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::StatusChanged { status, .. }) => println!("[{status}]"),
            Ok(SessionEvent::RemoteEdit { sender_id, content, .. }) => {
                println!("<{sender_id}> {content}");
            }
            Ok(SessionEvent::SnapshotCreated { version_id, .. }) => {
                println!("[snapshot {version_id}]");
            }
            Ok(SessionEvent::SnapshotFailed { error, .. }) => println!("[snapshot failed: {error}]"),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

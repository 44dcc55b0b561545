//! Intake console host: drives a text-only session against a live backend.
//!
//! Reads turns from stdin, prints the conversation to stdout, and logs to
//! stderr. Voice needs a host with media devices and is not wired here.

use intake_bridge::{config, Conversation, HttpBackend, SessionBridge, UploadFile};
use intake_db::{DbRuntimeSettings, SqliteSessionStore};
use intake_types::{AttachmentKind, Message, Role};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

const HELP: &str = "\
commands:
  /new                    start a new session
  /retry                  retry restoring the current session
  /dismiss                hide the connection banner
  /upload <kind> <path>   upload a file (photo_id, proof_of_address, selfie, document)
  /witness-done           report the witnessed signature as complete
  /status                 show session details
  /quit                   exit
anything else is sent as a message";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Say(String),
    New,
    Retry,
    Dismiss,
    Upload { kind: AttachmentKind, path: String },
    WitnessDone,
    Status,
    Help,
    Quit,
    Invalid(String),
}

impl Command {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Self::Say(line.to_string());
        };
        let mut parts = rest.splitn(3, char::is_whitespace);
        match parts.next().unwrap_or_default() {
            "new" => Self::New,
            "retry" => Self::Retry,
            "dismiss" => Self::Dismiss,
            "witness-done" => Self::WitnessDone,
            "status" => Self::Status,
            "help" => Self::Help,
            "quit" | "exit" => Self::Quit,
            "upload" => match (parts.next(), parts.next().map(str::trim)) {
                (Some(kind), Some(path)) if !path.is_empty() => Self::Upload {
                    kind: AttachmentKind::from(kind),
                    path: path.to_string(),
                },
                _ => Self::Invalid("usage: /upload <kind> <path>".to_string()),
            },
            other => Self::Invalid(format!("unknown command: /{other}")),
        }
    }
}

/// Prints only what changed since the last render.
#[derive(Default)]
struct Printer {
    last: Option<Conversation>,
}

impl Printer {
    /// Messages not printed yet. The flag is set when the transcript no
    /// longer extends what was printed, so all of it is new.
    fn unseen<'a>(&self, messages: &'a [Message]) -> (bool, &'a [Message]) {
        let printed = self
            .last
            .as_ref()
            .map_or(&[][..], |last| last.messages.as_slice());
        if messages.starts_with(printed) {
            (false, &messages[printed.len()..])
        } else {
            (true, messages)
        }
    }

    fn render(&mut self, conversation: &Conversation) {
        let (reset, unseen) = self.unseen(&conversation.messages);
        if reset {
            println!("--- conversation reset ---");
        }
        for message in unseen {
            let who = match message.role {
                Role::User => "you",
                Role::Agent => "agent",
            };
            println!("{who}> {}", message.text);
        }

        let previous = self.last.as_ref();
        let banner = conversation.banner();
        if banner != previous.and_then(Conversation::banner) {
            if let Some(banner) = &banner {
                println!("[!] {} (/retry or /new)", banner.message);
            }
        }
        let prompts = conversation.upload_prompts();
        let prompts_changed = Some(&prompts) != previous.map(Conversation::upload_prompts).as_ref();
        if prompts_changed && !prompts.is_empty() {
            let kinds: Vec<&str> = prompts.iter().map(AttachmentKind::as_str).collect();
            println!("[upload requested: {}]", kinds.join(", "));
        }
        let frame = conversation.witness_frame();
        if frame != previous.and_then(Conversation::witness_frame) {
            match &frame {
                Some(frame) => println!(
                    "[witness session open for case {}; type /witness-done when signed]",
                    frame.case_id
                ),
                None if previous.is_some() => println!("[witness session closed]"),
                None => {}
            }
        }
        self.last = Some(conversation.clone());
    }
}

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("INTAKE_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("intake.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration; the host cannot start without valid config");

    // Initialize tracing on stderr so stdout carries only the conversation
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    // Initialize the session store
    let pool = intake_db::create_pool(
        &config.storage.path,
        DbRuntimeSettings {
            busy_timeout_ms: config.storage.busy_timeout_ms,
            ..DbRuntimeSettings::default()
        },
    )
    .expect("failed to create database pool; check storage.path in config");

    {
        let conn = pool
            .get()
            .expect("failed to get database connection for migrations");
        let applied = intake_db::run_migrations(&conn).expect("failed to run database migrations");
        if applied > 0 {
            tracing::info!(count = applied, "applied database migrations");
        }
    }

    let backend = HttpBackend::new(&config.backend.base_url, config.backend.request_timeout())
        .expect("failed to build backend client; check backend.base_url in config");

    let bridge = SessionBridge::new(
        Arc::new(backend),
        Arc::new(SqliteSessionStore::new(pool)),
        config.bridge.clone(),
    );

    tracing::info!(backend = %config.backend.base_url, "starting intake console host");

    if let Err(error) = bridge.open().await {
        tracing::warn!(%error, "session restore failed");
    }

    let mut printer = Printer::default();
    printer.render(&bridge.snapshot());
    println!("type /help for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            () = &mut shutdown => break,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => {
                tracing::error!(%error, "failed to read stdin");
                break;
            }
        };

        match Command::parse(&line) {
            Command::Say(text) => {
                bridge.set_draft(text);
                bridge.send_draft().await;
            }
            Command::New => {
                if let Err(error) = bridge.start_new_session() {
                    tracing::warn!(%error, "failed to clear persisted session");
                }
            }
            Command::Retry => {
                if let Err(error) = bridge.retry().await {
                    tracing::warn!(%error, "retry failed");
                }
            }
            Command::Dismiss => bridge.dismiss_issue(),
            Command::Upload { kind, path } => match UploadFile::from_path(&path).await {
                Ok(file) => {
                    if let Err(error) = bridge.upload_and_send(file, kind).await {
                        println!("upload failed: {error}");
                    }
                }
                Err(error) => println!("cannot read {path}: {error}"),
            },
            Command::WitnessDone => {
                bridge
                    .handle_frame_message(r#"{"type":"witness:completed"}"#)
                    .await;
            }
            Command::Status => {
                let snapshot = bridge.snapshot();
                println!(
                    "session: {}  issue: {}  next: {}  followups: {}",
                    snapshot.session_id.as_deref().unwrap_or("<none>"),
                    snapshot.connection_issue,
                    snapshot.next.as_deref().unwrap_or("-"),
                    snapshot.followups.len()
                );
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
            Command::Invalid(message) => println!("{message}"),
        }

        printer.render(&bridge.snapshot());
    }

    tracing::info!("intake console host shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, shutting down"); }
        () = terminate => { tracing::info!("received SIGTERM, shutting down"); }
    }
}

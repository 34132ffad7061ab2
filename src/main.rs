#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::doc_markdown, clippy::uninlined_format_args)]

use anyhow::Result;
use clap::Parser;
use postbox::config::Config;
use postbox::gateway::{self, AppState};
use postbox::relay::{Blacklist, CorrelationStore, RelayRouter, RelaySettings};
use postbox::scheduler::TaskScheduler;
use postbox::storage::{KvStore, SqliteKv};
use postbox::telegram::{BotApi, TelegramClient};
use std::path::Path;
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Anonymous message relay bot for Telegram.
#[derive(Parser, Debug)]
#[command(name = "postbox")]
#[command(version)]
#[command(about = "Relays messages from strangers to one owner, anonymously.", long_about = None)]
struct Cli {
    /// Host to bind; defaults to HOST or 0.0.0.0
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on; defaults to PORT or 8080
    #[arg(short, long)]
    port: Option<u16>,

    /// SQLite database path; defaults to DATABASE_PATH or postbox.db
    #[arg(long)]
    db: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Respects RUST_LOG, defaults to INFO.
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let host = cli.host.unwrap_or_else(|| config.host.clone());
    let port = cli.port.unwrap_or(config.port);
    let db_path = cli.db.unwrap_or_else(|| config.db_path.clone());

    let kv: Arc<dyn KvStore> = Arc::new(SqliteKv::open(Path::new(&db_path))?);
    let api: Arc<dyn BotApi> = Arc::new(
        TelegramClient::new(config.bot_token.clone()).with_api_base(config.api_base.clone()),
    );

    let scheduler = TaskScheduler::new(kv.clone(), api.clone());
    let restored = scheduler.restore()?;
    if restored > 0 {
        info!("Re-armed {restored} deferred tasks from a previous run");
    }

    let router = RelayRouter::new(
        api,
        CorrelationStore::new(kv.clone(), config.relay_ttl, config.relay_max_entries),
        Blacklist::new(kv),
        scheduler,
        RelaySettings {
            owner_id: config.owner_id,
            bot_id: config.bot_id,
            welcome_text: config.welcome_text.clone(),
            notice_delete_delay: config.notice_delete_delay,
        },
    );

    let state = AppState {
        router: Arc::new(router),
        secret_token: config.webhook_secret.as_deref().map(Arc::from),
        tracker: TaskTracker::new(),
    };

    info!(
        "Starting postbox for owner {} (bot id {})",
        config.owner_id, config.bot_id
    );
    gateway::run_gateway(&host, port, state).await
}

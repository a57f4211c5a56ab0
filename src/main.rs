mod api;
mod app;
mod cache;
mod commands;
mod config;
mod db;
mod debounce;
mod error;
mod event;
mod mutation;
mod prefs;
mod query;
mod roles;
mod session;
mod storage;
mod theme;
mod ui;

use clap::Parser;
use color_eyre::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::api::{CachedTicketApi, TicketApi};
use crate::cache::{CacheLayer, QueryCache};
use crate::config::{Config, API_URL_ENV};
use crate::mutation::OptimisticUpdater;
use crate::prefs::Preferences;
use crate::roles::Role;
use crate::session::{ApiClient, StorageWatcher, TokenStore};
use crate::storage::{DurableStorage, MemoryStorage, SqliteStorage};

const LOG_ENV: &str = "TICKETDESK_LOG";

#[derive(Parser, Debug)]
#[command(name = "ticketdesk")]
#[command(about = "A terminal UI for support-ticket desks")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./ticketdesk.yaml, then $XDG_CONFIG_HOME/ticketdesk/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Backend base URL, e.g. https://desk.example.com
  #[arg(long)]
  api_url: Option<String>,

  /// Role to act as when the account holds several (user, support, manager)
  #[arg(short, long)]
  role: Option<String>,
}

/// Log to a daily file; the terminal belongs to the UI.
fn init_logging(dir: &Path) -> WorkerGuard {
  let appender = tracing_appender::rolling::daily(dir, "ticketdesk.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);
  let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();
  guard
}

fn open_storage(config: &Config) -> Result<Arc<dyn DurableStorage>> {
  let base_url = config.base_url()?;
  let storage: Arc<dyn DurableStorage> = match Config::storage_path()
    .and_then(|path| SqliteStorage::open(&path, &base_url))
  {
    Ok(storage) => Arc::new(storage),
    Err(e) => {
      warn!(error = %e, "Durable storage unavailable, session will not survive a restart");
      Arc::new(MemoryStorage::new())
    }
  };
  Ok(storage)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = Config::load(args.config.as_deref())?
    .with_overrides(std::env::var(API_URL_ENV).ok(), args.api_url);
  let base_url = config.base_url()?;

  let data_dir = Config::data_dir()?;
  std::fs::create_dir_all(&data_dir)?;
  let _log_guard = init_logging(&data_dir);
  info!(%base_url, "Starting ticketdesk");

  let storage = open_storage(&config)?;
  let tokens = Arc::new(TokenStore::new(storage.clone()));
  let http = ApiClient::new(base_url, tokens.clone(), config.timeout())?;
  let cache = CacheLayer::new(Arc::new(QueryCache::new())).with_stale_time(config.stale_time());
  let api = CachedTicketApi::new(TicketApi::new(http), cache);
  let mutations = OptimisticUpdater::new(api.clone());
  let prefs = Preferences::new(storage);
  let _watcher = StorageWatcher::spawn(tokens, config.storage_poll());

  let requested_role = args.role.as_deref().map(Role::from_wire);
  let mut app = app::App::new(config, api, mutations, prefs, requested_role);
  app.run().await?;

  Ok(())
}

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use t212::api::{CachingClient, DynStorage, HttpTransport};
use t212::cache::{CacheResult, CacheSource, CacheStorage, HttpRequest, SqliteStorage};
use t212::config::Config;

#[derive(Parser, Debug)]
#[command(name = "t212")]
#[command(about = "A cache-backed command line client for the Trading 212 API")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/t212/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Backend to use: demo or live
  #[arg(short, long)]
  env: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Account metadata
  Account,
  /// Cash balances
  Cash,
  /// Open positions
  Positions,
  /// Send an arbitrary request through the cache
  Request {
    /// HTTP method, e.g. GET
    method: String,
    /// Path below the API base, e.g. /equity/orders
    path: String,
    /// JSON request body
    #[arg(long)]
    body: Option<String>,
    /// Query parameter as name=value (repeatable)
    #[arg(long = "query", value_parser = parse_query_pair)]
    query: Vec<(String, String)>,
    /// Skip the cache entirely, e.g. for order placement
    #[arg(long)]
    no_cache: bool,
  },
  /// Inspect or clean the response cache
  #[command(subcommand)]
  Cache(CacheCommand),
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
  /// Remove expired entries
  Purge,
  /// Remove all entries
  Clear,
  /// Show entry counts
  Stats,
}

fn parse_query_pair(s: &str) -> Result<(String, String), String> {
  s.split_once('=')
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .ok_or_else(|| format!("expected name=value, got '{}'", s))
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Held until exit so buffered log lines are flushed
  let _guard = init_logging()?;

  // Load configuration, command line wins over file and environment
  let mut config = Config::load(args.config.as_deref())?;
  if let Some(env) = args.env {
    config.environment = env.parse()?;
  }

  match args.command {
    Command::Account => print_json(&api_client(&config)?.get_account_info().await?),
    Command::Cash => print_json(&api_client(&config)?.get_account_cash().await?),
    Command::Positions => print_json(&api_client(&config)?.get_positions().await?),
    Command::Request {
      method,
      path,
      body,
      query,
      no_cache,
    } => {
      let mut request = HttpRequest::new(method, path);
      request.query = query;
      request.bypass_cache = no_cache;
      if let Some(body) = body {
        let body: Value =
          serde_json::from_str(&body).map_err(|e| eyre!("Request body is not valid JSON: {}", e))?;
        request = request.with_json(&body)?;
      }

      let result: CacheResult<Value> = api_client(&config)?.execute_with_source(&request).await?;
      if result.source == CacheSource::Offline {
        if let Some(cached_at) = result.cached_at {
          eprintln!("offline: serving response cached at {}", cached_at.to_rfc3339());
        }
      }
      print_json(&result.data)
    }
    Command::Cache(command) => run_cache_command(&config, command),
  }
}

fn api_client(config: &Config) -> Result<CachingClient<HttpTransport, DynStorage>> {
  CachingClient::from_config(config)
}

fn run_cache_command(config: &Config, command: CacheCommand) -> Result<()> {
  // Without an explicit path the database is keyed by the credential
  let path = match &config.cache.path {
    Some(path) => path.clone(),
    None => config.cache_path(&Config::get_api_key()?)?,
  };
  let storage = SqliteStorage::open_at(&path)?;
  let now = chrono::Utc::now();

  match command {
    CacheCommand::Purge => println!("removed {} expired entries", storage.purge_expired(now)?),
    CacheCommand::Clear => println!("removed {} entries", storage.clear()?),
    CacheCommand::Stats => {
      let stats = storage.stats(now)?;
      println!("entries: {}\nexpired: {}", stats.entries, stats.expired);
    }
  }

  Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

/// Log to a daily file so stdout stays machine-readable. Filter with T212_LOG.
fn init_logging() -> Result<WorkerGuard> {
  let log_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("t212")
    .join("logs");
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(&log_dir, "t212.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_env("T212_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}

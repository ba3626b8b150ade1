//! ksce controller binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered under
//! `KSCE_*` environment variables, opens the proxy's SQLite routing database,
//! and keeps it in step with SSH credential secrets until the watch ends.
//!
//! # Clearing the routing database
//!
//! ```
//! cargo run -p ksce-controller --bin ksce -- --truncate-only
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use k8s_openapi::api::core::v1::Secret;
use ksce_controller::{
  ControllerConfig, EventPump, SecretHandler, endpoint::KubeEndpointResolver,
};
use ksce_store_sqlite::SqliteStore;
use kube::{
  Api, Client,
  runtime::{WatchStreamExt as _, watcher},
};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Sync SSH proxy upstreams from Kubernetes secrets")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Clear every routing table and exit.
  #[arg(long)]
  truncate_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("KSCE"))
    .build()
    .context("failed to read config file")?;

  let cfg: ControllerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ControllerConfig")?;

  tracing::info!(
    version = env!("CARGO_PKG_VERSION"),
    store_path = %cfg.store_path.display(),
    namespace = cfg.namespace.as_deref().unwrap_or("*"),
    label_selector = cfg.label_selector.as_deref().unwrap_or(""),
    public_key_policy = ?cfg.public_key_policy,
    "starting"
  );

  // Open SQLite store.
  let store = SqliteStore::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?
    .with_public_key_policy(cfg.public_key_policy);

  // The initial list replays every secret as a create, so a clean slate
  // yields exactly the cluster's current state.
  if cfg.truncate_on_start || cli.truncate_only {
    store.truncate_all().await.context("failed to truncate store")?;
  }
  if cli.truncate_only {
    return Ok(());
  }

  let client = Client::try_default()
    .await
    .context("failed to build kubernetes client")?;

  let handler = SecretHandler::new(
    Arc::new(store.clone()),
    Arc::new(KubeEndpointResolver::new(client.clone())),
    cfg.parse_options(),
  );

  let secrets: Api<Secret> = match cfg.namespace.as_deref() {
    Some(ns) => Api::namespaced(client, ns),
    None => Api::all(client),
  };
  let mut watch_cfg = watcher::Config::default();
  if let Some(selector) = cfg.label_selector.as_deref() {
    watch_cfg = watch_cfg.labels(selector);
  }

  tracing::info!("watching secrets");
  EventPump::new(handler, cfg.retry_policy())
    .run(watcher(secrets, watch_cfg).default_backoff())
    .await;

  let counts = store.table_counts().await.context("failed to count rows")?;
  tracing::info!(
    servers = counts.server,
    upstreams = counts.upstream,
    public_keys = counts.public_keys,
    "shutting down"
  );

  Ok(())
}

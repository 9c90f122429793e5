use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use linkmirror::db::shared_link_repo;
use linkmirror::{
    load_config, logging, Database, HostRegistry, HttpHost, Reconciler, ReconcilerSettings,
    ShareState,
};

/// Keeps shared-link mirror jobs in step with their hosts.
#[derive(Parser, Debug)]
#[command(name = "linkmirror-reconciler", version, about)]
struct Args {
    /// Path to the JSON config file.
    #[arg(short, long, env = "LINKMIRROR_CONFIG")]
    config: PathBuf,

    /// Override the configured database path.
    #[arg(long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(&args.config)
        .with_context(|| format!("failed to load config '{}'", args.config.display()))?;
    if let Some(path) = args.database {
        config.database_path = path;
    }

    logging::init(&config.logging)?;

    let db = Database::open(&config.database_path).with_context(|| {
        format!(
            "failed to open database '{}'",
            config.database_path.display()
        )
    })?;
    for state in ShareState::RECONCILABLE {
        let backlog = shared_link_repo::count_by_state(&db, state)?;
        info!(state = %state, backlog, "Reconcile backlog");
    }

    let mut hosts = HostRegistry::new();
    for endpoint in &config.hosts {
        let host = HttpHost::from_endpoint(endpoint)
            .with_context(|| format!("failed to set up host '{}'", endpoint.name))?;
        hosts.register(Arc::new(host));
    }
    if hosts.is_empty() {
        warn!("No hosts configured; every job will be dropped as unknown");
    }

    let reconciler = Reconciler::start(
        ReconcilerSettings::from_config(&config),
        db,
        Arc::new(hosts),
        tokio::runtime::Handle::current(),
    )?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("Shutdown requested");

    reconciler.stop();
    tokio::task::spawn_blocking(move || reconciler.wait())
        .await
        .context("reconciler shutdown task failed")?;

    Ok(())
}

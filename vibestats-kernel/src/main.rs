/**
 * VIBESTATS KERNEL - Point d'entrée du serveur de statistiques
 *
 * RÔLE : Charge la config YAML, lit l'export du registre, crée un
 * coordinateur par entrée configurée et sert l'API dashboard jusqu'au Ctrl-C.
 *
 * ARCHITECTURE : EntryManager (coordinateurs + pool de workers) + API REST axum.
 * UTILITÉ : Processus unique qui publie les stats de la maison.
 */

use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use vibestats_kernel::config::load_config;
use vibestats_kernel::health::HealthTracker;
use vibestats_kernel::http::{build_router, AppState};
use vibestats_kernel::telemetry::HostTelemetry;
use vibestats_kernel::{EntryManager, JsonFileRegistry, SysinfoTelemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vibestats_kernel=info")),
        )
        .init();

    let cfg = load_config().await;

    if let Some(dir) = cfg.registry_file.parent().filter(|d| !d.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!(dir = %dir.display(), error = %e, "failed to create registry export directory");
        }
    }
    let source = Arc::new(JsonFileRegistry::new(cfg.registry_file.clone()));
    info!(path = %source.path().display(), "reading registry export");

    let telemetry = SysinfoTelemetry::detect(cfg.disk_path.clone()).map(|t| Arc::new(t) as Arc<dyn HostTelemetry>);
    let entries = Arc::new(EntryManager::new(source, telemetry, cfg.workers));

    for conf in cfg.entries.clone() {
        let title = conf.title.clone();
        match entries.setup_entry(conf).await {
            Ok(entry) => info!(entry = %entry.entry_id, title = %title, "entry ready"),
            Err(e) => error!(title = %title, error = %e, "entry setup failed"),
        }
    }

    let app = build_router(AppState {
        entries: entries.clone(),
        health_tracker: HealthTracker::new(),
    });

    let listener = TcpListener::bind(&cfg.listen)
        .await
        .with_context(|| format!("failed to bind {}", cfg.listen))?;
    info!("listening on http://{}", cfg.listen);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await
        .context("http server failed")?;

    entries.shutdown_all().await;
    info!("shut down");
    Ok(())
}

/**
 * ENTRÉES CONFIGURÉES - Registre des intégrations actives
 *
 * RÔLE : Chaque entrée possède un coordinateur démarré. Le setup attend un
 * premier refresh pour que le dashboard ait des données dès la création.
 * Un unique_id ne peut être configuré qu'une fois.
 */

use crate::config::{EntryConf, StatsOptions};
use crate::coordinator::{Coordinator, CoordinatorHandle, CoordinatorStatus, CycleOutcome};
use crate::error::EntryError;
use crate::registry::RegistrySource;
use crate::telemetry::HostTelemetry;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ConfiguredEntry {
    pub entry_id: String,
    pub title: String,
    pub unique_id: Option<String>,
    pub handle: CoordinatorHandle,
}

/// Listing row for one entry.
#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    pub entry_id: String,
    pub title: String,
    pub unique_id: Option<String>,
    pub has_data: bool,
    pub status: CoordinatorStatus,
}

impl ConfiguredEntry {
    pub fn info(&self) -> EntryInfo {
        EntryInfo {
            entry_id: self.entry_id.clone(),
            title: self.title.clone(),
            unique_id: self.unique_id.clone(),
            has_data: self.handle.snapshot().is_some(),
            status: self.handle.status(),
        }
    }
}

pub type SharedEntryManager = Arc<EntryManager>;

pub struct EntryManager {
    source: Arc<dyn RegistrySource>,
    telemetry: Option<Arc<dyn HostTelemetry>>,
    workers: Arc<Semaphore>,
    entries: RwLock<HashMap<String, ConfiguredEntry>>,
    /// Serializes setups so the unique-id check and the insert are atomic.
    setup_lock: Mutex<()>,
}

impl EntryManager {
    /// All entries share `source`, `telemetry` and a pool of `workers`
    /// expensive-pass workers.
    pub fn new(
        source: Arc<dyn RegistrySource>,
        telemetry: Option<Arc<dyn HostTelemetry>>,
        workers: usize,
    ) -> Self {
        Self {
            source,
            telemetry,
            workers: Arc::new(Semaphore::new(workers.max(1))),
            entries: RwLock::new(HashMap::new()),
            setup_lock: Mutex::new(()),
        }
    }

    /// Create the entry, run its first refresh and start its scheduler.
    pub async fn setup_entry(&self, conf: EntryConf) -> Result<ConfiguredEntry, EntryError> {
        let _setup = self.setup_lock.lock().await;

        if let Some(unique_id) = conf.unique_id.as_deref() {
            let entries = self.entries.read().await;
            if entries.values().any(|e| e.unique_id.as_deref() == Some(unique_id)) {
                return Err(EntryError::AlreadyConfigured(unique_id.to_string()));
            }
        }

        let entry_id = Uuid::new_v4().simple().to_string();
        info!(entry = %entry_id, title = %conf.title, "setting up entry");

        let mut builder = Coordinator::builder(self.source.clone())
            .name(entry_id.clone())
            .options(conf.options)
            .worker_pool(self.workers.clone());
        if let Some(telemetry) = &self.telemetry {
            builder = builder.telemetry(telemetry.clone());
        }
        let coordinator = builder.build()?;

        match coordinator.refresh().await {
            Ok(CycleOutcome::Published(snapshot)) => {
                info!(entry = %entry_id, values = snapshot.values.len(), "first refresh done");
            }
            Ok(CycleOutcome::Skipped) => {
                info!(entry = %entry_id, "registry not ready yet, first refresh deferred to the schedule");
            }
            Err(e) => {
                warn!(entry = %entry_id, error = %e, "first refresh failed");
                return Err(EntryError::SetupFailed(e.to_string()));
            }
        }

        let entry = ConfiguredEntry {
            entry_id: entry_id.clone(),
            title: conf.title,
            unique_id: conf.unique_id,
            handle: coordinator.start(),
        };
        self.entries.write().await.insert(entry_id, entry.clone());
        Ok(entry)
    }

    /// Stop the entry's coordinator and forget it.
    pub async fn unload_entry(&self, entry_id: &str) -> Result<(), EntryError> {
        let entry = self
            .entries
            .write()
            .await
            .remove(entry_id)
            .ok_or_else(|| EntryError::NotFound(entry_id.to_string()))?;
        entry.handle.shutdown().await;
        info!(entry = %entry_id, "entry unloaded");
        Ok(())
    }

    pub async fn get(&self, entry_id: &str) -> Result<ConfiguredEntry, EntryError> {
        self.entries
            .read()
            .await
            .get(entry_id)
            .cloned()
            .ok_or_else(|| EntryError::NotFound(entry_id.to_string()))
    }

    pub async fn list(&self) -> Vec<EntryInfo> {
        let mut rows: Vec<EntryInfo> = self.entries.read().await.values().map(ConfiguredEntry::info).collect();
        rows.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.entry_id.cmp(&b.entry_id)));
        rows
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn request_refresh(&self, entry_id: &str) -> Result<(), EntryError> {
        self.get(entry_id).await?.handle.request_refresh();
        Ok(())
    }

    /// Queue validated options; they apply at the entry's next cycle.
    pub async fn update_options(&self, entry_id: &str, options: StatsOptions) -> Result<(), EntryError> {
        let entry = self.get(entry_id).await?;
        entry.handle.update_options(options)?;
        Ok(())
    }

    /// Options-form payload merged over the entry's effective options.
    pub async fn update_options_json(
        &self,
        entry_id: &str,
        payload: &serde_json::Value,
    ) -> Result<StatsOptions, EntryError> {
        let entry = self.get(entry_id).await?;
        let options = entry.handle.update_options_json(payload)?;
        info!(entry = %entry_id, "options accepted for next cycle");
        Ok(options)
    }

    pub async fn shutdown_all(&self) {
        let entries: Vec<ConfiguredEntry> = self.entries.write().await.drain().map(|(_, e)| e).collect();
        for entry in entries {
            entry.handle.shutdown().await;
        }
        info!("all entries stopped");
    }
}

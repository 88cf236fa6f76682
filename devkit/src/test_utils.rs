/*!
Test Harness pour coordinateurs VibeStats

Branche un registre scripté et une télémétrie fixe sur coordinateurs et
EntryManager, avec attente et assertions sur les snapshots publiés.
*/

use crate::sources::{ScriptedRegistry, StaticTelemetry};
use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{info, warn};
use vibestats_kernel::config::StatsOptions;
use vibestats_kernel::coordinator::Coordinator;
use vibestats_kernel::entries::EntryManager;
use vibestats_kernel::metrics::MetricSpec;
use vibestats_kernel::models::{MetricValue, RegistrySnapshot};
use vibestats_kernel::snapshot::{Snapshot, SnapshotSubscriber};
use vibestats_kernel::telemetry::HostSample;

/// Route kernel logs to the test writer. Safe to call from every test.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vibestats_kernel=debug".into()),
        )
        .with_test_writer()
        .try_init()
        .ok();
}

/// One registry and one telemetry source shared by everything the harness builds.
pub struct TestHarness {
    pub source: ScriptedRegistry,
    pub telemetry: StaticTelemetry,
}

impl TestHarness {
    pub fn new(snapshot: RegistrySnapshot) -> Self {
        init_tracing();
        Self {
            source: ScriptedRegistry::new(snapshot),
            telemetry: StaticTelemetry::new(HostSample {
                cpu_percent: Some(12.34),
                ram_percent: Some(56.78),
                disk_percent: Some(90.0),
                uptime_seconds: Some(3 * 86_400),
            }),
        }
    }

    /// A harness whose registry reports `NotReady` until the test makes it ready.
    pub fn not_ready() -> Self {
        let harness = Self::new(RegistrySnapshot::default());
        harness.source.registry().set_not_ready();
        harness
    }

    /// Coordinator over the built-in catalog, not yet started.
    pub fn coordinator(&self, options: StatsOptions) -> Result<Coordinator> {
        Ok(Coordinator::builder(Arc::new(self.source.clone()))
            .name("test")
            .telemetry(Arc::new(self.telemetry.clone()))
            .options(options)
            .build()?)
    }

    /// Coordinator over a custom catalog, not yet started.
    pub fn coordinator_with(&self, options: StatsOptions, catalog: Vec<MetricSpec>) -> Result<Coordinator> {
        Ok(Coordinator::builder(Arc::new(self.source.clone()))
            .name("test")
            .telemetry(Arc::new(self.telemetry.clone()))
            .options(options)
            .catalog(catalog)
            .build()?)
    }

    pub fn entry_manager(&self, workers: usize) -> EntryManager {
        EntryManager::new(
            Arc::new(self.source.clone()),
            Some(Arc::new(self.telemetry.clone())),
            workers,
        )
    }
}

/// Wait until a snapshot with at least sequence `min` is published.
pub async fn wait_for_sequence(
    subscriber: &mut SnapshotSubscriber,
    min: u64,
    wait: Duration,
) -> Result<Arc<Snapshot>> {
    let deadline = Instant::now() + wait;
    if let Some(latest) = subscriber.latest().filter(|s| s.sequence >= min) {
        return Ok(latest);
    }

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match timeout(remaining, subscriber.next()).await {
            Ok(Some(snapshot)) if snapshot.sequence >= min => {
                info!(sequence = snapshot.sequence, "received expected snapshot");
                return Ok(snapshot);
            }
            Ok(Some(_)) => continue,
            Ok(None) => bail!("coordinator shut down before snapshot {min} was published"),
            Err(_) => {
                warn!(min, "timeout waiting for snapshot");
                bail!("timeout after {wait:?} waiting for snapshot {min}");
            }
        }
    }
}

/// Assert that `key` holds `expected` in `snapshot`.
pub fn assert_metric(snapshot: &Snapshot, key: &str, expected: &MetricValue) -> Result<()> {
    match snapshot.get(key) {
        Some(actual) if actual == expected => Ok(()),
        Some(actual) => bail!("metric '{key}' mismatch: expected {expected:?}, got {actual:?}"),
        None => bail!(
            "metric '{key}' missing from snapshot {} (failures: {:?})",
            snapshot.sequence,
            snapshot.failures
        ),
    }
}

/// Assert that `key` was omitted and its failure recorded.
pub fn assert_failed(snapshot: &Snapshot, key: &str) -> Result<()> {
    if snapshot.get(key).is_some() {
        bail!("metric '{key}' should have been omitted from snapshot {}", snapshot.sequence);
    }
    if !snapshot.failures.contains_key(key) {
        bail!("no failure recorded for metric '{key}'");
    }
    Ok(())
}

use crate::entries::EntryManager;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use sysinfo::System;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub entries_configured: u32,
    /// Entries that have published at least one snapshot.
    pub entries_with_data: u32,
    /// Entries whose last cycle failed.
    pub entries_failing: u32,
    pub memory_usage_mb: Option<f32>,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    pub async fn get_health(&self, entries: &EntryManager) -> KernelHealth {
        let rows = entries.list().await;
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            entries_configured: rows.len() as u32,
            entries_with_data: rows.iter().filter(|e| e.has_data).count() as u32,
            entries_failing: rows.iter().filter(|e| e.status.consecutive_failures > 0).count() as u32,
            memory_usage_mb: process_memory_mb(),
        }
    }
}

/// Resident memory of this process.
fn process_memory_mb() -> Option<f32> {
    let pid = sysinfo::get_current_pid().ok()?;
    let mut sys = System::new();
    if !sys.refresh_process(pid) {
        return None;
    }
    sys.process(pid).map(|p| p.memory() as f32 / (1024.0 * 1024.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EntryConf;
    use crate::models::RegistrySnapshot;
    use crate::registry::MemoryRegistry;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_health_counts_entries() {
        let registry = MemoryRegistry::ready(RegistrySnapshot::default());
        let entries = EntryManager::new(Arc::new(registry), None, 1);
        entries.setup_entry(EntryConf::default()).await.unwrap();

        let health = HealthTracker::new().get_health(&entries).await;
        assert_eq!(health.entries_configured, 1);
        assert_eq!(health.entries_with_data, 1);
        assert_eq!(health.entries_failing, 0);
        entries.shutdown_all().await;
    }
}

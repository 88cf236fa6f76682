//! Host telemetry for the statistics cycle
//!
//! Provides the optional host readings published next to the registry
//! statistics:
//! - CPU usage since the previous sample
//! - Memory usage
//! - Disk usage of the filesystem holding the host's data
//! - Host uptime
//!
//! Every field is optional so a missing reading only degrades that one
//! metric to "unavailable".

use parking_lot::Mutex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use sysinfo::{Disks, System};
use tracing::debug;

/// One reading of the host, taken during the fetch phase of a cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HostSample {
    pub cpu_percent: Option<f64>,
    pub ram_percent: Option<f64>,
    pub disk_percent: Option<f64>,
    pub uptime_seconds: Option<u64>,
}

/// Source of host readings. `None` means telemetry is unavailable on this host.
pub trait HostTelemetry: Send + Sync {
    fn sample(&self) -> Option<HostSample>;
}

/// `sysinfo`-backed telemetry.
///
/// Keeps one `System` between cycles so CPU usage is measured over the
/// interval between two samples instead of a blocking sleep.
pub struct SysinfoTelemetry {
    sys: Mutex<System>,
    disk_path: PathBuf,
}

impl SysinfoTelemetry {
    pub fn new(disk_path: impl Into<PathBuf>) -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_usage();
        sys.refresh_memory();
        Self {
            sys: Mutex::new(sys),
            disk_path: disk_path.into(),
        }
    }

    /// `None` on platforms `sysinfo` does not support.
    pub fn detect(disk_path: impl Into<PathBuf>) -> Option<Self> {
        if sysinfo::IS_SUPPORTED_SYSTEM {
            Some(Self::new(disk_path))
        } else {
            debug!("sysinfo does not support this platform, host telemetry disabled");
            None
        }
    }
}

impl HostTelemetry for SysinfoTelemetry {
    fn sample(&self) -> Option<HostSample> {
        let mut sys = self.sys.lock();
        sys.refresh_cpu_usage();
        sys.refresh_memory();

        let cpu_percent = Some(sys.global_cpu_info().cpu_usage() as f64)
            .filter(|pct| pct.is_finite());

        let total = sys.total_memory();
        let ram_percent = (total > 0).then(|| sys.used_memory() as f64 / total as f64 * 100.0);

        let disk_percent = disk_usage_percent(&self.disk_path);
        let uptime_seconds = Some(System::uptime()).filter(|secs| *secs > 0);

        debug!(?cpu_percent, ?ram_percent, ?disk_percent, "host telemetry sampled");
        Some(HostSample {
            cpu_percent,
            ram_percent,
            disk_percent,
            uptime_seconds,
        })
    }
}

/// Usage of the mounted filesystem with the longest mount point containing `path`.
fn disk_usage_percent(path: &Path) -> Option<f64> {
    let disks = Disks::new_with_refreshed_list();
    let disk = disks
        .list()
        .iter()
        .filter(|d| path.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len())?;
    let total = disk.total_space();
    if total == 0 {
        return None;
    }
    let used = total.saturating_sub(disk.available_space());
    Some(used as f64 / total as f64 * 100.0)
}

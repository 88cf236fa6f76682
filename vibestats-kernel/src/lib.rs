//! VibeStats kernel: periodic smart-home statistics.
//!
//! A [`coordinator::Coordinator`] polls a [`registry::RegistrySource`],
//! computes the metric catalog and publishes immutable
//! [`snapshot::Snapshot`]s that the dashboard and sensors read without
//! locking.

pub mod config;
pub mod coordinator;
pub mod entries;
pub mod error;
pub mod health;
pub mod http;
pub mod metrics;
pub mod models;
pub mod registry;
pub mod sensors;
pub mod snapshot;
pub mod state;
pub mod telemetry;

pub use config::{EntryConf, KernelConfig, StatsOptions};
pub use coordinator::{Coordinator, CoordinatorHandle, CoordinatorStatus, CycleOutcome, Phase};
pub use entries::{EntryManager, SharedEntryManager};
pub use error::{EntryError, StatsError};
pub use models::{MetricValue, RegistrySnapshot};
pub use registry::{JsonFileRegistry, MemoryRegistry, RegistryFetch, RegistrySource};
pub use snapshot::{Snapshot, SnapshotSubscriber};
pub use telemetry::{HostSample, HostTelemetry, SysinfoTelemetry};

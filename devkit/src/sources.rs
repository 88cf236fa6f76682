/*!
Sources scriptées

Registre et télémétrie pilotés par le test :
- File de réponses NotReady ou d'échecs pour les prochains fetch
- Fetch ralentis pour élargir les fenêtres de course
- Compteurs de fetch et pic de fetch concurrents
*/

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use vibestats_kernel::error::StatsError;
use vibestats_kernel::models::RegistrySnapshot;
use vibestats_kernel::registry::{MemoryRegistry, RegistryFetch, RegistrySource};
use vibestats_kernel::telemetry::{HostSample, HostTelemetry};

/// Outcome forced on one upcoming fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    NotReady,
    Fail(String),
}

#[derive(Default)]
struct FetchStats {
    fetches: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// A [`MemoryRegistry`] with a script of forced outcomes in front of it.
///
/// Once the script is exhausted every fetch reads the memory registry.
/// Clones share the registry, the script and the counters.
#[derive(Clone)]
pub struct ScriptedRegistry {
    registry: MemoryRegistry,
    script: Arc<Mutex<VecDeque<ScriptStep>>>,
    delay: Arc<Mutex<Option<Duration>>>,
    stats: Arc<FetchStats>,
}

impl ScriptedRegistry {
    pub fn new(snapshot: RegistrySnapshot) -> Self {
        Self::wrap(MemoryRegistry::ready(snapshot))
    }

    pub fn wrap(registry: MemoryRegistry) -> Self {
        Self {
            registry,
            script: Arc::new(Mutex::new(VecDeque::new())),
            delay: Arc::new(Mutex::new(None)),
            stats: Arc::new(FetchStats::default()),
        }
    }

    /// The memory registry behind the script; mutate it to change what the
    /// next successful fetch sees.
    pub fn registry(&self) -> &MemoryRegistry {
        &self.registry
    }

    pub fn push(&self, step: ScriptStep) -> &Self {
        self.script.lock().push_back(step);
        self
    }

    pub fn fail_next(&self, reason: &str) -> &Self {
        self.push(ScriptStep::Fail(reason.to_string()))
    }

    pub fn not_ready_next(&self) -> &Self {
        self.push(ScriptStep::NotReady)
    }

    /// Block every fetch for `delay`. Fetches run on the blocking pool, so
    /// this never stalls the runtime.
    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn fetch_count(&self) -> u64 {
        self.stats.fetches.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.stats.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_fetches(&self) -> usize {
        self.stats.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a FetchStats);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RegistrySource for ScriptedRegistry {
    fn fetch(&self) -> Result<RegistryFetch, StatsError> {
        let current = self.stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.stats);
        self.stats.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let fetch = self.stats.fetches.fetch_add(1, Ordering::SeqCst) + 1;

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let step = self.script.lock().pop_front();
        debug!(fetch, ?step, "scripted registry fetch");
        match step {
            Some(ScriptStep::NotReady) => Ok(RegistryFetch::NotReady),
            Some(ScriptStep::Fail(reason)) => Err(StatsError::source_failure(reason)),
            None => self.registry.fetch(),
        }
    }
}

/// Telemetry returning a fixed sample, changeable between cycles.
#[derive(Clone, Default)]
pub struct StaticTelemetry {
    sample: Arc<Mutex<Option<HostSample>>>,
}

impl StaticTelemetry {
    pub fn new(sample: HostSample) -> Self {
        Self {
            sample: Arc::new(Mutex::new(Some(sample))),
        }
    }

    /// Telemetry that reports no readings at all.
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn set(&self, sample: Option<HostSample>) {
        *self.sample.lock() = sample;
    }
}

impl HostTelemetry for StaticTelemetry {
    fn sample(&self) -> Option<HostSample> {
        self.sample.lock().clone()
    }
}

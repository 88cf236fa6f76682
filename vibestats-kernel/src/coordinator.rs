/**
 * COORDINATEUR - Cycle de rafraîchissement d'une entrée
 *
 * RÔLE : Un coordinateur par entrée. Chaque cycle lit le registre une fois,
 * calcule les métriques rapides sur la tâche, confie les métriques coûteuses
 * au pool bloquant, fusionne le tout en un Snapshot publié d'un seul swap.
 *
 * PHASES :
 * - Idle -> Fetching -> ComputingCheap -> ComputingExpensive -> Publishing -> Idle
 * - Failed depuis Fetching/Computing, Stopped après shutdown
 * - Registre pas prêt : cycle sauté, snapshot et compteur d'échecs inchangés
 *
 * LECTURES : registre et télémétrie hôte passent par spawn_blocking.
 */

use crate::config::StatsOptions;
use crate::error::StatsError;
use crate::metrics::{catalog, run_metrics, CostClass, MetricContext, MetricPass, MetricSpec};
use crate::registry::{RegistryFetch, RegistrySource};
use crate::snapshot::{Snapshot, SnapshotStore, SnapshotSubscriber};
use crate::telemetry::{HostSample, HostTelemetry};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{watch, Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Fetching,
    ComputingCheap,
    ComputingExpensive,
    Publishing,
    Failed,
    Stopped,
}

/// Point-in-time view of a coordinator, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorStatus {
    pub name: String,
    pub phase: Phase,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_update: Option<OffsetDateTime>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub cycles_completed: u64,
    pub cycles_skipped: u64,
    pub cycles_failed: u64,
    pub last_sequence: u64,
    pub options: StatsOptions,
    /// Accepted options waiting for the next cycle boundary.
    pub pending_options: Option<StatsOptions>,
}

impl CoordinatorStatus {
    fn new(name: String, options: StatsOptions) -> Self {
        Self {
            name,
            phase: Phase::Idle,
            last_update: None,
            last_error: None,
            consecutive_failures: 0,
            cycles_completed: 0,
            cycles_skipped: 0,
            cycles_failed: 0,
            last_sequence: 0,
            options,
            pending_options: None,
        }
    }

    fn cycles_run(&self) -> u64 {
        self.cycles_completed + self.cycles_skipped + self.cycles_failed
    }
}

/// What a cycle did.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Published(Arc<Snapshot>),
    /// The registry source was not ready; nothing changed.
    Skipped,
}

pub struct CoordinatorBuilder {
    name: String,
    source: Arc<dyn RegistrySource>,
    telemetry: Option<Arc<dyn HostTelemetry>>,
    options: StatsOptions,
    catalog: Option<Vec<MetricSpec>>,
    workers: Option<Arc<Semaphore>>,
}

impl CoordinatorBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn telemetry(mut self, telemetry: Arc<dyn HostTelemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn options(mut self, options: StatsOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the built-in metric catalog.
    pub fn catalog(mut self, specs: Vec<MetricSpec>) -> Self {
        self.catalog = Some(specs);
        self
    }

    /// Dedicated pool of `count` expensive-pass workers (at least one).
    pub fn workers(mut self, count: usize) -> Self {
        self.workers = Some(Arc::new(Semaphore::new(count.max(1))));
        self
    }

    /// Share an existing worker pool with other coordinators.
    pub fn worker_pool(mut self, pool: Arc<Semaphore>) -> Self {
        self.workers = Some(pool);
        self
    }

    pub fn build(self) -> Result<Coordinator, StatsError> {
        let options = self.options.validated()?;
        let inner = Inner {
            status: Mutex::new(CoordinatorStatus::new(self.name.clone(), options.clone())),
            name: self.name,
            source: self.source,
            telemetry: self.telemetry,
            catalog: self.catalog.unwrap_or_else(catalog).into(),
            workers: self.workers.unwrap_or_else(|| Arc::new(Semaphore::new(1))),
            options: Mutex::new(options),
            pending_options: Mutex::new(None),
            store: SnapshotStore::new(),
            cycle_gate: tokio::sync::Mutex::new(()),
            refresh_requested: AtomicU64::new(0),
            refresh_served: AtomicU64::new(0),
            wake: Notify::new(),
            sequence: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        };
        Ok(Coordinator { inner: Arc::new(inner) })
    }
}

struct Inner {
    name: String,
    source: Arc<dyn RegistrySource>,
    telemetry: Option<Arc<dyn HostTelemetry>>,
    catalog: Arc<[MetricSpec]>,
    workers: Arc<Semaphore>,
    options: Mutex<StatsOptions>,
    pending_options: Mutex<Option<StatsOptions>>,
    store: SnapshotStore,
    status: Mutex<CoordinatorStatus>,
    /// Held for the whole cycle: at most one cycle runs at a time.
    cycle_gate: tokio::sync::Mutex<()>,
    refresh_requested: AtomicU64,
    /// Highest request count observed by a cycle before its fetch.
    refresh_served: AtomicU64,
    wake: Notify,
    sequence: AtomicU64,
    stopped: AtomicBool,
}

#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    pub fn builder(source: Arc<dyn RegistrySource>) -> CoordinatorBuilder {
        CoordinatorBuilder {
            name: "vibestats".into(),
            source,
            telemetry: None,
            options: StatsOptions::default(),
            catalog: None,
            workers: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.inner.store.load()
    }

    pub fn subscribe(&self) -> SnapshotSubscriber {
        self.inner.store.subscribe()
    }

    pub fn status(&self) -> CoordinatorStatus {
        self.inner.status.lock().clone()
    }

    /// Options the next cycle will run with.
    pub fn effective_options(&self) -> StatsOptions {
        match self.inner.pending_options.lock().as_ref() {
            Some(pending) => pending.clone(),
            None => self.inner.options.lock().clone(),
        }
    }

    /// Ask the scheduler for a cycle as soon as possible.
    ///
    /// Requests made before an in-flight cycle reads the registry are served
    /// by that cycle; any made after it cause exactly one follow-up cycle.
    pub fn request_refresh(&self) {
        self.inner.refresh_requested.fetch_add(1, Ordering::AcqRel);
        self.inner.wake.notify_one();
    }

    fn refresh_pending(&self) -> bool {
        self.inner.refresh_requested.load(Ordering::Acquire) > self.inner.refresh_served.load(Ordering::Acquire)
    }

    /// Queue new options for the next cycle boundary.
    ///
    /// Invalid options are rejected and the current ones stay in effect.
    pub fn update_options(&self, options: StatsOptions) -> Result<(), StatsError> {
        let options = options.validated()?;
        *self.inner.pending_options.lock() = Some(options.clone());
        self.inner.status.lock().pending_options = Some(options);
        // the scheduler recomputes its deadline from the new interval
        self.inner.wake.notify_one();
        Ok(())
    }

    /// Merge an options-form payload over the effective options and queue it.
    pub fn update_options_json(&self, payload: &serde_json::Value) -> Result<StatsOptions, StatsError> {
        let next = self.effective_options().merge_json(payload)?;
        self.update_options(next.clone())?;
        Ok(next)
    }

    /// Run one cycle now and wait for it.
    ///
    /// Waits for any in-flight cycle first. Source and worker failures are
    /// recorded in the status and returned; the published snapshot is kept.
    pub async fn refresh(&self) -> Result<CycleOutcome, StatsError> {
        if self.inner.stopped.load(Ordering::Acquire) {
            return Err(StatsError::Shutdown);
        }
        let _gate = self.inner.cycle_gate.lock().await;
        let options = self.apply_pending_options();

        self.set_phase(Phase::Fetching);
        let observed = self.inner.refresh_requested.load(Ordering::Acquire);
        self.inner.refresh_served.fetch_max(observed, Ordering::AcqRel);
        let now = OffsetDateTime::now_utc();

        let (registry, host) = match self.read_inputs(options.enable_host_telemetry).await {
            Ok((RegistryFetch::Ready(registry), host)) => (registry, host),
            Ok((RegistryFetch::NotReady, _)) | Err(StatsError::NotReady) => {
                debug!(entry = %self.inner.name, "registry not ready, cycle skipped");
                let mut status = self.inner.status.lock();
                status.phase = if status.consecutive_failures > 0 { Phase::Failed } else { Phase::Idle };
                status.cycles_skipped += 1;
                return Ok(CycleOutcome::Skipped);
            }
            Err(e) => return Err(self.record_failure(e)),
        };

        let ctx = Arc::new(MetricContext::new(registry, host, now));

        let (cheap, expensive): (Vec<MetricSpec>, Vec<MetricSpec>) = self
            .inner
            .catalog
            .iter()
            .copied()
            .filter(|spec| spec.is_enabled(&options))
            .partition(|spec| spec.cost == CostClass::Cheap);

        self.set_phase(Phase::ComputingCheap);
        let mut pass = run_metrics(&cheap, &ctx);

        if !expensive.is_empty() {
            self.set_phase(Phase::ComputingExpensive);
            match self.run_expensive(expensive, ctx.clone()).await {
                Ok(expensive_pass) => pass.merge(expensive_pass),
                Err(e) => return Err(self.record_failure(e)),
            }
        }

        self.set_phase(Phase::Publishing);
        Ok(CycleOutcome::Published(self.publish(pass, now)))
    }

    /// Read the registry and, once it is ready, sample the host, on the
    /// blocking pool.
    async fn read_inputs(&self, with_host: bool) -> Result<(RegistryFetch, Option<HostSample>), StatsError> {
        let source = self.inner.source.clone();
        let telemetry = self.inner.telemetry.clone().filter(|_| with_host);
        let reader = tokio::task::spawn_blocking(move || {
            let fetched = source.fetch()?;
            let host = match &fetched {
                RegistryFetch::Ready(_) => telemetry.and_then(|t| t.sample()),
                RegistryFetch::NotReady => None,
            };
            Ok::<_, StatsError>((fetched, host))
        });
        reader
            .await
            .map_err(|e| StatsError::Worker(format!("registry read aborted: {e}")))?
    }

    /// Hand the expensive specs to a blocking worker and wait for the result.
    async fn run_expensive(&self, specs: Vec<MetricSpec>, ctx: Arc<MetricContext>) -> Result<MetricPass, StatsError> {
        let permit = self
            .inner
            .workers
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| StatsError::Shutdown)?;
        let worker = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            run_metrics(&specs, &ctx)
        });
        worker
            .await
            .map_err(|e| StatsError::Worker(format!("expensive metric pass aborted: {e}")))
    }

    fn apply_pending_options(&self) -> StatsOptions {
        let pending = self.inner.pending_options.lock().take();
        let mut active = self.inner.options.lock();
        if let Some(next) = pending {
            info!(
                entry = %self.inner.name,
                poll_interval = next.poll_interval_seconds,
                fun_stats = next.enable_fun_stats,
                host_telemetry = next.enable_host_telemetry,
                "applying updated options"
            );
            *active = next;
            let mut status = self.inner.status.lock();
            status.options = active.clone();
            status.pending_options = None;
        }
        active.clone()
    }

    fn publish(&self, pass: MetricPass, now: OffsetDateTime) -> Arc<Snapshot> {
        let sequence = self.inner.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        let snapshot = self.inner.store.publish(Snapshot {
            sequence,
            generated_at: now,
            values: pass.values,
            failures: pass.failures,
        });

        let mut status = self.inner.status.lock();
        status.phase = Phase::Idle;
        status.last_update = Some(now);
        status.last_error = None;
        status.consecutive_failures = 0;
        status.cycles_completed += 1;
        status.last_sequence = sequence;
        info!(
            entry = %self.inner.name,
            sequence,
            values = snapshot.values.len(),
            failures = snapshot.failures.len(),
            "snapshot published"
        );
        snapshot
    }

    fn record_failure(&self, err: StatsError) -> StatsError {
        let mut status = self.inner.status.lock();
        status.phase = Phase::Failed;
        status.consecutive_failures += 1;
        status.cycles_failed += 1;
        status.last_error = Some(err.to_string());
        warn!(
            entry = %self.inner.name,
            error = %err,
            consecutive_failures = status.consecutive_failures,
            "refresh cycle failed, keeping previous snapshot"
        );
        err
    }

    fn set_phase(&self, phase: Phase) {
        self.inner.status.lock().phase = phase;
    }

    /// Spawn the scheduler task.
    ///
    /// The first cycle runs immediately unless one already ran through
    /// [`Coordinator::refresh`].
    pub fn start(self) -> CoordinatorHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = self.clone();
        let task = tokio::spawn(async move { scheduler.run(shutdown_rx).await });
        info!(entry = %self.inner.name, "coordinator started");
        CoordinatorHandle {
            coordinator: self,
            shutdown: Arc::new(shutdown_tx),
            task: Arc::new(Mutex::new(Some(task))),
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut last_cycle = if self.inner.status.lock().cycles_run() > 0 {
            Some(Instant::now())
        } else {
            None
        };

        loop {
            if *shutdown.borrow() {
                break;
            }
            if !self.refresh_pending() {
                let deadline = match last_cycle {
                    Some(at) => at + self.effective_options().poll_interval(),
                    None => Instant::now(),
                };
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    _ = self.inner.wake.notified() => {
                        if !self.refresh_pending() {
                            continue;
                        }
                    }
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }

            last_cycle = Some(Instant::now());
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                // failures are already recorded in the status
                _ = self.refresh() => {}
            }
        }
        debug!(entry = %self.inner.name, "scheduler loop exited");
    }

    fn mark_stopped(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        self.inner.status.lock().phase = Phase::Stopped;
        self.inner.store.close();
    }
}

/// Handle to a running coordinator. Clones control the same scheduler.
#[derive(Clone)]
pub struct CoordinatorHandle {
    coordinator: Coordinator,
    shutdown: Arc<watch::Sender<bool>>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl CoordinatorHandle {
    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.coordinator.snapshot()
    }

    pub fn subscribe(&self) -> SnapshotSubscriber {
        self.coordinator.subscribe()
    }

    pub fn request_refresh(&self) {
        self.coordinator.request_refresh();
    }

    pub fn update_options(&self, options: StatsOptions) -> Result<(), StatsError> {
        self.coordinator.update_options(options)
    }

    pub fn update_options_json(&self, payload: &serde_json::Value) -> Result<StatsOptions, StatsError> {
        self.coordinator.update_options_json(payload)
    }

    pub fn status(&self) -> CoordinatorStatus {
        self.coordinator.status()
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the scheduler. The timer is cancelled and an in-flight expensive
    /// pass is abandoned; its result is discarded.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(entry = %self.coordinator.name(), error = %e, "scheduler task ended abnormally");
            }
        }
        self.coordinator.mark_stopped();
        info!(entry = %self.coordinator.name(), "coordinator stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{metric_failure, MetricResult};
    use crate::models::{EntityRecord, MetricValue, RegistrySnapshot};
    use crate::registry::MemoryRegistry;
    use crate::telemetry::HostSample;
    use std::time::Duration;

    struct FixedTelemetry;

    impl HostTelemetry for FixedTelemetry {
        fn sample(&self) -> Option<HostSample> {
            Some(HostSample {
                cpu_percent: Some(42.0),
                ram_percent: Some(50.0),
                disk_percent: Some(10.0),
                uptime_seconds: Some(86_400),
            })
        }
    }

    struct BrokenSource;

    impl RegistrySource for BrokenSource {
        fn fetch(&self) -> Result<RegistryFetch, StatsError> {
            Err(StatsError::source_failure("database locked"))
        }
    }

    fn light(id: &str, state: &str) -> EntityRecord {
        EntityRecord {
            entity_id: format!("light.{id}"),
            friendly_name: Some(format!("Light {id}")),
            state: Some(state.to_string()),
            last_changed: None,
            unit_of_measurement: None,
            device_id: None,
            disabled: false,
        }
    }

    fn home() -> MemoryRegistry {
        MemoryRegistry::ready(RegistrySnapshot {
            entities: vec![light("a", "on"), light("b", "off"), light("c", "on")],
            ..Default::default()
        })
    }

    fn no_fun() -> StatsOptions {
        StatsOptions { enable_fun_stats: false, ..Default::default() }
    }

    fn published(outcome: CycleOutcome) -> Arc<Snapshot> {
        match outcome {
            CycleOutcome::Published(snapshot) => snapshot,
            CycleOutcome::Skipped => panic!("cycle was skipped"),
        }
    }

    #[tokio::test]
    async fn test_refresh_publishes_full_snapshot() {
        let coordinator = Coordinator::builder(Arc::new(home()))
            .telemetry(Arc::new(FixedTelemetry))
            .build()
            .unwrap();

        let snapshot = published(coordinator.refresh().await.unwrap());
        assert_eq!(snapshot.sequence, 1);
        assert_eq!(snapshot.count("lights_on"), Some(2));
        assert_eq!(snapshot.get("host_cpu_pct"), Some(&MetricValue::Number(42.0)));
        assert!(snapshot.get("most_used_emoji").is_some());
        assert!(snapshot.failures.is_empty());

        let status = coordinator.status();
        assert_eq!(status.phase, Phase::Idle);
        assert_eq!(status.cycles_completed, 1);
        assert!(status.last_update.is_some());
    }

    #[tokio::test]
    async fn test_not_ready_leaves_state_unchanged() {
        let registry = home();
        let coordinator = Coordinator::builder(Arc::new(registry.clone())).build().unwrap();
        let first = published(coordinator.refresh().await.unwrap());

        registry.set_not_ready();
        assert!(matches!(coordinator.refresh().await.unwrap(), CycleOutcome::Skipped));

        let status = coordinator.status();
        assert_eq!(status.consecutive_failures, 0);
        assert_eq!(status.cycles_skipped, 1);
        assert_eq!(coordinator.snapshot().unwrap().sequence, first.sequence);
    }

    struct SlowTelemetry;

    impl HostTelemetry for SlowTelemetry {
        fn sample(&self) -> Option<HostSample> {
            std::thread::sleep(Duration::from_millis(300));
            FixedTelemetry.sample()
        }
    }

    struct SlowSource(MemoryRegistry);

    impl RegistrySource for SlowSource {
        fn fetch(&self) -> Result<RegistryFetch, StatsError> {
            std::thread::sleep(Duration::from_millis(300));
            self.0.fetch()
        }
    }

    #[tokio::test]
    async fn test_slow_inputs_do_not_block_the_runtime() {
        let coordinator = Coordinator::builder(Arc::new(SlowSource(home())))
            .telemetry(Arc::new(SlowTelemetry))
            .options(no_fun())
            .build()
            .unwrap();

        let ticks = Arc::new(AtomicU64::new(0));
        let ticker = {
            let ticks = ticks.clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        let snapshot = published(coordinator.refresh().await.unwrap());
        ticker.abort();

        assert_eq!(snapshot.get("host_cpu_pct"), Some(&MetricValue::Number(42.0)));
        // single-threaded runtime: ticks only advance while the reads are off-thread
        assert!(ticks.load(Ordering::SeqCst) >= 10);
    }

    #[tokio::test]
    async fn test_not_ready_before_first_cycle_publishes_nothing() {
        let coordinator = Coordinator::builder(Arc::new(MemoryRegistry::new())).build().unwrap();
        assert!(matches!(coordinator.refresh().await.unwrap(), CycleOutcome::Skipped));
        assert!(coordinator.snapshot().is_none());
    }

    #[tokio::test]
    async fn test_source_failure_keeps_previous_snapshot() {
        let coordinator = Coordinator::builder(Arc::new(BrokenSource)).build().unwrap();
        let err = coordinator.refresh().await.unwrap_err();
        assert!(matches!(err, StatsError::SourceFailure(_)));
        coordinator.refresh().await.unwrap_err();

        let status = coordinator.status();
        assert_eq!(status.phase, Phase::Failed);
        assert_eq!(status.consecutive_failures, 2);
        assert!(status.last_error.unwrap().contains("database locked"));
        assert!(coordinator.snapshot().is_none());
    }

    /// Fails while `broken` is set, otherwise serves `registry`.
    struct FlakySource {
        registry: MemoryRegistry,
        broken: AtomicBool,
    }

    impl RegistrySource for FlakySource {
        fn fetch(&self) -> Result<RegistryFetch, StatsError> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(StatsError::source_failure("connection reset"));
            }
            self.registry.fetch()
        }
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let source = Arc::new(FlakySource { registry: home(), broken: AtomicBool::new(false) });
        let coordinator = Coordinator::builder(source.clone()).options(no_fun()).build().unwrap();
        let first = published(coordinator.refresh().await.unwrap());

        source.broken.store(true, Ordering::SeqCst);
        coordinator.refresh().await.unwrap_err();
        assert_eq!(coordinator.status().consecutive_failures, 1);
        assert_eq!(coordinator.snapshot().unwrap().sequence, first.sequence);

        source.broken.store(false, Ordering::SeqCst);
        let second = published(coordinator.refresh().await.unwrap());
        let status = coordinator.status();
        assert_eq!(second.sequence, 2);
        assert_eq!(status.consecutive_failures, 0);
        assert_eq!(status.cycles_failed, 1);
        assert!(status.last_error.is_none());
    }

    #[tokio::test]
    async fn test_fun_toggle_skips_expensive_metrics() {
        let coordinator = Coordinator::builder(Arc::new(home())).options(no_fun()).build().unwrap();
        let snapshot = published(coordinator.refresh().await.unwrap());
        assert!(snapshot.get("most_used_emoji").is_none());
        assert!(snapshot.get("everything_off").is_none());
        assert_eq!(snapshot.count("light_count"), Some(3));
    }

    #[tokio::test]
    async fn test_host_telemetry_toggle() {
        let options = StatsOptions { enable_host_telemetry: false, ..no_fun() };
        let coordinator = Coordinator::builder(Arc::new(home()))
            .telemetry(Arc::new(FixedTelemetry))
            .options(options)
            .build()
            .unwrap();
        let snapshot = published(coordinator.refresh().await.unwrap());
        assert_eq!(snapshot.get("host_cpu_pct"), Some(&MetricValue::Unavailable));
    }

    fn count_lights(ctx: &MetricContext) -> MetricResult {
        Ok(vec![("lights", ctx.registry.entities.len().into())])
    }

    fn broken_cheap(_: &MetricContext) -> MetricResult {
        Err(metric_failure("broken_cheap", "sensor table missing"))
    }

    fn broken_expensive(_: &MetricContext) -> MetricResult {
        panic!("regex blew up")
    }

    fn fine_expensive(_: &MetricContext) -> MetricResult {
        Ok(vec![("fine_expensive", 7u64.into())])
    }

    #[tokio::test]
    async fn test_metric_failures_are_isolated() {
        let coordinator = Coordinator::builder(Arc::new(home()))
            .catalog(vec![
                MetricSpec::cheap("lights", count_lights),
                MetricSpec::cheap("broken_cheap", broken_cheap),
                MetricSpec::expensive("broken_expensive", broken_expensive),
                MetricSpec::expensive("fine_expensive", fine_expensive),
            ])
            .build()
            .unwrap();

        let snapshot = published(coordinator.refresh().await.unwrap());
        assert_eq!(snapshot.count("lights"), Some(3));
        assert_eq!(snapshot.count("fine_expensive"), Some(7));
        assert!(snapshot.get("broken_cheap").is_none());
        assert!(snapshot.failures["broken_cheap"].contains("sensor table missing"));
        assert!(snapshot.failures["broken_expensive"].contains("regex blew up"));
        assert_eq!(coordinator.status().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_options_apply_at_next_cycle() {
        let coordinator = Coordinator::builder(Arc::new(home())).build().unwrap();
        coordinator.refresh().await.unwrap();

        coordinator.update_options(no_fun()).unwrap();
        let status = coordinator.status();
        assert!(status.options.enable_fun_stats);
        assert_eq!(status.pending_options, Some(no_fun()));
        assert!(coordinator.snapshot().unwrap().get("house_mascot").is_some());

        let snapshot = published(coordinator.refresh().await.unwrap());
        assert!(snapshot.get("house_mascot").is_none());
        assert!(!coordinator.status().options.enable_fun_stats);
        assert!(coordinator.status().pending_options.is_none());
    }

    #[tokio::test]
    async fn test_invalid_options_rejected() {
        let coordinator = Coordinator::builder(Arc::new(home())).build().unwrap();
        let bad = StatsOptions { poll_interval_seconds: 5, ..Default::default() };
        assert!(matches!(coordinator.update_options(bad), Err(StatsError::ConfigInvalid(_))));
        assert!(coordinator.status().pending_options.is_none());

        let err = coordinator
            .update_options_json(&serde_json::json!({"scan_interval": "abc"}))
            .unwrap_err();
        assert!(matches!(err, StatsError::ConfigInvalid(_)));
        assert!(Coordinator::builder(Arc::new(home())).options(StatsOptions {
            poll_interval_seconds: 90_000,
            ..Default::default()
        })
        .build()
        .is_err());
    }

    #[tokio::test]
    async fn test_sequences_increase() {
        let coordinator = Coordinator::builder(Arc::new(home())).options(no_fun()).build().unwrap();
        let a = published(coordinator.refresh().await.unwrap());
        let b = published(coordinator.refresh().await.unwrap());
        assert!(b.sequence > a.sequence);
        assert!(b.generated_at >= a.generated_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_runs_first_cycle_then_on_interval() {
        let coordinator = Coordinator::builder(Arc::new(home())).options(no_fun()).build().unwrap();
        let mut sub = coordinator.subscribe();
        let handle = coordinator.start();

        let first = sub.next().await.unwrap();
        assert_eq!(first.sequence, 1);

        let started = Instant::now();
        let second = sub.next().await.unwrap();
        assert_eq!(second.sequence, 2);
        assert!(started.elapsed() >= Duration::from_secs(299));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_refresh_picks_up_changes() {
        let registry = home();
        let coordinator = Coordinator::builder(Arc::new(registry.clone())).options(no_fun()).build().unwrap();
        coordinator.refresh().await.unwrap();
        let mut sub = coordinator.subscribe();
        let handle = coordinator.start();

        registry.set_state("light.b", "on");
        handle.request_refresh();
        let snapshot = sub.next().await.unwrap();
        assert_eq!(snapshot.count("lights_on"), Some(3));
        assert_eq!(snapshot.sequence, 2);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_scheduler() {
        let coordinator = Coordinator::builder(Arc::new(home())).options(no_fun()).build().unwrap();
        let mut sub = coordinator.subscribe();
        let handle = coordinator.clone().start();
        sub.next().await.unwrap();

        handle.shutdown().await;
        assert!(!handle.is_running());
        assert_eq!(handle.status().phase, Phase::Stopped);
        assert!(sub.next().await.is_none());
        assert!(matches!(coordinator.refresh().await, Err(StatsError::Shutdown)));
        // the last snapshot stays readable
        assert_eq!(handle.snapshot().unwrap().sequence, 1);
    }
}

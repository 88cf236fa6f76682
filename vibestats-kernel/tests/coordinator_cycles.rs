use std::sync::Arc;
use std::time::Duration;
use vibestats_devkit::fixtures::RegistryBuilder;
use vibestats_devkit::test_utils::{assert_failed, assert_metric, wait_for_sequence, TestHarness};
use vibestats_kernel::metrics::{counts, metric_failure, MetricContext, MetricResult, MetricSpec};
use vibestats_kernel::{CycleOutcome, MetricValue, Phase, StatsError, StatsOptions};

const WAIT: Duration = Duration::from_secs(5);

fn home() -> TestHarness {
    TestHarness::new(
        RegistryBuilder::new()
            .lights(3, 1)
            .energy_sensor("sensor.fridge_energy", 1.5)
            .device("d1", "Kitchen hub")
            .integration("hue", "Hue")
            .build(),
    )
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_refresh_flood_during_cycle_runs_one_follow_up() {
    let harness = home();
    harness.source.set_fetch_delay(Duration::from_millis(200));
    let handle = harness.coordinator(StatsOptions::default()).unwrap().start();
    let mut subscriber = handle.subscribe();

    let source = harness.source.clone();
    wait_until(|| source.in_flight() == 1).await;
    for _ in 0..50 {
        handle.request_refresh();
    }

    wait_for_sequence(&mut subscriber, 2, WAIT).await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(harness.source.fetch_count(), 2);
    assert_eq!(handle.status().cycles_completed, 2);
    assert_eq!(handle.snapshot().unwrap().sequence, 2);
    handle.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sustained_refresh_flood_keeps_one_cycle_at_a_time() {
    let harness = home();
    harness.source.set_fetch_delay(Duration::from_millis(5));
    let handle = harness.coordinator(StatsOptions::default()).unwrap().start();

    let flooder = {
        let handle = handle.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_millis(1));
            let until = tokio::time::Instant::now() + Duration::from_secs(3);
            while tokio::time::Instant::now() < until {
                tick.tick().await;
                handle.request_refresh();
            }
        })
    };
    let direct = {
        let coordinator = handle.coordinator().clone();
        tokio::spawn(async move {
            for _ in 0..20 {
                coordinator.refresh().await.unwrap();
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
    };
    flooder.await.unwrap();
    direct.await.unwrap();

    assert!(harness.source.fetch_count() >= 20);
    assert_eq!(harness.source.max_concurrent_fetches(), 1);
    assert_eq!(handle.status().cycles_failed, 0);
    handle.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refresh_calls_never_overlap() {
    let harness = home();
    harness.source.set_fetch_delay(Duration::from_millis(20));
    let coordinator = harness.coordinator(StatsOptions::default()).unwrap();

    let tasks: Vec<_> = (0..5)
        .map(|_| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.refresh().await })
        })
        .collect();
    for task in tasks {
        assert!(matches!(task.await.unwrap(), Ok(CycleOutcome::Published(_))));
    }

    assert_eq!(harness.source.fetch_count(), 5);
    assert_eq!(harness.source.max_concurrent_fetches(), 1);
    assert_eq!(coordinator.snapshot().unwrap().sequence, 5);
}

#[tokio::test]
async fn test_not_ready_cycle_changes_nothing() {
    let harness = home();
    let coordinator = harness.coordinator(StatsOptions::default()).unwrap();
    let first = coordinator.snapshot();
    assert!(first.is_none());

    harness.source.not_ready_next();
    assert!(matches!(coordinator.refresh().await.unwrap(), CycleOutcome::Skipped));
    assert!(coordinator.snapshot().is_none());

    coordinator.refresh().await.unwrap();
    let published = coordinator.snapshot().unwrap();

    harness.source.not_ready_next();
    assert!(matches!(coordinator.refresh().await.unwrap(), CycleOutcome::Skipped));
    assert!(Arc::ptr_eq(&published, &coordinator.snapshot().unwrap()));

    let status = coordinator.status();
    assert_eq!(status.cycles_skipped, 2);
    assert_eq!(status.consecutive_failures, 0);
    assert_eq!(status.phase, Phase::Idle);
}

#[tokio::test]
async fn test_source_failures_keep_last_snapshot() {
    let harness = home();
    let coordinator = harness.coordinator(StatsOptions::default()).unwrap();
    coordinator.refresh().await.unwrap();

    harness.source.fail_next("connection reset").fail_next("connection reset");
    for _ in 0..2 {
        let err = coordinator.refresh().await.unwrap_err();
        assert!(matches!(err, StatsError::SourceFailure(_)));
    }

    let status = coordinator.status();
    assert_eq!(status.phase, Phase::Failed);
    assert_eq!(status.consecutive_failures, 2);
    assert!(status.last_error.unwrap().contains("connection reset"));
    assert_eq!(coordinator.snapshot().unwrap().sequence, 1);

    coordinator.refresh().await.unwrap();
    let status = coordinator.status();
    assert_eq!(status.phase, Phase::Idle);
    assert_eq!(status.consecutive_failures, 0);
    assert_eq!(status.last_sequence, 2);
}

fn broken_counter(_: &MetricContext) -> MetricResult {
    Err(metric_failure("broken_counter", "division by zero"))
}

fn exploding_fun_stat(_: &MetricContext) -> MetricResult {
    panic!("unexpected registry shape");
}

#[tokio::test]
async fn test_failing_metrics_are_isolated() {
    let harness = home();
    let mut catalog: Vec<MetricSpec> = counts::SPECS.to_vec();
    catalog.push(MetricSpec::cheap("broken_counter", broken_counter));
    catalog.push(MetricSpec::expensive("exploding_fun_stat", exploding_fun_stat));
    let coordinator = harness.coordinator_with(StatsOptions::default(), catalog).unwrap();

    let CycleOutcome::Published(snapshot) = coordinator.refresh().await.unwrap() else {
        panic!("registry is ready");
    };
    assert_failed(&snapshot, "broken_counter").unwrap();
    assert_failed(&snapshot, "exploding_fun_stat").unwrap();
    assert_metric(&snapshot, "lights_on", &MetricValue::Count(1)).unwrap();
    assert_metric(&snapshot, "total_devices", &MetricValue::Count(1)).unwrap();
    assert_eq!(coordinator.status().consecutive_failures, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_light_toggle_shows_after_next_cycle() {
    let harness = home();
    let handle = harness.coordinator(StatsOptions::default()).unwrap().start();
    let mut subscriber = handle.subscribe();

    let first = wait_for_sequence(&mut subscriber, 1, WAIT).await.unwrap();
    assert_metric(&first, "lights_on", &MetricValue::Count(1)).unwrap();

    assert!(harness.source.registry().set_state("light.lamp_2", "on"));
    // unchanged until a cycle runs
    assert_eq!(handle.snapshot().unwrap().count("lights_on"), Some(1));

    handle.request_refresh();
    let second = wait_for_sequence(&mut subscriber, 2, WAIT).await.unwrap();
    assert_metric(&second, "lights_on", &MetricValue::Count(2)).unwrap();
    assert_metric(&second, "active_entities_24h", &MetricValue::Count(1)).unwrap();
    handle.shutdown().await;
}

#[tokio::test]
async fn test_options_change_applies_at_next_cycle() {
    let harness = home();
    let coordinator = harness.coordinator(StatsOptions::default()).unwrap();
    coordinator.refresh().await.unwrap();
    assert!(coordinator.snapshot().unwrap().get("house_mascot").is_some());

    let next = StatsOptions {
        enable_fun_stats: false,
        enable_host_telemetry: false,
        ..StatsOptions::default()
    };
    coordinator.update_options(next.clone()).unwrap();
    let before = coordinator.snapshot().unwrap();
    assert!(before.get("house_mascot").is_some());
    assert_eq!(coordinator.status().pending_options, Some(next.clone()));

    let CycleOutcome::Published(after) = coordinator.refresh().await.unwrap() else {
        panic!("registry is ready");
    };
    assert!(after.get("house_mascot").is_none());
    assert!(after.get("everything_off").is_none());
    assert_metric(&after, "host_cpu_pct", &MetricValue::Unavailable).unwrap();
    assert_metric(&after, "energy_24h_kwh", &MetricValue::Number(1.5)).unwrap();

    let status = coordinator.status();
    assert_eq!(status.options, next);
    assert!(status.pending_options.is_none());
}

#[tokio::test]
async fn test_rejected_options_keep_current_ones() {
    let harness = home();
    let coordinator = harness.coordinator(StatsOptions::default()).unwrap();
    let err = coordinator
        .update_options_json(&serde_json::json!({"poll_interval_seconds": 5}))
        .unwrap_err();
    assert!(matches!(err, StatsError::ConfigInvalid(_)));
    assert_eq!(coordinator.effective_options(), StatsOptions::default());
    assert!(coordinator.status().pending_options.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_subscribers_only_see_complete_snapshots_in_order() {
    let harness = home();
    let coordinator = harness.coordinator(StatsOptions::default()).unwrap();
    let mut subscriber = coordinator.subscribe();

    let reader = tokio::spawn(async move {
        let mut seen = Vec::new();
        while let Some(snapshot) = subscriber.next().await {
            assert!(snapshot.get("lights_on").is_some());
            assert!(snapshot.get("most_used_emoji").is_some());
            seen.push(snapshot.sequence);
            if snapshot.sequence == 5 {
                break;
            }
        }
        seen
    });

    for _ in 0..5 {
        coordinator.refresh().await.unwrap();
    }
    let seen = tokio::time::timeout(WAIT, reader).await.unwrap().unwrap();
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(seen.last(), Some(&5));
}

#[tokio::test]
async fn test_shutdown_closes_everything() {
    let harness = home();
    let handle = harness.coordinator(StatsOptions::default()).unwrap().start();
    let mut subscriber = handle.subscribe();
    wait_for_sequence(&mut subscriber, 1, WAIT).await.unwrap();

    handle.shutdown().await;
    assert!(!handle.is_running());
    assert_eq!(handle.status().phase, Phase::Stopped);
    assert!(subscriber.next().await.is_none());
    assert!(matches!(handle.coordinator().refresh().await, Err(StatsError::Shutdown)));

    let again = tokio::time::timeout(WAIT, subscriber.next()).await.unwrap();
    assert!(again.is_none());
    let late = tokio::time::timeout(WAIT, handle.subscribe().next()).await.unwrap();
    assert!(late.is_none());

    let fetches = harness.source.fetch_count();
    handle.request_refresh();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.source.fetch_count(), fetches);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_entries_share_one_worker_pool() {
    let harness = home();
    let manager = harness.entry_manager(1);

    let first = manager
        .setup_entry(vibestats_kernel::EntryConf {
            title: "Upstairs".into(),
            unique_id: Some("upstairs".into()),
            options: StatsOptions::default(),
        })
        .await
        .unwrap();
    let second = manager
        .setup_entry(vibestats_kernel::EntryConf {
            title: "Downstairs".into(),
            unique_id: Some("downstairs".into()),
            options: StatsOptions::default(),
        })
        .await
        .unwrap();

    for entry in [&first, &second] {
        let snapshot = entry.handle.snapshot().unwrap();
        assert!(snapshot.get("random_daily_quote").is_some());
    }
    let titles: Vec<String> = manager.list().await.into_iter().map(|e| e.title).collect();
    assert_eq!(titles, vec!["Downstairs".to_string(), "Upstairs".to_string()]);
    manager.shutdown_all().await;
}

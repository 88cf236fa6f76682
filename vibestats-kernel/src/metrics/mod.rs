//! Metric functions computed from one registry snapshot.
//!
//! Each [`MetricSpec`] is a pure function of a [`MetricContext`]. Cheap
//! specs run inline on the scheduler task; expensive specs are handed to the
//! blocking worker pool by the coordinator. Either way every spec runs in
//! isolation: an error or a panic removes only that spec's values from the
//! cycle and records the reason under the metric's name.

pub mod constants;
pub mod counts;
pub mod fun;

use crate::config::StatsOptions;
use crate::error::StatsError;
use crate::models::{MetricValue, RegistrySnapshot};
use crate::telemetry::HostSample;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostClass {
    Cheap,
    Expensive,
}

pub type MetricOutput = Vec<(&'static str, MetricValue)>;
pub type MetricResult = Result<MetricOutput, StatsError>;

/// Inputs of one cycle, shared read-only by all metric functions.
#[derive(Debug, Clone)]
pub struct MetricContext {
    pub registry: Arc<RegistrySnapshot>,
    pub host: Option<HostSample>,
    /// Fixed for the whole cycle; time-dependent metrics only read this.
    pub now: OffsetDateTime,
}

impl MetricContext {
    pub fn new(registry: RegistrySnapshot, host: Option<HostSample>, now: OffsetDateTime) -> Self {
        Self {
            registry: Arc::new(registry),
            host,
            now,
        }
    }
}

/// Static description of one metric function.
///
/// `name` is the primary key the function publishes; failures are recorded
/// under it.
#[derive(Clone, Copy)]
pub struct MetricSpec {
    pub name: &'static str,
    pub cost: CostClass,
    pub enabled: fn(&StatsOptions) -> bool,
    pub compute: fn(&MetricContext) -> MetricResult,
}

impl MetricSpec {
    pub const fn cheap(name: &'static str, compute: fn(&MetricContext) -> MetricResult) -> Self {
        Self { name, cost: CostClass::Cheap, enabled: always, compute }
    }

    pub const fn expensive(name: &'static str, compute: fn(&MetricContext) -> MetricResult) -> Self {
        Self { name, cost: CostClass::Expensive, enabled: fun_stats_enabled, compute }
    }

    pub const fn gated(mut self, enabled: fn(&StatsOptions) -> bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn is_enabled(&self, options: &StatsOptions) -> bool {
        (self.enabled)(options)
    }
}

impl std::fmt::Debug for MetricSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricSpec")
            .field("name", &self.name)
            .field("cost", &self.cost)
            .finish()
    }
}

pub fn always(_: &StatsOptions) -> bool {
    true
}

pub fn fun_stats_enabled(options: &StatsOptions) -> bool {
    options.enable_fun_stats
}

/// The full built-in catalog: core counters followed by the fun statistics.
pub fn catalog() -> Vec<MetricSpec> {
    counts::SPECS.iter().chain(fun::SPECS.iter()).copied().collect()
}

/// Values and isolated failures produced by one pass over a set of specs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricPass {
    pub values: BTreeMap<String, MetricValue>,
    pub failures: BTreeMap<String, String>,
}

impl MetricPass {
    pub fn merge(&mut self, other: MetricPass) {
        self.values.extend(other.values);
        self.failures.extend(other.failures);
    }
}

/// Run every spec against `ctx`, catching errors and panics per spec.
pub fn run_metrics<'a>(specs: impl IntoIterator<Item = &'a MetricSpec>, ctx: &MetricContext) -> MetricPass {
    let mut pass = MetricPass::default();
    for spec in specs {
        let outcome = catch_unwind(AssertUnwindSafe(|| (spec.compute)(ctx)));
        let reason = match outcome {
            Ok(Ok(output)) => {
                for (key, value) in output {
                    pass.values.insert(key.to_string(), value);
                }
                continue;
            }
            Ok(Err(err)) => err.to_string(),
            Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
        };
        warn!(metric = spec.name, reason = %reason, "metric omitted from snapshot");
        pass.failures.insert(spec.name.to_string(), reason);
    }
    pass
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub fn metric_failure(metric: &str, reason: impl Into<String>) -> StatsError {
    StatsError::MetricFailure {
        metric: metric.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use time::macros::datetime;

    fn empty_ctx() -> MetricContext {
        MetricContext::new(RegistrySnapshot::default(), None, datetime!(2024-03-01 12:00 UTC))
    }

    fn ok_metric(_: &MetricContext) -> MetricResult {
        Ok(vec![("ok_metric", MetricValue::Count(1))])
    }

    fn failing_metric(_: &MetricContext) -> MetricResult {
        Err(metric_failure("failing_metric", "no data source"))
    }

    fn panicking_metric(_: &MetricContext) -> MetricResult {
        panic!("division by zero")
    }

    #[test]
    fn test_failures_are_isolated_per_metric() {
        let specs = [
            MetricSpec::cheap("ok_metric", ok_metric),
            MetricSpec::cheap("failing_metric", failing_metric),
            MetricSpec::cheap("panicking_metric", panicking_metric),
        ];
        let pass = run_metrics(&specs, &empty_ctx());

        assert_eq!(pass.values.get("ok_metric"), Some(&MetricValue::Count(1)));
        assert!(!pass.values.contains_key("failing_metric"));
        assert!(!pass.values.contains_key("panicking_metric"));
        assert!(pass.failures["failing_metric"].contains("no data source"));
        assert!(pass.failures["panicking_metric"].contains("division by zero"));
    }

    #[test]
    fn test_catalog_names_are_unique() {
        let specs = catalog();
        let names: HashSet<_> = specs.iter().map(|s| s.name).collect();
        assert_eq!(names.len(), specs.len());
    }

    #[test]
    fn test_catalog_primary_keys_are_published() {
        let ctx = empty_ctx();
        for spec in catalog() {
            let output = (spec.compute)(&ctx).expect("built-in metrics accept an empty registry");
            assert!(
                output.iter().any(|(key, _)| *key == spec.name),
                "{} does not publish its own name",
                spec.name
            );
        }
    }

    #[test]
    fn test_empty_registry_has_no_failures() {
        let specs = catalog();
        let pass = run_metrics(&specs, &empty_ctx());
        assert!(pass.failures.is_empty(), "unexpected failures: {:?}", pass.failures);
    }

    #[test]
    fn test_fun_specs_follow_toggle() {
        let disabled = StatsOptions { enable_fun_stats: false, ..Default::default() };
        for spec in catalog().iter().filter(|s| s.cost == CostClass::Expensive) {
            assert!(!spec.is_enabled(&disabled), "{} ignores the fun toggle", spec.name);
        }
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(33.333_33, 1), 33.3);
        assert_eq!(round_to(2.675_1, 2), 2.68);
        assert_eq!(round_to(0.0, 3), 0.0);
    }
}

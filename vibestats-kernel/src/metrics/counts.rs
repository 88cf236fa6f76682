//! Cheap metrics: counting and filtering over the registry snapshot.
//!
//! Everything here is a single linear pass and runs inline on the
//! scheduler task.

use super::{fun_stats_enabled, round_to, MetricContext, MetricResult, MetricSpec};
use crate::models::{MetricValue, RegistrySnapshot};
use std::collections::BTreeMap;
use time::Duration;

pub const STATE_ON: &str = "on";
pub const STATE_UNAVAILABLE: &str = "unavailable";
pub const STATE_UNKNOWN: &str = "unknown";

/// Domains whose lights/switches count as switchable loads.
const SWITCHABLE_DOMAINS: &[&str] = &["light", "switch"];

pub static SPECS: &[MetricSpec] = &[
    MetricSpec::cheap("total_entities", total_entities),
    MetricSpec::cheap("total_devices", total_devices),
    MetricSpec::cheap("integrations_count", integrations_count),
    MetricSpec::cheap("domain_counts", domain_counts),
    MetricSpec::cheap("automation_count", automation_count),
    MetricSpec::cheap("script_count", script_count),
    MetricSpec::cheap("scene_count", scene_count),
    MetricSpec::cheap("light_count", light_count),
    MetricSpec::cheap("switch_count", switch_count),
    MetricSpec::cheap("binary_sensor_count", binary_sensor_count),
    MetricSpec::cheap("sensor_count", sensor_count),
    MetricSpec::cheap("person_count", person_count),
    MetricSpec::cheap("camera_count", camera_count),
    MetricSpec::cheap("media_player_count", media_player_count),
    MetricSpec::cheap("cover_count", cover_count),
    MetricSpec::cheap("climate_count", climate_count),
    MetricSpec::cheap("unavailable_count", unavailable_count),
    MetricSpec::cheap("unknown_count", unknown_count),
    MetricSpec::cheap("disabled_entities", disabled_entities),
    MetricSpec::cheap("lights_on", lights_on),
    MetricSpec::cheap("active_entities_24h", active_entities_24h),
    MetricSpec::cheap("energy_24h_kwh", energy_24h_kwh),
    MetricSpec::cheap("host_cpu_pct", host_cpu_pct),
    MetricSpec::cheap("host_ram_pct", host_ram_pct),
    MetricSpec::cheap("host_disk_pct", host_disk_pct),
    MetricSpec::cheap("uptime_days", uptime),
    MetricSpec::cheap("everything_off", everything_off).gated(fun_stats_enabled),
];

pub fn count_domain(registry: &RegistrySnapshot, domain: &str) -> u64 {
    registry.states().filter(|e| e.domain() == domain).count() as u64
}

fn count_state(registry: &RegistrySnapshot, state: &str) -> u64 {
    registry.states().filter(|e| e.state_is(state)).count() as u64
}

macro_rules! domain_count {
    ($fn_name:ident, $domain:literal, $key:literal) => {
        fn $fn_name(ctx: &MetricContext) -> MetricResult {
            Ok(vec![($key, count_domain(&ctx.registry, $domain).into())])
        }
    };
}

domain_count!(automation_count, "automation", "automation_count");
domain_count!(script_count, "script", "script_count");
domain_count!(scene_count, "scene", "scene_count");
domain_count!(light_count, "light", "light_count");
domain_count!(switch_count, "switch", "switch_count");
domain_count!(binary_sensor_count, "binary_sensor", "binary_sensor_count");
domain_count!(sensor_count, "sensor", "sensor_count");
domain_count!(person_count, "person", "person_count");
domain_count!(camera_count, "camera", "camera_count");
domain_count!(media_player_count, "media_player", "media_player_count");
domain_count!(cover_count, "cover", "cover_count");
domain_count!(climate_count, "climate", "climate_count");

fn total_entities(ctx: &MetricContext) -> MetricResult {
    Ok(vec![("total_entities", ctx.registry.states().count().into())])
}

fn total_devices(ctx: &MetricContext) -> MetricResult {
    Ok(vec![("total_devices", ctx.registry.devices.len().into())])
}

fn integrations_count(ctx: &MetricContext) -> MetricResult {
    Ok(vec![("integrations_count", ctx.registry.config_entries.len().into())])
}

/// Per-domain breakdown plus the number of distinct domains.
fn domain_counts(ctx: &MetricContext) -> MetricResult {
    let mut tally: BTreeMap<String, u64> = BTreeMap::new();
    for entity in ctx.registry.states() {
        *tally.entry(entity.domain().to_string()).or_insert(0) += 1;
    }
    let unique = tally.len();
    let breakdown = tally
        .into_iter()
        .map(|(domain, n)| (domain, MetricValue::Count(n)))
        .collect();
    Ok(vec![
        ("domain_counts", MetricValue::Attributes(breakdown)),
        ("unique_domains_count", unique.into()),
    ])
}

fn unavailable_count(ctx: &MetricContext) -> MetricResult {
    Ok(vec![("unavailable_count", count_state(&ctx.registry, STATE_UNAVAILABLE).into())])
}

fn unknown_count(ctx: &MetricContext) -> MetricResult {
    Ok(vec![("unknown_count", count_state(&ctx.registry, STATE_UNKNOWN).into())])
}

fn disabled_entities(ctx: &MetricContext) -> MetricResult {
    let disabled = ctx.registry.entities.iter().filter(|e| e.disabled).count();
    Ok(vec![("disabled_entities", disabled.into())])
}

fn lights_on(ctx: &MetricContext) -> MetricResult {
    let on = ctx
        .registry
        .states()
        .filter(|e| e.domain() == "light" && e.state_is(STATE_ON))
        .count();
    Ok(vec![("lights_on", on.into())])
}

/// Entities whose state changed within the 24 hours before the cycle's `now`.
fn active_entities_24h(ctx: &MetricContext) -> MetricResult {
    let cutoff = ctx.now - Duration::hours(24);
    let active = ctx
        .registry
        .states()
        .filter(|e| e.last_changed.is_some_and(|changed| changed >= cutoff))
        .count();
    Ok(vec![("active_entities_24h", active.into())])
}

/// Sum of every kWh / Wh sensor, in kWh.
fn energy_24h_kwh(ctx: &MetricContext) -> MetricResult {
    let (total, contributing) = aggregate_energy(&ctx.registry);
    Ok(vec![
        ("energy_24h_kwh", total.into()),
        ("energy_entity_count", contributing.into()),
    ])
}

/// Returns the rounded kWh total and the number of contributing sensors.
pub fn aggregate_energy(registry: &RegistrySnapshot) -> (f64, u64) {
    let mut total = 0.0;
    let mut contributing = 0u64;
    for entity in registry.states() {
        let Some(unit) = entity.unit_of_measurement.as_deref() else {
            continue;
        };
        let divisor = match unit.to_ascii_lowercase().as_str() {
            "kwh" => 1.0,
            "wh" => 1000.0,
            _ => continue,
        };
        let Some(state) = entity.state.as_deref() else {
            continue;
        };
        if matches!(state, STATE_UNAVAILABLE | STATE_UNKNOWN | "") {
            continue;
        }
        if let Ok(value) = state.trim().parse::<f64>() {
            if value.is_finite() {
                total += value / divisor;
                contributing += 1;
            }
        }
    }
    (round_to(total, 3), contributing)
}

fn percent(value: Option<f64>) -> MetricValue {
    value.map(|pct| round_to(pct, 1)).into()
}

fn host_cpu_pct(ctx: &MetricContext) -> MetricResult {
    Ok(vec![("host_cpu_pct", percent(ctx.host.as_ref().and_then(|h| h.cpu_percent)))])
}

fn host_ram_pct(ctx: &MetricContext) -> MetricResult {
    Ok(vec![("host_ram_pct", percent(ctx.host.as_ref().and_then(|h| h.ram_percent)))])
}

fn host_disk_pct(ctx: &MetricContext) -> MetricResult {
    Ok(vec![("host_disk_pct", percent(ctx.host.as_ref().and_then(|h| h.disk_percent)))])
}

fn uptime(ctx: &MetricContext) -> MetricResult {
    let secs = ctx.host.as_ref().and_then(|h| h.uptime_seconds);
    Ok(vec![
        ("uptime_days", secs.map(|s| s / 86_400).into()),
        ("uptime_hours", secs.map(|s| s / 3_600).into()),
    ])
}

/// True when no light or switch reports `on`.
fn everything_off(ctx: &MetricContext) -> MetricResult {
    let any_on = ctx
        .registry
        .states()
        .any(|e| SWITCHABLE_DOMAINS.contains(&e.domain()) && e.state_is(STATE_ON));
    Ok(vec![("everything_off", (!any_on).into())])
}

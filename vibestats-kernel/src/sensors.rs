//! Display metadata for published metrics.
//!
//! Every sensor reads one metric from the latest snapshot, plus optional
//! extra attributes taken from sibling metrics. Lookup is by table; there is
//! no per-sensor code.

use crate::config::StatsOptions;
use crate::models::MetricValue;
use crate::snapshot::Snapshot;
use serde::Serialize;
use std::collections::BTreeMap;
use Category::{Core, Fun, Health, System};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Core,
    Health,
    System,
    Fun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Sensor,
    Binary,
}

impl SensorKind {
    pub fn domain(self) -> &'static str {
        match self {
            SensorKind::Sensor => "sensor",
            SensorKind::Binary => "binary_sensor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateClass {
    Measurement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Energy,
}

pub const UNIT_PERCENT: &str = "%";
pub const UNIT_KWH: &str = "kWh";
pub const UNIT_DAYS: &str = "d";
pub const UNIT_HOURS: &str = "h";
pub const UNIT_CHARS: &str = "chars";

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SensorDescription {
    /// Stable sensor key, also the suffix of its unique id.
    pub key: &'static str,
    /// Snapshot key holding the sensor state.
    pub metric: &'static str,
    pub name: &'static str,
    /// Short dashboard label.
    pub label: &'static str,
    pub icon: &'static str,
    pub unit: Option<&'static str>,
    pub state_class: Option<StateClass>,
    pub device_class: Option<DeviceClass>,
    pub category: Category,
    pub kind: SensorKind,
    /// Attribute name -> snapshot key.
    pub extra_attrs: &'static [(&'static str, &'static str)],
    pub on_dashboard: bool,
}

const fn sensor(
    key: &'static str,
    metric: &'static str,
    name: &'static str,
    label: &'static str,
    icon: &'static str,
    category: Category,
) -> SensorDescription {
    SensorDescription {
        key,
        metric,
        name,
        label,
        icon,
        unit: None,
        state_class: None,
        device_class: None,
        category,
        kind: SensorKind::Sensor,
        extra_attrs: &[],
        on_dashboard: true,
    }
}

impl SensorDescription {
    const fn measurement(mut self) -> Self {
        self.state_class = Some(StateClass::Measurement);
        self
    }

    const fn unit(mut self, unit: &'static str) -> Self {
        self.unit = Some(unit);
        self
    }

    const fn device_class(mut self, class: DeviceClass) -> Self {
        self.device_class = Some(class);
        self
    }

    const fn attrs(mut self, attrs: &'static [(&'static str, &'static str)]) -> Self {
        self.extra_attrs = attrs;
        self
    }

    const fn binary(mut self) -> Self {
        self.kind = SensorKind::Binary;
        self
    }

    const fn hidden(mut self) -> Self {
        self.on_dashboard = false;
        self
    }

    /// `sensor.total_devices` style id derived from the key.
    pub fn entity_id(&self) -> String {
        let object_id = self.key.strip_prefix("vibe_").unwrap_or(self.key);
        format!("{}.{}", self.kind.domain(), object_id)
    }

    pub fn unique_id(&self, entry_id: &str) -> String {
        format!("{entry_id}_{}", self.key)
    }

    /// Current state and extra attributes, `Unavailable` when missing.
    pub fn read(&self, snapshot: Option<&Snapshot>) -> SensorReading {
        let lookup = |key: &str| {
            snapshot
                .map(|s| s.value_or_unavailable(key))
                .unwrap_or(MetricValue::Unavailable)
        };
        let attributes = self
            .extra_attrs
            .iter()
            .map(|(attr, key)| (attr.to_string(), lookup(key)))
            .collect();
        SensorReading {
            state: lookup(self.metric),
            attributes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    pub state: MetricValue,
    pub attributes: BTreeMap<String, MetricValue>,
}

impl SensorReading {
    /// State rendered the way the host UI shows it.
    pub fn state_text(&self, kind: SensorKind) -> String {
        match (&self.state, kind) {
            (MetricValue::Unavailable, _) => "unavailable".into(),
            (MetricValue::Bool(b), SensorKind::Binary) => String::from(if *b { "on" } else { "off" }),
            (MetricValue::Bool(b), SensorKind::Sensor) => b.to_string(),
            (MetricValue::Count(n), _) => n.to_string(),
            (MetricValue::Number(n), _) => n.to_string(),
            (MetricValue::Text(s), _) => s.clone(),
            (MetricValue::Attributes(_), _) => "unknown".into(),
        }
    }
}

pub static SENSORS: &[SensorDescription] = &[
    sensor("vibe_total_devices", "total_devices", "Total Devices", "Total Devices", "mdi:devices", Core).measurement(),
    sensor("vibe_total_entities", "total_entities", "Total Entities", "Total Entities", "mdi:format-list-bulleted", Core)
        .measurement()
        .attrs(&[("domain_breakdown", "domain_counts")]),
    sensor("vibe_integrations_count", "integrations_count", "Integrations Count", "Integrations", "mdi:puzzle", Core).measurement(),
    sensor("vibe_unique_domains_count", "unique_domains_count", "Unique Domains", "Unique Domains", "mdi:tag-multiple", Core).measurement(),
    sensor("vibe_automation_count", "automation_count", "Automation Count", "Automations", "mdi:robot", Core).measurement(),
    sensor("vibe_script_count", "script_count", "Script Count", "Scripts", "mdi:script-text", Core).measurement(),
    sensor("vibe_scene_count", "scene_count", "Scene Count", "Scenes", "mdi:palette", Core).measurement(),
    sensor("vibe_light_count", "light_count", "Light Count", "Lights", "mdi:lightbulb-multiple", Core).measurement().hidden(),
    sensor("vibe_switch_count", "switch_count", "Switch Count", "Switches", "mdi:toggle-switch", Core).measurement().hidden(),
    sensor("vibe_binary_sensor_count", "binary_sensor_count", "Binary Sensor Count", "Binary Sensors", "mdi:radiobox-marked", Core)
        .measurement()
        .hidden(),
    sensor("vibe_sensor_count", "sensor_count", "Sensor Count", "Sensors", "mdi:thermometer", Core).measurement().hidden(),
    sensor("vibe_person_count", "person_count", "Person Count", "People", "mdi:account-group", Core).measurement().hidden(),
    sensor("vibe_camera_count", "camera_count", "Camera Count", "Cameras", "mdi:cctv", Core).measurement().hidden(),
    sensor("vibe_media_player_count", "media_player_count", "Media Player Count", "Media Players", "mdi:speaker", Core)
        .measurement()
        .hidden(),
    sensor("vibe_cover_count", "cover_count", "Cover Count", "Covers", "mdi:window-shutter", Core).measurement().hidden(),
    sensor("vibe_climate_count", "climate_count", "Climate Count", "Climate", "mdi:thermostat", Core).measurement().hidden(),
    sensor("vibe_active_devices_24h", "active_entities_24h", "Active Entities (24 h)", "Active (24 h)", "mdi:pulse", Core).measurement(),
    sensor("vibe_lights_on", "lights_on", "Lights Currently On", "Lights On", "mdi:lightbulb-on", Health).measurement(),
    sensor("vibe_unavailable_count", "unavailable_count", "Unavailable Entities", "Unavailable", "mdi:alert-circle-outline", Health)
        .measurement(),
    sensor("vibe_unknown_count", "unknown_count", "Unknown State Entities", "Unknown State", "mdi:help-circle-outline", Health)
        .measurement(),
    sensor("vibe_disabled_entities", "disabled_entities", "Disabled Entities", "Disabled Entities", "mdi:eye-off-outline", Health)
        .measurement(),
    sensor("vibe_host_cpu_pct", "host_cpu_pct", "Host CPU Usage", "CPU %", "mdi:cpu-64-bit", System)
        .measurement()
        .unit(UNIT_PERCENT),
    sensor("vibe_host_ram_pct", "host_ram_pct", "Host RAM Usage", "RAM %", "mdi:memory", System)
        .measurement()
        .unit(UNIT_PERCENT),
    sensor("vibe_host_disk_pct", "host_disk_pct", "Host Disk Usage", "Disk %", "mdi:harddisk", System)
        .measurement()
        .unit(UNIT_PERCENT),
    sensor("vibe_uptime_hours", "uptime_hours", "Uptime (Hours)", "Uptime (h)", "mdi:clock-outline", System)
        .measurement()
        .unit(UNIT_HOURS),
    sensor("vibe_uptime_days", "uptime_days", "Uptime (Days)", "Uptime (days)", "mdi:timer-outline", System)
        .measurement()
        .unit(UNIT_DAYS),
    sensor("vibe_energy_24h_kwh", "energy_24h_kwh", "Energy Total (kWh)", "Energy 24 h (kWh)", "mdi:lightning-bolt", System)
        .measurement()
        .unit(UNIT_KWH)
        .device_class(DeviceClass::Energy)
        .attrs(&[("contributing_sensors", "energy_entity_count")]),
    sensor("vibe_most_used_emoji", "most_used_emoji", "Most Used Emoji", "Most Used Emoji", "mdi:emoticon-outline", Fun)
        .attrs(&[("occurrences", "most_used_emoji_count")]),
    sensor("vibe_devices_named_after_pokemon", "devices_named_after_pokemon", "Devices Named After Pokémon", "Pokémon Devices", "mdi:pokeball", Fun)
        .measurement(),
    sensor("vibe_emoji_density", "emoji_density", "Emoji Density", "Emoji Density %", "mdi:percent", Fun)
        .measurement()
        .unit(UNIT_PERCENT),
    sensor("vibe_avg_entity_id_length", "avg_entity_id_length", "Avg Entity ID Length", "Avg Entity ID Len", "mdi:ruler", Fun)
        .measurement()
        .unit(UNIT_CHARS)
        .attrs(&[("longest_entity_id", "longest_entity_id"), ("shortest_entity_id", "shortest_entity_id")]),
    sensor("vibe_most_redundant_name", "most_redundant_name", "Most Redundant Name", "Most Redundant Name", "mdi:content-duplicate", Fun),
    sensor("vibe_names_with_numbers", "names_with_numbers", "Entity Names Containing Numbers", "Names w/ Numbers", "mdi:numeric", Fun)
        .measurement(),
    sensor("vibe_house_mascot", "house_mascot", "House Mascot", "Today's Mascot", "mdi:home-heart", Fun),
    sensor("vibe_random_daily_device_quote", "random_daily_quote", "Random Daily Device Quote", "Daily Quote", "mdi:comment-quote", Fun),
    sensor("vibe_everything_off_party_mode", "everything_off", "Everything Off (Party Mode)", "Party Mode 🎉", "mdi:party-popper", Fun)
        .binary(),
];

/// Sensors an entry exposes under `options`; fun sensors only with the fun toggle.
pub fn sensors_for(options: &StatsOptions) -> impl Iterator<Item = &'static SensorDescription> + '_ {
    SENSORS
        .iter()
        .filter(move |s| s.category != Category::Fun || options.enable_fun_stats)
}

pub fn find(key: &str) -> Option<&'static SensorDescription> {
    SENSORS.iter().find(|s| s.key == key)
}

/// One tile of the dashboard view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardTile {
    pub label: &'static str,
    pub icon: &'static str,
    pub section: Category,
    pub state: String,
    pub attributes: BTreeMap<String, MetricValue>,
}

/// Dashboard tiles keyed by entity id.
pub fn dashboard(snapshot: Option<&Snapshot>, options: &StatsOptions) -> BTreeMap<String, DashboardTile> {
    sensors_for(options)
        .filter(|s| s.on_dashboard)
        .map(|s| {
            let reading = s.read(snapshot);
            let tile = DashboardTile {
                label: s.label,
                icon: s.icon,
                section: s.category,
                state: reading.state_text(s.kind),
                attributes: reading.attributes,
            };
            (s.entity_id(), tile)
        })
        .collect()
}

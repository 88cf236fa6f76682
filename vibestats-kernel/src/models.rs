use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// Device registry entry.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DeviceRecord {
    pub id: String,
    pub name: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

/// Entity registry entry merged with its current state.
///
/// `state` is `None` for disabled entities, which the host keeps in the
/// registry without a state object.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EntityRecord {
    pub entity_id: String,
    pub friendly_name: Option<String>,
    pub state: Option<String>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub last_changed: Option<OffsetDateTime>,
    pub unit_of_measurement: Option<String>,
    pub device_id: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

impl EntityRecord {
    /// Domain part of the entity id (`light` for `light.kitchen`).
    pub fn domain(&self) -> &str {
        self.entity_id
            .split_once('.')
            .map(|(domain, _)| domain)
            .unwrap_or(self.entity_id.as_str())
    }

    /// Entities that currently carry a state value.
    pub fn has_state(&self) -> bool {
        !self.disabled && self.state.is_some()
    }

    pub fn state_is(&self, value: &str) -> bool {
        self.state.as_deref() == Some(value)
    }
}

/// Integration / config-entry record.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ConfigEntryRecord {
    pub entry_id: String,
    pub domain: String,
    pub title: String,
    #[serde(default)]
    pub disabled: bool,
}

/// Everything read from the host platform in one cycle.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct RegistrySnapshot {
    #[serde(default)]
    pub devices: Vec<DeviceRecord>,
    #[serde(default)]
    pub entities: Vec<EntityRecord>,
    #[serde(default)]
    pub config_entries: Vec<ConfigEntryRecord>,
}

impl RegistrySnapshot {
    /// Entities with a live state object (what the host's state machine lists).
    pub fn states(&self) -> impl Iterator<Item = &EntityRecord> {
        self.entities.iter().filter(|e| e.has_state())
    }

    /// Non-empty friendly names of live entities.
    pub fn friendly_names(&self) -> impl Iterator<Item = &str> {
        self.states()
            .filter_map(|e| e.friendly_name.as_deref())
            .filter(|name| !name.is_empty())
    }
}

/// A single published value.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum MetricValue {
    /// Explicit "no data" sentinel (serialized as `null`).
    Unavailable,
    Bool(bool),
    Count(u64),
    Number(f64),
    Text(String),
    Attributes(BTreeMap<String, MetricValue>),
}

impl MetricValue {
    pub fn as_count(&self) -> Option<u64> {
        match self {
            MetricValue::Count(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, MetricValue::Unavailable)
    }
}

impl From<u64> for MetricValue {
    fn from(n: u64) -> Self {
        MetricValue::Count(n)
    }
}

impl From<usize> for MetricValue {
    fn from(n: usize) -> Self {
        MetricValue::Count(n as u64)
    }
}

impl From<f64> for MetricValue {
    fn from(n: f64) -> Self {
        MetricValue::Number(n)
    }
}

impl From<bool> for MetricValue {
    fn from(b: bool) -> Self {
        MetricValue::Bool(b)
    }
}

impl From<String> for MetricValue {
    fn from(s: String) -> Self {
        MetricValue::Text(s)
    }
}

impl From<&str> for MetricValue {
    fn from(s: &str) -> Self {
        MetricValue::Text(s.to_string())
    }
}

impl<T: Into<MetricValue>> From<Option<T>> for MetricValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(MetricValue::Unavailable)
    }
}

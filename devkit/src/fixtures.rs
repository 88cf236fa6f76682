/*!
Fixtures de registre

Builders pour les snapshots de registre fournis aux coordinateurs testés.
*/

use time::OffsetDateTime;
use vibestats_kernel::models::{ConfigEntryRecord, DeviceRecord, EntityRecord, RegistrySnapshot};

/// Builder for one entity record. Entities start enabled, with state `on`.
#[derive(Debug, Clone)]
pub struct EntityBuilder {
    record: EntityRecord,
}

impl EntityBuilder {
    pub fn new(entity_id: &str) -> Self {
        Self {
            record: EntityRecord {
                entity_id: entity_id.to_string(),
                friendly_name: None,
                state: Some("on".to_string()),
                last_changed: None,
                unit_of_measurement: None,
                device_id: None,
                disabled: false,
            },
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.record.friendly_name = Some(name.to_string());
        self
    }

    pub fn state(mut self, state: &str) -> Self {
        self.record.state = Some(state.to_string());
        self
    }

    pub fn unit(mut self, unit: &str) -> Self {
        self.record.unit_of_measurement = Some(unit.to_string());
        self
    }

    pub fn changed_at(mut self, at: OffsetDateTime) -> Self {
        self.record.last_changed = Some(at);
        self
    }

    /// Disabled entities have no state object.
    pub fn disabled(mut self) -> Self {
        self.record.disabled = true;
        self.record.state = None;
        self
    }

    pub fn device(mut self, device_id: &str) -> Self {
        self.record.device_id = Some(device_id.to_string());
        self
    }

    pub fn build(self) -> EntityRecord {
        self.record
    }
}

impl From<EntityBuilder> for EntityRecord {
    fn from(builder: EntityBuilder) -> Self {
        builder.build()
    }
}

/// Builder for a whole registry snapshot.
#[derive(Debug, Clone, Default)]
pub struct RegistryBuilder {
    snapshot: RegistrySnapshot,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(mut self, entity: impl Into<EntityRecord>) -> Self {
        self.snapshot.entities.push(entity.into());
        self
    }

    pub fn light(self, entity_id: &str, on: bool) -> Self {
        self.entity(EntityBuilder::new(entity_id).state(if on { "on" } else { "off" }))
    }

    /// `total` lights named `light.lamp_N`, the first `on` of them switched on.
    pub fn lights(mut self, total: usize, on: usize) -> Self {
        for i in 0..total {
            self = self.light(&format!("light.lamp_{i}"), i < on);
        }
        self
    }

    pub fn energy_sensor(self, entity_id: &str, kwh: f64) -> Self {
        self.entity(EntityBuilder::new(entity_id).state(&kwh.to_string()).unit("kWh"))
    }

    pub fn device(mut self, id: &str, name: &str) -> Self {
        self.snapshot.devices.push(DeviceRecord {
            id: id.to_string(),
            name: Some(name.to_string()),
            manufacturer: None,
            model: None,
            disabled: false,
        });
        self
    }

    pub fn integration(mut self, domain: &str, title: &str) -> Self {
        let entry_id = format!("{domain}_{}", self.snapshot.config_entries.len());
        self.snapshot.config_entries.push(ConfigEntryRecord {
            entry_id,
            domain: domain.to_string(),
            title: title.to_string(),
            disabled: false,
        });
        self
    }

    pub fn build(self) -> RegistrySnapshot {
        self.snapshot
    }
}

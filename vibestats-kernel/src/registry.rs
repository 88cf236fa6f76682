/**
 * ACCÈS REGISTRE - Vues en lecture seule sur le registre de la plateforme
 *
 * RÔLE : Fournit appareils, entités et entrées de config à chaque cycle.
 * NotReady pendant le démarrage de l'hôte est un cas normal, jamais une erreur.
 *
 * SOURCES : MemoryRegistry (alimenté par l'hôte), JsonFileRegistry (export disque).
 */

use crate::error::StatsError;
use crate::models::{EntityRecord, RegistrySnapshot};
use crate::state::{new_shared, Shared};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::debug;

/// Result of one registry read.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryFetch {
    Ready(RegistrySnapshot),
    NotReady,
}

/// Synchronous, read-only access to the host registries.
pub trait RegistrySource: Send + Sync {
    fn fetch(&self) -> Result<RegistryFetch, StatsError>;
}

/// In-memory registry maintained by the embedding host.
///
/// Clones share the same underlying registry.
#[derive(Clone, Default)]
pub struct MemoryRegistry {
    inner: Shared<Option<RegistrySnapshot>>,
}

impl MemoryRegistry {
    /// A registry that reports `NotReady` until [`MemoryRegistry::set_ready`].
    pub fn new() -> Self {
        Self { inner: new_shared(None) }
    }

    pub fn ready(snapshot: RegistrySnapshot) -> Self {
        Self { inner: new_shared(Some(snapshot)) }
    }

    pub fn set_ready(&self, snapshot: RegistrySnapshot) {
        *self.inner.write() = Some(snapshot);
    }

    pub fn set_not_ready(&self) {
        *self.inner.write() = None;
    }

    /// Apply a mutation to the registry; no-op while not ready.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut RegistrySnapshot),
    {
        if let Some(snapshot) = self.inner.write().as_mut() {
            f(snapshot);
        }
    }

    /// Change one entity's state, stamping `last_changed` with the current time.
    /// Returns false when the entity is unknown.
    pub fn set_state(&self, entity_id: &str, state: &str) -> bool {
        let mut guard = self.inner.write();
        let Some(entity) = guard
            .as_mut()
            .and_then(|s| s.entities.iter_mut().find(|e| e.entity_id == entity_id))
        else {
            return false;
        };
        if entity.state.as_deref() != Some(state) {
            entity.state = Some(state.to_string());
            entity.last_changed = Some(OffsetDateTime::now_utc());
        }
        true
    }

    pub fn upsert_entity(&self, record: EntityRecord) {
        self.update(|snapshot| {
            match snapshot.entities.iter_mut().find(|e| e.entity_id == record.entity_id) {
                Some(existing) => *existing = record,
                None => snapshot.entities.push(record),
            }
        });
    }
}

impl RegistrySource for MemoryRegistry {
    fn fetch(&self) -> Result<RegistryFetch, StatsError> {
        Ok(match self.inner.read().as_ref() {
            Some(snapshot) => RegistryFetch::Ready(snapshot.clone()),
            None => RegistryFetch::NotReady,
        })
    }
}

/// Registry export written to disk by the host platform.
///
/// A missing file means the host has not exported yet (`NotReady`); an
/// unreadable or malformed file is a source failure.
#[derive(Debug, Clone)]
pub struct JsonFileRegistry {
    path: PathBuf,
}

impl JsonFileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RegistrySource for JsonFileRegistry {
    fn fetch(&self) -> Result<RegistryFetch, StatsError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "registry export not present yet");
            return Ok(RegistryFetch::NotReady);
        }
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            StatsError::source_failure(format!("read {}: {e}", self.path.display()))
        })?;
        let snapshot: RegistrySnapshot = serde_json::from_str(&content).map_err(|e| {
            StatsError::source_failure(format!("parse {}: {e}", self.path.display()))
        })?;
        Ok(RegistryFetch::Ready(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn light(entity_id: &str, state: &str) -> EntityRecord {
        EntityRecord {
            entity_id: entity_id.to_string(),
            friendly_name: None,
            state: Some(state.to_string()),
            last_changed: None,
            unit_of_measurement: None,
            device_id: None,
            disabled: false,
        }
    }

    #[test]
    fn test_memory_registry_not_ready_until_set() {
        let registry = MemoryRegistry::new();
        assert_eq!(registry.fetch().unwrap(), RegistryFetch::NotReady);

        registry.set_ready(RegistrySnapshot::default());
        assert!(matches!(registry.fetch().unwrap(), RegistryFetch::Ready(_)));
    }

    #[test]
    fn test_memory_registry_set_state_stamps_last_changed() {
        let registry = MemoryRegistry::ready(RegistrySnapshot {
            entities: vec![light("light.kitchen", "off")],
            ..Default::default()
        });
        assert!(registry.set_state("light.kitchen", "on"));
        assert!(!registry.set_state("light.missing", "on"));

        let RegistryFetch::Ready(snapshot) = registry.fetch().unwrap() else {
            panic!("registry should be ready");
        };
        assert!(snapshot.entities[0].state_is("on"));
        assert!(snapshot.entities[0].last_changed.is_some());
    }

    #[test]
    fn test_memory_registry_fetch_is_a_copy() {
        let registry = MemoryRegistry::ready(RegistrySnapshot {
            entities: vec![light("light.a", "on")],
            ..Default::default()
        });
        let RegistryFetch::Ready(before) = registry.fetch().unwrap() else {
            panic!("registry should be ready");
        };
        registry.upsert_entity(light("light.b", "off"));
        assert_eq!(before.entities.len(), 1);
    }

    #[test]
    fn test_json_file_registry_missing_file_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let source = JsonFileRegistry::new(dir.path().join("registry.json"));
        assert_eq!(source.fetch().unwrap(), RegistryFetch::NotReady);
    }

    #[test]
    fn test_json_file_registry_malformed_is_source_failure() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let source = JsonFileRegistry::new(file.path());
        assert!(matches!(source.fetch(), Err(StatsError::SourceFailure(_))));
    }

    #[test]
    fn test_json_file_registry_reads_export() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"entities": [{{"entity_id": "light.a", "friendly_name": "A", "state": "on"}}]}}"#
        )
        .unwrap();
        let source = JsonFileRegistry::new(file.path());
        let RegistryFetch::Ready(snapshot) = source.fetch().unwrap() else {
            panic!("export should be readable");
        };
        assert_eq!(snapshot.entities.len(), 1);
    }
}

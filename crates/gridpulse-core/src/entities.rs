// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of GridPulse.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! In-process entity/state registry
//!
//! Holds one sensor entity per enabled dataset of every installation and
//! re-renders them whenever an installation publishes a snapshot or changes
//! health. This is what the state API reads.

use chrono::{DateTime, Utc};
use gridpulse_types::{
    DatasetId, InstallationHealth, InstallationId, PresentedState, SensorDescriptor, Snapshot,
};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::installation::Installation;
use crate::presenters::{describe, present};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityRecord {
    pub entity_id: String,
    pub installation: InstallationId,
    pub descriptor: SensorDescriptor,
    #[serde(flatten)]
    pub presented: PresentedState,
    /// Last time state or attributes changed
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallationSummary {
    pub id: InstallationId,
    #[serde(flatten)]
    pub health: InstallationHealth,
    pub entities: Vec<String>,
}

#[derive(Debug, Default)]
struct Inner {
    entities: BTreeMap<String, EntityRecord>,
    installations: BTreeMap<InstallationId, InstallationHealth>,
}

/// Cheap to clone; clones share the same state
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `sensor.gridpulse_{installation}_{dataset}`
    pub fn entity_id(installation: &InstallationId, dataset: DatasetId) -> String {
        format!("sensor.gridpulse_{}_{}", installation.slug(), dataset.slug())
    }

    /// Create (or recreate) the entities of an installation, all unavailable
    pub fn register_installation(
        &self,
        installation: &InstallationId,
        datasets: &BTreeSet<DatasetId>,
    ) {
        let now = Utc::now();
        let mut inner = self.inner.write();
        inner
            .entities
            .retain(|_, record| &record.installation != installation);

        for dataset in datasets {
            let entity_id = Self::entity_id(installation, *dataset);
            debug!(entity_id = %entity_id, "Registering entity");
            inner.entities.insert(
                entity_id.clone(),
                EntityRecord {
                    entity_id,
                    installation: installation.clone(),
                    descriptor: describe(installation, *dataset),
                    presented: PresentedState::unavailable(),
                    last_updated: now,
                },
            );
        }
        inner
            .installations
            .insert(installation.clone(), InstallationHealth::starting());
    }

    pub fn unregister_installation(&self, installation: &InstallationId) {
        let mut inner = self.inner.write();
        inner
            .entities
            .retain(|_, record| &record.installation != installation);
        inner.installations.remove(installation);
    }

    /// Re-render every entity of an installation
    ///
    /// Entities render unavailable unless the installation is healthy.
    pub fn publish(
        &self,
        installation: &InstallationId,
        snapshot: Option<&Snapshot>,
        health: &InstallationHealth,
    ) {
        let now = Utc::now();
        let healthy = health.status.is_healthy();
        let mut inner = self.inner.write();

        let Some(stored) = inner.installations.get_mut(installation) else {
            return;
        };
        stored.clone_from(health);

        for record in inner
            .entities
            .values_mut()
            .filter(|record| &record.installation == installation)
        {
            let presented = if healthy {
                present(record.descriptor.dataset, snapshot)
            } else {
                PresentedState::unavailable()
            };
            if presented != record.presented {
                record.presented = presented;
                record.last_updated = now;
            }
        }
    }

    pub fn get(&self, entity_id: &str) -> Option<EntityRecord> {
        self.inner.read().entities.get(entity_id).cloned()
    }

    pub fn list(&self) -> Vec<EntityRecord> {
        self.inner.read().entities.values().cloned().collect()
    }

    pub fn list_installations(&self) -> Vec<InstallationSummary> {
        let inner = self.inner.read();
        inner
            .installations
            .iter()
            .map(|(id, health)| InstallationSummary {
                id: id.clone(),
                health: health.clone(),
                entities: inner
                    .entities
                    .values()
                    .filter(|record| &record.installation == id)
                    .map(|record| record.entity_id.clone())
                    .collect(),
            })
            .collect()
    }
}

/// Keep the registry in sync with an installation's snapshot and health
///
/// Ends when the installation is dropped.
pub fn spawn_entity_sync(registry: EntityRegistry, installation: &Installation) -> JoinHandle<()> {
    let id = installation.id().clone();
    let mut snapshot_rx = installation.subscribe_snapshot();
    let mut health_rx = installation.subscribe_health();

    tokio::spawn(async move {
        loop {
            let snapshot = snapshot_rx.borrow_and_update().clone();
            let health = health_rx.borrow_and_update().clone();
            registry.publish(&id, snapshot.as_deref(), &health);

            tokio::select! {
                changed = snapshot_rx.changed() => if changed.is_err() { break },
                changed = health_rx.changed() => if changed.is_err() { break },
            }
        }
        debug!(installation = %id, "Entity sync finished");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::Coordinator;
    use crate::installation::BackoffPolicy;
    use crate::test_support::{Scripted, ScriptedSource};
    use gridpulse_types::{InstallationStatus, Observation, PollerConfig, SensorState};
    use serde_json::json;
    use std::time::Duration;

    fn ready() -> InstallationHealth {
        InstallationHealth {
            status: InstallationStatus::Ready,
            last_attempt: Some(Utc::now()),
            last_success: Some(Utc::now()),
        }
    }

    fn snapshot(value: serde_json::Value) -> Snapshot {
        let observation = Observation::new(DatasetId::PowerSystemState, value, None, None);
        Snapshot::new(
            Utc::now(),
            BTreeMap::from([
                (DatasetId::PowerSystemState, Some(observation)),
                (DatasetId::GridFrequency, None),
            ]),
        )
    }

    fn registered() -> (EntityRegistry, InstallationId) {
        let registry = EntityRegistry::new();
        let id = InstallationId::new("Home");
        registry.register_installation(
            &id,
            &BTreeSet::from([DatasetId::PowerSystemState, DatasetId::GridFrequency]),
        );
        (registry, id)
    }

    #[test]
    fn test_entity_ids() {
        assert_eq!(
            EntityRegistry::entity_id(&"Home".into(), DatasetId::GridFrequency),
            "sensor.gridpulse_home_grid_frequency"
        );
    }

    #[test]
    fn test_registered_entities_start_unavailable() {
        let (registry, _) = registered();

        let entities = registry.list();
        assert_eq!(entities.len(), 2);
        assert!(entities.iter().all(|e| e.presented.state == SensorState::Unavailable));
    }

    #[test]
    fn test_publish_renders_snapshot() {
        let (registry, id) = registered();

        registry.publish(&id, Some(&snapshot(json!(3))), &ready());

        let power = registry
            .get("sensor.gridpulse_home_power_system_state")
            .unwrap();
        assert_eq!(power.presented.state, SensorState::Text("Disturbed".to_owned()));
        assert_eq!(power.presented.attribute("raw_value"), Some(&json!(3)));

        let frequency = registry.get("sensor.gridpulse_home_grid_frequency").unwrap();
        assert_eq!(frequency.presented.state, SensorState::Unavailable);
    }

    #[test]
    fn test_unhealthy_installation_renders_unavailable() {
        let (registry, id) = registered();
        registry.publish(&id, Some(&snapshot(json!(1))), &ready());

        let failed = InstallationHealth {
            status: InstallationStatus::UpdateFailed {
                reason: "HTTP 500".to_owned(),
                consecutive_failures: 1,
            },
            ..ready()
        };
        registry.publish(&id, Some(&snapshot(json!(1))), &failed);

        assert!(
            registry
                .list()
                .iter()
                .all(|e| e.presented.state == SensorState::Unavailable)
        );
        assert_eq!(
            registry.list_installations()[0].health.consecutive_failures(),
            1
        );
    }

    #[test]
    fn test_unchanged_state_keeps_last_updated() {
        let (registry, id) = registered();
        let snap = snapshot(json!(1));

        registry.publish(&id, Some(&snap), &ready());
        let first = registry.get("sensor.gridpulse_home_power_system_state").unwrap();
        registry.publish(&id, Some(&snap), &ready());
        let second = registry.get("sensor.gridpulse_home_power_system_state").unwrap();

        assert_eq!(first.last_updated, second.last_updated);
    }

    #[test]
    fn test_unregister_removes_entities() {
        let (registry, id) = registered();

        registry.unregister_installation(&id);

        assert!(registry.list().is_empty());
        assert!(registry.list_installations().is_empty());
        // publishing for an unknown installation is a no-op
        registry.publish(&id, None, &ready());
        assert!(registry.list().is_empty());
    }

    #[tokio::test]
    async fn test_entity_sync_follows_installation() {
        let source = ScriptedSource::new()
            .with(DatasetId::PowerSystemState, Scripted::Value(json!(5)))
            .into_arc();
        let config = PollerConfig::new("key");
        let coordinator = Coordinator::new(source, config).with_pacing_delay(Duration::ZERO);
        let installation = Installation::new("home".into(), coordinator, BackoffPolicy::default());

        let registry = EntityRegistry::new();
        registry.register_installation(installation.id(), &installation.config().enabled_datasets);
        let sync = spawn_entity_sync(registry.clone(), &installation);

        installation.refresh_now().await.unwrap();

        let entity_id = "sensor.gridpulse_home_power_system_state";
        let mut rendered = None;
        for _ in 0..100 {
            rendered = registry.get(entity_id).map(|e| e.presented.state);
            if rendered == Some(SensorState::Text("Restoration".to_owned())) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(rendered, Some(SensorState::Text("Restoration".to_owned())));

        drop(installation);
        tokio::time::timeout(Duration::from_secs(1), sync)
            .await
            .unwrap()
            .unwrap();
    }
}

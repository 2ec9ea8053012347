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

use anyhow::Result;
use gridpulse_types::{InstallationId, PollerConfig};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::coordinator::{Coordinator, DEFAULT_PACING_DELAY};
use crate::entities::{EntityRegistry, spawn_entity_sync};
use crate::installation::{BackoffPolicy, Installation};
use crate::traits::DatasetSource;

/// Builds the data source for an installation from its config
pub type SourceFactory =
    Arc<dyn Fn(&PollerConfig) -> Result<Arc<dyn DatasetSource>> + Send + Sync>;

/// Outcome of [`InstallationRegistry::apply`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub added: Vec<InstallationId>,
    pub removed: Vec<InstallationId>,
    pub reconfigured: Vec<InstallationId>,
    pub unchanged: Vec<InstallationId>,
    /// Installations that could not be built, with the reason
    pub failed: Vec<(InstallationId, String)>,
}

impl ApplyReport {
    fn fail(&mut self, id: InstallationId, e: &anyhow::Error) {
        error!(installation = %id, error = %e, "Failed to apply installation config");
        self.failed.push((id, e.to_string()));
    }
}

struct Entry {
    installation: Installation,
    sync: JoinHandle<()>,
}

/// The set of running installations, owned by whoever composes the app
pub struct InstallationRegistry {
    installations: HashMap<InstallationId, Entry>,
    factory: SourceFactory,
    entities: EntityRegistry,
    pacing_delay: Duration,
    backoff: BackoffPolicy,
}

impl InstallationRegistry {
    pub fn new(factory: SourceFactory, entities: EntityRegistry) -> Self {
        Self {
            installations: HashMap::new(),
            factory,
            entities,
            pacing_delay: DEFAULT_PACING_DELAY,
            backoff: BackoffPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_pacing_delay(mut self, pacing_delay: Duration) -> Self {
        self.pacing_delay = pacing_delay;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn entities(&self) -> &EntityRegistry {
        &self.entities
    }

    fn build_coordinator(&self, config: &PollerConfig) -> Result<Coordinator> {
        let source = (self.factory)(config)?;
        Ok(Coordinator::new(source, config.clone()).with_pacing_delay(self.pacing_delay))
    }

    /// Create an installation without starting its poll loop
    ///
    /// Entities are registered and kept in sync, so a later `refresh_now`
    /// or `start` shows up in the entity registry.
    pub async fn insert_stopped(
        &mut self,
        id: InstallationId,
        config: &PollerConfig,
    ) -> Result<()> {
        let coordinator = self.build_coordinator(config)?;
        self.remove(&id).await;

        let installation = Installation::new(id.clone(), coordinator, self.backoff);
        self.entities
            .register_installation(&id, &config.enabled_datasets);
        let sync = spawn_entity_sync(self.entities.clone(), &installation);

        self.installations
            .insert(id, Entry { installation, sync });
        Ok(())
    }

    /// Create and start an installation, replacing any existing one with the same id
    pub async fn insert(&mut self, id: InstallationId, config: &PollerConfig) -> Result<()> {
        self.insert_stopped(id.clone(), config).await?;
        if let Some(entry) = self.installations.get_mut(&id) {
            entry.installation.start();
        }
        info!(installation = %id, config = ?config, "Installation started");
        Ok(())
    }

    /// Tear down an installation and its entities. Returns false if unknown.
    pub async fn remove(&mut self, id: &InstallationId) -> bool {
        let Some(mut entry) = self.installations.remove(id) else {
            return false;
        };
        entry.installation.shutdown().await;
        entry.sync.abort();
        self.entities.unregister_installation(id);
        info!(installation = %id, "Installation removed");
        true
    }

    /// Restart an installation with a new config. Returns false if unknown.
    pub async fn reconfigure(
        &mut self,
        id: &InstallationId,
        config: &PollerConfig,
    ) -> Result<bool> {
        if !self.installations.contains_key(id) {
            return Ok(false);
        }
        let coordinator = self.build_coordinator(config)?;
        self.entities
            .register_installation(id, &config.enabled_datasets);
        if let Some(entry) = self.installations.get_mut(id) {
            entry.installation.reconfigure(coordinator).await;
        }
        Ok(true)
    }

    /// Converge the running set onto `desired`
    pub async fn apply(&mut self, desired: BTreeMap<InstallationId, PollerConfig>) -> ApplyReport {
        let mut report = ApplyReport::default();

        let mut stale: Vec<InstallationId> = self
            .installations
            .keys()
            .filter(|id| !desired.contains_key(*id))
            .cloned()
            .collect();
        stale.sort();
        for id in stale {
            self.remove(&id).await;
            report.removed.push(id);
        }

        for (id, config) in desired {
            let current = self.installations.get(&id).map(|e| e.installation.config());
            match current {
                None => match self.insert(id.clone(), &config).await {
                    Ok(()) => report.added.push(id),
                    Err(e) => report.fail(id, &e),
                },
                Some(current) if current != config => {
                    match self.reconfigure(&id, &config).await {
                        Ok(_) => report.reconfigured.push(id),
                        Err(e) => report.fail(id, &e),
                    }
                }
                Some(_) => report.unchanged.push(id),
            }
        }

        report
    }

    pub fn get(&self, id: &InstallationId) -> Option<&Installation> {
        self.installations.get(id).map(|entry| &entry.installation)
    }

    /// Installation ids, sorted
    pub fn ids(&self) -> Vec<InstallationId> {
        let mut ids: Vec<_> = self.installations.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.installations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.installations.is_empty()
    }

    pub async fn shutdown_all(&mut self) {
        for id in self.ids() {
            self.remove(&id).await;
        }
    }
}

impl fmt::Debug for InstallationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallationRegistry")
            .field("installations", &self.ids())
            .field("pacing_delay", &self.pacing_delay)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

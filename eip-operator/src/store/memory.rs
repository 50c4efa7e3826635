//! In-memory store implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{RwLock, broadcast};
use tracing::debug;

use super::{EipStore, Result, StoreError, StoreEvent};
use crate::resource::Eip;
use crate::validation::validate_spec;

const EVENT_CAPACITY: usize = 1024;

pub struct InMemoryStore {
    objects: RwLock<HashMap<String, Eip>>,
    events: broadcast::Sender<StoreEvent>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            objects: RwLock::new(HashMap::new()),
            events,
        }
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn check_version(submitted: &Eip, current: &Eip) -> Result<()> {
    if submitted.metadata.resource_version != current.metadata.resource_version {
        return Err(StoreError::VersionMismatch {
            expected: submitted.metadata.resource_version,
            actual: current.metadata.resource_version,
        });
    }
    Ok(())
}

#[async_trait]
impl EipStore for InMemoryStore {
    async fn get(&self, name: &str) -> Result<Option<Eip>> {
        Ok(self.objects.read().await.get(name).cloned())
    }

    async fn list(&self) -> Result<Vec<Eip>> {
        let mut all: Vec<Eip> = self.objects.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        Ok(all)
    }

    async fn create(&self, mut eip: Eip) -> Result<Eip> {
        validate_spec(&eip.spec)?;

        let mut objects = self.objects.write().await;
        if objects.contains_key(eip.name()) {
            return Err(StoreError::Conflict(format!(
                "EIP '{}' already exists",
                eip.name()
            )));
        }

        eip.metadata.generation = 1;
        eip.metadata.resource_version = 1;
        eip.metadata.creation_timestamp = Utc::now();
        eip.metadata.deletion_timestamp = None;
        objects.insert(eip.metadata.name.clone(), eip.clone());
        drop(objects);

        debug!(name = %eip.name(), "EIP object created");
        self.emit(StoreEvent::Created(eip.clone()));
        Ok(eip)
    }

    async fn update(&self, eip: &Eip) -> Result<Option<Eip>> {
        let mut objects = self.objects.write().await;
        let current = objects
            .get(eip.name())
            .ok_or_else(|| StoreError::NotFound(eip.name().to_string()))?;
        check_version(eip, current)?;

        let old = current.clone();
        let mut new = current.clone();
        if new.spec != eip.spec {
            validate_spec(&eip.spec)?;
            new.spec = eip.spec.clone();
            new.metadata.generation += 1;
        }
        new.metadata.finalizers = eip.metadata.finalizers.clone();
        new.metadata.resource_version += 1;

        let name = new.metadata.name.clone();
        if new.metadata.is_deleting() && new.metadata.finalizers.is_empty() {
            objects.remove(&name);
            drop(objects);
            debug!(%name, "Last finalizer removed, EIP object purged");
            self.emit(StoreEvent::Deleted { name });
            return Ok(None);
        }

        objects.insert(name.clone(), new.clone());
        drop(objects);
        self.emit(StoreEvent::Updated {
            name,
            old,
            new: new.clone(),
        });
        Ok(Some(new))
    }

    async fn update_status(&self, eip: &Eip) -> Result<Eip> {
        let mut objects = self.objects.write().await;
        let current = objects
            .get_mut(eip.name())
            .ok_or_else(|| StoreError::NotFound(eip.name().to_string()))?;
        check_version(eip, current)?;

        let old = current.clone();
        current.status = eip.status.clone();
        current.metadata.resource_version += 1;
        let new = current.clone();
        drop(objects);

        self.emit(StoreEvent::Updated {
            name: new.metadata.name.clone(),
            old,
            new: new.clone(),
        });
        Ok(new)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let mut objects = self.objects.write().await;
        let current = objects
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;

        if current.metadata.finalizers.is_empty() {
            objects.remove(name);
            drop(objects);
            self.emit(StoreEvent::Deleted {
                name: name.to_string(),
            });
            return Ok(());
        }

        if current.metadata.is_deleting() {
            return Ok(());
        }

        let old = current.clone();
        current.metadata.deletion_timestamp = Some(Utc::now());
        current.metadata.resource_version += 1;
        let new = current.clone();
        drop(objects);

        debug!(%name, "EIP object marked for deletion");
        self.emit(StoreEvent::Updated {
            name: name.to_string(),
            old,
            new,
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

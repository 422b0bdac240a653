//! In-memory record store (no persistence)
//!
//! This store keeps every table in a `BTreeMap` behind a single async lock.
//! It's useful for:
//! - Testing without database dependencies
//! - Deployments that only need live state (default if no storage configured)
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **Unbounded**: events are only removed by [`crate::engine::Engine::archive_old_events`]

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{DowntimeFilter, EventQuery, HealthStatus, RecordStore};
use super::error::{StorageError, StorageResult};
use super::schema::{
    Acknowledgement, AcknowledgementId, DowntimeId, Event, EventId, EventPatch, Host, HostId,
    ItemKind, ItemRef, ScheduledDowntime, Service, ServiceId, ServiceTemplate, TemplateId,
};

#[derive(Debug, Default)]
struct Tables {
    next_id: i64,
    hosts: BTreeMap<HostId, Host>,
    templates: BTreeMap<TemplateId, ServiceTemplate>,
    services: BTreeMap<ServiceId, Service>,
    events: BTreeMap<EventId, Event>,
    downtimes: BTreeMap<DowntimeId, ScheduledDowntime>,
    acknowledgements: BTreeMap<AcknowledgementId, Acknowledgement>,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Replaces an existing row or reports it missing
fn replace<T: Clone>(
    table: &mut BTreeMap<i64, T>,
    kind: &'static str,
    id: i64,
    row: &T,
) -> StorageResult<()> {
    match table.get_mut(&id) {
        Some(existing) => {
            *existing = row.clone();
            Ok(())
        }
        None => Err(StorageError::NotFound { kind, id }),
    }
}

/// In-memory record store
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_host(&self, mut host: Host) -> StorageResult<Host> {
        let mut tables = self.tables.write().await;
        host.id = tables.allocate_id();
        tables.hosts.insert(host.id, host.clone());
        Ok(host)
    }

    async fn get_host(&self, id: HostId) -> StorageResult<Option<Host>> {
        Ok(self.tables.read().await.hosts.get(&id).cloned())
    }

    async fn update_host(&self, host: &Host) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        replace(&mut tables.hosts, "host", host.id, host)
    }

    async fn delete_host(&self, id: HostId) -> StorageResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.hosts.remove(&id).is_none() {
            return Ok(false);
        }
        let services: HashSet<ServiceId> = tables
            .services
            .values()
            .filter(|service| service.host_id == id)
            .map(|service| service.id)
            .collect();
        let owned = |target: &ItemRef| match target.kind {
            ItemKind::Host => target.id == id,
            ItemKind::Service => services.contains(&target.id),
        };

        tables.services.retain(|service_id, _| !services.contains(service_id));
        tables.events.retain(|_, event| !services.contains(&event.service_id));
        tables.downtimes.retain(|_, downtime| !owned(&downtime.target));
        tables.acknowledgements.retain(|_, ack| !owned(&ack.target));
        debug!("removed host {id} and {} services", services.len());
        Ok(true)
    }

    async fn list_hosts(&self) -> StorageResult<Vec<Host>> {
        Ok(self.tables.read().await.hosts.values().cloned().collect())
    }

    async fn insert_template(&self, mut template: ServiceTemplate) -> StorageResult<ServiceTemplate> {
        let mut tables = self.tables.write().await;
        template.id = tables.allocate_id();
        tables.templates.insert(template.id, template.clone());
        Ok(template)
    }

    async fn get_template(&self, id: TemplateId) -> StorageResult<Option<ServiceTemplate>> {
        Ok(self.tables.read().await.templates.get(&id).cloned())
    }

    async fn update_template(&self, template: &ServiceTemplate) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        replace(&mut tables.templates, "template", template.id, template)
    }

    async fn list_templates(&self) -> StorageResult<Vec<ServiceTemplate>> {
        Ok(self.tables.read().await.templates.values().cloned().collect())
    }

    async fn insert_service(&self, mut service: Service) -> StorageResult<Service> {
        let mut tables = self.tables.write().await;
        service.id = tables.allocate_id();
        tables.services.insert(service.id, service.clone());
        Ok(service)
    }

    async fn get_service(&self, id: ServiceId) -> StorageResult<Option<Service>> {
        Ok(self.tables.read().await.services.get(&id).cloned())
    }

    async fn update_service(&self, service: &Service) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        replace(&mut tables.services, "service", service.id, service)
    }

    async fn delete_service(&self, id: ServiceId) -> StorageResult<bool> {
        Ok(self.tables.write().await.services.remove(&id).is_some())
    }

    async fn list_services(&self, host_id: Option<HostId>) -> StorageResult<Vec<Service>> {
        Ok(self
            .tables
            .read()
            .await
            .services
            .values()
            .filter(|service| host_id.is_none_or(|id| service.host_id == id))
            .cloned()
            .collect())
    }

    async fn insert_event(&self, mut event: Event) -> StorageResult<Event> {
        let mut tables = self.tables.write().await;
        event.id = tables.allocate_id();
        tables.events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn get_event(&self, id: EventId) -> StorageResult<Option<Event>> {
        Ok(self.tables.read().await.events.get(&id).cloned())
    }

    async fn list_events(&self, query: &EventQuery) -> StorageResult<Vec<Event>> {
        let tables = self.tables.read().await;
        let mut events: Vec<Event> = tables
            .events
            .values()
            .filter(|event| query.matches(event))
            .cloned()
            .collect();

        events.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));

        Ok(events
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn update_events(&self, query: &EventQuery, patch: &EventPatch) -> StorageResult<usize> {
        let mut tables = self.tables.write().await;
        let mut updated = 0;
        for event in tables.events.values_mut().filter(|event| query.matches(event)) {
            patch.apply(event);
            updated += 1;
        }
        Ok(updated)
    }

    async fn delete_events(&self, ids: &[EventId]) -> StorageResult<usize> {
        let mut tables = self.tables.write().await;
        Ok(ids
            .iter()
            .filter(|id| tables.events.remove(*id).is_some())
            .count())
    }

    async fn insert_downtime(&self, mut downtime: ScheduledDowntime) -> StorageResult<ScheduledDowntime> {
        let mut tables = self.tables.write().await;
        downtime.id = tables.allocate_id();
        tables.downtimes.insert(downtime.id, downtime.clone());
        Ok(downtime)
    }

    async fn get_downtime(&self, id: DowntimeId) -> StorageResult<Option<ScheduledDowntime>> {
        Ok(self.tables.read().await.downtimes.get(&id).cloned())
    }

    async fn update_downtime(&self, downtime: &ScheduledDowntime) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        replace(&mut tables.downtimes, "downtime", downtime.id, downtime)
    }

    async fn list_downtimes(&self, filter: &DowntimeFilter) -> StorageResult<Vec<ScheduledDowntime>> {
        Ok(self
            .tables
            .read()
            .await
            .downtimes
            .values()
            .filter(|downtime| filter.matches(downtime))
            .cloned()
            .collect())
    }

    async fn insert_acknowledgement(&self, mut ack: Acknowledgement) -> StorageResult<Acknowledgement> {
        let mut tables = self.tables.write().await;
        if tables.acknowledgements.values().any(|existing| existing.target == ack.target) {
            return Err(StorageError::Conflict(format!("{:?} already acknowledged", ack.target)));
        }
        ack.id = tables.allocate_id();
        tables.acknowledgements.insert(ack.id, ack.clone());
        Ok(ack)
    }

    async fn find_acknowledgement(&self, target: ItemRef) -> StorageResult<Option<Acknowledgement>> {
        Ok(self
            .tables
            .read()
            .await
            .acknowledgements
            .values()
            .find(|ack| ack.target == target)
            .cloned())
    }

    async fn list_acknowledgements(&self) -> StorageResult<Vec<Acknowledgement>> {
        Ok(self
            .tables
            .read()
            .await
            .acknowledgements
            .values()
            .cloned()
            .collect())
    }

    async fn delete_acknowledgement(&self, id: AcknowledgementId) -> StorageResult<bool> {
        Ok(self.tables.write().await.acknowledgements.remove(&id).is_some())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let tables = self.tables.read().await;
        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("services".to_string(), tables.services.len().to_string()),
                ("events".to_string(), tables.events.len().to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory store (no-op)");
        Ok(())
    }
}

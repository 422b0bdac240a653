//! Record store trait definition
//!
//! This module defines the core `RecordStore` trait that all
//! storage implementations must implement.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use super::schema::{
    Acknowledgement, AcknowledgementId, DowntimeId, EffectiveService, Event, EventId, EventPatch,
    Host, HostId, ItemRef, ScheduledDowntime, Service, ServiceId, ServiceTemplate, TemplateId,
};

/// Filter for event listings
///
/// Results are always ordered newest first (by date, then id).
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    /// Restrict to these services
    pub service_ids: Option<Vec<ServiceId>>,

    pub correlation_id: Option<String>,

    /// Leave out a single event (used for "correlated with" lookups)
    pub exclude_id: Option<EventId>,

    /// Only events dated strictly before this instant
    pub before: Option<DateTime<Utc>>,

    pub offset: usize,

    pub limit: Option<usize>,
}

impl EventQuery {
    pub fn for_services(service_ids: Vec<ServiceId>) -> Self {
        Self {
            service_ids: Some(service_ids),
            ..Default::default()
        }
    }

    pub fn correlated(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(correlation_id.into()),
            ..Default::default()
        }
    }

    pub fn excluding(mut self, id: EventId) -> Self {
        self.exclude_id = Some(id);
        self
    }

    pub fn page(mut self, offset: usize, limit: Option<usize>) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    /// Whether `event` passes the filters (ordering and paging aside)
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ids) = &self.service_ids {
            if !ids.contains(&event.service_id) {
                return false;
            }
        }
        if let Some(correlation_id) = &self.correlation_id {
            if &event.correlation_id != correlation_id {
                return false;
            }
        }
        if self.exclude_id == Some(event.id) {
            return false;
        }
        if let Some(before) = self.before {
            if event.date >= before {
                return false;
            }
        }
        true
    }
}

/// Filter for downtime listings
#[derive(Debug, Clone, Copy, Default)]
pub struct DowntimeFilter {
    pub target: Option<ItemRef>,

    /// Only downtimes whose window contains this instant and that are not cancelled
    pub active_at: Option<DateTime<Utc>>,
}

impl DowntimeFilter {
    pub fn matches(&self, downtime: &ScheduledDowntime) -> bool {
        if let Some(target) = self.target {
            if downtime.target != target {
                return false;
            }
        }
        if let Some(now) = self.active_at {
            if !downtime.is_active(now) {
                return false;
            }
        }
        true
    }
}

/// Health status of the record store
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Trait for record stores
///
/// The monitoring engine reads and writes all of its state through this
/// trait. Inserts ignore the `id` of the record passed in and return the
/// record with its assigned id.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync` as they are shared between the
/// scheduler, the API and the notification actor.
///
/// ## Error Handling
///
/// Methods return `StorageResult<T>`. Lookups of missing records return
/// `Ok(None)`; updates of missing records return `StorageError::NotFound`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // ========================================================================
    // Hosts
    // ========================================================================

    async fn insert_host(&self, host: Host) -> StorageResult<Host>;

    async fn get_host(&self, id: HostId) -> StorageResult<Option<Host>>;

    async fn update_host(&self, host: &Host) -> StorageResult<()>;

    /// Removes a host, its services, and their events, downtimes and
    /// acknowledgements
    async fn delete_host(&self, id: HostId) -> StorageResult<bool>;

    async fn list_hosts(&self) -> StorageResult<Vec<Host>>;

    // ========================================================================
    // Templates
    // ========================================================================

    async fn insert_template(&self, template: ServiceTemplate) -> StorageResult<ServiceTemplate>;

    async fn get_template(&self, id: TemplateId) -> StorageResult<Option<ServiceTemplate>>;

    async fn update_template(&self, template: &ServiceTemplate) -> StorageResult<()>;

    async fn list_templates(&self) -> StorageResult<Vec<ServiceTemplate>>;

    // ========================================================================
    // Services
    // ========================================================================

    async fn insert_service(&self, service: Service) -> StorageResult<Service>;

    async fn get_service(&self, id: ServiceId) -> StorageResult<Option<Service>>;

    async fn update_service(&self, service: &Service) -> StorageResult<()>;

    async fn delete_service(&self, id: ServiceId) -> StorageResult<bool>;

    /// All services, or only those attached to `host_id`
    async fn list_services(&self, host_id: Option<HostId>) -> StorageResult<Vec<Service>>;

    /// Loads a service overlaid on its template
    ///
    /// Returns `None` when either record is missing.
    async fn get_effective_service(&self, id: ServiceId) -> StorageResult<Option<EffectiveService>> {
        let Some(service) = self.get_service(id).await? else {
            return Ok(None);
        };
        let Some(template) = self.get_template(service.template_id).await? else {
            return Ok(None);
        };
        Ok(Some(EffectiveService { service, template }))
    }

    async fn list_effective_services(
        &self,
        host_id: Option<HostId>,
    ) -> StorageResult<Vec<EffectiveService>> {
        let templates: HashMap<TemplateId, ServiceTemplate> = self
            .list_templates()
            .await?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();

        Ok(self
            .list_services(host_id)
            .await?
            .into_iter()
            .filter_map(|service| {
                let template = templates.get(&service.template_id)?.clone();
                Some(EffectiveService { service, template })
            })
            .collect())
    }

    /// Active or hybrid services with a sensor whose interval has elapsed
    async fn due_services(&self, now: DateTime<Utc>) -> StorageResult<Vec<EffectiveService>> {
        Ok(self
            .list_effective_services(None)
            .await?
            .into_iter()
            .filter(|s| s.is_due(now))
            .collect())
    }

    // ========================================================================
    // Events
    // ========================================================================

    async fn insert_event(&self, event: Event) -> StorageResult<Event>;

    async fn get_event(&self, id: EventId) -> StorageResult<Option<Event>>;

    async fn list_events(&self, query: &EventQuery) -> StorageResult<Vec<Event>>;

    /// Applies `patch` to every event matching `query` (paging ignored)
    ///
    /// Returns the number of events changed.
    async fn update_events(&self, query: &EventQuery, patch: &EventPatch) -> StorageResult<usize>;

    async fn delete_events(&self, ids: &[EventId]) -> StorageResult<usize>;

    // ========================================================================
    // Scheduled downtimes
    // ========================================================================

    async fn insert_downtime(&self, downtime: ScheduledDowntime) -> StorageResult<ScheduledDowntime>;

    async fn get_downtime(&self, id: DowntimeId) -> StorageResult<Option<ScheduledDowntime>>;

    async fn update_downtime(&self, downtime: &ScheduledDowntime) -> StorageResult<()>;

    async fn list_downtimes(&self, filter: &DowntimeFilter) -> StorageResult<Vec<ScheduledDowntime>>;

    // ========================================================================
    // Acknowledgements
    // ========================================================================

    /// Fails with `StorageError::Conflict` when the target is already acknowledged
    async fn insert_acknowledgement(&self, ack: Acknowledgement) -> StorageResult<Acknowledgement>;

    async fn find_acknowledgement(&self, target: ItemRef) -> StorageResult<Option<Acknowledgement>>;

    async fn list_acknowledgements(&self) -> StorageResult<Vec<Acknowledgement>>;

    async fn delete_acknowledgement(&self, id: AcknowledgementId) -> StorageResult<bool>;

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Check backend health
    ///
    /// Performs a lightweight operation to verify the backend
    /// is operational (e.g., ping database, check file access).
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}

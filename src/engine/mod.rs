//! Monitoring engine
//!
//! The engine owns every piece of monitoring semantics: event ingestion, the
//! service state machine, acknowledgements, downtimes, the status summary and
//! the poll cycle. Storage, sensors, rules and tracking collaborators are
//! injected through [`EngineBuilder`].
//!
//! ```text
//!            ┌──────────── Engine ─────────────┐
//! add_event ─┤ FilterChain → store → on_event_add ─► broadcast<MonitorEvent>
//!            │            RuleSet actions       │
//! run_cycle ─┤ due services → SensorRegistry    │
//!            └──────────────────────────────────┘
//! ```
//!
//! All timestamps come from the injected [`Clock`](crate::clock::Clock).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, trace};

use crate::actors::messages::{MonitorEvent, MonitorEventKind};
use crate::clock::SharedClock;
use crate::monitors::host::{HostKindRegistry, HostView};
use crate::sensors::SensorRegistry;
use crate::storage::schema::{
    Host, HostId, ItemRef, Service, ServiceId, ServiceStatus, ServiceTemplate,
};
use crate::storage::{SharedStore, StorageError};
use crate::tracking::TrackingSink;

pub mod acknowledge;
pub mod downtime;
pub mod ingest;
pub mod locks;
pub mod retention;
pub mod rules;
pub mod scheduler;
pub mod state;
pub mod summary;

pub use acknowledge::AcknowledgeRequest;
pub use ingest::{EventInput, PropertyFormat};
pub use locks::ServiceLocks;
pub use retention::RetentionPolicy;
pub use rules::{EventFilter, EventRule, FilterChain, FilterRule, RuleSet};
pub use scheduler::CycleReport;
pub use summary::StatusSummary;

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur during engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

const EVENT_BUS_CAPACITY: usize = 256;

/// Default upper bound for a single sensor probe
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// The monitoring engine
pub struct Engine {
    store: SharedStore,
    clock: SharedClock,
    sensors: Arc<SensorRegistry>,
    host_kinds: Arc<HostKindRegistry>,
    filters: FilterChain,
    rules: RuleSet,
    tracking: Option<Arc<dyn TrackingSink>>,
    locks: ServiceLocks,
    events: broadcast::Sender<MonitorEvent>,
    probe_timeout: Duration,
}

/// Assembles an [`Engine`]
pub struct EngineBuilder {
    store: SharedStore,
    clock: SharedClock,
    sensors: SensorRegistry,
    host_kinds: HostKindRegistry,
    filters: FilterChain,
    rules: RuleSet,
    tracking: Option<Arc<dyn TrackingSink>>,
    probe_timeout: Duration,
}

impl EngineBuilder {
    pub fn sensors(mut self, sensors: SensorRegistry) -> Self {
        self.sensors = sensors;
        self
    }

    pub fn host_kinds(mut self, host_kinds: HostKindRegistry) -> Self {
        self.host_kinds = host_kinds;
        self
    }

    pub fn filter<F: EventFilter + 'static>(mut self, filter: F) -> Self {
        self.filters.add(filter);
        self
    }

    pub fn rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    pub fn tracking(mut self, tracking: Arc<dyn TrackingSink>) -> Self {
        self.tracking = Some(tracking);
        self
    }

    pub fn probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    pub fn build(self) -> Engine {
        let (events, _) = broadcast::channel(EVENT_BUS_CAPACITY);

        debug!(
            "engine built with {} sensors, {} filters, {} rules",
            self.sensors.len(),
            self.filters.len(),
            self.rules.len()
        );

        Engine {
            store: self.store,
            clock: self.clock,
            sensors: Arc::new(self.sensors),
            host_kinds: Arc::new(self.host_kinds),
            filters: self.filters,
            rules: self.rules,
            tracking: self.tracking,
            locks: ServiceLocks::new(),
            events,
            probe_timeout: self.probe_timeout,
        }
    }
}

impl Engine {
    pub fn builder(store: SharedStore, clock: SharedClock) -> EngineBuilder {
        EngineBuilder {
            store,
            clock,
            sensors: SensorRegistry::new(),
            host_kinds: HostKindRegistry::new(),
            filters: FilterChain::new(),
            rules: RuleSet::default(),
            tracking: None,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn sensors(&self) -> &SensorRegistry {
        &self.sensors
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Subscribe to the domain event bus
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    pub(crate) fn publish(&self, event: MonitorEvent) {
        trace!("publishing {} for {:?}", event.kind.name(), event.target);
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    // ========================================================================
    // Hosts and services
    // ========================================================================

    /// Enables monitoring of an asset
    #[instrument(skip(self, host), fields(name = %host.name))]
    pub async fn add_host(&self, mut host: Host) -> EngineResult<Host> {
        host.date_creation = self.now();
        let host = self.store.insert_host(host).await?;
        info!("monitoring enabled for host {} ({})", host.name, host.id);
        Ok(host)
    }

    /// Disables monitoring of an asset, dropping its services
    pub async fn remove_host(&self, host_id: HostId) -> EngineResult<bool> {
        let removed = self.store.delete_host(host_id).await?;
        if removed {
            info!("monitoring disabled for host {host_id}");
        }
        Ok(removed)
    }

    pub async fn add_template(&self, template: ServiceTemplate) -> EngineResult<ServiceTemplate> {
        Ok(self.store.insert_template(template).await?)
    }

    /// Adds a service to a host (or a hostless one with host id -1)
    pub async fn add_service(&self, service: Service) -> EngineResult<Service> {
        if self.store.get_template(service.template_id).await?.is_none() {
            return Err(EngineError::NotFound {
                kind: "template",
                id: service.template_id,
            });
        }
        if !service.is_hostless() && self.store.get_host(service.host_id).await?.is_none() {
            return Err(EngineError::NotFound {
                kind: "host",
                id: service.host_id,
            });
        }

        Ok(self.store.insert_service(service).await?)
    }

    /// Designates the service a host's status is derived from
    ///
    /// Returns `false` when the service does not belong to the host.
    pub async fn set_availability_service(
        &self,
        host_id: HostId,
        service_id: ServiceId,
    ) -> EngineResult<bool> {
        let mut host = self.require_host(host_id).await?;
        let service = self.require_service(service_id).await?;

        if service.host_id != host.id {
            return Ok(false);
        }

        host.availability_service = Some(service_id);
        self.store.update_host(&host).await?;
        Ok(true)
    }

    /// Enables or disables polling of a service
    ///
    /// Disabling a host's availability service leaves the host unknown.
    #[instrument(skip(self))]
    pub async fn set_service_active(&self, service_id: ServiceId, active: bool) -> EngineResult<()> {
        self.require_service(service_id).await?;
        let _guard = self.locks.lock(service_id).await;

        let mut service = self.require_service(service_id).await?;
        if service.is_active == active {
            return Ok(());
        }
        service.is_active = active;

        if !active {
            let now = self.now();
            if let Some(host) = self.availability_host_of(&service).await? {
                service.status = ServiceStatus::Unknown;
                service.status_since = Some(now);
                debug!("host {} is now unknown", host.id);
            }
            self.publish(
                MonitorEvent::new(
                    MonitorEventKind::ServiceDisabled,
                    ItemRef::service(service.id),
                    service.name.clone(),
                    now,
                )
                .with_status(service.status, service.is_hard_status),
            );
        }

        self.store.update_service(&service).await?;
        Ok(())
    }

    pub async fn host_view(&self, host_id: HostId) -> EngineResult<Option<HostView>> {
        let Some(host) = self.store.get_host(host_id).await? else {
            return Ok(None);
        };
        let availability = match host.availability_service_id() {
            Some(id) => self.store.get_service(id).await?,
            None => None,
        };
        Ok(Some(HostView::new(host, availability)))
    }

    pub(crate) async fn require_host(&self, host_id: HostId) -> EngineResult<Host> {
        self.store
            .get_host(host_id)
            .await?
            .ok_or(EngineError::NotFound {
                kind: "host",
                id: host_id,
            })
    }

    pub(crate) async fn require_service(&self, service_id: ServiceId) -> EngineResult<Service> {
        self.store
            .get_service(service_id)
            .await?
            .ok_or(EngineError::NotFound {
                kind: "service",
                id: service_id,
            })
    }

    /// The host whose availability service `service` is
    pub(crate) async fn availability_host_of(&self, service: &Service) -> EngineResult<Option<Host>> {
        if service.is_hostless() {
            return Ok(None);
        }
        Ok(self
            .store
            .get_host(service.host_id)
            .await?
            .filter(|host| host.availability_service_id() == Some(service.id)))
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("sensors", &self.sensors)
            .field("filters", &self.filters)
            .field("rules", &self.rules.len())
            .field("probe_timeout", &self.probe_timeout)
            .finish()
    }
}

//! API request and response types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::actors::messages::NotifierStats;
use crate::engine::scheduler::CycleReport;
use crate::engine::summary::StatusSummary;
use crate::monitors::MonitoredEntity;
use crate::monitors::host::{HostStatus, HostView};
use crate::storage::schema::{
    Event, HostId, HostKind, ItemKind, ItemRef, Service, ServiceId, ServiceStatus,
};

/// Response for GET /api/v1/health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub storage: String,
}

/// Host with its derived status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostInfo {
    pub id: HostId,
    pub kind: HostKind,
    pub item_id: i64,
    pub name: String,
    pub status: HostStatus,
    pub is_flapping: bool,
    pub is_hard_status: bool,
    pub availability_service: Option<ServiceId>,
    pub last_check: Option<DateTime<Utc>>,
    pub status_since: Option<DateTime<Utc>>,
}

impl From<&HostView> for HostInfo {
    fn from(view: &HostView) -> Self {
        Self {
            id: view.host.id,
            kind: view.host.kind,
            item_id: view.host.item_id,
            name: view.host.name.clone(),
            status: view.host_status(),
            is_flapping: view.is_flapping(),
            is_hard_status: view.is_hard_status(),
            availability_service: view.host.availability_service_id(),
            last_check: view.last_check(),
            status_since: view.status_since(),
        }
    }
}

/// Response for GET /api/v1/hosts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostsResponse {
    pub hosts: Vec<HostInfo>,
}

/// Response for GET /api/v1/services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesResponse {
    pub services: Vec<Service>,
}

/// Page of events, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsResponse {
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
}

/// Response for POST /api/v1/events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddEventResponse {
    /// `false` when the event was rejected, filtered or not stored
    pub stored: bool,
    pub event: Option<Event>,
}

/// Response for POST /api/v1/services/:id/check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckNowResponse {
    pub service_id: ServiceId,
    /// Whether the sensor produced a result
    pub reported: bool,
}

/// Body of PUT /api/v1/services/:id/active
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveRequest {
    pub active: bool,
}

/// Response for acknowledgement and downtime requests that may be refused
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedResponse {
    pub accepted: bool,
}

/// Body of POST /api/v1/downtimes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DowntimeRequest {
    pub target: ItemRef,
    pub name: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub is_fixed: bool,
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Query of GET /api/v1/downtimes
#[derive(Debug, Clone, Deserialize)]
pub struct TargetQuery {
    pub kind: ItemKind,
    pub id: i64,
}

impl TargetQuery {
    pub fn target(&self) -> ItemRef {
        ItemRef {
            kind: self.kind,
            id: self.id,
        }
    }
}

/// Response for GET /api/v1/summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResponse {
    #[serde(flatten)]
    pub summary: StatusSummary,
    pub timestamp: DateTime<Utc>,
    pub notifications: Option<NotifierStats>,
}

/// Response for POST /api/v1/cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleResponse {
    #[serde(flatten)]
    pub report: CycleReport,
    pub volume: usize,
}

/// Service status counts used by host detail views
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStatusCounts {
    pub ok: usize,
    pub warning: usize,
    pub critical: usize,
    pub unknown: usize,
}

impl ServiceStatusCounts {
    pub fn from_services<'a>(services: impl IntoIterator<Item = &'a Service>) -> Self {
        let mut counts = Self::default();
        for service in services {
            match service.status {
                ServiceStatus::Ok => counts.ok += 1,
                ServiceStatus::Warning => counts.warning += 1,
                ServiceStatus::Critical => counts.critical += 1,
                ServiceStatus::Unknown => counts.unknown += 1,
            }
        }
        counts
    }
}

/// Response for GET /api/v1/hosts/:id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostDetailResponse {
    #[serde(flatten)]
    pub host: HostInfo,
    pub services: Vec<Service>,
    pub service_counts: ServiceStatusCounts,
    pub acknowledged: bool,
    pub scheduled_down: bool,
}

//! Status summary across all hosts and services

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{Engine, EngineResult};
use crate::monitors::MonitoredEntity;
use crate::monitors::host::{HostStatus, HostView};
use crate::storage::schema::{ItemRef, ServiceStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCounts {
    pub up: usize,
    pub down: usize,
    pub unknown: usize,
    pub unreachable: usize,
    pub acknowledged: usize,
    pub scheduled_down: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCounts {
    pub ok: usize,
    pub warning: usize,
    pub critical: usize,
    pub unknown: usize,
    pub acknowledged: usize,
    pub scheduled_down: usize,
}

/// Number of hosts and services per display bucket
///
/// Each item lands in exactly one bucket. Acknowledged wins over scheduled
/// down, which wins over the status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub hosts: HostCounts,
    pub services: ServiceCounts,
    /// Active services in an alert state
    pub active_alerts: usize,
}

impl Engine {
    pub async fn status_summary(&self) -> EngineResult<StatusSummary> {
        let acknowledged = self.actively_acknowledged().await?;
        let down = self.actively_down().await?;

        let services: HashMap<_, _> = self
            .store
            .list_services(None)
            .await?
            .into_iter()
            .map(|service| (service.id, service))
            .collect();

        let mut summary = StatusSummary::default();

        for host in self.store.list_hosts().await? {
            let availability = host
                .availability_service_id()
                .and_then(|id| services.get(&id).cloned());
            let view = HostView::new(host, availability);
            let item = ItemRef::host(view.host.id);
            let counts = &mut summary.hosts;

            if acknowledged.contains(item) {
                counts.acknowledged += 1;
            } else if down.contains(item) {
                counts.scheduled_down += 1;
            } else {
                match view.host_status() {
                    HostStatus::Up => counts.up += 1,
                    HostStatus::Down => counts.down += 1,
                    HostStatus::Unknown => counts.unknown += 1,
                    HostStatus::Unreachable => counts.unreachable += 1,
                }
            }
        }

        for service in services.values().filter(|service| service.is_active) {
            let item = ItemRef::service(service.id);
            let counts = &mut summary.services;

            if service.is_alert_state() {
                summary.active_alerts += 1;
            }

            if acknowledged.contains(item) {
                counts.acknowledged += 1;
            } else if down.contains(item) {
                counts.scheduled_down += 1;
            } else {
                match service.status {
                    ServiceStatus::Ok => counts.ok += 1,
                    ServiceStatus::Warning => counts.warning += 1,
                    ServiceStatus::Critical => counts.critical += 1,
                    ServiceStatus::Unknown => counts.unknown += 1,
                }
            }
        }

        Ok(summary)
    }
}

//! Scheduled downtimes
//!
//! A downtime on a host covers every service of that host. Recoveries
//! cancel the non-fixed downtimes of the recovered service.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use super::{Engine, EngineError, EngineResult};
use crate::actors::messages::{MonitorEvent, MonitorEventKind};
use crate::storage::DowntimeFilter;
use crate::storage::schema::{
    DowntimeId, HostId, ItemKind, ItemRef, ScheduledDowntime, Service, ServiceId,
};

/// Hosts and services matched by a query, with host membership expanded
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ItemSet {
    pub hosts: BTreeSet<HostId>,
    /// Includes every service of the hosts above
    pub services: BTreeSet<ServiceId>,
}

impl ItemSet {
    pub fn contains(&self, item: ItemRef) -> bool {
        match item.kind {
            ItemKind::Host => self.hosts.contains(&item.id),
            ItemKind::Service => self.services.contains(&item.id),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty() && self.services.is_empty()
    }
}

impl Engine {
    /// Adds a downtime window for a host or service
    #[instrument(skip(self, downtime), fields(target = ?downtime.target))]
    pub async fn schedule_downtime(&self, downtime: ScheduledDowntime) -> EngineResult<ScheduledDowntime> {
        if downtime.end < downtime.begin {
            return Err(EngineError::InvalidRequest(
                "downtime ends before it begins".to_string(),
            ));
        }
        self.require_item(downtime.target).await?;

        let downtime = self.store.insert_downtime(downtime).await?;
        info!("scheduled downtime {} for {:?}", downtime.id, downtime.target);
        Ok(downtime)
    }

    /// Ends a downtime now
    ///
    /// Returns `false` when it was already cancelled.
    pub async fn cancel_downtime(&self, id: DowntimeId) -> EngineResult<bool> {
        let downtime = self
            .store
            .get_downtime(id)
            .await?
            .ok_or(EngineError::NotFound { kind: "downtime", id })?;

        if downtime.is_cancelled {
            return Ok(false);
        }

        self.cancel(downtime, self.now()).await?;
        Ok(true)
    }

    async fn cancel(&self, mut downtime: ScheduledDowntime, now: DateTime<Utc>) -> EngineResult<()> {
        downtime.end = now;
        downtime.is_cancelled = true;
        self.store.update_downtime(&downtime).await?;

        info!("cancelled downtime {} for {:?}", downtime.id, downtime.target);
        self.publish(
            MonitorEvent::new(
                MonitorEventKind::DowntimeCancelled,
                downtime.target,
                downtime.name.clone(),
                now,
            )
            .with_detail(downtime.comment.clone()),
        );
        Ok(())
    }

    /// Cancels the active, non-fixed downtimes targeting the service itself
    pub(crate) async fn cancel_recovered_downtimes(
        &self,
        service_id: ServiceId,
        now: DateTime<Utc>,
    ) -> EngineResult<usize> {
        let filter = DowntimeFilter {
            target: Some(ItemRef::service(service_id)),
            active_at: Some(now),
        };

        let mut cancelled = 0;
        for downtime in self.store.list_downtimes(&filter).await? {
            if downtime.is_fixed {
                continue;
            }
            self.cancel(downtime, now).await?;
            cancelled += 1;
        }
        Ok(cancelled)
    }

    /// Whether the service or its host is inside an active downtime
    pub(crate) async fn is_service_scheduled_down(
        &self,
        service: &Service,
        now: DateTime<Utc>,
    ) -> EngineResult<bool> {
        if self.has_active_downtime(ItemRef::service(service.id), now).await? {
            return Ok(true);
        }
        if service.is_hostless() {
            return Ok(false);
        }
        self.has_active_downtime(ItemRef::host(service.host_id), now).await
    }

    async fn has_active_downtime(&self, target: ItemRef, now: DateTime<Utc>) -> EngineResult<bool> {
        let filter = DowntimeFilter {
            target: Some(target),
            active_at: Some(now),
        };
        Ok(!self.store.list_downtimes(&filter).await?.is_empty())
    }

    /// Whether a host or service is currently scheduled down
    pub async fn is_scheduled_down(&self, item: ItemRef) -> EngineResult<bool> {
        let now = self.now();
        match item.kind {
            ItemKind::Host => self.has_active_downtime(item, now).await,
            ItemKind::Service => {
                let service = self.require_service(item.id).await?;
                self.is_service_scheduled_down(&service, now).await
            }
        }
    }

    /// Every host and service currently inside a downtime
    pub async fn actively_down(&self) -> EngineResult<ItemSet> {
        let filter = DowntimeFilter {
            target: None,
            active_at: Some(self.now()),
        };
        let targets = self
            .store
            .list_downtimes(&filter)
            .await?
            .into_iter()
            .map(|downtime| downtime.target);

        self.expand_items(targets).await
    }

    pub async fn downtimes_for(&self, target: ItemRef) -> EngineResult<Vec<ScheduledDowntime>> {
        let filter = DowntimeFilter {
            target: Some(target),
            active_at: None,
        };
        Ok(self.store.list_downtimes(&filter).await?)
    }

    /// Collects targets into an [`ItemSet`], adding the services of hosts
    pub(crate) async fn expand_items(
        &self,
        targets: impl IntoIterator<Item = ItemRef>,
    ) -> EngineResult<ItemSet> {
        let mut items = ItemSet::default();
        for target in targets {
            match target.kind {
                ItemKind::Service => {
                    items.services.insert(target.id);
                }
                ItemKind::Host => {
                    items.hosts.insert(target.id);
                }
            }
        }

        for host_id in &items.hosts {
            for service in self.store.list_services(Some(*host_id)).await? {
                items.services.insert(service.id);
            }
        }

        Ok(items)
    }

    pub(crate) async fn require_item(&self, item: ItemRef) -> EngineResult<()> {
        match item.kind {
            ItemKind::Host => self.require_host(item.id).await.map(|_| ()),
            ItemKind::Service => self.require_service(item.id).await.map(|_| ()),
        }
    }
}

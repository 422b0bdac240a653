//! Acknowledgements
//!
//! An acknowledgement silences an alerting host or service until it expires
//! or the item recovers. Non-sticky acknowledgements also end on any status
//! change. A host acknowledgement covers every service of the host.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::downtime::ItemSet;
use super::{Engine, EngineResult};
use crate::actors::messages::{MonitorEvent, MonitorEventKind};
use crate::monitors::MonitoredEntity;
use crate::storage::StorageError;
use crate::storage::schema::{Acknowledgement, ItemKind, ItemRef, Service, ServiceStatus};

/// Request to acknowledge a host or service problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcknowledgeRequest {
    pub target: ItemRef,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default = "default_true")]
    pub is_sticky: bool,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Publish an `Acknowledged` event
    #[serde(default = "default_true")]
    pub notify: bool,
}

fn default_true() -> bool {
    true
}

impl AcknowledgeRequest {
    pub fn new(target: ItemRef, user: impl Into<String>) -> Self {
        Self {
            target,
            user: user.into(),
            comment: String::new(),
            is_sticky: true,
            expires_at: None,
            notify: true,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn non_sticky(mut self) -> Self {
        self.is_sticky = false;
        self
    }
}

impl Engine {
    /// Acknowledges an alerting host or service
    ///
    /// Returns `false` when the item is scheduled down, not alerting, or
    /// already acknowledged.
    #[instrument(skip(self, request), fields(target = ?request.target, user = %request.user))]
    pub async fn acknowledge(&self, request: AcknowledgeRequest) -> EngineResult<bool> {
        let now = self.now();
        let target = request.target;

        let (display_name, status, alerting) = match target.kind {
            ItemKind::Host => {
                let view = self
                    .host_view(target.id)
                    .await?
                    .ok_or(super::EngineError::NotFound {
                        kind: "host",
                        id: target.id,
                    })?;
                let status = view
                    .availability
                    .as_ref()
                    .map(|service| service.status)
                    .unwrap_or(ServiceStatus::Unknown);
                (view.host.name.clone(), status, view.is_alert_state())
            }
            ItemKind::Service => {
                let service = self.require_service(target.id).await?;
                (service.name.clone(), service.status, service.is_alert_state())
            }
        };

        if self.is_scheduled_down(target).await? {
            debug!("not acknowledging {target:?}: scheduled down");
            return Ok(false);
        }
        if !alerting {
            debug!("not acknowledging {target:?}: not alerting");
            return Ok(false);
        }
        if self.current_acknowledgement(target, now).await?.is_some() {
            debug!("not acknowledging {target:?}: already acknowledged");
            return Ok(false);
        }

        let ack = self
            .store
            .insert_acknowledgement(Acknowledgement {
                id: 0,
                target,
                status: status.code(),
                user: request.user,
                comment: request.comment,
                is_sticky: request.is_sticky,
                created_at: now,
                expires_at: request.expires_at,
            })
            .await;
        let ack = match ack {
            Ok(ack) => ack,
            Err(StorageError::Conflict(_)) => {
                debug!("not acknowledging {target:?}: acknowledged concurrently");
                return Ok(false);
            }
            Err(err) => return Err(err.into()),
        };
        info!("{target:?} acknowledged by {}", ack.user);

        if request.notify {
            self.publish(
                MonitorEvent::new(MonitorEventKind::Acknowledged, target, display_name, now)
                    .with_status(status, true)
                    .with_detail(ack.comment.clone()),
            );
        }

        Ok(true)
    }

    /// The unexpired acknowledgement of exactly this item
    ///
    /// Expired acknowledgements found on the way are deleted.
    async fn current_acknowledgement(
        &self,
        target: ItemRef,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<Acknowledgement>> {
        let Some(ack) = self.store.find_acknowledgement(target).await? else {
            return Ok(None);
        };
        if ack.is_expired(now) {
            self.store.delete_acknowledgement(ack.id).await?;
            debug!("acknowledgement {} of {target:?} expired", ack.id);
            return Ok(None);
        }
        Ok(Some(ack))
    }

    /// Whether the item, or the host of a service, is acknowledged
    pub async fn is_acknowledged(&self, item: ItemRef) -> EngineResult<bool> {
        let now = self.now();
        if self.current_acknowledgement(item, now).await?.is_some() {
            return Ok(true);
        }
        if item.kind == ItemKind::Service {
            let service = self.require_service(item.id).await?;
            if !service.is_hostless() {
                return Ok(self
                    .current_acknowledgement(ItemRef::host(service.host_id), now)
                    .await?
                    .is_some());
            }
        }
        Ok(false)
    }

    /// Every host and service currently acknowledged
    pub async fn actively_acknowledged(&self) -> EngineResult<ItemSet> {
        self.purge_expired_acknowledgements().await?;
        let targets = self
            .store
            .list_acknowledgements()
            .await?
            .into_iter()
            .map(|ack| ack.target);
        self.expand_items(targets).await
    }

    pub async fn acknowledgements(&self) -> EngineResult<Vec<Acknowledgement>> {
        self.purge_expired_acknowledgements().await?;
        Ok(self.store.list_acknowledgements().await?)
    }

    /// Removes an acknowledgement by id
    pub async fn remove_acknowledgement(&self, id: i64) -> EngineResult<bool> {
        Ok(self.store.delete_acknowledgement(id).await?)
    }

    pub async fn purge_expired_acknowledgements(&self) -> EngineResult<usize> {
        let now = self.now();
        let mut purged = 0;
        for ack in self.store.list_acknowledgements().await? {
            if ack.is_expired(now) && self.store.delete_acknowledgement(ack.id).await? {
                purged += 1;
            }
        }
        if purged > 0 {
            debug!("purged {purged} expired acknowledgements");
        }
        Ok(purged)
    }

    /// Drops acknowledgements that no longer apply after a status change
    ///
    /// Recovery ends every acknowledgement of the service (and of its host
    /// when it is the availability service). Any other change ends only
    /// non-sticky ones.
    pub(crate) async fn release_acknowledgements(
        &self,
        service: &Service,
        host: Option<ItemRef>,
        previous_status: ServiceStatus,
    ) -> EngineResult<()> {
        if service.status == previous_status {
            return Ok(());
        }
        let recovered = service.status == ServiceStatus::Ok;

        let targets = std::iter::once(ItemRef::service(service.id)).chain(host);
        for target in targets {
            let Some(ack) = self.store.find_acknowledgement(target).await? else {
                continue;
            };
            if recovered || !ack.is_sticky {
                self.store.delete_acknowledgement(ack.id).await?;
                debug!("acknowledgement {} of {target:?} released", ack.id);
            }
        }
        Ok(())
    }
}

//! Applying stored events to service state

use tracing::{debug, instrument};

use super::{Engine, EngineResult};
use crate::actors::messages::{MonitorEvent, MonitorEventKind};
use crate::monitors::flapping::FlapEvaluation;
use crate::monitors::service::{StateUpdate, Transition, apply_significance};
use crate::storage::schema::{EffectiveService, Event, Host, ItemRef, Service};

impl Engine {
    /// Folds an event into its service's state
    ///
    /// Updates of the same service are serialized. Internal events and
    /// events of unknown services are ignored.
    #[instrument(skip(self, event), fields(service_id = event.service_id, event = %event.name))]
    pub async fn on_event_add(&self, event: &Event) -> EngineResult<()> {
        if event.service_id < 0 {
            return Ok(());
        }
        if self.store.get_service(event.service_id).await?.is_none() {
            debug!("event for unknown service {}", event.service_id);
            return Ok(());
        }

        let _guard = self.locks.lock(event.service_id).await;

        let Some(EffectiveService {
            mut service,
            template,
        }) = self.store.get_effective_service(event.service_id).await?
        else {
            debug!("service {} removed while waiting for its lock", event.service_id);
            return Ok(());
        };

        let now = self.now();
        let in_downtime = self.is_service_scheduled_down(&service, now).await?;
        let update = apply_significance(&mut service, &template, event.significance, in_downtime, now);
        self.store.update_service(&service).await?;

        if update.stateless {
            return Ok(());
        }

        if update.transition == Transition::Recovery && in_downtime {
            self.cancel_recovered_downtimes(service.id, now).await?;
        }

        let host = self.availability_host_of(&service).await?;
        self.release_acknowledgements(
            &service,
            host.as_ref().map(|host| ItemRef::host(host.id)),
            update.previous_status,
        )
        .await?;
        self.dispatch_transition(event, &service, host.as_ref(), &update);

        Ok(())
    }

    fn dispatch_transition(
        &self,
        event: &Event,
        service: &Service,
        host: Option<&Host>,
        update: &StateUpdate,
    ) {
        let now = self.now();
        let (target, display_name) = match host {
            Some(host) => (ItemRef::host(host.id), host.name.clone()),
            None => (ItemRef::service(service.id), service.name.clone()),
        };

        let build = |kind: MonitorEventKind| {
            let mut monitor_event = MonitorEvent::new(kind, target, display_name.clone(), now)
                .with_status(service.status, service.is_hard_status)
                .with_detail(event.name.clone());
            if event.id > 0 {
                monitor_event = monitor_event.with_event(event.id);
            }
            monitor_event
        };

        let transition_kind = match update.transition {
            Transition::Problem { .. } | Transition::SoftFailure { promoted: true } => Some(
                if host.is_some() {
                    MonitorEventKind::HostDown
                } else {
                    MonitorEventKind::ServiceProblem
                },
            ),
            Transition::Recovery => Some(if host.is_some() {
                MonitorEventKind::HostUp
            } else {
                MonitorEventKind::ServiceRecovery
            }),
            Transition::SoftFailure { promoted: false } | Transition::None => None,
        };
        if let Some(kind) = transition_kind {
            self.publish(build(kind));
        }

        match update.flap {
            Some(FlapEvaluation::StartsFlapping) => self.publish(build(MonitorEventKind::StartFlapping)),
            Some(FlapEvaluation::StopsFlapping) => self.publish(build(MonitorEventKind::StopFlapping)),
            _ => {}
        }
    }
}

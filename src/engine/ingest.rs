//! Event ingestion, correlation and event queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{Engine, EngineResult};
use crate::actors::messages::{MonitorEvent, MonitorEventKind};
use crate::monitors::MonitoredEntity;
use crate::storage::EventQuery;
use crate::storage::schema::{
    Event, EventPatch, EventStatus, HostId, INTERNAL_SERVICE, ItemRef, ServiceId, Significance,
};
use crate::tracking::TrackingRequest;

/// Name given to events synthesized for silent sensors
pub const SENSOR_FAULT: &str = "sensor_fault";

/// An observation as submitted by a sensor or an external producer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventInput {
    /// Owning service, `-1` for internal events; absent events are rejected
    #[serde(default)]
    pub service_id: Option<ServiceId>,
    #[serde(default)]
    pub name: String,
    /// Raw significance code, out of range values become INFORMATION
    #[serde(default)]
    pub significance: Option<i64>,
    #[serde(default)]
    pub status: Option<EventStatus>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    /// JSON text or any JSON value (serialized on ingestion)
    #[serde(default)]
    pub content: Option<Value>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    /// The sensor produced no usable result
    #[serde(default)]
    pub sensor_fault: bool,
}

impl EventInput {
    pub fn new(service_id: ServiceId, name: impl Into<String>, significance: Significance) -> Self {
        Self {
            service_id: Some(service_id),
            name: name.into(),
            significance: Some(significance.code()),
            ..Default::default()
        }
    }

    /// Event recorded for a service whose sensor stayed silent
    pub fn sensor_fault(service_id: ServiceId, provider: Option<String>) -> Self {
        Self {
            service_id: Some(service_id),
            provider,
            sensor_fault: true,
            ..Default::default()
        }
    }

    pub fn with_content(mut self, content: Value) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Normalizes the input into an unsaved event
    ///
    /// Returns `None` when the input has no owning service.
    pub fn into_draft(self, now: DateTime<Utc>) -> Option<Event> {
        let service_id = self.service_id?;

        let (name, significance) = if self.sensor_fault {
            (SENSOR_FAULT.to_string(), Significance::Exception)
        } else {
            (self.name, Significance::clamp(self.significance))
        };

        let content = match self.content {
            Some(Value::String(text)) => text,
            Some(value) => value.to_string(),
            None => "{}".to_string(),
        };

        Some(Event {
            id: 0,
            service_id,
            name,
            significance,
            status: self.status.unwrap_or(EventStatus::New),
            date: self.date.unwrap_or(now),
            content,
            correlation_id: self
                .correlation_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            provider: self.provider,
        })
    }
}

/// Text rendering of event properties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyFormat {
    /// `**name**: value` lines
    Pretty,
    /// `name: value` lines
    Plain,
}

/// Splits JSON event content into `(name, value)` pairs
///
/// Content that is not a JSON object has no properties.
pub fn event_properties(content: &str) -> Vec<(String, String)> {
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(content) else {
        return Vec::new();
    };

    map.into_iter()
        .map(|(name, value)| {
            let value = match value {
                Value::String(text) => text,
                other => other.to_string(),
            };
            (name, value)
        })
        .collect()
}

/// Renders event content as one line per property
pub fn format_event_properties(content: &str, format: PropertyFormat) -> String {
    event_properties(content)
        .into_iter()
        .map(|(name, value)| match format {
            PropertyFormat::Pretty => format!("**{name}**: {value}\n"),
            PropertyFormat::Plain => format!("{name}: {value}\n"),
        })
        .collect()
}

impl Engine {
    /// Ingests an observation
    ///
    /// Returns the stored event, or `None` when it was rejected (no owning
    /// service, or a service that does not exist), dropped by a filter, or
    /// suppressed as informational (the service state is still updated in
    /// that last case).
    #[instrument(skip(self, input), fields(service_id = ?input.service_id, name = %input.name))]
    pub async fn add_event(&self, input: EventInput) -> EngineResult<Option<Event>> {
        let Some(draft) = input.into_draft(self.now()) else {
            debug!("rejecting event without service");
            return Ok(None);
        };

        let owner = if draft.service_id == INTERNAL_SERVICE {
            None
        } else if draft.service_id < 0 {
            debug!("rejecting event for invalid service id {}", draft.service_id);
            return Ok(None);
        } else {
            let Some(service) = self.store.get_service(draft.service_id).await? else {
                debug!("rejecting event for unknown service {}", draft.service_id);
                return Ok(None);
            };
            Some(service)
        };

        let Some(draft) = self.filters.process(draft).await else {
            return Ok(None);
        };

        if draft.significance == Significance::Information {
            let suppressed = owner
                .as_ref()
                .filter(|service| service.id == draft.service_id)
                .is_some_and(|service| service.suppress_informational);
            if suppressed {
                debug!("informational event not stored for service {}", draft.service_id);
                self.on_event_add(&draft).await?;
                return Ok(None);
            }
        }

        let event = self.store.insert_event(draft).await?;
        self.on_event_add(&event).await?;
        self.run_rules(&event).await?;

        Ok(Some(event))
    }

    async fn run_rules(&self, event: &Event) -> EngineResult<()> {
        let plan = self.rules.plan(event);
        if plan.is_empty() {
            return Ok(());
        }

        for patch in &plan.correlated_patches {
            let updated = self.update_correlated(event, patch, true).await?;
            debug!("rule updated {updated} correlated events");
        }

        if plan.notify {
            self.publish(
                MonitorEvent::new(
                    MonitorEventKind::EventNotification,
                    ItemRef::service(event.service_id),
                    event.name.clone(),
                    self.now(),
                )
                .with_event(event.id)
                .with_detail(format_event_properties(&event.content, PropertyFormat::Pretty)),
            );
        }

        if plan.tracking.is_empty() {
            return Ok(());
        }
        let Some(tracking) = &self.tracking else {
            warn!("rules requested tracking for event {} but no tracker is configured", event.id);
            return Ok(());
        };

        let request = TrackingRequest {
            event_id: event.id,
            name: event.name.clone(),
            content: format_event_properties(&event.content, PropertyFormat::Plain),
            correlation_id: event.correlation_id.clone(),
        };
        for kind in plan.tracking {
            if let Err(e) = tracking.create_tracking(kind, &request).await {
                warn!("failed to create {kind:?} for event {}: {e}", event.id);
            }
        }

        Ok(())
    }

    /// Events sharing `event`'s correlation id
    pub async fn get_correlated(&self, event: &Event, exclusive: bool) -> EngineResult<Vec<Event>> {
        let mut query = EventQuery::correlated(event.correlation_id.clone());
        if exclusive {
            query = query.excluding(event.id);
        }
        Ok(self.store.list_events(&query).await?)
    }

    /// Applies `patch` to every event sharing `event`'s correlation id
    pub async fn update_correlated(
        &self,
        event: &Event,
        patch: &EventPatch,
        exclusive: bool,
    ) -> EngineResult<usize> {
        let mut query = EventQuery::correlated(event.correlation_id.clone());
        if exclusive {
            query = query.excluding(event.id);
        }
        Ok(self.store.update_events(&query, patch).await?)
    }

    /// Events of one service, newest first
    pub async fn events_for_service(
        &self,
        service_id: ServiceId,
        offset: usize,
        limit: Option<usize>,
    ) -> EngineResult<Vec<Event>> {
        let query = EventQuery::for_services(vec![service_id]).page(offset, limit);
        Ok(self.store.list_events(&query).await?)
    }

    /// Events of every service of a host, newest first
    pub async fn events_for_host(
        &self,
        host_id: HostId,
        offset: usize,
        limit: Option<usize>,
    ) -> EngineResult<Vec<Event>> {
        let service_ids = self
            .store
            .list_services(Some(host_id))
            .await?
            .into_iter()
            .map(|service| service.id)
            .collect();
        let query = EventQuery::for_services(service_ids).page(offset, limit);
        Ok(self.store.list_events(&query).await?)
    }

    /// Newest events of services currently in an alert state
    pub async fn active_alerts(&self, limit: Option<usize>) -> EngineResult<Vec<Event>> {
        let alerting = self
            .store
            .list_services(None)
            .await?
            .into_iter()
            .filter(|service| service.is_active && service.is_alert_state())
            .map(|service| service.id)
            .collect();
        let query = EventQuery::for_services(alerting).page(0, limit);
        Ok(self.store.list_events(&query).await?)
    }
}

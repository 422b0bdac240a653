//! Notification sinks
//!
//! Every domain event that reaches the notification actor is handed to each
//! configured sink. Sinks log delivery failures themselves; a failing sink
//! never blocks the others.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::actors::messages::{MonitorEvent, MonitorEventKind};
use crate::config::{Alert, Webhook};
use crate::discord::DiscordSink;
use crate::storage::schema::ItemKind;

/// Receives state transitions for delivery to operators
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, event: &MonitorEvent);
}

/// One line describing the event, used by webhook and log sinks
pub fn format_event_message(event: &MonitorEvent) -> String {
    let target = match event.target.kind {
        ItemKind::Host => "Host",
        ItemKind::Service => "Service",
    };
    let name = &event.display_name;

    let mut message = match event.kind {
        MonitorEventKind::ServiceProblem | MonitorEventKind::HostDown => {
            let status = event.status.map_or("Unknown", |status| status.name());
            let state = if event.is_hard { "hard" } else { "soft" };
            format!("🔴 **{target} Problem**: `{name}` is {status} ({state})")
        }
        MonitorEventKind::ServiceRecovery | MonitorEventKind::HostUp => {
            format!("✅ **{target} Recovered**: `{name}` is back OK")
        }
        MonitorEventKind::StartFlapping => {
            format!("🔁 **Flapping**: `{name}` started flapping")
        }
        MonitorEventKind::StopFlapping => {
            format!("⏹️ **Flapping stopped**: `{name}` is stable again")
        }
        MonitorEventKind::Acknowledged => {
            format!("👀 **Acknowledged**: `{name}`")
        }
        MonitorEventKind::DowntimeCancelled => {
            format!("🛠️ **Downtime cancelled**: `{name}`")
        }
        MonitorEventKind::ServiceDisabled => {
            format!("⏸️ **Service disabled**: `{name}`")
        }
        MonitorEventKind::EventNotification => {
            format!("📣 **Event**: `{name}`")
        }
    };

    if let Some(detail) = event.detail.as_deref().filter(|detail| !detail.is_empty()) {
        message.push('\n');
        message.push_str(detail);
    }
    message
}

/// Posts a JSON payload to a generic webhook
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: Client,
    webhook: Webhook,
}

impl WebhookSink {
    pub fn new(webhook: Webhook) -> Self {
        Self {
            client: Client::new(),
            webhook,
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    #[instrument(skip(self, event), fields(kind = event.kind.name()))]
    async fn notify(&self, event: &MonitorEvent) {
        let payload = json!({
            "message": format_event_message(event),
            "kind": event.kind,
            "target": event.target,
            "name": event.display_name,
            "status": event.status,
            "is_hard": event.is_hard,
            "event_id": event.event_id,
            "timestamp": event.timestamp.to_rfc3339()
        });

        match self.client.post(&self.webhook.url).json(&payload).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    info!("Successfully sent webhook alert");
                } else {
                    error!("Webhook alert failed with status: {}", response.status());
                }
            }
            Err(e) => {
                error!("Failed to send webhook alert: {}", e);
            }
        }
    }
}

/// Writes every event to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, event: &MonitorEvent) {
        if event.kind.is_problem() {
            warn!("{}", format_event_message(event));
        } else {
            info!("{}", format_event_message(event));
        }
    }
}

/// Fans events out to every configured sink
#[derive(Clone, Default)]
pub struct AlertManager {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl AlertManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sinks for the configured alerts, plus a log sink
    pub fn from_config(alerts: &[Alert]) -> Self {
        let mut manager = Self::new().with_sink(LogSink);
        for alert in alerts {
            manager = match alert {
                Alert::Discord(discord) => manager.with_sink(DiscordSink::new(discord.clone())),
                Alert::Webhook(webhook) => manager.with_sink(WebhookSink::new(webhook.clone())),
            };
        }
        manager
    }

    pub fn with_sink(mut self, sink: impl NotificationSink + 'static) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub async fn dispatch(&self, event: &MonitorEvent) {
        futures::future::join_all(self.sinks.iter().map(|sink| sink.notify(event))).await;
    }
}

impl std::fmt::Debug for AlertManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.sinks.iter().map(|sink| sink.name()))
            .finish()
    }
}

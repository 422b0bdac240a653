//! Tracking collaborators (tickets, changes, problems)
//!
//! Business rules can open a tracking item for a stored event. What a ticket
//! is and how it is worked on is up to the collaborator behind
//! [`TrackingSink`]; this crate only hands over the event.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};

use crate::storage::schema::EventId;

/// Kind of tracking item to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingKind {
    Ticket,
    Change,
    Problem,
}

/// Data handed to the tracking collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingRequest {
    pub event_id: EventId,
    /// Event name, used as title
    pub name: String,
    /// Event properties as `name: value` lines
    pub content: String,
    pub correlation_id: String,
}

#[async_trait]
pub trait TrackingSink: Send + Sync {
    /// Opens a tracking item and returns its id
    async fn create_tracking(&self, kind: TrackingKind, request: &TrackingRequest) -> anyhow::Result<String>;
}

#[derive(Debug, Deserialize)]
struct CreatedTracking {
    id: serde_json::Value,
}

/// Posts tracking requests to an HTTP endpoint
///
/// The endpoint answers with `{"id": ...}`.
#[derive(Debug, Clone)]
pub struct WebhookTracker {
    client: Client,
    url: String,
}

impl WebhookTracker {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl TrackingSink for WebhookTracker {
    #[instrument(skip(self, request), fields(event_id = request.event_id))]
    async fn create_tracking(&self, kind: TrackingKind, request: &TrackingRequest) -> anyhow::Result<String> {
        let payload = json!({
            "kind": kind,
            "name": request.name,
            "content": request.content,
            "correlation_id": request.correlation_id,
            "event_id": request.event_id,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        let created: CreatedTracking = response.json().await?;
        let id = match created.id {
            serde_json::Value::String(id) => id,
            other => other.to_string(),
        };

        info!("created {kind:?} {id} for event {}", request.event_id);
        Ok(id)
    }
}

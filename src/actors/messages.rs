//! Message types for actor communication
//!
//! This module defines all message types used for communication between actors.
//!
//! ## Design Principles
//!
//! 1. **Commands**: Request/response messages sent to specific actors via mpsc
//! 2. **Events**: Broadcast notifications published to multiple subscribers
//! 3. **Immutability**: All messages are cloneable for multi-subscriber patterns

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::engine::scheduler::CycleReport;
use crate::storage::schema::{EventId, ItemRef, ServiceId, ServiceStatus};

/// Kind of a state transition published on the event bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorEventKind {
    ServiceProblem,
    ServiceRecovery,
    HostDown,
    HostUp,
    StartFlapping,
    StopFlapping,
    Acknowledged,
    DowntimeCancelled,
    ServiceDisabled,
    /// A business rule asked for a notification about a stored event
    EventNotification,
}

impl MonitorEventKind {
    pub fn name(self) -> &'static str {
        match self {
            MonitorEventKind::ServiceProblem => "service_problem",
            MonitorEventKind::ServiceRecovery => "service_recovery",
            MonitorEventKind::HostDown => "host_down",
            MonitorEventKind::HostUp => "host_up",
            MonitorEventKind::StartFlapping => "start_flapping",
            MonitorEventKind::StopFlapping => "stop_flapping",
            MonitorEventKind::Acknowledged => "acknowledged",
            MonitorEventKind::DowntimeCancelled => "downtime_cancelled",
            MonitorEventKind::ServiceDisabled => "service_disabled",
            MonitorEventKind::EventNotification => "event_notification",
        }
    }

    /// Whether this kind reports something going wrong
    pub fn is_problem(self) -> bool {
        matches!(
            self,
            MonitorEventKind::ServiceProblem
                | MonitorEventKind::HostDown
                | MonitorEventKind::StartFlapping
        )
    }
}

/// Event published on the domain event bus
///
/// Subscribers (the notification actor, API clients) receive every event.
/// The broadcast channel may lag for slow subscribers; missed transitions are
/// visible again in the stored service state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorEvent {
    pub kind: MonitorEventKind,

    /// Host or service the event is about
    pub target: ItemRef,

    /// Display name of the target (for logging/alerts)
    pub display_name: String,

    /// Status of the target after the transition
    pub status: Option<ServiceStatus>,

    pub is_hard: bool,

    /// Stored event that caused this one
    pub event_id: Option<EventId>,

    /// Free-form detail (acknowledgement comment, event name, ...)
    pub detail: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl MonitorEvent {
    pub fn new(
        kind: MonitorEventKind,
        target: ItemRef,
        display_name: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            target,
            display_name: display_name.into(),
            status: None,
            is_hard: false,
            event_id: None,
            detail: None,
            timestamp,
        }
    }

    pub fn with_status(mut self, status: ServiceStatus, is_hard: bool) -> Self {
        self.status = Some(status);
        self.is_hard = is_hard;
        self
    }

    pub fn with_event(mut self, event_id: EventId) -> Self {
        self.event_id = Some(event_id);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Commands that can be sent to the SchedulerActor
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Run a poll cycle immediately (bypassing the interval timer)
    RunCycleNow {
        respond_to: oneshot::Sender<anyhow::Result<CycleReport>>,
    },

    /// Poll a single service immediately
    CheckNow {
        service_id: ServiceId,
        respond_to: oneshot::Sender<anyhow::Result<bool>>,
    },

    /// Update the cycle interval
    ///
    /// The new interval takes effect after the next tick.
    UpdateInterval { interval_secs: u64 },

    /// Gracefully shut down the scheduler
    ///
    /// The actor will finish any in-flight cycle and then exit.
    Shutdown,
}

/// Commands that can be sent to the NotificationActor
#[derive(Debug)]
pub enum NotifierCommand {
    /// Get delivery statistics
    GetStats {
        respond_to: oneshot::Sender<NotifierStats>,
    },

    /// Suppress notifications for a duration
    ///
    /// Useful for maintenance windows.
    Mute { duration_secs: u64 },

    Unmute,

    /// Gracefully shut down the notification actor
    Shutdown,
}

/// Notification statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifierStats {
    /// Events forwarded to the sinks
    pub delivered: u64,

    /// Events dropped while muted
    pub muted: u64,

    /// Events missed because the subscriber lagged
    pub lagged: u64,
}

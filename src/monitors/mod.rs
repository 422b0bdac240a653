//! Health state of services and hosts
//!
//! - [`flapping`]: rolling history and instability score
//! - [`service`]: the per-service state machine
//! - [`host`]: host status derived from an availability service

use chrono::{DateTime, Utc};

use crate::storage::schema::ServiceStatus;

pub mod flapping;
pub mod host;
pub mod service;

/// Read access to anything that carries a monitoring state
pub trait MonitoredEntity {
    fn status(&self) -> ServiceStatus;

    fn is_flapping(&self) -> bool;

    fn is_hard_status(&self) -> bool;

    fn last_check(&self) -> Option<DateTime<Utc>>;

    fn status_since(&self) -> Option<DateTime<Utc>>;

    /// Whether operators should be alerted about this entity
    fn is_alert_state(&self) -> bool;
}

//! Host aggregation
//!
//! A host has no state of its own. Its status, flapping flag and check
//! timestamps are read from its availability service; without one the host
//! is unknown.
//!
//! Assets behind a host are looked up through a [`HostKindRegistry`] keyed by
//! [`HostKind`]. Kinds without a registered resolver fall back to the host's
//! stored name.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::schema::{Host, HostKind, Service, ServiceStatus};

use super::MonitoredEntity;

/// Display status of a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Up,
    Down,
    Unknown,
    Unreachable,
}

impl HostStatus {
    /// Maps the availability service status onto a host status
    pub fn from_service(status: ServiceStatus) -> Self {
        match status {
            ServiceStatus::Ok | ServiceStatus::Warning => HostStatus::Up,
            ServiceStatus::Critical => HostStatus::Down,
            ServiceStatus::Unknown => HostStatus::Unknown,
        }
    }
}

/// A host together with its (optional) availability service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostView {
    pub host: Host,
    pub availability: Option<Service>,
}

impl HostView {
    pub fn new(host: Host, availability: Option<Service>) -> Self {
        // A service that does not belong to the host never counts
        let availability = availability.filter(|service| service.host_id == host.id);
        Self { host, availability }
    }

    /// Status as shown to operators
    ///
    /// An unreachable host is reported as such regardless of its service.
    pub fn host_status(&self) -> HostStatus {
        if !self.host.is_reachable {
            return HostStatus::Unreachable;
        }
        match &self.availability {
            Some(service) => HostStatus::from_service(service.status),
            None => HostStatus::Unknown,
        }
    }
}

impl MonitoredEntity for HostView {
    fn status(&self) -> ServiceStatus {
        self.availability
            .as_ref()
            .map_or(ServiceStatus::Unknown, |service| service.status)
    }

    fn is_flapping(&self) -> bool {
        self.availability.as_ref().is_some_and(|s| s.is_flapping)
    }

    fn is_hard_status(&self) -> bool {
        self.availability.as_ref().is_some_and(|s| s.is_hard_status)
    }

    fn last_check(&self) -> Option<DateTime<Utc>> {
        self.availability.as_ref().and_then(|s| s.last_check)
    }

    fn status_since(&self) -> Option<DateTime<Utc>> {
        self.availability.as_ref().and_then(|s| s.status_since)
    }

    fn is_alert_state(&self) -> bool {
        matches!(self.host_status(), HostStatus::Down | HostStatus::Unreachable)
    }
}

/// Looks up the asset behind a host of one kind
pub trait AssetResolver: Send + Sync {
    /// Network address of the asset, `None` when the asset is unknown
    fn address(&self, item_id: i64) -> Option<String>;
}

/// Resolver backed by a fixed address table
#[derive(Debug, Clone, Default)]
pub struct StaticAssets {
    addresses: HashMap<i64, String>,
}

impl StaticAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_address(mut self, item_id: i64, address: impl Into<String>) -> Self {
        self.addresses.insert(item_id, address.into());
        self
    }
}

impl AssetResolver for StaticAssets {
    fn address(&self, item_id: i64) -> Option<String> {
        self.addresses.get(&item_id).cloned()
    }
}

/// Maps host kinds to their asset resolvers
#[derive(Default)]
pub struct HostKindRegistry {
    resolvers: HashMap<HostKind, Box<dyn AssetResolver>>,
}

impl HostKindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: HostKind, resolver: impl AssetResolver + 'static) {
        self.resolvers.insert(kind, Box::new(resolver));
    }

    pub fn is_registered(&self, kind: HostKind) -> bool {
        self.resolvers.contains_key(&kind)
    }

    /// Address sensors should probe for `host`
    pub fn address_of(&self, host: &Host) -> String {
        self.resolvers
            .get(&host.kind)
            .and_then(|resolver| resolver.address(host.item_id))
            .unwrap_or_else(|| host.name.clone())
    }
}

impl fmt::Debug for HostKindRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostKindRegistry")
            .field("kinds", &self.resolvers.keys().collect::<Vec<_>>())
            .finish()
    }
}

//! Sensors and the sensor registry
//!
//! A sensor probes a batch of services and returns one [`PollResult`] per
//! service it could get an answer for. Services it leaves out are treated as
//! silent by the scheduler, which records a `sensor_fault` event for them.
//!
//! ```text
//! ┌────────────┐  (provider, sensor)  ┌────────────────┐  poll(ids)  ┌────────┐
//! │ Scheduler  │ ───────────────────► │ SensorRegistry │ ──────────► │ Sensor │
//! └────────────┘                      └────────────────┘             └────────┘
//!        ▲                                                               │
//!        └──────────────── HashMap<ServiceId, PollResult> ◄──────────────┘
//! ```
//!
//! Network failures are never errors at this level. A failing probe produces
//! a WARNING or EXCEPTION result; only probes that cannot be interpreted at
//! all (timeouts, unparseable output) produce no result.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::clock::SharedClock;
use crate::monitors::host::HostKindRegistry;
use crate::storage::SharedStore;
use crate::storage::schema::{CheckMode, Host, HostId, ServiceId, Significance};

pub mod http;
pub mod ping;

pub use http::HttpSensor;
pub use ping::PingSensor;

/// Provider name of the sensors shipped with this crate
pub const BUILTIN_PROVIDER: &str = "siem";

/// Errors raised while running a probe
///
/// These never leave a sensor; they decide whether a service gets a result.
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("command failed: {0}")]
    Command(String),

    #[error("malformed sensor output: {0}")]
    Malformed(String),

    #[error("network error: {0}")]
    Network(String),
}

/// Outcome of probing a single service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResult {
    pub name: String,
    pub significance: Significance,
    pub date: DateTime<Utc>,
    pub content: Value,
}

impl PollResult {
    pub fn new(
        name: impl Into<String>,
        significance: Significance,
        date: DateTime<Utc>,
        content: Value,
    ) -> Self {
        Self {
            name: name.into(),
            significance,
            date,
            content,
        }
    }
}

/// What a sensor advertises about itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorDefinition {
    pub display_name: String,
    pub check_mode: CheckMode,
}

/// A probe that can be run against a batch of services
#[async_trait]
pub trait Sensor: Send + Sync {
    fn definition(&self) -> SensorDefinition;

    /// Probes every service in `service_ids`
    ///
    /// Services that could not be resolved or whose probe could not be
    /// interpreted are left out of the returned map.
    async fn poll(&self, ctx: &SensorContext, service_ids: &[ServiceId]) -> HashMap<ServiceId, PollResult>;
}

/// Hosts fetched during one cycle
///
/// Services of the same host share one lookup. The cache lives only as long
/// as the [`SensorContext`] that owns it.
#[derive(Debug, Default)]
pub struct HostLookup {
    hosts: Mutex<HashMap<HostId, Option<Host>>>,
}

impl HostLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, store: &SharedStore, id: HostId) -> Option<Host> {
        if let Some(cached) = self.hosts.lock().get(&id) {
            return cached.clone();
        }

        let host = match store.get_host(id).await {
            Ok(host) => host,
            Err(e) => {
                warn!("failed to load host {id}: {e}");
                return None;
            }
        };
        self.hosts.lock().insert(id, host.clone());
        host
    }

    pub fn len(&self) -> usize {
        self.hosts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.lock().is_empty()
    }
}

/// Resolved probe target of a service
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeTarget {
    pub service_id: ServiceId,
    pub host: Host,
    /// Address of the host's asset
    pub host_address: String,
    /// Template sensor parameters, `Value::Null` when unset
    pub params: Value,
}

impl ProbeTarget {
    pub fn param_bool(&self, key: &str, default: bool) -> bool {
        self.params.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}

/// Everything a sensor needs to resolve and probe services
pub struct SensorContext {
    pub store: SharedStore,
    pub host_kinds: Arc<HostKindRegistry>,
    pub clock: SharedClock,
    /// Upper bound for a single probe
    pub probe_timeout: Duration,
    pub hosts: HostLookup,
}

impl SensorContext {
    pub fn new(
        store: SharedStore,
        host_kinds: Arc<HostKindRegistry>,
        clock: SharedClock,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            store,
            host_kinds,
            clock,
            probe_timeout,
            hosts: HostLookup::new(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Loads the service, its template and its host
    ///
    /// Returns `None` when any of them is missing.
    pub async fn resolve(&self, service_id: ServiceId) -> Option<ProbeTarget> {
        let effective = match self.store.get_effective_service(service_id).await {
            Ok(Some(effective)) => effective,
            Ok(None) => {
                debug!("service {service_id} not found, skipping probe");
                return None;
            }
            Err(e) => {
                warn!("failed to load service {service_id}: {e}");
                return None;
            }
        };

        let host = self.hosts.get(&self.store, effective.service.host_id).await?;
        let host_address = self.host_kinds.address_of(&host);

        Some(ProbeTarget {
            service_id,
            host,
            host_address,
            params: effective.template.sensor_params.unwrap_or(Value::Null),
        })
    }
}

/// Sensors keyed by provider and sensor name
#[derive(Default)]
pub struct SensorRegistry {
    sensors: HashMap<(String, String), Arc<dyn Sensor>>,
}

impl SensorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `ping` and `http_ok` sensors
    pub fn with_builtin(ping_count: u32) -> Self {
        let mut registry = Self::new();
        registry.register(BUILTIN_PROVIDER, "ping", PingSensor::new(ping_count));
        registry.register(BUILTIN_PROVIDER, "http_ok", HttpSensor::new());
        registry
    }

    pub fn register(
        &mut self,
        provider: impl Into<String>,
        key: impl Into<String>,
        sensor: impl Sensor + 'static,
    ) {
        self.sensors
            .insert((provider.into(), key.into()), Arc::new(sensor));
    }

    pub fn get(&self, provider: &str, key: &str) -> Option<Arc<dyn Sensor>> {
        self.sensors
            .get(&(provider.to_string(), key.to_string()))
            .cloned()
    }

    /// Definitions of every sensor a provider offers
    pub fn definitions(&self, provider: &str) -> BTreeMap<String, SensorDefinition> {
        self.sensors
            .iter()
            .filter(|((p, _), _)| p == provider)
            .map(|((_, key), sensor)| (key.clone(), sensor.definition()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}

impl std::fmt::Debug for SensorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorRegistry")
            .field("sensors", &self.sensors.keys().collect::<Vec<_>>())
            .finish()
    }
}

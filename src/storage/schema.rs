//! Record definitions for the monitoring tables
//!
//! ## Tables
//!
//! - **hosts**: monitored assets, optionally pointing at an availability service
//! - **service_templates**: shared check configuration
//! - **services**: per-instance health state, overlaid on a template
//! - **events**: immutable observations produced by sensors or pushed passively
//! - **scheduled_downtimes**: maintenance windows for a host or service
//! - **acknowledgements**: manual suppression of an alerting host or service
//!
//! Status-like enums carry stable integer codes ([`ServiceStatus::code`] etc.)
//! which is how they are persisted. Over the API they serialize as lowercase
//! names.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::monitors::flapping::FlapHistory;

pub type HostId = i64;
pub type ServiceId = i64;
pub type TemplateId = i64;
pub type EventId = i64;
pub type DowntimeId = i64;
pub type AcknowledgementId = i64;

/// Host id of services that are not attached to any host
pub const HOSTLESS: HostId = -1;

/// Service id used for internally generated events
pub const INTERNAL_SERVICE: ServiceId = -1;

macro_rules! coded_enum {
    ($name:ident { $($variant:ident = $code:expr),+ $(,)? }) => {
        impl $name {
            pub fn code(self) -> i64 {
                self as i64
            }

            pub fn from_code(code: i64) -> Option<Self> {
                match code {
                    $(c if c == $code => Some($name::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

/// Health of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Ok = 0,
    Warning = 1,
    Critical = 2,
    Unknown = 3,
}

coded_enum!(ServiceStatus {
    Ok = 0,
    Warning = 1,
    Critical = 2,
    Unknown = 3,
});

impl ServiceStatus {
    pub fn name(self) -> &'static str {
        match self {
            ServiceStatus::Ok => "OK",
            ServiceStatus::Warning => "Warning",
            ServiceStatus::Critical => "Critical",
            ServiceStatus::Unknown => "Unknown",
        }
    }
}

/// Severity of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Significance {
    Information = 0,
    Warning = 1,
    Exception = 2,
}

coded_enum!(Significance {
    Information = 0,
    Warning = 1,
    Exception = 2,
});

impl Significance {
    /// Parses a raw significance, falling back to `Information` when it is
    /// missing or out of range
    pub fn clamp(raw: Option<i64>) -> Self {
        raw.and_then(Significance::from_code)
            .unwrap_or(Significance::Information)
    }
}

/// How a service receives its data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckMode {
    /// Polled by the scheduler
    Active = 0,
    /// Only receives pushed events
    Passive = 1,
    Hybrid = 2,
}

coded_enum!(CheckMode {
    Active = 0,
    Passive = 1,
    Hybrid = 2,
});

impl CheckMode {
    pub fn is_polled(self) -> bool {
        matches!(self, CheckMode::Active | CheckMode::Hybrid)
    }
}

/// Handling state of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    New = 0,
    Acknowledged = 1,
    Remediating = 2,
    Monitoring = 3,
    Resolved = 4,
    Expired = 5,
}

coded_enum!(EventStatus {
    New = 0,
    Acknowledged = 1,
    Remediating = 2,
    Monitoring = 3,
    Resolved = 4,
    Expired = 5,
});

/// Asset category a host refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKind {
    Computer,
    NetworkEquipment,
    Printer,
    Phone,
    Peripheral,
}

impl HostKind {
    pub const ALL: [HostKind; 5] = [
        HostKind::Computer,
        HostKind::NetworkEquipment,
        HostKind::Printer,
        HostKind::Phone,
        HostKind::Peripheral,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HostKind::Computer => "computer",
            HostKind::NetworkEquipment => "network_equipment",
            HostKind::Printer => "printer",
            HostKind::Phone => "phone",
            HostKind::Peripheral => "peripheral",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        HostKind::ALL.into_iter().find(|kind| kind.as_str() == raw)
    }
}

/// Kind of item a downtime or acknowledgement targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Host,
    Service,
}

/// Reference to a host or service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemRef {
    pub kind: ItemKind,
    pub id: i64,
}

impl ItemRef {
    pub fn host(id: HostId) -> Self {
        Self {
            kind: ItemKind::Host,
            id,
        }
    }

    pub fn service(id: ServiceId) -> Self {
        Self {
            kind: ItemKind::Service,
            id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub id: HostId,
    pub kind: HostKind,
    /// Id of the asset inside its kind's inventory
    pub item_id: i64,
    /// Asset name, also the default probe address
    pub name: String,
    pub availability_service: Option<ServiceId>,
    pub is_reachable: bool,
    pub date_creation: DateTime<Utc>,
}

impl Host {
    pub fn new(kind: HostKind, item_id: i64, name: impl Into<String>) -> Self {
        Self {
            id: 0,
            kind,
            item_id,
            name: name.into(),
            availability_service: None,
            is_reachable: true,
            date_creation: Utc::now(),
        }
    }

    /// Negative ids stored by older records mean "none"
    pub fn availability_service_id(&self) -> Option<ServiceId> {
        self.availability_service.filter(|id| *id >= 0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceTemplate {
    #[serde(default)]
    pub id: TemplateId,
    pub name: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub calendar_id: Option<i64>,
    /// Minutes between repeated notifications
    #[serde(default)]
    pub notification_interval: Option<u32>,
    /// Minutes between two polls
    #[serde(default)]
    pub check_interval: Option<u32>,
    #[serde(default)]
    pub use_flap_detection: bool,
    #[serde(default = "default_check_mode")]
    pub check_mode: CheckMode,
    #[serde(default = "default_flap_threshold_low")]
    pub flap_threshold_low: u8,
    #[serde(default = "default_flap_threshold_high")]
    pub flap_threshold_high: u8,
    #[serde(default = "default_max_checks")]
    pub max_checks: u32,
    /// Owner of the sensor (the registry namespace)
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub sensor: Option<String>,
    #[serde(default)]
    pub sensor_params: Option<Value>,
    #[serde(default)]
    pub is_stateless: bool,
}

fn default_priority() -> u8 {
    3
}

fn default_check_mode() -> CheckMode {
    CheckMode::Active
}

fn default_flap_threshold_low() -> u8 {
    15
}

fn default_flap_threshold_high() -> u8 {
    30
}

fn default_max_checks() -> u32 {
    1
}

impl ServiceTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            comment: String::new(),
            priority: default_priority(),
            calendar_id: None,
            notification_interval: None,
            check_interval: None,
            use_flap_detection: false,
            check_mode: default_check_mode(),
            flap_threshold_low: default_flap_threshold_low(),
            flap_threshold_high: default_flap_threshold_high(),
            max_checks: default_max_checks(),
            provider: None,
            sensor: None,
            sensor_params: None,
            is_stateless: false,
        }
    }

    /// Assigns a sensor from the given provider
    pub fn with_sensor(mut self, provider: impl Into<String>, sensor: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self.sensor = Some(sensor.into());
        self
    }
}

/// Per-instance state of a monitored service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub host_id: HostId,
    pub template_id: TemplateId,
    pub name: String,
    pub status: ServiceStatus,
    pub is_hard_status: bool,
    pub status_since: Option<DateTime<Utc>>,
    pub is_flapping: bool,
    pub is_active: bool,
    pub flap_state_cache: FlapHistory,
    /// Consecutive soft failures since the last problem transition
    pub current_check: u32,
    pub last_check: Option<DateTime<Utc>>,
    /// Informational events update the state but are not stored
    pub suppress_informational: bool,
}

impl Service {
    pub fn new(host_id: HostId, template_id: TemplateId, name: impl Into<String>) -> Self {
        Self {
            id: 0,
            host_id,
            template_id,
            name: name.into(),
            status: ServiceStatus::Critical,
            is_hard_status: true,
            status_since: None,
            is_flapping: false,
            is_active: true,
            flap_state_cache: FlapHistory::new(),
            current_check: 0,
            last_check: None,
            suppress_informational: false,
        }
    }

    pub fn is_hostless(&self) -> bool {
        self.host_id < 0
    }
}

/// A service overlaid on its template
///
/// Template fields hold configuration, the service record holds state. Callers
/// read configuration through the accessors below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveService {
    pub service: Service,
    pub template: ServiceTemplate,
}

impl EffectiveService {
    pub fn id(&self) -> ServiceId {
        self.service.id
    }

    pub fn check_mode(&self) -> CheckMode {
        self.template.check_mode
    }

    pub fn check_interval(&self) -> Duration {
        Duration::minutes(self.template.check_interval.unwrap_or(0) as i64)
    }

    pub fn max_checks(&self) -> u32 {
        self.template.max_checks
    }

    pub fn sensor_key(&self) -> Option<(&str, &str)> {
        match (&self.template.provider, &self.template.sensor) {
            (Some(provider), Some(sensor)) => Some((provider.as_str(), sensor.as_str())),
            _ => None,
        }
    }

    /// Whether the scheduler should poll this service at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.check_mode().is_polled() || !self.service.is_active {
            return false;
        }

        if self.sensor_key().is_none() {
            return false;
        }

        match self.service.last_check {
            None => true,
            Some(last_check) => last_check + self.check_interval() <= now,
        }
    }
}

/// A stored observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub service_id: ServiceId,
    pub name: String,
    pub significance: Significance,
    pub status: EventStatus,
    pub date: DateTime<Utc>,
    /// JSON text
    pub content: String,
    pub correlation_id: String,
    pub provider: Option<String>,
}

/// Changes applied to every event of a correlation group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPatch {
    #[serde(default)]
    pub status: Option<EventStatus>,
    #[serde(default)]
    pub significance: Option<Significance>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.significance.is_none()
            && self.name.is_none()
            && self.correlation_id.is_none()
    }

    pub fn apply(&self, event: &mut Event) {
        if let Some(status) = self.status {
            event.status = status;
        }
        if let Some(significance) = self.significance {
            event.significance = significance;
        }
        if let Some(name) = &self.name {
            event.name = name.clone();
        }
        if let Some(correlation_id) = &self.correlation_id {
            event.correlation_id = correlation_id.clone();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledDowntime {
    pub id: DowntimeId,
    pub name: String,
    #[serde(default)]
    pub comment: String,
    pub target: ItemRef,
    /// Fixed downtimes survive a recovery
    #[serde(default)]
    pub is_fixed: bool,
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub is_cancelled: bool,
}

impl ScheduledDowntime {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_cancelled && self.begin <= now && now <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub id: AcknowledgementId,
    pub target: ItemRef,
    /// Status code of the target when it was acknowledged
    pub status: i64,
    pub user: String,
    pub comment: String,
    pub is_sticky: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Acknowledgement {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

//! Service state machine
//!
//! Every stored event is folded into its service's state by
//! [`apply_significance`]. The function is pure: it mutates the service record
//! in place and reports what happened, the engine persists the record and
//! dispatches domain events.
//!
//! ```text
//!              EXCEPTION                 EXCEPTION (soft, counted)
//!   ┌────┐  ───────────────►  ┌──────────────┐ ──────────────┐
//!   │ OK │                    │ WARNING soft │ ◄─────────────┘
//!   └────┘  ◄───────────────  └──────────────┘
//!     ▲        INFORMATION           │ current_check + 1 >= max_checks
//!     │                              ▼
//!     │      INFORMATION     ┌───────────────┐
//!     └───────────────────── │ CRITICAL hard │
//!                            └───────────────┘
//! ```
//!
//! WARNING events never drive a transition; they only enter the flap history.

use chrono::{DateTime, Utc};

use crate::storage::schema::{Service, ServiceStatus, ServiceTemplate, Significance};

use super::MonitoredEntity;
use super::flapping::FlapEvaluation;

/// State transition caused by a single event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// An OK service received an exception
    Problem { hard: bool },
    /// A soft problem received another exception
    SoftFailure { promoted: bool },
    /// A non-OK service received an informational event
    Recovery,
    None,
}

/// Outcome of applying an event to a service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateUpdate {
    pub transition: Transition,
    pub previous_status: ServiceStatus,
    /// `None` when flap detection did not run
    pub flap: Option<FlapEvaluation>,
    pub flapping_changed: bool,
    /// Stateless services only get their `last_check` stamped
    pub stateless: bool,
}

impl StateUpdate {
    pub fn status_changed(&self, service: &Service) -> bool {
        self.previous_status != service.status
    }
}

/// Folds one event significance into the service state
///
/// `in_downtime` covers both the service's own downtimes and those of its
/// host. Problem transitions and flap detection are suppressed while down.
pub fn apply_significance(
    service: &mut Service,
    template: &ServiceTemplate,
    significance: Significance,
    in_downtime: bool,
    now: DateTime<Utc>,
) -> StateUpdate {
    let previous_status = service.status;
    let was_flapping = service.is_flapping;

    service.last_check = Some(now);

    if template.is_stateless {
        return StateUpdate {
            transition: Transition::None,
            previous_status,
            flap: None,
            flapping_changed: false,
            stateless: true,
        };
    }

    let transition = match (previous_status, significance) {
        (ServiceStatus::Ok, Significance::Exception) if !in_downtime => {
            service.is_hard_status = false;
            service.current_check = 0;
            if template.max_checks <= 1 {
                service.is_hard_status = true;
            }
            service.status = if service.is_hard_status {
                ServiceStatus::Critical
            } else {
                ServiceStatus::Warning
            };
            Transition::Problem {
                hard: service.is_hard_status,
            }
        }
        (status, Significance::Exception)
            if status != ServiceStatus::Ok && !in_downtime && !service.is_hard_status =>
        {
            service.current_check += 1;
            let promoted = service.current_check + 1 >= template.max_checks;
            if promoted {
                service.is_hard_status = true;
                service.status = ServiceStatus::Critical;
            }
            Transition::SoftFailure { promoted }
        }
        (status, Significance::Information) if status != ServiceStatus::Ok => {
            service.status = ServiceStatus::Ok;
            if service.is_hard_status {
                service.current_check = 0;
            }
            Transition::Recovery
        }
        _ => Transition::None,
    };

    service.flap_state_cache.push(significance.code() as u8);

    let flap = (template.use_flap_detection && !in_downtime).then(|| {
        FlapEvaluation::evaluate(
            service.flap_state_cache.instability_percent(),
            template.flap_threshold_low as u32,
            template.flap_threshold_high as u32,
            was_flapping,
        )
    });
    if let Some(evaluation) = flap {
        service.is_flapping = evaluation.is_flapping(was_flapping);
    }

    let flapping_changed = service.is_flapping != was_flapping;
    if flapping_changed || service.status != previous_status {
        service.status_since = Some(now);
    }

    StateUpdate {
        transition,
        previous_status,
        flap,
        flapping_changed,
        stateless: false,
    }
}

impl MonitoredEntity for Service {
    fn status(&self) -> ServiceStatus {
        self.status
    }

    fn is_flapping(&self) -> bool {
        self.is_flapping
    }

    fn is_hard_status(&self) -> bool {
        self.is_hard_status
    }

    fn last_check(&self) -> Option<DateTime<Utc>> {
        self.last_check
    }

    fn status_since(&self) -> Option<DateTime<Utc>> {
        self.status_since
    }

    fn is_alert_state(&self) -> bool {
        matches!(self.status, ServiceStatus::Warning | ServiceStatus::Critical)
    }
}

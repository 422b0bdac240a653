//! Event filters and business rules
//!
//! Two chains surround ingestion:
//!
//! ```text
//! draft ──► FilterChain ──► store + state update ──► RuleSet actions
//!            (drop/rewrite)                          1. assign_correlated
//!                                                    2. notify / tracking
//! ```
//!
//! Filters see the event before it is stored and may drop or rewrite it.
//! Rules see the stored event and only act on it; correlated updates always
//! run before notification and tracking actions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::storage::schema::{Event, EventPatch, EventStatus, ServiceId, Significance};
use crate::tracking::TrackingKind;

/// Conditions an event must meet for a filter or rule to apply
///
/// Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleCriteria {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub name_contains: Option<String>,
    #[serde(default)]
    pub content_contains: Option<String>,
    #[serde(default)]
    pub significance: Option<Significance>,
    #[serde(default)]
    pub status: Option<EventStatus>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub service_id: Option<ServiceId>,
}

impl RuleCriteria {
    pub fn matches(&self, event: &Event) -> bool {
        self.name.as_ref().is_none_or(|name| &event.name == name)
            && self
                .name_contains
                .as_ref()
                .is_none_or(|part| event.name.contains(part.as_str()))
            && self
                .content_contains
                .as_ref()
                .is_none_or(|part| event.content.contains(part.as_str()))
            && self.significance.is_none_or(|s| event.significance == s)
            && self.status.is_none_or(|s| event.status == s)
            && self
                .provider
                .as_ref()
                .is_none_or(|p| event.provider.as_ref() == Some(p))
            && self.service_id.is_none_or(|id| event.service_id == id)
    }
}

/// Stage of the pre-store filter chain
#[async_trait]
pub trait EventFilter: Send + Sync {
    /// Filter name for identification and logging
    fn name(&self) -> &str;

    /// Returns the (possibly rewritten) event, or `None` to drop it
    async fn process(&self, event: Event) -> Option<Event>;
}

/// Filters applied in order before an event is stored
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn EventFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F: EventFilter + 'static>(&mut self, filter: F) {
        self.filters.push(Box::new(filter));
    }

    /// Runs the event through every filter
    ///
    /// Returns `None` as soon as one filter drops the event.
    pub async fn process(&self, mut event: Event) -> Option<Event> {
        for filter in &self.filters {
            match filter.process(event).await {
                Some(next) => event = next,
                None => {
                    trace!("event dropped by filter {}", filter.name());
                    return None;
                }
            }
        }
        Some(event)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.filters.iter().map(|filter| filter.name()))
            .finish()
    }
}

/// Declarative filter: accept or drop matching events, rewriting fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRule {
    pub name: String,
    #[serde(default)]
    pub criteria: RuleCriteria,
    #[serde(default = "default_accept")]
    pub accept: bool,
    /// Fields overwritten on accepted events
    #[serde(default)]
    pub assign: EventPatch,
}

fn default_accept() -> bool {
    true
}

#[async_trait]
impl EventFilter for FilterRule {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, mut event: Event) -> Option<Event> {
        if !self.criteria.matches(&event) {
            return Some(event);
        }
        if !self.accept {
            return None;
        }
        self.assign.apply(&mut event);
        Some(event)
    }
}

/// Action run for a stored event that matched a rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleAction {
    /// Update every event sharing the correlation id
    AssignCorrelated {
        #[serde(default)]
        set: EventPatch,
    },
    Notify,
    CreateTicket,
    CreateChange,
    CreateProblem,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRule {
    pub name: String,
    #[serde(default)]
    pub criteria: RuleCriteria,
    pub actions: Vec<RuleAction>,
}

/// Actions collected from every rule matching an event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RulePlan {
    pub correlated_patches: Vec<EventPatch>,
    pub notify: bool,
    pub tracking: Vec<TrackingKind>,
}

impl RulePlan {
    pub fn is_empty(&self) -> bool {
        self.correlated_patches.is_empty() && !self.notify && self.tracking.is_empty()
    }
}

/// Business rules evaluated after an event is stored
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    rules: Vec<EventRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<EventRule>) -> Self {
        Self { rules }
    }

    pub fn push(&mut self, rule: EventRule) {
        self.rules.push(rule);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Collects the actions of every matching rule
    pub fn plan(&self, event: &Event) -> RulePlan {
        let mut plan = RulePlan::default();

        for rule in self.rules.iter().filter(|rule| rule.criteria.matches(event)) {
            trace!("rule {} matched event {}", rule.name, event.id);
            for action in &rule.actions {
                match action {
                    RuleAction::AssignCorrelated { set } => plan.correlated_patches.push(set.clone()),
                    RuleAction::Notify => plan.notify = true,
                    RuleAction::CreateTicket => plan.tracking.push(TrackingKind::Ticket),
                    RuleAction::CreateChange => plan.tracking.push(TrackingKind::Change),
                    RuleAction::CreateProblem => plan.tracking.push(TrackingKind::Problem),
                }
            }
        }

        plan
    }
}

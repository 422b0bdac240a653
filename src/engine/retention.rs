//! Event retention

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::{Engine, EngineResult};
use crate::storage::EventQuery;
use crate::storage::schema::{Event, INTERNAL_SERVICE, Significance};

/// How long events are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    #[serde(default = "default_information_days")]
    pub information_days: u32,
    /// Warnings and exceptions
    #[serde(default = "default_problem_days")]
    pub problem_days: u32,
    /// Newest events per service that are never removed
    #[serde(default = "default_keep_last")]
    pub keep_last: usize,
}

fn default_information_days() -> u32 {
    30
}

fn default_problem_days() -> u32 {
    60
}

fn default_keep_last() -> usize {
    5
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            information_days: default_information_days(),
            problem_days: default_problem_days(),
            keep_last: default_keep_last(),
        }
    }
}

impl RetentionPolicy {
    pub fn is_expired(&self, event: &Event, now: DateTime<Utc>) -> bool {
        let days = match event.significance {
            Significance::Information => self.information_days,
            Significance::Warning | Significance::Exception => self.problem_days,
        };
        event.date < now - Duration::days(days as i64)
    }
}

impl Engine {
    /// Deletes events past their retention period
    ///
    /// Returns the number of deleted events.
    #[instrument(skip(self))]
    pub async fn archive_old_events(&self, policy: RetentionPolicy) -> EngineResult<usize> {
        let now = self.now();

        let mut service_ids: Vec<_> = self
            .store
            .list_services(None)
            .await?
            .into_iter()
            .map(|service| service.id)
            .collect();
        service_ids.push(INTERNAL_SERVICE);

        let mut deleted = 0;
        for service_id in service_ids {
            let query = EventQuery::for_services(vec![service_id]).page(policy.keep_last, None);
            let expired: Vec<_> = self
                .store
                .list_events(&query)
                .await?
                .into_iter()
                .filter(|event| policy.is_expired(event, now))
                .map(|event| event.id)
                .collect();

            if !expired.is_empty() {
                deleted += self.store.delete_events(&expired).await?;
            }
        }

        if deleted > 0 {
            info!("archived {deleted} events");
        }
        Ok(deleted)
    }
}

//! Poll cycle
//!
//! One cycle:
//!
//! ```text
//! due services ──► group by (provider, sensor) ──► Sensor::poll(ids)
//!                                                      │
//!        ┌─────────────────────────────────────────────┘
//!        ▼
//!   result  ──► add_event(result)
//!   silence ──► add_event(sensor_fault)
//! ```
//!
//! A failure to store one event is logged and counted; the cycle carries on
//! with the remaining services and groups. A sensor that does not answer
//! within twice the per-service timeout is abandoned and its whole group faults.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use super::ingest::EventInput;
use super::{Engine, EngineError, EngineResult};
use crate::sensors::{PollResult, SensorContext};
use crate::storage::schema::{EffectiveService, ServiceId};

/// Outcome of a poll cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Services selected for polling
    pub due: usize,
    /// Services their sensor answered for
    pub reported: usize,
    /// Services that got a `sensor_fault` event
    pub faulted: usize,
    /// Events that could not be stored
    pub failed: usize,
}

impl CycleReport {
    /// Number of services with a sensor result
    pub fn volume(&self) -> usize {
        self.reported
    }
}

type SensorKey = (String, String);

const GROUP_TIMEOUT_SLACK: Duration = Duration::from_millis(500);

impl Engine {
    fn sensor_context(&self) -> SensorContext {
        SensorContext::new(
            self.store.clone(),
            self.host_kinds.clone(),
            self.clock.clone(),
            self.probe_timeout,
        )
    }

    /// Polls every due service once
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> EngineResult<CycleReport> {
        self.locks.prune();
        let now = self.now();
        let due = self.store.due_services(now).await?;

        let mut report = CycleReport {
            due: due.len(),
            ..Default::default()
        };
        if due.is_empty() {
            debug!("no services due");
            return Ok(report);
        }

        let ctx = self.sensor_context();
        for ((provider, sensor), ids) in group_by_sensor(&due) {
            let results = self.poll_group(&ctx, &provider, &sensor, &ids).await;
            self.record_results(&provider, &ids, results, &mut report).await;
        }

        info!(
            "cycle done: {} due, {} reported, {} faulted, {} failed",
            report.due, report.reported, report.faulted, report.failed
        );
        Ok(report)
    }

    /// Polls a single active service right away
    ///
    /// Returns whether its sensor produced a result.
    #[instrument(skip(self))]
    pub async fn check_now(&self, service_id: ServiceId) -> EngineResult<bool> {
        let effective = self
            .store
            .get_effective_service(service_id)
            .await?
            .ok_or(EngineError::NotFound {
                kind: "service",
                id: service_id,
            })?;

        if !effective.service.is_active {
            return Err(EngineError::InvalidRequest(format!(
                "service {service_id} is disabled"
            )));
        }
        let Some((provider, sensor)) = effective.sensor_key() else {
            return Err(EngineError::InvalidRequest(format!(
                "service {service_id} has no sensor"
            )));
        };

        let ctx = self.sensor_context();
        let ids = [service_id];
        let mut results = self.poll_group(&ctx, provider, sensor, &ids).await;

        let Some(result) = results.remove(&service_id) else {
            debug!("sensor {provider}/{sensor} gave no result for service {service_id}");
            return Ok(false);
        };
        self.add_event(result_input(service_id, provider, result)).await?;
        Ok(true)
    }

    async fn poll_group(
        &self,
        ctx: &SensorContext,
        provider: &str,
        sensor: &str,
        ids: &[ServiceId],
    ) -> HashMap<ServiceId, PollResult> {
        let Some(handler) = self.sensors.get(provider, sensor) else {
            warn!("unknown sensor {provider}/{sensor} for {} services", ids.len());
            return Default::default();
        };

        debug!("polling {} services with {provider}/{sensor}", ids.len());
        let limit = group_timeout(ctx.probe_timeout);
        match tokio::time::timeout(limit, handler.poll(ctx, ids)).await {
            Ok(results) => results,
            Err(_) => {
                warn!("sensor {provider}/{sensor} did not answer within {limit:?}");
                Default::default()
            }
        }
    }

    async fn record_results(
        &self,
        provider: &str,
        ids: &[ServiceId],
        mut results: HashMap<ServiceId, PollResult>,
        report: &mut CycleReport,
    ) {
        for &service_id in ids {
            let input = match results.remove(&service_id) {
                Some(result) => {
                    report.reported += 1;
                    result_input(service_id, provider, result)
                }
                None => {
                    report.faulted += 1;
                    EventInput::sensor_fault(service_id, Some(provider.to_string()))
                }
            };

            if let Err(e) = self.add_event(input).await {
                error!("failed to record poll result for service {service_id}: {e}");
                report.failed += 1;
            }
        }
    }
}

fn result_input(service_id: ServiceId, provider: &str, result: PollResult) -> EventInput {
    EventInput::new(service_id, result.name, result.significance)
        .with_date(result.date)
        .with_content(result.content)
        .with_provider(provider)
}

/// Upper bound for one `Sensor::poll` call
///
/// Sensors bound each service check by the per-service timeout themselves;
/// the slack covers their bookkeeping around concurrent checks.
fn group_timeout(probe_timeout: Duration) -> Duration {
    probe_timeout.saturating_mul(2) + GROUP_TIMEOUT_SLACK
}

/// Batches due services by their sensor, keeping a stable order
fn group_by_sensor(due: &[EffectiveService]) -> BTreeMap<SensorKey, Vec<ServiceId>> {
    let mut groups: BTreeMap<SensorKey, Vec<ServiceId>> = BTreeMap::new();
    for effective in due {
        if let Some((provider, sensor)) = effective.sensor_key() {
            groups
                .entry((provider.to_string(), sensor.to_string()))
                .or_default()
                .push(effective.id());
        }
    }
    groups
}

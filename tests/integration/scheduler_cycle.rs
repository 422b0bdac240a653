//! Integration tests for the poll cycle and the scheduler actor

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::Duration;
use pretty_assertions::assert_eq;
use siem_monitoring::{
    actors::SchedulerHandle,
    engine::{CycleReport, EngineError},
    sensors::{PollResult, Sensor, SensorContext, SensorDefinition},
    storage::{MemoryStore, schema::*},
};

use crate::helpers::*;

#[tokio::test]
async fn test_cycle_batches_services_per_sensor() {
    let env = env();
    let (_, web) = monitored_host(&env.engine, "web-01", template("ping", 1)).await;
    let (_, db) = monitored_host(&env.engine, "db-01", template("ping", 1)).await;
    env.sensor.set(web.id, Significance::Exception);

    let report = env.engine.run_cycle().await.unwrap();

    assert_eq!(
        report,
        CycleReport {
            due: 2,
            reported: 1,
            faulted: 1,
            failed: 0,
        }
    );
    assert_eq!(env.sensor.poll_count(), 1);

    // A silent sensor is a failure too
    assert_eq!(service(&env.engine, web.id).await.status, ServiceStatus::Critical);
    assert_eq!(service(&env.engine, db.id).await.status, ServiceStatus::Critical);

    let events = env.engine.events_for_service(db.id, 0, None).await.unwrap();
    assert_eq!(events[0].name, "sensor_fault");
    assert_eq!(events[0].provider.as_deref(), Some(PROVIDER));
}

/// Never answers
struct HangingSensor;

#[async_trait]
impl Sensor for HangingSensor {
    fn definition(&self) -> SensorDefinition {
        SensorDefinition {
            display_name: "Hanging".to_string(),
            check_mode: CheckMode::Active,
        }
    }

    async fn poll(&self, _ctx: &SensorContext, _service_ids: &[ServiceId]) -> HashMap<ServiceId, PollResult> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_hanging_sensor_faults_its_group() {
    let env = env_with_sensors(
        Arc::new(MemoryStore::new()),
        StdDuration::from_millis(100),
        |sensors| sensors.register(PROVIDER, "hanging", HangingSensor),
    );
    let (_, stuck) = monitored_host(
        &env.engine,
        "web-01",
        template("stuck", 1).with_sensor(PROVIDER, "hanging"),
    )
    .await;
    let (_, healthy) = monitored_host(&env.engine, "db-01", template("ping", 1)).await;
    env.sensor.set(healthy.id, Significance::Information);

    let report = tokio::time::timeout(StdDuration::from_secs(3), env.engine.run_cycle())
        .await
        .expect("cycle stalled on a hanging sensor")
        .unwrap();

    assert_eq!(
        report,
        CycleReport {
            due: 2,
            reported: 1,
            faulted: 1,
            failed: 0,
        }
    );
    let events = env.engine.events_for_service(stuck.id, 0, None).await.unwrap();
    assert_eq!(events[0].name, "sensor_fault");
    assert_eq!(service(&env.engine, stuck.id).await.status, ServiceStatus::Critical);

    let checked = tokio::time::timeout(StdDuration::from_secs(3), env.engine.check_now(stuck.id))
        .await
        .expect("check-now stalled on a hanging sensor")
        .unwrap();
    assert!(!checked);
}

#[tokio::test]
async fn test_services_wait_for_their_interval() {
    let env = env();
    let (_, web) = monitored_host(&env.engine, "web-01", template("ping", 1)).await;
    env.sensor.set(web.id, Significance::Information);

    assert_eq!(env.engine.run_cycle().await.unwrap().due, 1);
    assert_eq!(env.engine.run_cycle().await.unwrap().due, 0);

    env.clock.advance(Duration::minutes(4));
    assert_eq!(env.engine.run_cycle().await.unwrap().due, 0);

    env.clock.advance(Duration::minutes(1));
    let report = env.engine.run_cycle().await.unwrap();
    assert_eq!(report.due, 1);
    assert_eq!(report.volume(), 1);

    let state = service(&env.engine, web.id).await;
    assert_eq!(state.last_check, Some(env.clock_now()));
}

#[tokio::test]
async fn test_passive_and_disabled_services_are_skipped() {
    let env = env();
    let mut passive = template("trap", 1);
    passive.check_mode = CheckMode::Passive;
    let (_, trap) = monitored_host(&env.engine, "switch-01", passive).await;
    let (_, web) = monitored_host(&env.engine, "web-01", template("ping", 1)).await;
    env.engine.set_service_active(web.id, false).await.unwrap();

    let report = env.engine.run_cycle().await.unwrap();

    assert_eq!(report, CycleReport::default());
    assert_eq!(env.sensor.poll_count(), 0);
    assert!(service(&env.engine, trap.id).await.last_check.is_none());
}

#[tokio::test]
async fn test_unknown_sensor_faults_its_services() {
    let env = env();
    let mut missing = template("legacy", 1);
    missing.sensor = Some("retired".to_string());
    let (_, legacy) = monitored_host(&env.engine, "legacy-01", missing).await;

    let report = env.engine.run_cycle().await.unwrap();

    assert_eq!(report.due, 1);
    assert_eq!(report.faulted, 1);
    assert_eq!(service(&env.engine, legacy.id).await.status, ServiceStatus::Critical);
}

#[tokio::test]
async fn test_check_now() {
    let env = env();
    let (_, web) = monitored_host(&env.engine, "web-01", template("ping", 1)).await;

    assert!(!env.engine.check_now(web.id).await.unwrap());

    env.sensor.set(web.id, Significance::Exception);
    assert!(env.engine.check_now(web.id).await.unwrap());
    assert_eq!(service(&env.engine, web.id).await.status, ServiceStatus::Critical);

    assert_matches!(
        env.engine.check_now(404).await,
        Err(EngineError::NotFound { kind: "service", id: 404 })
    );

    env.engine.set_service_active(web.id, false).await.unwrap();
    assert_matches!(
        env.engine.check_now(web.id).await,
        Err(EngineError::InvalidRequest(_))
    );
}

#[tokio::test]
async fn test_check_now_requires_sensor() {
    let env = env();
    let mut sensorless = template("manual", 1);
    sensorless.provider = None;
    sensorless.sensor = None;
    let (_, manual) = monitored_host(&env.engine, "web-01", sensorless).await;

    assert_matches!(
        env.engine.check_now(manual.id).await,
        Err(EngineError::InvalidRequest(_))
    );
}

#[tokio::test]
async fn test_scheduler_actor_polls_on_start() {
    let env = env();
    let (_, web) = monitored_host(&env.engine, "web-01", template("ping", 1)).await;
    env.sensor.set(web.id, Significance::Information);

    let handle = SchedulerHandle::spawn(env.engine.clone(), StdDuration::from_secs(3600), None);
    tokio::time::sleep(StdDuration::from_millis(100)).await;

    assert_eq!(env.sensor.poll_count(), 1);
    assert_eq!(service(&env.engine, web.id).await.last_check, Some(env.clock_now()));

    // Nothing is due again until the clock moves
    assert_eq!(handle.run_cycle_now().await.unwrap().due, 0);

    env.clock.advance(Duration::minutes(5));
    let report = handle.run_cycle_now().await.unwrap();
    assert_eq!(report.reported, 1);

    assert!(handle.check_now(web.id).await.unwrap());
    assert!(handle.check_now(404).await.is_err());

    handle.shutdown().await.unwrap();
}

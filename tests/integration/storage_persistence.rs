//! Integration tests for monitoring state persistence
//!
//! These tests verify that service state, events, downtimes and
//! acknowledgements survive reopening the SQLite store.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use siem_monitoring::{
    engine::{AcknowledgeRequest, RetentionPolicy},
    storage::{RecordStore, StorageError, schema::*, sqlite::SqliteStore},
};
use tempfile::tempdir;

use crate::helpers::*;

#[tokio::test]
async fn test_state_survives_restart() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("monitoring.db");

    let (host_id, service_id) = {
        let store = Arc::new(SqliteStore::new(&db_path).await.unwrap());
        let env = env_with_store(store.clone());
        let mut flappy = template("ping", 3);
        flappy.use_flap_detection = true;
        flappy.sensor_params = Some(serde_json::json!({ "count": 3 }));
        let (host, service) = monitored_host(&env.engine, "web-01", flappy).await;

        report(&env.engine, service.id, Significance::Exception).await;
        report(&env.engine, service.id, Significance::Exception).await;
        env.engine
            .acknowledge(AcknowledgeRequest::new(ItemRef::service(service.id), "alice"))
            .await
            .unwrap();
        env.engine
            .schedule_downtime(downtime(ItemRef::service(service.id), env.clock_now(), true))
            .await
            .unwrap();

        store.close().await.unwrap();
        (host.id, service.id)
    };

    let store = Arc::new(SqliteStore::new(&db_path).await.unwrap());
    let env = env_with_store(store);

    let service = service(&env.engine, service_id).await;
    assert_eq!(service.status, ServiceStatus::Warning);
    assert!(!service.is_hard_status);
    assert_eq!(service.current_check, 1);
    assert_eq!(service.last_check, Some(start_time()));
    assert_eq!(&service.flap_state_cache.entries()[18..], &[2, 2]);

    let effective = env
        .engine
        .store()
        .get_effective_service(service_id)
        .await
        .unwrap()
        .unwrap();
    assert!(effective.template.use_flap_detection);
    assert_eq!(effective.template.sensor_params, Some(serde_json::json!({ "count": 3 })));

    let host = env.engine.store().get_host(host_id).await.unwrap().unwrap();
    assert_eq!(host.availability_service_id(), Some(service_id));

    let events = env.engine.events_for_host(host_id, 0, None).await.unwrap();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.significance == Significance::Exception));

    assert!(env.engine.is_acknowledged(ItemRef::service(service_id)).await.unwrap());
    assert!(env.engine.is_scheduled_down(ItemRef::service(service_id)).await.unwrap());
}

#[tokio::test]
async fn test_correlated_events_share_updates() {
    let temp_dir = tempdir().unwrap();
    let store = Arc::new(SqliteStore::new(temp_dir.path().join("events.db")).await.unwrap());
    let env = env_with_store(store);
    let (_, service) = monitored_host(&env.engine, "web-01", template("ping", 1)).await;

    let mut first = None;
    for name in ["login_failed", "login_failed", "account_locked"] {
        let event = env
            .engine
            .add_event(
                siem_monitoring::engine::EventInput::new(service.id, name, Significance::Warning)
                    .with_correlation_id("incident-7"),
            )
            .await
            .unwrap()
            .unwrap();
        first.get_or_insert(event);
    }
    let first = first.unwrap();

    assert_eq!(env.engine.get_correlated(&first, false).await.unwrap().len(), 3);
    assert_eq!(env.engine.get_correlated(&first, true).await.unwrap().len(), 2);

    let patch = EventPatch {
        status: Some(EventStatus::Resolved),
        ..Default::default()
    };
    assert_eq!(env.engine.update_correlated(&first, &patch, true).await.unwrap(), 2);

    let events = env.engine.get_correlated(&first, false).await.unwrap();
    let resolved = events.iter().filter(|e| e.status == EventStatus::Resolved).count();
    assert_eq!(resolved, 2);
}

#[tokio::test]
async fn test_retention_keeps_recent_and_newest_events() {
    let temp_dir = tempdir().unwrap();
    let store = Arc::new(SqliteStore::new(temp_dir.path().join("retention.db")).await.unwrap());
    let env = env_with_store(store);
    let (_, service) = monitored_host(&env.engine, "web-01", template("ping", 1)).await;

    for _ in 0..8 {
        report(&env.engine, service.id, Significance::Information).await;
    }
    env.clock.advance(chrono::Duration::days(31));

    let policy = RetentionPolicy {
        information_days: 30,
        problem_days: 60,
        keep_last: 5,
    };
    let deleted = env.engine.archive_old_events(policy).await.unwrap();

    assert_eq!(deleted, 3);
    assert_eq!(env.engine.events_for_service(service.id, 0, None).await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_health_check() {
    let temp_dir = tempdir().unwrap();
    let store = SqliteStore::new(temp_dir.path().join("health.db")).await.unwrap();

    let health = store.health_check().await.unwrap();
    assert!(health.healthy);
}

#[tokio::test]
async fn test_removed_host_takes_its_records_along() {
    let temp_dir = tempdir().unwrap();
    let store = Arc::new(SqliteStore::new(temp_dir.path().join("removal.db")).await.unwrap());
    let env = env_with_store(store.clone());

    assert_host_removal_cleans_up(&env).await;

    let services = store.list_services(None).await.unwrap();
    assert!(services.is_empty());
}

#[tokio::test]
async fn test_racing_acknowledgements_yield_one_winner() {
    let temp_dir = tempdir().unwrap();
    let store = Arc::new(SqliteStore::new(temp_dir.path().join("monitoring.db")).await.unwrap());
    let env = env_with_store(store.clone());
    let (_, service) = monitored_host(&env.engine, "web-01", template("ping", 1)).await;
    report(&env.engine, service.id, Significance::Exception).await;

    let target = ItemRef::service(service.id);
    let (first, second) = tokio::join!(
        env.engine.acknowledge(AcknowledgeRequest::new(target, "alice")),
        env.engine.acknowledge(AcknowledgeRequest::new(target, "bob")),
    );
    let outcomes = [first.unwrap(), second.unwrap()];
    assert_eq!(outcomes.iter().filter(|won| **won).count(), 1);

    // The store itself reports the duplicate as a conflict
    let existing = store.find_acknowledgement(target).await.unwrap().unwrap();
    let duplicate = store.insert_acknowledgement(existing).await;
    assert!(matches!(duplicate, Err(StorageError::Conflict(_))));
    assert_eq!(store.list_acknowledgements().await.unwrap().len(), 1);
}

//! Integration tests for event ingestion and the service state machine
//!
//! These tests verify that:
//! - Exceptions escalate from soft to hard after `max_checks`
//! - Informational events recover a service and its host
//! - Downtimes suppress problems and end on recovery
//! - Flapping is detected and cleared through the event bus

use chrono::Duration;
use pretty_assertions::assert_eq;
use siem_monitoring::{
    actors::messages::MonitorEventKind,
    engine::EventInput,
    monitors::{MonitoredEntity, host::HostStatus},
    storage::{EventQuery, schema::*},
};

use crate::helpers::*;

#[tokio::test]
async fn test_exceptions_escalate_after_max_checks() {
    let env = env();
    let mut rx = env.engine.subscribe();
    let (host, service) = monitored_host(&env.engine, "web-01", template("ping", 3)).await;

    report(&env.engine, service.id, Significance::Exception).await;
    let state = crate::helpers::service(&env.engine, service.id).await;
    assert_eq!(state.status, ServiceStatus::Warning);
    assert!(!state.is_hard_status);

    report(&env.engine, service.id, Significance::Exception).await;
    let state = crate::helpers::service(&env.engine, service.id).await;
    assert_eq!(state.status, ServiceStatus::Warning);
    assert_eq!(state.current_check, 1);

    report(&env.engine, service.id, Significance::Exception).await;
    let state = crate::helpers::service(&env.engine, service.id).await;
    assert_eq!(state.status, ServiceStatus::Critical);
    assert!(state.is_hard_status);

    let events = drain(&mut rx);
    assert_eq!(kinds(&events), vec![MonitorEventKind::HostDown, MonitorEventKind::HostDown]);
    assert_eq!(events[0].status, Some(ServiceStatus::Warning));
    assert!(!events[0].is_hard);
    assert_eq!(events[1].status, Some(ServiceStatus::Critical));
    assert!(events[1].is_hard);
    assert_eq!(events[1].target, ItemRef::host(host.id));
    assert_eq!(events[1].display_name, "web-01");

    let view = env.engine.host_view(host.id).await.unwrap().unwrap();
    assert_eq!(view.host_status(), HostStatus::Down);
    assert!(view.is_alert_state());
}

#[tokio::test]
async fn test_information_recovers_host() {
    let env = env();
    let (host, service) = monitored_host(&env.engine, "web-01", template("ping", 1)).await;

    report(&env.engine, service.id, Significance::Exception).await;
    let mut rx = env.engine.subscribe();

    env.clock.advance(Duration::minutes(3));
    let event = report(&env.engine, service.id, Significance::Information)
        .await
        .expect("event should be stored");

    let state = crate::helpers::service(&env.engine, service.id).await;
    assert_eq!(state.status, ServiceStatus::Ok);
    assert_eq!(state.current_check, 0);
    assert_eq!(state.status_since, Some(env.clock_now()));

    let events = drain(&mut rx);
    assert_eq!(kinds(&events), vec![MonitorEventKind::HostUp]);
    assert_eq!(events[0].event_id, Some(event.id));
    assert_eq!(events[0].detail.as_deref(), Some("check_ok"));

    let view = env.engine.host_view(host.id).await.unwrap().unwrap();
    assert_eq!(view.host_status(), HostStatus::Up);
}

#[tokio::test]
async fn test_non_availability_service_publishes_service_events() {
    let env = env();
    let (host, _) = monitored_host(&env.engine, "web-01", template("ping", 1)).await;
    let disk = extra_service(&env.engine, &host, template("disk", 1), "disk").await;
    let mut rx = env.engine.subscribe();

    report(&env.engine, disk.id, Significance::Exception).await;
    report(&env.engine, disk.id, Significance::Information).await;

    let events = drain(&mut rx);
    assert_eq!(
        kinds(&events),
        vec![MonitorEventKind::ServiceProblem, MonitorEventKind::ServiceRecovery]
    );
    assert_eq!(events[0].target, ItemRef::service(disk.id));

    let view = env.engine.host_view(host.id).await.unwrap().unwrap();
    assert_eq!(view.host_status(), HostStatus::Up);
}

#[tokio::test]
async fn test_warning_significance_never_transitions() {
    let env = env();
    let mut rx = env.engine.subscribe();
    let (_, service) = monitored_host(&env.engine, "web-01", template("ping", 1)).await;

    report(&env.engine, service.id, Significance::Warning).await;

    let state = crate::helpers::service(&env.engine, service.id).await;
    assert_eq!(state.status, ServiceStatus::Ok);
    assert_eq!(state.last_check, Some(env.clock_now()));
    assert_eq!(*state.flap_state_cache.entries().last().unwrap(), 1);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_stateless_service_only_records_check_time() {
    let env = env();
    let mut stateless = template("syslog", 1);
    stateless.is_stateless = true;
    let (_, service) = monitored_host(&env.engine, "web-01", stateless).await;

    report(&env.engine, service.id, Significance::Exception).await;

    let state = crate::helpers::service(&env.engine, service.id).await;
    assert_eq!(state.status, ServiceStatus::Ok);
    assert_eq!(state.last_check, Some(env.clock_now()));
    assert!(state.flap_state_cache.entries().iter().all(|code| *code == 0));
}

#[tokio::test]
async fn test_sensor_fault_counts_as_exception() {
    let env = env();
    let (_, service) = monitored_host(&env.engine, "web-01", template("ping", 1)).await;

    let event = env
        .engine
        .add_event(EventInput::sensor_fault(service.id, Some("siem".to_string())))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(event.name, "sensor_fault");
    assert_eq!(event.significance, Significance::Exception);
    let state = crate::helpers::service(&env.engine, service.id).await;
    assert_eq!(state.status, ServiceStatus::Critical);
}

#[tokio::test]
async fn test_events_without_known_service() {
    let env = env();

    let orphan = EventInput {
        name: "orphan".to_string(),
        ..Default::default()
    };
    assert!(env.engine.add_event(orphan).await.unwrap().is_none());

    assert!(report(&env.engine, 999, Significance::Exception).await.is_none());
    assert!(report(&env.engine, -7, Significance::Exception).await.is_none());
    let stored = env
        .engine
        .store()
        .list_events(&EventQuery::for_services(vec![999, -7]))
        .await
        .unwrap();
    assert!(stored.is_empty());

    let internal = report(&env.engine, INTERNAL_SERVICE, Significance::Information).await;
    assert_eq!(internal.unwrap().service_id, INTERNAL_SERVICE);
}

#[tokio::test]
async fn test_removed_host_takes_its_records_along() {
    assert_host_removal_cleans_up(&env()).await;
}

#[tokio::test]
async fn test_suppressed_information_still_recovers() {
    let env = env();
    let template = env.engine.add_template(template("ping", 1)).await.unwrap();
    let mut service = Service::new(HOSTLESS, template.id, "heartbeat");
    service.status = ServiceStatus::Ok;
    service.suppress_informational = true;
    let service = env.engine.add_service(service).await.unwrap();

    assert!(report(&env.engine, service.id, Significance::Exception).await.is_some());
    assert!(report(&env.engine, service.id, Significance::Information).await.is_none());

    let state = crate::helpers::service(&env.engine, service.id).await;
    assert_eq!(state.status, ServiceStatus::Ok);

    let stored = env.engine.events_for_service(service.id, 0, None).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].significance, Significance::Exception);
}

#[tokio::test]
async fn test_downtime_suppresses_problems() {
    let env = env();
    let (host, service) = monitored_host(&env.engine, "web-01", template("ping", 1)).await;
    let now = env.clock_now();
    env.engine
        .schedule_downtime(downtime(ItemRef::host(host.id), now, false))
        .await
        .unwrap();
    let mut rx = env.engine.subscribe();

    report(&env.engine, service.id, Significance::Exception).await;

    let state = crate::helpers::service(&env.engine, service.id).await;
    assert_eq!(state.status, ServiceStatus::Ok);
    assert!(drain(&mut rx).is_empty());
    assert!(env.engine.is_scheduled_down(ItemRef::service(service.id)).await.unwrap());

    // Once the window is over the same event is a problem again
    env.clock.advance(Duration::hours(2));
    report(&env.engine, service.id, Significance::Exception).await;
    let state = crate::helpers::service(&env.engine, service.id).await;
    assert_eq!(state.status, ServiceStatus::Critical);
}

#[tokio::test]
async fn test_recovery_ends_flexible_downtimes() {
    let env = env();
    let (_, service) = monitored_host(&env.engine, "web-01", template("ping", 1)).await;
    report(&env.engine, service.id, Significance::Exception).await;

    let now = env.clock_now();
    let target = ItemRef::service(service.id);
    let flexible = env
        .engine
        .schedule_downtime(downtime(target, now, false))
        .await
        .unwrap();
    let fixed = env
        .engine
        .schedule_downtime(downtime(target, now, true))
        .await
        .unwrap();
    let mut rx = env.engine.subscribe();

    env.clock.advance(Duration::minutes(10));
    report(&env.engine, service.id, Significance::Information).await;

    let downtimes = env.engine.downtimes_for(target).await.unwrap();
    let flexible = downtimes.iter().find(|d| d.id == flexible.id).unwrap();
    let fixed = downtimes.iter().find(|d| d.id == fixed.id).unwrap();
    assert!(flexible.is_cancelled);
    assert_eq!(flexible.end, env.clock_now());
    assert!(!fixed.is_cancelled);

    let kinds = kinds(&drain(&mut rx));
    assert!(kinds.contains(&MonitorEventKind::DowntimeCancelled));
    assert!(kinds.contains(&MonitorEventKind::HostUp));
}

#[tokio::test]
async fn test_flapping_starts_and_stops() {
    let env = env();
    let mut flappy = template("ping", 1);
    flappy.use_flap_detection = true;
    let (_, service) = monitored_host(&env.engine, "web-01", flappy).await;
    let mut rx = env.engine.subscribe();

    for i in 0..8 {
        let significance = if i % 2 == 0 {
            Significance::Exception
        } else {
            Significance::Information
        };
        report(&env.engine, service.id, significance).await;
    }

    let state = crate::helpers::service(&env.engine, service.id).await;
    assert!(state.is_flapping);
    assert!(state.flap_state_cache.instability_percent() > 30);
    let started = kinds(&drain(&mut rx));
    assert_eq!(
        started.iter().filter(|k| **k == MonitorEventKind::StartFlapping).count(),
        1
    );

    for _ in 0..20 {
        report(&env.engine, service.id, Significance::Information).await;
    }

    let state = crate::helpers::service(&env.engine, service.id).await;
    assert!(!state.is_flapping);
    assert_eq!(state.flap_state_cache.instability_percent(), 0);
    assert!(kinds(&drain(&mut rx)).contains(&MonitorEventKind::StopFlapping));
}

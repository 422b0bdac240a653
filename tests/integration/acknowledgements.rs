//! Integration tests for acknowledgements and the status summary

use chrono::Duration;
use pretty_assertions::assert_eq;
use siem_monitoring::{
    actors::messages::MonitorEventKind,
    engine::AcknowledgeRequest,
    storage::schema::*,
};

use crate::helpers::*;

#[tokio::test]
async fn test_only_alerting_items_can_be_acknowledged() {
    let env = env();
    let (host, service) = monitored_host(&env.engine, "web-01", template("ping", 1)).await;
    let target = ItemRef::host(host.id);

    assert!(!env.engine.acknowledge(AcknowledgeRequest::new(target, "alice")).await.unwrap());

    report(&env.engine, service.id, Significance::Exception).await;
    let mut rx = env.engine.subscribe();

    let request = AcknowledgeRequest::new(target, "alice").with_comment("looking into it");
    assert!(env.engine.acknowledge(request.clone()).await.unwrap());
    assert!(!env.engine.acknowledge(request).await.unwrap(), "duplicate ack");

    let events = drain(&mut rx);
    assert_eq!(kinds(&events), vec![MonitorEventKind::Acknowledged]);
    assert_eq!(events[0].detail.as_deref(), Some("looking into it"));

    // A host acknowledgement covers its services
    assert!(env.engine.is_acknowledged(ItemRef::service(service.id)).await.unwrap());
    let acked = env.engine.actively_acknowledged().await.unwrap();
    assert!(acked.contains(target));
    assert!(acked.contains(ItemRef::service(service.id)));
}

#[tokio::test]
async fn test_scheduled_down_items_are_not_acknowledged() {
    let env = env();
    let (host, service) = monitored_host(&env.engine, "web-01", template("ping", 1)).await;
    report(&env.engine, service.id, Significance::Exception).await;
    env.engine
        .schedule_downtime(downtime(ItemRef::host(host.id), env.clock_now(), true))
        .await
        .unwrap();

    let request = AcknowledgeRequest::new(ItemRef::service(service.id), "alice");
    assert!(!env.engine.acknowledge(request).await.unwrap());
    assert!(env.engine.acknowledgements().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_recovery_releases_acknowledgements() {
    let env = env();
    let (host, service) = monitored_host(&env.engine, "web-01", template("ping", 1)).await;
    report(&env.engine, service.id, Significance::Exception).await;

    env.engine
        .acknowledge(AcknowledgeRequest::new(ItemRef::host(host.id), "alice"))
        .await
        .unwrap();
    env.engine
        .acknowledge(AcknowledgeRequest::new(ItemRef::service(service.id), "bob"))
        .await
        .unwrap();
    assert_eq!(env.engine.acknowledgements().await.unwrap().len(), 2);

    report(&env.engine, service.id, Significance::Information).await;

    assert!(env.engine.acknowledgements().await.unwrap().is_empty());
    assert!(!env.engine.is_acknowledged(ItemRef::host(host.id)).await.unwrap());
}

#[tokio::test]
async fn test_non_sticky_acknowledgement_ends_on_status_change() {
    let env = env();
    let (host, _) = monitored_host(&env.engine, "web-01", template("ping", 1)).await;
    let disk = extra_service(&env.engine, &host, template("disk", 3), "disk").await;
    let target = ItemRef::service(disk.id);

    // WARNING soft
    report(&env.engine, disk.id, Significance::Exception).await;
    env.engine
        .acknowledge(AcknowledgeRequest::new(target, "alice").non_sticky())
        .await
        .unwrap();

    // Still WARNING, nothing changes
    report(&env.engine, disk.id, Significance::Exception).await;
    assert!(env.engine.is_acknowledged(target).await.unwrap());

    // Promoted to CRITICAL
    report(&env.engine, disk.id, Significance::Exception).await;
    assert!(!env.engine.is_acknowledged(target).await.unwrap());
}

#[tokio::test]
async fn test_sticky_acknowledgement_survives_escalation() {
    let env = env();
    let (host, _) = monitored_host(&env.engine, "web-01", template("ping", 1)).await;
    let disk = extra_service(&env.engine, &host, template("disk", 2), "disk").await;
    let target = ItemRef::service(disk.id);

    report(&env.engine, disk.id, Significance::Exception).await;
    env.engine
        .acknowledge(AcknowledgeRequest::new(target, "alice"))
        .await
        .unwrap();
    report(&env.engine, disk.id, Significance::Exception).await;

    assert_eq!(service(&env.engine, disk.id).await.status, ServiceStatus::Critical);
    assert!(env.engine.is_acknowledged(target).await.unwrap());
}

#[tokio::test]
async fn test_acknowledgements_expire() {
    let env = env();
    let (_, service) = monitored_host(&env.engine, "web-01", template("ping", 1)).await;
    report(&env.engine, service.id, Significance::Exception).await;
    let target = ItemRef::service(service.id);

    let expires_at = env.clock_now() + Duration::minutes(30);
    env.engine
        .acknowledge(AcknowledgeRequest::new(target, "alice").expires_at(expires_at))
        .await
        .unwrap();
    assert!(env.engine.is_acknowledged(target).await.unwrap());

    env.clock.advance(Duration::minutes(30));
    assert!(!env.engine.is_acknowledged(target).await.unwrap());
    assert!(env.engine.acknowledgements().await.unwrap().is_empty());

    // A fresh acknowledgement is accepted once the old one expired
    assert!(env.engine.acknowledge(AcknowledgeRequest::new(target, "bob")).await.unwrap());
}

#[tokio::test]
async fn test_cancel_downtime() {
    let env = env();
    let (host, _) = monitored_host(&env.engine, "web-01", template("ping", 1)).await;
    let target = ItemRef::host(host.id);
    let scheduled = env
        .engine
        .schedule_downtime(downtime(target, env.clock_now(), true))
        .await
        .unwrap();
    assert!(env.engine.is_scheduled_down(target).await.unwrap());

    let mut rx = env.engine.subscribe();
    assert!(env.engine.cancel_downtime(scheduled.id).await.unwrap());
    assert!(!env.engine.cancel_downtime(scheduled.id).await.unwrap());

    assert!(!env.engine.is_scheduled_down(target).await.unwrap());
    assert_eq!(kinds(&drain(&mut rx)), vec![MonitorEventKind::DowntimeCancelled]);
}

#[tokio::test]
async fn test_downtime_must_not_end_before_it_begins() {
    let env = env();
    let (host, _) = monitored_host(&env.engine, "web-01", template("ping", 1)).await;
    let mut window = downtime(ItemRef::host(host.id), env.clock_now(), false);
    std::mem::swap(&mut window.begin, &mut window.end);

    assert!(env.engine.schedule_downtime(window).await.is_err());
    assert!(env.engine.schedule_downtime(downtime(ItemRef::host(404), env.clock_now(), false)).await.is_err());
}

#[tokio::test]
async fn test_summary_buckets_each_item_once() {
    let env = env();
    let (up, _) = monitored_host(&env.engine, "web-01", template("ping", 1)).await;
    let (_, down_service) = monitored_host(&env.engine, "db-01", template("ping", 1)).await;
    let (acked, acked_service) = monitored_host(&env.engine, "mail-01", template("ping", 1)).await;
    let (maintained, _) = monitored_host(&env.engine, "backup-01", template("ping", 1)).await;
    extra_service(&env.engine, &up, template("disk", 3), "disk").await;

    report(&env.engine, down_service.id, Significance::Exception).await;
    report(&env.engine, acked_service.id, Significance::Exception).await;
    env.engine
        .acknowledge(AcknowledgeRequest::new(ItemRef::host(acked.id), "alice"))
        .await
        .unwrap();
    env.engine
        .schedule_downtime(downtime(ItemRef::host(maintained.id), env.clock_now(), true))
        .await
        .unwrap();

    let summary = env.engine.status_summary().await.unwrap();

    assert_eq!(summary.hosts.up, 1);
    assert_eq!(summary.hosts.down, 1);
    assert_eq!(summary.hosts.acknowledged, 1);
    assert_eq!(summary.hosts.scheduled_down, 1);
    assert_eq!(summary.hosts.unknown, 0);

    assert_eq!(summary.services.ok, 2);
    assert_eq!(summary.services.critical, 1);
    assert_eq!(summary.services.acknowledged, 1);
    assert_eq!(summary.services.scheduled_down, 1);
    assert_eq!(summary.active_alerts, 2);
}

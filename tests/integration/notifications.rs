//! Integration tests for the notification pipeline
//!
//! Engine transitions travel over the event bus to the notification actor
//! and out to webhook and Discord sinks.

use std::time::Duration;

use serde_json::json;
use siem_monitoring::{
    actors::NotifierHandle,
    alerts::{AlertManager, WebhookSink},
    config::{Discord, Webhook},
    discord::DiscordSink,
    storage::schema::*,
};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

#[tokio::test]
async fn test_host_down_reaches_webhook() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_partial_json(json!({
            "kind": "host_down",
            "name": "web-01",
            "status": "critical",
            "is_hard": true
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_partial_json(json!({ "kind": "host_up" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let env = env();
    let alerts = AlertManager::new().with_sink(WebhookSink::new(Webhook {
        url: format!("{}/hook", server.uri()),
    }));
    let notifier = NotifierHandle::spawn(alerts, env.engine.subscribe());
    let (_, service) = monitored_host(&env.engine, "web-01", template("ping", 1)).await;

    report(&env.engine, service.id, Significance::Exception).await;
    report(&env.engine, service.id, Significance::Information).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    let stats = notifier.get_stats().await.unwrap();
    assert_eq!(stats.delivered, 2);

    notifier.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_discord_problem_pings_user() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/discord"))
        .and(body_partial_json(json!({
            "content": "🔴 `db-01` <@1234>"
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let env = env();
    let alerts = AlertManager::new().with_sink(DiscordSink::new(Discord {
        url: format!("{}/discord", server.uri()),
        user_id: Some("1234".to_string()),
    }));
    let notifier = NotifierHandle::spawn(alerts, env.engine.subscribe());
    let (_, service) = monitored_host(&env.engine, "db-01", template("ping", 1)).await;

    report(&env.engine, service.id, Significance::Exception).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    notifier.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_muted_notifier_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let env = env();
    let alerts = AlertManager::new().with_sink(WebhookSink::new(Webhook {
        url: format!("{}/hook", server.uri()),
    }));
    let notifier = NotifierHandle::spawn(alerts, env.engine.subscribe());
    notifier.mute(60).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let (_, service) = monitored_host(&env.engine, "web-01", template("ping", 1)).await;
    report(&env.engine, service.id, Significance::Exception).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    let stats = notifier.get_stats().await.unwrap();
    assert_eq!(stats.muted, 1);
    assert_eq!(stats.delivered, 0);

    notifier.shutdown().await.unwrap();
}

//! Integration tests for API endpoints
//!
//! These tests verify that:
//! - All REST endpoints return correct responses
//! - Authentication middleware functions properly
//! - Error handling is correct

use std::net::SocketAddr;

use chrono::Duration;
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::{Value, json};
use siem_monitoring::{
    api::{ApiState, spawn_api_server},
    config::ApiConfig,
    storage::schema::*,
};

use crate::helpers::*;

const TOKEN: &str = "test-token";

async fn spawn_test_api(env: &TestEnv) -> SocketAddr {
    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(), // Random port
        auth_token: Some(TOKEN.to_string()),
        enable_cors: true,
    };

    spawn_api_server(config, ApiState::new(env.engine.clone()))
        .await
        .unwrap()
}

struct Client {
    http: reqwest::Client,
    base: String,
}

impl Client {
    fn new(addr: SocketAddr) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: format!("http://{addr}/api/v1"),
        }
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.http
            .get(format!("{}{path}", self.base))
            .bearer_auth(TOKEN)
            .send()
            .await
            .unwrap()
    }

    async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.http
            .post(format!("{}{path}", self.base))
            .bearer_auth(TOKEN)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn put(&self, path: &str, body: Value) -> reqwest::Response {
        self.http
            .put(format!("{}{path}", self.base))
            .bearer_auth(TOKEN)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn delete(&self, path: &str) -> reqwest::Response {
        self.http
            .delete(format!("{}{path}", self.base))
            .bearer_auth(TOKEN)
            .send()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_health_is_public() {
    let env = env();
    let addr = spawn_test_api(&env).await;

    let response = reqwest::get(format!("http://{addr}/api/v1/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].as_str().is_some());
}

#[tokio::test]
async fn test_authentication() {
    let env = env();
    let addr = spawn_test_api(&env).await;
    let url = format!("http://{addr}/api/v1/summary");
    let http = reqwest::Client::new();

    let response = http.get(&url).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = http
        .get(&url)
        .header("Authorization", TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = http.get(&url).bearer_auth("wrong").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Invalid token");

    let response = http.get(&url).bearer_auth(TOKEN).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_hosts_and_services() {
    let env = env();
    let (host, service) = monitored_host(&env.engine, "web-01", template("ping", 1)).await;
    report(&env.engine, service.id, Significance::Exception).await;
    let client = Client::new(spawn_test_api(&env).await);

    let body: Value = client.get("/hosts").await.json().await.unwrap();
    assert_eq!(body["hosts"].as_array().unwrap().len(), 1);
    assert_eq!(body["hosts"][0]["name"], "web-01");
    assert_eq!(body["hosts"][0]["status"], "down");
    assert_eq!(body["hosts"][0]["availability_service"], service.id);

    let body: Value = client.get(&format!("/hosts/{}", host.id)).await.json().await.unwrap();
    assert_eq!(body["service_counts"]["critical"], 1);
    assert_eq!(body["acknowledged"], false);
    assert_eq!(body["services"][0]["status"], "critical");

    let response = client.get("/hosts/404").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "host 404 not found");

    let body: Value = client
        .get(&format!("/services?host_id={}", host.id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["services"].as_array().unwrap().len(), 1);

    let body: Value = client
        .get(&format!("/services/{}", service.id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["is_hard_status"], true);

    let body: Value = client
        .get(&format!("/hosts/{}/events", host.id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["events"][0]["name"], "check_failed");
}

#[tokio::test]
async fn test_passive_event_ingestion() {
    let env = env();
    let (_, service) = monitored_host(&env.engine, "web-01", template("ping", 1)).await;
    let client = Client::new(spawn_test_api(&env).await);

    let response = client
        .post(
            "/events",
            json!({
                "service_id": service.id,
                "name": "disk_full",
                "significance": 2,
                "content": { "mount": "/var", "used_percent": 99 },
                "correlation_id": "disk-var"
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["stored"], true);
    assert_eq!(body["event"]["significance"], "exception");
    let event_id = body["event"]["id"].as_i64().unwrap();

    assert_eq!(
        crate::helpers::service(&env.engine, service.id).await.status,
        ServiceStatus::Critical
    );

    let response = client.post("/events", json!({ "name": "orphan" })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: Value = client
        .get(&format!("/events/{event_id}/correlated"))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["events"].as_array().unwrap().len(), 1);

    let body: Value = client.get("/alerts").await.json().await.unwrap();
    assert_eq!(body["events"][0]["id"], event_id);

    let body: Value = client
        .get(&format!("/services/{}/events?limit=1", service.id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["events"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_acknowledgement_lifecycle() {
    let env = env();
    let (host, service) = monitored_host(&env.engine, "web-01", template("ping", 1)).await;
    let client = Client::new(spawn_test_api(&env).await);
    let ack = json!({
        "target": { "kind": "host", "id": host.id },
        "user": "alice",
        "comment": "on it"
    });

    // Not alerting yet
    let body: Value = client.post("/acknowledgements", ack.clone()).await.json().await.unwrap();
    assert_eq!(body["accepted"], false);

    report(&env.engine, service.id, Significance::Exception).await;
    let body: Value = client.post("/acknowledgements", ack).await.json().await.unwrap();
    assert_eq!(body["accepted"], true);

    let body: Value = client.get("/acknowledgements").await.json().await.unwrap();
    let acks = body.as_array().unwrap();
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0]["user"], "alice");
    let ack_id = acks[0]["id"].as_i64().unwrap();

    let body: Value = client.get("/summary").await.json().await.unwrap();
    assert_eq!(body["hosts"]["acknowledged"], 1);
    assert_eq!(body["active_alerts"], 1);

    let response = client.delete(&format!("/acknowledgements/{ack_id}")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = client.delete(&format!("/acknowledgements/{ack_id}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = client
        .post(
            "/acknowledgements",
            json!({ "target": { "kind": "host", "id": host.id }, "user": " " }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_downtime_lifecycle() {
    let env = env();
    let (host, _) = monitored_host(&env.engine, "web-01", template("ping", 1)).await;
    let client = Client::new(spawn_test_api(&env).await);
    let now = env.clock_now();

    let response = client
        .post(
            "/downtimes",
            json!({
                "target": { "kind": "host", "id": host.id },
                "name": "patching",
                "begin": now - Duration::minutes(5),
                "end": now + Duration::hours(1)
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Value = response.json().await.unwrap();
    let downtime_id = created["id"].as_i64().unwrap();

    let body: Value = client
        .get(&format!("/downtimes?kind=host&id={}", host.id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body.as_array().unwrap().len(), 1);

    let body: Value = client.get(&format!("/hosts/{}", host.id)).await.json().await.unwrap();
    assert_eq!(body["scheduled_down"], true);

    let body: Value = client
        .delete(&format!("/downtimes/{downtime_id}"))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["accepted"], true);

    let response = client
        .post(
            "/downtimes",
            json!({
                "target": { "kind": "host", "id": host.id },
                "name": "backwards",
                "begin": now,
                "end": now - Duration::hours(1)
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client.delete("/downtimes/404").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_service_control() {
    let env = env();
    let (_, service) = monitored_host(&env.engine, "web-01", template("ping", 1)).await;
    let client = Client::new(spawn_test_api(&env).await);

    env.sensor.set(service.id, Significance::Information);
    let body: Value = client
        .post(&format!("/services/{}/check", service.id), json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["reported"], true);

    let response = client
        .put(&format!("/services/{}/active", service.id), json!({ "active": false }))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(!crate::helpers::service(&env.engine, service.id).await.is_active);

    let response = client
        .post(&format!("/services/{}/check", service.id), json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client.post("/services/404/check", json!({})).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Without a scheduler there is no cycle to trigger
    let response = client.post("/cycle", json!({})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: Value = client.get(&format!("/sensors/{PROVIDER}")).await.json().await.unwrap();
    assert_eq!(body[SENSOR]["display_name"], "Scripted");
    assert_eq!(body[SENSOR]["check_mode"], "active");
}

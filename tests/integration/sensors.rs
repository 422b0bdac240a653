//! Integration tests for the built-in sensors driven through poll cycles
//!
//! The HTTP sensor runs against a wiremock server, the ping sensor against a
//! stand-in executable printing canned `ping` output.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use siem_monitoring::{
    actors::messages::MonitorEventKind,
    monitors::MonitoredEntity,
    sensors::{HttpSensor, PingSensor},
    storage::{MemoryStore, schema::*},
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

fn http_template(name: &str, url: String) -> ServiceTemplate {
    let mut template = template(name, 1).with_sensor(PROVIDER, "http_ok");
    template.sensor_params = Some(json!({ "url": url }));
    template
}

async fn last_event(env: &TestEnv, service_id: ServiceId) -> (Event, Value) {
    let events = env.engine.events_for_service(service_id, 0, Some(1)).await.unwrap();
    let event = events.into_iter().next().expect("no event stored");
    let content = serde_json::from_str(&event.content).unwrap();
    (event, content)
}

#[tokio::test]
async fn test_http_status_codes_map_to_significance() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_string("up"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/maintenance"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let env = env_with_sensors(Arc::new(MemoryStore::new()), StdDuration::from_secs(5), |sensors| {
        sensors.register(PROVIDER, "http_ok", HttpSensor::new())
    });
    let (_, healthy) = monitored_host(
        &env.engine,
        "web-01",
        http_template("health", format!("{}/health", server.uri())),
    )
    .await;
    let (_, degraded) = monitored_host(
        &env.engine,
        "web-02",
        http_template("maintenance", format!("{}/maintenance", server.uri())),
    )
    .await;
    let (_, unreachable) = monitored_host(
        &env.engine,
        "web-03",
        http_template("refused", "http://127.0.0.1:1/".to_string()),
    )
    .await;

    let report = env.engine.run_cycle().await.unwrap();
    assert_eq!(report.reported, 3);

    let (event, content) = last_event(&env, healthy.id).await;
    assert_eq!(event.name, "sensor_http_ok_ok");
    assert_eq!(event.significance, Significance::Information);
    assert_eq!(content["response_size"], 2);
    assert_eq!(service(&env.engine, healthy.id).await.status, ServiceStatus::Ok);

    // A non-200 answer is a warning and does not change the status
    let (event, content) = last_event(&env, degraded.id).await;
    assert_eq!(event.name, "sensor_http_ok_error");
    assert_eq!(event.significance, Significance::Warning);
    assert_eq!(content["http_code"], 503);
    assert_eq!(service(&env.engine, degraded.id).await.status, ServiceStatus::Ok);

    let (event, content) = last_event(&env, unreachable.id).await;
    assert_eq!(event.name, "sensor_http_ok_error");
    assert_eq!(event.significance, Significance::Exception);
    assert_eq!(content["errorno"], 7);
    assert_eq!(service(&env.engine, unreachable.id).await.status, ServiceStatus::Critical);
}

#[tokio::test]
async fn test_http_timeout_is_an_exception() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(StdDuration::from_secs(2)))
        .mount(&server)
        .await;

    let env = env_with_sensors(Arc::new(MemoryStore::new()), StdDuration::from_millis(200), |sensors| {
        sensors.register(PROVIDER, "http_ok", HttpSensor::new())
    });
    let (_, slow) = monitored_host(&env.engine, "web-01", http_template("slow", server.uri())).await;

    env.engine.run_cycle().await.unwrap();

    let (event, content) = last_event(&env, slow.id).await;
    assert_eq!(event.significance, Significance::Exception);
    assert_eq!(content["errorno"], 28);
}

#[cfg(unix)]
mod ping {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    const REPLY_OK: &str = "\
--- web-01 ping statistics ---
1 packets transmitted, 1 received, 0% packet loss, time 0ms
rtt min/avg/max/mdev = 0.040/0.040/0.040/0.000 ms
";

    const REPLY_LOST: &str = "\
--- web-01 ping statistics ---
1 packets transmitted, 0 received, 100% packet loss, time 0ms
";

    /// Executable answering with whatever `reply` and `code` hold in `dir`
    fn fake_ping(dir: &Path) -> PathBuf {
        let program = dir.join("ping");
        let script = format!(
            "#!/bin/sh\ncat \"{dir}/reply\"\nexit \"$(cat \"{dir}/code\")\"\n",
            dir = dir.display()
        );
        std::fs::write(&program, script).unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();
        program
    }

    fn answer(dir: &Path, lost: bool) {
        let (reply, code) = if lost { (REPLY_LOST, "1") } else { (REPLY_OK, "0") };
        std::fs::write(dir.join("reply"), reply).unwrap();
        std::fs::write(dir.join("code"), code).unwrap();
    }

    #[tokio::test]
    async fn test_alternating_ping_loss_starts_flapping() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_ping(dir.path());
        answer(dir.path(), false);

        let env = env_with_sensors(Arc::new(MemoryStore::new()), StdDuration::from_secs(5), |sensors| {
            sensors.register(
                PROVIDER,
                "ping",
                PingSensor::new(1).with_program(program.display().to_string()),
            )
        });
        let mut ping = template("ping", 1).with_sensor(PROVIDER, "ping");
        ping.use_flap_detection = true;
        let (_, service_a) = monitored_host(&env.engine, "web-01", ping).await;
        let mut events = env.engine.subscribe();

        for _ in 0..20 {
            let report = env.engine.run_cycle().await.unwrap();
            assert_eq!(report.reported, 1);
            env.clock.advance(Duration::minutes(5));
        }

        let state = service(&env.engine, service_a.id).await;
        assert_eq!(state.status, ServiceStatus::Ok);
        assert!(!state.is_flapping());
        let (event, _) = last_event(&env, service_a.id).await;
        assert_eq!(event.name, "sensor_ping_ok");

        for round in 0..20 {
            answer(dir.path(), round % 2 == 0);
            let report = env.engine.run_cycle().await.unwrap();
            assert_eq!(report.reported, 1);
            env.clock.advance(Duration::minutes(5));
        }

        let state = service(&env.engine, service_a.id).await;
        assert!(state.is_flapping());
        assert!(kinds(&drain(&mut events)).contains(&MonitorEventKind::StartFlapping));
    }
}

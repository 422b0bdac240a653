//! HTTP availability sensor
//!
//! Issues a GET against the host (or the template's `url` parameter) and
//! reports the status code, transfer time and body size.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::json;
use tracing::{debug, instrument};

use super::{PollResult, Sensor, SensorContext, SensorDefinition};
use crate::storage::schema::{CheckMode, ServiceId, Significance};

// curl error numbers, kept so events stay comparable with older data
const ERR_COULDNT_CONNECT: i64 = 7;
const ERR_OPERATION_TIMEDOUT: i64 = 28;
const ERR_RECV_ERROR: i64 = 56;

#[derive(Debug, Clone, Default)]
pub struct HttpSensor {
    client: reqwest::Client,
}

impl HttpSensor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn probe(&self, url: &str, ctx: &SensorContext) -> PollResult {
        let start = Instant::now();
        let response = self.client.get(url).timeout(ctx.probe_timeout).send().await;

        let result = match response {
            Ok(response) => {
                let code = response.status().as_u16();
                response.bytes().await.map(|body| (code, body.len()))
            }
            Err(e) => Err(e),
        };

        http_event(result, start.elapsed().as_secs_f64(), ctx.now())
    }
}

/// Prefixes `http://` to bare host names
pub fn normalize_url(address: &str) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}

fn http_event(
    result: Result<(u16, usize), reqwest::Error>,
    response_time: f64,
    now: DateTime<Utc>,
) -> PollResult {
    match result {
        Ok((200, size)) => PollResult::new(
            "sensor_http_ok_ok",
            Significance::Information,
            now,
            json!({
                "response_time": response_time,
                "response_size": size,
            }),
        ),
        Ok((code, size)) => PollResult::new(
            "sensor_http_ok_error",
            Significance::Warning,
            now,
            json!({
                "http_code": code,
                "response_time": response_time,
                "response_size": size,
            }),
        ),
        Err(e) => {
            let errorno = if e.is_timeout() {
                ERR_OPERATION_TIMEDOUT
            } else if e.is_connect() {
                ERR_COULDNT_CONNECT
            } else {
                ERR_RECV_ERROR
            };
            PollResult::new(
                "sensor_http_ok_error",
                Significance::Exception,
                now,
                json!({
                    "errorno": errorno,
                    "error_msg": e.to_string(),
                }),
            )
        }
    }
}

#[async_trait]
impl Sensor for HttpSensor {
    fn definition(&self) -> SensorDefinition {
        SensorDefinition {
            display_name: "HTTP OK".to_string(),
            check_mode: CheckMode::Active,
        }
    }

    #[instrument(skip(self, ctx, service_ids), fields(services = service_ids.len()))]
    async fn poll(&self, ctx: &SensorContext, service_ids: &[ServiceId]) -> HashMap<ServiceId, PollResult> {
        let mut targets = Vec::with_capacity(service_ids.len());
        for &service_id in service_ids {
            let Some(target) = ctx.resolve(service_id).await else {
                continue;
            };
            let url = target
                .param_str("url")
                .map(str::to_string)
                .unwrap_or_else(|| normalize_url(&target.host_address));
            debug!("probing {url} for service {service_id}");
            targets.push((service_id, url));
        }

        join_all(targets.iter().map(|(service_id, url)| async move {
            (*service_id, self.probe(url, ctx).await)
        }))
        .await
        .into_iter()
        .collect()
    }
}

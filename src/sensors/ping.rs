//! Ping sensor using the system `ping` command
//!
//! Every service of a batch is pinged concurrently, each run bounded by the
//! context's probe timeout. The summary lines of the command output are
//! parsed into loss and round-trip statistics.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use super::{PollResult, Sensor, SensorContext, SensorDefinition, SensorError};
use crate::storage::schema::{CheckMode, ServiceId, Significance};

/// Packet loss and round-trip times of a ping run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PingStats {
    pub percent_loss: f64,
    pub min: f64,
    pub avg: f64,
    pub max: f64,
    pub mdev: f64,
}

/// Raw result of a finished ping process
#[derive(Debug, Clone, PartialEq)]
pub struct PingRun {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone)]
pub struct PingSensor {
    program: String,
    count: u32,
}

impl PingSensor {
    pub fn new(count: u32) -> Self {
        Self {
            program: "ping".to_string(),
            count: count.max(1),
        }
    }

    /// Uses another executable with `ping`-compatible arguments and output
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    async fn run(&self, address: &str, ctx: &SensorContext) -> Result<PingRun, SensorError> {
        let child = Command::new(&self.program)
            .args(["-c", &self.count.to_string(), address])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(ctx.probe_timeout, child)
            .await
            .map_err(|_| SensorError::Timeout(ctx.probe_timeout))?
            .map_err(|e| SensorError::Command(format!("failed to execute {}: {e}", self.program)))?;

        Ok(PingRun {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    /// Turns a finished run into an event, `None` when the output is unusable
    pub fn interpret(&self, run: &PingRun, now: DateTime<Utc>) -> Option<PollResult> {
        match run.exit_code {
            Some(0) => {}
            Some(1) => {
                return Some(PollResult::new(
                    "sensor_ping_notok",
                    Significance::Exception,
                    now,
                    json!({
                        "exit_code": 1,
                        "error_msg": format!("No response in {} tries", self.count),
                    }),
                ));
            }
            code => {
                return Some(PollResult::new(
                    "sensor_ping_notok",
                    Significance::Exception,
                    now,
                    json!({
                        "exit_code": code,
                        "error_msg": run.stderr.trim(),
                    }),
                ));
            }
        }

        let percent_loss = match parse_packet_loss(&run.stdout) {
            Ok(loss) => loss,
            Err(e) => {
                debug!("{e}");
                return None;
            }
        };

        // Total loss carries no round-trip summary
        if percent_loss >= 100.0 {
            return Some(PollResult::new(
                "sensor_ping_notok",
                Significance::Exception,
                now,
                json!({ "percent_loss": percent_loss }),
            ));
        }

        let stats = match parse_round_trip(&run.stdout, percent_loss) {
            Ok(stats) => stats,
            Err(e) => {
                debug!("{e}");
                return None;
            }
        };
        let content = serde_json::to_value(&stats).ok()?;

        if stats.percent_loss > 0.0 {
            Some(PollResult::new("sensor_ping_warn", Significance::Warning, now, content))
        } else {
            Some(PollResult::new("sensor_ping_ok", Significance::Information, now, content))
        }
    }
}

impl Default for PingSensor {
    fn default() -> Self {
        Self::new(5)
    }
}

/// Parses `received, X% packet loss`
pub fn parse_packet_loss(output: &str) -> Result<f64, SensorError> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = RE
        .get_or_init(|| Regex::new(r"received, +([0-9.]+)% packet loss").ok())
        .as_ref()
        .ok_or_else(|| SensorError::Malformed("invalid packet loss pattern".to_string()))?;

    re.captures(output)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .ok_or_else(|| SensorError::Malformed("no packet loss summary".to_string()))
}

/// Parses `rtt min/avg/max/mdev = a/b/c/d ms`
pub fn parse_round_trip(output: &str, percent_loss: f64) -> Result<PingStats, SensorError> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = RE
        .get_or_init(|| {
            Regex::new(r"rtt min/avg/max/mdev = ([0-9.]+)/([0-9.]+)/([0-9.]+)/([0-9.]+) ms").ok()
        })
        .as_ref()
        .ok_or_else(|| SensorError::Malformed("invalid round-trip pattern".to_string()))?;

    let caps = re
        .captures(output)
        .ok_or_else(|| SensorError::Malformed("no round-trip summary".to_string()))?;

    let value = |i: usize| -> Result<f64, SensorError> {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .ok_or_else(|| SensorError::Malformed(format!("bad round-trip field {i}")))
    };

    Ok(PingStats {
        percent_loss,
        min: value(1)?,
        avg: value(2)?,
        max: value(3)?,
        mdev: value(4)?,
    })
}

#[async_trait]
impl Sensor for PingSensor {
    fn definition(&self) -> SensorDefinition {
        SensorDefinition {
            display_name: "Ping".to_string(),
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

            let address = if target.param_bool("name_first", true) {
                Some(target.host_address.clone())
            } else {
                target.param_str("address").map(str::to_string)
            };

            match address {
                Some(address) => targets.push((service_id, address)),
                None => debug!("service {service_id} has no ping address"),
            }
        }

        let runs = join_all(targets.iter().map(|(service_id, address)| async move {
            (*service_id, address.as_str(), self.run(address, ctx).await)
        }))
        .await;

        let now = ctx.now();
        let mut results = HashMap::new();
        for (service_id, address, run) in runs {
            match run {
                Ok(run) => {
                    if let Some(result) = self.interpret(&run, now) {
                        results.insert(service_id, result);
                    }
                }
                Err(e) => warn!("ping of {address} for service {service_id} failed: {e}"),
            }
        }

        results
    }
}

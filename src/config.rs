use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, info, trace};

use crate::engine::{Engine, FilterRule, RetentionPolicy, RuleSet};
use crate::monitors::host::{HostKindRegistry, StaticAssets};
use crate::storage::schema::{Host, HostKind, Service, ServiceTemplate};

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./monitoring.db")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Storage configuration (optional - defaults to in-memory)
    pub storage: Option<StorageConfig>,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Sinks every state transition is forwarded to
    #[serde(default)]
    pub notifications: Vec<Alert>,

    pub tracking: Option<TrackingConfig>,

    /// HTTP API (only used with the `api` feature)
    pub api: Option<ApiConfig>,

    /// Applied in order before events are stored
    #[serde(default)]
    pub filters: Vec<FilterRule>,

    #[serde(default)]
    pub rules: RuleSet,

    /// Event retention, disabled when absent
    pub retention: Option<RetentionPolicy>,

    /// Templates seeded on start, matched by name
    #[serde(default)]
    pub templates: Vec<ServiceTemplate>,

    /// Hosts seeded on start, matched by kind and item id
    #[serde(default)]
    pub hosts: Vec<HostConfig>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_ping_count")]
    pub ping_count: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            probe_timeout_secs: default_probe_timeout(),
            ping_count: default_ping_count(),
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }
}

fn default_interval() -> u64 {
    60
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_ping_count() -> u32 {
    5
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alert {
    Discord(Discord),
    Webhook(Webhook),
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Webhook {
    pub url: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Discord {
    pub url: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct TrackingConfig {
    pub url: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Bearer token required on every route but the health check
    pub auth_token: Option<String>,
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            auth_token: None,
            enable_cors: default_enable_cors(),
        }
    }
}

fn default_enable_cors() -> bool {
    true
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct HostConfig {
    pub kind: HostKind,
    pub item_id: i64,
    pub name: String,
    /// Probe address, defaults to the name
    pub address: Option<String>,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
    /// Name of the service the host status is derived from
    pub availability: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    /// Template name
    pub template: String,
    #[serde(default)]
    pub suppress_informational: bool,
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    parse_config(&file_content)
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    serde_json::from_str(content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided! ({e})"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}

impl Config {
    /// Asset resolvers for the addresses given in the host list
    pub fn host_kinds(&self) -> HostKindRegistry {
        let mut by_kind: HashMap<HostKind, StaticAssets> = HashMap::new();
        for host in &self.hosts {
            if let Some(address) = &host.address {
                let assets = by_kind.remove(&host.kind).unwrap_or_default();
                by_kind.insert(host.kind, assets.with_address(host.item_id, address.clone()));
            }
        }

        let mut registry = HostKindRegistry::new();
        for (kind, assets) in by_kind {
            registry.register(kind, assets);
        }
        registry
    }

    /// Adds the configured templates, hosts and services that are missing
    pub async fn seed(&self, engine: &Engine) -> anyhow::Result<()> {
        let store = engine.store();

        let mut templates: HashMap<String, ServiceTemplate> = store
            .list_templates()
            .await?
            .into_iter()
            .map(|template| (template.name.clone(), template))
            .collect();
        for template in &self.templates {
            if templates.contains_key(&template.name) {
                continue;
            }
            let template = engine.add_template(template.clone()).await?;
            debug!("seeded template {}", template.name);
            templates.insert(template.name.clone(), template);
        }

        let existing_hosts = store.list_hosts().await?;
        for host_config in &self.hosts {
            let host = match existing_hosts
                .iter()
                .find(|h| h.kind == host_config.kind && h.item_id == host_config.item_id)
            {
                Some(host) => host.clone(),
                None => {
                    let host = Host::new(host_config.kind, host_config.item_id, &host_config.name);
                    let host = engine.add_host(host).await?;
                    info!("seeded host {}", host.name);
                    host
                }
            };

            let existing_services = store.list_services(Some(host.id)).await?;
            for service_config in &host_config.services {
                let service = match existing_services
                    .iter()
                    .find(|s| s.name == service_config.name)
                {
                    Some(service) => service.clone(),
                    None => {
                        let template = templates.get(&service_config.template).with_context(|| {
                            format!(
                                "service {} of host {} uses unknown template {}",
                                service_config.name, host.name, service_config.template
                            )
                        })?;
                        let mut service =
                            Service::new(host.id, template.id, service_config.name.clone());
                        service.suppress_informational = service_config.suppress_informational;
                        engine.add_service(service).await?
                    }
                };

                if host_config.availability.as_deref() == Some(service.name.as_str())
                    && host.availability_service_id() != Some(service.id)
                {
                    engine.set_availability_service(host.id, service.id).await?;
                }
            }
        }

        Ok(())
    }
}

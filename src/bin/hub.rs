use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use siem_monitoring::{
    actors::{NotifierHandle, SchedulerHandle},
    alerts::AlertManager,
    clock::SystemClock,
    config::{Config, read_config_file},
    engine::Engine,
    sensors::SensorRegistry,
    storage::{SharedStore, build_store},
    tracking::WebhookTracker,
};
use tracing::{error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("siem_monitoring", LevelFilter::DEBUG),
        ("hub", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

fn build_engine(config: &Config, store: SharedStore) -> Engine {
    let mut builder = Engine::builder(store, Arc::new(SystemClock))
        .sensors(SensorRegistry::with_builtin(config.scheduler.ping_count))
        .host_kinds(config.host_kinds())
        .rules(config.rules.clone())
        .probe_timeout(config.scheduler.probe_timeout());

    for filter in &config.filters {
        builder = builder.filter(filter.clone());
    }
    if let Some(tracking) = &config.tracking {
        builder = builder.tracking(Arc::new(WebhookTracker::new(tracking.url.clone())));
    }

    builder.build()
}

#[cfg(feature = "api")]
async fn start_api(
    config: &Config,
    engine: Arc<Engine>,
    scheduler: SchedulerHandle,
    notifier: NotifierHandle,
) -> anyhow::Result<()> {
    use siem_monitoring::api::{ApiState, spawn_api_server};

    let Some(api_config) = config.api.clone() else {
        return Ok(());
    };
    let state = ApiState::new(engine)
        .with_scheduler(scheduler)
        .with_notifier(notifier);
    let addr = spawn_api_server(api_config, state).await?;
    info!("API available at http://{addr}/api/v1");
    Ok(())
}

#[cfg(not(feature = "api"))]
async fn start_api(
    config: &Config,
    _engine: Arc<Engine>,
    _scheduler: SchedulerHandle,
    _notifier: NotifierHandle,
) -> anyhow::Result<()> {
    if config.api.is_some() {
        warn!("api section ignored, built without the api feature");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;

    let store = build_store(config.storage.as_ref())
        .await
        .context("failed to open record store")?;
    let engine = Arc::new(build_engine(&config, store));

    config.seed(&engine).await.context("failed to seed configuration")?;

    let alerts = AlertManager::from_config(&config.notifications);
    info!("notifying through {alerts:?}");
    let notifier = NotifierHandle::spawn(alerts, engine.subscribe());
    let scheduler = SchedulerHandle::spawn(
        engine.clone(),
        config.scheduler.interval(),
        config.retention,
    );

    start_api(&config, engine.clone(), scheduler.clone(), notifier.clone()).await?;

    info!("monitoring hub running, press ctrl-c to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for ctrl-c: {e}");
    }

    info!("shutting down");
    if let Err(e) = scheduler.shutdown().await {
        warn!("{e:#}");
    }
    if let Err(e) = notifier.shutdown().await {
        warn!("{e:#}");
    }
    if let Err(e) = engine.store().close().await {
        warn!("failed to close record store: {e}");
    }

    Ok(())
}

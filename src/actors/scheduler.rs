//! SchedulerActor - Drives the poll cycle
//!
//! The actor owns the cycle cadence. Cycles run inside the actor loop, so two
//! cycles never overlap; commands that arrive during a cycle wait for it.
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick ─► Engine::run_cycle ─► CycleReport (logged)
//!     ↑
//!     └─── Commands (RunCycleNow, CheckNow, UpdateInterval, Shutdown)
//!
//! Retention tick ─► Engine::archive_old_events
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument, warn};

use crate::engine::{CycleReport, Engine, RetentionPolicy};
use crate::storage::schema::ServiceId;

use super::messages::SchedulerCommand;

/// How often old events are archived
const RETENTION_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Actor that runs poll cycles at a fixed cadence
pub struct SchedulerActor {
    engine: Arc<Engine>,

    command_rx: mpsc::Receiver<SchedulerCommand>,

    interval_duration: Duration,

    retention: Option<RetentionPolicy>,
}

impl SchedulerActor {
    pub fn new(
        engine: Arc<Engine>,
        command_rx: mpsc::Receiver<SchedulerCommand>,
        interval_duration: Duration,
        retention: Option<RetentionPolicy>,
    ) -> Self {
        Self {
            engine,
            command_rx,
            interval_duration,
            retention,
        }
    }

    /// Run the actor's main loop
    ///
    /// Runs until a Shutdown command is received or every handle is dropped.
    #[instrument(skip(self), fields(interval = ?self.interval_duration))]
    pub async fn run(mut self) {
        debug!("starting scheduler actor");

        let mut ticker = interval(self.interval_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut retention_ticker = interval(RETENTION_PERIOD);
        retention_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        error!("poll cycle failed: {:#}", e);
                    }
                }

                _ = retention_ticker.tick(), if self.retention.is_some() => {
                    self.archive().await;
                }

                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        warn!("command channel closed, shutting down");
                        break;
                    };

                    match cmd {
                        SchedulerCommand::RunCycleNow { respond_to } => {
                            debug!("received RunCycleNow command");
                            let result = self.run_cycle().await;
                            let _ = respond_to.send(result);
                        }

                        SchedulerCommand::CheckNow { service_id, respond_to } => {
                            debug!("received CheckNow command for service {service_id}");
                            let result = self
                                .engine
                                .check_now(service_id)
                                .await
                                .with_context(|| format!("failed to check service {service_id}"));
                            let _ = respond_to.send(result);
                        }

                        SchedulerCommand::UpdateInterval { interval_secs } => {
                            debug!("updating interval to {interval_secs}s");
                            self.interval_duration = Duration::from_secs(interval_secs.max(1));
                            ticker = interval(self.interval_duration);
                            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        }

                        SchedulerCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }
            }
        }

        debug!("scheduler actor stopped");
    }

    async fn run_cycle(&self) -> Result<CycleReport> {
        let report = self
            .engine
            .run_cycle()
            .await
            .context("failed to load due services")?;

        if report.failed > 0 {
            warn!("{} poll results could not be stored", report.failed);
        }
        Ok(report)
    }

    async fn archive(&self) {
        let Some(policy) = self.retention else {
            return;
        };
        match self.engine.archive_old_events(policy).await {
            Ok(deleted) => info!("retention sweep removed {deleted} events"),
            Err(e) => error!("retention sweep failed: {e}"),
        }
    }
}

/// Handle for controlling a SchedulerActor
///
/// Cheap to clone; every clone talks to the same actor.
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Spawn a new scheduler actor
    pub fn spawn(
        engine: Arc<Engine>,
        interval_duration: Duration,
        retention: Option<RetentionPolicy>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = SchedulerActor::new(engine, cmd_rx, interval_duration, retention);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Run a cycle right away and wait for its report
    pub async fn run_cycle_now(&self) -> Result<CycleReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::RunCycleNow { respond_to: tx })
            .await
            .context("failed to send RunCycleNow command")?;

        rx.await.context("failed to receive response")?
    }

    /// Poll a single service right away
    ///
    /// Returns whether its sensor produced a result.
    pub async fn check_now(&self, service_id: ServiceId) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::CheckNow {
                service_id,
                respond_to: tx,
            })
            .await
            .context("failed to send CheckNow command")?;

        rx.await.context("failed to receive response")?
    }

    pub async fn update_interval(&self, interval_secs: u64) -> Result<()> {
        self.sender
            .send(SchedulerCommand::UpdateInterval { interval_secs })
            .await
            .context("failed to send UpdateInterval command")?;
        Ok(())
    }

    /// Gracefully shut down the scheduler
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(SchedulerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}

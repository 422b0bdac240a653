//! NotificationActor - Forwards domain events to notification sinks
//!
//! ```text
//! Engine ──broadcast<MonitorEvent>──► NotificationActor ──► AlertManager
//!                                          ↑                 ├─► LogSink
//!                                          │                 ├─► WebhookSink
//!                      Commands (GetStats, Mute, ...)        └─► DiscordSink
//! ```
//!
//! A lagging subscription drops the oldest events; the count is kept in the
//! stats. The stored service state stays authoritative.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, instrument, trace, warn};

use crate::alerts::AlertManager;

use super::messages::{MonitorEvent, NotifierCommand, NotifierStats};

pub struct NotificationActor {
    alerts: AlertManager,

    command_rx: mpsc::Receiver<NotifierCommand>,

    event_rx: broadcast::Receiver<MonitorEvent>,

    muted_until: Option<Instant>,

    stats: NotifierStats,
}

impl NotificationActor {
    pub fn new(
        alerts: AlertManager,
        command_rx: mpsc::Receiver<NotifierCommand>,
        event_rx: broadcast::Receiver<MonitorEvent>,
    ) -> Self {
        Self {
            alerts,
            command_rx,
            event_rx,
            muted_until: None,
            stats: NotifierStats::default(),
        }
    }

    fn is_muted(&mut self) -> bool {
        match self.muted_until {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                info!("mute expired");
                self.muted_until = None;
                false
            }
            None => false,
        }
    }

    #[instrument(skip(self), fields(sinks = self.alerts.len()))]
    pub async fn run(mut self) {
        debug!("starting notification actor");

        loop {
            tokio::select! {
                result = self.event_rx.recv() => {
                    match result {
                        Ok(event) => self.handle_event(event).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("notification actor lagged, skipped {skipped} events");
                            self.stats.lagged += skipped;
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            warn!("event channel closed, shutting down");
                            break;
                        }
                    }
                }

                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        warn!("command channel closed, shutting down");
                        break;
                    };

                    match cmd {
                        NotifierCommand::GetStats { respond_to } => {
                            let _ = respond_to.send(self.stats.clone());
                        }

                        NotifierCommand::Mute { duration_secs } => {
                            info!("muting notifications for {duration_secs}s");
                            self.muted_until = Some(Instant::now() + Duration::from_secs(duration_secs));
                        }

                        NotifierCommand::Unmute => {
                            info!("unmuting notifications");
                            self.muted_until = None;
                        }

                        NotifierCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }
            }
        }

        debug!("notification actor stopped");
    }

    async fn handle_event(&mut self, event: MonitorEvent) {
        if self.is_muted() {
            trace!("dropping {} while muted", event.kind.name());
            self.stats.muted += 1;
            return;
        }

        self.alerts.dispatch(&event).await;
        self.stats.delivered += 1;
    }
}

/// Handle for controlling a NotificationActor
#[derive(Clone)]
pub struct NotifierHandle {
    sender: mpsc::Sender<NotifierCommand>,
}

impl NotifierHandle {
    /// Spawn a notification actor on an event subscription
    pub fn spawn(alerts: AlertManager, event_rx: broadcast::Receiver<MonitorEvent>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = NotificationActor::new(alerts, cmd_rx, event_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    pub async fn get_stats(&self) -> Result<NotifierStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(NotifierCommand::GetStats { respond_to: tx })
            .await
            .context("failed to send GetStats command")?;

        rx.await.context("failed to receive response")
    }

    /// Drop notifications for a while
    pub async fn mute(&self, duration_secs: u64) -> Result<()> {
        self.sender
            .send(NotifierCommand::Mute { duration_secs })
            .await
            .context("failed to send Mute command")?;
        Ok(())
    }

    pub async fn unmute(&self) -> Result<()> {
        self.sender
            .send(NotifierCommand::Unmute)
            .await
            .context("failed to send Unmute command")?;
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(NotifierCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}

// Daily digest scheduler loop

use crate::digest::{DigestOutcome, DigestService};
use crate::errors::{DigestError, ScheduleError};
use crate::schedule::DailySchedule;
use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Shortest sleep between fire checks, guards against a zero or negative wait
const MIN_SLEEP: Duration = Duration::from_secs(1);

#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Run until a shutdown signal arrives
    async fn start(&self) -> Result<(), ScheduleError>;

    /// Signal the loop to stop
    async fn stop(&self);

    /// One scheduled (non-forced) digest run
    async fn tick(&self) -> Result<DigestOutcome, DigestError>;
}

/// Runs the digest once at start-up, then at every fire time of the schedule
pub struct DigestScheduler {
    digest: DigestService,
    schedule: DailySchedule,
    run_on_startup: bool,
    shutdown_tx: broadcast::Sender<()>,
}

impl DigestScheduler {
    pub fn new(digest: DigestService, schedule: DailySchedule) -> Self {
        let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);
        Self {
            digest,
            schedule,
            run_on_startup: true,
            shutdown_tx,
        }
    }

    pub fn with_run_on_startup(mut self, run_on_startup: bool) -> Self {
        self.run_on_startup = run_on_startup;
        self
    }

    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Sender that stops the loop, for wiring into a process signal handler
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Time to sleep until the next fire
    fn wait_for_next(&self) -> Result<Duration, ScheduleError> {
        let now = Utc::now();
        let next = self.schedule.next_after(now)?;
        let wait = (next - now).to_std().unwrap_or(MIN_SLEEP).max(MIN_SLEEP);
        info!(
            next_run = %self.schedule.local(next),
            wait_seconds = wait.as_secs(),
            "Next digest run scheduled"
        );
        Ok(wait)
    }

    async fn run_logged(&self) {
        match self.tick().await {
            Ok(outcome) => debug!(?outcome, "Scheduled digest finished"),
            Err(e) => error!(error = %e, "Scheduled digest failed"),
        }
    }
}

#[async_trait]
impl Scheduler for DigestScheduler {
    #[instrument(
        skip(self),
        fields(cron = %self.schedule.expression(), timezone = %self.schedule.timezone())
    )]
    async fn start(&self) -> Result<(), ScheduleError> {
        info!("Starting digest scheduler");
        let mut shutdown_rx = self.shutdown_receiver();

        if self.run_on_startup {
            self.run_logged().await;
        }

        loop {
            let wait = self.wait_for_next()?;
            tokio::select! {
                _ = sleep(wait) => {
                    self.run_logged().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping digest scheduler");
                    break;
                }
            }
        }

        info!("Digest scheduler stopped");
        Ok(())
    }

    async fn stop(&self) {
        if self.shutdown_tx.send(()).is_err() {
            warn!("Digest scheduler was not running");
        }
    }

    async fn tick(&self) -> Result<DigestOutcome, DigestError> {
        self.digest.run(false, false).await
    }
}

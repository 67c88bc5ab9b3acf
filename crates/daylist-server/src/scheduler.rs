//! Daily job scheduler.
//!
//! Each background job (todo creation, evening reminder) runs on its own
//! [`Scheduler`]: one tokio task that sleeps until the next cron fire time in
//! the reference zone, runs the job, and listens for commands in between.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

use daylist_core::ReferenceZone;

/// A cron expression evaluated on the reference zone's wall clock.
#[derive(Debug, Clone)]
pub struct DailySchedule {
    expr: String,
    schedule: Schedule,
    zone: ReferenceZone,
}

impl DailySchedule {
    /// Parses a 5-field (`min hour dom month dow`) or full 6/7-field cron
    /// expression.
    pub fn parse(expr: &str, zone: ReferenceZone) -> Result<Self, String> {
        let schedule = expr
            .parse::<Schedule>()
            .or_else(|_| format!("0 {expr} *").parse::<Schedule>())
            .map_err(|e| format!("invalid cron expression '{expr}': {e}"))?;
        Ok(Self {
            expr: expr.to_string(),
            schedule,
            zone,
        })
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// First fire time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let now_local = now.with_timezone(&self.zone.tz());
        self.schedule
            .after(&now_local)
            .next()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Commands that can be sent to a running scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// Run the job immediately, outside the schedule.
    RunNow,
    /// Stop the scheduler loop.
    Stop,
}

/// Observable scheduler state.
#[derive(Debug, Clone, Default)]
pub struct SchedulerState {
    /// Completed runs, successful or not.
    pub runs: u64,
    pub consecutive_failures: u32,
    pub last_run: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub next_run: Option<DateTime<Utc>>,
}

impl SchedulerState {
    fn record(&mut self, at: DateTime<Utc>, result: &Result<(), String>) {
        self.runs += 1;
        self.last_run = Some(at);
        match result {
            Ok(()) => {
                self.consecutive_failures = 0;
                self.last_error = None;
            }
            Err(e) => {
                self.consecutive_failures += 1;
                self.last_error = Some(e.clone());
            }
        }
    }
}

/// Shared scheduler state.
pub type SharedSchedulerState = Arc<RwLock<SchedulerState>>;

/// Runs one job on a [`DailySchedule`].
pub struct Scheduler {
    name: &'static str,
    schedule: DailySchedule,
    state: SharedSchedulerState,
    command_tx: mpsc::Sender<SchedulerCommand>,
    command_rx: Option<mpsc::Receiver<SchedulerCommand>>,
}

impl Scheduler {
    pub fn new(name: &'static str, schedule: DailySchedule) -> Self {
        let (command_tx, command_rx) = mpsc::channel(16);
        Self {
            name,
            schedule,
            state: Arc::new(RwLock::new(SchedulerState::default())),
            command_tx,
            command_rx: Some(command_rx),
        }
    }

    /// Returns a handle for sending commands to the scheduler.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            command_tx: self.command_tx.clone(),
            state: self.state.clone(),
        }
    }

    /// Runs the scheduler loop until [`SchedulerCommand::Stop`] arrives.
    ///
    /// `job` receives the fire time and reports a failure as a message; a
    /// failed run is logged and the next fire is scheduled as usual.
    pub async fn run<F, Fut>(mut self, job: F)
    where
        F: Fn(DateTime<Utc>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send,
    {
        let Some(mut command_rx) = self.command_rx.take() else {
            warn!(job = self.name, "scheduler already running");
            return;
        };

        info!(job = self.name, schedule = self.schedule.expr(), "scheduler started");

        let mut last_fire: Option<DateTime<Utc>> = None;

        loop {
            let now = Utc::now();
            let from = last_fire.map_or(now, |fired| fired.max(now));
            let next = self.schedule.next_after(from);
            self.state.write().await.next_run = next;

            let delay = next.map(|at| (at - now).to_std().unwrap_or(Duration::ZERO));
            if let (Some(at), Some(delay)) = (next, delay) {
                debug!(job = self.name, next = %at, delay_secs = delay.as_secs(), "next run scheduled");
            }

            tokio::select! {
                _ = sleep_or_forever(delay) => {
                    let fired = next.unwrap_or(now);
                    last_fire = Some(fired);
                    self.run_job(&job, fired).await;
                }
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(SchedulerCommand::RunNow) => {
                            debug!(job = self.name, "received RunNow command");
                            self.run_job(&job, Utc::now()).await;
                        }
                        Some(SchedulerCommand::Stop) | None => {
                            info!(job = self.name, "scheduler stopping");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn run_job<F, Fut>(&self, job: &F, at: DateTime<Utc>)
    where
        F: Fn(DateTime<Utc>) -> Fut,
        Fut: Future<Output = Result<(), String>>,
    {
        debug!(job = self.name, "starting run");
        let result = job(at).await;
        match &result {
            Ok(()) => info!(job = self.name, "run completed"),
            Err(e) => warn!(job = self.name, error = %e, "run failed"),
        }
        self.state.write().await.record(at, &result);
    }
}

async fn sleep_or_forever(delay: Option<Duration>) {
    match delay {
        Some(delay) => tokio::time::sleep(delay).await,
        None => std::future::pending().await,
    }
}

/// Handle for sending commands to a running scheduler.
#[derive(Clone, Debug)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
    state: SharedSchedulerState,
}

impl SchedulerHandle {
    /// Triggers an immediate run.
    pub async fn run_now(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx.send(SchedulerCommand::RunNow).await
    }

    /// Stops the scheduler.
    pub async fn stop(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx.send(SchedulerCommand::Stop).await
    }

    /// Returns a snapshot of the scheduler state.
    pub async fn state(&self) -> SchedulerState {
        self.state.read().await.clone()
    }
}

//! Serve command: HTTP API plus the two daily jobs, until a shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::open_store;
use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::http;
use crate::reminder::ReminderJob;
use crate::scheduler::{DailySchedule, Scheduler, SchedulerHandle};
use crate::signals::ShutdownHandle;
use crate::state::AppState;
use crate::sync::TodoSyncEngine;

/// A spawned scheduler and the handle used to stop it.
struct RunningJob {
    name: &'static str,
    handle: SchedulerHandle,
    task: JoinHandle<()>,
}

pub async fn run(config: &ServerConfig) -> ServerResult<()> {
    config.validate()?;

    let store = open_store(config).await?;
    let state = AppState::from_config(config, store)?;

    let shutdown = ShutdownHandle::new();
    shutdown.listen_for_signals();

    let mut jobs = Vec::new();
    if config.sync.enabled {
        jobs.push(spawn_sync(config.sync_schedule()?, state.sync.clone()));
    } else {
        info!("todo sync job disabled");
    }
    if config.reminder.enabled {
        jobs.push(spawn_reminder(config.reminder_schedule()?, state.reminder.clone()));
    } else {
        info!("reminder job disabled");
    }

    let listener = TcpListener::bind(config.bind_addr()?).await?;
    info!(
        addr = %listener.local_addr()?,
        base_url = %config.server.base_url,
        timezone = %config.sync.timezone,
        "daylist listening"
    );

    let wait = shutdown.clone();
    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(async move { wait.wait().await })
        .await?;

    info!("shutting down");
    for job in jobs {
        if let Err(e) = job.handle.stop().await {
            warn!(job = job.name, error = %e, "failed to stop scheduler");
        }
        if tokio::time::timeout(Duration::from_secs(5), job.task).await.is_err() {
            warn!(job = job.name, "scheduler did not stop in time");
        }
    }
    info!("server stopped");
    Ok(())
}

fn spawn_sync(schedule: DailySchedule, engine: Arc<TodoSyncEngine>) -> RunningJob {
    let name = "create-todos";
    let scheduler = Scheduler::new(name, schedule);
    let handle = scheduler.handle();
    let task = tokio::spawn(scheduler.run(move |at| {
        let engine = engine.clone();
        async move {
            let report = engine.run(at).await.map_err(|e| e.to_string())?;
            info!(
                date = %report.date,
                processed_users = report.processed_users,
                errors = report.count("error"),
                "scheduled todo sync done"
            );
            Ok(())
        }
    }));
    RunningJob { name, handle, task }
}

fn spawn_reminder(schedule: DailySchedule, job: Arc<ReminderJob>) -> RunningJob {
    let name = "send-notifications";
    let scheduler = Scheduler::new(name, schedule);
    let handle = scheduler.handle();
    let task = tokio::spawn(scheduler.run(move |at| {
        let job = job.clone();
        async move {
            let report = job.run(at).await.map_err(|e| e.to_string())?;
            info!(
                date = %report.date,
                notifications_sent = report.notifications_sent,
                "scheduled reminder done"
            );
            Ok(())
        }
    }));
    RunningJob { name, handle, task }
}

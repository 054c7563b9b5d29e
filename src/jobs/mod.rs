//! Background jobs: reminders, monthly reports and CSV exports
//!
//! Jobs are queued on an mpsc channel and drained by a dispatcher that runs
//! each one on its own task, at most `jobs.workers` at a time. Periodic jobs
//! are queued by interval timers; exports are queued by the HTTP layer, which
//! waits for the outcome on a oneshot channel.

pub mod export;
pub mod reminder;
pub mod report;

use std::{path::PathBuf, sync::Arc, time::Duration};

use chrono::Utc;
use tokio::{
    sync::{mpsc, oneshot, Semaphore},
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};

use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
    repository::Repository,
    services::email::Mailer,
};

/// Pending jobs waiting for a worker
const QUEUE_CAPACITY: usize = 32;

/// A unit of background work
pub enum Job {
    DailyReminder,
    MonthlyReport,
    ExportCsv {
        recipient: String,
        reply: oneshot::Sender<AppResult<PathBuf>>,
    },
}

impl Job {
    fn name(&self) -> &'static str {
        match self {
            Job::DailyReminder => "daily_reminder",
            Job::MonthlyReport => "monthly_report",
            Job::ExportCsv { .. } => "export_csv",
        }
    }
}

/// Dependencies handed to every job
#[derive(Clone)]
pub struct JobContext {
    pub repository: Repository,
    pub mailer: Arc<dyn Mailer>,
    pub report_recipient: String,
    pub export_dir: PathBuf,
}

impl JobContext {
    pub fn new(repository: Repository, mailer: Arc<dyn Mailer>, config: &AppConfig) -> Self {
        Self {
            repository,
            mailer,
            report_recipient: config.jobs.report_recipient.clone(),
            export_dir: config.storage.export_dir.clone(),
        }
    }
}

/// Handle used to queue jobs
#[derive(Clone)]
pub struct JobRunner {
    sender: mpsc::Sender<Job>,
}

impl JobRunner {
    /// Spawn the dispatcher
    pub fn start(context: JobContext, workers: usize) -> Self {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        tokio::spawn(dispatch(context, receiver, semaphore));
        Self { sender }
    }

    /// Queue `job` every `period`, first after one full period
    pub fn schedule_every(&self, period: Duration, job: fn() -> Job) -> JoinHandle<()> {
        let sender = self.sender.clone();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let job = job();
                tracing::debug!(job = job.name(), "scheduling periodic job");
                if sender.send(job).await.is_err() {
                    tracing::warn!("Job queue closed, stopping schedule");
                    break;
                }
            }
        })
    }

    /// Start the daily reminder and monthly report schedules
    pub fn start_schedules(&self, config: &AppConfig) -> Vec<JoinHandle<()>> {
        vec![
            self.schedule_every(
                Duration::from_secs(config.jobs.reminder_interval_secs),
                || Job::DailyReminder,
            ),
            self.schedule_every(
                Duration::from_secs(config.jobs.report_interval_secs),
                || Job::MonthlyReport,
            ),
        ]
    }

    /// Queue a job without waiting for it
    pub async fn enqueue(&self, job: Job) -> AppResult<()> {
        self.sender
            .send(job)
            .await
            .map_err(|_| AppError::Internal("Job queue is closed".to_string()))
    }

    /// Run a CSV export for `recipient` and wait for its outcome
    pub async fn export_csv(&self, recipient: String) -> AppResult<PathBuf> {
        let (reply, outcome) = oneshot::channel();
        self.sender
            .send(Job::ExportCsv { recipient, reply })
            .await
            .map_err(|_| AppError::Export("Job queue is closed".to_string()))?;

        outcome
            .await
            .map_err(|_| AppError::Export("Export job was dropped".to_string()))?
    }
}

async fn dispatch(context: JobContext, mut receiver: mpsc::Receiver<Job>, semaphore: Arc<Semaphore>) {
    while let Some(job) = receiver.recv().await {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        let context = context.clone();
        tokio::spawn(async move {
            let _permit = permit;
            run(&context, job).await;
        });
    }
    tracing::info!("Job dispatcher stopped");
}

async fn run(context: &JobContext, job: Job) {
    let name = job.name();
    tracing::info!(job = name, "job started");

    match job {
        Job::DailyReminder => {
            match reminder::run(&context.repository, context.mailer.as_ref(), Utc::now()).await {
                Ok(sent) => tracing::info!(job = name, sent, "job finished"),
                Err(e) => tracing::error!(job = name, "Error in daily reminder: {}", e),
            }
        }
        Job::MonthlyReport => {
            match report::run(
                &context.repository,
                context.mailer.as_ref(),
                &context.report_recipient,
                Utc::now(),
            )
            .await
            {
                Ok(()) => tracing::info!(job = name, "job finished"),
                Err(e) => tracing::error!(job = name, "Error in monthly report: {}", e),
            }
        }
        Job::ExportCsv { recipient, reply } => {
            let result = export::run(
                &context.repository,
                context.mailer.as_ref(),
                &context.export_dir,
                &recipient,
            )
            .await
            .map_err(|e| match e {
                AppError::Export(_) => e,
                other => AppError::Export(other.to_string()),
            });

            match &result {
                Ok(path) => tracing::info!(job = name, path = %path.display(), "job finished"),
                Err(e) => tracing::error!(job = name, "Error in CSV export: {}", e),
            }
            // the requester may have gone away
            let _ = reply.send(result);
        }
    }
}

//! Job status board and the in-process interval scheduler.
//!
//! Every job run, whether it comes from HTTP, the CLI or the scheduler, goes
//! through [`JobBoard::run`] so the board always shows the latest outcome.

use crate::{
    config::SchedulerConfig,
    errors::ServiceError,
    metrics::{self, names},
    services::{
        dispatch_sync::{AutoImportOutcome, DispatchSyncService},
        imports::ImportSummary,
        reports::{FetchReportsOutcome, ReportService},
    },
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use strum::{AsRefStr, Display, EnumIter, EnumString};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};
use utoipa::ToSchema;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    ToSchema,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum JobKind {
    FetchReports,
    ImportBulkOrders,
    AutoImport,
}

/// Last run of a job. `finished_at` is `None` while it is still running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct JobRun {
    pub job: JobKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub success: Option<bool>,
    pub message: Option<String>,
}

impl JobRun {
    pub fn is_running(&self) -> bool {
        self.finished_at.is_none()
    }
}

/// Outcome types that can be summarized on the job board.
pub trait JobOutput {
    fn summary(&self) -> String;

    fn succeeded(&self) -> bool {
        true
    }
}

impl JobOutput for FetchReportsOutcome {
    fn summary(&self) -> String {
        self.message.clone()
    }
}

impl JobOutput for ImportSummary {
    fn summary(&self) -> String {
        format!(
            "Imported {} of {} orders ({} duplicates, {} errors)",
            self.imported, self.total, self.duplicates, self.errors
        )
    }

    fn succeeded(&self) -> bool {
        self.success
    }
}

impl JobOutput for AutoImportOutcome {
    fn summary(&self) -> String {
        format!(
            "Scanned {} orders over {} pages; {}",
            self.orders_seen,
            self.pages,
            self.summary.summary()
        )
    }

    fn succeeded(&self) -> bool {
        self.summary.success
    }
}

#[derive(Clone, Default)]
pub struct JobBoard {
    runs: Arc<DashMap<JobKind, JobRun>>,
}

impl JobBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, job: JobKind) -> Option<JobRun> {
        self.runs.get(&job).map(|run| run.value().clone())
    }

    /// Latest run of every job that has run, ordered by job.
    pub fn snapshot(&self) -> Vec<JobRun> {
        let mut runs: Vec<JobRun> = self.runs.iter().map(|run| run.value().clone()).collect();
        runs.sort_by_key(|run| run.job);
        runs
    }

    /// Runs `task` as `job`, refusing to start a second copy while one is in
    /// flight. A run whose future is dropped before completing is recorded as
    /// cancelled.
    pub async fn run<T, Fut>(&self, job: JobKind, task: Fut) -> Result<T, ServiceError>
    where
        T: JobOutput,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        self.start(job)?;
        self.publish_running();
        let mut guard = RunGuard {
            board: self,
            job,
            finished: false,
        };
        metrics::increment_counter(names::JOB_RUNS);
        info!(job = %job, "Job started");

        let result = task.await;
        let (success, message) = match &result {
            Ok(output) => (output.succeeded(), output.summary()),
            Err(e) => (false, e.to_string()),
        };
        if !success {
            metrics::increment_counter(names::JOB_FAILURES);
            warn!(job = %job, message = %message, "Job finished with errors");
        } else {
            info!(job = %job, message = %message, "Job finished");
        }

        self.finish(job, success, message);
        guard.finished = true;
        result
    }

    fn finish(&self, job: JobKind, success: bool, message: String) {
        if let Some(mut run) = self.runs.get_mut(&job) {
            run.finished_at = Some(Utc::now());
            run.success = Some(success);
            run.message = Some(message);
        }
        self.publish_running();
    }

    fn publish_running(&self) {
        let running = self.runs.iter().filter(|run| run.is_running()).count();
        metrics::set_gauge(names::JOBS_RUNNING, running as f64);
    }

    fn start(&self, job: JobKind) -> Result<(), ServiceError> {
        let mut entry = self.runs.entry(job).or_insert_with(|| JobRun {
            job,
            started_at: Utc::now(),
            finished_at: Some(Utc::now()),
            success: None,
            message: None,
        });
        if entry.is_running() {
            return Err(ServiceError::Conflict(format!("{} is already running", job)));
        }
        *entry = JobRun {
            job,
            started_at: Utc::now(),
            finished_at: None,
            success: None,
            message: None,
        };
        Ok(())
    }
}

/// Closes out a run whose future was dropped mid-flight.
struct RunGuard<'a> {
    board: &'a JobBoard,
    job: JobKind,
    finished: bool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        metrics::increment_counter(names::JOB_FAILURES);
        warn!(job = %self.job, "Job cancelled before completion");
        self.board
            .finish(self.job, false, format!("{} was cancelled", self.job));
    }
}

/// Spawns the interval loops for `fetch-reports` and `auto-import`. Returns no
/// handles when the scheduler is disabled.
pub fn spawn_scheduler(
    config: &SchedulerConfig,
    board: JobBoard,
    reports: ReportService,
    dispatch_sync: DispatchSyncService,
) -> Vec<JoinHandle<()>> {
    if !config.enabled {
        info!("Job scheduler disabled");
        return Vec::new();
    }

    let report_every = Duration::from_secs(config.report_sync_interval_secs);
    let import_every = Duration::from_secs(config.auto_import_interval_secs);
    info!(
        report_sync_secs = config.report_sync_interval_secs,
        auto_import_secs = config.auto_import_interval_secs,
        "Starting job scheduler"
    );

    let report_board = board.clone();
    let reports_loop = tokio::spawn(async move {
        let mut ticker = interval(report_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = report_board
                .run(JobKind::FetchReports, reports.fetch_reports(None))
                .await
            {
                error!(error = %e, "Scheduled fetch-reports failed");
            }
        }
    });

    let import_loop = tokio::spawn(async move {
        let mut ticker = interval(import_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let today = Utc::now().date_naive();
            if let Err(e) = board
                .run(JobKind::AutoImport, dispatch_sync.auto_import(today, today))
                .await
            {
                error!(error = %e, "Scheduled auto-import failed");
            }
        }
    });

    vec![reports_loop, import_loop]
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn summary(errors: usize) -> ImportSummary {
        ImportSummary {
            success: errors == 0,
            total: 3,
            imported: 3 - errors,
            duplicates: 0,
            errors,
            error_details: vec![],
        }
    }

    #[tokio::test]
    async fn records_successful_run() {
        let board = JobBoard::new();
        let out = board
            .run(JobKind::ImportBulkOrders, async { Ok(summary(0)) })
            .await
            .unwrap();
        assert!(out.success);

        let run = board.get(JobKind::ImportBulkOrders).unwrap();
        assert_eq!(run.success, Some(true));
        assert!(!run.is_running());
        assert_eq!(
            run.message.as_deref(),
            Some("Imported 3 of 3 orders (0 duplicates, 0 errors)")
        );
    }

    #[tokio::test]
    async fn partial_import_is_marked_unsuccessful() {
        let board = JobBoard::new();
        board
            .run(JobKind::ImportBulkOrders, async { Ok(summary(1)) })
            .await
            .unwrap();
        assert_eq!(board.get(JobKind::ImportBulkOrders).unwrap().success, Some(false));
    }

    #[tokio::test]
    async fn failed_run_keeps_error_message() {
        let board = JobBoard::new();
        let result: Result<FetchReportsOutcome, _> = board
            .run(JobKind::FetchReports, async {
                Err(ServiceError::ExternalApiError("HTTP 500".into()))
            })
            .await;
        assert!(result.is_err());

        let run = board.get(JobKind::FetchReports).unwrap();
        assert_eq!(run.success, Some(false));
        assert!(run.message.unwrap().contains("HTTP 500"));
    }

    #[tokio::test]
    async fn second_concurrent_run_is_rejected() {
        let board = JobBoard::new();
        let (release, wait) = tokio::sync::oneshot::channel::<()>();

        let first = {
            let board = board.clone();
            tokio::spawn(async move {
                board
                    .run(JobKind::AutoImport, async move {
                        let _ = wait.await;
                        Ok(summary(0))
                    })
                    .await
            })
        };
        while !board
            .get(JobKind::AutoImport)
            .map(|r| r.is_running())
            .unwrap_or(false)
        {
            tokio::task::yield_now().await;
        }

        let second = board
            .run(JobKind::AutoImport, async { Ok(summary(0)) })
            .await;
        assert_matches!(second, Err(ServiceError::Conflict(_)));

        release.send(()).unwrap();
        assert!(first.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn cancelled_run_does_not_block_the_next_one() {
        let board = JobBoard::new();
        let cancelled = tokio::time::timeout(
            Duration::from_millis(10),
            board.run(
                JobKind::FetchReports,
                std::future::pending::<Result<FetchReportsOutcome, ServiceError>>(),
            ),
        )
        .await;
        assert!(cancelled.is_err());

        let run = board.get(JobKind::FetchReports).unwrap();
        assert!(!run.is_running());
        assert_eq!(run.success, Some(false));
        assert_eq!(run.message.as_deref(), Some("fetch-reports was cancelled"));

        let next = board
            .run(JobKind::FetchReports, async {
                Ok(FetchReportsOutcome {
                    date: chrono::NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
                    updated: 0,
                    message: "No reports to update".into(),
                    batch_stats: Default::default(),
                })
            })
            .await;
        assert!(next.is_ok());
        assert_eq!(board.get(JobKind::FetchReports).unwrap().success, Some(true));
    }

    #[test]
    fn job_names_are_kebab_case() {
        assert_eq!(JobKind::FetchReports.to_string(), "fetch-reports");
        assert_eq!(
            "import-bulk-orders".parse::<JobKind>().unwrap(),
            JobKind::ImportBulkOrders
        );
        assert_eq!(
            serde_json::to_value(JobKind::AutoImport).unwrap(),
            serde_json::json!("auto-import")
        );
    }
}

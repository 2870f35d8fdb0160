use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::pipeline::Dispatcher;

pub type JobResult = anyhow::Result<()>;

/// A unit of recurring background work.
#[async_trait]
pub trait SchedulerJob: Send + Sync {
    fn name(&self) -> &'static str;

    /// Pause between the end of one run and the start of the next.
    fn interval(&self) -> Duration;

    async fn execute(&self) -> JobResult;
}

/// Runs registered jobs forever, each in its own tokio task.
///
/// A job runs immediately on start. After each run the loop sleeps for the
/// job's full interval, so runs never overlap and a slow run pushes the next
/// one back instead of causing a burst.
pub struct SchedulerService {
    jobs: Vec<Arc<dyn SchedulerJob>>,
}

impl SchedulerService {
    pub fn new() -> Self {
        Self { jobs: Vec::new() }
    }

    pub fn with_job<J: SchedulerJob + 'static>(mut self, job: J) -> Self {
        self.jobs.push(Arc::new(job));
        self
    }

    /// Spawn one loop per job. The handles only finish if the runtime shuts
    /// down or the task is aborted.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        self.jobs
            .iter()
            .map(|job| {
                let job = Arc::clone(job);
                tokio::spawn(async move {
                    Self::run_job_loop(job).await;
                })
            })
            .collect()
    }

    async fn run_job_loop(job: Arc<dyn SchedulerJob>) {
        let name = job.name();
        let interval = job.interval();
        info!("Job '{}' scheduled every {:?}", name, interval);

        loop {
            let started = Instant::now();

            // A panicking run surfaces as a JoinError instead of killing the loop.
            let run = Arc::clone(&job);
            match tokio::spawn(async move { run.execute().await }).await {
                Ok(Ok(())) => debug!("Job '{}' completed in {:?}", name, started.elapsed()),
                Ok(Err(e)) => error!("Job '{}' failed: {:#}", name, e),
                Err(e) => error!("Job '{}' aborted: {}", name, e),
            }

            let elapsed = started.elapsed();
            if elapsed > interval {
                warn!(
                    "Job '{}' took {:?}, longer than its {:?} interval",
                    name, elapsed, interval
                );
            }

            tokio::time::sleep(interval).await;
        }
    }
}

impl Default for SchedulerService {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives [`Dispatcher::run_cycle`] on the polling interval.
pub struct AlertJob {
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
}

impl AlertJob {
    pub fn new(dispatcher: Arc<Dispatcher>, interval: Duration) -> Self {
        Self { dispatcher, interval }
    }
}

#[async_trait]
impl SchedulerJob for AlertJob {
    fn name(&self) -> &'static str {
        "NewsAlerts"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn execute(&self) -> JobResult {
        let report = self.dispatcher.run_cycle().await?;
        if report.skipped_no_subscribers {
            return Ok(());
        }

        info!(
            "Cycle done: sources {}/{} ok, {} dispatched, {} sent, {} failed sends, {} seen, {} unmatched, {} without link, {} storage failures",
            report.sources_ok,
            report.sources_ok + report.sources_failed,
            report.items_dispatched,
            report.deliveries_sent,
            report.deliveries_failed,
            report.entries_already_seen,
            report.entries_unmatched,
            report.entries_without_link,
            report.storage_failures
        );
        Ok(())
    }
}

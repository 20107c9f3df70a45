// Recurring job scheduler: one background loop, at most one installed job

use crate::config::SchedulerConfig;
use crate::errors::ScheduleError;
use crate::schedule::{Frequency, Trigger};
use chrono::{DateTime, Local};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

/// The unit of work run on every firing
pub type JobTask = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// The single installed job
struct ScheduledJob {
    id: u64,
    trigger: Trigger,
    next_run: DateTime<Local>,
    task: JobTask,
}

type JobSlot = Arc<Mutex<Option<ScheduledJob>>>;

struct Runner {
    handle: JoinHandle<()>,
    shutdown_tx: broadcast::Sender<()>,
}

/// Runs one recurring task on a background tokio task.
///
/// The job slot holds at most one job; `update_job` empties it before
/// installing the replacement, so two jobs never coexist. The task is awaited
/// inline by the loop, which means it never overlaps itself. A panicking run
/// is contained and the job stays scheduled.
pub struct JobScheduler {
    tick: Duration,
    stop_timeout: Duration,
    job: JobSlot,
    runner: Mutex<Option<Runner>>,
    next_job_id: AtomicU64,
}

impl std::fmt::Debug for JobScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobScheduler")
            .field("tick", &self.tick)
            .field("stop_timeout", &self.stop_timeout)
            .finish()
    }
}

impl JobScheduler {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            tick: Duration::from_millis(config.tick_millis.max(1)),
            stop_timeout: Duration::from_secs(config.stop_timeout_seconds),
            job: Arc::new(Mutex::new(None)),
            runner: Mutex::new(None),
            next_job_id: AtomicU64::new(1),
        }
    }

    /// Start the background loop; no-op when it is already running
    #[instrument(skip(self))]
    pub async fn start(&self) {
        let mut runner = self.runner.lock().await;
        if let Some(current) = runner.as_ref() {
            if !current.handle.is_finished() {
                debug!("Scheduler already running");
                return;
            }
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(run_loop(Arc::clone(&self.job), self.tick, shutdown_rx));
        *runner = Some(Runner {
            handle,
            shutdown_tx,
        });

        info!(tick_millis = self.tick.as_millis() as u64, "Scheduler started");
    }

    /// Signal the loop to exit and wait for it, at most `stop_timeout`.
    /// A loop stuck in a long task run is aborted rather than waited on.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        let runner = self.runner.lock().await.take();
        let Some(Runner {
            mut handle,
            shutdown_tx,
        }) = runner
        else {
            debug!("Scheduler already stopped");
            return;
        };

        // No receiver means the loop already ended
        let _ = shutdown_tx.send(());

        match timeout(self.stop_timeout, &mut handle).await {
            Ok(Ok(())) => info!("Scheduler stopped"),
            Ok(Err(e)) => warn!(error = %e, "Scheduler loop ended abnormally"),
            Err(_) => {
                warn!(
                    timeout_seconds = self.stop_timeout.as_secs(),
                    "Scheduler loop did not stop in time, aborting it"
                );
                handle.abort();
            }
        }
    }

    /// True while the background loop is alive
    pub async fn is_running(&self) -> bool {
        self.runner
            .lock()
            .await
            .as_ref()
            .is_some_and(|runner| !runner.handle.is_finished())
    }

    /// Replace the installed job.
    ///
    /// The previous job is always discarded. An unsupported frequency leaves no
    /// job installed and is not an error; a malformed time is.
    #[instrument(skip(self, task))]
    pub async fn update_job(
        &self,
        time: &str,
        frequency: &str,
        task: JobTask,
    ) -> Result<(), ScheduleError> {
        let mut slot = self.job.lock().await;
        *slot = None;

        let frequency = match frequency.parse::<Frequency>() {
            Ok(frequency) => frequency,
            Err(e) => {
                warn!(error = %e, "Frequency not supported, no job scheduled");
                return Ok(());
            }
        };

        let trigger = Trigger::new(frequency, time)?;
        let next_run = trigger.next_from_now()?;
        let id = self.next_job_id.fetch_add(1, Ordering::Relaxed);

        info!(
            job_id = id,
            frequency = %frequency,
            time = %trigger.time_of_day().format("%H:%M"),
            next_run = %next_run,
            "Job scheduled"
        );

        *slot = Some(ScheduledJob {
            id,
            trigger,
            next_run,
            task,
        });
        Ok(())
    }

    /// Remove the installed job, if any
    pub async fn clear_job(&self) {
        if self.job.lock().await.take().is_some() {
            info!("Scheduled job cleared");
        }
    }

    /// Next firing time of the installed job
    pub async fn next_run_time(&self) -> Option<DateTime<Local>> {
        self.job.lock().await.as_ref().map(|job| job.next_run)
    }

    #[cfg(test)]
    async fn make_due(&self) {
        if let Some(job) = self.job.lock().await.as_mut() {
            job.next_run = Local::now() - chrono::Duration::seconds(1);
        }
    }
}

async fn run_loop(job: JobSlot, tick: Duration, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_pending(&job).await;
            }
            _ = shutdown_rx.recv() => {
                debug!("Shutdown signal received, leaving scheduler loop");
                break;
            }
        }
    }
}

/// Run the installed job if it is due, then compute its next firing
async fn run_pending(job: &JobSlot) {
    let due = {
        let slot = job.lock().await;
        match slot.as_ref() {
            Some(current) if Local::now() >= current.next_run => {
                Some((current.id, Arc::clone(&current.task)))
            }
            _ => None,
        }
    };

    let Some((id, task)) = due else {
        return;
    };

    info!(job_id = id, "Scheduled job fired");
    if AssertUnwindSafe(task()).catch_unwind().await.is_err() {
        error!(job_id = id, "Scheduled job panicked");
    }

    let mut slot = job.lock().await;
    // The job may have been replaced while it ran
    if let Some(current) = slot.as_mut().filter(|current| current.id == id) {
        match current.trigger.next_from_now() {
            Ok(next_run) => {
                current.next_run = next_run;
                debug!(job_id = id, next_run = %next_run, "Job rescheduled");
            }
            Err(e) => {
                error!(job_id = id, error = %e, "Cannot compute next run, removing job");
                *slot = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            tick_millis: 20,
            stop_timeout_seconds: 1,
        }
    }

    fn counting_task(counter: Arc<AtomicUsize>) -> JobTask {
        Arc::new(move || {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    fn noop_task() -> JobTask {
        Arc::new(|| Box::pin(async {}))
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let scheduler = JobScheduler::new(&config());
        assert!(!scheduler.is_running().await);

        scheduler.start().await;
        assert!(scheduler.is_running().await);

        scheduler.stop().await;
        assert!(!scheduler.is_running().await);
    }

    #[tokio::test]
    async fn test_start_twice_is_noop_and_stop_is_idempotent() {
        let scheduler = JobScheduler::new(&config());
        scheduler.start().await;
        scheduler.start().await;
        assert!(scheduler.is_running().await);

        scheduler.stop().await;
        scheduler.stop().await;
        assert!(!scheduler.is_running().await);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let scheduler = JobScheduler::new(&config());
        scheduler.start().await;
        scheduler.stop().await;
        scheduler.start().await;
        assert!(scheduler.is_running().await);
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_no_job_means_no_next_run() {
        let scheduler = JobScheduler::new(&config());
        assert!(scheduler.next_run_time().await.is_none());
    }

    #[tokio::test]
    async fn test_daily_job_next_run_matches_time() {
        let scheduler = JobScheduler::new(&config());
        scheduler
            .update_job("07:45", "daily", noop_task())
            .await
            .unwrap();

        let next = scheduler.next_run_time().await.unwrap();
        assert!(next > Local::now());
        assert_eq!(next.format("%H:%M").to_string(), "07:45");
        assert!(next - Local::now() <= chrono::Duration::days(1));
    }

    #[tokio::test]
    async fn test_hourly_job_next_run_within_hour() {
        let scheduler = JobScheduler::new(&config());
        scheduler
            .update_job("09:30", "hourly", noop_task())
            .await
            .unwrap();

        let next = scheduler.next_run_time().await.unwrap();
        assert_eq!(next.format("%M").to_string(), "30");
        assert!(next - Local::now() <= chrono::Duration::hours(1));
    }

    #[tokio::test]
    async fn test_update_job_replaces_previous() {
        let scheduler = JobScheduler::new(&config());
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        scheduler
            .update_job("09:00", "daily", counting_task(Arc::clone(&first)))
            .await
            .unwrap();
        scheduler
            .update_job("09:00", "hourly", counting_task(Arc::clone(&second)))
            .await
            .unwrap();

        scheduler.make_due().await;
        run_pending(&scheduler.job).await;

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsupported_frequency_clears_job_without_error() {
        let scheduler = JobScheduler::new(&config());
        scheduler
            .update_job("09:00", "daily", noop_task())
            .await
            .unwrap();

        scheduler
            .update_job("09:00", "weekly", noop_task())
            .await
            .unwrap();
        assert!(scheduler.next_run_time().await.is_none());
    }

    #[tokio::test]
    async fn test_differently_cased_frequency_is_not_scheduled() {
        let scheduler = JobScheduler::new(&config());
        scheduler
            .update_job("09:00", "Daily", noop_task())
            .await
            .unwrap();
        assert!(scheduler.next_run_time().await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_time_is_error_and_leaves_no_job() {
        let scheduler = JobScheduler::new(&config());
        scheduler
            .update_job("09:00", "daily", noop_task())
            .await
            .unwrap();

        let result = scheduler.update_job("9am", "daily", noop_task()).await;
        assert!(matches!(result, Err(ScheduleError::InvalidTime(_))));
        assert!(scheduler.next_run_time().await.is_none());
    }

    #[tokio::test]
    async fn test_clear_job() {
        let scheduler = JobScheduler::new(&config());
        scheduler
            .update_job("09:00", "daily", noop_task())
            .await
            .unwrap();
        scheduler.clear_job().await;
        assert!(scheduler.next_run_time().await.is_none());
    }

    #[tokio::test]
    async fn test_due_job_fires_once_and_is_rescheduled() {
        let scheduler = JobScheduler::new(&config());
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler
            .update_job("09:00", "hourly", counting_task(Arc::clone(&counter)))
            .await
            .unwrap();

        scheduler.make_due().await;
        scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        scheduler.stop().await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(scheduler.next_run_time().await.unwrap() > Local::now());
    }

    #[tokio::test]
    async fn test_panicking_task_keeps_job_and_loop_alive() {
        let scheduler = JobScheduler::new(&config());
        let panicking: JobTask = Arc::new(|| Box::pin(async { panic!("dispatch blew up") }));
        scheduler
            .update_job("09:00", "daily", panicking)
            .await
            .unwrap();
        scheduler.start().await;

        scheduler.make_due().await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(scheduler.is_running().await);
        let next = scheduler.next_run_time().await.unwrap();
        assert!(next > Local::now());
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_stop_aborts_stuck_task_within_timeout() {
        let scheduler = JobScheduler::new(&config());
        let stuck: JobTask = Arc::new(|| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            })
        });
        scheduler.update_job("09:00", "daily", stuck).await.unwrap();
        scheduler.make_due().await;
        scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = std::time::Instant::now();
        scheduler.stop().await;
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(!scheduler.is_running().await);
    }
}

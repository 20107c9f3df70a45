// Dispatch task: select the latest file, upload it, announce it

use crate::config::WeComApiConfig;
use crate::errors::{DispatchError, ScheduleError};
use crate::models::{DispatchOutcome, ScheduleSpec};
use crate::scanner::select_latest;
use crate::scheduler::{JobScheduler, JobTask};
use crate::store::ConfigStore;
use crate::telemetry;
use crate::wecom::WeComClient;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// Runs one dispatch against the configuration currently in the store
pub struct Dispatcher {
    store: Arc<dyn ConfigStore>,
    api: WeComApiConfig,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn ConfigStore>, api: WeComApiConfig) -> Self {
        Self { store, api }
    }

    /// Send the newest file of the monitor folder to the configured recipients.
    ///
    /// Configuration is re-read on every run, so edits apply without restart.
    /// An empty folder is not a failure. Nothing is retried.
    #[instrument(skip(self))]
    pub async fn execute(&self) -> Result<DispatchOutcome, DispatchError> {
        let started = Instant::now();
        let result = self.run().await;
        telemetry::record_dispatch_duration(started.elapsed().as_secs_f64());

        match &result {
            Ok(DispatchOutcome::NoFile) => telemetry::record_dispatch_skipped(),
            Ok(DispatchOutcome::Sent { .. }) => telemetry::record_dispatch_success(),
            Err(e) => telemetry::record_dispatch_failure(e.reason()),
        }

        result
    }

    async fn run(&self) -> Result<DispatchOutcome, DispatchError> {
        let config = self.store.load().await?;

        if config.monitor_folder.trim().is_empty() {
            error!("Monitor folder is not configured");
            return Err(DispatchError::MissingMonitorFolder);
        }

        let folder = PathBuf::from(&config.monitor_folder);
        let latest = tokio::task::spawn_blocking(move || select_latest(&folder))
            .await
            .map_err(|e| {
                error!(error = %e, "Folder scan task failed");
                DispatchError::Scan(e.to_string())
            })?;

        let Some(file) = latest else {
            info!(monitor_folder = %config.monitor_folder, "No file found to send");
            return Ok(DispatchOutcome::NoFile);
        };

        info!(file = %file.display(), "Dispatching latest file");

        let client = WeComClient::new(config.wecom.credentials(), &self.api)
            .map_err(DispatchError::Upload)?;

        let media = client.upload_file(&file).await.map_err(|e| {
            error!(file = %file.display(), error = %e, "Upload failed");
            DispatchError::Upload(e)
        })?;
        let media_id = media.media_id.clone();

        client
            .send_file_message(media, &config.wecom.recipients())
            .await
            .map_err(|e| {
                error!(file = %file.display(), error = %e, "Send failed");
                DispatchError::Send(e)
            })?;

        let file_name = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!(file_name = %file_name, media_id = %media_id, "File sent");

        Ok(DispatchOutcome::Sent { file, media_id })
    }
}

/// Bring the scheduler in line with `spec`.
///
/// Enabled: install a job running the dispatcher and make sure the loop runs.
/// Disabled: drop the job and stop the loop.
#[instrument(skip(scheduler, dispatcher))]
pub async fn apply_schedule(
    scheduler: &JobScheduler,
    spec: &ScheduleSpec,
    dispatcher: Arc<Dispatcher>,
) -> Result<(), ScheduleError> {
    if !spec.enabled {
        scheduler.clear_job().await;
        scheduler.stop().await;
        info!("Schedule disabled");
        return Ok(());
    }

    let task: JobTask = Arc::new(move || {
        let dispatcher = Arc::clone(&dispatcher);
        Box::pin(async move {
            if let Err(e) = dispatcher.execute().await {
                warn!(error = %e, "Scheduled dispatch failed");
            }
        })
    });

    scheduler.update_job(&spec.time, &spec.frequency, task).await?;
    scheduler.start().await;
    Ok(())
}

use std::sync::Arc;

use common::config::Settings;
use common::dispatch::Dispatcher;
use common::scheduler::JobScheduler;
use common::store::ConfigStore;
use metrics_exporter_prometheus::PrometheusHandle;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Arc<dyn ConfigStore>,
    pub scheduler: Arc<JobScheduler>,
    pub dispatcher: Arc<Dispatcher>,
    /// Absent when no recorder was installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire the scheduler and dispatcher around `store`
    pub fn new(
        settings: Settings,
        store: Arc<dyn ConfigStore>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let scheduler = Arc::new(JobScheduler::new(&settings.scheduler));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&store),
            settings.wecom_api.clone(),
        ));

        Self {
            settings: Arc::new(settings),
            store,
            scheduler,
            dispatcher,
            metrics,
        }
    }
}

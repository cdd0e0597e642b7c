//! Application state.

use cibench_config::SystemConfig;
use cibench_core::Executor;
use cibench_db::JobStore;
use cibench_executor::http::build_client;
use cibench_executor::{HadesExecutor, JenkinsExecutor, JenkinsSettings};
use cibench_scheduler::{BenchmarkOrchestrator, CompletionRecorder};
use reqwest::Client;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub recorder: CompletionRecorder,
    /// Absent when no Hades endpoint is configured.
    pub hades: Option<Arc<dyn Executor>>,
    /// Defaults for Jenkins requests; query parameters override them per request.
    pub jenkins: JenkinsSettings,
    pub client: Client,
}

impl AppState {
    pub fn new(
        store: Arc<dyn JobStore>,
        hades: Option<Arc<dyn Executor>>,
        jenkins: JenkinsSettings,
        client: Client,
    ) -> Self {
        Self {
            recorder: CompletionRecorder::new(store.clone()),
            store,
            hades,
            jenkins,
            client,
        }
    }

    pub fn from_config(config: &SystemConfig, store: Arc<dyn JobStore>) -> cibench_core::Result<Self> {
        let client = build_client(config.http.timeout)?;
        let hades = config.hades.as_ref().map(|hades| {
            Arc::new(HadesExecutor::from_config(client.clone(), hades)) as Arc<dyn Executor>
        });
        Ok(Self::new(
            store,
            hades,
            JenkinsSettings::from(&config.jenkins),
            client,
        ))
    }

    pub fn hades_orchestrator(&self) -> Option<BenchmarkOrchestrator> {
        self.hades
            .clone()
            .map(|executor| BenchmarkOrchestrator::new(executor, self.store.clone()))
    }

    /// Build a Jenkins executor for `settings`, failing when any setting is missing.
    pub fn jenkins_orchestrator(
        &self,
        settings: JenkinsSettings,
    ) -> cibench_core::Result<BenchmarkOrchestrator> {
        let executor = JenkinsExecutor::new(self.client.clone(), settings);
        executor.check_configured()?;
        Ok(BenchmarkOrchestrator::new(
            Arc::new(executor),
            self.store.clone(),
        ))
    }
}

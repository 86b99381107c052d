//! Entry point that wires the supervisor, trigger loop and reconciler together

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use super::stream_log_buffer::LogEntry;
use super::stream_supervisor::{ActiveStreamInfo, StreamSupervisor};
use super::traits::StreamCommandBuilder;
use crate::config::Config;
use crate::errors::StreamResult;
use crate::job_scheduling::{
    HealthReport, ScheduledTermination, StatusSyncReport, StreamReconciler, StreamTriggerLoop,
    TerminationSchedulerConfig,
};
use crate::models::OperationResult;
use crate::repositories::{StreamHistorySink, StreamJobStore};

/// Owns every lifecycle component and the token that stops the background loops
pub struct StreamLifecycleManager {
    supervisor: Arc<StreamSupervisor>,
    trigger_loop: Arc<StreamTriggerLoop>,
    reconciler: Arc<StreamReconciler>,
    cancellation_token: CancellationToken,
}

impl StreamLifecycleManager {
    pub fn new(
        config: &Config,
        store: Arc<dyn StreamJobStore>,
        history: Arc<dyn StreamHistorySink>,
        command_builder: Arc<dyn StreamCommandBuilder>,
    ) -> Self {
        let supervisor = StreamSupervisor::new(
            config.ffmpeg.command.clone(),
            &config.supervisor,
            TerminationSchedulerConfig::from(&config.scheduler),
            store.clone(),
            history,
            command_builder,
        );
        let trigger_loop = Arc::new(StreamTriggerLoop::new(
            supervisor.clone(),
            store.clone(),
            config.scheduler.clone(),
        ));
        let reconciler = Arc::new(StreamReconciler::new(
            supervisor.clone(),
            store,
            config.reconciler.clone(),
        ));

        Self {
            supervisor,
            trigger_loop,
            reconciler,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Spawn the trigger loop and the reconciler.
    pub fn start_background(&self) -> Vec<JoinHandle<()>> {
        let trigger_loop = self.trigger_loop.clone();
        let trigger_token = self.cancellation_token.clone();
        let reconciler = self.reconciler.clone();
        let reconciler_token = self.cancellation_token.clone();

        vec![
            tokio::spawn(async move { trigger_loop.run(trigger_token).await }),
            tokio::spawn(async move { reconciler.run(reconciler_token).await }),
        ]
    }

    pub fn supervisor(&self) -> &Arc<StreamSupervisor> {
        &self.supervisor
    }

    pub fn trigger_loop(&self) -> &Arc<StreamTriggerLoop> {
        &self.trigger_loop
    }

    pub fn reconciler(&self) -> &Arc<StreamReconciler> {
        &self.reconciler
    }

    pub async fn start(&self, job_id: Uuid) -> OperationResult {
        self.supervisor.start(job_id).await
    }

    pub async fn stop(&self, job_id: Uuid) -> OperationResult {
        self.supervisor.stop(job_id).await
    }

    pub async fn is_active(&self, job_id: Uuid) -> bool {
        self.supervisor.is_active(job_id).await
    }

    pub async fn list_active(&self) -> Vec<Uuid> {
        self.supervisor.list_active().await
    }

    pub async fn get_active_info(&self, job_id: Uuid) -> Option<ActiveStreamInfo> {
        self.supervisor.get_active_info(job_id).await
    }

    pub async fn get_logs(&self, job_id: Uuid) -> Vec<LogEntry> {
        self.supervisor.get_logs(job_id).await
    }

    pub fn schedule_termination(
        &self,
        job_id: Uuid,
        minutes: f64,
    ) -> StreamResult<ScheduledTermination> {
        self.supervisor
            .terminations()
            .schedule_minutes(job_id, minutes)
    }

    pub fn cancel_termination(&self, job_id: Uuid) -> bool {
        self.supervisor.terminations().cancel(job_id)
    }

    /// Called when a job was stopped outside the supervisor; drops any pending termination.
    pub fn on_job_stopped(&self, job_id: Uuid) {
        self.supervisor.terminations().cancel(job_id);
    }

    pub fn get_scheduled_termination(&self, job_id: Uuid) -> Option<ScheduledTermination> {
        self.supervisor.terminations().get(job_id)
    }

    pub async fn sync_statuses(&self) -> StreamResult<StatusSyncReport> {
        self.reconciler.sync_statuses(chrono::Utc::now()).await
    }

    pub async fn health_check(&self) -> HealthReport {
        self.reconciler.health_check().await
    }

    /// Stop the background loops, then every running stream.
    pub async fn shutdown(&self) {
        info!("Shutting down stream lifecycle manager");
        self.cancellation_token.cancel();
        let stopped = self.supervisor.shutdown().await;
        info!("Stream lifecycle manager stopped ({} streams terminated)", stopped);
    }
}

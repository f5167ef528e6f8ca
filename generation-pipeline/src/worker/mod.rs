mod processor;

pub use processor::{DispatchError, JobProcessor, JobResult};

use std::{sync::Arc, time::Duration};

use common::{
    llm::GenerationClient, storage::job_store::JobStore, utils::config::AppConfig,
};
use serde::Serialize;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pipeline::GenerationPipeline;

/// Floor for the poll interval; `tokio::time::interval` rejects a zero period.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Read once when the worker is built.
    pub enabled: bool,
    pub poll_interval: Duration,
    /// Fail jobs on AUTH_ERROR / MODEL_NOT_FOUND instead of requeueing.
    pub fail_fast: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(10),
            fail_fast: false,
        }
    }
}

impl WorkerConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            enabled: config.ai_worker_enabled,
            poll_interval: Duration::from_secs(config.ai_worker_poll_interval_secs)
                .max(MIN_POLL_INTERVAL),
            fail_fast: config.ai_worker_fail_fast,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingOutcome {
    pub processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessingOutcome {
    fn finished(job_id: &str, error: Option<String>) -> Self {
        Self {
            processed: true,
            job_id: Some(job_id.to_string()),
            error,
        }
    }
}

struct RunningLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Supervises the polling loop. Each instance owns its own loop, so
/// independent workers can coexist.
pub struct QueueWorker {
    processor: Arc<JobProcessor>,
    config: WorkerConfig,
    running: Option<RunningLoop>,
}

impl QueueWorker {
    pub fn new(
        store: Arc<dyn JobStore>,
        client: Arc<dyn GenerationClient>,
        pipeline: Arc<GenerationPipeline>,
        mut config: WorkerConfig,
    ) -> Self {
        config.poll_interval = config.poll_interval.max(MIN_POLL_INTERVAL);
        let processor = JobProcessor::new(store, client, pipeline, config.fail_fast);
        Self {
            processor: Arc::new(processor),
            config,
            running: None,
        }
    }

    /// Spawns the polling loop on the current runtime. The first cycle runs
    /// immediately, then once per poll interval.
    pub fn start(&mut self) {
        if !self.config.enabled {
            debug!("generation worker disabled; start ignored");
            return;
        }

        if self.running.is_some() {
            warn!("generation worker already running");
            return;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(
            Arc::clone(&self.processor),
            self.config.poll_interval,
            cancel.clone(),
        ));

        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            fail_fast = self.config.fail_fast,
            "generation worker started"
        );
        self.running = Some(RunningLoop { cancel, handle });
    }

    /// Stops scheduling new cycles. A cycle already in flight runs to completion.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
            info!("generation worker stopped");
        }
    }

    /// `stop`, then wait for an in-flight cycle to finish.
    pub async fn shutdown(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        running.cancel.cancel();
        if let Err(err) = running.handle.await {
            warn!(error = %err, "generation worker loop ended abnormally");
        }
        info!("generation worker stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Runs one cycle now, independent of the timer.
    pub async fn trigger_processing(&self) -> ProcessingOutcome {
        self.processor.process_next().await
    }
}

impl Drop for QueueWorker {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
        }
    }
}

async fn poll_loop(processor: Arc<JobProcessor>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let outcome = processor.process_next().await;
                debug!(
                    processed = outcome.processed,
                    job_id = outcome.job_id.as_deref().unwrap_or("-"),
                    error = outcome.error.as_deref().unwrap_or("-"),
                    "generation worker cycle finished"
                );
            }
        }
    }
}

use std::sync::Arc;

use common::{
    error::AppError,
    llm::{GenerateOptions, GenerationClient, GenerationError, GenerationResponse},
    storage::{
        job_store::JobStore,
        types::{generation_job::GenerationJob, job_payload::JobPayload},
    },
    utils::prompt_sanitizer::{prepare_untrusted, UNTRUSTED_CONTENT_NOTICE},
};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::pipeline::{GenerationPipeline, PipelineError, PipelineInput, PipelineOutput};

use super::ProcessingOutcome;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl DispatchError {
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::Generation(err) => err.code(),
            DispatchError::Pipeline(err) => err.code(),
        }
    }

    pub fn is_terminal_provider(&self) -> bool {
        match self {
            DispatchError::Generation(err) => err.is_terminal_provider(),
            DispatchError::Pipeline(err) => err.is_terminal_provider(),
        }
    }
}

/// What gets stored as a completed job's `result`.
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub response: String,
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub duration_ms: u64,
    pub issues: Value,
    pub warnings: Vec<String>,
    pub stages: Value,
}

impl JobResult {
    fn from_response(response: GenerationResponse) -> Self {
        Self {
            duration_ms: response.duration_ms(),
            prompt_tokens: response.prompt_tokens,
            completion_tokens: response.completion_tokens,
            response: response.text,
            model: response.model,
            issues: json!([]),
            warnings: Vec::new(),
            stages: json!([]),
        }
    }

    fn from_pipeline(output: PipelineOutput, fallback_model: &str) -> Self {
        Self {
            model: output.model().unwrap_or(fallback_model).to_string(),
            prompt_tokens: output.prompt_tokens(),
            completion_tokens: output.completion_tokens(),
            duration_ms: output.duration_ms(),
            warnings: output.warnings(),
            issues: json!(output.issues),
            stages: json!(output.stages),
            response: output.text,
        }
    }

    pub fn into_json(self) -> Value {
        json!({
            "response": self.response,
            "model": self.model,
            "promptTokens": self.prompt_tokens,
            "completionTokens": self.completion_tokens,
            "durationMs": self.duration_ms,
            "issues": self.issues,
            "warnings": self.warnings,
            "stages": self.stages,
        })
    }
}

/// One lease-and-process cycle against the job store.
pub struct JobProcessor {
    store: Arc<dyn JobStore>,
    client: Arc<dyn GenerationClient>,
    pipeline: Arc<GenerationPipeline>,
    fail_fast: bool,
}

impl JobProcessor {
    pub fn new(
        store: Arc<dyn JobStore>,
        client: Arc<dyn GenerationClient>,
        pipeline: Arc<GenerationPipeline>,
        fail_fast: bool,
    ) -> Self {
        Self {
            store,
            client,
            pipeline,
            fail_fast,
        }
    }

    /// Never returns an error: every failure becomes part of the outcome.
    pub async fn process_next(&self) -> ProcessingOutcome {
        if !self.client.is_configured() {
            return ProcessingOutcome {
                processed: false,
                job_id: None,
                error: Some(GenerationError::NotConfigured.to_string()),
            };
        }

        match self.try_process_next().await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(error = %err, "generation worker cycle failed");
                ProcessingOutcome {
                    processed: false,
                    job_id: None,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    async fn try_process_next(&self) -> Result<ProcessingOutcome, AppError> {
        let Some(pending) = self.store.find_pending().await? else {
            return Ok(ProcessingOutcome::default());
        };

        let job = self.store.mark_processing(&pending.id).await?;
        self.process_job(&job).await
    }

    #[instrument(
        skip_all,
        fields(
            job_id = %job.id,
            request_type = %job.request_type,
            attempt = job.attempts,
            max_attempts = job.max_attempts
        )
    )]
    async fn process_job(&self, job: &GenerationJob) -> Result<ProcessingOutcome, AppError> {
        info!("processing generation job");

        let payload = match JobPayload::from_job_input(&job.request_type, &job.input_data) {
            Ok(payload) => payload,
            Err(err) => {
                let message = match err {
                    AppError::Validation(message) => message,
                    other => other.to_string(),
                };
                self.store.mark_failed(&job.id, &message).await?;
                warn!(%message, "generation job rejected");
                return Ok(ProcessingOutcome::finished(&job.id, Some(message)));
            }
        };

        match self.dispatch(payload).await {
            Ok(result) => {
                let duration_ms = result.duration_ms;
                self.store
                    .mark_completed(&job.id, result.into_json())
                    .await?;
                info!(duration_ms, "generation job completed");
                Ok(ProcessingOutcome::finished(&job.id, None))
            }
            Err(err) => self.handle_failure(job, &err).await,
        }
    }

    async fn dispatch(&self, payload: JobPayload) -> Result<JobResult, DispatchError> {
        match payload {
            JobPayload::Generate {
                prompt,
                system,
                document_text,
            } => {
                let mut options = GenerateOptions {
                    system,
                    ..GenerateOptions::default()
                };

                let prompt = match document_text {
                    Some(document) => {
                        options.system = Some(match options.system.take() {
                            Some(system) => format!("{system}\n\n{UNTRUSTED_CONTENT_NOTICE}"),
                            None => UNTRUSTED_CONTENT_NOTICE.to_string(),
                        });
                        format!("{prompt}\n\n{}", prepare_untrusted(&document))
                    }
                    None => prompt,
                };

                let response = self.client.generate(&prompt, &options).await?;
                Ok(JobResult::from_response(response))
            }
            JobPayload::PostGeneration {
                prompt,
                instructions,
                title,
            } => {
                let input = PipelineInput {
                    source_text: prompt,
                    instructions,
                    title,
                };
                let output = self.pipeline.run(&input).await?;
                Ok(JobResult::from_pipeline(output, self.client.model()))
            }
        }
    }

    async fn handle_failure(
        &self,
        job: &GenerationJob,
        err: &DispatchError,
    ) -> Result<ProcessingOutcome, AppError> {
        let code = err.code();
        let fail_fast = self.fail_fast && err.is_terminal_provider();

        if job.attempts_exhausted() || fail_fast {
            let message = format!("{code}: {err} (after {} attempts)", job.attempts);
            self.store.mark_failed(&job.id, &message).await?;
            warn!(%message, fail_fast, "generation job failed");
            return Ok(ProcessingOutcome::finished(&job.id, Some(message)));
        }

        self.store.reset_to_pending(&job.id).await?;
        warn!(
            code,
            error = %err,
            attempts_remaining = job.attempts_remaining(),
            "generation job failed; requeued"
        );
        Ok(ProcessingOutcome::finished(
            &job.id,
            Some(format!("{code}: {err}")),
        ))
    }
}

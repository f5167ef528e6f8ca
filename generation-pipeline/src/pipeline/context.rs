use common::llm::GenerationResponse;
use serde::Serialize;
use tracing::error;

use super::{
    config::PipelineConfig,
    error::{PipelineError, PipelineStage},
    review_result::ReviewIssue,
    services::PipelineServices,
};

/// Source material for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineInput {
    pub source_text: String,
    pub instructions: Option<String>,
    pub title: Option<String>,
}

impl PipelineInput {
    pub fn new(source_text: impl Into<String>) -> Self {
        Self {
            source_text: source_text.into(),
            instructions: None,
            title: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageReport {
    pub stage: PipelineStage,
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub duration_ms: u64,
}

impl StageReport {
    fn from_response(stage: PipelineStage, response: &GenerationResponse) -> Self {
        Self {
            stage,
            model: response.model.clone(),
            prompt_tokens: response.prompt_tokens,
            completion_tokens: response.completion_tokens,
            duration_ms: response.duration_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutput {
    pub text: String,
    pub issues: Vec<ReviewIssue>,
    pub banned_matches: Vec<String>,
    pub stages: Vec<StageReport>,
}

impl PipelineOutput {
    pub fn prompt_tokens(&self) -> u64 {
        self.stages.iter().map(|s| s.prompt_tokens).sum()
    }

    pub fn completion_tokens(&self) -> u64 {
        self.stages.iter().map(|s| s.completion_tokens).sum()
    }

    pub fn duration_ms(&self) -> u64 {
        self.stages.iter().map(|s| s.duration_ms).sum()
    }

    /// Model of the final stage.
    pub fn model(&self) -> Option<&str> {
        self.stages.last().map(|s| s.model.as_str())
    }

    pub fn warnings(&self) -> Vec<String> {
        self.banned_matches
            .iter()
            .map(|phrase| format!("Banned phrase found: \"{phrase}\""))
            .collect()
    }
}

pub struct PipelineContext<'a> {
    pub input: &'a PipelineInput,
    pub config: &'a PipelineConfig,
    pub services: &'a dyn PipelineServices,
    pub working_text: String,
    pub issues: Vec<ReviewIssue>,
    pub banned_matches: Vec<String>,
    pub reports: Vec<StageReport>,
}

impl<'a> PipelineContext<'a> {
    pub fn new(
        input: &'a PipelineInput,
        config: &'a PipelineConfig,
        services: &'a dyn PipelineServices,
    ) -> Self {
        Self {
            input,
            config,
            services,
            working_text: input.source_text.clone(),
            issues: Vec::new(),
            banned_matches: Vec::new(),
            reports: Vec::new(),
        }
    }

    pub fn record(&mut self, stage: PipelineStage, response: &GenerationResponse) {
        self.reports
            .push(StageReport::from_response(stage, response));
    }

    pub fn abort(&mut self, err: PipelineError) -> PipelineError {
        error!(
            completed_stages = self.reports.len(),
            code = err.code(),
            error = %err,
            "generation pipeline aborted"
        );
        err
    }

    pub fn into_output(self) -> PipelineOutput {
        PipelineOutput {
            text: self.working_text,
            issues: self.issues,
            banned_matches: self.banned_matches,
            stages: self.reports,
        }
    }
}

use std::{fmt::Write as _, sync::Arc};

use async_trait::async_trait;
use common::{
    llm::{GenerateOptions, GenerationClient, GenerationError, GenerationResponse},
    utils::prompt_sanitizer::{prepare_untrusted, UNTRUSTED_CONTENT_NOTICE},
};

use super::{config::StageTemperatures, context::PipelineInput, review_result::ReviewIssue};
use crate::utils::llm_instructions::{
    POLISH_SYSTEM_MESSAGE, REVIEW_SYSTEM_MESSAGE, REWRITE_SYSTEM_MESSAGE,
};

/// One provider call per stage. Prompt construction lives behind this seam so
/// stage logic can be tested without a provider.
#[async_trait]
pub trait PipelineServices: Send + Sync {
    async fn run_review(
        &self,
        input: &PipelineInput,
        correction: Option<&str>,
    ) -> Result<GenerationResponse, GenerationError>;

    async fn run_rewrite(
        &self,
        input: &PipelineInput,
        issues: &[ReviewIssue],
    ) -> Result<GenerationResponse, GenerationError>;

    async fn run_polish(
        &self,
        input: &PipelineInput,
        draft: &str,
    ) -> Result<GenerationResponse, GenerationError>;
}

pub struct DefaultPipelineServices {
    client: Arc<dyn GenerationClient>,
    temperatures: StageTemperatures,
}

impl DefaultPipelineServices {
    pub fn new(client: Arc<dyn GenerationClient>, temperatures: StageTemperatures) -> Self {
        Self {
            client,
            temperatures,
        }
    }

    fn system_with_notice(system: &str) -> String {
        format!("{system}\n\n{UNTRUSTED_CONTENT_NOTICE}")
    }
}

fn source_section(input: &PipelineInput) -> String {
    let mut section = String::new();
    if let Some(title) = &input.title {
        let _ = writeln!(section, "Working title: {title}");
    }
    if let Some(instructions) = &input.instructions {
        let _ = writeln!(section, "Editor instructions: {instructions}");
    }
    let _ = write!(
        section,
        "Source material:\n{}",
        prepare_untrusted(&input.source_text)
    );
    section
}

/// The draft is model output derived from untrusted source text.
fn polish_section(input: &PipelineInput, draft: &str) -> String {
    let mut section = String::new();
    if let Some(instructions) = &input.instructions {
        let _ = writeln!(section, "Editor instructions: {instructions}");
    }
    let _ = write!(section, "Draft to polish:\n{}", prepare_untrusted(draft));
    section
}

fn format_issues(issues: &[ReviewIssue]) -> String {
    if issues.is_empty() {
        return "No issues were found; keep edits minimal.".to_string();
    }

    issues
        .iter()
        .enumerate()
        .map(|(idx, issue)| format!("{}. [{}] {}", idx + 1, issue.category, issue.detail))
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl PipelineServices for DefaultPipelineServices {
    async fn run_review(
        &self,
        input: &PipelineInput,
        correction: Option<&str>,
    ) -> Result<GenerationResponse, GenerationError> {
        let mut prompt = source_section(input);
        if let Some(correction) = correction {
            prompt.push_str("\n\n");
            prompt.push_str(correction);
        }

        let options = GenerateOptions::default()
            .with_system(Self::system_with_notice(REVIEW_SYSTEM_MESSAGE))
            .with_temperature(self.temperatures.review)
            .json();

        self.client.generate(&prompt, &options).await
    }

    async fn run_rewrite(
        &self,
        input: &PipelineInput,
        issues: &[ReviewIssue],
    ) -> Result<GenerationResponse, GenerationError> {
        let prompt = format!(
            "{}\n\nReview issues to address:\n{}",
            source_section(input),
            format_issues(issues)
        );

        let options = GenerateOptions::default()
            .with_system(Self::system_with_notice(REWRITE_SYSTEM_MESSAGE))
            .with_temperature(self.temperatures.rewrite);

        self.client.generate(&prompt, &options).await
    }

    async fn run_polish(
        &self,
        input: &PipelineInput,
        draft: &str,
    ) -> Result<GenerationResponse, GenerationError> {
        let prompt = polish_section(input, draft);

        let options = GenerateOptions::default()
            .with_system(Self::system_with_notice(POLISH_SYSTEM_MESSAGE))
            .with_temperature(self.temperatures.polish);

        self.client.generate(&prompt, &options).await
    }
}

mod config;
mod context;
mod error;
mod review_result;
mod services;
mod stages;
mod state;

pub use config::{PipelineConfig, StageTemperatures};
pub use context::{PipelineInput, PipelineOutput, StageReport};
pub use error::{PipelineError, PipelineStage};
pub use review_result::{parse_review, ReviewIssue};
#[allow(clippy::module_name_repetitions)]
pub use services::{DefaultPipelineServices, PipelineServices};
pub use stages::find_banned_phrases;

use std::{sync::Arc, time::Instant};

use common::llm::GenerationClient;
use tracing::info;

use self::{
    context::PipelineContext,
    stages::{polish, review, rewrite},
    state::ready,
};

/// REVIEW -> REWRITE -> POLISH over a piece of source text.
#[allow(clippy::module_name_repetitions)]
pub struct GenerationPipeline {
    pipeline_config: PipelineConfig,
    services: Arc<dyn PipelineServices>,
}

impl GenerationPipeline {
    pub fn new(client: Arc<dyn GenerationClient>) -> Self {
        Self::new_with_config(client, PipelineConfig::default())
    }

    pub fn new_with_config(client: Arc<dyn GenerationClient>, pipeline_config: PipelineConfig) -> Self {
        let services = DefaultPipelineServices::new(client, pipeline_config.temperatures);
        Self::with_services(pipeline_config, Arc::new(services))
    }

    pub fn with_services(
        pipeline_config: PipelineConfig,
        services: Arc<dyn PipelineServices>,
    ) -> Self {
        Self {
            pipeline_config,
            services,
        }
    }

    #[tracing::instrument(
        skip_all,
        fields(source_chars = input.source_text.chars().count())
    )]
    pub async fn run(&self, input: &PipelineInput) -> Result<PipelineOutput, PipelineError> {
        let mut ctx = PipelineContext::new(input, &self.pipeline_config, self.services.as_ref());
        let started = Instant::now();

        let machine = ready();
        let machine = review(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;
        let machine = rewrite(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;
        let _machine = polish(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;

        let output = ctx.into_output();
        info!(
            total_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            provider_ms = output.duration_ms(),
            issues = output.issues.len(),
            banned_matches = output.banned_matches.len(),
            "generation pipeline finished"
        );

        Ok(output)
    }
}

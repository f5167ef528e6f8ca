use tracing::{debug, instrument, warn};

use super::{
    context::PipelineContext,
    error::{map_guard_error, PipelineError, PipelineStage},
    review_result::parse_review,
    state::{GenerationMachine, Polished, Ready, Reviewed, Rewritten},
};
use crate::utils::llm_instructions::REVIEW_CORRECTION_INSTRUCTION;

/// First attempt plus one corrective retry.
const REVIEW_ATTEMPTS: usize = 2;

#[instrument(level = "trace", skip_all, fields(stage = %PipelineStage::Review))]
pub async fn review(
    machine: GenerationMachine<(), Ready>,
    ctx: &mut PipelineContext<'_>,
) -> Result<GenerationMachine<(), Reviewed>, PipelineError> {
    let mut correction = None;
    let mut last_reason = String::new();

    for attempt in 1..=REVIEW_ATTEMPTS {
        let response = ctx
            .services
            .run_review(ctx.input, correction)
            .await
            .map_err(|err| PipelineError::stage(PipelineStage::Review, err))?;
        ctx.record(PipelineStage::Review, &response);

        match parse_review(&response.text) {
            Ok(issues) => {
                debug!(attempt, issue_count = issues.len(), "review parsed");
                ctx.issues = issues;
                return machine
                    .review()
                    .map_err(|(_, guard)| map_guard_error("review", &guard));
            }
            Err(reason) => {
                warn!(attempt, %reason, "review output was not a valid issue list");
                last_reason = reason;
                correction = Some(REVIEW_CORRECTION_INSTRUCTION);
            }
        }
    }

    Err(PipelineError::InvalidOutput {
        stage: PipelineStage::Review,
        reason: last_reason,
    })
}

#[instrument(level = "trace", skip_all, fields(stage = %PipelineStage::Rewrite))]
pub async fn rewrite(
    machine: GenerationMachine<(), Reviewed>,
    ctx: &mut PipelineContext<'_>,
) -> Result<GenerationMachine<(), Rewritten>, PipelineError> {
    let response = ctx
        .services
        .run_rewrite(ctx.input, &ctx.issues)
        .await
        .map_err(|err| PipelineError::stage(PipelineStage::Rewrite, err))?;
    ctx.record(PipelineStage::Rewrite, &response);

    ctx.working_text = non_empty(PipelineStage::Rewrite, &response.text)?;
    debug!(
        draft_chars = ctx.working_text.chars().count(),
        "rewrite completed"
    );

    machine
        .rewrite()
        .map_err(|(_, guard)| map_guard_error("rewrite", &guard))
}

#[instrument(level = "trace", skip_all, fields(stage = %PipelineStage::Polish))]
pub async fn polish(
    machine: GenerationMachine<(), Rewritten>,
    ctx: &mut PipelineContext<'_>,
) -> Result<GenerationMachine<(), Polished>, PipelineError> {
    let response = ctx
        .services
        .run_polish(ctx.input, &ctx.working_text)
        .await
        .map_err(|err| PipelineError::stage(PipelineStage::Polish, err))?;
    ctx.record(PipelineStage::Polish, &response);

    ctx.working_text = non_empty(PipelineStage::Polish, &response.text)?;
    ctx.banned_matches = find_banned_phrases(&ctx.working_text, &ctx.config.banned_phrases);

    if !ctx.banned_matches.is_empty() {
        warn!(
            matches = ?ctx.banned_matches,
            "polished text contains banned phrases"
        );
    }

    machine
        .polish()
        .map_err(|(_, guard)| map_guard_error("polish", &guard))
}

fn non_empty(stage: PipelineStage, text: &str) -> Result<String, PipelineError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::InvalidOutput {
            stage,
            reason: "model returned empty text".to_string(),
        });
    }
    Ok(trimmed.to_string())
}

/// Case-insensitive substring scan. Returns each matching phrase once, in list order.
pub fn find_banned_phrases(text: &str, banned: &[String]) -> Vec<String> {
    let haystack = text.to_lowercase();
    let mut matches: Vec<String> = Vec::new();

    for phrase in banned {
        let needle = phrase.trim().to_lowercase();
        if needle.is_empty() || matches.contains(phrase) {
            continue;
        }
        if haystack.contains(&needle) {
            matches.push(phrase.clone());
        }
    }

    matches
}

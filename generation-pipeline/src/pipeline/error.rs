use std::fmt;

use common::llm::GenerationError;
use serde::Serialize;
use state_machines::core::GuardError;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PipelineStage {
    Review,
    Rewrite,
    Polish,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Review => "REVIEW",
            PipelineStage::Rewrite => "REWRITE",
            PipelineStage::Polish => "POLISH",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// The provider call for a stage failed after client-side retries.
    #[error("{stage} failed: {source}")]
    Stage {
        stage: PipelineStage,
        source: GenerationError,
    },
    /// The stage produced output that could not be used.
    #[error("{stage} failed: {reason}")]
    InvalidOutput { stage: PipelineStage, reason: String },
    #[error("invalid generation pipeline transition during {event}: {detail}")]
    Transition { event: &'static str, detail: String },
}

impl PipelineError {
    pub fn stage(stage: PipelineStage, source: GenerationError) -> Self {
        PipelineError::Stage { stage, source }
    }

    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Stage { source, .. } => source.code(),
            PipelineError::InvalidOutput { .. } => "INVALID_RESPONSE",
            PipelineError::Transition { .. } => "INTERNAL_ERROR",
        }
    }

    pub fn is_terminal_provider(&self) -> bool {
        match self {
            PipelineError::Stage { source, .. } => source.is_terminal_provider(),
            _ => false,
        }
    }
}

pub(crate) fn map_guard_error(event: &'static str, guard: &GuardError) -> PipelineError {
    PipelineError::Transition {
        event,
        detail: format!("{guard:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_errors_are_tagged_with_stage_name() {
        let err = PipelineError::stage(
            PipelineStage::Rewrite,
            GenerationError::ModelNotFound {
                model: "gpt-oss:120b".into(),
                message: "model not found".into(),
            },
        );

        assert_eq!(
            err.to_string(),
            "REWRITE failed: Model 'gpt-oss:120b' not found: model not found"
        );
        assert_eq!(err.code(), "MODEL_NOT_FOUND");
        assert!(err.is_terminal_provider());
    }

    #[test]
    fn invalid_output_has_its_own_code() {
        let err = PipelineError::InvalidOutput {
            stage: PipelineStage::Review,
            reason: "not json".into(),
        };
        assert_eq!(err.to_string(), "REVIEW failed: not json");
        assert_eq!(err.code(), "INVALID_RESPONSE");
        assert!(!err.is_terminal_provider());
    }
}

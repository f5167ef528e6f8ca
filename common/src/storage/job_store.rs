use async_trait::async_trait;
use serde_json::Value;

use crate::error::AppError;

use super::{db::SurrealDbClient, types::generation_job::GenerationJob};

/// Queue operations the worker relies on. Implementations own atomicity:
/// `mark_processing` must claim a job and bump `attempts` in one step.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn find_pending(&self) -> Result<Option<GenerationJob>, AppError>;

    async fn mark_processing(&self, id: &str) -> Result<GenerationJob, AppError>;

    async fn mark_completed(&self, id: &str, result: Value) -> Result<(), AppError>;

    async fn mark_failed(&self, id: &str, message: &str) -> Result<(), AppError>;

    async fn reset_to_pending(&self, id: &str) -> Result<(), AppError>;
}

#[async_trait]
impl JobStore for SurrealDbClient {
    async fn find_pending(&self) -> Result<Option<GenerationJob>, AppError> {
        GenerationJob::find_pending(self).await
    }

    async fn mark_processing(&self, id: &str) -> Result<GenerationJob, AppError> {
        GenerationJob::mark_processing(id, self).await
    }

    async fn mark_completed(&self, id: &str, result: Value) -> Result<(), AppError> {
        GenerationJob::mark_completed(id, result, self).await?;
        Ok(())
    }

    async fn mark_failed(&self, id: &str, message: &str) -> Result<(), AppError> {
        GenerationJob::mark_failed(id, message, self).await?;
        Ok(())
    }

    async fn reset_to_pending(&self, id: &str) -> Result<(), AppError> {
        GenerationJob::reset_to_pending(id, self).await?;
        Ok(())
    }
}

pub mod client;
pub mod error;
pub mod retry;
pub mod types;

use async_trait::async_trait;

pub use client::OllamaCloudClient;
pub use error::GenerationError;
pub use retry::RetryPolicy;
pub use types::{
    GenerateOptions, GenerationResponse, HealthStatus, ModelInfo, ModelList, ResponseFormat,
};

/// Seam between callers and the remote text-generation provider.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// False when no credentials are available. Callers check this before
    /// doing work that would end in a guaranteed `NotConfigured` error.
    fn is_configured(&self) -> bool;

    fn model(&self) -> &str;

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<GenerationResponse, GenerationError>;

    async fn list_models(&self) -> Result<ModelList, GenerationError>;

    /// Never fails; problems are reported through the returned status.
    async fn check_health(&self) -> HealthStatus;
}

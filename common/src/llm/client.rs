use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::utils::config::AppConfig;

use super::{
    GenerateOptions, GenerationClient, GenerationError, GenerationResponse, HealthStatus,
    ModelList, ResponseFormat, RetryPolicy,
};

/// Upper bound on any provider response body.
pub const MAX_RESPONSE_BYTES: usize = 100 * 1024;

const ERROR_MESSAGE_LIMIT: usize = 300;

/// Client for the Ollama Cloud HTTP API (`/api/generate`, `/api/tags`).
#[derive(Clone)]
pub struct OllamaCloudClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<SamplingOptions>,
}

#[derive(Serialize)]
struct SamplingOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponseBody {
    #[serde(default)]
    model: Option<String>,
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
    #[serde(default)]
    total_duration: Option<u64>,
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    error: String,
}

impl OllamaCloudClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: &str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, GenerationError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty()),
            model: model.to_string(),
            retry,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, GenerationError> {
        Self::new(
            &config.ollama_cloud_base_url,
            config.ollama_api_key().map(str::to_owned),
            &config.ollama_cloud_model,
            Duration::from_secs(config.ollama_request_timeout_secs),
            RetryPolicy::new(config.ollama_max_retries),
        )
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn api_key(&self) -> Result<&str, GenerationError> {
        self.api_key
            .as_deref()
            .ok_or(GenerationError::NotConfigured)
    }

    async fn generate_once(
        &self,
        api_key: &str,
        request: &GenerateRequest<'_>,
    ) -> Result<GenerationResponse, GenerationError> {
        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await?;

        let response = check_status(response, request.model).await?;
        let body = read_body_limited(response).await?;
        let parsed: GenerateResponseBody = serde_json::from_slice(&body)
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        Ok(GenerationResponse {
            text: parsed.response,
            model: parsed.model.unwrap_or_else(|| request.model.to_string()),
            prompt_tokens: parsed.prompt_eval_count.unwrap_or(0),
            completion_tokens: parsed.eval_count.unwrap_or(0),
            total_duration_ns: parsed.total_duration.unwrap_or(0),
            done: parsed.done,
        })
    }

    async fn list_models_once(&self, api_key: &str) -> Result<ModelList, GenerationError> {
        let response = self
            .http
            .get(format!("{}/api/tags", self.base_url))
            .bearer_auth(api_key)
            .send()
            .await?;

        let response = check_status(response, &self.model).await?;
        let body = read_body_limited(response).await?;
        serde_json::from_slice(&body).map_err(|e| GenerationError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl GenerationClient for OllamaCloudClient {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(level = "debug", skip_all, fields(model = tracing::field::Empty))]
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<GenerationResponse, GenerationError> {
        let api_key = self.api_key()?;
        let model = options.model.as_deref().unwrap_or(&self.model);
        tracing::Span::current().record("model", model);

        let request = GenerateRequest {
            model,
            prompt,
            system: options.system.as_deref(),
            stream: false,
            format: options.format,
            options: options
                .temperature
                .map(|temperature| SamplingOptions { temperature }),
        };

        let response = self
            .retry
            .run("generate", || self.generate_once(api_key, &request))
            .await?;

        debug!(
            prompt_tokens = response.prompt_tokens,
            completion_tokens = response.completion_tokens,
            duration_ms = response.duration_ms(),
            "Generation completed"
        );
        Ok(response)
    }

    async fn list_models(&self) -> Result<ModelList, GenerationError> {
        let api_key = self.api_key()?;
        self.retry
            .run("list_models", || self.list_models_once(api_key))
            .await
    }

    async fn check_health(&self) -> HealthStatus {
        let Ok(api_key) = self.api_key() else {
            return HealthStatus {
                connected: false,
                model_available: false,
                error: Some(GenerationError::NotConfigured.to_string()),
                latency_ms: None,
            };
        };

        let started = Instant::now();
        let result = self.list_models_once(api_key).await;
        let latency_ms = Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX));

        match result {
            Ok(models) => {
                let model_available = models.contains(&self.model);
                HealthStatus {
                    connected: true,
                    model_available,
                    error: (!model_available)
                        .then(|| format!("Model '{}' is not available", self.model)),
                    latency_ms,
                }
            }
            Err(err) => HealthStatus {
                connected: false,
                model_available: false,
                error: Some(err.to_string()),
                latency_ms,
            },
        }
    }
}

async fn check_status(response: Response, model: &str) -> Result<Response, GenerationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());
    let body = read_body_limited(response)
        .await
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default();

    Err(classify_status(status, retry_after, &body, model))
}

fn classify_status(
    status: StatusCode,
    retry_after: Option<u64>,
    body: &str,
    model: &str,
) -> GenerationError {
    let message = error_message(status, body);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GenerationError::Auth {
            status: status.as_u16(),
            message,
        },
        StatusCode::TOO_MANY_REQUESTS => GenerationError::RateLimited {
            retry_after,
            message,
        },
        StatusCode::NOT_FOUND => GenerationError::ModelNotFound {
            model: model.to_string(),
            message,
        },
        _ => GenerationError::Provider {
            status: status.as_u16(),
            message,
        },
    }
}

/// Prefers the provider's `{"error": "..."}` text, falls back to the raw body.
fn error_message(status: StatusCode, body: &str) -> String {
    let message = serde_json::from_str::<ProviderErrorBody>(body)
        .map(|parsed| parsed.error)
        .unwrap_or_else(|_| body.trim().to_string());

    if message.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string();
    }

    message.chars().take(ERROR_MESSAGE_LIMIT).collect()
}

async fn read_body_limited(mut response: Response) -> Result<Vec<u8>, GenerationError> {
    let too_large = GenerationError::ResponseTooLarge {
        limit: MAX_RESPONSE_BYTES,
    };

    if response
        .content_length()
        .is_some_and(|len| len > MAX_RESPONSE_BYTES as u64)
    {
        return Err(too_large);
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if body.len() + chunk.len() > MAX_RESPONSE_BYTES {
            return Err(too_large);
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}

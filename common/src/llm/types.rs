use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    Json,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateOptions {
    pub system: Option<String>,
    pub temperature: Option<f32>,
    pub format: Option<ResponseFormat>,
    /// Overrides the client's configured model for one call.
    pub model: Option<String>,
}

impl GenerateOptions {
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn json(mut self) -> Self {
        self.format = Some(ResponseFormat::Json);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GenerationResponse {
    pub text: String,
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// As reported by the provider, in nanoseconds.
    pub total_duration_ns: u64,
    pub done: bool,
}

impl GenerationResponse {
    pub fn duration_ms(&self) -> u64 {
        nanos_to_millis(self.total_duration_ns)
    }
}

pub fn nanos_to_millis(nanos: u64) -> u64 {
    nanos / 1_000_000
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modified_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct ModelList {
    #[serde(default)]
    pub models: Vec<ModelInfo>,
}

impl ModelList {
    /// Matches `name` exactly or as the implicit `:latest` tag.
    pub fn contains(&self, name: &str) -> bool {
        let latest = format!("{name}:latest");
        self.models.iter().any(|info| {
            info.name == name
                || info.name == latest
                || info.model.as_deref() == Some(name)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub connected: bool,
    pub model_available: bool,
    pub error: Option<String>,
    pub latency_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_nanoseconds_become_milliseconds() {
        let response = GenerationResponse {
            total_duration_ns: 1_000_000_000,
            ..Default::default()
        };
        assert_eq!(response.duration_ms(), 1000);
        assert_eq!(nanos_to_millis(999_999), 0);
    }

    #[test]
    fn model_list_matches_latest_tag() {
        let list = ModelList {
            models: vec![ModelInfo {
                name: "llama3:latest".into(),
                model: None,
                size: None,
                modified_at: None,
            }],
        };
        assert!(list.contains("llama3"));
        assert!(list.contains("llama3:latest"));
        assert!(!list.contains("gpt-oss:120b"));
    }
}

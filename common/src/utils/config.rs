use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::storage::types::generation_job::DEFAULT_MAX_ATTEMPTS;

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    #[serde(default)]
    pub ollama_cloud_api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub ollama_cloud_base_url: String,
    #[serde(default = "default_model")]
    pub ollama_cloud_model: String,
    #[serde(default = "default_request_timeout_secs")]
    pub ollama_request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub ollama_max_retries: usize,
    #[serde(default = "default_worker_enabled")]
    pub ai_worker_enabled: bool,
    #[serde(default = "default_poll_interval_secs")]
    pub ai_worker_poll_interval_secs: u64,
    #[serde(default)]
    pub ai_worker_fail_fast: bool,
    #[serde(default = "default_job_max_attempts")]
    pub job_max_attempts: u32,
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
}

impl AppConfig {
    /// An API key that is absent or blank counts as "not configured".
    pub fn ollama_api_key(&self) -> Option<&str> {
        self.ollama_cloud_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

fn default_base_url() -> String {
    "https://ollama.com".to_string()
}

fn default_model() -> String {
    "gpt-oss:120b".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_max_retries() -> usize {
    2
}

fn default_worker_enabled() -> bool {
    true
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_job_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default().try_parsing(true))
        .build()?;

    config.try_deserialize()
}

use serde_json::{json, Map, Value};

use crate::error::AppError;

pub const GENERATE_REQUEST: &str = "generate";
pub const POST_GENERATION_REQUEST: &str = "post_generation";
pub const MISSING_PROMPT_MESSAGE: &str = "Missing required prompt in inputData";

/// Typed view of a job's `inputData`, keyed by its `requestType`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPayload {
    /// Single provider call.
    Generate {
        prompt: String,
        system: Option<String>,
        /// Untrusted extracted document text, sanitized before use.
        document_text: Option<String>,
    },
    /// REVIEW -> REWRITE -> POLISH over `prompt`, the source text of a post.
    PostGeneration {
        prompt: String,
        instructions: Option<String>,
        title: Option<String>,
    },
}

impl JobPayload {
    /// Validates an untyped payload.
    ///
    /// A missing or blank `prompt` is checked before the request type so that
    /// every malformed job fails with the same message.
    pub fn from_job_input(request_type: &str, input_data: &Value) -> Result<Self, AppError> {
        let prompt = optional_string(input_data, "prompt")
            .ok_or_else(|| AppError::Validation(MISSING_PROMPT_MESSAGE.to_string()))?;

        match request_type {
            GENERATE_REQUEST => Ok(JobPayload::Generate {
                prompt,
                system: optional_string(input_data, "system"),
                document_text: optional_string(input_data, "documentText"),
            }),
            POST_GENERATION_REQUEST => Ok(JobPayload::PostGeneration {
                prompt,
                instructions: optional_string(input_data, "instructions"),
                title: optional_string(input_data, "title"),
            }),
            other => Err(AppError::Validation(format!(
                "Unsupported requestType: {other}"
            ))),
        }
    }

    pub fn request_type(&self) -> &'static str {
        match self {
            JobPayload::Generate { .. } => GENERATE_REQUEST,
            JobPayload::PostGeneration { .. } => POST_GENERATION_REQUEST,
        }
    }

    /// Converts back into the stored `inputData` shape.
    pub fn to_input_data(&self) -> Value {
        let mut map = Map::new();
        match self {
            JobPayload::Generate {
                prompt,
                system,
                document_text,
            } => {
                map.insert("prompt".into(), json!(prompt));
                insert_optional(&mut map, "system", system.as_deref());
                insert_optional(&mut map, "documentText", document_text.as_deref());
            }
            JobPayload::PostGeneration {
                prompt,
                instructions,
                title,
            } => {
                map.insert("prompt".into(), json!(prompt));
                insert_optional(&mut map, "instructions", instructions.as_deref());
                insert_optional(&mut map, "title", title.as_deref());
            }
        }
        Value::Object(map)
    }
}

fn optional_string(input_data: &Value, key: &str) -> Option<String> {
    input_data
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
        .map(str::to_owned)
}

fn insert_optional(map: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        map.insert(key.to_owned(), json!(value));
    }
}

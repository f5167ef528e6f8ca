pub mod config;
pub mod prompt_sanitizer;

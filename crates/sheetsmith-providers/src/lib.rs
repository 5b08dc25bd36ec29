//! sheetsmith-providers: LLM provider integrations.
//!
//! Implements the `LlmProvider` trait for Anthropic, OpenAI, Gemini and
//! Ollama, plus a scripted mock, so the worksheet pipeline can run against
//! any vision-capable backend.

pub mod anthropic;
pub mod config;
pub mod gemini;
mod http;
pub mod mock;
pub mod ollama;
pub mod openai;

pub use config::{create_provider, load_config, load_config_from, ProviderConfig, SheetsmithConfig};
pub use sheetsmith_core::error::ProviderError;

//! Subcommand implementations and the plumbing they share.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;

use sheetsmith_core::actions::ActionResult;
use sheetsmith_core::model::ImageFormat;
use sheetsmith_core::WorksheetPipeline;
use sheetsmith_providers::{create_provider, load_config_from};

pub mod analyze;
pub mod customize;
pub mod generate;
pub mod init;
pub mod list_models;
pub mod run;

/// Global flags selecting the config file, provider and model.
pub struct Target {
    pub config: Option<PathBuf>,
    pub provider: Option<String>,
    pub model: Option<String>,
}

/// Load the config and build a pipeline for the selected provider.
pub fn build_pipeline(target: &Target) -> Result<WorksheetPipeline> {
    let config = load_config_from(target.config.as_deref())?;
    let name = target
        .provider
        .as_deref()
        .unwrap_or(&config.default_provider);

    let Some(provider_config) = config.providers.get(name) else {
        let mut available: Vec<_> = config.providers.keys().collect();
        available.sort();
        anyhow::bail!(
            "provider '{name}' not found in config. Available: {available:?}. \
             Run `sheetsmith init` to create a config file."
        );
    };

    let provider = create_provider(name, provider_config, config.timeout_secs)?;
    let pipeline_config = config.pipeline_config(target.model.as_deref());
    tracing::info!(provider = name, model = %pipeline_config.model, "using provider");

    Ok(WorksheetPipeline::new(Arc::from(provider), pipeline_config))
}

/// Read an image file into a `data:<mime>;base64,<data>` URI.
pub fn load_image(path: &Path) -> Result<String> {
    let format: ImageFormat = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .parse()
        .map_err(|e: String| anyhow::anyhow!("{e} ({})", path.display()))?;

    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read image: {}", path.display()))?;
    anyhow::ensure!(!bytes.is_empty(), "image file is empty: {}", path.display());

    Ok(format!(
        "data:{};base64,{}",
        format.mime_type(),
        STANDARD.encode(bytes)
    ))
}

/// Read a saved analysis. Parsing is left to the pipeline.
pub fn read_analysis(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("failed to read analysis: {}", path.display()))
}

/// Print the envelope when `json` is set, then turn a failure into an error.
pub fn finish<T: Serialize>(result: ActionResult<T>, json: bool) -> Result<T> {
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    result.into_result().map_err(anyhow::Error::msg)
}

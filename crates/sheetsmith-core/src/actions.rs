//! Request handlers for a UI layer.
//!
//! Each handler takes the analysis as a JSON string, runs one stage and
//! folds the outcome into an [`ActionResult`], which serializes as
//! `{"success": true, "data": ...}` or `{"success": false, "error": "..."}`.

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::StageError;
use crate::model::{GeneratedProblemSet, WorksheetAnalysis};
use crate::pipeline::WorksheetPipeline;

/// Success/failure envelope returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ActionResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Convert back into a `Result`, e.g. after deserializing a response.
    pub fn into_result(self) -> Result<T, String> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(self
                .error
                .unwrap_or_else(|| "An unknown error occurred.".to_string())),
        }
    }
}

impl<T> From<Result<T, StageError>> for ActionResult<T> {
    fn from(result: Result<T, StageError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::err(e.to_string()),
        }
    }
}

pub async fn handle_analyze_worksheet(
    pipeline: &WorksheetPipeline,
    photo_data_uri: &str,
    remove_handwriting: bool,
) -> ActionResult<WorksheetAnalysis> {
    let result = pipeline.analyze(photo_data_uri, remove_handwriting).await;
    if let Err(e) = &result {
        error!("error analyzing worksheet: {e}");
    }
    result.into()
}

pub async fn handle_generate_problems(
    pipeline: &WorksheetPipeline,
    worksheet_analysis_json: &str,
    number_of_problems: u32,
) -> ActionResult<GeneratedProblemSet> {
    let result = pipeline
        .generate_from_json(worksheet_analysis_json, Some(number_of_problems), None)
        .await;
    if let Err(e) = &result {
        error!("error generating problems: {e}");
    }
    result.into()
}

pub async fn handle_customize_problems(
    pipeline: &WorksheetPipeline,
    worksheet_analysis_json: &str,
    user_prompt: &str,
    number_of_problems: u32,
) -> ActionResult<GeneratedProblemSet> {
    let result = pipeline
        .customize_from_json(worksheet_analysis_json, user_prompt, number_of_problems)
        .await;
    if let Err(e) = &result {
        error!("error customizing problems: {e}");
    }
    result.into()
}

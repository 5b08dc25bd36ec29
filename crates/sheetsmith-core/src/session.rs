//! Per-session state shared between the steps of one user's workflow.
//!
//! A `SessionContext` holds the uploaded image, the current analysis and the
//! current problem set. Create one per user session; it is never global.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StageError;
use crate::model::{GeneratedProblemSet, WorksheetAnalysis};
use crate::pipeline::WorksheetPipeline;

/// State for one user session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    /// The worksheet photo as a data URI.
    pub uploaded_image: Option<String>,
    pub analysis: Option<WorksheetAnalysis>,
    pub generated: Option<GeneratedProblemSet>,
    /// Message of the most recent failed stage, cleared on the next success.
    pub last_error: Option<String>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            uploaded_image: None,
            analysis: None,
            generated: None,
            last_error: None,
        }
    }

    /// Back to the upload screen: drop everything but the session identity.
    pub fn reset(&mut self) {
        self.uploaded_image = None;
        self.analysis = None;
        self.generated = None;
        self.last_error = None;
    }

    /// Replace the uploaded image. Results derived from the old image are dropped.
    pub fn set_uploaded_image(&mut self, data_uri: impl Into<String>) {
        self.reset();
        self.uploaded_image = Some(data_uri.into());
    }

    /// Run the analyzer on the uploaded image and store the result.
    pub async fn analyze(
        &mut self,
        pipeline: &WorksheetPipeline,
        remove_handwriting: bool,
    ) -> Result<&WorksheetAnalysis, StageError> {
        let image = self
            .uploaded_image
            .clone()
            .ok_or_else(|| StageError::InvalidInput("no worksheet image uploaded".to_string()))?;

        let result = pipeline.analyze(&image, remove_handwriting).await;
        let analysis = self.record(result)?;
        self.generated = None;
        Ok(self.analysis.insert(analysis))
    }

    /// Generate problems from the current analysis, or customize them when `prompt` is set.
    ///
    /// The previous problem set is cleared before the call.
    pub async fn generate(
        &mut self,
        pipeline: &WorksheetPipeline,
        count: u32,
        prompt: Option<&str>,
    ) -> Result<&GeneratedProblemSet, StageError> {
        let analysis = self
            .analysis
            .clone()
            .ok_or_else(|| StageError::InvalidInput("worksheet analysis not available".to_string()))?;

        self.generated = None;
        let result = match prompt {
            Some(prompt) => pipeline.customize(&analysis, prompt, count).await,
            None => pipeline.generate(&analysis, Some(count), None).await,
        };
        let generated = self.record(result)?;
        Ok(self.generated.insert(generated))
    }

    fn record<T>(&mut self, result: Result<T, StageError>) -> Result<T, StageError> {
        match result {
            Ok(value) => {
                self.last_error = None;
                Ok(value)
            }
            Err(e) => {
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_sessions_are_distinct() {
        let a = SessionContext::new();
        let b = SessionContext::new();
        assert_ne!(a.id, b.id);
        assert!(a.analysis.is_none());
    }

    #[test]
    fn new_image_clears_derived_state() {
        let mut session = SessionContext::new();
        let id = session.id;
        session.last_error = Some("analysis failed".into());
        session.generated = Some(GeneratedProblemSet {
            problems: vec![],
            answer_bank_present: false,
            answer_bank: None,
        });

        session.set_uploaded_image("data:image/png;base64,AAAA");
        assert_eq!(session.id, id);
        assert!(session.generated.is_none());
        assert!(session.last_error.is_none());
        assert_eq!(
            session.uploaded_image.as_deref(),
            Some("data:image/png;base64,AAAA")
        );

        session.reset();
        assert!(session.uploaded_image.is_none());
    }
}

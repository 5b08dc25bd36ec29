//! The analyze → generate → customize pipeline.
//!
//! Each stage is single-shot: validate input, call the LLM, validate and
//! repair the output, return. Stages share no state; the pipeline can be
//! shared across tasks behind an `Arc`.

use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{Stage, StageError};
use crate::model::{GeneratedProblemSet, WorksheetAnalysis};
use crate::prompts;
use crate::traits::{extract_json_from_markdown, CompletionRequest, CompletionResponse, LlmProvider};

/// Problem count used when the caller does not ask for one.
pub const DEFAULT_PROBLEM_COUNT: u32 = 5;

/// Configuration for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Model identifier passed to the provider.
    pub model: String,
    /// Temperature for generation.
    pub temperature: f64,
    /// Max tokens per LLM reply.
    pub max_tokens: u32,
    /// Upper bound on a single LLM call.
    pub timeout: Duration,
    /// Retries on transient provider errors. Zero disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub retry_delay: Duration,
    /// Optional system prompt override.
    pub system_prompt_override: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            temperature: 0.7,
            max_tokens: 8192,
            timeout: Duration::from_secs(60),
            max_retries: 0,
            retry_delay: Duration::from_secs(1),
            system_prompt_override: None,
        }
    }
}

/// Orchestrates the three stages against one LLM provider.
pub struct WorksheetPipeline {
    provider: Arc<dyn LlmProvider>,
    config: PipelineConfig,
}

impl WorksheetPipeline {
    pub fn new(provider: Arc<dyn LlmProvider>, config: PipelineConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Analyze a worksheet photo given as a `data:<mime>;base64,<data>` URI.
    pub async fn analyze(
        &self,
        photo_data_uri: &str,
        remove_handwriting: bool,
    ) -> Result<WorksheetAnalysis, StageError> {
        let stage = Stage::Analyze;
        info!(%stage, remove_handwriting, "analyzing worksheet");

        let request = self.request(
            prompts::analyze_prompt(remove_handwriting),
            vec![photo_data_uri.to_string()],
        );
        let response = self.invoke(stage, &request).await?;

        let mut analysis: WorksheetAnalysis = parse_output(stage, &response.content)?;
        analysis.validate().map_err(|violations| StageError::Schema {
            stage,
            message: violations.join("; "),
        })?;

        if !analysis.additional_notes_for_generation.is_empty() {
            debug!("discarding notes returned by the model in a fresh analysis");
        }
        analysis.additional_notes_for_generation.clear();

        info!(
            %stage,
            concepts = analysis.identified_concepts.len(),
            examples = analysis.example_questions.len(),
            answer_bank = analysis.answer_bank_present,
            latency_ms = response.latency_ms,
            "analysis complete"
        );
        Ok(analysis)
    }

    /// Generate `count` (default 5) new problems modelled on `analysis`.
    pub async fn generate(
        &self,
        analysis: &WorksheetAnalysis,
        count: Option<u32>,
        custom_prompt: Option<&str>,
    ) -> Result<GeneratedProblemSet, StageError> {
        self.run_generation(Stage::Generate, analysis, count, custom_prompt)
            .await
    }

    /// Same as [`generate`](Self::generate), for an analysis still in JSON form.
    ///
    /// Malformed JSON fails before any LLM call.
    pub async fn generate_from_json(
        &self,
        analysis_json: &str,
        count: Option<u32>,
        custom_prompt: Option<&str>,
    ) -> Result<GeneratedProblemSet, StageError> {
        let analysis =
            WorksheetAnalysis::from_json(analysis_json).map_err(StageError::InvalidAnalysis)?;
        self.generate(&analysis, count, custom_prompt).await
    }

    /// Fold `user_prompt` into the analysis notes and run the generator on the result.
    pub async fn customize(
        &self,
        analysis: &WorksheetAnalysis,
        user_prompt: &str,
        count: u32,
    ) -> Result<GeneratedProblemSet, StageError> {
        let customized = customized_analysis(analysis, user_prompt)?;
        self.run_generation(Stage::Customize, &customized, Some(count), None)
            .await
    }

    /// Same as [`customize`](Self::customize), for an analysis still in JSON form.
    pub async fn customize_from_json(
        &self,
        analysis_json: &str,
        user_prompt: &str,
        count: u32,
    ) -> Result<GeneratedProblemSet, StageError> {
        let analysis =
            WorksheetAnalysis::from_json(analysis_json).map_err(StageError::InvalidAnalysis)?;
        self.customize(&analysis, user_prompt, count).await
    }

    async fn run_generation(
        &self,
        stage: Stage,
        analysis: &WorksheetAnalysis,
        count: Option<u32>,
        custom_prompt: Option<&str>,
    ) -> Result<GeneratedProblemSet, StageError> {
        let count = count.unwrap_or(DEFAULT_PROBLEM_COUNT);
        if count == 0 {
            return Err(StageError::InvalidInput(
                "number of problems must be at least 1".to_string(),
            ));
        }
        analysis
            .validate()
            .map_err(|violations| StageError::InvalidAnalysis(violations.join("; ")))?;
        let analysis_json = serde_json::to_string_pretty(analysis)
            .map_err(|e| StageError::InvalidAnalysis(e.to_string()))?;

        info!(%stage, count, answer_bank = analysis.answer_bank_present, "generating problems");

        let request = self.request(
            prompts::generate_prompt(&analysis_json, count, custom_prompt),
            Vec::new(),
        );
        let response = self.invoke(stage, &request).await?;
        let generated: GeneratedProblemSet = parse_output(stage, &response.content)?;

        if generated.problems.len() != count as usize {
            warn!(
                %stage,
                requested = count,
                received = generated.problems.len(),
                "model returned a different number of problems than requested"
            );
        }

        let problems =
            enforce_answer_bank(generated, analysis.answer_bank_present, &mut rand::thread_rng());
        info!(
            %stage,
            problems = problems.problems.len(),
            latency_ms = response.latency_ms,
            "generation complete"
        );
        Ok(problems)
    }

    fn request(&self, prompt: String, images: Vec<String>) -> CompletionRequest {
        CompletionRequest {
            model: self.config.model.clone(),
            prompt,
            system_prompt: self.config.system_prompt_override.clone(),
            images,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            json_output: true,
        }
    }

    /// Call the provider under the configured timeout, retrying transient failures.
    async fn invoke(
        &self,
        stage: Stage,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, StageError> {
        let timeout = self.config.timeout;
        let mut retry_delay = self.config.retry_delay;
        let mut attempt = 0u32;

        loop {
            let err = match tokio::time::timeout(timeout, self.provider.complete(request)).await {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(source)) => StageError::External { stage, source },
                Err(_) => StageError::Timeout {
                    stage,
                    limit: timeout,
                },
            };

            if attempt >= self.config.max_retries || !is_transient(&err) {
                return Err(err);
            }
            attempt += 1;

            // Use the provider's retry-after hint if available
            let delay = err
                .provider_error()
                .and_then(|e| e.retry_after_ms())
                .map(Duration::from_millis)
                .unwrap_or(retry_delay);
            warn!(%stage, attempt, delay_ms = delay.as_millis() as u64, "retrying after error: {err}");
            tokio::time::sleep(delay).await;
            retry_delay = (retry_delay * 2).min(Duration::from_secs(60));
        }
    }
}

/// Return a copy of `analysis` with `user_prompt` appended to its notes.
///
/// The prompt is appended as given. Fails with
/// [`StageError::MissingPrompt`] if it is blank.
pub fn customized_analysis(
    analysis: &WorksheetAnalysis,
    user_prompt: &str,
) -> Result<WorksheetAnalysis, StageError> {
    if user_prompt.trim().is_empty() {
        return Err(StageError::MissingPrompt);
    }
    Ok(analysis.clone().with_notes(user_prompt))
}

/// Overwrite the answer-bank fields of a model reply from the input analysis.
///
/// The flag is copied from the analysis and the bank is rebuilt from the
/// problems' answers, so neither depends on what the model echoed back.
pub fn enforce_answer_bank<R: Rng + ?Sized>(
    mut generated: GeneratedProblemSet,
    answer_bank_present: bool,
    rng: &mut R,
) -> GeneratedProblemSet {
    if generated.answer_bank_present != answer_bank_present {
        debug!(
            expected = answer_bank_present,
            "model echoed the wrong answer_bank_present value"
        );
    }
    generated.answer_bank_present = answer_bank_present;
    generated.answer_bank = if answer_bank_present {
        let answers = generated.problems.iter().map(|p| p.answer.clone()).collect();
        Some(shuffle_answers(answers, rng))
    } else {
        None
    };
    generated
}

/// Shuffle answers uniformly over the orders that differ from the input.
///
/// Reshuffles while the result equals the input. When every answer is the
/// same no other order exists and the input is returned as is.
pub fn shuffle_answers<R: Rng + ?Sized>(answers: Vec<String>, rng: &mut R) -> Vec<String> {
    let mut shuffled = answers.clone();
    if answers.iter().all(|a| a == &answers[0]) {
        return shuffled;
    }
    loop {
        shuffled.shuffle(rng);
        if shuffled != answers {
            return shuffled;
        }
    }
}

fn parse_output<T: DeserializeOwned>(stage: Stage, content: &str) -> Result<T, StageError> {
    let payload = extract_json_from_markdown(content);
    serde_json::from_str(&payload).map_err(|e| StageError::Schema {
        stage,
        message: e.to_string(),
    })
}

fn is_transient(err: &StageError) -> bool {
    match err {
        StageError::Timeout { .. } => true,
        StageError::External { .. } => err.provider_error().is_some_and(|e| !e.is_permanent()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::error::ProviderError;
    use crate::model::{IdentifiedConcept, Problem};
    use crate::traits::{ModelInfo, TokenUsage};

    /// Replays queued replies in order; the last one repeats.
    struct ScriptedProvider {
        replies: Mutex<VecDeque<Result<String, ProviderError>>>,
        calls: AtomicU32,
        delay: Option<Duration>,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Result<String, ProviderError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicU32::new(0),
                delay: None,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<CompletionResponse> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let reply = {
                let mut replies = self.replies.lock().unwrap();
                if replies.len() > 1 {
                    replies.pop_front().unwrap()
                } else {
                    match replies.front().unwrap() {
                        Ok(content) => Ok(content.clone()),
                        Err(e) => Err(ProviderError::NetworkError(e.to_string())),
                    }
                }
            };
            Ok(CompletionResponse {
                content: reply?,
                model: request.model.clone(),
                token_usage: TokenUsage::default(),
                latency_ms: 1,
            })
        }

        fn available_models(&self) -> Vec<ModelInfo> {
            Vec::new()
        }
    }

    fn analysis(answer_bank_present: bool) -> WorksheetAnalysis {
        WorksheetAnalysis {
            identified_concepts: vec![IdentifiedConcept {
                subject: "Grammar".into(),
                main_topic: "Pronouns".into(),
                specific_concept: "Reflexive pronouns".into(),
            }],
            identified_question_formats: vec!["fill-in-the-blank".into()],
            example_questions: vec!["She made ____ a sandwich.".into()],
            answer_bank_present,
            worksheet_directions: None,
            additional_notes_for_generation: String::new(),
        }
    }

    fn pipeline(provider: Arc<ScriptedProvider>, config: PipelineConfig) -> WorksheetPipeline {
        WorksheetPipeline::new(provider, config)
    }

    const TWO_PROBLEMS: &str = r#"{"problems": [
        {"question": "He hurt ____.", "answer": "himself"},
        {"question": "We did it ____.", "answer": "ourselves"}
    ], "answer_bank_present": false}"#;

    #[test]
    fn shuffle_never_returns_input_order_when_avoidable() {
        let mut rng = StdRng::seed_from_u64(7);
        let answers: Vec<String> = vec!["a".into(), "b".into()];
        for _ in 0..50 {
            let shuffled = shuffle_answers(answers.clone(), &mut rng);
            assert_eq!(shuffled, vec!["b".to_string(), "a".to_string()]);
        }

        let same: Vec<String> = vec!["x".into(), "x".into(), "x".into()];
        assert_eq!(shuffle_answers(same.clone(), &mut rng), same);
        assert!(shuffle_answers(Vec::new(), &mut rng).is_empty());
    }

    #[test]
    fn shuffle_is_uniform_over_non_input_orders() {
        let mut rng = StdRng::seed_from_u64(99);
        let answers: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        let mut counts: HashMap<String, u32> = HashMap::new();
        for _ in 0..60_000 {
            let shuffled = shuffle_answers(answers.clone(), &mut rng);
            *counts.entry(shuffled.concat()).or_default() += 1;
        }

        assert!(!counts.contains_key("abc"));
        assert_eq!(counts.len(), 5);
        // 12,000 expected per order
        for (order, count) in &counts {
            assert!(
                (11_000..=13_000).contains(count),
                "order {order} drawn {count} times"
            );
        }
    }

    #[test]
    fn shuffle_keeps_multiset() {
        let mut rng = StdRng::seed_from_u64(42);
        let answers: Vec<String> = ["4", "7", "4", "12", "9"].iter().map(|s| s.to_string()).collect();
        let mut shuffled = shuffle_answers(answers.clone(), &mut rng);
        assert_ne!(shuffled, answers);
        shuffled.sort();
        let mut expected = answers;
        expected.sort();
        assert_eq!(shuffled, expected);
    }

    #[test]
    fn enforce_overwrites_model_flag_and_bank() {
        let mut rng = StdRng::seed_from_u64(1);
        let generated = GeneratedProblemSet {
            problems: vec![
                Problem {
                    question: "1+1".into(),
                    answer: "2".into(),
                },
                Problem {
                    question: "2+2".into(),
                    answer: "4".into(),
                },
            ],
            answer_bank_present: false,
            answer_bank: Some(vec!["bogus".into()]),
        };

        let with_bank = enforce_answer_bank(generated.clone(), true, &mut rng);
        assert!(with_bank.answer_bank_present);
        assert_eq!(with_bank.answer_bank, Some(vec!["4".to_string(), "2".to_string()]));

        let without = enforce_answer_bank(generated, false, &mut rng);
        assert!(!without.answer_bank_present);
        assert!(without.answer_bank.is_none());
    }

    #[test]
    fn customized_analysis_requires_prompt() {
        let base = analysis(false);
        assert!(matches!(
            customized_analysis(&base, "  \n"),
            Err(StageError::MissingPrompt)
        ));
        let custom = customized_analysis(&base, " harder ").unwrap();
        assert_eq!(custom.additional_notes_for_generation, " harder ");
        assert_eq!(base.additional_notes_for_generation, "");
    }

    #[tokio::test]
    async fn generate_sends_analysis_in_prompt() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(TWO_PROBLEMS.into())]));
        let pipeline = pipeline(Arc::clone(&provider), PipelineConfig::default());

        let set = pipeline.generate(&analysis(true), Some(2), None).await.unwrap();
        assert_eq!(set.problems.len(), 2);
        assert!(set.answer_bank_present);
        assert_eq!(set.answer_bank.as_ref().map(Vec::len), Some(2));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn zero_count_is_rejected_before_llm_call() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(TWO_PROBLEMS.into())]));
        let pipeline = pipeline(Arc::clone(&provider), PipelineConfig::default());

        let err = pipeline.generate(&analysis(false), Some(0), None).await.unwrap_err();
        assert!(matches!(err, StageError::InvalidInput(_)));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn schema_failure_is_fatal() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(
            r#"{"questions": ["no answers here"]}"#.into(),
        )]));
        let pipeline = pipeline(Arc::clone(&provider), PipelineConfig::default());

        let err = pipeline.generate(&analysis(false), None, None).await.unwrap_err();
        assert!(matches!(err, StageError::Schema { stage: Stage::Generate, .. }));
        assert!(err.to_string().contains("missing field `problems`"));
    }

    #[tokio::test]
    async fn analysis_schema_violation_is_fatal() {
        let too_many: Vec<String> = (0..101).map(|i| format!("{i}+1=?")).collect();
        let reply = serde_json::json!({
            "identified_concepts": [],
            "identified_question_formats": [],
            "example_questions": too_many,
            "answer_bank_present": false
        });
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(reply.to_string())]));
        let pipeline = pipeline(provider, PipelineConfig::default());

        let err = pipeline
            .analyze("data:image/png;base64,AAAA", false)
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Schema { stage: Stage::Analyze, .. }));
    }

    #[tokio::test]
    async fn no_retry_by_default() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderError::NetworkError("connection reset".into())),
            Ok(TWO_PROBLEMS.into()),
        ]));
        let pipeline = pipeline(Arc::clone(&provider), PipelineConfig::default());

        let err = pipeline.generate(&analysis(false), None, None).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "problem generation failed: network error: connection reset"
        );
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_when_enabled() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderError::RateLimited { retry_after_ms: 10 }),
            Ok(TWO_PROBLEMS.into()),
        ]));
        let config = PipelineConfig {
            max_retries: 2,
            ..PipelineConfig::default()
        };
        let pipeline = pipeline(Arc::clone(&provider), config);

        let set = pipeline.generate(&analysis(false), Some(2), None).await.unwrap();
        assert_eq!(set.problems.len(), 2);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderError::AuthenticationFailed("bad key".into())),
            Ok(TWO_PROBLEMS.into()),
        ]));
        let config = PipelineConfig {
            max_retries: 3,
            ..PipelineConfig::default()
        };
        let pipeline = pipeline(Arc::clone(&provider), config);

        let err = pipeline.generate(&analysis(false), None, None).await.unwrap_err();
        assert!(err.to_string().contains("authentication failed"));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out() {
        let mut provider = ScriptedProvider::new(vec![Ok(TWO_PROBLEMS.into())]);
        provider.delay = Some(Duration::from_secs(120));
        let provider = Arc::new(provider);
        let config = PipelineConfig {
            timeout: Duration::from_secs(30),
            ..PipelineConfig::default()
        };
        let pipeline = pipeline(Arc::clone(&provider), config);

        let err = pipeline.generate(&analysis(false), None, None).await.unwrap_err();
        assert!(matches!(
            err,
            StageError::Timeout {
                stage: Stage::Generate,
                limit
            } if limit == Duration::from_secs(30)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn sub_second_timeout_is_reported_in_millis() {
        let mut provider = ScriptedProvider::new(vec![Ok(TWO_PROBLEMS.into())]);
        provider.delay = Some(Duration::from_secs(5));
        let config = PipelineConfig {
            timeout: Duration::from_millis(250),
            ..PipelineConfig::default()
        };
        let pipeline = pipeline(Arc::new(provider), config);

        let err = pipeline.generate(&analysis(false), None, None).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "problem generation failed: timed out after 250ms"
        );
    }

    #[tokio::test]
    async fn analyze_discards_notes_sent_by_the_model() {
        let reply = serde_json::json!({
            "identified_concepts": [{
                "subject": "Grammar",
                "main_topic": "Pronouns",
                "specific_concept": "Reflexive pronouns"
            }],
            "identified_question_formats": ["fill-in-the-blank"],
            "example_questions": ["She made ____ a sandwich."],
            "answer_bank_present": true,
            "additional_notes_for_generation": "leftover"
        });
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(reply.to_string())]));
        let pipeline = pipeline(provider, PipelineConfig::default());

        let analysis = pipeline
            .analyze("data:image/png;base64,AAAA", false)
            .await
            .unwrap();
        assert_eq!(analysis.additional_notes_for_generation, "");
    }
}

//! Language-model structuring: normalized text in, raw model response out.
//!
//! The model sits behind [`CompletionModel`] so the pipeline can run against
//! any [`edgequake_llm::LLMProvider`] (through [`ProviderModel`]) or a test
//! double. All prompt wording lives in [`crate::prompts`].
//!
//! ## Call policy
//!
//! Each attempt is bounded by a timeout. Failed and timed-out attempts are
//! retried with exponential backoff (`backoff * 2^(retry-1)`): with 500 ms
//! and two retries the waits are 500 ms then 1 s. When every attempt fails
//! the error reports how the last one ended, so a provider that hangs
//! surfaces as [`PipelineError::ModelTimeout`] rather than a generic call
//! failure.

use crate::config::{ExtractionConfig, DEFAULT_MODEL};
use crate::error::{ModelError, PipelineError};
use crate::pipeline::normalize::normalize;
use crate::prompts::system_prompt;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// A single chat completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_text: String,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// Anything that can answer a [`CompletionRequest`] with text.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Label used in logs.
    fn label(&self) -> String;

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ModelError>;
}

/// [`CompletionModel`] backed by an edgequake-llm provider.
pub struct ProviderModel {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl ProviderModel {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }

    /// Resolve a provider from the configuration and wrap it.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, PipelineError> {
        let provider = resolve_provider(config)?;
        let label = match (&config.provider_name, &config.model) {
            (Some(name), Some(model)) => format!("{name}/{model}"),
            (Some(name), None) => name.clone(),
            (None, Some(model)) => model.clone(),
            (None, None) => "auto".to_string(),
        };
        Ok(Self::new(provider, label))
    }
}

#[async_trait]
impl CompletionModel for ProviderModel {
    fn label(&self) -> String {
        self.label.clone()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ModelError> {
        let messages = vec![
            ChatMessage::system(request.system_prompt.as_str()),
            ChatMessage::user(request.user_text.as_str()),
        ];
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };
        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| ModelError(e.to_string()))?;
        debug!(
            "{}: {} input tokens, {} output tokens",
            self.label, response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

/// Timeout and retry policy around each model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
}

impl CallPolicy {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.api_timeout_secs),
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

enum AttemptFailure {
    Error(String),
    TimedOut,
}

/// Turns extracted text into the model's raw JSON response.
pub struct Structurer {
    model: Arc<dyn CompletionModel>,
    system_prompt: String,
    temperature: f32,
    max_tokens: usize,
    min_chars: usize,
    policy: CallPolicy,
}

impl Structurer {
    pub fn new(model: Arc<dyn CompletionModel>, config: &ExtractionConfig) -> Self {
        Self {
            model,
            system_prompt: config.system_prompt.clone().unwrap_or_else(system_prompt),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            min_chars: config.structuring_min_chars,
            policy: CallPolicy::from_config(config),
        }
    }

    pub fn with_policy(mut self, policy: CallPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Build the request for `text`, or fail if it is too short to be worth
    /// a model call.
    pub fn request_for(&self, text: &str) -> Result<CompletionRequest, PipelineError> {
        let text = normalize(text);
        let chars = text.chars().count();
        if chars < self.min_chars {
            return Err(PipelineError::InputTooShort {
                chars,
                min: self.min_chars,
            });
        }
        Ok(CompletionRequest {
            system_prompt: self.system_prompt.clone(),
            user_text: text,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        })
    }

    /// Send `text` to the model and return its response unmodified.
    pub async fn structure(&self, text: &str) -> Result<String, PipelineError> {
        let request = self.request_for(text)?;
        let start = Instant::now();
        let policy = self.policy;
        let mut last: Option<AttemptFailure> = None;

        for attempt in 0..=policy.max_retries {
            if attempt > 0 {
                let backoff = policy.backoff * 2u32.pow(attempt - 1);
                warn!(
                    "{}: retry {}/{} after {:?}",
                    self.model.label(),
                    attempt,
                    policy.max_retries,
                    backoff
                );
                sleep(backoff).await;
            }

            match timeout(policy.timeout, self.model.complete(&request)).await {
                Ok(Ok(content)) => {
                    info!(
                        "{}: structured {} chars → {} chars in {:?}",
                        self.model.label(),
                        request.user_text.chars().count(),
                        content.len(),
                        start.elapsed()
                    );
                    return Ok(content);
                }
                Ok(Err(e)) => {
                    warn!("{}: attempt {} failed: {}", self.model.label(), attempt + 1, e);
                    last = Some(AttemptFailure::Error(e.0));
                }
                Err(_) => {
                    warn!(
                        "{}: attempt {} timed out after {:?}",
                        self.model.label(),
                        attempt + 1,
                        policy.timeout
                    );
                    last = Some(AttemptFailure::TimedOut);
                }
            }
        }

        let attempts = policy.max_retries + 1;
        Err(match last {
            Some(AttemptFailure::TimedOut) => PipelineError::ModelTimeout {
                attempts,
                secs: policy.timeout.as_secs(),
            },
            Some(AttemptFailure::Error(detail)) => PipelineError::ModelCall { attempts, detail },
            None => PipelineError::ModelCall {
                attempts,
                detail: "Unknown error".to_string(),
            },
        })
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, PipelineError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        PipelineError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`), through
///    [`ProviderFactory::create_llm_provider`], which reads the matching API
///    key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`),
///    honoured before auto-detection so the model choice sticks even when
///    several API keys are present.
/// 4. **OpenAI key present**: OpenAI with the configured or default model.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, PipelineError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| PipelineError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    enum Step {
        Reply(&'static str),
        Fail(&'static str),
        Hang,
    }

    struct Scripted {
        steps: Mutex<VecDeque<Step>>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl Scripted {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CompletionModel for Scripted {
        fn label(&self) -> String {
            "scripted".into()
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<String, ModelError> {
            self.seen.lock().unwrap().push(request.clone());
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Reply(s)) => Ok(s.to_string()),
                Some(Step::Fail(s)) => Err(ModelError(s.to_string())),
                Some(Step::Hang) => {
                    sleep(Duration::from_secs(30)).await;
                    Ok("too late".into())
                }
                None => Err(ModelError("script exhausted".into())),
            }
        }
    }

    fn fast_policy(max_retries: u32) -> CallPolicy {
        CallPolicy {
            timeout: Duration::from_millis(50),
            max_retries,
            backoff: Duration::from_millis(1),
        }
    }

    fn structurer(model: Arc<Scripted>, retries: u32) -> Structurer {
        Structurer::new(model, &ExtractionConfig::default()).with_policy(fast_policy(retries))
    }

    const TEXT: &str = "=== Page 1 ===\n[Text]\nPaper cups 200 pcs   18.00";

    #[tokio::test]
    async fn short_input_never_calls_model() {
        let model = Scripted::new(vec![Step::Reply("{}")]);
        let err = structurer(model.clone(), 0)
            .structure("  tiny \n ")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::InputTooShort);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn request_uses_fixed_parameters() {
        let model = Scripted::new(vec![Step::Reply("{\"ok\":true}")]);
        let out = structurer(model.clone(), 0).structure(TEXT).await.unwrap();
        assert_eq!(out, "{\"ok\":true}");

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[0].temperature, 0.0);
        assert_eq!(seen[0].max_tokens, 4000);
        assert!(seen[0].system_prompt.contains("Pantry expenses"));
        assert_eq!(seen[0].user_text, "=== Page 1 ===\n[Text]\nPaper cups 200 pcs 18.00");
    }

    #[tokio::test]
    async fn response_returned_unmodified() {
        let model = Scripted::new(vec![Step::Reply("not json at all")]);
        let out = structurer(model, 0).structure(TEXT).await.unwrap();
        assert_eq!(out, "not json at all");
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let model = Scripted::new(vec![Step::Fail("503"), Step::Reply("{}")]);
        let out = structurer(model.clone(), 2).structure(TEXT).await.unwrap();
        assert_eq!(out, "{}");
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_report_last_error() {
        let model = Scripted::new(vec![Step::Fail("503"), Step::Fail("rate limited")]);
        let err = structurer(model.clone(), 1).structure(TEXT).await.unwrap_err();
        match err {
            PipelineError::ModelCall { attempts, detail } => {
                assert_eq!(attempts, 2);
                assert_eq!(detail, "rate limited");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn hanging_model_times_out() {
        let model = Scripted::new(vec![Step::Hang, Step::Hang]);
        let err = structurer(model.clone(), 1).structure(TEXT).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::ModelTimeout);
        assert_eq!(model.calls(), 2);
    }

    #[test]
    fn custom_prompt_overrides_default() {
        let config = ExtractionConfig::builder()
            .system_prompt("Return {}")
            .build()
            .unwrap();
        let s = Structurer::new(Scripted::new(vec![]), &config);
        assert_eq!(s.request_for(TEXT).unwrap().system_prompt, "Return {}");
    }

    #[test]
    fn policy_from_config() {
        let config = ExtractionConfig::builder()
            .api_timeout_secs(7)
            .max_retries(4)
            .retry_backoff_ms(250)
            .build()
            .unwrap();
        let p = CallPolicy::from_config(&config);
        assert_eq!(p.timeout, Duration::from_secs(7));
        assert_eq!(p.max_retries, 4);
        assert_eq!(p.backoff, Duration::from_millis(250));
    }
}

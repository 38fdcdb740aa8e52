//! Question and advice generation backed by the completion service.
//!
//! Both generators report failures as `LlmError`; the flow controller turns
//! those into fallback content so a consultation never dies on a network
//! error.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::ConsultConfig;
use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider};

use super::model::{QuestionAnswer, Specialty};
use super::prompts::{ADVICE_SYSTEM_PROMPT, QUESTION_SYSTEM_PROMPT, build_question_prompt};

/// Prefix of the report text stored when advice generation fails.
pub const ADVICE_ERROR_MARKER: &str = "API Error";

/// Produces one short follow-up question.
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    /// `question_number` is 1-based.
    async fn generate(
        &self,
        specialty: &Specialty,
        problem: &str,
        prior: &[QuestionAnswer],
        question_number: usize,
    ) -> Result<String, LlmError>;
}

/// Produces the section-structured advice report for a built prompt.
#[async_trait]
pub trait AdviceGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Deterministic question used when generation fails.
pub fn fallback_question(problem: &str) -> String {
    format!("Can you tell me more about your {}?", problem.trim().to_lowercase())
}

/// Report text cached when advice generation fails.
pub fn error_report(error: &LlmError) -> String {
    format!("{ADVICE_ERROR_MARKER}: {error}")
}

/// Leading list marker such as `1.`, `2)` or `-`.
static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\d+[.)]|[-*•])\s+").unwrap());

/// Run a completion with the configured timeout.
async fn complete_with_timeout(
    llm: &dyn LlmProvider,
    request: CompletionRequest,
    timeout: std::time::Duration,
) -> Result<CompletionResponse, LlmError> {
    match tokio::time::timeout(timeout, llm.complete(request)).await {
        Ok(result) => result,
        Err(_) => Err(LlmError::Timeout {
            provider: llm.model_name().to_string(),
            timeout,
        }),
    }
}

/// Clean a raw model reply into a single question line.
///
/// Keeps the first non-empty line, strips list markers and surrounding
/// quotes, and makes sure it ends with `?`. Returns `None` if nothing usable
/// is left.
pub fn clean_question(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = LIST_MARKER.replace(line, "");
    let line = line.trim();
    let line = line
        .strip_prefix("Question:")
        .map(str::trim)
        .unwrap_or(line);
    let line = line.trim_matches(|c| matches!(c, '"' | '\'' | '“' | '”')).trim();
    if line.is_empty() {
        return None;
    }
    if line.ends_with('?') {
        Some(line.to_string())
    } else {
        Some(format!("{}?", line.trim_end_matches(['.', '!'])))
    }
}

/// Follow-up questions from the completion service.
pub struct LlmQuestionGenerator {
    llm: Arc<dyn LlmProvider>,
    config: ConsultConfig,
}

impl LlmQuestionGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, config: ConsultConfig) -> Self {
        Self { llm, config }
    }
}

#[async_trait]
impl QuestionGenerator for LlmQuestionGenerator {
    async fn generate(
        &self,
        specialty: &Specialty,
        problem: &str,
        prior: &[QuestionAnswer],
        question_number: usize,
    ) -> Result<String, LlmError> {
        let prompt = build_question_prompt(specialty, problem, prior, question_number);
        let request = CompletionRequest::new(vec![
            ChatMessage::system(QUESTION_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ])
        .with_temperature(self.config.question_temperature)
        .with_max_tokens(self.config.question_max_tokens);

        let response =
            complete_with_timeout(self.llm.as_ref(), request, self.config.request_timeout).await?;
        debug!(
            question_number,
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            raw = %response.content,
            "Follow-up question generated"
        );

        clean_question(&response.content).ok_or_else(|| LlmError::InvalidResponse {
            provider: self.llm.model_name().to_string(),
            reason: "empty follow-up question".to_string(),
        })
    }
}

/// Advice reports from the completion service.
pub struct LlmAdviceGenerator {
    llm: Arc<dyn LlmProvider>,
    config: ConsultConfig,
}

impl LlmAdviceGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, config: ConsultConfig) -> Self {
        Self { llm, config }
    }
}

#[async_trait]
impl AdviceGenerator for LlmAdviceGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(ADVICE_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ])
        .with_temperature(self.config.advice_temperature)
        .with_max_tokens(self.config.advice_max_tokens);

        let response =
            complete_with_timeout(self.llm.as_ref(), request, self.config.request_timeout).await?;
        let truncated = response.finish_reason == FinishReason::Length;
        info!(
            chars = response.content.len(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            response_id = response.response_id.as_deref().unwrap_or("-"),
            "Advice report generated"
        );

        if response.content.trim().is_empty() {
            let reason = if truncated {
                "report truncated (finish_reason=length) with no content"
            } else {
                "empty report"
            };
            return Err(LlmError::InvalidResponse {
                provider: self.llm.model_name().to_string(),
                reason: reason.to_string(),
            });
        }
        if truncated {
            warn!(
                max_tokens = self.config.advice_max_tokens,
                "Advice report hit the token limit and may be cut off"
            );
        }
        Ok(response.content)
    }
}

//! Answering pipeline - turns retrieved context into an answer
//!
//! Each call is stateless with respect to the provider: the prompt holds
//! only the retrieved context and the current question, never prior turns.

use crate::completion::{ChatMessage, Completer, CompletionRequest};
use crate::errors::{AppError, Result};
use crate::metrics;
use std::sync::Arc;
use std::time::Instant;

/// Sampling temperature for every answer
pub const ANSWER_TEMPERATURE: f32 = 0.7;

/// Output token ceiling for every answer
pub const ANSWER_MAX_TOKENS: u32 = 1024;

/// Assemble the single user prompt sent to the provider
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "You are an NPD assistant. Based on the document context below, answer the user's \
         question clearly and suggest a follow-up question.\n\n\
         Document context:\n\
         {context}\n\n\
         User question:\n\
         {question}\n"
    )
}

/// Wraps a [`Completer`] with the fixed answering parameters
#[derive(Clone)]
pub struct AnsweringPipeline {
    completer: Arc<dyn Completer>,
    model: String,
}

impl AnsweringPipeline {
    pub fn new(completer: Arc<dyn Completer>, model: impl Into<String>) -> Self {
        Self {
            completer,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Request the provider payload for a question and its context
    pub fn request_for(&self, question: &str, context: &str) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user(build_prompt(context, question))],
            temperature: ANSWER_TEMPERATURE,
            max_tokens: ANSWER_MAX_TOKENS,
        }
    }

    /// Answer `question` from `context`. Failures are not retried.
    pub async fn answer(&self, question: &str, context: &str) -> Result<String> {
        let request = self.request_for(question, context);
        let start = Instant::now();

        let result = self.completer.complete(request).await;
        let elapsed = start.elapsed().as_secs_f64();

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                metrics::record_completion(elapsed, &self.model, false);
                tracing::error!(error = %e, model = %self.model, "Completion failed");
                return Err(match e {
                    AppError::Answer { .. } => e,
                    other => AppError::answer(other.to_string()),
                });
            }
        };

        metrics::record_completion(elapsed, &self.model, true);

        response
            .first_text()
            .map(str::to_string)
            .ok_or_else(|| AppError::answer("empty response from completion provider"))
    }
}

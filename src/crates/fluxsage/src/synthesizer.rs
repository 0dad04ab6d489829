//! Query synthesis: natural language in, candidate Flux text out.

use crate::error::{PipelineError, Result};
use crate::prompts;
use crate::schema::SchemaReference;
use llm::{ChatModel, ChatRequest, Message};
use std::sync::Arc;
use tracing::debug;

/// Chat history for one request; grows by two turns per correction.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// Append the rejected query and the error that rejected it.
    pub fn push_correction(&mut self, failed_query: &str, error: &str) {
        self.messages.push(Message::assistant(failed_query));
        self.messages
            .push(Message::human(prompts::correction_prompt(failed_query, error)));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }
}

/// What the model answered with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    /// Flux text to validate.
    Query(String),
    /// The model declined; carries the full `ERROR: ...` text.
    Unsupported(String),
}

/// Builds schema-constrained prompts and asks the model for a query.
///
/// Does not validate the result.
#[derive(Clone)]
pub struct QuerySynthesizer {
    model: Arc<dyn ChatModel>,
    schema: Arc<SchemaReference>,
    temperature: f32,
}

impl QuerySynthesizer {
    pub fn new(model: Arc<dyn ChatModel>, schema: Arc<SchemaReference>) -> Self {
        Self {
            model,
            schema,
            temperature: 0.0,
        }
    }

    /// Open a conversation for a request.
    pub fn start(&self, user_query: &str, execution_number: Option<&str>) -> Conversation {
        Conversation {
            messages: vec![
                Message::system(prompts::query_system_prompt(&self.schema)),
                Message::human(prompts::query_user_prompt(user_query, execution_number)),
            ],
        }
    }

    /// One model call for the conversation so far.
    pub async fn synthesize(&self, conversation: &Conversation) -> Result<Candidate> {
        let request = ChatRequest::new(conversation.messages.clone())
            .with_temperature(self.temperature);

        let response = self
            .model
            .chat(request)
            .await
            .map_err(|e| {
                if e.is_auth_error() {
                    PipelineError::Config(format!("model rejected credentials: {e}"))
                } else {
                    PipelineError::Synthesis(e.to_string())
                }
            })?;

        let query = clean_query(response.text());
        debug!(model = %self.model.model_name(), query_len = query.len(), "Model returned candidate");

        if query.is_empty() {
            return Err(PipelineError::Synthesis(
                "model returned an empty query".to_string(),
            ));
        }
        if query.starts_with(prompts::UNSUPPORTED_PREFIX) {
            return Ok(Candidate::Unsupported(query));
        }
        Ok(Candidate::Query(query))
    }
}

/// Strip markdown fences and surrounding whitespace from a completion.
pub fn clean_query(raw: &str) -> String {
    raw.trim()
        .replace("```flux", "")
        .replace("```", "")
        .trim()
        .to_string()
}

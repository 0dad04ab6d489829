//! The provider-agnostic chat model seam.
//!
//! Everything downstream talks to a model through [`ChatModel`], so a
//! deterministic double can stand in for a real provider in tests.
//!
//! ```rust,ignore
//! use llm::{ChatModel, ChatRequest, ChatResponse, Result};
//! use async_trait::async_trait;
//!
//! struct Canned(String);
//!
//! #[async_trait]
//! impl ChatModel for Canned {
//!     async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse> {
//!         Ok(ChatResponse::from_text(self.0.clone()))
//!     }
//!
//!     fn model_name(&self) -> &str {
//!         "canned"
//!     }
//! }
//! ```

use crate::error::Result;
use crate::types::{ChatRequest, ChatResponse};
use async_trait::async_trait;

/// Core trait for chat-based language models.
///
/// Implementations convert messages to the provider's wire format, make
/// exactly one HTTP call per `chat` invocation, and map provider failures
/// (timeouts, rate limits, malformed bodies) into [`crate::LlmError`].
/// Retrying is the caller's decision.
///
/// Implementations must be `Send + Sync`; share them as `Arc<dyn ChatModel>`.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate a complete chat response from messages.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;

    /// Check if the model/provider is reachable.
    ///
    /// Default implementation returns `Ok(true)`, assuming availability.
    async fn is_available(&self) -> Result<bool> {
        Ok(true)
    }

    /// Identifier of the model answering requests.
    fn model_name(&self) -> &str;
}

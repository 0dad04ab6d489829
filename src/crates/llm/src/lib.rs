//! LLM provider implementations for fluxsage.
//!
//! This crate defines the [`ChatModel`] seam and concrete clients for a local
//! and a remote provider. Callers hold an `Arc<dyn ChatModel>` and never see
//! provider wire formats.
//!
//! # Local Providers
//!
//! - **Ollama** - local LLM runner
//!
//! # Remote Providers
//!
//! - **OpenAI** - OpenAI chat completions and compatible gateways
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use llm::remote::OpenAiClient;
//! use llm::config::RemoteLlmConfig;
//! use llm::{ChatModel, ChatRequest, Message};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RemoteLlmConfig::from_env(
//!         "OPENAI_API_KEY",
//!         "https://api.openai.com/v1",
//!         "gpt-4o-mini"
//!     )?;
//!     let client = OpenAiClient::new(config);
//!
//!     let request = ChatRequest::new(vec![
//!         Message::human("Explain Flux pivots briefly")
//!     ]).with_temperature(0.0);
//!
//!     let response = client.chat(request).await?;
//!     println!("Response: {}", response.text());
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

#[cfg(feature = "local")]
pub mod local;

#[cfg(feature = "remote")]
pub mod remote;

// Re-export commonly used types
pub use config::{LocalLlmConfig, RemoteLlmConfig};
pub use error::{LlmError, Result};
pub use traits::ChatModel;
pub use types::{ChatConfig, ChatRequest, ChatResponse, Message, MessageRole, UsageMetadata};

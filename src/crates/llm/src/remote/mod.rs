//! Remote LLM provider implementations.
//!
//! Cloud-hosted chat completion APIs. These providers require an API key.
//!
//! # Providers
//!
//! - **OpenAI** - OpenAI chat completion models (GPT-4o, GPT-4o mini, o1)
//!   and any endpoint speaking the same `/chat/completions` dialect

pub mod openai;

pub use openai::OpenAiClient;

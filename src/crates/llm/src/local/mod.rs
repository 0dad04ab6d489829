//! Local LLM provider implementations.
//!
//! Providers running on localhost or the local network. No API key is
//! needed and prompts never leave the machine.
//!
//! # Providers
//!
//! - **Ollama** - local LLM runner with wide model support

pub mod ollama;

pub use ollama::OllamaClient;

//! Model provider seam
//!
//! The dialogue engine talks to the external language model through the
//! `ChatProvider` trait: a prompt goes in, free-form text comes out. The
//! production implementation calls an OpenAI-compatible API; the mock is
//! scripted for tests.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

pub mod mock;
pub mod openai;

pub use mock::MockProvider;
pub use openai::OpenAiProvider;

/// A single completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// The full prompt, sent as one user message
    pub prompt: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Completion token cap
    pub max_tokens: u32,
}

/// The external language model: prompt in, unstructured text out.
///
/// Implementations own their transport concerns (timeouts included) and
/// surface every failure as `Error::Provider`; no transport error type
/// crosses this boundary.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &'static str;

    /// Run one completion and return the raw text output.
    async fn complete(&self, request: ChatRequest) -> Result<String>;
}

/// Type alias for a shared provider reference
pub type SharedProvider = Arc<dyn ChatProvider>;

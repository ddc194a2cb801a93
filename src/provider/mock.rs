//! Mock provider for testing
//!
//! Serves scripted replies in order and records the prompts it received, so
//! tests can assert both on dialogue behavior and on prompt construction.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Error, Result};

use super::{ChatProvider, ChatRequest};

/// Scripted ChatProvider implementation.
#[derive(Default)]
pub struct MockProvider {
    replies: Mutex<Vec<ScriptedReply>>,
    prompts: Mutex<Vec<String>>,
}

enum ScriptedReply {
    Text(String),
    Failure(String),
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful raw-text reply.
    pub fn push_reply(&self, text: impl Into<String>) {
        self.replies
            .lock()
            .push(ScriptedReply::Text(text.into()));
    }

    /// Queue a transport failure.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.replies
            .lock()
            .push(ScriptedReply::Failure(message.into()));
    }

    /// Prompts received so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn complete(&self, request: ChatRequest) -> Result<String> {
        self.prompts.lock().push(request.prompt);

        let next = {
            let mut replies = self.replies.lock();
            if replies.is_empty() {
                None
            } else {
                Some(replies.remove(0))
            }
        };

        match next {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Failure(message)) => Err(Error::Provider(message)),
            None => Err(Error::Provider("Mock has no scripted reply".to_string())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

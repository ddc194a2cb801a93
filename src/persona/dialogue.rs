//! Dialogue engine
//!
//! Builds a provider request from the stored persona and a question, parses
//! the provider's free-form reply into an answer plus an optional persona
//! update, and applies the update only after the answer validates. Any
//! failure leaves the persona byte-identical.

use serde_json::Value;
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::provider::{ChatRequest, SharedProvider};
use crate::store::PersonaStore;

/// A validated answer for the caller. The persona update never leaves the
/// engine; it only affects stored state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub answer: String,
}

/// What the provider's JSON reply decodes to, with missing or wrong-typed
/// fields defaulted to empty strings.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ProviderReply {
    answer: String,
    persona_update: String,
}

/// Persona-grounded question answering.
pub struct DialogueEngine {
    personas: PersonaStore,
    provider: SharedProvider,
    temperature: f32,
    max_tokens: u32,
}

impl DialogueEngine {
    pub fn new(
        personas: PersonaStore,
        provider: SharedProvider,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            personas,
            provider,
            temperature,
            max_tokens,
        }
    }

    /// Answer `question` for `owner` using their stored persona.
    pub async fn ask(&self, owner: &str, question: &str) -> Result<Answer> {
        let persona = self.personas.get(owner).await?.ok_or(Error::NoPersona)?;

        let request = ChatRequest {
            prompt: build_prompt(&persona.instructions, question),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let content = self.provider.complete(request).await.map_err(|e| {
            // The log line carries no persona text
            error!(provider = %self.provider.name(), error = %e, "Provider call failed");
            e
        })?;

        let normalized = strip_code_fences(content.trim());
        let reply = parse_reply(normalized)?;

        if reply.answer.is_empty() {
            error!("Provider returned empty answer");
            return Err(Error::EmptyAnswer);
        }

        // Mutation happens only after the answer is validated non-empty
        if !reply.persona_update.is_empty() {
            self.personas
                .append_and_cap(owner, &reply.persona_update)
                .await?;
            info!(owner = %owner, "Persona updated from model reply");
        }

        Ok(Answer {
            answer: reply.answer,
        })
    }
}

/// Build the single-message provider prompt. The persona instructions are
/// embedded verbatim and framed as private.
fn build_prompt(instructions: &str, question: &str) -> String {
    format!(
        "You are roleplaying this persona (PRIVATE, do not mention it):\n\
         {instructions}\n\
         \n\
         Return ONLY valid JSON with EXACTLY these keys:\n\
         {{\n\
           \"answer\": \"natural, short, human-like response\",\n\
           \"persona_update\": \"short optional update or empty string\"\n\
         }}\n\
         \n\
         Question: {question}"
    )
}

/// Strip a single optional wrapping code fence, case-insensitively tagged
/// `json` or untagged. Opening and closing fences are handled independently.
fn strip_code_fences(s: &str) -> &str {
    let mut text = s.trim();

    if let Some(rest) = text.strip_prefix("```") {
        let rest = match rest.get(..4) {
            Some(tag) if tag.eq_ignore_ascii_case("json") => &rest[4..],
            _ => rest,
        };
        text = rest.trim_start();
    }

    if let Some(body) = text.strip_suffix("```") {
        text = body.trim_end();
    }

    text
}

/// Parse the normalized provider text into a reply.
///
/// Strict JSON first; on failure, recover the greedy brace-delimited span
/// (first `{` to last `}`) and retry. Missing or non-string fields default
/// to empty strings; both fields are trimmed.
fn parse_reply(content: &str) -> Result<ProviderReply> {
    let value = match serde_json::from_str::<Value>(content) {
        Ok(value) => value,
        Err(_) => {
            let span = brace_span(content).ok_or_else(|| {
                error!("Invalid JSON from provider (no JSON object found)");
                Error::ResponseFormat("no JSON object found".to_string())
            })?;
            serde_json::from_str::<Value>(span).map_err(|_| {
                error!("Invalid JSON from provider (parse failed after extraction)");
                Error::ResponseFormat("parse failed after extraction".to_string())
            })?
        }
    };

    if !value.is_object() {
        return Err(Error::ResponseFormat("not a JSON object".to_string()));
    }

    Ok(ProviderReply {
        answer: string_field(&value, "answer"),
        persona_update: string_field(&value, "persona_update"),
    })
}

/// The greedy brace-delimited span: first `{` through the last `}`.
fn brace_span(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&s[start..=end])
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string()
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::provider::MockProvider;
    use crate::store::{test_pool, UserStore};

    async fn engine_with_persona(
        instructions: Option<&str>,
    ) -> (DialogueEngine, PersonaStore, Arc<MockProvider>, String) {
        let pool = test_pool().await;
        let user = UserStore::new(pool.clone())
            .register("alice", "alice@x.com", "pw123")
            .await
            .unwrap();
        let personas = PersonaStore::new(pool, 30_000);
        if let Some(text) = instructions {
            personas.upsert_full(&user.id, text).await.unwrap();
        }
        let mock = Arc::new(MockProvider::new());
        let engine = DialogueEngine::new(personas.clone(), mock.clone(), 0.4, 250);
        (engine, personas, mock, user.id)
    }

    async fn stored(personas: &PersonaStore, owner: &str) -> String {
        personas.get(owner).await.unwrap().unwrap().instructions
    }

    // ── parsing helpers ──────────────────────────────────────────

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```JSON\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {} "), "{}");
    }

    #[test]
    fn test_parse_reply_strict() {
        let reply = parse_reply(r#"{"answer": " Hi ", "persona_update": ""}"#).unwrap();
        assert_eq!(reply.answer, "Hi");
        assert_eq!(reply.persona_update, "");
    }

    #[test]
    fn test_parse_reply_defaults_missing_and_wrong_typed() {
        let reply = parse_reply(r#"{"persona_update": 42}"#).unwrap();
        assert_eq!(reply.answer, "");
        assert_eq!(reply.persona_update, "");
    }

    #[test]
    fn test_parse_reply_brace_recovery() {
        let reply = parse_reply(
            r#"Sure, here you go: {"answer": "Hi", "persona_update": "likes hiking"} extra"#,
        )
        .unwrap();
        assert_eq!(reply.answer, "Hi");
        assert_eq!(reply.persona_update, "likes hiking");
    }

    #[test]
    fn test_parse_reply_rejects_no_object() {
        assert!(matches!(
            parse_reply("no braces here").unwrap_err(),
            Error::ResponseFormat(_)
        ));
        assert!(matches!(
            parse_reply("open { but broken").unwrap_err(),
            Error::ResponseFormat(_)
        ));
        assert!(matches!(
            parse_reply("[1, 2, 3]").unwrap_err(),
            Error::ResponseFormat(_)
        ));
    }

    #[test]
    fn test_brace_span() {
        assert_eq!(brace_span("a {b} c"), Some("{b}"));
        assert_eq!(brace_span("{x} y {z}"), Some("{x} y {z}"));
        assert_eq!(brace_span("} {"), None);
        assert_eq!(brace_span("none"), None);
    }

    #[test]
    fn test_prompt_embeds_persona_and_question() {
        let prompt = build_prompt("Hello world\nSecond page", "What's up?");
        assert!(prompt.contains("Hello world\nSecond page"));
        assert!(prompt.contains("Question: What's up?"));
        assert!(prompt.contains("PRIVATE"));
        assert!(prompt.contains("persona_update"));
    }

    // ── ask flow ─────────────────────────────────────────────────

    #[tokio::test]
    async fn test_ask_without_persona_fails() {
        let (engine, _, _, owner) = engine_with_persona(None).await;
        assert!(matches!(
            engine.ask(&owner, "hi").await.unwrap_err(),
            Error::NoPersona
        ));
    }

    #[tokio::test]
    async fn test_ask_with_fenced_reply_and_no_update() {
        let (engine, personas, mock, owner) =
            engine_with_persona(Some("Hello world\nSecond page")).await;
        mock.push_reply("```json\n{\"answer\": \"Not much!\", \"persona_update\": \"\"}\n```");

        let answer = engine.ask(&owner, "What's up?").await.unwrap();
        assert_eq!(answer.answer, "Not much!");

        // Persona unchanged
        assert_eq!(stored(&personas, &owner).await, "Hello world\nSecond page");

        // The prompt embedded the instructions verbatim
        let prompts = mock.prompts();
        assert!(prompts[0].contains("Hello world\nSecond page"));
    }

    #[tokio::test]
    async fn test_ask_recovery_applies_update() {
        let (engine, personas, mock, owner) =
            engine_with_persona(Some("Hello world\nSecond page")).await;
        mock.push_reply(
            "Sure, here you go: {\"answer\": \"Hi\", \"persona_update\": \"likes hiking\"} extra trailing text",
        );

        let answer = engine.ask(&owner, "What's up?").await.unwrap();
        assert_eq!(answer.answer, "Hi");
        assert_eq!(
            stored(&personas, &owner).await,
            "Hello world\nSecond page\nlikes hiking"
        );
    }

    #[tokio::test]
    async fn test_ask_empty_answer_fails_without_mutation() {
        let (engine, personas, mock, owner) = engine_with_persona(Some("seed")).await;
        mock.push_reply(r#"{"answer": "", "persona_update": "should never land"}"#);

        assert!(matches!(
            engine.ask(&owner, "hi").await.unwrap_err(),
            Error::EmptyAnswer
        ));
        assert_eq!(stored(&personas, &owner).await, "seed");
    }

    #[tokio::test]
    async fn test_ask_provider_failure_leaves_persona_unchanged() {
        let (engine, personas, mock, owner) = engine_with_persona(Some("seed")).await;
        mock.push_failure("connection refused");

        assert!(matches!(
            engine.ask(&owner, "hi").await.unwrap_err(),
            Error::Provider(_)
        ));
        assert_eq!(stored(&personas, &owner).await, "seed");
    }

    #[tokio::test]
    async fn test_ask_format_error_leaves_persona_unchanged() {
        let (engine, personas, mock, owner) = engine_with_persona(Some("seed")).await;
        mock.push_reply("I can't answer that in JSON, sorry!");

        assert!(matches!(
            engine.ask(&owner, "hi").await.unwrap_err(),
            Error::ResponseFormat(_)
        ));
        assert_eq!(stored(&personas, &owner).await, "seed");
    }

    #[tokio::test]
    async fn test_ask_missing_answer_key_is_empty_answer() {
        let (engine, personas, mock, owner) = engine_with_persona(Some("seed")).await;
        mock.push_reply(r#"{"persona_update": "x"}"#);

        assert!(matches!(
            engine.ask(&owner, "hi").await.unwrap_err(),
            Error::EmptyAnswer
        ));
        assert_eq!(stored(&personas, &owner).await, "seed");
    }
}

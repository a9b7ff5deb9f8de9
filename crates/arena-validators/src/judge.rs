use crate::verdict::Verdict;
use arena_core::agent_assertions::ConversationContext;
use arena_core::errors::ConfigError;
use arena_core::judge::{build_prompt, JudgeClient, JudgeVerdict};
use arena_core::model::Role;
use arena_core::params::parse_config;
use arena_core::validator_api::{ConversationResult, ConversationValidator};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct JudgeConfig {
    #[serde(default)]
    criteria: String,
    #[serde(default)]
    min_score: Option<f64>,
    #[serde(default)]
    system_prompt: Option<String>,
}

/// Asks an LLM judge to grade every assistant reply in the conversation.
pub struct LlmJudgeConversation {
    cfg: JudgeConfig,
    client: Option<Arc<dyn JudgeClient>>,
}

impl LlmJudgeConversation {
    pub fn from_params(
        params: &Value,
        client: Option<Arc<dyn JudgeClient>>,
    ) -> Result<Self, ConfigError> {
        let cfg: JudgeConfig = parse_config("llm_judge_conversation", params)?;
        Ok(Self { cfg, client })
    }
}

/// Assistant replies joined by newlines.
fn assistant_transcript(ctx: &ConversationContext) -> String {
    ctx.messages
        .iter()
        .filter(|m| m.role == Role::Assistant && !m.content.is_empty())
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl ConversationValidator for LlmJudgeConversation {
    fn name(&self) -> &'static str {
        "llm_judge_conversation"
    }

    async fn validate_conversation(
        &self,
        ctx: &ConversationContext,
    ) -> anyhow::Result<ConversationResult> {
        let Some(client) = &self.client else {
            return Ok(Verdict::fail(
                "no judge provider configured",
                json!({ "error": "judge_unavailable" }),
            )
            .into_conversation());
        };

        let prompt = build_prompt(
            &self.cfg.criteria,
            &assistant_transcript(ctx),
            self.cfg.system_prompt.as_deref(),
        );

        let raw = match client.judge(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                return Ok(Verdict::fail(
                    format!("judge error: {}", e),
                    json!({ "error": "judge_error", "provider": client.provider_name() }),
                )
                .into_conversation())
            }
        };

        let verdict = match JudgeVerdict::parse(&raw) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(
                    event = "arena.judge.unparsable_reply",
                    provider = client.provider_name(),
                    error = %e,
                    "judge reply could not be parsed"
                );
                return Ok(Verdict::fail(
                    format!("judge reply unparsable: {}", e),
                    json!({ "error": "judge_parse_error" }),
                )
                .into_conversation());
            }
        };

        let details = json!({
            "score": verdict.score,
            "min_score": self.cfg.min_score,
            "judge_passed": verdict.passed,
            "provider": client.provider_name(),
        });
        Ok(Verdict::check(
            verdict.meets(self.cfg.min_score),
            verdict.reasoning.clone(),
            if verdict.reasoning.is_empty() {
                format!("judge rejected conversation (score {:.2})", verdict.score)
            } else {
                verdict.reasoning.clone()
            },
            details,
        )
        .into_conversation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_core::agent_assertions::build_conversation_context;
    use arena_core::model::Message;
    use std::sync::Mutex;

    struct FakeJudge {
        reply: anyhow::Result<String>,
        seen: Mutex<Option<String>>,
    }

    impl FakeJudge {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                seen: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl JudgeClient for FakeJudge {
        async fn judge(&self, prompt: &str) -> anyhow::Result<String> {
            *self.seen.lock().unwrap() = Some(prompt.to_string());
            match &self.reply {
                Ok(r) => Ok(r.clone()),
                Err(e) => Err(anyhow::anyhow!("{}", e)),
            }
        }

        fn provider_name(&self) -> &'static str {
            "fake"
        }
    }

    fn ctx() -> ConversationContext {
        build_conversation_context(
            vec![
                Message::user("Hello"),
                Message::assistant("Hi there!"),
                Message::user("Bye"),
                Message::assistant("Goodbye!"),
            ],
            Default::default(),
        )
    }

    #[tokio::test]
    async fn test_sends_assistant_transcript() {
        let judge = FakeJudge::replying(r#"{"passed": true, "score": 0.85, "reasoning": "coherent"}"#);
        let v = LlmJudgeConversation::from_params(
            &json!({"criteria": "Is it coherent?"}),
            Some(judge.clone()),
        )
        .unwrap();
        let r = v.validate_conversation(&ctx()).await.unwrap();
        assert!(r.passed);
        assert_eq!(r.message, "coherent");
        let prompt = judge.seen.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("Hi there!\nGoodbye!"));
        assert!(!prompt.contains("Hello"));
    }

    #[tokio::test]
    async fn test_min_score_threshold() {
        let judge = FakeJudge::replying(r#"{"passed": true, "score": 0.5}"#);
        let v = LlmJudgeConversation::from_params(&json!({"min_score": 0.7}), Some(judge)).unwrap();
        assert!(!v.validate_conversation(&ctx()).await.unwrap().passed);
    }

    #[tokio::test]
    async fn test_judge_error_is_failure_not_err() {
        let judge = Arc::new(FakeJudge {
            reply: Err(anyhow::anyhow!("timeout")),
            seen: Mutex::new(None),
        });
        let v = LlmJudgeConversation::from_params(&Value::Null, Some(judge)).unwrap();
        let r = v.validate_conversation(&ctx()).await.unwrap();
        assert!(!r.passed);
        assert_eq!(r.message, "judge error: timeout");
    }

    #[tokio::test]
    async fn test_missing_provider_fails() {
        let v = LlmJudgeConversation::from_params(&Value::Null, None).unwrap();
        let r = v.validate_conversation(&ctx()).await.unwrap();
        assert!(!r.passed);
        assert_eq!(r.details["error"], "judge_unavailable");
    }
}

use crate::verdict::Verdict;
use crate::FromParams;
use arena_core::agent_assertions::ConversationContext;
use arena_core::errors::ConfigError;
use arena_core::params::parse_config;
use arena_core::validator_api::{ConversationResult, ConversationValidator};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct StateConfig {
    #[serde(default)]
    state: String,
}

fn required_state(validator: &str, params: &Value) -> Result<String, ConfigError> {
    let cfg: StateConfig = parse_config(validator, params)?;
    if cfg.state.is_empty() {
        return Err(ConfigError::MissingParam("state".into()));
    }
    Ok(cfg.state)
}

/// The workflow's final recorded state equals `state`.
pub struct WorkflowStateIs {
    state: String,
}

impl FromParams for WorkflowStateIs {
    fn from_params(params: &Value) -> Result<Self, ConfigError> {
        Ok(Self {
            state: required_state("workflow_state_is", params)?,
        })
    }
}

#[async_trait]
impl ConversationValidator for WorkflowStateIs {
    fn name(&self) -> &'static str {
        "workflow_state_is"
    }

    async fn validate_conversation(
        &self,
        ctx: &ConversationContext,
    ) -> anyhow::Result<ConversationResult> {
        let actual = ctx.workflow_state();
        let details = json!({ "expected": self.state, "actual": actual });
        let verdict = match actual {
            Some(s) if s == self.state => Verdict::pass(format!("workflow is in state '{}'", s), details),
            Some(s) => Verdict::fail(
                format!("expected workflow state '{}', got '{}'", self.state, s),
                details,
            ),
            None => Verdict::fail("no workflow state recorded", details),
        };
        Ok(verdict.into_conversation())
    }
}

/// Some recorded transition moved the workflow into `state`.
pub struct WorkflowTransitionedTo {
    state: String,
}

impl FromParams for WorkflowTransitionedTo {
    fn from_params(params: &Value) -> Result<Self, ConfigError> {
        Ok(Self {
            state: required_state("workflow_transitioned_to", params)?,
        })
    }
}

#[async_trait]
impl ConversationValidator for WorkflowTransitionedTo {
    fn name(&self) -> &'static str {
        "workflow_transitioned_to"
    }

    async fn validate_conversation(
        &self,
        ctx: &ConversationContext,
    ) -> anyhow::Result<ConversationResult> {
        let transitions = ctx.workflow_transitions();
        let hit = transitions.iter().any(|t| *t == self.state);
        Ok(Verdict::check(
            hit,
            format!("workflow transitioned to '{}'", self.state),
            format!("workflow never transitioned to '{}'", self.state),
            json!({ "expected": self.state, "transitions": transitions }),
        )
        .into_conversation())
    }
}

pub struct WorkflowComplete;

impl FromParams for WorkflowComplete {
    fn from_params(_params: &Value) -> Result<Self, ConfigError> {
        Ok(Self)
    }
}

#[async_trait]
impl ConversationValidator for WorkflowComplete {
    fn name(&self) -> &'static str {
        "workflow_complete"
    }

    async fn validate_conversation(
        &self,
        ctx: &ConversationContext,
    ) -> anyhow::Result<ConversationResult> {
        let complete = ctx.workflow_complete();
        Ok(Verdict::check(
            complete,
            "workflow complete",
            "workflow did not reach a terminal state",
            json!({ "workflow_complete": complete, "workflow_state": ctx.workflow_state() }),
        )
        .into_conversation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_core::agent_assertions::build_conversation_context;
    use arena_core::model::Message;

    fn ctx(meta: Value) -> ConversationContext {
        let mut m = Message::assistant("ok");
        m.meta = meta.as_object().cloned().unwrap();
        build_conversation_context(vec![m], Default::default())
    }

    #[tokio::test]
    async fn test_state_is() {
        let c = ctx(json!({"_workflow_state": "resolved"}));
        let v = WorkflowStateIs::from_params(&json!({"state": "resolved"})).unwrap();
        assert!(v.validate_conversation(&c).await.unwrap().passed);

        let v = WorkflowStateIs::from_params(&json!({"state": "escalated"})).unwrap();
        let r = v.validate_conversation(&c).await.unwrap();
        assert!(!r.passed);
        assert_eq!(r.details["actual"], "resolved");
    }

    #[tokio::test]
    async fn test_transitioned_to() {
        let c = ctx(json!({"_workflow_transitions": [{"from": "intake", "to": "billing"}]}));
        let v = WorkflowTransitionedTo::from_params(&json!({"state": "billing"})).unwrap();
        assert!(v.validate_conversation(&c).await.unwrap().passed);
        let v = WorkflowTransitionedTo::from_params(&json!({"state": "closed"})).unwrap();
        assert!(!v.validate_conversation(&c).await.unwrap().passed);
    }

    #[tokio::test]
    async fn test_complete() {
        let v = WorkflowComplete;
        assert!(v
            .validate_conversation(&ctx(json!({"_workflow_complete": true})))
            .await
            .unwrap()
            .passed);
        assert!(!v.validate_conversation(&ctx(json!({}))).await.unwrap().passed);
    }

    #[test]
    fn test_state_is_required() {
        let err = WorkflowStateIs::from_params(&json!({})).err().unwrap();
        assert_eq!(err.kind(), "missing_param");
    }
}

use crate::content::{ContentExcludes, ContentIncludes, ContentMatches};
use crate::cost::CostBudget;
use crate::json_checks::{IsValidJson, JsonSchemaCheck};
use crate::judge::LlmJudgeConversation;
use crate::tool_args::ToolCallsWithArgs;
use crate::tool_checks::{
    NoToolErrors, OnConversation, OnTurn, ToolCallChain, ToolCallCount, ToolCallSequence,
    ToolResultIncludes, ToolResultMatches, ToolsCalled, ToolsNotCalled, TraceCheck,
};
use crate::workflow::{WorkflowComplete, WorkflowStateIs, WorkflowTransitionedTo};
use crate::FromParams;
use arena_core::agent_assertions::ConversationContext;
use arena_core::config::{AssertionConfig, AssertionSuite};
use arena_core::errors::ConfigError;
use arena_core::judge::JudgeClient;
use arena_core::params::TurnParams;
use arena_core::validator_api::{ConversationValidator, Validator};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

type TurnFactory = fn(&Value) -> Result<Box<dyn Validator>, ConfigError>;
type ConversationFactory = fn(
    &Value,
    Option<Arc<dyn JudgeClient>>,
) -> Result<Box<dyn ConversationValidator>, ConfigError>;

fn turn_validator<V: Validator + FromParams + 'static>(
    params: &Value,
) -> Result<Box<dyn Validator>, ConfigError> {
    Ok(Box::new(V::from_params(params)?))
}

fn trace_on_turn<C: TraceCheck + FromParams>(
    params: &Value,
) -> Result<Box<dyn Validator>, ConfigError> {
    Ok(Box::new(OnTurn(C::from_params(params)?)))
}

fn conversation_validator<V: ConversationValidator + FromParams + 'static>(
    params: &Value,
    _judge: Option<Arc<dyn JudgeClient>>,
) -> Result<Box<dyn ConversationValidator>, ConfigError> {
    Ok(Box::new(V::from_params(params)?))
}

fn trace_on_conversation<C: TraceCheck + FromParams>(
    params: &Value,
    _judge: Option<Arc<dyn JudgeClient>>,
) -> Result<Box<dyn ConversationValidator>, ConfigError> {
    Ok(Box::new(OnConversation(C::from_params(params)?)))
}

fn llm_judge(
    params: &Value,
    judge: Option<Arc<dyn JudgeClient>>,
) -> Result<Box<dyn ConversationValidator>, ConfigError> {
    Ok(Box::new(LlmJudgeConversation::from_params(params, judge)?))
}

/// Builds validators by type name.
pub struct ValidatorRegistry {
    turn: BTreeMap<&'static str, TurnFactory>,
    conversation: BTreeMap<&'static str, ConversationFactory>,
    judge: Option<Arc<dyn JudgeClient>>,
}

impl Default for ValidatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        let mut turn: BTreeMap<&'static str, TurnFactory> = BTreeMap::new();
        turn.insert("tools_called", trace_on_turn::<ToolsCalled>);
        turn.insert("tools_not_called", trace_on_turn::<ToolsNotCalled>);
        turn.insert("tool_calls_with_args", turn_validator::<ToolCallsWithArgs>);
        turn.insert("content_includes", turn_validator::<ContentIncludes>);
        turn.insert("content_matches", turn_validator::<ContentMatches>);
        turn.insert("content_excludes", turn_validator::<ContentExcludes>);
        turn.insert("tool_call_count", trace_on_turn::<ToolCallCount>);
        turn.insert("no_tool_errors", trace_on_turn::<NoToolErrors>);
        turn.insert("tool_result_includes", trace_on_turn::<ToolResultIncludes>);
        turn.insert("tool_result_matches", trace_on_turn::<ToolResultMatches>);
        turn.insert("tool_call_sequence", trace_on_turn::<ToolCallSequence>);
        turn.insert("tool_call_chain", trace_on_turn::<ToolCallChain>);
        turn.insert("is_valid_json", turn_validator::<IsValidJson>);
        turn.insert("json_schema", turn_validator::<JsonSchemaCheck>);

        let mut conversation: BTreeMap<&'static str, ConversationFactory> = BTreeMap::new();
        conversation.insert("tools_called", trace_on_conversation::<ToolsCalled>);
        conversation.insert("tools_not_called", trace_on_conversation::<ToolsNotCalled>);
        conversation.insert("no_tool_errors", trace_on_conversation::<NoToolErrors>);
        conversation.insert("tool_call_count", trace_on_conversation::<ToolCallCount>);
        conversation.insert("tool_result_includes", trace_on_conversation::<ToolResultIncludes>);
        conversation.insert("tool_result_matches", trace_on_conversation::<ToolResultMatches>);
        conversation.insert("tool_call_sequence", trace_on_conversation::<ToolCallSequence>);
        conversation.insert("tool_call_chain", trace_on_conversation::<ToolCallChain>);
        conversation.insert("workflow_state_is", conversation_validator::<WorkflowStateIs>);
        conversation.insert(
            "workflow_transitioned_to",
            conversation_validator::<WorkflowTransitionedTo>,
        );
        conversation.insert("workflow_complete", conversation_validator::<WorkflowComplete>);
        conversation.insert("cost_budget", conversation_validator::<CostBudget>);
        conversation.insert("llm_judge_conversation", llm_judge);

        Self {
            turn,
            conversation,
            judge: None,
        }
    }

    pub fn with_judge(mut self, client: Arc<dyn JudgeClient>) -> Self {
        self.judge = Some(client);
        self
    }

    pub fn turn_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.turn.keys().copied()
    }

    pub fn conversation_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.conversation.keys().copied()
    }

    pub fn build_turn(&self, kind: &str, params: &Value) -> Result<Box<dyn Validator>, ConfigError> {
        let factory = self
            .turn
            .get(kind)
            .ok_or_else(|| ConfigError::unknown_validator(kind, self.turn_names()))?;
        factory(params)
    }

    pub fn build_conversation(
        &self,
        kind: &str,
        params: &Value,
    ) -> Result<Box<dyn ConversationValidator>, ConfigError> {
        let factory = self
            .conversation
            .get(kind)
            .ok_or_else(|| ConfigError::unknown_validator(kind, self.conversation_names()))?;
        factory(params, self.judge.clone())
    }

    /// Builds every assertion in `suite`, failing on the first bad one.
    pub fn build_suite(&self, suite: &AssertionSuite) -> Result<BuiltSuite, ConfigError> {
        let turn = suite
            .turn
            .iter()
            .map(|a| {
                Ok(Configured {
                    validator: self.build_turn(&a.kind, &a.params)?,
                    config: a.clone(),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        let conversation = suite
            .conversation
            .iter()
            .map(|a| {
                Ok(Configured {
                    validator: self.build_conversation(&a.kind, &a.params)?,
                    config: a.clone(),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(BuiltSuite { turn, conversation })
    }
}

pub struct Configured<V: ?Sized> {
    pub config: AssertionConfig,
    pub validator: Box<V>,
}

/// One reported assertion outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssertionOutcome {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub passed: bool,
    pub skipped: bool,
    pub message: String,
    pub details: Value,
}

pub struct BuiltSuite {
    pub turn: Vec<Configured<dyn Validator>>,
    pub conversation: Vec<Configured<dyn ConversationValidator>>,
}

impl BuiltSuite {
    pub fn run_turn(&self, content: &str, params: &TurnParams) -> Vec<AssertionOutcome> {
        self.turn
            .iter()
            .map(|c| {
                let r = c.validator.validate(content, params);
                tracing::debug!(
                    event = "arena.assertion.turn",
                    validator = c.validator.name(),
                    passed = r.passed,
                    skipped = r.skipped,
                    "turn assertion evaluated"
                );
                let message = r
                    .details
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                AssertionOutcome {
                    kind: c.config.kind.clone(),
                    label: c.config.message.clone(),
                    passed: r.passed,
                    skipped: r.skipped,
                    message,
                    details: r.details,
                }
            })
            .collect()
    }

    /// Runs conversation assertions in order. An `Err` from a validator aborts.
    pub async fn run_conversation(
        &self,
        ctx: &ConversationContext,
    ) -> anyhow::Result<Vec<AssertionOutcome>> {
        let mut out = Vec::with_capacity(self.conversation.len());
        for c in &self.conversation {
            let r = c.validator.validate_conversation(ctx).await?;
            tracing::debug!(
                event = "arena.assertion.conversation",
                validator = c.validator.name(),
                passed = r.passed,
                skipped = r.skipped,
                "conversation assertion evaluated"
            );
            out.push(AssertionOutcome {
                kind: c.config.kind.clone(),
                label: c.config.message.clone(),
                passed: r.passed,
                skipped: r.skipped,
                message: r.message,
                details: r.details,
            });
        }
        Ok(out)
    }
}

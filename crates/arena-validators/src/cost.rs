use crate::verdict::Verdict;
use crate::FromParams;
use arena_core::agent_assertions::ConversationContext;
use arena_core::errors::ConfigError;
use arena_core::params::{opt_count, parse_config};
use arena_core::validator_api::{ConversationResult, ConversationValidator};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct CostBudgetConfig {
    #[serde(default)]
    max_cost_usd: Option<f64>,
    #[serde(default, deserialize_with = "opt_count")]
    max_input_tokens: Option<usize>,
    #[serde(default, deserialize_with = "opt_count")]
    max_output_tokens: Option<usize>,
    #[serde(default, deserialize_with = "opt_count")]
    max_total_tokens: Option<usize>,
}

/// Caps on aggregated conversation cost. Unset limits are not checked.
pub struct CostBudget {
    cfg: CostBudgetConfig,
}

impl FromParams for CostBudget {
    fn from_params(params: &Value) -> Result<Self, ConfigError> {
        let cfg: CostBudgetConfig = parse_config("cost_budget", params)?;
        if cfg.max_cost_usd.is_some_and(|c| !c.is_finite() || c < 0.0) {
            return Err(ConfigError::InvalidParam {
                name: "max_cost_usd".into(),
                message: "must be a non-negative number".into(),
            });
        }
        Ok(Self { cfg })
    }
}

#[async_trait]
impl ConversationValidator for CostBudget {
    fn name(&self) -> &'static str {
        "cost_budget"
    }

    async fn validate_conversation(
        &self,
        ctx: &ConversationContext,
    ) -> anyhow::Result<ConversationResult> {
        let cost = &ctx.cost;
        let mut violations: Vec<String> = Vec::new();

        if let Some(max) = self.cfg.max_cost_usd {
            if cost.total_cost_usd > max {
                violations.push(format!("cost ${:.4} exceeds ${:.4}", cost.total_cost_usd, max));
            }
        }
        let token_limits = [
            ("input", self.cfg.max_input_tokens, cost.input_tokens),
            ("output", self.cfg.max_output_tokens, cost.output_tokens),
            ("total", self.cfg.max_total_tokens, cost.total_tokens()),
        ];
        for (label, max, actual) in token_limits {
            if let Some(max) = max {
                if actual > max as u64 {
                    violations.push(format!("{} tokens {} exceed {}", label, actual, max));
                }
            }
        }

        Ok(Verdict::check(
            violations.is_empty(),
            "within cost budget",
            violations.join("; "),
            json!({
                "total_cost_usd": cost.total_cost_usd,
                "input_tokens": cost.input_tokens,
                "output_tokens": cost.output_tokens,
                "total_tokens": cost.total_tokens(),
                "violations": violations,
            }),
        )
        .into_conversation())
    }
}

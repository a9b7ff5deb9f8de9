//! Seam for LLM-as-judge checks.
//!
//! The judge provider is opaque: it takes a prompt and returns raw text.
//! Parsing the verdict out of that text lives here so every provider gets the
//! same leniency.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[async_trait]
pub trait JudgeClient: Send + Sync {
    async fn judge(&self, prompt: &str) -> anyhow::Result<String>;
    fn provider_name(&self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    pub passed: bool,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub reasoning: String,
}

impl JudgeVerdict {
    /// Parses the first JSON object found in a judge reply.
    ///
    /// Surrounding prose and markdown code fences are tolerated. A missing
    /// score defaults to 1.0 for a pass and 0.0 for a fail.
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let start = raw
            .find('{')
            .ok_or_else(|| anyhow::anyhow!("judge reply contains no JSON object"))?;
        let end = raw
            .rfind('}')
            .filter(|&e| e > start)
            .ok_or_else(|| anyhow::anyhow!("judge reply contains no JSON object"))?;

        let value: serde_json::Value = serde_json::from_str(&raw[start..=end])
            .map_err(|e| anyhow::anyhow!("judge reply is not valid JSON: {}", e))?;

        let has_score = value.get("score").is_some_and(|s| s.is_number());
        let mut verdict: JudgeVerdict = serde_json::from_value(value)
            .map_err(|e| anyhow::anyhow!("judge reply has unexpected shape: {}", e))?;
        if !has_score {
            verdict.score = if verdict.passed { 1.0 } else { 0.0 };
        }
        Ok(verdict)
    }

    /// Passing requires the judge's own verdict and, if set, a minimum score.
    pub fn meets(&self, min_score: Option<f64>) -> bool {
        self.passed && min_score.map_or(true, |m| self.score >= m)
    }
}

/// Builds the judge prompt for a set of criteria and the content under review.
pub fn build_prompt(criteria: &str, content: &str, system_prompt: Option<&str>) -> String {
    let mut prompt = String::new();
    if let Some(sys) = system_prompt.filter(|s| !s.trim().is_empty()) {
        prompt.push_str(sys.trim());
        prompt.push_str("\n\n");
    }
    prompt.push_str("Evaluate the assistant output against the criteria.\n");
    prompt.push_str(&format!("Criteria: {}\n\n", criteria));
    prompt.push_str("Assistant output:\n");
    prompt.push_str(content);
    prompt.push_str(
        "\n\nRespond with JSON only: {\"passed\": bool, \"score\": number between 0 and 1, \"reasoning\": string}",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let v = JudgeVerdict::parse(r#"{"passed": true, "score": 0.9, "reasoning": "ok"}"#).unwrap();
        assert!(v.passed);
        assert_eq!(v.score, 0.9);
        assert_eq!(v.reasoning, "ok");
    }

    #[test]
    fn test_parse_fenced_with_prose() {
        let raw = "Here you go:\n```json\n{\"passed\": false, \"reasoning\": \"rude\"}\n```";
        let v = JudgeVerdict::parse(raw).unwrap();
        assert!(!v.passed);
        assert_eq!(v.score, 0.0);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(JudgeVerdict::parse("hello from dummy").is_err());
        assert!(JudgeVerdict::parse("{not json}").is_err());
    }

    #[test]
    fn test_min_score_threshold() {
        let v = JudgeVerdict {
            passed: true,
            score: 0.7,
            reasoning: String::new(),
        };
        assert!(v.meets(Some(0.7)));
        assert!(!v.meets(Some(0.71)));
        assert!(v.meets(None));
    }

    #[test]
    fn test_prompt_contains_criteria_and_content() {
        let p = build_prompt("be polite", "Hi there!", Some("You are a strict judge."));
        assert!(p.starts_with("You are a strict judge."));
        assert!(p.contains("Criteria: be polite"));
        assert!(p.contains("Hi there!"));
    }
}

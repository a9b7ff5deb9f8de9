use crate::verdict::Verdict;
use crate::FromParams;
use arena_core::agent_assertions::matchers::missing_substrings;
use arena_core::errors::{compile_regex, ConfigError};
use arena_core::params::{parse_config, string_list, TurnParams};
use arena_core::validator_api::{ValidationResult, Validator};
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct PatternsConfig {
    #[serde(default, deserialize_with = "string_list")]
    patterns: Vec<String>,
}

/// Every pattern must appear in the response, ignoring case.
pub struct ContentIncludes {
    patterns: Vec<String>,
}

impl FromParams for ContentIncludes {
    fn from_params(params: &Value) -> Result<Self, ConfigError> {
        let cfg: PatternsConfig = parse_config("content_includes", params)?;
        Ok(Self {
            patterns: cfg.patterns,
        })
    }
}

impl Validator for ContentIncludes {
    fn name(&self) -> &'static str {
        "content_includes"
    }

    fn validate(&self, content: &str, _params: &TurnParams) -> ValidationResult {
        let missing = missing_substrings(content, &self.patterns);
        Verdict::check(
            missing.is_empty(),
            "content includes all patterns",
            format!("content missing patterns: {:?}", missing),
            json!({ "missing_patterns": missing }),
        )
        .into_turn()
    }
}

/// No pattern may appear in the response, ignoring case.
pub struct ContentExcludes {
    patterns: Vec<String>,
}

impl FromParams for ContentExcludes {
    fn from_params(params: &Value) -> Result<Self, ConfigError> {
        let cfg: PatternsConfig = parse_config("content_excludes", params)?;
        Ok(Self {
            patterns: cfg.patterns,
        })
    }
}

impl Validator for ContentExcludes {
    fn name(&self) -> &'static str {
        "content_excludes"
    }

    fn validate(&self, content: &str, _params: &TurnParams) -> ValidationResult {
        let lower = content.to_lowercase();
        let found: Vec<&String> = self
            .patterns
            .iter()
            .filter(|p| lower.contains(&p.to_lowercase()))
            .collect();
        Verdict::check(
            found.is_empty(),
            "content excludes all patterns",
            format!("content contains forbidden patterns: {:?}", found),
            json!({ "found_patterns": found }),
        )
        .into_turn()
    }
}

#[derive(Debug, Deserialize)]
struct PatternConfig {
    #[serde(default)]
    pattern: String,
}

pub struct ContentMatches {
    pattern: Result<Regex, ConfigError>,
}

impl FromParams for ContentMatches {
    fn from_params(params: &Value) -> Result<Self, ConfigError> {
        let cfg: PatternConfig = parse_config("content_matches", params)?;
        let pattern = if cfg.pattern.is_empty() {
            Err(ConfigError::MissingParam("pattern".into()))
        } else {
            compile_regex(&cfg.pattern)
        };
        Ok(Self { pattern })
    }
}

impl Validator for ContentMatches {
    fn name(&self) -> &'static str {
        "content_matches"
    }

    fn validate(&self, content: &str, _params: &TurnParams) -> ValidationResult {
        let re = match &self.pattern {
            Ok(re) => re,
            Err(e) => return ValidationResult::config_error(e),
        };
        Verdict::check(
            re.is_match(content),
            "content matches pattern",
            format!("content does not match '{}'", re.as_str()),
            json!({ "pattern": re.as_str() }),
        )
        .into_turn()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run<V: Validator>(v: V, content: &str) -> ValidationResult {
        v.validate(content, &TurnParams::default())
    }

    #[test]
    fn test_includes_is_case_insensitive() {
        let v = ContentIncludes::from_params(&json!({"patterns": ["REFUND", "order"]})).unwrap();
        assert!(run(v, "Your refund for the Order is done").passed);

        let v = ContentIncludes::from_params(&json!({"patterns": "refund"})).unwrap();
        let r = run(v, "nothing here");
        assert_eq!(r.details["missing_patterns"], json!(["refund"]));
    }

    #[test]
    fn test_excludes_reports_found() {
        let v = ContentExcludes::from_params(&json!({"patterns": ["secret", "password"]})).unwrap();
        let r = run(v, "the Secret is out");
        assert!(!r.passed);
        assert_eq!(r.details["found_patterns"], json!(["secret"]));
    }

    #[test]
    fn test_matches_is_case_sensitive() {
        let v = ContentMatches::from_params(&json!({"pattern": r"ORD-\d+"})).unwrap();
        assert!(!run(v, "order ord-12").passed);
        let v = ContentMatches::from_params(&json!({"pattern": "(unclosed"})).unwrap();
        assert_eq!(run(v, "x").details["error"], "invalid_regex");
    }

    #[test]
    fn test_content_checks_do_not_need_trace() {
        let v = ContentIncludes::from_params(&Value::Null).unwrap();
        let r = run(v, "");
        assert!(r.passed && !r.skipped);
    }
}

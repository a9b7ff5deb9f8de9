use crate::verdict::Verdict;
use crate::FromParams;
use arena_core::errors::ConfigError;
use arena_core::params::{parse_config, TurnParams};
use arena_core::validator_api::{ValidationResult, Validator};
use jsonschema::JSONSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;

const MAX_CONTENT_PREVIEW: usize = 200;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct Extraction {
    /// Accept JSON wrapped in a markdown code fence.
    #[serde(default)]
    allow_wrapped: bool,
    /// Accept the first balanced JSON object or array inside surrounding text.
    #[serde(default)]
    extract_json: bool,
}

impl Extraction {
    /// The JSON candidate inside `content`, or `content` itself.
    fn candidate<'a>(&self, content: &'a str) -> &'a str {
        let extracted = if self.allow_wrapped {
            extract_fenced(content)
        } else {
            None
        };
        let extracted = extracted.or_else(|| {
            if !self.extract_json {
                return None;
            }
            content
                .find('{')
                .and_then(|i| extract_balanced(&content[i..], '{', '}'))
                .or_else(|| {
                    content
                        .find('[')
                        .and_then(|i| extract_balanced(&content[i..], '[', ']'))
                })
        });
        extracted.unwrap_or(content)
    }

    fn parse(&self, content: &str) -> Result<Value, Verdict> {
        let candidate = self.candidate(content);
        serde_json::from_str(candidate).map_err(|e| {
            Verdict::fail(
                "content is not valid JSON",
                json!({ "error": e.to_string(), "content": truncate(candidate, MAX_CONTENT_PREVIEW) }),
            )
        })
    }
}

fn extract_fenced(content: &str) -> Option<&str> {
    let start = content.find("```")?;
    let rest = &content[start + 3..];
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches([' ', '\t', '\r']);
    let body = rest.strip_prefix('\n')?;
    let end = body.find("\n```")?;
    Some(body[..end].trim())
}

/// Returns the prefix of `content` that closes the bracket it opens with.
fn extract_balanced(content: &str, open: char, close: char) -> Option<&str> {
    if !content.starts_with(open) {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in content.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&content[..i + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((i, _)) => format!("{}...", &s[..i]),
        None => s.to_string(),
    }
}

pub struct IsValidJson {
    extraction: Extraction,
}

impl FromParams for IsValidJson {
    fn from_params(params: &Value) -> Result<Self, ConfigError> {
        Ok(Self {
            extraction: parse_config("is_valid_json", params)?,
        })
    }
}

impl Validator for IsValidJson {
    fn name(&self) -> &'static str {
        "is_valid_json"
    }

    fn validate(&self, content: &str, _params: &TurnParams) -> ValidationResult {
        match self.extraction.parse(content) {
            Ok(_) => Verdict::pass("valid JSON", json!({})).into_turn(),
            Err(v) => v.into_turn(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct JsonSchemaConfig {
    #[serde(default)]
    schema: Option<Value>,
    #[serde(default)]
    schema_file: Option<PathBuf>,
    #[serde(flatten)]
    extraction: Extraction,
}

pub struct JsonSchemaCheck {
    extraction: Extraction,
    compiled: Result<JSONSchema, ConfigError>,
}

fn load_schema(cfg: &JsonSchemaConfig) -> Result<JSONSchema, ConfigError> {
    let schema = match (&cfg.schema, &cfg.schema_file) {
        (Some(schema), _) => schema.clone(),
        (None, Some(path)) => {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                ConfigError::InvalidSchema(format!(
                    "failed to read schema_file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            serde_json::from_str(&raw).map_err(|e| {
                ConfigError::InvalidSchema(format!("schema_file '{}': {}", path.display(), e))
            })?
        }
        (None, None) => return Err(ConfigError::MissingParam("schema or schema_file".into())),
    };

    JSONSchema::options()
        .compile(&schema)
        .map_err(|e| ConfigError::InvalidSchema(e.to_string()))
}

impl FromParams for JsonSchemaCheck {
    fn from_params(params: &Value) -> Result<Self, ConfigError> {
        let cfg: JsonSchemaConfig = parse_config("json_schema", params)?;
        Ok(Self {
            extraction: cfg.extraction,
            compiled: load_schema(&cfg),
        })
    }
}

impl Validator for JsonSchemaCheck {
    fn name(&self) -> &'static str {
        "json_schema"
    }

    fn validate(&self, content: &str, _params: &TurnParams) -> ValidationResult {
        let compiled = match &self.compiled {
            Ok(c) => c,
            Err(e) => return ValidationResult::config_error(e),
        };
        let instance = match self.extraction.parse(content) {
            Ok(v) => v,
            Err(v) => return v.into_turn(),
        };

        if let Err(errors) = compiled.validate(&instance) {
            let errors: Vec<String> = errors.map(|e| e.to_string()).collect();
            return Verdict::fail(
                format!("json_schema failed: {} validation errors", errors.len()),
                json!({ "count": errors.len(), "errors": errors }),
            )
            .into_turn();
        }
        Verdict::pass("JSON matches schema", json!({})).into_turn()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run<V: Validator>(v: &V, content: &str) -> ValidationResult {
        v.validate(content, &TurnParams::default())
    }

    #[test]
    fn test_plain_json() {
        let v = IsValidJson::from_params(&Value::Null).unwrap();
        assert!(run(&v, r#"{"a": 1}"#).passed);
        let r = run(&v, "Sure! {\"a\": 1}");
        assert!(!r.passed);
        assert!(r.details["error"].is_string());
    }

    #[test]
    fn test_wrapped_and_extracted() {
        let wrapped = IsValidJson::from_params(&json!({"allow_wrapped": true})).unwrap();
        assert!(run(&wrapped, "Here:\n```json\n{\"a\": [1, 2]}\n```\nDone").passed);

        let extract = IsValidJson::from_params(&json!({"extract_json": true})).unwrap();
        assert!(run(&extract, r#"The answer is {"msg": "a } inside", "n": {"x": 1}} ok"#).passed);
        assert!(run(&extract, "list: [1, 2, 3] end").passed);
    }

    #[test]
    fn test_balanced_extraction_respects_strings() {
        assert_eq!(
            extract_balanced(r#"{"a":"}\"}"} tail"#, '{', '}'),
            Some(r#"{"a":"}\"}"}"#)
        );
        assert_eq!(extract_balanced("{unterminated", '{', '}'), None);
    }

    #[test]
    fn test_schema_validation() {
        let v = JsonSchemaCheck::from_params(&json!({
            "schema": {
                "type": "object",
                "required": ["status"],
                "properties": {"status": {"type": "string"}}
            }
        }))
        .unwrap();
        assert!(run(&v, r#"{"status": "ok"}"#).passed);
        let r = run(&v, r#"{"status": 3}"#);
        assert!(!r.passed);
        assert_eq!(r.details["count"], 1);
    }

    #[test]
    fn test_missing_schema_is_config_error() {
        let v = JsonSchemaCheck::from_params(&json!({})).unwrap();
        assert_eq!(run(&v, "{}").details["error"], "missing_param");

        let v = JsonSchemaCheck::from_params(&json!({"schema_file": "/nonexistent/schema.json"})).unwrap();
        assert_eq!(run(&v, "{}").details["error"], "invalid_schema");
    }

    #[test]
    fn test_truncate_preview() {
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("ab", 3), "ab");
    }
}

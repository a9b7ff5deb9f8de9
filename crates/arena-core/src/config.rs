use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;

pub const SUPPORTED_SUITE_VERSION: u32 = 1;

/// One configured assertion: a validator type name plus its params.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: Value,
    /// Optional human-readable label reported alongside the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssertionSuite {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub turn: Vec<AssertionConfig>,
    #[serde(default)]
    pub conversation: Vec<AssertionConfig>,
}

fn default_version() -> u32 {
    SUPPORTED_SUITE_VERSION
}

impl AssertionSuite {
    pub fn is_empty(&self) -> bool {
        self.turn.is_empty() && self.conversation.is_empty()
    }
}

/// Parses a suite from YAML text.
///
/// Unknown keys are an error when `strict`, a warning otherwise. Keys
/// starting with `_` or `x-` are treated as annotations and always allowed.
pub fn parse_suite(raw: &str, strict: bool) -> anyhow::Result<AssertionSuite> {
    let mut ignored = BTreeSet::new();
    let deserializer = serde_yaml::Deserializer::from_str(raw);
    let suite: AssertionSuite = serde_ignored::deserialize(deserializer, |path| {
        ignored.insert(path.to_string());
    })
    .context("failed to parse assertion suite YAML")?;

    let unknown: Vec<String> = ignored
        .into_iter()
        .filter(|k| !is_annotation_key(k))
        .collect();

    if !unknown.is_empty() {
        if strict {
            anyhow::bail!("unknown fields in assertion suite: {:?}", unknown);
        }
        tracing::warn!(
            event = "arena.config.ignored_fields",
            fields = ?unknown,
            "ignoring unknown assertion suite fields"
        );
    }

    if suite.version != SUPPORTED_SUITE_VERSION {
        anyhow::bail!(
            "unsupported assertion suite version {} (supported: {})",
            suite.version,
            SUPPORTED_SUITE_VERSION
        );
    }

    if let Some(bad) = suite
        .turn
        .iter()
        .chain(&suite.conversation)
        .find(|a| a.kind.trim().is_empty())
    {
        anyhow::bail!("assertion with empty type (params: {})", bad.params);
    }

    if suite.is_empty() {
        tracing::warn!(event = "arena.config.empty_suite", "assertion suite has no assertions");
    }

    Ok(suite)
}

fn is_annotation_key(path: &str) -> bool {
    let last = path.rsplit('.').next().unwrap_or(path);
    last.starts_with('_') || last.starts_with("x-")
}

pub fn load_suite(path: &Path, strict: bool) -> anyhow::Result<AssertionSuite> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read assertion suite {}", path.display()))?;
    parse_suite(&raw, strict).with_context(|| format!("in {}", path.display()))
}

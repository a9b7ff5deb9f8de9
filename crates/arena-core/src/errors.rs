use serde_json::{json, Value};

/// Authoring mistakes in assertion configuration.
///
/// These are reported as failed results with a typed `error` detail so that
/// reports can tell a broken assertion apart from a behavioral regression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid regex pattern '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("invalid args JSON for tool '{tool}': {message}")]
    InvalidArgsJson { tool: String, message: String },

    #[error("missing required parameter '{0}'")]
    MissingParam(String),

    #[error("invalid parameter '{name}': {message}")]
    InvalidParam { name: String, message: String },

    #[error("unknown validator type '{name}'{}", suggestion_suffix(.suggestion))]
    UnknownValidator {
        name: String,
        suggestion: Option<String>,
    },

    #[error("invalid JSON schema: {0}")]
    InvalidSchema(String),
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(" (did you mean '{}'?)", s),
        None => String::new(),
    }
}

impl ConfigError {
    pub fn invalid_regex(pattern: &str, err: &regex::Error) -> Self {
        ConfigError::InvalidRegex {
            pattern: pattern.to_string(),
            message: err.to_string(),
        }
    }

    /// Unknown validator type, with the closest known name as a hint.
    pub fn unknown_validator<'a>(name: &str, known: impl IntoIterator<Item = &'a str>) -> Self {
        let suggestion = known
            .into_iter()
            .map(|k| (k, strsim::jaro_winkler(name, k)))
            .filter(|(_, score)| *score >= 0.8)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(k, _)| k.to_string());
        ConfigError::UnknownValidator {
            name: name.to_string(),
            suggestion,
        }
    }

    /// Stable machine-readable discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigError::InvalidRegex { .. } => "invalid_regex",
            ConfigError::InvalidArgsJson { .. } => "invalid_args_json",
            ConfigError::MissingParam(_) => "missing_param",
            ConfigError::InvalidParam { .. } => "invalid_param",
            ConfigError::UnknownValidator { .. } => "unknown_validator",
            ConfigError::InvalidSchema(_) => "invalid_schema",
        }
    }

    pub fn to_details(&self) -> Value {
        let mut details = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        if let ConfigError::InvalidRegex { pattern, .. } = self {
            details["pattern"] = json!(pattern);
        }
        if let ConfigError::InvalidArgsJson { tool, .. } = self {
            details["tool"] = json!(tool);
        }
        details
    }
}

/// Compiles a regex, mapping failure into a [`ConfigError`].
pub fn compile_regex(pattern: &str) -> Result<regex::Regex, ConfigError> {
    regex::Regex::new(pattern).map_err(|e| ConfigError::invalid_regex(pattern, &e))
}

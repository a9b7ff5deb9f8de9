//! Parameter coercion for validator configuration.
//!
//! Config formats such as YAML and JSON do not reliably distinguish integers
//! from floats, so every count-like field goes through [`opt_count`]. An absent
//! field stays `None`, which is distinct from an explicit zero bound.

use crate::errors::ConfigError;
use crate::model::Message;
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Int(i64),
    Float(f64),
}

fn to_count(raw: RawNumber) -> Result<usize, String> {
    match raw {
        RawNumber::Int(i) if i >= 0 => Ok(i as usize),
        RawNumber::Int(i) => Err(format!("expected a non-negative count, got {}", i)),
        RawNumber::Float(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 => Ok(f as usize),
        RawNumber::Float(f) => Err(format!("expected a whole non-negative count, got {}", f)),
    }
}

/// Deserializes an optional count from an integer or a whole float.
pub fn opt_count<'de, D>(d: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawNumber>::deserialize(d)? {
        None => Ok(None),
        Some(raw) => to_count(raw).map(Some).map_err(D::Error::custom),
    }
}

/// Deserializes a list of strings, also accepting a single bare string.
pub fn string_list<'de, D>(d: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match Option::<OneOrMany>::deserialize(d)? {
        None => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
    })
}

/// Deserializes a validator's typed config from its raw params object.
///
/// `null` is treated as an empty object so validators with all-optional
/// fields can be built without params.
pub fn parse_config<T: DeserializeOwned>(validator: &str, params: &Value) -> Result<T, ConfigError> {
    let params = if params.is_null() {
        Value::Object(Map::new())
    } else {
        params.clone()
    };
    serde_json::from_value(params).map_err(|e| ConfigError::InvalidParam {
        name: validator.to_string(),
        message: e.to_string(),
    })
}

/// Runtime parameters handed to turn-level validators by the host pipeline.
///
/// `turn_messages` being `None` means this execution path does not expose
/// tool-call data at all; dependent checks must skip rather than fail.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TurnParams {
    #[serde(rename = "_turn_messages", default)]
    pub turn_messages: Option<Vec<Message>>,
    #[serde(rename = "_assistant_message", default)]
    pub assistant_message: Option<Message>,
    #[serde(rename = "_metadata", default)]
    pub metadata: Option<Map<String, Value>>,
}

impl TurnParams {
    pub fn with_turn_messages(messages: Vec<Message>) -> Self {
        Self {
            turn_messages: Some(messages),
            ..Default::default()
        }
    }

    /// Reads the runtime keys out of a host params object; other keys are ignored.
    pub fn from_value(params: &Value) -> anyhow::Result<Self> {
        if params.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(params.clone())
            .map_err(|e| anyhow::anyhow!("invalid turn params: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Bounds {
        #[serde(default, deserialize_with = "opt_count")]
        min: Option<usize>,
        #[serde(default, deserialize_with = "opt_count")]
        max: Option<usize>,
        #[serde(default, deserialize_with = "string_list")]
        tools: Vec<String>,
    }

    #[test]
    fn test_count_accepts_int_and_float() {
        let b: Bounds = parse_config("t", &json!({"min": 2, "max": 3.0})).unwrap();
        assert_eq!(b.min, Some(2));
        assert_eq!(b.max, Some(3));
    }

    #[test]
    fn test_absent_is_distinct_from_zero() {
        let b: Bounds = parse_config("t", &json!({"max": 0})).unwrap();
        assert_eq!(b.min, None);
        assert_eq!(b.max, Some(0));
    }

    #[test]
    fn test_rejects_negative_and_fractional() {
        assert!(parse_config::<Bounds>("t", &json!({"min": -1})).is_err());
        let err = parse_config::<Bounds>("t", &json!({"max": 1.5})).unwrap_err();
        assert_eq!(err.kind(), "invalid_param");
    }

    #[test]
    fn test_string_list_one_or_many() {
        let b: Bounds = parse_config("t", &json!({"tools": "search"})).unwrap();
        assert_eq!(b.tools, vec!["search"]);
        let b: Bounds = parse_config("t", &json!({"tools": ["a", "b"]})).unwrap();
        assert_eq!(b.tools, vec!["a", "b"]);
        let b: Bounds = parse_config("t", &Value::Null).unwrap();
        assert!(b.tools.is_empty());
    }

    #[test]
    fn test_turn_params_from_value() {
        let p = TurnParams::from_value(&json!({"min": 999})).unwrap();
        assert!(p.turn_messages.is_none());

        let p = TurnParams::from_value(&json!({
            "_turn_messages": [{"role": "user", "content": "hi"}]
        }))
        .unwrap();
        assert_eq!(p.turn_messages.unwrap().len(), 1);
    }
}

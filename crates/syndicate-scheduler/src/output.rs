//! Handler results and discovery detection.
//!
//! A handler returns a [`TaskOutput`]: the JSON value that lands in history,
//! plus an optional [`DiscoveryReport`]. Converting from a raw JSON object
//! recognizes the keys `isDiscovery`, `discoveryType`, `discoveryData` and
//! `confidence`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_DISCOVERY_TYPE: &str = "general";
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// What a handler produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskOutput {
    pub value: Value,
    pub discovery: Option<DiscoveryReport>,
}

/// A noteworthy result flagged by a handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryReport {
    pub discovery_type: String,
    pub data: Value,
    pub confidence: f64,
}

impl TaskOutput {
    /// No result payload.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Plain result; recognized discovery keys are still honored.
    pub fn value(value: Value) -> Self {
        Self::from(value)
    }

    /// Result that is itself a discovery.
    pub fn discovery(discovery_type: &str, data: Value, confidence: f64) -> Self {
        Self {
            value: data.clone(),
            discovery: Some(DiscoveryReport {
                discovery_type: discovery_type.to_string(),
                data,
                confidence,
            }),
        }
    }

    pub fn is_discovery(&self) -> bool {
        self.discovery.is_some()
    }
}

impl From<Value> for TaskOutput {
    fn from(value: Value) -> Self {
        let discovery = parse_discovery(&value);
        Self { value, discovery }
    }
}

fn parse_discovery(value: &Value) -> Option<DiscoveryReport> {
    let obj = value.as_object()?;
    let flagged = obj.get("isDiscovery").is_some_and(truthy);
    let typed = obj.get("discoveryType").filter(|v| truthy(v));
    if !flagged && typed.is_none() {
        return None;
    }

    let discovery_type = match typed {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => DEFAULT_DISCOVERY_TYPE.to_string(),
    };
    let data = obj
        .get("discoveryData")
        .filter(|v| truthy(v))
        .cloned()
        .unwrap_or_else(|| value.clone());
    let confidence = obj
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_CONFIDENCE);

    Some(DiscoveryReport {
        discovery_type,
        data,
        confidence,
    })
}

/// Loose truthiness: null, false, 0 and "" are false.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

//! Validation of model replies
//!
//! A reply is only trusted once it has been decoded into a
//! [`ValidatedVerdict`]; anything else is a [`ParseFailure`].

use crate::types::{SemanticVerdict, VerdictSource};
use serde_json::{Map, Value};
use thiserror::Error;

/// Why a model reply was rejected
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseFailure {
    #[error("no JSON object in reply")]
    NoJsonObject,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("confidence {0} outside [0, 1]")]
    ConfidenceOutOfRange(f64),
}

/// A model reply that passed every check
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedVerdict {
    pub malicious: bool,
    pub confidence: f64,
    pub suspicious_patterns: Vec<String>,
    pub recommendations: Vec<String>,
    pub analysis: String,
}

impl ValidatedVerdict {
    pub fn into_verdict(self) -> SemanticVerdict {
        SemanticVerdict {
            malicious: self.malicious,
            confidence: self.confidence,
            suspicious_patterns: self.suspicious_patterns,
            recommendations: self.recommendations,
            explanation: self.analysis,
            source: VerdictSource::Model,
        }
    }
}

/// The span from the first `{` to the last `}`, which tolerates prose or
/// code fences around the object
fn extract_object(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}

/// Validate a raw model reply
pub fn validate(reply: &str) -> Result<ValidatedVerdict, ParseFailure> {
    let object = extract_object(reply).ok_or(ParseFailure::NoJsonObject)?;
    let value: Value =
        serde_json::from_str(object).map_err(|e| ParseFailure::InvalidJson(e.to_string()))?;
    let map = value.as_object().ok_or(ParseFailure::NoJsonObject)?;

    let malicious = match map.get("malicious_intent") {
        None | Some(Value::Null) => return Err(ParseFailure::MissingField("malicious_intent")),
        Some(Value::Bool(b)) => *b,
        Some(_) => {
            return Err(ParseFailure::WrongType {
                field: "malicious_intent",
                expected: "a boolean",
            })
        }
    };

    let confidence = match map.get("confidence") {
        None | Some(Value::Null) => return Err(ParseFailure::MissingField("confidence")),
        Some(Value::Number(n)) => n.as_f64().ok_or(ParseFailure::WrongType {
            field: "confidence",
            expected: "a number",
        })?,
        Some(_) => {
            return Err(ParseFailure::WrongType {
                field: "confidence",
                expected: "a number",
            })
        }
    };
    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        return Err(ParseFailure::ConfidenceOutOfRange(confidence));
    }

    Ok(ValidatedVerdict {
        malicious,
        confidence,
        suspicious_patterns: string_list(map, "suspicious_patterns")?,
        recommendations: string_list(map, "recommendations")?,
        analysis: match map.get("analysis") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(_) => {
                return Err(ParseFailure::WrongType {
                    field: "analysis",
                    expected: "a string",
                })
            }
        },
    })
}

fn string_list(map: &Map<String, Value>, field: &'static str) -> Result<Vec<String>, ParseFailure> {
    let wrong = ParseFailure::WrongType {
        field,
        expected: "an array of strings",
    };
    match map.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(|| wrong.clone()))
            .collect(),
        Some(_) => Err(wrong),
    }
}

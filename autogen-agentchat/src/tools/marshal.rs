//! Parameter marshaling: raw model-produced arguments to typed arguments.
//!
//! Marshaling is pure. It validates the raw JSON against a tool's
//! [`InputSchema`] and applies a small set of lossless coercions; every
//! other mismatch is a [`ValidationError`] naming the offending field.

use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat};
use serde_json::{Map, Number, Value};

use super::descriptor::{InputSchema, ParamType, ParameterSpec, ToolDescriptor};
use crate::error::ValidationError;

/// A single argument after marshaling
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    String(String),
    Number(f64),
    Integer(i64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    Array(Vec<Value>),
    Object(Map<String, Value>),
}

impl TypedValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TypedValue::Number(n) => Some(*n),
            TypedValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TypedValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TypedValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// JSON rendering; dates use ISO-8601 so the result marshals back to the same value
    pub fn to_json(&self) -> Value {
        match self {
            TypedValue::String(s) => Value::String(s.clone()),
            TypedValue::Number(n) => Number::from_f64(*n).map_or(Value::Null, Value::Number),
            TypedValue::Integer(i) => Value::Number((*i).into()),
            TypedValue::Boolean(b) => Value::Bool(*b),
            TypedValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            TypedValue::DateTime(dt) => Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            TypedValue::Array(items) => Value::Array(items.clone()),
            TypedValue::Object(map) => Value::Object(map.clone()),
        }
    }
}

/// Marshaled arguments in schema order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypedArgs {
    values: Vec<(String, TypedValue)>,
}

impl TypedArgs {
    pub fn get(&self, name: &str) -> Option<&TypedValue> {
        self.values.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TypedValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_json_map(&self) -> Map<String, Value> {
        self.values.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.to_json_map())
    }
}

/// Validates and coerces raw arguments for a tool
#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterMarshaler;

impl ParameterMarshaler {
    pub fn new() -> Self {
        Self
    }

    pub fn marshal(&self, descriptor: &ToolDescriptor, raw: &Value) -> Result<TypedArgs, ValidationError> {
        marshal_args(descriptor.input_schema(), raw)
    }
}

/// Marshal `raw` against `schema`.
///
/// # Examples
/// ```
/// use autogen_agentchat::tools::{marshal_args, InputSchema, ParamType, ParameterSpec};
/// use serde_json::json;
///
/// let schema = InputSchema::new(vec![ParameterSpec::required("x", ParamType::Number)]);
/// let args = marshal_args(&schema, &json!({"x": "12"})).unwrap();
/// assert_eq!(args.get("x").and_then(|v| v.as_f64()), Some(12.0));
/// ```
pub fn marshal_args(schema: &InputSchema, raw: &Value) -> Result<TypedArgs, ValidationError> {
    let parsed;
    let object = match raw {
        Value::Object(map) => map,
        Value::String(text) => {
            // Models send "" for calls without arguments
            parsed = if text.trim().is_empty() {
                Value::Object(Map::new())
            } else {
                serde_json::from_str::<Value>(text).map_err(|_| ValidationError::NotAnObject {
                    found: "string".to_string(),
                })?
            };
            parsed.as_object().ok_or_else(|| ValidationError::NotAnObject {
                found: json_type_name(&parsed).to_string(),
            })?
        }
        other => {
            return Err(ValidationError::NotAnObject {
                found: json_type_name(other).to_string(),
            })
        }
    };

    let mut unknown: Vec<&String> = object.keys().filter(|k| schema.get(k).is_none()).collect();
    unknown.sort();
    if let Some(field) = unknown.first() {
        return Err(ValidationError::UnknownParameter {
            field: (*field).clone(),
        });
    }

    let mut values = Vec::with_capacity(schema.len());
    for param in schema.iter() {
        match object.get(&param.name) {
            None | Some(Value::Null) => {
                if param.required {
                    return Err(ValidationError::MissingRequired {
                        field: param.name.clone(),
                    });
                }
            }
            Some(value) => {
                let typed = coerce(param, value)?;
                check_allowed(param, &typed)?;
                values.push((param.name.clone(), typed));
            }
        }
    }
    Ok(TypedArgs { values })
}

fn coerce(param: &ParameterSpec, value: &Value) -> Result<TypedValue, ValidationError> {
    let mismatch = || ValidationError::TypeMismatch {
        field: param.name.clone(),
        expected: param.param_type.to_string(),
        found: describe(value),
    };

    match param.param_type {
        ParamType::String => match value {
            Value::String(s) => Ok(TypedValue::String(s.clone())),
            _ => Err(mismatch()),
        },
        ParamType::Number => match value {
            Value::Number(n) => n.as_f64().filter(|f| f.is_finite()).map(TypedValue::Number).ok_or_else(mismatch),
            Value::String(s) => parse_finite(s).map(TypedValue::Number).ok_or_else(mismatch),
            _ => Err(mismatch()),
        },
        ParamType::Integer => {
            let as_float = match value {
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        return Ok(TypedValue::Integer(i));
                    }
                    n.as_f64()
                }
                Value::String(s) => {
                    if let Ok(i) = s.trim().parse::<i64>() {
                        return Ok(TypedValue::Integer(i));
                    }
                    parse_finite(s)
                }
                _ => None,
            };
            as_float.and_then(integral).map(TypedValue::Integer).ok_or_else(mismatch)
        }
        ParamType::Boolean => match value {
            Value::Bool(b) => Ok(TypedValue::Boolean(*b)),
            _ => Err(mismatch()),
        },
        ParamType::Date => match value {
            Value::String(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map(TypedValue::Date)
                .map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
        ParamType::DateTime => match value {
            Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
                .map(TypedValue::DateTime)
                .map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
        ParamType::Array => match value {
            Value::Array(items) => Ok(TypedValue::Array(items.clone())),
            _ => Err(mismatch()),
        },
        ParamType::Object => match value {
            Value::Object(map) => Ok(TypedValue::Object(map.clone())),
            _ => Err(mismatch()),
        },
    }
}

fn check_allowed(param: &ParameterSpec, typed: &TypedValue) -> Result<(), ValidationError> {
    let Some(allowed) = &param.allowed_values else {
        return Ok(());
    };
    let rendered = typed.to_json();
    let matches = allowed.iter().any(|candidate| match (candidate.as_f64(), rendered.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => *candidate == rendered,
    });
    if matches {
        Ok(())
    } else {
        Err(ValidationError::NotAllowed {
            field: param.name.clone(),
            value: rendered.to_string(),
        })
    }
}

fn parse_finite(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|f| f.is_finite())
}

fn integral(value: f64) -> Option<i64> {
    if value.is_finite() && value.fract() == 0.0 && value.abs() <= i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => {
            let shown: String = s.chars().take(40).collect();
            format!("string \"{}\"", shown)
        }
        Value::Number(n) => format!("number {}", n),
        other => json_type_name(other).to_string(),
    }
}

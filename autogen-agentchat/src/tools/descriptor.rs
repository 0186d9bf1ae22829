//! Tool descriptors: the immutable description of a registered tool.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use super::base_tool::ToolInvoker;
use crate::error::RegistryError;

/// Declared type of a tool parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    /// ISO-8601 calendar date (`YYYY-MM-DD`)
    Date,
    /// RFC 3339 timestamp
    DateTime,
    Array,
    Object,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Date => "date",
            ParamType::DateTime => "date_time",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }

    fn json_schema(&self) -> Value {
        match self {
            ParamType::Date => json!({"type": "string", "format": "date"}),
            ParamType::DateTime => json!({"type": "string", "format": "date-time"}),
            other => json!({"type": other.as_str()}),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared parameter of a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Enumeration constraint, compared after coercion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<Value>>,
}

impl ParameterSpec {
    pub fn required(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: true,
            description: None,
            allowed_values: None,
        }
    }

    pub fn optional(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_allowed_values(mut self, values: Vec<Value>) -> Self {
        self.allowed_values = Some(values);
        self
    }
}

/// Ordered set of parameter specifications
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputSchema {
    params: Vec<ParameterSpec>,
}

impl InputSchema {
    pub fn new(params: Vec<ParameterSpec>) -> Self {
        Self { params }
    }

    pub fn get(&self, name: &str) -> Option<&ParameterSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Render as a JSON Schema object suitable for a model's tool list
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &self.params {
            let mut prop = param.param_type.json_schema();
            if let Some(obj) = prop.as_object_mut() {
                if let Some(description) = &param.description {
                    obj.insert("description".to_string(), Value::String(description.clone()));
                }
                if let Some(values) = &param.allowed_values {
                    obj.insert("enum".to_string(), Value::Array(values.clone()));
                }
            }
            properties.insert(param.name.clone(), prop);
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }
}

/// Shape of a tool's successful output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Text,
    Structured,
    BinaryRef,
}

/// Tool definition as offered to a model client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Immutable description of a registered tool
#[derive(Clone)]
pub struct ToolDescriptor {
    name: String,
    description: String,
    input_schema: InputSchema,
    output_kind: OutputKind,
    result_schema: Option<Value>,
    #[cfg(feature = "validation")]
    compiled_result_schema: Option<Arc<jsonschema::JSONSchema>>,
    invoker: Arc<dyn ToolInvoker>,
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .field("output_kind", &self.output_kind)
            .field("result_schema", &self.result_schema)
            .finish_non_exhaustive()
    }
}

impl ToolDescriptor {
    /// Start building a descriptor
    ///
    /// # Examples
    /// ```
    /// use autogen_agentchat::tools::{FunctionTool, OutputKind, ParamType, ParameterSpec, ToolDescriptor, ToolOutcome};
    /// use serde_json::json;
    ///
    /// let square = ToolDescriptor::builder("square")
    ///     .description("Square a number")
    ///     .param(ParameterSpec::required("x", ParamType::Number))
    ///     .output_kind(OutputKind::Structured)
    ///     .build(FunctionTool::new(|args, _ctx| async move {
    ///         let x = args.get("x").and_then(|v| v.as_f64()).unwrap_or_default();
    ///         ToolOutcome::ok(json!({ "result": x * x }))
    ///     }))
    ///     .unwrap();
    /// assert_eq!(square.name(), "square");
    /// ```
    pub fn builder(name: impl Into<String>) -> ToolDescriptorBuilder {
        ToolDescriptorBuilder {
            name: name.into(),
            description: String::new(),
            params: Vec::new(),
            output_kind: OutputKind::Text,
            result_schema: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_schema(&self) -> &InputSchema {
        &self.input_schema
    }

    pub fn output_kind(&self) -> OutputKind {
        self.output_kind
    }

    pub fn result_schema(&self) -> Option<&Value> {
        self.result_schema.as_ref()
    }

    pub fn invoker(&self) -> &Arc<dyn ToolInvoker> {
        &self.invoker
    }

    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.input_schema.to_json_schema(),
        }
    }

    /// Check a structured payload against the declared result schema.
    /// Returns a description of the first violations on failure.
    pub fn validate_result(&self, payload: &Value) -> Result<(), String> {
        #[cfg(feature = "validation")]
        if let Some(schema) = &self.compiled_result_schema {
            if let Err(errors) = schema.validate(payload) {
                let details: Vec<String> = errors.take(3).map(|e| e.to_string()).collect();
                return Err(details.join("; "));
            }
        }
        #[cfg(not(feature = "validation"))]
        let _ = payload;
        Ok(())
    }
}

/// Builder for [`ToolDescriptor`]
#[derive(Debug, Clone)]
pub struct ToolDescriptorBuilder {
    name: String,
    description: String,
    params: Vec<ParameterSpec>,
    output_kind: OutputKind,
    result_schema: Option<Value>,
}

impl ToolDescriptorBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn param(mut self, param: ParameterSpec) -> Self {
        self.params.push(param);
        self
    }

    pub fn params(mut self, params: impl IntoIterator<Item = ParameterSpec>) -> Self {
        self.params.extend(params);
        self
    }

    pub fn output_kind(mut self, kind: OutputKind) -> Self {
        self.output_kind = kind;
        self
    }

    pub fn result_schema(mut self, schema: Value) -> Self {
        self.result_schema = Some(schema);
        self
    }

    /// Finish the descriptor, attaching the invoker that performs the call
    pub fn build(self, invoker: impl ToolInvoker + 'static) -> Result<ToolDescriptor, RegistryError> {
        self.build_shared(Arc::new(invoker))
    }

    pub fn build_shared(self, invoker: Arc<dyn ToolInvoker>) -> Result<ToolDescriptor, RegistryError> {
        let invalid = |reason: String| RegistryError::InvalidDescriptor {
            name: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("tool name must not be empty".to_string()));
        }
        if self.name.chars().any(char::is_whitespace) {
            return Err(invalid("tool name must not contain whitespace".to_string()));
        }
        let mut seen = HashSet::new();
        for param in &self.params {
            if param.name.is_empty() {
                return Err(invalid("parameter names must not be empty".to_string()));
            }
            if !seen.insert(param.name.as_str()) {
                return Err(invalid(format!("parameter '{}' declared twice", param.name)));
            }
        }

        #[cfg(feature = "validation")]
        let compiled_result_schema = match &self.result_schema {
            Some(schema) => Some(Arc::new(
                jsonschema::JSONSchema::compile(schema)
                    .map_err(|e| invalid(format!("invalid result schema: {}", e)))?,
            )),
            None => None,
        };

        Ok(ToolDescriptor {
            name: self.name,
            description: self.description,
            input_schema: InputSchema::new(self.params),
            output_kind: self.output_kind,
            result_schema: self.result_schema,
            #[cfg(feature = "validation")]
            compiled_result_schema,
            invoker,
        })
    }
}

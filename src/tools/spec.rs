//! Canonical tool schemas and their per-provider encodings.
//!
//! Every tool declares one [`ToolSpec`]. The provider adapters never hold
//! their own schema lists; they call [`openai_tools`], [`anthropic_tools`]
//! or [`gemini_tools`] on the same slice.

use serde_json::{json, Map, Value};

/// Scalar type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Boolean,
}

impl ParamType {
    fn json_name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        }
    }

    fn gemini_name(self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Integer => "INTEGER",
            Self::Boolean => "BOOLEAN",
        }
    }
}

/// One parameter of a tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamType,
    pub description: &'static str,
    pub required: bool,
}

impl ParamSpec {
    pub const fn required(name: &'static str, kind: ParamType, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: ParamType, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            required: false,
        }
    }
}

/// Static description of a tool, sent to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
}

impl ToolSpec {
    /// Object schema shared by the OpenAI and Anthropic dialects.
    fn object_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|p| {
                (
                    p.name.to_string(),
                    json!({"type": p.kind.json_name(), "description": p.description}),
                )
            })
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": self.required_names(),
        })
    }

    fn required_names(&self) -> Vec<&'static str> {
        self.params.iter().filter(|p| p.required).map(|p| p.name).collect()
    }

    /// Checks `args` against the declared parameters and coerces near-miss
    /// scalar types (numeric strings, integral floats, `"true"`/`"false"`).
    ///
    /// Null values are treated as absent.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message naming the first offending argument.
    pub fn validate(&self, args: &Map<String, Value>) -> Result<Map<String, Value>, String> {
        if let Some(unknown) = args
            .keys()
            .find(|k| !self.params.iter().any(|p| p.name == k.as_str()))
        {
            return Err(format!("unexpected argument '{unknown}' for {}", self.name));
        }

        let mut out = Map::new();
        for param in &self.params {
            match args.get(param.name) {
                None | Some(Value::Null) => {
                    if param.required {
                        return Err(format!("missing required argument '{}'", param.name));
                    }
                }
                Some(value) => {
                    let coerced = coerce(param.kind, value).ok_or_else(|| {
                        format!(
                            "argument '{}' must be of type {}, got {}",
                            param.name,
                            param.kind.json_name(),
                            value
                        )
                    })?;
                    out.insert(param.name.to_string(), coerced);
                }
            }
        }
        Ok(out)
    }
}

fn coerce(kind: ParamType, value: &Value) -> Option<Value> {
    match (kind, value) {
        (ParamType::String, Value::String(_)) => Some(value.clone()),
        (ParamType::String, Value::Number(n)) => Some(Value::String(n.to_string())),
        (ParamType::Integer, Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                Some(json!(i))
            } else {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| json!(f as i64))
            }
        }
        (ParamType::Integer, Value::String(s)) => s.trim().parse::<i64>().ok().map(|i| json!(i)),
        (ParamType::Boolean, Value::Bool(_)) => Some(value.clone()),
        (ParamType::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}

/// Chat Completions dialect: `{type: "function", function: {name, description, parameters}}`.
pub fn openai_tools(specs: &[ToolSpec]) -> Vec<Value> {
    specs
        .iter()
        .map(|s| {
            json!({
                "type": "function",
                "function": {
                    "name": s.name,
                    "description": s.description,
                    "parameters": s.object_schema(),
                }
            })
        })
        .collect()
}

/// Messages API dialect: `{name, description, input_schema}`.
pub fn anthropic_tools(specs: &[ToolSpec]) -> Vec<Value> {
    specs
        .iter()
        .map(|s| {
            json!({
                "name": s.name,
                "description": s.description,
                "input_schema": s.object_schema(),
            })
        })
        .collect()
}

/// Gemini dialect: one `functionDeclarations` group with upper-case type tags.
pub fn gemini_tools(specs: &[ToolSpec]) -> Vec<Value> {
    if specs.is_empty() {
        return Vec::new();
    }
    let declarations: Vec<Value> = specs
        .iter()
        .map(|s| {
            let properties: Map<String, Value> = s
                .params
                .iter()
                .map(|p| {
                    (
                        p.name.to_string(),
                        json!({"type": p.kind.gemini_name(), "description": p.description}),
                    )
                })
                .collect();
            let mut parameters = json!({"type": "OBJECT", "properties": properties});
            let required = s.required_names();
            if !required.is_empty() {
                parameters["required"] = json!(required);
            }
            json!({
                "name": s.name,
                "description": s.description,
                "parameters": parameters,
            })
        })
        .collect();
    vec![json!({"functionDeclarations": declarations})]
}

//! Declarative input schemas.
//!
//! Each tool owns one [`InputSchema`]: a flat list of field specs with
//! kinds, constraints and defaults. Validation is pure, applies defaults,
//! and reports the complete list of violations so a caller can fix its
//! arguments in a single round trip.

use serde_json::{json, Map, Value};
use url::Url;

use toolgate_core_types::Violation;

/// Primitive constraint set for one field.
#[derive(Clone, Debug)]
pub enum FieldKind {
    String {
        min_len: Option<usize>,
        max_len: Option<usize>,
    },
    /// A string that must parse as an absolute URL.
    Url,
    /// A string restricted to a closed set of variants.
    Enum { variants: Vec<&'static str> },
    Integer { min: Option<i64>, max: Option<i64> },
    Number,
    Boolean,
    Object,
    Array,
}

impl FieldKind {
    pub fn string() -> Self {
        Self::String {
            min_len: None,
            max_len: None,
        }
    }

    pub fn string_bounded(min_len: usize, max_len: usize) -> Self {
        Self::String {
            min_len: Some(min_len),
            max_len: Some(max_len),
        }
    }

    pub fn one_of(variants: &[&'static str]) -> Self {
        Self::Enum {
            variants: variants.to_vec(),
        }
    }

    pub fn integer() -> Self {
        Self::Integer {
            min: None,
            max: None,
        }
    }

    pub fn integer_range(min: i64, max: i64) -> Self {
        Self::Integer {
            min: Some(min),
            max: Some(max),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::String { .. } | Self::Url | Self::Enum { .. } => "string",
            Self::Integer { .. } => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }

    /// Check `value` against this kind, returning a human-readable reason
    /// on mismatch.
    fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            Self::String { min_len, max_len } => {
                let text = value
                    .as_str()
                    .ok_or_else(|| "expected a string".to_string())?;
                if let Some(min) = min_len {
                    if text.chars().count() < *min {
                        return Err(format!("shorter than {min} characters"));
                    }
                }
                if let Some(max) = max_len {
                    if text.chars().count() > *max {
                        return Err(format!("longer than {max} characters"));
                    }
                }
                Ok(())
            }
            Self::Url => {
                let text = value
                    .as_str()
                    .ok_or_else(|| "expected a string".to_string())?;
                Url::parse(text).map(|_| ()).map_err(|err| format!("not a valid URL: {err}"))
            }
            Self::Enum { variants } => {
                let text = value
                    .as_str()
                    .ok_or_else(|| "expected a string".to_string())?;
                if variants.iter().any(|variant| *variant == text) {
                    Ok(())
                } else {
                    Err(format!("must be one of: {}", variants.join(", ")))
                }
            }
            Self::Integer { min, max } => {
                let number = value
                    .as_i64()
                    .ok_or_else(|| "expected an integer".to_string())?;
                if let Some(min) = min {
                    if number < *min {
                        return Err(format!("below minimum {min}"));
                    }
                }
                if let Some(max) = max {
                    if number > *max {
                        return Err(format!("above maximum {max}"));
                    }
                }
                Ok(())
            }
            Self::Number => value
                .as_f64()
                .map(|_| ())
                .ok_or_else(|| "expected a number".to_string()),
            Self::Boolean => value
                .as_bool()
                .map(|_| ())
                .ok_or_else(|| "expected a boolean".to_string()),
            Self::Object => value
                .as_object()
                .map(|_| ())
                .ok_or_else(|| "expected an object".to_string()),
            Self::Array => value
                .as_array()
                .map(|_| ())
                .ok_or_else(|| "expected an array".to_string()),
        }
    }

    fn json_schema(&self) -> Value {
        let mut out = json!({ "type": self.type_name() });
        match self {
            Self::String { min_len, max_len } => {
                if let Some(min) = min_len {
                    out["minLength"] = json!(min);
                }
                if let Some(max) = max_len {
                    out["maxLength"] = json!(max);
                }
            }
            Self::Url => {
                out["format"] = json!("uri");
            }
            Self::Enum { variants } => {
                out["enum"] = json!(variants);
            }
            Self::Integer { min, max } => {
                if let Some(min) = min {
                    out["minimum"] = json!(min);
                }
                if let Some(max) = max {
                    out["maximum"] = json!(max);
                }
            }
            _ => {}
        }
        out
    }
}

#[derive(Clone, Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub default: Option<Value>,
}

/// Declarative argument schema for one tool.
#[derive(Clone, Debug, Default)]
pub struct InputSchema {
    fields: Vec<FieldSpec>,
}

impl InputSchema {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builder() -> InputSchemaBuilder {
        InputSchemaBuilder::default()
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Validate raw arguments against this schema.
    ///
    /// Returns the normalized arguments (defaults applied) or every
    /// violation found, never just the first.
    pub fn validate(&self, raw: &Map<String, Value>) -> Result<Map<String, Value>, Vec<Violation>> {
        let mut violations = Vec::new();
        let mut normalized = Map::new();

        for spec in &self.fields {
            match raw.get(spec.name) {
                Some(Value::Null) | None => {
                    if let Some(default) = &spec.default {
                        normalized.insert(spec.name.to_string(), default.clone());
                    } else if spec.required {
                        violations.push(Violation::new(spec.name, "required field is missing"));
                    }
                }
                Some(value) => match spec.kind.check(value) {
                    Ok(()) => {
                        normalized.insert(spec.name.to_string(), value.clone());
                    }
                    Err(reason) => violations.push(Violation::new(spec.name, reason)),
                },
            }
        }

        for key in raw.keys() {
            if !self.fields.iter().any(|spec| spec.name == key.as_str()) {
                violations.push(Violation::new(key.as_str(), "unknown field"));
            }
        }

        if violations.is_empty() {
            Ok(normalized)
        } else {
            Err(violations)
        }
    }

    /// Render the schema as a JSON Schema object for capability discovery.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for spec in &self.fields {
            let mut field = spec.kind.json_schema();
            if !spec.description.is_empty() {
                field["description"] = json!(spec.description);
            }
            if let Some(default) = &spec.default {
                field["default"] = default.clone();
            }
            properties.insert(spec.name.to_string(), field);
            if spec.required {
                required.push(spec.name);
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

#[derive(Default)]
pub struct InputSchemaBuilder {
    fields: Vec<FieldSpec>,
}

impl InputSchemaBuilder {
    pub fn required(mut self, name: &'static str, kind: FieldKind, description: &'static str) -> Self {
        self.fields.push(FieldSpec {
            name,
            description,
            kind,
            required: true,
            default: None,
        });
        self
    }

    pub fn optional(mut self, name: &'static str, kind: FieldKind, description: &'static str) -> Self {
        self.fields.push(FieldSpec {
            name,
            description,
            kind,
            required: false,
            default: None,
        });
        self
    }

    pub fn optional_with_default(
        mut self,
        name: &'static str,
        kind: FieldKind,
        description: &'static str,
        default: Value,
    ) -> Self {
        self.fields.push(FieldSpec {
            name,
            description,
            kind,
            required: false,
            default: Some(default),
        });
        self
    }

    pub fn build(self) -> InputSchema {
        InputSchema {
            fields: self.fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> InputSchema {
        InputSchema::builder()
            .required("url", FieldKind::Url, "Target URL")
            .optional_with_default(
                "timeout_ms",
                FieldKind::integer_range(1, 60_000),
                "Navigation budget",
                json!(10_000),
            )
            .optional("button", FieldKind::one_of(&["left", "middle", "right"]), "")
            .build()
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn applies_defaults_and_normalizes() {
        let normalized = sample()
            .validate(&args(json!({"url": "https://example.com"})))
            .unwrap();
        assert_eq!(normalized["url"], "https://example.com");
        assert_eq!(normalized["timeout_ms"], 10_000);
        assert!(!normalized.contains_key("button"));
    }

    #[test]
    fn reports_every_violation_at_once() {
        let violations = sample()
            .validate(&args(json!({
                "timeout_ms": 0,
                "button": "reverse",
                "bogus": true,
            })))
            .unwrap_err();
        let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
        assert!(fields.contains(&"url"));
        assert!(fields.contains(&"timeout_ms"));
        assert!(fields.contains(&"button"));
        assert!(fields.contains(&"bogus"));
        assert_eq!(violations.len(), 4);
    }

    #[test]
    fn rejects_malformed_urls() {
        let violations = sample()
            .validate(&args(json!({"url": "not a url"})))
            .unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "url");
    }

    #[test]
    fn null_counts_as_missing() {
        let violations = sample()
            .validate(&args(json!({"url": null})))
            .unwrap_err();
        assert_eq!(violations[0].reason, "required field is missing");
    }

    #[test]
    fn json_schema_lists_required_fields() {
        let schema = sample().to_json_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["url"]));
        assert_eq!(schema["properties"]["url"]["format"], "uri");
        assert_eq!(schema["properties"]["timeout_ms"]["default"], 10_000);
        assert_eq!(schema["additionalProperties"], false);
    }
}

//! Declarative record schemas and their validation.
//!
//! A schema maps field names to a type, a required flag and an optional
//! format constraint:
//!
//! ```json
//! {
//!   "fields": {
//!     "title": { "type": "string", "required": true, "format": "non-empty" },
//!     "url":   { "type": "string", "required": true, "format": "url" },
//!     "index": { "type": "integer" }
//!   }
//! }
//! ```
//!
//! Validation is pure: it never mutates the record and collects every
//! violation instead of stopping at the first.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    /// Any JSON value.
    Any,
}

impl FieldType {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Array => value.is_array(),
            FieldType::Object => value.is_object(),
            FieldType::Any => true,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
            FieldType::Any => "any",
        }
    }
}

/// Format constraints, checked on string values only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldFormat {
    /// Absolute http(s) URL.
    Url,
    /// RFC 3339 timestamp.
    DateTime,
    /// `YYYY-MM-DD`.
    Date,
    /// At least one non-whitespace character.
    NonEmpty,
}

impl FieldFormat {
    fn check(&self, s: &str) -> Result<(), String> {
        match self {
            FieldFormat::Url => match Url::parse(s) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
                Ok(url) => Err(format!("URL scheme '{}' is not http/https", url.scheme())),
                Err(e) => Err(format!("not a valid absolute URL: {e}")),
            },
            FieldFormat::DateTime => DateTime::parse_from_rfc3339(s)
                .map(|_| ())
                .map_err(|e| format!("not an RFC 3339 date-time: {e}")),
            FieldFormat::Date => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(|_| ())
                .map_err(|e| format!("not a YYYY-MM-DD date: {e}")),
            FieldFormat::NonEmpty => {
                if s.trim().is_empty() {
                    Err("must not be empty".to_string())
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<FieldFormat>,
    /// Whether an explicit `null` is acceptable.
    #[serde(default)]
    pub nullable: bool,
}

impl FieldRule {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            format: None,
            nullable: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_format(mut self, format: FieldFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// Structural description of the records one scrape type produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSchema {
    pub fields: BTreeMap<String, FieldRule>,
    /// Whether fields not listed in `fields` are tolerated.
    #[serde(default = "default_true")]
    pub allow_unknown_fields: bool,
}

fn default_true() -> bool {
    true
}

impl RecordSchema {
    pub fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
            allow_unknown_fields: true,
        }
    }

    pub fn field(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        self.fields.insert(name.into(), rule);
        self
    }

    pub fn deny_unknown_fields(mut self) -> Self {
        self.allow_unknown_fields = false;
        self
    }

    pub fn validate(&self, record: &Value) -> ValidationResult {
        validate(record, self)
    }
}

impl Default for RecordSchema {
    fn default() -> Self {
        Self::new()
    }
}

/// One reason a record was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Field the violation applies to; empty for the record itself.
    pub path: String,
    pub message: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub violations: Vec<Violation>,
}

impl ValidationResult {
    fn from_violations(violations: Vec<Violation>) -> Self {
        Self {
            valid: violations.is_empty(),
            violations,
        }
    }
}

/// Check `record` against every rule in `schema`, collecting all violations.
pub fn validate(record: &Value, schema: &RecordSchema) -> ValidationResult {
    let Some(object) = record.as_object() else {
        return ValidationResult::from_violations(vec![Violation::new(
            "",
            format!("expected an object, found {}", json_type(record)),
        )]);
    };

    let mut violations = Vec::new();

    for (name, rule) in &schema.fields {
        match object.get(name) {
            None if rule.required => {
                violations.push(Violation::new(name, "required field is missing"));
            }
            None => {}
            Some(Value::Null) if rule.nullable || !rule.required => {}
            Some(Value::Null) => {
                violations.push(Violation::new(name, "required field is null"));
            }
            Some(value) if !rule.field_type.accepts(value) => {
                violations.push(Violation::new(
                    name,
                    format!(
                        "expected {}, found {}",
                        rule.field_type.as_str(),
                        json_type(value)
                    ),
                ));
            }
            Some(value) => {
                if let (Some(format), Some(s)) = (rule.format, value.as_str())
                    && let Err(message) = format.check(s)
                {
                    violations.push(Violation::new(name, message));
                }
            }
        }
    }

    if !schema.allow_unknown_fields {
        for name in object.keys() {
            if !schema.fields.contains_key(name) {
                violations.push(Violation::new(name, "unexpected field"));
            }
        }
    }

    ValidationResult::from_violations(violations)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Schema resolution
// ---------------------------------------------------------------------------

/// A schema loaded from disk together with its canonical name.
#[derive(Debug, Clone)]
pub struct ResolvedSchema {
    pub path: PathBuf,
    /// `name@version` for registry schemas, the file stem otherwise.
    pub name: String,
    pub schema: RecordSchema,
}

/// Resolves schema references against a schemas directory laid out as
/// `{schemas_dir}/{name}/{version}.json`, with `registry.json` mapping each
/// name to its latest version.
///
/// Accepted references:
/// - a direct file path (`schemas/toc/1.0.0.json`, `my_schema.json`)
/// - `name@version` (`toc@1.0.0`)
/// - `name@latest`
pub struct SchemaResolver {
    schemas_dir: PathBuf,
}

impl SchemaResolver {
    pub fn new(schemas_dir: impl Into<PathBuf>) -> Self {
        Self {
            schemas_dir: schemas_dir.into(),
        }
    }

    pub fn resolve(&self, schema_ref: &str) -> Result<ResolvedSchema, AppError> {
        let (path, name) = self.locate(schema_ref)?;

        let raw = std::fs::read_to_string(&path).map_err(|e| {
            AppError::SchemaError(format!("Failed to read schema {}: {e}", path.display()))
        })?;
        let schema: RecordSchema = serde_json::from_str(&raw).map_err(|e| {
            AppError::SchemaError(format!("Invalid schema in {}: {e}", path.display()))
        })?;

        Ok(ResolvedSchema { path, name, schema })
    }

    fn locate(&self, schema_ref: &str) -> Result<(PathBuf, String), AppError> {
        let direct = PathBuf::from(schema_ref);
        if direct.is_file() {
            let name = self
                .registry_name(&direct)
                .unwrap_or_else(|| derive_schema_name(&direct));
            return Ok((direct, name));
        }

        let Some((name, version)) = schema_ref.split_once('@') else {
            return Err(AppError::SchemaError(format!(
                "Schema not found: {schema_ref}"
            )));
        };
        if name.is_empty() || version.is_empty() {
            return Err(AppError::SchemaError(format!(
                "Schema reference must be name@version, got: {schema_ref}"
            )));
        }

        let version = if version == "latest" {
            self.latest_version(name)?
        } else {
            version.to_string()
        };

        let path = self.schemas_dir.join(name).join(format!("{version}.json"));
        if !path.is_file() {
            return Err(AppError::SchemaError(format!(
                "Schema file not found: {}",
                path.display()
            )));
        }
        Ok((path, format!("{name}@{version}")))
    }

    /// `name@version` for a path of the form `{schemas_dir}/{name}/{version}.json`.
    fn registry_name(&self, path: &Path) -> Option<String> {
        let path = path.canonicalize().ok()?;
        let root = self.schemas_dir.canonicalize().ok()?;
        let relative = path.strip_prefix(&root).ok()?;

        let parts: Vec<_> = relative.iter().filter_map(|c| c.to_str()).collect();
        match parts.as_slice() {
            [name, file] => {
                let version = Path::new(file).file_stem()?.to_str()?;
                Some(format!("{name}@{version}"))
            }
            _ => None,
        }
    }

    fn latest_version(&self, name: &str) -> Result<String, AppError> {
        let registry_path = self.schemas_dir.join("registry.json");
        let raw = std::fs::read_to_string(&registry_path).map_err(|e| {
            AppError::SchemaError(format!(
                "Failed to read schema registry {}: {e}",
                registry_path.display()
            ))
        })?;
        let registry: HashMap<String, String> = serde_json::from_str(&raw)
            .map_err(|e| AppError::SchemaError(format!("Invalid schema registry: {e}")))?;
        registry
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::SchemaError(format!("No latest version for schema {name}")))
    }
}

/// File stem of a schema path: `"schemas/toc.json"` → `"toc"`.
pub fn derive_schema_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("default")
        .to_string()
}

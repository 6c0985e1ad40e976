//! Normalization of Swagger 2.0 / OpenAPI 3.x documents into typed endpoint
//! records. Nothing downstream of [`normalize`] sees raw JSON.

use regex::Regex;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

const MAX_REF_DEPTH: usize = 16;
const MAX_BODY_DEPTH: usize = 3;
const MAX_ALL_OF_DEPTH: usize = 8;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Schema document must be a JSON/YAML object")]
    NotAnObject,

    #[error("Unsupported schema version: {0}")]
    UnsupportedVersion(String),

    #[error("Invalid schema: {0}")]
    Invalid(String),

    #[error("Schema defines no usable endpoints")]
    NoEndpoints,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpecVersion {
    Swagger2,
    OpenApi30,
    OpenApi31,
}

impl fmt::Display for SpecVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecVersion::Swagger2 => f.write_str("Swagger 2.0"),
            SpecVersion::OpenApi30 => f.write_str("OpenAPI 3.0"),
            SpecVersion::OpenApi31 => f.write_str("OpenAPI 3.1"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
    Options,
    Head,
    Patch,
    Trace,
}

impl HttpMethod {
    /// Order in which operations of one path item are emitted.
    pub const ALL: [HttpMethod; 8] = [
        HttpMethod::Get,
        HttpMethod::Put,
        HttpMethod::Post,
        HttpMethod::Delete,
        HttpMethod::Options,
        HttpMethod::Head,
        HttpMethod::Patch,
        HttpMethod::Trace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Head => "HEAD",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Trace => "TRACE",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// (path, method) identity of an endpoint, rendered as `GET /pets`.
///
/// Paths compare as exact strings, placeholders included.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct EndpointKey {
    pub path: String,
    pub method: String,
}

impl EndpointKey {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            path: path.trim().to_string(),
            method: method.trim().to_uppercase(),
        }
    }

    /// Parses the `METHOD /path` form used in related endpoint lists.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.split_whitespace();
        let method = HttpMethod::from_name(parts.next()?)?;
        let path = parts.next()?;
        if parts.next().is_some() || !path.starts_with('/') {
            return None;
        }
        Some(Self::new(method.as_str(), path))
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Cookie,
    Body,
}

impl ParamLocation {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "path" => Some(ParamLocation::Path),
            "query" => Some(ParamLocation::Query),
            "header" => Some(ParamLocation::Header),
            "cookie" => Some(ParamLocation::Cookie),
            "body" | "formData" => Some(ParamLocation::Body),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamLocation::Path => "path",
            ParamLocation::Query => "query",
            ParamLocation::Header => "header",
            ParamLocation::Cookie => "cookie",
            ParamLocation::Body => "body",
        }
    }
}

impl fmt::Display for ParamLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    Unknown(String),
}

impl ParamType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "string" => ParamType::String,
            "integer" => ParamType::Integer,
            "number" => ParamType::Number,
            "boolean" => ParamType::Boolean,
            "array" => ParamType::Array,
            "object" => ParamType::Object,
            other => ParamType::Unknown(other.to_string()),
        }
    }

    /// Reads `type`, accepting the 3.1 array form (`["string", "null"]`).
    fn from_schema(schema: &Value) -> Self {
        match schema.get("type") {
            Some(Value::String(name)) => Self::from_name(name),
            Some(Value::Array(names)) => names
                .iter()
                .filter_map(Value::as_str)
                .find(|name| *name != "null")
                .map(Self::from_name)
                .unwrap_or_else(|| ParamType::Unknown("null".to_string())),
            Some(other) => ParamType::Unknown(other.to_string()),
            None if schema.get("properties").is_some() => ParamType::Object,
            None if schema.get("items").is_some() => ParamType::Array,
            None => ParamType::Unknown("unspecified".to_string()),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::String => f.write_str("string"),
            ParamType::Integer => f.write_str("integer"),
            ParamType::Number => f.write_str("number"),
            ParamType::Boolean => f.write_str("boolean"),
            ParamType::Array => f.write_str("array"),
            ParamType::Object => f.write_str("object"),
            ParamType::Unknown(name) => write!(f, "unknown({})", name),
        }
    }
}

impl Serialize for ParamType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Constraints {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    pub exclusive_minimum: bool,
    pub exclusive_maximum: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    pub nullable: bool,
}

impl Constraints {
    pub fn is_empty(&self) -> bool {
        self.enum_values.is_empty()
            && self.minimum.is_none()
            && self.maximum.is_none()
            && self.pattern.is_none()
            && self.min_length.is_none()
            && self.max_length.is_none()
            && self.format.is_none()
    }

    fn from_schema(schema: &Value) -> Self {
        let mut constraints = Constraints {
            enum_values: schema
                .get("enum")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            minimum: schema.get("minimum").and_then(Value::as_f64),
            maximum: schema.get("maximum").and_then(Value::as_f64),
            pattern: schema.get("pattern").and_then(Value::as_str).map(String::from),
            min_length: schema.get("minLength").and_then(Value::as_u64).map(|n| n as usize),
            max_length: schema.get("maxLength").and_then(Value::as_u64).map(|n| n as usize),
            format: schema.get("format").and_then(Value::as_str).map(String::from),
            default: schema.get("default").cloned(),
            nullable: schema.get("nullable").and_then(Value::as_bool).unwrap_or(false),
            ..Default::default()
        };

        // 3.0 uses booleans next to minimum/maximum, 3.1 puts the bound itself here
        match schema.get("exclusiveMinimum") {
            Some(Value::Bool(flag)) => constraints.exclusive_minimum = *flag,
            Some(Value::Number(bound)) => {
                constraints.minimum = bound.as_f64();
                constraints.exclusive_minimum = true;
            }
            _ => {}
        }
        match schema.get("exclusiveMaximum") {
            Some(Value::Bool(flag)) => constraints.exclusive_maximum = *flag,
            Some(Value::Number(bound)) => {
                constraints.maximum = bound.as_f64();
                constraints.exclusive_maximum = true;
            }
            _ => {}
        }

        // Array length bounds live on the array, item constraints on `items`
        if let Some(items) = schema.get("items") {
            if constraints.enum_values.is_empty() {
                if let Some(values) = items.get("enum").and_then(Value::as_array) {
                    constraints.enum_values = values.iter().map(|v| Value::Array(vec![v.clone()])).collect();
                }
            }
            if constraints.min_length.is_none() {
                constraints.min_length = schema.get("minItems").and_then(Value::as_u64).map(|n| n as usize);
            }
            if constraints.max_length.is_none() {
                constraints.max_length = schema.get("maxItems").and_then(Value::as_u64).map(|n| n as usize);
            }
        }

        constraints
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub location: ParamLocation,
    pub param_type: ParamType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub constraints: Constraints,
}

impl Parameter {
    pub fn new(name: impl Into<String>, location: ParamLocation, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            location,
            param_type,
            required: location == ParamLocation::Path,
            description: None,
            constraints: Constraints::default(),
        }
    }

    /// `location.name`, unique within one endpoint.
    pub fn key(&self) -> String {
        format!("{}.{}", self.location, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Endpoint {
    pub path: String,
    pub method: HttpMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub parameters: Vec<Parameter>,
}

impl Endpoint {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            operation_id: None,
            summary: None,
            description: None,
            tags: Vec::new(),
            parameters: Vec::new(),
        }
    }

    pub fn key(&self) -> EndpointKey {
        EndpointKey::new(self.method.as_str(), &self.path)
    }

    pub fn required_parameter_count(&self) -> usize {
        self.parameters.iter().filter(|p| p.required).count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiSchema {
    pub title: String,
    pub api_version: String,
    pub spec_version: SpecVersion,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub endpoints: Vec<Endpoint>,
    pub warnings: Vec<String>,
}

impl ApiSchema {
    pub fn endpoint_keys(&self) -> Vec<EndpointKey> {
        self.endpoints.iter().map(Endpoint::key).collect()
    }

    pub fn parameter_count(&self) -> usize {
        self.endpoints.iter().map(|e| e.parameters.len()).sum()
    }
}

/// Detects the document flavour. Returns a warning when the version had to be inferred.
pub fn detect_version(doc: &Value) -> Result<(SpecVersion, Option<String>), SchemaError> {
    let obj = doc.as_object().ok_or(SchemaError::NotAnObject)?;

    if let Some(version) = obj.get("openapi") {
        let version = version_string(version);
        return if version.starts_with("3.1") {
            Ok((SpecVersion::OpenApi31, None))
        } else if version.starts_with("3.0") {
            Ok((SpecVersion::OpenApi30, None))
        } else if version.starts_with("3.") {
            Ok((
                SpecVersion::OpenApi30,
                Some(format!("OpenAPI version {} treated as 3.0", version)),
            ))
        } else {
            Err(SchemaError::UnsupportedVersion(format!("openapi {}", version)))
        };
    }

    if let Some(version) = obj.get("swagger") {
        let version = version_string(version);
        return if version.starts_with("2.") || version == "2" {
            Ok((SpecVersion::Swagger2, None))
        } else {
            Err(SchemaError::UnsupportedVersion(format!("swagger {}", version)))
        };
    }

    if obj.contains_key("paths") && obj.contains_key("info") {
        if obj.contains_key("definitions") {
            return Ok((
                SpecVersion::Swagger2,
                Some("No version field; inferred Swagger 2.0 from 'definitions'".to_string()),
            ));
        }
        let reason = if obj.contains_key("components") {
            "No version field; inferred OpenAPI 3.0 from 'components'"
        } else {
            "No version field; assuming OpenAPI 3.0"
        };
        return Ok((SpecVersion::OpenApi30, Some(reason.to_string())));
    }

    Err(SchemaError::UnsupportedVersion(
        "no 'openapi' or 'swagger' field".to_string(),
    ))
}

fn version_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// Validates and reshapes a raw schema document.
///
/// Malformed pieces are skipped with a warning. The only fatal outcomes are
/// an unrecognizable document, a missing `paths` object, or zero endpoints.
pub fn normalize(doc: &Value) -> Result<ApiSchema, SchemaError> {
    let (spec_version, version_warning) = detect_version(doc)?;
    let mut normalizer = Normalizer {
        root: doc,
        spec_version,
        warnings: Vec::new(),
    };
    if let Some(warning) = version_warning {
        normalizer.warn(warning);
    }

    let paths = doc
        .get("paths")
        .ok_or_else(|| SchemaError::Invalid("missing 'paths' object".to_string()))?
        .as_object()
        .ok_or_else(|| SchemaError::Invalid("'paths' must be an object".to_string()))?;

    let info = doc.get("info");
    if info.is_none() {
        normalizer.warn("missing 'info' object".to_string());
    }
    let title = info
        .and_then(|i| i.get("title"))
        .and_then(Value::as_str)
        .unwrap_or("Untitled API")
        .to_string();
    let api_version = info
        .and_then(|i| i.get("version"))
        .map(version_string)
        .unwrap_or_else(|| "unknown".to_string());

    let mut endpoints = Vec::new();
    for (path, item) in paths {
        if !path.starts_with('/') {
            normalizer.warn(format!("path '{}' does not start with '/'", path));
        }
        let Some(item) = normalizer.resolve(item, path) else {
            continue;
        };
        if !item.is_object() {
            normalizer.warn(format!("path item '{}' is not an object, skipped", path));
            continue;
        }
        endpoints.extend(normalizer.path_item(path, item));
    }

    if endpoints.is_empty() {
        return Err(SchemaError::NoEndpoints);
    }

    debug!(endpoints = endpoints.len(), version = %spec_version, "schema normalized");

    Ok(ApiSchema {
        title,
        api_version,
        spec_version,
        base_url: base_url(doc, spec_version),
        endpoints,
        warnings: normalizer.warnings,
    })
}

fn base_url(doc: &Value, version: SpecVersion) -> Option<String> {
    match version {
        SpecVersion::Swagger2 => {
            let host = doc.get("host").and_then(Value::as_str)?;
            let scheme = doc
                .get("schemes")
                .and_then(Value::as_array)
                .and_then(|s| s.first())
                .and_then(Value::as_str)
                .unwrap_or("https");
            let base_path = doc.get("basePath").and_then(Value::as_str).unwrap_or("");
            Some(format!("{}://{}{}", scheme, host, base_path))
        }
        _ => doc
            .get("servers")
            .and_then(Value::as_array)
            .and_then(|s| s.first())
            .and_then(|s| s.get("url"))
            .and_then(Value::as_str)
            .map(String::from),
    }
}

struct Normalizer<'a> {
    root: &'a Value,
    spec_version: SpecVersion,
    warnings: Vec<String>,
}

impl<'a> Normalizer<'a> {
    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }

    /// Follows local `$ref` chains. External references are not fetched.
    fn resolve(&mut self, value: &'a Value, context: &str) -> Option<&'a Value> {
        let mut current = value;
        for _ in 0..MAX_REF_DEPTH {
            let Some(reference) = current.get("$ref").and_then(Value::as_str) else {
                return Some(current);
            };
            let Some(pointer) = reference.strip_prefix('#') else {
                self.warn(format!("{}: external reference '{}' is not supported", context, reference));
                return None;
            };
            match self.root.pointer(pointer) {
                Some(target) => current = target,
                None => {
                    self.warn(format!("{}: unresolved reference '{}'", context, reference));
                    return None;
                }
            }
        }
        self.warn(format!("{}: reference chain too deep or cyclic", context));
        None
    }

    fn path_item(&mut self, path: &str, item: &'a Value) -> Vec<Endpoint> {
        let shared = self.parameter_list(item.get("parameters"), path);
        let mut endpoints = Vec::new();

        for method in HttpMethod::ALL {
            let Some(operation) = item.get(method.as_str().to_lowercase()) else {
                continue;
            };
            let context = format!("{} {}", method, path);
            let Some(operation) = self.resolve(operation, &context) else {
                continue;
            };
            if !operation.is_object() {
                self.warn(format!("{}: operation is not an object, skipped", context));
                continue;
            }
            endpoints.push(self.operation(path, method, operation, &shared, &context));
        }

        endpoints
    }

    fn operation(
        &mut self,
        path: &str,
        method: HttpMethod,
        operation: &'a Value,
        shared: &[Parameter],
        context: &str,
    ) -> Endpoint {
        let mut endpoint = Endpoint::new(method, path);
        endpoint.operation_id = operation.get("operationId").and_then(Value::as_str).map(String::from);
        endpoint.summary = operation.get("summary").and_then(Value::as_str).map(String::from);
        endpoint.description = operation.get("description").and_then(Value::as_str).map(String::from);
        endpoint.tags = operation
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| tags.iter().filter_map(Value::as_str).map(String::from).collect())
            .unwrap_or_default();

        // Operation-level parameters override path-level ones with the same name and location
        let mut parameters: Vec<Parameter> = shared.to_vec();
        for param in self.parameter_list(operation.get("parameters"), context) {
            match parameters
                .iter_mut()
                .find(|p| p.name == param.name && p.location == param.location)
            {
                Some(existing) => *existing = param,
                None => parameters.push(param),
            }
        }

        if self.spec_version != SpecVersion::Swagger2 {
            if let Some(body) = operation.get("requestBody") {
                parameters.extend(self.request_body(body, context));
            }
        }

        for name in path_placeholders(path) {
            let declared = parameters
                .iter()
                .any(|p| p.location == ParamLocation::Path && p.name == name);
            if !declared {
                self.warn(format!("{}: path placeholder '{{{}}}' is not declared, assuming string", context, name));
                parameters.push(Parameter::new(name, ParamLocation::Path, ParamType::String));
            }
        }

        endpoint.parameters = parameters;
        endpoint
    }

    fn parameter_list(&mut self, list: Option<&'a Value>, context: &str) -> Vec<Parameter> {
        let Some(list) = list else {
            return Vec::new();
        };
        let Some(items) = list.as_array() else {
            self.warn(format!("{}: 'parameters' is not an array", context));
            return Vec::new();
        };

        let mut parameters = Vec::new();
        for raw in items {
            parameters.extend(self.parameter(raw, context));
        }
        parameters
    }

    fn parameter(&mut self, raw: &'a Value, context: &str) -> Vec<Parameter> {
        let Some(raw) = self.resolve(raw, context) else {
            return Vec::new();
        };
        let Some(name) = raw.get("name").and_then(Value::as_str) else {
            self.warn(format!("{}: parameter without a name skipped", context));
            return Vec::new();
        };
        let location_name = raw.get("in").and_then(Value::as_str).unwrap_or("");
        let Some(location) = ParamLocation::from_name(location_name) else {
            self.warn(format!(
                "{}: parameter '{}' has unknown location '{}', skipped",
                context, name, location_name
            ));
            return Vec::new();
        };
        let required = raw
            .get("required")
            .and_then(Value::as_bool)
            .unwrap_or(location == ParamLocation::Path);
        let description = raw.get("description").and_then(Value::as_str).map(String::from);

        // Swagger 2.0 body parameter: its schema properties become parameters
        if location_name == "body" {
            let mut out = Vec::new();
            match raw.get("schema").and_then(|s| self.resolve(s, context)) {
                Some(schema) => self.flatten_body(schema, "", required, 0, context, &mut out),
                None => out.push(Parameter {
                    required,
                    ..Parameter::new(name, location, ParamType::Unknown("unspecified".to_string()))
                }),
            }
            return out;
        }

        // 3.x keeps type information under `schema` or `content`, 2.0 inline
        let schema = match (raw.get("schema"), raw.get("content")) {
            (Some(schema), _) => self.resolve(schema, context),
            (None, Some(content)) => self.media_schema(content, context),
            (None, None) => Some(raw),
        };

        let mut parameter = match schema {
            Some(schema) => self.parameter_from_schema(name.to_string(), location, required, schema),
            None => Parameter {
                required,
                ..Parameter::new(name, location, ParamType::Unknown("unresolved".to_string()))
            },
        };
        if parameter.description.is_none() {
            parameter.description = description;
        }
        vec![parameter]
    }

    fn request_body(&mut self, body: &'a Value, context: &str) -> Vec<Parameter> {
        let Some(body) = self.resolve(body, context) else {
            return Vec::new();
        };
        let required = body.get("required").and_then(Value::as_bool).unwrap_or(false);
        let Some(content) = body.get("content") else {
            self.warn(format!("{}: requestBody has no content", context));
            return Vec::new();
        };

        let mut out = Vec::new();
        if let Some(schema) = self.media_schema(content, context) {
            self.flatten_body(schema, "", required, 0, context, &mut out);
        }
        out
    }

    /// Schema of the JSON-like media type, or of the first one listed.
    fn media_schema(&mut self, content: &'a Value, context: &str) -> Option<&'a Value> {
        let media = content.as_object()?;
        let chosen = media
            .iter()
            .find(|(media_type, _)| media_type.contains("json"))
            .or_else(|| media.iter().next())
            .map(|(_, media)| media)?;
        let schema = chosen.get("schema")?;
        self.resolve(schema, context)
    }

    fn flatten_body(
        &mut self,
        schema: &'a Value,
        prefix: &str,
        required: bool,
        depth: usize,
        context: &str,
        out: &mut Vec<Parameter>,
    ) {
        let (properties, required_names) = self.object_properties(schema, context, 0);

        if properties.is_empty() || depth >= MAX_BODY_DEPTH {
            let name = if prefix.is_empty() { "body" } else { prefix };
            out.push(self.parameter_from_schema(name.to_string(), ParamLocation::Body, required, schema));
            return;
        }

        for (name, property) in properties {
            let full_name = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}.{}", prefix, name)
            };
            let is_required = required_names.contains(&name);
            match self.resolve(property, context) {
                Some(resolved) => {
                    self.flatten_body(resolved, &full_name, is_required, depth + 1, context, out)
                }
                None => out.push(Parameter {
                    required: is_required,
                    ..Parameter::new(full_name, ParamLocation::Body, ParamType::Unknown("unresolved".to_string()))
                }),
            }
        }
    }

    /// Own `properties` plus those merged in through `allOf`.
    fn object_properties(
        &mut self,
        schema: &'a Value,
        context: &str,
        depth: usize,
    ) -> (Vec<(String, &'a Value)>, HashSet<String>) {
        let mut properties: Vec<(String, &'a Value)> = Vec::new();
        let mut required: HashSet<String> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).map(String::from).collect())
            .unwrap_or_default();

        if let Some(map) = schema.get("properties").and_then(Value::as_object) {
            properties.extend(map.iter().map(|(name, value)| (name.clone(), value)));
        }

        if depth < MAX_ALL_OF_DEPTH {
            if let Some(parts) = schema.get("allOf").and_then(Value::as_array) {
                for part in parts {
                    let Some(part) = self.resolve(part, context) else {
                        continue;
                    };
                    let (more, more_required) = self.object_properties(part, context, depth + 1);
                    for (name, value) in more {
                        if !properties.iter().any(|(existing, _)| existing == &name) {
                            properties.push((name, value));
                        }
                    }
                    required.extend(more_required);
                }
            }
        }

        (properties, required)
    }

    fn parameter_from_schema(
        &mut self,
        name: String,
        location: ParamLocation,
        required: bool,
        schema: &'a Value,
    ) -> Parameter {
        let param_type = ParamType::from_schema(schema);
        if let ParamType::Unknown(kind) = &param_type {
            debug!(parameter = %name, kind = %kind, "parameter type not recognized");
        }
        Parameter {
            name,
            location,
            param_type,
            required,
            description: schema.get("description").and_then(Value::as_str).map(String::from),
            constraints: Constraints::from_schema(schema),
        }
    }
}

/// Names inside `{...}` segments of a path template, in order.
pub fn path_placeholders(path: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = path;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            break;
        };
        let name = after[..end].trim();
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
        rest = &after[end + 1..];
    }
    names
}

/// Path with every placeholder replaced by `{*}`. Used for hints only;
/// endpoint matching stays exact.
pub fn placeholder_shape(path: &str) -> String {
    static_placeholder_regex()
        .map(|re| re.replace_all(path, "{*}").into_owned())
        .unwrap_or_else(|| path.to_string())
}

fn static_placeholder_regex() -> Option<Regex> {
    Regex::new(r"\{[^}/]*\}|<[^>/]*>|:[A-Za-z_][A-Za-z0-9_]*").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn petstore_v3() -> Value {
        json!({
            "openapi": "3.0.3",
            "info": {"title": "Petstore", "version": "1.0.0"},
            "servers": [{"url": "https://petstore.example.com/v1"}],
            "paths": {
                "/pets": {
                    "get": {
                        "summary": "List pets",
                        "parameters": [
                            {"name": "limit", "in": "query", "schema": {"type": "integer", "minimum": 1, "maximum": 100}},
                            {"$ref": "#/components/parameters/Status"}
                        ]
                    },
                    "post": {
                        "requestBody": {
                            "required": true,
                            "content": {"application/json": {"schema": {"$ref": "#/components/schemas/NewPet"}}}
                        }
                    }
                },
                "/pets/{id}": {
                    "parameters": [{"name": "id", "in": "path", "required": true, "schema": {"type": "string"}}],
                    "get": {},
                    "delete": {
                        "parameters": [{"name": "id", "in": "path", "required": true, "schema": {"type": "integer"}}]
                    }
                }
            },
            "components": {
                "parameters": {
                    "Status": {"name": "status", "in": "query", "schema": {"type": "string", "enum": ["available", "sold"]}}
                },
                "schemas": {
                    "NewPet": {
                        "type": "object",
                        "required": ["name"],
                        "properties": {
                            "name": {"type": "string", "minLength": 1, "maxLength": 20},
                            "owner": {
                                "type": "object",
                                "properties": {"email": {"type": "string", "format": "email"}}
                            }
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn test_normalizes_openapi3_document() {
        let api = normalize(&petstore_v3()).unwrap();
        assert_eq!(api.title, "Petstore");
        assert_eq!(api.spec_version, SpecVersion::OpenApi30);
        assert_eq!(api.base_url.as_deref(), Some("https://petstore.example.com/v1"));

        let keys: Vec<String> = api.endpoint_keys().iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["GET /pets", "POST /pets", "GET /pets/{id}", "DELETE /pets/{id}"]);
    }

    #[test]
    fn test_resolves_parameter_refs_and_enums() {
        let api = normalize(&petstore_v3()).unwrap();
        let list = &api.endpoints[0];
        let status = list.parameters.iter().find(|p| p.name == "status").unwrap();
        assert_eq!(status.location, ParamLocation::Query);
        assert_eq!(status.constraints.enum_values, vec![json!("available"), json!("sold")]);
    }

    #[test]
    fn test_request_body_is_flattened_with_dotted_names() {
        let api = normalize(&petstore_v3()).unwrap();
        let create = &api.endpoints[1];
        let names: Vec<&str> = create.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["name", "owner.email"]);
        assert!(create.parameters[0].required);
        assert_eq!(create.parameters[1].constraints.format.as_deref(), Some("email"));
    }

    #[test]
    fn test_operation_parameters_override_path_level() {
        let api = normalize(&petstore_v3()).unwrap();
        let delete = api.endpoints.iter().find(|e| e.method == HttpMethod::Delete).unwrap();
        assert_eq!(delete.parameters.len(), 1);
        assert_eq!(delete.parameters[0].param_type, ParamType::Integer);
    }

    #[test]
    fn test_swagger2_body_and_inline_types() {
        let doc = json!({
            "swagger": "2.0",
            "info": {"title": "Legacy", "version": "2"},
            "host": "api.example.com",
            "basePath": "/v2",
            "paths": {
                "/users": {
                    "post": {
                        "parameters": [
                            {"name": "payload", "in": "body", "schema": {"$ref": "#/definitions/User"}},
                            {"name": "X-Trace", "in": "header", "type": "string", "pattern": "^[a-f0-9]{8}$"}
                        ]
                    }
                }
            },
            "definitions": {
                "User": {"type": "object", "properties": {"active": {"type": "boolean"}}}
            }
        });
        let api = normalize(&doc).unwrap();
        assert_eq!(api.spec_version, SpecVersion::Swagger2);
        assert_eq!(api.base_url.as_deref(), Some("https://api.example.com/v2"));

        let params = &api.endpoints[0].parameters;
        assert_eq!(params[0].name, "active");
        assert_eq!(params[0].location, ParamLocation::Body);
        assert_eq!(params[0].param_type, ParamType::Boolean);
        assert_eq!(params[1].constraints.pattern.as_deref(), Some("^[a-f0-9]{8}$"));
    }

    #[test]
    fn test_openapi31_numeric_exclusive_bounds_and_type_arrays() {
        let doc = json!({
            "openapi": "3.1.0",
            "info": {"title": "t", "version": "1"},
            "paths": {"/items": {"get": {"parameters": [
                {"name": "score", "in": "query", "schema": {"type": ["integer", "null"], "exclusiveMinimum": 0, "maximum": 10}}
            ]}}}
        });
        let api = normalize(&doc).unwrap();
        let score = &api.endpoints[0].parameters[0];
        assert_eq!(score.param_type, ParamType::Integer);
        assert_eq!(score.constraints.minimum, Some(0.0));
        assert!(score.constraints.exclusive_minimum);
    }

    #[test]
    fn test_undeclared_placeholder_is_added_with_warning() {
        let doc = json!({
            "openapi": "3.0.0",
            "info": {"title": "t", "version": "1"},
            "paths": {"/orders/{orderId}": {"get": {}}}
        });
        let api = normalize(&doc).unwrap();
        let params = &api.endpoints[0].parameters;
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].name, "orderId");
        assert!(params[0].required);
        assert_eq!(api.warnings.len(), 1);
    }

    #[test]
    fn test_broken_pieces_are_warnings_not_errors() {
        let doc = json!({
            "openapi": "3.0.0",
            "paths": {
                "/a": {"get": {"parameters": [{"in": "query"}, {"$ref": "#/components/parameters/Missing"}]}},
                "/b": "not an object"
            }
        });
        let api = normalize(&doc).unwrap();
        assert_eq!(api.endpoints.len(), 1);
        assert!(api.warnings.len() >= 3);
        assert_eq!(api.title, "Untitled API");
    }

    #[test]
    fn test_fatal_conditions() {
        assert!(matches!(normalize(&json!([1, 2])), Err(SchemaError::NotAnObject)));
        assert!(matches!(
            normalize(&json!({"openapi": "3.0.0", "info": {}, "paths": {}})),
            Err(SchemaError::NoEndpoints)
        ));
        assert!(matches!(
            normalize(&json!({"swagger": "1.2", "paths": {}})),
            Err(SchemaError::UnsupportedVersion(_))
        ));
        assert!(matches!(
            normalize(&json!({"openapi": "3.0.0", "info": {}})),
            Err(SchemaError::Invalid(_))
        ));
    }

    #[test]
    fn test_version_inference_without_version_field() {
        let doc = json!({"info": {}, "paths": {}, "definitions": {}});
        let (version, warning) = detect_version(&doc).unwrap();
        assert_eq!(version, SpecVersion::Swagger2);
        assert!(warning.is_some());
    }

    #[test]
    fn test_endpoint_key_parsing() {
        assert_eq!(EndpointKey::parse("get /pets").unwrap().to_string(), "GET /pets");
        assert!(EndpointKey::parse("/pets").is_none());
        assert!(EndpointKey::parse("FETCH /pets").is_none());
        assert!(EndpointKey::parse("GET pets").is_none());
    }

    #[test]
    fn test_placeholder_shape_and_names() {
        assert_eq!(path_placeholders("/users/{id}/posts/{postId}"), vec!["id", "postId"]);
        assert_eq!(placeholder_shape("/users/{id}"), placeholder_shape("/users/:userId"));
        assert_ne!(placeholder_shape("/users/{id}"), placeholder_shape("/users"));
    }
}

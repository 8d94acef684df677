//! Core value types: parsed type identifiers and load options.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A versioned resource type identifier.
///
/// Redfish types look like `#ComputerSystem.v1_4_0.ComputerSystem`, legacy
/// RIS types like `ComputerSystem.1.0.1`, and plain schema documents carry
/// `string` or `object`. The major type keeps the namespace and the version,
/// without the leading `#`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeName {
    raw: String,
    namespace: String,
    version: Option<String>,
    name: Option<String>,
}

impl TypeName {
    /// Parse a type identifier. Never fails: undotted strings are their own
    /// namespace.
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.splitn(3, '.');
        let namespace = parts
            .next()
            .unwrap_or_default()
            .trim_start_matches('#')
            .to_string();
        let version = parts.next().map(String::from);
        let name = parts.next().map(String::from);
        Self {
            raw: raw.to_string(),
            namespace,
            version,
            name,
        }
    }

    /// The identifier exactly as it appeared in the body.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// First two dotted segments, `#` stripped. Undotted identifiers are
    /// returned unchanged.
    pub fn major(&self) -> String {
        match &self.version {
            Some(version) => format!("{}.{}", self.namespace, version),
            None => self.raw.clone(),
        }
    }

    /// Whether this is a collection type (`ComputerSystemCollection.…`).
    pub fn is_collection(&self) -> bool {
        self.namespace.contains("Collection")
    }
}

impl std::fmt::Display for TypeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// How a fetched document is processed after registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadType {
    /// Follow every link found in the body.
    #[default]
    Href,
    /// Schema document: resolve `$ref`/`anyOf` in place, follow nothing.
    Ref,
}

/// Options for [`crate::ResourceMonolith::load`].
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Start path. `None` uses the dialect's default entry point.
    pub path: Option<String>,
    /// Traverse links found in fetched documents.
    pub crawl: bool,
    /// Also fetch `/Logs` resources when not crawling.
    pub include_logs: bool,
    pub load_type: LoadType,
    /// Full capture: follow pagination, schema and registry links too.
    pub load_complete: bool,
    /// Refetch the start path even if it was already visited.
    pub force_reload: bool,
    /// First run of a session: log discovery and count progress.
    pub init: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            path: None,
            crawl: true,
            include_logs: false,
            load_type: LoadType::Href,
            load_complete: false,
            force_reload: false,
            init: false,
        }
    }
}

impl LoadOptions {
    /// Crawl from the given path with default options.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Non-crawling schema fetch.
    pub fn schema(path: impl Into<String>) -> Self {
        Self::new(path).crawl(false).load_type(LoadType::Ref)
    }

    pub fn crawl(mut self, crawl: bool) -> Self {
        self.crawl = crawl;
        self
    }

    pub fn include_logs(mut self, include_logs: bool) -> Self {
        self.include_logs = include_logs;
        self
    }

    pub fn load_type(mut self, load_type: LoadType) -> Self {
        self.load_type = load_type;
        self
    }

    pub fn load_complete(mut self, load_complete: bool) -> Self {
        self.load_complete = load_complete;
        self
    }

    pub fn force_reload(mut self, force_reload: bool) -> Self {
        self.force_reload = force_reload;
        self
    }

    pub fn init(mut self, init: bool) -> Self {
        self.init = init;
        self
    }
}

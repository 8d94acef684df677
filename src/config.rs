//! Monolith configuration: API and schema dialects.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::MonolithError;

/// Wire dialect of the management API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiDialect {
    /// DMTF Redfish (`/redfish/v1/`, `@odata.id` links).
    #[default]
    Redfish,
    /// Legacy RIS (`/rest/v1`, `href` links).
    Legacy,
}

impl ApiDialect {
    /// Key holding a link target.
    pub fn link_key(&self) -> &'static str {
        match self {
            ApiDialect::Redfish => "@odata.id",
            ApiDialect::Legacy => "href",
        }
    }

    /// Key holding a resource type.
    pub fn type_key(&self) -> &'static str {
        match self {
            ApiDialect::Redfish => "@odata.type",
            ApiDialect::Legacy => "Type",
        }
    }

    /// Key of a collection's member list.
    pub fn collection_key(&self) -> &'static str {
        match self {
            ApiDialect::Redfish => "Members",
            ApiDialect::Legacy => "Items",
        }
    }

    /// Default crawl entry point.
    pub fn default_prefix(&self) -> &'static str {
        match self {
            ApiDialect::Redfish => "/redfish/v1/",
            ApiDialect::Legacy => "/rest/v1",
        }
    }

    /// Resource directory listing every instance of the service.
    pub fn resource_directory(&self) -> &'static str {
        match self {
            ApiDialect::Redfish => "/redfish/v1/ResourceDirectory/",
            ApiDialect::Legacy => "/rest/v1/ResourceDirectory",
        }
    }

    /// BIOS settings path, lowercase. A failed fetch here means the BIOS
    /// never registered with the management controller.
    pub fn bios_path(&self) -> &'static str {
        match self {
            ApiDialect::Redfish => "/redfish/v1/systems/1/bios/settings/",
            ApiDialect::Legacy => "/rest/v1/systems/1/bios/settings",
        }
    }

    /// Links on the service root that are only followed in a full capture.
    pub fn root_skip_links(&self) -> &'static [&'static str] {
        match self {
            ApiDialect::Redfish => &["Registries.@odata.id", "JsonSchemas.@odata.id"],
            ApiDialect::Legacy => &["links.Schemas.href", "links.Registries.href"],
        }
    }
}

/// Schema `$ref` dialect used by `Ref` loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaDialect {
    /// Company-specific schema documents (`$ref` only).
    Generic,
    /// redfish.dmtf.org schema documents (`anyOf` then `$ref`).
    #[default]
    Redfish,
}

/// Monolith configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MonolithConfig {
    #[serde(default)]
    pub api: ApiDialect,
    #[serde(default)]
    pub schema: SchemaDialect,
    /// Service base URL, used to name the monolith.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl MonolithConfig {
    pub fn new(api: ApiDialect, schema: SchemaDialect) -> Self {
        Self {
            api,
            schema,
            base_url: None,
        }
    }

    /// Legacy RIS services with company schemas.
    pub fn legacy() -> Self {
        Self::new(ApiDialect::Legacy, SchemaDialect::Generic)
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Load a configuration file (JSON).
    pub fn load(path: &Path) -> Result<Self, MonolithError> {
        if !path.exists() {
            return Err(MonolithError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|source| MonolithError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| MonolithError::InvalidJson { source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn redfish_keys() {
        let api = ApiDialect::Redfish;
        assert_eq!(api.link_key(), "@odata.id");
        assert_eq!(api.type_key(), "@odata.type");
        assert_eq!(api.collection_key(), "Members");
        assert_eq!(api.default_prefix(), "/redfish/v1/");
    }

    #[test]
    fn legacy_keys() {
        let api = ApiDialect::Legacy;
        assert_eq!(api.link_key(), "href");
        assert_eq!(api.type_key(), "Type");
        assert_eq!(api.resource_directory(), "/rest/v1/ResourceDirectory");
    }

    #[test]
    fn load_partial_config() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"api": "legacy", "base_url": "https://10.0.0.1"}}"#).unwrap();

        let config = MonolithConfig::load(file.path()).unwrap();
        assert_eq!(config.api, ApiDialect::Legacy);
        assert_eq!(config.schema, SchemaDialect::Redfish);
        assert_eq!(config.base_url.as_deref(), Some("https://10.0.0.1"));
    }

    #[test]
    fn load_missing_config() {
        let result = MonolithConfig::load(Path::new("/nonexistent/ris.json"));
        assert!(matches!(result, Err(MonolithError::FileNotFound { .. })));
    }

    #[test]
    fn load_invalid_config() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"api": "soap"}}"#).unwrap();

        let result = MonolithConfig::load(file.path());
        assert!(matches!(result, Err(MonolithError::InvalidJson { .. })));
    }
}

//! Snapshot format: the persisted form of a whole monolith.
//!
//! Handles reading and writing snapshot files, and replaying a snapshot
//! through a [`MemoryTransport`].

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MonolithError;
use crate::member::MemberSnapshot;
use crate::transport::{MemoryTransport, RestResponse};

/// Serialized monolith.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonolithSnapshot {
    #[serde(rename = "Type")]
    pub monolith_type: String,
    #[serde(rename = "Name")]
    pub name: String,
    /// major type -> paths
    #[serde(default)]
    pub typepath: BTreeMap<String, Vec<String>>,
    /// path -> dependent paths
    #[serde(default)]
    pub ctree: BTreeMap<String, Vec<String>>,
    /// base type -> collection types
    #[serde(default)]
    pub colls: BTreeMap<String, Vec<String>>,
    /// path -> member
    #[serde(default)]
    pub resps: BTreeMap<String, MemberSnapshot>,
}

impl MonolithSnapshot {
    /// Parse a snapshot from a JSON value.
    pub fn from_value(value: Value) -> Result<Self, MonolithError> {
        serde_json::from_value(value).map_err(|source| MonolithError::InvalidJson { source })
    }

    /// Parse a snapshot from a JSON string.
    pub fn parse(content: &str) -> Result<Self, MonolithError> {
        serde_json::from_str(content).map_err(|source| MonolithError::InvalidJson { source })
    }

    /// Load a snapshot file.
    ///
    /// # Errors
    ///
    /// Returns `MonolithError::FileNotFound` if the file doesn't exist,
    /// or `MonolithError::InvalidJson` if it isn't a snapshot.
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

        Self::parse(&content)
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self, pretty: bool) -> Result<String, MonolithError> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
        .map_err(|source| MonolithError::InvalidJson { source })
    }

    /// Write the snapshot to a file.
    pub fn save(&self, path: &Path, pretty: bool) -> Result<(), MonolithError> {
        let content = self.to_json(pretty)?;
        std::fs::write(path, content).map_err(|source| MonolithError::WriteError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// A transport answering every captured request the way the service
    /// did. Placeholders were never fetched and are not served.
    pub fn replay(&self) -> MemoryTransport {
        let mut transport = MemoryTransport::new();
        for (path, member) in &self.resps {
            if let Some(content) = &member.content {
                transport.insert_response(RestResponse {
                    status: content.status,
                    path: path.clone(),
                    body: content.body.clone(),
                    headers: content.headers.clone(),
                });
            }
        }
        transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::Content;
    use crate::transport::Transport;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sample() -> MonolithSnapshot {
        let mut resps = BTreeMap::new();
        resps.insert(
            "/redfish/v1/".to_string(),
            MemberSnapshot {
                resource_type: Some("#ServiceRoot.v1_5_0.ServiceRoot".into()),
                member_type: None,
                etag: Some("W/\"1\"".into()),
                content: Some(Content {
                    body: json!({ "@odata.type": "#ServiceRoot.v1_5_0.ServiceRoot" }),
                    status: 200,
                    headers: BTreeMap::from([("ETag".to_string(), "W/\"1\"".to_string())]),
                }),
                original_uri: "/redfish/v1/".into(),
                patches: vec![],
                modified: false,
                major_type: "ServiceRoot.v1_5_0".into(),
            },
        );
        MonolithSnapshot {
            monolith_type: "Monolith.1.0.0".into(),
            name: "Monolithic output of RIS Service".into(),
            typepath: BTreeMap::from([(
                "ServiceRoot.v1_5_0".to_string(),
                vec!["/redfish/v1/".to_string()],
            )]),
            ctree: BTreeMap::new(),
            colls: BTreeMap::new(),
            resps,
        }
    }

    #[test]
    fn save_and_load() {
        let file = NamedTempFile::new().unwrap();
        let snapshot = sample();
        snapshot.save(file.path(), true).unwrap();

        let loaded = MonolithSnapshot::load(file.path()).unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn serialized_keys() {
        let value = serde_json::to_value(sample()).unwrap();
        for key in ["Type", "Name", "typepath", "ctree", "colls", "resps"] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
        let member = &value["resps"]["/redfish/v1/"];
        assert_eq!(member["Content"]["Status"], 200);
        assert_eq!(member["MajType"], "ServiceRoot.v1_5_0");
        assert_eq!(member["OriginalUri"], "/redfish/v1/");
    }

    #[test]
    fn load_missing_file() {
        let result = MonolithSnapshot::load(Path::new("/nonexistent/snapshot.json"));
        assert!(matches!(result, Err(MonolithError::FileNotFound { .. })));
    }

    #[test]
    fn load_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not a snapshot").unwrap();
        let result = MonolithSnapshot::load(file.path());
        assert!(matches!(result, Err(MonolithError::InvalidJson { .. })));
    }

    #[test]
    fn replay_serves_captured_content() {
        let transport = sample().replay();
        let resp = transport.get("/redfish/v1/").unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.header("etag"), Some("W/\"1\""));
        assert_eq!(transport.get("/redfish/v1/Systems/").unwrap().status, 404);
    }
}

//! A single cached REST resource.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::transport::RestResponse;
use crate::types::TypeName;

/// Type key of schema documents, tried after the dialect's own key.
const SCHEMA_TYPE_KEY: &str = "type";

/// Legacy major type of generic collections.
const LEGACY_COLLECTION: &str = "Collection.1";

/// One cached resource: the response that produced it plus local state.
///
/// Placeholder members (built from the resource directory before any fetch)
/// have no response and answer every query from their defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceMember {
    path: String,
    response: Option<RestResponse>,
    type_name: Option<TypeName>,
    default_type: String,
    default_etag: Option<String>,
    pending_edits: Vec<Value>,
    /// Set by [`crate::ResourceMonolith::mark_modified`]; a fresh fetch
    /// resets it.
    pub modified: bool,
}

impl ResourceMember {
    /// Wrap a live response, reading its type from `type_key` (see
    /// [`crate::ApiDialect::type_key`]) or the schema `type` key. Bodies
    /// without either fall back to `object`.
    pub fn from_response(response: RestResponse, type_key: &str) -> Self {
        let type_name = body_type(&response.body, type_key).map(TypeName::parse);
        Self {
            path: response.path.clone(),
            response: Some(response),
            type_name,
            default_type: "object".to_string(),
            default_etag: None,
            pending_edits: Vec::new(),
            modified: false,
        }
    }

    /// Placeholder carrying only defaults.
    pub fn placeholder(
        type_name: impl Into<String>,
        path: impl Into<String>,
        etag: Option<String>,
    ) -> Self {
        Self {
            path: path.into(),
            response: None,
            type_name: None,
            default_type: type_name.into(),
            default_etag: etag,
            pending_edits: Vec::new(),
            modified: false,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn response(&self) -> Option<&RestResponse> {
        self.response.as_ref()
    }

    pub fn is_placeholder(&self) -> bool {
        self.response.is_none()
    }

    /// Decoded body; `Null` for placeholders.
    pub fn body(&self) -> &Value {
        static NULL: Value = Value::Null;
        self.response.as_ref().map_or(&NULL, |r| &r.body)
    }

    /// Parsed type from the body, if any.
    pub fn type_name(&self) -> Option<&TypeName> {
        self.type_name.as_ref()
    }

    /// Raw type string, or the default type.
    pub fn resource_type(&self) -> &str {
        self.type_name
            .as_ref()
            .map_or(self.default_type.as_str(), TypeName::raw)
    }

    /// Type without the minor version (`ComputerSystem.v1_4_0`).
    pub fn major_type(&self) -> String {
        self.type_name
            .as_ref()
            .map_or_else(|| self.default_type.clone(), TypeName::major)
    }

    /// ETag from the live response, else the default.
    pub fn etag(&self) -> Option<&str> {
        match &self.response {
            Some(response) => response.header("etag"),
            None => self.default_etag.as_deref(),
        }
    }

    pub fn pending_edits(&self) -> &[Value] {
        &self.pending_edits
    }

    pub(crate) fn pending_edits_mut(&mut self) -> &mut Vec<Value> {
        &mut self.pending_edits
    }

    /// Serialize for a snapshot.
    pub fn to_snapshot(&self) -> MemberSnapshot {
        let member_type = self
            .response
            .as_ref()
            .filter(|_| self.major_type() == LEGACY_COLLECTION)
            .and_then(|r| r.body.get("MemberType").cloned());

        MemberSnapshot {
            resource_type: self.type_name.as_ref().map(|t| t.raw().to_string()),
            member_type,
            etag: self.etag().map(String::from),
            content: self.response.as_ref().map(|r| Content {
                body: r.body.clone(),
                status: r.status,
                headers: r.headers.clone(),
            }),
            original_uri: self.path.clone(),
            patches: self.pending_edits.clone(),
            modified: self.modified,
            major_type: self.major_type(),
        }
    }

    /// Rebuild a member from a snapshot entry.
    ///
    /// When content was saved, a static response is reconstructed from it so
    /// body, status and header queries keep working.
    pub fn from_snapshot(src: MemberSnapshot) -> Self {
        let response = src.content.map(|c| RestResponse {
            status: c.status,
            path: src.original_uri.clone(),
            body: c.body,
            headers: c.headers,
        });
        let type_name = src.resource_type.as_deref().map(TypeName::parse);

        Self {
            path: src.original_uri,
            response,
            type_name,
            default_type: src.major_type,
            default_etag: src.etag,
            pending_edits: src.patches,
            modified: src.modified,
        }
    }
}

fn body_type<'a>(body: &'a Value, type_key: &str) -> Option<&'a str> {
    [type_key, SCHEMA_TYPE_KEY]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
}

/// Serialized member, as stored under `resps` in a monolith snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSnapshot {
    #[serde(rename = "Type")]
    pub resource_type: Option<String>,
    #[serde(
        rename = "MemberType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub member_type: Option<Value>,
    #[serde(rename = "ETag")]
    pub etag: Option<String>,
    #[serde(rename = "Content", default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(rename = "OriginalUri")]
    pub original_uri: String,
    #[serde(rename = "Patches", default)]
    pub patches: Vec<Value>,
    #[serde(default)]
    pub modified: bool,
    #[serde(rename = "MajType")]
    pub major_type: String,
}

/// The response a member was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(rename = "Body")]
    pub body: Value,
    #[serde(rename = "Status")]
    pub status: u16,
    #[serde(rename = "Headers", default)]
    pub headers: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const REDFISH: &str = "@odata.type";
    const LEGACY: &str = "Type";

    fn system() -> ResourceMember {
        let resp = RestResponse::new(
            200,
            "/redfish/v1/Systems/1/",
            json!({
                "@odata.id": "/redfish/v1/Systems/1/",
                "@odata.type": "#ComputerSystem.v1_4_0.ComputerSystem",
                "Id": "1"
            }),
        )
        .with_header("ETag", "W/\"42\"");
        ResourceMember::from_response(resp, REDFISH)
    }

    #[test]
    fn type_from_odata_type() {
        let member = system();
        assert_eq!(member.resource_type(), "#ComputerSystem.v1_4_0.ComputerSystem");
        assert_eq!(member.major_type(), "ComputerSystem.v1_4_0");
        assert_eq!(member.etag(), Some("W/\"42\""));
        assert_eq!(member.path(), "/redfish/v1/Systems/1/");
    }

    #[test]
    fn type_from_legacy_key() {
        let resp = RestResponse::new(200, "/rest/v1/Chassis/1", json!({ "Type": "Chassis.1.0.0" }));
        let member = ResourceMember::from_response(resp, LEGACY);
        assert_eq!(member.major_type(), "Chassis.1");
    }

    #[test]
    fn type_key_follows_dialect() {
        let body = json!({ "Type": "Chassis.1.0.0", "@odata.type": "#Chassis.v1_2_0.Chassis" });

        let redfish = ResourceMember::from_response(RestResponse::new(200, "/c", body.clone()), REDFISH);
        assert_eq!(redfish.major_type(), "Chassis.v1_2_0");

        let legacy = ResourceMember::from_response(RestResponse::new(200, "/c", body), LEGACY);
        assert_eq!(legacy.major_type(), "Chassis.1");
    }

    #[test]
    fn other_dialect_key_is_ignored() {
        let resp = RestResponse::new(200, "/redfish/v1/Chassis/1", json!({ "Type": "Chassis.1.0.0" }));
        let member = ResourceMember::from_response(resp, REDFISH);
        assert!(member.type_name().is_none());
        assert_eq!(member.major_type(), "object");
    }

    #[test]
    fn untyped_body_defaults_to_object() {
        let resp = RestResponse::new(200, "/schemas/B.json/", json!({ "foo": { "bar": 1 } }));
        let member = ResourceMember::from_response(resp, REDFISH);
        assert_eq!(member.major_type(), "object");
        assert!(member.type_name().is_none());
        assert_eq!(member.etag(), None);
    }

    #[test]
    fn schema_document_type_key() {
        let resp = RestResponse::new(200, "/schemas/Type.json", json!({ "type": "string" }));
        let member = ResourceMember::from_response(resp, REDFISH);
        assert_eq!(member.major_type(), "string");
    }

    #[test]
    fn non_string_type_is_ignored() {
        let resp = RestResponse::new(200, "/s.json", json!({ "type": ["object", "null"] }));
        let member = ResourceMember::from_response(resp, REDFISH);
        assert_eq!(member.major_type(), "object");
    }

    #[test]
    fn placeholder_uses_defaults() {
        let member = ResourceMember::placeholder(
            "ComputerSystem.v1_0_0",
            "/redfish/v1/Systems/1",
            Some("abc".into()),
        );
        assert!(member.is_placeholder());
        assert_eq!(member.major_type(), "ComputerSystem.v1_0_0");
        assert_eq!(member.etag(), Some("abc"));
        assert_eq!(member.body(), &Value::Null);
    }

    #[test]
    fn snapshot_round_trip() {
        let mut member = system();
        member.pending_edits_mut().push(json!({ "op": "replace", "path": "/AssetTag" }));
        member.modified = true;

        let restored = ResourceMember::from_snapshot(member.to_snapshot());
        assert_eq!(restored.path(), member.path());
        assert_eq!(restored.major_type(), member.major_type());
        assert_eq!(restored.etag(), member.etag());
        assert_eq!(restored.pending_edits(), member.pending_edits());
        assert!(restored.modified);
        assert_eq!(restored.body(), member.body());
    }

    #[test]
    fn placeholder_snapshot_round_trip() {
        let member = ResourceMember::placeholder("Chassis.v1_0_0", "/redfish/v1/Chassis/1", None);
        let snapshot = member.to_snapshot();
        assert!(snapshot.content.is_none());
        assert_eq!(snapshot.resource_type, None);

        let restored = ResourceMember::from_snapshot(snapshot);
        assert!(restored.is_placeholder());
        assert_eq!(restored.major_type(), "Chassis.v1_0_0");
    }

    #[test]
    fn legacy_collection_keeps_member_type() {
        let resp = RestResponse::new(
            200,
            "/rest/v1/Systems",
            json!({ "Type": "Collection.1.0.0", "MemberType": "ComputerSystem.1" }),
        );
        let snapshot = ResourceMember::from_response(resp, LEGACY).to_snapshot();
        assert_eq!(snapshot.member_type, Some(json!("ComputerSystem.1")));
    }
}

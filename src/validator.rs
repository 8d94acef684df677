//! Validation of cached bodies and pending edits against resolved schemas.

use serde_json::Value;

use crate::error::{BodyError, MonolithError, ValidateError};
use crate::monolith::ResourceMonolith;
use crate::transport::Transport;

/// Validate a body against an already-resolved schema.
pub fn validate_against_schema(schema: &Value, body: &Value) -> Result<(), ValidateError> {
    let validator = compile(schema)?;
    into_result(body_errors(&validator, body))
}

fn compile(schema: &Value) -> Result<jsonschema::Validator, MonolithError> {
    jsonschema::validator_for(schema).map_err(|e| MonolithError::schema(e.to_string()))
}

fn body_errors(validator: &jsonschema::Validator, body: &Value) -> Vec<BodyError> {
    validator
        .iter_errors(body)
        .map(|e| BodyError {
            path: e.instance_path.to_string(),
            message: e.to_string(),
        })
        .collect()
}

fn into_result(errors: Vec<BodyError>) -> Result<(), ValidateError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidateError::Invalid { errors })
    }
}

impl ResourceMonolith {
    /// Validate the cached body at `resource` against the schema document at
    /// `schema`, resolving the schema's references first.
    ///
    /// The schema is loaded with a `Ref` fetch when it is not cached yet.
    ///
    /// # Errors
    ///
    /// `ValidateError::Invalid` lists every violation; `ValidateError::Monolith`
    /// covers unknown paths and resolution failures.
    pub fn validate_member<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        resource: &str,
        schema: &str,
    ) -> Result<(), ValidateError> {
        let body = self.cached_body(resource)?;
        let resolved = self.resolved_schema(transport, schema)?;
        validate_against_schema(&resolved, &body)
    }

    /// Validate every pending edit of `resource` before it is sent.
    ///
    /// Each edit is checked as a partial document: `required` constraints do
    /// not apply. A schema that does not compile is an error even when there
    /// are no edits.
    pub fn validate_pending_edits<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        resource: &str,
        schema: &str,
    ) -> Result<(), ValidateError> {
        let edits = self
            .member(resource)
            .map(|m| m.pending_edits().to_vec())
            .ok_or_else(|| MonolithError::InstanceNotFound {
                type_name: resource.to_string(),
            })?;
        let mut resolved = self.resolved_schema(transport, schema)?;
        strip_required(&mut resolved);

        let validator = compile(&resolved)?;

        let errors = edits
            .iter()
            .flat_map(|edit| body_errors(&validator, edit))
            .collect();
        into_result(errors)
    }

    fn cached_body(&self, path: &str) -> Result<Value, MonolithError> {
        self.cached(path)
            .map(|m| m.body().clone())
            .ok_or_else(|| MonolithError::InstanceNotFound {
                type_name: path.to_string(),
            })
    }

    fn resolved_schema<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        schema: &str,
    ) -> Result<Value, MonolithError> {
        if self.cached(schema).is_none() {
            self.load(transport, crate::types::LoadOptions::schema(schema))?;
        }
        let body = self.cached_body(schema)?;
        self.resolve_schema(transport, schema, body)
    }
}

/// Drop `required` everywhere, for validating partial documents.
fn strip_required(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove("required");
            for child in map.values_mut() {
                strip_required(child);
            }
        }
        Value::Array(arr) => {
            for item in arr {
                strip_required(item);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonolithConfig;
    use crate::transport::MemoryTransport;
    use crate::types::LoadOptions;
    use serde_json::json;

    fn fixture() -> (ResourceMonolith, MemoryTransport) {
        let mut transport = MemoryTransport::new();
        transport.insert(
            "/redfish/v1/Systems/1/",
            json!({
                "@odata.type": "#ComputerSystem.v1_4_0.ComputerSystem",
                "AssetTag": "rack-7"
            }),
        );
        transport.insert(
            "/redfish/v1/Schemas/ComputerSystem.json/",
            json!({
                "type": "object",
                "properties": {
                    "AssetTag": { "type": "string" },
                    "IndicatorLED": { "enum": ["Lit", "Off", "Blinking"] }
                },
                "required": ["AssetTag"]
            }),
        );
        let mut mono = ResourceMonolith::new(MonolithConfig::default());
        mono.load(&transport, LoadOptions::new("/redfish/v1/Systems/1/").crawl(false))
            .unwrap();
        (mono, transport)
    }

    #[test]
    fn valid_body() {
        let schema = json!({ "type": "object", "properties": { "Id": { "type": "string" } } });
        assert!(validate_against_schema(&schema, &json!({ "Id": "1" })).is_ok());
    }

    #[test]
    fn wrong_type() {
        let schema = json!({ "type": "object", "properties": { "Id": { "type": "string" } } });
        let result = validate_against_schema(&schema, &json!({ "Id": 1 }));
        assert!(matches!(result, Err(ValidateError::Invalid { .. })));
    }

    #[test]
    fn member_against_cached_schema() {
        let (mut mono, transport) = fixture();
        let result = mono.validate_member(
            &transport,
            "/redfish/v1/Systems/1/",
            "/redfish/v1/Schemas/ComputerSystem.json/",
        );
        assert!(result.is_ok());
        assert!(mono.contains("/redfish/v1/Schemas/ComputerSystem.json/"));
    }

    #[test]
    fn unknown_member() {
        let (mut mono, transport) = fixture();
        let result = mono.validate_member(
            &transport,
            "/redfish/v1/Systems/9/",
            "/redfish/v1/Schemas/ComputerSystem.json/",
        );
        assert!(matches!(
            result,
            Err(ValidateError::Monolith(MonolithError::InstanceNotFound { .. }))
        ));
    }

    #[test]
    fn pending_edits_are_partial() {
        let (mut mono, transport) = fixture();
        mono.push_pending_edit("/redfish/v1/Systems/1/", json!({ "IndicatorLED": "Lit" }))
            .unwrap();
        let result = mono.validate_pending_edits(
            &transport,
            "/redfish/v1/Systems/1/",
            "/redfish/v1/Schemas/ComputerSystem.json/",
        );
        assert!(result.is_ok());
    }

    #[test]
    fn pending_edit_violations_collected() {
        let (mut mono, transport) = fixture();
        let path = "/redfish/v1/Systems/1/";
        mono.push_pending_edit(path, json!({ "IndicatorLED": "Purple" }))
            .unwrap();
        mono.push_pending_edit(path, json!({ "AssetTag": 7 })).unwrap();

        let result =
            mono.validate_pending_edits(&transport, path, "/redfish/v1/Schemas/ComputerSystem.json/");
        match result {
            Err(ValidateError::Invalid { errors }) => assert_eq!(errors.len(), 2),
            other => panic!("expected two violations, got {:?}", other),
        }
    }

    #[test]
    fn broken_schema_fails_pending_edits() {
        let (mut mono, mut transport) = fixture();
        transport.insert("/redfish/v1/Schemas/Broken.json/", json!({ "type": 12 }));
        let path = "/redfish/v1/Systems/1/";
        mono.push_pending_edit(path, json!({ "AssetTag": "rack-8" })).unwrap();

        let result = mono.validate_pending_edits(&transport, path, "/redfish/v1/Schemas/Broken.json/");
        assert!(matches!(
            result,
            Err(ValidateError::Monolith(MonolithError::SchemaValidation { .. }))
        ));
    }

    #[test]
    fn placeholder_schema_is_fetched() {
        let (mut mono, transport) = fixture();
        let schema = "/redfish/v1/Schemas/ComputerSystem.json/";
        mono.insert_member(crate::member::ResourceMember::placeholder("object", schema, None));

        let result = mono.validate_member(&transport, "/redfish/v1/Systems/1/", schema);
        assert!(result.is_ok());
        assert!(mono.member(schema).is_some_and(|m| !m.is_placeholder()));
    }
}

//! Schema reference resolution for `Ref` loads.
//!
//! Schema documents fetched from the service reference each other with
//! `$ref` (and, for DMTF schemas, `anyOf`). Resolution inlines the referenced
//! documents so consumers see one expanded document. Referenced documents are
//! loaded through the monolith and cached like any other resource; their own
//! cached bodies are never mutated by a splice.

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::{ApiDialect, SchemaDialect};
use crate::error::MonolithError;
use crate::monolith::{normalize_path, ResourceMonolith};
use crate::pointer::{find_key, resolve, set, splice};
use crate::transport::Transport;
use crate::types::{json_type_name, LoadOptions};

/// Major types of plain schema documents.
const SCHEMA_TYPES: &[&str] = &["string", "object"];

impl ResourceMonolith {
    /// Inline `$ref`/`anyOf` nodes of `body`, a document fetched from
    /// `doc_path`, using the configured schema dialect.
    ///
    /// A document without references comes back unchanged.
    ///
    /// # Errors
    ///
    /// `SchemaValidation` when a pointer does not resolve or a referenced
    /// document cannot be loaded; fatal transport errors from nested loads.
    pub fn resolve_schema<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        doc_path: &str,
        body: Value,
    ) -> Result<Value, MonolithError> {
        match self.config().schema {
            SchemaDialect::Generic => self.parse_schema(transport, doc_path, body),
            SchemaDialect::Redfish => self.parse_schema_gen(transport, doc_path, body),
        }
    }

    /// Company schema dialect: `$ref` only, referenced files looked up among
    /// cached `string`/`object` documents.
    fn parse_schema<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        doc_path: &str,
        mut doc: Value,
    ) -> Result<Value, MonolithError> {
        let api = self.config().api;

        for m in find_key(&doc, "$ref") {
            let Some(reference) = m.value.as_str() else {
                continue;
            };
            let (mut file, mut fragment) = split_ref(reference);
            let site = m.path.parent();
            let under_any_of = m.path.contains_key("anyOf");

            if file.contains("redfish.dmtf.org") {
                if file.contains("odata") {
                    fragment = odata_fragment(&fragment);
                }
                file = "Resource.json".to_string();
            }

            if file.contains(".json") {
                let target = match api {
                    ApiDialect::Redfish => format!("{}/{}/", schema_dir(doc_path), file),
                    ApiDialect::Legacy => format!("{}/{}", schema_dir(doc_path), file),
                };
                if target.contains("href.json") {
                    continue;
                }
                if !self.is_visited(&target) {
                    self.load(transport, LoadOptions::schema(&target))?;
                }

                if under_any_of {
                    if !fragment.is_empty() {
                        warn!(
                            "{}: skipping '{}' under anyOf, use the redfish schema dialect",
                            doc_path, reference
                        );
                    }
                    continue;
                }

                let source = SCHEMA_TYPES
                    .iter()
                    .flat_map(|t| self.members_of_major(t))
                    .filter(|member| !member.is_placeholder())
                    .find(|member| member.path().contains(file.as_str()))
                    .map(|member| member.body().clone());

                let Some(source) = source else {
                    if fragment.is_empty() {
                        debug!("{}: no cached schema for '{}'", doc_path, reference);
                        continue;
                    }
                    return Err(MonolithError::schema(format!(
                        "{}: referenced schema {} is not cached",
                        doc_path, target
                    )));
                };

                if splice(&mut doc, &site, "$ref", source)? && !fragment.is_empty() {
                    let site_ptr = site.pointer();
                    let data = resolve(&doc, &format!("{}{}", site_ptr, fragment))?.clone();
                    set(&mut doc, &site_ptr, data)?;
                }
            } else if file.is_empty() {
                if under_any_of {
                    if !fragment.is_empty() {
                        warn!(
                            "{}: skipping '{}' under anyOf, use the redfish schema dialect",
                            doc_path, reference
                        );
                    }
                    continue;
                }
                if fragment.is_empty() {
                    continue;
                }
                let data = resolve(&doc, &fragment)?.clone();
                splice(&mut doc, &site, "$ref", data)?;
            } else {
                debug!("{}: leaving non-JSON reference '{}'", doc_path, reference);
            }
        }

        Ok(doc)
    }

    /// DMTF schema dialect: collapse every `anyOf`, then inline every `$ref`.
    fn parse_schema_gen<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        doc_path: &str,
        mut doc: Value,
    ) -> Result<Value, MonolithError> {
        while let Some(m) = find_key(&doc, "anyOf").into_iter().next() {
            let chosen = choose_alternative(&m.value).map_err(|message| {
                MonolithError::schema(format!("{} at {}: {}", doc_path, m.path.pointer(), message))
            })?;
            splice(&mut doc, &m.path.parent(), "anyOf", chosen)?;
        }

        let doc_lower = doc_path.to_lowercase();
        for m in find_key(&doc, "$ref") {
            let Some(reference) = m.value.as_str() else {
                continue;
            };
            let (file, fragment) = split_ref(reference);
            let file = if file.to_lowercase() == doc_lower {
                String::new()
            } else {
                file
            };
            let site = m.path.parent();

            if !file.is_empty() {
                let target = if file.contains('/') {
                    normalize_path(&file)
                } else {
                    format!("{}/{}/", schema_dir(doc_path), file)
                };
                if self.cached(&target).is_none() {
                    self.load(transport, LoadOptions::schema(&target))?;
                }
                let source = self
                    .cached(&target)
                    .map(|member| member.body().clone())
                    .ok_or_else(|| {
                        MonolithError::schema(format!(
                            "{}: referenced schema {} could not be loaded",
                            doc_path, target
                        ))
                    })?;
                splice(&mut doc, &site, "$ref", source)?;
            }

            if fragment.is_empty() {
                continue;
            }
            if file.is_empty() {
                let data = resolve(&doc, &fragment)?.clone();
                splice(&mut doc, &site, "$ref", data)?;
            } else {
                let site_ptr = site.pointer();
                let data = resolve(&doc, &format!("{}{}", site_ptr, fragment))?.clone();
                set(&mut doc, &site_ptr, data)?;
            }
        }

        Ok(doc)
    }
}

/// Split `file#/pointer` into the file and an RFC 6901 pointer.
fn split_ref(reference: &str) -> (String, String) {
    let (file, fragment) = reference.split_once('#').unwrap_or((reference, ""));
    let fragment = fragment.trim_start_matches('/');
    let fragment = if fragment.is_empty() {
        String::new()
    } else {
        format!("/{}", fragment)
    };
    (file.to_string(), fragment)
}

/// OData definitions live in `Resource.json` under an `odata` prefix.
fn odata_fragment(fragment: &str) -> String {
    match fragment.rsplit('/').next().filter(|last| !last.is_empty()) {
        Some(last) => fragment.replace(last, &format!("odata{}", last)),
        None => fragment.to_string(),
    }
}

/// Directory holding the document at `doc_path`.
///
/// Schema documents are served as `<dir>/<file>/` or `<dir>/<file>`, so
/// both forms map to `<dir>`.
fn schema_dir(doc_path: &str) -> &str {
    let trimmed = doc_path.strip_suffix('/').unwrap_or(doc_path);
    trimmed.rfind('/').map_or("", |i| &trimmed[..i])
}

/// Pick the alternative of an `anyOf` that replaces it.
///
/// Preference: the first alternative with real content; else the first
/// local `$ref`; else the file-qualified `.json` `$ref` that sorts highest.
fn choose_alternative(any_of: &Value) -> Result<Value, String> {
    let alternatives = any_of
        .as_array()
        .ok_or_else(|| format!("anyOf must be an array, got {}", json_type_name(any_of)))?;
    let null_type = json!({ "type": "null" });
    let alternatives: Vec<&Value> = alternatives.iter().filter(|a| **a != null_type).collect();

    if let Some(content) = alternatives
        .iter()
        .find(|a| a.is_object() && bare_ref(a).is_none())
    {
        return Ok((*content).clone());
    }

    let refs: Vec<String> = alternatives.iter().filter_map(|a| bare_ref(a)).collect();

    if let Some(local) = refs.iter().find(|r| split_ref(r).0.is_empty()) {
        return Ok(json!({ "$ref": local }));
    }

    refs.iter()
        .filter(|r| {
            let file = split_ref(r).0;
            file.ends_with(".json") && !file.contains("odata")
        })
        .max()
        .map(|r| json!({ "$ref": r }))
        .ok_or_else(|| "no usable anyOf alternative".to_string())
}

/// Target of an alternative that is nothing but a `$ref`.
fn bare_ref(alternative: &Value) -> Option<String> {
    alternative
        .as_object()
        .filter(|o| o.len() == 1)
        .and_then(|o| o.get("$ref"))
        .and_then(Value::as_str)
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_ref_forms() {
        assert_eq!(
            split_ref("Chassis.json#/definitions/Chassis"),
            ("Chassis.json".to_string(), "/definitions/Chassis".to_string())
        );
        assert_eq!(split_ref("#/definitions/Id"), (String::new(), "/definitions/Id".to_string()));
        assert_eq!(split_ref("Type.json"), ("Type.json".to_string(), String::new()));
        assert_eq!(split_ref("#"), (String::new(), String::new()));
        assert_eq!(split_ref("B.json#foo"), ("B.json".to_string(), "/foo".to_string()));
    }

    #[test]
    fn schema_dir_ignores_trailing_slash() {
        assert_eq!(schema_dir("/redfish/v1/Schemas/A.json/"), "/redfish/v1/Schemas");
        assert_eq!(schema_dir("/rest/v1/Schemas/A.json"), "/rest/v1/Schemas");
        assert_eq!(schema_dir("A.json"), "");
    }

    #[test]
    fn odata_fragment_prefixes_last_segment() {
        assert_eq!(odata_fragment("/definitions/id"), "/definitions/odataid");
        assert_eq!(odata_fragment(""), "");
    }

    #[test]
    fn choose_content_alternative_first() {
        let any_of = json!([
            { "$ref": "Resource.json#/definitions/Id" },
            { "type": "null" },
            { "type": "string", "pattern": "^x" }
        ]);
        assert_eq!(
            choose_alternative(&any_of).unwrap(),
            json!({ "type": "string", "pattern": "^x" })
        );
    }

    #[test]
    fn choose_local_ref_over_file_refs() {
        let any_of = json!([
            { "$ref": "Chassis.v1_2_0.json#/definitions/Chassis" },
            { "$ref": "#/definitions/Local" }
        ]);
        assert_eq!(
            choose_alternative(&any_of).unwrap(),
            json!({ "$ref": "#/definitions/Local" })
        );
    }

    #[test]
    fn choose_highest_file_ref() {
        let any_of = json!([
            { "$ref": "Chassis.v1_0_0.json#/definitions/Chassis" },
            { "$ref": "Chassis.v1_2_0.json#/definitions/Chassis" },
            { "$ref": "odata.v4_0_1.json#/definitions/id" },
            { "$ref": "Chassis.v1_1_0.json#/definitions/Chassis" }
        ]);
        assert_eq!(
            choose_alternative(&any_of).unwrap(),
            json!({ "$ref": "Chassis.v1_2_0.json#/definitions/Chassis" })
        );
    }

    #[test]
    fn choose_without_candidates_fails() {
        assert!(choose_alternative(&json!([{ "type": "null" }])).is_err());
        assert!(choose_alternative(&json!({ "type": "null" })).is_err());
    }
}

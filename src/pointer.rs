//! Structured JSON paths: recursive key search and pointer splicing.
//!
//! Every match carries the exact location of the key as a list of segments,
//! so array positions survive and splices land on the right element.

use serde_json::{Map, Value};

use crate::error::MonolithError;

/// One step into a JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Location of a node inside a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct JsonPath(Vec<Segment>);

impl JsonPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    fn child(&self, segment: Segment) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }

    /// Path of the enclosing node (root stays root).
    pub fn parent(&self) -> Self {
        let mut segments = self.0.clone();
        segments.pop();
        Self(segments)
    }

    /// The last key, if the path ends in one.
    pub fn last_key(&self) -> Option<&str> {
        match self.0.last() {
            Some(Segment::Key(key)) => Some(key),
            _ => None,
        }
    }

    /// Whether any segment is the given key.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0
            .iter()
            .any(|s| matches!(s, Segment::Key(k) if k == key))
    }

    /// Dotted form, e.g. `Members.[0].@odata.id`.
    pub fn dotted(&self) -> String {
        self.0
            .iter()
            .map(|s| match s {
                Segment::Key(k) => k.clone(),
                Segment::Index(i) => format!("[{}]", i),
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// RFC 6901 pointer, e.g. `/Members/0/@odata.id`.
    pub fn pointer(&self) -> String {
        self.0
            .iter()
            .map(|s| match s {
                Segment::Key(k) => format!("/{}", k.replace('~', "~0").replace('/', "~1")),
                Segment::Index(i) => format!("/{}", i),
            })
            .collect()
    }
}

/// A key found somewhere in a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    /// Path to the key itself (last segment is the key).
    pub path: JsonPath,
    pub value: Value,
}

/// Find every occurrence of `key`, pre-order, in document order.
///
/// An object's own key is reported before anything nested below it,
/// including matches inside the matched value.
pub fn find_key(doc: &Value, key: &str) -> Vec<Match> {
    let mut matches = Vec::new();
    find_key_inner(doc, key, &JsonPath::root(), &mut matches);
    matches
}

fn find_key_inner(value: &Value, key: &str, at: &JsonPath, matches: &mut Vec<Match>) {
    match value {
        Value::Object(map) => {
            if let Some(found) = map.get(key) {
                matches.push(Match {
                    path: at.child(Segment::Key(key.to_string())),
                    value: found.clone(),
                });
            }
            for (k, v) in map {
                find_key_inner(v, key, &at.child(Segment::Key(k.clone())), matches);
            }
        }
        Value::Array(arr) => {
            for (i, item) in arr.iter().enumerate() {
                find_key_inner(item, key, &at.child(Segment::Index(i)), matches);
            }
        }
        _ => {}
    }
}

/// Resolve a pointer (`""` is the whole document).
pub fn resolve<'a>(doc: &'a Value, pointer: &str) -> Result<&'a Value, MonolithError> {
    doc.pointer(pointer)
        .ok_or_else(|| MonolithError::schema(format!("pointer '{}' does not resolve", pointer)))
}

/// Object at `path`, mutably.
pub fn object_at<'a>(
    doc: &'a mut Value,
    path: &JsonPath,
) -> Result<&'a mut Map<String, Value>, MonolithError> {
    let pointer = path.pointer();
    doc.pointer_mut(&pointer)
        .and_then(Value::as_object_mut)
        .ok_or_else(|| MonolithError::schema(format!("no object at '{}'", pointer)))
}

/// Replace the node at `pointer`.
pub fn set(doc: &mut Value, pointer: &str, value: Value) -> Result<(), MonolithError> {
    let slot = doc
        .pointer_mut(pointer)
        .ok_or_else(|| MonolithError::schema(format!("pointer '{}' does not resolve", pointer)))?;
    *slot = value;
    Ok(())
}

/// Remove `key` from the object at `path` and merge `content` in its place.
///
/// Returns false (and leaves the document alone) when the object no longer
/// holds `key`. Non-object content only removes the key.
pub fn splice(
    doc: &mut Value,
    path: &JsonPath,
    key: &str,
    content: Value,
) -> Result<bool, MonolithError> {
    let target = object_at(doc, path)?;
    if target.remove(key).is_none() {
        return Ok(false);
    }
    if let Value::Object(content) = content {
        for (k, v) in content {
            target.insert(k, v);
        }
    }
    Ok(true)
}

//! The monolith: an in-memory cache of every crawled resource.
//!
//! Crawling is a depth-first walk driven by an explicit worklist. Each path
//! is fetched at most once per pass (unless reloaded explicitly), so cyclic
//! link graphs terminate.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::MonolithConfig;
use crate::error::MonolithError;
use crate::member::ResourceMember;
use crate::pointer::{find_key, JsonPath};
use crate::snapshot::MonolithSnapshot;
use crate::transport::Transport;
use crate::types::{LoadOptions, LoadType, TypeName};

/// Snapshot type tag.
pub const MONOLITH_TYPE: &str = "Monolith.1.0.0";

const MONOLITH_NAME: &str = "Monolithic output of RIS Service";

/// Pending crawl step.
#[derive(Debug, Clone)]
struct WorkItem {
    path: String,
    /// Collection a pagination chain started from.
    original_uri: Option<String>,
    /// Path whose dependents should include this one.
    prev_path: Option<String>,
    crawl: bool,
    /// Pagination requests only chain to the next page.
    page: bool,
    force: bool,
    load_type: LoadType,
}

/// Cache of REST resources keyed by path.
#[derive(Debug, Clone)]
pub struct ResourceMonolith {
    config: MonolithConfig,
    name: String,
    members: BTreeMap<String, ResourceMember>,
    /// major type -> paths
    type_index: BTreeMap<String, BTreeSet<String>>,
    /// path -> paths that may be stale when it changes
    dependency_graph: BTreeMap<String, BTreeSet<String>>,
    /// lowercase paths fetched so far
    visited: BTreeSet<String>,
    /// base type -> collection types wrapping it
    collection_types: BTreeMap<String, BTreeSet<String>>,
    progress: usize,
}

impl ResourceMonolith {
    pub fn new(config: MonolithConfig) -> Self {
        let name = match &config.base_url {
            Some(url) => format!("{} at {}", MONOLITH_NAME, url),
            None => MONOLITH_NAME.to_string(),
        };
        Self {
            config,
            name,
            members: BTreeMap::new(),
            type_index: BTreeMap::new(),
            dependency_graph: BTreeMap::new(),
            visited: BTreeSet::new(),
            collection_types: BTreeMap::new(),
            progress: 0,
        }
    }

    pub fn config(&self) -> &MonolithConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Members registered during `init` loads.
    pub fn progress(&self) -> usize {
        self.progress
    }

    pub fn member(&self, path: &str) -> Option<&ResourceMember> {
        self.members.get(path)
    }

    /// Member at `path` with a live or restored response; placeholders are
    /// skipped.
    pub fn cached(&self, path: &str) -> Option<&ResourceMember> {
        self.members.get(path).filter(|m| !m.is_placeholder())
    }

    pub fn members(&self) -> impl Iterator<Item = &ResourceMember> {
        self.members.values()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.members.contains_key(path)
    }

    pub fn type_index(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.type_index
    }

    pub fn dependency_graph(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.dependency_graph
    }

    pub fn collection_type_index(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.collection_types
    }

    /// Every path fetched or cached, lowercase for fetched ones.
    /// Placeholders are not included until they are fetched.
    pub fn visited_paths(&self) -> BTreeSet<String> {
        self.visited
            .iter()
            .cloned()
            .chain(
                self.members
                    .values()
                    .filter(|m| !m.is_placeholder())
                    .map(|m| m.path().to_string()),
            )
            .collect()
    }

    /// Whether `path` was already fetched (case-insensitive) or is cached
    /// with content.
    pub fn is_visited(&self, path: &str) -> bool {
        self.visited.contains(&path.to_lowercase()) || self.cached(path).is_some()
    }

    // --- Crawl ---

    /// Fetch `options.path` and, depending on the options, everything it
    /// links to.
    ///
    /// # Errors
    ///
    /// `BiosUnregistered`, `SessionExpired` and `SchemaValidation` abort the
    /// load; members cached before the failure stay valid. Any other non-2xx
    /// status prunes the path and the crawl goes on.
    pub fn load<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        options: LoadOptions,
    ) -> Result<(), MonolithError> {
        if options.init {
            info!("Discovering data...");
            if let Some(url) = transport.base_url() {
                self.name = format!("{} at {}", MONOLITH_NAME, url);
            }
        }

        let path = options
            .path
            .clone()
            .unwrap_or_else(|| self.config.api.default_prefix().to_string());

        let mut stack = vec![WorkItem {
            path,
            original_uri: None,
            prev_path: None,
            crawl: options.crawl,
            page: false,
            force: options.force_reload,
            load_type: options.load_type,
        }];

        while let Some(item) = stack.pop() {
            let children = self.load_one(transport, item, &options)?;
            // Reversed so the first discovered link is visited next.
            stack.extend(children.into_iter().rev());
        }

        if options.init {
            info!("Done, {} resources cached", self.members.len());
        }
        Ok(())
    }

    /// Full capture of the service from its default entry point.
    pub fn capture<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
    ) -> Result<MonolithSnapshot, MonolithError> {
        self.load(transport, capture_options())?;
        Ok(self.to_snapshot())
    }

    /// Full capture reduced to `{path: {Headers, Response}}` for fetched
    /// members.
    pub fn capture_reduced<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
    ) -> Result<BTreeMap<String, Value>, MonolithError> {
        self.load(transport, capture_options())?;
        Ok(self
            .members
            .iter()
            .filter_map(|(path, member)| {
                member.response().map(|r| {
                    (
                        path.clone(),
                        json!({ "Headers": r.headers, "Response": r.body }),
                    )
                })
            })
            .collect())
    }

    fn load_one<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        item: WorkItem,
        options: &LoadOptions,
    ) -> Result<Vec<WorkItem>, MonolithError> {
        if item.path.ends_with("?page=1") && !options.load_complete {
            return Ok(Vec::new());
        } else if !options.include_logs && !item.crawl && item.path.contains("/Logs") {
            return Ok(Vec::new());
        }

        let path = normalize_path(&item.path);

        if let Some(prev) = &item.prev_path {
            if *prev != path {
                self.dependency_graph
                    .entry(prev.clone())
                    .or_default()
                    .insert(path.clone());
            }
        }
        if !item.force && self.is_visited(&path) {
            return Ok(Vec::new());
        }

        debug!("loading {}", path);
        let mut resp = transport.get(&path)?;

        if resp.status != 200 && path.to_lowercase() == self.config.api.bios_path() {
            return Err(MonolithError::BiosUnregistered { path });
        } else if resp.status == 401 {
            return Err(MonolithError::SessionExpired);
        } else if !resp.is_success() {
            debug!("pruning {} (status {})", path, resp.status);
            self.remove_path(&path);
            return Ok(Vec::new());
        }

        resp.path = path.clone();
        self.visited.insert(path.to_lowercase());
        let body = resp.body.clone();
        let type_key = self.config.api.type_key();
        self.register(ResourceMember::from_response(resp.clone(), type_key), options.init);

        if item.load_type == LoadType::Ref {
            resp.body = self.resolve_schema(transport, &path, body)?;
            self.register(ResourceMember::from_response(resp, type_key), false);
            return Ok(Vec::new());
        }

        Ok(self.discover_links(&path, &body, &item, options))
    }

    /// Links to follow from a freshly fetched `Href` document, in document
    /// order.
    fn discover_links(
        &self,
        path: &str,
        body: &Value,
        item: &WorkItem,
        options: &LoadOptions,
    ) -> Vec<WorkItem> {
        let api = self.config.api;
        let matches = find_key(body, api.link_key());
        let mut children = Vec::new();

        let child = |target: &str, prev_path: Option<String>| WorkItem {
            path: target.to_string(),
            original_uri: item.original_uri.clone(),
            prev_path,
            crawl: item.crawl,
            page: false,
            force: false,
            load_type: LoadType::Href,
        };

        if let Some(page) = body.pointer("/links/NextPage/page") {
            let base = item.original_uri.clone().unwrap_or_else(|| path.to_string());
            let page = match page {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            children.push(WorkItem {
                path: format!("{}?page={}", base, page),
                original_uri: Some(base),
                prev_path: None,
                crawl: item.crawl,
                page: true,
                force: false,
                load_type: LoadType::Href,
            });
        }

        let follow = item.crawl && !item.page;
        let resource_dir = matches
            .iter()
            .find(|m| m.value.as_str() == Some(api.resource_directory()));

        match resource_dir {
            Some(_) if follow => {
                children.push(child(api.resource_directory(), Some(path.to_string())));
            }
            None if follow => {
                for m in &matches {
                    let dotted = m.path.dotted();
                    if !options.load_complete && api.root_skip_links().contains(&dotted.as_str()) {
                        continue;
                    }
                    let Some(target) = m.value.as_str() else {
                        continue;
                    };
                    if target == path {
                        continue;
                    }
                    children.push(child(target, self.edge_source(&m.path, path)));
                }
            }
            _ => {}
        }

        if options.load_complete {
            let extra_key = if path == "/rest/v1" { "extref" } else { "Uri" };
            let extra = find_key(body, extra_key);
            for m in matches.iter().chain(extra.iter()) {
                if let Some(target) = m.value.as_str() {
                    children.push(child(target, self.edge_source(&m.path, path)));
                }
            }
        }

        children
    }

    /// Collection member links make the collection depend on the member;
    /// any other link is plain navigation.
    fn edge_source(&self, link: &JsonPath, current: &str) -> Option<String> {
        let api = self.config.api;
        let dotted = link.dotted();
        let is_member_link = dotted.ends_with(api.link_key())
            && (dotted.starts_with(api.collection_key()) || dotted.starts_with("Entries"));
        is_member_link.then(|| current.to_string())
    }

    // --- Registration ---

    fn register(&mut self, member: ResourceMember, init: bool) {
        self.insert_member(member);
        if init {
            self.progress += 1;
            if self.progress % 50 == 0 {
                debug!("{} resources discovered", self.progress);
            }
        }
    }

    /// Upsert a member, keeping pending edits of the one it replaces.
    pub fn insert_member(&mut self, mut member: ResourceMember) {
        let path = member.path().to_string();
        let major = member.major_type();

        if let Some(old) = self.members.remove(&path) {
            let old_major = old.major_type();
            if old_major != major {
                self.unindex(&path, &old_major);
            }
            member
                .pending_edits_mut()
                .extend(old.pending_edits().iter().cloned());
        }

        self.type_index
            .entry(major)
            .or_default()
            .insert(path.clone());
        self.members.insert(path, member);
    }

    fn unindex(&mut self, path: &str, major: &str) {
        if let Some(bucket) = self.type_index.get_mut(major) {
            bucket.remove(path);
            if bucket.is_empty() {
                self.type_index.remove(major);
            }
        }
    }

    /// Drop a path from the cache, the type index, the dependency graph and
    /// the visited set.
    pub fn remove_path(&mut self, path: &str) -> Option<ResourceMember> {
        self.visited.remove(&path.to_lowercase());

        self.dependency_graph.remove(path);
        for dependents in self.dependency_graph.values_mut() {
            dependents.remove(path);
        }
        self.dependency_graph.retain(|_, dependents| !dependents.is_empty());

        let member = self.members.remove(path)?;
        self.unindex(path, &member.major_type());
        Some(member)
    }

    // --- Pending edits ---

    /// Queue a local edit for `path`.
    pub fn push_pending_edit(&mut self, path: &str, edit: Value) -> Result<(), MonolithError> {
        let member = self
            .members
            .get_mut(path)
            .ok_or_else(|| MonolithError::InstanceNotFound {
                type_name: path.to_string(),
            })?;
        member.pending_edits_mut().push(edit);
        Ok(())
    }

    /// Remove and return the queued edits for `path`.
    pub fn take_pending_edits(&mut self, path: &str) -> Result<Vec<Value>, MonolithError> {
        let member = self
            .members
            .get_mut(path)
            .ok_or_else(|| MonolithError::InstanceNotFound {
                type_name: path.to_string(),
            })?;
        Ok(std::mem::take(member.pending_edits_mut()))
    }

    // --- Dependency tracking ---

    /// Mark `path` and everything reachable from it as modified.
    ///
    /// Returns the dependents reached through the graph. Nodes already
    /// modified are not walked again, so cycles terminate.
    pub fn mark_modified(&mut self, path: &str) -> BTreeSet<String> {
        let mut reached = BTreeSet::new();
        let mut stack = vec![path.to_string()];
        let mut first = true;

        while let Some(current) = stack.pop() {
            let Some(member) = self.members.get_mut(&current) else {
                continue;
            };
            if member.modified && !first {
                continue;
            }
            first = false;
            member.modified = true;

            if let Some(dependents) = self.dependency_graph.get(&current) {
                for dependent in dependents {
                    reached.insert(dependent.clone());
                    let pending = self
                        .members
                        .get(dependent)
                        .map_or(false, |m| !m.modified);
                    if pending {
                        stack.push(dependent.clone());
                    }
                }
            }
        }
        reached
    }

    /// Modified paths reachable from `path` through modified nodes,
    /// `path` included.
    pub fn check_modified(&self, path: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let mut stack = vec![path.to_string()];

        while let Some(current) = stack.pop() {
            let modified = self.members.get(&current).map_or(false, |m| m.modified);
            if !modified || !found.insert(current.clone()) {
                continue;
            }
            if let Some(dependents) = self.dependency_graph.get(&current) {
                stack.extend(dependents.iter().filter(|d| !found.contains(*d)).cloned());
            }
        }
        found
    }

    // --- Collections ---

    /// Register placeholders for every resource directory instance not yet
    /// cached, then map base types to the collection types wrapping them.
    pub fn populate_collections(&mut self) {
        let api = self.config.api;
        let Some(directory) = self.members.get(api.resource_directory()) else {
            return;
        };
        let instances = directory
            .body()
            .get("Instances")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        self.collection_types.clear();
        let mut all_types = Vec::new();
        let mut collections = Vec::new();

        for instance in &instances {
            let Some(type_str) = instance.get(api.type_key()).and_then(Value::as_str) else {
                continue;
            };
            let Some(href) = instance.get(api.link_key()).and_then(Value::as_str) else {
                continue;
            };
            if self.members.contains_key(href) {
                continue;
            }

            let type_name = TypeName::parse(type_str);
            let major = type_name.major();
            if type_name.is_collection() {
                collections.push(major.clone());
            } else {
                all_types.push(major.clone());
            }

            let etag = instance
                .get("ETag")
                .and_then(Value::as_str)
                .map(String::from);
            self.insert_member(ResourceMember::placeholder(major, href, etag));
        }

        for collection in collections {
            let base = collection.split("Collection").next().unwrap_or_default();
            if let Some(type_name) = all_types.iter().find(|t| t.starts_with(base)) {
                self.collection_types
                    .entry(type_name.clone())
                    .or_default()
                    .insert(collection);
            }
        }
    }

    /// Collection types known to wrap instances of `type_name`.
    pub fn collection_types_for(&self, type_name: &str) -> Option<&BTreeSet<String>> {
        self.collection_types.get(type_name)
    }

    // --- Type queries ---

    /// Major types present in the cache.
    pub fn type_names(&self) -> Vec<&str> {
        self.type_index.keys().map(String::as_str).collect()
    }

    /// Whether any major type contains `name` (case-sensitive).
    pub fn type_exists(&self, name: &str) -> bool {
        self.type_index.keys().any(|t| t.contains(name))
    }

    /// Major types matching `name`, ignoring case and a leading `#`.
    pub fn matching_types(&self, name: &str) -> Vec<&str> {
        let needle = name.trim_start_matches('#').to_lowercase();
        self.type_index
            .keys()
            .filter(|t| t.to_lowercase().contains(&needle))
            .map(String::as_str)
            .collect()
    }

    /// Members of every type matching `name`; empty when nothing matches.
    pub fn members_of(&self, name: &str) -> Vec<&ResourceMember> {
        self.matching_types(name)
            .into_iter()
            .filter_map(|t| self.type_index.get(t))
            .flatten()
            .filter_map(|p| self.members.get(p))
            .collect()
    }

    /// Members of every type matching `name`.
    ///
    /// # Errors
    ///
    /// `InstanceNotFound` when no cached type matches.
    pub fn iter_type(&self, name: &str) -> Result<Vec<&ResourceMember>, MonolithError> {
        if self.matching_types(name).is_empty() {
            return Err(MonolithError::InstanceNotFound {
                type_name: name.to_string(),
            });
        }
        Ok(self.members_of(name))
    }

    /// Members whose major type is exactly `major`.
    pub fn members_of_major(&self, major: &str) -> Vec<&ResourceMember> {
        self.type_index
            .get(major)
            .into_iter()
            .flatten()
            .filter_map(|p| self.members.get(p))
            .collect()
    }

    // --- Snapshots ---

    pub fn to_snapshot(&self) -> MonolithSnapshot {
        let to_lists = |map: &BTreeMap<String, BTreeSet<String>>| {
            map.iter()
                .map(|(k, v)| (k.clone(), v.iter().cloned().collect()))
                .collect()
        };
        MonolithSnapshot {
            monolith_type: MONOLITH_TYPE.to_string(),
            name: self.name.clone(),
            typepath: to_lists(&self.type_index),
            ctree: to_lists(&self.dependency_graph),
            colls: to_lists(&self.collection_types),
            resps: self
                .members
                .iter()
                .map(|(path, member)| (path.clone(), member.to_snapshot()))
                .collect(),
        }
    }

    /// Rebuild a monolith from a snapshot.
    ///
    /// The type index is rebuilt from the members so it cannot hold paths
    /// the snapshot has no member for.
    pub fn from_snapshot(config: MonolithConfig, snapshot: MonolithSnapshot) -> Self {
        let mut monolith = Self::new(config);
        monolith.name = snapshot.name;

        let to_sets = |map: BTreeMap<String, Vec<String>>| {
            map.into_iter()
                .map(|(k, v)| (k, v.into_iter().collect::<BTreeSet<_>>()))
                .collect()
        };
        monolith.dependency_graph = to_sets(snapshot.ctree);
        monolith.collection_types = to_sets(snapshot.colls);

        for (_, member) in snapshot.resps {
            monolith.insert_member(ResourceMember::from_snapshot(member));
        }
        monolith
    }
}

fn capture_options() -> LoadOptions {
    LoadOptions::default()
        .include_logs(true)
        .load_complete(true)
        .force_reload(true)
        .init(true)
}

/// Cache key for a path: `|` escaped, fragment dropped.
pub fn normalize_path(path: &str) -> String {
    let escaped = path.replace('|', "%7C");
    match escaped.split_once('#') {
        Some((before, _)) => before.to_string(),
        None => escaped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RestResponse;

    fn monolith() -> ResourceMonolith {
        ResourceMonolith::new(MonolithConfig::default())
    }

    fn live(path: &str, body: Value) -> ResourceMember {
        ResourceMember::from_response(RestResponse::new(200, path, body), "@odata.type")
    }

    #[test]
    fn normalize_strips_fragment_and_escapes_pipe() {
        assert_eq!(normalize_path("/redfish/v1/Systems/1/#/Oem"), "/redfish/v1/Systems/1/");
        assert_eq!(normalize_path("/rest/v1/a|b"), "/rest/v1/a%7Cb");
        assert_eq!(normalize_path("/redfish/v1/"), "/redfish/v1/");
    }

    #[test]
    fn reinsert_keeps_pending_edits() {
        let mut mono = monolith();
        mono.insert_member(live("/a", json!({ "@odata.type": "#A.v1_0_0.A" })));
        mono.push_pending_edit("/a", json!({ "Name": "x" })).unwrap();

        mono.insert_member(live("/a", json!({ "@odata.type": "#A.v1_0_0.A" })));
        assert_eq!(mono.member("/a").unwrap().pending_edits(), &[json!({ "Name": "x" })]);
        assert_eq!(mono.len(), 1);
    }

    #[test]
    fn reinsert_with_new_type_moves_bucket() {
        let mut mono = monolith();
        mono.insert_member(live("/a", json!({ "@odata.type": "#A.v1_0_0.A" })));
        mono.insert_member(live("/a", json!({ "@odata.type": "#A.v1_1_0.A" })));

        assert!(!mono.type_index().contains_key("A.v1_0_0"));
        assert!(mono.type_index()["A.v1_1_0"].contains("/a"));
    }

    #[test]
    fn remove_prunes_index_and_edges() {
        let mut mono = monolith();
        mono.insert_member(live("/a", json!({ "@odata.type": "#A.v1_0_0.A" })));
        mono.insert_member(live("/b", json!({ "@odata.type": "#B.v1_0_0.B" })));
        mono.dependency_graph
            .entry("/a".into())
            .or_default()
            .insert("/b".into());
        mono.dependency_graph
            .entry("/b".into())
            .or_default()
            .insert("/a".into());

        let removed = mono.remove_path("/b");
        assert!(removed.is_some());
        assert!(!mono.contains("/b"));
        assert!(!mono.type_index().contains_key("B.v1_0_0"));
        assert!(mono.dependency_graph().is_empty());
    }

    #[test]
    fn take_pending_edits_unknown_path() {
        let mut mono = monolith();
        let result = mono.take_pending_edits("/nope");
        assert!(matches!(result, Err(MonolithError::InstanceNotFound { .. })));
    }

    #[test]
    fn matching_types_ignores_case_and_hash() {
        let mut mono = monolith();
        mono.insert_member(live(
            "/s/1",
            json!({ "@odata.type": "#ComputerSystem.v1_4_0.ComputerSystem" }),
        ));
        assert_eq!(mono.matching_types("#computersystem"), vec!["ComputerSystem.v1_4_0"]);
        assert!(mono.type_exists("ComputerSystem"));
        assert!(!mono.type_exists("computersystem"));
    }

    #[test]
    fn check_modified_stops_at_unmodified_nodes() {
        let mut mono = monolith();
        for p in ["/a", "/b", "/c"] {
            mono.insert_member(live(p, json!({})));
        }
        mono.dependency_graph
            .entry("/a".into())
            .or_default()
            .insert("/b".into());
        mono.dependency_graph
            .entry("/b".into())
            .or_default()
            .insert("/c".into());
        mono.members.get_mut("/a").unwrap().modified = true;
        mono.members.get_mut("/c").unwrap().modified = true;

        let found = mono.check_modified("/a");
        assert_eq!(found, BTreeSet::from(["/a".to_string()]));
        assert!(mono.check_modified("/b").is_empty());
    }
}

//! Route table construction and lookup.
//!
//! # Responsibilities
//! - Flatten a tree of route groups into one table per HTTP method
//! - Compose path prefixes and middleware chains along the mount path
//! - Look up the first entry matching a request
//!
//! # Design Decisions
//! - Building is a pure function over an owned tree; nothing is mutated in place
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan per method; table order is the authoritative priority
//! - Explicit NoMatch (`None`) rather than a silent default

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::Method;

use crate::http::handler::Handler;
use crate::http::middleware::Middleware;
use crate::routing::group::{RouteDecl, RouteGroup};
use crate::routing::pattern::{Params, PathPattern};
use crate::routing::ConfigurationError;

type MethodMap = HashMap<Method, Vec<RouteDecl>>;

/// A compiled, immutable route.
#[derive(Clone)]
pub struct RouteEntry {
    pattern: PathPattern,
    middlewares: Vec<Arc<dyn Middleware>>,
    handler: Handler,
}

impl RouteEntry {
    fn compile(decl: RouteDecl) -> Result<Self, ConfigurationError> {
        Ok(Self {
            pattern: PathPattern::compile(&decl.path)?,
            middlewares: decl.middlewares,
            handler: decl.handler,
        })
    }

    /// The full template, including every mount prefix.
    pub fn template(&self) -> &str {
        self.pattern.template()
    }

    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    /// Inherited scope middlewares (outer to inner) followed by entry-local ones.
    pub fn middlewares(&self) -> &[Arc<dyn Middleware>] {
        &self.middlewares
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }
}

impl std::fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteEntry")
            .field("template", &self.template())
            .field(
                "middlewares",
                &self.middlewares.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .field("handler", &self.handler.kind())
            .finish()
    }
}

/// Flat, per-method route table.
#[derive(Clone, Default)]
pub struct RouteTable {
    routes: HashMap<Method, Vec<RouteEntry>>,
}

impl RouteTable {
    /// Build the table from a root group.
    ///
    /// Fails only on a malformed tree (invalid mount prefix or template).
    pub fn build(root: RouteGroup) -> Result<Self, ConfigurationError> {
        let merged = merge("", root, &[])?;

        let mut routes = HashMap::with_capacity(merged.len());
        for (method, decls) in merged {
            let entries = decls
                .into_iter()
                .map(RouteEntry::compile)
                .collect::<Result<Vec<_>, _>>()?;
            routes.insert(method, entries);
        }

        let table = Self { routes };
        tracing::debug!(routes = table.len(), "Route table built");
        Ok(table)
    }

    /// Entries for `method` in dispatch priority order.
    ///
    /// A method without routes yields an empty slice.
    pub fn entries(&self, method: &Method) -> &[RouteEntry] {
        self.routes.get(method).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First entry (in table order) whose pattern matches `path`.
    pub fn find(&self, method: &Method, path: &str) -> Option<(&RouteEntry, Params)> {
        self.find_where(method, path, |_| true)
    }

    /// First entry (in table order) accepted by `filter` whose pattern matches `path`.
    pub fn find_where<F>(&self, method: &Method, path: &str, filter: F) -> Option<(&RouteEntry, Params)>
    where
        F: Fn(&RouteEntry) -> bool,
    {
        self.entries(method)
            .iter()
            .filter(|entry| filter(entry))
            .find_map(|entry| entry.pattern.params(path).map(|params| (entry, params)))
    }

    /// Iterate over every (method, entry) pair.
    pub fn iter(&self) -> impl Iterator<Item = (&Method, &RouteEntry)> {
        self.routes
            .iter()
            .flat_map(|(method, entries)| entries.iter().map(move |entry| (method, entry)))
    }

    /// Total number of entries across all methods.
    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Log every route at info level.
    pub fn dump_routes(&self) {
        let mut rows: Vec<(&Method, &RouteEntry)> = self.iter().collect();
        rows.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
        for (method, entry) in rows {
            tracing::info!(
                method = %method,
                path = %entry.template(),
                handler = entry.handler().kind(),
                params = ?entry.pattern().names(),
                middlewares = entry.middlewares().len(),
                "Route registered"
            );
        }
    }
}

/// Depth-first, post-order merge of `group` and everything mounted under it.
fn merge(
    prefix: &str,
    group: RouteGroup,
    inherited: &[Arc<dyn Middleware>],
) -> Result<MethodMap, ConfigurationError> {
    let RouteGroup {
        mut routes,
        mounts,
        scope_middlewares,
    } = group;

    // Routes declared in this group run the group's own scope first.
    for decl in routes.values_mut().flatten() {
        decl.middlewares.splice(0..0, scope_middlewares.iter().cloned());
    }

    for mount in mounts {
        validate_prefix(&mount.prefix)?;
        let child = merge(&mount.prefix, mount.group, &scope_middlewares)?;
        for (method, entries) in child {
            routes.entry(method).or_default().extend(entries);
        }
    }

    for decl in routes.values_mut().flatten() {
        decl.path.insert_str(0, prefix);
        decl.middlewares.splice(0..0, inherited.iter().cloned());
    }

    Ok(routes)
}

fn validate_prefix(prefix: &str) -> Result<(), ConfigurationError> {
    let reason = if prefix.is_empty() {
        return Ok(());
    } else if !prefix.starts_with('/') {
        "must start with '/'"
    } else if prefix.ends_with('/') {
        "must not end with '/'"
    } else {
        return Ok(());
    };

    Err(ConfigurationError::InvalidMountPrefix {
        prefix: prefix.to_string(),
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{CleanRoom, Middleware};

    struct Tag(&'static str);

    impl Middleware for Tag {
        fn name(&self) -> &str {
            self.0
        }
    }

    fn ok(_room: &mut CleanRoom) -> &'static str {
        "ok"
    }

    fn first(_room: &mut CleanRoom) -> &'static str {
        "first"
    }

    fn second(_room: &mut CleanRoom) -> &'static str {
        "second"
    }

    fn chain(entry: &RouteEntry) -> Vec<&str> {
        entry.middlewares().iter().map(|m| m.name()).collect()
    }

    fn templates(table: &RouteTable, method: &Method) -> Vec<String> {
        table
            .entries(method)
            .iter()
            .map(|e| e.template().to_string())
            .collect()
    }

    #[test]
    fn test_prefixes_and_middlewares_compose() {
        let mut grandchild = RouteGroup::new();
        grandchild.scope(Tag("g"));
        grandchild.get("/leaf", ok).middleware(Tag("local"));

        let mut child = RouteGroup::new();
        child.scope(Tag("c"));
        child.get("/item", ok);
        child.mount("/deep", grandchild);

        let mut root = RouteGroup::new();
        root.scope(Tag("r"));
        root.get("/", ok);
        root.mount("/api", child);

        let table = RouteTable::build(root).unwrap();
        let gets = table.entries(&Method::GET);

        assert_eq!(templates(&table, &Method::GET), vec!["/", "/api/item", "/api/deep/leaf"]);
        assert_eq!(chain(&gets[0]), vec!["r"]);
        assert_eq!(chain(&gets[1]), vec!["r", "c"]);
        assert_eq!(chain(&gets[2]), vec!["r", "c", "g", "local"]);
    }

    #[test]
    fn test_parent_entries_precede_mounted_entries() {
        let mut child = RouteGroup::new();
        child.get("/:anything", second);

        let mut root = RouteGroup::new();
        root.mount("/users", child);
        // Declared after the mount, still ahead of it in table order.
        root.get("/users/:id", first);

        let table = RouteTable::build(root).unwrap();
        assert_eq!(templates(&table, &Method::GET), vec!["/users/:id", "/users/:anything"]);

        let (entry, params) = table.find(&Method::GET, "/users/42").unwrap();
        assert_eq!(entry.template(), "/users/:id");
        assert_eq!(params["id"], "42");
    }

    #[test]
    fn test_mounts_merge_in_declaration_order() {
        let mut a = RouteGroup::new();
        a.get("/x", ok);
        let mut b = RouteGroup::new();
        b.get("/x", ok);
        b.post("/y", ok);

        let mut root = RouteGroup::new();
        root.mount("/a", a);
        root.mount("/b", b);

        let table = RouteTable::build(root).unwrap();
        assert_eq!(templates(&table, &Method::GET), vec!["/a/x", "/b/x"]);
        assert_eq!(templates(&table, &Method::POST), vec!["/b/y"]);
    }

    #[test]
    fn test_same_group_mounted_twice() {
        let mut shared = RouteGroup::new();
        shared.get("/status", ok);

        let mut root = RouteGroup::new();
        root.mount("/v1", shared.clone());
        root.mount("/v2", shared);

        let table = RouteTable::build(root).unwrap();
        assert_eq!(templates(&table, &Method::GET), vec!["/v1/status", "/v2/status"]);
    }

    #[test]
    fn test_missing_method_is_empty() {
        let mut root = RouteGroup::new();
        root.get("/", ok);

        let table = RouteTable::build(root).unwrap();
        assert!(table.entries(&Method::DELETE).is_empty());
        assert!(table.find(&Method::DELETE, "/").is_none());
        assert!(table.find(&Method::GET, "/missing").is_none());
    }

    #[test]
    fn test_empty_path_in_mounted_group() {
        let mut child = RouteGroup::new();
        child.get("", ok);

        let mut root = RouteGroup::new();
        root.mount("/user", child);

        let table = RouteTable::build(root).unwrap();
        assert!(table.find(&Method::GET, "/user").is_some());
    }

    #[test]
    fn test_invalid_mount_prefix_is_rejected() {
        let mut root = RouteGroup::new();
        root.mount("api", RouteGroup::new());
        assert!(matches!(
            RouteTable::build(root),
            Err(ConfigurationError::InvalidMountPrefix { .. })
        ));

        let mut root = RouteGroup::new();
        root.mount("/api/", RouteGroup::new());
        assert!(RouteTable::build(root).is_err());
    }

    #[test]
    fn test_invalid_template_is_rejected() {
        let mut root = RouteGroup::new();
        root.get("/users/:", ok);
        assert!(matches!(
            RouteTable::build(root),
            Err(ConfigurationError::InvalidPattern { .. })
        ));
    }
}

//! Explicit dependency graph between declared resources.
//!
//! - Forward edges: node -> nodes it depends on
//! - Reverse edges: node -> nodes waiting for it
//! - Invariant: both maps are kept in sync by `add_node`

use crate::errors::{PublishError, PublishResult};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    fmt,
};

/// Identity of a node in the graph, e.g. `bucket:site` or `asset:css/app.css`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn bucket(container: &str) -> Self {
        Self(format!("bucket:{}", container))
    }

    pub fn asset(key: &str) -> Self {
        Self(format!("asset:{}", key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Default, Clone)]
pub struct ResourceGraph {
    edges: BTreeMap<ResourceId, BTreeSet<ResourceId>>,
    reverse_edges: BTreeMap<ResourceId, BTreeSet<ResourceId>>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `node`, which may only start once every `depends_on` completed.
    ///
    /// Predecessors do not have to be declared first; `levels` rejects any
    /// that never are.
    pub fn add_node(&mut self, node: ResourceId, depends_on: impl IntoIterator<Item = ResourceId>) {
        let deps = self.edges.entry(node.clone()).or_default();
        for dep in depends_on {
            deps.insert(dep.clone());
            self.reverse_edges
                .entry(dep)
                .or_default()
                .insert(node.clone());
        }
    }

    pub fn contains(&self, node: &ResourceId) -> bool {
        self.edges.contains_key(node)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn dependencies(&self, node: &ResourceId) -> Vec<ResourceId> {
        self.edges
            .get(node)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every node that directly or transitively waits for `node`.
    pub fn dependents(&self, node: &ResourceId) -> BTreeSet<ResourceId> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&ResourceId> = VecDeque::from([node]);
        while let Some(current) = queue.pop_front() {
            if let Some(waiting) = self.reverse_edges.get(current) {
                for next in waiting {
                    if seen.insert(next.clone()) {
                        queue.push_back(next);
                    }
                }
            }
        }
        seen
    }

    /// Topological layering: every node appears after all of its dependencies.
    ///
    /// Nodes within one level are independent of each other and may run
    /// concurrently. Fails on undeclared dependencies and on cycles.
    pub fn levels(&self) -> PublishResult<Vec<Vec<ResourceId>>> {
        let mut remaining: BTreeMap<&ResourceId, usize> = BTreeMap::new();
        for (node, deps) in &self.edges {
            if let Some(missing) = deps.iter().find(|dep| !self.edges.contains_key(*dep)) {
                return Err(PublishError::Graph(format!(
                    "{} depends on undeclared {}",
                    node, missing
                )));
            }
            remaining.insert(node, deps.len());
        }

        let mut levels = Vec::new();
        let mut ready: Vec<&ResourceId> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(node, _)| *node)
            .collect();
        let mut placed = 0;

        while !ready.is_empty() {
            let mut next = Vec::new();
            for node in &ready {
                if let Some(waiting) = self.reverse_edges.get(*node) {
                    for dependent in waiting {
                        if let Some(count) = remaining.get_mut(dependent) {
                            *count -= 1;
                            if *count == 0 {
                                next.push(dependent);
                            }
                        }
                    }
                }
            }
            placed += ready.len();
            levels.push(ready.into_iter().cloned().collect());
            next.sort();
            ready = next;
        }

        if placed != self.edges.len() {
            let stuck: Vec<String> = remaining
                .iter()
                .filter(|(_, count)| **count > 0)
                .map(|(node, _)| node.to_string())
                .collect();
            return Err(PublishError::Graph(format!(
                "dependency cycle among {}",
                stuck.join(", ")
            )));
        }

        Ok(levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assets_come_after_their_bucket() {
        let bucket = ResourceId::bucket("site");
        let mut graph = ResourceGraph::new();
        graph.add_node(ResourceId::asset("index.html"), [bucket.clone()]);
        graph.add_node(ResourceId::asset("css/app.css"), [bucket.clone()]);
        graph.add_node(bucket.clone(), []);

        let levels = graph.levels().unwrap();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0], vec![bucket.clone()]);
        assert_eq!(
            levels[1],
            vec![ResourceId::asset("css/app.css"), ResourceId::asset("index.html")]
        );
        assert_eq!(graph.dependents(&bucket).len(), 2);
    }

    #[test]
    fn undeclared_dependency_is_an_error() {
        let mut graph = ResourceGraph::new();
        graph.add_node(ResourceId::asset("a"), [ResourceId::bucket("missing")]);
        assert!(matches!(graph.levels(), Err(PublishError::Graph(_))));
    }

    #[test]
    fn cycles_are_detected() {
        let a = ResourceId::asset("a");
        let b = ResourceId::asset("b");
        let mut graph = ResourceGraph::new();
        graph.add_node(a.clone(), [b.clone()]);
        graph.add_node(b, [a]);

        let err = graph.levels().unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn dependents_are_transitive() {
        let root = ResourceId::bucket("root");
        let mid = ResourceId::asset("mid");
        let leaf = ResourceId::asset("leaf");
        let mut graph = ResourceGraph::new();
        graph.add_node(root.clone(), []);
        graph.add_node(mid.clone(), [root.clone()]);
        graph.add_node(leaf.clone(), [mid.clone()]);

        assert_eq!(graph.dependents(&root), BTreeSet::from([mid, leaf]));
    }
}

use std::collections::HashMap;
use std::fmt;

use drivesync_core::{Entry, Timestamp};

use super::resource::{Resource, ResourceKind};

pub const DEFAULT_ROOT_ID: &str = "root";

/// Stable handle of a node inside a [`ResourceTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(usize);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Arena of resources. Parent links are plain handles; a node is owned by
/// the arena and listed once in its parent's child map.
#[derive(Debug, Clone)]
pub struct ResourceTree {
    nodes: Vec<Resource>,
    by_remote_id: HashMap<String, ResourceId>,
}

impl ResourceTree {
    pub fn new(root_name: impl Into<String>) -> Self {
        let mut root = Resource::new(root_name, ResourceKind::Folder, None);
        root.set_remote_id(DEFAULT_ROOT_ID);
        let mut by_remote_id = HashMap::new();
        by_remote_id.insert(DEFAULT_ROOT_ID.to_string(), ResourceId(0));
        Self {
            nodes: vec![root],
            by_remote_id,
        }
    }

    pub fn root(&self) -> ResourceId {
        ResourceId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        // the root is always present
        false
    }

    pub fn get(&self, id: ResourceId) -> &Resource {
        &self.nodes[id.0]
    }

    pub fn get_mut(&mut self, id: ResourceId) -> &mut Resource {
        &mut self.nodes[id.0]
    }

    /// Creates a node named `name` under `parent`. The name must not already
    /// be taken; use [`ResourceTree::find_child`] first.
    pub fn add_child(
        &mut self,
        parent: ResourceId,
        name: impl Into<String>,
        kind: ResourceKind,
    ) -> ResourceId {
        let name = name.into();
        debug_assert!(self.get(parent).is_folder());
        debug_assert!(!self.get(parent).children.contains_key(&name));
        let id = ResourceId(self.nodes.len());
        self.nodes
            .push(Resource::new(name.clone(), kind, Some(parent)));
        self.nodes[parent.0].children.insert(name, id);
        id
    }

    /// Registers a node's remote identifier in the lookup index.
    pub fn insert(&mut self, id: ResourceId) {
        if let Some(remote_id) = self.nodes[id.0].remote_id() {
            self.by_remote_id.insert(remote_id.to_string(), id);
        }
    }

    pub fn find_by_remote_id(&self, remote_id: &str) -> Option<ResourceId> {
        self.by_remote_id.get(remote_id).copied()
    }

    pub fn find_child(&self, parent: ResourceId, name: &str) -> Option<ResourceId> {
        self.nodes[parent.0].children.get(name).copied()
    }

    pub fn children(&self, id: ResourceId) -> impl Iterator<Item = ResourceId> + '_ {
        self.nodes[id.0].children.values().copied()
    }

    /// Path from the root joined with `/`. The root itself maps to "".
    pub fn rel_path(&self, id: ResourceId) -> String {
        let mut parts = Vec::new();
        let mut cursor = id;
        while let Some(parent) = self.nodes[cursor.0].parent {
            parts.push(self.nodes[cursor.0].name());
            cursor = parent;
        }
        parts.reverse();
        parts.join("/")
    }

    /// Path a new child called `name` would get under `parent`.
    pub fn child_path(&self, parent: ResourceId, name: &str) -> String {
        let base = self.rel_path(parent);
        if base.is_empty() {
            name.to_string()
        } else {
            format!("{base}/{name}")
        }
    }

    /// Merges remote attributes into `id` and keeps the identifier index in
    /// step when the node picks up a new remote id.
    pub fn update(&mut self, id: ResourceId, entry: &Entry, last_sync: Timestamp) {
        let previous = self.nodes[id.0].remote_id().map(str::to_string);
        self.nodes[id.0].from_remote(entry, last_sync);
        if previous.as_deref() != Some(entry.self_id()) {
            if let Some(previous) = previous
                && self.by_remote_id.get(&previous) == Some(&id)
            {
                self.by_remote_id.remove(&previous);
            }
            self.insert(id);
        }
    }

    pub fn set_remote_id(&mut self, id: ResourceId, remote_id: &str) {
        if let Some(previous) = self.nodes[id.0].remote_id().map(str::to_string)
            && self.by_remote_id.get(&previous) == Some(&id)
        {
            self.by_remote_id.remove(&previous);
        }
        self.nodes[id.0].set_remote_id(remote_id);
        self.insert(id);
    }

    /// Depth-first, parents before children, siblings in name order.
    pub fn walk(&self, from: ResourceId) -> Vec<ResourceId> {
        let mut out = Vec::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            out.push(id);
            let children: Vec<_> = self.children(id).collect();
            stack.extend(children.into_iter().rev());
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceId, &Resource)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (ResourceId(index), node))
    }

    pub fn indexed_ids(&self) -> usize {
        self.by_remote_id.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_has_empty_path_and_default_id() {
        let tree = ResourceTree::new("sync-root");
        let root = tree.root();
        assert_eq!(tree.rel_path(root), "");
        assert!(tree.get(root).is_root());
        assert_eq!(tree.find_by_remote_id(DEFAULT_ROOT_ID), Some(root));
    }

    #[test]
    fn rel_path_walks_parent_links() {
        let mut tree = ResourceTree::new("sync-root");
        let docs = tree.add_child(tree.root(), "Docs", ResourceKind::Folder);
        let nested = tree.add_child(docs, "2024", ResourceKind::Folder);
        let file = tree.add_child(nested, "a.txt", ResourceKind::File);

        assert_eq!(tree.rel_path(file), "Docs/2024/a.txt");
        assert_eq!(tree.child_path(tree.root(), "b.txt"), "b.txt");
        assert_eq!(tree.child_path(docs, "b.txt"), "Docs/b.txt");
    }

    #[test]
    fn find_child_is_case_sensitive() {
        let mut tree = ResourceTree::new("sync-root");
        let docs = tree.add_child(tree.root(), "Docs", ResourceKind::Folder);

        assert_eq!(tree.find_child(tree.root(), "Docs"), Some(docs));
        assert_eq!(tree.find_child(tree.root(), "docs"), None);
    }

    #[test]
    fn update_indexes_new_remote_id() {
        let mut tree = ResourceTree::new("sync-root");
        let file = tree.add_child(tree.root(), "a.txt", ResourceKind::File);
        tree.insert(file);
        assert_eq!(tree.indexed_ids(), 1);

        let entry = Entry::file("f1", DEFAULT_ROOT_ID, "a.txt", "src", Timestamp::new(5, 0));
        tree.update(file, &entry, Timestamp::EPOCH);

        assert_eq!(tree.find_by_remote_id("f1"), Some(file));
        assert_eq!(tree.indexed_ids(), 2);
    }

    #[test]
    fn update_replaces_stale_remote_id() {
        let mut tree = ResourceTree::new("sync-root");
        let file = tree.add_child(tree.root(), "a.txt", ResourceKind::File);
        let first = Entry::file("old", DEFAULT_ROOT_ID, "a.txt", "src", Timestamp::EPOCH);
        let second = Entry::file("new", DEFAULT_ROOT_ID, "a.txt", "src", Timestamp::EPOCH);
        tree.update(file, &first, Timestamp::EPOCH);
        tree.update(file, &second, Timestamp::EPOCH);

        assert_eq!(tree.find_by_remote_id("old"), None);
        assert_eq!(tree.find_by_remote_id("new"), Some(file));
    }

    #[test]
    fn set_remote_id_moves_root_index() {
        let mut tree = ResourceTree::new("sync-root");
        tree.set_remote_id(tree.root(), "0AROOT");

        assert_eq!(tree.find_by_remote_id(DEFAULT_ROOT_ID), None);
        assert_eq!(tree.find_by_remote_id("0AROOT"), Some(tree.root()));
    }

    #[test]
    fn walk_visits_parents_first_in_name_order() {
        let mut tree = ResourceTree::new("sync-root");
        let b = tree.add_child(tree.root(), "b", ResourceKind::Folder);
        let a = tree.add_child(tree.root(), "a", ResourceKind::File);
        let inner = tree.add_child(b, "inner", ResourceKind::File);

        assert_eq!(tree.walk(tree.root()), vec![tree.root(), a, b, inner]);
    }
}

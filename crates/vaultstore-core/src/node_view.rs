//! Node views — overlay nodes merging one or more volume nodes.
//!
//! A view observes a priority-ordered multiset of nodes that share one
//! logical path under the vault. Reads resolve against the observed nodes
//! from highest priority downward; writes land on the primary (front)
//! node. Structural changes in any observed node arrive through the
//! observer callbacks and keep the view's own subview tree in step, on the
//! same thread as the triggering mutation.
//!
//! A view whose last observed node goes away is **expired**: it is marked,
//! detached from its parent, and every operation on a retained handle
//! fails from then on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use hashbrown::HashMap;

use crate::node::{Node, ObserverHandle, SubnodeObserver};
use crate::path::{PathView, PATH_SEPARATOR};
use crate::sorted_list::SortedList;
use crate::striped_map::StripedMap;
use crate::value::{Attr, Value, ValueKind, ValueType};
use crate::vault;

/// Maximum number of subviews per node view.
pub const MAX_NUM_SUBVIEWS: usize = 10;

/// Observed-node order: priority descending, ties broken by allocation
/// address so the primary is deterministic.
fn node_sorts_before(a: &Arc<Node>, b: &Arc<Node>) -> bool {
    if a.priority() != b.priority() {
        return a.priority() > b.priority();
    }
    Arc::as_ptr(a) > Arc::as_ptr(b)
}

/// An overlay node in a vault tree.
pub struct NodeView {
    name: String,
    path: String,
    depth: usize,
    subviews: StripedMap<Arc<NodeView>>,
    nodes: SortedList<Arc<Node>>,
    expired: AtomicBool,
    weak_self: Weak<NodeView>,
}

impl NodeView {
    fn new_view(name: String, path: String, depth: usize) -> Arc<NodeView> {
        Arc::new_cyclic(|weak_self| NodeView {
            name,
            path,
            depth,
            subviews: StripedMap::new(),
            nodes: SortedList::new(node_sorts_before),
            expired: AtomicBool::new(false),
            weak_self: weak_self.clone(),
        })
    }

    /// The synthetic vault root: path `"root"`, no observed nodes, never
    /// expires.
    pub(crate) fn new_root() -> Arc<NodeView> {
        NodeView::new_view("root".to_string(), "root".to_string(), 1)
    }

    /// View name; empty once the view has expired.
    pub fn name(&self) -> &str {
        if self.is_expired() {
            return "";
        }
        &self.name
    }

    /// Absolute path from the vault root.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// True once the view no longer observes any node.
    pub fn is_expired(&self) -> bool {
        self.expired.load(Ordering::SeqCst)
    }

    fn observer_handle(&self) -> ObserverHandle {
        self.weak_self.clone()
    }

    fn snapshot_nodes(&self) -> Vec<Arc<Node>> {
        let mut nodes = Vec::new();
        self.nodes.for_each(|node| nodes.push(Arc::clone(node)));
        nodes
    }

    fn snapshot_subviews(&self) -> Vec<Arc<NodeView>> {
        let mut subviews = Vec::new();
        self.subviews.for_each(|subview| subviews.push(Arc::clone(subview)));
        subviews
    }

    /// Create a subnode through the overlay, or open it if a subview
    /// already exists.
    ///
    /// Descends one segment at a time. A segment with a live subview is
    /// entered directly; a missing segment is created on the **primary**
    /// observed node, whose creation event materializes the matching
    /// subview before the descent continues. Returns the subview for the
    /// deepest segment, or `None` if the path is invalid, the view is
    /// expired, or a depth/capacity ceiling is hit along the way.
    pub fn create_subnode(&self, path: impl Into<PathView>) -> Option<Arc<NodeView>> {
        let mut path = path.into();
        if !path.valid() || self.is_expired() {
            return None;
        }

        let first = path.front()?.to_string();
        let subview = match self.subviews.find(&first) {
            Some(subview) if !subview.is_expired() => subview,
            _ => {
                if self.depth >= vault::MAX_TREE_DEPTH {
                    return None;
                }
                let primary = self.nodes.front()?;
                primary.create_subnode(first.as_str())?;
                // the creation event has materialized the subview
                self.open_subnode(first.as_str())?
            }
        };

        if path.composite() {
            path.pop_front();
            return subview.create_subnode(path);
        }

        Some(subview)
    }

    /// Open an existing subview several levels deep.
    pub fn open_subnode(&self, path: impl Into<PathView>) -> Option<Arc<NodeView>> {
        let mut path = path.into();
        if !path.valid() || self.is_expired() {
            return None;
        }

        let subview = self.subviews.find(path.front()?)?;
        if subview.is_expired() {
            return None;
        }

        if path.composite() {
            path.pop_front();
            return subview.open_subnode(path);
        }

        Some(subview)
    }

    /// Attach a volume node under this view.
    ///
    /// Creates (or reuses) a subview named after the node, loads the
    /// node's subtree into it children-first, and only then starts
    /// observing the node — so a concurrent reader never sees the node
    /// attached while its subtree is still loading. A partial failure
    /// unloads whatever was built.
    pub fn load_subnode_tree(&self, subnode: &Arc<Node>) -> Option<Arc<NodeView>> {
        if self.is_expired() || subnode.is_deleted() {
            return None;
        }
        if self.depth >= vault::MAX_TREE_DEPTH {
            return None;
        }

        let name = subnode.name().to_string();
        let child_path = format!("{}{}{}", self.path, PATH_SEPARATOR, name);
        let candidate = NodeView::new_view(name.clone(), child_path, self.depth + 1);

        let (subview, _inserted) =
            self.subviews
                .find_or_insert_with_limit(&name, candidate, MAX_NUM_SUBVIEWS)?;

        let mut children = Vec::new();
        subnode.for_each_subnode(|child| children.push(Arc::clone(child)));
        for child in &children {
            if child.is_deleted() {
                continue;
            }
            if subview.load_subnode_tree(child).is_none() {
                subview.unload_contents();
                self.subviews.erase(&name);
                return None;
            }
        }

        if subview
            .nodes
            .find_first_if(|existing| Arc::ptr_eq(existing, subnode))
            .is_none()
        {
            subview.nodes.push(Arc::clone(subnode));
        }
        subview.expired.store(false, Ordering::SeqCst);
        subnode.register_observer(subview.observer_handle());

        Some(subview)
    }

    /// Detach the named subview and its subtree from the vault without
    /// touching the underlying volumes. Returns false for an invalid or
    /// missing name.
    pub fn unload_subnode_tree(&self, name: impl Into<PathView>) -> bool {
        let name = name.into();
        if !name.valid() || name.composite() || self.is_expired() {
            return false;
        }

        let subview = match self.subviews.find(name.as_str()) {
            Some(subview) => subview,
            None => return false,
        };

        subview.unload_contents();
        self.subviews.erase(name.as_str()) > 0
    }

    /// Detach every subview and its subtree.
    pub fn unload_subnode_trees(&self) {
        if self.is_expired() {
            return;
        }
        for subview in self.snapshot_subviews() {
            subview.unload_contents();
            self.subviews.erase(&subview.name);
        }
    }

    /// Expire this view and everything below it, dropping all node
    /// observations. Children go first so no subview outlives its parent's
    /// reachability.
    fn unload_contents(&self) {
        for subview in self.snapshot_subviews() {
            subview.unload_contents();
            self.subviews.erase(&subview.name);
        }

        let handle = self.observer_handle();
        for node in self.snapshot_nodes() {
            node.unregister_observer(&handle);
        }
        self.nodes.remove_if(|_| true);
        self.expired.store(true, Ordering::SeqCst);
    }

    /// Delete the named subnode tree from **every** observed node. The
    /// deletion events prune the matching subviews. Returns true if any
    /// node deleted a child.
    pub fn delete_subview_tree(&self, name: impl Into<PathView>) -> bool {
        let name = name.into();
        if !name.valid() || name.composite() || self.is_expired() {
            return false;
        }

        let mut any_deleted = false;
        for node in self.snapshot_nodes() {
            any_deleted |= node.delete_subnode_tree(name.clone());
        }
        any_deleted
    }

    /// Delete every subnode tree from every observed node.
    pub fn delete_subview_trees(&self) -> bool {
        if self.is_expired() {
            return false;
        }

        let mut any_deleted = false;
        for node in self.snapshot_nodes() {
            any_deleted |= node.delete_subnode_trees();
        }
        any_deleted
    }

    /// Write an attribute to the highest-priority observed node that
    /// accepts it.
    pub fn set_value(&self, name: &str, value: impl Into<Value>) -> bool {
        if self.is_expired() {
            return false;
        }

        let value = value.into();
        let mut success = false;
        let _ = self.nodes.find_first_if(|node| {
            success = node.set_value(name, value.clone());
            success
        });
        success
    }

    /// Typed attribute read, resolved from the highest-priority observed
    /// node downward.
    pub fn get_value<T: ValueType>(&self, name: &str) -> Option<T> {
        if self.is_expired() {
            return None;
        }

        let mut found = None;
        let _ = self.nodes.find_first_if(|node| {
            found = node.get_value::<T>(name);
            found.is_some()
        });
        found
    }

    /// Tag of the attribute under `name`, in priority order.
    pub fn get_value_kind(&self, name: &str) -> Option<ValueKind> {
        if self.is_expired() {
            return None;
        }

        let mut found = None;
        let _ = self.nodes.find_first_if(|node| {
            found = node.get_value_kind(name);
            found.is_some()
        });
        found
    }

    /// Delete the attribute from the first observed node that had it.
    /// Returns the number of attributes removed.
    pub fn delete_value(&self, name: &str) -> usize {
        if self.is_expired() {
            return 0;
        }

        let mut deleted = 0;
        let _ = self.nodes.find_first_if(|node| {
            deleted = node.delete_value(name);
            deleted > 0
        });
        deleted
    }

    /// Delete every attribute from every observed node.
    pub fn delete_values(&self) {
        if self.is_expired() {
            return;
        }
        self.nodes.for_each(|node| node.delete_values());
    }

    /// Visit every subview.
    ///
    /// Must not invoke [`for_each_value`](NodeView::for_each_value) on the
    /// same view from the callback: the value merge takes observed-node
    /// attribute locks while this traversal holds the subviews buckets,
    /// which closes a lock cycle.
    pub fn for_each_subnode(&self, f: impl FnMut(&Arc<NodeView>)) {
        if self.is_expired() {
            return;
        }
        self.subviews.for_each(f);
    }

    /// Visit the merged attributes of all observed nodes. On a name
    /// collision the higher-priority node wins.
    pub fn for_each_value(&self, mut f: impl FnMut(&Attr)) {
        if self.is_expired() {
            return;
        }

        let mut merged: HashMap<String, Attr> = HashMap::new();
        // nodes are walked in descending priority, so the first entry for
        // a name is the winning one
        self.nodes.for_each(|node| {
            node.for_each_value(|attr| {
                if !merged.contains_key(attr.name()) {
                    merged.insert(attr.name().to_string(), attr.clone());
                }
            });
        });

        for attr in merged.values() {
            f(attr);
        }
    }

    #[cfg(test)]
    pub(crate) fn observed_node_count(&self) -> usize {
        self.nodes.len()
    }

    #[cfg(test)]
    pub(crate) fn observed_priorities(&self) -> Vec<u8> {
        let mut priorities = Vec::new();
        self.nodes.for_each(|node| priorities.push(node.priority()));
        priorities
    }
}

impl SubnodeObserver for NodeView {
    fn on_create_subnode(&self, subnode: &Arc<Node>) {
        if self.depth >= vault::MAX_TREE_DEPTH {
            return;
        }

        let name = subnode.name().to_string();
        let child_path = format!("{}{}{}", self.path, PATH_SEPARATOR, name);
        let candidate = NodeView::new_view(name.clone(), child_path, self.depth + 1);

        let (subview, _inserted) = match self
            .subviews
            .find_or_insert_with_limit(&name, candidate, MAX_NUM_SUBVIEWS)
        {
            Some(found) => found,
            None => return, // capacity ceiling: the event is dropped
        };

        if subview
            .nodes
            .find_first_if(|existing| Arc::ptr_eq(existing, subnode))
            .is_none()
        {
            subview.nodes.push(Arc::clone(subnode));
        }
        subview.expired.store(false, Ordering::SeqCst);
        subnode.register_observer(subview.observer_handle());
    }

    fn on_delete_subnode(&self, subnode: &Arc<Node>) {
        let subview = match self.subviews.find(subnode.name()) {
            Some(subview) => subview,
            None => return,
        };

        subview
            .nodes
            .remove_if(|existing| Arc::ptr_eq(existing, subnode));

        if subview.nodes.is_empty() {
            subview.expired.store(true, Ordering::SeqCst);
            self.subviews.erase(subnode.name());
        }
    }
}

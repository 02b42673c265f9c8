//! Tree nodes — the concurrent core of a volume.
//!
//! A node owns its subnodes and attributes in striped maps and publishes
//! creation/deletion events to a list of weak observer handles. All public
//! methods take `&self`; nodes are shared through `Arc`, with the parent's
//! subnodes map holding the strong reference that keeps a child alive.
//!
//! **Tombstoning**: `delete_subnode_tree` marks the removed subtree
//! `deleted` before erasing it from the parent map, so outstanding `Arc`s
//! held by callers stay safe but every further mutation through them
//! fails.
//!
//! **Event ordering** (the contract views rely on):
//! - creation events fire after the child is inserted, once per actual
//!   insert, and only for the terminal path segment;
//! - deletion events fire bottom-up (deepest subtree first) and before the
//!   child is erased from the parent map, so an observer always sees the
//!   event while the node is still reachable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::path::{PathView, PATH_SEPARATOR};
use crate::sorted_list::SortedList;
use crate::striped_map::StripedMap;
use crate::value::{
    Attr, Value, ValueKind, ValueType, MAX_BIN_VALUE_BYTES, MAX_STR_VALUE_BYTES,
    MAX_VALUE_NAME_BYTES,
};
use crate::volume;

/// Maximum number of direct subnodes per node.
pub const MAX_NUM_SUBNODES: usize = 10;

/// Maximum number of attributes per node.
pub const MAX_NUM_VALUES: usize = 10;

/// Receiver of subnode lifecycle events.
///
/// Implementations must be total: a callback may not panic, and a failure
/// inside one observer must not affect the others.
pub(crate) trait SubnodeObserver: Send + Sync {
    fn on_create_subnode(&self, subnode: &Arc<Node>);
    fn on_delete_subnode(&self, subnode: &Arc<Node>);
}

pub(crate) type ObserverHandle = Weak<dyn SubnodeObserver>;

/// Observer identity: same allocation, vtable metadata ignored.
fn same_observer(a: &ObserverHandle, b: &ObserverHandle) -> bool {
    a.ptr_eq(b)
}

/// A node in a volume tree.
pub struct Node {
    name: String,
    path: String,
    priority: u8,
    depth: usize,
    subnodes: StripedMap<Arc<Node>>,
    values: StripedMap<Attr>,
    observers: SortedList<ObserverHandle>,
    deleted: AtomicBool,
}

impl Node {
    pub(crate) fn new(name: String, path: String, priority: u8, depth: usize) -> Node {
        Node {
            name,
            path,
            priority,
            depth,
            subnodes: StripedMap::new(),
            values: StripedMap::new(),
            observers: SortedList::unordered(),
            deleted: AtomicBool::new(false),
        }
    }

    /// Node name (the last segment of its path).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute path from the volume root. Fixed at creation.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Priority of the owning volume, inherited at creation.
    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// True once the node has been removed from its tree.
    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }

    /// Create a subnode, or open it if it already exists.
    ///
    /// The path may be several levels deep; every missing level is created
    /// on the way down. Returns the deepest node, or `None` on an invalid
    /// path, a tombstoned node, or a depth/capacity ceiling. Creation of a
    /// level that already exists does not fire observer events; a genuine
    /// insert notifies the direct parent's observers only.
    pub fn create_subnode(&self, path: impl Into<PathView>) -> Option<Arc<Node>> {
        let mut path = path.into();
        if !path.valid() || self.is_deleted() {
            return None;
        }
        if self.depth >= volume::MAX_TREE_DEPTH {
            return None;
        }

        let name = path.front()?.to_string();
        let child_path = format!("{}{}{}", self.path, PATH_SEPARATOR, name);
        let candidate = Arc::new(Node::new(name.clone(), child_path, self.priority, self.depth + 1));

        let (subnode, inserted) =
            self.subnodes
                .find_or_insert_with_limit(&name, candidate, MAX_NUM_SUBNODES)?;

        if path.composite() {
            path.pop_front();
            return subnode.create_subnode(path);
        }

        if inserted {
            self.notify_created(&subnode);
        }

        Some(subnode)
    }

    /// Open an existing subnode several levels deep. `None` if any segment
    /// is missing or tombstoned.
    pub fn open_subnode(&self, path: impl Into<PathView>) -> Option<Arc<Node>> {
        let mut path = path.into();
        if !path.valid() || self.is_deleted() {
            return None;
        }

        let subnode = self.subnodes.find(path.front()?)?;
        if subnode.is_deleted() {
            return None;
        }

        if path.composite() {
            path.pop_front();
            return subnode.open_subnode(path);
        }

        Some(subnode)
    }

    /// Delete a direct subnode and its whole subtree.
    ///
    /// `name` must be a single valid segment. Observers are notified
    /// bottom-up and the subtree is tombstoned before the child is erased
    /// from this node, so a viewer always receives the event while the
    /// node is still in the tree. Returns false if the child is absent.
    pub fn delete_subnode_tree(&self, name: impl Into<PathView>) -> bool {
        let name = name.into();
        if !name.valid() || name.composite() || self.is_deleted() {
            return false;
        }

        let subnode = match self.subnodes.find(name.as_str()) {
            Some(subnode) => subnode,
            None => return false,
        };

        self.notify_deleted_recursive(&subnode);

        self.subnodes.erase(name.as_str()) > 0
    }

    /// Delete every direct subnode and its subtree. Notifies observers for
    /// each child, then clears the subnodes map.
    pub fn delete_subnode_trees(&self) -> bool {
        if self.is_deleted() {
            return false;
        }

        for child in self.snapshot_subnodes() {
            self.notify_deleted_recursive(&child);
        }
        self.subnodes.clear();
        true
    }

    /// Set an attribute, overwriting any previous value under the name.
    ///
    /// Fails when the name or a `str`/`bin` payload exceeds its byte bound
    /// (255), or when the node already holds the maximum number of
    /// attributes and the name is new.
    pub fn set_value(&self, name: &str, value: impl Into<Value>) -> bool {
        if self.is_deleted() {
            return false;
        }
        if name.len() > MAX_VALUE_NAME_BYTES {
            return false;
        }

        let value = value.into();
        match &value {
            Value::Str(s) if s.len() > MAX_STR_VALUE_BYTES => return false,
            Value::Bin(b) if b.len() > MAX_BIN_VALUE_BYTES => return false,
            _ => {}
        }

        self.values
            .insert_with_limit_or_assign(name, Attr::new(name, value), MAX_NUM_VALUES)
    }

    /// Typed attribute read; `None` on a missing name or tag mismatch.
    pub fn get_value<T: ValueType>(&self, name: &str) -> Option<T> {
        if self.is_deleted() {
            return None;
        }
        let attr = self.values.find(name)?;
        T::from_value(attr.value())
    }

    /// Tag of the attribute under `name`.
    pub fn get_value_kind(&self, name: &str) -> Option<ValueKind> {
        if self.is_deleted() {
            return None;
        }
        Some(self.values.find(name)?.kind())
    }

    /// Remove one attribute. Returns the number removed (0 or 1).
    pub fn delete_value(&self, name: &str) -> usize {
        if self.is_deleted() {
            return 0;
        }
        self.values.erase(name)
    }

    /// Remove every attribute.
    pub fn delete_values(&self) {
        if self.is_deleted() {
            return;
        }
        self.values.clear();
    }

    /// Visit every direct subnode.
    ///
    /// The callback must not take locks on this node (in particular it
    /// must not mutate this node's subnodes map).
    pub fn for_each_subnode(&self, f: impl FnMut(&Arc<Node>)) {
        if self.is_deleted() {
            return;
        }
        self.subnodes.for_each(f);
    }

    /// Visit every attribute. Same re-entrancy rule as
    /// [`for_each_subnode`](Node::for_each_subnode).
    pub fn for_each_value(&self, f: impl FnMut(&Attr)) {
        if self.is_deleted() {
            return;
        }
        self.values.for_each(f);
    }

    /// Attach an observer. Idempotent per observer identity; no-op on a
    /// tombstoned node.
    pub(crate) fn register_observer(&self, observer: ObserverHandle) {
        if self.is_deleted() {
            return;
        }
        let already = self
            .observers
            .find_first_if(|existing| same_observer(existing, &observer))
            .is_some();
        if !already {
            self.observers.push(observer);
        }
    }

    /// Detach an observer by identity.
    pub(crate) fn unregister_observer(&self, observer: &ObserverHandle) {
        if self.is_deleted() {
            return;
        }
        self.observers
            .remove_if(|existing| same_observer(existing, observer));
    }

    /// Insert a pre-built subnode during volume deserialization. Capacity
    /// still applies; no observer events fire.
    pub(crate) fn attach_subnode(&self, subnode: Arc<Node>) -> bool {
        let name = subnode.name().to_string();
        self.subnodes
            .find_or_insert_with_limit(&name, subnode, MAX_NUM_SUBNODES)
            .is_some()
    }

    fn snapshot_subnodes(&self) -> Vec<Arc<Node>> {
        let mut children = Vec::new();
        self.subnodes.for_each(|child| children.push(Arc::clone(child)));
        children
    }

    fn notify_created(&self, subnode: &Arc<Node>) {
        self.observers.remove_if(|observer| observer.strong_count() == 0);
        self.observers.for_each(|observer| {
            if let Some(observer) = observer.upgrade() {
                observer.on_create_subnode(subnode);
            }
        });
    }

    /// Bottom-up deletion walk: the deepest descendants are announced and
    /// tombstoned first, then `subnode` itself.
    fn notify_deleted_recursive(&self, subnode: &Arc<Node>) {
        for child in subnode.snapshot_subnodes() {
            subnode.notify_deleted_recursive(&child);
        }

        subnode.deleted.store(true, Ordering::SeqCst);

        self.observers.remove_if(|observer| observer.strong_count() == 0);
        self.observers.for_each(|observer| {
            if let Some(observer) = observer.upgrade() {
                observer.on_delete_subnode(subnode);
            }
        });
    }
}

//! Vaults — roots of overlay view trees.

use std::sync::Arc;

use crate::node_view::NodeView;

/// Maximum depth of a vault's view tree, counting the root view as 1.
pub const MAX_TREE_DEPTH: usize = 7;

/// Root of a node-view tree.
///
/// The root view is synthetic: its path is `"root"`, it observes no nodes
/// and never expires. All content enters through
/// [`NodeView::load_subnode_tree`] or [`NodeView::create_subnode`] on the
/// root.
pub struct Vault {
    root: Arc<NodeView>,
}

impl Vault {
    /// Create an empty vault.
    pub fn new() -> Vault {
        Vault {
            root: NodeView::new_root(),
        }
    }

    /// The root view.
    pub fn root(&self) -> &Arc<NodeView> {
        &self.root
    }
}

impl Default for Vault {
    fn default() -> Self {
        Self::new()
    }
}

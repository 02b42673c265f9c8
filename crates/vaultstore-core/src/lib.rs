//! VaultStore Core — Hierarchical In-Process Configuration Store
//!
//! Two stacked tree structures over one concurrent engine:
//!
//! - **Volumes** are standalone, serializable trees of nodes with typed
//!   attributes, bounded fan-out, and observer notifications.
//! - **Vaults** overlay one or more volumes into a single logical tree of
//!   node views, resolving name collisions by volume priority and tracking
//!   structural changes in the underlying volumes in real time.
//!
//! # Architecture
//!
//! - **Read path**: top-down path traversal over striped maps, taking
//!   per-bucket read locks only
//! - **Write path**: per-bucket write locks with CAS-reserved capacity;
//!   observer callbacks run synchronously on the mutating thread
//! - **Persistence**: explicit `save`/`load` of whole volumes in a
//!   bit-exact host-endian layout
//!
//! # Zero Global Locks
//!
//! Every shared structure is locked at bucket or link granularity, so
//! unrelated names never contend and iteration stays safe under
//! concurrent mutation.

pub mod error;
pub mod format;
pub mod node;
pub mod node_view;
pub mod path;
pub mod sorted_list;
pub mod striped_map;
pub mod value;
pub mod vault;
pub mod volume;

// Re-export key types for convenience
pub use error::{StoreError, StoreResult};
pub use node::Node;
pub use node_view::NodeView;
pub use path::PathView;
pub use value::{Attr, Value, ValueKind, ValueType};
pub use vault::Vault;
pub use volume::{PriorityClass, Volume};

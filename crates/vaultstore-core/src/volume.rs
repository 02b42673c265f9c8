//! Volumes — standalone, serializable node trees.
//!
//! A volume names the root of a node tree and stamps every node created
//! under it with its priority byte. Volumes persist only on an explicit
//! `save`; `load` rebuilds a volume from the byte layout in `format.rs`.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::error::{StoreError, StoreResult};
use crate::format;
use crate::node::Node;
use crate::path::PathView;

/// Maximum depth of a volume's node tree, counting the root as 1.
pub const MAX_TREE_DEPTH: usize = 5;

/// Predefined priority values. Higher number, higher priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PriorityClass {
    Lowest = 0,
    Low = 25,
    BelowMedium = 50,
    Medium = 100,
    AboveMedium = 150,
    High = 200,
    Highest = 255,
}

impl From<PriorityClass> for u8 {
    fn from(class: PriorityClass) -> u8 {
        class as u8
    }
}

/// A named, serializable node tree with a collision priority.
pub struct Volume {
    priority: u8,
    root: Arc<Node>,
}

impl Volume {
    /// Create an empty volume whose root node carries `name`.
    ///
    /// `name` must be a single valid path segment. The priority is any
    /// byte; [`PriorityClass`] provides the usual presets.
    pub fn new(name: impl Into<PathView>, priority: impl Into<u8>) -> Option<Volume> {
        let name = name.into();
        if !name.valid() || name.composite() {
            return None;
        }
        let priority = priority.into();
        let root = Arc::new(Node::new(
            name.as_str().to_string(),
            name.as_str().to_string(),
            priority,
            1,
        ));
        Some(Volume { priority, root })
    }

    pub(crate) fn from_parts(priority: u8, root: Arc<Node>) -> Volume {
        Volume { priority, root }
    }

    /// The root node. Holding the returned reference keeps the tree alive
    /// independently of the volume.
    pub fn root(&self) -> &Arc<Node> {
        &self.root
    }

    /// The volume's priority byte.
    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// Serialize the live tree to a file, skipping tombstoned subtrees.
    pub fn save(&self, filepath: impl AsRef<Path>) -> StoreResult<()> {
        let filepath = filepath.as_ref();

        let mut buffer = Vec::with_capacity(256);
        format::serialize_volume(self, &mut buffer);

        let mut file = File::create(filepath).map_err(|e| StoreError::Io {
            path: Some(filepath.to_path_buf()),
            kind: e.kind(),
            message: format!("failed to create volume file: {}", e),
        })?;
        file.write_all(&buffer).map_err(|e| StoreError::Io {
            path: Some(filepath.to_path_buf()),
            kind: e.kind(),
            message: format!("failed to write volume file: {}", e),
        })?;

        Ok(())
    }

    /// Load a volume from a file written by [`save`](Volume::save).
    ///
    /// Fails when the path is not a regular file, the file is empty, or
    /// the image fails any of the format checks (signature, endianness,
    /// value kinds, size and depth limits, exact length).
    pub fn load(filepath: impl AsRef<Path>) -> StoreResult<Volume> {
        let filepath = filepath.as_ref();

        let metadata = std::fs::metadata(filepath).map_err(|e| StoreError::Io {
            path: Some(filepath.to_path_buf()),
            kind: e.kind(),
            message: format!("failed to stat volume file: {}", e),
        })?;
        if !metadata.is_file() {
            return Err(StoreError::NotRegularFile {
                path: filepath.to_path_buf(),
            });
        }

        let buffer = std::fs::read(filepath).map_err(|e| StoreError::Io {
            path: Some(filepath.to_path_buf()),
            kind: e.kind(),
            message: format!("failed to read volume file: {}", e),
        })?;
        if buffer.is_empty() {
            return Err(StoreError::EmptyFile {
                path: filepath.to_path_buf(),
            });
        }

        format::deserialize_volume(&buffer)
    }
}

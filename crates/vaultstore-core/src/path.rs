//! Dotted path parsing and navigation.
//!
//! Paths are non-empty sequences of alphanumeric segments separated by `.`,
//! e.g. `"abc"` or `"a.b.c"`. A path is parsed once at construction; an
//! input that fails the grammar or the size/depth bounds yields a view that
//! answers `valid() == false` and refuses all navigation.

use std::fmt;

/// Segment separator in path strings.
pub const PATH_SEPARATOR: char = '.';

/// Maximum total size of a path in bytes.
pub const MAX_PATH_SIZE_BYTES: usize = 1024;

/// Maximum number of segments in a path.
pub const MAX_PATH_DEPTH: usize = 32;

/// A parsed view over a dotted path.
///
/// The view owns its backing string; segments are stored as byte ranges
/// into it, so cloning a view never invalidates the segments. Navigation
/// (`pop_front`/`pop_back`) shrinks the live window of segments without
/// touching the backing string, which keeps `front`/`back` cheap and makes
/// a popped copy independent of the original.
#[derive(Debug, Clone)]
pub struct PathView {
    raw: String,
    segments: Vec<(usize, usize)>,
    first: usize,
    last: usize,
    parsed_ok: bool,
}

impl PathView {
    /// Parse a path from a string-like source.
    pub fn new(path: impl Into<String>) -> PathView {
        let raw = path.into();
        let mut view = PathView {
            raw,
            segments: Vec::new(),
            first: 0,
            last: 0,
            parsed_ok: false,
        };
        view.parse();
        view
    }

    fn parse(&mut self) {
        if self.raw.is_empty() || self.raw.len() > MAX_PATH_SIZE_BYTES {
            return;
        }

        let mut offset = 0;
        for segment in self.raw.split(PATH_SEPARATOR) {
            if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_alphanumeric()) {
                self.segments.clear();
                return;
            }
            self.segments.push((offset, segment.len()));
            offset += segment.len() + 1;
        }

        if self.segments.len() > MAX_PATH_DEPTH {
            self.segments.clear();
            return;
        }

        self.last = self.segments.len();
        self.parsed_ok = true;
    }

    /// True if the path parsed successfully and still has at least one segment.
    pub fn valid(&self) -> bool {
        self.parsed_ok && self.first < self.last
    }

    /// True if the path has more than one segment.
    pub fn composite(&self) -> bool {
        self.valid() && self.last - self.first > 1
    }

    /// Number of live segments; 0 for an invalid path.
    pub fn size(&self) -> usize {
        if self.valid() {
            self.last - self.first
        } else {
            0
        }
    }

    /// First live segment.
    pub fn front(&self) -> Option<&str> {
        if !self.valid() {
            return None;
        }
        Some(self.segment(self.first))
    }

    /// Last live segment.
    pub fn back(&self) -> Option<&str> {
        if !self.valid() {
            return None;
        }
        Some(self.segment(self.last - 1))
    }

    /// Drop the first segment. No-op on an invalid or exhausted path.
    pub fn pop_front(&mut self) {
        if self.valid() {
            self.first += 1;
        }
    }

    /// Drop the last segment. No-op on an invalid or exhausted path.
    pub fn pop_back(&mut self) {
        if self.valid() {
            self.last -= 1;
        }
    }

    /// The live portion of the path as a string slice; empty if invalid.
    pub fn as_str(&self) -> &str {
        if !self.valid() {
            return "";
        }
        let (start, _) = self.segments[self.first];
        let (last_start, last_len) = self.segments[self.last - 1];
        &self.raw[start..last_start + last_len]
    }

    /// Concatenate a segment name, yielding a new absolute path.
    ///
    /// `p.join("x")` parses `"p.x"`; joining onto an invalid or exhausted
    /// path parses `name` alone.
    pub fn join(&self, name: &str) -> PathView {
        if !self.valid() {
            return PathView::new(name);
        }
        PathView::new(format!("{}{}{}", self.as_str(), PATH_SEPARATOR, name))
    }

    fn segment(&self, index: usize) -> &str {
        let (offset, len) = self.segments[index];
        &self.raw[offset..offset + len]
    }
}

impl From<&str> for PathView {
    fn from(path: &str) -> Self {
        PathView::new(path)
    }
}

impl From<String> for PathView {
    fn from(path: String) -> Self {
        PathView::new(path)
    }
}

impl fmt::Display for PathView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Request URL → store-relative resource key.

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use std::fmt;
use thiserror::Error;

/// Last key segment reserved for collection markers.
pub const MARKER_NAME: &str = "_marker";

/// Characters escaped inside a single href segment.
const SEGMENT_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b'\\')
    .add(b'^')
    .add(b'|')
    .add(b'[')
    .add(b']');

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path `{0}` is outside the mount prefix")]
    OutsideMount(String),
    #[error("path `{0}` is not valid percent-encoded UTF-8")]
    InvalidEncoding(String),
}

/// A normalized, percent-decoded, store-relative key.
///
/// Never has a leading or trailing slash; the empty key is the root, which is
/// always a collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ResourceKey(String);

impl ResourceKey {
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Build a key from a raw store key, dropping empty and `.` segments.
    pub fn from_store_key(key: &str) -> Self {
        Self::from_segments(key.split('/'))
    }

    fn from_segments<'a>(segments: impl IntoIterator<Item = &'a str>) -> Self {
        let mut out: Vec<&str> = Vec::new();
        for segment in segments {
            match segment {
                "" | "." => {}
                ".." => {
                    out.pop();
                }
                other => out.push(other),
            }
        }
        Self(out.join("/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Last segment; empty for the root.
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(match self.0.rfind('/') {
            Some(pos) => Self(self.0[..pos].to_string()),
            None => Self::root(),
        })
    }

    pub fn join(&self, relative: &str) -> Self {
        Self::from_segments(self.0.split('/').chain(relative.split('/')))
    }

    /// Prefix that every descendant key starts with (`""` for the root).
    pub fn child_prefix(&self) -> String {
        if self.is_root() {
            String::new()
        } else {
            format!("{}/", self.0)
        }
    }

    /// Store key of this collection's marker object.
    pub fn marker_key(&self) -> String {
        format!("{}{}", self.child_prefix(), MARKER_NAME)
    }

    /// Whether the key names a collection marker itself.
    pub fn is_reserved(&self) -> bool {
        self.name() == MARKER_NAME
    }

    /// Whether `self` lies strictly below `ancestor`.
    pub fn is_descendant_of(&self, ancestor: &ResourceKey) -> bool {
        self != ancestor && self.0.starts_with(&ancestor.child_prefix())
    }

    /// Absolute, percent-encoded href under `mount_prefix`. Collections get a
    /// trailing slash.
    pub fn href(&self, mount_prefix: &str, is_collection: bool) -> String {
        let mut href = String::from(mount_prefix);
        for segment in self.0.split('/').filter(|s| !s.is_empty()) {
            href.push('/');
            href.extend(utf8_percent_encode(segment, SEGMENT_ENCODE_SET));
        }
        if is_collection || href.is_empty() {
            href.push('/');
        }
        href
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0)
    }
}

/// Normalize a mount prefix to `""` (root) or `/seg/seg` form.
pub fn normalize_mount_prefix(prefix: &str) -> String {
    let key = ResourceKey::from_store_key(prefix);
    if key.is_root() {
        String::new()
    } else {
        format!("/{}", key.as_str())
    }
}

/// Resolve the path component of a request URL into a key.
///
/// Strips `mount_prefix` (as produced by [`normalize_mount_prefix`]), decodes
/// percent-escapes, collapses duplicate slashes, resolves dot segments and
/// drops the trailing slash. URLs that differ only in those respects resolve
/// to the same key.
pub fn resolve(path: &str, mount_prefix: &str) -> Result<ResourceKey, PathError> {
    let path = path.split(['?', '#']).next().unwrap_or("");
    let decoded = percent_decode_str(path)
        .decode_utf8()
        .map_err(|_| PathError::InvalidEncoding(path.to_string()))?;
    let full = ResourceKey::from_store_key(&decoded);

    let mount = ResourceKey::from_store_key(mount_prefix);
    if mount.is_root() {
        return Ok(full);
    }
    if full == mount {
        return Ok(ResourceKey::root());
    }
    full.as_str()
        .strip_prefix(&mount.child_prefix())
        .map(ResourceKey::from_store_key)
        .ok_or_else(|| PathError::OutsideMount(path.to_string()))
}

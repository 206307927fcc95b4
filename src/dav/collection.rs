//! Directory semantics on top of a flat key space.
//!
//! A collection is either *explicit* (a zero-byte marker object at
//! `<key>/_marker` tagged `resourcetype = collection`) or *implicit* (no
//! marker, but at least one object under `<key>/`). Implicit collections have
//! no stored representation; their properties are synthesized.

use crate::{
    dav::path::ResourceKey,
    services::object_store::{
        CustomMetadata, ListObjectsParams, ObjectInfo, ObjectStore, StoreResult,
    },
};
use tracing::trace;

pub const RESOURCETYPE_KEY: &str = "resourcetype";
pub const COLLECTION_RESOURCETYPE: &str = "collection";
pub const MARKER_CONTENT_TYPE: &str = "application/x-directory";

/// What a key denotes in the emulated hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Missing,
    Object(ObjectInfo),
    /// Carries the marker object's attributes.
    ExplicitCollection(ObjectInfo),
    ImplicitCollection,
}

impl Resource {
    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            Resource::ExplicitCollection(_) | Resource::ImplicitCollection
        )
    }

    pub fn exists(&self) -> bool {
        !matches!(self, Resource::Missing)
    }
}

/// Custom metadata stamped on every marker object.
pub fn marker_metadata() -> CustomMetadata {
    CustomMetadata::from([(RESOURCETYPE_KEY.to_string(), COLLECTION_RESOURCETYPE.to_string())])
}

/// Classify `key`.
///
/// Order of probes: marker, then a one-result prefix scan, then the object
/// itself. A collection therefore shadows a plain object stored under the same
/// key. The root is always a collection and costs no store call.
pub async fn classify(store: &dyn ObjectStore, key: &ResourceKey) -> StoreResult<Resource> {
    if key.is_root() {
        return Ok(Resource::ImplicitCollection);
    }

    if let Some(marker) = probe(store, &key.marker_key()).await? {
        trace!(%key, "explicit collection");
        return Ok(Resource::ExplicitCollection(marker));
    }

    if has_children(store, key).await? {
        trace!(%key, "implicit collection");
        return Ok(Resource::ImplicitCollection);
    }

    Ok(match probe(store, key.as_str()).await? {
        Some(info) => Resource::Object(info),
        None => Resource::Missing,
    })
}

/// Whether any object exists under `<key>/`.
pub async fn has_children(store: &dyn ObjectStore, key: &ResourceKey) -> StoreResult<bool> {
    let page = store
        .list(ListObjectsParams {
            prefix: Some(key.child_prefix()),
            delimiter: Some("/".into()),
            continuation_token: None,
            max_keys: 1,
        })
        .await?;
    Ok(!page.objects.is_empty() || !page.common_prefixes.is_empty())
}

/// `head` that maps NotFound to `None`.
pub async fn probe(store: &dyn ObjectStore, key: &str) -> StoreResult<Option<ObjectInfo>> {
    match store.head(key).await {
        Ok(info) => Ok(Some(info)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

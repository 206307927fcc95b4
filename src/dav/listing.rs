//! Enumerates the members of a collection with prefix (+delimiter) queries.
//!
//! Listings are paginated against the store and materialized before anything
//! is rendered, so a store error mid-way aborts the whole request. Every
//! listing is bounded by `max_listing_entries`. Entry order follows whatever
//! the store returns folded through a map keyed by relative path; callers must
//! not rely on it.

use crate::{
    dav::{
        collection::{self, Resource},
        path::{MARKER_NAME, ResourceKey},
    },
    errors::{DavError, DavResult},
    services::object_store::{ListObjectsParams, ListObjectsResult, ObjectInfo, ObjectStore},
};
use chrono::{DateTime, Utc};
use std::{collections::BTreeMap, fmt};

const PAGE_SIZE: usize = 1000;

/// Value of the `Depth` request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}

impl Depth {
    /// Parse a `Depth` header; absent means `infinity`.
    pub fn parse(header: Option<&str>) -> DavResult<Self> {
        match header.map(str::trim) {
            None => Ok(Depth::Infinity),
            Some("0") => Ok(Depth::Zero),
            Some("1") => Ok(Depth::One),
            Some(v) if v.eq_ignore_ascii_case("infinity") => Ok(Depth::Infinity),
            Some(other) => Err(DavError::BadRequest(format!(
                "invalid Depth header `{other}`"
            ))),
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Depth::Zero => "0",
            Depth::One => "1",
            Depth::Infinity => "infinity",
        })
    }
}

/// Resolved view of one resource for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub key: ResourceKey,
    pub name: String,
    pub is_collection: bool,
    pub href: String,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub size: u64,
    pub content_type: Option<String>,
}

impl ListingEntry {
    pub fn object(key: ResourceKey, info: &ObjectInfo, mount_prefix: &str) -> Self {
        Self {
            name: key.name().to_string(),
            href: key.href(mount_prefix, false),
            is_collection: false,
            etag: Some(info.etag.clone()),
            last_modified: Some(info.last_modified),
            size: info.size,
            content_type: info.content_type.clone(),
            key,
        }
    }

    /// A collection entry; without a marker its properties are synthesized.
    pub fn collection(key: ResourceKey, marker: Option<&ObjectInfo>, mount_prefix: &str) -> Self {
        Self {
            name: key.name().to_string(),
            href: key.href(mount_prefix, true),
            is_collection: true,
            etag: marker.map(|m| m.etag.clone()),
            last_modified: marker.map(|m| m.last_modified),
            size: 0,
            content_type: None,
            key,
        }
    }

    /// Self-description of a classified resource; `None` when it is missing.
    pub fn for_resource(key: &ResourceKey, resource: &Resource, mount_prefix: &str) -> Option<Self> {
        match resource {
            Resource::Missing => None,
            Resource::Object(info) => Some(Self::object(key.clone(), info, mount_prefix)),
            Resource::ExplicitCollection(marker) => {
                Some(Self::collection(key.clone(), Some(marker), mount_prefix))
            }
            Resource::ImplicitCollection => Some(Self::collection(key.clone(), None, mount_prefix)),
        }
    }
}

pub struct ListingEngine<'a> {
    store: &'a dyn ObjectStore,
    mount_prefix: &'a str,
    limit: usize,
}

impl<'a> ListingEngine<'a> {
    pub fn new(store: &'a dyn ObjectStore, mount_prefix: &'a str, limit: usize) -> Self {
        Self {
            store,
            mount_prefix,
            limit,
        }
    }

    /// Members of the collection `key`, excluding `key` itself and markers.
    ///
    /// `Depth::Zero` yields nothing; the caller supplies the self entry.
    pub async fn list(&self, key: &ResourceKey, depth: Depth) -> DavResult<Vec<ListingEntry>> {
        let members = match depth {
            Depth::Zero => BTreeMap::new(),
            Depth::One => self.direct_children(key).await?,
            Depth::Infinity => self.all_descendants(key).await?,
        };
        tracing::debug!(%key, %depth, count = members.len(), "listed collection");
        Ok(members.into_values().collect())
    }

    /// Every stored object under `key/`, markers included.
    pub async fn descendant_objects(&self, key: &ResourceKey) -> DavResult<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        self.scan(key, None, |page| {
            objects.extend(page.objects);
            objects.len()
        })
        .await?;
        Ok(objects)
    }

    async fn direct_children(&self, key: &ResourceKey) -> DavResult<BTreeMap<String, ListingEntry>> {
        let prefix = key.child_prefix();
        let mut members = BTreeMap::new();
        self.scan(key, Some("/"), |page| {
            for prefix_key in page.common_prefixes {
                let Some(rest) = prefix_key.strip_prefix(&prefix) else {
                    continue;
                };
                let name = rest.trim_end_matches('/');
                if name.is_empty() {
                    continue;
                }
                let entry = ListingEntry::collection(key.join(name), None, self.mount_prefix);
                insert_collection(&mut members, name.to_string(), entry, false);
            }
            for info in page.objects {
                let Some(name) = info.key.strip_prefix(&prefix) else {
                    continue;
                };
                if name.is_empty() || name == MARKER_NAME || name.contains('/') {
                    continue;
                }
                let entry = ListingEntry::object(key.join(name), &info, self.mount_prefix);
                members.entry(name.to_string()).or_insert(entry);
            }
            members.len()
        })
        .await?;

        // Delimited listings fold `child/_marker` into the common prefix, so
        // explicit children are looked up to report their marker's properties.
        for entry in members.values_mut().filter(|entry| entry.is_collection) {
            if let Some(marker) = collection::probe(self.store, &entry.key.marker_key()).await? {
                entry.etag = Some(marker.etag);
                entry.last_modified = Some(marker.last_modified);
            }
        }
        Ok(members)
    }

    async fn all_descendants(&self, key: &ResourceKey) -> DavResult<BTreeMap<String, ListingEntry>> {
        let prefix = key.child_prefix();
        let mut members = BTreeMap::new();
        self.scan(key, None, |page| {
            for info in page.objects {
                let Some(rest) = info.key.strip_prefix(&prefix) else {
                    continue;
                };
                let segments: Vec<&str> = rest
                    .split('/')
                    .filter(|s| !s.is_empty())
                    .collect();
                let Some((last, parents)) = segments.split_last() else {
                    continue;
                };

                for depth in 1..=parents.len() {
                    let rel = parents[..depth].join("/");
                    let entry = ListingEntry::collection(key.join(&rel), None, self.mount_prefix);
                    insert_collection(&mut members, rel, entry, false);
                }

                if *last == MARKER_NAME {
                    // The collection's own marker describes `key`, not a member.
                    if !parents.is_empty() {
                        let rel = parents.join("/");
                        let entry =
                            ListingEntry::collection(key.join(&rel), Some(&info), self.mount_prefix);
                        insert_collection(&mut members, rel, entry, true);
                    }
                    continue;
                }

                let rel = segments.join("/");
                let entry = ListingEntry::object(key.join(&rel), &info, self.mount_prefix);
                members.entry(rel).or_insert(entry);
            }
            members.len()
        })
        .await?;
        Ok(members)
    }

    /// Walk every page under `key/`. `visit` returns the running entry count,
    /// which is checked against the bound after each page.
    async fn scan<F>(&self, key: &ResourceKey, delimiter: Option<&str>, mut visit: F) -> DavResult<()>
    where
        F: FnMut(ListObjectsResult) -> usize,
    {
        let mut continuation_token = None;
        loop {
            let page = self
                .store
                .list(ListObjectsParams {
                    prefix: Some(key.child_prefix()),
                    delimiter: delimiter.map(str::to_string),
                    continuation_token: continuation_token.take(),
                    max_keys: PAGE_SIZE,
                })
                .await?;

            let is_truncated = page.is_truncated;
            let next = page.next_continuation_token.clone();
            if visit(page) > self.limit {
                return Err(DavError::ListingTooLarge {
                    key: key.to_string(),
                    limit: self.limit,
                });
            }

            match next {
                Some(token) if is_truncated => continuation_token = Some(token),
                _ => return Ok(()),
            }
        }
    }
}

/// Collections shadow files of the same name; explicit shadows implicit.
fn insert_collection(
    members: &mut BTreeMap<String, ListingEntry>,
    rel: String,
    entry: ListingEntry,
    explicit: bool,
) {
    let replace = match members.get(&rel) {
        None => true,
        Some(existing) => explicit || !existing.is_collection,
    };
    if replace {
        members.insert(rel, entry);
    }
}

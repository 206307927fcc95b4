//! WebDAV operations expressed as sequences of flat store calls.
//!
//! Each public method is one request from the client's point of view, but may
//! issue several store calls. Those calls are sequential and individually
//! atomic; nothing here is transactional. Multi-object operations report the
//! members that failed instead of pretending to be atomic.

use crate::{
    dav::{
        collection::{self, MARKER_CONTENT_TYPE, Resource, marker_metadata},
        listing::{Depth, ListingEngine, ListingEntry},
        path::ResourceKey,
        render::MemberStatus,
    },
    errors::{DavError, DavResult},
    services::object_store::{
        ByteStream, ObjectInfo, ObjectReader, ObjectStore, PutOptions, StoreResult,
    },
};
use axum::http::StatusCode;
use futures::{StreamExt, stream};
use std::sync::Arc;
use tracing::{debug, info, warn};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Protocol settings passed explicitly to every operation.
#[derive(Debug, Clone)]
pub struct DavSettings {
    /// Normalized mount prefix: `""` or `/seg[/seg...]`.
    pub mount_prefix: String,
    pub max_listing_entries: usize,
    /// Extra attempts at removing a MOVE source after the copy succeeded.
    pub move_delete_retries: u32,
}

impl Default for DavSettings {
    fn default() -> Self {
        Self {
            mount_prefix: String::new(),
            max_listing_entries: 10_000,
            move_delete_retries: 2,
        }
    }
}

/// Result of HEAD.
#[derive(Debug)]
pub enum HeadOutcome {
    Object(ObjectInfo),
    Collection,
}

/// Result of GET.
#[derive(Debug)]
pub enum GetOutcome {
    File(ObjectReader),
    Directory {
        title: String,
        parent_href: Option<String>,
        entries: Vec<ListingEntry>,
    },
}

/// Members that could not be processed by a multi-object operation. Empty
/// means every step succeeded.
#[derive(Debug, Default)]
pub struct MultiOutcome {
    pub failures: Vec<MemberStatus>,
}

impl MultiOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Clone)]
pub struct DavService {
    store: Arc<dyn ObjectStore>,
    settings: Arc<DavSettings>,
}

impl DavService {
    pub fn new(store: Arc<dyn ObjectStore>, settings: DavSettings) -> Self {
        Self {
            store,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &DavSettings {
        &self.settings
    }

    fn listing(&self) -> ListingEngine<'_> {
        ListingEngine::new(
            self.store.as_ref(),
            &self.settings.mount_prefix,
            self.settings.max_listing_entries,
        )
    }

    pub async fn classify(&self, key: &ResourceKey) -> DavResult<Resource> {
        Ok(collection::classify(self.store.as_ref(), key).await?)
    }

    pub async fn head(&self, key: &ResourceKey) -> DavResult<HeadOutcome> {
        match self.classify(key).await? {
            Resource::Object(info) => Ok(HeadOutcome::Object(info)),
            Resource::ExplicitCollection(_) | Resource::ImplicitCollection => {
                Ok(HeadOutcome::Collection)
            }
            Resource::Missing => Err(DavError::NotFound(key.to_string())),
        }
    }

    pub async fn get(&self, key: &ResourceKey) -> DavResult<GetOutcome> {
        match self.classify(key).await? {
            Resource::Object(_) => Ok(GetOutcome::File(self.store.get(key.as_str()).await?)),
            Resource::ExplicitCollection(_) | Resource::ImplicitCollection => {
                let entries = self.listing().list(key, Depth::One).await?;
                let title = if key.is_root() {
                    String::from("/")
                } else {
                    format!("{key}/")
                };
                Ok(GetOutcome::Directory {
                    title,
                    parent_href: key
                        .parent()
                        .map(|parent| parent.href(&self.settings.mount_prefix, true)),
                    entries,
                })
            }
            Resource::Missing => Err(DavError::NotFound(key.to_string())),
        }
    }

    pub async fn put(
        &self,
        key: &ResourceKey,
        body: ByteStream,
        content_type: Option<String>,
    ) -> DavResult<ObjectInfo> {
        ensure_addressable(key)?;
        if self.classify(key).await?.is_collection() {
            return Err(DavError::MethodNotAllowed(format!("{key} is a collection")));
        }

        let opts = PutOptions {
            content_type: Some(content_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.into())),
            metadata: Default::default(),
        };
        let info = self.store.put(key.as_str(), body, opts).await?;
        info!(%key, size = info.size, "object written");
        Ok(info)
    }

    /// Remove `key`. Absent keys succeed; collections are removed member by
    /// member.
    pub async fn delete(&self, key: &ResourceKey) -> DavResult<MultiOutcome> {
        if key.is_root() {
            return Err(DavError::MethodNotAllowed("cannot delete the root".into()));
        }
        if key.is_reserved() {
            return Err(reserved(key));
        }

        let mut outcome = MultiOutcome::default();
        if self.classify(key).await?.is_collection() {
            let members = self.listing().descendant_objects(key).await?;
            for member in removal_order(members) {
                if let Err(err) = self.delete_quietly(&member.key).await {
                    warn!(key = %member.key, error = %err, "failed to delete collection member");
                    outcome.failures.push(self.member_failure(&member.key, err.to_string()));
                }
            }
        }
        self.delete_quietly(key.as_str()).await?;
        info!(%key, failures = outcome.failures.len(), "deleted");
        Ok(outcome)
    }

    /// Create the marker for `key`. Succeeds when the marker already exists.
    pub async fn mkcol(&self, key: &ResourceKey) -> DavResult<()> {
        if key.is_root() {
            return Err(DavError::MethodNotAllowed(
                "the root collection always exists".into(),
            ));
        }
        if key.is_reserved() {
            return Err(reserved(key));
        }

        let marker_key = key.marker_key();
        if collection::probe(self.store.as_ref(), &marker_key).await?.is_some() {
            debug!(%key, "collection already exists");
            return Ok(());
        }
        if collection::probe(self.store.as_ref(), key.as_str()).await?.is_some() {
            return Err(DavError::MethodNotAllowed(format!(
                "{key} already exists as a file"
            )));
        }

        self.put_marker(&marker_key).await?;
        info!(%key, "collection created");
        Ok(())
    }

    /// Self entry followed by members up to `depth`.
    pub async fn propfind(&self, key: &ResourceKey, depth: Depth) -> DavResult<Vec<ListingEntry>> {
        let resource = self.classify(key).await?;
        let Some(own) = ListingEntry::for_resource(key, &resource, &self.settings.mount_prefix)
        else {
            return Err(DavError::NotFound(key.to_string()));
        };

        let mut entries = vec![own];
        if resource.is_collection() {
            let members = self.listing().list(key, depth).await.map_err(|err| match err {
                DavError::ListingTooLarge { .. } if depth == Depth::Infinity => {
                    DavError::FiniteDepthRequired(key.to_string())
                }
                other => other,
            })?;
            entries.extend(members);
        }
        Ok(entries)
    }

    pub async fn copy(
        &self,
        src: &ResourceKey,
        dst: &ResourceKey,
        depth: Depth,
        overwrite: bool,
    ) -> DavResult<MultiOutcome> {
        if depth == Depth::One {
            return Err(DavError::BadRequest(
                "COPY accepts Depth 0 or infinity".into(),
            ));
        }
        let (_, outcome) = self.transfer(src, dst, depth, overwrite).await?;
        info!(%src, %dst, failures = outcome.failures.len(), "copied");
        Ok(outcome)
    }

    /// Copy, then remove the source. The source is left untouched when any
    /// copy step fails; a source that cannot be removed after a complete copy
    /// is reported per member.
    pub async fn move_(
        &self,
        src: &ResourceKey,
        dst: &ResourceKey,
        overwrite: bool,
    ) -> DavResult<MultiOutcome> {
        let (copied, mut outcome) = self.transfer(src, dst, Depth::Infinity, overwrite).await?;
        if !outcome.is_complete() {
            warn!(%src, %dst, "copy incomplete, source kept");
            return Ok(outcome);
        }

        for key in removal_order(copied).into_iter().map(|info| info.key) {
            if let Err(err) = self.delete_with_retry(&key).await {
                warn!(%key, error = %err, "source not removed after copy");
                outcome.failures.push(self.member_failure(
                    &key,
                    format!("copied to {dst} but source not removed: {err}"),
                ));
            }
        }
        info!(%src, %dst, failures = outcome.failures.len(), "moved");
        Ok(outcome)
    }

    /// Shared COPY/MOVE body. Returns the source objects that were copied.
    async fn transfer(
        &self,
        src: &ResourceKey,
        dst: &ResourceKey,
        depth: Depth,
        overwrite: bool,
    ) -> DavResult<(Vec<ObjectInfo>, MultiOutcome)> {
        if src.is_root() || dst.is_root() {
            return Err(DavError::Forbidden(
                "the root cannot be copied, moved or replaced".into(),
            ));
        }
        if src.is_reserved() {
            return Err(reserved(src));
        }
        if dst.is_reserved() {
            return Err(reserved(dst));
        }
        if src == dst {
            return Err(DavError::Forbidden(
                "source and destination are the same".into(),
            ));
        }
        if dst.is_descendant_of(src) {
            return Err(DavError::Forbidden(
                "destination lies inside the source".into(),
            ));
        }
        if src.is_descendant_of(dst) {
            return Err(DavError::Forbidden(
                "source lies inside the destination".into(),
            ));
        }

        let source = self.classify(src).await?;
        if !source.exists() {
            return Err(DavError::NotFound(src.to_string()));
        }

        let destination = self.classify(dst).await?;
        if destination.exists() {
            if !overwrite {
                return Err(DavError::PreconditionFailed(format!(
                    "{dst} exists and Overwrite is F"
                )));
            }
            if destination.is_collection() {
                let cleared = self.delete(dst).await?;
                if !cleared.is_complete() {
                    return Ok((Vec::new(), cleared));
                }
            } else if source.is_collection() {
                // A file left under a collection's key resurfaces once the
                // collection empties.
                self.delete_quietly(dst.as_str()).await?;
            }
        }

        let mut outcome = MultiOutcome::default();
        let copied = match source {
            Resource::Object(info) => {
                self.copy_object(&info.key, dst.as_str()).await?;
                vec![info]
            }
            _ if depth == Depth::Zero => {
                self.put_marker(&dst.marker_key()).await?;
                Vec::new()
            }
            _ => {
                let members = self.listing().descendant_objects(src).await?;
                let src_prefix = src.child_prefix();
                let dst_prefix = dst.child_prefix();
                let mut copied = Vec::with_capacity(members.len());
                for member in members {
                    let Some(rel) = member.key.strip_prefix(&src_prefix) else {
                        continue;
                    };
                    let target = format!("{dst_prefix}{rel}");
                    match self.copy_object(&member.key, &target).await {
                        Ok(_) => copied.push(member),
                        Err(err) => {
                            warn!(from = %member.key, to = %target, error = %err, "member copy failed");
                            outcome.failures.push(self.member_failure(&target, err.to_string()));
                        }
                    }
                }
                copied
            }
        };
        Ok((copied, outcome))
    }

    /// Stream `from` into `to`, preserving content type and custom metadata.
    async fn copy_object(&self, from: &str, to: &str) -> DavResult<ObjectInfo> {
        let reader = self.store.get(from).await?;
        let opts = PutOptions {
            content_type: reader.info.content_type.clone(),
            metadata: reader.info.metadata.clone(),
        };
        Ok(self.store.put(to, reader.body, opts).await?)
    }

    async fn put_marker(&self, marker_key: &str) -> StoreResult<ObjectInfo> {
        let opts = PutOptions {
            content_type: Some(MARKER_CONTENT_TYPE.into()),
            metadata: marker_metadata(),
        };
        self.store.put(marker_key, stream::empty().boxed(), opts).await
    }

    /// Delete treating NotFound as success.
    async fn delete_quietly(&self, key: &str) -> StoreResult<()> {
        match self.store.delete(key).await {
            Err(err) if err.is_not_found() => Ok(()),
            other => other,
        }
    }

    async fn delete_with_retry(&self, key: &str) -> StoreResult<()> {
        let mut attempt = 0;
        loop {
            match self.delete_quietly(key).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < self.settings.move_delete_retries => {
                    attempt += 1;
                    debug!(key, attempt, error = %err, "retrying delete");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Failure entry for a raw store key; markers are reported under their
    /// collection's href.
    fn member_failure(&self, raw_key: &str, description: String) -> MemberStatus {
        let key = ResourceKey::from_store_key(raw_key);
        let href = match key.parent() {
            Some(parent) if key.is_reserved() => parent.href(&self.settings.mount_prefix, true),
            _ => key.href(&self.settings.mount_prefix, false),
        };
        MemberStatus {
            href,
            status: StatusCode::INTERNAL_SERVER_ERROR,
            description: Some(description),
        }
    }
}

/// PUT-style targets: not the root, not a marker.
fn ensure_addressable(key: &ResourceKey) -> DavResult<()> {
    if key.is_root() {
        return Err(DavError::MethodNotAllowed("the root is a collection".into()));
    }
    if key.is_reserved() {
        return Err(reserved(key));
    }
    Ok(())
}

fn reserved(key: &ResourceKey) -> DavError {
    DavError::Forbidden(format!("{key} uses a reserved name"))
}

/// Files first, then markers deepest first, so a collection stays visible
/// until its contents are gone.
fn removal_order(mut objects: Vec<ObjectInfo>) -> Vec<ObjectInfo> {
    objects.sort_by_key(|info| {
        let is_marker = ResourceKey::from_store_key(&info.key).is_reserved();
        (is_marker, std::cmp::Reverse(info.key.matches('/').count()))
    });
    objects
}

//! The store binding the WebDAV layer talks to.
//!
//! A flat, prefix-addressed key space: whole-object `head`/`get`/`put`/`delete`
//! plus prefix+delimiter listing. Every call is individually consistent; there
//! are no cross-key transactions.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use std::{collections::BTreeMap, io};
use thiserror::Error;

/// Streaming object payload.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Custom metadata attached to an object.
pub type CustomMetadata = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Attributes of a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub etag: String,
    pub last_modified: DateTime<Utc>,
    pub content_type: Option<String>,
    /// Populated by `head`/`get`; always empty in listing results.
    pub metadata: CustomMetadata,
}

/// An object opened for reading.
pub struct ObjectReader {
    pub info: ObjectInfo,
    pub body: ByteStream,
}

impl std::fmt::Debug for ObjectReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectReader")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub content_type: Option<String>,
    pub metadata: CustomMetadata,
}

#[derive(Clone, Debug, Default)]
pub struct ListObjectsParams {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    /// Opaque token from a previous page's `next_continuation_token`.
    pub continuation_token: Option<String>,
    pub max_keys: usize,
}

#[derive(Debug, Default)]
pub struct ListObjectsResult {
    pub objects: Vec<ObjectInfo>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
}

/// Flat object store collaborator.
///
/// `delete` of an absent key must report [`StoreError::NotFound`] rather than
/// an opaque backend error, so callers can treat it as success.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn head(&self, key: &str) -> StoreResult<ObjectInfo>;

    async fn get(&self, key: &str) -> StoreResult<ObjectReader>;

    async fn put(&self, key: &str, body: ByteStream, opts: PutOptions) -> StoreResult<ObjectInfo>;

    async fn delete(&self, key: &str) -> StoreResult<()>;

    async fn list(&self, params: ListObjectsParams) -> StoreResult<ListObjectsResult>;
}

//! src/services/storage_service.rs
//!
//! StorageService: the flat object store behind the WebDAV gateway, backed by
//! SQLite for metadata and local disk for object payloads. Payloads are sharded
//! beneath `base_path/{bucket}/{shard}/{shard}/{md5(key)}` so that keys such as
//! `a` and `a/_marker` never compete for the same filesystem path.

use crate::{
    models::{bucket::Bucket, metadata::ObjectMetadata, object::Object},
    services::object_store::{
        ByteStream, CustomMetadata, ListObjectsParams, ListObjectsResult, ObjectInfo,
        ObjectReader, ObjectStore, PutOptions, StoreError, StoreResult,
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::{
    collections::BTreeSet,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

/// StorageService provides the object store operations the WebDAV layer needs:
/// - Put an object (streams bytes to disk and upserts metadata into SQLite)
/// - Head / get an object (metadata from SQLite, payload from disk)
/// - List objects by prefix and delimiter (query SQLite)
/// - Delete an object (soft-delete in SQLite and remove the payload)
///
/// One instance is bound to one bucket; the bucket identity is fixed at
/// construction and never read from ambient state.
#[derive(Clone)]
pub struct StorageService {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,

    bucket: Bucket,
}

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;
const MAX_LIST_KEYS: usize = 1000;

impl StorageService {
    /// Open the store for `bucket_name`, creating the bucket row and its
    /// directory when they do not exist yet.
    pub async fn open(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        bucket_name: &str,
    ) -> StoreResult<Self> {
        ensure_bucket_name_safe(bucket_name)?;
        let base_path = base_path.into();
        let bucket = ensure_bucket(&db, bucket_name).await?;
        fs::create_dir_all(base_path.join(&bucket.name)).await?;

        debug!(bucket = %bucket.name, id = %bucket.id, "storage service opened");
        Ok(Self {
            db,
            base_path,
            bucket,
        })
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket.name
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    ///
    /// Rejects empty keys, keys that begin with `/`, `..` segments, and
    /// control characters.
    fn ensure_key_safe(&self, key: &str) -> StoreResult<()> {
        let invalid = key.is_empty()
            || key.len() > MAX_OBJECT_KEY_LEN
            || key.starts_with('/')
            || key.split('/').any(|segment| segment == "..")
            || key
                .bytes()
                .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
        if invalid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(())
    }

    /// Compute the physical base folder path for the bucket.
    fn bucket_root(&self) -> PathBuf {
        self.base_path.join(&self.bucket.name)
    }

    /// Construct a fully-qualified object payload path.
    ///
    /// Uses MD5(bucket/key): the first two bytes pick two shard levels
    /// (00–ff), the full digest names the file.
    fn object_path(&self, key: &str) -> PathBuf {
        let digest = md5::compute(format!("{}/{}", self.bucket.name, key));
        let mut path = self.bucket_root();
        path.push(format!("{:02x}", digest[0]));
        path.push(format!("{:02x}", digest[1]));
        path.push(format!("{:x}", digest));
        path
    }

    /// Fetch a non-deleted object metadata record.
    async fn fetch_object(&self, key: &str) -> StoreResult<Object> {
        sqlx::query_as::<_, Object>(
            "SELECT id, bucket_id, key, filename, content_type, size_bytes, etag,
                    last_modified, is_deleted
             FROM objects
             WHERE key = ? AND bucket_id = ? AND is_deleted = 0",
        )
        .bind(key)
        .bind(self.bucket.id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StoreError::NotFound(key.to_string()),
            other => StoreError::Sqlx(other),
        })
    }

    async fn fetch_metadata(&self, object_id: Uuid) -> StoreResult<CustomMetadata> {
        let rows = sqlx::query_as::<_, ObjectMetadata>(
            "SELECT id, object_id, key, value FROM object_metadata WHERE object_id = ?",
        )
        .bind(object_id)
        .fetch_all(&*self.db)
        .await?;

        Ok(rows.into_iter().map(|row| (row.key, row.value)).collect())
    }

    async fn describe(&self, object: Object) -> StoreResult<ObjectInfo> {
        let metadata = self.fetch_metadata(object.id).await?;
        Ok(object_info(object, metadata))
    }

    /// Stream-upload an object to disk and update metadata.
    ///
    /// - Writes bytes incrementally to a temporary file.
    /// - Computes MD5/etag and size while streaming.
    /// - Atomically renames into final location.
    /// - Upserts the metadata row and replaces its custom metadata.
    ///
    /// Cleans up temp files on errors.
    pub async fn upload_object_stream<S>(
        &self,
        key: &str,
        opts: PutOptions,
        stream: S,
    ) -> StoreResult<ObjectInfo>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        self.ensure_key_safe(key)?;

        let file_path = self.object_path(key);
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| io::Error::other("object path missing parent directory"))?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StoreError::Io(err));
                }
            };
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }

        let filename = key.rsplit('/').next().unwrap_or(key).to_string();
        let etag = format!("{:x}", digest.compute());

        let object = sqlx::query_as::<_, Object>(
            r#"
            INSERT INTO objects (
                id, bucket_id, key, filename, content_type, size_bytes,
                etag, last_modified, is_deleted
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)
            ON CONFLICT(bucket_id, key) DO UPDATE SET
                filename = excluded.filename,
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                last_modified = excluded.last_modified,
                is_deleted = 0
            RETURNING id, bucket_id, key, filename, content_type, size_bytes,
                      etag, last_modified, is_deleted
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(self.bucket.id)
        .bind(key)
        .bind(&filename)
        .bind(opts.content_type.clone())
        .bind(size_bytes)
        .bind(&etag)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await
        .map_err(StoreError::Sqlx)?;

        self.replace_metadata(object.id, &opts.metadata).await?;

        debug!(key, size_bytes, etag = %etag, "stored object");
        Ok(object_info(object, opts.metadata))
    }

    async fn replace_metadata(&self, object_id: Uuid, metadata: &CustomMetadata) -> StoreResult<()> {
        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM object_metadata WHERE object_id = ?")
            .bind(object_id)
            .execute(&mut *tx)
            .await?;
        for (key, value) in metadata {
            sqlx::query(
                "INSERT INTO object_metadata (id, object_id, key, value) VALUES (?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4())
            .bind(object_id)
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Fetch an object for reading.
    ///
    /// Returns NotFound if metadata exists but the physical file is missing.
    pub async fn get_object_reader(&self, key: &str) -> StoreResult<ObjectReader> {
        self.ensure_key_safe(key)?;
        let object = self.fetch_object(key).await?;

        let file_path = self.object_path(key);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StoreError::NotFound(key.to_string())
            } else {
                StoreError::Io(err)
            }
        })?;

        let info = self.describe(object).await?;
        Ok(ObjectReader {
            info,
            body: ReaderStream::new(file).boxed(),
        })
    }

    /// Fetch only object metadata.
    pub async fn get_object_metadata(&self, key: &str) -> StoreResult<ObjectInfo> {
        self.ensure_key_safe(key)?;
        let object = self.fetch_object(key).await?;
        self.describe(object).await
    }

    /// List objects following S3 ListObjectsV2 rules.
    ///
    /// Supports:
    /// - exact, case-sensitive prefix filtering
    /// - delimiter grouping
    /// - continuation tokens
    /// - lexicographical ordering
    /// - soft-deleted filtering
    pub async fn list_objects(&self, params: ListObjectsParams) -> StoreResult<ListObjectsResult> {
        let max_keys = params.max_keys.clamp(1, MAX_LIST_KEYS);
        let fetch_limit = max_keys + 1;

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT id, bucket_id, key, filename, content_type, size_bytes, etag, \
             last_modified, is_deleted \
             FROM objects WHERE bucket_id = ",
        );
        builder.push_bind(self.bucket.id);
        builder.push(" AND is_deleted = 0");

        // LIKE would treat `_` as a wildcard and fold ASCII case.
        if let Some(prefix) = params.prefix.as_deref().filter(|p| !p.is_empty()) {
            builder.push(" AND substr(key, 1, ");
            builder.push_bind(prefix.chars().count() as i64);
            builder.push(") = ");
            builder.push_bind(prefix.to_string());
        }

        if let Some(token) = &params.continuation_token {
            builder.push(" AND key > ");
            builder.push_bind(token.clone());
        }

        builder.push(" ORDER BY key ASC LIMIT ");
        builder.push_bind(fetch_limit as i64);

        let mut rows: Vec<Object> = builder.build_query_as().fetch_all(&*self.db).await?;

        let mut is_truncated = false;
        let mut next_continuation_token = None;
        if rows.len() == fetch_limit {
            rows.pop();
            next_continuation_token = rows.last().map(|last| last.key.clone());
            is_truncated = true;
        }

        let mut objects = Vec::new();
        let mut common_prefixes = BTreeSet::new();
        for obj in rows {
            if let Some(delim) = params.delimiter.as_deref().filter(|d| !d.is_empty()) {
                if let Some(prefix) =
                    compute_common_prefix(&obj.key, params.prefix.as_deref(), delim)
                {
                    common_prefixes.insert(prefix);
                    continue;
                }
            }
            objects.push(object_info(obj, CustomMetadata::new()));
        }

        Ok(ListObjectsResult {
            objects,
            common_prefixes: common_prefixes.into_iter().collect(),
            is_truncated,
            next_continuation_token,
        })
    }

    /// Soft-delete an object and remove its payload.
    ///
    /// - Sets `is_deleted = 1`
    /// - Deletes the physical file
    /// - Prunes empty shard directories
    ///
    /// Returns NotFound if the object is absent or already deleted.
    pub async fn delete_object(&self, key: &str) -> StoreResult<()> {
        self.ensure_key_safe(key)?;

        let result = sqlx::query(
            "UPDATE objects SET is_deleted = 1 WHERE key = ? AND bucket_id = ? AND is_deleted = 0",
        )
        .bind(key)
        .bind(self.bucket.id)
        .execute(&*self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(key.to_string()));
        }

        let file_path = self.object_path(key);
        match fs::remove_file(&file_path).await {
            Ok(()) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(StoreError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &self.bucket_root()).await;
        }

        Ok(())
    }

    /// Recursively remove empty directories up to bucket root.
    ///
    /// Stops when:
    /// - directory not empty
    /// - directory not found
    /// - reached root
    /// - encountered unexpected I/O errors
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(()) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStore for StorageService {
    async fn head(&self, key: &str) -> StoreResult<ObjectInfo> {
        self.get_object_metadata(key).await
    }

    async fn get(&self, key: &str) -> StoreResult<ObjectReader> {
        self.get_object_reader(key).await
    }

    async fn put(&self, key: &str, body: ByteStream, opts: PutOptions) -> StoreResult<ObjectInfo> {
        self.upload_object_stream(key, opts, body).await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.delete_object(key).await
    }

    async fn list(&self, params: ListObjectsParams) -> StoreResult<ListObjectsResult> {
        self.list_objects(params).await
    }
}

fn object_info(object: Object, metadata: CustomMetadata) -> ObjectInfo {
    ObjectInfo {
        size: u64::try_from(object.size_bytes).unwrap_or(0),
        etag: object.etag.unwrap_or_default(),
        last_modified: object.last_modified,
        content_type: object.content_type,
        key: object.key,
        metadata,
    }
}

/// Fetch the bucket row, inserting it on first use.
async fn ensure_bucket(db: &SqlitePool, name: &str) -> StoreResult<Bucket> {
    sqlx::query(
        "INSERT INTO buckets (id, name, created_at) VALUES (?, ?, ?)
         ON CONFLICT(name) DO NOTHING",
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(Utc::now())
    .execute(db)
    .await?;

    let bucket = sqlx::query_as::<_, Bucket>(
        "SELECT id, name, created_at FROM buckets WHERE name = ?",
    )
    .bind(name)
    .fetch_one(db)
    .await?;
    Ok(bucket)
}

/// Validate bucket name format.
///
/// Enforces S3-like naming rules:
/// - 3–63 characters
/// - lowercase letters, digits, dots, hyphens only
/// - cannot start/end with dot or hyphen
/// - cannot contain consecutive dots or dot-hyphen patterns
/// - cannot look like an IPv4 address
pub fn ensure_bucket_name_safe(name: &str) -> StoreResult<()> {
    let invalid = |reason: &str| StoreError::InvalidBucketName {
        name: name.to_string(),
        reason: reason.into(),
    };

    let len = name.len();
    if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
        return Err(invalid("must be between 3 and 63 characters"));
    }

    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
    {
        return Err(invalid(
            "allowed characters are lowercase letters, digits, dots, and hyphens",
        ));
    }

    if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
        return Err(invalid("must start and end with a lowercase letter or digit"));
    }

    if name.contains("..") || name.contains("-.") || name.contains(".-") {
        return Err(invalid(
            "cannot contain consecutive dots or dot-hyphen combinations",
        ));
    }

    if is_ipv4_like(name) {
        return Err(invalid("must not be formatted like an IP address"));
    }

    Ok(())
}

/// Compute a synthetic "common prefix" for S3 list semantics.
///
/// Used only when a delimiter is provided. Returns Some(prefix) if the key
/// belongs to a grouped prefix, otherwise None.
fn compute_common_prefix(
    key: &str,
    requested_prefix: Option<&str>,
    delimiter: &str,
) -> Option<String> {
    let prefix = requested_prefix.unwrap_or("");
    let after_prefix = key.strip_prefix(prefix)?;
    let pos = after_prefix.find(delimiter)?;
    Some(format!("{}{}", prefix, &after_prefix[..pos + delimiter.len()]))
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}

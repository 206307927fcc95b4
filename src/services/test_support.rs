//! Fixtures shared by the unit tests.

use crate::{
    db,
    services::{object_store::ByteStream, storage_service::StorageService},
};
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, stream};
use std::sync::Arc;
use tempfile::TempDir;

/// A fresh store in its own temporary directory. Keep the `TempDir` alive for
/// the duration of the test.
pub async fn temp_storage() -> (TempDir, StorageService) {
    let dir = TempDir::new().expect("temp dir");
    let db_url = format!("sqlite://{}", dir.path().join("meta.db").display());
    let pool = db::connect(&db_url).await.expect("connect sqlite");
    db::run_migrations(&pool).await.expect("migrate");
    let storage = StorageService::open(Arc::new(pool), dir.path().join("objects"), "webdav")
        .await
        .expect("open storage");
    (dir, storage)
}

pub fn bytes_body(content: &'static str) -> ByteStream {
    stream::once(async move { Ok(Bytes::from_static(content.as_bytes())) }).boxed()
}

pub async fn read_all(body: ByteStream) -> Vec<u8> {
    body.try_fold(Vec::new(), |mut acc, chunk| async move {
        acc.extend_from_slice(&chunk);
        Ok(acc)
    })
    .await
    .expect("read body")
}

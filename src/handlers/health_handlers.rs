//! Health & readiness handlers.
//!
//! - GET /healthz  -> liveness ("ok"), no I/O
//! - GET /readyz   -> readiness: metadata database, bucket row and payload disk
//!
//! Both names are reserved at the server root and never reach the WebDAV
//! dispatcher.

use crate::{services::storage_service::StorageService, state::AppState};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::fs;
use uuid::Uuid;

const PROBE_CONTENT: &[u8] = b"readyz";

/// `GET /healthz`
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// `GET /readyz`
///
/// 200 when every check passes, 503 otherwise. The body names each check
/// and the error it hit.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let storage = &state.storage;

    let mut checks = BTreeMap::new();
    checks.insert("sqlite", check_sqlite(storage).await);
    checks.insert("bucket", check_bucket(storage).await);
    checks.insert("disk", check_disk(storage).await);

    let ready = checks.values().all(|check| check.ok);
    if !ready {
        let failed: Vec<&str> = checks
            .iter()
            .filter(|(_, check)| !check.ok)
            .map(|(name, _)| *name)
            .collect();
        tracing::warn!(?failed, "readiness check failed");
    }

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = ReadyResponse {
        status: if ready { "ok" } else { "error" },
        bucket: storage.bucket_name().to_string(),
        checks,
    };
    (status, Json(body))
}

async fn check_sqlite(storage: &StorageService) -> CheckStatus {
    match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&*storage.db)
        .await
    {
        Ok(1) => CheckStatus::pass(),
        Ok(v) => CheckStatus::fail(format!("unexpected result: {v}")),
        Err(e) => CheckStatus::fail(format!("error: {e}")),
    }
}

/// The configured bucket row must still be present.
async fn check_bucket(storage: &StorageService) -> CheckStatus {
    match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM buckets WHERE name = ?")
        .bind(storage.bucket_name())
        .fetch_one(&*storage.db)
        .await
    {
        Ok(1) => CheckStatus::pass(),
        Ok(_) => CheckStatus::fail(format!("bucket `{}` missing", storage.bucket_name())),
        Err(e) => CheckStatus::fail(format!("error: {e}")),
    }
}

/// Write, read back and remove a scratch file under the bucket directory.
async fn check_disk(storage: &StorageService) -> CheckStatus {
    let probe = storage
        .base_path
        .join(storage.bucket_name())
        .join(format!(".readyz-{}", Uuid::new_v4()));

    if let Err(e) = fs::write(&probe, PROBE_CONTENT).await {
        return CheckStatus::fail(format!("could not write probe: {e}"));
    }
    let read = fs::read(&probe).await;
    let removed = fs::remove_file(&probe).await;

    match (read, removed) {
        (Ok(bytes), _) if bytes != PROBE_CONTENT => CheckStatus::fail("probe content mismatch".into()),
        (Err(e), _) => CheckStatus::fail(format!("could not read probe: {e}")),
        (Ok(_), Err(e)) => CheckStatus {
            ok: true,
            error: Some(format!("could not remove probe: {e}")),
        },
        (Ok(_), Ok(())) => CheckStatus::pass(),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    bucket: String,
    checks: BTreeMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn pass() -> Self {
        Self { ok: true, error: None }
    }

    fn fail(error: String) -> Self {
        Self {
            ok: false,
            error: Some(error),
        }
    }
}

//! In-process server harness for the HTTP integration tests.
//!
//! Each `TestServer` owns a temporary SQLite database and payload directory,
//! serves the gateway on an ephemeral port and tears everything down on drop.

#![allow(dead_code)]

use object_dav::{db, services::dav_service::DavSettings, services::storage_service::StorageService};
use reqwest::{Client, Method, Response, StatusCode};
use std::{sync::Arc, time::Duration};
use tempfile::TempDir;
use tokio::{net::TcpListener, task::JoinHandle};

pub struct TestServer {
    client: Client,
    /// `http://127.0.0.1:<port>`, without the mount prefix.
    pub origin: String,
    pub settings: DavSettings,
    handle: JoinHandle<()>,
    _temp_dir: TempDir,
}

impl TestServer {
    /// Server mounted at the root with default bounds.
    pub async fn start() -> Self {
        Self::with_settings(DavSettings::default()).await
    }

    pub async fn with_settings(settings: DavSettings) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_url = format!("sqlite://{}", temp_dir.path().join("meta.db").display());
        let pool = db::connect(&db_url).await.expect("Failed to open database");
        db::run_migrations(&pool).await.expect("Failed to migrate");

        let storage = StorageService::open(Arc::new(pool), temp_dir.path().join("objects"), "webdav")
            .await
            .expect("Failed to open storage");
        let app = object_dav::app(storage, settings.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let origin = format!("http://{}", listener.local_addr().expect("local addr"));
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("server crashed");
        });

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            origin,
            settings,
            handle,
            _temp_dir: temp_dir,
        }
    }

    /// Full URL for a path below the mount prefix.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.origin, self.settings.mount_prefix, path)
    }

    pub fn request(&self, method: &str, path: &str) -> reqwest::RequestBuilder {
        let method = Method::from_bytes(method.as_bytes()).expect("valid method");
        self.client.request(method, self.url(path))
    }

    // ========== HTTP Convenience Methods ==========

    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("GET request failed")
    }

    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let resp = self.get(path).await;
        let status = resp.status();
        (status, resp.text().await.unwrap_or_default())
    }

    pub async fn head(&self, path: &str) -> Response {
        self.client
            .head(self.url(path))
            .send()
            .await
            .expect("HEAD request failed")
    }

    pub async fn put(&self, path: &str, body: impl Into<reqwest::Body>) -> Response {
        self.client
            .put(self.url(path))
            .body(body)
            .send()
            .await
            .expect("PUT request failed")
    }

    /// PUT and assert 201.
    pub async fn put_ok(&self, path: &str, body: impl Into<reqwest::Body>) {
        let resp = self.put(path, body).await;
        assert_eq!(resp.status(), StatusCode::CREATED, "PUT {path} failed");
    }

    pub async fn delete(&self, path: &str) -> Response {
        self.client
            .delete(self.url(path))
            .send()
            .await
            .expect("DELETE request failed")
    }

    pub async fn mkcol(&self, path: &str) -> Response {
        self.request("MKCOL", path)
            .send()
            .await
            .expect("MKCOL request failed")
    }

    pub async fn propfind(&self, path: &str, depth: &str) -> (StatusCode, String) {
        let resp = self
            .request("PROPFIND", path)
            .header("Depth", depth)
            .send()
            .await
            .expect("PROPFIND request failed");
        let status = resp.status();
        (status, resp.text().await.unwrap_or_default())
    }

    /// COPY with an absolute-path `Destination`.
    pub async fn copy(&self, from: &str, to: &str) -> Response {
        self.request("COPY", from)
            .header("Destination", format!("{}{}", self.settings.mount_prefix, to))
            .send()
            .await
            .expect("COPY request failed")
    }

    /// MOVE with an absolute-URL `Destination`.
    pub async fn move_(&self, from: &str, to: &str) -> Response {
        self.request("MOVE", from)
            .header("Destination", self.url(to))
            .send()
            .await
            .expect("MOVE request failed")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

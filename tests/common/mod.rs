#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use adslot_admin::catalog::Format;
use adslot_admin::config::AppConfig;
use adslot_admin::db::{self, DbPool};
use adslot_admin::storage::{BlobStore, LocalBlobStore};
use adslot_admin::{build_router, AppState};

pub const PUBLIC_BASE: &str = "http://cdn.test/public";

/// PNG のマジックバイト（`image::guess_format` が判定できる最小限）
pub const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

const BOUNDARY: &str = "adslot-test-boundary";

/// 障害を注入できる BlobStore
///   - `copy`: 宛先パスに指定文字列を含む場合に失敗、または指定時間だけ遅延
///   - `delete` / `delete_prefix`: 指定プレフィックス配下で失敗
pub struct FlakyBlobStore {
    inner: LocalBlobStore,
    fail_on: Mutex<Vec<String>>,
    fail_deletes: Mutex<Vec<String>>,
    copy_delay_ms: AtomicU64,
}

impl FlakyBlobStore {
    fn new(inner: LocalBlobStore) -> Self {
        Self {
            inner,
            fail_on: Mutex::new(Vec::new()),
            fail_deletes: Mutex::new(Vec::new()),
            copy_delay_ms: AtomicU64::new(0),
        }
    }

    pub fn fail_copies_to(&self, needle: &str) {
        self.fail_on.lock().unwrap().push(needle.to_string());
    }

    pub fn fail_deletes_under(&self, prefix: &str) {
        self.fail_deletes.lock().unwrap().push(prefix.to_string());
    }

    pub fn delay_copies(&self, ms: u64) {
        self.copy_delay_ms.store(ms, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.fail_on.lock().unwrap().clear();
        self.fail_deletes.lock().unwrap().clear();
        self.copy_delay_ms.store(0, Ordering::SeqCst);
    }

    fn delete_fails(&self, path: &str) -> bool {
        self.fail_deletes
            .lock()
            .unwrap()
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

#[async_trait]
impl BlobStore for FlakyBlobStore {
    async fn save(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        self.inner.save(path, bytes, content_type).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list(prefix).await
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<()> {
        let failing = self
            .fail_on
            .lock()
            .unwrap()
            .iter()
            .any(|needle| dst.contains(needle.as_str()));
        if failing {
            bail!("simulated copy failure: {}", dst);
        }

        let delay = self.copy_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.inner.copy(src, dst).await
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        if self.delete_fails(path) {
            bail!("simulated delete failure: {}", path);
        }
        self.inner.delete(path).await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        if self.delete_fails(prefix) {
            bail!("simulated delete failure: {}", prefix);
        }
        self.inner.delete_prefix(prefix).await
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        self.inner.exists(path).await
    }

    async fn make_public(&self, path: &str) -> Result<String> {
        self.inner.make_public(path).await
    }

    fn public_url(&self, path: &str) -> String {
        self.inner.public_url(path)
    }
}

pub struct TestApp {
    pub router: Router,
    pub db: DbPool,
    pub blobs: Arc<FlakyBlobStore>,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            blob_root: dir.path().to_path_buf(),
            public_base_url: PUBLIC_BASE.to_string(),
            ..AppConfig::default()
        };

        let pool = db::init_memory_db().await.unwrap();
        let blobs = Arc::new(FlakyBlobStore::new(LocalBlobStore::new(dir.path(), PUBLIC_BASE)));
        let state = AppState::new(pool.clone(), blobs.clone(), config).unwrap();

        Self {
            router: build_router(Arc::new(state)),
            db: pool,
            blobs,
            _dir: dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::DELETE)
            .uri(uri)
            .header("x-user-email", "ops@example.com")
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn json(&self, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-user-email", "ops@example.com")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.json(Method::POST, uri, body).await
    }

    pub async fn post_multipart(
        &self,
        uri: &str,
        fields: &[(&str, &str)],
        file: Option<&[u8]>,
    ) -> (StatusCode, Value) {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some(bytes) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"upload.png\"\r\nContent-Type: image/png\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::post(uri)
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .header("x-user-email", "ops@example.com")
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    /// クライアント登録して ID を返す
    pub async fn register(&self, name: &str) -> String {
        let (status, body) = self
            .post_json("/api/clients", serde_json::json!({ "name": name }))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["client"]["id"].as_str().unwrap().to_string()
    }

    pub async fn upload_format(&self, client_id: &str, format: Format) {
        let uri = format!("/api/clients/{client_id}/formats");
        let (status, body) = self
            .post_multipart(&uri, &[("format", format.label())], Some(PNG))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }

    pub async fn upload_all_formats(&self, client_id: &str) {
        for format in Format::ALL {
            self.upload_format(client_id, format).await;
        }
    }

    pub async fn count_creatives(&self) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM game_images")
            .fetch_one(&self.db)
            .await
            .unwrap();
        count
    }
}

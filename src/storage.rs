//! Blob Storage
//! 画像ファイルの保存・一覧・コピー・削除・公開URL発行
//!
//! パス規約（互換性のため変更不可）:
//!   - マスター画像: `client/<clientName>/<format>/<format>.<ext>`
//!   - 週次公開画像: `pub_images/<country>/week<N>/<group>/<position>.<ext>`

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::catalog::{Format, PositionCode};

const META_SUFFIX: &str = ".meta.json";

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// バイト列を保存（既存は上書き）
    async fn save(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<()>;

    /// プレフィックス一致でオブジェクト名を列挙（ソート済み）
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    async fn copy(&self, src: &str, dst: &str) -> Result<()>;

    /// 削除。存在しなかった場合は `false`
    async fn delete(&self, path: &str) -> Result<bool>;

    /// プレフィックス配下を全削除して件数を返す
    async fn delete_prefix(&self, prefix: &str) -> Result<usize>;

    async fn exists(&self, path: &str) -> Result<bool>;

    /// 公開設定して公開 URL を返す
    async fn make_public(&self, path: &str) -> Result<String>;

    fn public_url(&self, path: &str) -> String;
}

/// オブジェクトのメタデータ（`<file>.meta.json`）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobMeta {
    pub content_type: String,
    pub size_bytes: u64,
    pub sha256: String,
    #[serde(default)]
    pub public: bool,
}

// ========================================
// LocalBlobStore
// ========================================

/// ローカルディスク上の Blob ストア（公開は Web サーバ側が配信）
pub struct LocalBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// オブジェクト名 → 実パス（`..` や絶対パスは拒否）
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let rel = Path::new(path);
        if path.is_empty()
            || rel
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            bail!("invalid object path: {:?}", path);
        }
        Ok(self.root.join(rel))
    }

    fn meta_path(file: &Path) -> PathBuf {
        let mut name = file.as_os_str().to_owned();
        name.push(META_SUFFIX);
        PathBuf::from(name)
    }

    pub async fn read_meta(&self, path: &str) -> Result<BlobMeta> {
        let file = self.resolve(path)?;
        let content = fs::read_to_string(Self::meta_path(&file))
            .await
            .with_context(|| format!("no metadata for {}", path))?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn write_meta(file: &Path, meta: &BlobMeta) -> Result<()> {
        let json = serde_json::to_string_pretty(meta)?;
        fs::write(Self::meta_path(file), json).await?;
        Ok(())
    }

    /// プレフィックスの最後の `/` までを起点ディレクトリとして再帰走査
    async fn walk(&self, prefix: &str) -> Result<Vec<String>> {
        let start_rel = match prefix.rfind('/') {
            Some(idx) => &prefix[..idx],
            None => "",
        };
        let start = if start_rel.is_empty() {
            self.root.clone()
        } else {
            self.resolve(start_rel)?
        };

        let mut found = Vec::new();
        if !fs::try_exists(&start).await.unwrap_or(false) {
            return Ok(found);
        }

        let mut stack = vec![start];
        while let Some(dir) = stack.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    stack.push(path);
                    continue;
                }
                let Ok(rel) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let name = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if name.ends_with(META_SUFFIX) {
                    continue;
                }
                found.push(name);
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn save(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        let target = self.resolve(path)?;
        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create directory: {:?}", dir))?;
        }

        let mut file = fs::File::create(&target)
            .await
            .with_context(|| format!("Failed to create file: {:?}", target))?;
        file.write_all(bytes).await?;
        file.flush().await?;

        let meta = BlobMeta {
            content_type: content_type.to_string(),
            size_bytes: bytes.len() as u64,
            sha256: compute_sha256(bytes),
            public: false,
        };
        Self::write_meta(&target, &meta).await?;

        info!("✅ Blob saved: {} ({} bytes, {})", path, bytes.len(), content_type);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .walk(prefix)
            .await?
            .into_iter()
            .filter(|name| name.starts_with(prefix))
            .collect();
        names.sort();
        Ok(names)
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<()> {
        let from = self.resolve(src)?;
        let to = self.resolve(dst)?;
        if let Some(dir) = to.parent() {
            fs::create_dir_all(dir).await?;
        }
        fs::copy(&from, &to)
            .await
            .with_context(|| format!("Failed to copy {} -> {}", src, dst))?;

        // メタデータは引き継ぐが公開フラグは落とす
        let meta = match self.read_meta(src).await {
            Ok(meta) => BlobMeta { public: false, ..meta },
            Err(_) => {
                let bytes = fs::read(&to).await?;
                BlobMeta {
                    content_type: "application/octet-stream".to_string(),
                    size_bytes: bytes.len() as u64,
                    sha256: compute_sha256(&bytes),
                    public: false,
                }
            }
        };
        Self::write_meta(&to, &meta).await?;

        info!("📋 Blob copied: {} -> {}", src, dst);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        let target = self.resolve(path)?;
        match fs::remove_file(&target).await {
            Ok(_) => {
                let _ = fs::remove_file(Self::meta_path(&target)).await;
                info!("🗑️  Blob deleted: {}", path);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let names = self.list(prefix).await?;
        let mut deleted = 0;
        for name in &names {
            if self.delete(name).await? {
                deleted += 1;
            }
        }

        // ディレクトリ単位のプレフィックスなら空ディレクトリも掃除
        if let Some(dir) = prefix.strip_suffix('/') {
            if let Ok(path) = self.resolve(dir) {
                if let Err(e) = fs::remove_dir_all(&path).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove directory {:?}: {}", path, e);
                    }
                }
            }
        }

        Ok(deleted)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let target = self.resolve(path)?;
        Ok(fs::try_exists(&target).await?)
    }

    async fn make_public(&self, path: &str) -> Result<String> {
        let target = self.resolve(path)?;
        if !fs::try_exists(&target).await? {
            bail!("object does not exist: {}", path);
        }

        // Web サーバが読めるようにパーミッションを変更（ベストエフォート）
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = fs::set_permissions(&target, std::fs::Permissions::from_mode(0o644)).await {
                warn!("Failed to chmod (not critical): {}", e);
            }
        }

        if let Ok(mut meta) = self.read_meta(path).await {
            meta.public = true;
            Self::write_meta(&target, &meta).await?;
        }

        Ok(self.public_url(path))
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_base_url, path)
    }
}

// ========================================
// パス規約
// ========================================

/// クライアントの名前空間（削除時のカスケード対象）
pub fn client_namespace(client_name: &str) -> String {
    format!("client/{}/", client_name)
}

/// マスター画像のディレクトリ
pub fn client_master_prefix(client_name: &str, format: Format) -> String {
    format!("client/{}/{}/", client_name, format)
}

pub fn client_master_path(client_name: &str, format: Format, ext: &str) -> String {
    format!("client/{}/{}/{}.{}", client_name, format, format, ext)
}

pub fn publication_path(country: &str, week_number: u32, position: PositionCode, ext: &str) -> String {
    format!(
        "pub_images/{}/week{}/{}/{}.{}",
        country,
        week_number,
        position.group(),
        position,
        ext
    )
}

/// ファイル名 / URL の拡張子（小文字）
pub fn extension_of(name: &str) -> Option<String> {
    let last_segment = name.rsplit('/').next().unwrap_or(name);
    let (_, ext) = last_segment.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// 画像バイト列から Content-Type と標準拡張子を推定（画像以外は None）
pub fn sniff_image(bytes: &[u8]) -> Option<(&'static str, &'static str)> {
    let format = image::guess_format(bytes).ok()?;
    let ext = format.extensions_str().first().copied()?;
    Some((format.to_mime_type(), ext))
}

/// SHA256 計算
pub fn compute_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

//! Client Format Registry
//! クライアント登録とフォーマット別マスター画像の管理

use tracing::{info, warn};

use crate::catalog::{Format, OfferType};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::{Client, ClientRow, FormatFlags, MissingFormat};
use crate::storage::{self, BlobStore};

use super::now_ms;

/// 表示名 → クライアント ID（小文字化、空白の連続を `-` に）
pub fn client_id_for(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

fn validate_name(name: &str) -> AppResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Client name is required".to_string()));
    }
    // 名前はそのまま Blob パスの一部になる
    if name.contains('/') || name.contains('\\') {
        return Err(AppError::Validation(format!(
            "Client name must not contain path separators: {}",
            name
        )));
    }
    Ok(name)
}

pub async fn register_client(db: &DbPool, name: &str) -> AppResult<Client> {
    let name = validate_name(name)?;
    let id = client_id_for(name);
    let formats = FormatFlags::none_uploaded();
    let now = now_ms();

    let result = sqlx::query(
        "INSERT INTO clients (id, name, formats, created_at_ms) VALUES (?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(name)
    .bind(formats.to_json())
    .bind(now)
    .execute(db)
    .await;

    match result {
        Ok(_) => {}
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(AppError::Conflict(format!("Client already exists: {}", id)));
        }
        Err(e) => return Err(e.into()),
    }

    info!("Client registered: id={}, name={}", id, name);
    Ok(Client {
        id,
        name: name.to_string(),
        formats,
        created_at: now,
    })
}

pub async fn get_client(db: &DbPool, id: &str) -> AppResult<Client> {
    let row: Option<ClientRow> = sqlx::query_as("SELECT * FROM clients WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?;

    row.ok_or_else(|| AppError::not_found("Client", id))?.try_into()
}

pub async fn list_clients(db: &DbPool) -> AppResult<Vec<Client>> {
    let rows: Vec<ClientRow> = sqlx::query_as("SELECT * FROM clients ORDER BY name ASC")
        .fetch_all(db)
        .await?;

    rows.into_iter().map(Client::try_from).collect()
}

/// フォーマットのフラグを立てる（Blob 保存と公開が成功した後にだけ呼ぶ）
///
/// 他フォーマットのフラグは読み書きしない（並行アップロードで上書きしない）。
pub async fn mark_format_uploaded(db: &DbPool, id: &str, format: Format) -> AppResult<Client> {
    let path = format!("$.\"{}\"", format.label());

    let result = sqlx::query("UPDATE clients SET formats = json_set(formats, ?, json('true')) WHERE id = ?")
        .bind(&path)
        .bind(id)
        .execute(db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Client", id));
    }

    get_client(db, id).await
}

/// オファーの全ポジションのうち、マスター画像が無いフォーマットを列挙（カタログ順）
pub fn missing_formats(client: &Client, offer: OfferType) -> Vec<MissingFormat> {
    offer
        .positions()
        .iter()
        .filter(|position| !client.formats.has(position.format()))
        .map(|&position| MissingFormat {
            format: position.format(),
            position,
        })
        .collect()
}

/// ドキュメントのみ削除して削除前の値を返す（Blob の後始末は呼び出し側）
pub async fn delete_client(db: &DbPool, id: &str) -> AppResult<Client> {
    let client = get_client(db, id).await?;

    sqlx::query("DELETE FROM clients WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;

    info!("Client deleted: id={}", id);
    Ok(client)
}

/// `client/<name>/` 配下を削除。失敗はログのみ
pub async fn purge_client_assets(blobs: &dyn BlobStore, client: &Client) -> usize {
    let prefix = storage::client_namespace(&client.name);
    match blobs.delete_prefix(&prefix).await {
        Ok(count) => {
            info!("🗑️  Purged {} asset(s) under {}", count, prefix);
            count
        }
        Err(e) => {
            warn!("Failed to purge assets under {} (ignored): {}", prefix, e);
            0
        }
    }
}

/// マスター画像のパス（`client/<name>/<format>/<format>.*` の先頭）
pub async fn find_master_asset(
    blobs: &dyn BlobStore,
    client_name: &str,
    format: Format,
) -> AppResult<Option<String>> {
    let stem = format!("{}{}.", storage::client_master_prefix(client_name, format), format);
    let names = blobs.list(&stem).await.map_err(AppError::upstream)?;
    Ok(names.into_iter().next())
}

/// マスター画像アップロード結果
#[derive(Debug, Clone)]
pub struct MasterUpload {
    pub client: Client,
    pub path: String,
    pub public_url: String,
}

/// マスター画像を置き換えて公開し、フラグを立てる
pub async fn upload_master_asset(
    db: &DbPool,
    blobs: &dyn BlobStore,
    id: &str,
    format: Format,
    bytes: &[u8],
) -> AppResult<MasterUpload> {
    let client = get_client(db, id).await?;

    let (content_type, ext) = storage::sniff_image(bytes)
        .ok_or_else(|| AppError::Validation("Uploaded file is not a supported image".to_string()))?;

    // 拡張子違いの旧ファイルが残らないよう先に掃除
    let prefix = storage::client_master_prefix(&client.name, format);
    blobs.delete_prefix(&prefix).await.map_err(AppError::upstream)?;

    let path = storage::client_master_path(&client.name, format, ext);
    blobs
        .save(&path, bytes, content_type)
        .await
        .map_err(AppError::upstream)?;
    let public_url = blobs.make_public(&path).await.map_err(AppError::upstream)?;

    let client = mark_format_uploaded(db, id, format).await?;

    info!(
        "✅ Master asset uploaded: client={}, format={}, sha256={}",
        client.id,
        format,
        &storage::compute_sha256(bytes)[..16]
    );
    Ok(MasterUpload {
        client,
        path,
        public_url,
    })
}

/// マスター画像を公開して URL を返す（プレビュー用）
pub async fn preview_master_asset(
    db: &DbPool,
    blobs: &dyn BlobStore,
    id: &str,
    format: Format,
) -> AppResult<String> {
    let client = get_client(db, id).await?;
    let path = find_master_asset(blobs, &client.name, format)
        .await?
        .ok_or_else(|| AppError::not_found("Master asset", format!("{}/{}", client.id, format)))?;

    blobs.make_public(&path).await.map_err(AppError::upstream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_db;
    use crate::storage::LocalBlobStore;

    const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    #[test]
    fn id_is_lowercased_and_hyphenated() {
        assert_eq!(client_id_for("Acme Co"), "acme-co");
        assert_eq!(client_id_for("  Big   Game\tStudio "), "big-game-studio");
    }

    #[tokio::test]
    async fn register_then_conflict() {
        let db = init_memory_db().await.unwrap();
        let client = register_client(&db, "Acme Co").await.unwrap();
        assert_eq!(client.id, "acme-co");
        assert!(Format::ALL.into_iter().all(|f| !client.formats.has(f)));

        let err = register_client(&db, "ACME   co").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn rejects_blank_and_path_like_names() {
        let db = init_memory_db().await.unwrap();
        assert!(matches!(
            register_client(&db, "   ").await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            register_client(&db, "a/b").await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn missing_formats_in_catalog_order() {
        let db = init_memory_db().await.unwrap();
        register_client(&db, "Acme").await.unwrap();
        mark_format_uploaded(&db, "acme", Format::Landscape).await.unwrap();
        let client = mark_format_uploaded(&db, "acme", Format::Square).await.unwrap();

        let missing: Vec<_> = missing_formats(&client, OfferType::Gold1)
            .into_iter()
            .map(|m| (m.format, m.position.as_str()))
            .collect();
        assert_eq!(
            missing,
            vec![
                (Format::Tower, "G-1-1-1"),
                (Format::Portrait, "G-1-1-2"),
                (Format::Banner, "G-1-2-1"),
            ]
        );
    }

    #[tokio::test]
    async fn concurrent_flag_updates_keep_both() {
        let db = init_memory_db().await.unwrap();
        register_client(&db, "Acme").await.unwrap();

        let (a, b) = tokio::join!(
            mark_format_uploaded(&db, "acme", Format::Square),
            mark_format_uploaded(&db, "acme", Format::Tower),
        );
        a.unwrap();
        b.unwrap();

        let client = get_client(&db, "acme").await.unwrap();
        assert!(client.formats.has(Format::Square));
        assert!(client.formats.has(Format::Tower));
        assert!(!client.formats.has(Format::Banner));
    }

    #[tokio::test]
    async fn flag_update_on_missing_client_is_not_found() {
        let db = init_memory_db().await.unwrap();
        assert!(matches!(
            mark_format_uploaded(&db, "ghost", Format::Square).await,
            Err(AppError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn upload_replaces_previous_master() {
        let db = init_memory_db().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let blobs = LocalBlobStore::new(dir.path(), "http://cdn");
        register_client(&db, "Acme").await.unwrap();

        blobs
            .save("client/Acme/1:1/1:1.jpg", b"old", "image/jpeg")
            .await
            .unwrap();
        let upload = upload_master_asset(&db, &blobs, "acme", Format::Square, PNG_MAGIC)
            .await
            .unwrap();

        assert_eq!(upload.path, "client/Acme/1:1/1:1.png");
        assert_eq!(upload.public_url, "http://cdn/client/Acme/1:1/1:1.png");
        assert!(upload.client.formats.has(Format::Square));
        assert_eq!(
            blobs.list("client/Acme/").await.unwrap(),
            vec!["client/Acme/1:1/1:1.png".to_string()]
        );
    }

    #[tokio::test]
    async fn upload_rejects_non_image_without_flipping_flag() {
        let db = init_memory_db().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let blobs = LocalBlobStore::new(dir.path(), "http://cdn");
        register_client(&db, "Acme").await.unwrap();

        let err = upload_master_asset(&db, &blobs, "acme", Format::Square, b"hello")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(!get_client(&db, "acme").await.unwrap().formats.has(Format::Square));
    }

    #[tokio::test]
    async fn delete_missing_client_is_not_found() {
        let db = init_memory_db().await.unwrap();
        assert!(matches!(
            delete_client(&db, "ghost").await,
            Err(AppError::NotFound { .. })
        ));
    }
}

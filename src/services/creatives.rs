//! Creative Records
//! `game_images` テーブル: 週×ポジションに掲載されるクリエイティブ

use tracing::info;

use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::{Creative, CreativeData, CreativeFilter, CreativeRow};
use crate::storage;

use super::{now_ms, reservations};

/// 保存（同一 ID は上書き、作成日時は初回のまま）
///
/// 書き込む company で (週, オファー) を確保してから書く。他社が確保済みなら `Conflict`。
pub async fn put(db: &DbPool, id: &str, data: CreativeData) -> AppResult<Creative> {
    let id = id.trim();
    if id.is_empty() {
        return Err(AppError::Validation("customDocId is required".to_string()));
    }

    let creative = Creative::new(id.to_string(), data, now_ms())?;
    reservations::claim(
        db,
        creative.week_number,
        creative.offer_type,
        &creative.company_name,
    )
    .await?;

    upsert(db, creative).await
}

/// 検証済みレコードの upsert（確保は呼び出し側の責任）
pub(crate) async fn upsert(db: &DbPool, creative: Creative) -> AppResult<Creative> {
    let row: CreativeRow = sqlx::query_as(r#"
        INSERT INTO game_images (
            id, image_url, public_url, offer_type, position, week_number,
            company_name, country, format, created_at_ms
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            image_url = excluded.image_url,
            public_url = excluded.public_url,
            offer_type = excluded.offer_type,
            position = excluded.position,
            week_number = excluded.week_number,
            company_name = excluded.company_name,
            country = excluded.country,
            format = excluded.format
        RETURNING *
    "#)
    .bind(&creative.id)
    .bind(&creative.image_url)
    .bind(&creative.public_url)
    .bind(creative.offer_type.label())
    .bind(creative.position.as_str())
    .bind(creative.week_number as i64)
    .bind(&creative.company_name)
    .bind(&creative.country)
    .bind(creative.format.label())
    .bind(creative.created_at)
    .fetch_one(db)
    .await?;

    info!(
        "Creative saved: id={}, offer={}, week={}",
        creative.id, creative.offer_type, creative.week_number
    );
    row.try_into()
}

pub async fn get(db: &DbPool, id: &str) -> AppResult<Creative> {
    let row: Option<CreativeRow> = sqlx::query_as("SELECT * FROM game_images WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?;

    row.ok_or_else(|| AppError::not_found("Creative", id))?.try_into()
}

pub async fn exists(db: &DbPool, id: &str) -> AppResult<bool> {
    let found: Option<(String,)> = sqlx::query_as("SELECT id FROM game_images WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(found.is_some())
}

/// 週の一覧（ポジション順）
pub async fn list_for_week(
    db: &DbPool,
    week_number: u32,
    filter: &CreativeFilter,
) -> AppResult<Vec<Creative>> {
    let rows: Vec<CreativeRow> = sqlx::query_as(
        "SELECT * FROM game_images WHERE week_number = ? ORDER BY position ASC, company_name ASC",
    )
    .bind(week_number as i64)
    .fetch_all(db)
    .await?;

    let mut creatives = Vec::with_capacity(rows.len());
    for row in rows {
        let creative = Creative::try_from(row)?;
        if filter.matches(&creative) {
            creatives.push(creative);
        }
    }
    Ok(creatives)
}

/// publicUrl の後埋め
pub async fn set_public_url(db: &DbPool, id: &str, public_url: &str) -> AppResult<Creative> {
    if public_url.trim().is_empty() {
        return Err(AppError::Validation("publicUrl is required".to_string()));
    }

    let row: Option<CreativeRow> =
        sqlx::query_as("UPDATE game_images SET public_url = ? WHERE id = ? RETURNING *")
            .bind(public_url)
            .bind(id)
            .fetch_optional(db)
            .await?;

    row.ok_or_else(|| AppError::not_found("Creative", id))?.try_into()
}

/// レコード削除（削除前の値を返す）
pub async fn delete(db: &DbPool, id: &str) -> AppResult<Creative> {
    let row: Option<CreativeRow> =
        sqlx::query_as("DELETE FROM game_images WHERE id = ? RETURNING *")
            .bind(id)
            .fetch_optional(db)
            .await?;

    let creative: Creative = row.ok_or_else(|| AppError::not_found("Creative", id))?.try_into()?;
    info!("Creative deleted: id={}", id);
    Ok(creative)
}

/// レコードから公開画像の Blob パスを導出（拡張子は imageUrl から）
pub fn publication_blob_path(creative: &Creative) -> Option<String> {
    let ext = storage::extension_of(&creative.image_url)?;
    Some(storage::publication_path(
        &creative.country,
        creative.week_number,
        creative.position,
        &ext,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Format, OfferType, PositionCode};
    use crate::db::init_memory_db;
    use crate::models::{creative_id, OWNER_ALL};

    fn data(position: &str, week: u32, company: &str) -> CreativeData {
        CreativeData {
            image_url: format!("http://cdn/pub_images/ALL/week{}/x/{}.png", week, position),
            public_url: None,
            offer_type: None,
            position: PositionCode::parse(position).unwrap(),
            week_number: week,
            company_name: company.to_string(),
            country: OWNER_ALL.to_string(),
            format: None,
        }
    }

    #[tokio::test]
    async fn put_overwrites_same_key() {
        let db = init_memory_db().await.unwrap();
        let position = PositionCode::parse("G-1-1-1").unwrap();
        let id = creative_id(10, position, OWNER_ALL);

        let first = put(&db, &id, data("G-1-1-1", 10, "Acme")).await.unwrap();
        let mut again = data("G-1-1-1", 10, "Acme");
        again.image_url = "http://cdn/pub_images/ALL/week10/1/G-1-1-1.jpg".to_string();
        let second = put(&db, &id, again).await.unwrap();

        assert!(second.image_url.ends_with(".jpg"));
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.format, Format::Tower);
        assert_eq!(list_for_week(&db, 10, &CreativeFilter::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn put_refuses_offer_reserved_by_another_company() {
        let db = init_memory_db().await.unwrap();
        put(&db, "week-10-G-1-1-1-ALL", data("G-1-1-1", 10, "Acme")).await.unwrap();

        let err = put(&db, "week-10-G-1-1-2-Globex", data("G-1-1-2", 10, "Globex"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(!exists(&db, "week-10-G-1-1-2-Globex").await.unwrap());

        // 別オファーは書ける
        put(&db, "week-10-G-2-1-1-Globex", data("G-2-1-1", 10, "Globex")).await.unwrap();
    }

    #[tokio::test]
    async fn get_exists_delete() {
        let db = init_memory_db().await.unwrap();
        put(&db, "week-3-S-1-1-1-ALL", data("S-1-1-1", 3, "Acme")).await.unwrap();

        assert!(exists(&db, "week-3-S-1-1-1-ALL").await.unwrap());
        let deleted = delete(&db, "week-3-S-1-1-1-ALL").await.unwrap();
        assert_eq!(deleted.offer_type, OfferType::Silver1);

        assert!(!exists(&db, "week-3-S-1-1-1-ALL").await.unwrap());
        assert!(matches!(
            get(&db, "week-3-S-1-1-1-ALL").await,
            Err(AppError::NotFound { .. })
        ));
        assert!(matches!(
            delete(&db, "week-3-S-1-1-1-ALL").await,
            Err(AppError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn backfills_public_url() {
        let db = init_memory_db().await.unwrap();
        put(&db, "k", data("P-1-1-1", 5, "Acme")).await.unwrap();
        let updated = set_public_url(&db, "k", "http://cdn/p.png").await.unwrap();
        assert_eq!(updated.public_url.as_deref(), Some("http://cdn/p.png"));
        assert!(matches!(
            set_public_url(&db, "missing", "http://cdn/p.png").await,
            Err(AppError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn list_filters_by_week_and_query() {
        let db = init_memory_db().await.unwrap();
        put(&db, "a", data("P-1-1-1", 5, "Acme")).await.unwrap();
        put(&db, "b", data("G-2-1-1", 5, "Globex")).await.unwrap();
        put(&db, "c", data("G-2-1-2", 6, "Globex")).await.unwrap();

        let filter = CreativeFilter { q: Some("GLOB".into()), country: None };
        let found = list_for_week(&db, 5, &filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "b");
    }

    #[test]
    fn derives_blob_path_from_record() {
        let creative = Creative::new("x".into(), data("P-1-2-3", 10, "Acme"), 0).unwrap();
        assert_eq!(
            publication_blob_path(&creative).as_deref(),
            Some("pub_images/ALL/week10/2/P-1-2-3.png")
        );
    }
}

//! Activity Log
//! 操作ログの記録と検索

use tracing::warn;
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::AppResult;
use crate::models::{ActivityEntry, ActivityQuery};

use super::now_ms;

const MAX_ENTRIES: i64 = 500;

/// ログを記録（失敗してもリクエストは失敗させない）
pub async fn record(db: &DbPool, actor: &str, action: &str, target: &str) {
    let result = sqlx::query(
        "INSERT INTO activity_log (id, actor, action, target, created_at_ms) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(actor)
    .bind(action)
    .bind(target)
    .bind(now_ms())
    .execute(db)
    .await;

    if let Err(e) = result {
        warn!("Failed to record activity '{}' on {} (ignored): {}", action, target, e);
    }
}

/// 新しい順。`q` は actor / action / target の部分一致、`action` は完全一致
pub async fn list(db: &DbPool, query: &ActivityQuery) -> AppResult<Vec<ActivityEntry>> {
    let pattern = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(|q| format!("%{}%", q.to_lowercase()));
    let action = query.action.as_deref().filter(|a| !a.is_empty());

    let entries: Vec<ActivityEntry> = sqlx::query_as(r#"
        SELECT * FROM activity_log
        WHERE (?1 IS NULL OR LOWER(actor) LIKE ?1 OR LOWER(action) LIKE ?1 OR LOWER(target) LIKE ?1)
          AND (?2 IS NULL OR action = ?2)
        ORDER BY created_at_ms DESC, rowid DESC
        LIMIT ?3
    "#)
    .bind(pattern)
    .bind(action)
    .bind(MAX_ENTRIES)
    .fetch_all(db)
    .await?;

    Ok(entries)
}

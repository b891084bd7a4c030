//! Slot Assignment Workflow
//! クライアントのオファーを週の全ポジションへ割り当てる
//!
//! 検証 → 予約確保 → ポジション順にコピー。ポジション単位の結果は
//! `assignment_positions` に残し、失敗分だけ `retry` で再実行できる。
//! 成功済みポジションのロールバックはしない。

use std::collections::HashMap;
use tracing::{info, warn};

use crate::catalog::{Format, OfferType, PositionCode};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::{
    creative_id, position_status, AssignmentPosition, AssignmentReport, AssignmentRequest,
    Client, CreativeData, PositionFailure, OWNER_ALL,
};
use crate::storage::{self, BlobStore};

use super::{clients, creatives, now_ms, reservations};

/// 割当実行（全ポジション）
pub async fn assign(
    db: &DbPool,
    blobs: &dyn BlobStore,
    req: &AssignmentRequest,
) -> AppResult<AssignmentReport> {
    let client = prepare(db, req).await?;
    let positions = req.offer_type.positions().to_vec();
    run(db, blobs, req, &client, positions, 0).await
}

/// 未コピーのポジションだけ再実行
pub async fn retry(
    db: &DbPool,
    blobs: &dyn BlobStore,
    req: &AssignmentRequest,
) -> AppResult<AssignmentReport> {
    let client = prepare(db, req).await?;

    let done: HashMap<String, AssignmentPosition> = ledger(db, req.week_number, Some(req.offer_type))
        .await?
        .into_iter()
        .map(|row| (row.position.clone(), row))
        .collect();

    let all = req.offer_type.positions();
    let pending: Vec<PositionCode> = all
        .iter()
        .copied()
        .filter(|position| {
            !done.get(position.as_str()).map_or(false, |row| {
                row.status == position_status::COPIED && row.client_id == client.id
            })
        })
        .collect();
    let skipped = all.len() - pending.len();

    info!(
        "🔁 Retrying assignment: client={}, offer={}, week={}, pending={}",
        client.id,
        req.offer_type,
        req.week_number,
        pending.len()
    );
    run(db, blobs, req, &client, pending, skipped).await
}

/// 割当台帳（ポジション順）
pub async fn ledger(
    db: &DbPool,
    week_number: u32,
    offer: Option<OfferType>,
) -> AppResult<Vec<AssignmentPosition>> {
    let rows: Vec<AssignmentPosition> = match offer {
        Some(offer) => {
            sqlx::query_as(
                "SELECT * FROM assignment_positions WHERE week_number = ? AND offer_type = ? ORDER BY position ASC",
            )
            .bind(week_number as i64)
            .bind(offer.label())
            .fetch_all(db)
            .await?
        }
        None => {
            sqlx::query_as(
                "SELECT * FROM assignment_positions WHERE week_number = ? ORDER BY position ASC",
            )
            .bind(week_number as i64)
            .fetch_all(db)
            .await?
        }
    };
    Ok(rows)
}

/// クライアントのマスター画像を公開パスへコピーして公開 URL を返す
pub async fn copy_master_to_position(
    blobs: &dyn BlobStore,
    client_name: &str,
    format: Format,
    week_number: u32,
    position: PositionCode,
) -> AppResult<(String, String)> {
    if format != position.format() {
        return Err(AppError::Validation(format!(
            "Position {} requires format {}, got {}",
            position,
            position.format(),
            format
        )));
    }

    let src = clients::find_master_asset(blobs, client_name, format)
        .await?
        .ok_or_else(|| {
            AppError::Upstream(format!("No {} master asset for client {}", format, client_name))
        })?;
    let ext = storage::extension_of(&src).unwrap_or_else(|| "png".to_string());
    let dst = storage::publication_path(OWNER_ALL, week_number, position, &ext);

    blobs.copy(&src, &dst).await.map_err(AppError::upstream)?;
    let url = blobs.make_public(&dst).await.map_err(AppError::upstream)?;
    Ok((dst, url))
}

// ========================================
// 内部処理
// ========================================

/// 検証（クライアント存在・フォーマット充足）と予約確保
async fn prepare(db: &DbPool, req: &AssignmentRequest) -> AppResult<Client> {
    if req.week_number == 0 {
        return Err(AppError::Validation("weekNumber is required".to_string()));
    }

    let client = clients::get_client(db, &req.client_id).await?;

    let missing = clients::missing_formats(&client, req.offer_type);
    if !missing.is_empty() {
        warn!(
            "Assignment blocked: client={}, offer={}, missing={}",
            client.id,
            req.offer_type,
            missing.len()
        );
        return Err(AppError::MissingFormats {
            client: client.name,
            missing,
        });
    }

    reservations::claim(db, req.week_number, req.offer_type, &client.name).await?;
    Ok(client)
}

async fn run(
    db: &DbPool,
    blobs: &dyn BlobStore,
    req: &AssignmentRequest,
    client: &Client,
    positions: Vec<PositionCode>,
    skipped: usize,
) -> AppResult<AssignmentReport> {
    let mut report = AssignmentReport {
        client_id: client.id.clone(),
        offer_type: req.offer_type,
        week_number: req.week_number,
        requested: positions.len(),
        copied: 0,
        skipped,
        failed: Vec::new(),
    };

    // 逐次処理。1 ポジションの失敗（台帳書き込み含む）で止めない
    for position in positions {
        match place(db, blobs, client, req.week_number, position).await {
            Ok(url) => {
                match record(db, req, client, position, position_status::COPIED, None, Some(url.as_str())).await {
                    Ok(()) => report.copied += 1,
                    Err(e) => {
                        warn!("❌ Ledger write failed: position={}, week={}: {}", position, req.week_number, e);
                        report.failed.push(PositionFailure {
                            position,
                            error: format!("copied but ledger write failed: {}", e),
                        });
                    }
                }
            }
            Err(e) => {
                warn!("❌ Position {} failed (week {}): {}", position, req.week_number, e);
                let message = e.to_string();
                if let Err(le) =
                    record(db, req, client, position, position_status::FAILED, Some(message.as_str()), None).await
                {
                    warn!("Ledger write failed: position={}, week={}: {}", position, req.week_number, le);
                }
                report.failed.push(PositionFailure {
                    position,
                    error: message,
                });
            }
        }
    }

    // 1 件も書けなかった場合は確保を残さない
    if report.copied == 0 {
        if let Err(e) = reservations::release_if_empty(db, req.week_number, req.offer_type).await {
            warn!("Reservation release failed: week={}, offer={}: {}", req.week_number, req.offer_type, e);
        }
    }

    info!(
        "✅ Assignment finished: client={}, offer={}, week={}, copied={}/{}",
        client.id, req.offer_type, req.week_number, report.copied, report.requested
    );
    Ok(report)
}

/// 1 ポジション分: コピー → 公開 → レコード upsert
async fn place(
    db: &DbPool,
    blobs: &dyn BlobStore,
    client: &Client,
    week_number: u32,
    position: PositionCode,
) -> AppResult<String> {
    let format = position.format();
    let (_, url) = copy_master_to_position(blobs, &client.name, format, week_number, position).await?;

    let data = CreativeData {
        image_url: url.clone(),
        public_url: Some(url.clone()),
        offer_type: Some(position.offer()),
        position,
        week_number,
        company_name: client.name.clone(),
        country: OWNER_ALL.to_string(),
        format: Some(format),
    };
    creatives::put(db, &creative_id(week_number, position, OWNER_ALL), data).await?;
    Ok(url)
}

async fn record(
    db: &DbPool,
    req: &AssignmentRequest,
    client: &Client,
    position: PositionCode,
    status: &str,
    error: Option<&str>,
    public_url: Option<&str>,
) -> AppResult<()> {
    sqlx::query(r#"
        INSERT INTO assignment_positions (
            week_number, position, offer_type, client_id, company_name,
            status, error, public_url, updated_at_ms
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(week_number, position) DO UPDATE SET
            offer_type = excluded.offer_type,
            client_id = excluded.client_id,
            company_name = excluded.company_name,
            status = excluded.status,
            error = excluded.error,
            public_url = excluded.public_url,
            updated_at_ms = excluded.updated_at_ms
    "#)
    .bind(req.week_number as i64)
    .bind(position.as_str())
    .bind(req.offer_type.label())
    .bind(&client.id)
    .bind(&client.name)
    .bind(status)
    .bind(error)
    .bind(public_url)
    .bind(now_ms())
    .execute(db)
    .await?;
    Ok(())
}

//! Reservation Query
//! 週ごとのオファー予約状況（件数・クライアント）と予約の確保

use std::collections::BTreeMap;
use tracing::info;

use crate::catalog::OfferType;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::{OfferCount, ReservedOffer};

use super::now_ms;

/// オファー別件数（全オファーをゼロ埋め）
pub async fn offer_counts(db: &DbPool, week_number: u32) -> AppResult<BTreeMap<OfferType, OfferCount>> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT offer_type, company_name FROM game_images WHERE week_number = ? ORDER BY created_at_ms ASC, id ASC",
    )
    .bind(week_number as i64)
    .fetch_all(db)
    .await?;

    let mut counts: BTreeMap<OfferType, OfferCount> = OfferType::ALL
        .into_iter()
        .map(|offer| (offer, OfferCount::default()))
        .collect();

    for (offer_type, company_name) in rows {
        let offer: OfferType = offer_type.parse()?;
        let entry = counts.entry(offer).or_default();
        entry.count += 1;
        entry.clients.push(company_name);
    }

    Ok(counts)
}

pub async fn is_reserved(db: &DbPool, offer: OfferType, week_number: u32) -> AppResult<bool> {
    let counts = offer_counts(db, week_number).await?;
    Ok(counts.get(&offer).map_or(false, |c| c.count > 0))
}

/// 表示用の予約者（先頭クライアント）
pub async fn reserved_by(db: &DbPool, offer: OfferType, week_number: u32) -> AppResult<Option<String>> {
    let mut counts = offer_counts(db, week_number).await?;
    Ok(counts
        .remove(&offer)
        .and_then(|c| c.clients.into_iter().next()))
}

/// 予約済み (offerType, company_name) の一覧
pub async fn reserved_offers(db: &DbPool, week_number: u32) -> AppResult<Vec<ReservedOffer>> {
    let counts = offer_counts(db, week_number).await?;

    let mut reserved = Vec::new();
    for (offer, count) in counts {
        let mut seen: Vec<&str> = Vec::new();
        for company in &count.clients {
            if seen.contains(&company.as_str()) {
                continue;
            }
            seen.push(company);
            reserved.push(ReservedOffer {
                offer_type: offer,
                company_name: company.clone(),
            });
        }
    }
    Ok(reserved)
}

/// (週, オファー) を company で確保
///
/// 確保行が無いか、同一 company が保持している場合のみ成功。
/// 他社への引き継ぎは `release_if_empty` で行が消えた後だけ。
pub async fn claim(db: &DbPool, week_number: u32, offer: OfferType, company_name: &str) -> AppResult<()> {
    // 確保行が無いまま他社レコードがある週（手動登録など）はここで弾く
    let foreign: Option<(String,)> = sqlx::query_as(
        "SELECT company_name FROM game_images WHERE week_number = ? AND offer_type = ? AND company_name != ? LIMIT 1",
    )
    .bind(week_number as i64)
    .bind(offer.label())
    .bind(company_name)
    .fetch_optional(db)
    .await?;
    if let Some((owner,)) = foreign {
        return Err(conflict(offer, week_number, &owner));
    }

    let result = sqlx::query(r#"
        INSERT INTO reservations (week_number, offer_type, company_name, created_at_ms)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(week_number, offer_type) DO UPDATE SET
            company_name = excluded.company_name,
            created_at_ms = excluded.created_at_ms
        WHERE reservations.company_name = excluded.company_name
    "#)
    .bind(week_number as i64)
    .bind(offer.label())
    .bind(company_name)
    .bind(now_ms())
    .execute(db)
    .await?;

    if result.rows_affected() == 0 {
        let owner: Option<(String,)> = sqlx::query_as(
            "SELECT company_name FROM reservations WHERE week_number = ? AND offer_type = ?",
        )
        .bind(week_number as i64)
        .bind(offer.label())
        .fetch_optional(db)
        .await?;
        let owner = owner.map(|(o,)| o).unwrap_or_default();
        return Err(conflict(offer, week_number, &owner));
    }

    info!("🔒 Reservation claimed: week={}, offer={}, company={}", week_number, offer, company_name);
    Ok(())
}

fn conflict(offer: OfferType, week_number: u32, owner: &str) -> AppError {
    AppError::Conflict(format!(
        "{} is already reserved for week {} by {}",
        offer, week_number, owner
    ))
}

/// (週, オファー) のレコードが 0 件なら確保を解放
pub async fn release_if_empty(db: &DbPool, week_number: u32, offer: OfferType) -> AppResult<bool> {
    let result = sqlx::query(r#"
        DELETE FROM reservations
        WHERE week_number = ? AND offer_type = ?
          AND NOT EXISTS (
                SELECT 1 FROM game_images WHERE week_number = ? AND offer_type = ?
          )
    "#)
    .bind(week_number as i64)
    .bind(offer.label())
    .bind(week_number as i64)
    .bind(offer.label())
    .execute(db)
    .await?;

    let released = result.rows_affected() > 0;
    if released {
        info!("🔓 Reservation released: week={}, offer={}", week_number, offer);
    }
    Ok(released)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PositionCode;
    use crate::db::init_memory_db;
    use crate::models::{Creative, CreativeData, OWNER_ALL};
    use crate::services::creatives;

    /// 確保を取らずにレコードだけ書く
    async fn seed(db: &DbPool, id: &str, position: &str, week: u32, company: &str) {
        let data = CreativeData {
            image_url: "http://cdn/x.png".to_string(),
            public_url: None,
            offer_type: None,
            position: PositionCode::parse(position).unwrap(),
            week_number: week,
            company_name: company.to_string(),
            country: OWNER_ALL.to_string(),
            format: None,
        };
        let creative = Creative::new(id.to_string(), data, 0).unwrap();
        creatives::upsert(db, creative).await.unwrap();
    }

    #[tokio::test]
    async fn counts_are_zero_filled() {
        let db = init_memory_db().await.unwrap();
        seed(&db, "a", "G-1-1-1", 12, "Acme").await;
        seed(&db, "b", "G-1-1-2", 12, "Acme").await;
        seed(&db, "c", "G-1-1-3", 13, "Globex").await;

        let counts = offer_counts(&db, 12).await.unwrap();
        assert_eq!(counts.len(), OfferType::ALL.len());
        assert_eq!(counts[&OfferType::Gold1].count, 2);
        assert_eq!(counts[&OfferType::Gold1].clients, vec!["Acme", "Acme"]);
        assert_eq!(counts[&OfferType::Silver2], OfferCount::default());

        assert!(is_reserved(&db, OfferType::Gold1, 12).await.unwrap());
        assert!(!is_reserved(&db, OfferType::Gold2, 12).await.unwrap());
        assert_eq!(reserved_by(&db, OfferType::Gold1, 12).await.unwrap().as_deref(), Some("Acme"));
        assert_eq!(reserved_by(&db, OfferType::Gold2, 12).await.unwrap(), None);

        let reserved = reserved_offers(&db, 12).await.unwrap();
        assert_eq!(
            reserved,
            vec![ReservedOffer { offer_type: OfferType::Gold1, company_name: "Acme".into() }]
        );
    }

    #[tokio::test]
    async fn empty_week_has_no_reservations() {
        let db = init_memory_db().await.unwrap();
        let counts = offer_counts(&db, 1).await.unwrap();
        assert!(counts.values().all(|c| c.count == 0 && c.clients.is_empty()));
        assert!(reserved_offers(&db, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn claim_is_exclusive_per_week_and_offer() {
        let db = init_memory_db().await.unwrap();
        claim(&db, 10, OfferType::Gold1, "Acme").await.unwrap();
        seed(&db, "a", "G-1-1-1", 10, "Acme").await;

        // 同一 company の再実行は成功
        claim(&db, 10, OfferType::Gold1, "Acme").await.unwrap();
        assert!(matches!(
            claim(&db, 10, OfferType::Gold1, "Globex").await,
            Err(AppError::Conflict(_))
        ));
        // 別週・別オファーは独立
        claim(&db, 11, OfferType::Gold1, "Globex").await.unwrap();
        claim(&db, 10, OfferType::Gold2, "Globex").await.unwrap();
    }

    #[tokio::test]
    async fn claim_without_records_still_blocks_others() {
        let db = init_memory_db().await.unwrap();
        // 1 件目を書く前の確保も他社から守られる
        claim(&db, 10, OfferType::Silver1, "Acme").await.unwrap();
        assert!(matches!(
            claim(&db, 10, OfferType::Silver1, "Globex").await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn claim_is_taken_over_after_release() {
        let db = init_memory_db().await.unwrap();
        claim(&db, 10, OfferType::Silver1, "Acme").await.unwrap();
        assert!(release_if_empty(&db, 10, OfferType::Silver1).await.unwrap());
        claim(&db, 10, OfferType::Silver1, "Globex").await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_claims_have_one_winner() {
        let db = init_memory_db().await.unwrap();
        let (a, b) = tokio::join!(
            claim(&db, 10, OfferType::Gold1, "Acme"),
            claim(&db, 10, OfferType::Gold1, "Globex"),
        );
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    }

    #[tokio::test]
    async fn claim_respects_unclaimed_foreign_records() {
        let db = init_memory_db().await.unwrap();
        seed(&db, "a", "S-1-1-1", 10, "Acme").await;
        assert!(matches!(
            claim(&db, 10, OfferType::Silver1, "Globex").await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn release_only_when_empty() {
        let db = init_memory_db().await.unwrap();
        claim(&db, 10, OfferType::Gold1, "Acme").await.unwrap();
        seed(&db, "a", "G-1-1-1", 10, "Acme").await;

        assert!(!release_if_empty(&db, 10, OfferType::Gold1).await.unwrap());
        creatives::delete(&db, "a").await.unwrap();
        assert!(release_if_empty(&db, 10, OfferType::Gold1).await.unwrap());
    }
}

//! Data Models
//! Client, Creative (game-image), Reservation, Assignment などのデータ構造定義

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::catalog::{Format, OfferType, PositionCode};
use crate::error::AppError;

/// 全社共通（カタログ由来）のオーナートークン / 国
pub const OWNER_ALL: &str = "ALL";

// ========================================
// Client
// ========================================

/// Client (DB row)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClientRow {
    pub id: String,
    pub name: String,
    pub formats: String, // JSON: {"1:1": false, ...}
    pub created_at_ms: i64,
}

/// フォーマットごとのマスター画像有無
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormatFlags(BTreeMap<Format, bool>);

impl FormatFlags {
    /// 全フォーマット false で初期化
    pub fn none_uploaded() -> Self {
        Self(Format::ALL.into_iter().map(|f| (f, false)).collect())
    }

    pub fn has(&self, format: Format) -> bool {
        self.0.get(&format).copied().unwrap_or(false)
    }

    pub fn set(&mut self, format: Format) {
        self.0.insert(format, true);
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Default for FormatFlags {
    fn default() -> Self {
        Self::none_uploaded()
    }
}

impl FromIterator<Format> for FormatFlags {
    fn from_iter<I: IntoIterator<Item = Format>>(iter: I) -> Self {
        let mut flags = Self::none_uploaded();
        for format in iter {
            flags.set(format);
        }
        flags
    }
}

/// Client（API返却用）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: String,
    pub name: String,
    pub formats: FormatFlags,
    pub created_at: i64,
}

impl TryFrom<ClientRow> for Client {
    type Error = AppError;

    fn try_from(row: ClientRow) -> Result<Self, Self::Error> {
        let stored: BTreeMap<Format, bool> = serde_json::from_str(&row.formats).map_err(|e| {
            AppError::Upstream(format!("corrupt formats for client {}: {}", row.id, e))
        })?;
        // 欠けているキーは false 扱い
        let mut formats = FormatFlags::none_uploaded();
        for (format, present) in stored {
            if present {
                formats.set(format);
            }
        }
        Ok(Client {
            id: row.id,
            name: row.name,
            formats,
            created_at: row.created_at_ms,
        })
    }
}

/// Client 作成リクエスト
#[derive(Debug, Deserialize)]
pub struct CreateClientRequest {
    pub name: String,
}

/// 不足フォーマット（フォーマット, ポジション）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingFormat {
    pub format: Format,
    pub position: PositionCode,
}

// ========================================
// Creative (game-image)
// ========================================

/// Creative (DB row)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CreativeRow {
    pub id: String,
    pub image_url: String,
    pub public_url: Option<String>,
    pub offer_type: String,
    pub position: String,
    pub week_number: i64,
    pub company_name: String,
    pub country: String,
    pub format: String,
    pub created_at_ms: i64,
}

/// Creative（週×ポジションに掲載される画像）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Creative {
    pub id: String,
    pub image_url: String,
    pub public_url: Option<String>,
    pub offer_type: OfferType,
    pub position: PositionCode,
    pub week_number: u32,
    #[serde(rename = "company_name")]
    pub company_name: String,
    pub country: String,
    pub format: Format,
    pub created_at: i64,
}

impl TryFrom<CreativeRow> for Creative {
    type Error = AppError;

    fn try_from(row: CreativeRow) -> Result<Self, Self::Error> {
        Ok(Creative {
            offer_type: row.offer_type.parse()?,
            position: row.position.parse()?,
            format: row.format.parse()?,
            week_number: u32::try_from(row.week_number).map_err(|_| {
                AppError::Upstream(format!("invalid week number on {}", row.id))
            })?,
            id: row.id,
            image_url: row.image_url,
            public_url: row.public_url,
            company_name: row.company_name,
            country: row.country,
            created_at: row.created_at_ms,
        })
    }
}

impl Creative {
    /// 検証済みの Creative を作る（format / offerType はカタログと一致必須）
    pub fn new(
        id: String,
        data: CreativeData,
        created_at: i64,
    ) -> Result<Self, AppError> {
        let position = data.position;
        let expected_format = position.format();
        let expected_offer = position.offer();

        if let Some(format) = data.format {
            if format != expected_format {
                return Err(AppError::Validation(format!(
                    "Format {} does not match position {} (expected {})",
                    format, position, expected_format
                )));
            }
        }
        if let Some(offer) = data.offer_type {
            if offer != expected_offer {
                return Err(AppError::Validation(format!(
                    "Position {} belongs to {}, not {}",
                    position, expected_offer, offer
                )));
            }
        }
        if data.company_name.trim().is_empty() {
            return Err(AppError::Validation("company_name is required".to_string()));
        }
        if data.image_url.trim().is_empty() {
            return Err(AppError::Validation("imageUrl is required".to_string()));
        }
        if data.week_number == 0 {
            return Err(AppError::Validation("weekNumber is required".to_string()));
        }

        Ok(Creative {
            id,
            image_url: data.image_url,
            public_url: data.public_url,
            offer_type: expected_offer,
            position,
            week_number: data.week_number,
            company_name: data.company_name,
            country: data.country,
            format: expected_format,
            created_at,
        })
    }
}

/// Creative ドキュメント ID: `week-<N>-<position>-<owner>`
pub fn creative_id(week_number: u32, position: PositionCode, owner: &str) -> String {
    format!("week-{}-{}-{}", week_number, position, owner)
}

fn default_country() -> String {
    OWNER_ALL.to_string()
}

/// Creative 保存データ（POST /api/game-images の imageData）
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreativeData {
    pub image_url: String,
    pub public_url: Option<String>,
    pub offer_type: Option<OfferType>,
    pub position: PositionCode,
    pub week_number: u32,
    #[serde(rename = "company_name")]
    pub company_name: String,
    #[serde(default = "default_country")]
    pub country: String,
    pub format: Option<Format>,
}

/// Creative 保存リクエスト
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveCreativeRequest {
    pub custom_doc_id: String,
    pub image_data: CreativeData,
}

/// Creative 更新リクエスト（publicUrl の後埋めのみ）
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCreativeRequest {
    pub public_url: String,
}

/// 週次一覧の絞り込み
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreativeFilter {
    /// company / offer / position / country の部分一致（大文字小文字無視）
    pub q: Option<String>,
    /// 国の完全一致
    pub country: Option<String>,
}

impl CreativeFilter {
    pub fn matches(&self, creative: &Creative) -> bool {
        let matches_query = match self.q.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => {
                let q = q.to_lowercase();
                creative.company_name.to_lowercase().contains(&q)
                    || creative.offer_type.label().to_lowercase().contains(&q)
                    || creative.position.as_str().to_lowercase().contains(&q)
                    || creative.country.to_lowercase().contains(&q)
            }
            _ => true,
        };
        let matches_country = match self.country.as_deref() {
            Some(c) if !c.is_empty() => creative.country == c,
            _ => true,
        };
        matches_query && matches_country
    }
}

// ========================================
// Reservation
// ========================================

/// オファー別の件数とクライアント一覧
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OfferCount {
    pub count: u32,
    pub clients: Vec<String>,
}

/// 予約済みオファー
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservedOffer {
    pub offer_type: OfferType,
    #[serde(rename = "company_name")]
    pub company_name: String,
}

// ========================================
// Assignment
// ========================================

/// ポジション単位の割当ステータス
pub mod position_status {
    pub const COPIED: &str = "copied";
    pub const FAILED: &str = "failed";
}

/// 割当リクエスト
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRequest {
    pub client_id: String,
    pub offer_type: OfferType,
    pub week_number: u32,
}

/// ポジション単位の失敗
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionFailure {
    pub position: PositionCode,
    pub error: String,
}

/// 割当結果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentReport {
    pub client_id: String,
    pub offer_type: OfferType,
    pub week_number: u32,
    pub requested: usize,
    pub copied: usize,
    pub skipped: usize,
    pub failed: Vec<PositionFailure>,
}

impl AssignmentReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// 割当台帳 (DB row)
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentPosition {
    pub week_number: i64,
    pub position: String,
    pub offer_type: String,
    pub client_id: String,
    #[serde(rename = "company_name")]
    pub company_name: String,
    pub status: String,
    pub error: Option<String>,
    pub public_url: Option<String>,
    pub updated_at_ms: i64,
}

/// 単発コピーリクエスト（POST /api/copy-image）
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyImageRequest {
    pub client_name: String,
    pub format: Format,
    pub week_number: u32,
    pub position: PositionCode,
}

/// 公開リクエスト（POST /api/make-public）
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MakePublicRequest {
    pub image_path: String,
}

// ========================================
// Activity Log
// ========================================

pub mod action {
    pub const CLIENT_CREATED: &str = "Client Created";
    pub const CLIENT_DELETED: &str = "Client Deleted";
    pub const IMAGE_UPLOADED: &str = "Image Uploaded";
    pub const IMAGE_DELETED: &str = "Image Deleted";
    pub const OFFER_SCHEDULED: &str = "Offer Scheduled";
}

/// 操作ログ (DB row)
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: String,
    pub actor: String,
    pub action: String,
    pub target: String,
    pub created_at_ms: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    pub q: Option<String>,
    pub action: Option<String>,
}

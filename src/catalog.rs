//! Offer Catalog
//! オファー種別 → ポジション → 画像フォーマット の固定テーブル

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

// ========================================
// Format
// ========================================

/// 画像のアスペクト比ラベル
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Format {
    Square,
    Landscape,
    Portrait,
    Tower,
    Banner,
}

impl Format {
    pub const ALL: [Format; 5] = [
        Format::Square,
        Format::Landscape,
        Format::Portrait,
        Format::Tower,
        Format::Banner,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Format::Square => "1:1",
            Format::Landscape => "16:9",
            Format::Portrait => "9:16",
            Format::Tower => "3:9",
            Format::Banner => "9:3",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Format {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Format::ALL
            .into_iter()
            .find(|f| f.label() == s.trim())
            .ok_or_else(|| AppError::Validation(format!("Unsupported format: {}", s)))
    }
}

impl Serialize for Format {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Format {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ========================================
// OfferType
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OfferType {
    Premium1,
    Gold1,
    Gold2,
    Silver1,
    Silver2,
    Silver3,
}

impl OfferType {
    pub const ALL: [OfferType; 6] = [
        OfferType::Premium1,
        OfferType::Gold1,
        OfferType::Gold2,
        OfferType::Silver1,
        OfferType::Silver2,
        OfferType::Silver3,
    ];

    pub fn label(self) -> &'static str {
        match self {
            OfferType::Premium1 => "Premium 1",
            OfferType::Gold1 => "Gold 1",
            OfferType::Gold2 => "Gold 2",
            OfferType::Silver1 => "Silver 1",
            OfferType::Silver2 => "Silver 2",
            OfferType::Silver3 => "Silver 3",
        }
    }

    /// このオファーが持つポジション（順序に意味あり: コピー順・先頭がデフォルト）
    pub fn positions(self) -> &'static [PositionCode] {
        positions_for_offer(self)
    }

    pub fn default_position(self) -> PositionCode {
        self.positions()[0]
    }
}

impl fmt::Display for OfferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for OfferType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OfferType::ALL
            .into_iter()
            .find(|o| o.label() == s.trim())
            .ok_or_else(|| AppError::Validation(format!("Unsupported offer type: {}", s)))
    }
}

impl Serialize for OfferType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for OfferType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ========================================
// PositionCode
// ========================================

/// `<Tier>-<Group>-<Subgroup>-<Index>` 形式のポジションコード
///
/// カタログ内の値からしか作れないので、未登録コードは実行時に存在しない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PositionCode(&'static str);

impl PositionCode {
    pub fn parse(s: &str) -> Result<Self, AppError> {
        let s = s.trim();
        CATALOG
            .iter()
            .flat_map(|(_, codes)| codes.iter())
            .find(|code| code.0 == s)
            .copied()
            .ok_or_else(|| AppError::Validation(format!("Unknown position code: {}", s)))
    }

    pub fn as_str(self) -> &'static str {
        self.0
    }

    /// 公開パスに使う 3 番目のトークン（P-1-2-3 → "2"）
    pub fn group(self) -> &'static str {
        self.0.split('-').nth(2).unwrap_or_default()
    }

    pub fn format(self) -> Format {
        format_for_position(self)
    }

    pub fn offer(self) -> OfferType {
        offer_for_position(self)
    }
}

impl fmt::Display for PositionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl FromStr for PositionCode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PositionCode::parse(s)
    }
}

impl Serialize for PositionCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

impl<'de> Deserialize<'de> for PositionCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PositionCode::parse(&s).map_err(serde::de::Error::custom)
    }
}

// ========================================
// 固定テーブル
// ========================================

use Format::{Banner, Landscape, Portrait, Square, Tower};

const fn p(code: &'static str) -> PositionCode {
    PositionCode(code)
}

macro_rules! codes {
    ($($c:literal),* $(,)?) => { &[$(p($c)),*] };
}

const PREMIUM_1: &[PositionCode] = codes!(
    "P-1-1-1", "P-1-1-2", "P-1-1-3", "P-1-1-4", "P-1-1-5", "P-1-1-6",
    "P-1-2-1", "P-1-2-2", "P-1-2-3", "P-1-2-4", "P-1-2-5", "P-1-2-6",
);
const GOLD_1: &[PositionCode] =
    codes!("G-1-1-1", "G-1-1-2", "G-1-1-3", "G-1-2-1", "G-1-2-2", "G-1-2-3");
const GOLD_2: &[PositionCode] =
    codes!("G-2-1-1", "G-2-1-2", "G-2-1-3", "G-2-2-1", "G-2-2-2", "G-2-2-3");
const SILVER_1: &[PositionCode] =
    codes!("S-1-1-1", "S-1-1-2", "S-1-1-3", "S-1-1-4", "S-1-2-1", "S-1-2-2", "S-1-2-3");
const SILVER_2: &[PositionCode] =
    codes!("S-2-1-1", "S-2-1-2", "S-2-1-3", "S-2-1-4", "S-2-2-1", "S-2-2-2", "S-2-2-3");
const SILVER_3: &[PositionCode] =
    codes!("S-3-1-1", "S-3-1-2", "S-3-1-3", "S-3-1-4", "S-3-2-1", "S-3-2-2", "S-3-2-3");

const CATALOG: [(OfferType, &[PositionCode]); 6] = [
    (OfferType::Premium1, PREMIUM_1),
    (OfferType::Gold1, GOLD_1),
    (OfferType::Gold2, GOLD_2),
    (OfferType::Silver1, SILVER_1),
    (OfferType::Silver2, SILVER_2),
    (OfferType::Silver3, SILVER_3),
];

const POSITION_FORMATS: &[(&str, Format)] = &[
    // Premium 1
    ("P-1-1-1", Square),
    ("P-1-1-2", Tower),
    ("P-1-1-3", Square),
    ("P-1-1-4", Landscape),
    ("P-1-1-5", Banner),
    ("P-1-1-6", Square),
    ("P-1-2-1", Portrait),
    ("P-1-2-2", Square),
    ("P-1-2-3", Square),
    ("P-1-2-4", Banner),
    ("P-1-2-5", Landscape),
    ("P-1-2-6", Tower),
    // Gold 1
    ("G-1-1-1", Tower),
    ("G-1-1-2", Portrait),
    ("G-1-1-3", Landscape),
    ("G-1-2-1", Banner),
    ("G-1-2-2", Landscape),
    ("G-1-2-3", Square),
    // Gold 2
    ("G-2-1-1", Banner),
    ("G-2-1-2", Square),
    ("G-2-1-3", Portrait),
    ("G-2-2-1", Tower),
    ("G-2-2-2", Square),
    ("G-2-2-3", Portrait),
    // Silver 1
    ("S-1-1-1", Banner),
    ("S-1-1-2", Square),
    ("S-1-1-3", Square),
    ("S-1-1-4", Tower),
    ("S-1-2-1", Square),
    ("S-1-2-2", Tower),
    ("S-1-2-3", Banner),
    // Silver 2
    ("S-2-1-1", Square),
    ("S-2-1-2", Landscape),
    ("S-2-1-3", Tower),
    ("S-2-1-4", Banner),
    ("S-2-2-1", Banner),
    ("S-2-2-2", Square),
    ("S-2-2-3", Banner),
    // Silver 3
    ("S-3-1-1", Square),
    ("S-3-1-2", Tower),
    ("S-3-1-3", Banner),
    ("S-3-1-4", Portrait),
    ("S-3-2-1", Tower),
    ("S-3-2-2", Banner),
    ("S-3-2-3", Square),
];

/// オファーのポジション一覧（カタログ順）
pub fn positions_for_offer(offer: OfferType) -> &'static [PositionCode] {
    match offer {
        OfferType::Premium1 => PREMIUM_1,
        OfferType::Gold1 => GOLD_1,
        OfferType::Gold2 => GOLD_2,
        OfferType::Silver1 => SILVER_1,
        OfferType::Silver2 => SILVER_2,
        OfferType::Silver3 => SILVER_3,
    }
}

/// ポジション → フォーマット（全域関数、フォールバックなし）
pub fn format_for_position(position: PositionCode) -> Format {
    POSITION_FORMATS
        .iter()
        .find(|(code, _)| *code == position.0)
        .map(|(_, format)| *format)
        // PositionCode はカタログからしか生成できない
        .unwrap_or_else(|| unreachable!("no format for position {}", position.0))
}

/// ポジション → 所属オファー
pub fn offer_for_position(position: PositionCode) -> OfferType {
    CATALOG
        .iter()
        .find(|(_, codes)| codes.contains(&position))
        .map(|(offer, _)| *offer)
        .unwrap_or_else(|| unreachable!("position {} has no offer", position.0))
}

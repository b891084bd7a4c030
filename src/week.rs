//! Week Keying
//! 日付 → 週番号 / 月曜〜日曜の範囲
//!
//! 週番号は ISO-8601 ではなくダッシュボード互換の式:
//! `ceil((1月1日からの経過日数 + 1月1日の曜日(日=0) + 1) / 7)`
//! 週キーを作る箇所は必ずこのモジュールを通すこと。

use chrono::{Datelike, Duration, FixedOffset, NaiveDate, Utc};
use serde::Serialize;

/// 月曜始まりの週範囲
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WeekBounds {
    pub monday: NaiveDate,
    pub sunday: NaiveDate,
}

impl WeekBounds {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.monday <= date && date <= self.sunday
    }
}

/// 週番号（1 始まり）
pub fn week_number_of(date: NaiveDate) -> u32 {
    let past_days = date.ordinal0();
    let jan1_dow = NaiveDate::from_ymd_opt(date.year(), 1, 1)
        .map(|jan1| jan1.weekday().num_days_from_sunday())
        .unwrap_or(0);
    (past_days + jan1_dow + 1).div_ceil(7)
}

/// その日を含む週の月曜と日曜
pub fn week_bounds_of(date: NaiveDate) -> WeekBounds {
    let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
    WeekBounds {
        monday,
        sunday: monday + Duration::days(6),
    }
}

/// 「今週」の週番号（その週の月曜で採番する）
pub fn current_week(today: NaiveDate) -> u32 {
    week_number_of(week_bounds_of(today).monday)
}

/// 固定オフセットでの「今日」
pub fn today(offset: FixedOffset) -> NaiveDate {
    Utc::now().with_timezone(&offset).date_naive()
}

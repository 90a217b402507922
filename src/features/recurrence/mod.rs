/// 配信タイミング機能モジュール
///
/// このモジュールは、配信周期・アンカー・ローカル時刻・UTCオフセットの検証と、
/// UTC配信時刻への正規化を提供します。
pub mod models;
pub mod timezone;
pub mod validation;

// 公開インターフェース
pub use models::{
    Anchor, ClockTime, Periodicity, RecurrenceSpec, UtcOffset, MAX_OFFSET_HOURS, WEEKDAY_NAMES,
};
pub use timezone::{normalize, normalize_time, MINUTES_PER_DAY};
pub use validation::{
    parse_day_of_month, parse_local_time, parse_periodicity, parse_utc_offset, parse_weekday,
    InputError,
};

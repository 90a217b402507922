//! ローカル時刻からUTC配信時刻への正規化

use super::models::{ClockTime, UtcOffset};

/// 1日の分数
pub const MINUTES_PER_DAY: i32 = 24 * 60;

/// ローカル時刻とUTCオフセットからUTCの時:分を求める
///
/// 分単位に直してオフセットを引き、1440で剰余を取るため、日付をまたいでも
/// 時・分は常に範囲内に収まる。入力は呼び出し側で検証済みであること。
///
/// # 引数
/// * `local_hour` - 0〜23
/// * `local_minute` - 0〜59
/// * `offset_hours` - -12〜+12（小数可）
pub fn normalize(local_hour: u8, local_minute: u8, offset_hours: f64) -> (u8, u8) {
    debug_assert!(local_hour < 24 && local_minute < 60);
    debug_assert!(offset_hours.abs() <= 12.0);

    let offset_minutes = (offset_hours * 60.0).round() as i32;
    let utc = shift(
        i32::from(local_hour) * 60 + i32::from(local_minute),
        offset_minutes,
    );
    ((utc / 60) as u8, (utc % 60) as u8)
}

/// [`normalize`] の型付き版
pub fn normalize_time(local: ClockTime, offset: UtcOffset) -> ClockTime {
    let utc = shift(
        i32::from(local.total_minutes()),
        i32::from(offset.minutes()),
    );
    ClockTime::from_total_minutes(utc as u16)
}

fn shift(total_local_minutes: i32, offset_minutes: i32) -> i32 {
    (total_local_minutes - offset_minutes).rem_euclid(MINUTES_PER_DAY)
}

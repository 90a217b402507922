//! ウィザード入力の検証
//!
//! 各関数は生の入力文字列を受け取り、検証済みの値か [`InputError`] を返す。
//! エラーはウィザード内で再入力を促すために使われ、呼び出し元へは伝播しない。

use super::models::{ClockTime, Periodicity, UtcOffset, WEEKDAY_NAMES};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

/// HH:MM（時は1桁も許容）
static TIME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2}):(\d{2})$").expect("時刻パターンが不正です"));

/// 利用者の入力エラー。値には拒否した入力をそのまま保持する
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "input", rename_all = "snake_case")]
pub enum InputError {
    #[error("不明な配信周期です: {0:?}")]
    InvalidPeriodicity(String),

    #[error("不明な曜日です: {0:?}")]
    InvalidWeekday(String),

    #[error("日付が不正です: {0:?}")]
    InvalidDayOfMonth(String),

    #[error("時刻の形式が不正です: {0:?}")]
    InvalidTimeFormat(String),

    #[error("UTCオフセットが不正です: {0:?}")]
    InvalidOffset(String),
}

impl InputError {
    /// 再入力を促すためのメッセージ
    pub fn user_message(&self) -> &'static str {
        match self {
            InputError::InvalidPeriodicity(_) => "一覧から配信周期を選択してください。",
            InputError::InvalidWeekday(_) => "一覧から曜日を選択してください。",
            InputError::InvalidDayOfMonth(_) => {
                "1から31までの日付を数字で入力してください（例: 15）。"
            }
            InputError::InvalidTimeFormat(_) => {
                "時刻はHH:MM形式で入力してください（例: 08:30）。"
            }
            InputError::InvalidOffset(_) => {
                "UTCからの時差を-12から+12の範囲で入力してください（例: +3、5.5、-3,5）。"
            }
        }
    }
}

/// 配信周期を解析する（メニュー値またはラベル）
pub fn parse_periodicity(raw: &str) -> Result<Periodicity, InputError> {
    let text = raw.trim();
    let code = text.to_lowercase();

    Periodicity::ALL
        .into_iter()
        .find(|p| p.as_str() == code || p.label() == text)
        .ok_or_else(|| InputError::InvalidPeriodicity(raw.to_string()))
}

/// 曜日を解析する
///
/// メニュー値（0〜6、月曜日=0）か、曜日名（「水曜日」「水曜」「水」）を受け付ける。
pub fn parse_weekday(raw: &str) -> Result<u8, InputError> {
    let text = raw.trim();

    if let Ok(value) = text.parse::<u8>() {
        return if value <= 6 {
            Ok(value)
        } else {
            Err(InputError::InvalidWeekday(raw.to_string()))
        };
    }

    WEEKDAY_NAMES
        .iter()
        .position(|name| {
            let short = name.trim_end_matches('日');
            let single = short.trim_end_matches('曜');
            !text.is_empty() && (text == *name || text == short || text == single)
        })
        .map(|index| index as u8)
        .ok_or_else(|| InputError::InvalidWeekday(raw.to_string()))
}

/// 日付（1〜31）を解析する
pub fn parse_day_of_month(raw: &str) -> Result<u8, InputError> {
    raw.trim()
        .parse::<u8>()
        .ok()
        .filter(|day| (1..=31).contains(day))
        .ok_or_else(|| InputError::InvalidDayOfMonth(raw.to_string()))
}

/// ローカル時刻（HH:MM）を解析する
pub fn parse_local_time(raw: &str) -> Result<ClockTime, InputError> {
    let invalid = || InputError::InvalidTimeFormat(raw.to_string());

    let captures = TIME_PATTERN.captures(raw.trim()).ok_or_else(invalid)?;
    let hour = captures[1].parse::<u8>().map_err(|_| invalid())?;
    let minute = captures[2].parse::<u8>().map_err(|_| invalid())?;

    ClockTime::new(hour, minute).ok_or_else(invalid)
}

/// UTCオフセットを解析する
///
/// 小数点は「.」「,」のどちらも受け付け、先頭の "UTC" / "GMT" は無視する。
pub fn parse_utc_offset(raw: &str) -> Result<UtcOffset, InputError> {
    let invalid = || InputError::InvalidOffset(raw.to_string());

    let mut text = raw.trim();
    for prefix in ["UTC", "utc", "GMT", "gmt"] {
        if let Some(rest) = text.strip_prefix(prefix) {
            text = rest.trim_start();
            break;
        }
    }

    // 空文字の "UTC" は +0 とみなす
    if text.is_empty() {
        return if raw.trim().is_empty() {
            Err(invalid())
        } else {
            Ok(UtcOffset::UTC)
        };
    }

    let hours = text
        .replace(',', ".")
        .parse::<f64>()
        .map_err(|_| invalid())?;

    UtcOffset::from_hours(hours).ok_or_else(invalid)
}

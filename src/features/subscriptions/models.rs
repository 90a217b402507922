use crate::features::recurrence::{ClockTime, RecurrenceSpec, WEEKDAY_NAMES};
use crate::shared::errors::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// チャット側の利用者ID
pub type UserId = i64;

/// 種別トークンの最大長
pub const MAX_SUBSCRIPTION_TYPE_LEN: usize = 64;

/// 配信対象のレポート種別（メニュー表示用）
pub const REPORT_TYPES: &[(&str, &str)] = &[
    ("revenue", "売上分析"),
    ("trade_turnover", "取引高"),
    ("trade_turnover_for_various_objects", "拠点別取引高"),
    ("forecasting_losses", "損失予測"),
    ("inventory", "棚卸"),
    ("foodcost_of_products_storehouse", "原価率（倉庫）"),
    ("foodcost_of_products_dishes", "原価率（メニュー）"),
];

/// レポート種別の表示名。未登録の種別はトークンをそのまま返す
pub fn report_label(subscription_type: &str) -> &str {
    REPORT_TYPES
        .iter()
        .find(|(code, _)| *code == subscription_type)
        .map(|(_, label)| *label)
        .unwrap_or(subscription_type)
}

/// 種別トークンを検証する（英小文字・数字・アンダースコアのみ）
///
/// # 戻り値
/// 前後の空白を除いた種別、または不正な場合はバリデーションエラー
pub fn validate_subscription_type(raw: &str) -> AppResult<String> {
    let value = raw.trim();

    if value.is_empty() {
        return Err(AppError::validation("配信対象のレポート種別を指定してください"));
    }
    if value.len() > MAX_SUBSCRIPTION_TYPE_LEN {
        return Err(AppError::validation(format!(
            "レポート種別は{MAX_SUBSCRIPTION_TYPE_LEN}文字以内で指定してください"
        )));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(AppError::validation(format!(
            "レポート種別に使用できない文字が含まれています: {value}"
        )));
    }

    Ok(value.to_string())
}

/// サブスクリプションの一意キー
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SubscriptionKey {
    pub user_id: UserId,
    pub subscription_type: String,
}

impl SubscriptionKey {
    pub fn new(user_id: UserId, subscription_type: impl Into<String>) -> Self {
        Self {
            user_id,
            subscription_type: subscription_type.into(),
        }
    }
}

/// 保存前のサブスクリプション
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubscription {
    pub key: SubscriptionKey,
    pub spec: RecurrenceSpec,
}

/// 保存済みのサブスクリプション
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subscription {
    pub user_id: UserId,
    pub subscription_type: String,
    pub spec: RecurrenceSpec,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey::new(self.user_id, self.subscription_type.clone())
    }

    /// 一覧メニューで使う選択トークン
    pub fn selection_token(&self) -> SelectionToken {
        SelectionToken {
            subscription_type: self.subscription_type.clone(),
            utc_time: self.spec.utc_time(),
        }
    }

    /// 一覧表示用の1行
    ///
    /// 例: `売上分析 (毎週) - 水曜日 - 09:00 (UTC+3)`
    pub fn display_label(&self) -> String {
        let spec = &self.spec;
        let mut label = format!(
            "{} ({})",
            report_label(&self.subscription_type),
            spec.periodicity().label()
        );

        if let Some(name) = spec.weekday().and_then(|d| WEEKDAY_NAMES.get(usize::from(d))) {
            label.push_str(&format!(" - {name}"));
        }
        if let Some(day) = spec.day_of_month() {
            label.push_str(&format!(" - {day}日"));
        }
        label.push_str(&format!(
            " - {} (UTC{})",
            spec.local_time(),
            spec.utc_offset()
        ));

        label
    }
}

/// 一覧の選択結果を表す短いトークン（`<種別>@<UTC時刻>`）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionToken {
    pub subscription_type: String,
    pub utc_time: ClockTime,
}

impl SelectionToken {
    pub const SEPARATOR: char = '@';

    pub fn encode(&self) -> String {
        format!("{}{}{}", self.subscription_type, Self::SEPARATOR, self.utc_time)
    }

    /// トークンを解析する
    ///
    /// # 戻り値
    /// 選択トークン、または形式が不正な場合はバリデーションエラー
    pub fn parse(token: &str) -> AppResult<Self> {
        let invalid = || AppError::validation(format!("選択内容を読み取れません: {token}"));

        let (subscription_type, time) = token.trim().rsplit_once(Self::SEPARATOR).ok_or_else(invalid)?;
        let subscription_type = validate_subscription_type(subscription_type).map_err(|_| invalid())?;
        let utc_time = ClockTime::parse_hhmm(time).ok_or_else(invalid)?;

        Ok(Self {
            subscription_type,
            utc_time,
        })
    }
}

impl fmt::Display for SelectionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// 一覧メニューの1項目
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionListItem {
    pub label: String,
    pub token: String,
}

impl From<&Subscription> for SubscriptionListItem {
    fn from(subscription: &Subscription) -> Self {
        Self {
            label: subscription.display_label(),
            token: subscription.selection_token().encode(),
        }
    }
}

/// 削除結果。存在しないキーの削除もエラーではない
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

// ウィザードの応答メッセージ

use super::state::{ConversationState, WizardStep};
use crate::features::recurrence::{InputError, Periodicity, UtcOffset, MAX_OFFSET_HOURS, WEEKDAY_NAMES};
use crate::features::subscriptions::{
    report_label, DeleteOutcome, Subscription, SubscriptionListItem,
};
use serde::Serialize;
use uuid::Uuid;

/// キャンセルを表すメニュー値
pub const CANCEL_VALUE: &str = "cancel";

/// メニューの選択肢
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Choice {
    pub label: String,
    pub value: String,
}

impl Choice {
    fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }

    fn cancel() -> Self {
        Self::new("キャンセル", CANCEL_VALUE)
    }
}

/// チャット層へ返す応答
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WizardResponse {
    /// 次の入力を促す
    Prompt {
        wizard_id: Uuid,
        step: WizardStep,
        text: String,
        choices: Vec<Choice>,
        error: Option<InputError>,
    },
    /// 保存完了
    Completed {
        subscription: Subscription,
        text: String,
    },
    /// キャンセル完了
    Cancelled { text: String },
    /// 配信停止（既に存在しなかった場合も成功）
    Unsubscribed {
        subscription_type: String,
        existed: bool,
        text: String,
    },
    /// 配信中の一覧
    Subscriptions {
        items: Vec<SubscriptionListItem>,
        text: String,
    },
    /// 進行中のウィザードがない
    NoActiveWizard { text: String },
    /// 終了済み・再開始済みのウィザードへの入力
    Stale { text: String },
}

impl WizardResponse {
    /// 表示用テキスト
    pub fn text(&self) -> &str {
        match self {
            WizardResponse::Prompt { text, .. }
            | WizardResponse::Completed { text, .. }
            | WizardResponse::Cancelled { text }
            | WizardResponse::Unsubscribed { text, .. }
            | WizardResponse::Subscriptions { text, .. }
            | WizardResponse::NoActiveWizard { text }
            | WizardResponse::Stale { text } => text,
        }
    }

    /// プロンプトに添付された入力エラー
    pub fn input_error(&self) -> Option<&InputError> {
        match self {
            WizardResponse::Prompt { error, .. } => error.as_ref(),
            _ => None,
        }
    }
}

/// キャンセル操作とみなす入力か
pub fn is_cancel_input(raw: &str) -> bool {
    let text = raw.trim();
    text.eq_ignore_ascii_case(CANCEL_VALUE) || text == "キャンセル"
}

/// 現在の段階に応じたプロンプトを作成する
///
/// # 引数
/// * `state` - 進行中のウィザード
/// * `error` - 直前の入力が拒否された場合のエラー
pub fn prompt_for(state: &ConversationState, error: Option<InputError>) -> WizardResponse {
    let (text, mut choices) = match state.step() {
        WizardStep::ChoosingPeriodicity => (
            format!(
                "「{}」の配信周期を選択してください。",
                report_label(state.subscription_type())
            ),
            periodicity_choices(),
        ),
        WizardStep::ChoosingAnchor => match state.periodicity() {
            Some(Periodicity::Monthly) => (
                "配信する日付（1〜31）を入力してください。月の日数を超える場合は月末に配信します。"
                    .to_string(),
                Vec::new(),
            ),
            _ => ("配信する曜日を選択してください。".to_string(), weekday_choices()),
        },
        WizardStep::ChoosingOffset => (
            "お住まいの地域のUTCからの時差を選択してください（例: 日本は +9）。".to_string(),
            offset_choices(),
        ),
        WizardStep::EnteringLocalTime => (
            "配信時刻をHH:MM形式で入力してください（例: 08:30）。".to_string(),
            Vec::new(),
        ),
        WizardStep::Idle | WizardStep::Completed | WizardStep::Cancelled => {
            (no_active_wizard().text().to_string(), Vec::new())
        }
    };

    if !state.step().is_terminal() {
        choices.push(Choice::cancel());
    }

    let text = match &error {
        Some(error) => format!("{}\n{text}", error.user_message()),
        None => text,
    };

    WizardResponse::Prompt {
        wizard_id: state.wizard_id(),
        step: state.step(),
        text,
        choices,
        error,
    }
}

/// 配信周期メニュー
pub fn periodicity_choices() -> Vec<Choice> {
    Periodicity::ALL
        .into_iter()
        .map(|p| Choice::new(p.label(), p.as_str()))
        .collect()
}

/// 曜日メニュー（値は 0〜6、月曜日=0）
pub fn weekday_choices() -> Vec<Choice> {
    WEEKDAY_NAMES
        .iter()
        .enumerate()
        .map(|(index, name)| Choice::new(*name, index.to_string()))
        .collect()
}

/// UTCオフセットメニュー（-12〜+12 の整数時間）
pub fn offset_choices() -> Vec<Choice> {
    let limit = MAX_OFFSET_HOURS as i32;
    (-limit..=limit)
        .filter_map(|hours| UtcOffset::from_minutes(hours * 60))
        .map(|offset| Choice::new(format!("UTC{offset}"), offset.to_string()))
        .collect()
}

pub fn completed(subscription: Subscription) -> WizardResponse {
    let text = format!(
        "配信を設定しました: {}\n（UTC {} に配信されます）",
        subscription.display_label(),
        subscription.spec.utc_time()
    );
    WizardResponse::Completed { subscription, text }
}

pub fn cancelled() -> WizardResponse {
    WizardResponse::Cancelled {
        text: "配信設定をキャンセルしました。".to_string(),
    }
}

pub fn unsubscribed(subscription_type: &str, outcome: DeleteOutcome) -> WizardResponse {
    WizardResponse::Unsubscribed {
        subscription_type: subscription_type.to_string(),
        existed: outcome == DeleteOutcome::Deleted,
        text: format!(
            "「{}」の配信を停止しました。",
            report_label(subscription_type)
        ),
    }
}

/// 配信中の一覧を作成する
pub fn subscription_list(subscriptions: &[Subscription]) -> WizardResponse {
    let items: Vec<SubscriptionListItem> =
        subscriptions.iter().map(SubscriptionListItem::from).collect();

    let text = if items.is_empty() {
        "配信中のレポートはありません。".to_string()
    } else {
        let lines: Vec<&str> = items.iter().map(|item| item.label.as_str()).collect();
        format!("配信中のレポート:\n{}", lines.join("\n"))
    };

    WizardResponse::Subscriptions { items, text }
}

pub fn no_active_wizard() -> WizardResponse {
    WizardResponse::NoActiveWizard {
        text: "進行中の配信設定はありません。".to_string(),
    }
}

pub fn stale() -> WizardResponse {
    WizardResponse::Stale {
        text: "この配信設定は終了しています。もう一度最初からやり直してください。".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_periodicity_prompt_has_menu_and_cancel() {
        let state = ConversationState::start(1, "revenue".to_string(), Utc::now());

        let WizardResponse::Prompt {
            wizard_id,
            step,
            text,
            choices,
            error,
        } = prompt_for(&state, None)
        else {
            panic!("プロンプトであるべき");
        };

        assert_eq!(wizard_id, state.wizard_id());
        assert_eq!(step, WizardStep::ChoosingPeriodicity);
        assert!(text.contains("売上分析"));
        let values: Vec<&str> = choices.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(values, vec!["daily", "workdays", "weekly", "monthly", CANCEL_VALUE]);
        assert!(error.is_none());
    }

    #[test]
    fn test_error_is_prepended_to_prompt() {
        let state = ConversationState::start(1, "revenue".to_string(), Utc::now());
        let error = InputError::InvalidPeriodicity("hourly".to_string());

        let response = prompt_for(&state, Some(error.clone()));

        assert!(response.text().starts_with(error.user_message()));
        assert_eq!(response.input_error(), Some(&error));
    }

    #[test]
    fn test_menus() {
        let weekdays = weekday_choices();
        assert_eq!(weekdays.len(), 7);
        assert_eq!(weekdays[2], Choice::new("水曜日", "2"));

        let offsets = offset_choices();
        assert_eq!(offsets.len(), 25);
        assert_eq!(offsets[0], Choice::new("UTC-12", "-12"));
        assert_eq!(offsets[12], Choice::new("UTC+0", "+0"));
        assert_eq!(offsets[24], Choice::new("UTC+12", "+12"));
    }

    #[test]
    fn test_empty_subscription_list() {
        let response = subscription_list(&[]);
        assert_eq!(response.text(), "配信中のレポートはありません。");
    }

    #[test]
    fn test_cancel_input() {
        assert!(is_cancel_input(" cancel "));
        assert!(is_cancel_input("CANCEL"));
        assert!(is_cancel_input("キャンセル"));
        assert!(!is_cancel_input("weekly"));
    }

    #[test]
    fn test_response_serializes_with_kind_tag() {
        let json = serde_json::to_value(cancelled()).unwrap();
        assert_eq!(json["kind"], "cancelled");

        let json = serde_json::to_value(unsubscribed("revenue", DeleteOutcome::NotFound)).unwrap();
        assert_eq!(json["kind"], "unsubscribed");
        assert_eq!(json["existed"], false);
    }
}

use crate::features::recurrence::{
    parse_day_of_month, parse_local_time, parse_periodicity, parse_utc_offset, parse_weekday,
    Anchor, ClockTime, InputError, Periodicity, RecurrenceSpec, UtcOffset,
};
use crate::features::subscriptions::UserId;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// ウィザードの段階
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    /// ウィザード未開始
    Idle,
    /// 配信周期の選択待ち
    ChoosingPeriodicity,
    /// 曜日または日付の入力待ち（毎週・毎月のみ）
    ChoosingAnchor,
    /// UTCオフセットの選択待ち
    ChoosingOffset,
    /// ローカル時刻の入力待ち
    EnteringLocalTime,
    /// 保存完了
    Completed,
    /// キャンセル済み
    Cancelled,
}

impl WizardStep {
    /// 終端状態かどうか
    pub fn is_terminal(self) -> bool {
        matches!(self, WizardStep::Completed | WizardStep::Cancelled)
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WizardStep::Idle => "idle",
            WizardStep::ChoosingPeriodicity => "choosing_periodicity",
            WizardStep::ChoosingAnchor => "choosing_anchor",
            WizardStep::ChoosingOffset => "choosing_offset",
            WizardStep::EnteringLocalTime => "entering_local_time",
            WizardStep::Completed => "completed",
            WizardStep::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// 入力を受け付けた結果
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    /// 次の段階へ進んだ
    Next(WizardStep),
    /// すべての項目が揃い、保存できる状態になった
    ReadyToSave(RecurrenceSpec),
}

/// 1人の利用者の進行中ウィザード
///
/// 各段階では、その段階が受け持つ項目だけを読み書きする。入力エラー時は
/// どの項目も変更しない。
#[derive(Debug, Clone)]
pub struct ConversationState {
    wizard_id: Uuid,
    user_id: UserId,
    subscription_type: String,
    step: WizardStep,
    periodicity: Option<Periodicity>,
    anchor: Anchor,
    offset: Option<UtcOffset>,
    pending_local_time: Option<ClockTime>,
    started_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

impl ConversationState {
    /// 新しいウィザードを開始する（配信周期の選択から）
    ///
    /// # 引数
    /// * `user_id` - 利用者ID
    /// * `subscription_type` - 検証済みのレポート種別
    /// * `now` - 開始時刻
    pub fn start(user_id: UserId, subscription_type: String, now: DateTime<Utc>) -> Self {
        Self {
            wizard_id: Uuid::new_v4(),
            user_id,
            subscription_type,
            step: WizardStep::ChoosingPeriodicity,
            periodicity: None,
            anchor: Anchor::None,
            offset: None,
            pending_local_time: None,
            started_at: now,
            last_activity: now,
        }
    }

    pub fn wizard_id(&self) -> Uuid {
        self.wizard_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn subscription_type(&self) -> &str {
        &self.subscription_type
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn periodicity(&self) -> Option<Periodicity> {
        self.periodicity
    }

    pub fn anchor(&self) -> Anchor {
        self.anchor
    }

    pub fn offset(&self) -> Option<UtcOffset> {
        self.offset
    }

    pub fn pending_local_time(&self) -> Option<ClockTime> {
        self.pending_local_time
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    /// 現在の段階に対する入力を処理する
    ///
    /// # 引数
    /// * `raw` - 利用者の入力（メニュー値または自由入力）
    /// * `now` - 入力時刻
    ///
    /// # 戻り値
    /// 進んだ先の段階、保存可能な配信タイミング、または入力エラー
    pub fn apply_input(&mut self, raw: &str, now: DateTime<Utc>) -> Result<Advance, InputError> {
        self.last_activity = now;

        match self.step {
            WizardStep::ChoosingPeriodicity => {
                let periodicity = parse_periodicity(raw)?;
                self.periodicity = Some(periodicity);
                self.anchor = Anchor::None;
                self.step = if periodicity.requires_anchor() {
                    WizardStep::ChoosingAnchor
                } else {
                    WizardStep::ChoosingOffset
                };
                Ok(Advance::Next(self.step))
            }
            WizardStep::ChoosingAnchor => {
                self.anchor = match self.periodicity {
                    Some(Periodicity::Weekly) => Anchor::Weekday(parse_weekday(raw)?),
                    Some(Periodicity::Monthly) => Anchor::DayOfMonth(parse_day_of_month(raw)?),
                    _ => return Err(InputError::InvalidPeriodicity(raw.to_string())),
                };
                self.step = WizardStep::ChoosingOffset;
                Ok(Advance::Next(self.step))
            }
            WizardStep::ChoosingOffset => {
                self.offset = Some(parse_utc_offset(raw)?);
                self.step = WizardStep::EnteringLocalTime;
                Ok(Advance::Next(self.step))
            }
            WizardStep::EnteringLocalTime => {
                let local_time = parse_local_time(raw)?;
                let spec = self.build_spec(local_time)?;
                self.pending_local_time = Some(local_time);
                Ok(Advance::ReadyToSave(spec))
            }
            WizardStep::Idle | WizardStep::Completed | WizardStep::Cancelled => {
                Ok(Advance::Next(self.step))
            }
        }
    }

    /// 保存に失敗した時刻で再度配信タイミングを組み立てる
    pub fn pending_spec(&self) -> Option<RecurrenceSpec> {
        if self.step != WizardStep::EnteringLocalTime {
            return None;
        }
        self.pending_local_time
            .and_then(|local_time| self.build_spec(local_time).ok())
    }

    /// 保存完了として終端状態にする
    pub fn complete(&mut self) {
        self.step = WizardStep::Completed;
    }

    /// キャンセルして終端状態にする
    pub fn cancel(&mut self) {
        self.step = WizardStep::Cancelled;
    }

    /// 最後の入力から `timeout` より長く経過しているか
    pub fn is_idle(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.last_activity > timeout
    }

    fn build_spec(&self, local_time: ClockTime) -> Result<RecurrenceSpec, InputError> {
        let (Some(periodicity), Some(offset)) = (self.periodicity, self.offset) else {
            return Err(InputError::InvalidPeriodicity(String::new()));
        };
        RecurrenceSpec::new(periodicity, self.anchor, local_time, offset)
    }
}

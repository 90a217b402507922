/// 配信設定ウィザード機能モジュール
///
/// このモジュールは、チャット層から呼び出される配信設定の対話フローを提供します：
/// - 配信周期・曜日/日付・UTCオフセット・時刻の段階的な入力と検証
/// - 完了時のUTC正規化と保存、キャンセル、保存失敗時の再試行
/// - 配信停止と一覧表示
pub mod controller;
pub mod messages;
pub mod state;

#[cfg(test)]
mod integration_tests;

// 公開インターフェース
pub use controller::WizardController;
pub use messages::{Choice, WizardResponse, CANCEL_VALUE};
pub use state::{ConversationState, WizardStep};

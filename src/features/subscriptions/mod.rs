/// サブスクリプション機能モジュール
///
/// このモジュールは、レポート配信サブスクリプションの永続化に関連する機能を提供します：
/// - (利用者, レポート種別) をキーとした作成・置換
/// - 削除と一覧取得
/// - 配信時刻に基づく配信対象の抽出
/// - 購読有無のキャッシュ
pub mod cache;
pub mod models;
pub mod repository;

// 公開インターフェース
pub use cache::MembershipCache;

pub use models::{
    report_label, validate_subscription_type, DeleteOutcome, NewSubscription, SelectionToken,
    Subscription, SubscriptionKey, SubscriptionListItem, UserId, REPORT_TYPES,
};

pub use repository::{SqliteSubscriptionStore, SubscriptionStore};

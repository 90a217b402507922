/// 機能別モジュール
///
/// 各機能モジュールは、その機能に関連するすべてのコード（モデル、永続化、制御、テスト）
/// を含む自己完結型のユニットです。
pub mod recurrence;
pub mod subscriptions;
pub mod wizard;

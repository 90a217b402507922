pub mod features;
pub mod shared;

use features::subscriptions::SqliteSubscriptionStore;
use features::wizard::WizardController;
use log::{info, warn};
use shared::config::{initialize_logging_system, load_environment_variables, EnvironmentConfig};
use shared::errors::AppResult;
use std::sync::Arc;

pub use features::recurrence::{normalize, InputError, Periodicity, RecurrenceSpec};
pub use features::subscriptions::{DeleteOutcome, Subscription, SubscriptionStore, UserId};
pub use features::wizard::{WizardResponse, WizardStep};
pub use shared::errors::{AppError, ErrorSeverity};

/// チャット層から使うウィザードを初期化する
///
/// # 引数
/// * `config` - 環境設定
///
/// # 戻り値
/// SQLiteストアに接続済みのウィザード、または初期化失敗時はエラー
///
/// # 処理内容
/// 1. データベースの初期化（テーブル作成を含む）
/// 2. 設定に従ったウィザードの作成
pub fn bootstrap(config: &EnvironmentConfig) -> AppResult<WizardController<SqliteSubscriptionStore>> {
    info!(
        "配信設定を初期化します: environment={}, database={:?}",
        config.environment, config.database_path
    );

    let store = SqliteSubscriptionStore::open(&config.database_path)?;

    match config.wizard_idle_timeout {
        Some(timeout) => info!("ウィザードのアイドル破棄: {}秒", timeout.as_secs()),
        None => info!("ウィザードのアイドル破棄は無効です"),
    }

    Ok(WizardController::from_config(Arc::new(store), config))
}

/// 環境変数（.env を含む）から設定を読み込み、ログを初期化してウィザードを作成する
///
/// # 処理内容
/// 1. .envファイルの読み込み（LOG_LEVEL を含む）
/// 2. 環境設定の構築
/// 3. ログシステムの初期化
/// 4. 初期化前に発生した読み込み結果と警告のログ出力
/// 5. [`bootstrap`] の実行
pub fn bootstrap_from_env() -> AppResult<WizardController<SqliteSubscriptionStore>> {
    let env_file = load_environment_variables();
    let (config, warnings) = EnvironmentConfig::from_env_with_warnings();
    initialize_logging_system(&config);

    env_file.log();
    for warning in &warnings {
        warn!("{warning}");
    }

    bootstrap(&config)
}

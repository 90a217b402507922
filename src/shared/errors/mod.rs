use thiserror::Error;

/// アプリケーション全体で使用される統一エラー型
#[derive(Debug, Error)]
pub enum AppError {
    /// ストレージが利用できない（接続・制約違反など）。再試行可能
    #[error("ストレージエラー: {0}")]
    StorageUnavailable(String),

    /// 呼び出し側から渡された値が不正
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    /// 設定関連のエラー
    #[error("設定エラー: {0}")]
    Configuration(String),

    /// 並行処理関連のエラー
    #[error("並行処理エラー: {0}")]
    Concurrency(String),
}

/// エラーの重要度を表す列挙型
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorSeverity {
    /// 低重要度（ユーザー入力エラーなど）
    Low,
    /// 中重要度（一時的なストレージ障害など）
    Medium,
    /// 高重要度（設定不備など）
    High,
    /// 最重要
    Critical,
}

impl AppError {
    /// ユーザーに表示するためのフレンドリーなメッセージを取得
    ///
    /// # 戻り値
    /// ユーザーに表示可能なエラーメッセージ
    pub fn user_message(&self) -> &str {
        match self {
            AppError::StorageUnavailable(_) => {
                "現在サブスクリプションを保存できません。しばらくしてから再試行してください"
            }
            AppError::Validation(msg) => msg,
            AppError::Configuration(_) => "設定エラーが発生しました",
            AppError::Concurrency(_) => "並行処理でエラーが発生しました",
        }
    }

    /// エラーの詳細情報を取得
    ///
    /// # 戻り値
    /// エラーの詳細情報（ログ出力用）
    pub fn details(&self) -> String {
        format!("{self}")
    }

    /// エラーの重要度を取得
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            AppError::StorageUnavailable(_) => ErrorSeverity::Medium,
            AppError::Validation(_) => ErrorSeverity::Low,
            AppError::Configuration(_) => ErrorSeverity::High,
            AppError::Concurrency(_) => ErrorSeverity::High,
        }
    }

    /// 同じ操作を再試行すれば成功し得るかどうか
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::StorageUnavailable(_) | AppError::Concurrency(_)
        )
    }

    /// ストレージ障害エラーを作成するヘルパー関数
    pub fn storage<S: Into<String>>(message: S) -> Self {
        AppError::StorageUnavailable(message.into())
    }

    /// バリデーションエラーを作成するヘルパー関数
    ///
    /// # 引数
    /// * `message` - バリデーションエラーメッセージ
    pub fn validation<S: Into<String>>(message: S) -> Self {
        AppError::Validation(message.into())
    }

    /// 設定エラーを作成するヘルパー関数
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        AppError::Configuration(message.into())
    }
}

/// AppErrorからStringへの変換（チャット層での表示用）
impl From<AppError> for String {
    fn from(error: AppError) -> Self {
        error.user_message().to_string()
    }
}

/// rusqlite::ErrorからAppErrorへの変換
impl From<rusqlite::Error> for AppError {
    fn from(error: rusqlite::Error) -> Self {
        AppError::StorageUnavailable(error.to_string())
    }
}

/// Result型のエイリアス（アプリケーション全体で使用）
pub type AppResult<T> = Result<T, AppError>;

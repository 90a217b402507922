use std::path::PathBuf;
use std::time::Duration;

/// メンバーシップキャッシュの既定TTL（秒）
const DEFAULT_MEMBERSHIP_CACHE_TTL_SECS: u64 = 300;

/// アプリケーションの実行環境を表す列挙型
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Environment {
    /// 開発環境
    Development,
    /// プロダクション環境
    Production,
}

/// 環境設定を管理する構造体
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    /// 実行環境
    pub environment: String,
    /// デバッグモードの有効/無効
    pub debug_mode: bool,
    /// ログレベル
    pub log_level: String,
    /// サブスクリプションを保存するSQLiteファイル
    pub database_path: PathBuf,
    /// 入力が途絶えたウィザードを破棄するまでの時間（Noneなら破棄しない）
    pub wizard_idle_timeout: Option<Duration>,
    /// 「購読中かどうか」キャッシュの有効期間
    pub membership_cache_ttl: Duration,
}

impl EnvironmentConfig {
    /// 環境変数から設定を読み込む
    ///
    /// 不正な値を既定値に置き換えた場合はその場で警告をログに出す。
    ///
    /// # 戻り値
    /// 環境設定
    pub fn from_env() -> Self {
        let (config, warnings) = Self::from_env_with_warnings();
        for warning in &warnings {
            log::warn!("{warning}");
        }
        config
    }

    /// 環境変数から設定を読み込み、既定値へのフォールバックを警告として返す
    ///
    /// ログシステムの初期化前に設定を読む場合に使う。
    ///
    /// # 戻り値
    /// 環境設定と警告メッセージの一覧
    pub fn from_env_with_warnings() -> (Self, Vec<String>) {
        let mut warnings = Vec::new();
        let environment = get_environment();
        let debug_mode = environment == Environment::Development;
        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| {
            if debug_mode {
                "debug".to_string()
            } else {
                "info".to_string()
            }
        });

        let database_path = std::env::var("MAILING_DATABASE_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| default_database_path(environment));

        // 0 または未設定はアイドル破棄なし
        let wizard_idle_timeout = read_secs("WIZARD_IDLE_TIMEOUT_SECS", &mut warnings)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let membership_cache_ttl = Duration::from_secs(
            read_secs("MEMBERSHIP_CACHE_TTL_SECS", &mut warnings)
                .unwrap_or(DEFAULT_MEMBERSHIP_CACHE_TTL_SECS),
        );

        let config = Self {
            environment: format!("{environment:?}").to_lowercase(),
            debug_mode,
            log_level,
            database_path,
            wizard_idle_timeout,
            membership_cache_ttl,
        };
        (config, warnings)
    }

    /// テストや組み込み用途向けの設定（インメモリ相当の既定値）
    ///
    /// # 引数
    /// * `database_path` - データベースファイルのパス
    pub fn for_database(database_path: PathBuf) -> Self {
        Self {
            environment: "development".to_string(),
            debug_mode: true,
            log_level: "debug".to_string(),
            database_path,
            wizard_idle_timeout: None,
            membership_cache_ttl: Duration::from_secs(DEFAULT_MEMBERSHIP_CACHE_TTL_SECS),
        }
    }

    /// プロダクション環境かどうかを判定
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 開発環境かどうかを判定
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

/// 秒数の環境変数を読み込む。数値でない場合は警告を積んで無視する
fn read_secs(name: &str, warnings: &mut Vec<String>) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(secs) => Some(secs),
        Err(_) => {
            warnings.push(format!("{name} の値が数値ではないため既定値を使用します: {raw}"));
            None
        }
    }
}

/// 現在の実行環境を判定する
///
/// # 判定ロジック
/// 1. 実行時環境変数 ENVIRONMENT を確認
/// 2. デバッグビルドの場合は Development
/// 3. リリースビルドの場合は Production
pub fn get_environment() -> Environment {
    if let Ok(env_var) = std::env::var("ENVIRONMENT") {
        let env = match env_var.as_str() {
            "production" => Environment::Production,
            _ => Environment::Development,
        };
        log::debug!("環境判定: 実行時環境変数を使用 -> {env_var} -> {env:?}");
        return env;
    }

    // フォールバック: ビルド設定に基づく判定
    let env = if cfg!(debug_assertions) {
        Environment::Development
    } else {
        Environment::Production
    };
    log::debug!(
        "環境判定: ビルド設定を使用 -> debug_assertions={} -> {env:?}",
        cfg!(debug_assertions)
    );
    env
}

/// 環境に応じたデータベースファイル名を取得する
///
/// # ファイル名の規則
/// - 開発環境: "dev_mailing.db"
/// - プロダクション環境: "mailing.db"
pub fn get_database_filename(env: Environment) -> &'static str {
    match env {
        Environment::Development => "dev_mailing.db",
        Environment::Production => "mailing.db",
    }
}

/// 既定のデータベースパス（ユーザーデータディレクトリ配下）
fn default_database_path(env: Environment) -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("report-mailing")
        .join(get_database_filename(env))
}

/// .envファイルの読み込み結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvFileStatus {
    /// 環境に応じたファイルを読み込んだ
    Loaded(&'static str),
    /// 対象ファイルがなく、デフォルトの.envを読み込んだ
    FellBackToDefault(&'static str),
    /// どちらも見つからなかった
    Missing,
}

impl EnvFileStatus {
    /// 読み込み結果をログに出す（ログ初期化後に呼ぶ）
    pub fn log(&self) {
        match self {
            EnvFileStatus::Loaded(env_file) => {
                log::info!("{env_file}ファイルを読み込みました");
            }
            EnvFileStatus::FellBackToDefault(env_file) => {
                log::warn!("{env_file}が見つからないため、デフォルトの.envファイルを読み込みました");
            }
            EnvFileStatus::Missing => {
                log::warn!("環境変数ファイルが見つかりません。直接設定された環境変数を使用します。");
            }
        }
    }
}

/// 環境に応じた.envファイルを読み込む
///
/// ログシステムの初期化前に呼ばれるため、結果はログに出さずに返す。
///
/// # 処理内容
/// 1. ENVIRONMENT に応じた.envファイルを読み込み
/// 2. 見つからなければデフォルトの.envにフォールバック
pub fn load_environment_variables() -> EnvFileStatus {
    let env_file = match std::env::var("ENVIRONMENT").as_deref() {
        Ok("production") => ".env.production",
        _ => ".env",
    };

    if dotenv::from_filename(env_file).is_ok() {
        EnvFileStatus::Loaded(env_file)
    } else if env_file != ".env" && dotenv::dotenv().is_ok() {
        EnvFileStatus::FellBackToDefault(env_file)
    } else {
        EnvFileStatus::Missing
    }
}

/// ログシステムを初期化する
///
/// 二重初期化はエラーにせず無視する（ホスト側で既に初期化済みの場合など）。
pub fn initialize_logging_system(env_config: &EnvironmentConfig) {
    let log_level = match env_config.log_level.to_lowercase().as_str() {
        "error" => log::LevelFilter::Error,
        "warn" => log::LevelFilter::Warn,
        "info" => log::LevelFilter::Info,
        "debug" => log::LevelFilter::Debug,
        "trace" => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info,
    };

    let initialized = env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp_secs()
        .format_module_path(false)
        .format_target(false)
        .try_init()
        .is_ok();

    if initialized {
        log::info!(
            "ログシステムを初期化しました: level={}, environment={}",
            env_config.log_level,
            env_config.environment
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_database_filename() {
        assert_eq!(
            get_database_filename(Environment::Development),
            "dev_mailing.db"
        );
        assert_eq!(get_database_filename(Environment::Production), "mailing.db");
    }

    #[test]
    fn test_default_database_path_ends_with_filename() {
        let path = default_database_path(Environment::Production);
        assert!(path.ends_with("report-mailing/mailing.db"));
    }

    #[test]
    fn test_for_database_defaults() {
        let config = EnvironmentConfig::for_database(PathBuf::from("/tmp/test.db"));
        assert!(config.is_development());
        assert!(!config.is_production());
        assert!(config.wizard_idle_timeout.is_none());
        assert_eq!(
            config.membership_cache_ttl,
            Duration::from_secs(DEFAULT_MEMBERSHIP_CACHE_TTL_SECS)
        );
    }

    #[test]
    fn test_get_environment() {
        let env = get_environment();
        assert!(matches!(
            env,
            Environment::Development | Environment::Production
        ));
    }

    #[test]
    fn test_invalid_secs_is_collected_as_warning() {
        std::env::set_var("REPORT_MAILING_TEST_SECS_INVALID", "five");
        std::env::set_var("REPORT_MAILING_TEST_SECS_VALID", " 90 ");
        let mut warnings = Vec::new();

        assert_eq!(read_secs("REPORT_MAILING_TEST_SECS_INVALID", &mut warnings), None);
        assert_eq!(read_secs("REPORT_MAILING_TEST_SECS_VALID", &mut warnings), Some(90));
        assert_eq!(read_secs("REPORT_MAILING_TEST_SECS_UNSET", &mut warnings), None);

        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("REPORT_MAILING_TEST_SECS_INVALID"));
        assert!(warnings[0].contains("five"));
    }

    #[test]
    fn test_environment_is_copy() {
        let env = Environment::Production;
        let path = default_database_path(env);
        assert_eq!(get_database_filename(env), "mailing.db");
        assert!(path.ends_with(get_database_filename(env)));
    }

    #[test]
    fn test_initialize_logging_twice_does_not_panic() {
        let config = EnvironmentConfig::for_database(PathBuf::from("/tmp/test.db"));
        initialize_logging_system(&config);
        initialize_logging_system(&config);
    }
}

use crate::shared::errors::{AppError, AppResult};
use rusqlite::Connection;
use std::path::Path;

/// データベース接続を初期化し、テーブルを作成する
///
/// # 引数
/// * `database_path` - データベースファイルのパス
///
/// # 戻り値
/// データベース接続、または失敗時はエラー
///
/// # 処理内容
/// 1. 親ディレクトリの確保
/// 2. データベース接続の開設
/// 3. テーブル作成の実行
pub fn initialize_database(database_path: &Path) -> AppResult<Connection> {
    if let Some(parent) = database_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::configuration(format!("データディレクトリの作成に失敗: {e}"))
            })?;
            log::info!("データディレクトリを作成: {:?}", parent);
        }
    }

    let conn = Connection::open(database_path)?;
    create_tables(&conn)?;

    log::info!("データベースを初期化しました: {:?}", database_path);

    Ok(conn)
}

/// テスト用のインメモリ接続を作成する（テーブル作成済み）
pub fn create_in_memory_connection() -> AppResult<Connection> {
    let conn = Connection::open_in_memory()?;
    create_tables(&conn)?;
    Ok(conn)
}

/// データベーステーブルを作成する
///
/// # 引数
/// * `conn` - データベース接続
///
/// # 戻り値
/// 成功時はOk(())、失敗時はエラー
pub fn create_tables(conn: &Connection) -> AppResult<()> {
    create_subscriptions_table(conn)?;
    create_indexes(conn)?;
    Ok(())
}

/// サブスクリプションテーブルを作成する
///
/// (user_id, subscription_type) が一意キー。周期とアンカーの整合性は
/// CHECK 制約でも担保する。
fn create_subscriptions_table(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS subscriptions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            subscription_type TEXT NOT NULL,
            periodicity TEXT NOT NULL CHECK(periodicity IN ('daily', 'workdays', 'weekly', 'monthly')),
            weekday INTEGER CHECK(weekday IS NULL OR weekday BETWEEN 0 AND 6),
            day_of_month INTEGER CHECK(day_of_month IS NULL OR day_of_month BETWEEN 1 AND 31),
            local_hour INTEGER NOT NULL CHECK(local_hour BETWEEN 0 AND 23),
            local_minute INTEGER NOT NULL CHECK(local_minute BETWEEN 0 AND 59),
            utc_offset_minutes INTEGER NOT NULL CHECK(utc_offset_minutes BETWEEN -720 AND 720),
            utc_hour INTEGER NOT NULL CHECK(utc_hour BETWEEN 0 AND 23),
            utc_minute INTEGER NOT NULL CHECK(utc_minute BETWEEN 0 AND 59),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(user_id, subscription_type),
            CHECK((periodicity = 'weekly') = (weekday IS NOT NULL)),
            CHECK((periodicity = 'monthly') = (day_of_month IS NOT NULL))
        )",
        [],
    )?;

    Ok(())
}

/// インデックスを作成する
fn create_indexes(conn: &Connection) -> AppResult<()> {
    // 利用者ごとの一覧表示用
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subscriptions_user ON subscriptions(user_id, subscription_type)",
        [],
    )?;

    // 配信対象の検索用
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subscriptions_utc_time ON subscriptions(utc_hour, utc_minute)",
        [],
    )?;

    Ok(())
}

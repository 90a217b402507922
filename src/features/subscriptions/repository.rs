use super::models::{DeleteOutcome, NewSubscription, Subscription, SubscriptionKey, UserId};
use crate::features::recurrence::{Anchor, ClockTime, Periodicity, RecurrenceSpec, UtcOffset};
use crate::shared::database::connection::{create_in_memory_connection, initialize_database};
use crate::shared::errors::{AppError, AppResult};
use chrono::{DateTime, Duration, Timelike, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

const SELECT_COLUMNS: &str = "SELECT user_id, subscription_type, periodicity, weekday, day_of_month,
            local_hour, local_minute, utc_offset_minutes, created_at, updated_at
     FROM subscriptions";

/// サブスクリプションの永続化層
///
/// 実装はスレッドセーフであること。各操作は1件単位でアトミックに実行される。
pub trait SubscriptionStore: Send + Sync {
    /// (user_id, subscription_type) をキーに作成または置換する
    fn upsert(&self, subscription: &NewSubscription) -> AppResult<Subscription>;

    /// キーに一致するサブスクリプションを削除する。存在しなくてもエラーにしない
    fn delete(&self, key: &SubscriptionKey) -> AppResult<DeleteOutcome>;

    /// 利用者のサブスクリプションを種別・UTC時刻順で取得する
    fn list_by_user(&self, user_id: UserId) -> AppResult<Vec<Subscription>>;

    /// 一覧の選択トークン（種別 + UTC時刻）からサブスクリプションを特定する
    fn find_by_key(
        &self,
        user_id: UserId,
        subscription_type: &str,
        utc_time: ClockTime,
    ) -> AppResult<Option<Subscription>>;

    /// 指定時刻（UTC）に配信すべきサブスクリプションを取得する
    fn list_due(&self, now_utc: DateTime<Utc>) -> AppResult<Vec<Subscription>>;
}

/// SQLiteによるサブスクリプションストア
#[derive(Clone)]
pub struct SqliteSubscriptionStore {
    /// データベース接続
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSubscriptionStore {
    /// 初期化済みの接続からストアを作成する
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// データベースファイルを開いてストアを作成する
    ///
    /// # 引数
    /// * `database_path` - データベースファイルのパス
    ///
    /// # 戻り値
    /// ストア、または初期化失敗時はエラー
    pub fn open(database_path: &Path) -> AppResult<Self> {
        let conn = initialize_database(database_path)?;
        Ok(Self::new(Arc::new(Mutex::new(conn))))
    }

    /// インメモリデータベースでストアを作成する
    pub fn open_in_memory() -> AppResult<Self> {
        let conn = create_in_memory_connection()?;
        Ok(Self::new(Arc::new(Mutex::new(conn))))
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| AppError::storage(format!("データベースロックエラー: {e}")))
    }
}

impl SubscriptionStore for SqliteSubscriptionStore {
    fn upsert(&self, subscription: &NewSubscription) -> AppResult<Subscription> {
        let conn = self.lock()?;
        upsert(&conn, subscription)
    }

    fn delete(&self, key: &SubscriptionKey) -> AppResult<DeleteOutcome> {
        let conn = self.lock()?;
        delete(&conn, key)
    }

    fn list_by_user(&self, user_id: UserId) -> AppResult<Vec<Subscription>> {
        let conn = self.lock()?;
        find_by_user(&conn, user_id)
    }

    fn find_by_key(
        &self,
        user_id: UserId,
        subscription_type: &str,
        utc_time: ClockTime,
    ) -> AppResult<Option<Subscription>> {
        let conn = self.lock()?;
        find_by_selection(&conn, user_id, subscription_type, utc_time)
    }

    fn list_due(&self, now_utc: DateTime<Utc>) -> AppResult<Vec<Subscription>> {
        let conn = self.lock()?;
        find_due(&conn, now_utc)
    }
}

/// サブスクリプションを作成または置換する
///
/// 1文の `INSERT ... ON CONFLICT DO UPDATE` で実行するため、同一キーの行が
/// 複数になることはない。内容が同じ場合は行を更新しない（updated_at も維持）。
///
/// # 引数
/// * `conn` - データベース接続
/// * `subscription` - 保存するサブスクリプション
///
/// # 戻り値
/// 保存後のサブスクリプション、または失敗時はエラー
pub fn upsert(conn: &Connection, subscription: &NewSubscription) -> AppResult<Subscription> {
    let now = Utc::now().to_rfc3339();
    let key = &subscription.key;
    let spec = &subscription.spec;

    let changed = conn.execute(
        "INSERT INTO subscriptions (
            user_id, subscription_type, periodicity, weekday, day_of_month,
            local_hour, local_minute, utc_offset_minutes, utc_hour, utc_minute,
            created_at, updated_at
         )
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
         ON CONFLICT(user_id, subscription_type) DO UPDATE SET
            periodicity = excluded.periodicity,
            weekday = excluded.weekday,
            day_of_month = excluded.day_of_month,
            local_hour = excluded.local_hour,
            local_minute = excluded.local_minute,
            utc_offset_minutes = excluded.utc_offset_minutes,
            utc_hour = excluded.utc_hour,
            utc_minute = excluded.utc_minute,
            updated_at = excluded.updated_at
         WHERE subscriptions.periodicity IS NOT excluded.periodicity
            OR subscriptions.weekday IS NOT excluded.weekday
            OR subscriptions.day_of_month IS NOT excluded.day_of_month
            OR subscriptions.local_hour IS NOT excluded.local_hour
            OR subscriptions.local_minute IS NOT excluded.local_minute
            OR subscriptions.utc_offset_minutes IS NOT excluded.utc_offset_minutes",
        params![
            key.user_id,
            key.subscription_type,
            spec.periodicity().as_str(),
            spec.weekday(),
            spec.day_of_month(),
            spec.local_time().hour(),
            spec.local_time().minute(),
            spec.utc_offset().minutes(),
            spec.utc_time().hour(),
            spec.utc_time().minute(),
            now,
        ],
    )?;

    if changed == 0 {
        log::debug!(
            "サブスクリプションは変更なし: user_id={}, type={}",
            key.user_id,
            key.subscription_type
        );
    } else {
        log::info!(
            "サブスクリプションを保存しました: user_id={}, type={}, periodicity={}, utc={}",
            key.user_id,
            key.subscription_type,
            spec.periodicity(),
            spec.utc_time()
        );
    }

    find_by_subscription_key(conn, key)?.ok_or_else(|| {
        AppError::storage(format!(
            "保存直後のサブスクリプションが見つかりません: user_id={}, type={}",
            key.user_id, key.subscription_type
        ))
    })
}

/// サブスクリプションを削除する
///
/// # 戻り値
/// 削除した場合は `Deleted`、該当がなければ `NotFound`
pub fn delete(conn: &Connection, key: &SubscriptionKey) -> AppResult<DeleteOutcome> {
    let rows_affected = conn.execute(
        "DELETE FROM subscriptions WHERE user_id = ?1 AND subscription_type = ?2",
        params![key.user_id, key.subscription_type],
    )?;

    if rows_affected == 0 {
        log::debug!(
            "削除対象のサブスクリプションはありません: user_id={}, type={}",
            key.user_id,
            key.subscription_type
        );
        Ok(DeleteOutcome::NotFound)
    } else {
        log::info!(
            "サブスクリプションを削除しました: user_id={}, type={}",
            key.user_id,
            key.subscription_type
        );
        Ok(DeleteOutcome::Deleted)
    }
}

/// キーでサブスクリプションを取得する
pub fn find_by_subscription_key(
    conn: &Connection,
    key: &SubscriptionKey,
) -> AppResult<Option<Subscription>> {
    let subscription = conn
        .query_row(
            &format!("{SELECT_COLUMNS} WHERE user_id = ?1 AND subscription_type = ?2"),
            params![key.user_id, key.subscription_type],
            map_row,
        )
        .optional()?;

    Ok(subscription)
}

/// 種別とUTC時刻でサブスクリプションを取得する
pub fn find_by_selection(
    conn: &Connection,
    user_id: UserId,
    subscription_type: &str,
    utc_time: ClockTime,
) -> AppResult<Option<Subscription>> {
    let subscription = conn
        .query_row(
            &format!(
                "{SELECT_COLUMNS}
                 WHERE user_id = ?1 AND subscription_type = ?2 AND utc_hour = ?3 AND utc_minute = ?4"
            ),
            params![user_id, subscription_type, utc_time.hour(), utc_time.minute()],
            map_row,
        )
        .optional()?;

    Ok(subscription)
}

/// 利用者のサブスクリプション一覧を取得する
///
/// # 戻り値
/// 種別・UTC時・UTC分の昇順に並んだ一覧
pub fn find_by_user(conn: &Connection, user_id: UserId) -> AppResult<Vec<Subscription>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_COLUMNS} WHERE user_id = ?1 ORDER BY subscription_type, utc_hour, utc_minute"
    ))?;

    let subscriptions = stmt
        .query_map(params![user_id], map_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(subscriptions)
}

/// 指定時刻に配信すべきサブスクリプションを取得する
///
/// UTCの時:分で絞り込んだ後、利用者のローカル日付で曜日・日付を判定する。
pub fn find_due(conn: &Connection, now_utc: DateTime<Utc>) -> AppResult<Vec<Subscription>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_COLUMNS} WHERE utc_hour = ?1 AND utc_minute = ?2 ORDER BY user_id, subscription_type"
    ))?;

    let candidates = stmt
        .query_map(params![now_utc.hour(), now_utc.minute()], map_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let due: Vec<Subscription> = candidates
        .into_iter()
        .filter(|subscription| {
            let offset = Duration::minutes(i64::from(subscription.spec.utc_offset().minutes()));
            let local_date = (now_utc + offset).date_naive();
            subscription.spec.is_due_on(local_date)
        })
        .collect();

    log::debug!("配信対象: {}件 (UTC {})", due.len(), now_utc.format("%Y-%m-%d %H:%M"));

    Ok(due)
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    let periodicity_code: String = row.get(2)?;
    let periodicity = Periodicity::from_code(&periodicity_code)
        .ok_or_else(|| conversion_error(2, format!("不明な配信周期: {periodicity_code}")))?;

    let weekday: Option<u8> = row.get(3)?;
    let day_of_month: Option<u8> = row.get(4)?;
    let anchor = match (weekday, day_of_month) {
        (Some(day), None) => Anchor::Weekday(day),
        (None, Some(day)) => Anchor::DayOfMonth(day),
        _ => Anchor::None,
    };

    let local_time = ClockTime::new(row.get(5)?, row.get(6)?)
        .ok_or_else(|| conversion_error(5, "ローカル時刻が範囲外です".to_string()))?;
    let offset_minutes: i32 = row.get(7)?;
    let utc_offset = UtcOffset::from_minutes(offset_minutes)
        .ok_or_else(|| conversion_error(7, format!("UTCオフセットが範囲外: {offset_minutes}")))?;

    let spec = RecurrenceSpec::new(periodicity, anchor, local_time, utc_offset)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    Ok(Subscription {
        user_id: row.get(0)?,
        subscription_type: row.get(1)?,
        spec,
        created_at: parse_timestamp(row, 8)?,
        updated_at: parse_timestamp(row, 9)?,
    })
}

fn parse_timestamp(row: &Row<'_>, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    let value: String = row.get(index)?;
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

fn conversion_error(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Integer, message.into())
}

// 購読有無キャッシュモジュール

use super::models::UserId;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// キャッシュされた購読有無
#[derive(Debug, Clone, Copy)]
struct CachedMembership {
    has_subscriptions: bool,
    cached_at: Instant,
}

impl CachedMembership {
    fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.cached_at) < ttl
    }
}

/// 利用者ごとの「購読が1件以上あるか」を一定時間保持するキャッシュ
///
/// 書き込み（保存・削除）の後は必ず [`MembershipCache::invalidate`] を呼ぶこと。
/// ロックが壊れている場合はキャッシュなしとして振る舞う。
#[derive(Debug)]
pub struct MembershipCache {
    ttl: Duration,
    entries: Mutex<HashMap<UserId, CachedMembership>>,
}

impl MembershipCache {
    /// キャッシュを作成する
    ///
    /// # 引数
    /// * `ttl` - 有効期間。ゼロの場合は常にミスする
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// 有効期限内のキャッシュ値を取得する
    pub fn get(&self, user_id: UserId) -> Option<bool> {
        self.get_at(user_id, Instant::now())
    }

    fn get_at(&self, user_id: UserId, now: Instant) -> Option<bool> {
        let Ok(mut entries) = self.entries.lock() else {
            return None;
        };

        match entries.get(&user_id) {
            Some(entry) if entry.is_fresh(self.ttl, now) => Some(entry.has_subscriptions),
            Some(_) => {
                entries.remove(&user_id);
                None
            }
            None => None,
        }
    }

    /// 値を保存する
    pub fn insert(&self, user_id: UserId, has_subscriptions: bool) {
        if self.ttl.is_zero() {
            return;
        }
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                user_id,
                CachedMembership {
                    has_subscriptions,
                    cached_at: Instant::now(),
                },
            );
        }
    }

    /// 利用者のキャッシュを破棄する
    pub fn invalidate(&self, user_id: UserId) {
        if let Ok(mut entries) = self.entries.lock() {
            if entries.remove(&user_id).is_some() {
                log::debug!("購読有無キャッシュを破棄: user_id={user_id}");
            }
        }
    }

    /// 期限切れのエントリを削除する
    ///
    /// # 戻り値
    /// 削除した件数
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    fn purge_expired_at(&self, now: Instant) -> usize {
        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(self.ttl, now));
        before - entries.len()
    }

    /// 保持しているエントリ数（期限切れを含む）
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

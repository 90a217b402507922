use super::messages::{self, WizardResponse};
use super::state::{Advance, ConversationState, WizardStep};
use crate::features::recurrence::RecurrenceSpec;
use crate::features::subscriptions::{
    validate_subscription_type, DeleteOutcome, MembershipCache, NewSubscription, SelectionToken,
    Subscription, SubscriptionKey, SubscriptionStore, UserId,
};
use crate::shared::config::EnvironmentConfig;
use crate::shared::errors::{AppError, AppResult};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// 購読有無キャッシュの既定TTL
const DEFAULT_MEMBERSHIP_TTL: std::time::Duration = std::time::Duration::from_secs(300);

/// 利用者ごとのウィザード保持枠。同じ利用者の入力はこのロックで直列化される
type Slot = Arc<tokio::sync::Mutex<Option<ConversationState>>>;

/// 配信設定ウィザードの制御
///
/// チャット層から利用者ごとの入力を受け取り、状態遷移・検証・保存を行う。
/// 異なる利用者のウィザードは互いにブロックしない。ストア呼び出しはブロッキング
/// スレッドで実行し、購読有無キャッシュの読み書きも利用者ごとのロック内で行う。
pub struct WizardController<S: SubscriptionStore> {
    store: Arc<S>,
    slots: Mutex<HashMap<UserId, Slot>>,
    membership: MembershipCache,
    idle_timeout: Option<Duration>,
}

impl<S: SubscriptionStore + 'static> WizardController<S> {
    /// 既定設定でコントローラーを作成する（アイドル破棄なし）
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            slots: Mutex::new(HashMap::new()),
            membership: MembershipCache::new(DEFAULT_MEMBERSHIP_TTL),
            idle_timeout: None,
        }
    }

    /// 環境設定からコントローラーを作成する
    ///
    /// # 引数
    /// * `store` - サブスクリプションストア
    /// * `config` - 環境設定（キャッシュTTL・アイドルタイムアウト）
    pub fn from_config(store: Arc<S>, config: &EnvironmentConfig) -> Self {
        let idle_timeout = config
            .wizard_idle_timeout
            .and_then(|timeout| Duration::from_std(timeout).ok());

        Self {
            store,
            slots: Mutex::new(HashMap::new()),
            membership: MembershipCache::new(config.membership_cache_ttl),
            idle_timeout,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// 配信設定を開始する
    ///
    /// 進行中のウィザードがあれば破棄して最初からやり直す。
    ///
    /// # 引数
    /// * `user_id` - 利用者ID
    /// * `subscription_type` - 配信対象のレポート種別
    ///
    /// # 戻り値
    /// 配信周期の選択プロンプト、または種別が不正な場合はバリデーションエラー
    pub async fn handle_subscribe_start(
        &self,
        user_id: UserId,
        subscription_type: &str,
    ) -> AppResult<WizardResponse> {
        let subscription_type = validate_subscription_type(subscription_type)?;
        let slot = self.slot(user_id)?;
        let mut current = slot.lock().await;

        if let Some(previous) = current.as_ref() {
            log::info!(
                "進行中のウィザードを破棄して再開始: user_id={user_id}, wizard_id={}, step={}",
                previous.wizard_id(),
                previous.step()
            );
        }

        let state = ConversationState::start(user_id, subscription_type, Utc::now());
        log::info!(
            "ウィザードを開始: user_id={user_id}, type={}, wizard_id={}",
            state.subscription_type(),
            state.wizard_id()
        );

        let response = messages::prompt_for(&state, None);
        *current = Some(state);
        Ok(response)
    }

    /// 進行中のウィザードへの入力を処理する
    ///
    /// 入力エラーは同じ段階の再プロンプトとして返し、`Err` にはならない。
    /// 保存に失敗した場合は `StorageUnavailable` を返し、状態は時刻入力の段階に留まる。
    pub async fn handle_wizard_input(
        &self,
        user_id: UserId,
        raw_input: &str,
    ) -> AppResult<WizardResponse> {
        let slot = self.slot(user_id)?;
        let mut current = slot.lock().await;
        self.process_input(&mut current, raw_input).await
    }

    /// プロンプトに付与されたウィザードIDを指定して入力を処理する
    ///
    /// IDが現在のウィザードと一致しない入力（キャンセル・完了・再開始済み）は
    /// 何もせずに `Stale` を返す。
    pub async fn handle_wizard_reply(
        &self,
        user_id: UserId,
        wizard_id: Uuid,
        raw_input: &str,
    ) -> AppResult<WizardResponse> {
        let slot = self.slot(user_id)?;
        let mut current = slot.lock().await;

        let is_live = current
            .as_ref()
            .is_some_and(|state| state.wizard_id() == wizard_id);
        if !is_live {
            log::warn!("古いウィザードへの入力を無視: user_id={user_id}, wizard_id={wizard_id}");
            return Ok(messages::stale());
        }

        self.process_input(&mut current, raw_input).await
    }

    /// 進行中のウィザードをキャンセルする。ストレージには触れない
    pub async fn handle_cancel(&self, user_id: UserId) -> AppResult<WizardResponse> {
        let slot = self.slot(user_id)?;
        let mut current = slot.lock().await;
        Ok(Self::cancel(&mut current))
    }

    /// 保存に失敗した配信設定を、入力済みの時刻で再保存する
    pub async fn handle_retry(&self, user_id: UserId) -> AppResult<WizardResponse> {
        let slot = self.slot(user_id)?;
        let mut current = slot.lock().await;

        let Some(state) = current.as_ref() else {
            return Ok(messages::no_active_wizard());
        };

        match state.pending_spec() {
            Some(spec) => {
                log::info!("保存を再試行: user_id={user_id}, wizard_id={}", state.wizard_id());
                self.save(&mut current, spec).await
            }
            None => Ok(messages::prompt_for(state, None)),
        }
    }

    /// レポート種別を指定して配信を停止する
    ///
    /// 既に存在しない場合も成功として扱う。
    pub async fn handle_unsubscribe(
        &self,
        user_id: UserId,
        subscription_type: &str,
    ) -> AppResult<WizardResponse> {
        let subscription_type = validate_subscription_type(subscription_type)?;
        let slot = self.slot(user_id)?;
        let _serialized = slot.lock().await;

        let outcome = self
            .delete(SubscriptionKey::new(user_id, subscription_type.as_str()))
            .await?;
        Ok(messages::unsubscribed(&subscription_type, outcome))
    }

    /// 一覧の選択トークンで配信を停止する
    ///
    /// # 引数
    /// * `user_id` - 利用者ID
    /// * `token` - `<種別>@<UTC時刻>` 形式の選択トークン
    ///
    /// # 戻り値
    /// 停止結果、またはトークンが不正な場合はバリデーションエラー
    pub async fn handle_unsubscribe_selection(
        &self,
        user_id: UserId,
        token: &str,
    ) -> AppResult<WizardResponse> {
        let token = SelectionToken::parse(token)?;
        let slot = self.slot(user_id)?;
        let _serialized = slot.lock().await;

        let subscription_type = token.subscription_type.clone();
        let utc_time = token.utc_time;
        let found = self
            .run_store(move |store| store.find_by_key(user_id, &subscription_type, utc_time))
            .await?;

        let outcome = match found {
            Some(subscription) => self.delete(subscription.key()).await?,
            None => {
                log::warn!("選択されたサブスクリプションは既に存在しません: user_id={user_id}, token={token}");
                DeleteOutcome::NotFound
            }
        };

        Ok(messages::unsubscribed(&token.subscription_type, outcome))
    }

    /// 配信中のサブスクリプション一覧を返す
    pub async fn handle_list_subscriptions(&self, user_id: UserId) -> AppResult<WizardResponse> {
        let subscriptions = self.list_and_cache(user_id).await?;
        Ok(messages::subscription_list(&subscriptions))
    }

    /// 1件以上のサブスクリプションがあるか
    pub async fn has_active_subscriptions(&self, user_id: UserId) -> AppResult<bool> {
        if let Some(cached) = self.membership.get(user_id) {
            return Ok(cached);
        }

        Ok(!self.list_and_cache(user_id).await?.is_empty())
    }

    /// 利用者のウィザードの現在の段階（ウィザードがなければ `Idle`）
    pub async fn active_step(&self, user_id: UserId) -> AppResult<WizardStep> {
        let slot = self.slot(user_id)?;
        let current = slot.lock().await;
        Ok(current
            .as_ref()
            .map(ConversationState::step)
            .unwrap_or(WizardStep::Idle))
    }

    /// 一定時間入力のないウィザードを破棄する
    ///
    /// # 戻り値
    /// 破棄したウィザードの数。タイムアウト未設定の場合は常に0
    pub async fn expire_idle(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let purged = self.membership.purge_expired();
        if purged > 0 {
            log::debug!("期限切れの購読有無キャッシュを削除: {purged}件");
        }

        let Some(timeout) = self.idle_timeout else {
            return Ok(0);
        };

        let slots: Vec<(UserId, Slot)> = self
            .slots()?
            .iter()
            .map(|(user_id, slot)| (*user_id, Arc::clone(slot)))
            .collect();

        let mut expired = 0;
        for (user_id, slot) in slots {
            let mut current = slot.lock().await;
            if current.as_ref().is_some_and(|state| state.is_idle(now, timeout)) {
                if let Some(state) = current.take() {
                    log::info!(
                        "入力のないウィザードを破棄: user_id={user_id}, wizard_id={}, step={}",
                        state.wizard_id(),
                        state.step()
                    );
                }
                expired += 1;
            }
        }

        // 誰も参照していない空の枠を片付ける
        self.slots()?.retain(|_, slot| {
            Arc::strong_count(slot) > 1
                || slot.try_lock().map(|state| state.is_some()).unwrap_or(true)
        });

        Ok(expired)
    }

    fn slots(&self) -> AppResult<MutexGuard<'_, HashMap<UserId, Slot>>> {
        self.slots
            .lock()
            .map_err(|e| AppError::Concurrency(format!("ウィザード管理のロックエラー: {e}")))
    }

    fn slot(&self, user_id: UserId) -> AppResult<Slot> {
        let mut slots = self.slots()?;
        Ok(Arc::clone(slots.entry(user_id).or_default()))
    }

    /// ストア操作をブロッキングスレッドで実行する
    async fn run_store<T, F>(&self, operation: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> AppResult<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || operation(store.as_ref()))
            .await
            .map_err(|e| AppError::Concurrency(format!("ストレージ処理の実行に失敗: {e}")))?
    }

    /// 一覧を取得して購読有無をキャッシュする
    ///
    /// 書き込み側と同じ利用者ロックを保持したまま読み取りとキャッシュ登録を行う。
    async fn list_and_cache(&self, user_id: UserId) -> AppResult<Vec<Subscription>> {
        let slot = self.slot(user_id)?;
        let _serialized = slot.lock().await;

        let subscriptions = self
            .run_store(move |store| store.list_by_user(user_id))
            .await?;
        self.membership.insert(user_id, !subscriptions.is_empty());
        Ok(subscriptions)
    }

    async fn process_input(
        &self,
        current: &mut Option<ConversationState>,
        raw_input: &str,
    ) -> AppResult<WizardResponse> {
        if messages::is_cancel_input(raw_input) {
            return Ok(Self::cancel(current));
        }

        let Some(state) = current.as_mut() else {
            return Ok(messages::no_active_wizard());
        };

        match state.apply_input(raw_input, Utc::now()) {
            Err(error) => {
                log::warn!(
                    "入力を拒否: user_id={}, step={}, error={error}",
                    state.user_id(),
                    state.step()
                );
                Ok(messages::prompt_for(state, Some(error)))
            }
            Ok(Advance::Next(step)) => {
                log::debug!("ウィザード遷移: user_id={}, step={step}", state.user_id());
                Ok(messages::prompt_for(state, None))
            }
            Ok(Advance::ReadyToSave(spec)) => self.save(current, spec).await,
        }
    }

    /// 保存に成功した場合のみウィザードを終了する
    async fn save(
        &self,
        current: &mut Option<ConversationState>,
        spec: RecurrenceSpec,
    ) -> AppResult<WizardResponse> {
        let Some(state) = current.as_mut() else {
            return Ok(messages::no_active_wizard());
        };

        let new_subscription = NewSubscription {
            key: SubscriptionKey::new(state.user_id(), state.subscription_type()),
            spec,
        };

        let saved = self
            .run_store(move |store| store.upsert(&new_subscription))
            .await;

        match saved {
            Ok(subscription) => {
                self.membership.invalidate(state.user_id());
                state.complete();
                log::info!(
                    "ウィザード完了: user_id={}, wizard_id={}, step={}",
                    state.user_id(),
                    state.wizard_id(),
                    state.step()
                );
                *current = None;
                Ok(messages::completed(subscription))
            }
            Err(e) => {
                log::error!(
                    "サブスクリプションの保存に失敗: user_id={}, wizard_id={}, error={}",
                    state.user_id(),
                    state.wizard_id(),
                    e.details()
                );
                Err(e)
            }
        }
    }

    async fn delete(&self, key: SubscriptionKey) -> AppResult<DeleteOutcome> {
        let user_id = key.user_id;
        let outcome = self.run_store(move |store| store.delete(&key)).await?;
        self.membership.invalidate(user_id);
        Ok(outcome)
    }

    fn cancel(current: &mut Option<ConversationState>) -> WizardResponse {
        match current.take() {
            Some(mut state) => {
                state.cancel();
                log::info!(
                    "ウィザードをキャンセル: user_id={}, wizard_id={}, step={}",
                    state.user_id(),
                    state.wizard_id(),
                    state.step()
                );
                messages::cancelled()
            }
            None => messages::no_active_wizard(),
        }
    }
}

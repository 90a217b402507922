//! 配信設定ウィザード統合テスト
//!
//! SQLiteストアを使用して、ウィザード開始から保存・停止までのエンドツーエンドの動作を検証します。

use super::{WizardController, WizardResponse, WizardStep};
use crate::features::recurrence::{ClockTime, InputError, Periodicity};
use crate::features::subscriptions::{
    SqliteSubscriptionStore, Subscription, SubscriptionStore, UserId,
};
use crate::shared::config::EnvironmentConfig;
use crate::shared::errors::AppError;
use chrono::{TimeZone, Utc};
use std::sync::Arc;

/// テスト用のコントローラーを作成（インメモリDB）
fn create_test_controller() -> (Arc<SqliteSubscriptionStore>, WizardController<SqliteSubscriptionStore>) {
    let store = Arc::new(
        SqliteSubscriptionStore::open_in_memory().expect("テスト用データベースの作成に失敗"),
    );
    let controller = WizardController::new(Arc::clone(&store));
    (store, controller)
}

/// ウィザードを開始して入力を順に流し込み、最後の応答を返す
async fn run_wizard(
    controller: &WizardController<SqliteSubscriptionStore>,
    user_id: UserId,
    subscription_type: &str,
    inputs: &[&str],
) -> WizardResponse {
    let mut response = controller
        .handle_subscribe_start(user_id, subscription_type)
        .await
        .expect("ウィザード開始に失敗");

    for input in inputs {
        response = controller
            .handle_wizard_input(user_id, input)
            .await
            .expect("入力処理に失敗");
    }

    response
}

fn completed_subscription(response: WizardResponse) -> Subscription {
    match response {
        WizardResponse::Completed { subscription, .. } => subscription,
        other => panic!("保存完了を期待しましたが {other:?} でした"),
    }
}

/// 統合テスト: 毎週・水曜日・UTC+3・09:00 は UTC 06:00 で保存される
#[tokio::test]
async fn test_weekly_wizard_stores_normalized_time() {
    let (store, controller) = create_test_controller();

    let response = run_wizard(&controller, 42, "revenue", &["weekly", "2", "+3", "09:00"]).await;
    let subscription = completed_subscription(response);

    assert_eq!(subscription.spec.periodicity(), Periodicity::Weekly);
    assert_eq!(subscription.spec.weekday(), Some(2));
    assert_eq!(subscription.spec.utc_time(), ClockTime::new(6, 0).unwrap());

    let stored = store.list_by_user(42).expect("一覧取得に失敗");
    assert_eq!(stored, vec![subscription]);
    assert_eq!(controller.active_step(42).await.unwrap(), WizardStep::Idle);
}

/// 統合テスト: 23:30 (UTC-5) は翌日 04:30 UTC に繰り越される
#[tokio::test]
async fn test_rollover_into_next_day() {
    let (_store, controller) = create_test_controller();

    let response = run_wizard(&controller, 7, "inventory", &["daily", "-5", "23:30"]).await;
    let subscription = completed_subscription(response);

    assert_eq!(subscription.spec.utc_time(), ClockTime::new(4, 30).unwrap());
}

/// 統合テスト: 日付 "32" は拒否され、同じ段階に留まり何も保存されない
#[tokio::test]
async fn test_invalid_day_of_month_reprompts() {
    let (store, controller) = create_test_controller();

    let response = run_wizard(&controller, 42, "revenue", &["monthly", "32"]).await;

    match &response {
        WizardResponse::Prompt { step, error, .. } => {
            assert_eq!(*step, WizardStep::ChoosingAnchor);
            assert_eq!(
                error.as_ref(),
                Some(&InputError::InvalidDayOfMonth("32".to_string()))
            );
        }
        other => panic!("再プロンプトを期待しましたが {other:?} でした"),
    }
    assert!(store.list_by_user(42).unwrap().is_empty());

    // 正しい日付で続行できる
    let response = controller.handle_wizard_input(42, "31").await.unwrap();
    assert!(matches!(
        response,
        WizardResponse::Prompt {
            step: WizardStep::ChoosingOffset,
            ..
        }
    ));
}

/// 統合テスト: 同じ種別の再設定は置換され、重複しない
#[tokio::test]
async fn test_resubscribe_replaces_existing() {
    let (store, controller) = create_test_controller();

    run_wizard(&controller, 42, "revenue", &["daily", "+3", "09:00"]).await;
    let replaced = completed_subscription(
        run_wizard(&controller, 42, "revenue", &["workdays", "+3", "18:45"]).await,
    );

    let stored = store.list_by_user(42).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0], replaced);
    assert_eq!(stored[0].spec.periodicity(), Periodicity::Workdays);
    assert_eq!(stored[0].spec.utc_time(), ClockTime::new(15, 45).unwrap());
}

/// 統合テスト: 2段階まで進めてキャンセルしても保存内容は変わらない
#[tokio::test]
async fn test_cancel_has_no_storage_effect() {
    let (store, controller) = create_test_controller();
    run_wizard(&controller, 42, "inventory", &["daily", "0", "08:00"]).await;
    let before = store.list_by_user(42).unwrap();

    run_wizard(&controller, 42, "revenue", &["weekly", "4"]).await;
    let response = controller.handle_cancel(42).await.unwrap();

    assert!(matches!(response, WizardResponse::Cancelled { .. }));
    assert_eq!(store.list_by_user(42).unwrap(), before);

    // キャンセル後の入力は何もしない
    let response = controller.handle_wizard_input(42, "+3").await.unwrap();
    assert!(matches!(response, WizardResponse::NoActiveWizard { .. }));
    assert_eq!(store.list_by_user(42).unwrap(), before);
}

/// 統合テスト: 再開始すると進行中の入力は破棄される
#[tokio::test]
async fn test_restart_discards_progress() {
    let (_store, controller) = create_test_controller();
    run_wizard(&controller, 42, "revenue", &["monthly", "15", "+9"]).await;

    let response = controller.handle_subscribe_start(42, "revenue").await.unwrap();

    assert!(matches!(
        response,
        WizardResponse::Prompt {
            step: WizardStep::ChoosingPeriodicity,
            ..
        }
    ));
    let response = controller.handle_wizard_input(42, "daily").await.unwrap();
    assert!(matches!(
        response,
        WizardResponse::Prompt {
            step: WizardStep::ChoosingOffset,
            ..
        }
    ));
}

/// 統合テスト: 一覧の選択トークンで停止でき、二重停止も成功扱い
#[tokio::test]
async fn test_list_and_unsubscribe_by_selection() {
    let (store, controller) = create_test_controller();
    run_wizard(&controller, 42, "revenue", &["weekly", "水曜日", "+3", "09:00"]).await;
    run_wizard(&controller, 42, "inventory", &["monthly", "1", "UTC-3,5", "07:00"]).await;

    let WizardResponse::Subscriptions { items, text } =
        controller.handle_list_subscriptions(42).await.unwrap()
    else {
        panic!("一覧であるべき");
    };

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].label, "棚卸 (毎月) - 1日 - 07:00 (UTC-3:30)");
    assert_eq!(items[0].token, "inventory@10:30");
    assert_eq!(items[1].label, "売上分析 (毎週) - 水曜日 - 09:00 (UTC+3)");
    assert_eq!(items[1].token, "revenue@06:00");
    assert!(text.contains("売上分析"));

    let response = controller
        .handle_unsubscribe_selection(42, &items[1].token)
        .await
        .unwrap();
    assert!(matches!(
        response,
        WizardResponse::Unsubscribed { existed: true, .. }
    ));
    assert!(store
        .find_by_key(42, "revenue", ClockTime::new(6, 0).unwrap())
        .unwrap()
        .is_none());

    let response = controller
        .handle_unsubscribe_selection(42, &items[1].token)
        .await
        .unwrap();
    assert!(matches!(
        response,
        WizardResponse::Unsubscribed { existed: false, .. }
    ));
    assert_eq!(store.list_by_user(42).unwrap().len(), 1);
}

/// 統合テスト: 存在しない種別の停止もエラーにならない
#[tokio::test]
async fn test_unsubscribe_missing_is_success() {
    let (_store, controller) = create_test_controller();

    let response = controller.handle_unsubscribe(42, "revenue").await.unwrap();

    assert!(matches!(
        response,
        WizardResponse::Unsubscribed { existed: false, .. }
    ));
    let WizardResponse::Subscriptions { items, .. } =
        controller.handle_list_subscriptions(42).await.unwrap()
    else {
        panic!("一覧であるべき");
    };
    assert!(items.is_empty());
}

/// 統合テスト: 別々の利用者のウィザードは並行に進み、互いに干渉しない
#[tokio::test]
async fn test_concurrent_users_are_independent() {
    let (store, controller) = create_test_controller();

    let wizards = (1..=20).map(|user_id| {
        let controller = &controller;
        async move {
            let hour = format!("{:02}:00", user_id % 24);
            completed_subscription(
                run_wizard(controller, user_id, "revenue", &["daily", "0", hour.as_str()]).await,
            )
        }
    });
    let results = futures::future::join_all(wizards).await;

    assert_eq!(results.len(), 20);
    for subscription in results {
        let stored = store.list_by_user(subscription.user_id).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(
            stored[0].spec.utc_time().hour() as i64,
            subscription.user_id % 24
        );
    }
}

/// 統合テスト: 同じ利用者の入力は直列に処理される
#[tokio::test]
async fn test_same_user_inputs_are_serialized() {
    let (store, controller) = create_test_controller();
    controller.handle_subscribe_start(42, "revenue").await.unwrap();
    controller.handle_wizard_input(42, "daily").await.unwrap();
    controller.handle_wizard_input(42, "0").await.unwrap();

    // 同時に2つの時刻が届いても、保存は1回だけ
    let (first, second) = futures::join!(
        controller.handle_wizard_input(42, "09:00"),
        controller.handle_wizard_input(42, "10:00")
    );

    let outcomes = [first.unwrap(), second.unwrap()];
    let completed = outcomes
        .iter()
        .filter(|r| matches!(r, WizardResponse::Completed { .. }))
        .count();
    let idle = outcomes
        .iter()
        .filter(|r| matches!(r, WizardResponse::NoActiveWizard { .. }))
        .count();
    assert_eq!((completed, idle), (1, 1));
    assert_eq!(store.list_by_user(42).unwrap().len(), 1);
}

/// 統合テスト: 保存内容が配信対象の抽出に反映される
#[tokio::test]
async fn test_completed_subscription_is_due() {
    let (store, controller) = create_test_controller();
    run_wizard(&controller, 42, "revenue", &["weekly", "2", "+3", "09:00"]).await;

    // 2026-10-14 は水曜日。UTC 06:00 はローカル 09:00
    let due = store
        .list_due(Utc.with_ymd_and_hms(2026, 10, 14, 6, 0, 0).unwrap())
        .unwrap();
    assert_eq!(due.len(), 1);

    let not_due = store
        .list_due(Utc.with_ymd_and_hms(2026, 10, 15, 6, 0, 0).unwrap())
        .unwrap();
    assert!(not_due.is_empty());
}

/// 統合テスト: ファイルDBを使った bootstrap からの一連の流れ
#[tokio::test]
async fn test_bootstrap_with_file_database() {
    let temp_dir = tempfile::tempdir().expect("一時ディレクトリの作成に失敗");
    let config = EnvironmentConfig::for_database(temp_dir.path().join("mailing.db"));

    let controller = crate::bootstrap(&config).expect("初期化に失敗");
    run_wizard(&controller, 42, "revenue", &["daily", "+9", "08:00"]).await;

    assert!(controller.has_active_subscriptions(42).await.unwrap());
    assert!(matches!(
        controller.handle_subscribe_start(42, "").await,
        Err(AppError::Validation(_))
    ));
}

//! Post and daily settlement tests: ledger idempotency and state transitions.

mod common;

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use promoguard::config::SettlementConfig;
use promoguard::fraud::UserClassifier;
use promoguard::settlement::{PostSettlement, SettlementEngine};
use promoguard::storage::SeaOrmStorage;
use promoguard::storage::models::{
    BotAnalysisStatus, BotDetectionLevel, DailyPayoutStatus, FetchStatus, SettlementStatus,
    SocialPlatform, UserStatus,
};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    sea_query::Expr,
};

use common::*;
use migration::entities::{promotion, promotion_post, transaction, user_daily_metric};

const URL: &str = "https://www.instagram.com/reel/Cx1AbCdEfGh/";

fn engine(storage: Arc<SeaOrmStorage>) -> SettlementEngine {
    SettlementEngine::new(storage, SettlementConfig::default()).unwrap()
}

async fn seed_normal_post(storage: &SeaOrmStorage, id: &str, views: i64) {
    let mut post = new_post(id, "promotion-1", SocialPlatform::Instagram, URL);
    post.fetch_status = Set(FetchStatus::FetchedSuccess.as_str().to_string());
    post.bot_analysis_status = Set(BotAnalysisStatus::Normal.as_str().to_string());
    insert_post(storage, post).await;
    add_snapshot(storage, id, views, views / 20, Utc::now()).await;
}

async fn transaction_count(storage: &SeaOrmStorage) -> u64 {
    transaction::Entity::find()
        .count(storage.get_db())
        .await
        .unwrap()
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 15).unwrap()
}

// =============================================================================
// Post settlement
// =============================================================================

#[tokio::test]
async fn test_paid_post_credits_promoter_once() {
    let (storage, _dir) = create_temp_storage().await;
    seed_approved_promotion(&storage, 0.333).await;
    seed_normal_post(&storage, "post-1", 1_234).await;

    let engine = engine(storage.clone());
    let outcome = engine.settle_post("post-1").await.unwrap();
    let PostSettlement::Paid {
        transaction_id,
        amount_idr,
    } = outcome
    else {
        panic!("expected payout, got {:?}", outcome);
    };
    assert_eq!(amount_idr, 410.92);

    let post = load_post(&storage, "post-1").await;
    assert_eq!(post.settlement_status, SettlementStatus::Paid.as_str());
    assert_eq!(post.payout_transaction_id.as_deref(), Some(transaction_id.as_str()));
    assert_eq!(post.calculated_earnings_idr, 410.92);

    let tx = transaction::Entity::find_by_id(transaction_id.clone())
        .one(storage.get_db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tx.user_id, "promoter-1");
    assert_eq!(tx.tx_type, "EARNING");
    assert_eq!(tx.status, "COMPLETED");
    assert_eq!(tx.reference_type, "PromotionPost");
    assert_eq!(tx.reference_id, "post-1");
    assert!(tx.processed_at.is_some());

    let promoter = load_user(&storage, "promoter-1").await;
    assert_eq!(promoter.balance_idr, 410.92);
    assert_eq!(promoter.total_earned_idr, 410.92);

    let promotion = promotion::Entity::find_by_id("promotion-1".to_string())
        .one(storage.get_db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(promotion.calculated_earnings_idr, 410.92);

    // 重放不产生新的账本记录
    assert_eq!(
        engine.settle_post("post-1").await.unwrap(),
        PostSettlement::AlreadySettled(SettlementStatus::Paid)
    );
    assert_eq!(transaction_count(&storage).await, 1);
    assert_eq!(load_user(&storage, "promoter-1").await.balance_idr, 410.92);
}

#[tokio::test]
async fn test_zero_views_settle_without_ledger_entry() {
    let (storage, _dir) = create_temp_storage().await;
    seed_approved_promotion(&storage, 5.0).await;
    seed_normal_post(&storage, "post-1", 0).await;

    let outcome = engine(storage.clone()).settle_post("post-1").await.unwrap();
    assert_eq!(outcome, PostSettlement::ZeroPayout);

    let post = load_post(&storage, "post-1").await;
    assert_eq!(post.settlement_status, SettlementStatus::Paid.as_str());
    assert_eq!(post.calculated_earnings_idr, 0.0);
    assert!(post.payout_transaction_id.is_none());
    assert_eq!(transaction_count(&storage).await, 0);
    assert_eq!(load_user(&storage, "promoter-1").await.balance_idr, 0.0);
}

#[tokio::test]
async fn test_inactive_promoter_is_rejected() {
    let (storage, _dir) = create_temp_storage().await;
    seed_user(&storage, "promoter-1", UserStatus::Suspended).await;
    seed_campaign(&storage, "campaign-1", 1.0).await;
    seed_promotion(
        &storage,
        "promotion-1",
        "campaign-1",
        "promoter-1",
        promoguard::storage::models::PromotionStatus::Approved,
    )
    .await;
    seed_normal_post(&storage, "post-1", 1_000).await;

    let outcome = engine(storage.clone()).settle_post("post-1").await.unwrap();
    assert!(matches!(outcome, PostSettlement::Rejected(_)));

    let post = load_post(&storage, "post-1").await;
    assert_eq!(post.settlement_status, SettlementStatus::PayoutRejected.as_str());
    assert_eq!(
        post.error_message.as_deref(),
        Some("Promoter status is SUSPENDED.")
    );
    assert_eq!(transaction_count(&storage).await, 0);
}

#[tokio::test]
async fn test_missing_snapshot_is_data_error_and_retried() {
    let (storage, _dir) = create_temp_storage().await;
    seed_approved_promotion(&storage, 1.0).await;
    let mut post = new_post("post-1", "promotion-1", SocialPlatform::Instagram, URL);
    post.fetch_status = Set(FetchStatus::FetchedSuccess.as_str().to_string());
    post.bot_analysis_status = Set(BotAnalysisStatus::Normal.as_str().to_string());
    insert_post(&storage, post).await;

    let engine = engine(storage.clone());
    let outcome = engine.settle_post("post-1").await.unwrap();
    assert!(matches!(outcome, PostSettlement::DataError(_)));
    assert_eq!(
        load_post(&storage, "post-1").await.settlement_status,
        SettlementStatus::PayoutErrorData.as_str()
    );

    // 数据补齐后下一轮重新挑选
    add_snapshot(&storage, "post-1", 200, 10, Utc::now()).await;
    let report = engine.settle_pending_posts().await.unwrap();
    assert_eq!(report.selected, 1);
    assert_eq!(report.paid, 1);
    assert_eq!(report.total_paid_idr, 200.0);
}

#[tokio::test]
async fn test_only_normal_posts_are_eligible() {
    let (storage, _dir) = create_temp_storage().await;
    seed_approved_promotion(&storage, 1.0).await;
    seed_normal_post(&storage, "post-ok", 100).await;

    let mut suspicious = new_post("post-sus", "promotion-1", SocialPlatform::Instagram, URL);
    suspicious.fetch_status = Set(FetchStatus::FetchedSuccess.as_str().to_string());
    suspicious.bot_analysis_status = Set(BotAnalysisStatus::Suspicious.as_str().to_string());
    insert_post(&storage, suspicious).await;

    let mut tx_error = new_post("post-err", "promotion-1", SocialPlatform::Instagram, URL);
    tx_error.fetch_status = Set(FetchStatus::FetchedSuccess.as_str().to_string());
    tx_error.bot_analysis_status = Set(BotAnalysisStatus::Normal.as_str().to_string());
    tx_error.settlement_status = Set(SettlementStatus::PayoutErrorTx.as_str().to_string());
    insert_post(&storage, tx_error).await;

    let engine = engine(storage.clone());
    let eligible = engine.eligible_posts().await.unwrap();
    assert_eq!(eligible.len(), 1);
    assert_eq!(eligible[0].id, "post-ok");

    assert!(matches!(
        engine.settle_post("post-sus").await.unwrap(),
        PostSettlement::NotEligible(_)
    ));
    assert!(matches!(
        engine.settle_post("post-err").await.unwrap(),
        PostSettlement::NotEligible(_)
    ));
    assert!(engine.settle_post("missing").await.is_err());
}

#[tokio::test]
async fn test_unapproved_promotion_is_not_settled() {
    let (storage, _dir) = create_temp_storage().await;
    seed_approved_promotion(&storage, 1.0).await;
    seed_normal_post(&storage, "post-1", 100).await;

    promotion::Entity::update_many()
        .col_expr(promotion::Column::Status, Expr::value("UNDER_REVIEW"))
        .exec(storage.get_db())
        .await
        .unwrap();

    let engine = engine(storage.clone());
    assert!(engine.eligible_posts().await.unwrap().is_empty());
    assert!(matches!(
        engine.settle_post("post-1").await.unwrap(),
        PostSettlement::NotEligible(_)
    ));
    assert_eq!(
        load_post(&storage, "post-1").await.settlement_status,
        SettlementStatus::Unpaid.as_str()
    );
}

/// 让 users 表的任何更新都失败，模拟入账事务中途出错
async fn fail_balance_updates(storage: &SeaOrmStorage) {
    storage
        .get_db()
        .execute_unprepared(
            "CREATE TRIGGER fail_balance_update BEFORE UPDATE ON users \
             BEGIN SELECT RAISE(ABORT, 'balance update rejected'); END;",
        )
        .await
        .unwrap();
}

async fn restore_balance_updates(storage: &SeaOrmStorage) {
    storage
        .get_db()
        .execute_unprepared("DROP TRIGGER fail_balance_update;")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_failed_ledger_write_rolls_back_and_parks_post() {
    let (storage, _dir) = create_temp_storage().await;
    seed_approved_promotion(&storage, 1.0).await;
    seed_normal_post(&storage, "post-1", 500).await;
    fail_balance_updates(&storage).await;

    let engine = engine(storage.clone());
    let report = engine.settle_pending_posts().await.unwrap();
    assert_eq!(report.selected, 1);
    assert_eq!(report.errors, 1);
    assert_eq!(report.paid, 0);
    assert_eq!(report.total_paid_idr, 0.0);

    // EARNING 记录与余额一起回滚
    assert_eq!(transaction_count(&storage).await, 0);
    let promoter = load_user(&storage, "promoter-1").await;
    assert_eq!(promoter.balance_idr, 0.0);
    assert_eq!(promoter.total_earned_idr, 0.0);

    let post = load_post(&storage, "post-1").await;
    assert_eq!(post.settlement_status, SettlementStatus::PayoutErrorTx.as_str());
    assert!(
        post.error_message
            .as_deref()
            .is_some_and(|m| m.starts_with("Payout transaction failed"))
    );
    assert!(post.payout_transaction_id.is_none());
    assert_eq!(post.calculated_earnings_idr, 0.0);

    // 故障消失后也不会被自动重选
    restore_balance_updates(&storage).await;
    assert!(engine.eligible_posts().await.unwrap().is_empty());
    let report = engine.settle_pending_posts().await.unwrap();
    assert_eq!(report.selected, 0);
    assert!(matches!(
        engine.settle_post("post-1").await.unwrap(),
        PostSettlement::NotEligible(_)
    ));
    assert_eq!(transaction_count(&storage).await, 0);
}

#[tokio::test]
async fn test_failed_zero_payout_completion_releases_lease() {
    let (storage, _dir) = create_temp_storage().await;
    seed_approved_promotion(&storage, 5.0).await;
    seed_normal_post(&storage, "post-1", 0).await;
    storage
        .get_db()
        .execute_unprepared(
            "CREATE TRIGGER fail_mark_paid BEFORE UPDATE OF settlement_status ON promotion_posts \
             WHEN NEW.settlement_status = 'PAID' \
             BEGIN SELECT RAISE(ABORT, 'post update rejected'); END;",
        )
        .await
        .unwrap();

    let outcome = engine(storage.clone()).settle_post("post-1").await.unwrap();
    let PostSettlement::TxError(reason) = outcome else {
        panic!("expected transaction error, got {:?}", outcome);
    };
    assert!(reason.starts_with("Zero payout completion failed"));

    let post = load_post(&storage, "post-1").await;
    assert_eq!(post.settlement_status, SettlementStatus::PayoutErrorTx.as_str());
    assert_eq!(post.error_message.as_deref(), Some(reason.as_str()));
    assert_eq!(transaction_count(&storage).await, 0);
}

#[tokio::test]
async fn test_interrupted_processing_lease_is_recovered() {
    let (storage, _dir) = create_temp_storage().await;
    seed_approved_promotion(&storage, 1.0).await;
    seed_normal_post(&storage, "post-stale", 100).await;
    seed_normal_post(&storage, "post-busy", 100).await;

    let now = Utc::now();
    for (id, leased_at) in [
        ("post-stale", now - Duration::hours(2)),
        ("post-busy", now - Duration::minutes(1)),
    ] {
        promotion_post::Entity::update_many()
            .col_expr(
                promotion_post::Column::SettlementStatus,
                Expr::value(SettlementStatus::PayoutProcessing.as_str()),
            )
            .col_expr(promotion_post::Column::UpdatedAt, Expr::value(leased_at))
            .filter(promotion_post::Column::Id.eq(id))
            .exec(storage.get_db())
            .await
            .unwrap();
    }

    let engine = engine(storage.clone());
    let report = engine.settle_pending_posts().await.unwrap();
    assert_eq!(report.stale_recovered, 1);
    assert_eq!(report.selected, 0);

    let stale = load_post(&storage, "post-stale").await;
    assert_eq!(stale.settlement_status, SettlementStatus::PayoutErrorTx.as_str());
    assert!(stale.error_message.unwrap().contains("interrupted"));
    assert_eq!(
        load_post(&storage, "post-busy").await.settlement_status,
        SettlementStatus::PayoutProcessing.as_str()
    );
    assert_eq!(transaction_count(&storage).await, 0);
    assert_eq!(load_user(&storage, "promoter-1").await.balance_idr, 0.0);

    // 已恢复的帖子不再被扫描
    assert_eq!(engine.recover_stale_processing(Utc::now()).await.unwrap(), 0);
}

// =============================================================================
// Daily settlement
// =============================================================================

#[tokio::test]
async fn test_daily_settlement_paths() {
    let (storage, _dir) = create_temp_storage().await;
    seed_user(&storage, "user-ok", UserStatus::Active).await;
    seed_user(&storage, "user-flagged", UserStatus::Active).await;
    seed_user(&storage, "user-banned", UserStatus::Banned).await;
    seed_user(&storage, "user-new", UserStatus::Active).await;

    let ok = seed_daily_metric(&storage, "user-ok", day(), 2.5).await;
    let flagged = seed_daily_metric(&storage, "user-flagged", day(), 15.0).await;
    let banned = seed_daily_metric(&storage, "user-banned", day(), 3.0).await;
    let awaiting = seed_daily_metric(&storage, "user-new", day(), 1.0).await;

    user_daily_metric::Entity::update_many()
        .col_expr(
            user_daily_metric::Column::BotDetectionLevel,
            Expr::value(BotDetectionLevel::WarningLevelB.as_str()),
        )
        .col_expr(user_daily_metric::Column::IsPayoutAllowed, Expr::value(false))
        .filter(user_daily_metric::Column::Id.eq(flagged))
        .exec(storage.get_db())
        .await
        .unwrap();
    user_daily_metric::Entity::update_many()
        .col_expr(
            user_daily_metric::Column::ClassifiedAt,
            Expr::value(Option::<DateTime<Utc>>::None),
        )
        .filter(user_daily_metric::Column::Id.eq(awaiting))
        .exec(storage.get_db())
        .await
        .unwrap();

    let engine = engine(storage.clone());
    let report = engine.settle_day(day()).await.unwrap();
    assert_eq!(report.selected, 4);
    assert_eq!(report.paid, 1);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.awaiting_detection, 1);
    assert_eq!(report.errors, 0);
    assert_eq!(report.total_paid_idr, 25.0);

    let ok_row = load_daily_metric(&storage, ok).await;
    assert_eq!(ok_row.payout_status, DailyPayoutStatus::Paid.as_str());
    assert_eq!(ok_row.total_payout_idr, 25.0);
    let tx_id = ok_row.payout_transaction_id.unwrap();
    let tx = transaction::Entity::find()
        .filter(transaction::Column::ReferenceType.eq("UserDailyMetric"))
        .filter(transaction::Column::ReferenceId.eq(ok.to_string()))
        .one(storage.get_db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tx.id, tx_id);
    assert_eq!(load_user(&storage, "user-ok").await.balance_idr, 25.0);

    for id in [flagged, banned] {
        assert_eq!(
            load_daily_metric(&storage, id).await.payout_status,
            DailyPayoutStatus::Skipped.as_str()
        );
    }
    assert_eq!(
        load_daily_metric(&storage, awaiting).await.payout_status,
        DailyPayoutStatus::Unpaid.as_str()
    );

    // 再次运行只剩等待判定的那一行
    let again = engine.settle_day(day()).await.unwrap();
    assert_eq!(again.selected, 1);
    assert_eq!(again.paid, 0);
    assert_eq!(transaction_count(&storage).await, 1);
}

#[tokio::test]
async fn test_daily_payout_can_be_disabled() {
    let (storage, _dir) = create_temp_storage().await;
    seed_user(&storage, "user-ok", UserStatus::Active).await;
    let id = seed_daily_metric(&storage, "user-ok", day(), 2.5).await;

    let config = SettlementConfig {
        daily_payout_enabled: false,
        ..SettlementConfig::default()
    };
    let engine = SettlementEngine::new(storage.clone(), config).unwrap();
    let report = engine.settle_day(day()).await.unwrap();
    assert_eq!(report.selected, 0);
    assert_eq!(
        load_daily_metric(&storage, id).await.payout_status,
        DailyPayoutStatus::Unpaid.as_str()
    );
}

#[tokio::test]
async fn test_unknown_formula_is_rejected() {
    let (storage, _dir) = create_temp_storage().await;
    let config = SettlementConfig {
        formula: "per_share".to_string(),
        ..SettlementConfig::default()
    };
    assert!(SettlementEngine::new(storage, config).is_err());
}

#[tokio::test]
async fn test_failed_daily_ledger_write_is_parked() {
    let (storage, _dir) = create_temp_storage().await;
    seed_user(&storage, "user-ok", UserStatus::Active).await;
    let id = seed_daily_metric(&storage, "user-ok", day(), 2.5).await;
    fail_balance_updates(&storage).await;

    let engine = engine(storage.clone());
    let report = engine.settle_day(day()).await.unwrap();
    assert_eq!(report.selected, 1);
    assert_eq!(report.errors, 1);
    assert_eq!(report.paid, 0);
    assert_eq!(report.total_paid_idr, 0.0);

    let row = load_daily_metric(&storage, id).await;
    assert_eq!(row.payout_status, DailyPayoutStatus::PayoutErrorTx.as_str());
    assert!(row.payout_transaction_id.is_none());
    assert_eq!(row.total_payout_idr, 0.0);
    assert_eq!(transaction_count(&storage).await, 0);
    assert_eq!(load_user(&storage, "user-ok").await.balance_idr, 0.0);

    restore_balance_updates(&storage).await;
    let report = engine.settle_day(day()).await.unwrap();
    assert_eq!(report.selected, 0);
    assert_eq!(transaction_count(&storage).await, 0);
}

#[tokio::test]
async fn test_daily_row_pays_only_after_classification() {
    let (storage, _dir) = create_temp_storage().await;
    seed_user(&storage, "user-ok", UserStatus::Active).await;
    let id = seed_daily_metric(&storage, "user-ok", day(), 2.5).await;
    user_daily_metric::Entity::update_many()
        .col_expr(
            user_daily_metric::Column::ClassifiedAt,
            Expr::value(Option::<DateTime<Utc>>::None),
        )
        .filter(user_daily_metric::Column::Id.eq(id))
        .exec(storage.get_db())
        .await
        .unwrap();

    let engine = engine(storage.clone());
    let report = engine.settle_day(day()).await.unwrap();
    assert_eq!(report.awaiting_detection, 1);
    assert_eq!(report.paid, 0);

    UserClassifier::new(storage.clone())
        .classify_day(day())
        .await
        .unwrap();
    let row = load_daily_metric(&storage, id).await;
    assert!(row.classified_at.is_some());
    // 判定结果的文字描述不影响结算
    assert!(row.bot_detection_reason.is_some());

    let report = engine.settle_day(day()).await.unwrap();
    assert_eq!(report.awaiting_detection, 0);
    assert_eq!(report.paid, 1);
    assert_eq!(load_user(&storage, "user-ok").await.balance_idr, 25.0);
}

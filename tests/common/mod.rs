//! Shared fixtures for integration tests
//!
//! Every test gets its own temporary SQLite database with migrations (and the
//! seeded thresholds) applied.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use promoguard::config::DatabaseConfig;
use promoguard::platforms::PlatformMetrics;
use promoguard::storage::SeaOrmStorage;
use promoguard::storage::models::{
    BotAnalysisStatus, BotDetectionLevel, DailyPayoutStatus, FetchStatus, PromotionStatus,
    SettlementStatus, SocialPlatform, UserStatus,
};
use sea_orm::{ActiveValue::Set, EntityTrait};
use tempfile::TempDir;

use migration::entities::{
    campaign, platform_credential, promotion, promotion_post, user, user_daily_metric,
};

/// 创建临时 SQLite 数据库的存储实例
pub async fn create_temp_storage() -> (Arc<SeaOrmStorage>, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.db");
    let config = DatabaseConfig {
        database_url: format!("sqlite://{}?mode=rwc", db_path.display()),
        ..Default::default()
    };

    let storage = SeaOrmStorage::new(&config)
        .await
        .expect("Failed to create storage");

    (Arc::new(storage), temp_dir)
}

pub async fn seed_user(storage: &SeaOrmStorage, id: &str, status: UserStatus) {
    let now = Utc::now();
    user::Entity::insert(user::ActiveModel {
        id: Set(id.to_string()),
        email: Set(format!("{}@example.com", id)),
        name: Set(Some(id.to_string())),
        status: Set(status.as_str().to_string()),
        balance_idr: Set(0.0),
        total_earned_idr: Set(0.0),
        created_at: Set(now),
        updated_at: Set(now),
    })
    .exec_without_returning(storage.get_db())
    .await
    .expect("seed user");
}

pub async fn seed_campaign(storage: &SeaOrmStorage, id: &str, rate_per_viewer_idr: f64) {
    campaign::Entity::insert(campaign::ActiveModel {
        id: Set(id.to_string()),
        title: Set(format!("Campaign {}", id)),
        rate_per_viewer_idr: Set(rate_per_viewer_idr),
        status: Set("ACTIVE".to_string()),
        created_at: Set(Utc::now()),
    })
    .exec_without_returning(storage.get_db())
    .await
    .expect("seed campaign");
}

pub async fn seed_promotion(
    storage: &SeaOrmStorage,
    id: &str,
    campaign_id: &str,
    promoter_id: &str,
    status: PromotionStatus,
) {
    let now = Utc::now();
    promotion::Entity::insert(promotion::ActiveModel {
        id: Set(id.to_string()),
        campaign_id: Set(campaign_id.to_string()),
        promoter_id: Set(promoter_id.to_string()),
        status: Set(status.as_str().to_string()),
        calculated_earnings_idr: Set(0.0),
        created_at: Set(now),
        updated_at: Set(now),
    })
    .exec_without_returning(storage.get_db())
    .await
    .expect("seed promotion");
}

/// 新提交的帖子：未抓取、未分析、未结算
pub fn new_post(
    id: &str,
    promotion_id: &str,
    platform: SocialPlatform,
    url: &str,
) -> promotion_post::ActiveModel {
    let now = Utc::now();
    promotion_post::ActiveModel {
        id: Set(id.to_string()),
        promotion_id: Set(promotion_id.to_string()),
        platform: Set(platform.as_str().to_string()),
        post_url: Set(url.to_string()),
        external_post_id: Set(None),
        fetch_status: Set(FetchStatus::NotFetched.as_str().to_string()),
        bot_analysis_status: Set(BotAnalysisStatus::NotAnalyzed.as_str().to_string()),
        settlement_status: Set(SettlementStatus::Unpaid.as_str().to_string()),
        last_checked_at: Set(None),
        next_check_at: Set(None),
        consecutive_failures: Set(0),
        error_message: Set(None),
        bot_analysis_reason: Set(None),
        bot_suspicion_score: Set(None),
        bot_analysis_details: Set(None),
        analyzed_at: Set(None),
        analysis_lease: Set(None),
        payout_transaction_id: Set(None),
        calculated_earnings_idr: Set(0.0),
        submitted_at: Set(now),
        updated_at: Set(now),
    }
}

pub async fn insert_post(storage: &SeaOrmStorage, post: promotion_post::ActiveModel) {
    promotion_post::Entity::insert(post)
        .exec_without_returning(storage.get_db())
        .await
        .expect("seed post");
}

pub async fn seed_credential(
    storage: &SeaOrmStorage,
    user_id: &str,
    platform: SocialPlatform,
    token: &str,
    expires_at: Option<DateTime<Utc>>,
) {
    platform_credential::Entity::insert(platform_credential::ActiveModel {
        id: Set(format!("{}-{}", user_id, platform.provider())),
        user_id: Set(user_id.to_string()),
        provider: Set(platform.provider().to_string()),
        access_token: Set(Some(token.to_string())),
        refresh_token: Set(None),
        expires_at: Set(expires_at),
        created_at: Set(Utc::now()),
    })
    .exec_without_returning(storage.get_db())
    .await
    .expect("seed credential");
}

pub async fn add_snapshot(
    storage: &SeaOrmStorage,
    post_id: &str,
    views: i64,
    likes: i64,
    fetched_at: DateTime<Utc>,
) {
    let metrics = PlatformMetrics {
        views,
        likes,
        comments: likes / 10,
        ..Default::default()
    };
    storage
        .append_snapshot(post_id, &metrics, fetched_at)
        .await
        .expect("append snapshot");
}

pub async fn load_post(storage: &SeaOrmStorage, id: &str) -> promotion_post::Model {
    storage
        .find_post(id)
        .await
        .expect("find post")
        .expect("post exists")
}

pub async fn load_user(storage: &SeaOrmStorage, id: &str) -> user::Model {
    storage
        .find_user(id)
        .await
        .expect("find user")
        .expect("user exists")
}

/// 一个已批准推广下的完整链路：推广者、campaign、promotion
pub async fn seed_approved_promotion(storage: &SeaOrmStorage, rate_per_viewer_idr: f64) {
    seed_user(storage, "promoter-1", UserStatus::Active).await;
    seed_campaign(storage, "campaign-1", rate_per_viewer_idr).await;
    seed_promotion(
        storage,
        "promotion-1",
        "campaign-1",
        "promoter-1",
        PromotionStatus::Approved,
    )
    .await;
}

/// 已判定为 NORMAL、未结算的用户日指标，返回行 ID
pub async fn seed_daily_metric(
    storage: &SeaOrmStorage,
    user_id: &str,
    date: NaiveDate,
    average_per_minute: f64,
) -> i64 {
    let total = (average_per_minute * 1440.0).round() as i64;
    let result = user_daily_metric::Entity::insert(user_daily_metric::ActiveModel {
        user_id: Set(user_id.to_string()),
        date: Set(date),
        total_views: Set(total),
        total_likes: Set(0),
        total_comments: Set(0),
        total_activities: Set(total),
        average_activities_per_minute: Set(average_per_minute),
        bot_detection_level: Set(BotDetectionLevel::Normal.as_str().to_string()),
        bot_detection_reason: Set(None),
        is_payout_allowed: Set(true),
        classified_at: Set(Some(Utc::now())),
        total_payout_idr: Set(0.0),
        payout_status: Set(DailyPayoutStatus::Unpaid.as_str().to_string()),
        payout_transaction_id: Set(None),
        updated_at: Set(Utc::now()),
        ..Default::default()
    })
    .exec(storage.get_db())
    .await
    .expect("seed daily metric");
    result.last_insert_id
}

pub async fn load_daily_metric(storage: &SeaOrmStorage, id: i64) -> user_daily_metric::Model {
    user_daily_metric::Entity::find_by_id(id)
        .one(storage.get_db())
        .await
        .expect("find daily metric")
        .expect("daily metric exists")
}

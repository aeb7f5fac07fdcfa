pub mod activity_log;
pub mod bot_threshold;
pub mod campaign;
pub mod harvest_queue;
pub mod platform_credential;
pub mod platform_metric_snapshot;
pub mod promotion;
pub mod promotion_post;
pub mod transaction;
pub mod user;
pub mod user_daily_metric;
pub mod user_hourly_activity;

pub use activity_log::Entity as ActivityLogEntity;
pub use bot_threshold::Entity as BotThresholdEntity;
pub use campaign::Entity as CampaignEntity;
pub use harvest_queue::Entity as HarvestQueueEntity;
pub use platform_credential::Entity as PlatformCredentialEntity;
pub use platform_metric_snapshot::Entity as PlatformMetricSnapshotEntity;
pub use promotion::Entity as PromotionEntity;
pub use promotion_post::Entity as PromotionPostEntity;
pub use transaction::Entity as TransactionEntity;
pub use user::Entity as UserEntity;
pub use user_daily_metric::Entity as UserDailyMetricEntity;
pub use user_hourly_activity::Entity as UserHourlyActivityEntity;

//! 原始活动事件写入

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue::Set, EntityTrait};
use tracing::debug;

use super::UPSERT_CHUNK;
use crate::errors::Result;
use crate::storage::SeaOrmStorage;
use crate::storage::models::ActivityType;
use migration::entities::activity_log;

#[derive(Debug, Clone)]
pub struct ActivityEvent {
    pub user_id: Option<String>,
    pub promotion_id: Option<String>,
    pub activity_type: ActivityType,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ActivityEvent {
    pub fn new(user_id: impl Into<String>, activity_type: ActivityType, at: DateTime<Utc>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            promotion_id: None,
            activity_type,
            ip_address: None,
            user_agent: None,
            created_at: at,
        }
    }

    pub fn with_promotion(mut self, promotion_id: impl Into<String>) -> Self {
        self.promotion_id = Some(promotion_id.into());
        self
    }
}

pub struct ActivityRecorder {
    storage: Arc<SeaOrmStorage>,
}

impl ActivityRecorder {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        Self { storage }
    }

    /// 批量追加，返回写入条数
    pub async fn record(&self, events: &[ActivityEvent]) -> Result<usize> {
        for chunk in events.chunks(UPSERT_CHUNK) {
            let models = chunk.iter().map(|e| activity_log::ActiveModel {
                user_id: Set(e.user_id.clone()),
                promotion_id: Set(e.promotion_id.clone()),
                activity_type: Set(e.activity_type.as_str().to_string()),
                ip_address: Set(e.ip_address.clone()),
                user_agent: Set(e.user_agent.clone()),
                created_at: Set(e.created_at),
                ..Default::default()
            });
            activity_log::Entity::insert_many(models)
                .exec(self.storage.get_db())
                .await?;
        }
        debug!("Recorded {} activity events", events.len());
        Ok(events.len())
    }
}

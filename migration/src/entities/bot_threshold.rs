//! Calibrated statistical thresholds
//!
//! Rows are versioned: recalibration inserts a new active row and
//! deactivates the previous one for the same name.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "bot_thresholds")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    /// None = applies to every platform
    pub platform: Option<String>,
    /// LIKE_VIEW_RATIO / DAILY_VIEW_INCREASE, None for user-level thresholds
    pub metric_type: Option<String>,
    #[sea_orm(column_type = "Double")]
    pub mean: f64,
    #[sea_orm(column_type = "Double")]
    pub std_dev: f64,
    #[sea_orm(column_type = "Double", nullable)]
    pub lower_bound: Option<f64>,
    #[sea_orm(column_type = "Double", nullable)]
    pub upper_bound: Option<f64>,
    #[sea_orm(column_type = "Double")]
    pub level_a_multiplier: f64,
    #[sea_orm(column_type = "Double")]
    pub level_b_min_multiplier: f64,
    #[sea_orm(column_type = "Double")]
    pub level_b_max_multiplier: f64,
    pub is_active: bool,
    pub version: i32,
    pub sample_size: Option<i32>,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

//! 状态枚举
//!
//! 数据库里统一存大写下划线字符串，Rust 侧用 strum 做双向转换。

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

/// 支持的社交平台
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum SocialPlatform {
    Tiktok,
    Instagram,
    Youtube,
}

impl SocialPlatform {
    /// 凭证表中的 provider 名（小写）
    pub fn provider(self) -> &'static str {
        match self {
            SocialPlatform::Tiktok => "tiktok",
            SocialPlatform::Instagram => "instagram",
            SocialPlatform::Youtube => "youtube",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Active,
    Suspended,
    Banned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PromotionStatus {
    AwaitingMetrics,
    UnderReview,
    Approved,
    Rejected,
    Completed,
}

/// 抓取状态机
///
/// `NOT_FETCHED → FETCHING → {FETCHED_SUCCESS | FETCHED_ERROR_*}`，
/// `FETCHED_ERROR_AUTH` 与 `SUBMIT_INVALID_URL` 为终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FetchStatus {
    NotFetched,
    Fetching,
    FetchedSuccess,
    FetchedErrorAuth,
    FetchedErrorApi,
    FetchedErrorNodata,
    SubmitInvalidUrl,
}

impl FetchStatus {
    /// 调度器永不再自动重试的状态
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            FetchStatus::FetchedErrorAuth | FetchStatus::SubmitInvalidUrl
        )
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BotAnalysisStatus {
    NotAnalyzed,
    AnalyzingPending,
    Analyzing,
    Normal,
    Suspicious,
    BotLikely,
    InsufficientData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStatus {
    Unpaid,
    PayoutProcessing,
    Paid,
    PayoutRejected,
    PayoutErrorData,
    PayoutErrorTx,
}

impl SettlementStatus {
    /// 结算引擎会（重新）挑选的状态；PAYOUT_ERROR_TX 需要人工处理
    pub fn is_selectable(self) -> bool {
        matches!(
            self,
            SettlementStatus::Unpaid | SettlementStatus::PayoutErrorData
        )
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BotDetectionLevel {
    Normal,
    WarningLevelB,
    BannedLevelA,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DailyPayoutStatus {
    Unpaid,
    Paid,
    Skipped,
    PayoutErrorTx,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum ActivityType {
    View,
    Like,
    Comment,
}

/// 帖子级阈值的指标类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ThresholdMetric {
    LikeViewRatio,
    DailyViewIncrease,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Earning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Completed,
}

/// 账本记录指向的对象类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString, IntoStaticStr)]
pub enum ReferenceType {
    PromotionPost,
    UserDailyMetric,
}

macro_rules! impl_as_str {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $ty {
                /// 数据库中存储的字符串
                pub fn as_str(self) -> &'static str {
                    self.into()
                }
            }
        )+
    };
}

impl_as_str!(
    SocialPlatform,
    UserStatus,
    PromotionStatus,
    FetchStatus,
    BotAnalysisStatus,
    SettlementStatus,
    BotDetectionLevel,
    DailyPayoutStatus,
    ActivityType,
    ThresholdMetric,
    TransactionType,
    TransactionStatus,
    ReferenceType,
);

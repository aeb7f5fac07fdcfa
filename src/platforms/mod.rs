//! 社交平台适配器
//!
//! 每个平台一个适配器：给定帖子引用和凭证，返回一次指标读数或带类型的
//! [`FetchError`]。HTTP 调用是同步的 ureq，在 `spawn_blocking` 中执行。

mod transport;
mod instagram;
pub mod post_url;
mod tiktok;
mod youtube;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::PlatformsConfig;
use crate::storage::models::{FetchStatus, SocialPlatform};

pub use instagram::InstagramAdapter;
pub use tiktok::TiktokAdapter;
pub use youtube::YoutubeAdapter;

/// 一次指标读数
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlatformMetrics {
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
    /// 部分平台不提供（YouTube）
    pub shares: Option<i64>,
    /// 原始响应，原样存档
    pub raw_payload: Option<serde_json::Value>,
}

/// 适配器错误分类
#[derive(Debug, Clone, PartialEq)]
pub enum FetchError {
    /// 凭证无效或过期
    Auth(String),
    /// 凭证有效但没有权限
    Forbidden(String),
    NotFound(String),
    /// 请求成功但响应里没有可用指标
    NoData(String),
    RateLimited(String),
    Timeout(String),
    Api { status: Option<u16>, message: String },
    Network(String),
    /// 无法从 URL 解析出平台帖子 ID
    InvalidPostRef(String),
    Unsupported(SocialPlatform),
}

impl FetchError {
    /// 不应再自动重试的错误
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FetchError::Auth(_) | FetchError::Forbidden(_) | FetchError::InvalidPostRef(_)
        )
    }

    /// 帖子上落地的抓取状态
    pub fn fetch_status(&self) -> FetchStatus {
        match self {
            FetchError::Auth(_) | FetchError::Forbidden(_) => FetchStatus::FetchedErrorAuth,
            FetchError::NotFound(_) | FetchError::NoData(_) => FetchStatus::FetchedErrorNodata,
            FetchError::InvalidPostRef(_) => FetchStatus::SubmitInvalidUrl,
            FetchError::RateLimited(_)
            | FetchError::Timeout(_)
            | FetchError::Api { .. }
            | FetchError::Network(_)
            | FetchError::Unsupported(_) => FetchStatus::FetchedErrorApi,
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Auth(msg) => write!(f, "authentication failed: {}", msg),
            FetchError::Forbidden(msg) => write!(f, "access forbidden: {}", msg),
            FetchError::NotFound(msg) => write!(f, "post not found: {}", msg),
            FetchError::NoData(msg) => write!(f, "no metrics returned: {}", msg),
            FetchError::RateLimited(msg) => write!(f, "rate limited: {}", msg),
            FetchError::Timeout(msg) => write!(f, "request timed out: {}", msg),
            FetchError::Api {
                status: Some(code),
                message,
            } => write!(f, "platform API error (HTTP {}): {}", code, message),
            FetchError::Api {
                status: None,
                message,
            } => write!(f, "platform API error: {}", message),
            FetchError::Network(msg) => write!(f, "network error: {}", msg),
            FetchError::InvalidPostRef(url) => write!(f, "cannot resolve post id from {}", url),
            FetchError::Unsupported(platform) => {
                write!(f, "no adapter registered for {}", platform)
            }
        }
    }
}

impl std::error::Error for FetchError {}

/// 调用平台 API 使用的凭证
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// 用户授权的 OAuth access token
    OAuth(String),
    /// 平台级 API key（仅 YouTube 公开视频可用）
    ApiKey(String),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::OAuth(_) => f.write_str("Credential::OAuth(***)"),
            Credential::ApiKey(_) => f.write_str("Credential::ApiKey(***)"),
        }
    }
}

/// 待抓取帖子
#[derive(Debug, Clone)]
pub struct PostRef {
    pub external_id: String,
    pub url: String,
}

#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> SocialPlatform;

    async fn fetch_metrics(
        &self,
        post: &PostRef,
        credential: &Credential,
    ) -> Result<PlatformMetrics, FetchError>;
}

/// 按平台索引的适配器注册表
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<SocialPlatform, Arc<dyn PlatformAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册三个内置平台的 HTTP 适配器
    pub fn from_config(config: &PlatformsConfig, request_timeout: Duration) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TiktokAdapter::new(
            &config.tiktok_api_base,
            request_timeout,
        )));
        registry.register(Arc::new(InstagramAdapter::new(
            &config.instagram_api_base,
            request_timeout,
        )));
        registry.register(Arc::new(YoutubeAdapter::new(
            &config.youtube_api_base,
            request_timeout,
        )));
        registry
    }

    /// 同一平台重复注册时后者覆盖前者
    pub fn register(&mut self, adapter: Arc<dyn PlatformAdapter>) {
        let platform = adapter.platform();
        debug!("Registering platform adapter: {}", platform);
        self.adapters.insert(platform, adapter);
    }

    pub fn get(&self, platform: SocialPlatform) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.get(&platform).cloned()
    }

    /// 通过注册表抓取；未注册的平台返回 `Unsupported`
    pub async fn fetch(
        &self,
        platform: SocialPlatform,
        post: &PostRef,
        credential: &Credential,
    ) -> Result<PlatformMetrics, FetchError> {
        let adapter = self.get(platform).ok_or(FetchError::Unsupported(platform))?;
        adapter.fetch_metrics(post, credential).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedAdapter;

    #[async_trait]
    impl PlatformAdapter for FixedAdapter {
        fn platform(&self) -> SocialPlatform {
            SocialPlatform::Tiktok
        }

        async fn fetch_metrics(
            &self,
            _post: &PostRef,
            _credential: &Credential,
        ) -> Result<PlatformMetrics, FetchError> {
            Ok(PlatformMetrics {
                views: 10,
                ..Default::default()
            })
        }
    }

    fn post() -> PostRef {
        PostRef {
            external_id: "7301".into(),
            url: "https://www.tiktok.com/@a/video/7301".into(),
        }
    }

    #[test]
    fn test_error_to_fetch_status() {
        assert_eq!(
            FetchError::Forbidden("x".into()).fetch_status(),
            FetchStatus::FetchedErrorAuth
        );
        assert_eq!(
            FetchError::NoData("x".into()).fetch_status(),
            FetchStatus::FetchedErrorNodata
        );
        assert_eq!(
            FetchError::RateLimited("x".into()).fetch_status(),
            FetchStatus::FetchedErrorApi
        );
        assert_eq!(
            FetchError::Unsupported(SocialPlatform::Youtube).fetch_status(),
            FetchStatus::FetchedErrorApi
        );
        assert!(FetchError::Auth("x".into()).is_terminal());
        assert!(!FetchError::Timeout("x".into()).is_terminal());
    }

    #[test]
    fn test_credential_debug_hides_secret() {
        let rendered = format!("{:?}", Credential::OAuth("secret-token".into()));
        assert!(!rendered.contains("secret-token"));
    }

    #[tokio::test]
    async fn test_registry_dispatches_by_platform() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(FixedAdapter));

        let cred = Credential::OAuth("t".into());
        let metrics = registry
            .fetch(SocialPlatform::Tiktok, &post(), &cred)
            .await
            .unwrap();
        assert_eq!(metrics.views, 10);

        let err = registry
            .fetch(SocialPlatform::Instagram, &post(), &cred)
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Unsupported(SocialPlatform::Instagram));
    }

    #[test]
    fn test_registry_from_config_covers_all_platforms() {
        let registry =
            AdapterRegistry::from_config(&PlatformsConfig::default(), Duration::from_secs(5));
        assert!(registry.get(SocialPlatform::Tiktok).is_some());
        assert!(registry.get(SocialPlatform::Instagram).is_some());
        assert!(registry.get(SocialPlatform::Youtube).is_some());
    }
}

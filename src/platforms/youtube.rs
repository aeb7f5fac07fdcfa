//! YouTube Data API v3 适配器
//!
//! 支持 OAuth Bearer token 与 API key 两种凭证。

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use ureq::Agent;

use super::transport::{RawResponse, build_agent, classify_status, json_count, read_response, run_blocking};
use super::{Credential, FetchError, PlatformAdapter, PlatformMetrics, PostRef};
use crate::storage::models::SocialPlatform;

pub struct YoutubeAdapter {
    agent: Agent,
    api_base: String,
    request_timeout: Duration,
}

impl YoutubeAdapter {
    pub fn new(api_base: &str, request_timeout: Duration) -> Self {
        Self {
            agent: build_agent(request_timeout),
            api_base: api_base.trim_end_matches('/').to_string(),
            request_timeout,
        }
    }
}

pub(crate) fn parse_response(
    response: &RawResponse,
    video_id: &str,
) -> Result<PlatformMetrics, FetchError> {
    if let Some(err) = classify_status(response.status, &response.body) {
        // 配额耗尽同样返回 403
        if response.status == 403
            && (response.body.contains("quotaExceeded")
                || response.body.contains("rateLimitExceeded"))
        {
            return Err(FetchError::RateLimited("YouTube quota exceeded".to_string()));
        }
        return Err(err);
    }

    let json = response.json()?;
    let item = json["items"]
        .as_array()
        .and_then(|items| items.first())
        .ok_or_else(|| FetchError::NotFound(format!("youtube video {}", video_id)))?;

    let stats = &item["statistics"];
    let views = json_count(&stats["viewCount"]).ok_or_else(|| {
        FetchError::NoData(format!("youtube video {} has no viewCount", video_id))
    })?;

    Ok(PlatformMetrics {
        views,
        // 点赞或评论被作者关闭时字段缺失
        likes: json_count(&stats["likeCount"]).unwrap_or(0),
        comments: json_count(&stats["commentCount"]).unwrap_or(0),
        shares: None,
        raw_payload: Some(item.clone()),
    })
}

#[async_trait]
impl PlatformAdapter for YoutubeAdapter {
    fn platform(&self) -> SocialPlatform {
        SocialPlatform::Youtube
    }

    async fn fetch_metrics(
        &self,
        post: &PostRef,
        credential: &Credential,
    ) -> Result<PlatformMetrics, FetchError> {
        debug!("Fetching YouTube metrics for video {}", post.external_id);
        let agent = self.agent.clone();
        let endpoint = format!("{}/videos", self.api_base);
        let video_id = post.external_id.clone();
        let credential = credential.clone();
        run_blocking(self.request_timeout, "youtube", move || {
            let request = agent
                .get(&endpoint)
                .query("part", "statistics")
                .query("id", &video_id);
            let result = match &credential {
                Credential::OAuth(token) => request
                    .header("Authorization", &format!("Bearer {}", token))
                    .call(),
                Credential::ApiKey(key) => request.query("key", key).call(),
            };
            parse_response(&read_response(result)?, &video_id)
        })
        .await
    }
}

//! TikTok Display API 适配器
//!
//! `POST {base}/video/query/?fields=...`，body 中按 video id 过滤。

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;
use ureq::Agent;

use super::transport::{RawResponse, build_agent, classify_status, json_count, read_response, run_blocking};
use super::{Credential, FetchError, PlatformAdapter, PlatformMetrics, PostRef};
use crate::storage::models::SocialPlatform;

const VIDEO_FIELDS: &str = "id,view_count,like_count,comment_count,share_count";

pub struct TiktokAdapter {
    agent: Agent,
    api_base: String,
    request_timeout: Duration,
}

impl TiktokAdapter {
    pub fn new(api_base: &str, request_timeout: Duration) -> Self {
        Self {
            agent: build_agent(request_timeout),
            api_base: api_base.trim_end_matches('/').to_string(),
            request_timeout,
        }
    }

    fn fetch_sync(
        agent: Agent,
        endpoint: String,
        video_id: String,
        token: String,
    ) -> Result<PlatformMetrics, FetchError> {
        let response = read_response(
            agent
                .post(&endpoint)
                .query("fields", VIDEO_FIELDS)
                .header("Authorization", &format!("Bearer {}", token))
                .send_json(json!({ "filters": { "video_ids": [video_id.as_str()] } })),
        )?;
        parse_response(&response, &video_id)
    }
}

/// TikTok 即便业务失败也可能返回 200，错误码在 `error.code`
fn api_error(code: &str, message: String) -> FetchError {
    match code {
        "access_token_invalid" | "access_token_expired" => FetchError::Auth(message),
        "scope_not_authorized" | "scope_permission_missed" => FetchError::Forbidden(message),
        "rate_limit_exceeded" => FetchError::RateLimited(message),
        _ => FetchError::Api {
            status: None,
            message: format!("{}: {}", code, message),
        },
    }
}

pub(crate) fn parse_response(
    response: &RawResponse,
    video_id: &str,
) -> Result<PlatformMetrics, FetchError> {
    let body = response.json();

    if let Ok(json) = &body {
        let code = json["error"]["code"].as_str().unwrap_or("ok");
        if code != "ok" {
            let message = json["error"]["message"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            return Err(api_error(code, message));
        }
    }
    if let Some(err) = classify_status(response.status, &response.body) {
        return Err(err);
    }

    let json = body?;
    let videos = json["data"]["videos"].as_array().cloned().unwrap_or_default();
    let video = videos
        .iter()
        .find(|v| v["id"].as_str() == Some(video_id))
        .or_else(|| videos.first())
        .ok_or_else(|| FetchError::NotFound(format!("tiktok video {}", video_id)))?;

    let views = json_count(&video["view_count"])
        .ok_or_else(|| FetchError::NoData(format!("tiktok video {} has no view_count", video_id)))?;

    Ok(PlatformMetrics {
        views,
        likes: json_count(&video["like_count"]).unwrap_or(0),
        comments: json_count(&video["comment_count"]).unwrap_or(0),
        shares: json_count(&video["share_count"]),
        raw_payload: Some(Value::clone(video)),
    })
}

#[async_trait]
impl PlatformAdapter for TiktokAdapter {
    fn platform(&self) -> SocialPlatform {
        SocialPlatform::Tiktok
    }

    async fn fetch_metrics(
        &self,
        post: &PostRef,
        credential: &Credential,
    ) -> Result<PlatformMetrics, FetchError> {
        let Credential::OAuth(token) = credential else {
            return Err(FetchError::Auth(
                "TikTok requires a user access token".to_string(),
            ));
        };

        debug!("Fetching TikTok metrics for video {}", post.external_id);
        let agent = self.agent.clone();
        let endpoint = format!("{}/video/query/", self.api_base);
        let video_id = post.external_id.clone();
        let token = token.clone();
        run_blocking(self.request_timeout, "tiktok", move || {
            Self::fetch_sync(agent, endpoint, video_id, token)
        })
        .await
    }
}

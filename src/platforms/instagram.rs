//! Instagram Graph API 适配器

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use ureq::Agent;

use super::transport::{RawResponse, build_agent, classify_status, json_count, read_response, run_blocking};
use super::{Credential, FetchError, PlatformAdapter, PlatformMetrics, PostRef};
use crate::storage::models::SocialPlatform;

const MEDIA_FIELDS: &str =
    "id,media_type,like_count,comments_count,insights.metric(impressions,video_views,plays,saved)";

/// 按优先级挑选作为浏览量的 insight
const VIEW_METRICS: [&str; 4] = ["video_views", "plays", "views", "impressions"];

pub struct InstagramAdapter {
    agent: Agent,
    api_base: String,
    request_timeout: Duration,
}

impl InstagramAdapter {
    pub fn new(api_base: &str, request_timeout: Duration) -> Self {
        Self {
            agent: build_agent(request_timeout),
            api_base: api_base.trim_end_matches('/').to_string(),
            request_timeout,
        }
    }
}

fn insight_value(insights: &[Value], name: &str) -> Option<i64> {
    insights
        .iter()
        .find(|i| i["name"].as_str() == Some(name))
        .and_then(|i| json_count(&i["values"][0]["value"]))
}

pub(crate) fn parse_response(
    response: &RawResponse,
    media_id: &str,
) -> Result<PlatformMetrics, FetchError> {
    if let Some(err) = classify_status(response.status, &response.body) {
        // Graph API：code 190 为 token 失效，4/17/32 为限流
        if let Ok(json) = response.json() {
            let message = json["error"]["message"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            match json["error"]["code"].as_i64() {
                Some(190) => return Err(FetchError::Auth(message)),
                Some(4) | Some(17) | Some(32) | Some(613) => {
                    return Err(FetchError::RateLimited(message));
                }
                Some(100) if response.status == 400 => {
                    return Err(FetchError::NotFound(message));
                }
                _ => {}
            }
        }
        return Err(err);
    }

    let json = response.json()?;
    let insights = json["insights"]["data"].as_array().cloned().unwrap_or_default();

    let views = VIEW_METRICS
        .iter()
        .find_map(|name| insight_value(&insights, name))
        .ok_or_else(|| {
            FetchError::NoData(format!("instagram media {} returned no view insight", media_id))
        })?;

    Ok(PlatformMetrics {
        views,
        likes: json_count(&json["like_count"]).unwrap_or(0),
        comments: json_count(&json["comments_count"]).unwrap_or(0),
        shares: insight_value(&insights, "saved"),
        raw_payload: Some(json),
    })
}

#[async_trait]
impl PlatformAdapter for InstagramAdapter {
    fn platform(&self) -> SocialPlatform {
        SocialPlatform::Instagram
    }

    async fn fetch_metrics(
        &self,
        post: &PostRef,
        credential: &Credential,
    ) -> Result<PlatformMetrics, FetchError> {
        let Credential::OAuth(token) = credential else {
            return Err(FetchError::Auth(
                "Instagram requires a user access token".to_string(),
            ));
        };

        debug!("Fetching Instagram metrics for media {}", post.external_id);
        let agent = self.agent.clone();
        let endpoint = format!("{}/{}", self.api_base, post.external_id);
        let media_id = post.external_id.clone();
        let token = token.clone();
        run_blocking(self.request_timeout, "instagram", move || {
            let response = read_response(
                agent
                    .get(&endpoint)
                    .query("fields", MEDIA_FIELDS)
                    .query("access_token", &token)
                    .call(),
            )?;
            parse_response(&response, &media_id)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> RawResponse {
        RawResponse {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_video_views_preferred_over_impressions() {
        let body = r#"{
            "id": "1789", "media_type": "VIDEO", "like_count": 120, "comments_count": 8,
            "insights": {"data": [
                {"name": "impressions", "values": [{"value": 9000}]},
                {"name": "video_views", "values": [{"value": 4000}]},
                {"name": "saved", "values": [{"value": 5}]}
            ]}
        }"#;
        let metrics = parse_response(&response(200, body), "1789").unwrap();
        assert_eq!(metrics.views, 4000);
        assert_eq!(metrics.likes, 120);
        assert_eq!(metrics.comments, 8);
        assert_eq!(metrics.shares, Some(5));
    }

    #[test]
    fn test_image_falls_back_to_impressions() {
        let body = r#"{
            "id": "1", "media_type": "IMAGE", "like_count": 10, "comments_count": 1,
            "insights": {"data": [{"name": "impressions", "values": [{"value": 300}]}]}
        }"#;
        let metrics = parse_response(&response(200, body), "1").unwrap();
        assert_eq!(metrics.views, 300);
        assert_eq!(metrics.shares, None);
    }

    #[test]
    fn test_missing_insights_is_no_data() {
        let body = r#"{"id": "1", "like_count": 10}"#;
        assert!(matches!(
            parse_response(&response(200, body), "1"),
            Err(FetchError::NoData(_))
        ));
    }

    #[test]
    fn test_graph_error_codes() {
        let expired = r#"{"error": {"message": "Session has expired", "code": 190}}"#;
        assert!(matches!(
            parse_response(&response(400, expired), "1"),
            Err(FetchError::Auth(_))
        ));

        let throttled = r#"{"error": {"message": "Application request limit reached", "code": 4}}"#;
        assert!(matches!(
            parse_response(&response(400, throttled), "1"),
            Err(FetchError::RateLimited(_))
        ));

        let missing = r#"{"error": {"message": "Unsupported get request", "code": 100}}"#;
        assert!(matches!(
            parse_response(&response(400, missing), "1"),
            Err(FetchError::NotFound(_))
        ));
    }
}

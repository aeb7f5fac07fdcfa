//! 适配器共用的 HTTP 工具

use std::time::Duration;

use serde_json::Value;
use tracing::{trace, warn};
use ureq::Agent;

use super::{FetchError, PlatformMetrics};

/// spawn_blocking 外层超时相对 HTTP 超时的余量
const OUTER_TIMEOUT_GRACE: Duration = Duration::from_secs(5);

/// 构建 Agent：全局超时，非 2xx 不视为传输错误，由调用方按状态码分类
pub(crate) fn build_agent(timeout: Duration) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

/// 一次已完成的 HTTP 往返
#[derive(Debug)]
pub(crate) struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn json(&self) -> Result<Value, FetchError> {
        serde_json::from_str(&self.body).map_err(|e| FetchError::Api {
            status: Some(self.status),
            message: format!("invalid JSON body: {}", e),
        })
    }
}

pub(crate) fn read_response(
    result: Result<ureq::http::Response<ureq::Body>, ureq::Error>,
) -> Result<RawResponse, FetchError> {
    let resp = result.map_err(map_transport_error)?;
    let status = resp.status().as_u16();
    let body = resp
        .into_body()
        .read_to_string()
        .map_err(map_transport_error)?;
    trace!("Platform API responded with HTTP {} ({} bytes)", status, body.len());
    Ok(RawResponse { status, body })
}

pub(crate) fn map_transport_error(err: ureq::Error) -> FetchError {
    match err {
        ureq::Error::Timeout(t) => FetchError::Timeout(t.to_string()),
        ureq::Error::StatusCode(code) => FetchError::Api {
            status: Some(code),
            message: "unexpected status".to_string(),
        },
        other => FetchError::Network(other.to_string()),
    }
}

/// 按 HTTP 状态码分类；2xx 返回 None
pub(crate) fn classify_status(status: u16, body: &str) -> Option<FetchError> {
    let snippet: String = body.chars().take(200).collect();
    match status {
        200..=299 => None,
        401 => Some(FetchError::Auth(snippet)),
        403 => Some(FetchError::Forbidden(snippet)),
        404 | 410 => Some(FetchError::NotFound(snippet)),
        429 => Some(FetchError::RateLimited(snippet)),
        408 | 504 => Some(FetchError::Timeout(snippet)),
        _ => Some(FetchError::Api {
            status: Some(status),
            message: snippet,
        }),
    }
}

/// 计数字段：数字或数字字符串
pub(crate) fn json_count(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// 在阻塞线程池中执行同步抓取，外加一层 tokio 超时保护
pub(crate) async fn run_blocking<F>(
    request_timeout: Duration,
    label: &'static str,
    fetch: F,
) -> Result<PlatformMetrics, FetchError>
where
    F: FnOnce() -> Result<PlatformMetrics, FetchError> + Send + 'static,
{
    let guard = request_timeout + OUTER_TIMEOUT_GRACE;
    match tokio::time::timeout(guard, tokio::task::spawn_blocking(fetch)).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => {
            warn!("{} fetch task failed: {}", label, join_err);
            Err(FetchError::Network(format!("fetch task failed: {}", join_err)))
        }
        Err(_) => Err(FetchError::Timeout(format!(
            "{} request exceeded {}s",
            label,
            guard.as_secs()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_status() {
        assert!(classify_status(200, "").is_none());
        assert!(matches!(classify_status(401, ""), Some(FetchError::Auth(_))));
        assert!(matches!(
            classify_status(403, ""),
            Some(FetchError::Forbidden(_))
        ));
        assert!(matches!(
            classify_status(404, ""),
            Some(FetchError::NotFound(_))
        ));
        assert!(matches!(
            classify_status(429, ""),
            Some(FetchError::RateLimited(_))
        ));
        assert!(matches!(
            classify_status(503, "down"),
            Some(FetchError::Api {
                status: Some(503),
                ..
            })
        ));
    }

    #[test]
    fn test_json_count_accepts_numbers_and_strings() {
        assert_eq!(json_count(&json!(42)), Some(42));
        assert_eq!(json_count(&json!("1234")), Some(1234));
        assert_eq!(json_count(&json!(12.0)), Some(12));
        assert_eq!(json_count(&json!("n/a")), None);
        assert_eq!(json_count(&Value::Null), None);
    }

    #[tokio::test]
    async fn test_run_blocking_returns_inner_result() {
        let result = run_blocking(Duration::from_secs(1), "test", || {
            Ok(PlatformMetrics {
                views: 3,
                ..Default::default()
            })
        })
        .await;
        assert_eq!(result.unwrap().views, 3);
    }
}

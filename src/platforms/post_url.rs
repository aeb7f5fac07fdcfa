//! 从帖子 URL 识别平台并提取平台帖子 ID

use url::Url;

use crate::storage::models::SocialPlatform;

fn parse(post_url: &str) -> Option<Url> {
    Url::parse(post_url.trim()).ok()
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{}", domain))
}

fn segments(url: &Url) -> Vec<&str> {
    url.path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default()
}

/// 根据域名识别平台
pub fn detect_platform(post_url: &str) -> Option<SocialPlatform> {
    let url = parse(post_url)?;
    let host = url.host_str()?.to_ascii_lowercase();
    if host_matches(&host, "tiktok.com") {
        Some(SocialPlatform::Tiktok)
    } else if host_matches(&host, "instagram.com") {
        Some(SocialPlatform::Instagram)
    } else if host_matches(&host, "youtube.com") || host == "youtu.be" {
        Some(SocialPlatform::Youtube)
    } else {
        None
    }
}

/// 提取平台帖子 ID；无法识别时返回 None
///
/// - TikTok: `/@user/video/{id}`，或 `vm.` / `vt.` 短链的最后一段
/// - Instagram: `/p/{code}`、`/reel/{code}`、`/reels/{code}`
/// - YouTube: `youtu.be/{id}`、`/shorts/{id}`、`/embed/{id}`、`?v={id}`
pub fn extract_post_id(platform: SocialPlatform, post_url: &str) -> Option<String> {
    let url = parse(post_url)?;
    let host = url.host_str()?.to_ascii_lowercase();
    let path = segments(&url);

    let id = match platform {
        SocialPlatform::Tiktok => {
            if host == "vm.tiktok.com" || host == "vt.tiktok.com" {
                path.last().map(|s| s.to_string())
            } else {
                path.iter()
                    .position(|seg| *seg == "video")
                    .and_then(|i| path.get(i + 1))
                    .map(|s| s.to_string())
            }
        }
        SocialPlatform::Instagram => match path.as_slice() {
            ["p" | "reel" | "reels", code, ..] => Some(code.to_string()),
            [_user, "p" | "reel", code, ..] => Some(code.to_string()),
            _ => None,
        },
        SocialPlatform::Youtube => {
            if host == "youtu.be" {
                path.first().map(|s| s.to_string())
            } else if let ["shorts" | "embed" | "live", id, ..] = path.as_slice() {
                Some(id.to_string())
            } else {
                url.query_pairs()
                    .find(|(k, _)| k == "v")
                    .map(|(_, v)| v.into_owned())
            }
        }
    };

    id.filter(|s| !s.is_empty())
}

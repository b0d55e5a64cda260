//! TikTok metadata normalization.
//!
//! Turns a raw share URL into the field set we persist for a video. Two
//! strategies: a deterministic URL-only parse that always works offline, and
//! an upstream metadata API used when `TIKTOK_API_KEY` is configured. The
//! upstream call degrades to the URL-only result on any failure, so importing
//! never depends on the third-party service being up.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

static VIDEO_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/video/(\d+)").unwrap());
static USERNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@([A-Za-z0-9._]+)").unwrap());
static HASHTAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#(\w+)").unwrap());

const DEFAULT_AUTHOR: &str = "@tiktok_user";
const DEFAULT_HASHTAG: &str = "tiktok";
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub video_url: String,
    pub author: String,
    pub author_avatar: Option<String>,
    pub description: String,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub views: i64,
    pub hashtags: Vec<String>,
}

/// Payload shape of the upstream metadata endpoint. Every field is optional;
/// missing values fall back to the URL-derived defaults.
#[derive(Debug, Deserialize)]
struct UpstreamVideo {
    video_url: Option<String>,
    author: Option<String>,
    author_avatar: Option<String>,
    description: Option<String>,
    #[serde(default)]
    likes: i64,
    #[serde(default)]
    comments: i64,
    #[serde(default)]
    shares: i64,
    #[serde(default)]
    views: i64,
}

pub fn extract_video_id(url: &str) -> Option<&str> {
    VIDEO_ID_RE
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

pub fn extract_author(url: &str) -> String {
    USERNAME_RE
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| format!("@{}", m.as_str()))
        .unwrap_or_else(|| DEFAULT_AUTHOR.to_string())
}

/// Collects `#word` tokens in order of appearance, duplicates included.
/// Falls back to a single sentinel tag when the text has none.
pub fn extract_hashtags(text: &str) -> Vec<String> {
    let tags: Vec<String> = HASHTAG_RE
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect();

    if tags.is_empty() {
        vec![DEFAULT_HASHTAG.to_string()]
    } else {
        tags
    }
}

/// URL-only strategy. Returns `None` when no numeric video id is present,
/// which is the hard validation gate before any persistence attempt.
pub fn parse_url(url: &str) -> Option<VideoMetadata> {
    let video_id = extract_video_id(url)?;

    Some(VideoMetadata {
        video_url: format!("https://www.tiktok.com/embed/v2/{}", video_id),
        author: extract_author(url),
        author_avatar: None,
        description: format!("TikTok видео #{}", video_id),
        likes: 0,
        comments: 0,
        shares: 0,
        views: 0,
        hashtags: extract_hashtags(url),
    })
}

/// Resolves metadata for a share URL. When an API credential is configured the
/// upstream endpoint is tried first; any failure there falls back to the
/// URL-only parse and is never surfaced to the caller.
pub async fn fetch_metadata(http: &reqwest::Client, url: &str) -> Option<VideoMetadata> {
    let fallback = parse_url(url)?;

    let api_key = match std::env::var("TIKTOK_API_KEY") {
        Ok(key) if !key.is_empty() => key,
        _ => return Some(fallback),
    };

    // parse_url succeeded, so the id is present
    let video_id = extract_video_id(url)?;

    match fetch_from_api(http, video_id, &api_key, &fallback).await {
        Ok(metadata) => Some(metadata),
        Err(err) => {
            tracing::warn!(
                video_id = %video_id,
                error = %err,
                "TikTok metadata API failed, using URL-only fallback"
            );
            Some(fallback)
        }
    }
}

async fn fetch_from_api(
    http: &reqwest::Client,
    video_id: &str,
    api_key: &str,
    fallback: &VideoMetadata,
) -> anyhow::Result<VideoMetadata> {
    let base_url = std::env::var("TIKTOK_API_URL")
        .unwrap_or_else(|_| "https://open.tiktokapis.com/v2/video".to_string());

    let response = http
        .get(format!("{}/{}", base_url.trim_end_matches('/'), video_id))
        .bearer_auth(api_key)
        .timeout(UPSTREAM_TIMEOUT)
        .send()
        .await?;

    if !response.status().is_success() {
        anyhow::bail!("metadata API returned {}", response.status());
    }

    let upstream: UpstreamVideo = response.json().await?;

    Ok(merge_metadata(upstream, fallback))
}

/// Upstream fields win when present; anything missing keeps the URL-derived
/// value. Hashtags are re-extracted only from a description the upstream
/// actually returned, so a payload without one keeps the URL-derived tag set
/// instead of mining the synthesized description.
fn merge_metadata(upstream: UpstreamVideo, fallback: &VideoMetadata) -> VideoMetadata {
    let (description, hashtags) = match upstream.description {
        Some(description) => {
            let hashtags = extract_hashtags(&description);
            (description, hashtags)
        }
        None => (fallback.description.clone(), fallback.hashtags.clone()),
    };

    VideoMetadata {
        video_url: upstream
            .video_url
            .unwrap_or_else(|| fallback.video_url.clone()),
        author: upstream.author.unwrap_or_else(|| fallback.author.clone()),
        author_avatar: upstream.author_avatar,
        description,
        likes: upstream.likes.max(0),
        comments: upstream.comments.max(0),
        shares: upstream.shares.max(0),
        views: upstream.views.max(0),
        hashtags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_numeric_video_id() {
        assert_eq!(
            extract_video_id("https://www.tiktok.com/@alice/video/7234567890123456789"),
            Some("7234567890123456789")
        );
        assert_eq!(extract_video_id("https://tiktok.com/nope"), None);
        assert_eq!(extract_video_id("https://tiktok.com/video/abc"), None);
    }

    #[test]
    fn extracts_author_handle() {
        assert_eq!(
            extract_author("https://tiktok.com/@alice.b_c/video/1"),
            "@alice.b_c"
        );
        assert_eq!(extract_author("https://tiktok.com/video/1"), "@tiktok_user");
    }

    #[test]
    fn hashtags_preserve_order_and_duplicates() {
        assert_eq!(extract_hashtags("#a #b #a"), vec!["a", "b", "a"]);
    }

    #[test]
    fn hashtags_default_to_sentinel() {
        assert_eq!(extract_hashtags("no tags here"), vec!["tiktok"]);
    }

    #[test]
    fn parse_url_builds_embed_metadata() {
        let meta = parse_url("https://tiktok.com/@alice/video/123456?x=1#funny").unwrap();

        assert_eq!(meta.author, "@alice");
        assert_eq!(meta.hashtags, vec!["funny"]);
        assert!(meta.video_url.contains("123456"));
        assert_eq!(meta.video_url, "https://www.tiktok.com/embed/v2/123456");
        assert_eq!(meta.author_avatar, None);
        assert_eq!(meta.likes, 0);
        assert_eq!(meta.comments, 0);
        assert_eq!(meta.shares, 0);
        assert_eq!(meta.views, 0);
    }

    #[test]
    fn parse_url_rejects_url_without_video_id() {
        assert!(parse_url("https://tiktok.com/nope").is_none());
        assert!(parse_url("").is_none());
    }

    #[test]
    fn empty_upstream_payload_keeps_url_derived_metadata() {
        let fallback = parse_url("https://tiktok.com/@alice/video/123456#funny").unwrap();
        let upstream: UpstreamVideo = serde_json::from_str("{}").unwrap();

        let merged = merge_metadata(upstream, &fallback);

        assert_eq!(merged.hashtags, vec!["funny"]);
        assert_eq!(merged.description, fallback.description);
        assert_eq!(merged.author, "@alice");
        assert_eq!(merged.video_url, fallback.video_url);
        assert_eq!(merged.likes, 0);
    }

    #[test]
    fn upstream_description_drives_hashtags() {
        let fallback = parse_url("https://tiktok.com/@alice/video/123456#funny").unwrap();
        let upstream: UpstreamVideo = serde_json::from_str(
            r#"{"description": "dance time #dance #viral", "likes": 10, "views": 500}"#,
        )
        .unwrap();

        let merged = merge_metadata(upstream, &fallback);

        assert_eq!(merged.hashtags, vec!["dance", "viral"]);
        assert_eq!(merged.description, "dance time #dance #viral");
        assert_eq!(merged.likes, 10);
        assert_eq!(merged.views, 500);
    }

    #[test]
    fn upstream_description_without_tags_gets_sentinel() {
        let fallback = parse_url("https://tiktok.com/@alice/video/123456#funny").unwrap();
        let upstream: UpstreamVideo =
            serde_json::from_str(r#"{"description": "no tags here"}"#).unwrap();

        let merged = merge_metadata(upstream, &fallback);

        assert_eq!(merged.hashtags, vec!["tiktok"]);
    }
}

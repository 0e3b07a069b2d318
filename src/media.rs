//! Media resolution: API indirection, direct URLs, and image/video
//! classification of resolved content.

use crate::error::{Error, Result};
use crate::http::{self, EndpointProbe};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Video extensions recognized when no content-type settles the question.
const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "mov", "avi", "mkv", "webm"];

/// Kind of a resolved media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Label used on forward-bundle sub-messages.
    pub fn label(self) -> &'static str {
        match self {
            MediaKind::Image => "图片",
            MediaKind::Video => "视频",
        }
    }
}

/// One resolved media item, produced fresh per fetch and never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub url: String,
    pub kind: MediaKind,
}

/// URL path with query and fragment stripped.
fn url_path(url: &str) -> &str {
    let url = url.split(['?', '#']).next().unwrap_or(url);
    match url.find("://") {
        Some(scheme_end) => {
            let rest = &url[scheme_end + 3..];
            rest.find('/').map(|i| &rest[i..]).unwrap_or("")
        }
        None => url,
    }
}

/// Lower-cased extension of the URL path's last segment, if any.
fn url_extension(url: &str) -> Option<String> {
    let segment = url_path(url).rsplit('/').next()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Classify a resolved URL as image or video.
///
/// Precedence: content-type header, then file extension, then MIME guess,
/// then the image default. Pure function of `(url, content_type)`.
pub fn determine_media_kind(url: &str, content_type: &str) -> MediaKind {
    let ct = content_type.to_lowercase();
    if ct.contains("video") {
        return MediaKind::Video;
    }
    if ct.contains("image") {
        return MediaKind::Image;
    }
    let extension = url_extension(url);
    if extension.is_none()
        && let Some(guess) = mime_guess::from_path(url_path(url)).first()
    {
        let guessed = guess.essence_str();
        if guessed.contains("video") {
            return MediaKind::Video;
        }
        if guessed.contains("image") {
            return MediaKind::Image;
        }
    }
    match extension {
        Some(ext) if VIDEO_EXTENSIONS.contains(&ext.as_str()) => MediaKind::Video,
        _ => MediaKind::Image,
    }
}

fn is_http_url(candidate: &str) -> bool {
    candidate.starts_with("http://") || candidate.starts_with("https://")
}

fn json_url_field(value: &Value) -> Option<String> {
    value
        .get("url")
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
}

/// Extract candidate media URLs from an API response body.
///
/// JSON arrays contribute each element's `url` field; JSON objects their
/// `url` or nested `data.url`; plain multi-line bodies every line that is
/// an absolute HTTP(S) URL; single-line bodies the trimmed body itself.
/// Non-URL candidates are filtered out.
pub fn extract_candidate_urls(content_type: &str, body: &str) -> Vec<String> {
    let mut candidates = Vec::new();
    if content_type.contains("json") {
        match serde_json::from_str::<Value>(body) {
            Ok(Value::Array(items)) => {
                candidates.extend(items.iter().filter_map(json_url_field));
            }
            Ok(value @ Value::Object(_)) => {
                let url = json_url_field(&value)
                    .or_else(|| value.get("data").and_then(json_url_field));
                candidates.extend(url);
            }
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(%err, "media API declared JSON but body did not parse");
            }
        }
    } else {
        let lines: Vec<&str> = body.lines().collect();
        if lines.len() > 1 {
            candidates.extend(
                lines
                    .iter()
                    .map(|line| line.trim())
                    .filter(|line| is_http_url(line))
                    .map(str::to_string),
            );
        } else {
            candidates.push(body.trim().to_string());
        }
    }
    candidates.retain(|candidate| is_http_url(candidate));
    candidates
}

/// Fetch a media-API endpoint and extract its candidate URLs, without
/// resolving them. The diagnostic fan-out reports on this level.
pub async fn fetch_candidate_urls(
    client: &reqwest::Client,
    api_url: &str,
) -> Result<Vec<String>> {
    let response = client
        .get(api_url)
        .send()
        .await
        .map_err(Error::from_reqwest)?;
    let status = response.status().as_u16();
    if status != 200 {
        return Err(Error::UpstreamHttp { status });
    }
    let content_type = http::content_type_of(&response);
    let body = response.text().await.map_err(Error::from_reqwest)?;
    Ok(extract_candidate_urls(&content_type, &body))
}

/// Resolve a media-API URL into zero or more media items.
///
/// Non-200 and transport failures yield an empty result; individual
/// candidate failures are dropped silently so one bad link never sinks the
/// batch.
pub async fn resolve_api(client: &reqwest::Client, api_url: &str) -> Vec<ResolvedMedia> {
    let candidates = match fetch_candidate_urls(client, api_url).await {
        Ok(candidates) => candidates,
        Err(err) => {
            tracing::warn!(url = api_url, %err, "media API request failed");
            return Vec::new();
        }
    };

    let mut resolved = Vec::new();
    for candidate in candidates {
        match client.get(&candidate).send().await {
            Ok(final_response) if final_response.status().as_u16() == 200 => {
                let kind =
                    determine_media_kind(&candidate, &http::content_type_of(&final_response));
                resolved.push(ResolvedMedia {
                    url: candidate,
                    kind,
                });
            }
            Ok(final_response) => {
                tracing::debug!(
                    url = %candidate,
                    status = %final_response.status(),
                    "dropping media candidate"
                );
            }
            Err(err) => {
                tracing::debug!(url = %candidate, %err, "dropping media candidate");
            }
        }
    }
    resolved
}

/// Resolve a direct-media URL into exactly one media item at its canonical
/// (post-redirect) location.
pub async fn resolve_direct(client: &reqwest::Client, url: &str) -> Result<ResolvedMedia> {
    let EndpointProbe {
        status,
        content_type,
        final_url,
    } = http::probe(client, url).await?;
    if status != 200 {
        return Err(Error::UpstreamHttp { status });
    }
    let kind = determine_media_kind(&final_url, &content_type);
    Ok(ResolvedMedia {
        url: final_url,
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_beats_extension() {
        assert_eq!(determine_media_kind("a.jpg", "video/mp4"), MediaKind::Video);
        assert_eq!(determine_media_kind("a.mp4", "image/png"), MediaKind::Image);
        assert_eq!(determine_media_kind("a", "image/png"), MediaKind::Image);
    }

    #[test]
    fn extension_decides_without_header() {
        assert_eq!(determine_media_kind("https://x/a.mp4", ""), MediaKind::Video);
        assert_eq!(determine_media_kind("https://x/a.WEBM?sig=1", ""), MediaKind::Video);
        assert_eq!(determine_media_kind("https://x/a.jpg", ""), MediaKind::Image);
        // Known extension that is not in the video list stays an image even
        // though a MIME guess would also say image.
        assert_eq!(determine_media_kind("https://x/a.png", ""), MediaKind::Image);
    }

    #[test]
    fn default_is_image() {
        assert_eq!(determine_media_kind("https://x/a", ""), MediaKind::Image);
        assert_eq!(determine_media_kind("a", ""), MediaKind::Image);
    }

    #[test]
    fn extension_ignores_query_and_fragment() {
        assert_eq!(url_extension("https://x/v.mp4?token=.jpg"), Some("mp4".into()));
        assert_eq!(url_extension("https://x/page#a.mp4"), None);
        assert_eq!(url_extension("https://x/"), None);
    }

    #[test]
    fn candidates_from_json_array() {
        let body = r#"[{"url": "https://a/1.jpg"}, {"title": "no url"}, {"url": "https://a/2.jpg"}]"#;
        assert_eq!(
            extract_candidate_urls("application/json", body),
            ["https://a/1.jpg", "https://a/2.jpg"]
        );
    }

    #[test]
    fn candidates_from_json_object_and_nested_data() {
        assert_eq!(
            extract_candidate_urls("application/json", r#"{"url": "https://a/1.jpg"}"#),
            ["https://a/1.jpg"]
        );
        assert_eq!(
            extract_candidate_urls(
                "application/json",
                r#"{"code": 0, "data": {"url": "https://a/2.jpg"}}"#
            ),
            ["https://a/2.jpg"]
        );
        assert!(extract_candidate_urls("application/json", r#"{"code": 1}"#).is_empty());
    }

    #[test]
    fn candidates_from_plain_text() {
        let multi = "https://a/1.jpg\nnot a url\n  https://a/2.jpg  ";
        assert_eq!(
            extract_candidate_urls("text/plain", multi),
            ["https://a/1.jpg", "https://a/2.jpg"]
        );
        assert_eq!(
            extract_candidate_urls("text/plain", "  https://a/only.jpg\n"),
            ["https://a/only.jpg"]
        );
        assert!(extract_candidate_urls("text/plain", "no url here").is_empty());
    }

    #[test]
    fn malformed_json_yields_no_candidates() {
        assert!(extract_candidate_urls("application/json", "{broken").is_empty());
    }
}

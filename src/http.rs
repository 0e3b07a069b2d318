//! Shared HTTP client, endpoint probing and registration-time
//! classification.

use crate::error::{Error, Result};
use crate::registry::Category;
use anyhow::Context as _;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

/// User-agent for probes and direct-URL redirect resolution. Some media
/// hosts only serve the redirect chain to a mobile browser UA.
pub const PROBE_USER_AGENT: &str = "Mozilla/5.0 (Linux; U; Android 4.2.1; zh-cn; AMOI N828 \
     Build/JOP40D) AppleWebKit/534.30 (KHTML, like Gecko) Version/4.0 Mobile Safari/534.30 \
     SogouMSE/1.2.1";

/// User-agent for text-API fetches.
pub const TEXT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Build the shared client: redirect-following (reqwest default policy)
/// with one overall request timeout.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .with_context(|| "failed to build HTTP client")?;
    Ok(client)
}

/// Probe response summary, used only during registration and direct-URL
/// resolution.
#[derive(Debug, Clone)]
pub struct EndpointProbe {
    pub status: u16,
    /// Lower-cased `Content-Type`, empty when the header is absent.
    pub content_type: String,
    /// Post-redirect URL.
    pub final_url: String,
}

/// Lower-cased content type of a response, empty when missing.
pub fn content_type_of(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_lowercase()
}

/// Single GET with redirects, summarizing status/content-type/final URL.
pub async fn probe(client: &reqwest::Client, url: &str) -> Result<EndpointProbe> {
    let response = client
        .get(url)
        .header(reqwest::header::USER_AGENT, PROBE_USER_AGENT)
        .send()
        .await
        .map_err(Error::from_reqwest)?;
    Ok(EndpointProbe {
        status: response.status().as_u16(),
        content_type: content_type_of(&response),
        final_url: response.url().to_string(),
    })
}

/// Registration-time three-way classification.
///
/// Non-200 responses and unknown content types fall into the media-API
/// bucket: "assume it's an API, store anyway".
pub fn classify(probe: &EndpointProbe) -> Category {
    if probe.status != 200 {
        return Category::MediaApi;
    }
    let ct = probe.content_type.as_str();
    if ct.starts_with("image/") || ct.starts_with("video/") {
        Category::DirectUrl
    } else if ct.starts_with("text/") || ct.starts_with("application/json") {
        Category::TextApi
    } else {
        Category::MediaApi
    }
}

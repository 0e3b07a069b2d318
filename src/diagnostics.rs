//! "Probe all servers" diagnostic fan-out.
//!
//! Endpoints are requested sequentially; each one's failure is recorded in
//! its own report line and never aborts the rest. The report closes with
//! aggregate statistics.

use crate::error::{Error, Result};
use crate::http::PROBE_USER_AGENT;
use crate::media;
use crate::registry::{Category, Endpoint};
use crate::reply::Reply;
use crate::text;
use reqwest::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE};

/// Outcome of probing one endpoint.
#[derive(Debug)]
struct ProbeOutcome {
    success: bool,
    content: String,
    media_urls: Vec<String>,
}

/// Probe every endpoint and assemble the report replies.
pub async fn probe_endpoints(
    client: &reqwest::Client,
    endpoints: Vec<Endpoint>,
) -> Vec<Reply> {
    if endpoints.is_empty() {
        return vec![Reply::plain("没有找到包含'服务器'关键词的API")];
    }

    let mut replies = vec![Reply::plain(format!(
        "🔍 正在请求 {} 个服务器相关API，请稍候...",
        endpoints.len()
    ))];

    let mut outcomes = Vec::with_capacity(endpoints.len());
    for endpoint in &endpoints {
        outcomes.push(probe_one(client, endpoint).await);
    }

    let success_count = outcomes.iter().filter(|o| o.success).count();
    let failed_count = outcomes.len() - success_count;
    replies.push(Reply::plain(format!(
        "📊 服务器API请求汇总 (成功: {success_count}, 失败: {failed_count})\n"
    )));

    for (i, (endpoint, outcome)) in endpoints.iter().zip(&outcomes).enumerate() {
        replies.push(Reply::plain(render_endpoint_line(i + 1, endpoint, outcome)));
        // Long text bodies get their own segmented replies.
        if outcome.success
            && endpoint.category == Category::TextApi
            && outcome.content.chars().count() > text::LONG_TEXT_THRESHOLD
        {
            let parts = text::split_long_text(&outcome.content, text::SEGMENT_MAX_LEN);
            let total = parts.len();
            for (part_num, part) in parts.into_iter().enumerate() {
                replies.push(Reply::plain(format!(
                    "   📄 内容部分 {}/{total}:\n{part}\n",
                    part_num + 1
                )));
            }
        }
    }

    replies.push(Reply::plain(render_stats(outcomes.len(), success_count)));
    replies
}

async fn probe_one(client: &reqwest::Client, endpoint: &Endpoint) -> ProbeOutcome {
    match endpoint.category {
        Category::TextApi => match text::fetch(client, &endpoint.url).await {
            Ok(content) if content.is_empty() => ProbeOutcome {
                success: true,
                content: text::EMPTY_CONTENT.to_string(),
                media_urls: Vec::new(),
            },
            Ok(content) => ProbeOutcome {
                success: true,
                content,
                media_urls: Vec::new(),
            },
            Err(err) => ProbeOutcome {
                success: false,
                content: probe_error_text(&err),
                media_urls: Vec::new(),
            },
        },
        Category::MediaApi => match media::fetch_candidate_urls(client, &endpoint.url).await {
            Ok(urls) => ProbeOutcome {
                success: true,
                content: format!("获取到 {} 个媒体链接", urls.len()),
                media_urls: urls,
            },
            Err(err) => ProbeOutcome {
                success: false,
                content: format!("请求失败: {err}"),
                media_urls: Vec::new(),
            },
        },
        Category::DirectUrl => match media_info(client, &endpoint.url).await {
            Ok(info) => ProbeOutcome {
                success: true,
                content: info,
                media_urls: Vec::new(),
            },
            Err(Error::UpstreamHttp { status }) => ProbeOutcome {
                success: false,
                content: format!("无法访问媒体: HTTP {status}"),
                media_urls: Vec::new(),
            },
            Err(err) => ProbeOutcome {
                success: false,
                content: format!("获取媒体信息失败: {err}"),
                media_urls: Vec::new(),
            },
        },
    }
}

fn probe_error_text(err: &Error) -> String {
    match err {
        Error::UpstreamHttp { status } => format!("HTTP错误: {status}"),
        Error::UpstreamTimeout => "请求超时".to_string(),
        Error::UpstreamNetwork(detail) => format!("网络错误: {detail}"),
        other => format!("处理错误: {other}"),
    }
}

/// Header block for a direct-media endpoint: type, size, encoding and the
/// canonical post-redirect URL.
async fn media_info(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .header(reqwest::header::USER_AGENT, PROBE_USER_AGENT)
        .send()
        .await
        .map_err(Error::from_reqwest)?;
    let status = response.status().as_u16();
    if status != 200 {
        return Err(Error::UpstreamHttp { status });
    }
    let header = |name| {
        response
            .headers()
            .get(name)
            .and_then(|value: &reqwest::header::HeaderValue| value.to_str().ok())
            .unwrap_or("未知")
            .to_string()
    };
    Ok(format!(
        "媒体类型: {}\n文件大小: {}\n编码方式: {}\n最终URL: {}",
        header(CONTENT_TYPE),
        header(CONTENT_LENGTH),
        header(CONTENT_ENCODING),
        response.url()
    ))
}

fn render_endpoint_line(index: usize, endpoint: &Endpoint, outcome: &ProbeOutcome) -> String {
    let icon = if outcome.success { "✅" } else { "❌" };
    let mut line = format!(
        "{index}. {icon} 【{}】{}\n   📍 地址: {}\n   📝 结果: {}\n",
        endpoint.category.label(),
        endpoint.trigger,
        endpoint.url,
        outcome.content,
    );
    if outcome.success && !outcome.media_urls.is_empty() {
        line.push_str(&format!(
            "   🖼️ 媒体链接 ({} 个):\n",
            outcome.media_urls.len()
        ));
        for (j, url) in outcome.media_urls.iter().enumerate() {
            line.push_str(&format!("      {}. {url}\n", j + 1));
        }
    }
    line.push('\n');
    line
}

fn render_stats(total: usize, success_count: usize) -> String {
    let failed = total - success_count;
    let rate = success_count as f64 / total as f64 * 100.0;
    format!(
        "📈 统计信息:\n- 总请求数: {total}\n- 成功: {success_count}\n- 失败: {failed}\n- 成功率: {rate:.1}%"
    )
}

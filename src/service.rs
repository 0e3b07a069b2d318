//! `RelayService`: the command surface the host wires its handlers to,
//! plus the bare-message dispatch hook.

use crate::config::RelayConfig;
use crate::diagnostics;
use crate::error::{Error, Result};
use crate::http;
use crate::media::{self, ResolvedMedia};
use crate::registry::{Category, TriggerRegistry, normalize};
use crate::reply::{ForwardNode, Reply};
use crate::text;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Notice sent when any resolving operation runs while the feature is off.
const DISABLED_NOTICE: &str = "插件功能已关闭，请先使用 /开启看图 启用";

/// Reserved bare-message commands, matched after trigger lookup.
const RANDOM_MEDIA_COMMAND: &str = "随机看图";
const RANDOM_TEXT_COMMAND: &str = "随机文本";
const PROBE_SERVERS_COMMAND: &str = "查看所有服务器";

/// Triggers containing this keyword participate in the diagnostic fan-out.
pub const SERVER_KEYWORD: &str = "服务器";

/// Trigger-keyword relay service.
///
/// Holds the registry behind an async `RwLock` so a multi-threaded host can
/// interleave lookups with administrative mutations safely. Locks are never
/// held across network calls.
pub struct RelayService {
    config: RelayConfig,
    client: reqwest::Client,
    enabled: AtomicBool,
    registry: RwLock<TriggerRegistry>,
}

impl RelayService {
    /// Create the service, loading the persisted registry from
    /// `config.data_file`.
    pub fn new(config: RelayConfig) -> Result<Self> {
        let client = http::build_client(config.request_timeout)?;
        let registry = TriggerRegistry::load(&config.data_file);
        tracing::info!(
            data_file = %config.data_file.display(),
            enabled = config.enabled,
            "relay service initialized"
        );
        Ok(Self {
            enabled: AtomicBool::new(config.enabled),
            registry: RwLock::new(registry),
            client,
            config,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn enable(&self) -> Reply {
        self.enabled.store(true, Ordering::Relaxed);
        Reply::plain("发图/发视频/发文本功能已开启")
    }

    pub fn disable(&self) -> Reply {
        self.enabled.store(false, Ordering::Relaxed);
        Reply::plain("发图/发视频/发文本功能已关闭")
    }

    fn disabled_guard(&self) -> Option<Reply> {
        (!self.is_enabled()).then(|| Reply::plain(DISABLED_NOTICE))
    }

    /// Persist the registry, turning a write failure into a reply instead
    /// of rolling back the in-memory mutation.
    fn persist(&self, registry: &TriggerRegistry) -> Option<Reply> {
        match registry.save(&self.config.data_file) {
            Ok(()) => None,
            Err(err) => Some(Reply::plain(format!("配置保存失败: {err}"))),
        }
    }

    /// List every registered trigger grouped by category.
    pub async fn list(&self) -> Vec<Reply> {
        if let Some(notice) = self.disabled_guard() {
            return vec![notice];
        }
        let registry = self.registry.read().await;
        if registry.is_empty() {
            return vec![Reply::plain("暂无可用的API或直接图片/视频URL或文本API")];
        }
        vec![Reply::plain(registry.render_list())]
    }

    /// Probe `url`, classify it, and register it under `trigger`.
    ///
    /// A probe that errors or returns non-200 still registers, into the
    /// media-API bucket (best-effort default).
    pub async fn add(&self, trigger: &str, url: &str) -> Vec<Reply> {
        if let Some(notice) = self.disabled_guard() {
            return vec![notice];
        }
        let category = match http::probe(&self.client, url).await {
            Ok(probe) => http::classify(&probe),
            Err(err) => {
                tracing::warn!(url, %err, "endpoint probe failed, assuming media API");
                Category::MediaApi
            }
        };
        self.register(category, trigger, url).await
    }

    /// Register `url` as a text API without probing.
    pub async fn add_text(&self, trigger: &str, url: &str) -> Vec<Reply> {
        if let Some(notice) = self.disabled_guard() {
            return vec![notice];
        }
        self.register(Category::TextApi, trigger, url).await
    }

    async fn register(&self, category: Category, trigger: &str, url: &str) -> Vec<Reply> {
        let mut registry = self.registry.write().await;
        if let Err(err) = registry.insert(category, trigger, url) {
            return vec![Reply::plain(format!("添加失败: {err}"))];
        }
        let mut replies = vec![Reply::plain(format!(
            "成功添加{} - 触发指令: {}, 地址: {url}",
            category.label(),
            normalize(trigger),
        ))];
        replies.extend(self.persist(&registry));
        replies
    }

    /// Replace the `index`-th (1-based) endpoint of `trigger`.
    pub async fn modify(&self, trigger: &str, index: usize, new_url: &str) -> Vec<Reply> {
        if let Some(notice) = self.disabled_guard() {
            return vec![notice];
        }
        let mut registry = self.registry.write().await;
        match registry.modify(trigger, index, new_url) {
            Ok(()) => {
                let mut replies = vec![Reply::plain(format!(
                    "成功修改触发指令 {} 的第 {index} 个地址为 {new_url}",
                    normalize(trigger),
                ))];
                replies.extend(self.persist(&registry));
                replies
            }
            Err(err) => vec![Reply::plain(admin_error_text(&err))],
        }
    }

    /// Delete one endpoint of `trigger`, or the whole trigger when `index`
    /// is `None`.
    pub async fn delete(&self, trigger: &str, index: Option<usize>) -> Vec<Reply> {
        if let Some(notice) = self.disabled_guard() {
            return vec![notice];
        }
        let mut registry = self.registry.write().await;
        match registry.remove(trigger, index) {
            Ok(()) => {
                let mut replies = vec![Reply::plain(format!(
                    "成功删除触发指令 {} 的相关地址",
                    normalize(trigger),
                ))];
                replies.extend(self.persist(&registry));
                replies
            }
            Err(err) => vec![Reply::plain(admin_error_text(&err))],
        }
    }

    /// Resolve a media trigger once (image/video categories only).
    pub async fn send_by_trigger(&self, trigger: &str) -> Vec<Reply> {
        if let Some(notice) = self.disabled_guard() {
            return vec![notice];
        }
        let picked = {
            let registry = self.registry.read().await;
            registry
                .category_of(trigger)
                .filter(|category| *category != Category::TextApi)
                .and_then(|category| {
                    registry
                        .pick_random(trigger)
                        .ok()
                        .map(|url| (category, url))
                })
        };
        match picked {
            Some((Category::MediaApi, url)) => self.send_from_api(&url).await,
            Some((_, url)) => self.send_from_direct(&url).await,
            None => vec![Reply::plain(format!(
                "触发指令 '{}' 不存在或不是图片/视频类型",
                normalize(trigger),
            ))],
        }
    }

    /// Resolve a text trigger once.
    pub async fn send_text_by_trigger(&self, trigger: &str) -> Vec<Reply> {
        if let Some(notice) = self.disabled_guard() {
            return vec![notice];
        }
        let picked = {
            let registry = self.registry.read().await;
            (registry.category_of(trigger) == Some(Category::TextApi))
                .then(|| registry.pick_random(trigger).ok())
                .flatten()
        };
        match picked {
            Some(url) => self.send_from_text(&url).await,
            None => vec![Reply::plain(format!(
                "文本触发指令 '{}' 不存在",
                normalize(trigger),
            ))],
        }
    }

    /// Pick a random trigger from any category and resolve it once.
    pub async fn send_random(&self) -> Vec<Reply> {
        if let Some(notice) = self.disabled_guard() {
            return vec![notice];
        }
        let picked = {
            let registry = self.registry.read().await;
            registry.pick_random_trigger().ok().and_then(|trigger| {
                let category = registry.category_of(&trigger)?;
                let url = registry.pick_random(&trigger).ok()?;
                Some((category, url))
            })
        };
        match picked {
            Some((Category::MediaApi, url)) => self.send_from_api(&url).await,
            Some((Category::DirectUrl, url)) => self.send_from_direct(&url).await,
            Some((Category::TextApi, url)) => self.send_from_text(&url).await,
            None => vec![Reply::plain("暂无可用的API或直接图片/视频URL或文本API")],
        }
    }

    /// Pick a random text trigger and resolve it once.
    pub async fn send_random_text(&self) -> Vec<Reply> {
        if let Some(notice) = self.disabled_guard() {
            return vec![notice];
        }
        let picked = {
            let registry = self.registry.read().await;
            registry
                .pick_random_text_trigger()
                .ok()
                .and_then(|trigger| registry.pick_random(&trigger).ok())
        };
        match picked {
            Some(url) => self.send_from_text(&url).await,
            None => vec![Reply::plain("暂无可用的文本API")],
        }
    }

    /// Batch send: `count` independent resolutions of a media trigger,
    /// re-sampling the endpoint per item, packaged per the forward-bundle
    /// threshold.
    pub async fn batch_send(&self, trigger: &str, count: Option<usize>) -> Vec<Reply> {
        if let Some(notice) = self.disabled_guard() {
            return vec![notice];
        }
        let category = {
            let registry = self.registry.read().await;
            registry
                .category_of(trigger)
                .filter(|category| *category != Category::TextApi)
        };
        let Some(category) = category else {
            return vec![Reply::plain(format!(
                "触发指令 '{}' 不存在或不是图片/视频类型",
                normalize(trigger),
            ))];
        };

        let count = self.config.effective_count(count);
        let mut items = Vec::new();
        for _ in 0..count {
            let url = {
                let registry = self.registry.read().await;
                registry.pick_random(trigger).ok()
            };
            let Some(url) = url else { break };
            match category {
                Category::MediaApi => items.extend(media::resolve_api(&self.client, &url).await),
                _ => match media::resolve_direct(&self.client, &url).await {
                    Ok(item) => items.push(item),
                    Err(err) => {
                        tracing::warn!(url = %url, %err, "direct media resolution failed");
                    }
                },
            }
        }

        if items.is_empty() {
            return vec![Reply::plain("未能获取任何图片/视频")];
        }
        package_media(items, count, &self.config.display_name)
    }

    /// Probe every endpoint whose trigger contains [`SERVER_KEYWORD`] and
    /// assemble the per-endpoint report plus aggregate statistics.
    pub async fn probe_servers(&self) -> Vec<Reply> {
        if let Some(notice) = self.disabled_guard() {
            return vec![notice];
        }
        let endpoints = {
            let registry = self.registry.read().await;
            registry.endpoints_matching(SERVER_KEYWORD)
        };
        diagnostics::probe_endpoints(&self.client, endpoints).await
    }

    /// Usage text for operators.
    pub fn help(&self) -> Reply {
        Reply::plain(HELP_TEXT)
    }

    /// Bare-message hook: exact case-insensitive match of the whole message
    /// against registered triggers, then the reserved commands.
    ///
    /// `Some` means the message was handled and the host should stop
    /// propagation; `None` means it was not ours.
    pub async fn dispatch(&self, message: &str) -> Option<Vec<Reply>> {
        if !self.is_enabled() {
            return None;
        }
        let normalized = normalize(message);
        let picked = {
            let registry = self.registry.read().await;
            registry.category_of(&normalized).and_then(|category| {
                registry
                    .pick_random(&normalized)
                    .ok()
                    .map(|url| (category, url))
            })
        };
        if let Some((category, url)) = picked {
            return Some(match category {
                Category::MediaApi => self.send_from_api(&url).await,
                Category::DirectUrl => self.send_from_direct(&url).await,
                Category::TextApi => self.send_from_text(&url).await,
            });
        }
        match normalized.as_str() {
            RANDOM_MEDIA_COMMAND => Some(self.send_random().await),
            RANDOM_TEXT_COMMAND => Some(self.send_random_text().await),
            PROBE_SERVERS_COMMAND => Some(self.probe_servers().await),
            _ => None,
        }
    }

    /// One media-API resolution, packaged under the single-send rule.
    async fn send_from_api(&self, api_url: &str) -> Vec<Reply> {
        let items = media::resolve_api(&self.client, api_url).await;
        if items.is_empty() {
            return vec![Reply::plain(format!(
                "未能获取任何有效的图片/视频: {api_url}"
            ))];
        }
        package_media(items, 1, &self.config.display_name)
    }

    async fn send_from_direct(&self, url: &str) -> Vec<Reply> {
        match media::resolve_direct(&self.client, url).await {
            Ok(item) => vec![Reply::media(item)],
            Err(Error::UpstreamHttp { .. }) => {
                vec![Reply::plain(format!("获取最终资源失败: {url}"))]
            }
            Err(Error::UpstreamTimeout | Error::UpstreamNetwork(_)) => {
                vec![Reply::plain("发送图片/视频失败: 网络错误")]
            }
            Err(err) => vec![Reply::plain(format!("发送图片/视频失败: {err}"))],
        }
    }

    async fn send_from_text(&self, url: &str) -> Vec<Reply> {
        match text::fetch(&self.client, url).await {
            Ok(content) if content.is_empty() => vec![Reply::plain("文本API返回空内容")],
            Ok(content) => vec![Reply::plain(content)],
            Err(Error::UpstreamHttp { status }) => {
                vec![Reply::plain(format!("文本API请求失败，状态码: {status}"))]
            }
            Err(Error::UpstreamTimeout) => vec![Reply::plain("文本API请求超时")],
            Err(Error::UpstreamNetwork(_)) => vec![Reply::plain("发送文本失败: 网络错误")],
            Err(err) => vec![Reply::plain(format!("发送文本失败: {err}"))],
        }
    }
}

/// Wording for administrative command failures.
fn admin_error_text(err: &Error) -> String {
    match err {
        Error::UnknownTrigger(_) => "触发指令不存在".to_string(),
        Error::IndexOutOfRange { index, .. } => format!("索引 {index} 超出范围"),
        other => format!("操作失败: {other}"),
    }
}

/// Packaging rule: more than two requested or more than two resolved means
/// one grouped forward bundle; otherwise each item is its own reply.
fn package_media(items: Vec<ResolvedMedia>, count: usize, display_name: &str) -> Vec<Reply> {
    if count > 2 || items.len() > 2 {
        let nodes = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| ForwardNode {
                name: format!("{display_name} - {}{}", item.kind.label(), i + 1),
                content: vec![item.into()],
            })
            .collect();
        vec![Reply::Forward(nodes)]
    } else {
        items.into_iter().map(Reply::media).collect()
    }
}

const HELP_TEXT: &str = "\
发图/发视频/发文本插件使用帮助:

1. 开启看图 / 关闭看图 - 开关整个功能
2. 看图列表 - 查看所有已注册的触发指令
3. 增加看图 [触发指令] [地址] - 探测地址类型并注册
4. 增加文本 [触发指令] [地址] - 强制注册为文本API
5. 修改看图地址 [触发指令] [索引] [新地址] - 替换第 N 个地址
6. 删除看图 [触发指令] [索引] - 删除一个地址，索引不填删除整个指令
7. 随机看图 / 随机文本 - 随机挑一个触发指令发送
8. 图片 [触发指令] - 获取一张图片/视频
9. 文本 [触发指令] - 获取一段文本
10. 看图 [触发指令] [数量] - 批量获取，数量>2 时打包转发
11. 查看所有服务器 - 探测所有包含\"服务器\"的触发指令并汇总
12. [触发指令] - 直接发送已注册的触发指令即可触发

注意事项:
- 功能开启后才会响应
- 每个触发指令可以对应多个地址，调用时随机选择一个";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaKind;

    fn item(url: &str, kind: MediaKind) -> ResolvedMedia {
        ResolvedMedia {
            url: url.to_string(),
            kind,
        }
    }

    #[test]
    fn one_item_one_standalone_reply() {
        let replies = package_media(vec![item("https://a/1.jpg", MediaKind::Image)], 1, "bot");
        assert_eq!(replies.len(), 1);
        assert!(matches!(&replies[0], Reply::Chain(items) if items.len() == 1));
    }

    #[test]
    fn two_items_stay_standalone() {
        let replies = package_media(
            vec![
                item("https://a/1.jpg", MediaKind::Image),
                item("https://a/2.mp4", MediaKind::Video),
            ],
            2,
            "bot",
        );
        assert_eq!(replies.len(), 2);
        assert!(replies.iter().all(|r| matches!(r, Reply::Chain(_))));
    }

    #[test]
    fn high_count_bundles_even_partial_results() {
        // count=3 with a single resolved item still forwards.
        let replies = package_media(vec![item("https://a/1.jpg", MediaKind::Image)], 3, "bot");
        assert_eq!(replies.len(), 1);
        assert!(matches!(&replies[0], Reply::Forward(nodes) if nodes.len() == 1));
    }

    #[test]
    fn forward_nodes_are_labeled_by_kind_in_order() {
        let replies = package_media(
            vec![
                item("https://a/1.jpg", MediaKind::Image),
                item("https://a/2.mp4", MediaKind::Video),
                item("https://a/3.jpg", MediaKind::Image),
            ],
            1,
            "relay",
        );
        let Reply::Forward(nodes) = &replies[0] else {
            panic!("expected forward bundle");
        };
        assert_eq!(nodes[0].name, "relay - 图片1");
        assert_eq!(nodes[1].name, "relay - 视频2");
        assert_eq!(nodes[2].name, "relay - 图片3");
    }

    fn service_with(config: RelayConfig) -> RelayService {
        RelayService::new(config).expect("service construction")
    }

    fn temp_config(dir: &tempfile::TempDir) -> RelayConfig {
        RelayConfig {
            data_file: dir.path().join("api_config.json"),
            ..RelayConfig::default()
        }
    }

    #[tokio::test]
    async fn disabled_flag_short_circuits_operations() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(RelayConfig {
            enabled: false,
            ..temp_config(&dir)
        });
        let replies = service.list().await;
        assert_eq!(replies, vec![Reply::plain(DISABLED_NOTICE)]);
        assert_eq!(service.dispatch("anything").await, None);

        service.enable();
        assert!(service.is_enabled());
        assert_ne!(service.list().await, vec![Reply::plain(DISABLED_NOTICE)]);
    }

    #[tokio::test]
    async fn add_text_registers_persists_and_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(&dir);
        let service = service_with(config.clone());

        let replies = service.add_text("每日一言", "https://v1.hitokoto.cn/").await;
        assert!(matches!(&replies[0], Reply::Plain(text) if text.contains("成功添加文本API")));

        // A fresh service over the same data file sees the trigger.
        let reloaded = service_with(config);
        let listing = reloaded.list().await;
        assert!(matches!(&listing[0], Reply::Plain(text) if text.contains("每日一言")));
    }

    #[tokio::test]
    async fn modify_out_of_range_reports_index_error() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(temp_config(&dir));
        service.add_text("quote", "https://q.example").await;

        let replies = service.modify("quote", 5, "https://new.example").await;
        assert_eq!(replies, vec![Reply::plain("索引 5 超出范围")]);

        let replies = service.modify("missing", 1, "https://new.example").await;
        assert_eq!(replies, vec![Reply::plain("触发指令不存在")]);
    }

    #[tokio::test]
    async fn delete_whole_trigger_then_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(temp_config(&dir));
        service.add_text("quote", "https://q.example").await;

        let replies = service.delete("QUOTE", None).await;
        assert!(matches!(&replies[0], Reply::Plain(text) if text.contains("成功删除")));

        let replies = service.delete("quote", None).await;
        assert_eq!(replies, vec![Reply::plain("触发指令不存在")]);
    }

    #[tokio::test]
    async fn unknown_trigger_sends_explanatory_replies() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(temp_config(&dir));

        let replies = service.send_by_trigger("nope").await;
        assert!(matches!(&replies[0], Reply::Plain(text) if text.contains("不存在")));
        let replies = service.send_text_by_trigger("nope").await;
        assert!(matches!(&replies[0], Reply::Plain(text) if text.contains("不存在")));
        let replies = service.batch_send("nope", Some(3)).await;
        assert!(matches!(&replies[0], Reply::Plain(text) if text.contains("不存在")));
    }

    #[tokio::test]
    async fn media_commands_reject_text_triggers() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(temp_config(&dir));
        service.add_text("quote", "https://q.example").await;

        let replies = service.send_by_trigger("quote").await;
        assert!(matches!(&replies[0], Reply::Plain(text) if text.contains("不是图片/视频类型")));
    }

    #[tokio::test]
    async fn empty_registry_random_sends_report_nothing_available() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(temp_config(&dir));

        let replies = service.send_random().await;
        assert!(matches!(&replies[0], Reply::Plain(text) if text.contains("暂无可用")));
        let replies = service.send_random_text().await;
        assert_eq!(replies, vec![Reply::plain("暂无可用的文本API")]);
    }

    #[tokio::test]
    async fn dispatch_ignores_unregistered_messages() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(temp_config(&dir));
        assert_eq!(service.dispatch("hello world").await, None);
        // Reserved literal is handled even with an empty registry.
        let handled = service.dispatch("随机文本").await;
        assert_eq!(handled, Some(vec![Reply::plain("暂无可用的文本API")]));
    }

    #[tokio::test]
    async fn probe_servers_with_no_matching_triggers() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(temp_config(&dir));
        let replies = service.probe_servers().await;
        assert_eq!(
            replies,
            vec![Reply::plain("没有找到包含'服务器'关键词的API")]
        );
    }
}

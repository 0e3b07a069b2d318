//! Trigger registry: keyword → ordered endpoint lists, three categories.
//!
//! Triggers are stored lower-cased and are unique across the union of the
//! three category maps. Every per-trigger list is non-empty by
//! construction; removing the last entry drops the trigger key.
//!
//! Persisted as a JSON document (`api_list` / `direct_url_list` /
//! `text_api_list`). Legacy documents stored single strings instead of
//! arrays; those are upgraded to one-element lists on load.

use crate::error::{Error, Result};
use anyhow::Context as _;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Endpoint category, decided once at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Indirection layer: the endpoint returns URLs of actual media.
    MediaApi,
    /// The fetched response (after redirects) is the media itself.
    DirectUrl,
    /// The endpoint returns a textual payload.
    TextApi,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::MediaApi, Category::DirectUrl, Category::TextApi];

    /// Operator-facing label, matching the wording of the persisted
    /// deployments this replaces.
    pub fn label(self) -> &'static str {
        match self {
            Category::MediaApi => "图片/视频API",
            Category::DirectUrl => "直接图片/视频URL",
            Category::TextApi => "文本API",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One registered endpoint, as flattened for the diagnostic fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub trigger: String,
    pub category: Category,
    pub url: String,
}

/// In-memory trigger registry.
///
/// `BTreeMap` keeps listing and fan-out order deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerRegistry {
    media_apis: BTreeMap<String, Vec<String>>,
    direct_urls: BTreeMap<String, Vec<String>>,
    text_apis: BTreeMap<String, Vec<String>>,
}

/// Lower-case a trigger for storage and lookup.
pub fn normalize(trigger: &str) -> String {
    trigger.trim().to_lowercase()
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, category: Category) -> &BTreeMap<String, Vec<String>> {
        match category {
            Category::MediaApi => &self.media_apis,
            Category::DirectUrl => &self.direct_urls,
            Category::TextApi => &self.text_apis,
        }
    }

    fn map_mut(&mut self, category: Category) -> &mut BTreeMap<String, Vec<String>> {
        match category {
            Category::MediaApi => &mut self.media_apis,
            Category::DirectUrl => &mut self.direct_urls,
            Category::TextApi => &mut self.text_apis,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.media_apis.is_empty() && self.direct_urls.is_empty() && self.text_apis.is_empty()
    }

    /// Category holding `trigger`, if registered. Lookup order is
    /// media-api → direct-url → text-api, matching dispatch order.
    pub fn category_of(&self, trigger: &str) -> Option<Category> {
        let key = normalize(trigger);
        Category::ALL
            .into_iter()
            .find(|category| self.map(*category).contains_key(&key))
    }

    /// Endpoint list for `trigger` in whatever category it lives in.
    pub fn urls(&self, trigger: &str) -> Option<&[String]> {
        let key = normalize(trigger);
        Category::ALL
            .into_iter()
            .find_map(|category| self.map(category).get(&key).map(Vec::as_slice))
    }

    /// Append `url` under `trigger` in `category`, creating the trigger if
    /// absent. Re-registration under a different category is rejected.
    pub fn insert(&mut self, category: Category, trigger: &str, url: &str) -> Result<()> {
        let key = normalize(trigger);
        if let Some(existing) = self.category_of(&key)
            && existing != category
        {
            return Err(Error::CategoryConflict {
                trigger: key,
                existing,
            });
        }
        self.map_mut(category)
            .entry(key)
            .or_default()
            .push(url.to_string());
        Ok(())
    }

    /// Replace the `index`-th (1-based) endpoint of `trigger`.
    pub fn modify(&mut self, trigger: &str, index: usize, new_url: &str) -> Result<()> {
        let key = normalize(trigger);
        let category = self
            .category_of(&key)
            .ok_or_else(|| Error::UnknownTrigger(key.clone()))?;
        let urls = self
            .map_mut(category)
            .get_mut(&key)
            .ok_or_else(|| Error::UnknownTrigger(key.clone()))?;
        if index == 0 || index > urls.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: urls.len(),
            });
        }
        urls[index - 1] = new_url.to_string();
        Ok(())
    }

    /// Remove one endpoint (1-based `index`) or, with `None`, the whole
    /// trigger. Removing the last endpoint drops the trigger key.
    pub fn remove(&mut self, trigger: &str, index: Option<usize>) -> Result<()> {
        let key = normalize(trigger);
        let category = self
            .category_of(&key)
            .ok_or_else(|| Error::UnknownTrigger(key.clone()))?;
        let map = self.map_mut(category);
        match index {
            None => {
                map.remove(&key);
            }
            Some(index) => {
                let urls = map.get_mut(&key).ok_or(Error::UnknownTrigger(key.clone()))?;
                if index == 0 || index > urls.len() {
                    return Err(Error::IndexOutOfRange {
                        index,
                        len: urls.len(),
                    });
                }
                urls.remove(index - 1);
                if urls.is_empty() {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }

    /// Uniformly pick one endpoint of `trigger` (with replacement across
    /// calls; batch sends re-sample per item).
    pub fn pick_random(&self, trigger: &str) -> Result<String> {
        let urls = self
            .urls(trigger)
            .ok_or_else(|| Error::UnknownTrigger(normalize(trigger)))?;
        let mut rng = rand::rng();
        urls.choose(&mut rng)
            .cloned()
            .ok_or_else(|| Error::UnknownTrigger(normalize(trigger)))
    }

    /// Uniformly pick one trigger from the union of all three maps.
    pub fn pick_random_trigger(&self) -> Result<String> {
        let all: Vec<&String> = self
            .media_apis
            .keys()
            .chain(self.direct_urls.keys())
            .chain(self.text_apis.keys())
            .collect();
        let mut rng = rand::rng();
        all.choose(&mut rng)
            .map(|s| (*s).clone())
            .ok_or(Error::EmptyRegistry)
    }

    /// Uniformly pick one trigger from the text-API map only.
    pub fn pick_random_text_trigger(&self) -> Result<String> {
        let keys: Vec<&String> = self.text_apis.keys().collect();
        let mut rng = rand::rng();
        keys.choose(&mut rng)
            .map(|s| (*s).clone())
            .ok_or(Error::EmptyRegistry)
    }

    /// Iterate `(trigger, urls)` pairs of one category.
    pub fn entries(&self, category: Category) -> impl Iterator<Item = (&str, &[String])> {
        self.map(category)
            .iter()
            .map(|(trigger, urls)| (trigger.as_str(), urls.as_slice()))
    }

    /// Flatten every endpoint whose trigger contains `keyword`, in
    /// category order. Used by the diagnostic fan-out.
    pub fn endpoints_matching(&self, keyword: &str) -> Vec<Endpoint> {
        let mut endpoints = Vec::new();
        for category in Category::ALL {
            for (trigger, urls) in self.entries(category) {
                if trigger.contains(keyword) {
                    for url in urls {
                        endpoints.push(Endpoint {
                            trigger: trigger.to_string(),
                            category,
                            url: url.clone(),
                        });
                    }
                }
            }
        }
        endpoints
    }

    /// Operator-facing listing grouped by category.
    pub fn render_list(&self) -> String {
        let mut out = String::from("可用API列表:\n");
        for (trigger, urls) in self.entries(Category::MediaApi) {
            out.push_str(&format!("触发指令: {trigger}\n对应地址: {}\n", urls.join(", ")));
        }
        out.push_str("\n可用直接图片/视频URL列表:\n");
        for (trigger, urls) in self.entries(Category::DirectUrl) {
            out.push_str(&format!("触发指令: {trigger}\n基础地址: {}\n", urls.join(", ")));
        }
        out.push_str("\n可用文本API列表:\n");
        for (trigger, urls) in self.entries(Category::TextApi) {
            out.push_str(&format!("触发指令: {trigger}\n对应地址: {}\n", urls.join(", ")));
        }
        out
    }

    /// Load from the JSON document at `path`.
    ///
    /// A missing file yields an empty registry. A malformed document also
    /// yields an empty registry (logged), so one corrupt write never bricks
    /// the plugin.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::error!(path = %path.display(), %err, "failed to read trigger registry");
                return Self::default();
            }
        };
        match serde_json::from_str::<RegistryDocument>(&raw) {
            Ok(document) => document.into(),
            Err(err) => {
                tracing::error!(path = %path.display(), %err, "malformed trigger registry document");
                Self::default()
            }
        }
    }

    /// Persist to `path` as a whole-file overwrite.
    ///
    /// On failure the in-memory state stands; in-memory and on-disk state
    /// may diverge until the next successful save.
    pub fn save(&self, path: &Path) -> Result<()> {
        let document = RegistryDocument::from(self);
        let raw = serde_json::to_string_pretty(&document)
            .with_context(|| "failed to serialize trigger registry")?;
        std::fs::write(path, raw).map_err(|err| {
            tracing::error!(path = %path.display(), %err, "failed to write trigger registry");
            Error::ConfigPersistence(err.to_string())
        })
    }
}

/// Endpoint list that also accepts a bare string on deserialization
/// (legacy document format).
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
struct UrlList(Vec<String>);

impl<'de> Deserialize<'de> for UrlList {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Many(Vec<String>),
            One(String),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Many(urls) => UrlList(urls),
            Raw::One(url) => UrlList(vec![url]),
        })
    }
}

/// On-disk shape of the registry.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryDocument {
    #[serde(default)]
    api_list: BTreeMap<String, UrlList>,
    #[serde(default)]
    direct_url_list: BTreeMap<String, UrlList>,
    #[serde(default)]
    text_api_list: BTreeMap<String, UrlList>,
}

fn into_map(raw: BTreeMap<String, UrlList>) -> BTreeMap<String, Vec<String>> {
    raw.into_iter()
        .filter(|(_, urls)| !urls.0.is_empty())
        .map(|(trigger, urls)| (normalize(&trigger), urls.0))
        .collect()
}

impl From<RegistryDocument> for TriggerRegistry {
    fn from(document: RegistryDocument) -> Self {
        Self {
            media_apis: into_map(document.api_list),
            direct_urls: into_map(document.direct_url_list),
            text_apis: into_map(document.text_api_list),
        }
    }
}

impl From<&TriggerRegistry> for RegistryDocument {
    fn from(registry: &TriggerRegistry) -> Self {
        let wrap = |map: &BTreeMap<String, Vec<String>>| {
            map.iter()
                .map(|(trigger, urls)| (trigger.clone(), UrlList(urls.clone())))
                .collect()
        };
        Self {
            api_list: wrap(&registry.media_apis),
            direct_url_list: wrap(&registry.direct_urls),
            text_api_list: wrap(&registry.text_apis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TriggerRegistry {
        let mut registry = TriggerRegistry::new();
        registry
            .insert(Category::MediaApi, "Cat", "https://a.example/api")
            .unwrap();
        registry
            .insert(Category::MediaApi, "cat", "https://b.example/api")
            .unwrap();
        registry
            .insert(Category::DirectUrl, "dog", "https://c.example/dog.jpg")
            .unwrap();
        registry
            .insert(Category::TextApi, "quote", "https://d.example/hitokoto")
            .unwrap();
        registry
    }

    #[test]
    fn insert_normalizes_and_appends() {
        let registry = sample();
        assert_eq!(registry.category_of("CAT"), Some(Category::MediaApi));
        assert_eq!(
            registry.urls("cat").unwrap(),
            ["https://a.example/api", "https://b.example/api"]
        );
    }

    #[test]
    fn cross_category_insert_is_rejected() {
        let mut registry = sample();
        let err = registry
            .insert(Category::TextApi, "cat", "https://x.example")
            .unwrap_err();
        assert!(matches!(err, Error::CategoryConflict { .. }));
        // State unchanged.
        assert_eq!(registry, sample());
    }

    #[test]
    fn modify_respects_one_based_index() {
        let mut registry = sample();
        registry.modify("cat", 2, "https://new.example").unwrap();
        assert_eq!(
            registry.urls("cat").unwrap(),
            ["https://a.example/api", "https://new.example"]
        );

        for bad in [0, 3] {
            let err = registry.modify("cat", bad, "https://x").unwrap_err();
            assert!(matches!(err, Error::IndexOutOfRange { len: 2, .. }));
        }
        let err = registry.modify("missing", 1, "https://x").unwrap_err();
        assert!(matches!(err, Error::UnknownTrigger(_)));
    }

    #[test]
    fn remove_single_entry_keeps_order() {
        let mut registry = sample();
        registry.remove("cat", Some(1)).unwrap();
        assert_eq!(registry.urls("cat").unwrap(), ["https://b.example/api"]);
    }

    #[test]
    fn removing_last_entry_drops_trigger() {
        let mut registry = sample();
        registry.remove("dog", Some(1)).unwrap();
        assert_eq!(registry.category_of("dog"), None);

        registry.remove("cat", None).unwrap();
        assert_eq!(registry.category_of("cat"), None);
    }

    #[test]
    fn remove_out_of_range_leaves_state() {
        let mut registry = sample();
        let err = registry.remove("dog", Some(2)).unwrap_err();
        assert!(matches!(err, Error::IndexOutOfRange { index: 2, len: 1 }));
        assert_eq!(registry, sample());
    }

    #[test]
    fn pick_random_returns_registered_url() {
        let registry = sample();
        for _ in 0..16 {
            let url = registry.pick_random("cat").unwrap();
            assert!(registry.urls("cat").unwrap().contains(&url));
        }
    }

    #[test]
    fn pick_random_trigger_on_empty_registry_fails() {
        let registry = TriggerRegistry::new();
        assert!(matches!(
            registry.pick_random_trigger(),
            Err(Error::EmptyRegistry)
        ));
        assert!(matches!(
            registry.pick_random_text_trigger(),
            Err(Error::EmptyRegistry)
        ));
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api_config.json");
        let registry = sample();
        registry.save(&path).unwrap();
        assert_eq!(TriggerRegistry::load(&path), registry);
    }

    #[test]
    fn load_upgrades_legacy_single_strings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api_config.json");
        std::fs::write(
            &path,
            r#"{
                "api_list": {"Cat": "https://a.example/api"},
                "direct_url_list": {},
                "text_api_list": {"quote": ["https://d.example"]}
            }"#,
        )
        .unwrap();
        let registry = TriggerRegistry::load(&path);
        assert_eq!(registry.urls("cat").unwrap(), ["https://a.example/api"]);
        assert_eq!(registry.category_of("quote"), Some(Category::TextApi));
    }

    #[test]
    fn load_of_missing_or_malformed_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(TriggerRegistry::load(&dir.path().join("absent.json")).is_empty());

        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(TriggerRegistry::load(&path).is_empty());
    }

    #[test]
    fn endpoints_matching_flattens_by_keyword() {
        let mut registry = sample();
        registry
            .insert(Category::TextApi, "主服务器", "https://s.example/status")
            .unwrap();
        let endpoints = registry.endpoints_matching("服务器");
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].category, Category::TextApi);
        assert_eq!(endpoints[0].trigger, "主服务器");
    }
}

//! Route manifest backed by `rune.toml`.

use parking_lot::Mutex;
use rune_config::ManifestConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::host::RouteManifest;

/// Suffix of page script paths.
pub const PAGE_SCRIPT_SUFFIX: &str = ".js";

/// Strips a leading `/` and the script suffix from a url.
pub fn normalize_url(url: &str) -> &str {
    let url = url.trim_start_matches('/');
    url.strip_suffix(PAGE_SCRIPT_SUFFIX).unwrap_or(url)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamedRouteEntry {
    name: String,
    page_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FullPathEntry {
    url: String,
    full_path: String,
}

/// Manifest built from the `[manifest]` config section.
#[derive(Debug)]
pub struct StaticManifest {
    entry: Option<String>,
    pages: Vec<String>,
    named_routes: Mutex<BTreeMap<String, String>>,
    full_paths: Mutex<BTreeMap<String, String>>,
}

impl StaticManifest {
    pub fn new(config: &ManifestConfig) -> Self {
        Self {
            entry: config.entry_page().map(|entry| normalize_url(entry).to_string()),
            pages: config
                .pages
                .iter()
                .map(|page| normalize_url(page).to_string())
                .collect(),
            named_routes: Mutex::new(
                config
                    .named_routes
                    .iter()
                    .map(|(name, url)| (name.clone(), normalize_url(url).to_string()))
                    .collect(),
            ),
            full_paths: Mutex::new(BTreeMap::new()),
        }
    }

    fn knows(&self, url: &str) -> bool {
        self.pages.iter().any(|page| page == url)
            || self.named_routes.lock().values().any(|page| page == url)
    }
}

impl RouteManifest for StaticManifest {
    fn page_path(&self, url: &str) -> Option<String> {
        let url = normalize_url(url);
        if url.is_empty() {
            return None;
        }
        if let Some(full) = self.full_paths.lock().get(url) {
            return Some(full.clone());
        }
        self.knows(url)
            .then(|| format!("{url}{PAGE_SCRIPT_SUFFIX}"))
    }

    fn entry(&self) -> Option<String> {
        self.entry.clone()
    }

    fn named_route_path(&self, name: &str) -> Option<String> {
        self.named_routes
            .lock()
            .get(name)
            .map(|url| format!("{url}{PAGE_SCRIPT_SUFFIX}"))
    }

    fn named_router_info(&self) -> Option<serde_json::Value> {
        let routes = self.named_routes.lock();
        if routes.is_empty() {
            return None;
        }
        let entries: Vec<NamedRouteEntry> = routes
            .iter()
            .map(|(name, url)| NamedRouteEntry {
                name: name.clone(),
                page_url: url.clone(),
            })
            .collect();
        serde_json::to_value(entries).ok()
    }

    fn restore_named_router_info(&self, info: serde_json::Value) {
        match serde_json::from_value::<Vec<NamedRouteEntry>>(info) {
            Ok(entries) => {
                let mut routes = self.named_routes.lock();
                for entry in entries {
                    routes.insert(entry.name, normalize_url(&entry.page_url).to_string());
                }
            }
            Err(err) => debug!(%err, "ignoring malformed named router info"),
        }
    }

    fn full_path_info(&self) -> Option<serde_json::Value> {
        let paths = self.full_paths.lock();
        if paths.is_empty() {
            return None;
        }
        let entries: Vec<FullPathEntry> = paths
            .iter()
            .map(|(url, full_path)| FullPathEntry {
                url: url.clone(),
                full_path: full_path.clone(),
            })
            .collect();
        serde_json::to_value(entries).ok()
    }

    fn restore_full_path_info(&self, info: serde_json::Value) {
        match serde_json::from_value::<Vec<FullPathEntry>>(info) {
            Ok(entries) => {
                let mut paths = self.full_paths.lock();
                for entry in entries {
                    paths.insert(normalize_url(&entry.url).to_string(), entry.full_path);
                }
            }
            Err(err) => debug!(%err, "ignoring malformed full path info"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest() -> StaticManifest {
        let mut config = ManifestConfig {
            pages: vec!["pages/index".into(), "/pages/detail.js".into()],
            ..Default::default()
        };
        config
            .named_routes
            .insert("settings".into(), "pages/settings".into());
        StaticManifest::new(&config)
    }

    #[test]
    fn resolves_registered_pages_in_any_spelling() {
        let manifest = manifest();
        assert_eq!(manifest.page_path("pages/index").as_deref(), Some("pages/index.js"));
        assert_eq!(manifest.page_path("/pages/detail").as_deref(), Some("pages/detail.js"));
        assert_eq!(manifest.page_path("pages/detail.js").as_deref(), Some("pages/detail.js"));
        assert_eq!(manifest.page_path("pages/missing"), None);
        assert_eq!(manifest.page_path(""), None);
    }

    #[test]
    fn entry_defaults_to_first_page() {
        assert_eq!(manifest().entry().as_deref(), Some("pages/index"));
    }

    #[test]
    fn named_routes_resolve_and_round_trip() {
        let manifest = manifest();
        assert_eq!(
            manifest.named_route_path("settings").as_deref(),
            Some("pages/settings.js")
        );
        assert_eq!(manifest.page_path("pages/settings").as_deref(), Some("pages/settings.js"));
        assert_eq!(manifest.named_route_path("profile"), None);

        let info = manifest.named_router_info().unwrap();
        assert_eq!(info, json!([{"name": "settings", "pageUrl": "pages/settings"}]));

        manifest.restore_named_router_info(json!([{"name": "profile", "pageUrl": "pages/profile"}]));
        assert_eq!(
            manifest.named_route_path("profile").as_deref(),
            Some("pages/profile.js")
        );
    }

    #[test]
    fn restored_full_paths_take_precedence() {
        let manifest = manifest();
        assert!(manifest.full_path_info().is_none());
        manifest.restore_full_path_info(json!([
            {"url": "pages/index", "fullPath": "bundle/pages/index.js"}
        ]));
        assert_eq!(
            manifest.page_path("pages/index").as_deref(),
            Some("bundle/pages/index.js")
        );
        manifest.restore_full_path_info(json!("not a list"));
        assert!(manifest.full_path_info().is_some());
    }
}

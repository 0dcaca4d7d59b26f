//! Rune configuration system
//!
//! This crate provides centralized configuration management for the Rune runtime,
//! loading router and manifest settings from `rune.toml` with environment overrides.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Upper bound on live pages and on queued navigation intents.
pub const DEFAULT_MAX_ROUTER_STACK: usize = 32;

/// Main configuration structure for the Rune runtime
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RuneConfig {
    /// Page router settings
    pub router: RouterConfig,
    /// Page manifest (logical url to page script mapping)
    pub manifest: ManifestConfig,
}

/// Page router configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Number of pages after which further pushes are rejected
    pub max_stack_size: usize,
    /// Maximum number of navigation intents waiting in the router queue
    pub max_queue_depth: usize,
    /// Refuse a back navigation that would pop the last page
    pub disallow_pop_last_page: bool,
    /// Label of the confirm button on the leave-confirmation dialog
    pub dialog_confirm_text: String,
    /// Label of the cancel button on the leave-confirmation dialog
    pub dialog_cancel_text: String,
}

/// Page manifest configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ManifestConfig {
    /// Entry page url. Falls back to the first entry of `pages`.
    pub entry: Option<String>,
    /// Logical page urls, e.g. `pages/index`
    pub pages: Vec<String>,
    /// Named routes, route name to page url
    pub named_routes: BTreeMap<String, String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_stack_size: DEFAULT_MAX_ROUTER_STACK,
            max_queue_depth: DEFAULT_MAX_ROUTER_STACK,
            disallow_pop_last_page: false,
            dialog_confirm_text: "OK".to_string(),
            dialog_cancel_text: "Cancel".to_string(),
        }
    }
}

impl ManifestConfig {
    /// Entry page url, if any page is configured.
    pub fn entry_page(&self) -> Option<&str> {
        self.entry
            .as_deref()
            .filter(|entry| !entry.is_empty())
            .or_else(|| self.pages.first().map(String::as_str))
    }
}

impl RuneConfig {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    /// * `path` - Path to the rune.toml configuration file
    ///
    /// # Returns
    /// * `Ok(RuneConfig)` - Successfully loaded configuration
    /// * `Err(String)` - Error message if loading failed
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {}", e))
    }

    /// Load configuration from the default location (rune.toml in the current directory)
    /// or return default configuration if file doesn't exist
    pub fn load_or_default() -> Self {
        Self::load_from_file("rune.toml").unwrap_or_default()
    }

    /// Merge configuration with environment variables
    ///
    /// Environment variables take precedence over configuration file values.
    pub fn merge_with_env(&mut self) {
        if let Ok(val) = std::env::var("RUNE_ROUTER_MAX_STACK") {
            if let Ok(size) = val.parse::<usize>() {
                self.router.max_stack_size = size;
            }
        }
        if let Ok(val) = std::env::var("RUNE_ROUTER_MAX_QUEUE") {
            if let Ok(depth) = val.parse::<usize>() {
                self.router.max_queue_depth = depth;
            }
        }
        if let Ok(val) = std::env::var("RUNE_ROUTER_DISALLOW_POP_LAST") {
            self.router.disallow_pop_last_page = val == "1" || val.eq_ignore_ascii_case("true");
        }
        if let Ok(entry) = std::env::var("RUNE_MANIFEST_ENTRY") {
            self.manifest.entry = Some(entry);
        }
    }

    /// Load configuration with environment variable overrides
    ///
    /// This is the recommended way to load configuration:
    /// 1. Load from rune.toml (or use defaults if not found)
    /// 2. Override with environment variables if present
    pub fn load() -> Self {
        let mut config = Self::load_or_default();
        config.merge_with_env();
        config
    }
}

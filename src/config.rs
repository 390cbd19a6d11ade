//! Persistent application configuration model and defaults.

use std::time::Duration;

use crate::providers::ProviderKind;

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Cover search and write-back behavior.
    pub search: SearchConfig,
    #[serde(default)]
    /// HTTP client settings shared by all providers.
    pub network: NetworkConfig,
}

/// Cover search preferences.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SearchConfig {
    /// Replace covers already embedded in a track.
    #[serde(default)]
    pub overwrite_cover: bool,
    /// Only replace an embedded cover with a strictly larger one.
    #[serde(default = "default_true")]
    pub overwrite_only_if_higher: bool,
    /// Collect candidates from every provider and let the user pick.
    #[serde(default)]
    pub manual_image_selection: bool,
    /// Reuse the previous track's result for tracks of the same album folder.
    #[serde(default = "default_true")]
    pub auto_reuse_last_cover: bool,
    #[serde(default = "default_search_timeout_secs")]
    pub search_timeout_secs: u64,
    #[serde(default = "default_max_cover_dimension")]
    pub max_cover_dimension: u32,
    /// Providers in priority order.
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderEntry>,
}

/// One provider slot in the priority list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct ProviderEntry {
    pub kind: ProviderKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// HTTP client preferences.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NetworkConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl SearchConfig {
    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs.max(1))
    }

    #[cfg(test)]
    pub fn enabled_providers(&self) -> Vec<ProviderKind> {
        self.providers
            .iter()
            .filter(|entry| entry.enabled)
            .map(|entry| entry.kind)
            .collect()
    }

    /// Enables exactly `kinds`, in that order, and disables everything else.
    pub fn restrict_providers(&mut self, kinds: &[ProviderKind]) {
        let mut providers: Vec<ProviderEntry> = Vec::new();
        for kind in kinds {
            if providers.iter().all(|entry| entry.kind != *kind) {
                providers.push(ProviderEntry {
                    kind: *kind,
                    enabled: true,
                });
            }
        }
        for kind in ProviderKind::ALL {
            if providers.iter().all(|entry| entry.kind != kind) {
                providers.push(ProviderEntry {
                    kind,
                    enabled: false,
                });
            }
        }
        self.providers = providers;
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            overwrite_cover: false,
            overwrite_only_if_higher: true,
            manual_image_selection: false,
            auto_reuse_last_cover: true,
            search_timeout_secs: default_search_timeout_secs(),
            max_cover_dimension: default_max_cover_dimension(),
            providers: default_providers(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// Clamps numeric settings and normalizes the provider list.
///
/// Duplicate provider entries keep their first occurrence; providers missing from
/// the list are appended disabled so a saved file always names every provider.
pub fn sanitize_config(config: Config) -> Config {
    let mut sanitized = config;
    sanitized.search.search_timeout_secs = sanitized.search.search_timeout_secs.max(1);
    sanitized.search.max_cover_dimension = sanitized.search.max_cover_dimension.max(1);
    sanitized.network.connect_timeout_secs = sanitized.network.connect_timeout_secs.max(1);
    sanitized.network.read_timeout_secs = sanitized.network.read_timeout_secs.max(1);
    if sanitized.network.user_agent.trim().is_empty() {
        sanitized.network.user_agent = default_user_agent();
    }

    let mut providers: Vec<ProviderEntry> = Vec::with_capacity(ProviderKind::ALL.len());
    for entry in &sanitized.search.providers {
        if providers.iter().all(|existing| existing.kind != entry.kind) {
            providers.push(*entry);
        }
    }
    for kind in ProviderKind::ALL {
        if providers.iter().all(|existing| existing.kind != kind) {
            providers.push(ProviderEntry {
                kind,
                enabled: false,
            });
        }
    }
    sanitized.search.providers = providers;
    sanitized
}

fn default_true() -> bool {
    true
}

fn default_search_timeout_secs() -> u64 {
    10
}

fn default_max_cover_dimension() -> u32 {
    1000
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_read_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!(
        "discover-cover/{} (+https://github.com/discover-cover/discover-cover)",
        env!("CARGO_PKG_VERSION")
    )
}

fn default_providers() -> Vec<ProviderEntry> {
    ProviderKind::ALL
        .iter()
        .map(|kind| ProviderEntry {
            kind: *kind,
            enabled: true,
        })
        .collect()
}

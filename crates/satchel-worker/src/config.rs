use crate::fallback::FallbackFlavor;
use crate::strategy::PolicyTable;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub scope: ScopeConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub policy: PolicyTable,
    #[serde(default)]
    pub lifecycle: LifecycleSection,
    #[serde(default)]
    pub fallback: FallbackConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_admin_addr")]
    pub admin_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    pub url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Reachability probe target; defaults to the upstream root.
    #[serde(default)]
    pub probe_url: Option<String>,
}

/// Interception scope: which requests this worker may respond for.
#[derive(Debug, Clone, Deserialize)]
pub struct ScopeConfig {
    #[serde(default = "default_page_origin")]
    pub page_origin: String,
    /// Absolute URL prefix of the application. Same-origin requests are in
    /// scope regardless; cross-origin requests only under this prefix.
    #[serde(default = "default_scope_prefix")]
    pub prefix: String,
    /// Path of the cached application shell served for offline navigations.
    #[serde(default = "default_shell_path")]
    pub shell_path: String,
    /// Path suffixes classified as static assets. An explicit allowlist,
    /// matched case-insensitively; never inferred from MIME type.
    #[serde(default = "default_asset_extensions")]
    pub asset_extensions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Naming prefix for every store this application owns.
    #[serde(default = "default_cache_prefix")]
    pub prefix: String,
    /// Version tag embedded in the active store name. Bumping it makes all
    /// earlier stores stale.
    #[serde(default = "default_cache_version")]
    pub version: u32,
    #[serde(default = "default_max_store_bytes")]
    pub max_store_bytes: usize,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleSection {
    #[serde(default = "default_online_gate")]
    pub online_gate: bool,
    #[serde(default = "default_skip_waiting")]
    pub skip_waiting: bool,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    #[serde(default = "default_max_entry_age")]
    pub max_entry_age_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FallbackConfig {
    #[serde(default = "default_fallback_flavor")]
    pub flavor: FallbackFlavor,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Config {
            server: ServerConfig::default(),
            upstream: UpstreamConfig {
                url: "http://127.0.0.1:3000".to_string(),
                timeout_ms: default_timeout_ms(),
                probe_url: None,
            },
            scope: ScopeConfig::default(),
            cache: CacheConfig::default(),
            policy: PolicyTable::default(),
            lifecycle: LifecycleSection::default(),
            fallback: FallbackConfig::default(),
        }
    }

    /// Absolute URL of the application shell.
    pub fn shell_url(&self) -> String {
        format!(
            "{}{}",
            self.scope.page_origin.trim_end_matches('/'),
            self.scope.shell_path
        )
    }

    pub fn probe_url(&self) -> String {
        self.upstream
            .probe_url
            .clone()
            .unwrap_or_else(|| self.upstream.url.clone())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            admin_addr: default_admin_addr(),
        }
    }
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            page_origin: default_page_origin(),
            prefix: default_scope_prefix(),
            shell_path: default_shell_path(),
            asset_extensions: default_asset_extensions(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: default_cache_prefix(),
            version: default_cache_version(),
            max_store_bytes: default_max_store_bytes(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for LifecycleSection {
    fn default() -> Self {
        Self {
            online_gate: default_online_gate(),
            skip_waiting: default_skip_waiting(),
            sweep_interval_seconds: default_sweep_interval(),
            max_entry_age_seconds: default_max_entry_age(),
        }
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            flavor: default_fallback_flavor(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_admin_addr() -> String {
    "0.0.0.0:9090".to_string()
}
fn default_timeout_ms() -> u64 {
    5000
}
fn default_page_origin() -> String {
    "http://localhost:8080".to_string()
}
fn default_scope_prefix() -> String {
    "http://localhost:8080/".to_string()
}
fn default_shell_path() -> String {
    "/index.html".to_string()
}
fn default_asset_extensions() -> Vec<String> {
    [
        // scripts and stylesheets
        ".js", ".mjs", ".css", ".map",
        // images
        ".png", ".jpg", ".jpeg", ".svg", ".gif", ".webp", ".ico",
        // fonts
        ".woff", ".woff2", ".ttf", ".eot", ".otf",
        // audio/video
        ".mp3", ".mp4", ".webm",
        // archives and documents
        ".zip", ".pdf", ".html", ".json", ".txt",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}
fn default_cache_prefix() -> String {
    "satchel".to_string()
}
fn default_cache_version() -> u32 {
    1
}
fn default_max_store_bytes() -> usize {
    64 * 1024 * 1024
}
fn default_max_body_bytes() -> usize {
    1_048_576
}
fn default_online_gate() -> bool {
    true
}
fn default_skip_waiting() -> bool {
    true
}
fn default_sweep_interval() -> u64 {
    3600
}
fn default_max_entry_age() -> u64 {
    7 * 24 * 60 * 60
}
fn default_fallback_flavor() -> FallbackFlavor {
    FallbackFlavor::Page
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::Strategy;

    #[test]
    fn minimal_config_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [upstream]
            url = "http://127.0.0.1:3000"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.cache.prefix, "satchel");
        assert_eq!(config.cache.version, 1);
        assert!(config.lifecycle.online_gate);
        assert_eq!(config.lifecycle.max_entry_age_seconds, 7 * 24 * 60 * 60);
        assert_eq!(config.fallback.flavor, FallbackFlavor::Page);
        assert!(config
            .scope
            .asset_extensions
            .iter()
            .any(|ext| ext == ".woff2"));
    }

    #[test]
    fn full_config_overrides_everything() {
        let config: Config = toml::from_str(
            r#"
            [server]
            listen_addr = "127.0.0.1:9000"
            admin_addr = "127.0.0.1:9001"

            [upstream]
            url = "http://10.0.0.1:3000"
            timeout_ms = 250
            probe_url = "http://10.0.0.1:3000/healthz"

            [scope]
            page_origin = "https://boards.example.com"
            prefix = "https://boards.example.com/app"
            shell_path = "/app/index.html"
            asset_extensions = [".js", ".css"]

            [cache]
            prefix = "whiteboard"
            version = 4
            max_body_bytes = 2048

            [policy]
            static_asset = "stale-while-revalidate"

            [lifecycle]
            online_gate = false
            sweep_interval_seconds = 60
            max_entry_age_seconds = 120

            [fallback]
            flavor = "unavailable"
            "#,
        )
        .unwrap();
        assert_eq!(config.probe_url(), "http://10.0.0.1:3000/healthz");
        assert_eq!(config.shell_url(), "https://boards.example.com/app/index.html");
        assert_eq!(config.cache.version, 4);
        assert_eq!(config.policy.static_asset, Strategy::StaleWhileRevalidate);
        assert_eq!(config.policy.navigation, Strategy::NetworkFirst);
        assert!(!config.lifecycle.online_gate);
        assert_eq!(config.fallback.flavor, FallbackFlavor::Unavailable);
    }
}

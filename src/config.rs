//! Configuration file parser for `config/feedhook.toml`.
//!
//! The file has three optional global sections (`[app]`, `[http]`,
//! `[persistence]`) and one `[[instances]]` table per feed instance. Unknown
//! keys are accepted but logged as potential typos. [`Config::validate`] turns
//! the raw file into a [`ValidatedConfig`], resolving `env:` webhook references
//! and rejecting anything out of range.
use crate::feed::PostFilterConfig;
use crate::notify::DisplayOptions;
use crate::state::FeedUrl;
use crate::util::{validate_http_url, UrlValidationError};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Prefix marking a webhook that is read from the environment.
const ENV_PREFIX: &str = "env:";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/104.0.5112.79 Safari/537.36";
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const GOOGLE_FEED_FETCHER: &str = "FeedFetcher-Google";

const CONCURRENT_REQUESTS: RangeInclusive<usize> = 1..=200;
const TIMEOUT_SECONDS: RangeInclusive<u64> = 1..=300;
const POST_INTERVAL_SECONDS: RangeInclusive<u64> = 1..=120;
const INTERVAL_MINUTES: RangeInclusive<u64> = 1..=1440;
const DESCRIPTION_LIMIT: RangeInclusive<usize> = 1..=4000;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("No [[instances]] configured")]
    NoInstances,

    #[error("Invalid configuration for '{context}': {message}")]
    Invalid { context: String, message: String },
}

impl ConfigError {
    fn invalid(context: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            context: context.into(),
            message: message.into(),
        }
    }
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Raw configuration as written in the file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app: AppOptions,
    pub http: HttpOptions,
    pub persistence: PersistenceOptions,
    pub instances: Vec<InstanceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppOptions {
    /// Process-wide limit on in-flight HTTP requests.
    pub concurrent_requests: usize,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            concurrent_requests: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpOptions {
    pub timeout_seconds: u64,
    pub default_user_agent: String,
    /// Minimum spacing between webhook posts of one instance.
    pub post_min_interval_seconds: u64,
    pub fallback_user_agents: Vec<String>,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            default_user_agent: DEFAULT_USER_AGENT.to_string(),
            post_min_interval_seconds: 2,
            fallback_user_agents: vec![BROWSER_USER_AGENT.to_string(), GOOGLE_FEED_FETCHER.to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceOptions {
    /// Snapshot file shared by every instance with persistence enabled.
    pub path: PathBuf,
}

impl Default for PersistenceOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::from("feed_dump.json"),
        }
    }
}

/// One `[[instances]]` table.
///
/// Custom Debug impl masks the webhook so it never reaches the logs.
#[derive(Clone, Deserialize)]
pub struct InstanceConfig {
    pub id: String,
    #[serde(default)]
    pub rss_urls: Vec<String>,
    #[serde(default)]
    pub youtube_urls: Vec<String>,
    /// Webhook URL, or `env:VAR_NAME` to read it from the environment.
    pub discord_webhook_url: String,
    #[serde(default = "default_interval_minutes")]
    pub rss_check_interval_minutes: u64,
    #[serde(default = "default_description_limit")]
    pub description_limit: usize,
    #[serde(default)]
    pub forum: bool,
    #[serde(default)]
    pub markdown_format: bool,
    #[serde(default = "default_true")]
    pub persistence_on_shutdown: bool,
    #[serde(default = "default_instance_concurrency")]
    pub concurrent_requests: usize,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub author_url: Option<String>,
    #[serde(default)]
    pub author_icon: Option<String>,
    #[serde(default)]
    pub fallback_image: Option<String>,
    #[serde(default)]
    pub footer_image: Option<String>,
    #[serde(default)]
    pub color: u32,
    #[serde(default)]
    pub post_filters: Vec<PostFilterConfig>,
}

fn default_interval_minutes() -> u64 {
    30
}

fn default_description_limit() -> usize {
    250
}

fn default_true() -> bool {
    true
}

fn default_instance_concurrency() -> usize {
    5
}

impl std::fmt::Debug for InstanceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let webhook = if self.discord_webhook_url.trim_start().to_ascii_lowercase().starts_with(ENV_PREFIX) {
            self.discord_webhook_url.as_str()
        } else {
            "[REDACTED]"
        };
        f.debug_struct("InstanceConfig")
            .field("id", &self.id)
            .field("rss_urls", &self.rss_urls)
            .field("youtube_urls", &self.youtube_urls)
            .field("discord_webhook_url", &webhook)
            .field("rss_check_interval_minutes", &self.rss_check_interval_minutes)
            .field("description_limit", &self.description_limit)
            .field("forum", &self.forum)
            .field("markdown_format", &self.markdown_format)
            .field("persistence_on_shutdown", &self.persistence_on_shutdown)
            .field("concurrent_requests", &self.concurrent_requests)
            .field("post_filters", &self.post_filters)
            .finish_non_exhaustive()
    }
}

/// A feed instance that passed validation. Immutable from here on.
#[derive(Debug)]
pub struct FeedInstanceConfig {
    pub id: String,
    pub feeds: Vec<FeedUrl>,
    /// Resolved webhook URL. `SecretString` redacts it in Debug output.
    pub webhook: SecretString,
    pub interval: Duration,
    pub description_limit: usize,
    pub forum: bool,
    pub markdown: bool,
    pub persist_on_shutdown: bool,
    pub concurrent_requests: usize,
    pub display: DisplayOptions,
    pub post_filters: Vec<PostFilterConfig>,
}

#[derive(Debug)]
pub struct ValidatedConfig {
    pub concurrent_requests: usize,
    pub http_timeout: Duration,
    pub default_user_agent: String,
    pub fallback_user_agents: Vec<String>,
    pub post_min_interval: Duration,
    pub persistence_path: PathBuf,
    pub instances: Vec<FeedInstanceConfig>,
}

// ============================================================================
// Loading
// ============================================================================

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Err(ConfigError::NotFound)`
    /// - Empty file → `Err(ConfigError::NoInstances)`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to prevent memory exhaustion
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::NotFound(path.to_path_buf()),
            _ => ConfigError::Io(e),
        })?;

        if content.trim().is_empty() {
            return Err(ConfigError::NoInstances);
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            warn_unknown_keys(&raw);
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            instances = config.instances.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Validates against the process environment.
    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        self.validate_with_env(|name| std::env::var(name).ok())
    }

    /// Validates every section, resolving `env:` webhooks through `env`.
    pub fn validate_with_env<F>(self, env: F) -> Result<ValidatedConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        check_range("app", "concurrent_requests", self.app.concurrent_requests, &CONCURRENT_REQUESTS)?;
        check_range("http", "timeout_seconds", self.http.timeout_seconds, &TIMEOUT_SECONDS)?;
        check_range(
            "http",
            "post_min_interval_seconds",
            self.http.post_min_interval_seconds,
            &POST_INTERVAL_SECONDS,
        )?;
        if self.http.default_user_agent.trim().is_empty() {
            return Err(ConfigError::invalid("http", "default_user_agent must not be blank"));
        }
        if self.instances.is_empty() {
            return Err(ConfigError::NoInstances);
        }

        let mut seen = HashSet::new();
        let mut instances = Vec::with_capacity(self.instances.len());
        for raw in self.instances {
            let instance = validate_instance(raw, &env)?;
            if !seen.insert(instance.id.clone()) {
                return Err(ConfigError::invalid(&instance.id, "duplicate instance id"));
            }
            instances.push(instance);
        }

        Ok(ValidatedConfig {
            concurrent_requests: self.app.concurrent_requests,
            http_timeout: Duration::from_secs(self.http.timeout_seconds),
            default_user_agent: self.http.default_user_agent,
            fallback_user_agents: self.http.fallback_user_agents,
            post_min_interval: Duration::from_secs(self.http.post_min_interval_seconds),
            persistence_path: self.persistence.path,
            instances,
        })
    }
}

fn validate_instance<F>(raw: InstanceConfig, env: &F) -> Result<FeedInstanceConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let id = raw.id.trim().to_string();
    if id.is_empty() {
        return Err(ConfigError::invalid("instances", "id must not be blank"));
    }

    check_range(&id, "rss_check_interval_minutes", raw.rss_check_interval_minutes, &INTERVAL_MINUTES)?;
    check_range(&id, "description_limit", raw.description_limit, &DESCRIPTION_LIMIT)?;
    check_range(&id, "concurrent_requests", raw.concurrent_requests, &CONCURRENT_REQUESTS)?;

    let mut feeds = Vec::new();
    for url in raw.rss_urls.iter().map(|u| u.trim()).filter(|u| !u.is_empty()) {
        check_url(&id, "rss_urls", url)?;
        feeds.push(FeedUrl::rss(url));
    }
    for url in raw.youtube_urls.iter().map(|u| u.trim()).filter(|u| !u.is_empty()) {
        check_url(&id, "youtube_urls", url)?;
        feeds.push(FeedUrl::youtube(url));
    }
    if feeds.is_empty() {
        tracing::warn!(id = %id, "Instance has no feed URLs configured");
    }

    let webhook = resolve_webhook(&id, &raw.discord_webhook_url, env)?;
    validate_http_url(&webhook)
        .map_err(|e| ConfigError::invalid(&id, format!("discord_webhook_url is not a valid URL: {e}")))?;

    Ok(FeedInstanceConfig {
        id,
        feeds,
        webhook: SecretString::from(webhook),
        interval: Duration::from_secs(raw.rss_check_interval_minutes * 60),
        description_limit: raw.description_limit,
        forum: raw.forum,
        markdown: raw.markdown_format,
        persist_on_shutdown: raw.persistence_on_shutdown,
        concurrent_requests: raw.concurrent_requests,
        display: DisplayOptions {
            username: raw.username,
            avatar_url: raw.avatar_url,
            author_name: raw.author_name,
            author_url: raw.author_url,
            author_icon: raw.author_icon,
            fallback_image: raw.fallback_image,
            footer_image: raw.footer_image,
            color: raw.color,
        },
        post_filters: raw.post_filters,
    })
}

/// Resolves `env:NAME` (prefix case-insensitive) to the variable's value.
fn resolve_webhook<F>(id: &str, raw: &str, env: &F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ConfigError::invalid(
            id,
            "discord_webhook_url is missing; give a URL or 'env:VAR_NAME'",
        ));
    }

    let Some(prefix) = raw.get(..ENV_PREFIX.len()) else {
        return Ok(raw.to_string());
    };
    if !prefix.eq_ignore_ascii_case(ENV_PREFIX) {
        return Ok(raw.to_string());
    }

    let name = raw[ENV_PREFIX.len()..].trim();
    if name.is_empty() {
        return Err(ConfigError::invalid(id, "malformed webhook reference 'env:', expected 'env:VAR_NAME'"));
    }

    match env(name) {
        Some(value) if !value.trim().is_empty() => {
            tracing::info!(id = %id, var = %name, "Resolved webhook from environment");
            Ok(value.trim().to_string())
        }
        _ => Err(ConfigError::invalid(
            id,
            format!("environment variable '{name}' is not set or is empty"),
        )),
    }
}

fn check_range<T>(context: &str, field: &str, value: T, range: &RangeInclusive<T>) -> Result<(), ConfigError>
where
    T: PartialOrd + std::fmt::Display,
{
    if range.contains(&value) {
        return Ok(());
    }
    Err(ConfigError::invalid(
        context,
        format!("{field} must be between {} and {} (got {value})", range.start(), range.end()),
    ))
}

fn check_url(id: &str, field: &str, url: &str) -> Result<(), ConfigError> {
    validate_http_url(url).map(|_| ()).map_err(|e: UrlValidationError| {
        ConfigError::invalid(id, format!("{field} entry '{url}' is not a valid URL: {e}"))
    })
}

fn warn_unknown_keys(raw: &toml::Table) {
    const TOP: &[&str] = &["app", "http", "persistence", "instances"];
    const APP: &[&str] = &["concurrent_requests"];
    const HTTP: &[&str] = &[
        "timeout_seconds",
        "default_user_agent",
        "post_min_interval_seconds",
        "fallback_user_agents",
    ];
    const PERSISTENCE: &[&str] = &["path"];
    const INSTANCE: &[&str] = &[
        "id",
        "rss_urls",
        "youtube_urls",
        "discord_webhook_url",
        "rss_check_interval_minutes",
        "description_limit",
        "forum",
        "markdown_format",
        "persistence_on_shutdown",
        "concurrent_requests",
        "username",
        "avatar_url",
        "author_name",
        "author_url",
        "author_icon",
        "fallback_image",
        "footer_image",
        "color",
        "post_filters",
    ];

    let check = |table: &toml::Table, known: &[&str], section: &str| {
        for key in table.keys() {
            if !known.contains(&key.as_str()) {
                tracing::warn!(section = %section, key = %key, "Unknown key in config file, ignoring");
            }
        }
    };

    check(raw, TOP, "root");
    for (name, known) in [("app", APP), ("http", HTTP), ("persistence", PERSISTENCE)] {
        if let Some(table) = raw.get(name).and_then(|v| v.as_table()) {
            check(table, known, name);
        }
    }
    if let Some(instances) = raw.get("instances").and_then(|v| v.as_array()) {
        for table in instances.iter().filter_map(|v| v.as_table()) {
            check(table, INSTANCE, "instances");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FeedKind;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
[[instances]]
id = "rust"
rss_urls = ["https://blog.rust-lang.org/feed.xml"]
discord_webhook_url = "https://discord.com/api/webhooks/1/token"
"#;

    fn write(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("feedhook.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn parse(content: &str) -> Config {
        toml::from_str(content).unwrap()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = parse(MINIMAL).validate_with_env(no_env).unwrap();

        assert_eq!(config.concurrent_requests, 20);
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert_eq!(config.post_min_interval, Duration::from_secs(2));
        assert_eq!(config.fallback_user_agents.len(), 2);
        assert_eq!(config.fallback_user_agents[1], "FeedFetcher-Google");
        assert_eq!(config.persistence_path, PathBuf::from("feed_dump.json"));

        let instance = &config.instances[0];
        assert_eq!(instance.id, "rust");
        assert_eq!(instance.interval, Duration::from_secs(30 * 60));
        assert_eq!(instance.concurrent_requests, 5);
        assert!(instance.persist_on_shutdown);
        assert_eq!(instance.feeds[0].kind, FeedKind::Rss);
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        let result = Config::load(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_empty_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "  \n ");
        assert!(matches!(Config::load(&path), Err(ConfigError::NoInstances)));
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "this is not [valid toml");

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_too_large_file_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, &"a".repeat(1_048_577));

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, &format!("totally_fake_key = 1\n{MINIMAL}"));

        let config = Config::load(&path).unwrap();
        assert_eq!(config.instances.len(), 1);
    }

    #[test]
    fn test_full_config() {
        let content = r#"
[app]
concurrent_requests = 50

[http]
timeout_seconds = 10
default_user_agent = "feedhook/1.0"
post_min_interval_seconds = 5
fallback_user_agents = ["UA1", "UA2"]

[persistence]
path = "state/feeds.json"

[[instances]]
id = "videos"
youtube_urls = ["https://www.youtube.com/@rustlang", ""]
rss_urls = []
discord_webhook_url = "https://discord.com/api/webhooks/1/token"
rss_check_interval_minutes = 15
description_limit = 400
forum = true
markdown_format = true
persistence_on_shutdown = false
concurrent_requests = 2
username = "Bot"
color = 16777215

[[instances.post_filters]]
url = "all"
filters = ["release", "label:announcement"]
"#;
        let config = parse(content).validate_with_env(no_env).unwrap();

        assert_eq!(config.concurrent_requests, 50);
        assert_eq!(config.default_user_agent, "feedhook/1.0");
        assert_eq!(config.fallback_user_agents, vec!["UA1", "UA2"]);
        assert_eq!(config.persistence_path, PathBuf::from("state/feeds.json"));

        let instance = &config.instances[0];
        assert_eq!(instance.feeds, vec![FeedUrl::youtube("https://www.youtube.com/@rustlang")]);
        assert_eq!(instance.interval, Duration::from_secs(15 * 60));
        assert!(instance.forum && instance.markdown && !instance.persist_on_shutdown);
        assert_eq!(instance.display.username.as_deref(), Some("Bot"));
        assert_eq!(instance.display.color, 0xFFFFFF);
        assert_eq!(instance.post_filters[0].filters.len(), 2);
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let cases = [
            ("rss_check_interval_minutes = 0", "rss_check_interval_minutes"),
            ("rss_check_interval_minutes = 1441", "rss_check_interval_minutes"),
            ("description_limit = 4001", "description_limit"),
            ("concurrent_requests = 201", "concurrent_requests"),
        ];
        for (line, field) in cases {
            let err = parse(&format!("{MINIMAL}{line}\n")).validate_with_env(no_env).unwrap_err();
            assert!(err.to_string().contains(field), "{line}: {err}");
        }
    }

    #[test]
    fn test_global_range_rejected() {
        let err = parse(&format!("[app]\nconcurrent_requests = 0\n{MINIMAL}"))
            .validate_with_env(no_env)
            .unwrap_err();
        assert!(err.to_string().contains("concurrent_requests"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = parse(&format!("{MINIMAL}{MINIMAL}")).validate_with_env(no_env).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_invalid_feed_url_rejected() {
        let content = MINIMAL.replace("https://blog.rust-lang.org/feed.xml", "ftp://example.com/feed");
        assert!(parse(&content).validate_with_env(no_env).is_err());
    }

    #[test]
    fn test_no_instances_rejected() {
        let result = parse("[app]\nconcurrent_requests = 5\n").validate_with_env(no_env);
        assert!(matches!(result, Err(ConfigError::NoInstances)));
    }

    #[test]
    fn test_env_webhook_resolved_case_insensitive() {
        let content = MINIMAL.replace("https://discord.com/api/webhooks/1/token", "ENV:RUST_HOOK");
        let config = parse(&content)
            .validate_with_env(|name| (name == "RUST_HOOK").then(|| "https://discord.com/api/webhooks/9/x".to_string()))
            .unwrap();

        assert_eq!(
            config.instances[0].webhook.expose_secret(),
            "https://discord.com/api/webhooks/9/x"
        );
    }

    #[test]
    fn test_env_webhook_unset_is_error() {
        let content = MINIMAL.replace("https://discord.com/api/webhooks/1/token", "env:MISSING_HOOK");
        let err = parse(&content).validate_with_env(no_env).unwrap_err();
        assert!(err.to_string().contains("MISSING_HOOK"));
    }

    #[test]
    fn test_env_webhook_blank_value_is_error() {
        let content = MINIMAL.replace("https://discord.com/api/webhooks/1/token", "env:BLANK");
        let result = parse(&content).validate_with_env(|_| Some("   ".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_blank_webhook_is_error() {
        let content = MINIMAL.replace("https://discord.com/api/webhooks/1/token", " ");
        assert!(parse(&content).validate_with_env(no_env).is_err());
    }

    #[test]
    fn test_debug_masks_webhook() {
        let raw = parse(MINIMAL);
        let debug_output = format!("{:?}", raw.instances[0]);
        assert!(!debug_output.contains("token"));
        assert!(debug_output.contains("[REDACTED]"));

        let validated = raw.validate_with_env(no_env).unwrap();
        let debug_output = format!("{:?}", validated.instances[0]);
        assert!(!debug_output.contains("api/webhooks/1/token"));
    }
}

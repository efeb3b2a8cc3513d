//! Configuration and settings management
//!
//! Loads scraper settings from optional config files and environment
//! variables, and defines the fixed request headers used by the fetcher.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Desktop browser user agent sent with every page request.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64)";
/// Language preference sent with every page request.
pub const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
/// Search-engine referer sent with every page request.
pub const REFERER: &str = "https://www.google.com/";

/// Default site searched for past papers.
pub const DEFAULT_SEARCH_BASE_URL: &str = "https://pastpapers.wiki/";
/// Default file-hosting domain whose links are offered for download.
pub const DEFAULT_FILE_HOST_DOMAIN: &str = "drive.google.com";
/// Default source label shown in document captions.
pub const DEFAULT_SOURCE_LABEL: &str = "pastpapers.wiki";
/// Maximum number of candidates rendered in a single prompt.
pub const DEFAULT_MAX_LISTED_ITEMS: usize = 10;
/// Seconds to wait for a numeric reply before the session expires.
pub const DEFAULT_REPLY_TIMEOUT_SECS: u64 = 120;
/// Seconds before an outbound page request is abandoned.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Scraper and session settings.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScraperSettings {
    /// Base URL of the search page; the query is appended as `?s=`.
    #[serde(default = "default_search_base_url")]
    pub search_base_url: String,
    /// Substring an anchor's `href` must contain to count as a file link.
    #[serde(default = "default_file_host_domain")]
    pub file_host_domain: String,
    /// Site name used in document captions.
    #[serde(default = "default_source_label")]
    pub source_label: String,
    /// Upper bound on rendered and selectable candidates.
    #[serde(default = "default_max_listed_items")]
    pub max_listed_items: usize,
    /// Reply wait timeout in seconds.
    #[serde(default = "default_reply_timeout_secs")]
    pub reply_timeout_secs: u64,
    /// HTTP request timeout in seconds.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_search_base_url() -> String {
    DEFAULT_SEARCH_BASE_URL.to_string()
}

fn default_file_host_domain() -> String {
    DEFAULT_FILE_HOST_DOMAIN.to_string()
}

fn default_source_label() -> String {
    DEFAULT_SOURCE_LABEL.to_string()
}

const fn default_max_listed_items() -> usize {
    DEFAULT_MAX_LISTED_ITEMS
}

const fn default_reply_timeout_secs() -> u64 {
    DEFAULT_REPLY_TIMEOUT_SECS
}

const fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            search_base_url: default_search_base_url(),
            file_host_domain: default_file_host_domain(),
            source_label: default_source_label(),
            max_listed_items: default_max_listed_items(),
            reply_timeout_secs: default_reply_timeout_secs(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl ScraperSettings {
    /// Create new settings by loading from environment and files.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        build_config()?.try_deserialize()
    }

    /// Reply wait timeout as a `Duration`.
    #[must_use]
    pub const fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.reply_timeout_secs)
    }

    /// HTTP request timeout as a `Duration`.
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Build the layered configuration shared by every settings struct.
///
/// Sources, later ones winning: `config/default`, `config/<RUN_MODE>`,
/// `config/local`, `APP_`-prefixed variables, then bare variables.
///
/// # Errors
///
/// Returns a `ConfigError` if a present source cannot be read.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Not checked into git
        .add_source(File::with_name("config/local").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        // Environment::default() maps UPPER_SNAKE_CASE to snake_case keys
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    // One test touches the environment to avoid races between tests
    #[test]
    fn test_config_env_loading() -> Result<(), Box<dyn std::error::Error>> {
        env::remove_var("FILE_HOST_DOMAIN");
        env::remove_var("REPLY_TIMEOUT_SECS");

        let settings = ScraperSettings::new()?;
        assert_eq!(settings.search_base_url, DEFAULT_SEARCH_BASE_URL);
        assert_eq!(settings.max_listed_items, 10);

        env::set_var("FILE_HOST_DOMAIN", "files.example.org");
        env::set_var("REPLY_TIMEOUT_SECS", "45");

        let settings = ScraperSettings::new()?;
        assert_eq!(settings.file_host_domain, "files.example.org");
        assert_eq!(settings.reply_timeout(), Duration::from_secs(45));

        env::remove_var("FILE_HOST_DOMAIN");
        env::remove_var("REPLY_TIMEOUT_SECS");

        // Empty values are treated as unset
        env::set_var("FILE_HOST_DOMAIN", "");
        let settings = ScraperSettings::new()?;
        assert_eq!(settings.file_host_domain, DEFAULT_FILE_HOST_DOMAIN);
        env::remove_var("FILE_HOST_DOMAIN");

        Ok(())
    }

    #[test]
    fn test_defaults() {
        let settings = ScraperSettings::default();
        assert_eq!(settings.file_host_domain, "drive.google.com");
        assert_eq!(settings.source_label, "pastpapers.wiki");
        assert_eq!(settings.http_timeout(), Duration::from_secs(30));
    }
}

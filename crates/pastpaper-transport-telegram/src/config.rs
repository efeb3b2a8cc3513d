//! Telegram transport settings.

use config::ConfigError;
use pastpaper_core::config::ScraperSettings;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Telegram transport settings loaded from environment variables.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct TelegramSettings {
    /// Telegram Bot API token.
    pub telegram_token: String,
    /// Comma-separated list of allowed user IDs. Empty means everyone.
    #[serde(rename = "allowed_users")]
    pub allowed_users_str: Option<String>,
}

/// Combined settings used by the Telegram transport layer.
#[derive(Clone)]
pub struct BotSettings {
    /// Scraper and session settings.
    pub scraper: Arc<ScraperSettings>,
    /// Telegram-specific settings.
    pub telegram: Arc<TelegramSettings>,
}

impl BotSettings {
    /// Create a new combined settings bundle.
    #[must_use]
    pub fn new(scraper: ScraperSettings, telegram: TelegramSettings) -> Self {
        Self {
            scraper: Arc::new(scraper),
            telegram: Arc::new(telegram),
        }
    }
}

impl TelegramSettings {
    /// Create new settings by loading from environment and files.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        pastpaper_core::config::build_config()?.try_deserialize()
    }

    /// Returns the set of allowed user IDs.
    #[must_use]
    pub fn allowed_users(&self) -> HashSet<i64> {
        self.allowed_users_str
            .as_ref()
            .map(|s| {
                s.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
                    .filter(|token| !token.is_empty())
                    .filter_map(|id| id.parse::<i64>().ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether `user_id` may use the bot. An empty allow-list admits everyone.
    #[must_use]
    pub fn is_allowed(&self, user_id: i64) -> bool {
        let allowed = self.allowed_users();
        allowed.is_empty() || allowed.contains(&user_id)
    }
}

/// Cooldown period (seconds) between "Access Denied" messages for same user.
/// Default: 20 minutes.
pub const UNAUTHORIZED_COOLDOWN_SECS: u64 = 1200;
/// Time-to-live (seconds) for cache entries.
/// Default: 2 hours.
pub const UNAUTHORIZED_CACHE_TTL_SECS: u64 = 7200;
/// Maximum cache capacity (number of entries).
pub const UNAUTHORIZED_CACHE_MAX_SIZE: u64 = 10_000;

/// Get unauthorized cooldown from env or default.
///
/// Environment variable: `UNAUTHORIZED_COOLDOWN_SECS`.
#[must_use]
pub fn get_unauthorized_cooldown() -> u64 {
    std::env::var("UNAUTHORIZED_COOLDOWN_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(UNAUTHORIZED_COOLDOWN_SECS)
}

/// Get unauthorized cache TTL from env or default.
///
/// Environment variable: `UNAUTHORIZED_CACHE_TTL_SECS`.
#[must_use]
pub fn get_unauthorized_cache_ttl() -> u64 {
    std::env::var("UNAUTHORIZED_CACHE_TTL_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(UNAUTHORIZED_CACHE_TTL_SECS)
}

/// Get unauthorized cache max size from env or default.
///
/// Environment variable: `UNAUTHORIZED_CACHE_MAX_SIZE`.
#[must_use]
pub fn get_unauthorized_cache_max_size() -> u64 {
    std::env::var("UNAUTHORIZED_CACHE_MAX_SIZE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(UNAUTHORIZED_CACHE_MAX_SIZE)
}

#[cfg(test)]
mod tests {
    use super::TelegramSettings;

    fn settings(allowed: Option<&str>) -> TelegramSettings {
        TelegramSettings {
            telegram_token: "dummy".to_string(),
            allowed_users_str: allowed.map(ToString::to_string),
        }
    }

    #[test]
    fn test_list_parsing() {
        let allowed = settings(Some("333; 444, 555")).allowed_users();
        assert!(allowed.contains(&333));
        assert!(allowed.contains(&444));
        assert!(allowed.contains(&555));
        assert_eq!(allowed.len(), 3);

        let allowed = settings(Some("abc, 777")).allowed_users();
        assert!(allowed.contains(&777));
        assert_eq!(allowed.len(), 1);
    }

    #[test]
    fn test_empty_allow_list_admits_everyone() {
        assert!(settings(None).is_allowed(42));
        assert!(settings(Some("")).is_allowed(42));
        assert!(settings(Some("1 2")).is_allowed(2));
        assert!(!settings(Some("1 2")).is_allowed(42));
    }
}

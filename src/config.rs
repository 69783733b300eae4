//! Configuration types, loaded once from the environment at startup.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Where the bot keeps its data and how long unfinished forms live.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Path of the libSQL database file.
    pub db_path: PathBuf,
    /// Forms nobody touched for this long are dropped from memory.
    pub session_idle_timeout: Duration,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/trademission.db"),
            session_idle_timeout: Duration::from_secs(24 * 3600), // 1 day
        }
    }
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let session_idle_timeout = match lookup("TRADE_MISSION_SESSION_IDLE_SECS") {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
                    key: "TRADE_MISSION_SESSION_IDLE_SECS".to_string(),
                    message: format!("{e}"),
                })?;
                if secs == 0 {
                    return Err(ConfigError::InvalidValue {
                        key: "TRADE_MISSION_SESSION_IDLE_SECS".to_string(),
                        message: "must be greater than zero".to_string(),
                    });
                }
                Duration::from_secs(secs)
            }
            None => defaults.session_idle_timeout,
        };

        Ok(Self {
            db_path: lookup("TRADE_MISSION_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            session_idle_timeout,
        })
    }
}

/// Telegram bot settings.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Usernames or numeric ids allowed to use the bot. `*` allows everyone.
    pub allowed_users: Vec<String>,
}

impl TelegramConfig {
    /// Returns `None` if `TELEGRAM_BOT_TOKEN` is not set (the CLI is used instead).
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let bot_token = lookup("TELEGRAM_BOT_TOKEN").filter(|s| !s.trim().is_empty())?;
        let allowed_users =
            parse_list(Some(lookup("TELEGRAM_ALLOWED_USERS").unwrap_or_else(|| "*".to_string())));
        Some(Self {
            bot_token: bot_token.trim().to_string(),
            allowed_users,
        })
    }

    /// Human-readable allowlist for the startup banner.
    pub fn allowed_display(&self) -> String {
        if self.allowed_users.iter().any(|u| u == "*") {
            "everyone".to_string()
        } else if self.allowed_users.is_empty() {
            "none (deny all)".to_string()
        } else {
            self.allowed_users.join(", ")
        }
    }
}

/// Channels and tags used when publishing.
///
/// "Sell" tags categorize unloading missions, "buy" tags loading missions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishConfig {
    /// Channel every mission is posted to.
    pub primary_channel: String,
    pub tag_sell: String,
    pub tag_buy: String,
    /// Channels the primary post is crossposted to. Empty disables crossposting.
    pub secondary_channels: Vec<String>,
    /// Tags for `secondary_channels`, matched by position.
    pub secondary_tags_sell: Vec<String>,
    pub secondary_tags_buy: Vec<String>,
}

impl PublishConfig {
    /// Build config from environment variables.
    /// Returns `Ok(None)` if `REDDIT_MAIN_SR` is not set (publishing disabled).
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<Self>, ConfigError> {
        let Some(primary_channel) = lookup("REDDIT_MAIN_SR").filter(|s| !s.trim().is_empty())
        else {
            return Ok(None);
        };

        let required = |key: &str| {
            lookup(key)
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };

        let secondary_channels = parse_list(lookup("REDDIT_SECONDARY_SRS"));
        let secondary_tags_sell = parse_list(lookup("REDDIT_SECONDARY_FLAIRS_SELL"));
        let secondary_tags_buy = parse_list(lookup("REDDIT_SECONDARY_FLAIRS_BUY"));

        if !secondary_channels.is_empty()
            && (secondary_tags_sell.len() != secondary_channels.len()
                || secondary_tags_buy.len() != secondary_channels.len())
        {
            tracing::warn!(
                channels = secondary_channels.len(),
                sell_tags = secondary_tags_sell.len(),
                buy_tags = secondary_tags_buy.len(),
                "Secondary channel and tag lists differ in length; extra entries are ignored"
            );
        }

        Ok(Some(Self {
            primary_channel: primary_channel.trim().to_string(),
            tag_sell: required("REDDIT_MAIN_SR_FLAIR_SELL")?.trim().to_string(),
            tag_buy: required("REDDIT_MAIN_SR_FLAIR_BUY")?.trim().to_string(),
            secondary_channels,
            secondary_tags_sell,
            secondary_tags_buy,
        }))
    }
}

/// Split a comma-separated list, trimming entries and dropping blanks.
pub fn parse_list(value: Option<String>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

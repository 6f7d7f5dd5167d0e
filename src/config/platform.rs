//! Chat platform configuration.
//!
//! # Example
//!
//! ```toml
//! [platform]
//! type = "discord"
//! token = "${BOT_TOKEN}"
//! ```

use serde::{Deserialize, Serialize};

/// Which chat platform to sweep, and how to reach it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlatformConfig {
    /// Discord REST API.
    Discord(DiscordPlatformConfig),

    /// In-process platform with empty channels (no network calls).
    /// Useful for smoke-testing a deployment's configuration.
    Memory(MemoryPlatformConfig),
}

impl PlatformConfig {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Discord(_) => "discord",
            Self::Memory(_) => "memory",
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        match self {
            Self::Discord(c) => c.validate(),
            Self::Memory(_) => Ok(()),
        }
    }
}

/// Discord platform configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscordPlatformConfig {
    /// Bot token (required). Usually `"${BOT_TOKEN}"`.
    pub token: String,

    /// Base URL override.
    #[serde(default = "default_discord_api_base_url")]
    pub api_base_url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,

    /// Messages requested per history page (1-100).
    #[serde(default = "default_history_page_size")]
    pub history_page_size: usize,
}

impl std::fmt::Debug for DiscordPlatformConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordPlatformConfig")
            .field("token", &"****")
            .field("api_base_url", &self.api_base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("history_page_size", &self.history_page_size)
            .finish()
    }
}

fn default_discord_api_base_url() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_history_page_size() -> usize {
    100
}

impl DiscordPlatformConfig {
    /// Get the request timeout as a Duration.
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }

    fn validate(&self) -> Result<(), String> {
        if self.token.trim().is_empty() {
            return Err("platform.token must not be empty".into());
        }
        if !(1..=100).contains(&self.history_page_size) {
            return Err(format!(
                "platform.history_page_size must be between 1 and 100, got {}",
                self.history_page_size
            ));
        }
        url::Url::parse(&self.api_base_url)
            .map_err(|e| format!("platform.api_base_url is not a valid URL: {e}"))?;
        Ok(())
    }
}

/// In-memory platform configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryPlatformConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_discord_defaults() {
        let config: PlatformConfig = toml::from_str(
            r#"
            type = "discord"
            token = "abc"
        "#,
        )
        .unwrap();

        let PlatformConfig::Discord(discord) = config else {
            panic!("expected discord platform");
        };
        assert_eq!(discord.api_base_url, "https://discord.com/api/v10");
        assert_eq!(discord.request_timeout(), std::time::Duration::from_secs(30));
        assert_eq!(discord.history_page_size, 100);
    }

    #[test]
    fn test_debug_redacts_token() {
        let config: DiscordPlatformConfig = toml::from_str(r#"token = "super-secret""#).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("****"));
    }

    #[test]
    fn test_validate_rejects_blank_token() {
        let config = PlatformConfig::Discord(toml::from_str(r#"token = "  ""#).unwrap());
        assert!(config.validate().unwrap_err().contains("token"));
    }

    #[test]
    fn test_validate_rejects_page_size() {
        let config = PlatformConfig::Discord(
            toml::from_str(
                r#"
                token = "abc"
                history_page_size = 500
            "#,
            )
            .unwrap(),
        );
        assert!(config.validate().unwrap_err().contains("history_page_size"));
    }

    #[test]
    fn test_parse_memory() {
        let config: PlatformConfig = toml::from_str(r#"type = "memory""#).unwrap();
        assert_eq!(config.name(), "memory");
        assert!(config.validate().is_ok());
    }
}

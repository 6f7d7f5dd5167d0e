//! Configuration module for the retention sweeper.
//!
//! The sweeper is configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! channels = [1439052099794108470, "1447026793386082527"]
//!
//! [retention]
//! min_age_days = 7
//!
//! [platform]
//! type = "discord"
//! token = "${BOT_TOKEN}"
//! ```

mod observability;
mod platform;
mod retention;
mod schedule;

use std::{collections::HashSet, path::Path};

pub use observability::*;
pub use platform::*;
pub use retention::*;
pub use schedule::*;
use serde::{Deserialize, Serialize};

use crate::platform::ChannelId;

/// Starter configuration written by `retention-sweeper init`.
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Channels to sweep, processed in this order.
channels = []

[retention]
min_age_days = 7
bulk_window_days = 14
batch_capacity = 100
pacing_delay_ms = 1000
dry_run = false

[schedule]
enabled = true
interval_minutes = 60
run_on_start = true

[platform]
type = "discord"
token = "${BOT_TOKEN}"

[observability.logging]
level = "info"
format = "compact"
"#;

/// Root configuration for the retention sweeper.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweeperConfig {
    /// Channels to sweep, in processing order.
    pub channels: Vec<ChannelId>,

    /// Which messages are purged, and how fast.
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Periodic trigger for the daemon.
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Chat platform connection.
    pub platform: PlatformConfig,

    /// Logging and metrics.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl SweeperConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing required variables will cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;

        let config: SweeperConfig = toml::from_str(&expanded).map_err(ConfigError::Parse)?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration for consistency and completeness.
    ///
    /// Everything rejected here would otherwise stop a sweep before any
    /// channel is touched, so it is reported up front.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.channels.is_empty() {
            return Err(ConfigError::Validation(
                "channels must list at least one channel ID".into(),
            ));
        }

        let mut seen = HashSet::with_capacity(self.channels.len());
        for channel in &self.channels {
            if channel.get() == 0 {
                return Err(ConfigError::Validation("channel ID 0 is not valid".into()));
            }
            if !seen.insert(*channel) {
                return Err(ConfigError::Validation(format!(
                    "channel {channel} is listed more than once"
                )));
            }
        }

        self.retention.validate().map_err(ConfigError::Validation)?;
        self.schedule.validate().map_err(ConfigError::Validation)?;
        self.platform.validate().map_err(ConfigError::Validation)?;

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Expand environment variables in the format `${VAR_NAME}`.
/// Skips commented lines (lines where content before the variable is a comment).
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    static ENV_VAR: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = ENV_VAR.get_or_init(|| {
        regex::Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid")
    });
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');

        let mut line_result = String::with_capacity(line.len());
        let mut last_end = 0;

        for cap in re.captures_iter(line) {
            let Some(whole) = cap.get(0) else { continue };

            // Skip if this variable is inside a comment
            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            line_result.push_str(&line[last_end..whole.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            line_result.push_str(&value);

            last_end = whole.end();
        }

        line_result.push_str(&line[last_end..]);
        result.push_str(&line_result);
        result.push('\n');
    }

    // Remove trailing newline if input didn't have one
    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMORY_PLATFORM: &str = r#"
        [platform]
        type = "memory"
    "#;

    fn parse(channels: &str) -> Result<SweeperConfig, ConfigError> {
        SweeperConfig::from_str(&format!("channels = {channels}\n{MEMORY_PLATFORM}"))
    }

    #[test]
    fn test_minimal_config() {
        let config = parse("[1439052099794108470]").unwrap();
        assert_eq!(config.channels, vec![ChannelId::new(1439052099794108470)]);
        assert_eq!(config.retention.min_age_days, 7);
        assert!(config.schedule.enabled);
    }

    #[test]
    fn test_channel_ids_as_strings() {
        let config = parse(r#"["1439052099794108470", 42]"#).unwrap();
        assert_eq!(
            config.channels,
            vec![ChannelId::new(1439052099794108470), ChannelId::new(42)]
        );
    }

    #[test]
    fn test_empty_channel_list_rejected() {
        let err = parse("[]").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("at least one")));
    }

    #[test]
    fn test_duplicate_channel_rejected() {
        let err = parse("[5, 6, 5]").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("more than once")));
    }

    #[test]
    fn test_zero_channel_rejected() {
        assert!(matches!(parse("[0]"), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_invalid_retention_rejected() {
        let err = SweeperConfig::from_str(&format!(
            "channels = [1]\n[retention]\nbatch_capacity = 250\n{MEMORY_PLATFORM}"
        ))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("batch_capacity")));
    }

    #[test]
    fn test_out_of_range_ages_and_interval_rejected() {
        let err = SweeperConfig::from_str(&format!(
            "channels = [1]\n[retention]\nmin_age_days = 100000000\n{MEMORY_PLATFORM}"
        ))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("min_age_days")));

        let err = SweeperConfig::from_str(&format!(
            "channels = [1]\n[schedule]\ninterval_minutes = 600000\n{MEMORY_PLATFORM}"
        ))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("interval_minutes")));
    }

    #[test]
    fn test_missing_platform_is_parse_error() {
        assert!(matches!(
            SweeperConfig::from_str("channels = [1]"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_discord_token_from_env() {
        temp_env::with_var("SWEEPER_TEST_BOT_TOKEN", Some("bot-secret"), || {
            let config = SweeperConfig::from_str(
                r#"
                channels = [1]

                [platform]
                type = "discord"
                token = "${SWEEPER_TEST_BOT_TOKEN}"
            "#,
            )
            .unwrap();

            let PlatformConfig::Discord(discord) = config.platform else {
                panic!("expected discord platform");
            };
            assert_eq!(discord.token, "bot-secret");
        });
    }

    #[test]
    fn test_missing_env_var() {
        temp_env::with_var_unset("SWEEPER_TEST_MISSING", || {
            let err = expand_env_vars("token = \"${SWEEPER_TEST_MISSING}\"").unwrap_err();
            assert!(matches!(err, ConfigError::EnvVarNotFound(name) if name == "SWEEPER_TEST_MISSING"));
        });
    }

    #[test]
    fn test_env_var_in_comment_ignored() {
        let result = expand_env_vars("# token = \"${NONEXISTENT_VAR}\"").unwrap();
        assert_eq!(result, "# token = \"${NONEXISTENT_VAR}\"");
    }

    #[test]
    fn test_env_var_after_comment_ignored() {
        let result = expand_env_vars("key = \"value\" # ${NONEXISTENT_VAR}").unwrap();
        assert_eq!(result, "key = \"value\" # ${NONEXISTENT_VAR}");
    }

    #[test]
    fn test_default_template_parses_once_channels_are_filled_in() {
        temp_env::with_var("BOT_TOKEN", Some("token"), || {
            let template = DEFAULT_CONFIG_TEMPLATE.replace("channels = []", "channels = [7]");
            let config = SweeperConfig::from_str(&template).unwrap();
            assert_eq!(config.platform.name(), "discord");

            // As written, the template has no channels yet.
            assert!(matches!(
                SweeperConfig::from_str(DEFAULT_CONFIG_TEMPLATE),
                Err(ConfigError::Validation(_))
            ));
        });
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweeper.toml");
        std::fs::write(&path, format!("channels = [9]\n{MEMORY_PLATFORM}")).unwrap();

        let config = SweeperConfig::from_file(&path).unwrap();
        assert_eq!(config.channels, vec![ChannelId::new(9)]);

        let missing = SweeperConfig::from_file(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io(_, _)));
    }
}

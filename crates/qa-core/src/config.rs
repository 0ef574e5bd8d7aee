//! Configuration types for the QA driver.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::ProviderKind;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize config at {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: toml::ser::Error,
    },
    #[error("failed to create config parent directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write config file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level configuration. Every section has workable defaults so an
/// absent file behaves like an empty one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QaConfig {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub expectations: ExpectationsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Seconds between drain cycles.
    pub poll_interval_secs: u64,
    /// Bounded window of recent transport history fetched per cycle.
    pub history_limit: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 1,
            history_limit: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Environment variable holding the bot token. Missing at startup is fatal.
    pub token_env: String,
    /// Chat the executor drives. Without a target, outbound sends are rejected.
    #[serde(default)]
    pub target_chat: Option<String>,
    pub api_base: String,
    pub timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            token_env: "QA_BOT_TOKEN".to_string(),
            target_chat: None,
            api_base: "https://api.telegram.org".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Cooldown imposed on a rate-limited provider.
    pub cooldown_secs: u64,
    /// Full rotation reset interval.
    pub reset_minutes: u64,
    /// Lower bound on the sleep before the single retry when every provider
    /// is cooling down.
    pub minimum_wait_secs: u64,
    /// Hardcoded fallback once the retry is exhausted.
    pub default_provider: ProviderKind,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 60,
            reset_minutes: 10,
            minimum_wait_secs: 5,
            default_provider: ProviderKind::Deepseek,
        }
    }
}

/// Phrases used to annotate observed messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectationsConfig {
    #[serde(default)]
    pub success_messages: Vec<String>,
    #[serde(default)]
    pub failure_messages: Vec<String>,
}

/// One registered bot under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotRecord {
    pub name: String,
    pub bot_username: String,
    pub capabilities_path: PathBuf,
    pub repo_info_path: PathBuf,
}

impl BotRecord {
    /// Record seeded when the bot directory holds no entries.
    pub fn default_record(root: &Path) -> Self {
        Self {
            name: crate::types::DEFAULT_BOT_NAME.to_string(),
            bot_username: "QaTargetBot".to_string(),
            capabilities_path: root.join("context/bot_capabilities.json"),
            repo_info_path: root.join("context/repo_info.json"),
        }
    }
}

pub fn parse_qa_config(contents: &str) -> Result<QaConfig, toml::de::Error> {
    toml::from_str(contents)
}

pub fn parse_bot_record(contents: &str) -> Result<BotRecord, toml::de::Error> {
    toml::from_str(contents)
}

pub fn load_qa_config(path: impl AsRef<Path>) -> Result<QaConfig, ConfigError> {
    let path_ref = path.as_ref();
    let body = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
        path: path_ref.to_path_buf(),
        source,
    })?;
    parse_qa_config(&body).map_err(|source| ConfigError::Parse {
        path: path_ref.to_path_buf(),
        source,
    })
}

pub fn load_bot_record(path: impl AsRef<Path>) -> Result<BotRecord, ConfigError> {
    let path_ref = path.as_ref();
    let body = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
        path: path_ref.to_path_buf(),
        source,
    })?;
    parse_bot_record(&body).map_err(|source| ConfigError::Parse {
        path: path_ref.to_path_buf(),
        source,
    })
}

pub fn save_qa_config(path: impl AsRef<Path>, config: &QaConfig) -> Result<(), ConfigError> {
    let path_ref = path.as_ref();
    if let Some(parent_dir) = path_ref.parent().map(Path::to_path_buf) {
        fs::create_dir_all(&parent_dir).map_err(|source| ConfigError::CreateDir {
            path: parent_dir,
            source,
        })?;
    }

    let body = toml::to_string_pretty(config).map_err(|source| ConfigError::Serialize {
        path: path_ref.to_path_buf(),
        source,
    })?;
    fs::write(path_ref, body).map_err(|source| ConfigError::Write {
        path: path_ref.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample_config() -> &'static str {
        r#"
[daemon]
poll_interval_secs = 2
history_limit = 8

[transport]
token_env = "QA_BOT_TOKEN"
target_chat = "target_bot"
api_base = "https://api.telegram.org"
timeout_secs = 10

[providers]
cooldown_secs = 60
reset_minutes = 10
minimum_wait_secs = 5
default_provider = "deepseek"

[expectations]
success_messages = ["Welcome", "Balance updated"]
failure_messages = ["Something went wrong"]
"#
    }

    #[test]
    fn parses_full_config() {
        let config = parse_qa_config(sample_config()).expect("parse config");
        assert_eq!(config.daemon.poll_interval_secs, 2);
        assert_eq!(config.daemon.history_limit, 8);
        assert_eq!(config.transport.target_chat.as_deref(), Some("target_bot"));
        assert_eq!(config.providers.default_provider, ProviderKind::Deepseek);
        assert_eq!(config.expectations.success_messages.len(), 2);
    }

    #[test]
    fn empty_config_falls_back_to_defaults() {
        let config = parse_qa_config("").expect("parse empty config");
        assert_eq!(config.daemon.poll_interval_secs, 1);
        assert_eq!(config.daemon.history_limit, 5);
        assert_eq!(config.transport.token_env, "QA_BOT_TOKEN");
        assert_eq!(config.transport.target_chat, None);
        assert_eq!(config.providers.cooldown_secs, 60);
        assert_eq!(config.providers.reset_minutes, 10);
        assert!(config.expectations.success_messages.is_empty());
    }

    #[test]
    fn parses_bot_record() {
        let record = parse_bot_record(
            r#"
name = "alpha"
bot_username = "AlphaBot"
capabilities_path = "context/alpha_capabilities.json"
repo_info_path = "context/alpha_repo_info.json"
"#,
        )
        .expect("parse bot record");
        assert_eq!(record.name, "alpha");
        assert_eq!(record.bot_username, "AlphaBot");
    }

    #[test]
    fn default_record_points_into_root() {
        let record = BotRecord::default_record(&PathBuf::from("/srv/qa"));
        assert_eq!(record.name, crate::types::DEFAULT_BOT_NAME);
        assert_eq!(
            record.capabilities_path,
            PathBuf::from("/srv/qa/context/bot_capabilities.json")
        );
    }

    #[test]
    fn save_and_load_roundtrip() {
        let config = parse_qa_config(sample_config()).expect("parse config");
        let path = std::env::temp_dir().join(format!(
            "heimdall-config-test-{}.toml",
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));

        save_qa_config(&path, &config).expect("save config");
        let loaded = load_qa_config(&path).expect("load config");
        assert_eq!(loaded, config);

        let _ = fs::remove_file(path);
    }

    #[test]
    fn load_classifies_read_and_parse_errors() {
        let missing = std::env::temp_dir().join(format!(
            "heimdall-missing-config-{}.toml",
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let err = load_qa_config(&missing).expect_err("missing file should fail");
        assert!(matches!(err, ConfigError::Read { path, .. } if path == missing));

        let invalid = std::env::temp_dir().join(format!(
            "heimdall-invalid-config-{}.toml",
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        fs::write(&invalid, "daemon = [").expect("write invalid config fixture");
        let err = load_qa_config(&invalid).expect_err("invalid config should fail");
        assert!(matches!(err, ConfigError::Parse { path, .. } if path == invalid));
        let _ = fs::remove_file(invalid);
    }
}

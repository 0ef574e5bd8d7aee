//! Bot registry: named records loaded from a directory of TOML files,
//! with capability and repo-info documents read with defaults.

use qa_core::config::{load_bot_record, BotRecord, ConfigError};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to read bot config directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unknown bot: {name}")]
    UnknownBot { name: String },
    #[error("failed to read capability document {path}: {source}")]
    CapabilityRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse capability document {path}: {source}")]
    CapabilityParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotRegistry {
    records: BTreeMap<String, BotRecord>,
}

impl BotRegistry {
    pub fn from_records(records: Vec<BotRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|record| (record.name.clone(), record))
                .collect(),
        }
    }

    /// Load every `*.toml` record in the directory. A missing or empty
    /// directory seeds the default record so the executor always has a
    /// resolvable selection.
    pub fn load_dir(dir: &Path, data_root: &Path) -> Result<Self, RegistryError> {
        let mut records = Vec::new();

        if dir.exists() {
            let entries = fs::read_dir(dir).map_err(|source| RegistryError::ReadDir {
                path: dir.to_path_buf(),
                source,
            })?;
            let mut paths: Vec<PathBuf> = Vec::new();
            for entry in entries {
                let entry = entry.map_err(|source| RegistryError::ReadDir {
                    path: dir.to_path_buf(),
                    source,
                })?;
                let path = entry.path();
                if path.extension().and_then(|ext| ext.to_str()) == Some("toml") {
                    paths.push(path);
                }
            }
            paths.sort();
            for path in paths {
                records.push(load_bot_record(&path)?);
            }
        }

        if records.is_empty() {
            records.push(BotRecord::default_record(data_root));
        }

        Ok(Self::from_records(records))
    }

    pub fn lookup(&self, name: &str) -> Option<&BotRecord> {
        self.records.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.records.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Capability document for a bot; a missing file yields the default
    /// capability shape.
    pub fn capabilities(&self, record: &BotRecord) -> Result<Value, RegistryError> {
        read_json_or_default(&record.capabilities_path, default_capabilities)
    }

    /// Repo-info document for a bot; a missing file yields defaults.
    pub fn repo_info(&self, record: &BotRecord) -> Result<Value, RegistryError> {
        read_json_or_default(&record.repo_info_path, || {
            json!({ "name": "unknown", "version": "unknown", "default_branch": "main" })
        })
    }
}

fn read_json_or_default(
    path: &Path,
    default_fn: impl FnOnce() -> Value,
) -> Result<Value, RegistryError> {
    if !path.exists() {
        return Ok(default_fn());
    }
    let body = fs::read_to_string(path).map_err(|source| RegistryError::CapabilityRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&body).map_err(|source| RegistryError::CapabilityParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Capability shape assumed when a bot ships no capability document.
pub fn default_capabilities() -> Value {
    json!({
        "commands": { "user": ["/start"], "admin": ["/admin"] },
        "callbacks": ["admin_menu"],
        "menus": ["main"],
        "onboarding_steps": ["start"],
        "pending_actions": [],
        "error_messages": [],
        "eligibility_rules": [],
        "rate_limits": [],
        "contexts": ["telegram_dm", "telegram_group", "telegram_channel"],
        "expected_success_messages": [],
        "expected_failure_messages": [],
        "debug_metadata": ["menu_id", "callback_id", "pending_action", "error_code"]
    })
}

/// Sorted top-level section names of a capability document.
pub fn capability_sections(capabilities: &Value) -> Vec<String> {
    let mut sections: Vec<String> = capabilities
        .as_object()
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default();
    sections.sort();
    sections
}

/// String entries under a capability key, tolerating absent keys.
pub fn capability_string_list(capabilities: &Value, key: &str) -> Vec<String> {
    capabilities
        .get(key)
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

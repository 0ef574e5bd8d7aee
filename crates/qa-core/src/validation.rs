//! Validation for QA driver configuration.

use serde::{Deserialize, Serialize};

use crate::config::{BotRecord, QaConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub level: ValidationLevel,
    pub code: &'static str,
    pub message: String,
}

pub trait Validate {
    fn validate(&self) -> Vec<ValidationIssue>;
}

impl Validate for QaConfig {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.daemon.poll_interval_secs == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "daemon.poll_interval.zero",
                message: "poll interval cannot be 0".to_string(),
            });
        }

        if self.daemon.history_limit == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Warning,
                code: "daemon.history_limit.zero",
                message: "history limit is 0 — no messages will ever be observed".to_string(),
            });
        }

        if self.transport.token_env.trim().is_empty() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "transport.token_env.empty",
                message: "token environment variable name must not be empty".to_string(),
            });
        }

        if self.transport.target_chat.is_none() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Warning,
                code: "transport.target_chat.missing",
                message: "no target chat configured — outbound commands will be rejected"
                    .to_string(),
            });
        }

        if !self.transport.api_base.starts_with("http://")
            && !self.transport.api_base.starts_with("https://")
        {
            issues.push(ValidationIssue {
                level: ValidationLevel::Warning,
                code: "transport.api_base.invalid",
                message: "transport API base should start with http:// or https://".to_string(),
            });
        }

        if self.providers.cooldown_secs == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Warning,
                code: "providers.cooldown.zero",
                message: "cooldown of 0s means rate-limited providers are retried immediately"
                    .to_string(),
            });
        }

        if self.providers.reset_minutes == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "providers.reset_interval.zero",
                message: "reset interval of 0 resets the rotation on every read".to_string(),
            });
        }

        for phrase in &self.expectations.success_messages {
            if self.expectations.failure_messages.contains(phrase) {
                issues.push(ValidationIssue {
                    level: ValidationLevel::Warning,
                    code: "expectations.phrase.ambiguous",
                    message: format!(
                        "phrase '{phrase}' appears in both success and failure lists"
                    ),
                });
            }
        }

        issues
    }
}

impl Validate for BotRecord {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.name.trim().is_empty() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "bot.name.empty",
                message: "bot record name must not be empty".to_string(),
            });
        }

        if self.bot_username.trim().is_empty() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "bot.username.empty",
                message: format!("bot record '{}' has an empty username", self.name),
            });
        }

        issues
    }
}

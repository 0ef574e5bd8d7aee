//! Cooldown-aware provider selection over the shared status record.
//!
//! Every operation is a transactional read-modify-write of the one status
//! document; the periodic reset runs on every read so a long-idle record
//! can never pin a provider in cooldown forever.

use chrono::{DateTime, Duration, Utc};
use qa_core::config::ProvidersConfig;
use qa_core::types::ProviderKind;
use qa_store::store::{DocStore, StoreError};

use crate::status::{ProviderStatus, PROVIDER_STATUS_DOC};

#[derive(Debug, thiserror::Error)]
pub enum FallbackError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackConfig {
    pub cooldown_secs: i64,
    pub reset_after_mins: i64,
    pub minimum_wait_secs: u64,
    pub default_provider: ProviderKind,
}

impl FallbackConfig {
    pub fn from_providers_config(config: &ProvidersConfig) -> Self {
        Self {
            cooldown_secs: config.cooldown_secs as i64,
            reset_after_mins: config.reset_minutes as i64,
            minimum_wait_secs: config.minimum_wait_secs,
            default_provider: config.default_provider,
        }
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self::from_providers_config(&ProvidersConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct FallbackScheduler {
    config: FallbackConfig,
}

impl FallbackScheduler {
    pub fn new(config: FallbackConfig) -> Self {
        Self { config }
    }

    /// Normalize the record and apply the periodic reset when due. Runs on
    /// every read of the status record, so a long-idle record can never
    /// pin a provider in cooldown forever.
    fn refresh(&self, status: &mut ProviderStatus, now: DateTime<Utc>) {
        status.normalize();
        if now - status.last_reset_at >= Duration::minutes(self.config.reset_after_mins) {
            status.reset(now);
        }
    }

    /// Load the status record; normalization and any due reset are
    /// persisted as part of the same transaction.
    pub fn load(&self, store: &DocStore, now: DateTime<Utc>) -> Result<ProviderStatus, FallbackError> {
        let status = store.update(
            PROVIDER_STATUS_DOC,
            || ProviderStatus::initial(now),
            |status: &mut ProviderStatus| {
                self.refresh(status, now);
                status.clone()
            },
        )?;
        Ok(status)
    }

    /// First provider in rotation order whose cooldown is absent or
    /// expired; an expired cooldown is cleared before returning. `None`
    /// when every provider is still cooling down.
    pub fn pick_provider(
        &self,
        store: &DocStore,
        now: DateTime<Utc>,
    ) -> Result<Option<ProviderKind>, FallbackError> {
        let picked = store.update(
            PROVIDER_STATUS_DOC,
            || ProviderStatus::initial(now),
            |status: &mut ProviderStatus| {
                self.refresh(status, now);

                let mut picked = None;
                for provider in status.provider_order.clone() {
                    match status.cooldown_until.get(&provider).copied().flatten() {
                        None => {
                            picked = Some(provider);
                            break;
                        }
                        Some(until) if until <= now => {
                            status.cooldown_until.insert(provider, None);
                            picked = Some(provider);
                            break;
                        }
                        Some(_) => {}
                    }
                }
                picked
            },
        )?;
        Ok(picked)
    }

    pub fn mark_success(
        &self,
        store: &DocStore,
        provider: ProviderKind,
        now: DateTime<Utc>,
    ) -> Result<(), FallbackError> {
        store.update(
            PROVIDER_STATUS_DOC,
            || ProviderStatus::initial(now),
            |status: &mut ProviderStatus| {
                self.refresh(status, now);
                status.last_success_provider = Some(provider);
                status.last_failure_provider = None;
                status.cooldown_until.insert(provider, None);
            },
        )?;
        Ok(())
    }

    /// Record a failure. Only a rate-limited failure imposes a cooldown; a
    /// plain failure leaves the provider immediately retryable.
    pub fn mark_failure(
        &self,
        store: &DocStore,
        provider: ProviderKind,
        rate_limited: bool,
        now: DateTime<Utc>,
    ) -> Result<(), FallbackError> {
        let cooldown = Duration::seconds(self.config.cooldown_secs);
        store.update(
            PROVIDER_STATUS_DOC,
            || ProviderStatus::initial(now),
            |status: &mut ProviderStatus| {
                self.refresh(status, now);
                status.last_failure_provider = Some(provider);
                if rate_limited {
                    status.cooldown_until.insert(provider, Some(now + cooldown));
                }
            },
        )?;
        Ok(())
    }

    /// Maximum remaining cooldown across all providers in seconds; 0 when
    /// none are cooling down.
    pub fn all_failed_wait(
        &self,
        store: &DocStore,
        now: DateTime<Utc>,
    ) -> Result<i64, FallbackError> {
        let status = self.load(store, now)?;
        Ok(status
            .provider_order
            .iter()
            .map(|provider| status.remaining_cooldown_secs(*provider, now))
            .max()
            .unwrap_or(0))
    }

    /// Caller-facing retry contract: on a dry rotation, sleep
    /// `max(all_failed_wait, minimum_wait)` once and retry; if the retry is
    /// also dry, fall back to the configured default provider rather than
    /// block indefinitely.
    pub fn pick_with_retry(
        &self,
        store: &DocStore,
        sleeper: &mut dyn FnMut(std::time::Duration),
    ) -> Result<ProviderKind, FallbackError> {
        if let Some(provider) = self.pick_provider(store, Utc::now())? {
            return Ok(provider);
        }

        let wait_secs = self
            .all_failed_wait(store, Utc::now())?
            .max(self.config.minimum_wait_secs as i64) as u64;
        sleeper(std::time::Duration::from_secs(wait_secs));

        match self.pick_provider(store, Utc::now())? {
            Some(provider) => Ok(provider),
            None => Ok(self.config.default_provider),
        }
    }
}

/// Outcome half of a `<provider>:<outcome>` report string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderReportOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderReport {
    pub provider: ProviderKind,
    pub outcome: ProviderReportOutcome,
}

/// Parse `"deepseek:success"` / `"gemini:failure"` report strings.
pub fn parse_provider_report(text: &str) -> Option<ProviderReport> {
    let (provider, outcome) = text.trim().split_once(':')?;
    let provider = provider.parse::<ProviderKind>().ok()?;
    let outcome = match outcome.trim() {
        "success" => ProviderReportOutcome::Success,
        "failure" => ProviderReportOutcome::Failure,
        _ => return None,
    };
    Some(ProviderReport { provider, outcome })
}

impl FallbackScheduler {
    /// Apply a parsed result report. Failures reported through this
    /// interface are rate-limit failures by definition.
    pub fn apply_report(
        &self,
        store: &DocStore,
        report: ProviderReport,
        now: DateTime<Utc>,
    ) -> Result<(), FallbackError> {
        match report.outcome {
            ProviderReportOutcome::Success => self.mark_success(store, report.provider, now),
            ProviderReportOutcome::Failure => {
                self.mark_failure(store, report.provider, true, now)
            }
        }
    }
}

use chrono::{DateTime, Utc};
use qa_core::types::ProviderKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Document path of the single global status record.
pub const PROVIDER_STATUS_DOC: &str = "providers/status";

/// Durable rotation state. One record, shared by every process that picks
/// providers; all mutations are whole-record read-modify-write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub provider_order: Vec<ProviderKind>,
    pub cooldown_until: BTreeMap<ProviderKind, Option<DateTime<Utc>>>,
    pub last_reset_at: DateTime<Utc>,
    pub last_success_provider: Option<ProviderKind>,
    pub last_failure_provider: Option<ProviderKind>,
}

impl ProviderStatus {
    pub fn initial(now: DateTime<Utc>) -> Self {
        Self {
            provider_order: ProviderKind::CANONICAL_ORDER.to_vec(),
            cooldown_until: ProviderKind::CANONICAL_ORDER
                .iter()
                .map(|provider| (*provider, None))
                .collect(),
            last_reset_at: now,
            last_success_provider: None,
            last_failure_provider: None,
        }
    }

    /// Every provider in the order must have a cooldown entry; repair the
    /// map after decoding externally-written records.
    pub fn normalize(&mut self) {
        for provider in &self.provider_order {
            self.cooldown_until.entry(*provider).or_insert(None);
        }
    }

    /// Restore canonical order and clear every cooldown.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.provider_order = ProviderKind::CANONICAL_ORDER.to_vec();
        self.cooldown_until = ProviderKind::CANONICAL_ORDER
            .iter()
            .map(|provider| (*provider, None))
            .collect();
        self.last_reset_at = now;
    }

    /// Seconds until the given provider leaves cooldown; 0 when available.
    pub fn remaining_cooldown_secs(&self, provider: ProviderKind, now: DateTime<Utc>) -> i64 {
        match self.cooldown_until.get(&provider).copied().flatten() {
            Some(until) if until > now => (until - now).num_seconds(),
            _ => 0,
        }
    }
}

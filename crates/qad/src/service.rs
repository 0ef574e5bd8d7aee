//! Service facade composing the document store, the logbook and the bot
//! registry.

use chrono::Utc;
use qa_core::config::ExpectationsConfig;
use qa_core::log::{LogEvent, LogEventKind, LogStream};
use qa_core::types::{ActionEnvelope, ActionId, BotName, ExecutorState, StateSnapshot};
use qa_store::logbook::{Logbook, LogbookError};
use qa_store::store::{DocStore, StoreError};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::registry::{capability_sections, capability_string_list, BotRegistry, RegistryError};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Logbook(#[from] LogbookError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Document path of the persisted executor state.
pub const EXECUTOR_STATE_DOC: &str = "executor/state";

pub struct QaService {
    pub store: DocStore,
    pub logbook: Logbook,
    pub registry: BotRegistry,
    action_seq: AtomicU64,
}

impl QaService {
    pub fn new(store: DocStore, logbook: Logbook, registry: BotRegistry) -> Self {
        Self {
            store,
            logbook,
            registry,
            action_seq: AtomicU64::new(0),
        }
    }

    pub fn open(
        db_path: impl Into<PathBuf>,
        log_root: impl Into<PathBuf>,
        registry: BotRegistry,
    ) -> Result<Self, ServiceError> {
        let store = DocStore::open(db_path.into())?;
        let logbook = Logbook::new(log_root.into());
        let svc = Self::new(store, logbook, registry);
        svc.bootstrap()?;
        Ok(svc)
    }

    pub fn bootstrap(&self) -> Result<(), ServiceError> {
        self.store.migrate()?;
        Ok(())
    }

    // --- Executor state ---

    pub fn executor_state(&self) -> Result<ExecutorState, ServiceError> {
        Ok(self
            .store
            .read_or_insert(EXECUTOR_STATE_DOC, ExecutorState::default)?)
    }

    pub fn save_executor_state(&self, state: &ExecutorState) -> Result<(), ServiceError> {
        Ok(self.store.write(EXECUTOR_STATE_DOC, state)?)
    }

    /// Registry-validated bot selection; an unknown name leaves the
    /// current selection untouched.
    pub fn select_bot(&self, name: &str) -> Result<(), ServiceError> {
        if self.registry.lookup(name).is_none() {
            return Err(ServiceError::Registry(RegistryError::UnknownBot {
                name: name.to_string(),
            }));
        }
        self.store
            .update(EXECUTOR_STATE_DOC, ExecutorState::default, |state| {
                state.selected_bot = BotName::new(name);
            })?;
        Ok(())
    }

    /// Executor state merged with the selected bot's registry metadata.
    pub fn state_snapshot(&self) -> Result<StateSnapshot, ServiceError> {
        let state = self.executor_state()?;
        let record = self.registry.lookup(state.selected_bot.as_ref());

        let (bot_username, repo_info, sections) = match record {
            Some(record) => {
                let capabilities = self.registry.capabilities(record)?;
                (
                    Some(record.bot_username.clone()),
                    self.registry.repo_info(record)?,
                    capability_sections(&capabilities),
                )
            }
            None => (None, Value::Null, Vec::new()),
        };

        Ok(StateSnapshot {
            qa_enabled: state.qa_enabled,
            mode: state.mode,
            telegram_default: state.telegram_default,
            selected_bot: state.selected_bot,
            bot_username,
            repo_info,
            capability_sections: sections,
        })
    }

    // --- Action queue ---

    /// Mint and durably append a new envelope. Ids are unique and
    /// monotonic within the process: `A-<epoch-millis>-<counter>`.
    pub fn queue_action(
        &self,
        kind: &str,
        payload: Value,
        bot: Option<BotName>,
    ) -> Result<ActionEnvelope, ServiceError> {
        let bot = match bot {
            Some(bot) => bot,
            None => self.executor_state()?.selected_bot,
        };
        let now = Utc::now();
        let seq = self.action_seq.fetch_add(1, Ordering::SeqCst);
        let envelope = ActionEnvelope {
            at: now,
            id: ActionId(format!("A-{}-{seq}", now.timestamp_millis())),
            kind: kind.to_string(),
            payload,
            bot,
        };
        self.store.enqueue_action(&envelope)?;
        Ok(envelope)
    }

    // --- Logs ---

    pub fn record(&self, event: &LogEvent) -> Result<(), ServiceError> {
        Ok(self.logbook.append(event)?)
    }

    /// Expected success/failure phrases: configured lists merged with the
    /// selected bot's capability document.
    pub fn expected_messages(
        &self,
        config: &ExpectationsConfig,
    ) -> Result<(Vec<String>, Vec<String>), ServiceError> {
        let mut success = config.success_messages.clone();
        let mut failure = config.failure_messages.clone();

        let state = self.executor_state()?;
        if let Some(record) = self.registry.lookup(state.selected_bot.as_ref()) {
            let capabilities = self.registry.capabilities(record)?;
            success.extend(capability_string_list(
                &capabilities,
                "expected_success_messages",
            ));
            failure.extend(capability_string_list(
                &capabilities,
                "expected_failure_messages",
            ));
        }
        Ok((success, failure))
    }

    /// Tail of today's observed-message stream, oldest-first.
    pub fn recent_messages(&self, limit: usize) -> Result<Vec<LogEvent>, ServiceError> {
        let day = match self.logbook.latest_day()? {
            Some(day) => day,
            None => return Ok(Vec::new()),
        };
        let mut events = self.logbook.read_stream(day, LogStream::Messages)?;
        if events.len() > limit {
            events.drain(..events.len() - limit);
        }
        Ok(events)
    }

    /// Distinct button labels seen in the recent message log.
    pub fn observed_buttons(&self, limit: usize) -> Result<Vec<String>, ServiceError> {
        self.harvest_observed(limit, |buttons, _| buttons)
    }

    /// Distinct callback ids seen in the recent message log.
    pub fn observed_callbacks(&self, limit: usize) -> Result<Vec<String>, ServiceError> {
        self.harvest_observed(limit, |_, callbacks| callbacks)
    }

    fn harvest_observed(
        &self,
        limit: usize,
        pick: impl Fn(Vec<String>, Vec<String>) -> Vec<String>,
    ) -> Result<Vec<String>, ServiceError> {
        let events = self.recent_messages(limit)?;
        let mut values = BTreeSet::new();
        for event in events {
            if let LogEventKind::MessageObserved {
                buttons, callbacks, ..
            } = event.kind
            {
                for value in pick(buttons, callbacks) {
                    values.insert(value);
                }
            }
        }
        Ok(values.into_iter().collect())
    }
}

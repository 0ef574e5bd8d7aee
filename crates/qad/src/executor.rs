//! Drain-cycle executor.
//!
//! Each cycle atomically pops the selected bot's queue and applies the
//! actions in append order. Planning is pure (state + envelope in, plan
//! out); application mutates durable state, calls the transport and logs
//! every outcome. Control commands always apply — they are the on/off
//! switch — while non-control actions are discarded whenever QA is
//! disabled at the moment the action is reached.

use chrono::Utc;
use qa_core::commands::{parse_control_command, ControlCommand};
use qa_core::config::QaConfig;
use qa_core::log::{LogEvent, LogEventKind};
use qa_core::markers::{match_expectation, DebugMarkers};
use qa_core::types::{ActionEnvelope, ActionKind, BotName, ExecutorState, QaMode};
use qa_store::logbook::LogbookError;
use qa_store::store::StoreError;
use qa_transport::{ChatTransport, TransportError};
use serde_json::Value;

use crate::service::{QaService, ServiceError};

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Logbook(#[from] LogbookError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// What one drained action should do, decided before any side effect.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionPlan {
    Control(ControlCommand),
    Forward { text: String },
    RecordCallback { payload: Value },
    ApplyMode(QaMode),
    Reject { text: String, reason: String },
    Unsupported { kind: String, payload: Value },
    Discard { kind: String },
}

/// Classify one envelope against the current state. Pure.
pub fn plan_action(state: &ExecutorState, envelope: &ActionEnvelope) -> ActionPlan {
    match envelope.kind.parse::<ActionKind>() {
        Ok(ActionKind::SendCommand) => {
            let text = envelope.text().unwrap_or_default().trim().to_string();
            if let Some(command) = parse_control_command(&text) {
                return ActionPlan::Control(command);
            }
            if !state.qa_enabled {
                return ActionPlan::Discard {
                    kind: envelope.kind.clone(),
                };
            }
            if text.is_empty() {
                return ActionPlan::Reject {
                    text,
                    reason: "empty command text".to_string(),
                };
            }
            ActionPlan::Forward { text }
        }
        Ok(ActionKind::PressCallback) => {
            if !state.qa_enabled {
                return ActionPlan::Discard {
                    kind: envelope.kind.clone(),
                };
            }
            ActionPlan::RecordCallback {
                payload: envelope.payload.clone(),
            }
        }
        Ok(ActionKind::SetMode) => {
            if !state.qa_enabled {
                return ActionPlan::Discard {
                    kind: envelope.kind.clone(),
                };
            }
            let raw = envelope.mode().unwrap_or_default();
            match raw.parse::<QaMode>() {
                Ok(mode) => ActionPlan::ApplyMode(mode),
                Err(_) => ActionPlan::Reject {
                    text: raw.to_string(),
                    reason: "mode must be exactly 'user' or 'admin'".to_string(),
                },
            }
        }
        Err(_) => {
            if !state.qa_enabled {
                return ActionPlan::Discard {
                    kind: envelope.kind.clone(),
                };
            }
            ActionPlan::Unsupported {
                kind: envelope.kind.clone(),
                payload: envelope.payload.clone(),
            }
        }
    }
}

/// Tallies for one drain cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    pub drained: usize,
    pub applied: usize,
    pub discarded: usize,
    pub errors: usize,
    pub observed: usize,
}

impl CycleOutcome {
    pub fn activity(&self) -> usize {
        self.drained + self.observed
    }
}

/// Run one full drain cycle against the selected bot.
pub fn run_cycle(
    service: &QaService,
    transport: &dyn ChatTransport,
    config: &QaConfig,
) -> Result<CycleOutcome, ExecutorError> {
    let mut state = service.executor_state()?;
    let drained = service.store.drain_actions(&state.selected_bot)?;

    let mut outcome = CycleOutcome {
        drained: drained.len(),
        ..CycleOutcome::default()
    };

    for action in drained {
        match action.envelope {
            None => {
                service.record(&log_event(
                    &state,
                    &state.selected_bot,
                    LogEventKind::UnsupportedAction {
                        kind: "undecodable".to_string(),
                        payload: Value::String(action.raw),
                    },
                ))?;
                outcome.errors += 1;
            }
            Some(envelope) => {
                let plan = plan_action(&state, &envelope);
                apply_plan(service, transport, config, &mut state, &envelope, plan, &mut outcome)?;
            }
        }
    }

    if state.qa_enabled {
        outcome.observed = observe_history(service, transport, config, &state)?;
    }

    Ok(outcome)
}

fn apply_plan(
    service: &QaService,
    transport: &dyn ChatTransport,
    config: &QaConfig,
    state: &mut ExecutorState,
    envelope: &ActionEnvelope,
    plan: ActionPlan,
    outcome: &mut CycleOutcome,
) -> Result<(), ExecutorError> {
    let bot = envelope.bot.clone();
    let command_text = envelope.text().unwrap_or_default().trim().to_string();

    match plan {
        ActionPlan::Control(command) => match command {
            ControlCommand::Enable => {
                state.qa_enabled = true;
                service.save_executor_state(state)?;
                service.record(&log_event(
                    state,
                    &bot,
                    LogEventKind::ControlApplied { command: command_text },
                ))?;
                outcome.applied += 1;
            }
            ControlCommand::Disable => {
                state.qa_enabled = false;
                service.save_executor_state(state)?;
                service.record(&log_event(
                    state,
                    &bot,
                    LogEventKind::ControlApplied { command: command_text },
                ))?;
                outcome.applied += 1;
            }
            ControlCommand::SetMode(Some(mode)) => {
                state.mode = mode;
                service.save_executor_state(state)?;
                service.record(&log_event(
                    state,
                    &bot,
                    LogEventKind::ControlApplied { command: command_text },
                ))?;
                outcome.applied += 1;
            }
            ControlCommand::SetMode(None) => {
                service.record(&log_event(
                    state,
                    &bot,
                    LogEventKind::CommandRejected {
                        text: command_text,
                        reason: "mode must be exactly 'user' or 'admin'".to_string(),
                    },
                ))?;
                outcome.errors += 1;
            }
            ControlCommand::Status => {
                let snapshot = service.state_snapshot()?;
                service.record(&log_event(
                    state,
                    &bot,
                    LogEventKind::StatusSnapshot { state: snapshot },
                ))?;
                outcome.applied += 1;
            }
            ControlCommand::SelectBot(name) => {
                if service.registry.lookup(&name).is_some() {
                    state.selected_bot = BotName::new(name);
                    service.save_executor_state(state)?;
                    service.record(&log_event(
                        state,
                        &bot,
                        LogEventKind::ControlApplied { command: command_text },
                    ))?;
                    outcome.applied += 1;
                } else {
                    service.record(&log_event(
                        state,
                        &bot,
                        LogEventKind::CommandRejected {
                            text: command_text,
                            reason: format!("unknown bot: {name}"),
                        },
                    ))?;
                    outcome.errors += 1;
                }
            }
        },
        ActionPlan::Forward { text } => match &config.transport.target_chat {
            Some(target) => match transport.send_text(target, &text) {
                Ok(sent) => {
                    service.record(&log_event(
                        state,
                        &bot,
                        LogEventKind::CommandSent {
                            text,
                            message_id: sent.message_id,
                        },
                    ))?;
                    outcome.applied += 1;
                }
                Err(err) => {
                    service.record(&log_event(
                        state,
                        &bot,
                        LogEventKind::TransportFailure {
                            operation: "send_text".to_string(),
                            message: err.to_string(),
                        },
                    ))?;
                    outcome.errors += 1;
                }
            },
            None => {
                service.record(&log_event(
                    state,
                    &bot,
                    LogEventKind::CommandRejected {
                        text,
                        reason: "no target chat configured".to_string(),
                    },
                ))?;
                outcome.errors += 1;
            }
        },
        ActionPlan::RecordCallback { payload } => {
            service.record(&log_event(
                state,
                &bot,
                LogEventKind::CallbackPressed { payload },
            ))?;
            outcome.applied += 1;
        }
        ActionPlan::ApplyMode(mode) => {
            let from = state.mode;
            state.mode = mode;
            service.save_executor_state(state)?;
            service.record(&log_event(
                state,
                &bot,
                LogEventKind::ModeChanged { from, to: mode },
            ))?;
            outcome.applied += 1;
        }
        ActionPlan::Reject { text, reason } => {
            service.record(&log_event(
                state,
                &bot,
                LogEventKind::CommandRejected { text, reason },
            ))?;
            outcome.errors += 1;
        }
        ActionPlan::Unsupported { kind, payload } => {
            service.record(&log_event(
                state,
                &bot,
                LogEventKind::UnsupportedAction { kind, payload },
            ))?;
            outcome.errors += 1;
        }
        ActionPlan::Discard { kind } => {
            service.record(&log_event(
                state,
                &bot,
                LogEventKind::ActionDiscarded { kind },
            ))?;
            outcome.discarded += 1;
        }
    }
    Ok(())
}

/// Fetch the recent history window, re-order it oldest-first and append it
/// to the message log with markers and expectation annotations. A fetch
/// failure is logged and skips the window; it never aborts the cycle.
fn observe_history(
    service: &QaService,
    transport: &dyn ChatTransport,
    config: &QaConfig,
    state: &ExecutorState,
) -> Result<usize, ExecutorError> {
    let target = match &config.transport.target_chat {
        Some(target) => target,
        None => return Ok(0),
    };

    let history = match transport.fetch_recent_history(target, config.daemon.history_limit) {
        Ok(history) => history,
        Err(err) => {
            service.record(&log_event(
                state,
                &state.selected_bot,
                LogEventKind::TransportFailure {
                    operation: "fetch_recent_history".to_string(),
                    message: err.to_string(),
                },
            ))?;
            return Ok(0);
        }
    };

    let (success, failure) = service.expected_messages(&config.expectations)?;

    let mut observed = 0;
    for message in history.iter().rev() {
        let markers = DebugMarkers::extract(&message.text);
        let expectation = match_expectation(&message.text, &success, &failure);
        service.record(&log_event(
            state,
            &state.selected_bot,
            LogEventKind::MessageObserved {
                message_id: message.id,
                text: message.text.clone(),
                buttons: message.button_labels.clone(),
                callbacks: message.callback_ids.clone(),
                markers,
                expectation,
            },
        ))?;
        observed += 1;
    }
    Ok(observed)
}

fn log_event(state: &ExecutorState, bot: &BotName, kind: LogEventKind) -> LogEvent {
    LogEvent::new(Utc::now(), bot.clone(), state.mode, kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use qa_core::config::{BotRecord, ExpectationsConfig, QaConfig};
    use qa_core::log::LogStream;
    use qa_core::markers::Expectation;
    use qa_core::types::DEFAULT_BOT_NAME;
    use qa_store::logbook::Logbook;
    use qa_store::store::DocStore;
    use qa_transport::{ChatMessage, SentMessage};
    use serde_json::json;
    use std::sync::Mutex;

    use crate::registry::BotRegistry;

    /// Transport double: records sends, replays a canned newest-first
    /// history, optionally fails.
    struct ScriptedTransport {
        sent: Mutex<Vec<(String, String)>>,
        history: Vec<ChatMessage>,
        fail_sends: bool,
    }

    impl ScriptedTransport {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                history: Vec::new(),
                fail_sends: false,
            }
        }

        fn with_history(history: Vec<ChatMessage>) -> Self {
            Self {
                history,
                ..Self::new()
            }
        }

        fn sent_texts(&self) -> Vec<String> {
            self.sent
                .lock()
                .expect("sent lock")
                .iter()
                .map(|(_, text)| text.clone())
                .collect()
        }
    }

    impl ChatTransport for ScriptedTransport {
        fn send_text(&self, target: &str, text: &str) -> Result<SentMessage, TransportError> {
            if self.fail_sends {
                return Err(TransportError::Request {
                    message: "scripted send failure".to_string(),
                });
            }
            let mut sent = self.sent.lock().expect("sent lock");
            sent.push((target.to_string(), text.to_string()));
            Ok(SentMessage {
                message_id: sent.len() as i64,
            })
        }

        fn fetch_recent_history(
            &self,
            _target: &str,
            limit: usize,
        ) -> Result<Vec<ChatMessage>, TransportError> {
            Ok(self.history.iter().take(limit).cloned().collect())
        }
    }

    fn mk_registry(dir: &std::path::Path) -> BotRegistry {
        BotRegistry::from_records(vec![
            BotRecord {
                name: DEFAULT_BOT_NAME.to_string(),
                bot_username: "DefaultBot".to_string(),
                capabilities_path: dir.join("default_caps.json"),
                repo_info_path: dir.join("default_repo.json"),
            },
            BotRecord {
                name: "alpha".to_string(),
                bot_username: "AlphaBot".to_string(),
                capabilities_path: dir.join("alpha_caps.json"),
                repo_info_path: dir.join("alpha_repo.json"),
            },
        ])
    }

    fn mk_service(dir: &std::path::Path) -> QaService {
        let store = DocStore::open_in_memory().expect("in-memory store");
        store.migrate().expect("migrate");
        QaService::new(store, Logbook::new(dir.join("logs")), mk_registry(dir))
    }

    fn mk_config() -> QaConfig {
        let mut config = QaConfig::default();
        config.transport.target_chat = Some("target_bot".to_string());
        config
    }

    fn mk_message(id: i64, text: &str) -> ChatMessage {
        ChatMessage {
            id,
            text: text.to_string(),
            button_labels: Vec::new(),
            callback_ids: Vec::new(),
        }
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    fn queue_command(service: &QaService, text: &str) {
        service
            .queue_action("send_command", json!({ "text": text }), None)
            .expect("queue command");
    }

    // --- plan_action ---

    #[test]
    fn control_commands_plan_even_while_disabled() {
        let service_dir = tempfile::tempdir().expect("tempdir");
        let service = mk_service(service_dir.path());
        queue_command(&service, "/qa_on");
        let drained = service
            .store
            .drain_actions(&BotName::new(DEFAULT_BOT_NAME))
            .expect("drain");
        let envelope = drained[0].envelope.clone().expect("envelope");

        let plan = plan_action(&ExecutorState::default(), &envelope);
        assert_eq!(plan, ActionPlan::Control(ControlCommand::Enable));
    }

    #[test]
    fn non_control_actions_plan_to_discard_while_disabled() {
        let state = ExecutorState::default();
        let envelope = ActionEnvelope {
            at: Utc::now(),
            id: qa_core::types::ActionId("A-1".to_string()),
            kind: "press_callback".to_string(),
            payload: json!({"callback_id": "cb_1"}),
            bot: BotName::new(DEFAULT_BOT_NAME),
        };
        assert_eq!(
            plan_action(&state, &envelope),
            ActionPlan::Discard {
                kind: "press_callback".to_string()
            }
        );
    }

    #[test]
    fn unknown_kind_plans_to_unsupported_when_enabled() {
        let mut state = ExecutorState::default();
        state.qa_enabled = true;
        let envelope = ActionEnvelope {
            at: Utc::now(),
            id: qa_core::types::ActionId("A-1".to_string()),
            kind: "dance".to_string(),
            payload: json!({}),
            bot: BotName::new(DEFAULT_BOT_NAME),
        };
        assert_eq!(
            plan_action(&state, &envelope),
            ActionPlan::Unsupported {
                kind: "dance".to_string(),
                payload: json!({})
            }
        );
    }

    // --- run_cycle ---

    #[test]
    fn qa_on_then_hello_from_disabled_state_enables_and_forwards() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = mk_service(dir.path());
        let transport = ScriptedTransport::new();
        let config = mk_config();

        queue_command(&service, "/qa_on");
        queue_command(&service, "hello");

        let outcome = run_cycle(&service, &transport, &config).expect("cycle");
        assert_eq!(outcome.drained, 2);
        assert_eq!(outcome.applied, 2);

        assert!(service.executor_state().expect("state").qa_enabled);
        assert_eq!(transport.sent_texts(), vec!["hello"]);

        let actions = service
            .logbook
            .read_stream(today(), LogStream::Actions)
            .expect("actions");
        assert_eq!(actions.len(), 2);
        assert!(matches!(
            &actions[0].kind,
            LogEventKind::ControlApplied { command } if command == "/qa_on"
        ));
        assert!(matches!(
            &actions[1].kind,
            LogEventKind::CommandSent { text, .. } if text == "hello"
        ));
    }

    #[test]
    fn actions_drained_while_disabled_are_dropped_and_never_reapplied() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = mk_service(dir.path());
        let transport = ScriptedTransport::new();
        let config = mk_config();

        queue_command(&service, "hello");
        let first = run_cycle(&service, &transport, &config).expect("first cycle");
        assert_eq!(first.discarded, 1);
        assert!(transport.sent_texts().is_empty());

        let errors = service
            .logbook
            .read_stream(today(), LogStream::Errors)
            .expect("errors");
        assert!(matches!(
            &errors[0].kind,
            LogEventKind::ActionDiscarded { kind } if kind == "send_command"
        ));

        // Enabling afterwards must not resurrect the dropped action.
        queue_command(&service, "/qa_on");
        let second = run_cycle(&service, &transport, &config).expect("second cycle");
        assert_eq!(second.drained, 1);
        assert!(transport.sent_texts().is_empty());
    }

    #[test]
    fn qa_on_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = mk_service(dir.path());
        let transport = ScriptedTransport::new();
        let config = mk_config();

        queue_command(&service, "/qa_on");
        queue_command(&service, "/qa_on");
        run_cycle(&service, &transport, &config).expect("cycle");

        let state = service.executor_state().expect("state");
        assert!(state.qa_enabled);

        let actions = service
            .logbook
            .read_stream(today(), LogStream::Actions)
            .expect("actions");
        assert_eq!(actions.len(), 2);
    }

    #[test]
    fn each_action_is_applied_exactly_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = mk_service(dir.path());
        let transport = ScriptedTransport::new();
        let config = mk_config();

        queue_command(&service, "/qa_on");
        queue_command(&service, "hello");
        run_cycle(&service, &transport, &config).expect("first cycle");

        let repeat = run_cycle(&service, &transport, &config).expect("second cycle");
        assert_eq!(repeat.drained, 0);
        assert_eq!(transport.sent_texts(), vec!["hello"]);
    }

    #[test]
    fn qa_off_mid_drain_discards_the_remainder() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = mk_service(dir.path());
        let transport = ScriptedTransport::new();
        let config = mk_config();

        queue_command(&service, "/qa_on");
        queue_command(&service, "first");
        queue_command(&service, "/qa_off");
        queue_command(&service, "second");

        let outcome = run_cycle(&service, &transport, &config).expect("cycle");
        assert_eq!(transport.sent_texts(), vec!["first"]);
        assert_eq!(outcome.discarded, 1);
        assert!(!service.executor_state().expect("state").qa_enabled);
    }

    #[test]
    fn malformed_mode_command_is_consumed_not_forwarded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = mk_service(dir.path());
        let transport = ScriptedTransport::new();
        let config = mk_config();

        queue_command(&service, "/qa_on");
        queue_command(&service, "/qa_mode superuser");
        run_cycle(&service, &transport, &config).expect("cycle");

        assert_eq!(service.executor_state().expect("state").mode, QaMode::User);
        assert!(transport.sent_texts().is_empty());

        let errors = service
            .logbook
            .read_stream(today(), LogStream::Errors)
            .expect("errors");
        assert!(matches!(
            &errors[0].kind,
            LogEventKind::CommandRejected { reason, .. } if reason.contains("user")
        ));
    }

    #[test]
    fn set_mode_action_applies_valid_modes_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = mk_service(dir.path());
        let transport = ScriptedTransport::new();
        let config = mk_config();

        queue_command(&service, "/qa_on");
        service
            .queue_action("set_mode", json!({"mode": "admin"}), None)
            .expect("queue set_mode");
        service
            .queue_action("set_mode", json!({"mode": "root"}), None)
            .expect("queue bad set_mode");

        let outcome = run_cycle(&service, &transport, &config).expect("cycle");
        assert_eq!(service.executor_state().expect("state").mode, QaMode::Admin);
        assert_eq!(outcome.errors, 1);
    }

    #[test]
    fn select_bot_switches_selection_and_rejects_unknown_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = mk_service(dir.path());
        let transport = ScriptedTransport::new();
        let config = mk_config();

        queue_command(&service, "/select_bot alpha");
        queue_command(&service, "/select_bot ghost");
        run_cycle(&service, &transport, &config).expect("cycle");

        let state = service.executor_state().expect("state");
        assert_eq!(state.selected_bot.as_ref(), "alpha");

        let errors = service
            .logbook
            .read_stream(today(), LogStream::Errors)
            .expect("errors");
        assert!(matches!(
            &errors[0].kind,
            LogEventKind::CommandRejected { reason, .. } if reason.contains("ghost")
        ));
    }

    #[test]
    fn unsupported_actions_are_logged_and_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = mk_service(dir.path());
        let transport = ScriptedTransport::new();
        let config = mk_config();

        queue_command(&service, "/qa_on");
        service
            .queue_action("dance", json!({"tempo": "fast"}), None)
            .expect("queue unknown");
        queue_command(&service, "still works");

        let outcome = run_cycle(&service, &transport, &config).expect("cycle");
        assert_eq!(outcome.errors, 1);
        assert_eq!(transport.sent_texts(), vec!["still works"]);

        let errors = service
            .logbook
            .read_stream(today(), LogStream::Errors)
            .expect("errors");
        assert!(matches!(
            &errors[0].kind,
            LogEventKind::UnsupportedAction { kind, .. } if kind == "dance"
        ));
    }

    #[test]
    fn callback_presses_are_logged_without_transport_calls() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = mk_service(dir.path());
        let transport = ScriptedTransport::new();
        let config = mk_config();

        queue_command(&service, "/qa_on");
        service
            .queue_action("press_callback", json!({"callback_id": "cb_deposit"}), None)
            .expect("queue callback");

        run_cycle(&service, &transport, &config).expect("cycle");
        assert!(transport.sent_texts().is_empty());

        let actions = service
            .logbook
            .read_stream(today(), LogStream::Actions)
            .expect("actions");
        assert!(actions.iter().any(|event| matches!(
            &event.kind,
            LogEventKind::CallbackPressed { payload } if payload["callback_id"] == "cb_deposit"
        )));
    }

    #[test]
    fn failed_send_is_logged_and_does_not_abort_the_cycle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = mk_service(dir.path());
        let mut transport = ScriptedTransport::new();
        transport.fail_sends = true;
        let config = mk_config();

        queue_command(&service, "/qa_on");
        queue_command(&service, "doomed");
        queue_command(&service, "/qa_status");

        let outcome = run_cycle(&service, &transport, &config).expect("cycle");
        assert_eq!(outcome.errors, 1);

        let actions = service
            .logbook
            .read_stream(today(), LogStream::Actions)
            .expect("actions");
        assert!(actions
            .iter()
            .any(|event| matches!(event.kind, LogEventKind::StatusSnapshot { .. })));
    }

    #[test]
    fn send_without_target_is_rejected_not_silent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = mk_service(dir.path());
        let transport = ScriptedTransport::new();
        let mut config = mk_config();
        config.transport.target_chat = None;

        queue_command(&service, "/qa_on");
        queue_command(&service, "hello");
        run_cycle(&service, &transport, &config).expect("cycle");

        let errors = service
            .logbook
            .read_stream(today(), LogStream::Errors)
            .expect("errors");
        assert!(matches!(
            &errors[0].kind,
            LogEventKind::CommandRejected { reason, .. } if reason.contains("target")
        ));
    }

    #[test]
    fn status_command_snapshots_current_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = mk_service(dir.path());
        let transport = ScriptedTransport::new();
        let config = mk_config();

        queue_command(&service, "/qa_on");
        queue_command(&service, "/qa_status");
        run_cycle(&service, &transport, &config).expect("cycle");

        let actions = service
            .logbook
            .read_stream(today(), LogStream::Actions)
            .expect("actions");
        let snapshot = actions
            .iter()
            .find_map(|event| match &event.kind {
                LogEventKind::StatusSnapshot { state } => Some(state.clone()),
                _ => None,
            })
            .expect("status snapshot logged");
        assert!(snapshot.qa_enabled);
        assert_eq!(snapshot.bot_username.as_deref(), Some("DefaultBot"));
    }

    #[test]
    fn history_is_logged_oldest_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = mk_service(dir.path());
        // Transport returns newest-first: ids [3, 2, 1].
        let transport = ScriptedTransport::with_history(vec![
            mk_message(3, "third"),
            mk_message(2, "second"),
            mk_message(1, "first"),
        ]);
        let config = mk_config();

        queue_command(&service, "/qa_on");
        let outcome = run_cycle(&service, &transport, &config).expect("cycle");
        assert_eq!(outcome.observed, 3);

        let messages = service
            .logbook
            .read_stream(today(), LogStream::Messages)
            .expect("messages");
        let ids: Vec<i64> = messages
            .iter()
            .map(|event| match &event.kind {
                LogEventKind::MessageObserved { message_id, .. } => *message_id,
                other => panic!("unexpected event in message stream: {other:?}"),
            })
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn history_is_skipped_while_disabled() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = mk_service(dir.path());
        let transport = ScriptedTransport::with_history(vec![mk_message(1, "ignored")]);
        let config = mk_config();

        let outcome = run_cycle(&service, &transport, &config).expect("cycle");
        assert_eq!(outcome.observed, 0);
    }

    #[test]
    fn observed_messages_carry_markers_and_expectations() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = mk_service(dir.path());
        let transport = ScriptedTransport::with_history(vec![mk_message(
            1,
            "Welcome back!\nmenu_id: main_menu",
        )]);
        let mut config = mk_config();
        config.expectations = ExpectationsConfig {
            success_messages: vec!["Welcome".to_string()],
            failure_messages: vec![],
        };

        queue_command(&service, "/qa_on");
        run_cycle(&service, &transport, &config).expect("cycle");

        let messages = service
            .logbook
            .read_stream(today(), LogStream::Messages)
            .expect("messages");
        match &messages[0].kind {
            LogEventKind::MessageObserved {
                markers,
                expectation,
                ..
            } => {
                assert_eq!(markers.menu_id.as_deref(), Some("main_menu"));
                assert_eq!(*expectation, Some(Expectation::Success));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn directly_enqueued_envelopes_apply_like_cli_queued_ones() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = mk_service(dir.path());
        let transport = ScriptedTransport::new();
        let config = mk_config();

        service
            .store
            .enqueue_action(&ActionEnvelope {
                at: Utc::now(),
                id: qa_core::types::ActionId("A-ok".to_string()),
                kind: "send_command".to_string(),
                payload: json!({"text": "/qa_on"}),
                bot: BotName::new(DEFAULT_BOT_NAME),
            })
            .expect("enqueue valid");

        let outcome = run_cycle(&service, &transport, &config).expect("cycle");
        assert_eq!(outcome.errors, 0);
        assert_eq!(outcome.applied, 1);
        assert!(service.executor_state().expect("state").qa_enabled);
    }
}

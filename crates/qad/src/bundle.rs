//! Export bundle: a JSON snapshot of the latest log day, the executor
//! state and the queue-action protocol, for hand-off to the external
//! analysis brain.

use chrono::Utc;
use qa_core::log::LogStream;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

use crate::service::{QaService, ServiceError};

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Logbook(#[from] qa_store::logbook::LogbookError),
    #[error("failed to serialize export bundle: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to create bundle directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write export bundle to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Assemble the bundle payload without touching the filesystem target.
pub fn build_bundle(service: &QaService) -> Result<Value, BundleError> {
    let latest = service.logbook.latest_day()?;

    let (actions, errors, messages) = match latest {
        Some(day) => (
            service.logbook.read_stream(day, LogStream::Actions)?,
            service.logbook.read_stream(day, LogStream::Errors)?,
            service.logbook.read_stream(day, LogStream::Messages)?,
        ),
        None => (Vec::new(), Vec::new(), Vec::new()),
    };

    let payload = json!({
        "exported_at": Utc::now().to_rfc3339(),
        "log_day": latest.map(|day| day.format("%Y-%m-%d").to_string()),
        "actions": actions,
        "errors": errors,
        "messages": messages,
        "state": service.state_snapshot()?,
        "protocol": {
            "queue_action": {
                "type": "send_command|press_callback|set_mode",
                "payload": "object",
            },
            "control_commands": [
                "/qa_on",
                "/qa_off",
                "/qa_mode admin",
                "/qa_mode user",
                "/qa_status",
                "/select_bot <name>",
            ],
            "provider_report": "<provider>:success|failure",
        },
    });
    Ok(payload)
}

/// Write the bundle as pretty JSON to `output`.
pub fn export_bundle(service: &QaService, output: &Path) -> Result<Value, BundleError> {
    let payload = build_bundle(service)?;

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).map_err(|source| BundleError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let body = serde_json::to_string_pretty(&payload)
        .map_err(|source| BundleError::Serialize { source })?;
    fs::write(output, body).map_err(|source| BundleError::Write {
        path: output.to_path_buf(),
        source,
    })?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use qa_core::config::BotRecord;
    use qa_core::log::{LogEvent, LogEventKind};
    use qa_core::types::{BotName, QaMode, DEFAULT_BOT_NAME};
    use qa_store::logbook::Logbook;
    use qa_store::store::DocStore;

    fn mk_service(dir: &std::path::Path) -> QaService {
        let store = DocStore::open_in_memory().expect("in-memory store");
        store.migrate().expect("migrate");
        let registry = crate::registry::BotRegistry::from_records(vec![BotRecord {
            name: DEFAULT_BOT_NAME.to_string(),
            bot_username: "DefaultBot".to_string(),
            capabilities_path: dir.join("caps.json"),
            repo_info_path: dir.join("repo.json"),
        }]);
        QaService::new(store, Logbook::new(dir.join("logs")), registry)
    }

    #[test]
    fn empty_logbook_exports_empty_streams() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = mk_service(dir.path());

        let bundle = build_bundle(&service).expect("bundle");
        assert_eq!(bundle["log_day"], Value::Null);
        assert_eq!(bundle["actions"].as_array().map(Vec::len), Some(0));
        assert_eq!(bundle["state"]["qa_enabled"], false);
    }

    #[test]
    fn bundle_carries_latest_day_streams() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = mk_service(dir.path());

        let event = LogEvent::new(
            chrono::Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap(),
            BotName::new(DEFAULT_BOT_NAME),
            QaMode::User,
            LogEventKind::ControlApplied {
                command: "/qa_on".to_string(),
            },
        );
        service.record(&event).expect("record");

        let bundle = build_bundle(&service).expect("bundle");
        assert_eq!(bundle["log_day"], "2026-02-01");
        assert_eq!(bundle["actions"].as_array().map(Vec::len), Some(1));
        assert_eq!(bundle["actions"][0]["command"], "/qa_on");
    }

    #[test]
    fn export_writes_pretty_json_to_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = mk_service(dir.path());
        let output = dir.path().join("bundles/export.json");

        export_bundle(&service, &output).expect("export");

        let body = fs::read_to_string(&output).expect("read bundle");
        let parsed: Value = serde_json::from_str(&body).expect("parse bundle");
        assert!(parsed["protocol"]["control_commands"]
            .as_array()
            .expect("commands array")
            .iter()
            .any(|cmd| cmd == "/qa_on"));
    }
}

//! SQLite-backed document store.
//!
//! Records are whole JSON documents keyed by path. Mutations are
//! read-modify-write of one record inside a transaction, and the action
//! queue drain is a single select-and-delete transaction so a concurrent
//! append can never fall between the read and the clear.

use chrono::Utc;
use qa_core::types::{ActionEnvelope, BotName};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {source}")]
    Sql {
        #[from]
        source: rusqlite::Error,
    },
    #[error("json serialization error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

/// One drained queue entry. `envelope` is `None` when the stored payload
/// failed to decode; the executor logs those as unsupported and moves on.
#[derive(Debug)]
pub struct DrainedAction {
    pub raw: String,
    pub envelope: Option<ActionEnvelope>,
}

#[derive(Debug)]
pub struct DocStore {
    conn: Connection,
}

impl DocStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS documents (
    path TEXT PRIMARY KEY,
    payload_json TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS action_queue (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    bot TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    enqueued_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_action_queue_bot ON action_queue(bot, seq);
"#,
        )?;
        Ok(())
    }

    // --- Documents ---

    pub fn read<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, StoreError> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload_json FROM documents WHERE path = ?1",
                params![path],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|value| serde_json::from_str::<T>(&value))
            .transpose()
            .map_err(StoreError::from)
    }

    pub fn write<T: Serialize>(&self, path: &str, value: &T) -> Result<(), StoreError> {
        let payload = serde_json::to_string(value)?;
        self.conn.execute(
            r#"
INSERT INTO documents (path, payload_json, updated_at)
VALUES (?1, ?2, ?3)
ON CONFLICT(path) DO UPDATE SET
  payload_json = excluded.payload_json,
  updated_at = excluded.updated_at
"#,
            params![path, payload, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Read a document, materializing and persisting the default when the
    /// record does not exist yet.
    pub fn read_or_insert<T>(
        &self,
        path: &str,
        default_fn: impl FnOnce() -> T,
    ) -> Result<T, StoreError>
    where
        T: Serialize + DeserializeOwned,
    {
        let tx = self.conn.unchecked_transaction()?;
        let existing: Option<String> = tx
            .query_row(
                "SELECT payload_json FROM documents WHERE path = ?1",
                params![path],
                |row| row.get(0),
            )
            .optional()?;

        let value = match existing {
            Some(payload) => serde_json::from_str::<T>(&payload)?,
            None => {
                let value = default_fn();
                let payload = serde_json::to_string(&value)?;
                tx.execute(
                    "INSERT INTO documents (path, payload_json, updated_at) VALUES (?1, ?2, ?3)",
                    params![path, payload, Utc::now().to_rfc3339()],
                )?;
                value
            }
        };
        tx.commit()?;
        Ok(value)
    }

    /// Transactional read-modify-write of a single document.
    pub fn update<T, R>(
        &self,
        path: &str,
        default_fn: impl FnOnce() -> T,
        mutate: impl FnOnce(&mut T) -> R,
    ) -> Result<R, StoreError>
    where
        T: Serialize + DeserializeOwned,
    {
        let tx = self.conn.unchecked_transaction()?;
        let existing: Option<String> = tx
            .query_row(
                "SELECT payload_json FROM documents WHERE path = ?1",
                params![path],
                |row| row.get(0),
            )
            .optional()?;

        let mut value = match existing {
            Some(payload) => serde_json::from_str::<T>(&payload)?,
            None => default_fn(),
        };
        let out = mutate(&mut value);

        let payload = serde_json::to_string(&value)?;
        tx.execute(
            r#"
INSERT INTO documents (path, payload_json, updated_at)
VALUES (?1, ?2, ?3)
ON CONFLICT(path) DO UPDATE SET
  payload_json = excluded.payload_json,
  updated_at = excluded.updated_at
"#,
            params![path, payload, Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;
        Ok(out)
    }

    // --- Action queue ---

    pub fn enqueue_action(&self, envelope: &ActionEnvelope) -> Result<(), StoreError> {
        let payload = serde_json::to_string(envelope)?;
        self.conn.execute(
            "INSERT INTO action_queue (bot, payload_json, enqueued_at) VALUES (?1, ?2, ?3)",
            params![envelope.bot.0, payload, envelope.at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Atomically pop every queued action for one bot, in append order.
    /// The select and the delete share a transaction, so an envelope is
    /// delivered to exactly one drain.
    pub fn drain_actions(&self, bot: &BotName) -> Result<Vec<DrainedAction>, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let rows: Vec<(i64, String)> = {
            let mut stmt = tx.prepare(
                "SELECT seq, payload_json FROM action_queue WHERE bot = ?1 ORDER BY seq ASC",
            )?;
            let mapped = stmt.query_map(params![bot.0], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut rows = Vec::new();
            for row in mapped {
                rows.push(row?);
            }
            rows
        };

        if let Some((last_seq, _)) = rows.last() {
            tx.execute(
                "DELETE FROM action_queue WHERE bot = ?1 AND seq <= ?2",
                params![bot.0, last_seq],
            )?;
        }
        tx.commit()?;

        Ok(rows
            .into_iter()
            .map(|(_, raw)| {
                let envelope = serde_json::from_str::<ActionEnvelope>(&raw).ok();
                DrainedAction { raw, envelope }
            })
            .collect())
    }

    pub fn queue_len(&self, bot: &BotName) -> Result<u64, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM action_queue WHERE bot = ?1",
            params![bot.0],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use qa_core::types::{ActionId, ExecutorState};
    use serde_json::json;

    fn mk_store() -> DocStore {
        let store = DocStore::open_in_memory().expect("in-memory store");
        store.migrate().expect("migrate");
        store
    }

    fn mk_envelope(id: &str, bot: &str, text: &str) -> ActionEnvelope {
        ActionEnvelope {
            at: chrono::Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap(),
            id: ActionId(id.to_string()),
            kind: "send_command".to_string(),
            payload: json!({"text": text}),
            bot: BotName::new(bot),
        }
    }

    #[test]
    fn read_returns_none_for_missing_document() {
        let store = mk_store();
        let state: Option<ExecutorState> = store.read("executor/state").expect("read");
        assert!(state.is_none());
    }

    #[test]
    fn write_then_read_roundtrips() {
        let store = mk_store();
        let mut state = ExecutorState::default();
        state.qa_enabled = true;
        store.write("executor/state", &state).expect("write");

        let loaded: Option<ExecutorState> = store.read("executor/state").expect("read");
        assert_eq!(loaded, Some(state));
    }

    #[test]
    fn write_overwrites_whole_document() {
        let store = mk_store();
        store.write("doc", &json!({"a": 1, "b": 2})).expect("write");
        store.write("doc", &json!({"a": 3})).expect("overwrite");

        let loaded: Option<serde_json::Value> = store.read("doc").expect("read");
        assert_eq!(loaded, Some(json!({"a": 3})));
    }

    #[test]
    fn read_or_insert_materializes_default_once() {
        let store = mk_store();
        let first: ExecutorState = store
            .read_or_insert("executor/state", ExecutorState::default)
            .expect("first read");
        assert!(!first.qa_enabled);

        let mut enabled = first.clone();
        enabled.qa_enabled = true;
        store.write("executor/state", &enabled).expect("write");

        let second: ExecutorState = store
            .read_or_insert("executor/state", ExecutorState::default)
            .expect("second read");
        assert!(second.qa_enabled, "default must not clobber existing state");
    }

    #[test]
    fn update_applies_mutation_atomically() {
        let store = mk_store();
        let out = store
            .update("executor/state", ExecutorState::default, |state| {
                state.qa_enabled = true;
                state.qa_enabled
            })
            .expect("update");
        assert!(out);

        let loaded: Option<ExecutorState> = store.read("executor/state").expect("read");
        assert!(loaded.expect("state present").qa_enabled);
    }

    #[test]
    fn drain_returns_actions_in_append_order_and_empties_queue() {
        let store = mk_store();
        let bot = BotName::new("alpha");
        for (id, text) in [("A-1", "/qa_on"), ("A-2", "hello"), ("A-3", "/qa_status")] {
            store
                .enqueue_action(&mk_envelope(id, "alpha", text))
                .expect("enqueue");
        }
        assert_eq!(store.queue_len(&bot).expect("len"), 3);

        let drained = store.drain_actions(&bot).expect("drain");
        let ids: Vec<String> = drained
            .iter()
            .filter_map(|action| action.envelope.as_ref().map(|e| e.id.0.clone()))
            .collect();
        assert_eq!(ids, vec!["A-1", "A-2", "A-3"]);
        assert_eq!(store.queue_len(&bot).expect("len"), 0);
    }

    #[test]
    fn drain_delivers_each_envelope_exactly_once() {
        let store = mk_store();
        let bot = BotName::new("alpha");
        store
            .enqueue_action(&mk_envelope("A-1", "alpha", "hello"))
            .expect("enqueue");

        let first = store.drain_actions(&bot).expect("first drain");
        assert_eq!(first.len(), 1);

        let second = store.drain_actions(&bot).expect("second drain");
        assert!(second.is_empty());
    }

    #[test]
    fn drain_is_scoped_to_one_bot() {
        let store = mk_store();
        store
            .enqueue_action(&mk_envelope("A-1", "alpha", "for alpha"))
            .expect("enqueue alpha");
        store
            .enqueue_action(&mk_envelope("B-1", "beta", "for beta"))
            .expect("enqueue beta");

        let drained = store.drain_actions(&BotName::new("alpha")).expect("drain");
        assert_eq!(drained.len(), 1);
        assert_eq!(store.queue_len(&BotName::new("beta")).expect("len"), 1);
    }

    #[test]
    fn drain_surfaces_undecodable_rows_with_raw_payload() {
        let store = mk_store();
        store
            .conn
            .execute(
                "INSERT INTO action_queue (bot, payload_json, enqueued_at) VALUES (?1, ?2, ?3)",
                params!["alpha", "not json at all", "2026-02-01T08:00:00Z"],
            )
            .expect("insert raw row");

        let drained = store.drain_actions(&BotName::new("alpha")).expect("drain");
        assert_eq!(drained.len(), 1);
        assert!(drained[0].envelope.is_none());
        assert_eq!(drained[0].raw, "not json at all");
    }

    #[test]
    fn store_survives_reopen_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("state.sqlite");

        {
            let store = DocStore::open(&db_path).expect("open");
            store.migrate().expect("migrate");
            store
                .enqueue_action(&mk_envelope("A-1", "alpha", "persisted"))
                .expect("enqueue");
        }

        let reopened = DocStore::open(&db_path).expect("reopen");
        reopened.migrate().expect("migrate");
        assert_eq!(reopened.queue_len(&BotName::new("alpha")).expect("len"), 1);
    }
}

//! Durable audit trail backed by SQLite.
//!
//! [`StateStore`] owns one [`rusqlite::Connection`] behind a mutex. Every
//! operation runs on the blocking pool and holds the lock only for its own
//! statements. Rows are append-only except preferences (upsert by key) and
//! sessions (soft delete through `is_active`). Timestamps are RFC 3339 UTC
//! strings assigned here at write time.

mod error;
mod export;
mod records;
mod settings;

pub use error::{StoreError, StoreResult};
pub use export::ExportDocument;
pub use records::{
    ConversationRecord, FunctionUsage, MetricRecord, NewConversation, NewToolCall,
    SessionRecord, Statistics, ToolCallFilter, ToolCallRecord, ToolStatistics,
};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, Row, params, params_from_iter};
use serde_json::Value;
use tracing::{debug, info};

/// Default database file name.
pub const DEFAULT_DB_FILE: &str = "state.db";

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS conversation (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    user_input TEXT NOT NULL,
    model_response TEXT,
    model_used TEXT,
    function_called TEXT,
    function_params TEXT,
    execution_status TEXT,
    execution_time_ms REAL,
    error_message TEXT
);

CREATE TABLE IF NOT EXISTS tool_calls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    function_name TEXT NOT NULL,
    params TEXT,
    status TEXT,
    result TEXT,
    error TEXT,
    execution_time_ms REAL,
    attempts INTEGER
);

CREATE TABLE IF NOT EXISTS preferences (
    key TEXT PRIMARY KEY,
    value TEXT,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS metrics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    metric_name TEXT NOT NULL,
    metric_value REAL,
    tags TEXT
);

CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_name TEXT UNIQUE NOT NULL,
    created_at TEXT NOT NULL,
    last_accessed TEXT NOT NULL,
    metadata TEXT,
    is_active INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_conversation_timestamp ON conversation(timestamp);
CREATE INDEX IF NOT EXISTS idx_tool_calls_function ON tool_calls(function_name);
CREATE INDEX IF NOT EXISTS idx_metrics_name ON metrics(metric_name, timestamp);
";

/// SQLite-backed state store. Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct StateStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl StateStore {
    /// Open (or create) the database at `path`.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let open_path = path.clone();
        let conn = tokio::task::spawn_blocking(move || -> StoreResult<Connection> {
            let conn = Connection::open(&open_path)?;
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))??;

        info!(path = %path.display(), "State store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path),
        })
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Database file path, `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` against the connection on the blocking pool.
    pub(crate) async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| StoreError::Lock(e.to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    // ------------------------------------------------------------------
    // Conversations
    // ------------------------------------------------------------------

    /// Append a conversation turn; returns its id.
    pub async fn add_conversation(&self, turn: NewConversation) -> StoreResult<i64> {
        let params_text = json_text(turn.function_params.as_ref())?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO conversation (timestamp, user_input, model_response, model_used,
                    function_called, function_params, execution_status, execution_time_ms, error_message)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    now(),
                    turn.user_input,
                    turn.model_response,
                    turn.model_used,
                    turn.function_called,
                    params_text,
                    turn.execution_status,
                    turn.execution_time_ms,
                    turn.error_message,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Newest-first conversation turns, optionally restricted to one model.
    pub async fn conversation_history(
        &self,
        limit: usize,
        offset: usize,
        model: Option<&str>,
    ) -> StoreResult<Vec<ConversationRecord>> {
        let model = model.map(str::to_owned);
        self.with_conn(move |conn| {
            let mut sql = String::from("SELECT * FROM conversation");
            let mut args: Vec<SqlValue> = Vec::new();
            if let Some(model) = model {
                sql.push_str(" WHERE model_used = ?");
                args.push(SqlValue::Text(model));
            }
            sql.push_str(" ORDER BY id DESC LIMIT ? OFFSET ?");
            args.push(sql_int(limit));
            args.push(sql_int(offset));

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(args), conversation_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    /// Turns whose input or response contains `keyword`, newest first.
    pub async fn search_conversations(
        &self,
        keyword: &str,
        limit: usize,
    ) -> StoreResult<Vec<ConversationRecord>> {
        let pattern = format!("%{keyword}%");
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM conversation
                 WHERE user_input LIKE ?1 OR model_response LIKE ?1
                 ORDER BY id DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![pattern, sql_int(limit)], conversation_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    /// Delete turns older than `days` days; returns how many were removed.
    pub async fn clear_old_conversations(&self, days: u32) -> StoreResult<usize> {
        let cutoff = timestamp(Utc::now() - chrono::Duration::days(i64::from(days)));
        let removed = self
            .with_conn(move |conn| {
                Ok(conn.execute("DELETE FROM conversation WHERE timestamp < ?1", [cutoff])?)
            })
            .await?;
        info!(removed, days, "Cleared old conversations");
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Tool calls
    // ------------------------------------------------------------------

    /// Append a tool-call record; returns its id.
    pub async fn add_tool_call(&self, call: NewToolCall) -> StoreResult<i64> {
        let params_text = serde_json::to_string(&call.params)?;
        let result_text = json_text(call.result.as_ref())?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO tool_calls (timestamp, function_name, params, status, result, error,
                    execution_time_ms, attempts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    now(),
                    call.function_name,
                    params_text,
                    call.status,
                    result_text,
                    call.error,
                    call.execution_time_ms,
                    call.attempts,
                ],
            )?;
            debug!(function = %call.function_name, status = %call.status, "Tool call recorded");
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Newest-first tool calls matching `filter`.
    pub async fn tool_calls(&self, filter: ToolCallFilter) -> StoreResult<Vec<ToolCallRecord>> {
        self.with_conn(move |conn| {
            let mut sql = String::from("SELECT * FROM tool_calls WHERE 1=1");
            let mut args: Vec<SqlValue> = Vec::new();
            if let Some(function) = filter.function_name {
                sql.push_str(" AND function_name = ?");
                args.push(SqlValue::Text(function));
            }
            if let Some(status) = filter.status {
                sql.push_str(" AND status = ?");
                args.push(SqlValue::Text(status));
            }
            sql.push_str(" ORDER BY id DESC LIMIT ?");
            args.push(sql_int(filter.limit));

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(args), tool_call_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    /// Aggregates over every recorded tool call.
    pub async fn tool_statistics(&self) -> StoreResult<ToolStatistics> {
        self.with_conn(|conn| {
            let total_calls = count(conn, "SELECT COUNT(*) FROM tool_calls")?;

            let mut stmt = conn.prepare(
                "SELECT COALESCE(status, 'unknown'), COUNT(*) FROM tool_calls GROUP BY status",
            )?;
            let by_status: BTreeMap<String, u64> = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, to_u64(row.get(1)?))))?
                .collect::<Result<_, _>>()?;

            let successful = count(conn, "SELECT COUNT(*) FROM tool_calls WHERE status = 'success'")?;
            let avg_execution_time_ms: Option<f64> =
                conn.query_row("SELECT AVG(execution_time_ms) FROM tool_calls", [], |row| {
                    row.get(0)
                })?;

            let mut stmt = conn.prepare(
                "SELECT function_name, COUNT(*) FROM tool_calls
                 GROUP BY function_name ORDER BY COUNT(*) DESC, function_name LIMIT 5",
            )?;
            let most_used_functions = stmt
                .query_map([], |row| {
                    Ok(FunctionUsage {
                        function: row.get(0)?,
                        count: to_u64(row.get(1)?),
                    })
                })?
                .collect::<Result<_, _>>()?;

            Ok(ToolStatistics {
                total_calls,
                by_status,
                success_rate: if total_calls == 0 {
                    0.0
                } else {
                    successful as f64 / total_calls as f64
                },
                avg_execution_time_ms: avg_execution_time_ms.unwrap_or(0.0),
                most_used_functions,
            })
        })
        .await
    }
}

// ----------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn now() -> String {
    timestamp(Utc::now())
}

fn count(conn: &Connection, sql: &str) -> StoreResult<u64> {
    Ok(to_u64(conn.query_row(sql, [], |row| row.get(0))?))
}

fn to_u64(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

fn sql_int(n: usize) -> SqlValue {
    SqlValue::Integer(i64::try_from(n).unwrap_or(i64::MAX))
}

fn json_text(value: Option<&Value>) -> StoreResult<Option<String>> {
    value
        .map(serde_json::to_string)
        .transpose()
        .map_err(StoreError::from)
}

/// Parse a JSON text column; text that is not JSON is kept as a string.
fn json_column(row: &Row<'_>, column: &str) -> rusqlite::Result<Option<Value>> {
    let text: Option<String> = row.get(column)?;
    Ok(text.map(|t| serde_json::from_str(&t).unwrap_or(Value::String(t))))
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<ConversationRecord> {
    Ok(ConversationRecord {
        id: row.get("id")?,
        timestamp: row.get("timestamp")?,
        user_input: row.get("user_input")?,
        model_response: row.get("model_response")?,
        model_used: row.get("model_used")?,
        function_called: row.get("function_called")?,
        function_params: json_column(row, "function_params")?,
        execution_status: row.get("execution_status")?,
        execution_time_ms: row.get("execution_time_ms")?,
        error_message: row.get("error_message")?,
    })
}

fn tool_call_from_row(row: &Row<'_>) -> rusqlite::Result<ToolCallRecord> {
    Ok(ToolCallRecord {
        id: row.get("id")?,
        timestamp: row.get("timestamp")?,
        function_name: row.get("function_name")?,
        params: json_column(row, "params")?,
        status: row.get("status")?,
        result: json_column(row, "result")?,
        error: row.get("error")?,
        execution_time_ms: row.get("execution_time_ms")?,
        attempts: row.get("attempts")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn failed_call(function: &str) -> NewToolCall {
        NewToolCall {
            function_name: function.into(),
            params: json!({}),
            status: "failed".into(),
            result: None,
            error: Some("no route".into()),
            execution_time_ms: 30.0,
            attempts: 3,
        }
    }

    fn ok_call(function: &str, ms: f64) -> NewToolCall {
        NewToolCall {
            function_name: function.into(),
            params: json!({"level": 50}),
            status: "success".into(),
            result: Some(json!({"status": "success", "message": "done"})),
            error: None,
            execution_time_ms: ms,
            attempts: 1,
        }
    }

    #[tokio::test]
    async fn test_conversation_history_newest_first() {
        let store = StateStore::in_memory().unwrap();
        for (input, model) in [("first", "mistral"), ("second", "llama3"), ("third", "mistral")] {
            store
                .add_conversation(NewConversation::new(input).with_response("{}", model))
                .await
                .unwrap();
        }

        let all = store.conversation_history(10, 0, None).await.unwrap();
        let inputs: Vec<&str> = all.iter().map(|c| c.user_input.as_str()).collect();
        assert_eq!(inputs, vec!["third", "second", "first"]);

        let page = store.conversation_history(1, 1, None).await.unwrap();
        assert_eq!(page[0].user_input, "second");

        let mistral = store.conversation_history(10, 0, Some("mistral")).await.unwrap();
        assert_eq!(mistral.len(), 2);
    }

    #[tokio::test]
    async fn test_conversation_round_trips_params() {
        let store = StateStore::in_memory().unwrap();
        store
            .add_conversation(
                NewConversation::new("set volume to 40")
                    .with_response(r#"{"function":"set_volume","level":40}"#, "mistral")
                    .with_function("set_volume", json!({"level": 40}))
                    .with_status("success")
                    .with_execution_time(12.5),
            )
            .await
            .unwrap();

        let record = &store.conversation_history(1, 0, None).await.unwrap()[0];
        assert_eq!(record.function_called.as_deref(), Some("set_volume"));
        assert_eq!(record.function_params, Some(json!({"level": 40})));
        assert_eq!(record.execution_time_ms, Some(12.5));
        assert!(DateTime::parse_from_rfc3339(&record.timestamp).is_ok());
    }

    #[tokio::test]
    async fn test_search_and_clear_old() {
        let store = StateStore::in_memory().unwrap();
        store
            .add_conversation(NewConversation::new("open notepad"))
            .await
            .unwrap();
        store
            .add_conversation(NewConversation::new("lock the screen"))
            .await
            .unwrap();

        let found = store.search_conversations("notepad", 20).await.unwrap();
        assert_eq!(found.len(), 1);

        assert_eq!(store.clear_old_conversations(30).await.unwrap(), 0);
        assert_eq!(store.clear_old_conversations(0).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_tool_statistics() {
        let store = StateStore::in_memory().unwrap();
        store.add_tool_call(ok_call("set_volume", 10.0)).await.unwrap();
        store.add_tool_call(ok_call("set_volume", 20.0)).await.unwrap();
        store.add_tool_call(ok_call("lock_screen", 30.0)).await.unwrap();
        store.add_tool_call(failed_call("toggle_wifi")).await.unwrap();

        let stats = store.tool_statistics().await.unwrap();
        assert_eq!(stats.total_calls, 4);
        assert_eq!(stats.by_status.get("success"), Some(&3));
        assert_eq!(stats.by_status.get("failed"), Some(&1));
        assert!((stats.success_rate - 0.75).abs() < f64::EPSILON);
        assert!((stats.avg_execution_time_ms - 22.5).abs() < f64::EPSILON);
        assert_eq!(
            stats.most_used_functions[0],
            FunctionUsage {
                function: "set_volume".into(),
                count: 2
            }
        );

        let failed = store
            .tool_calls(ToolCallFilter::default().status("failed"))
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].attempts, Some(3));

        let volume = store
            .tool_calls(ToolCallFilter::default().function("set_volume").limit(1))
            .await
            .unwrap();
        assert_eq!(volume.len(), 1);
        assert_eq!(volume[0].execution_time_ms, Some(20.0));
    }

    #[tokio::test]
    async fn test_empty_statistics() {
        let store = StateStore::in_memory().unwrap();
        let stats = store.tool_statistics().await.unwrap();
        assert_eq!(stats, ToolStatistics::default());
    }

    #[tokio::test]
    async fn test_open_file_store() {
        let dir = assert_fs::TempDir::new().unwrap();
        let path = dir.path().join("nested").join(DEFAULT_DB_FILE);
        let store = StateStore::open(&path).await.unwrap();
        store
            .add_conversation(NewConversation::new("hello"))
            .await
            .unwrap();
        drop(store);

        let reopened = StateStore::open(&path).await.unwrap();
        assert_eq!(reopened.path(), Some(path.as_path()));
        assert_eq!(reopened.conversation_history(5, 0, None).await.unwrap().len(), 1);
    }
}

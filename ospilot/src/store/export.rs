//! Whole-store statistics, export and reset.

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::settings::metric_from_row;
use super::{
    ConversationRecord, MetricRecord, SessionRecord, StateStore, Statistics, StoreResult,
    ToolCallRecord, conversation_from_row, count, now, tool_call_from_row,
};

/// One JSON document holding the whole store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    /// When the export was written.
    pub exported_at: String,
    /// Conversation turns, newest first.
    pub conversations: Vec<ConversationRecord>,
    /// Tool calls, newest first.
    pub tool_calls: Vec<ToolCallRecord>,
    /// Metric samples, newest first.
    #[serde(default)]
    pub metrics: Vec<MetricRecord>,
    /// Every preference.
    pub preferences: BTreeMap<String, Value>,
    /// Every session, active or not.
    pub sessions: Vec<SessionRecord>,
    /// Aggregates at export time.
    pub statistics: Statistics,
}

impl ExportDocument {
    /// Read an export written by [`StateStore::export`].
    pub async fn read(path: impl AsRef<Path>) -> StoreResult<Self> {
        let bytes = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl StateStore {
    /// Aggregates over conversations and tool calls.
    pub async fn statistics(&self) -> StoreResult<Statistics> {
        self.with_conn(|conn| {
            let total_conversations = count(conn, "SELECT COUNT(*) FROM conversation")?;
            let total_tool_calls = count(conn, "SELECT COUNT(*) FROM tool_calls")?;

            let mut stmt = conn.prepare(
                "SELECT model_used, COUNT(*) FROM conversation
                 WHERE model_used IS NOT NULL GROUP BY model_used",
            )?;
            let models_used: BTreeMap<String, u64> = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        u64::try_from(row.get::<_, i64>(1)?).unwrap_or(0),
                    ))
                })?
                .collect::<Result<_, _>>()?;

            let avg_response_time_ms: Option<f64> = conn.query_row(
                "SELECT AVG(execution_time_ms) FROM conversation",
                [],
                |row| row.get(0),
            )?;

            Ok(Statistics {
                total_conversations,
                total_tool_calls,
                models_used,
                avg_response_time_ms: avg_response_time_ms.unwrap_or(0.0),
            })
        })
        .await
    }

    /// Write the whole store to `path` as one pretty-printed JSON document.
    ///
    /// Every conversation, tool call and metric row is included.
    pub async fn export(&self, path: impl AsRef<Path>) -> StoreResult<ExportDocument> {
        let (conversations, tool_calls, metrics) = self
            .with_conn(|conn| {
                let tx = conn.transaction()?;
                let rows = (
                    all_rows(&tx, "conversation", conversation_from_row)?,
                    all_rows(&tx, "tool_calls", tool_call_from_row)?,
                    all_rows(&tx, "metrics", metric_from_row)?,
                );
                tx.commit()?;
                Ok(rows)
            })
            .await?;
        let document = ExportDocument {
            exported_at: now(),
            conversations,
            tool_calls,
            metrics,
            preferences: self.all_preferences().await?,
            sessions: self.list_sessions(false).await?,
            statistics: self.statistics().await?,
        };

        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, serde_json::to_vec_pretty(&document)?).await?;

        info!(path = %path.display(), "Data exported");
        Ok(document)
    }

    /// Delete every row of every table. Does nothing unless `confirm` is set.
    pub async fn clear_all(&self, confirm: bool) -> StoreResult<bool> {
        if !confirm {
            warn!("Confirmation required to clear data");
            return Ok(false);
        }
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute_batch(
                "DELETE FROM conversation;
                 DELETE FROM tool_calls;
                 DELETE FROM preferences;
                 DELETE FROM metrics;
                 DELETE FROM sessions;",
            )?;
            tx.commit()?;
            Ok(())
        })
        .await?;
        warn!("All data cleared");
        Ok(true)
    }
}

/// Every row of `table`, newest first.
fn all_rows<T>(
    conn: &Connection,
    table: &str,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> StoreResult<Vec<T>> {
    let mut stmt = conn.prepare(&format!("SELECT * FROM {table} ORDER BY id DESC"))?;
    let rows = stmt.query_map([], map)?.collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NewConversation, NewToolCall};
    use serde_json::json;

    async fn seeded_store() -> StateStore {
        let store = StateStore::in_memory().unwrap();
        store
            .add_conversation(
                NewConversation::new("open notepad")
                    .with_response(r#"{"function":"open_application"}"#, "mistral")
                    .with_execution_time(100.0),
            )
            .await
            .unwrap();
        store
            .add_conversation(
                NewConversation::new("hi")
                    .with_response("hello", "llama3.2")
                    .with_execution_time(50.0),
            )
            .await
            .unwrap();
        store
            .add_tool_call(NewToolCall {
                function_name: "open_application".into(),
                params: json!({"app_name": "notepad"}),
                status: "success".into(),
                result: Some(json!({"message": "opened"})),
                error: None,
                execution_time_ms: 4.0,
                attempts: 1,
            })
            .await
            .unwrap();
        store
            .set_preference("ollama.model", &json!("mistral"))
            .await
            .unwrap();
        store.create_session("default", None).await.unwrap();
        store
            .record_metric("command_latency_ms", 12.0, None)
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_statistics() {
        let store = seeded_store().await;
        let stats = store.statistics().await.unwrap();
        assert_eq!(stats.total_conversations, 2);
        assert_eq!(stats.total_tool_calls, 1);
        assert_eq!(stats.models_used.get("mistral"), Some(&1));
        assert!((stats.avg_response_time_ms - 75.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_export_round_trip() {
        let store = seeded_store().await;
        let dir = assert_fs::TempDir::new().unwrap();
        let path = dir.path().join("export.json");

        let written = store.export(&path).await.unwrap();
        let read = ExportDocument::read(&path).await.unwrap();
        assert_eq!(read, written);

        let stats = store.statistics().await.unwrap();
        assert_eq!(read.statistics, stats);
        assert_eq!(read.conversations.len() as u64, stats.total_conversations);
        assert_eq!(read.tool_calls.len() as u64, stats.total_tool_calls);
        assert_eq!(read.preferences["ollama.model"], json!("mistral"));
        assert_eq!(read.sessions.len(), 1);
        assert_eq!(read.metrics.len(), 1);
        assert_eq!(read.metrics[0].metric_name, "command_latency_ms");
    }

    #[tokio::test]
    async fn test_export_is_not_truncated() {
        let store = StateStore::in_memory().unwrap();
        for i in 0..10_050 {
            store
                .add_conversation(NewConversation::new(format!("command {i}")))
                .await
                .unwrap();
        }
        let dir = assert_fs::TempDir::new().unwrap();

        let written = store.export(dir.path().join("export.json")).await.unwrap();
        assert_eq!(written.conversations.len(), 10_050);
        assert_eq!(written.conversations[0].user_input, "command 10049");
    }

    #[tokio::test]
    async fn test_clear_all_requires_confirmation() {
        let store = seeded_store().await;
        assert!(!store.clear_all(false).await.unwrap());
        assert_eq!(store.statistics().await.unwrap().total_conversations, 2);

        assert!(store.clear_all(true).await.unwrap());
        assert_eq!(store.statistics().await.unwrap(), Statistics::default());
        assert!(store.all_preferences().await.unwrap().is_empty());
    }
}

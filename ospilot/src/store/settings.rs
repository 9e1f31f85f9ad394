//! Preferences, metrics and sessions.

use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};
use serde_json::Value;
use tracing::debug;

use super::{
    MetricRecord, SessionRecord, StateStore, StoreResult, json_column, json_text, now, sql_int,
    timestamp,
};

impl StateStore {
    // ------------------------------------------------------------------
    // Preferences
    // ------------------------------------------------------------------

    /// Insert or replace the preference `key`.
    pub async fn set_preference(&self, key: &str, value: &Value) -> StoreResult<()> {
        let key = key.to_owned();
        let value = serde_json::to_string(value)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO preferences (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now()],
            )?;
            debug!(key = %key, "Preference stored");
            Ok(())
        })
        .await
    }

    /// Read the preference `key`.
    pub async fn preference(&self, key: &str) -> StoreResult<Option<Value>> {
        let key = key.to_owned();
        self.with_conn(move |conn| {
            let value = conn
                .query_row("SELECT * FROM preferences WHERE key = ?1", [key], |row| {
                    json_column(row, "value")
                })
                .optional()?;
            Ok(value.flatten())
        })
        .await
    }

    /// Every stored preference.
    pub async fn all_preferences(&self) -> StoreResult<BTreeMap<String, Value>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM preferences")?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>("key")?,
                    json_column(row, "value")?.unwrap_or(Value::Null),
                ))
            })?;
            Ok(rows.collect::<Result<_, _>>()?)
        })
        .await
    }

    // ------------------------------------------------------------------
    // Metrics
    // ------------------------------------------------------------------

    /// Record one metric sample.
    pub async fn record_metric(
        &self,
        name: &str,
        value: f64,
        tags: Option<Value>,
    ) -> StoreResult<()> {
        let name = name.to_owned();
        let tags = json_text(tags.as_ref())?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO metrics (timestamp, metric_name, metric_value, tags)
                 VALUES (?1, ?2, ?3, ?4)",
                params![now(), name, value, tags],
            )?;
            Ok(())
        })
        .await
    }

    /// Newest-first samples from the last `hours` hours, optionally of one metric.
    pub async fn metrics(
        &self,
        name: Option<&str>,
        hours: u32,
        limit: usize,
    ) -> StoreResult<Vec<MetricRecord>> {
        let name = name.map(str::to_owned);
        let since = timestamp(Utc::now() - chrono::Duration::hours(i64::from(hours)));
        self.with_conn(move |conn| {
            let mut sql = String::from("SELECT * FROM metrics WHERE timestamp > ?");
            let mut args = vec![SqlValue::Text(since)];
            if let Some(name) = name {
                sql.push_str(" AND metric_name = ?");
                args.push(SqlValue::Text(name));
            }
            sql.push_str(" ORDER BY id DESC LIMIT ?");
            args.push(sql_int(limit));

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(args), metric_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Create a session; returns `None` if the name is already taken.
    pub async fn create_session(
        &self,
        name: &str,
        metadata: Option<Value>,
    ) -> StoreResult<Option<i64>> {
        let name = name.to_owned();
        let metadata = json_text(metadata.as_ref())?;
        self.with_conn(move |conn| {
            let at = now();
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO sessions (session_name, created_at, last_accessed, metadata, is_active)
                 VALUES (?1, ?2, ?2, ?3, 1)",
                params![name, at, metadata],
            )?;
            Ok((inserted == 1).then(|| conn.last_insert_rowid()))
        })
        .await
    }

    /// Sessions ordered by most recent access.
    pub async fn list_sessions(&self, active_only: bool) -> StoreResult<Vec<SessionRecord>> {
        self.with_conn(move |conn| {
            let sql = if active_only {
                "SELECT * FROM sessions WHERE is_active = 1 ORDER BY last_accessed DESC, id DESC"
            } else {
                "SELECT * FROM sessions ORDER BY last_accessed DESC, id DESC"
            };
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map([], session_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    /// Mark a session inactive; returns whether it existed.
    pub async fn deactivate_session(&self, name: &str) -> StoreResult<bool> {
        let name = name.to_owned();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE sessions SET is_active = 0 WHERE session_name = ?1",
                [name],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    /// Bump a session's last-access time; returns whether it existed.
    pub async fn touch_session(&self, name: &str) -> StoreResult<bool> {
        let name = name.to_owned();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE sessions SET last_accessed = ?1 WHERE session_name = ?2",
                params![now(), name],
            )?;
            Ok(changed > 0)
        })
        .await
    }
}

pub(super) fn metric_from_row(row: &Row<'_>) -> rusqlite::Result<MetricRecord> {
    Ok(MetricRecord {
        id: row.get("id")?,
        timestamp: row.get("timestamp")?,
        metric_name: row.get("metric_name")?,
        metric_value: row.get::<_, Option<f64>>("metric_value")?.unwrap_or(0.0),
        tags: json_column(row, "tags")?,
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.get("id")?,
        session_name: row.get("session_name")?,
        created_at: row.get("created_at")?,
        last_accessed: row.get("last_accessed")?,
        metadata: json_column(row, "metadata")?,
        is_active: row.get("is_active")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_preferences_upsert() {
        let store = StateStore::in_memory().unwrap();
        assert_eq!(store.preference("ollama.model").await.unwrap(), None);

        store
            .set_preference("ollama.model", &json!("mistral"))
            .await
            .unwrap();
        store
            .set_preference("ollama.model", &json!("llama3.2"))
            .await
            .unwrap();
        store.set_preference("theme", &json!({"dark": true})).await.unwrap();

        assert_eq!(
            store.preference("ollama.model").await.unwrap(),
            Some(json!("llama3.2"))
        );
        let all = store.all_preferences().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["theme"], json!({"dark": true}));
    }

    #[tokio::test]
    async fn test_metrics_window_and_filter() {
        let store = StateStore::in_memory().unwrap();
        store
            .record_metric("command_latency_ms", 120.0, Some(json!({"model": "mistral"})))
            .await
            .unwrap();
        store.record_metric("cpu", 0.5, None).await.unwrap();

        let latency = store
            .metrics(Some("command_latency_ms"), 24, 100)
            .await
            .unwrap();
        assert_eq!(latency.len(), 1);
        assert_eq!(latency[0].tags, Some(json!({"model": "mistral"})));

        assert_eq!(store.metrics(None, 24, 100).await.unwrap().len(), 2);
        assert_eq!(store.metrics(None, 24, 1).await.unwrap()[0].metric_name, "cpu");
    }

    #[tokio::test]
    async fn test_sessions() {
        let store = StateStore::in_memory().unwrap();
        let id = store
            .create_session("work", Some(json!({"owner": "me"})))
            .await
            .unwrap();
        assert!(id.is_some());
        assert_eq!(store.create_session("work", None).await.unwrap(), None);
        store.create_session("home", None).await.unwrap();

        assert!(store.touch_session("work").await.unwrap());
        assert!(!store.touch_session("gym").await.unwrap());

        assert!(store.deactivate_session("home").await.unwrap());
        let active = store.list_sessions(true).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].session_name, "work");
        assert_eq!(active[0].metadata, Some(json!({"owner": "me"})));

        let all = store.list_sessions(false).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|s| s.session_name == "home" && !s.is_active));
    }
}

//! Read-only SQLite executor over the trace store.
//!
//! This is the storage boundary: it re-rejects anything that is not a
//! SELECT and enforces the default row cap even if the engine's own
//! check was bypassed.

use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use chrono::Utc;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;

use op_capabilities::{SqlExecutor, SqlMetadata, SqlResult};
use op_domain::error::{Error, Result};
use op_engine::sql::{ensure_limit, extract_limit, validate};

#[derive(Debug)]
pub struct SqliteExecutor {
    conn: Mutex<Connection>,
    default_row_limit: u64,
}

impl SqliteExecutor {
    /// Open the database read-only. Fails when the file does not exist.
    pub fn open(path: &Path, default_row_limit: u64) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "trace store not found at {}",
                path.display()
            )));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| Error::SqlExecution(format!("failed to open trace store: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
            default_row_limit,
        })
    }

    fn run(&self, sql: &str) -> Result<SqlResult> {
        // Second line of defense behind the engine's static checks.
        validate(sql).map_err(|e| Error::SqlValidation(e.to_string()))?;
        let original_sql = sql.to_string();
        let (bounded, auto_limit_added) = ensure_limit(sql, self.default_row_limit);

        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::SqlExecution("trace store connection poisoned".into()))?;

        let started = Instant::now();
        let mut stmt = conn
            .prepare(&bounded)
            .map_err(|e| Error::SqlExecution(e.to_string()))?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let column_count = columns.len();

        let mut rows = Vec::new();
        let mut raw = stmt
            .query([])
            .map_err(|e| Error::SqlExecution(e.to_string()))?;
        while let Some(row) = raw.next().map_err(|e| Error::SqlExecution(e.to_string()))? {
            let mut values = Vec::with_capacity(column_count);
            for idx in 0..column_count {
                let value = row
                    .get_ref(idx)
                    .map_err(|e| Error::SqlExecution(e.to_string()))?;
                values.push(to_json(value));
            }
            rows.push(values);
        }
        let execution_ms = started.elapsed().as_secs_f64() * 1000.0;

        tracing::debug!(
            rows = rows.len(),
            execution_ms,
            sql = %bounded,
            "executed read-only query"
        );

        let metadata = SqlMetadata {
            executed_sql: bounded.clone(),
            original_sql,
            rows_returned: rows.len(),
            columns_returned: column_count,
            auto_limit_added,
            limit_value: extract_limit(&bounded),
            execution_ms,
            queried_at: Some(Utc::now()),
        };

        Ok(SqlResult {
            columns,
            rows,
            metadata,
        })
    }
}

#[async_trait::async_trait]
impl SqlExecutor for SqliteExecutor {
    async fn execute(&self, sql: &str) -> Result<SqlResult> {
        self.run(sql)
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => i.into(),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned().into(),
        ValueRef::Blob(bytes) => format!("<{} bytes>", bytes.len()).into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_store() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traces.sqlite");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE agent_runs (run_id TEXT PRIMARY KEY, status TEXT, total_tokens INTEGER);
             INSERT INTO agent_runs VALUES ('r1', 'success', 120);
             INSERT INTO agent_runs VALUES ('r2', 'error', 40);",
        )
        .unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn executes_select_and_records_metadata() {
        let (_dir, path) = seeded_store();
        let exec = SqliteExecutor::open(&path, 100).unwrap();

        let result = exec
            .execute("SELECT run_id, total_tokens FROM agent_runs ORDER BY total_tokens DESC")
            .await
            .unwrap();

        assert_eq!(result.columns, ["run_id", "total_tokens"]);
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0][0], "r1");
        assert_eq!(result.rows[0][1], 120);
        assert!(result.metadata.auto_limit_added);
        assert_eq!(result.metadata.limit_value, Some(100));
        assert!(result.metadata.executed_sql.ends_with("LIMIT 100"));
    }

    #[tokio::test]
    async fn rejects_non_select_at_the_boundary() {
        let (_dir, path) = seeded_store();
        let exec = SqliteExecutor::open(&path, 100).unwrap();

        let err = exec.execute("DELETE FROM agent_runs").await.unwrap_err();
        assert!(matches!(err, Error::SqlValidation(_)));
    }

    #[tokio::test]
    async fn preserves_an_existing_limit() {
        let (_dir, path) = seeded_store();
        let exec = SqliteExecutor::open(&path, 100).unwrap();

        let result = exec
            .execute("SELECT run_id FROM agent_runs LIMIT 1")
            .await
            .unwrap();
        assert_eq!(result.rows.len(), 1);
        assert!(!result.metadata.auto_limit_added);
        assert_eq!(result.metadata.limit_value, Some(1));
    }

    #[test]
    fn missing_database_is_a_config_error() {
        let err = SqliteExecutor::open(Path::new("/nonexistent/db.sqlite"), 100).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}

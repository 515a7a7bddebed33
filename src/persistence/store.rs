//! SQLite-based run archive

use crate::persistence::{ExecutionStatus, PersistenceBackend, RecordKind, RunSummary};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use uuid::Uuid;

const SELECT_COLUMNS: &str =
    "SELECT id, run_id, workflow, kind, subject, status, started_at, completed_at, detail FROM runs";

/// SQLite run store
pub struct SqliteExecutionStore {
    pool: SqlitePool,
}

impl SqliteExecutionStore {
    /// Open (creating if needed) a store at `db_path`
    pub async fn new(db_path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open run archive {}", db_path.display()))?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Create store under the user's local data directory
    pub async fn with_default_path() -> Result<Self> {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let db_dir = data_dir.join("envflow");
        std::fs::create_dir_all(&db_dir)
            .with_context(|| format!("Failed to create {}", db_dir.display()))?;

        Self::new(&db_dir.join("runs.db")).await
    }

    async fn init(&self) -> Result<()> {
        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                run_id TEXT NOT NULL,
                workflow TEXT NOT NULL,
                kind TEXT NOT NULL,
                subject TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                detail TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_runs_run_id ON runs(run_id);
            CREATE INDEX IF NOT EXISTS idx_runs_workflow ON runs(workflow, kind);
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to initialize run archive")?;

        Ok(())
    }

    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn from_row(row: &SqliteRow) -> Result<RunSummary> {
        let kind: String = row.get("kind");
        Ok(RunSummary {
            record_id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            run_id: Uuid::parse_str(&row.get::<String, _>("run_id"))?,
            workflow: row.get("workflow"),
            kind: RecordKind::parse(&kind)
                .with_context(|| format!("Unknown record kind '{}'", kind))?,
            subject: row.get("subject"),
            status: ExecutionStatus::parse(&row.get::<String, _>("status")),
            started_at: Self::from_naive(row.get("started_at")),
            completed_at: row
                .get::<Option<NaiveDateTime>, _>("completed_at")
                .map(Self::from_naive),
            detail: row.get("detail"),
        })
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for SqliteExecutionStore {
    async fn save_record(&self, record: &RunSummary) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO runs
            (id, run_id, workflow, kind, subject, status, started_at, completed_at, detail)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(record.record_id.to_string())
        .bind(record.run_id.to_string())
        .bind(&record.workflow)
        .bind(record.kind.as_str())
        .bind(&record.subject)
        .bind(record.status.as_str())
        .bind(Self::to_naive(record.started_at))
        .bind(record.completed_at.map(Self::to_naive))
        .bind(&record.detail)
        .execute(&self.pool)
        .await
        .context("Failed to save run record")?;

        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Vec<RunSummary>> {
        let rows = sqlx::query(&format!(
            "{} WHERE run_id = ?1 \
             ORDER BY CASE kind WHEN 'run' THEN 0 WHEN 'environment' THEN 1 ELSE 2 END, started_at",
            SELECT_COLUMNS
        ))
        .bind(run_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to load run")?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn list_runs(&self, workflow: &str) -> Result<Vec<RunSummary>> {
        let rows = sqlx::query(&format!(
            "{} WHERE workflow = ?1 AND kind = 'run' ORDER BY started_at DESC",
            SELECT_COLUMNS
        ))
        .bind(workflow)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list runs")?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn list_workflows(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT workflow FROM runs ORDER BY workflow ASC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list workflows")?;

        Ok(rows.iter().map(|row| row.get("workflow")).collect())
    }
}

//! Database lifecycle and schema migrations.

use crate::error::DatabaseError;
use crate::{Error, Result};
use sqlx::SqliteConnection;
use sqlx::sqlite::SqlitePool;
use std::path::Path;

use super::Database;

impl Database {
    /// Create a new database connection
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to create database directory: {}",
                    e
                )))
            })?;
        }

        use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
        use std::str::FromStr;

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to parse database path: {}",
                    e
                )))
            })?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to connect to database: {}",
                e
            )))
        })?;

        let db = Self { pool };

        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to acquire connection: {}",
                e
            )))
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to create schema_version table: {}",
                e
            )))
        })?;

        let current_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to query schema version: {}",
                        e
                    )))
                })?
                .flatten();

        let current_version = current_version.unwrap_or(0);

        if current_version < 1 {
            Self::migrate_v1(&mut conn).await?;
        }
        if current_version < 2 {
            Self::migrate_v2(&mut conn).await?;
        }

        Ok(())
    }

    async fn begin_migration(conn: &mut SqliteConnection, version: i64) -> Result<()> {
        tracing::info!(version, "Applying database migration");

        // Wrap migration in a transaction so partial failures don't leave the DB in a broken state
        sqlx::query("BEGIN")
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "Failed to begin transaction: {}",
                    e
                )))
            })?;
        Ok(())
    }

    async fn finish_migration(
        conn: &mut SqliteConnection,
        version: i64,
        result: Result<()>,
    ) -> Result<()> {
        match result {
            Ok(()) => {
                sqlx::query("COMMIT")
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| {
                        Error::Database(DatabaseError::MigrationFailed(format!(
                            "Failed to commit migration v{}: {}",
                            version, e
                        )))
                    })?;
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e);
            }
        }

        tracing::info!(version, "Database migration complete");
        Ok(())
    }

    /// Migration v1: status store
    async fn migrate_v1(conn: &mut SqliteConnection) -> Result<()> {
        Self::begin_migration(conn, 1).await?;

        let result = async {
            Self::create_reports_schema(conn).await?;
            Self::create_report_records_schema(conn).await?;
            Self::record_migration(conn, 1).await?;
            Ok::<(), Error>(())
        }
        .await;

        Self::finish_migration(conn, 1, result).await
    }

    /// Migration v2: durable message channel
    async fn migrate_v2(conn: &mut SqliteConnection) -> Result<()> {
        Self::begin_migration(conn, 2).await?;

        let result = async {
            Self::create_messages_schema(conn).await?;
            Self::record_migration(conn, 2).await?;
            Ok::<(), Error>(())
        }
        .await;

        Self::finish_migration(conn, 2, result).await
    }

    async fn execute_ddl(conn: &mut SqliteConnection, sql: &str, what: &str) -> Result<()> {
        sqlx::query(sql).execute(&mut *conn).await.map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to create {}: {}",
                what, e
            )))
        })?;
        Ok(())
    }

    /// Create reports table and its indexes
    async fn create_reports_schema(conn: &mut SqliteConnection) -> Result<()> {
        Self::execute_ddl(
            conn,
            r#"
            CREATE TABLE reports (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER,
                heartbeat_at INTEGER,
                progress INTEGER NOT NULL DEFAULT 0,
                processed_nfts INTEGER NOT NULL DEFAULT 0,
                total_nfts INTEGER NOT NULL DEFAULT 0,
                batch_count INTEGER NOT NULL DEFAULT 0,
                last_applied_batch INTEGER NOT NULL DEFAULT -1,
                csv_path TEXT,
                error_message TEXT,
                error_code TEXT
            )
            "#,
            "reports table",
        )
        .await?;

        Self::execute_ddl(
            conn,
            "CREATE INDEX idx_reports_status ON reports(status)",
            "index",
        )
        .await?;

        Self::execute_ddl(
            conn,
            "CREATE INDEX idx_reports_created_at ON reports(created_at DESC)",
            "index",
        )
        .await
    }

    /// Create report_records table
    async fn create_report_records_schema(conn: &mut SqliteConnection) -> Result<()> {
        Self::execute_ddl(
            conn,
            r#"
            CREATE TABLE report_records (
                report_id TEXT NOT NULL REFERENCES reports(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                field_id TEXT NOT NULL,
                token_id TEXT NOT NULL,
                tx_id TEXT NOT NULL,
                explorer_url TEXT NOT NULL,
                PRIMARY KEY (report_id, position)
            )
            "#,
            "report_records table",
        )
        .await
    }

    /// Create messages table and its indexes
    async fn create_messages_schema(conn: &mut SqliteConnection) -> Result<()> {
        Self::execute_ddl(
            conn,
            r#"
            CREATE TABLE messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ordering_key TEXT NOT NULL,
                dedup_key TEXT NOT NULL,
                body TEXT NOT NULL,
                state TEXT NOT NULL DEFAULT 'pending',
                receive_count INTEGER NOT NULL DEFAULT 0,
                visible_at INTEGER NOT NULL,
                published_at INTEGER NOT NULL,
                last_error TEXT
            )
            "#,
            "messages table",
        )
        .await?;

        Self::execute_ddl(
            conn,
            "CREATE INDEX idx_messages_state_visible ON messages(state, visible_at)",
            "index",
        )
        .await?;

        Self::execute_ddl(
            conn,
            "CREATE INDEX idx_messages_ordering_key ON messages(ordering_key, id)",
            "index",
        )
        .await?;

        Self::execute_ddl(
            conn,
            "CREATE INDEX idx_messages_dedup_key ON messages(dedup_key, published_at)",
            "index",
        )
        .await
    }

    /// Record that a migration was applied
    async fn record_migration(conn: &mut SqliteConnection, version: i64) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
            .bind(version)
            .bind(now)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "Failed to record migration: {}",
                    e
                )))
            })?;
        Ok(())
    }

    /// Close the database connection
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

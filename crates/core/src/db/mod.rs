pub mod repository;
pub mod sqlite;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::error::Result;

pub enum DatabasePool {
    Sqlite(SqlitePool),
}

impl DatabasePool {
    /// Create a new SQLite database pool from a connection string and run migrations.
    pub async fn new_sqlite(path: &str) -> Result<Self> {
        let pool = SqlitePool::connect(path).await?;
        Self::run_migrations(&pool).await?;
        Ok(DatabasePool::Sqlite(pool))
    }

    /// Create a new in-memory SQLite database pool and run migrations. Useful for testing.
    ///
    /// A single connection keeps the in-memory database alive and shared.
    pub async fn new_sqlite_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::run_migrations(&pool).await?;
        Ok(DatabasePool::Sqlite(pool))
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        sqlx::query("PRAGMA foreign_keys = ON;")
            .execute(pool)
            .await?;

        let migrations: &[&str] = &[include_str!(
            "../../../../migrations/sqlite/001_initial_schema.sql"
        )];

        for migration_sql in migrations {
            for statement in migration_sql.split(';') {
                let trimmed = statement.trim();
                if is_executable(trimmed) {
                    sqlx::query(trimmed).execute(pool).await?;
                }
            }
        }
        Ok(())
    }
}

/// Skip empty fragments and fragments that hold only comments.
fn is_executable(statement: &str) -> bool {
    statement
        .lines()
        .map(str::trim)
        .any(|line| !line.is_empty() && !line.starts_with("--"))
}

//! Database access for rollbook-api
//!
//! SQLite via sqlx. The two tables and their uniqueness constraints are
//! created at startup; the UNIQUE(student_guid, day) index on
//! attendance_records is the safety net behind the one-record-per-day
//! invariant, and the partial unique index on students.student_id keeps
//! the external identifier sparse (NULL rows never collide).

pub mod attendance;
pub mod students;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create tables and indexes if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS students (
            guid TEXT PRIMARY KEY,
            student_id TEXT,
            name TEXT NOT NULL,
            sex TEXT NOT NULL,
            year TEXT NOT NULL,
            date_of_birth TEXT,
            email TEXT,
            phone TEXT,
            address TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Sparse uniqueness: absent external ids are NULL and exempt
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_students_student_id
         ON students(student_id) WHERE student_id IS NOT NULL",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_students_name ON students(name)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_students_year ON students(year)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS attendance_records (
            guid TEXT PRIMARY KEY,
            student_id TEXT NOT NULL DEFAULT '',
            student_guid TEXT NOT NULL,
            day TEXT NOT NULL,
            status TEXT NOT NULL,
            reason TEXT NOT NULL DEFAULT '',
            notes TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(student_guid, day)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_attendance_day ON attendance_records(day)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student_id ON attendance_records(student_id)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (students, attendance_records)");

    Ok(())
}

/// Check whether an error is a uniqueness-constraint rejection
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
        _ => false,
    }
}

// Pinned to one connection: each pooled connection to sqlite::memory:
// would otherwise open its own empty database.
#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    init_tables(&pool).await.expect("Failed to init tables");
    pool
}

//! # Database Migration System
//!
//! Embedded schema migrations with concurrency control. Migration SQL ships
//! inside the binary (compiled in from `migrations/`), and a PostgreSQL
//! advisory lock serializes schema setup when several coordinator processes
//! or parallel test threads race to initialize the same database.
//!
//! Migrations are tracked in `overseer_schema_migrations` by version and are
//! idempotent: the DDL uses `IF NOT EXISTS` / `OR REPLACE` throughout, so a
//! re-run after a partial failure converges.

use sqlx::{PgPool, Row};

/// One embedded migration, named `YYYYMMDDHHMMSS_description`.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: &'static str,
    pub name: &'static str,
    pub sql: &'static str,
}

/// All migrations, oldest first.
const MIGRATIONS: &[Migration] = &[Migration {
    version: "20250115000001",
    name: "create_coordination_schema",
    sql: include_str!("../../migrations/20250115000001_create_coordination_schema.sql"),
}];

// Advisory lock key for schema setup, shared by every coordinator process.
const SCHEMA_LOCK_KEY: i64 = 0x6f76_7273_6565_72;

/// Manages database schema migrations with concurrency safety.
pub struct DatabaseMigrations;

impl DatabaseMigrations {
    /// Run all outstanding migrations in order, under an advisory lock.
    pub async fn run_all(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(SCHEMA_LOCK_KEY)
            .execute(pool)
            .await?;

        let result = Self::run_outstanding_migrations(pool).await;

        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(SCHEMA_LOCK_KEY)
            .execute(pool)
            .await?;

        result
    }

    async fn run_outstanding_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        Self::ensure_migration_table(pool).await?;

        for migration in MIGRATIONS {
            if Self::is_applied(pool, migration.version).await? {
                continue;
            }

            tracing::info!(
                version = migration.version,
                name = migration.name,
                "applying migration"
            );

            // Multi-statement scripts need the raw connection path.
            sqlx::raw_sql(migration.sql).execute(pool).await?;

            sqlx::query("INSERT INTO overseer_schema_migrations (version, name) VALUES ($1, $2)")
                .bind(migration.version)
                .bind(migration.name)
                .execute(pool)
                .await?;
        }

        Ok(())
    }

    async fn ensure_migration_table(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS overseer_schema_migrations (
                version TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn is_applied(pool: &PgPool, version: &str) -> Result<bool, sqlx::Error> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM overseer_schema_migrations WHERE version = $1) AS applied",
        )
        .bind(version)
        .fetch_one(pool)
        .await?;

        Ok(row.get::<bool, _>("applied"))
    }
}

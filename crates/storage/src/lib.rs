mod domains;
mod skills;
mod users;

use std::{str::FromStr, time::Duration};

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    migrate::MigrateError,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    SqlitePool,
};
use thiserror::Error;

pub use domains::{DomainError, DomainRepository, NewDomain};
pub use skills::{SkillError, SkillRepository, UserSkillInput};
pub use users::{Credentials, NewUser, UserChanges, UserError, UserRepository};

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    ///
    /// Every pooled connection enforces foreign keys and uses WAL journaling.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(StorageError::Connect)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(StorageError::Connect)?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns a handle for users, their roles and management links.
    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.pool.clone())
    }

    /// Returns a handle for domains.
    pub fn domains(&self) -> DomainRepository {
        DomainRepository::new(self.pool.clone())
    }

    /// Returns a handle for the skill catalogue and user skills.
    pub fn skills(&self) -> SkillRepository {
        SkillRepository::new(self.pool.clone())
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// SQLite constraint failures the repositories translate into domain errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Constraint {
    Unique,
    ForeignKey,
}

/// Classifies a SQLite error by its extended result code.
pub(crate) fn constraint_violation(err: &sqlx::Error) -> Option<Constraint> {
    let sqlx::Error::Database(db_err) = err else {
        return None;
    };
    match db_err.code().as_deref() {
        // SQLITE_CONSTRAINT_UNIQUE / SQLITE_CONSTRAINT_PRIMARYKEY
        Some("2067") | Some("1555") => Some(Constraint::Unique),
        // SQLITE_CONSTRAINT_FOREIGNKEY
        Some("787") => Some(Constraint::ForeignKey),
        _ => None,
    }
}

pub(crate) fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub async fn setup_db() -> Database {
        let db = Database::connect("sqlite::memory:").await.expect("connect");
        db.run_migrations().await.expect("migrations");
        db
    }

    pub async fn insert_user(db: &Database, name: &str, email: Option<&str>) -> i64 {
        db.users()
            .create_user(&NewUser {
                name: name.to_string(),
                email: email.map(str::to_string),
                password_hash: None,
                diploma: None,
                created_at: Utc::now(),
            })
            .await
            .expect("insert user")
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn migrations_apply() {
        let db = setup_db().await;

        let tables: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'")
                .fetch_one(db.pool())
                .await
                .expect("fetch tables");
        assert!(tables.0 >= 5, "expected core tables to be created");
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced() {
        let db = setup_db().await;

        let err = sqlx::query("INSERT INTO user_roles (user_id, role) VALUES (999, 'Manager')")
            .execute(db.pool())
            .await
            .expect_err("missing user must be rejected");
        assert_eq!(constraint_violation(&err), Some(Constraint::ForeignKey));
    }
}

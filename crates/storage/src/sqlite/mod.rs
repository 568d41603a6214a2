use std::time::Duration;

use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use srs_core::model::UserId;
use thiserror::Error;

use crate::repository::Storage;

mod active_session_repo;
mod card_repo;
mod mapping;
mod migrate;
mod progress_repo;
mod scheduling_repo;
mod session_summary_repo;

/// `SQLite` backend. The catalog is shared; everything else is scoped to `user_id`.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
    user_id: UserId,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("user id {0} does not fit in a sqlite integer")]
    UserIdOverflow(UserId),
}

impl SqliteRepository {
    /// Connect to `SQLite` using the given URL, scoped to one learner.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the connection cannot be established or if
    /// enforcing foreign key constraints fails during setup.
    pub async fn connect(database_url: &str, user_id: UserId) -> Result<Self, SqliteInitError> {
        if i64::try_from(user_id.value()).is_err() {
            return Err(SqliteInitError::UserIdOverflow(user_id));
        }
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA foreign_keys = ON;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA journal_mode = WAL;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA busy_timeout = 5000;")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;
        Ok(Self { pool, user_id })
    }

    /// Same database, different learner.
    #[must_use]
    pub fn for_user(&self, user_id: UserId) -> Self {
        Self {
            pool: self.pool.clone(),
            user_id,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if migration queries fail.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool).await
    }

    fn user_key(&self) -> Result<i64, crate::repository::StorageError> {
        mapping::i64_from_u64("user_id", self.user_id.value())
    }
}

impl Storage {
    /// Build a `Storage` backed by `SQLite` for one learner.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if connection or migrations cannot be
    /// completed.
    pub async fn sqlite(database_url: &str, user_id: UserId) -> Result<Self, SqliteInitError> {
        let repo = SqliteRepository::connect(database_url, user_id).await?;
        repo.migrate().await?;
        Ok(Self::from_repo(repo))
    }
}

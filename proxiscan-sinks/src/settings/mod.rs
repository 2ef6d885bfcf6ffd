//! Persistence of the small set of flags that must survive a restart.

pub mod memory;
pub mod sqllite;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Key-value store owned by the host application.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// `None` if the flag has never been stored.
    async fn load_flag(&self, key: &str) -> Result<Option<bool>, SettingsError>;
    async fn store_flag(&self, key: &str, value: bool) -> Result<(), SettingsError>;
}
